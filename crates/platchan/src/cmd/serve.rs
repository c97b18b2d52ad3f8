use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use platchan_channel::{
    HeadlessSurface, HostSurface, MethodChannel, PlatformPlugin, PluginRegistry, TextInputPlugin,
    TextInputSession,
};
use platchan_codec::{CodecKind, MethodError};
use platchan_link::{HandshakeConfig, LinkConfig, LinkError, LinkHandle, LinkListener, PendingLink};
use platchan_transport::{BinaryMessenger, FailurePolicy, Messenger, MessengerConfig};
use serde_json::Value;
use tracing::{info, warn};

use crate::cmd::ServeArgs;
use crate::exit::{channel_error, link_error, transport_error, CliError, CliResult, SUCCESS};
use crate::output::{print_link_summary, OutputFormat};

/// Channel served by `platchan serve`.
pub const ECHO_CHANNEL: &str = "platchan/echo";
/// Error code returned by the `fail` method.
pub const FAIL_CODE: &str = "E_FAIL";

const POLL_INTERVAL: Duration = Duration::from_millis(50);

struct ServedLink {
    link_id: String,
    codec: String,
    messenger: Messenger,
    handle: LinkHandle,
}

impl ServedLink {
    fn finish(self, format: OutputFormat) {
        self.handle.shutdown();
        let stats = self.messenger.stats();
        self.messenger.shutdown();
        info!(link_id = %self.link_id, "link closed");
        print_link_summary(&self.link_id, &self.codec, &stats, format);
    }
}

pub fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let handshake = HandshakeConfig::default().with_codecs([args.codec.as_str()]);
    let listener = LinkListener::bind(&args.path)
        .map_err(|err| link_error("bind failed", err))?
        .with_config(LinkConfig::default().with_handshake(handshake));

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let surface = Arc::new(HeadlessSurface::new());
    let mut active: Vec<ServedLink> = Vec::new();
    let mut accepted = 0usize;

    while running.load(Ordering::SeqCst) {
        let (finished, still_open): (Vec<_>, Vec<_>) = active
            .drain(..)
            .partition(|link| link.handle.is_finished());
        active = still_open;
        for link in finished {
            link.finish(format);
        }

        let limit_reached = args.max_links.is_some_and(|max| accepted >= max);
        if limit_reached {
            if active.is_empty() {
                break;
            }
            std::thread::sleep(POLL_INTERVAL);
            continue;
        }

        match listener.try_accept() {
            Ok(Some(pending)) => {
                accepted += 1;
                active.push(serve_link(pending, &args, &surface)?);
            }
            Ok(None) => std::thread::sleep(POLL_INTERVAL),
            Err(LinkError::Accept(err)) => {
                return Err(link_error("accept failed", LinkError::Accept(err)))
            }
            Err(err) => warn!(error = %err, "refused link"),
        }
    }

    for link in active {
        link.finish(format);
    }
    Ok(SUCCESS)
}

fn serve_link(
    pending: PendingLink,
    args: &ServeArgs,
    surface: &Arc<HeadlessSurface>,
) -> CliResult<ServedLink> {
    let link_id = pending.handshake().link_id.clone();
    let codec = pending.handshake().codec.clone();

    let policy = if args.strict {
        FailurePolicy::Exit
    } else {
        // The messenger has already logged the failure.
        FailurePolicy::report(|_| {})
    };
    let messenger = Messenger::with_config(
        pending.runtime(),
        MessengerConfig::default().with_failure_policy(policy),
    )
    .map_err(|err| transport_error("messenger setup failed", err))?;
    let shared: Arc<dyn BinaryMessenger> = Arc::new(messenger.clone());

    bind_echo_channel(&shared, args.codec);

    let host: Arc<dyn HostSurface> = surface.clone();
    let mut plugins = PluginRegistry::new();
    plugins
        .add_surface(PlatformPlugin::new())
        .add(TextInputPlugin::new(Arc::new(TextInputSession::new())));
    plugins
        .init_all(&shared, Some(&host))
        .map_err(|err| channel_error("plugin setup failed", err))?;

    let handle = pending
        .start(Arc::new(messenger.clone()))
        .map_err(|err| link_error("link start failed", err))?;
    info!(link_id = %link_id, codec = %codec, plugins = ?plugins.names(), "serving link");

    Ok(ServedLink {
        link_id,
        codec,
        messenger,
        handle,
    })
}

/// Bind `platchan/echo`: `echo` returns its arguments, `fail` answers with an
/// `E_FAIL` error carrying them as details, `ping` is acknowledge-only.
pub fn bind_echo_channel(messenger: &Arc<dyn BinaryMessenger>, codec: CodecKind) -> MethodChannel {
    let channel = MethodChannel::new(Arc::clone(messenger), ECHO_CHANNEL, codec.codec());
    channel.handle_func("echo", |args| Ok(args));
    channel.handle_func("fail", |args: Value| {
        Err(MethodError::new(FAIL_CODE, "failure requested").with_details(args))
    });
    channel.handle("ping", None);
    channel
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}
