//! Minimal host: accepts one runtime link and serves a JSON echo channel.
//!
//! Run with:
//!   cargo run --example echo-host
//!
//! In another terminal:
//!   cargo run --features cli -- invoke /tmp/platchan-echo-<pid>/echo.sock \
//!     --method echo --args '{"hello":"world"}'

use std::fs;
use std::sync::Arc;

use platchan::channel::MethodChannel;
use platchan::codec::JsonMethodCodec;
use platchan::link::LinkListener;
use platchan::transport::{BinaryMessenger, FailurePolicy, Messenger, MessengerConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let sock_dir = std::env::temp_dir().join(format!("platchan-echo-{}", std::process::id()));
    fs::create_dir_all(&sock_dir)?;
    let sock_path = sock_dir.join("echo.sock");

    let listener = LinkListener::bind(&sock_path)?;
    eprintln!("Listening on {}", sock_path.display());

    let pending = listener.accept()?;
    eprintln!("Link established: {}", pending.handshake().link_id);

    let config = MessengerConfig::default().with_failure_policy(FailurePolicy::report(|failure| {
        eprintln!("channel failure: {failure}");
    }));
    let messenger = Messenger::with_config(pending.runtime(), config)?;
    let shared: Arc<dyn BinaryMessenger> = Arc::new(messenger.clone());

    let channel = MethodChannel::new(shared, "platchan/echo", Arc::new(JsonMethodCodec));
    channel.handle_func("echo", |args| {
        eprintln!("echo {args}");
        Ok(args)
    });

    // Serve until the runtime hangs up.
    pending.start(Arc::new(messenger.clone()))?.join();
    messenger.shutdown();

    let _ = fs::remove_dir_all(&sock_dir);
    Ok(())
}
