use std::sync::Arc;

use platchan_channel::{ChannelError, MethodChannel};
use platchan_link::{connect_with_config, HandshakeConfig, LinkConfig};
use platchan_transport::{FailurePolicy, Messenger, MessengerConfig};
use serde_json::Value;

use crate::cmd::{parse_duration, InvokeArgs};
use crate::exit::{
    channel_error, link_error, transport_error, CliError, CliResult, FAILURE, SUCCESS, USAGE,
};
use crate::output::{print_invoke, OutputFormat};

pub fn run(args: InvokeArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let arguments = parse_arguments(args.args.as_deref())?;

    let config = LinkConfig::default()
        .with_reply_timeout(timeout)
        .with_handshake(HandshakeConfig::default().with_timeout(timeout));
    let pending = connect_with_config(&args.path, args.codec.as_str(), &config)
        .map_err(|err| link_error("connect failed", err))?;

    // Inbound traffic on this side is not expected; report instead of exiting.
    let messenger = Messenger::with_config(
        pending.runtime(),
        MessengerConfig::default().with_failure_policy(FailurePolicy::report(|_| {})),
    )
    .map_err(|err| transport_error("messenger setup failed", err))?;
    let handle = pending
        .start(Arc::new(messenger.clone()))
        .map_err(|err| link_error("link start failed", err))?;

    let channel = MethodChannel::new(Arc::new(messenger.clone()), &args.channel, args.codec.codec());
    let outcome = channel.invoke_method(&args.method, arguments);

    handle.shutdown();
    messenger.shutdown();

    match outcome {
        Ok(result) => {
            print_invoke(&args.channel, &args.method, Ok(&result), format);
            Ok(SUCCESS)
        }
        Err(ChannelError::Method(err)) => {
            print_invoke(&args.channel, &args.method, Err(&err), format);
            Ok(FAILURE)
        }
        Err(err) => Err(channel_error("invoke failed", err)),
    }
}

fn parse_arguments(raw: Option<&str>) -> CliResult<Value> {
    match raw {
        None => Ok(Value::Null),
        Some(raw) => serde_json::from_str(raw)
            .map_err(|err| CliError::new(USAGE, format!("--args is not valid JSON: {err}"))),
    }
}
