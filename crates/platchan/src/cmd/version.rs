use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("platchan {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: platchan");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!("protocol: {} {}", platchan_link::PROTOCOL_NAME, platchan_link::PROTOCOL_VERSION);
    println!(
        "build_target: {}",
        option_env!("PLATCHAN_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    println!("codecs: json, binary");
    println!("features: link={}, cli=true", cfg!(feature = "link"));

    Ok(SUCCESS)
}
