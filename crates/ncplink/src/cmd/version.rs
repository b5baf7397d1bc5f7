use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("ncplink {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: ncplink");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!("target: {}", env!("NCPLINK_BUILD_TARGET"));
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "rustc: {}",
        option_env!("RUSTC_VERSION").unwrap_or("unknown")
    );
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    println!("ash_version: {}", ncplink_ash::VERSION);
    println!(
        "ezsp_protocol_version: {}",
        ncplink_ezsp::DEFAULT_PROTOCOL_VERSION
    );

    Ok(SUCCESS)
}
