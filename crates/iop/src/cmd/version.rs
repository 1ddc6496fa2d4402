use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("iop {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: iop");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("IOP_BUILD_TARGET").unwrap_or("unknown")
    );
    println!(
        "profile: {}",
        option_env!("IOP_BUILD_PROFILE").unwrap_or("unknown")
    );
    println!("rustc: {}", option_env!("RUSTC_VERSION").unwrap_or("unknown"));
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    println!("features: async={}, cli=true", cfg!(feature = "async"));
    println!(
        "wire: meta types REQUEST=0x{:08X} RESPONSE=0x{:08X} HEARTBEAT=0x{:08X} LOGIN=0x{:08X}",
        iop::frame::meta::REQUEST,
        iop::frame::meta::RESPONSE,
        iop::frame::meta::HEARTBEAT,
        iop::frame::meta::LOGIN
    );

    Ok(SUCCESS)
}
