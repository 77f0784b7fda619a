use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("rnsnow {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: rnsnow");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("RNSNOW_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("radio_mtu: {}", rnsnow_transport::ESPNOW_MTU);
    println!(
        "fragment_chunk: {}",
        rnsnow_frame::FragmentConfig::default().chunk_size()
    );
    println!(
        "group_id: {}",
        String::from_utf8_lossy(rnsnow_frame::GROUP_ID)
    );

    Ok(SUCCESS)
}
