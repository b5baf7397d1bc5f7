use crate::cmd::{open_session, ProbeArgs};
use crate::exit::{ezsp_error, CliResult, SUCCESS};
use crate::output::{print_probe, OutputFormat, ProbeOutput};

pub fn run(args: ProbeArgs, format: OutputFormat) -> CliResult<i32> {
    let session = open_session(&args.device)?;
    let version = session
        .ezsp
        .version(args.protocol)
        .map_err(|err| ezsp_error("version negotiation failed", err))?;

    let out = ProbeOutput::new(
        &args.device.device,
        session.transport,
        session.reset_code,
        &version,
    );
    print_probe(&out, format);
    Ok(SUCCESS)
}
