use ncplink_ezsp::Reply;
use tracing::debug;

use crate::cmd::{open_session, usage, SendArgs};
use crate::exit::{ezsp_error, CliResult, SUCCESS};
use crate::output::{parse_hex, print_reply, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let data = parse_hex(&args.data).map_err(|err| usage(format!("--data: {err}")))?;

    let session = open_session(&args.device)?;
    // The coprocessor rejects everything but `version` until it is negotiated.
    if args.command != ncplink_ezsp::ids::VERSION {
        session
            .ezsp
            .version(args.protocol)
            .map_err(|err| ezsp_error("version negotiation failed", err))?;
    }

    debug!(command = %ncplink_ezsp::display_name(args.command), len = data.len(), "sending");
    let reply = session
        .ezsp
        .send_command(args.command, &data)
        .map_err(|err| ezsp_error("send failed", err))?;
    print_reply(&reply, format);

    // Printed either way; a rejected or mismatched reply still fails the run.
    if let Reply::Response(response) = reply {
        response
            .expect(args.command)
            .map_err(|err| ezsp_error("command rejected", err))?;
    }
    Ok(SUCCESS)
}
