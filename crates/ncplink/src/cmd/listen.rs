use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::RecvTimeoutError;
use ncplink_ezsp::ids::NO_CALLBACKS;
use tracing::warn;

use crate::cmd::{open_session, ListenArgs};
use crate::exit::{ash_error, ezsp_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_notification, OutputFormat};

const WAKE_INTERVAL: Duration = Duration::from_millis(100);

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let session = open_session(&args.device)?;
    let ezsp = &session.ezsp;
    ezsp.version(args.protocol)
        .map_err(|err| ezsp_error("version negotiation failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let notifications = ezsp.notifications();
    let faults = ezsp.faults();
    let mut printed = 0usize;
    let mut next_poll = Instant::now();

    while running.load(Ordering::SeqCst) {
        if let Ok(fault) = faults.try_recv() {
            return Err(ash_error("link fault", fault));
        }

        if let Some(interval) = args.poll {
            if Instant::now() >= next_poll {
                next_poll = Instant::now() + interval;
                if let Err(err) = ezsp.poll_callbacks() {
                    if err.is_fatal() {
                        return Err(ezsp_error("callback poll failed", err));
                    }
                    warn!(%err, "callback poll failed");
                }
            }
        }

        let notification = match notifications.recv_timeout(WAKE_INTERVAL) {
            Ok(notification) => notification,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        // Answer to a poll with nothing queued.
        if notification.command_id == NO_CALLBACKS {
            continue;
        }
        print_notification(&notification, format);
        printed = printed.saturating_add(1);

        if let Some(count) = args.count {
            if printed >= count {
                return Ok(SUCCESS);
            }
        }
    }

    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
