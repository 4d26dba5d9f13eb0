//! The repeat thread: periodic command re-execution and deferred work
//!
//! One dedicated thread waits on the deferred-command channel. A timed-out
//! wait fires the armed repeat command; a received item is work a callback
//! posted (a GC report, or a full command line). GC-finish notifications
//! therefore wake the loop immediately instead of waiting out the period.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::RecvTimeoutError;
use log::debug;

use crate::command;
use crate::monitor::{Deferred, Monitor};
use crate::output::Tag;

/// Wait granularity while the repeat command is disarmed.
const IDLE_WAIT: Duration = Duration::from_millis(500);

pub fn run(monitor: &Arc<Monitor>) {
    let receiver = monitor.deferred_receiver();
    let mut next_fire: Option<Instant> = None;

    loop {
        if monitor.is_shutdown() {
            break;
        }

        let period = monitor.repeat_secs();
        if period == 0 {
            next_fire = None;
        } else if next_fire.is_none() {
            next_fire = Some(Instant::now() + Duration::from_secs(period));
        }

        let timeout = next_fire
            .map_or(IDLE_WAIT, |at| at.saturating_duration_since(Instant::now()).min(IDLE_WAIT));

        match receiver.recv_timeout(timeout) {
            Ok(Deferred::GcReport) => monitor.gc_report(),
            Ok(Deferred::Command(line)) => {
                if !line.is_empty() {
                    command::execute(monitor, &line);
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if next_fire.is_some_and(|at| Instant::now() >= at) {
                    next_fire = None;
                    if let Some(line) = monitor.last_command() {
                        debug!("repeat: re-running {line:?}");
                        let mut notice = Tag::new("Trace");
                        notice.put("Type", "UserCommand").put("Info", line.as_str());
                        monitor.emit(&notice);
                        command::execute(monitor, &line);
                    }
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    debug!("repeat thread stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_gc_report_drains_from_queue() {
        let monitor = Monitor::new(Config::default(), Arc::new(sherlok_runtime::NoopRuntime));
        monitor.hub.set_format(crate::output::OutputFormat::Tree);
        monitor.defer(Deferred::GcReport);
        let receiver = monitor.deferred_receiver();
        assert_eq!(receiver.recv_timeout(Duration::from_millis(100)), Ok(Deferred::GcReport));
    }
}
