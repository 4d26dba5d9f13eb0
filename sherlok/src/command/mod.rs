//! The line-oriented command interpreter behind the shell
//!
//! One command per line, whitespace separated, short-flag clustered
//! options. The interpreter holds the bridge lock for the whole command so
//! exactly one command runs at a time and interleaves safely with
//! callbacks. Unknown verbs and bad options produce a single
//! `Command failed` event and leave all state unchanged.

pub mod dumps;
pub mod help;
pub mod options;

pub use dumps::{ClassSort, DumpFilter, MethodFilter, MethodSort};
pub use options::ShortOpts;

use log::debug;

use crate::config::ProfilerMode;
use crate::domain::CommandError;
use crate::monitor::Monitor;
use crate::output::Tag;
use crate::tracer::{TraceCategory, TraceOptions};

/// Cadence when `repeat` is armed without an explicit period.
const DEFAULT_REPEAT_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandResult {
    Continue,
    /// `exit`: the shell closes this session.
    Exit,
}

struct Outcome {
    tag: Option<Tag>,
    exit: bool,
}

impl Outcome {
    fn tag(tag: Tag) -> Self {
        Outcome { tag: Some(tag), exit: false }
    }
}

/// A `Trace`/`Type=Message` response.
fn message(info: impl Into<String>) -> Tag {
    let mut tag = Tag::new("Trace");
    tag.put("Type", "Message").put("Info", info.into());
    tag
}

/// The single `Command failed` event a malformed command produces.
fn failure(error: &CommandError) -> Tag {
    let mut tag = Tag::new("Trace");
    tag.put("Type", "Message").put("Event", "Error").put("Info", format!("Command failed: {error}"));
    tag
}

/// Run one command line. Output goes through the monitor's hub; the return
/// value only signals session termination.
pub fn execute(monitor: &Monitor, line: &str) -> CommandResult {
    let line = line.trim();
    if line.is_empty() {
        return CommandResult::Continue;
    }
    let _bridge = monitor.bridge.lock().unwrap();

    let tokens: Vec<&str> = line.split_whitespace().collect();
    let verb = tokens[0];

    match run_verb(monitor, &tokens) {
        Ok(outcome) => {
            // The repeat loop re-runs the previous command; control verbs
            // would loop on themselves and are not remembered.
            if !matches!(verb, "repeat" | "exit") {
                monitor.remember_command(line);
            }
            if let Some(tag) = outcome.tag {
                monitor.emit(&tag);
            }
            if outcome.exit {
                CommandResult::Exit
            } else {
                CommandResult::Continue
            }
        }
        Err(error) => {
            debug!("command {line:?} failed: {error}");
            monitor.emit(&failure(&error));
            CommandResult::Continue
        }
    }
}

fn run_verb(monitor: &Monitor, tokens: &[&str]) -> Result<Outcome, CommandError> {
    let args = &tokens[1..];
    match tokens[0] {
        "help" | "man" => Ok(Outcome::tag(help::help_tag(args.first().copied()))),

        "start" => run_start(monitor, args),
        "stop" => run_stop(monitor, args),

        "lsc" => {
            let filter = class_filter(monitor, args, true)?;
            Ok(Outcome::tag(monitor.dump_classes(&filter)))
        }
        "lml" => {
            let filter = class_filter(monitor, args, false)?;
            Ok(Outcome::tag(monitor.dump_leaks(&filter)))
        }
        "lsm" => {
            let opts = ShortOpts::parse(args)?;
            let filter = MethodFilter {
                name_filter: opts.get('f').map(str::to_string),
                min_calls: opts.get_u64('m')?.unwrap_or(0),
                min_cpu_micros: opts.get_u64('u')?.unwrap_or(0),
                sort: opts
                    .get('s')
                    .map_or(Some(MethodSort::default()), MethodSort::parse)
                    .ok_or_else(|| bad_sort(&opts))?,
                limit: monitor.config.read().unwrap().limit_io,
                with_signature: opts.has('g'),
                with_hash: opts.has('x'),
                class_id: opts.get_hex('C')?.map(sherlok_runtime::ClassId),
            };
            Ok(Outcome::tag(monitor.dump_methods(&filter)))
        }
        "lhd" => {
            let opts = ShortOpts::parse(args)?;
            if opts.has('c') {
                monitor.clear_heap_tallies();
                return Ok(Outcome::tag(message("heap dump cleared")));
            }
            let filter = class_filter(monitor, args, false)?;
            Ok(Outcome::tag(monitor.dump_heap(&filter)))
        }
        "lss" => Ok(Outcome::tag(monitor.dump_statistic())),
        "lsp" => run_lsp(monitor, args),
        "lcf" => Ok(Outcome::tag(monitor.dump_config_files())),
        "dex" => Ok(Outcome::tag(monitor.dump_exceptions())),
        "dt" => {
            let opts = ShortOpts::parse(args)?;
            Ok(Outcome::tag(monitor.dump_threads(opts.has('s'))))
        }

        "gc" => {
            monitor.host.force_gc();
            Ok(Outcome::tag(message("GC requested")))
        }
        "reset" => {
            let opts = ShortOpts::parse(args)?;
            monitor.reset(opts.has('s'));
            Ok(Outcome::tag(message(format!("reset ({})", monitor.generation()))))
        }
        "repeat" => {
            let secs = match args.first() {
                None => DEFAULT_REPEAT_SECS,
                Some(value) => value.parse().map_err(|_| CommandError::BadValue {
                    key: "repeat".to_string(),
                    value: (*value).to_string(),
                })?,
            };
            monitor.set_repeat_secs(secs);
            let info = if secs == 0 {
                "repeat disarmed".to_string()
            } else {
                format!("repeating previous command every {secs}s")
            };
            Ok(Outcome::tag(message(info)))
        }
        "trace" => run_trace(monitor, args),
        "set" => run_set(monitor, args),

        "info" => {
            let config = monitor.config.read().unwrap();
            let info = format!(
                "sherlok {}; monitoring {}; mode {:?}; {}; uptime {}ms",
                env!("CARGO_PKG_VERSION"),
                if monitor.is_active() { "active" } else { "inactive" },
                config.profiler_mode,
                monitor.generation(),
                monitor.uptime_ms(),
            );
            Ok(Outcome::tag(message(info)))
        }
        "echo" => Ok(Outcome::tag(message(args.join(" ")))),
        "version" => Ok(Outcome::tag(message(format!("sherlok {}", env!("CARGO_PKG_VERSION"))))),
        "chpwd" => {
            let password = args.first().ok_or(CommandError::MissingArgument("password"))?;
            monitor.config.write().unwrap().password = Some((*password).to_string());
            Ok(Outcome::tag(message("password changed")))
        }
        "exit" => Ok(Outcome { tag: None, exit: true }),

        verb => Err(CommandError::UnknownVerb(verb.to_string())),
    }
}

fn bad_sort(opts: &ShortOpts) -> CommandError {
    CommandError::BadOption {
        flag: 's',
        reason: format!("unknown sort column {:?}", opts.get('s').unwrap_or_default()),
    }
}

/// Shared `-f -m -c -s -x -h -d -C` handling for the class-shaped dumps.
/// `lsc` defaults the byte threshold to `MinMemorySize`; the leak and heap
/// lists show everything unless `-m` narrows them.
fn class_filter(
    monitor: &Monitor,
    args: &[&str],
    default_min: bool,
) -> Result<DumpFilter, CommandError> {
    let opts = ShortOpts::parse(args)?;
    let config = monitor.config.read().unwrap();
    let min_bytes = match opts.get_u64('m')? {
        Some(value) => value,
        None if default_min => config.min_memory_size,
        None => 0,
    };
    Ok(DumpFilter {
        name_filter: opts.get('f').map(str::to_string),
        min_bytes,
        min_count: opts.get_u64('c')?.unwrap_or(0),
        sort: opts
            .get('s')
            .map_or(Some(ClassSort::default()), ClassSort::parse)
            .ok_or_else(|| bad_sort(&opts))?,
        limit: config.limit_io,
        with_hash: opts.has('x'),
        with_history: opts.has('h'),
        class_id: opts.get_hex('C')?.map(sherlok_runtime::ClassId),
        deleted: opts.has('d'),
    })
}

fn run_start(monitor: &Monitor, args: &[&str]) -> Result<Outcome, CommandError> {
    match args.first().copied() {
        Some("monitor") => {
            monitor.start_monitor();
            Ok(Outcome::tag(message(format!("monitoring started ({})", monitor.generation()))))
        }
        Some("trace") => {
            monitor.tracer.set_active(true);
            Ok(Outcome::tag(message("tracing started")))
        }
        Some("log") => {
            let path = monitor.config.read().unwrap().log_file.clone();
            let Some(path) = path else {
                return Err(CommandError::MissingArgument("LogFile property"));
            };
            monitor.hub.set_log_file(&path)?;
            Ok(Outcome::tag(message(format!("logging to {}", path.display()))))
        }
        Some("jarm") => {
            monitor.config.write().unwrap().profiler_mode = ProfilerMode::Jarm;
            monitor.start_monitor();
            Ok(Outcome::tag(message("jarm instrumentation started")))
        }
        _ => Err(CommandError::MissingArgument("monitor|trace|log|jarm")),
    }
}

fn run_stop(monitor: &Monitor, args: &[&str]) -> Result<Outcome, CommandError> {
    match args.first().copied() {
        Some("monitor") => {
            monitor.stop_monitor();
            Ok(Outcome::tag(message("monitoring stopped")))
        }
        Some("trace") => {
            monitor.tracer.set_active(false);
            Ok(Outcome::tag(message("tracing stopped")))
        }
        Some("log") => {
            monitor.hub.clear_log_file();
            Ok(Outcome::tag(message("logging stopped")))
        }
        Some("jarm") => {
            monitor.config.write().unwrap().profiler_mode = ProfilerMode::Profile;
            monitor.stop_monitor();
            Ok(Outcome::tag(message("jarm instrumentation stopped")))
        }
        _ => Err(CommandError::MissingArgument("monitor|trace|log|jarm")),
    }
}

fn run_lsp(monitor: &Monitor, args: &[&str]) -> Result<Outcome, CommandError> {
    let opts = ShortOpts::parse(args)?;
    if let Some(path) = opts.get('s') {
        let mut file = std::fs::File::create(path)?;
        monitor.config.read().unwrap().write_properties(&mut file)?;
        return Ok(Outcome::tag(message(format!("properties written to {path}"))));
    }
    Ok(Outcome::tag(monitor.dump_properties()))
}

fn run_trace(monitor: &Monitor, args: &[&str]) -> Result<Outcome, CommandError> {
    let action = args.first().copied().ok_or(CommandError::MissingArgument("add|remove"))?;
    let category_token = args.get(1).copied().ok_or(CommandError::MissingArgument("category"))?;
    let category = TraceCategory::parse(category_token).ok_or_else(|| CommandError::BadValue {
        key: "category".to_string(),
        value: category_token.to_string(),
    })?;

    match action {
        "add" => {
            let opts = ShortOpts::parse(&args[2..])?;
            let trace_options = TraceOptions {
                elapsed_ms: opts.get_u64('e')?,
                memory_bytes: opts.get_u64('m')?,
                format: opts.format(),
                min_depth: opts.get_u64('d')?.map(|d| d as usize),
                thread_filter: opts.get('t').map(str::to_string),
                file: opts.get('f').map(std::path::PathBuf::from),
                names: opts.positional().to_vec(),
            };
            // A format option picks the session output view.
            if let Some(format) = trace_options.format {
                monitor.hub.set_format(format);
            }
            monitor.tracer.enable(category, trace_options);
            Ok(Outcome::tag(message(format!("trace {} enabled", category.as_str()))))
        }
        "remove" => {
            let removed = monitor.tracer.disable(category);
            let info = if removed {
                format!("trace {} disabled", category.as_str())
            } else {
                format!("trace {} was not enabled", category.as_str())
            };
            Ok(Outcome::tag(message(info)))
        }
        other => Err(CommandError::BadValue { key: "trace".to_string(), value: other.to_string() }),
    }
}

fn run_set(monitor: &Monitor, args: &[&str]) -> Result<Outcome, CommandError> {
    let assignment = args.first().copied().ok_or(CommandError::MissingArgument("key=value"))?;
    let (key, value) = assignment.split_once('=').ok_or(CommandError::MissingArgument("key=value"))?;
    monitor.config.write().unwrap().set(key, value)?;
    Ok(Outcome::tag(message(format!("{key} = {value}"))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::sync::Arc;

    fn test_monitor() -> Arc<Monitor> {
        let monitor = Monitor::new(Config::default(), Arc::new(sherlok_runtime::NoopRuntime));
        monitor.hub.set_format(crate::output::OutputFormat::Tree);
        monitor
    }

    #[test]
    fn test_start_stop_monitor_via_commands() {
        let monitor = test_monitor();
        assert_eq!(execute(&monitor, "start monitor"), CommandResult::Continue);
        assert!(monitor.is_active());
        execute(&monitor, "stop monitor");
        assert!(!monitor.is_active());
    }

    #[test]
    fn test_unknown_verb_leaves_state_unchanged() {
        let monitor = test_monitor();
        let generation = monitor.generation();
        assert_eq!(execute(&monitor, "frobnicate -x"), CommandResult::Continue);
        assert_eq!(monitor.generation(), generation);
        assert!(!monitor.is_active());
    }

    #[test]
    fn test_exit_ends_session() {
        let monitor = test_monitor();
        assert_eq!(execute(&monitor, "exit"), CommandResult::Exit);
    }

    #[test]
    fn test_set_updates_property() {
        let monitor = test_monitor();
        execute(&monitor, "set MinMemorySize=4096");
        assert_eq!(monitor.config.read().unwrap().min_memory_size, 4096);
    }

    #[test]
    fn test_set_rejects_unknown_key() {
        let monitor = test_monitor();
        execute(&monitor, "set NoSuchKey=1");
        assert!(monitor.config.read().unwrap().get("NoSuchKey").is_none());
    }

    #[test]
    fn test_repeat_arms_and_disarms() {
        let monitor = test_monitor();
        execute(&monitor, "repeat 5");
        assert_eq!(monitor.repeat_secs(), 5);
        execute(&monitor, "repeat 0");
        assert_eq!(monitor.repeat_secs(), 0);
        execute(&monitor, "repeat");
        assert_eq!(monitor.repeat_secs(), DEFAULT_REPEAT_SECS);
    }

    #[test]
    fn test_repeat_is_not_remembered_as_last_command() {
        let monitor = test_monitor();
        execute(&monitor, "lss");
        execute(&monitor, "repeat 5");
        assert_eq!(monitor.last_command().as_deref(), Some("lss"));
    }

    #[test]
    fn test_trace_add_and_remove() {
        let monitor = test_monitor();
        execute(&monitor, "start trace");
        execute(&monitor, "trace add trigger -e10 -d2 -tworker");
        let options = monitor.tracer.options(TraceCategory::Trigger).unwrap();
        assert_eq!(options.elapsed_ms, Some(10));
        assert_eq!(options.min_depth, Some(2));
        assert_eq!(options.thread_filter.as_deref(), Some("worker"));
        execute(&monitor, "trace remove trigger");
        assert!(!monitor.tracer.is_enabled(TraceCategory::Trigger));
    }

    #[test]
    fn test_trace_format_option_sets_session_format() {
        let monitor = test_monitor();
        execute(&monitor, "trace add trigger -ascii");
        assert_eq!(monitor.hub.format(), crate::output::OutputFormat::Ascii);
    }

    #[test]
    fn test_chpwd() {
        let monitor = test_monitor();
        execute(&monitor, "chpwd sesame");
        assert_eq!(monitor.config.read().unwrap().password.as_deref(), Some("sesame"));
    }

    #[test]
    fn test_reset_command_bumps_generation() {
        let monitor = test_monitor();
        let before = monitor.generation();
        execute(&monitor, "reset");
        assert_eq!(monitor.generation(), before.next());
    }
}
