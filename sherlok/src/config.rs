//! Monitor configuration
//!
//! One flat property set, fed from two sources: the agent startup string
//! (semicolon separated `key=value` pairs) and a properties file (`key =
//! value` lines, `#` comments). The shell's `set` verb updates single
//! properties at run time, and `lsp -s<file>` writes the current set back
//! out; re-parsing a written file reproduces the same set byte for byte.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::domain::CommandError;

/// Canonical key order for listing and for the properties writer.
pub const CONFIG_KEYS: &[&str] = &[
    "Port",
    "Password",
    "ProfilerMode",
    "MonitorOn",
    "MonitorMemoryOn",
    "MonitorScope",
    "MonitorPackage",
    "DontMonitorPackage",
    "MonitorVisible",
    "ExecutionTimer",
    "MonitorTimer",
    "MonitorMethodEntry",
    "MonitorDebugEntry",
    "TriggerMethod",
    "Tracer",
    "LogFile",
    "DumpOnExit",
    "Limit.IO",
    "MinMemorySize",
    "HistoryAlert",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProfilerMode {
    #[default]
    Profile,
    Trigger,
    Jarm,
    Ats,
}

impl ProfilerMode {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "Profile" => Some(ProfilerMode::Profile),
            "Trigger" => Some(ProfilerMode::Trigger),
            "Jarm" => Some(ProfilerMode::Jarm),
            "Ats" => Some(ProfilerMode::Ats),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            ProfilerMode::Profile => "Profile",
            ProfilerMode::Trigger => "Trigger",
            ProfilerMode::Jarm => "Jarm",
            ProfilerMode::Ats => "Ats",
        }
    }
}

/// Which clock feeds per-call timing: the thread CPU clock or the
/// high-precision wall counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionTimer {
    #[default]
    Method,
    Hpc,
}

impl ExecutionTimer {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "Method" => Some(ExecutionTimer::Method),
            "HPC" => Some(ExecutionTimer::Hpc),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            ExecutionTimer::Method => "Method",
            ExecutionTimer::Hpc => "HPC",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub password: Option<String>,
    pub profiler_mode: ProfilerMode,
    pub monitor_on: bool,
    pub monitor_memory_on: bool,
    /// Package prefixes defining the profiling scope; empty means everything.
    pub monitor_scope: Vec<String>,
    /// Additional packages pulled into the scope.
    pub monitor_package: Vec<String>,
    /// Package prefixes excluded from monitoring.
    pub dont_monitor_package: Vec<String>,
    /// Show classes outside the scope in dumps.
    pub monitor_visible: bool,
    pub execution_timer: ExecutionTimer,
    /// Global per-method timer.
    pub monitor_timer: bool,
    /// Patterns (class-name prefixes of `Class.method`) timed even when the
    /// global timer is off.
    pub monitor_method_entry: Vec<String>,
    /// Fully qualified `Class.method` names with enter/exit tracing and
    /// parameter dumps attached.
    pub monitor_debug_entry: Vec<String>,
    /// `Class.method` or `Class.method(signature)` arming the trigger tracer.
    pub trigger_method: Option<String>,
    /// Trace categories enabled at startup, plus an optional format token
    /// (`ascii`/`tree`/`xml`) picking the session output view.
    pub tracer: Vec<String>,
    pub log_file: Option<PathBuf>,
    pub dump_on_exit: bool,
    /// Row limit per dump output.
    pub limit_io: usize,
    /// Minimum live-byte figure for dumps and the growth alert.
    pub min_memory_size: u64,
    /// Growth-alert factor in percent; 0 disables the alert.
    pub history_alert: u64,

    /// Where the file-sourced part of this config came from, for `lcf`.
    pub source_file: Option<PathBuf>,
    /// The raw agent option string, for `lcf`.
    pub startup_options: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 2457,
            password: None,
            profiler_mode: ProfilerMode::Profile,
            monitor_on: false,
            monitor_memory_on: true,
            monitor_scope: Vec::new(),
            monitor_package: Vec::new(),
            dont_monitor_package: Vec::new(),
            monitor_visible: true,
            execution_timer: ExecutionTimer::Method,
            monitor_timer: true,
            monitor_method_entry: Vec::new(),
            monitor_debug_entry: Vec::new(),
            trigger_method: None,
            tracer: Vec::new(),
            log_file: None,
            dump_on_exit: false,
            limit_io: 1_000,
            min_memory_size: 1_024,
            history_alert: 0,
            source_file: None,
            startup_options: None,
        }
    }
}

impl Config {
    /// Update one property. Unknown keys and unparsable values leave the
    /// config unchanged.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), CommandError> {
        let bad = |value: &str| CommandError::BadValue { key: key.to_string(), value: value.to_string() };
        match key {
            "Port" => self.port = value.parse().map_err(|_| bad(value))?,
            "Password" => self.password = non_empty(value),
            "ProfilerMode" => self.profiler_mode = ProfilerMode::parse(value).ok_or_else(|| bad(value))?,
            "MonitorOn" => self.monitor_on = parse_bool(value).ok_or_else(|| bad(value))?,
            "MonitorMemoryOn" => self.monitor_memory_on = parse_bool(value).ok_or_else(|| bad(value))?,
            "MonitorScope" => self.monitor_scope = parse_list(value),
            "MonitorPackage" => self.monitor_package = parse_list(value),
            "DontMonitorPackage" => self.dont_monitor_package = parse_list(value),
            "MonitorVisible" => self.monitor_visible = parse_bool(value).ok_or_else(|| bad(value))?,
            "ExecutionTimer" => self.execution_timer = ExecutionTimer::parse(value).ok_or_else(|| bad(value))?,
            "MonitorTimer" => self.monitor_timer = parse_bool(value).ok_or_else(|| bad(value))?,
            "MonitorMethodEntry" => self.monitor_method_entry = parse_list(value),
            "MonitorDebugEntry" => self.monitor_debug_entry = parse_list(value),
            "TriggerMethod" => self.trigger_method = non_empty(value),
            "Tracer" => self.tracer = parse_list(value),
            "LogFile" => self.log_file = non_empty(value).map(PathBuf::from),
            "DumpOnExit" => self.dump_on_exit = parse_bool(value).ok_or_else(|| bad(value))?,
            "Limit.IO" => self.limit_io = value.parse().map_err(|_| bad(value))?,
            "MinMemorySize" => self.min_memory_size = value.parse().map_err(|_| bad(value))?,
            "HistoryAlert" => self.history_alert = value.parse().map_err(|_| bad(value))?,
            _ => return Err(CommandError::UnknownProperty(key.to_string())),
        }
        Ok(())
    }

    /// Apply a semicolon-separated agent option string.
    pub fn apply_options(&mut self, options: &str) -> Result<(), CommandError> {
        for pair in options.split(';') {
            let pair = pair.trim();
            if pair.is_empty() {
                continue;
            }
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| CommandError::BadValue { key: pair.to_string(), value: String::new() })?;
            self.set(key.trim(), value.trim())?;
        }
        self.startup_options = Some(options.to_string());
        Ok(())
    }

    /// Load a properties file on top of the current values. Lines are
    /// `key = value`; blank lines and `#` comments are skipped. Parse errors
    /// on individual lines are reported, earlier lines stay applied.
    pub fn load_properties(&mut self, path: &Path) -> Result<(), CommandError> {
        let text = fs::read_to_string(path)?;
        for (number, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(CommandError::BadValue {
                    key: format!("{}:{}", path.display(), number + 1),
                    value: line.to_string(),
                });
            };
            self.set(key.trim(), value.trim())?;
        }
        self.source_file = Some(path.to_path_buf());
        Ok(())
    }

    /// Current value of one key, rendered the way the writer prints it.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        let value = match key {
            "Port" => self.port.to_string(),
            "Password" => self.password.clone().unwrap_or_default(),
            "ProfilerMode" => self.profiler_mode.as_str().to_string(),
            "MonitorOn" => render_bool(self.monitor_on),
            "MonitorMemoryOn" => render_bool(self.monitor_memory_on),
            "MonitorScope" => self.monitor_scope.join(","),
            "MonitorPackage" => self.monitor_package.join(","),
            "DontMonitorPackage" => self.dont_monitor_package.join(","),
            "MonitorVisible" => render_bool(self.monitor_visible),
            "ExecutionTimer" => self.execution_timer.as_str().to_string(),
            "MonitorTimer" => render_bool(self.monitor_timer),
            "MonitorMethodEntry" => self.monitor_method_entry.join(","),
            "MonitorDebugEntry" => self.monitor_debug_entry.join(","),
            "TriggerMethod" => self.trigger_method.clone().unwrap_or_default(),
            "Tracer" => self.tracer.join(","),
            "LogFile" => self.log_file.as_ref().map(|p| p.display().to_string()).unwrap_or_default(),
            "DumpOnExit" => render_bool(self.dump_on_exit),
            "Limit.IO" => self.limit_io.to_string(),
            "MinMemorySize" => self.min_memory_size.to_string(),
            "HistoryAlert" => self.history_alert.to_string(),
            _ => return None,
        };
        Some(value)
    }

    /// All keys in canonical order with their rendered values.
    #[must_use]
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        CONFIG_KEYS.iter().map(|key| (*key, self.get(key).unwrap())).collect()
    }

    /// Write the full property set. Output parses back to an identical set.
    pub fn write_properties(&self, out: &mut impl Write) -> std::io::Result<()> {
        for (key, value) in self.entries() {
            writeln!(out, "{key} = {value}")?;
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Classification predicates
    // -------------------------------------------------------------------------

    /// A class is in scope when the scope lists are empty or one of them
    /// holds a prefix of its name, and no don't-monitor prefix matches.
    #[must_use]
    pub fn in_scope(&self, class_name: &str) -> bool {
        if self.dont_monitor_package.iter().any(|p| class_name.starts_with(p.as_str())) {
            return false;
        }
        if self.monitor_scope.is_empty() && self.monitor_package.is_empty() {
            return true;
        }
        self.monitor_scope
            .iter()
            .chain(self.monitor_package.iter())
            .any(|p| class_name.starts_with(p.as_str()))
    }

    /// A method is timed when the global timer is on or its qualified name
    /// matches a `MonitorMethodEntry` prefix.
    #[must_use]
    pub fn is_timed(&self, qualified: &str) -> bool {
        self.monitor_timer || self.monitor_method_entry.iter().any(|p| qualified.starts_with(p.as_str()))
    }

    /// A method carries enter/exit tracing and parameter dumps when its
    /// qualified name matches a `MonitorDebugEntry` entry.
    #[must_use]
    pub fn is_debug(&self, qualified: &str) -> bool {
        self.monitor_debug_entry.iter().any(|p| qualified.starts_with(p.as_str()))
    }

    /// Match `Class.method` (optionally with signature) against the
    /// configured trigger.
    #[must_use]
    pub fn is_trigger(&self, qualified: &str, signature: &str) -> bool {
        match &self.trigger_method {
            None => false,
            Some(pattern) => match pattern.split_once('(') {
                None => pattern == qualified,
                Some((name, sig)) => name == qualified && format!("({sig}") == signature,
            },
        }
    }

    /// Session output format from the `Tracer` list, when one of the format
    /// tokens is present.
    #[must_use]
    pub fn output_format(&self) -> Option<crate::output::OutputFormat> {
        self.tracer.iter().find_map(|t| crate::output::OutputFormat::parse(t))
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "on" | "true" | "yes" | "1" => Some(true),
        "off" | "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

fn render_bool(value: bool) -> String {
    if value { "on".to_string() } else { "off".to_string() }
}

fn parse_list(value: &str) -> Vec<String> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect()
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.port, 2457);
        assert!(!config.monitor_on);
        assert!(config.monitor_memory_on);
        assert_eq!(config.limit_io, 1_000);
    }

    #[test]
    fn test_apply_option_string() {
        let mut config = Config::default();
        config
            .apply_options("Port=9000;MonitorOn=on;MonitorScope=com/acme,org/demo;HistoryAlert=50")
            .unwrap();
        assert_eq!(config.port, 9000);
        assert!(config.monitor_on);
        assert_eq!(config.monitor_scope, vec!["com/acme", "org/demo"]);
        assert_eq!(config.history_alert, 50);
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let mut config = Config::default();
        assert!(matches!(
            config.set("NoSuchKey", "1"),
            Err(CommandError::UnknownProperty(_))
        ));
    }

    #[test]
    fn test_bad_value_is_rejected() {
        let mut config = Config::default();
        assert!(config.set("Port", "not-a-port").is_err());
        assert!(config.set("ProfilerMode", "Sideways").is_err());
        assert_eq!(config.port, 2457);
    }

    #[test]
    fn test_scope_predicates() {
        let mut config = Config::default();
        config.set("MonitorScope", "com/acme").unwrap();
        config.set("DontMonitorPackage", "com/acme/generated").unwrap();
        assert!(config.in_scope("com/acme/Shop"));
        assert!(!config.in_scope("com/acme/generated/Stub"));
        assert!(!config.in_scope("org/other/Thing"));
    }

    #[test]
    fn test_empty_scope_covers_everything() {
        let config = Config::default();
        assert!(config.in_scope("anything/at/All"));
    }

    #[test]
    fn test_trigger_matching() {
        let mut config = Config::default();
        config.set("TriggerMethod", "com/acme/Shop.checkout").unwrap();
        assert!(config.is_trigger("com/acme/Shop.checkout", "()V"));
        assert!(!config.is_trigger("com/acme/Shop.browse", "()V"));

        config.set("TriggerMethod", "com/acme/Shop.checkout(I)V").unwrap();
        assert!(config.is_trigger("com/acme/Shop.checkout", "(I)V"));
        assert!(!config.is_trigger("com/acme/Shop.checkout", "()V"));
    }

    #[test]
    fn test_properties_round_trip() {
        let mut config = Config::default();
        config
            .apply_options("Port=7070;Password=secret;MonitorScope=com/acme;Tracer=method,xml;MonitorTimer=off")
            .unwrap();

        let mut first = Vec::new();
        config.write_properties(&mut first).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sherlok.properties");
        std::fs::write(&path, &first).unwrap();

        let mut reloaded = Config::default();
        reloaded.load_properties(&path).unwrap();
        let mut second = Vec::new();
        reloaded.write_properties(&mut second).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_output_format_from_tracer_list() {
        let mut config = Config::default();
        config.set("Tracer", "method,ascii").unwrap();
        assert_eq!(config.output_format(), Some(crate::output::OutputFormat::Ascii));
        config.set("Tracer", "method").unwrap();
        assert_eq!(config.output_format(), None);
    }
}
