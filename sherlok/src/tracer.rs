//! Trace policy: which events become output, and their tag shape
//!
//! The tracer owns the per-category toggles with their option bags and
//! decides on the hot path whether an event is worth formatting. It also
//! builds the tag trees for method/class/stack traces so the dispatcher
//! and the dump commands emit identical shapes.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use sherlok_runtime::ThreadId;

use crate::callstack::CallFrame;
use crate::domain::Micros;
use crate::output::{AttrValue, OutputFormat, Tag};

/// The host's out-of-memory class; always traced, and its throw triggers
/// the full dump cascade.
pub const OUT_OF_MEMORY_CLASS: &str = "java/lang/OutOfMemoryError";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraceCategory {
    Method,
    Parameter,
    Trigger,
    Class,
    Gc,
    Contention,
    Stack,
    Thread,
    Exception,
}

impl TraceCategory {
    #[must_use]
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "method" => Some(TraceCategory::Method),
            "parameter" => Some(TraceCategory::Parameter),
            "trigger" => Some(TraceCategory::Trigger),
            "class" => Some(TraceCategory::Class),
            "gc" => Some(TraceCategory::Gc),
            "contention" => Some(TraceCategory::Contention),
            "stack" => Some(TraceCategory::Stack),
            "thread" => Some(TraceCategory::Thread),
            "exception" => Some(TraceCategory::Exception),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TraceCategory::Method => "method",
            TraceCategory::Parameter => "parameter",
            TraceCategory::Trigger => "trigger",
            TraceCategory::Class => "class",
            TraceCategory::Gc => "gc",
            TraceCategory::Contention => "contention",
            TraceCategory::Stack => "stack",
            TraceCategory::Thread => "thread",
            TraceCategory::Exception => "exception",
        }
    }

    pub const ALL: [TraceCategory; 9] = [
        TraceCategory::Method,
        TraceCategory::Parameter,
        TraceCategory::Trigger,
        TraceCategory::Class,
        TraceCategory::Gc,
        TraceCategory::Contention,
        TraceCategory::Stack,
        TraceCategory::Thread,
        TraceCategory::Exception,
    ];
}

/// Options attached to one category toggle.
#[derive(Debug, Clone, Default)]
pub struct TraceOptions {
    /// Elapsed threshold in milliseconds (`-e`).
    pub elapsed_ms: Option<u64>,
    /// Memory-delta threshold in bytes (`-m`).
    pub memory_bytes: Option<u64>,
    /// Session format requested with the toggle (`-ascii`/`-tree`/`-xml`).
    pub format: Option<OutputFormat>,
    /// Minimum stack depth for trigger emission (`-d`).
    pub min_depth: Option<usize>,
    /// Restrict to threads whose name starts with this (`-t`).
    pub thread_filter: Option<String>,
    /// Redirect this category's events to a file (`-f`).
    pub file: Option<PathBuf>,
    /// Exception class names to trace (positional arguments).
    pub names: Vec<String>,
}

#[derive(Default)]
struct TracerState {
    categories: HashMap<TraceCategory, TraceOptions>,
    active: bool,
}

/// Reason a trigger emission fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerReason {
    Elapsed,
    Memory,
}

impl TriggerReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TriggerReason::Elapsed => "Elapsed",
            TriggerReason::Memory => "Memory",
        }
    }
}

pub struct Tracer {
    state: RwLock<TracerState>,
}

impl Default for Tracer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tracer {
    #[must_use]
    pub fn new() -> Self {
        Tracer { state: RwLock::new(TracerState::default()) }
    }

    /// Master switch (`start trace` / `stop trace`). Toggles stay put.
    pub fn set_active(&self, active: bool) {
        self.state.write().unwrap().active = active;
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state.read().unwrap().active
    }

    pub fn enable(&self, category: TraceCategory, options: TraceOptions) {
        self.state.write().unwrap().categories.insert(category, options);
    }

    /// Returns true when the category was present.
    pub fn disable(&self, category: TraceCategory) -> bool {
        self.state.write().unwrap().categories.remove(&category).is_some()
    }

    #[must_use]
    pub fn is_enabled(&self, category: TraceCategory) -> bool {
        let state = self.state.read().unwrap();
        state.active && state.categories.contains_key(&category)
    }

    #[must_use]
    pub fn options(&self, category: TraceCategory) -> Option<TraceOptions> {
        let state = self.state.read().unwrap();
        if !state.active {
            return None;
        }
        state.categories.get(&category).cloned()
    }

    /// Enabled categories with options, for the config dump.
    #[must_use]
    pub fn enabled_categories(&self) -> Vec<(TraceCategory, TraceOptions)> {
        let state = self.state.read().unwrap();
        TraceCategory::ALL
            .iter()
            .filter_map(|cat| state.categories.get(cat).map(|opts| (*cat, opts.clone())))
            .collect()
    }

    // -------------------------------------------------------------------------
    // Hot-path decisions
    // -------------------------------------------------------------------------

    /// Contention tracing: fires when the wait crossed the threshold.
    #[must_use]
    pub fn trace_contention(&self, wait: Micros) -> Option<TraceOptions> {
        let options = self.options(TraceCategory::Contention)?;
        let threshold = options.elapsed_ms.unwrap_or(0);
        if wait.as_millis() >= threshold {
            Some(options)
        } else {
            None
        }
    }

    /// Trigger-window evaluation on a monitored exit.
    ///
    /// Fires when elapsed or memory-delta crosses its configured threshold;
    /// an unconfigured threshold never fires, and a thread filter or
    /// minimum depth can veto the emission.
    #[must_use]
    pub fn trace_trigger(
        &self,
        thread_name: &str,
        depth: usize,
        elapsed: Micros,
        memory_delta: u64,
    ) -> Option<(TriggerReason, u64, TraceOptions)> {
        let options = self.options(TraceCategory::Trigger)?;
        if let Some(filter) = &options.thread_filter {
            if !thread_name.starts_with(filter.as_str()) {
                return None;
            }
        }
        if depth < options.min_depth.unwrap_or(0) {
            return None;
        }
        if let Some(threshold) = options.elapsed_ms {
            if elapsed.as_millis() >= threshold {
                return Some((TriggerReason::Elapsed, elapsed.as_millis(), options));
            }
        }
        if let Some(threshold) = options.memory_bytes {
            if memory_delta >= threshold {
                return Some((TriggerReason::Memory, memory_delta, options));
            }
        }
        None
    }

    /// Exception tracing: configured names match by prefix; out-of-memory
    /// is always traced.
    #[must_use]
    pub fn trace_exception(&self, class_name: &str) -> bool {
        if class_name == OUT_OF_MEMORY_CLASS {
            return true;
        }
        match self.options(TraceCategory::Exception) {
            None => false,
            Some(options) => {
                options.names.is_empty()
                    || options.names.iter().any(|n| class_name.starts_with(n.as_str()))
            }
        }
    }

    pub fn reset(&self) {
        let mut state = self.state.write().unwrap();
        state.categories.clear();
        state.active = false;
    }
}

// =============================================================================
// TAG BUILDERS
// =============================================================================

/// `Trace`/`Type=Method` for enter/exit tracing of debug-enabled methods.
#[must_use]
pub fn method_trace(
    method: &crate::registry::methods::MethodRecord,
    thread: ThreadId,
    timestamp_ms: u64,
    event: &'static str,
    depth: usize,
    info: String,
) -> Tag {
    let mut tag = Tag::new("Trace");
    tag.put("Type", "Method")
        .put("MethodName", method.qualified_name())
        .put("ThreadId", AttrValue::Hex(thread.0))
        .put("Event", event)
        .put("Depth", depth)
        .put("Timestamp", timestamp_ms)
        .put("Info", info);
    tag
}

/// `Trace`/`Type=Class` for class-prepare tracing.
#[must_use]
pub fn class_trace(class_name: &str, class_id: u64, timestamp_ms: u64) -> Tag {
    let mut tag = Tag::new("Trace");
    tag.put("Type", "Class")
        .put("ClassName", class_name)
        .put("ID", AttrValue::Hex(class_id))
        .put("Event", "Prepare")
        .put("Timestamp", timestamp_ms);
    tag
}

/// One frame row of a stack emission. The final frame of a window carries
/// the event kind (`Trigger`, `Contention`, `OutOfMemory`) and its info
/// value; the rest carry only their own figures.
pub fn frame_trace(
    parent: &mut Tag,
    frame: &CallFrame,
    thread: ThreadId,
    terminal: Option<(&'static str, String)>,
) {
    let row = parent.child("Trace");
    row.put("MethodName", frame.method.qualified_name())
        .put("ClassName", frame.method.class_name())
        .put("Depth", frame.depth)
        .put("CpuTime", AttrValue::Micros(frame.method.cpu_sum().0))
        .put("NrCalls", frame.method.nr_calls())
        .put("ThreadId", AttrValue::Hex(thread.0));
    if let Some((event, info)) = terminal {
        row.put("Event", event).put("Info", info);
    }
}
