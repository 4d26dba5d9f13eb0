//! Dump builders behind the shell's list commands
//!
//! Every dump produces one `List` tag with uniform rows, applies the name
//! filter and minimum thresholds, sorts by the requested column, and cuts
//! at the per-output row limit. A cut is never silent: the list carries a
//! `Truncated` attribute with the number of hidden rows.

use sherlok_runtime::ClassId;

use crate::monitor::Monitor;
use crate::output::{AttrValue, Tag};
use crate::registry::classes::ClassStats;

// =============================================================================
// FILTERS AND SORT COLUMNS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClassSort {
    Name,
    #[default]
    LiveBytes,
    LiveCount,
    HeapBytes,
    HeapCount,
    TotalAlloc,
    TotalFree,
}

impl ClassSort {
    /// Column codes for `-s<col>`: n, s, c, h, H, a, f.
    pub fn parse(code: &str) -> Option<Self> {
        match code {
            "n" => Some(ClassSort::Name),
            "s" => Some(ClassSort::LiveBytes),
            "c" => Some(ClassSort::LiveCount),
            "h" => Some(ClassSort::HeapBytes),
            "H" => Some(ClassSort::HeapCount),
            "a" => Some(ClassSort::TotalAlloc),
            "f" => Some(ClassSort::TotalFree),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MethodSort {
    Name,
    #[default]
    Cpu,
    Calls,
    Elapsed,
    Contention,
}

impl MethodSort {
    /// Column codes for `-s<col>`: n, C, c, e, o.
    pub fn parse(code: &str) -> Option<Self> {
        match code {
            "n" => Some(MethodSort::Name),
            "C" => Some(MethodSort::Cpu),
            "c" => Some(MethodSort::Calls),
            "e" => Some(MethodSort::Elapsed),
            "o" => Some(MethodSort::Contention),
            _ => None,
        }
    }
}

/// Filter set for the class-shaped dumps (`lsc`, `lml`, `lhd`).
#[derive(Debug, Default)]
pub struct DumpFilter {
    /// Name prefix (`-f`).
    pub name_filter: Option<String>,
    /// Minimum live bytes (`-m`).
    pub min_bytes: u64,
    /// Minimum live count (`-c`).
    pub min_count: u64,
    pub sort: ClassSort,
    /// Row limit; 0 means unlimited.
    pub limit: usize,
    /// Include hex ids (`-x`).
    pub with_hash: bool,
    /// Append each class's history ring (`-h`).
    pub with_history: bool,
    /// Restrict to one class (`-C<hex-id>`).
    pub class_id: Option<ClassId>,
    /// List the unloaded-but-pinned classes instead (`-d`).
    pub deleted: bool,
}

impl DumpFilter {
    fn matches(&self, stats: &ClassStats) -> bool {
        if self.class_id.is_some_and(|id| stats.id != id) {
            return false;
        }
        if let Some(prefix) = &self.name_filter {
            if !stats.name.starts_with(prefix.as_str()) {
                return false;
            }
        }
        stats.live_bytes >= self.min_bytes && stats.live_count >= self.min_count
    }
}

/// Filter set for the method dump (`lsm`).
#[derive(Debug, Default)]
pub struct MethodFilter {
    pub name_filter: Option<String>,
    pub min_calls: u64,
    pub min_cpu_micros: u64,
    pub sort: MethodSort,
    pub limit: usize,
    pub with_signature: bool,
    pub with_hash: bool,
    pub class_id: Option<ClassId>,
}

fn apply_limit(root: &mut Tag, total: usize, limit: usize) -> usize {
    if limit > 0 && total > limit {
        root.put("Truncated", total - limit);
        limit
    } else {
        total
    }
}

// =============================================================================
// DUMPS
// =============================================================================

impl Monitor {
    /// `lsc` (and the class section of the out-of-memory cascade).
    #[must_use]
    pub fn dump_classes(&self, filter: &DumpFilter) -> Tag {
        let mut root = Tag::new("List");
        root.put("Type", "Class");
        if filter.deleted {
            root.put("Detail", "Deleted");
        }
        self.fill_classes(&mut root, filter);

        // A single-class dump gets the detail view: its methods, and its
        // history ring when the row filter did not already add it.
        if let Some(id) = filter.class_id {
            if let Some(class) = self.find_class_any(id) {
                let methods = root.child("List");
                methods.put("Detail", "Methods").put("ID", AttrValue::Hex(id.0));
                for method in class.methods() {
                    method.dump(methods, true, filter.with_hash);
                }
                if !filter.with_history {
                    let history = root.child("List");
                    history.put("Detail", "History").put("ID", AttrValue::Hex(id.0));
                    class.dump_history(history);
                }
            }
        }
        root
    }

    pub(crate) fn dump_classes_into(&self, parent: &mut Tag, filter: &DumpFilter) {
        let list = parent.child("List");
        list.put("Type", "Class");
        self.fill_classes(list, filter);
    }

    fn fill_classes(&self, root: &mut Tag, filter: &DumpFilter) {
        let registry = self.registry.read().unwrap();
        let source: Vec<_> = if filter.deleted {
            registry.deleted_classes().to_vec()
        } else {
            registry.classes().cloned().collect()
        };

        let mut rows: Vec<(ClassStats, std::sync::Arc<crate::registry::classes::ClassRecord>)> =
            source
                .into_iter()
                .filter(|class| class.is_visible() || filter.deleted)
                .map(|class| (class.stats(), class))
                .filter(|(stats, _)| filter.matches(stats))
                .collect();
        sort_class_stats_pairs(&mut rows, filter.sort);

        let shown = apply_limit(root, rows.len(), filter.limit);
        for (_, class) in &rows[..shown] {
            class.dump(root, filter.with_hash);
        }
        if filter.with_history {
            for (stats, class) in &rows[..shown] {
                let history = root.child("List");
                history.put("Detail", "History").put("ID", AttrValue::Hex(stats.id.0));
                class.dump_history(history);
            }
        }
    }

    /// `lml`: classes whose growth alert fired.
    #[must_use]
    pub fn dump_leaks(&self, filter: &DumpFilter) -> Tag {
        let mut root = Tag::new("List");
        root.put("Type", "Leak");
        let registry = self.registry.read().unwrap();
        let mut rows: Vec<_> = registry
            .classes()
            .filter(|class| class.is_leak())
            .map(|class| (class.stats(), class.clone()))
            .filter(|(stats, _)| filter.matches(stats))
            .collect();
        drop(registry);
        sort_class_stats_pairs(&mut rows, filter.sort);

        let shown = apply_limit(&mut root, rows.len(), filter.limit);
        for (_, class) in &rows[..shown] {
            class.dump(&mut root, filter.with_hash);
        }
        if filter.with_history {
            for (stats, class) in &rows[..shown] {
                let history = root.child("List");
                history.put("Detail", "History").put("ID", AttrValue::Hex(stats.id.0));
                class.dump_history(history);
            }
        }
        root
    }

    /// `lsm`.
    #[must_use]
    pub fn dump_methods(&self, filter: &MethodFilter) -> Tag {
        let mut root = Tag::new("List");
        root.put("Type", "Method");

        let registry = self.registry.read().unwrap();
        let mut methods: Vec<_> = registry
            .methods()
            .filter(|m| {
                if filter.class_id.is_some_and(|id| m.class_id() != id) {
                    return false;
                }
                if let Some(prefix) = &filter.name_filter {
                    if !m.qualified_name().starts_with(prefix.as_str()) {
                        return false;
                    }
                }
                m.nr_calls() >= filter.min_calls && m.cpu_sum().0 >= filter.min_cpu_micros
            })
            .cloned()
            .collect();
        drop(registry);

        match filter.sort {
            MethodSort::Name => methods.sort_by_key(|m| m.qualified_name()),
            MethodSort::Cpu => methods.sort_by(|a, b| b.cpu_sum().cmp(&a.cpu_sum())),
            MethodSort::Calls => methods.sort_by(|a, b| b.nr_calls().cmp(&a.nr_calls())),
            MethodSort::Elapsed => methods.sort_by(|a, b| b.elapsed_sum().cmp(&a.elapsed_sum())),
            MethodSort::Contention => {
                methods.sort_by(|a, b| b.contention_sum().cmp(&a.contention_sum()));
            }
        }

        let shown = apply_limit(&mut root, methods.len(), filter.limit);
        for method in &methods[..shown] {
            method.dump(&mut root, filter.with_signature, filter.with_hash);
        }
        root
    }

    /// `dt`.
    #[must_use]
    pub fn dump_threads(&self, with_stacks: bool) -> Tag {
        let mut root = Tag::new("List");
        root.put("Type", "Thread");
        self.fill_threads(&mut root, with_stacks);
        root
    }

    pub(crate) fn dump_threads_into(&self, parent: &mut Tag) {
        let list = parent.child("List");
        list.put("Type", "Thread");
        self.fill_threads(list, false);
    }

    fn fill_threads(&self, root: &mut Tag, with_stacks: bool) {
        let threads = self.threads.read().unwrap();
        let records: Vec<_> = threads.values().cloned().collect();
        drop(threads);

        for record in &records {
            let stack = record.stack();
            let row = root.child("Thread");
            row.put("ThreadId", AttrValue::Hex(record.id().0))
                .put("Info", record.name())
                .put("Event", record.state().as_str())
                .put("CpuTime", AttrValue::Micros(record.cpu_used().0))
                .put("Depth", stack.depth());
        }

        if !with_stacks {
            return;
        }
        for record in &records {
            let frames_tag = root.child("Traces");
            frames_tag
                .put("Type", "Callstack")
                .put("ThreadId", AttrValue::Hex(record.id().0));
            {
                let stack = record.stack();
                for frame in stack.frames() {
                    crate::tracer::frame_trace(frames_tag, frame, record.id(), None);
                }
            }
            // Mirror the runtime's native view without touching the
            // profiler stack.
            let native = crate::callstack::VirtualStack::from_native(
                self.host.native_frames(record.id()),
            );
            for (depth, frame) in native.iter() {
                let row = frames_tag.child("Trace");
                row.put("ClassName", frame.class_name.as_str())
                    .put("MethodName", frame.method_name.as_str())
                    .put("Depth", depth)
                    .put("Event", "Native");
                if let Some(line) = frame.line {
                    row.put("Info", i64::from(line));
                }
            }
        }
    }

    /// `lhd`: sweep the heap, then list per-class heap figures.
    #[must_use]
    pub fn dump_heap(&self, filter: &DumpFilter) -> Tag {
        let totals = self.heap_sweep(filter.class_id);

        let mut root = Tag::new("List");
        root.put("Type", "Heap")
            .put("Size", totals.bytes)
            .put("Count", totals.count)
            .put("Info", totals.objects_seen);

        let registry = self.registry.read().unwrap();
        let mut rows: Vec<_> = registry
            .classes()
            .map(|class| (class.stats(), class.clone()))
            .filter(|(stats, _)| stats.heap_count > 0 && filter.matches(stats))
            .collect();
        drop(registry);
        let mut sort = filter.sort;
        if sort == ClassSort::LiveBytes {
            sort = ClassSort::HeapBytes;
        }
        sort_class_stats_pairs(&mut rows, sort);

        let shown = apply_limit(&mut root, rows.len(), filter.limit);
        for (_, class) in &rows[..shown] {
            class.dump(&mut root, filter.with_hash);
        }
        root
    }

    /// `lss`.
    #[must_use]
    pub fn dump_statistic(&self) -> Tag {
        let mut root = Tag::new("List");
        root.put("Type", "Statistic");
        self.fill_statistic(&mut root);
        root
    }

    pub(crate) fn dump_statistic_into(&self, parent: &mut Tag) {
        let list = parent.child("List");
        list.put("Type", "Statistic");
        self.fill_statistic(list);
    }

    fn fill_statistic(&self, root: &mut Tag) {
        use std::sync::atomic::Ordering;

        let (classes, methods, exceptions) = {
            let registry = self.registry.read().unwrap();
            (registry.class_count(), registry.method_count(), registry.exceptions().count())
        };
        let threads = self.threads.read().unwrap().len();
        let (objects, allocated, freed, alloc_count, free_count) = {
            let memory = self.memory.lock().unwrap();
            (
                memory.objects.len(),
                memory.total_allocated,
                memory.total_freed,
                memory.allocation_count,
                memory.free_count,
            )
        };
        let usage = self.host.heap_usage();

        let mut put = |name: &'static str, value: AttrValue| {
            root.child("Statistic").put("Name", name).put("Value", value);
        };
        put("Classes", AttrValue::Int(classes as i64));
        put("Methods", AttrValue::Int(methods as i64));
        put("Threads", AttrValue::Int(threads as i64));
        put("Exceptions", AttrValue::Int(exceptions as i64));
        put("LiveObjects", AttrValue::Int(objects as i64));
        put("AllocatedBytes", AttrValue::Int(allocated as i64));
        put("FreedBytes", AttrValue::Int(freed as i64));
        put("Allocations", AttrValue::Int(alloc_count as i64));
        put("Frees", AttrValue::Int(free_count as i64));
        put("Events", AttrValue::Int(self.stats.events.load(Ordering::Relaxed) as i64));
        put("MethodCalls", AttrValue::Int(self.stats.method_calls.load(Ordering::Relaxed) as i64));
        put("Traces", AttrValue::Int(self.stats.traces_emitted.load(Ordering::Relaxed) as i64));
        put("Generation", AttrValue::Int(self.generation().0 as i64));
        put("GcCount", AttrValue::Int(self.gc_index().0 as i64));
        put("GcLast", AttrValue::Micros(self.last_gc_duration_micros()));
        put("Uptime", AttrValue::Int(self.uptime_ms() as i64));
        put("HeapUsed", AttrValue::Int(usage.used as i64));
        put("HeapCommitted", AttrValue::Int(usage.committed as i64));
    }

    /// `dex`.
    #[must_use]
    pub fn dump_exceptions(&self) -> Tag {
        let mut root = Tag::new("List");
        root.put("Type", "Exceptions");
        let registry = self.registry.read().unwrap();
        let mut rows: Vec<(String, u64)> =
            registry.exceptions().map(|e| (e.name.clone(), e.count)).collect();
        drop(registry);
        rows.sort_by(|a, b| b.1.cmp(&a.1));
        for (name, count) in rows {
            root.child("Exception").put("ClassName", name).put("NrCalls", count);
        }
        root
    }

    /// `lsp`.
    #[must_use]
    pub fn dump_properties(&self) -> Tag {
        let mut root = Tag::new("List");
        root.put("Type", "Properties");
        for (key, value) in self.config.read().unwrap().entries() {
            root.child("Property").put("Name", key).put("Value", value);
        }
        root
    }

    /// `lcf`.
    #[must_use]
    pub fn dump_config_files(&self) -> Tag {
        let mut root = Tag::new("List");
        root.put("Type", "File");
        let config = self.config.read().unwrap();
        if let Some(path) = &config.source_file {
            root.child("File").put("Name", path.display().to_string()).put("Info", "properties");
        }
        if let Some(options) = &config.startup_options {
            root.child("File").put("Name", options.as_str()).put("Info", "startup-options");
        }
        if let Some(path) = &config.log_file {
            root.child("File").put("Name", path.display().to_string()).put("Info", "log");
        }
        root
    }

    /// The deferred GC report a finished collection posts. Skipped entirely
    /// while the gc trace category is off.
    pub fn gc_report(&self) {
        let Some(options) = self.tracer.options(crate::tracer::TraceCategory::Gc) else {
            return;
        };
        let usage = self.host.heap_usage();
        let mut tag = Tag::new("Trace");
        tag.put("Type", "GCV9")
            .put("Event", "GC")
            .put("ID", self.gc_index().0)
            .put("Used", usage.used)
            .put("Committed", usage.committed)
            .put("Init", usage.init)
            .put("Elapsed", AttrValue::Micros(self.last_gc_duration_micros()))
            .put("Timestamp", self.clock.timestamp_ms());
        self.emit_with(&options, &tag);
    }

    /// Exit dumps for `DumpOnExit`.
    pub(crate) fn dump_on_exit(&self) {
        let mut root = Tag::new("Traces");
        root.put("Type", "Message").put("Info", "exit dump");
        self.dump_statistic_into(&mut root);
        self.dump_classes_into(&mut root, &DumpFilter::default());
        self.emit(&root);
    }
}

fn sort_class_stats_pairs(
    rows: &mut [(ClassStats, std::sync::Arc<crate::registry::classes::ClassRecord>)],
    sort: ClassSort,
) {
    match sort {
        ClassSort::Name => rows.sort_by(|a, b| a.0.name.cmp(&b.0.name)),
        ClassSort::LiveBytes => rows.sort_by(|a, b| b.0.live_bytes.cmp(&a.0.live_bytes)),
        ClassSort::LiveCount => rows.sort_by(|a, b| b.0.live_count.cmp(&a.0.live_count)),
        ClassSort::HeapBytes => rows.sort_by(|a, b| b.0.heap_bytes.cmp(&a.0.heap_bytes)),
        ClassSort::HeapCount => rows.sort_by(|a, b| b.0.heap_count.cmp(&a.0.heap_count)),
        ClassSort::TotalAlloc => rows.sort_by(|a, b| b.0.total_alloc.cmp(&a.0.total_alloc)),
        ClassSort::TotalFree => rows.sort_by(|a, b| b.0.total_freed.cmp(&a.0.total_freed)),
    }
}
