//! Event dispatch: the hot path from host callbacks into the registries
//!
//! Every callback resolves the calling thread's record first (O(1) through
//! the thread-local slot), honors the `processing_jni` reentrancy guard,
//! and then mutates records with the minimum locking: registry maps are
//! read-locked, per-record counters are atomics owned by the calling
//! thread, and the per-thread stacks are uncontended mutexes.
//!
//! Failures never propagate to the host. Unknown methods contribute no
//! frames (keeping exits balanced), stale frees are dropped by generation,
//! and unexpected contention events are treated as lost.

use std::sync::Arc;

use log::debug;

use sherlok_runtime::{ClassId, ClassInfo, ContentionEvent, MethodId, ObjectTag, ThreadId, ThreadInfo};

use crate::domain::{Micros, MonitorError};
use crate::monitor::{Deferred, Monitor, ObjectRecord};
use crate::output::{AttrValue, Tag};
use crate::registry::classes::ClassRecord;
use crate::registry::methods::MethodRecord;
use crate::registry::threads::ThreadRecord;
use crate::tracer::{self, TraceCategory, TraceOptions, OUT_OF_MEMORY_CLASS};

impl Monitor {
    /// Current CPU figure per the configured execution timer.
    pub(crate) fn cpu_now(&self) -> Micros {
        match self.config.read().unwrap().execution_timer {
            crate::config::ExecutionTimer::Method => self.clock.thread_cpu_micros(),
            crate::config::ExecutionTimer::Hpc => Micros(self.clock.timestamp_hp().0),
        }
    }

    /// Emit to the regular sinks, counting the emission.
    pub(crate) fn emit(&self, tag: &Tag) {
        self.stats.traces_emitted.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        self.hub.emit(tag);
    }

    /// Emit honoring a category's file redirect.
    pub(crate) fn emit_with(&self, options: &TraceOptions, tag: &Tag) {
        match &options.file {
            Some(path) => self.hub.emit_to_file(path, tag),
            None => self.emit(tag),
        }
    }

    /// Class record by id, searching the active map and the pinned
    /// deleted-classes list.
    pub(crate) fn find_class_any(&self, id: ClassId) -> Option<Arc<ClassRecord>> {
        let registry = self.registry.read().unwrap();
        registry
            .find_class(id)
            .or_else(|| registry.deleted_classes().iter().find(|c| c.id() == id).cloned())
    }

    // =========================================================================
    // Class events
    // =========================================================================

    pub fn on_class_prepare(&self, thread: ThreadId, info: &ClassInfo) {
        self.count_event();
        let class = {
            let config = self.config.read().unwrap();
            self.registry.write().unwrap().register_class(info, &config)
        };

        // The class object itself is a tracked allocation.
        if let Some(tag) = info.object_tag {
            let mut memory = self.memory.lock().unwrap();
            memory.objects.insert(
                tag.0,
                ObjectRecord {
                    class: info.id,
                    size: info.object_size,
                    generation: self.generation(),
                    is_class: true,
                },
            );
        }

        if self.tracer.is_enabled(TraceCategory::Class) {
            let mut tag =
                tracer::class_trace(class.name(), class.id().0, self.clock.timestamp_ms());
            if self.tracer.is_enabled(TraceCategory::Stack) {
                let record = self.resolve_thread(thread);
                let stack = record.stack();
                let frames = tag.child("Traces");
                frames.put("Type", "Callstack");
                for frame in stack.frames() {
                    tracer::frame_trace(frames, frame, thread, None);
                }
            }
            let options = self.tracer.options(TraceCategory::Class).unwrap_or_default();
            self.emit_with(&options, &tag);
        }
    }

    pub fn on_class_unload(&self, class: ClassId) {
        self.count_event();
        self.registry.write().unwrap().unload_class(class);
    }

    // =========================================================================
    // Thread events
    // =========================================================================

    pub fn on_thread_start(&self, info: &ThreadInfo) {
        self.count_event();
        let record = Arc::new(ThreadRecord::new(info.id, info.name.clone()));
        record.set_cpu_base(self.clock.thread_cpu_micros());
        self.threads.write().unwrap().insert(info.id.0, Arc::clone(&record));
        crate::registry::threads::cache(self.instance_id, info.id, &record);
        if self.tracer.is_enabled(TraceCategory::Thread) {
            self.emit(&thread_trace(info.id, &info.name, "Start", self.clock.timestamp_ms()));
        }
    }

    pub fn on_thread_end(&self, thread: ThreadId) {
        self.count_event();
        let removed = self.threads.write().unwrap().remove(thread.0);
        if let Some(record) = removed {
            record.mark_ended();
            if self.tracer.is_enabled(TraceCategory::Thread) {
                self.emit(&thread_trace(thread, record.name(), "End", self.clock.timestamp_ms()));
            }
        }
    }

    // =========================================================================
    // Method enter / exit
    // =========================================================================

    pub fn on_method_enter(&self, thread_id: ThreadId, method_id: MethodId) {
        let thread = self.resolve_thread(thread_id);
        if thread.is_processing_jni() {
            return;
        }
        self.count_event();
        if !self.is_active() {
            return;
        }
        // Unknown methods contribute no frames; this keeps exits balanced.
        let Some(method) = self.registry.read().unwrap().find_method(method_id) else {
            debug!("{}", MonitorError::NotRegistered { kind: "method", id: method_id.0 });
            return;
        };
        self.enter_resolved(&thread, thread_id, &method);
    }

    fn enter_resolved(&self, thread: &Arc<ThreadRecord>, thread_id: ThreadId, method: &Arc<MethodRecord>) {
        self.stats.method_calls.fetch_add(1, std::sync::atomic::Ordering::Relaxed);

        if method.is_monitored() {
            let cpu = if method.is_timed() { self.cpu_now() } else { Micros(0) };
            let wall = self.clock.timestamp_hp();
            let mut stack = thread.stack();
            stack.push(Arc::clone(method), cpu, wall);
            method.enter();
            if method.is_trigger() && !thread.is_trigger_armed() {
                thread.arm_trigger();
                stack.rewind_sequence();
            }
        }

        if method.is_debug() && self.tracer.is_enabled(TraceCategory::Method) {
            let cpu = self.cpu_now();
            let wall = self.clock.timestamp_hp();
            let depth = {
                let mut debug_stack = thread.debug_stack();
                debug_stack.push(Arc::clone(method), cpu, wall);
                debug_stack.depth()
            };
            let mut tag = tracer::method_trace(
                method,
                thread_id,
                self.clock.timestamp_ms(),
                "Enter",
                depth,
                String::new(),
            );
            if self.tracer.is_enabled(TraceCategory::Parameter) {
                self.dump_parameters(thread, thread_id, method, &mut tag);
            }
            let options = self.tracer.options(TraceCategory::Method).unwrap_or_default();
            self.emit_with(&options, &tag);
        }
    }

    pub fn on_method_exit(&self, thread_id: ThreadId, method_id: MethodId) {
        let thread = self.resolve_thread(thread_id);
        if thread.is_processing_jni() {
            return;
        }
        self.count_event();
        self.exit_resolved(&thread, thread_id, method_id);
    }

    fn exit_resolved(&self, thread: &Arc<ThreadRecord>, thread_id: ThreadId, method_id: MethodId) {
        let mut emission: Option<(Tag, TraceOptions)> = None;

        {
            let mut stack = thread.stack();
            if stack.top().is_some_and(|f| f.method.id() != method_id) {
                // Mismatch: an exception unwound past profiled frames. Pop
                // until the exiting method surfaces or the stack drains.
                let present = stack.frames().iter().any(|f| f.method.id() == method_id);
                if present {
                    while stack.top().is_some_and(|f| f.method.id() != method_id) {
                        stack.pop();
                    }
                } else {
                    debug!(
                        "{}",
                        MonitorError::StateMismatch(format!(
                            "exit without matching enter for {method_id}"
                        ))
                    );
                }
            }

            if stack.top().is_some_and(|f| f.method.id() == method_id) {
                let frame = stack.top().unwrap();
                let method = Arc::clone(&frame.method);
                let (cpu, elapsed) = if method.is_timed() {
                    let cpu_now = self.cpu_now();
                    thread.note_cpu(cpu_now);
                    (cpu_now.since(frame.enter_cpu), self.clock.diff_hp(frame.enter_wall))
                } else {
                    (Micros(0), Micros(0))
                };
                let memory_delta = stack.high_memory().saturating_sub(frame.enter_memory);
                method.exit(cpu, elapsed);

                // Trigger evaluation sees the frame still on the stack so the
                // suffix includes it. Nothing to emit when every frame went
                // out in an earlier window.
                if thread.is_trigger_armed() && stack.sequence() < stack.depth() {
                    if let Some((reason, value, options)) =
                        self.tracer.trace_trigger(thread.name(), stack.depth(), elapsed, memory_delta)
                    {
                        let tag = suffix_trace(&stack, thread_id, "Trigger", reason.as_str(), &value.to_string());
                        stack.advance_sequence();
                        emission = Some((tag, options));
                    }
                }
                if method.is_trigger() {
                    thread.disarm_trigger();
                }
                stack.pop();
            }
        }

        if let Some((tag, options)) = emission {
            self.emit_with(&options, &tag);
        }

        // Symmetric unwind of the debug stack.
        let mut debug_emission: Option<Tag> = None;
        {
            let mut debug_stack = thread.debug_stack();
            if debug_stack.top().is_some_and(|f| f.method.id() == method_id) {
                let frame = debug_stack.top().unwrap();
                let cpu = self.cpu_now().since(frame.enter_cpu);
                if self.tracer.is_enabled(TraceCategory::Method) {
                    debug_emission = Some(tracer::method_trace(
                        &frame.method,
                        thread_id,
                        self.clock.timestamp_ms(),
                        "Exit",
                        debug_stack.depth(),
                        cpu.0.to_string(),
                    ));
                }
                debug_stack.pop();
            }
        }
        if let Some(tag) = debug_emission {
            let options = self.tracer.options(TraceCategory::Method).unwrap_or_default();
            self.emit_with(&options, &tag);
        }
    }

    /// Parameter dump through the host, guarded against re-entry.
    fn dump_parameters(
        &self,
        thread: &Arc<ThreadRecord>,
        thread_id: ThreadId,
        method: &Arc<MethodRecord>,
        tag: &mut Tag,
    ) {
        let Some(_guard) = thread.enter_jni() else {
            return;
        };
        match self.host.describe_parameters(thread_id, method.id()) {
            Ok(parameters) => {
                let list = tag.child("Traces");
                list.put("Type", "Variables")
                    .put("MethodName", method.qualified_name())
                    .put("Info", "Arguments(enter)");
                for (name, value) in parameters {
                    list.child("Trace").put("Type", "Variable").put("Name", name).put("Value", value);
                }
            }
            Err(err) => {
                // Guest call failed: clear and continue, the trace just has
                // no arguments.
                debug!("parameter dump failed: {err}");
            }
        }
    }

    // =========================================================================
    // Context view (request/component profiling)
    // =========================================================================

    pub fn on_context_enter(&self, thread_id: ThreadId, request: &str, component: Option<&str>) {
        if !self.is_active() || request.is_empty() {
            return;
        }
        let component = component.unwrap_or("<init>");
        if component.is_empty() {
            return;
        }
        let thread = self.resolve_thread(thread_id);
        if thread.is_processing_jni() {
            return;
        }
        self.count_event();
        let method = {
            let config = self.config.read().unwrap();
            self.registry.write().unwrap().register_context(request, component, &config)
        };
        self.enter_resolved(&thread, thread_id, &method);
    }

    pub fn on_context_exit(&self, thread_id: ThreadId, request: &str, component: Option<&str>) {
        if !self.is_active() || request.is_empty() {
            return;
        }
        let component = component.unwrap_or("<init>");
        let thread = self.resolve_thread(thread_id);
        if thread.is_processing_jni() {
            return;
        }
        self.count_event();
        let key = crate::registry::string_hash(&format!("{request}.{component}"));
        self.exit_resolved(&thread, thread_id, MethodId(key));
    }

    // =========================================================================
    // Allocation events
    // =========================================================================

    pub fn on_object_alloc(
        &self,
        thread_id: ThreadId,
        tag: ObjectTag,
        object_class: ClassId,
        size: u64,
    ) {
        let thread = self.resolve_thread(thread_id);
        if thread.is_processing_jni() {
            return;
        }
        self.count_event();
        let (memory_on, alert_percent, min_bytes) = {
            let config = self.config.read().unwrap();
            (config.monitor_memory_on, config.history_alert, config.min_memory_size)
        };
        if !self.is_active() || !memory_on {
            return;
        }

        // Attribution target: the class at the top of the callstack, or the
        // object's own class outside any profiled frame.
        let context = {
            let stack = thread.stack();
            stack.top().and_then(|f| f.method.class())
        };
        let context = match context {
            Some(class) => class,
            None => {
                let config = self.config.read().unwrap();
                self.registry.write().unwrap().ensure_class(
                    object_class,
                    &format!("class-{object_class}"),
                    &config,
                )
            }
        };

        thread.stack().raise_high_memory(size);

        let generation = self.generation();
        let mut retag: Option<(ClassId, u64)> = None;
        {
            let mut memory = self.memory.lock().unwrap();
            if let Some(record) = memory.objects.get_mut(tag.0) {
                // Realloc: the host re-reported a live tag.
                retag = Some((record.class, record.size));
                record.class = context.id();
                record.size = size;
                record.generation = generation;
            } else {
                memory.objects.insert(
                    tag.0,
                    ObjectRecord { class: context.id(), size, generation, is_class: false },
                );
                memory.total_allocated += size;
                memory.allocation_count += 1;
            }
        }

        if let Some((old_class, old_size)) = retag {
            if let Some(old) = self.find_class_any(old_class) {
                old.deallocate(old_size);
            }
            context.allocate(size, self.gc_index(), 0, 0);
            return;
        }

        let fired = context.allocate(size, self.gc_index(), alert_percent, min_bytes);
        if fired {
            self.emit_leak_report(&context);
        }
    }

    pub fn on_object_free(&self, tag: ObjectTag) {
        self.count_event();
        let record = {
            let mut memory = self.memory.lock().unwrap();
            let Some(record) = memory.objects.remove(tag.0) else {
                return;
            };
            if record.generation != self.generation() {
                debug!(
                    "{}",
                    MonitorError::StateMismatch(format!(
                        "free for tag {tag} from {} dropped",
                        record.generation
                    ))
                );
                return;
            }
            memory.total_freed += record.size;
            memory.free_count += 1;
            record
        };

        let Some(class) = self.find_class_any(record.class) else {
            return;
        };
        class.deallocate(record.size);
        if class.is_pinned() && class.live_count() == 0 {
            self.registry.write().unwrap().drain_deleted();
        }
    }

    /// Reference-typed field store: the array payload behind the reference
    /// counts as an allocation in the current frame's context.
    pub fn on_field_modification(
        &self,
        thread_id: ThreadId,
        _method: MethodId,
        object: ObjectTag,
        object_class: ClassId,
        size: u64,
    ) {
        if !self.config.read().unwrap().monitor_memory_on {
            return;
        }
        if size == 0 {
            return;
        }
        self.on_object_alloc(thread_id, object, object_class, size);
    }

    // =========================================================================
    // Contention
    // =========================================================================

    pub fn on_contention(&self, thread_id: ThreadId, event: ContentionEvent) {
        let thread = self.resolve_thread(thread_id);
        if thread.is_processing_jni() {
            return;
        }
        self.count_event();
        let now = self.clock.timestamp_hp();
        let Some(wait) = thread.change_state(event, now) else {
            return;
        };

        if event == ContentionEvent::EnterDone && wait.0 > 0 {
            if let Some(options) = self.tracer.trace_contention(wait) {
                let stack = thread.stack();
                let tag = contention_trace(&stack, thread_id, wait);
                if let Some(frame) = stack.top() {
                    frame.method.add_contention(wait);
                }
                drop(stack);
                self.emit_with(&options, &tag);
            }
        }
    }

    // =========================================================================
    // Exceptions
    // =========================================================================

    /// An exception was thrown. The host reports the throwing method and,
    /// when it already knows it, the catching method.
    pub fn on_exception(
        &self,
        thread_id: ThreadId,
        class_name: &str,
        throw_method: MethodId,
        throw_line: Option<u32>,
        catch_method: Option<MethodId>,
    ) {
        let thread = self.resolve_thread(thread_id);
        if thread.is_processing_jni() {
            return;
        }
        self.count_event();
        let count = self.registry.write().unwrap().note_exception(class_name);

        if !self.tracer.trace_exception(class_name) {
            return;
        }

        let (throw_name, catch_name) = {
            let registry = self.registry.read().unwrap();
            let throw_name = registry
                .find_method(throw_method)
                .map_or_else(|| "?".to_string(), |m| m.qualified_name());
            let catch_name = catch_method
                .and_then(|id| registry.find_method(id))
                .map(|m| m.qualified_name());
            (throw_name, catch_name)
        };

        let mut tag = Tag::new("Trace");
        tag.put("Type", "Exception")
            .put("ClassName", class_name)
            .put("MethodName", throw_name)
            .put("ThreadId", AttrValue::Hex(thread_id.0))
            .put("NrCalls", count)
            .put("Timestamp", self.clock.timestamp_ms());
        if let Some(line) = throw_line {
            tag.put("Info", i64::from(line));
        }
        if let Some(catch_name) = catch_name {
            tag.put("Event", format!("CatchBy={catch_name}"));
        }
        self.emit(&tag);

        if class_name == OUT_OF_MEMORY_CLASS {
            self.emit_oom_dumps(thread_id);
        }
    }

    /// The runtime reports where the exception was caught, with the frame
    /// count the stack must shrink to.
    pub fn on_exception_catch(&self, thread_id: ThreadId, _catch_method: MethodId, frame_count: usize) {
        let thread = self.resolve_thread(thread_id);
        if thread.is_processing_jni() {
            return;
        }
        self.count_event();
        thread.stack().reset(frame_count);
        thread.debug_stack().reset(frame_count);
    }

    /// Out-of-memory cascade: thread, class, and statistic dumps in one
    /// atomic emission.
    fn emit_oom_dumps(&self, thread_id: ThreadId) {
        let mut root = Tag::new("Traces");
        root.put("Type", "OutOfMemory").put("ThreadId", AttrValue::Hex(thread_id.0));
        self.dump_threads_into(&mut root);
        self.dump_classes_into(&mut root, &crate::command::DumpFilter::default());
        self.dump_statistic_into(&mut root);
        self.emit(&root);
    }

    // =========================================================================
    // GC boundaries
    // =========================================================================

    pub fn on_gc_start(&self) {
        self.count_event();
        self.note_gc_start(self.clock.timestamp_hp());
    }

    /// GC finished: bump the index and hand the report off to the repeat
    /// thread; callbacks never format output for this.
    pub fn on_gc_finish(&self) {
        self.count_event();
        self.note_gc_finish(self.clock.timestamp_hp());
        self.defer(Deferred::GcReport);
    }

    fn count_event(&self) {
        self.stats.events.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    }
}

// =============================================================================
// Trace shapes
// =============================================================================

fn thread_trace(thread: ThreadId, name: &str, event: &'static str, timestamp_ms: u64) -> Tag {
    let mut tag = Tag::new("Trace");
    tag.put("Type", "Thread")
        .put("ThreadId", AttrValue::Hex(thread.0))
        .put("Info", name)
        .put("Event", event)
        .put("Timestamp", timestamp_ms);
    tag
}

/// Stack suffix since the sequence cursor, terminal frame annotated with
/// the threshold reason.
fn suffix_trace(
    stack: &crate::callstack::CallStack,
    thread: ThreadId,
    kind: &'static str,
    event: &'static str,
    info: &str,
) -> Tag {
    let mut root = Tag::new("Traces");
    root.put("Type", kind);
    let suffix = stack.suffix();
    for (idx, frame) in suffix.iter().enumerate() {
        let terminal =
            if idx + 1 == suffix.len() { Some((event, info.to_string())) } else { None };
        tracer::frame_trace(&mut root, frame, thread, terminal);
    }
    root
}

/// Full-stack contention trace; the wait duration rides on the top frame.
fn contention_trace(stack: &crate::callstack::CallStack, thread: ThreadId, wait: Micros) -> Tag {
    let mut root = Tag::new("Traces");
    root.put("Type", "Contention");
    let frames = stack.frames();
    for (idx, frame) in frames.iter().enumerate() {
        let terminal = if idx + 1 == frames.len() {
            Some(("Contention", wait.as_millis().to_string()))
        } else {
            None
        };
        tracer::frame_trace(&mut root, frame, thread, terminal);
    }
    root
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use sherlok_runtime::{MethodInfo, NoopRuntime};

    const T: ThreadId = ThreadId(0x11);

    fn monitor() -> Arc<Monitor> {
        let mut config = Config::default();
        config.apply_options("MonitorOn=on;MinMemorySize=0").unwrap();
        let monitor = Monitor::new(config, Arc::new(NoopRuntime));
        monitor.hub.set_format(crate::output::OutputFormat::Tree);
        crate::registry::threads::invalidate_cache();
        monitor
    }

    fn prepare(monitor: &Monitor) {
        let info = ClassInfo {
            id: ClassId(0x1),
            name: "unit/Class".to_string(),
            super_id: None,
            object_size: 16,
            object_tag: None,
            methods: vec![MethodInfo {
                id: MethodId(0x2),
                name: "work".to_string(),
                signature: "()V".to_string(),
                start_line: None,
                end_line: None,
            }],
        };
        monitor.on_class_prepare(T, &info);
    }

    fn stack_depth(monitor: &Monitor) -> usize {
        monitor.resolve_thread(T).stack().depth()
    }

    #[test]
    fn test_inactive_monitor_ignores_enters() {
        let monitor = monitor();
        prepare(&monitor);
        monitor.stop_monitor();
        monitor.on_method_enter(T, MethodId(0x2));
        assert_eq!(stack_depth(&monitor), 0);
    }

    #[test]
    fn test_jni_guard_suppresses_callbacks() {
        let monitor = monitor();
        prepare(&monitor);
        let thread = monitor.resolve_thread(T);
        let guard = thread.enter_jni().unwrap();
        monitor.on_method_enter(T, MethodId(0x2));
        assert_eq!(stack_depth(&monitor), 0);
        drop(guard);
        monitor.on_method_enter(T, MethodId(0x2));
        assert_eq!(stack_depth(&monitor), 1);
    }

    #[test]
    fn test_allocation_outside_frames_uses_object_class() {
        let monitor = monitor();
        prepare(&monitor);
        monitor.on_object_alloc(T, ObjectTag(0x9), ClassId(0x1), 64);
        let class = monitor.find_class_any(ClassId(0x1)).unwrap();
        assert_eq!(class.live_bytes(), 64);
    }

    #[test]
    fn test_allocation_for_unseen_class_creates_record() {
        let monitor = monitor();
        monitor.on_object_alloc(T, ObjectTag(0x9), ClassId(0xAB), 32);
        let class = monitor.find_class_any(ClassId(0xAB)).unwrap();
        assert_eq!(class.name(), "class-ab");
        assert_eq!(class.live_bytes(), 32);
    }

    #[test]
    fn test_memory_monitoring_gate() {
        let monitor = monitor();
        prepare(&monitor);
        monitor.config.write().unwrap().set("MonitorMemoryOn", "off").unwrap();
        monitor.on_object_alloc(T, ObjectTag(0x9), ClassId(0x1), 64);
        let class = monitor.find_class_any(ClassId(0x1)).unwrap();
        assert_eq!(class.live_bytes(), 0);
    }

    #[test]
    fn test_field_modification_is_an_allocation() {
        let monitor = monitor();
        prepare(&monitor);
        monitor.on_method_enter(T, MethodId(0x2));
        monitor.on_field_modification(T, MethodId(0x2), ObjectTag(0x9), ClassId(0x1), 128);
        // A repeat for the same tag re-credits instead of double counting.
        monitor.on_field_modification(T, MethodId(0x2), ObjectTag(0x9), ClassId(0x1), 128);
        let class = monitor.find_class_any(ClassId(0x1)).unwrap();
        assert_eq!(class.live_bytes(), 128);
    }

    #[test]
    fn test_free_of_unknown_tag_is_dropped() {
        let monitor = monitor();
        prepare(&monitor);
        monitor.on_object_free(ObjectTag(0x77));
        let class = monitor.find_class_any(ClassId(0x1)).unwrap();
        assert_eq!(class.live_bytes(), 0);
        assert_eq!(class.total_freed(), 0);
    }

    #[test]
    fn test_gc_finish_posts_deferred_report() {
        let monitor = monitor();
        monitor.on_gc_start();
        monitor.on_gc_finish();
        assert_eq!(monitor.gc_index(), crate::domain::GcIndex(1));
        let rx = monitor.deferred_receiver();
        assert_eq!(rx.try_recv(), Ok(Deferred::GcReport));
    }

    #[test]
    fn test_class_object_tag_is_tracked() {
        let monitor = monitor();
        let info = ClassInfo {
            id: ClassId(0x1),
            name: "unit/Class".to_string(),
            super_id: None,
            object_size: 48,
            object_tag: Some(ObjectTag(0x5)),
            methods: Vec::new(),
        };
        monitor.on_class_prepare(T, &info);
        let memory = monitor.memory.lock().unwrap();
        let record = memory.objects.get(0x5).unwrap();
        assert!(record.is_class);
        assert_eq!(record.size, 48);
    }
}
