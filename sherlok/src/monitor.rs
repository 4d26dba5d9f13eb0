//! The monitor: process-wide state with explicit init and teardown
//!
//! One [`Monitor`] instance owns every registry, the tracer, the output hub,
//! and the clock. All public API is methods on a reference to that instance;
//! nothing reaches for hidden globals, so tests can run several monitors
//! side by side.
//!
//! Lock domains, in the order they may be nested:
//!
//! - `registry` (RwLock): class and method maps; callbacks take it shared,
//!   structural changes exclusive
//! - `threads` (RwLock): the thread map
//! - `memory` (Mutex): live-object map and global allocation totals
//! - output, inside [`OutputHub`]: one whole tag tree per acquisition
//! - `bridge`, inside the interpreter: one command at a time

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, info};

use sherlok_runtime::{ClassId, HostRuntime, ThreadId};

use crate::clock::{Clock, HpTick};
use crate::config::Config;
use crate::containers::IdMap;
use crate::domain::{GcIndex, Generation};
use crate::output::OutputHub;
use crate::registry::threads::{self, ThreadRecord};
use crate::registry::Registry;
use crate::tracer::Tracer;

/// Capacity of the deferred-command queue. Posts beyond it are dropped; a
/// GC report lost under backpressure is acceptable, a blocked callback is
/// not.
const DEFERRED_QUEUE_LEN: usize = 64;

/// One record per live allocation the monitor is tracking.
pub struct ObjectRecord {
    /// Context class at allocation time, not necessarily the object's own.
    pub class: ClassId,
    pub size: u64,
    /// Generation at creation; frees from older generations are stale.
    pub generation: Generation,
    /// The tagged object is itself a class object.
    pub is_class: bool,
}

/// Bulk counters and the live-object map, guarded by the `memory` lock.
#[derive(Default)]
pub struct MemoryState {
    pub objects: IdMap<ObjectRecord>,
    pub total_allocated: u64,
    pub total_freed: u64,
    pub allocation_count: u64,
    pub free_count: u64,
}

/// Work posted from callbacks for the repeat thread to drain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Deferred {
    /// A GC finished; produce the GC report.
    GcReport,
    /// A full command line to run through the interpreter.
    Command(String),
}

/// Event counters for the statistics dump.
#[derive(Default)]
pub struct GlobalStats {
    pub events: AtomicU64,
    pub method_calls: AtomicU64,
    pub traces_emitted: AtomicU64,
}

/// Source of per-process monitor instance ids for the thread-local slot.
static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

pub struct Monitor {
    /// Back-reference for handing owned clones to the worker threads.
    self_ref: Weak<Monitor>,
    /// Distinguishes monitors sharing one process in the thread-local slot.
    pub(crate) instance_id: u64,
    pub(crate) clock: Clock,
    pub(crate) host: Arc<dyn HostRuntime>,
    pub(crate) config: RwLock<Config>,
    pub(crate) registry: RwLock<Registry>,
    pub(crate) threads: RwLock<IdMap<Arc<ThreadRecord>>>,
    pub(crate) memory: Mutex<MemoryState>,
    pub(crate) tracer: Tracer,
    pub(crate) hub: OutputHub,
    pub(crate) stats: GlobalStats,

    /// Monitoring master switch (`start monitor` / `stop monitor`).
    active: AtomicBool,
    generation: AtomicU64,
    gc_index: AtomicU64,
    gc_started: AtomicU64,
    gc_duration: AtomicU64,

    /// Pass ids for heap sweeps; each sweep invalidates the previous
    /// tallies lazily.
    sweep_pass: AtomicU64,

    deferred_tx: Sender<Deferred>,
    deferred_rx: Receiver<Deferred>,

    /// Repeat cadence in seconds; 0 means disarmed.
    repeat_secs: AtomicU64,
    /// The previous command, re-run by the repeat loop.
    last_command: Mutex<Option<String>>,

    /// One command at a time, interleaving safely with callbacks.
    pub(crate) bridge: Mutex<()>,

    shutdown: AtomicBool,
    started_ms: u64,
    workers: Mutex<Vec<JoinHandle<()>>>,
    /// Port the shell actually bound (config may say 0 for any free port).
    shell_port: AtomicU64,
}

impl Monitor {
    /// Build a monitor around a host. Threads are not started; call
    /// [`Monitor::start`] for the shell and repeat loops.
    pub fn new(config: Config, host: Arc<dyn HostRuntime>) -> Arc<Monitor> {
        let (deferred_tx, deferred_rx) = bounded(DEFERRED_QUEUE_LEN);
        let hub = OutputHub::new(config.output_format().unwrap_or_default());
        if let Some(path) = &config.log_file {
            if let Err(err) = hub.set_log_file(path) {
                log::warn!("cannot open log file {}: {err}", path.display());
            }
        }
        let clock = Clock::new();
        let started_ms = clock.timestamp_ms();
        let active = config.monitor_on;

        let monitor = Arc::new_cyclic(|self_ref| Monitor {
            self_ref: self_ref.clone(),
            instance_id: NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed),
            clock,
            host,
            config: RwLock::new(config),
            registry: RwLock::new(Registry::new()),
            threads: RwLock::new(IdMap::new()),
            memory: Mutex::new(MemoryState::default()),
            tracer: Tracer::new(),
            hub,
            stats: GlobalStats::default(),
            active: AtomicBool::new(active),
            generation: AtomicU64::new(1),
            gc_index: AtomicU64::new(0),
            gc_started: AtomicU64::new(0),
            gc_duration: AtomicU64::new(0),
            sweep_pass: AtomicU64::new(0),
            deferred_tx,
            deferred_rx,
            repeat_secs: AtomicU64::new(0),
            last_command: Mutex::new(None),
            bridge: Mutex::new(()),
            shutdown: AtomicBool::new(false),
            started_ms,
            workers: Mutex::new(Vec::new()),
            shell_port: AtomicU64::new(0),
        });
        monitor.apply_startup_tracer();
        monitor
    }

    fn strong_self(&self) -> Arc<Monitor> {
        self.self_ref.upgrade().expect("monitor still alive")
    }

    /// Arm the trace categories named in the startup `Tracer` list.
    fn apply_startup_tracer(&self) {
        let config = self.config.read().unwrap();
        let mut any = false;
        for token in &config.tracer {
            if let Some(category) = crate::tracer::TraceCategory::parse(token) {
                self.tracer.enable(category, crate::tracer::TraceOptions::default());
                any = true;
            }
        }
        if any {
            self.tracer.set_active(true);
        }
    }

    /// Start the shell and repeat threads.
    pub fn start(&self) {
        let mut workers = self.workers.lock().unwrap();
        let shell = self.strong_self();
        workers.push(
            std::thread::Builder::new()
                .name("sherlok-shell".to_string())
                .spawn(move || crate::shell::run(&shell))
                .expect("spawn shell thread"),
        );
        let repeat = self.strong_self();
        workers.push(
            std::thread::Builder::new()
                .name("sherlok-repeat".to_string())
                .spawn(move || crate::repeat::run(&repeat))
                .expect("spawn repeat thread"),
        );
        info!("monitor started, shell on port {}", self.config.read().unwrap().port);
    }

    /// Tear down: stops the worker threads and, when configured, emits the
    /// exit dumps first.
    pub fn shutdown(&self) {
        if self.config.read().unwrap().dump_on_exit {
            self.dump_on_exit();
        }
        self.shutdown.store(true, Ordering::SeqCst);
        // Wake the repeat thread out of its timed wait.
        let _ = self.deferred_tx.try_send(Deferred::Command(String::new()));
        crate::shell::wake_listener(self);

        let workers = std::mem::take(&mut *self.workers.lock().unwrap());
        for handle in workers {
            let _ = handle.join();
        }
        info!("monitor stopped");
    }

    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    // -------------------------------------------------------------------------
    // Monitoring state
    // -------------------------------------------------------------------------

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    /// `start monitor`: a fresh transaction. Counters and stacks are
    /// cleared; retained classes keep id and name only.
    pub fn start_monitor(&self) {
        self.reset(false);
        self.active.store(true, Ordering::Relaxed);
        info!("monitoring started ({})", self.generation());
    }

    /// `stop monitor`: freeze accounting; state stays inspectable.
    pub fn stop_monitor(&self) {
        self.active.store(false, Ordering::Relaxed);
        info!("monitoring stopped");
    }

    /// Snapshot-to-zero. `reload` re-reads the properties file, overwriting
    /// local `set` edits.
    pub fn reset(&self, reload: bool) {
        self.generation.fetch_add(1, Ordering::SeqCst);

        if reload {
            let mut config = self.config.write().unwrap();
            let source = config.source_file.clone();
            if let Some(path) = source {
                if let Err(err) = config.load_properties(&path) {
                    log::warn!("config reload failed: {err}");
                }
            }
        }

        {
            let config = self.config.read().unwrap();
            let mut registry = self.registry.write().unwrap();
            registry.reset(&config);
        }
        {
            let threads = self.threads.read().unwrap();
            for (_, thread) in threads.iter() {
                thread.reset();
            }
        }
        {
            let mut memory = self.memory.lock().unwrap();
            memory.objects.clear();
            memory.total_allocated = 0;
            memory.total_freed = 0;
            memory.allocation_count = 0;
            memory.free_count = 0;
        }
        self.stats.events.store(0, Ordering::Relaxed);
        self.stats.method_calls.store(0, Ordering::Relaxed);
        self.stats.traces_emitted.store(0, Ordering::Relaxed);
        debug!("reset complete ({})", self.generation());
    }

    #[must_use]
    pub fn generation(&self) -> Generation {
        Generation(self.generation.load(Ordering::SeqCst))
    }

    #[must_use]
    pub fn gc_index(&self) -> GcIndex {
        GcIndex(self.gc_index.load(Ordering::Relaxed))
    }

    pub(crate) fn note_gc_start(&self, now: HpTick) {
        self.gc_started.store(now.0, Ordering::Relaxed);
    }

    /// Returns the new GC index.
    pub(crate) fn note_gc_finish(&self, now: HpTick) -> GcIndex {
        let started = self.gc_started.load(Ordering::Relaxed);
        self.gc_duration.store(now.0.saturating_sub(started), Ordering::Relaxed);
        GcIndex(self.gc_index.fetch_add(1, Ordering::Relaxed) + 1)
    }

    pub(crate) fn next_sweep_pass(&self) -> u64 {
        self.sweep_pass.fetch_add(1, Ordering::Relaxed) + 1
    }

    #[must_use]
    pub fn last_gc_duration_micros(&self) -> u64 {
        self.gc_duration.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn uptime_ms(&self) -> u64 {
        self.clock.timestamp_ms().saturating_sub(self.started_ms)
    }

    // -------------------------------------------------------------------------
    // Threads
    // -------------------------------------------------------------------------

    /// Resolve the record for a host thread, creating one on first sight.
    /// The thread-local slot makes the repeat case O(1).
    pub(crate) fn resolve_thread(&self, id: ThreadId) -> Arc<ThreadRecord> {
        if let Some(record) = threads::cached(self.instance_id, id) {
            return record;
        }
        if let Some(record) = self.threads.read().unwrap().get(id.0) {
            threads::cache(self.instance_id, id, record);
            return Arc::clone(record);
        }
        let record = Arc::new(ThreadRecord::new(id, format!("thread-{id}")));
        self.threads.write().unwrap().insert(id.0, Arc::clone(&record));
        threads::cache(self.instance_id, id, &record);
        record
    }

    // -------------------------------------------------------------------------
    // Deferred commands and the repeat loop
    // -------------------------------------------------------------------------

    /// Post work for the repeat thread. Never blocks; a full queue drops
    /// the post.
    pub(crate) fn defer(&self, work: Deferred) {
        if self.deferred_tx.try_send(work).is_err() {
            debug!("deferred queue full, dropping post");
        }
    }

    #[must_use]
    pub(crate) fn deferred_receiver(&self) -> Receiver<Deferred> {
        self.deferred_rx.clone()
    }

    pub fn set_repeat_secs(&self, secs: u64) {
        self.repeat_secs.store(secs, Ordering::Relaxed);
    }

    #[must_use]
    pub fn repeat_secs(&self) -> u64 {
        self.repeat_secs.load(Ordering::Relaxed)
    }

    /// Port the shell listener bound, once it is up; 0 before that.
    #[must_use]
    pub fn shell_port(&self) -> u16 {
        self.shell_port.load(Ordering::SeqCst) as u16
    }

    pub(crate) fn publish_shell_port(&self, port: u16) {
        self.shell_port.store(u64::from(port), Ordering::SeqCst);
    }

    pub(crate) fn remember_command(&self, line: &str) {
        *self.last_command.lock().unwrap() = Some(line.to_string());
    }

    #[must_use]
    pub(crate) fn last_command(&self) -> Option<String> {
        self.last_command.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sherlok_runtime::NoopRuntime;

    fn test_monitor() -> Arc<Monitor> {
        let monitor = Monitor::new(Config::default(), Arc::new(NoopRuntime));
        monitor.hub.set_format(crate::output::OutputFormat::Tree);
        monitor
    }

    #[test]
    fn test_start_stop_monitor() {
        let monitor = test_monitor();
        assert!(!monitor.is_active());
        monitor.start_monitor();
        assert!(monitor.is_active());
        monitor.stop_monitor();
        assert!(!monitor.is_active());
    }

    #[test]
    fn test_reset_bumps_generation() {
        let monitor = test_monitor();
        let before = monitor.generation();
        monitor.reset(false);
        assert_eq!(monitor.generation(), before.next());
    }

    #[test]
    fn test_resolve_thread_is_stable() {
        crate::registry::threads::invalidate_cache();
        let monitor = test_monitor();
        let a = monitor.resolve_thread(ThreadId(5));
        let b = monitor.resolve_thread(ThreadId(5));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(monitor.threads.read().unwrap().len(), 1);
    }

    #[test]
    fn test_deferred_queue_drops_when_full() {
        let monitor = test_monitor();
        for _ in 0..DEFERRED_QUEUE_LEN + 10 {
            monitor.defer(Deferred::GcReport);
        }
        let rx = monitor.deferred_receiver();
        let mut drained = 0;
        while rx.try_recv().is_ok() {
            drained += 1;
        }
        assert_eq!(drained, DEFERRED_QUEUE_LEN);
    }

    #[test]
    fn test_startup_tracer_list() {
        let mut config = Config::default();
        config.set("Tracer", "method,gc").unwrap();
        let monitor = Monitor::new(config, Arc::new(NoopRuntime));
        assert!(monitor.tracer.is_enabled(crate::tracer::TraceCategory::Method));
        assert!(monitor.tracer.is_enabled(crate::tracer::TraceCategory::Gc));
        assert!(!monitor.tracer.is_enabled(crate::tracer::TraceCategory::Stack));
    }
}
