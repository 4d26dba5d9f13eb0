//! Class records: memory accounting, history ring, growth alert
//!
//! One record per distinct class observed, created on class-prepare or on
//! the first allocation attributed to the class. Live counters are atomics
//! (updated by callbacks under the shared registry lock); the history ring
//! and heap-sweep tallies sit behind a per-record mutex taken only at GC
//! boundaries, sweeps, and dumps.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use sherlok_runtime::{ClassId, ClassInfo};

use crate::config::Config;
use crate::domain::{errors, GcIndex};
use crate::output::{AttrValue, Tag};
use crate::registry::methods::MethodRecord;

/// Entries kept in the per-class history ring.
const HISTORY_LEN: usize = 32;

/// Live-byte snapshots per GC cycle, plus the growth-alert watermark.
#[derive(Default)]
struct ClassHistory {
    /// (gc index, live bytes at first allocation after that GC).
    ring: VecDeque<(u64, u64)>,
    /// Largest live-byte figure seen at a GC boundary.
    watermark: u64,
    /// GC index of the newest ring entry.
    last_gc: u64,
}

pub struct ClassRecord {
    id: ClassId,
    name: String,
    super_id: Option<ClassId>,
    object_size: u64,
    /// Methods owned by this class; filled at registration.
    methods: Mutex<Vec<Arc<MethodRecord>>>,

    live_bytes: AtomicI64,
    live_count: AtomicI64,
    total_alloc: AtomicU64,
    total_freed: AtomicU64,

    // Heap-sweep tallies of the last pass, keyed by the pass id so a new
    // pass resets them lazily.
    heap_bytes: AtomicU64,
    heap_count: AtomicU64,
    heap_pass: AtomicU64,

    monitored: AtomicBool,
    visible: AtomicBool,
    excluded: AtomicBool,
    /// Removed from the active map but pinned by live object records.
    pinned: AtomicBool,
    /// The growth alert fired for this class; shows up in `lml`.
    leak: AtomicBool,

    history: Mutex<ClassHistory>,
}

impl ClassRecord {
    pub fn new(info: &ClassInfo) -> Self {
        ClassRecord {
            id: info.id,
            name: info.name.clone(),
            super_id: info.super_id,
            object_size: info.object_size,
            methods: Mutex::new(Vec::new()),
            live_bytes: AtomicI64::new(0),
            live_count: AtomicI64::new(0),
            total_alloc: AtomicU64::new(0),
            total_freed: AtomicU64::new(0),
            heap_bytes: AtomicU64::new(0),
            heap_count: AtomicU64::new(0),
            heap_pass: AtomicU64::new(0),
            monitored: AtomicBool::new(false),
            visible: AtomicBool::new(true),
            excluded: AtomicBool::new(false),
            pinned: AtomicBool::new(false),
            leak: AtomicBool::new(false),
            history: Mutex::new(ClassHistory::default()),
        }
    }

    /// Synthetic record for the context view: request names act as classes.
    pub fn synthetic(id: ClassId, name: &str) -> Self {
        let info = ClassInfo {
            id,
            name: name.to_string(),
            super_id: None,
            object_size: 0,
            object_tag: None,
            methods: Vec::new(),
        };
        ClassRecord::new(&info)
    }

    #[must_use]
    pub fn id(&self) -> ClassId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn super_id(&self) -> Option<ClassId> {
        self.super_id
    }

    #[must_use]
    pub fn object_size(&self) -> u64 {
        self.object_size
    }

    pub fn add_method(&self, method: Arc<MethodRecord>) {
        self.methods.lock().unwrap().push(method);
    }

    #[must_use]
    pub fn methods(&self) -> Vec<Arc<MethodRecord>> {
        self.methods.lock().unwrap().clone()
    }

    /// Classify against the configured scope filters.
    pub fn classify(&self, config: &Config) {
        let in_scope = config.in_scope(&self.name);
        self.monitored.store(in_scope && config.monitor_on, Ordering::Relaxed);
        self.excluded.store(!in_scope, Ordering::Relaxed);
        self.visible.store(in_scope || config.monitor_visible, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_monitored(&self) -> bool {
        self.monitored.load(Ordering::Relaxed)
    }

    pub fn set_monitored(&self, value: bool) {
        self.monitored.store(value, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn is_excluded(&self) -> bool {
        self.excluded.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn is_pinned(&self) -> bool {
        self.pinned.load(Ordering::Relaxed)
    }

    pub fn set_pinned(&self, value: bool) {
        self.pinned.store(value, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_leak(&self) -> bool {
        self.leak.load(Ordering::Relaxed)
    }

    /// Re-arm the growth alert (`reset` and the manual clear path).
    pub fn clear_leak(&self) {
        self.leak.store(false, Ordering::Relaxed);
    }

    // -------------------------------------------------------------------------
    // Accounting
    // -------------------------------------------------------------------------

    /// Account one allocation attributed to this class as context.
    ///
    /// Returns true when the growth alert fires: the first allocation after
    /// a GC compares the live figure against the watermark, and the alert
    /// fires once until re-armed by reset or a manual clear.
    pub fn allocate(&self, size: u64, gc: GcIndex, alert_percent: u64, min_bytes: u64) -> bool {
        let live = self.live_bytes.fetch_add(size as i64, Ordering::Relaxed) + size as i64;
        self.live_count.fetch_add(1, Ordering::Relaxed);
        self.total_alloc.fetch_add(size, Ordering::Relaxed);

        if alert_percent == 0 {
            return false;
        }

        let live = live.max(0) as u64;
        let mut history = self.history.lock().unwrap();
        if gc.0 == 0 || gc.0 <= history.last_gc {
            return false;
        }
        history.last_gc = gc.0;
        if history.ring.len() == HISTORY_LEN {
            history.ring.pop_front();
        }
        history.ring.push_back((gc.0, live));

        let fired = history.watermark > 0
            && live >= min_bytes
            && live * 100 > history.watermark * (100 + alert_percent)
            && !self.leak.swap(true, Ordering::Relaxed);
        history.watermark = history.watermark.max(live);
        fired
    }

    /// Subtract one freed object. The generation check in the dispatcher
    /// guarantees each live object is subtracted exactly once; a negative
    /// result here is a real accounting bug and is fatal.
    pub fn deallocate(&self, size: u64) {
        let live = self.live_bytes.fetch_sub(size as i64, Ordering::Relaxed) - size as i64;
        let count = self.live_count.fetch_sub(1, Ordering::Relaxed) - 1;
        self.total_freed.fetch_add(size, Ordering::Relaxed);
        if live < 0 || count < 0 {
            errors::fatal_invariant(&format!(
                "class {} live accounting went negative (bytes={live}, count={count})",
                self.name
            ));
        }
    }

    /// Tally one object seen by the heap sweep. A newer pass id resets the
    /// previous pass's figures first.
    pub fn heap_tally(&self, size: u64, pass: u64) {
        if self.heap_pass.swap(pass, Ordering::Relaxed) != pass {
            self.heap_bytes.store(0, Ordering::Relaxed);
            self.heap_count.store(0, Ordering::Relaxed);
        }
        self.heap_bytes.fetch_add(size, Ordering::Relaxed);
        self.heap_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn clear_heap_tally(&self) {
        self.heap_bytes.store(0, Ordering::Relaxed);
        self.heap_count.store(0, Ordering::Relaxed);
        self.heap_pass.store(0, Ordering::Relaxed);
    }

    #[must_use]
    pub fn live_bytes(&self) -> u64 {
        self.live_bytes.load(Ordering::Relaxed).max(0) as u64
    }

    #[must_use]
    pub fn live_count(&self) -> u64 {
        self.live_count.load(Ordering::Relaxed).max(0) as u64
    }

    #[must_use]
    pub fn total_alloc(&self) -> u64 {
        self.total_alloc.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn total_freed(&self) -> u64 {
        self.total_freed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn heap_bytes(&self) -> u64 {
        self.heap_bytes.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn heap_count(&self) -> u64 {
        self.heap_count.load(Ordering::Relaxed)
    }

    /// Zero every counter and the history; identity and flags survive.
    pub fn reset_counters(&self) {
        self.live_bytes.store(0, Ordering::Relaxed);
        self.live_count.store(0, Ordering::Relaxed);
        self.total_alloc.store(0, Ordering::Relaxed);
        self.total_freed.store(0, Ordering::Relaxed);
        self.clear_heap_tally();
        self.clear_leak();
        let mut history = self.history.lock().unwrap();
        history.ring.clear();
        history.watermark = 0;
        history.last_gc = 0;
    }

    // -------------------------------------------------------------------------
    // Dumping
    // -------------------------------------------------------------------------

    /// One `Class` row.
    pub fn dump(&self, parent: &mut Tag, with_hash: bool) {
        let row = parent.child("Class");
        row.put("ClassName", self.name.as_str())
            .put("Size", self.live_bytes())
            .put("Count", self.live_count())
            .put("HeapSize", self.heap_bytes())
            .put("HeapCount", self.heap_count())
            .put("TotalAlloc", self.total_alloc())
            .put("TotalFree", self.total_freed());
        if with_hash {
            row.put("ID", AttrValue::Hex(self.id.0));
            if let Some(super_id) = self.super_id {
                row.put("Super", AttrValue::Hex(super_id.0));
            }
        }
    }

    /// History ring as `History` rows under `parent`.
    pub fn dump_history(&self, parent: &mut Tag) {
        let history = self.history.lock().unwrap();
        for (gc, live) in &history.ring {
            parent.child("History").put("GC", *gc).put("Size", *live);
        }
    }
}

/// Snapshot of one class for sorting and filtering outside the lock.
pub struct ClassStats {
    pub id: ClassId,
    pub name: String,
    pub live_bytes: u64,
    pub live_count: u64,
    pub heap_bytes: u64,
    pub heap_count: u64,
    pub total_alloc: u64,
    pub total_freed: u64,
    pub monitored: bool,
    pub leak: bool,
}

impl ClassRecord {
    #[must_use]
    pub fn stats(&self) -> ClassStats {
        ClassStats {
            id: self.id,
            name: self.name.clone(),
            live_bytes: self.live_bytes(),
            live_count: self.live_count(),
            heap_bytes: self.heap_bytes(),
            heap_count: self.heap_count(),
            total_alloc: self.total_alloc(),
            total_freed: self.total_freed(),
            monitored: self.is_monitored(),
            leak: self.is_leak(),
        }
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    /// A bare class record for tests across the registry modules.
    pub fn test_class(id: u64, name: &str) -> Arc<ClassRecord> {
        Arc::new(ClassRecord::synthetic(ClassId(id), name))
    }

    #[test]
    fn test_allocation_accounting() {
        let class = test_class(1, "com/acme/Widget");
        class.allocate(1_024, GcIndex(0), 0, 0);
        class.allocate(512, GcIndex(0), 0, 0);
        class.deallocate(1_024);
        assert_eq!(class.live_bytes(), 512);
        assert_eq!(class.live_count(), 1);
        assert_eq!(class.total_alloc(), 1_536);
        assert_eq!(class.total_freed(), 1_024);
    }

    #[test]
    fn test_growth_alert_fires_once() {
        let class = test_class(1, "com/acme/Cache");
        // Baseline snapshot at gc 1 sets the watermark to 2000.
        class.allocate(2_000, GcIndex(1), 50, 1_000);
        // Live doubles by the next GC: growth beyond 50% fires.
        let fired = class.allocate(2_000, GcIndex(2), 50, 1_000);
        assert!(fired);
        assert!(class.is_leak());
        // Further growth stays silent until re-armed.
        assert!(!class.allocate(50_000, GcIndex(3), 50, 1_000));
        class.clear_leak();
        assert!(class.allocate(90_000, GcIndex(4), 50, 1_000));
    }

    #[test]
    fn test_growth_alert_respects_minimum() {
        let class = test_class(1, "com/acme/Tiny");
        class.allocate(10, GcIndex(1), 50, 1_000);
        class.allocate(90, GcIndex(2), 50, 1_000);
        assert!(!class.allocate(200, GcIndex(3), 50, 1_000));
        assert!(!class.is_leak());
    }

    #[test]
    fn test_heap_tally_resets_per_pass() {
        let class = test_class(1, "com/acme/Widget");
        class.heap_tally(100, 1);
        class.heap_tally(100, 1);
        assert_eq!(class.heap_count(), 2);
        class.heap_tally(64, 2);
        assert_eq!(class.heap_bytes(), 64);
        assert_eq!(class.heap_count(), 1);
    }

    #[test]
    fn test_reset_keeps_identity() {
        let class = test_class(7, "com/acme/Widget");
        class.allocate(5_000, GcIndex(1), 50, 100);
        class.reset_counters();
        assert_eq!(class.live_bytes(), 0);
        assert_eq!(class.total_alloc(), 0);
        assert_eq!(class.id(), ClassId(7));
        assert_eq!(class.name(), "com/acme/Widget");
    }

    #[test]
    fn test_history_ring_is_bounded() {
        let class = test_class(1, "com/acme/Widget");
        for gc in 1..=(HISTORY_LEN as u64 + 10) {
            class.allocate(8, GcIndex(gc), 1, u64::MAX);
        }
        let mut tag = Tag::new("List");
        class.dump_history(&mut tag);
        assert_eq!(tag.children().len(), HISTORY_LEN);
    }
}
