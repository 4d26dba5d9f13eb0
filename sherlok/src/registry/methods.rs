//! Method records and their per-call counters
//!
//! One record per distinct method the host reports. Counters are 64-bit
//! atomics updated with relaxed ordering: exactly one thread owns any given
//! frame, so a counter is only ever incremented by its own thread while
//! readers (commands) hold the registry lock exclusively.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use sherlok_runtime::{ClassId, MethodId, MethodInfo};

use crate::config::Config;
use crate::domain::Micros;
use crate::output::Tag;
use crate::registry::classes::ClassRecord;

pub struct MethodRecord {
    id: MethodId,
    /// Owning class; weak so a record never extends a class's lifetime.
    class: Weak<ClassRecord>,
    class_id: ClassId,
    name: String,
    signature: String,
    start_line: Option<u32>,
    end_line: Option<u32>,

    // Classification, recomputed at registration and on reset.
    monitored: AtomicBool,
    timed: AtomicBool,
    debug: AtomicBool,
    trigger: AtomicBool,
    /// Constructor-style profile point: object size estimated on exit and
    /// credited to the frame's memory high-water.
    prof_point_mem: AtomicBool,

    nr_calls: AtomicU64,
    cpu_sum: AtomicU64,
    elapsed_sum: AtomicU64,
    contention_sum: AtomicU64,
    nr_contentions: AtomicU64,
}

impl MethodRecord {
    pub fn new(info: &MethodInfo, class: &Arc<ClassRecord>) -> Self {
        MethodRecord {
            id: info.id,
            class: Arc::downgrade(class),
            class_id: class.id(),
            name: info.name.clone(),
            signature: info.signature.clone(),
            start_line: info.start_line,
            end_line: info.end_line,
            monitored: AtomicBool::new(false),
            timed: AtomicBool::new(false),
            debug: AtomicBool::new(false),
            trigger: AtomicBool::new(false),
            prof_point_mem: AtomicBool::new(false),
            nr_calls: AtomicU64::new(0),
            cpu_sum: AtomicU64::new(0),
            elapsed_sum: AtomicU64::new(0),
            contention_sum: AtomicU64::new(0),
            nr_contentions: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn id(&self) -> MethodId {
        self.id
    }

    #[must_use]
    pub fn class_id(&self) -> ClassId {
        self.class_id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn signature(&self) -> &str {
        &self.signature
    }

    #[must_use]
    pub fn start_line(&self) -> Option<u32> {
        self.start_line
    }

    #[must_use]
    pub fn end_line(&self) -> Option<u32> {
        self.end_line
    }

    /// Display name of the owning class, or `?` once the class is gone.
    #[must_use]
    pub fn class_name(&self) -> String {
        self.class.upgrade().map_or_else(|| "?".to_string(), |c| c.name().to_string())
    }

    #[must_use]
    pub fn class(&self) -> Option<Arc<ClassRecord>> {
        self.class.upgrade()
    }

    /// `Class.method`, the form configuration patterns match against.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.class_name(), self.name)
    }

    /// Recompute the flag set from configuration and the owning class.
    pub fn classify(&self, config: &Config) {
        let qualified = self.qualified_name();
        let class_monitored = self.class.upgrade().is_some_and(|c| c.is_monitored());
        self.monitored.store(class_monitored, Ordering::Relaxed);
        self.timed.store(config.is_timed(&qualified), Ordering::Relaxed);
        self.debug.store(config.is_debug(&qualified), Ordering::Relaxed);
        self.trigger.store(config.is_trigger(&qualified, &self.signature), Ordering::Relaxed);
        self.prof_point_mem
            .store(config.monitor_memory_on && self.name == "<init>", Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_monitored(&self) -> bool {
        self.monitored.load(Ordering::Relaxed)
    }

    pub fn set_monitored(&self, value: bool) {
        self.monitored.store(value, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_timed(&self) -> bool {
        self.timed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn is_debug(&self) -> bool {
        self.debug.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn is_trigger(&self) -> bool {
        self.trigger.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn is_prof_point_mem(&self) -> bool {
        self.prof_point_mem.load(Ordering::Relaxed)
    }

    /// Account one call on enter.
    pub fn enter(&self) {
        self.nr_calls.fetch_add(1, Ordering::Relaxed);
    }

    /// Account timing on exit.
    pub fn exit(&self, cpu: Micros, elapsed: Micros) {
        self.cpu_sum.fetch_add(cpu.0, Ordering::Relaxed);
        self.elapsed_sum.fetch_add(elapsed.0, Ordering::Relaxed);
    }

    /// Account one contention observed while this method held the top frame.
    pub fn add_contention(&self, wait: Micros) {
        self.contention_sum.fetch_add(wait.0, Ordering::Relaxed);
        self.nr_contentions.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn nr_calls(&self) -> u64 {
        self.nr_calls.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn cpu_sum(&self) -> Micros {
        Micros(self.cpu_sum.load(Ordering::Relaxed))
    }

    #[must_use]
    pub fn elapsed_sum(&self) -> Micros {
        Micros(self.elapsed_sum.load(Ordering::Relaxed))
    }

    #[must_use]
    pub fn contention_sum(&self) -> Micros {
        Micros(self.contention_sum.load(Ordering::Relaxed))
    }

    #[must_use]
    pub fn nr_contentions(&self) -> u64 {
        self.nr_contentions.load(Ordering::Relaxed)
    }

    pub fn reset_counters(&self) {
        self.nr_calls.store(0, Ordering::Relaxed);
        self.cpu_sum.store(0, Ordering::Relaxed);
        self.elapsed_sum.store(0, Ordering::Relaxed);
        self.contention_sum.store(0, Ordering::Relaxed);
        self.nr_contentions.store(0, Ordering::Relaxed);
    }

    /// One `Method` row for the method dump.
    pub fn dump(&self, parent: &mut Tag, with_signature: bool, with_hash: bool) {
        let row = parent.child("Method");
        row.put("MethodName", self.qualified_name())
            .put("NrCalls", self.nr_calls())
            .put("CpuTime", crate::output::AttrValue::Micros(self.cpu_sum().0))
            .put("Elapsed", crate::output::AttrValue::Micros(self.elapsed_sum().0))
            .put("Contention", crate::output::AttrValue::Micros(self.contention_sum().0));
        if with_signature {
            row.put("Signature", self.signature.as_str());
        }
        if with_hash {
            row.put("ID", crate::output::AttrValue::Hex(self.id.0));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::classes::tests::test_class;

    fn method_info(name: &str) -> MethodInfo {
        MethodInfo {
            id: MethodId(0x10),
            name: name.to_string(),
            signature: "()V".to_string(),
            start_line: Some(10),
            end_line: Some(20),
        }
    }

    #[test]
    fn test_counters_accumulate() {
        let class = test_class(1, "com/acme/Shop");
        let method = MethodRecord::new(&method_info("checkout"), &class);
        method.enter();
        method.enter();
        method.exit(Micros(80), Micros(120));
        method.exit(Micros(20), Micros(30));
        assert_eq!(method.nr_calls(), 2);
        assert_eq!(method.cpu_sum(), Micros(100));
        assert_eq!(method.elapsed_sum(), Micros(150));
    }

    #[test]
    fn test_reset_zeroes_counters() {
        let class = test_class(1, "com/acme/Shop");
        let method = MethodRecord::new(&method_info("checkout"), &class);
        method.enter();
        method.exit(Micros(5), Micros(5));
        method.add_contention(Micros(40));
        method.reset_counters();
        assert_eq!(method.nr_calls(), 0);
        assert_eq!(method.cpu_sum(), Micros(0));
        assert_eq!(method.nr_contentions(), 0);
    }

    #[test]
    fn test_qualified_name_survives_class_drop() {
        let class = test_class(1, "com/acme/Shop");
        let method = MethodRecord::new(&method_info("checkout"), &class);
        assert_eq!(method.qualified_name(), "com/acme/Shop.checkout");
        drop(class);
        assert_eq!(method.qualified_name(), "?.checkout");
    }

    #[test]
    fn test_classify_prof_point() {
        let class = test_class(1, "com/acme/Shop");
        class.set_monitored(true);
        let ctor = MethodRecord::new(&method_info("<init>"), &class);
        let config = Config::default();
        ctor.classify(&config);
        assert!(ctor.is_prof_point_mem());
        assert!(ctor.is_monitored());
        assert!(ctor.is_timed()); // global timer defaults on
    }
}
