//! Registries: class, method, thread, and exception state
//!
//! [`Registry`] holds the class and method maps behind one lock domain
//! (callbacks take it shared, structural changes take it exclusive). Thread
//! records live in their own map; see [`threads`].

pub mod classes;
pub mod methods;
pub mod threads;

use std::sync::Arc;

use log::debug;

use sherlok_runtime::{ClassId, ClassInfo, MethodId};

use crate::config::Config;
use crate::containers::IdMap;
use classes::ClassRecord;
use methods::MethodRecord;

/// Per-exception-class counter, keyed by the hash of the class name.
pub struct ExceptionRecord {
    pub name: String,
    pub count: u64,
}

/// FNV-1a, used to key string-identified entities (exception names, the
/// context view's request/component pairs).
#[must_use]
pub fn string_hash(text: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in text.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

#[derive(Default)]
pub struct Registry {
    classes: IdMap<Arc<ClassRecord>>,
    /// Methods of every class; arena-tagged with the owning class id so a
    /// class unload drops them in one pass.
    methods: IdMap<Arc<MethodRecord>>,
    /// Unloaded classes still pinned by live object records.
    deleted: Vec<Arc<ClassRecord>>,
    exceptions: IdMap<ExceptionRecord>,
    /// The currently configured trigger method, once registered.
    trigger: Option<Arc<MethodRecord>>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Registry::default()
    }

    // -------------------------------------------------------------------------
    // Classes
    // -------------------------------------------------------------------------

    /// Register a prepared class with its methods. Idempotent; re-preparing
    /// a known id returns the existing record untouched.
    pub fn register_class(&mut self, info: &ClassInfo, config: &Config) -> Arc<ClassRecord> {
        if let Some(existing) = self.classes.get(info.id.0) {
            return Arc::clone(existing);
        }
        let class = Arc::new(ClassRecord::new(info));
        class.classify(config);
        for method_info in &info.methods {
            let method = Arc::new(MethodRecord::new(method_info, &class));
            method.classify(config);
            if method.is_trigger() {
                self.trigger = Some(Arc::clone(&method));
            }
            class.add_method(Arc::clone(&method));
            self.methods.insert_in_arena(method_info.id.0, info.id.0, method);
        }
        self.classes.insert(info.id.0, Arc::clone(&class));
        class
    }

    /// Record for a class only seen through allocations so far.
    pub fn ensure_class(&mut self, id: ClassId, name_hint: &str, config: &Config) -> Arc<ClassRecord> {
        if let Some(existing) = self.classes.get(id.0) {
            return Arc::clone(existing);
        }
        let class = Arc::new(ClassRecord::synthetic(id, name_hint));
        class.classify(config);
        self.classes.insert(id.0, Arc::clone(&class));
        class
    }

    #[must_use]
    pub fn find_class(&self, id: ClassId) -> Option<Arc<ClassRecord>> {
        self.classes.get(id.0).cloned()
    }

    /// Handle a class unload. The record leaves the active map immediately;
    /// with live objects still carrying its tag it stays pinned on the
    /// deleted list until the last one drains.
    pub fn unload_class(&mut self, id: ClassId) {
        let Some(class) = self.classes.remove(id.0) else {
            return;
        };
        let dropped = self.methods.remove_arena(id.0);
        debug!("class {} unloaded, {dropped} methods dropped", class.name());
        if self.trigger.as_ref().is_some_and(|t| t.class_id() == id) {
            self.trigger = None;
        }
        if class.live_count() > 0 {
            class.set_pinned(true);
            self.deleted.push(class);
        }
    }

    /// Drop deleted classes whose last pinned reference has drained.
    pub fn drain_deleted(&mut self) {
        self.deleted.retain(|class| class.live_count() > 0);
    }

    #[must_use]
    pub fn deleted_classes(&self) -> &[Arc<ClassRecord>] {
        &self.deleted
    }

    pub fn classes(&self) -> impl Iterator<Item = &Arc<ClassRecord>> {
        self.classes.values()
    }

    #[must_use]
    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    // -------------------------------------------------------------------------
    // Methods
    // -------------------------------------------------------------------------

    #[must_use]
    pub fn find_method(&self, id: MethodId) -> Option<Arc<MethodRecord>> {
        self.methods.get(id.0).cloned()
    }

    pub fn methods(&self) -> impl Iterator<Item = &Arc<MethodRecord>> {
        self.methods.values()
    }

    #[must_use]
    pub fn method_count(&self) -> usize {
        self.methods.len()
    }

    #[must_use]
    pub fn trigger_method(&self) -> Option<Arc<MethodRecord>> {
        self.trigger.clone()
    }

    // -------------------------------------------------------------------------
    // Context view (request/component profiling)
    // -------------------------------------------------------------------------

    /// Map a request/component pair onto synthetic class and method records,
    /// registering both on first sight. The ordinary enter/exit path then
    /// profiles them like host-reported methods.
    pub fn register_context(
        &mut self,
        request: &str,
        component: &str,
        config: &Config,
    ) -> Arc<MethodRecord> {
        let method_key = string_hash(&format!("{request}.{component}"));
        if let Some(existing) = self.methods.get(method_key) {
            return Arc::clone(existing);
        }

        let class_key = ClassId(string_hash(request));
        let class = self.ensure_class(class_key, request, config);
        let info = sherlok_runtime::MethodInfo {
            id: MethodId(method_key),
            name: component.to_string(),
            signature: String::new(),
            start_line: None,
            end_line: None,
        };
        let method = Arc::new(MethodRecord::new(&info, &class));
        method.classify(config);
        // Context records are always profiled; the scope filters speak about
        // host packages, not request names.
        method.set_monitored(true);
        class.set_monitored(true);
        class.add_method(Arc::clone(&method));
        self.methods.insert_in_arena(method_key, class_key.0, Arc::clone(&method));
        method
    }

    // -------------------------------------------------------------------------
    // Exceptions
    // -------------------------------------------------------------------------

    /// Count one thrown exception by class name; returns the new total.
    pub fn note_exception(&mut self, name: &str) -> u64 {
        let key = string_hash(name);
        if let Some(record) = self.exceptions.get_mut(key) {
            record.count += 1;
            return record.count;
        }
        self.exceptions.insert(key, ExceptionRecord { name: name.to_string(), count: 1 });
        1
    }

    pub fn exceptions(&self) -> impl Iterator<Item = &ExceptionRecord> {
        self.exceptions.values()
    }

    // -------------------------------------------------------------------------
    // Reset
    // -------------------------------------------------------------------------

    /// Snapshot-to-zero: every counter cleared, every record reclassified
    /// against the (possibly reloaded) configuration. Identity survives.
    pub fn reset(&mut self, config: &Config) {
        self.trigger = None;
        for (_, class) in self.classes.iter() {
            class.classify(config);
            class.reset_counters();
        }
        for (_, method) in self.methods.iter() {
            method.classify(config);
            method.reset_counters();
            if method.is_trigger() {
                self.trigger = Some(Arc::clone(method));
            }
        }
        self.exceptions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sherlok_runtime::MethodInfo;

    fn class_info(id: u64, name: &str, methods: &[(u64, &str)]) -> ClassInfo {
        ClassInfo {
            id: ClassId(id),
            name: name.to_string(),
            super_id: None,
            object_size: 16,
            object_tag: None,
            methods: methods
                .iter()
                .map(|(mid, mname)| MethodInfo {
                    id: MethodId(*mid),
                    name: (*mname).to_string(),
                    signature: "()V".to_string(),
                    start_line: None,
                    end_line: None,
                })
                .collect(),
        }
    }

    #[test]
    fn test_register_class_registers_methods() {
        let mut registry = Registry::new();
        let config = Config::default();
        let info = class_info(1, "com/acme/Shop", &[(0x10, "checkout"), (0x11, "browse")]);
        let class = registry.register_class(&info, &config);
        assert_eq!(class.name(), "com/acme/Shop");
        assert_eq!(registry.method_count(), 2);
        let method = registry.find_method(MethodId(0x10)).unwrap();
        assert_eq!(method.qualified_name(), "com/acme/Shop.checkout");
    }

    #[test]
    fn test_register_class_is_idempotent() {
        let mut registry = Registry::new();
        let config = Config::default();
        let info = class_info(1, "com/acme/Shop", &[(0x10, "checkout")]);
        let first = registry.register_class(&info, &config);
        let second = registry.register_class(&info, &config);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.method_count(), 1);
    }

    #[test]
    fn test_trigger_method_resolved_at_registration() {
        let mut registry = Registry::new();
        let mut config = Config::default();
        config.set("TriggerMethod", "com/acme/Shop.checkout").unwrap();
        registry.register_class(&class_info(1, "com/acme/Shop", &[(0x10, "checkout")]), &config);
        let trigger = registry.trigger_method().unwrap();
        assert_eq!(trigger.id(), MethodId(0x10));
    }

    #[test]
    fn test_unload_without_live_objects_drops_everything() {
        let mut registry = Registry::new();
        let config = Config::default();
        registry.register_class(&class_info(1, "com/acme/Shop", &[(0x10, "checkout")]), &config);
        registry.unload_class(ClassId(1));
        assert!(registry.find_class(ClassId(1)).is_none());
        assert!(registry.find_method(MethodId(0x10)).is_none());
        assert!(registry.deleted_classes().is_empty());
    }

    #[test]
    fn test_unload_with_live_objects_pins() {
        let mut registry = Registry::new();
        let config = Config::default();
        let class =
            registry.register_class(&class_info(1, "com/acme/Shop", &[(0x10, "checkout")]), &config);
        class.allocate(64, crate::domain::GcIndex(0), 0, 0);
        registry.unload_class(ClassId(1));
        assert_eq!(registry.deleted_classes().len(), 1);
        assert!(registry.deleted_classes()[0].is_pinned());
        // The last object drains; the record goes with it.
        class.deallocate(64);
        registry.drain_deleted();
        assert!(registry.deleted_classes().is_empty());
    }

    #[test]
    fn test_context_registration_is_idempotent() {
        let mut registry = Registry::new();
        let config = Config::default();
        let first = registry.register_context("checkout-request", "validate", &config);
        let second = registry.register_context("checkout-request", "validate", &config);
        assert!(Arc::ptr_eq(&first, &second));
        assert!(first.is_monitored());
        assert_eq!(first.qualified_name(), "checkout-request.validate");
    }

    #[test]
    fn test_exception_counting() {
        let mut registry = Registry::new();
        assert_eq!(registry.note_exception("java/lang/NullPointerException"), 1);
        assert_eq!(registry.note_exception("java/lang/NullPointerException"), 2);
        assert_eq!(registry.note_exception("java/io/IOException"), 1);
        assert_eq!(registry.exceptions().count(), 2);
    }

    #[test]
    fn test_reset_zeroes_and_reclassifies() {
        let mut registry = Registry::new();
        let mut config = Config::default();
        registry.register_class(&class_info(1, "com/acme/Shop", &[(0x10, "checkout")]), &config);
        let method = registry.find_method(MethodId(0x10)).unwrap();
        method.enter();
        registry.note_exception("java/io/IOException");

        config.set("TriggerMethod", "com/acme/Shop.checkout").unwrap();
        registry.reset(&config);
        assert_eq!(method.nr_calls(), 0);
        assert_eq!(registry.exceptions().count(), 0);
        assert!(registry.trigger_method().is_some());
    }
}
