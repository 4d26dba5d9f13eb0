//! Heap sweep: callback-based iteration over live objects
//!
//! The host walks every live object and hands each one to the monitor,
//! which tallies per-class heap counts for the classes it tracks. Only
//! objects of the current transaction generation count; records from an
//! earlier run are ignored, and untagged objects are invisible to the
//! monitor by definition.

use std::sync::Arc;

use sherlok_runtime::ClassId;

use crate::monitor::Monitor;
use crate::output::Tag;
use crate::registry::classes::ClassRecord;

/// Figures of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapTotals {
    pub bytes: u64,
    pub count: u64,
    /// Objects the host reported, tagged or not.
    pub objects_seen: u64,
}

impl Monitor {
    /// Walk the host heap, tallying tagged current-generation objects into
    /// their context class's heap counters. `filter` restricts the tally to
    /// one class. Each call is its own pass; a class's figures always
    /// reflect the latest pass that saw it.
    pub fn heap_sweep(&self, filter: Option<ClassId>) -> HeapTotals {
        let pass = self.next_sweep_pass();
        let generation = self.generation();
        let mut tallies: Vec<(ClassId, u64)> = Vec::new();
        let mut seen = 0u64;

        {
            let memory = self.memory.lock().unwrap();
            self.host.iterate_heap(&mut |object| {
                seen += 1;
                let Some(tag) = object.tag else {
                    return;
                };
                let Some(record) = memory.objects.get(tag.0) else {
                    return;
                };
                if record.generation != generation {
                    return;
                }
                if filter.is_some_and(|wanted| record.class != wanted) {
                    return;
                }
                tallies.push((record.class, record.size));
            });
        }

        let mut totals = HeapTotals { objects_seen: seen, ..HeapTotals::default() };
        for (class_id, size) in tallies {
            if let Some(class) = self.find_class_any(class_id) {
                class.heap_tally(size, pass);
                totals.bytes += size;
                totals.count += 1;
            }
        }
        totals
    }

    /// Forget the figures of the last sweep on every class.
    pub fn clear_heap_tallies(&self) {
        let registry = self.registry.read().unwrap();
        for class in registry.classes() {
            class.clear_heap_tally();
        }
        for class in registry.deleted_classes() {
            class.clear_heap_tally();
        }
    }

    /// Growth alert fired for `class`: one report with the class figures,
    /// its history ring, and its share of the heap.
    pub(crate) fn emit_leak_report(&self, class: &Arc<ClassRecord>) {
        let totals = self.heap_sweep(Some(class.id()));

        let mut root = Tag::new("Traces");
        root.put("Type", "Leak").put("ClassName", class.name());

        class.dump(&mut root, true);

        let history = root.child("List");
        history
            .put("Detail", "History")
            .put("ID", crate::output::AttrValue::Hex(class.id().0));
        class.dump_history(history);

        let heap = root.child("List");
        heap.put("Detail", "Heap")
            .put("ID", crate::output::AttrValue::Hex(class.id().0))
            .put("Size", totals.bytes)
            .put("Count", totals.count);

        self.emit(&root);
    }
}
