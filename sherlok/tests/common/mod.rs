//! Shared fixtures: a scripted host runtime and event helpers

// Not every integration test uses every helper.
#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use sherlok::{Config, Monitor};
use sherlok_runtime::{
    ClassId, ClassInfo, GuestCallError, HeapObject, HeapUsage, HostRuntime, MethodId, MethodInfo,
    NativeFrame, ObjectTag, ThreadId, ThreadInfo,
};

/// A host whose heap is whatever the test scripted into it.
#[derive(Default)]
pub struct TestHost {
    pub live: Mutex<Vec<HeapObject>>,
    pub used: AtomicU64,
    pub gc_forced: AtomicU64,
}

impl TestHost {
    pub fn put_object(&self, tag: u64, class: u64, size: u64) {
        self.live.lock().unwrap().push(HeapObject {
            tag: Some(ObjectTag(tag)),
            class: ClassId(class),
            size,
        });
        self.used.fetch_add(size, Ordering::Relaxed);
    }

    pub fn drop_object(&self, tag: u64) {
        let mut live = self.live.lock().unwrap();
        if let Some(position) = live.iter().position(|o| o.tag == Some(ObjectTag(tag))) {
            let object = live.remove(position);
            self.used.fetch_sub(object.size, Ordering::Relaxed);
        }
    }
}

impl HostRuntime for TestHost {
    fn force_gc(&self) {
        self.gc_forced.fetch_add(1, Ordering::Relaxed);
    }

    fn heap_usage(&self) -> HeapUsage {
        let used = self.used.load(Ordering::Relaxed);
        HeapUsage { used, committed: used.max(1024), init: 1024 }
    }

    fn iterate_heap(&self, visit: &mut dyn FnMut(HeapObject)) {
        for object in self.live.lock().unwrap().iter() {
            visit(*object);
        }
    }

    fn describe_object(&self, tag: ObjectTag) -> Result<String, GuestCallError> {
        Ok(format!("object@{tag}"))
    }

    fn describe_parameters(
        &self,
        _thread: ThreadId,
        _method: MethodId,
    ) -> Result<Vec<(String, String)>, GuestCallError> {
        Ok(vec![("arg0".to_string(), "scripted".to_string())])
    }

    fn native_frames(&self, _thread: ThreadId) -> Vec<NativeFrame> {
        vec![NativeFrame {
            class_name: "native/Frame".to_string(),
            method_name: "run".to_string(),
            line: Some(1),
        }]
    }
}

pub struct Fixture {
    pub monitor: Arc<Monitor>,
    pub host: Arc<TestHost>,
    pub log_path: PathBuf,
    _dir: tempfile::TempDir,
}

/// Monitor wired for observation: active, no thresholds hiding small test
/// figures, trace output captured in a log file.
pub fn fixture(extra_options: &str) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("sherlok.log");
    let mut config = Config::default();
    config
        .apply_options(&format!(
            "MonitorOn=on;MinMemorySize=0;Tracer=tree;LogFile={};{extra_options}",
            log_path.display()
        ))
        .unwrap();
    let host = Arc::new(TestHost::default());
    let monitor = Monitor::new(config, host.clone());
    Fixture { monitor, host, log_path, _dir: dir }
}

impl Fixture {
    pub fn log(&self) -> String {
        std::fs::read_to_string(&self.log_path).unwrap_or_default()
    }
}

pub const THREAD: ThreadId = ThreadId(0x7);

pub fn method_info(id: u64, name: &str) -> MethodInfo {
    MethodInfo {
        id: MethodId(id),
        name: name.to_string(),
        signature: "()V".to_string(),
        start_line: Some(1),
        end_line: Some(9),
    }
}

pub fn class_info(id: u64, name: &str, methods: Vec<MethodInfo>) -> ClassInfo {
    ClassInfo {
        id: ClassId(id),
        name: name.to_string(),
        super_id: None,
        object_size: 32,
        object_tag: None,
        methods,
    }
}

/// Register the standard test class: `demo/Shop` with three methods.
pub fn prepare_shop(fixture: &Fixture) {
    fixture.monitor.on_thread_start(&ThreadInfo { id: THREAD, name: "test-worker".to_string() });
    fixture.monitor.on_class_prepare(
        THREAD,
        &class_info(
            0x100,
            "demo/Shop",
            vec![
                method_info(0x101, "checkout"),
                method_info(0x102, "browse"),
                method_info(0x103, "pay"),
            ],
        ),
    );
}
