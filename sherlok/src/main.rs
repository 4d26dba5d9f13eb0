//! Standalone monitor with a synthetic workload
//!
//! The monitor normally rides inside a host runtime as an agent. This
//! binary stands one up around a simulated runtime so the shell can be
//! exercised against live data: `sherlok --simulate 60` runs a scripted
//! workload for a minute while the shell listens on the configured port.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use sherlok::{Config, Monitor};
use sherlok_runtime::{
    ClassId, ClassInfo, ContentionEvent, GuestCallError, HeapObject, HeapUsage, HostRuntime,
    MethodId, MethodInfo, NativeFrame, ObjectTag, ThreadId, ThreadInfo,
};

#[derive(Parser)]
#[command(
    name = "sherlok",
    about = "In-process profiler and monitor with a TCP command shell",
    after_help = "\
EXAMPLES:
    sherlok --simulate 60                      Scripted workload, shell on the default port
    sherlok --config sherlok.properties
    sherlok --options 'Port=7070;MonitorOn=on;HistoryAlert=50'"
)]
struct Args {
    /// Properties file to load
    #[arg(short, long, value_name = "FILE")]
    config: Option<std::path::PathBuf>,

    /// Agent option string (semicolon separated key=value pairs)
    #[arg(short, long, value_name = "OPTS")]
    options: Option<String>,

    /// Shell port (overrides the Port property; 0 picks a free port)
    #[arg(short, long)]
    port: Option<u16>,

    /// Drive a synthetic workload for N seconds (0 = until killed)
    #[arg(long, value_name = "SECONDS")]
    simulate: Option<u64>,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = Config::default();
    if let Some(path) = &args.config {
        config
            .load_properties(path)
            .with_context(|| format!("loading {}", path.display()))?;
    }
    if let Some(options) = &args.options {
        config.apply_options(options).context("parsing --options")?;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if args.simulate.is_some() {
        config.monitor_on = true;
    }

    let host = Arc::new(SimRuntime::default());
    let monitor = Monitor::new(config, Arc::<SimRuntime>::clone(&host));
    monitor.start();

    if !args.quiet {
        let deadline = Instant::now() + Duration::from_secs(2);
        while monitor.shell_port() == 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        match monitor.shell_port() {
            0 => println!("sherlok {} (shell unavailable)", env!("CARGO_PKG_VERSION")),
            port => println!("sherlok {} - shell on port {port}", env!("CARGO_PKG_VERSION")),
        }
    }

    match args.simulate {
        Some(seconds) => {
            info!("running synthetic workload for {seconds}s");
            run_workload(&monitor, &host, seconds);
        }
        None => loop {
            std::thread::sleep(Duration::from_secs(60));
        },
    }

    monitor.shutdown();
    Ok(())
}

// =============================================================================
// SIMULATED RUNTIME
// =============================================================================

/// A host good enough to demonstrate every shell command: it remembers the
/// workload's live objects for heap iteration and honors forced GCs by
/// flagging the workload driver.
#[derive(Default)]
struct SimRuntime {
    live: Mutex<Vec<HeapObject>>,
    used: AtomicU64,
    gc_requested: AtomicBool,
}

impl SimRuntime {
    fn allocate(&self, tag: ObjectTag, class: ClassId, size: u64) {
        self.live.lock().unwrap().push(HeapObject { tag: Some(tag), class, size });
        self.used.fetch_add(size, Ordering::Relaxed);
    }

    fn free_oldest(&self) -> Option<HeapObject> {
        let mut live = self.live.lock().unwrap();
        if live.is_empty() {
            return None;
        }
        let object = live.remove(0);
        self.used.fetch_sub(object.size, Ordering::Relaxed);
        Some(object)
    }

    fn take_gc_request(&self) -> bool {
        self.gc_requested.swap(false, Ordering::Relaxed)
    }
}

impl HostRuntime for SimRuntime {
    fn force_gc(&self) {
        self.gc_requested.store(true, Ordering::Relaxed);
    }

    fn heap_usage(&self) -> HeapUsage {
        let used = self.used.load(Ordering::Relaxed);
        HeapUsage { used, committed: used.next_power_of_two().max(1 << 20), init: 1 << 20 }
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
        method: MethodId,
    ) -> Result<Vec<(String, String)>, GuestCallError> {
        Ok(vec![("arg0".to_string(), format!("value-{method}"))])
    }

    fn native_frames(&self, _thread: ThreadId) -> Vec<NativeFrame> {
        Vec::new()
    }
}

// =============================================================================
// WORKLOAD
// =============================================================================

const SHOP_CLASS: u64 = 0x1000;
const CACHE_CLASS: u64 = 0x2000;
const CHECKOUT: u64 = 0x1001;
const BROWSE: u64 = 0x1002;
const CACHE_PUT: u64 = 0x2001;

fn method(id: u64, name: &str) -> MethodInfo {
    MethodInfo {
        id: MethodId(id),
        name: name.to_string(),
        signature: "()V".to_string(),
        start_line: None,
        end_line: None,
    }
}

fn prepare_classes(monitor: &Monitor, thread: ThreadId) {
    monitor.on_class_prepare(
        thread,
        &ClassInfo {
            id: ClassId(SHOP_CLASS),
            name: "demo/Shop".to_string(),
            super_id: None,
            object_size: 48,
            object_tag: None,
            methods: vec![method(CHECKOUT, "checkout"), method(BROWSE, "browse")],
        },
    );
    monitor.on_class_prepare(
        thread,
        &ClassInfo {
            id: ClassId(CACHE_CLASS),
            name: "demo/Cache".to_string(),
            super_id: None,
            object_size: 96,
            object_tag: None,
            methods: vec![method(CACHE_PUT, "put")],
        },
    );
}

fn run_workload(monitor: &Arc<Monitor>, host: &Arc<SimRuntime>, seconds: u64) {
    let deadline =
        (seconds > 0).then(|| Instant::now() + Duration::from_secs(seconds));
    let next_tag = Arc::new(AtomicU64::new(1));

    let mut workers = Vec::new();
    for worker in 0..2u64 {
        let monitor = Arc::clone(monitor);
        let host = Arc::<SimRuntime>::clone(host);
        let next_tag = Arc::clone(&next_tag);
        workers.push(std::thread::spawn(move || {
            let thread = ThreadId(0x100 + worker);
            monitor.on_thread_start(&ThreadInfo { id: thread, name: format!("sim-worker-{worker}") });
            if worker == 0 {
                prepare_classes(&monitor, thread);
            } else {
                // The other worker waits for the classes to exist.
                std::thread::sleep(Duration::from_millis(20));
            }

            let mut iteration = 0u64;
            loop {
                if deadline.is_some_and(|at| Instant::now() >= at) {
                    break;
                }
                iteration += 1;

                monitor.on_method_enter(thread, MethodId(BROWSE));
                monitor.on_method_enter(thread, MethodId(CHECKOUT));
                let tag = ObjectTag(next_tag.fetch_add(1, Ordering::Relaxed));
                let size = 256 + (iteration % 7) * 64;
                host.allocate(tag, ClassId(SHOP_CLASS), size);
                monitor.on_object_alloc(thread, tag, ClassId(SHOP_CLASS), size);
                std::thread::sleep(Duration::from_millis(3));
                monitor.on_method_exit(thread, MethodId(CHECKOUT));
                monitor.on_method_exit(thread, MethodId(BROWSE));

                if iteration % 3 == 0 {
                    monitor.on_method_enter(thread, MethodId(CACHE_PUT));
                    monitor.on_contention(thread, ContentionEvent::EnterContended);
                    std::thread::sleep(Duration::from_millis(2));
                    monitor.on_contention(thread, ContentionEvent::EnterDone);
                    monitor.on_method_exit(thread, MethodId(CACHE_PUT));
                }

                if iteration % 5 == 0 {
                    if let Some(object) = host.free_oldest() {
                        if let Some(tag) = object.tag {
                            monitor.on_object_free(tag);
                        }
                    }
                }

                if iteration % 50 == 0 || host.take_gc_request() {
                    monitor.on_gc_start();
                    std::thread::sleep(Duration::from_millis(1));
                    monitor.on_gc_finish();
                }
            }
            monitor.on_thread_end(thread);
        }));
    }

    for worker in workers {
        let _ = worker.join();
    }
}
