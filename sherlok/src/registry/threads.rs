//! Per-thread records: callstacks, contention state machine, CPU baseline
//!
//! A record is created on first observation of a thread and cached in a
//! thread-local slot so subsequent callbacks resolve it in O(1). The owning
//! thread is the only writer of its stacks; dump commands lock each record
//! in turn for a consistent per-record snapshot.

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use sherlok_runtime::{ContentionEvent, ThreadId};

use crate::callstack::CallStack;
use crate::clock::HpTick;
use crate::domain::Micros;

/// Contention state. At any instant a thread is in exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThreadState {
    #[default]
    Runnable,
    WaitingForMonitor,
    InWait,
}

impl ThreadState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ThreadState::Runnable => "Runnable",
            ThreadState::WaitingForMonitor => "WaitingForMonitor",
            ThreadState::InWait => "InWait",
        }
    }
}

#[derive(Default)]
struct Contention {
    state: ThreadState,
    /// Tick of the last state change.
    since: HpTick,
}

pub struct ThreadRecord {
    id: ThreadId,
    name: String,
    stack: Mutex<CallStack>,
    debug_stack: Mutex<CallStack>,
    contention: Mutex<Contention>,
    /// CPU figure at monitoring start; `dt` shows consumption since.
    cpu_base: AtomicU64,
    last_cpu: AtomicU64,
    /// Set around host call-outs that could synthesize events; callbacks
    /// observing the flag return immediately.
    processing_jni: AtomicBool,
    /// The trigger method is live on this thread's stack.
    trigger_armed: AtomicBool,
    ended: AtomicBool,
}

impl ThreadRecord {
    #[must_use]
    pub fn new(id: ThreadId, name: String) -> Self {
        ThreadRecord {
            id,
            name,
            stack: Mutex::new(CallStack::new()),
            debug_stack: Mutex::new(CallStack::new()),
            contention: Mutex::new(Contention::default()),
            cpu_base: AtomicU64::new(0),
            last_cpu: AtomicU64::new(0),
            processing_jni: AtomicBool::new(false),
            trigger_armed: AtomicBool::new(false),
            ended: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn id(&self) -> ThreadId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stack(&self) -> MutexGuard<'_, CallStack> {
        self.stack.lock().unwrap()
    }

    pub fn debug_stack(&self) -> MutexGuard<'_, CallStack> {
        self.debug_stack.lock().unwrap()
    }

    #[must_use]
    pub fn state(&self) -> ThreadState {
        self.contention.lock().unwrap().state
    }

    /// Drive the contention state machine.
    ///
    /// Returns the wait duration on the two completing transitions. Events
    /// arriving in an unexpected state are treated as lost and ignored; the
    /// machine never latches.
    pub fn change_state(&self, event: ContentionEvent, now: HpTick) -> Option<Micros> {
        let mut contention = self.contention.lock().unwrap();
        match (contention.state, event) {
            (ThreadState::Runnable, ContentionEvent::EnterContended) => {
                contention.state = ThreadState::WaitingForMonitor;
                contention.since = now;
                None
            }
            (ThreadState::WaitingForMonitor, ContentionEvent::EnterDone) => {
                contention.state = ThreadState::Runnable;
                Some(Micros(now.0.saturating_sub(contention.since.0)))
            }
            (ThreadState::Runnable, ContentionEvent::WaitCall) => {
                contention.state = ThreadState::InWait;
                contention.since = now;
                None
            }
            (ThreadState::InWait, ContentionEvent::WaitReturn) => {
                contention.state = ThreadState::Runnable;
                Some(Micros(now.0.saturating_sub(contention.since.0)))
            }
            _ => None,
        }
    }

    /// Enter a host call-out. Returns `None` when the thread is already
    /// inside one; the caller must then skip the call entirely.
    #[must_use]
    pub fn enter_jni(&self) -> Option<JniGuard<'_>> {
        if self.processing_jni.swap(true, Ordering::Relaxed) {
            None
        } else {
            Some(JniGuard(self))
        }
    }

    #[must_use]
    pub fn is_processing_jni(&self) -> bool {
        self.processing_jni.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn is_trigger_armed(&self) -> bool {
        self.trigger_armed.load(Ordering::Relaxed)
    }

    pub fn arm_trigger(&self) {
        self.trigger_armed.store(true, Ordering::Relaxed);
    }

    pub fn disarm_trigger(&self) {
        self.trigger_armed.store(false, Ordering::Relaxed);
    }

    pub fn set_cpu_base(&self, micros: Micros) {
        self.cpu_base.store(micros.0, Ordering::Relaxed);
    }

    pub fn note_cpu(&self, micros: Micros) {
        self.last_cpu.store(micros.0, Ordering::Relaxed);
    }

    /// CPU consumed since the baseline, as of the last sample.
    #[must_use]
    pub fn cpu_used(&self) -> Micros {
        let last = self.last_cpu.load(Ordering::Relaxed);
        Micros(last.saturating_sub(self.cpu_base.load(Ordering::Relaxed)))
    }

    pub fn mark_ended(&self) {
        self.ended.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn has_ended(&self) -> bool {
        self.ended.load(Ordering::Relaxed)
    }

    /// Clear stacks, trigger, and contention state; identity survives.
    pub fn reset(&self) {
        self.stack().clear();
        self.debug_stack().clear();
        self.disarm_trigger();
        let mut contention = self.contention.lock().unwrap();
        contention.state = ThreadState::Runnable;
        contention.since = HpTick(0);
        self.cpu_base.store(self.last_cpu.load(Ordering::Relaxed), Ordering::Relaxed);
    }
}

/// RAII guard for the `processing_jni` flag.
pub struct JniGuard<'a>(&'a ThreadRecord);

impl Drop for JniGuard<'_> {
    fn drop(&mut self) {
        self.0.processing_jni.store(false, Ordering::Relaxed);
    }
}

// =============================================================================
// THREAD-LOCAL FAST PATH
// =============================================================================

thread_local! {
    /// The last record this OS thread resolved, mirroring the runtime's
    /// thread-local storage slot. Keyed by monitor instance as well, so
    /// monitors running side by side never hand out each other's records.
    static LAST_SEEN: RefCell<Option<(u64, ThreadId, Arc<ThreadRecord>)>> =
        const { RefCell::new(None) };
}

/// O(1) lookup for the common case: the same host thread reporting again.
#[must_use]
pub fn cached(monitor: u64, id: ThreadId) -> Option<Arc<ThreadRecord>> {
    LAST_SEEN.with(|slot| {
        slot.borrow().as_ref().and_then(|(owner, cached_id, record)| {
            if *owner == monitor && *cached_id == id {
                Some(Arc::clone(record))
            } else {
                None
            }
        })
    })
}

pub fn cache(monitor: u64, id: ThreadId, record: &Arc<ThreadRecord>) {
    LAST_SEEN.with(|slot| {
        *slot.borrow_mut() = Some((monitor, id, Arc::clone(record)));
    });
}

pub fn invalidate_cache() {
    LAST_SEEN.with(|slot| {
        *slot.borrow_mut() = None;
    });
}
