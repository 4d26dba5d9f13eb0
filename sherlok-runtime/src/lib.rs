//! Host runtime contract for the sherlok monitor.
//!
//! The monitor never talks to a concrete virtual machine. It consumes
//! instrumentation events through the callback API of the `sherlok` crate and
//! calls back into the host only through the [`HostRuntime`] trait defined
//! here. Everything a host must provide lives in this crate:
//!
//! - identity handles for classes, methods, threads, and tagged objects
//! - event payload types (class/method/thread descriptions, contention kinds)
//! - the [`HostRuntime`] service trait (forced GC, heap iteration, object
//!   rendering for parameter dumps, native frame inspection)
//!
//! Keeping the contract in its own crate lets an embedding host implement
//! [`HostRuntime`] without pulling in the monitor core.

use std::fmt;

use thiserror::Error;

// =============================================================================
// IDENTITY HANDLES
// =============================================================================

/// Class identity assigned by the host.
///
/// Opaque and stable for the lifetime of the class. Rendered in hex, the way
/// the shell's `-C<hex-id>` filter expects it back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub u64);

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

/// Method identity assigned by the host. Opaque, stable, rendered in hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodId(pub u64);

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

/// Thread identity assigned by the host.
///
/// This is the host's notion of a thread, not an OS thread id; all events for
/// one `ThreadId` are delivered in order, per the host contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(pub u64);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

/// Tag handle for one live allocation.
///
/// The host stores this opaque integer in its per-object tag slot and hands
/// it back on free and heap iteration. The monitor owns the record behind it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectTag(pub u64);

impl fmt::Display for ObjectTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

// =============================================================================
// EVENT PAYLOADS
// =============================================================================

/// Description of one method, delivered with its owning class.
#[derive(Debug, Clone)]
pub struct MethodInfo {
    pub id: MethodId,
    /// Simple method name (e.g. `toString`).
    pub name: String,
    /// Type signature in the host's notation (e.g. `()Ljava/lang/String;`).
    pub signature: String,
    /// First source line of the method body, when the host knows it.
    pub start_line: Option<u32>,
    /// Last source line of the method body.
    pub end_line: Option<u32>,
}

/// Description of one class, delivered on class-prepare.
#[derive(Debug, Clone)]
pub struct ClassInfo {
    pub id: ClassId,
    /// Fully qualified display name (e.g. `java/util/HashMap`).
    pub name: String,
    /// Super class, when already prepared. The monitor treats this as a weak
    /// reference; it never extends the super class's lifetime.
    pub super_id: Option<ClassId>,
    /// Shallow instance size as reported by the host.
    pub object_size: u64,
    /// Tag slot of the class object itself, when the host tags it. The
    /// monitor tracks it as a live allocation of the class.
    pub object_tag: Option<ObjectTag>,
    pub methods: Vec<MethodInfo>,
}

/// Description of one thread, delivered on thread-start or first sight.
#[derive(Debug, Clone)]
pub struct ThreadInfo {
    pub id: ThreadId,
    pub name: String,
}

/// The four contention events the host delivers, already resolved from the
/// overlapping raw callback pairs into one well-defined state machine input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentionEvent {
    /// Thread starts blocking on a contended monitor.
    EnterContended,
    /// Thread acquired the contended monitor.
    EnterDone,
    /// Thread enters a timed or untimed wait.
    WaitCall,
    /// Thread returns from a wait.
    WaitReturn,
}

/// One object reported by the host's heap iteration primitive.
#[derive(Debug, Clone, Copy)]
pub struct HeapObject {
    /// Tag previously planted by the monitor; `None` for untagged objects.
    pub tag: Option<ObjectTag>,
    /// The object's own class.
    pub class: ClassId,
    pub size: u64,
}

/// Heap figures for the GC report.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeapUsage {
    pub used: u64,
    pub committed: u64,
    pub init: u64,
}

/// One native frame as reported by the host's stack inspection, used by the
/// thread-dump command to mirror the runtime stack without disturbing the
/// profiler's own callstack.
#[derive(Debug, Clone)]
pub struct NativeFrame {
    pub class_name: String,
    pub method_name: String,
    pub line: Option<u32>,
}

// =============================================================================
// HOST SERVICES
// =============================================================================

/// A reflective call into the host failed.
///
/// The monitor clears any pending host exception state and treats the call as
/// a no-op; this error never propagates past the call site.
#[derive(Error, Debug)]
#[error("guest call failed: {0}")]
pub struct GuestCallError(pub String);

/// Services the monitor requests from the host.
///
/// Implementations must be callable from arbitrary threads. All methods are
/// best-effort: a host that cannot provide a figure returns a default rather
/// than failing the monitor.
pub trait HostRuntime: Send + Sync {
    /// Request a GC cycle. Completion is signalled through the ordinary
    /// gc-start/gc-finish callbacks, not through this call.
    fn force_gc(&self);

    /// Current heap figures for the GC report.
    fn heap_usage(&self) -> HeapUsage;

    /// Walk every live object, invoking `visit` once per object. The walk is
    /// synchronous; the monitor holds no registry lock while calling this.
    fn iterate_heap(&self, visit: &mut dyn FnMut(HeapObject));

    /// Render a tagged object for parameter dumps (the host's `toString`
    /// analog). May synthesize nested events; the monitor guards against the
    /// re-entry with its per-thread flag.
    fn describe_object(&self, tag: ObjectTag) -> Result<String, GuestCallError>;

    /// Render the live arguments of the method executing on `thread`, name
    /// and value pairs. Reflective like [`HostRuntime::describe_object`] and
    /// guarded the same way.
    fn describe_parameters(
        &self,
        thread: ThreadId,
        method: MethodId,
    ) -> Result<Vec<(String, String)>, GuestCallError>;

    /// The native frames of a thread, top first. Used by the thread dump.
    fn native_frames(&self, thread: ThreadId) -> Vec<NativeFrame>;
}

/// A host that provides nothing. Useful for tests of the pure event paths
/// and as a default for embeddings that only feed callbacks.
#[derive(Debug, Default)]
pub struct NoopRuntime;

impl HostRuntime for NoopRuntime {
    fn force_gc(&self) {}

    fn heap_usage(&self) -> HeapUsage {
        HeapUsage::default()
    }

    fn iterate_heap(&self, _visit: &mut dyn FnMut(HeapObject)) {}

    fn describe_object(&self, tag: ObjectTag) -> Result<String, GuestCallError> {
        Err(GuestCallError(format!("no host attached for tag {tag}")))
    }

    fn describe_parameters(
        &self,
        _thread: ThreadId,
        method: MethodId,
    ) -> Result<Vec<(String, String)>, GuestCallError> {
        Err(GuestCallError(format!("no host attached for method {method}")))
    }

    fn native_frames(&self, _thread: ThreadId) -> Vec<NativeFrame> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_render_as_hex() {
        assert_eq!(ClassId(0xCAFE).to_string(), "cafe");
        assert_eq!(MethodId(255).to_string(), "ff");
        assert_eq!(ObjectTag(16).to_string(), "10");
    }

    #[test]
    fn test_noop_runtime_describe_fails() {
        let host = NoopRuntime;
        assert!(host.describe_object(ObjectTag(1)).is_err());
    }

    #[test]
    fn test_noop_runtime_heap_is_empty() {
        let host = NoopRuntime;
        let mut seen = 0;
        host.iterate_heap(&mut |_| seen += 1);
        assert_eq!(seen, 0);
        assert_eq!(host.heap_usage().used, 0);
    }
}
