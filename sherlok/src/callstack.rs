//! Per-thread stack of active method frames
//!
//! The callstack turns enter/exit events into timings and memory deltas.
//! Besides the plain push/pop interface it carries two extras the trigger
//! tracer depends on:
//!
//! - the **sequence cursor**, remembering how many frames were already
//!   emitted in the current trigger window so a later emission only prints
//!   the new suffix
//! - the **memory high-water**, a monotone counter fed by allocation events
//!   while frames are on the stack; each frame snapshots it on entry and
//!   the difference on exit is the per-call memory delta
//!
//! `reset` truncates to the frame count the runtime reports when an
//! exception unwinds past profiled frames.

use std::sync::Arc;

use sherlok_runtime::NativeFrame;

use crate::clock::HpTick;
use crate::domain::Micros;
use crate::registry::methods::MethodRecord;

/// One active frame.
pub struct CallFrame {
    pub method: Arc<MethodRecord>,
    /// CPU baseline at entry; meaningful only for timed methods.
    pub enter_cpu: Micros,
    /// Wall tick at entry.
    pub enter_wall: HpTick,
    /// Memory high-water at entry.
    pub enter_memory: u64,
    /// Depth of this frame (1-based; the runtime's frame-count convention).
    pub depth: usize,
}

#[derive(Default)]
pub struct CallStack {
    frames: Vec<CallFrame>,
    sequence: usize,
    high_memory: u64,
}

impl CallStack {
    #[must_use]
    pub fn new() -> Self {
        CallStack::default()
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    #[must_use]
    pub fn top(&self) -> Option<&CallFrame> {
        self.frames.last()
    }

    pub fn push(&mut self, method: Arc<MethodRecord>, enter_cpu: Micros, enter_wall: HpTick) {
        let depth = self.frames.len() + 1;
        self.frames.push(CallFrame {
            method,
            enter_cpu,
            enter_wall,
            enter_memory: self.high_memory,
            depth,
        });
    }

    /// Pop the top frame. The sequence cursor never exceeds the depth.
    pub fn pop(&mut self) -> Option<CallFrame> {
        let frame = self.frames.pop();
        self.sequence = self.sequence.min(self.frames.len());
        frame
    }

    /// Truncate to `depth` frames, dropping the newest first. Used when the
    /// exception-catch handler restores the stack to the runtime's count.
    pub fn reset(&mut self, depth: usize) {
        self.frames.truncate(depth);
        self.sequence = self.sequence.min(self.frames.len());
    }

    pub fn clear(&mut self) {
        self.frames.clear();
        self.sequence = 0;
        self.high_memory = 0;
    }

    /// Frames the current trigger window has not emitted yet.
    #[must_use]
    pub fn sequence(&self) -> usize {
        self.sequence
    }

    /// Frames from the sequence cursor up to the top.
    #[must_use]
    pub fn suffix(&self) -> &[CallFrame] {
        &self.frames[self.sequence..]
    }

    /// Mark every current frame as emitted.
    pub fn advance_sequence(&mut self) {
        self.sequence = self.frames.len();
    }

    /// Rewind the cursor to zero, restarting the emission window.
    pub fn rewind_sequence(&mut self) {
        self.sequence = 0;
    }

    #[must_use]
    pub fn frames(&self) -> &[CallFrame] {
        &self.frames
    }

    /// Feed an allocation into the high-water counter.
    pub fn raise_high_memory(&mut self, bytes: u64) {
        self.high_memory += bytes;
    }

    #[must_use]
    pub fn high_memory(&self) -> u64 {
        self.high_memory
    }
}

/// A read-only mirror of the runtime's reported native frames, used by the
/// thread-dump command so the profiler stack stays untouched.
pub struct VirtualStack {
    frames: Vec<NativeFrame>,
}

impl VirtualStack {
    #[must_use]
    pub fn from_native(frames: Vec<NativeFrame>) -> Self {
        VirtualStack { frames }
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Frames top first, with their 1-based depth counted from the bottom.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &NativeFrame)> {
        let depth = self.frames.len();
        self.frames.iter().enumerate().map(move |(idx, f)| (depth - idx, f))
    }
}
