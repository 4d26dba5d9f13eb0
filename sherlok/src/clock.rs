//! Monotonic high-resolution timestamps and per-thread CPU time
//!
//! Three time sources feed the monitor:
//!
//! - `timestamp_hp()`: an opaque high-precision tick, microsecond scale,
//!   taken from a cached monotonic anchor
//! - `timestamp_ms()`: wall time in milliseconds, related to the tick
//!   stream through a boot offset that is re-anchored periodically so drift
//!   stays bounded
//! - `thread_cpu_micros()`: the calling thread's CPU clock, degrading
//!   silently to the high-precision tick where the platform clock is
//!   unavailable
//!
//! Nothing here fails callers; degraded resolution is the worst case.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crate::domain::Micros;

/// How far the tick stream may run before the wall offset is recomputed.
const REANCHOR_US: u64 = 60_000_000;

/// An opaque high-precision tick. Only [`Clock::diff_hp`] gives it meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct HpTick(pub u64);

pub struct Clock {
    /// Monotonic origin; all ticks are microseconds since this instant.
    origin: Instant,
    /// Wall-clock milliseconds at the current anchor.
    anchor_wall_ms: AtomicU64,
    /// Tick value at the current anchor.
    anchor_hp_us: AtomicU64,
    /// Last value handed out by `timestamp_ms`, for the monotonic guarantee.
    last_ms: AtomicU64,
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock {
    #[must_use]
    pub fn new() -> Self {
        Clock {
            origin: Instant::now(),
            anchor_wall_ms: AtomicU64::new(wall_now_ms()),
            anchor_hp_us: AtomicU64::new(0),
            last_ms: AtomicU64::new(0),
        }
    }

    /// Current high-precision tick.
    #[must_use]
    pub fn timestamp_hp(&self) -> HpTick {
        let elapsed = self.origin.elapsed();
        HpTick(elapsed.as_micros() as u64)
    }

    /// Microseconds elapsed since `start`. A start tick ahead of now yields
    /// zero; the 64-bit tick space does not wrap within a process lifetime.
    #[must_use]
    pub fn diff_hp(&self, start: HpTick) -> Micros {
        Micros(self.timestamp_hp().0.saturating_sub(start.0))
    }

    /// Wall time in milliseconds, monotonic within this clock instance.
    #[must_use]
    pub fn timestamp_ms(&self) -> u64 {
        let hp = self.timestamp_hp().0;
        let anchor_hp = self.anchor_hp_us.load(Ordering::Relaxed);

        if hp.saturating_sub(anchor_hp) > REANCHOR_US {
            // Re-anchor against the system clock; last_ms absorbs any step
            // backwards so callers still observe monotonic values.
            self.anchor_wall_ms.store(wall_now_ms(), Ordering::Relaxed);
            self.anchor_hp_us.store(hp, Ordering::Relaxed);
        }

        let ms = self.anchor_wall_ms.load(Ordering::Relaxed)
            + hp.saturating_sub(self.anchor_hp_us.load(Ordering::Relaxed)) / 1_000;
        self.last_ms.fetch_max(ms, Ordering::Relaxed);
        self.last_ms.load(Ordering::Relaxed)
    }

    /// CPU time of the calling thread in microseconds.
    ///
    /// Falls back to the high-precision wall tick when the platform has no
    /// per-thread CPU clock; callers cannot tell the difference and are not
    /// meant to.
    #[must_use]
    pub fn thread_cpu_micros(&self) -> Micros {
        match thread_cpu_raw() {
            Some(us) => Micros(us),
            None => Micros(self.timestamp_hp().0),
        }
    }
}

fn wall_now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn thread_cpu_raw() -> Option<u64> {
    let mut ts = libc::timespec { tv_sec: 0, tv_nsec: 0 };
    // SAFETY: ts is a valid out-pointer for the duration of the call.
    #[allow(unsafe_code)]
    let rc = unsafe { libc::clock_gettime(libc::CLOCK_THREAD_CPUTIME_ID, &mut ts) };
    if rc == 0 {
        Some(ts.tv_sec as u64 * 1_000_000 + ts.tv_nsec as u64 / 1_000)
    } else {
        None
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn thread_cpu_raw() -> Option<u64> {
    None
}
