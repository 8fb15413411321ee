//! Dual-window rate limiting for outbound generation calls
//!
//! The generator backend enforces both a per-minute and a per-day ceiling, so
//! the limiter tracks two independent counting windows and only admits a call
//! when both have room. Windows reset lazily: there is no background timer,
//! each read or mutation first rolls a window forward if its duration has
//! elapsed.

use log::debug;
use serde::Serialize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Default per-day call ceiling (generator free tier)
pub const DEFAULT_DAY_LIMIT: u32 = 1500;
/// Default per-minute call ceiling (generator free tier)
pub const DEFAULT_MINUTE_LIMIT: u32 = 15;

/// Identifies one of the two quota windows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaWindow {
    /// The per-minute window
    Minute,
    /// The per-day window
    Day,
}

/// Construction-time limiter configuration
///
/// Limits are fixed for the lifetime of the limiter; they are not runtime
/// mutable. Window durations are configurable so tests can exercise resets
/// without waiting a literal minute.
#[derive(Debug, Clone)]
pub struct QuotaConfig {
    /// Maximum calls per minute window
    pub minute_limit: u32,
    /// Maximum calls per day window
    pub day_limit: u32,
    /// Duration of the minute window
    pub minute_window: Duration,
    /// Duration of the day window
    pub day_window: Duration,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            minute_limit: DEFAULT_MINUTE_LIMIT,
            day_limit: DEFAULT_DAY_LIMIT,
            minute_window: Duration::from_secs(60),
            day_window: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Usage numbers for a single window
#[derive(Debug, Clone, Serialize)]
pub struct WindowStats {
    /// Calls counted in the current window
    pub used: u32,
    /// Calls still admissible in the current window
    pub remaining: u32,
    /// The window's ceiling
    pub limit: u32,
    /// Milliseconds until the window rolls over
    pub resets_in_ms: u64,
}

/// Combined usage numbers for both windows
#[derive(Debug, Clone, Serialize)]
pub struct QuotaStats {
    /// Per-minute window usage
    pub minute: WindowStats,
    /// Per-day window usage
    pub day: WindowStats,
}

/// One counting window
#[derive(Debug)]
struct WindowState {
    count: u32,
    started: Instant,
    limit: u32,
    duration: Duration,
}

impl WindowState {
    fn new(limit: u32, duration: Duration) -> Self {
        Self {
            count: 0,
            started: Instant::now(),
            limit,
            duration,
        }
    }

    /// Rolls the window forward when its duration has elapsed
    fn reset_if_elapsed(&mut self, now: Instant) {
        if now.duration_since(self.started) >= self.duration {
            self.count = 0;
            self.started = now;
        }
    }

    fn has_room(&self) -> bool {
        self.count < self.limit
    }

    fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.count)
    }

    fn stats(&self, now: Instant) -> WindowStats {
        let elapsed = now.duration_since(self.started);
        let resets_in = self.duration.saturating_sub(elapsed);
        WindowStats {
            used: self.count,
            remaining: self.remaining(),
            limit: self.limit,
            resets_in_ms: resets_in.as_millis() as u64,
        }
    }
}

/// Rate limiter bounding outbound generation calls across two windows
///
/// One instance is shared by every content orchestrator in the process; a
/// single call consumes quota from both windows simultaneously, and
/// exhausting either blocks further calls. The limiter only reports
/// availability; it never retries, backs off, or sleeps — the caller decides
/// what to do when no quota is available.
#[derive(Debug)]
pub struct QuotaLimiter {
    inner: Mutex<Windows>,
}

#[derive(Debug)]
struct Windows {
    minute: WindowState,
    day: WindowState,
}

impl QuotaLimiter {
    /// Creates a limiter with the default free-tier limits
    pub fn new() -> Self {
        Self::with_config(QuotaConfig::default())
    }

    /// Creates a limiter with explicit limits and window durations
    pub fn with_config(config: QuotaConfig) -> Self {
        Self {
            inner: Mutex::new(Windows {
                minute: WindowState::new(config.minute_limit, config.minute_window),
                day: WindowState::new(config.day_limit, config.day_window),
            }),
        }
    }

    /// Atomically claims one call's worth of quota from both windows
    ///
    /// Returns `true` and increments both counters when both windows have
    /// room; returns `false` without mutating either count otherwise. The
    /// check and the increments happen under one lock, so two overlapping
    /// callers can never both claim the final slot.
    pub fn try_consume(&self) -> bool {
        let Ok(mut windows) = self.inner.lock() else {
            return false;
        };
        let now = Instant::now();
        windows.minute.reset_if_elapsed(now);
        windows.day.reset_if_elapsed(now);

        if windows.minute.has_room() && windows.day.has_room() {
            windows.minute.count += 1;
            windows.day.count += 1;
            true
        } else {
            debug!(
                "quota exhausted (minute: {}/{}, day: {}/{})",
                windows.minute.count, windows.minute.limit, windows.day.count, windows.day.limit
            );
            false
        }
    }

    /// Reports whether a call would currently be admitted, without consuming
    pub fn has_quota(&self) -> bool {
        let Ok(mut windows) = self.inner.lock() else {
            return false;
        };
        let now = Instant::now();
        windows.minute.reset_if_elapsed(now);
        windows.day.reset_if_elapsed(now);
        windows.minute.has_room() && windows.day.has_room()
    }

    /// Calls still admissible in the given window, never negative
    pub fn remaining(&self, window: QuotaWindow) -> u32 {
        let Ok(mut windows) = self.inner.lock() else {
            return 0;
        };
        let now = Instant::now();
        match window {
            QuotaWindow::Minute => {
                windows.minute.reset_if_elapsed(now);
                windows.minute.remaining()
            }
            QuotaWindow::Day => {
                windows.day.reset_if_elapsed(now);
                windows.day.remaining()
            }
        }
    }

    /// Usage numbers for both windows
    pub fn stats(&self) -> QuotaStats {
        let Ok(mut windows) = self.inner.lock() else {
            // A poisoned limiter reports itself as exhausted.
            return QuotaStats {
                minute: WindowStats {
                    used: 0,
                    remaining: 0,
                    limit: 0,
                    resets_in_ms: 0,
                },
                day: WindowStats {
                    used: 0,
                    remaining: 0,
                    limit: 0,
                    resets_in_ms: 0,
                },
            };
        };
        let now = Instant::now();
        windows.minute.reset_if_elapsed(now);
        windows.day.reset_if_elapsed(now);
        QuotaStats {
            minute: windows.minute.stats(now),
            day: windows.day.stats(now),
        }
    }
}

impl Default for QuotaLimiter {
    fn default() -> Self {
        Self::new()
    }
}
