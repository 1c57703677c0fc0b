use std::time::{Duration, Instant};

/// Frame timing snapshot.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct FrameTime {
    /// Time since the previous tick in seconds, clamped.
    pub dt: f32,

    /// Sum of all clamped deltas since the clock started, in seconds.
    ///
    /// Animation driven by this value pauses across stalls instead of jumping.
    pub elapsed: f32,

    /// Monotonic frame counter, starting at 0.
    pub frame_index: u64,
}

/// Frame clock producing `FrameTime` snapshots.
///
/// Delta time is clamped to avoid pathological values when the application is paused
/// by the debugger, minimized, or stalls.
#[derive(Debug, Clone)]
pub struct FrameClock {
    last: Instant,
    elapsed: Duration,
    frame_index: u64,
    dt_min: Duration,
    dt_max: Duration,
}

impl FrameClock {
    /// Creates a new clock with default clamps (0.1 ms to 250 ms).
    pub fn new() -> Self {
        Self::with_clamps(Duration::from_micros(100), Duration::from_millis(250))
    }

    /// Creates a clock with custom delta-time clamps.
    pub fn with_clamps(dt_min: Duration, dt_max: Duration) -> Self {
        debug_assert!(dt_min <= dt_max);
        Self {
            last: Instant::now(),
            elapsed: Duration::ZERO,
            frame_index: 0,
            dt_min,
            dt_max,
        }
    }

    /// Resets the delta baseline without touching elapsed time.
    ///
    /// Useful after surface reconfigure events or when resuming from suspension.
    pub fn reset(&mut self) {
        self.last = Instant::now();
    }

    /// Advances the clock and returns a new `FrameTime`.
    pub fn tick(&mut self) -> FrameTime {
        let now = Instant::now();
        let ft = self.advance(now.saturating_duration_since(self.last));
        self.last = now;
        ft
    }

    fn advance(&mut self, raw: Duration) -> FrameTime {
        let dt = raw.clamp(self.dt_min, self.dt_max);
        self.elapsed += dt;

        let ft = FrameTime {
            dt: dt.as_secs_f32(),
            elapsed: self.elapsed.as_secs_f32(),
            frame_index: self.frame_index,
        };

        self.frame_index = self.frame_index.wrapping_add(1);
        ft
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_is_clamped_on_both_ends() {
        let mut clock =
            FrameClock::with_clamps(Duration::from_millis(1), Duration::from_millis(100));

        let ft = clock.advance(Duration::ZERO);
        assert_eq!(ft.dt, 0.001);

        let ft = clock.advance(Duration::from_secs(5));
        assert_eq!(ft.dt, 0.1);
    }

    #[test]
    fn elapsed_accumulates_clamped_deltas() {
        let mut clock =
            FrameClock::with_clamps(Duration::from_millis(1), Duration::from_millis(100));
        clock.advance(Duration::from_millis(50));
        clock.advance(Duration::from_secs(10));
        let ft = clock.advance(Duration::from_millis(50));
        assert!((ft.elapsed - 0.2).abs() < 1e-6);
    }

    #[test]
    fn frame_index_counts_from_zero() {
        let mut clock = FrameClock::new();
        assert_eq!(clock.tick().frame_index, 0);
        assert_eq!(clock.tick().frame_index, 1);
        assert_eq!(clock.tick().frame_index, 2);
    }
}
