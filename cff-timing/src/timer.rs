use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Monotonic timer abstraction for the flicker loop.
///
/// Timestamps are opaque to callers; the state machine only ever compares
/// them against deadlines it computed from the same timer.
pub trait Timer: Clone + Send + Sync {
    type Timestamp: Copy + Send + Sync;

    fn now(&self) -> Self::Timestamp;
    fn elapsed(&self, since: Self::Timestamp) -> Duration;
    /// Blocking sleep with the best precision the platform offers.
    fn sleep(&self, duration: Duration);
    fn record_frame(&mut self, duration: Duration);
    fn frame_count(&self) -> usize;
    fn calibration_stats(&self) -> CalibrationStats;
}

/// Frame-time statistics gathered while rendering.
///
/// Used to floor the pulse period at the display's real refresh granularity
/// instead of assuming 60 Hz.
#[derive(Debug, Clone, Default)]
pub struct CalibrationStats {
    pub average_frame_time_ns: f64,
    pub jitter_ns: f64,
    pub min_frame_time_ns: f64,
    pub max_frame_time_ns: f64,
    pub effective_fps: f64,
}

/// Wall-clock timer with nanosecond timestamps and platform-specific
/// high-precision sleep.
#[derive(Debug, Clone)]
pub struct HighPrecisionTimer {
    start: Instant,
    frames: VecDeque<Duration>,
    max_samples: usize,
}

impl HighPrecisionTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            frames: VecDeque::with_capacity(1024),
            max_samples: 1024,
        }
    }

    fn precise_sleep(&self, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        #[cfg(target_os = "linux")]
        self.linux_sleep(duration);
        #[cfg(target_os = "windows")]
        self.windows_sleep(duration);
        #[cfg(target_os = "macos")]
        self.macos_sleep(duration);
        #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
        std::thread::sleep(duration);
    }

    #[cfg(target_os = "linux")]
    fn linux_sleep(&self, duration: Duration) {
        use libc::{clock_nanosleep, timespec, CLOCK_MONOTONIC};

        let request = timespec {
            tv_sec: duration.as_secs() as libc::time_t,
            tv_nsec: duration.subsec_nanos() as libc::c_long,
        };
        unsafe {
            clock_nanosleep(CLOCK_MONOTONIC, 0, &request, std::ptr::null_mut());
        }
    }

    #[cfg(target_os = "windows")]
    fn windows_sleep(&self, duration: Duration) {
        use windows::Win32::Foundation::CloseHandle;
        use windows::Win32::System::Threading::{
            CreateWaitableTimerW, SetWaitableTimer, WaitForSingleObject, INFINITE,
        };

        unsafe {
            let Ok(timer) = CreateWaitableTimerW(None, true, None) else {
                std::thread::sleep(duration);
                return;
            };
            // Negative due time means relative, in 100 ns intervals.
            let due_time = -(duration.as_nanos() as i64 / 100);
            if SetWaitableTimer(timer, &due_time, 0, None, None, false).is_ok() {
                WaitForSingleObject(timer, INFINITE);
            } else {
                std::thread::sleep(duration);
            }
            let _ = CloseHandle(timer);
        }
    }

    #[cfg(target_os = "macos")]
    fn macos_sleep(&self, duration: Duration) {
        use mach2::mach_time::{mach_absolute_time, mach_timebase_info, mach_timebase_info_data_t};

        // Spin for sub-100us waits, where thread::sleep overshoots badly.
        if duration.as_nanos() < 100_000 {
            unsafe {
                let start = mach_absolute_time();
                let mut timebase = mach_timebase_info_data_t { numer: 0, denom: 0 };
                mach_timebase_info(&mut timebase);
                let target_ticks =
                    duration.as_nanos() as u64 * timebase.denom as u64 / timebase.numer as u64;
                while mach_absolute_time() - start < target_ticks {
                    std::hint::spin_loop();
                }
            }
        } else {
            std::thread::sleep(duration);
        }
    }
}

impl Timer for HighPrecisionTimer {
    type Timestamp = u64;

    fn now(&self) -> u64 {
        self.start.elapsed().as_nanos() as u64
    }

    fn elapsed(&self, since: u64) -> Duration {
        Duration::from_nanos(self.now().saturating_sub(since))
    }

    fn sleep(&self, duration: Duration) {
        self.precise_sleep(duration);
    }

    fn record_frame(&mut self, duration: Duration) {
        if self.frames.len() >= self.max_samples {
            self.frames.pop_front();
        }
        self.frames.push_back(duration);
    }

    fn frame_count(&self) -> usize {
        self.frames.len()
    }

    fn calibration_stats(&self) -> CalibrationStats {
        if self.frames.is_empty() {
            return CalibrationStats::default();
        }
        let times_ns: Vec<f64> = self.frames.iter().map(|d| d.as_nanos() as f64).collect();
        let avg = times_ns.iter().sum::<f64>() / times_ns.len() as f64;
        let variance =
            times_ns.iter().map(|t| (t - avg).powi(2)).sum::<f64>() / times_ns.len() as f64;
        let min = times_ns.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = times_ns.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

        CalibrationStats {
            average_frame_time_ns: avg,
            jitter_ns: variance.sqrt(),
            min_frame_time_ns: min,
            max_frame_time_ns: max,
            effective_fps: if avg > 0.0 { 1e9 / avg } else { 0.0 },
        }
    }
}

impl Default for HighPrecisionTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Deterministic timer for tests: time only moves when `advance` is called,
/// and `sleep` does nothing.
#[derive(Debug, Clone, Default)]
pub struct ManualTimer {
    now_ns: u64,
    frames: usize,
}

impl ManualTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&mut self, duration: Duration) {
        self.now_ns += duration.as_nanos() as u64;
    }

    pub fn advance_ms(&mut self, ms: u64) {
        self.advance(Duration::from_millis(ms));
    }
}

impl Timer for ManualTimer {
    type Timestamp = u64;

    fn now(&self) -> u64 {
        self.now_ns
    }

    fn elapsed(&self, since: u64) -> Duration {
        Duration::from_nanos(self.now_ns.saturating_sub(since))
    }

    fn sleep(&self, _duration: Duration) {}

    fn record_frame(&mut self, _duration: Duration) {
        self.frames += 1;
    }

    fn frame_count(&self) -> usize {
        self.frames
    }

    fn calibration_stats(&self) -> CalibrationStats {
        CalibrationStats::default()
    }
}
