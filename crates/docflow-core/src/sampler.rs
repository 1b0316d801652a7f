//! CPU usage sampling.
//!
//! The scaler never queries the operating system directly; it asks an
//! injected [`CpuSampler`] so tests and embedders can supply deterministic
//! readings.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use sysinfo::{MINIMUM_CPU_UPDATE_INTERVAL, System};

/// Source of process-wide CPU usage readings, in percent (0.0-100.0)
pub trait CpuSampler: Send + Sync {
    fn sample(&self) -> f64;
}

/// Samples global CPU usage of the host through `sysinfo`.
///
/// Usage is computed between consecutive refreshes, so the first reading
/// after construction reflects the interval since `new` was called. Calls
/// closer together than `sysinfo::MINIMUM_CPU_UPDATE_INTERVAL` return the
/// previous reading.
pub struct SystemCpuSampler {
    state: Mutex<SamplerState>,
}

struct SamplerState {
    system: System,
    last: Option<(Instant, f64)>,
}

impl SystemCpuSampler {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_usage();
        Self {
            state: Mutex::new(SamplerState { system, last: None }),
        }
    }
}

impl Default for SystemCpuSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuSampler for SystemCpuSampler {
    fn sample(&self) -> f64 {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((taken_at, usage)) = state.last
            && taken_at.elapsed() < MINIMUM_CPU_UPDATE_INTERVAL
        {
            return usage;
        }

        state.system.refresh_cpu_usage();
        let usage = f64::from(state.system.global_cpu_usage()).clamp(0.0, 100.0);
        state.last = Some((Instant::now(), usage));
        usage
    }
}

impl std::fmt::Debug for SystemCpuSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemCpuSampler").finish_non_exhaustive()
    }
}

/// Sampler returning a settable fixed reading
#[derive(Debug, Default)]
pub struct StaticCpuSampler {
    bits: AtomicU64,
}

impl StaticCpuSampler {
    pub fn new(percent: f64) -> Self {
        Self {
            bits: AtomicU64::new(percent.clamp(0.0, 100.0).to_bits()),
        }
    }

    pub fn set(&self, percent: f64) {
        self.bits
            .store(percent.clamp(0.0, 100.0).to_bits(), Ordering::Relaxed);
    }
}

impl CpuSampler for StaticCpuSampler {
    fn sample(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }
}
