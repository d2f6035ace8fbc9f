// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;

/// Monotonic integer-tick source, injected into updaters.
///
/// The tree stores raw ticks and never interprets the unit; any totally
/// ordered, non-decreasing series works.
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

/// Microsecond ticks measured from a process-local epoch.
pub struct MonotonicClock {
    epoch: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> i64 {
        i64::try_from(self.epoch.elapsed().as_micros()).unwrap_or(i64::MAX)
    }
}

/// Settable clock for deterministic tests.
#[derive(Default)]
pub struct ManualClock {
    ticks: AtomicI64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, ticks: i64) {
        self.ticks.store(ticks, Ordering::Relaxed);
    }

    pub fn advance(&self, delta: i64) {
        self.ticks.fetch_add(delta, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.ticks.load(Ordering::Relaxed)
    }
}
