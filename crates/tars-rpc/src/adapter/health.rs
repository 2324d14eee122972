// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Two-state endpoint health machine.
//!
//! ```text
//!            fail window elapsed without success
//!            and recent failures >= threshold,
//!            or fail ratio over the check interval
//!   +---------+ ------------------------------> +-----------+
//!   | Healthy |                                 | Unhealthy |
//!   +---------+ <------------------------------ +-----------+
//!               retry interval elapsed and reconnect succeeded
//! ```
//!
//! The tracker never reads the clock itself: every transition takes `now`,
//! so the machine is driven deterministically in tests.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::{Duration, Instant};

/// Health thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Minimum time without a success before consecutive failures count (ms).
    pub fail_window_ms: u64,

    /// Consecutive failures that trip the endpoint.
    pub fail_threshold: u32,

    /// Period of the fail ratio check (ms).
    pub check_interval_ms: u64,

    /// Failures required before the ratio check applies.
    pub min_fail_samples: u32,

    /// `fail / send` ratio that trips the endpoint.
    pub fail_ratio: f64,

    /// Delay between reconnect attempts while unhealthy (ms).
    pub retry_interval_ms: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            fail_window_ms: 5_000,
            fail_threshold: 5,
            check_interval_ms: 60_000,
            min_fail_samples: 2,
            fail_ratio: 0.5,
            retry_interval_ms: 30_000,
        }
    }
}

impl HealthConfig {
    pub fn fail_window(&self) -> Duration {
        Duration::from_millis(self.fail_window_ms)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

/// Outcome of one health tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthCheck {
    /// Nothing to do.
    Unchanged,
    /// The endpoint just became unhealthy.
    Tripped,
    /// The endpoint is unhealthy and a reconnect attempt is due.
    Retry,
}

/// Counter snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HealthStats {
    pub healthy: bool,
    pub send_count: u32,
    pub success_count: u32,
    pub fail_count: u32,
    pub last_fail_count: u32,
}

#[derive(Debug)]
struct Times {
    last_success: Instant,
    last_check: Instant,
    last_block: Instant,
}

/// Per-adapter counters and health flag.
#[derive(Debug)]
pub struct HealthTracker {
    config: HealthConfig,
    healthy: AtomicBool,
    send_count: AtomicU32,
    success_count: AtomicU32,
    fail_count: AtomicU32,
    /// Failures since the last success.
    last_fail_count: AtomicU32,
    times: Mutex<Times>,
}

impl HealthTracker {
    pub fn new(config: HealthConfig, now: Instant) -> Self {
        Self {
            config,
            healthy: AtomicBool::new(true),
            send_count: AtomicU32::new(0),
            success_count: AtomicU32::new(0),
            fail_count: AtomicU32::new(0),
            last_fail_count: AtomicU32::new(0),
            times: Mutex::new(Times {
                last_success: now,
                last_check: now,
                last_block: now,
            }),
        }
    }

    /// Lock-free, best-effort read for routing.
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    pub fn on_send(&self) {
        self.send_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn on_success(&self, now: Instant) {
        self.success_count.fetch_add(1, Ordering::Relaxed);
        self.last_fail_count.store(0, Ordering::Relaxed);
        self.times.lock().last_success = now;
    }

    pub fn on_failure(&self) {
        self.fail_count.fetch_add(1, Ordering::Relaxed);
        self.last_fail_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Advance the machine to `now`.
    pub fn check(&self, now: Instant) -> HealthCheck {
        let mut times = self.times.lock();

        if !self.is_healthy() {
            if now.saturating_duration_since(times.last_block) >= self.config.retry_interval() {
                times.last_block = now;
                return HealthCheck::Retry;
            }
            return HealthCheck::Unchanged;
        }

        let last_fail = self.last_fail_count.load(Ordering::Relaxed);
        if now.saturating_duration_since(times.last_success) >= self.config.fail_window()
            && last_fail >= self.config.fail_threshold
        {
            times.last_block = now;
            self.healthy.store(false, Ordering::Release);
            return HealthCheck::Tripped;
        }

        if now.saturating_duration_since(times.last_check) >= self.config.check_interval() {
            times.last_check = now;
            let fail = self.fail_count.load(Ordering::Relaxed);
            let send = self.send_count.load(Ordering::Relaxed).max(1);
            if fail >= self.config.min_fail_samples
                && f64::from(fail) / f64::from(send) >= self.config.fail_ratio
            {
                times.last_block = now;
                self.healthy.store(false, Ordering::Release);
                return HealthCheck::Tripped;
            }
        }
        HealthCheck::Unchanged
    }

    /// Back to healthy with every counter cleared.
    pub fn reset(&self, now: Instant) {
        let mut times = self.times.lock();
        self.send_count.store(0, Ordering::Relaxed);
        self.success_count.store(0, Ordering::Relaxed);
        self.fail_count.store(0, Ordering::Relaxed);
        self.last_fail_count.store(0, Ordering::Relaxed);
        times.last_success = now;
        times.last_check = now;
        self.healthy.store(true, Ordering::Release);
    }

    pub fn stats(&self) -> HealthStats {
        HealthStats {
            healthy: self.is_healthy(),
            send_count: self.send_count.load(Ordering::Relaxed),
            success_count: self.success_count.load(Ordering::Relaxed),
            fail_count: self.fail_count.load(Ordering::Relaxed),
            last_fail_count: self.last_fail_count.load(Ordering::Relaxed),
        }
    }
}
