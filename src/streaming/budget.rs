//! Cooperative frame budget for main-task work.
//!
//! Each tracked task runs units of work until its measured per-unit cost
//! no longer fits in the frame's remaining wall-clock budget. Unit cost is
//! an exponential moving average; the first unit of a task always runs so
//! a measurement exists.

use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;

#[derive(Debug, Clone, Default)]
pub struct TaskStats {
    /// EMA of one unit's cost, in seconds.
    pub avg_unit_secs: f64,
    pub samples: u32,
    pub units_executed: u64,
    pub units_skipped: u64,
}

#[derive(Debug)]
pub struct TaskBudget {
    frame_budget: Duration,
    frame_start: Instant,
    tasks: FxHashMap<&'static str, TaskStats>,
}

impl TaskBudget {
    pub fn new(frame_budget: Duration) -> Self {
        Self {
            frame_budget,
            frame_start: Instant::now(),
            tasks: FxHashMap::default(),
        }
    }

    pub fn begin_frame(&mut self) {
        self.frame_start = Instant::now();
    }

    pub fn frame_budget(&self) -> Duration {
        self.frame_budget
    }

    pub fn elapsed(&self) -> Duration {
        self.frame_start.elapsed()
    }

    pub fn remaining(&self) -> Duration {
        self.frame_budget.saturating_sub(self.elapsed())
    }

    /// Run units of `work` while the budget allows. `work` returns whether
    /// more work remains; the loop also stops when it reports done.
    pub fn run<F: FnMut() -> bool>(&mut self, name: &'static str, mut work: F) {
        loop {
            let stats = self.tasks.entry(name).or_default();
            let elapsed = self.frame_start.elapsed().as_secs_f64();
            let budget = self.frame_budget.as_secs_f64();

            // Gate on the measured unit cost, except when no measurement
            // exists yet.
            if stats.samples > 0 && elapsed + stats.avg_unit_secs > budget {
                stats.units_skipped += 1;
                return;
            }

            let unit_start = Instant::now();
            let more = work();
            let unit_secs = unit_start.elapsed().as_secs_f64();

            let stats = self.tasks.entry(name).or_default();
            stats.samples = stats.samples.saturating_add(1);
            let alpha = (2.0 / (stats.samples as f64 + 1.0)).min(0.5);
            stats.avg_unit_secs = if stats.samples == 1 {
                unit_secs
            } else {
                stats.avg_unit_secs + alpha * (unit_secs - stats.avg_unit_secs)
            };
            stats.units_executed += 1;

            if !more {
                return;
            }
        }
    }

    /// Two-phase variant of [`TaskBudget::run`] for call sites that cannot
    /// close over their work: gate one unit here, then report its cost
    /// with [`TaskBudget::note_unit`].
    pub fn should_run(&mut self, name: &'static str) -> bool {
        let elapsed = self.frame_start.elapsed().as_secs_f64();
        let budget = self.frame_budget.as_secs_f64();
        let stats = self.tasks.entry(name).or_default();
        if stats.samples > 0 && elapsed + stats.avg_unit_secs > budget {
            stats.units_skipped += 1;
            return false;
        }
        true
    }

    /// Record one executed unit's cost into the task's moving average.
    pub fn note_unit(&mut self, name: &'static str, elapsed: Duration) {
        let stats = self.tasks.entry(name).or_default();
        stats.samples = stats.samples.saturating_add(1);
        let alpha = (2.0 / (stats.samples as f64 + 1.0)).min(0.5);
        let unit_secs = elapsed.as_secs_f64();
        stats.avg_unit_secs = if stats.samples == 1 {
            unit_secs
        } else {
            stats.avg_unit_secs + alpha * (unit_secs - stats.avg_unit_secs)
        };
        stats.units_executed += 1;
    }

    pub fn stats(&self, name: &'static str) -> Option<&TaskStats> {
        self.tasks.get(name)
    }

    pub fn reset_stats(&mut self) {
        self.tasks.clear();
    }
}
