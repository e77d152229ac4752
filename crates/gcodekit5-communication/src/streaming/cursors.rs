//! The three-cursor model: sent / acknowledged / executed.

use serde::{Deserialize, Serialize};

/// Monotonic cursors into the active program, all bounded by `total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Cursors {
    /// Lines whose payload bytes have been written to the transport.
    pub sent: usize,
    /// Lines for which a terminal `Ok` (or exhausted-retry `Error`) was observed.
    pub acknowledged: usize,
    /// Highest `Ln:` value reported by the controller, clamped to `total`. Advisory only.
    pub executed: usize,
    /// Total lines in the active program.
    pub total: usize,
}

impl Cursors {
    /// Reset all cursors for a new run against a program of `total` lines.
    pub fn reset(total: usize) -> Self {
        Self { sent: 0, acknowledged: 0, executed: 0, total }
    }

    /// Percentage of lines written, saturating at 100.
    pub fn percent_sent(&self) -> f64 {
        percent(self.sent, self.total)
    }

    /// Percentage of lines acknowledged, saturating at 100.
    pub fn percent_acknowledged(&self) -> f64 {
        percent(self.acknowledged, self.total)
    }

    /// Percentage of lines executed, saturating at 100.
    pub fn percent_executed(&self) -> f64 {
        percent(self.executed, self.total)
    }

    /// Record a status report's executed-line-number, clamped to `total`.
    pub fn observe_executed_line(&mut self, line_number: u64, line_number_base: u64) {
        if line_number < line_number_base {
            return;
        }
        let index = (line_number - line_number_base) as usize + 1;
        self.executed = index.min(self.total).max(self.executed);
    }
}

fn percent(part: usize, total: usize) -> f64 {
    if total == 0 {
        return 100.0;
    }
    ((part as f64 / total as f64) * 100.0).min(100.0)
}

/// Per-line retry bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryState {
    /// Attempts made on the currently outstanding line, in `[0, max_retries]`.
    pub attempts_current_line: u32,
}

impl RetryState {
    /// Reset on any `Ok`.
    pub fn reset(&mut self) {
        self.attempts_current_line = 0;
    }

    /// Record one more attempt; returns whether another retry is still allowed.
    pub fn record_attempt(&mut self, max_retries: u32) -> bool {
        self.attempts_current_line += 1;
        self.attempts_current_line <= max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invariant_acknowledged_le_sent_le_total() {
        let mut c = Cursors::reset(10);
        c.sent = 5;
        c.acknowledged = 3;
        assert!(c.acknowledged <= c.sent);
        assert!(c.sent <= c.total);
    }

    #[test]
    fn percent_saturates_at_100() {
        let c = Cursors { sent: 12, acknowledged: 12, executed: 12, total: 10 };
        assert_eq!(c.percent_sent(), 100.0);
    }

    #[test]
    fn percent_of_empty_program_is_100() {
        let c = Cursors::reset(0);
        assert_eq!(c.percent_sent(), 100.0);
    }

    #[test]
    fn retry_budget_is_exhausted_after_max_retries() {
        let mut r = RetryState::default();
        assert!(r.record_attempt(3));
        assert!(r.record_attempt(3));
        assert!(r.record_attempt(3));
        assert!(!r.record_attempt(3));
    }

    #[test]
    fn executed_line_advances_and_clamps() {
        let mut c = Cursors::reset(5);
        c.observe_executed_line(3, 1);
        assert_eq!(c.executed, 3);
        c.observe_executed_line(100, 1);
        assert_eq!(c.executed, 5);
    }
}
