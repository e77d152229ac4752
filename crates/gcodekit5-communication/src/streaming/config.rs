//! Streaming engine configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunable knobs for the streaming engine, with the spec's defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Per-line retry budget before pausing.
    pub max_retries: u32,
    /// Per-line response timeout, in milliseconds.
    pub t_resp_ms: u64,
    /// Delay before retransmitting a failed line, in milliseconds.
    pub t_retry_ms: u64,
    /// Idle-status duration required before `ExecutionComplete`, in milliseconds.
    pub t_quiesce_ms: u64,
    /// Minimum interval between throttled progress events, in milliseconds.
    pub t_ui_ms: u64,
    /// Whether to prefix each line with `N<line_number>`.
    pub use_line_numbers: bool,
    /// The first line number assigned (`line_number = line_number_base + index`).
    pub line_number_base: u64,
    /// Send `$C` before streaming to enable check (dry-run) mode.
    pub check_mode: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            t_resp_ms: 30_000,
            t_retry_ms: 1_000,
            t_quiesce_ms: 2_000,
            t_ui_ms: 250,
            use_line_numbers: true,
            line_number_base: 1,
            check_mode: false,
        }
    }
}

impl EngineConfig {
    /// The per-line response timeout as a [`Duration`].
    pub fn t_resp(&self) -> Duration {
        Duration::from_millis(self.t_resp_ms)
    }

    /// The retry delay as a [`Duration`].
    pub fn t_retry(&self) -> Duration {
        Duration::from_millis(self.t_retry_ms)
    }

    /// The quiesce duration as a [`Duration`].
    pub fn t_quiesce(&self) -> Duration {
        Duration::from_millis(self.t_quiesce_ms)
    }

    /// The UI throttle interval as a [`Duration`].
    pub fn t_ui(&self) -> Duration {
        Duration::from_millis(self.t_ui_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.max_retries, 3);
        assert_eq!(cfg.t_resp_ms, 30_000);
        assert_eq!(cfg.t_retry_ms, 1_000);
        assert_eq!(cfg.t_quiesce_ms, 2_000);
        assert_eq!(cfg.t_ui_ms, 250);
        assert!(cfg.use_line_numbers);
        assert_eq!(cfg.line_number_base, 1);
        assert!(!cfg.check_mode);
    }
}
