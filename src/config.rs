//! Knobs read by the scheduler and by promises created under it.

/// Scheduler configuration.
///
/// Every promise consults the configuration of the scheduler it was created
/// under, so a host can tune diagnostics per scheduler.
///
/// # Examples
///
/// ```
/// use eventual::Config;
///
/// let config = Config::default().with_turn_limit(Some(64)).with_report_resettle(true);
/// assert_eq!(config.turn_limit, Some(64));
/// assert!(config.report_unhandled);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Maximum number of turns a single `run_until_idle` call may execute.
    pub turn_limit: Option<usize>,
    /// Log rejected promises that are dropped without anyone observing them.
    pub report_unhandled: bool,
    /// Log settle calls that arrive after a promise was already settled.
    pub report_resettle: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            turn_limit: Some(1_000_000),
            report_unhandled: true,
            report_resettle: false,
        }
    }
}

impl Config {
    pub fn with_turn_limit(mut self, turn_limit: Option<usize>) -> Self {
        self.turn_limit = turn_limit;
        self
    }

    pub fn with_report_unhandled(mut self, report: bool) -> Self {
        self.report_unhandled = report;
        self
    }

    pub fn with_report_resettle(mut self, report: bool) -> Self {
        self.report_resettle = report;
        self
    }
}
