//! Frame intake gate.
//!
//! A frame is analyzed only when both the sampling interval since the last
//! analysis and the cooldown since the last match have elapsed. Everything
//! else is dropped unprocessed.

use std::time::{Duration, Instant};

pub const DEFAULT_ANALYSIS_INTERVAL: Duration = Duration::from_millis(200);
pub const DEFAULT_MATCH_COOLDOWN: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone)]
pub struct FrameGate {
    analysis_interval: Duration,
    cooldown: Duration,
    last_analysis: Option<Instant>,
    last_match: Option<Instant>,
}

impl Default for FrameGate {
    fn default() -> Self {
        Self::new(DEFAULT_ANALYSIS_INTERVAL, DEFAULT_MATCH_COOLDOWN)
    }
}

impl FrameGate {
    pub fn new(analysis_interval: Duration, cooldown: Duration) -> Self {
        Self {
            analysis_interval,
            cooldown,
            last_analysis: None,
            last_match: None,
        }
    }

    /// Decide whether a frame arriving at `now` should be analyzed.
    ///
    /// Admitting a frame stamps the analysis timer.
    pub fn admit(&mut self, now: Instant) -> bool {
        let interval_ok = elapsed_at_least(self.last_analysis, now, self.analysis_interval);
        let cooldown_ok = elapsed_at_least(self.last_match, now, self.cooldown);

        if interval_ok && cooldown_ok {
            self.last_analysis = Some(now);
            true
        } else {
            false
        }
    }

    /// Start the post-match cooldown window at `now`.
    pub fn record_match(&mut self, now: Instant) {
        self.last_match = Some(now);
        self.last_analysis = Some(now);
    }

    /// True while a match cooldown is still running at `now`.
    pub fn in_cooldown(&self, now: Instant) -> bool {
        !elapsed_at_least(self.last_match, now, self.cooldown)
    }
}

fn elapsed_at_least(since: Option<Instant>, now: Instant, wait: Duration) -> bool {
    match since {
        None => true,
        Some(t) => now.saturating_duration_since(t) >= wait,
    }
}
