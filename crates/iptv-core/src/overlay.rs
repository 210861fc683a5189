//! Channel banner policy.
//!
//! While a switch is pending the banner shows the candidate as "selecting";
//! after a commit it shows "now playing" for a fixed dwell time, then hides.
//!
//! ```text
//!  Hidden ──step──▶ Selecting{i} ──commit──▶ NowPlaying{i} ──dwell──▶ Hidden
//!                        ▲                         │
//!                        └──────────step───────────┘
//! ```

use std::time::Duration;

use iptv_proto::protocol::Indicator;
use tokio::time::Instant;

#[derive(Debug)]
pub struct IndicatorTracker {
    dwell: Duration,
    now_playing: Option<(usize, Instant)>,
    token: u64,
}

impl IndicatorTracker {
    pub fn new(dwell: Duration) -> Self {
        Self {
            dwell,
            now_playing: None,
            token: 0,
        }
    }

    pub fn dwell(&self) -> Duration {
        self.dwell
    }

    /// A switch committed.  Returns the token the expiry timer must echo back.
    pub fn committed(&mut self, index: usize) -> u64 {
        self.token += 1;
        self.now_playing = Some((index, Instant::now()));
        self.token
    }

    /// Dwell timer fired.  Returns `true` if the banner changed.
    pub fn expire(&mut self, token: u64) -> bool {
        if token == self.token && self.now_playing.is_some() {
            self.now_playing = None;
            return true;
        }
        false
    }

    /// Hide the banner now.  A dwell timer still running finds nothing to expire.
    pub fn clear(&mut self) {
        self.now_playing = None;
    }

    /// What the banner should show, given the switcher's pending index.
    pub fn current(&self, pending_index: Option<usize>) -> Indicator {
        if let Some(index) = pending_index {
            return Indicator::Selecting { index };
        }
        match self.now_playing {
            Some((index, since)) if since.elapsed() < self.dwell => Indicator::NowPlaying { index },
            _ => Indicator::Hidden,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_pending_wins_over_now_playing() {
        let mut tracker = IndicatorTracker::new(Duration::from_secs(5));
        tracker.committed(2);
        assert_eq!(tracker.current(Some(3)), Indicator::Selecting { index: 3 });
        assert_eq!(tracker.current(None), Indicator::NowPlaying { index: 2 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_now_playing_hides_after_dwell() {
        let mut tracker = IndicatorTracker::new(Duration::from_secs(5));
        let token = tracker.committed(1);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(tracker.current(None), Indicator::Hidden);
        assert!(tracker.expire(token));
        assert!(!tracker.expire(token));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_expiry_keeps_newer_banner() {
        let mut tracker = IndicatorTracker::new(Duration::from_secs(5));
        let first = tracker.committed(1);
        tokio::time::sleep(Duration::from_secs(3)).await;
        tracker.committed(4);
        assert!(!tracker.expire(first));
        assert_eq!(tracker.current(None), Indicator::NowPlaying { index: 4 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_hides_banner_before_dwell() {
        let mut tracker = IndicatorTracker::new(Duration::from_secs(5));
        let token = tracker.committed(2);
        tracker.clear();
        assert_eq!(tracker.current(None), Indicator::Hidden);
        assert!(!tracker.expire(token));
    }
}
