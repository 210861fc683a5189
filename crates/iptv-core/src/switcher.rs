//! Channel-switch debouncer.
//!
//! Remote-control stepping moves `display_index` immediately so the banner can
//! follow the user's input, but the actual channel change waits for a quiet
//! period.  Every accepted step aborts the running timer and starts a new one;
//! when a timer fires it sends a [`SwitchCommit`] carrying the token of the
//! step that armed it.  [`ChannelSwitcher::accept`] drops commits whose token
//! is no longer current, which covers a timer that fired just before it was
//! superseded.

use std::time::Duration;

use chrono::{DateTime, Utc};
use iptv_proto::protocol::{Direction, PendingSwitchInfo};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::debug;

/// Sent by an expired debounce timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchCommit {
    pub index: usize,
    token: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSwitch {
    pub requested_index: usize,
    pub requested_at: DateTime<Utc>,
    token: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The display moved; a commit is now pending.
    Moved { display_index: usize },
    /// Already at the edge (or nothing to step through).  Nothing changed.
    Clamped,
}

pub struct ChannelSwitcher {
    len: usize,
    display_index: Option<usize>,
    committed_index: Option<usize>,
    pending: Option<PendingSwitch>,
    quiet_period: Duration,
    next_token: u64,
    timer: Option<AbortHandle>,
    commit_tx: mpsc::Sender<SwitchCommit>,
}

impl ChannelSwitcher {
    pub fn new(quiet_period: Duration, commit_tx: mpsc::Sender<SwitchCommit>) -> Self {
        Self {
            len: 0,
            display_index: None,
            committed_index: None,
            pending: None,
            quiet_period,
            next_token: 1,
            timer: None,
            commit_tx,
        }
    }

    pub fn display_index(&self) -> Option<usize> {
        self.display_index
    }

    pub fn committed_index(&self) -> Option<usize> {
        self.committed_index
    }

    pub fn pending(&self) -> Option<&PendingSwitch> {
        self.pending.as_ref()
    }

    pub fn pending_info(&self) -> Option<PendingSwitchInfo> {
        self.pending.as_ref().map(|p| PendingSwitchInfo {
            requested_index: p.requested_index,
            requested_at: p.requested_at,
        })
    }

    /// Reset for a new channel list.  Any pending switch is discarded.
    pub fn reset(&mut self, len: usize, current: Option<usize>) {
        self.cancel_pending();
        self.len = len;
        let current = current.filter(|&i| i < len);
        self.committed_index = current;
        self.display_index = current;
    }

    /// Move one channel up or down.  Clamped at both ends, never wraps.
    pub fn step(&mut self, direction: Direction) -> StepOutcome {
        if self.len == 0 {
            return StepOutcome::Clamped;
        }

        let target = match (self.display_index, direction) {
            (None, _) => 0,
            (Some(i), Direction::Up) if i > 0 => i - 1,
            (Some(i), Direction::Down) if i + 1 < self.len => i + 1,
            (Some(_), _) => return StepOutcome::Clamped,
        };

        self.abort_timer();
        let token = self.next_token;
        self.next_token += 1;

        self.display_index = Some(target);
        self.pending = Some(PendingSwitch {
            requested_index: target,
            requested_at: Utc::now(),
            token,
        });

        let tx = self.commit_tx.clone();
        let quiet = self.quiet_period;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(quiet).await;
            let _ = tx.send(SwitchCommit { index: target, token }).await;
        });
        self.timer = Some(timer.abort_handle());

        debug!("switcher: pending index {} (token {})", target, token);
        StepOutcome::Moved {
            display_index: target,
        }
    }

    /// Direct selection.  Commits immediately, discarding any pending step.
    pub fn pick(&mut self, index: usize) -> bool {
        if index >= self.len {
            return false;
        }
        self.cancel_pending();
        self.committed_index = Some(index);
        self.display_index = Some(index);
        true
    }

    /// Resolve a fired timer.  Returns the index to switch to when the commit
    /// still matches the pending switch.
    pub fn accept(&mut self, commit: SwitchCommit) -> Option<usize> {
        match &self.pending {
            Some(p) if p.token == commit.token => {
                self.pending = None;
                self.timer = None;
                self.committed_index = Some(commit.index);
                self.display_index = Some(commit.index);
                Some(commit.index)
            }
            _ => {
                debug!("switcher: stale commit for index {} dropped", commit.index);
                None
            }
        }
    }

    /// Drop the pending switch; the display falls back to the committed index.
    pub fn cancel_pending(&mut self) {
        self.abort_timer();
        if self.pending.take().is_some() {
            self.display_index = self.committed_index;
        }
    }

    /// Record a selection made outside the switcher (e.g. a raw url that
    /// happens to be in the catalog).
    pub fn sync_committed(&mut self, index: Option<usize>) {
        self.cancel_pending();
        self.committed_index = index.filter(|&i| i < self.len);
        self.display_index = self.committed_index;
    }

    fn abort_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

impl Drop for ChannelSwitcher {
    fn drop(&mut self) {
        self.abort_timer();
    }
}
