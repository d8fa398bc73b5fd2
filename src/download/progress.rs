use std::fmt;

use serde::{Deserialize, Serialize};

use crate::download::config::ProgressStep;

/// Snapshot of how far a download has come. Recomputed per
/// notification, never stored long-term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DownloadProgress {
    pub downloaded: u64,
    pub total: Option<u64>,
}

impl DownloadProgress {
    pub fn new(downloaded: u64, total: Option<u64>) -> Self {
        Self { downloaded, total }
    }

    /// 0–100; 0 while the total is unknown, 100 only at completion.
    pub fn percent(&self) -> u8 {
        match self.total {
            Some(0) => 100,
            Some(total) => ((self.downloaded as f64 / total as f64) * 100.0).min(100.0) as u8,
            None => 0,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.total, Some(total) if self.downloaded >= total)
    }
}

impl fmt::Display for DownloadProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.total {
            Some(total) => write!(f, "{}/{} ({}%)", self.downloaded, total, self.percent()),
            None => write!(f, "{}/?", self.downloaded),
        }
    }
}

/// Decides when accumulated bytes justify an `on_progress` callback,
/// bounding listener frequency independent of transport chunk size.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ProgressGate {
    step: ProgressStep,
    /// bytes at the last notification (bytes mode), or last notified
    /// integer percent (percent mode)
    checkpoint: u64,
}

impl ProgressGate {
    pub(crate) fn new(step: ProgressStep) -> Self {
        Self { step, checkpoint: 0 }
    }

    /// Resume from a known offset without firing straight away.
    pub(crate) fn resume_at(step: ProgressStep, progress: DownloadProgress) -> Self {
        let checkpoint = match step {
            ProgressStep::Bytes(_) => progress.downloaded,
            ProgressStep::Percent(_) => progress.percent() as u64,
        };
        Self { step, checkpoint }
    }

    pub(crate) fn should_emit(&mut self, progress: DownloadProgress) -> bool {
        match self.step {
            ProgressStep::Bytes(step) => {
                let step = step.max(1);
                if progress.downloaded - self.checkpoint >= step {
                    self.checkpoint = progress.downloaded;
                    true
                } else {
                    false
                }
            }
            ProgressStep::Percent(step) => {
                let step = step.max(1) as u64;
                let percent = progress.percent() as u64;
                if percent / step > self.checkpoint / step {
                    self.checkpoint = percent;
                    true
                } else {
                    false
                }
            }
        }
    }
}
