use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{OnairError, OnairResult};

/// Buffering and timeout constants for live playback.
///
/// The connect timeout is short so a dead endpoint fails fast and the retry
/// policy can react. The read timeout is long so a healthy but momentarily
/// quiet live connection is not torn down mid-stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferPlan {
    pub min_buffer_ms: u64,
    pub max_buffer_ms: u64,
    pub buffer_for_playback_ms: u64,
    pub buffer_for_rebuffer_ms: u64,
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
}

impl BufferPlan {
    pub const LIVE: BufferPlan = BufferPlan {
        min_buffer_ms: 20_000,
        max_buffer_ms: 60_000,
        buffer_for_playback_ms: 1_500,
        buffer_for_rebuffer_ms: 4_000,
        connect_timeout_ms: 1_500,
        read_timeout_ms: 60_000,
    };

    pub fn min_buffer(&self) -> Duration {
        Duration::from_millis(self.min_buffer_ms)
    }

    pub fn max_buffer(&self) -> Duration {
        Duration::from_millis(self.max_buffer_ms)
    }

    pub fn buffer_for_playback(&self) -> Duration {
        Duration::from_millis(self.buffer_for_playback_ms)
    }

    pub fn buffer_for_rebuffer(&self) -> Duration {
        Duration::from_millis(self.buffer_for_rebuffer_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn validate(&self) -> OnairResult<()> {
        if self.connect_timeout_ms == 0 || self.connect_timeout_ms >= self.read_timeout_ms {
            return Err(OnairError::InvalidConfig(format!(
                "connect timeout ({}ms) must be non-zero and shorter than read timeout ({}ms)",
                self.connect_timeout_ms, self.read_timeout_ms
            )));
        }
        if self.min_buffer_ms > self.max_buffer_ms {
            return Err(OnairError::InvalidConfig(format!(
                "min buffer ({}ms) exceeds max buffer ({}ms)",
                self.min_buffer_ms, self.max_buffer_ms
            )));
        }
        if self.buffer_for_playback_ms > self.min_buffer_ms
            || self.buffer_for_rebuffer_ms > self.min_buffer_ms
        {
            return Err(OnairError::InvalidConfig(format!(
                "playback ({}ms) and rebuffer ({}ms) thresholds must not exceed min buffer ({}ms)",
                self.buffer_for_playback_ms, self.buffer_for_rebuffer_ms, self.min_buffer_ms
            )));
        }
        Ok(())
    }
}

impl Default for BufferPlan {
    fn default() -> Self {
        Self::LIVE
    }
}

/// Applies a [`BufferPlan`] to the amount of media currently buffered.
#[derive(Debug, Clone)]
pub struct LoadControl {
    plan: BufferPlan,
    is_loading: bool,
}

impl LoadControl {
    pub fn new(plan: BufferPlan) -> Self {
        Self {
            plan,
            is_loading: true,
        }
    }

    pub fn plan(&self) -> &BufferPlan {
        &self.plan
    }

    /// Loading continues below the min buffer and stops at the max buffer.
    /// In between, the previous decision is kept.
    pub fn should_continue_loading(&mut self, buffered: Duration) -> bool {
        if buffered < self.plan.min_buffer() {
            self.is_loading = true;
        } else if buffered >= self.plan.max_buffer() {
            self.is_loading = false;
        }
        self.is_loading
    }

    pub fn should_start_playback(&self, buffered: Duration, rebuffering: bool) -> bool {
        let target = if rebuffering {
            self.plan.buffer_for_rebuffer()
        } else {
            self.plan.buffer_for_playback()
        };
        buffered >= target
    }

    /// Converts buffered bytes into playable time for a stream of known bitrate.
    pub fn buffered_duration(bytes: u64, bitrate_kbps: u32) -> Option<Duration> {
        if bitrate_kbps == 0 {
            return None;
        }
        let bytes_per_second = u64::from(bitrate_kbps) * 1000 / 8;
        Some(Duration::from_secs_f64(bytes as f64 / bytes_per_second as f64))
    }

    pub fn reset(&mut self) {
        self.is_loading = true;
    }
}
