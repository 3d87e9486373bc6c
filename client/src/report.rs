use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use log::*;
use mocap_transport::{Frame, SessionStats};

/// Per-avatar counters accumulated between two reports.
#[derive(Debug, Default, Clone)]
struct AvatarCounters {
    name: String,
    seen: bool,
    frames: u64,
    last_frame_index: u32,
    skipped: u64,
}

/// Receive statistics printed at a fixed period.
pub struct FrameReport {
    period: Duration,
    window_start: Instant,
    avatars: BTreeMap<u32, AvatarCounters>,
    total_frames: u64,
}

impl FrameReport {
    pub fn new(period: Duration, now: Instant) -> Self {
        Self {
            period,
            window_start: now,
            avatars: BTreeMap::new(),
            total_frames: 0,
        }
    }

    pub fn record(&mut self, frame: &Frame) {
        let counters = self.avatars.entry(frame.avatar_index()).or_default();
        if counters.seen {
            let gap = frame.frame_index().wrapping_sub(counters.last_frame_index);
            // A huge gap is a restart or reordering, not loss.
            if gap > 1 && gap < u32::MAX / 2 {
                counters.skipped += u64::from(gap - 1);
            }
        }
        if counters.name != frame.header.avatar_name {
            counters.name = frame.header.avatar_name.clone();
        }
        counters.seen = true;
        counters.frames += 1;
        counters.last_frame_index = frame.frame_index();
        self.total_frames += 1;

        trace!(
            "avatar {} frame {} first values {:?}",
            frame.avatar_index(),
            frame.frame_index(),
            &frame.values()[..frame.values().len().min(6)]
        );
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    /// Logs a summary if the period elapsed, then starts a new window.
    pub fn maybe_report(&mut self, now: Instant, stats: &SessionStats) {
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < self.period {
            return;
        }

        let secs = elapsed.as_secs_f64();
        for (index, counters) in &self.avatars {
            info!(
                "avatar {} '{}': {:.1} fps, last frame {}, {} skipped",
                index,
                counters.name,
                counters.frames as f64 / secs,
                counters.last_frame_index,
                counters.skipped
            );
        }
        info!(
            "session: {} bytes, {} frames, {} framing errors ({} bytes discarded)",
            stats.bytes_received, stats.frames_delivered, stats.framing_errors, stats.bytes_discarded
        );

        for counters in self.avatars.values_mut() {
            counters.frames = 0;
            counters.skipped = 0;
        }
        self.window_start = now;
    }
}
