use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::{keys, KvStore};

pub const DEFAULT_WORK_MINUTES: u32 = 25;
pub const DEFAULT_BREAK_MINUTES: u32 = 5;

/// Upper bound on missed work/break cycles replayed after a long gap
/// (machine asleep, process stopped). Past this the countdown just clamps.
const MAX_CATCH_UP_CYCLES: u32 = 12;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PomodoroMode {
    #[default]
    Work,
    Break,
}

impl PomodoroMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PomodoroMode::Work => "work",
            PomodoroMode::Break => "break",
        }
    }

    pub fn flipped(self) -> Self {
        match self {
            PomodoroMode::Work => PomodoroMode::Break,
            PomodoroMode::Break => PomodoroMode::Work,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistEntry {
    pub id: String,
    pub video_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_sec: Option<f64>,
}

/// The timer's persisted snapshot: everything the reconcile poller needs to
/// rebuild the timer's activity process without the timer surface running.
///
/// The countdown is anchored on `target_epoch`, an absolute completion
/// timestamp, so elapsed background time is recovered exactly instead of
/// drifting with missed ticks. While paused the leftover is kept in
/// `remaining_seconds` and the target is cleared.
///
/// Playback fields (`playlist`, `current_index`, `volume`, ...) belong to
/// the external media collaborator; they are carried through read-modify-
/// write untouched, as is anything unknown via `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct PomodoroSnapshot {
    pub work_minutes: Option<u32>,
    pub break_minutes: Option<u32>,
    pub mode: PomodoroMode,
    pub is_running: bool,
    pub target_epoch: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_seconds: Option<i64>,
    pub auto_play_music: bool,
    pub volume: u32,
    pub playlist: Vec<PlaylistEntry>,
    pub current_index: usize,
    pub repeat: bool,
    pub show_video: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_current_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_is_playing: Option<bool>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl PomodoroSnapshot {
    /// Starting point for a timer that has never been configured.
    pub fn fresh() -> Self {
        Self {
            work_minutes: Some(DEFAULT_WORK_MINUTES),
            break_minutes: Some(DEFAULT_BREAK_MINUTES),
            volume: 60,
            ..Self::default()
        }
    }

    pub fn load(store: &KvStore) -> Option<Self> {
        store.get_json(keys::POMODORO_SETTINGS)
    }

    pub fn save(&self, store: &KvStore) {
        store.set_json(keys::POMODORO_SETTINGS, self);
    }

    /// Snapshots without both durations were never initialized by the timer
    /// surface; the poller skips them entirely.
    pub fn has_required_durations(&self) -> bool {
        self.work_minutes.is_some() && self.break_minutes.is_some()
    }

    pub fn work_minutes_or_default(&self) -> u32 {
        self.work_minutes.unwrap_or(DEFAULT_WORK_MINUTES)
    }

    pub fn break_minutes_or_default(&self) -> u32 {
        self.break_minutes.unwrap_or(DEFAULT_BREAK_MINUTES)
    }

    pub fn duration_seconds(&self, mode: PomodoroMode) -> i64 {
        let minutes = match mode {
            PomodoroMode::Work => self.work_minutes_or_default(),
            PomodoroMode::Break => self.break_minutes_or_default(),
        };
        i64::from(minutes) * 60
    }

    pub fn mode_duration_seconds(&self) -> i64 {
        self.duration_seconds(self.mode)
    }

    /// Remaining seconds as of `now_ms`, never negative. Running timers are
    /// measured against the target epoch; paused timers report the captured
    /// leftover; everything else falls back to the current mode's full
    /// duration.
    pub fn seconds_left(&self, now_ms: i64) -> i64 {
        if self.is_running {
            if let Some(target) = self.target_epoch {
                return round_to_seconds(target - now_ms).max(0);
            }
        } else if let Some(remaining) = self.remaining_seconds {
            return remaining.max(0);
        }
        self.mode_duration_seconds()
    }

    /// Replay work/break transitions a running timer missed while nothing
    /// was ticking: flip the mode and push the target forward by the next
    /// mode's duration until the target is in the future again (capped at
    /// `MAX_CATCH_UP_CYCLES`). Returns whether anything changed so callers
    /// know to persist the mutated snapshot.
    pub fn advance_cycles(&mut self, now_ms: i64) -> bool {
        if !self.is_running {
            return false;
        }
        let Some(mut target) = self.target_epoch else {
            return false;
        };
        if target > now_ms {
            return false;
        }

        let mut safety = MAX_CATCH_UP_CYCLES;
        while safety > 0 && target <= now_ms {
            self.mode = self.mode.flipped();
            target += self.duration_seconds(self.mode) * 1000;
            safety -= 1;
        }
        self.target_epoch = Some(target);
        true
    }

    /// Pause <-> resume. Pausing captures the leftover seconds from the
    /// target and drops the target; resuming computes a fresh target from
    /// the leftover (or the mode's full duration) and drops the leftover.
    pub fn toggle(&mut self, now_ms: i64) {
        if self.is_running {
            if let Some(target) = self.target_epoch {
                self.remaining_seconds = Some(round_to_seconds(target - now_ms).max(0));
            }
            self.is_running = false;
            self.target_epoch = None;
        } else {
            let base = self
                .remaining_seconds
                .unwrap_or_else(|| self.mode_duration_seconds());
            self.is_running = true;
            self.target_epoch = Some(now_ms + base * 1000);
            self.remaining_seconds = None;
        }
    }

    /// Back to a stopped work interval at full length.
    pub fn reset(&mut self) {
        self.is_running = false;
        self.mode = PomodoroMode::Work;
        self.target_epoch = None;
        self.remaining_seconds = Some(i64::from(self.work_minutes_or_default()) * 60);
    }

    /// Apply edited durations. A running timer keeps counting but its
    /// remaining time is clamped to the new base and the target recomputed;
    /// a stopped timer just rederives the full duration next read.
    pub fn set_durations(&mut self, work: Option<u32>, break_minutes: Option<u32>, now_ms: i64) {
        if let Some(work) = work {
            self.work_minutes = Some(work);
        }
        if let Some(break_minutes) = break_minutes {
            self.break_minutes = Some(break_minutes);
        }

        let base = self.mode_duration_seconds();
        if self.is_running {
            let clamped = self.seconds_left(now_ms).min(base);
            self.target_epoch = Some(now_ms + clamped * 1000);
        } else {
            self.remaining_seconds = None;
        }
    }
}

fn round_to_seconds(delta_ms: i64) -> i64 {
    (delta_ms as f64 / 1000.0).round() as i64
}
