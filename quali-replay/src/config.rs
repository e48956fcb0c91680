//! Replay configuration types
//!
//! This module defines the tunable constants of the replay engine. None of
//! them are invariants: stepping granularity, prefetch thresholds and
//! highlight windows can all be adjusted without affecting correctness of
//! the derived state for a given simulated timestamp.

use serde::{Deserialize, Serialize};

/// Configuration for the replay engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayConfig {
    /// Simulated milliseconds per clock increment (default: 80ms)
    #[serde(default = "default_step_ms")]
    pub step_ms: i64,

    /// Maximum increments per tick; larger gaps use a wider step (default: 200)
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Best-lap highlight window in simulated milliseconds (default: 5000ms)
    #[serde(default = "default_window_ms")]
    pub highlight_ms: i64,

    /// How long a position change stays visible, simulated ms (default: 5000ms)
    #[serde(default = "default_window_ms")]
    pub position_move_ms: i64,

    /// Laps requested per prefetch batch (default: 3)
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Fetch the next batch once this many laps before it are reached (default: 3)
    #[serde(default = "default_batch_size")]
    pub prefetch_lookahead: u32,

    /// Laps fetched per driver while bootstrapping a session (default: 3)
    #[serde(default = "default_batch_size")]
    pub initial_laps: u32,

    /// Playback speed multiplier applied after load (default: 5)
    #[serde(default = "default_speed")]
    pub speed: f64,
}

fn default_step_ms() -> i64 {
    80
}

fn default_max_iterations() -> u32 {
    200
}

fn default_window_ms() -> i64 {
    5000
}

fn default_batch_size() -> u32 {
    3
}

fn default_speed() -> f64 {
    5.0
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            step_ms: default_step_ms(),
            max_iterations: default_max_iterations(),
            highlight_ms: default_window_ms(),
            position_move_ms: default_window_ms(),
            batch_size: default_batch_size(),
            prefetch_lookahead: default_batch_size(),
            initial_laps: default_batch_size(),
            speed: default_speed(),
        }
    }
}

impl ReplayConfig {
    /// Create a new replay configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the simulated step size
    pub fn with_step_ms(mut self, step_ms: i64) -> Self {
        self.step_ms = step_ms.max(1);
        self
    }

    /// Builder method: set the per-tick iteration cap
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    /// Builder method: set the best-lap highlight window
    pub fn with_highlight_ms(mut self, highlight_ms: i64) -> Self {
        self.highlight_ms = highlight_ms;
        self
    }

    /// Builder method: set the prefetch batch size and lookahead
    pub fn with_prefetch(mut self, batch_size: u32, lookahead: u32) -> Self {
        self.batch_size = batch_size.max(1);
        self.prefetch_lookahead = lookahead;
        self
    }

    /// Builder method: set how many laps are fetched per driver on load
    pub fn with_initial_laps(mut self, initial_laps: u32) -> Self {
        self.initial_laps = initial_laps.max(1);
        self
    }

    /// Builder method: set the playback speed multiplier
    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }

    /// Step size for a gap, widened so the gap fits in `max_iterations` steps
    pub fn step_for_gap(&self, gap: i64) -> i64 {
        let step = self.step_ms.max(1);
        let max_iterations = i64::from(self.max_iterations.max(1));
        if gap > step * max_iterations {
            (gap + max_iterations - 1) / max_iterations
        } else {
            step
        }
    }
}
