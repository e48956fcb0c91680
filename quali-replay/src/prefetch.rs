//! Lap prefetch scheduling
//!
//! Sessions are loaded a few laps at a time. Each driver carries a
//! [`PrefetchCursor`] that says which lap to ask for next; the engine checks
//! the trigger on every clock step and emits [`FetchRequest`]s for the owner
//! of the timing source to execute. Completions come back as
//! [`FetchOutcome`]s.

use crate::config::ReplayConfig;
use crate::lap::LapFact;
use crate::types::{RawLap, SimTime};
use std::collections::VecDeque;
use std::sync::Arc;

/// Per-driver position in the lap download
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefetchCursor {
    /// First lap not yet requested; `None` once everything is fetched
    pub next_batch_start: Option<u32>,
    /// Total laps the driver completed in the session, if known
    pub max_laps: Option<u32>,
    /// A request for this driver is in flight
    pub loading: bool,
}

impl PrefetchCursor {
    /// Cursor after the initial `1..=initial_end` laps were loaded
    pub fn after_initial(initial_end: u32, max_laps: Option<u32>) -> Self {
        let next_batch_start = match max_laps {
            Some(max) if initial_end >= max => None,
            _ => Some(initial_end + 1),
        };
        Self {
            next_batch_start,
            max_laps,
            loading: false,
        }
    }

    /// Lap range of the next batch, clearing the cursor if it ran past the cap
    pub fn next_batch(&mut self, batch_size: u32) -> Option<(u32, u32)> {
        let from = self.next_batch_start?;
        if let Some(max) = self.max_laps {
            if from > max {
                self.next_batch_start = None;
                return None;
            }
        }
        let mut to = from + batch_size.max(1) - 1;
        if let Some(max) = self.max_laps {
            to = to.min(max);
        }
        Some((from, to))
    }

    /// Record a successful batch ending at `to_lap`
    pub fn advance_past(&mut self, to_lap: u32) {
        let next = to_lap + 1;
        self.next_batch_start = match self.max_laps {
            Some(max) if next > max => None,
            _ => Some(next),
        };
    }

    /// Check the trigger condition for this driver at simulated time `now`
    pub fn should_fetch(
        &self,
        active_lap: Option<&LapFact>,
        last_completed_lap: Option<u32>,
        now: SimTime,
        config: &ReplayConfig,
    ) -> bool {
        let Some(next) = self.next_batch_start else {
            return false;
        };
        if self.loading {
            return false;
        }

        let trigger_lap = next.saturating_sub(config.prefetch_lookahead).max(1);
        let reached_marker = active_lap
            .filter(|lap| lap.lap_number >= trigger_lap)
            .and_then(LapFact::prefetch_marker)
            .map_or(false, |marker| now >= marker);

        reached_marker || last_completed_lap.unwrap_or(0) >= trigger_lap
    }
}

/// Request for a contiguous range of laps of one driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchRequest {
    pub driver_number: u32,
    pub from_lap: u32,
    pub to_lap: u32,
    /// Issued by the per-phase sweep rather than the live trigger
    pub sweep: bool,
}

/// Result of executing a [`FetchRequest`]
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Loaded(Vec<RawLap>),
    Failed(String),
}

/// A request paired with its outcome, posted back to the engine
#[derive(Debug, Clone, PartialEq)]
pub struct FetchCompletion {
    pub request: FetchRequest,
    pub outcome: FetchOutcome,
}

/// Sequential walk over all drivers issued once per phase entry
#[derive(Debug, Default)]
pub struct PhaseSweep {
    phase: Option<u8>,
    pending: VecDeque<u32>,
    in_flight: Option<u32>,
}

impl PhaseSweep {
    /// Start a sweep for `phase`; ignored if one is running or this phase was already swept
    pub fn begin(&mut self, phase: u8, drivers: impl IntoIterator<Item = u32>) -> bool {
        if self.is_running() || self.phase == Some(phase) {
            return false;
        }
        self.phase = Some(phase);
        self.pending = drivers.into_iter().collect();
        true
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.is_some() || !self.pending.is_empty()
    }

    /// Next driver to visit, if no sweep request is outstanding
    pub fn next_driver(&mut self) -> Option<u32> {
        if self.in_flight.is_some() {
            return None;
        }
        self.pending.pop_front()
    }

    pub fn mark_in_flight(&mut self, driver_number: u32) {
        self.in_flight = Some(driver_number);
    }

    /// Note that the outstanding sweep request for `driver_number` finished
    pub fn complete(&mut self, driver_number: u32) {
        if self.in_flight == Some(driver_number) {
            self.in_flight = None;
        }
    }
}

/// Lap facts from a completed fetch, already normalized
pub fn loaded_laps(outcome: &FetchOutcome) -> Option<Vec<Arc<LapFact>>> {
    match outcome {
        FetchOutcome::Loaded(raw) => Some(crate::lap::normalize_laps(raw)),
        FetchOutcome::Failed(_) => None,
    }
}
