//! Qualifying phase segmentation
//!
//! Phase ranges are derived from race-control records that carry a
//! qualifying phase number. Consecutive records of the same phase collapse
//! into one range; ranges are contiguous and clipped to the session window.

use crate::types::{parse_timestamp, ControlEvent, SessionResult, SimTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Label shown when the simulated time is outside every phase
pub const NO_PHASE_LABEL: &str = "—";

/// A qualifying segment, numbered from 1 (Q1, Q2, Q3)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Phase(pub u8);

impl Phase {
    /// Index into per-phase arrays such as result durations
    pub fn index(&self) -> Option<usize> {
        usize::from(self.0).checked_sub(1)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Q{}", self.0)
    }
}

/// Active time range of one phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseRange {
    pub phase: Phase,
    pub start: SimTime,
    pub end: SimTime,
}

/// Ordered phase ranges of a session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhaseSchedule {
    ranges: Vec<PhaseRange>,
}

impl PhaseSchedule {
    /// Derive phase ranges from race-control records
    pub fn from_control_events(events: &[ControlEvent], session_start: SimTime, session_end: SimTime) -> Self {
        let mut marks: Vec<(SimTime, Phase)> = events
            .iter()
            .filter_map(|event| {
                let phase = event.qualifying_phase.filter(|p| *p > 0)?;
                match parse_timestamp(&event.date) {
                    Ok(time) => Some((time, Phase(phase))),
                    Err(e) => {
                        log::debug!("Skipping control event: {}", e);
                        None
                    }
                }
            })
            .collect();
        marks.sort_by_key(|(time, _)| *time);

        Self::from_marks(&marks, session_start, session_end)
    }

    /// Derive phase ranges from time-sorted `(time, phase)` marks
    pub fn from_marks(marks: &[(SimTime, Phase)], session_start: SimTime, session_end: SimTime) -> Self {
        let Some(&(first_time, first_phase)) = marks.first() else {
            return Self::default();
        };

        let mut ranges = Vec::new();
        let mut current = first_phase;
        let mut start = session_start.max(first_time);

        for &(time, phase) in &marks[1..] {
            if phase != current {
                ranges.push(PhaseRange {
                    phase: current,
                    start,
                    end: start.max(time),
                });
                current = phase;
                start = session_start.max(time);
            }
        }
        ranges.push(PhaseRange {
            phase: current,
            start,
            end: start.max(session_end),
        });

        Self { ranges }
    }

    /// Phase range containing `time`, if any
    ///
    /// Ranges are half-open except the last one, which includes its end.
    pub fn range_at(&self, time: SimTime) -> Option<&PhaseRange> {
        let last = self.ranges.len().checked_sub(1)?;
        self.ranges.iter().enumerate().find_map(|(index, range)| {
            let inside = if index == last {
                time >= range.start && time <= range.end
            } else {
                time >= range.start && time < range.end
            };
            inside.then_some(range)
        })
    }

    pub fn phase_at(&self, time: SimTime) -> Option<Phase> {
        self.range_at(time).map(|range| range.phase)
    }

    pub fn ranges(&self) -> &[PhaseRange] {
        &self.ranges
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

/// Per-driver best durations by phase, used to tell who advanced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhaseResults {
    durations: HashMap<u32, Vec<Option<f64>>>,
}

impl PhaseResults {
    pub fn from_results(results: &[SessionResult]) -> Self {
        Self {
            durations: results
                .iter()
                .map(|result| (result.driver_number, result.duration.clone()))
                .collect(),
        }
    }

    /// True if the driver has no classified time in `phase`
    ///
    /// Without any results nobody is considered eliminated.
    pub fn is_eliminated(&self, driver_number: u32, phase: Phase) -> bool {
        if self.durations.is_empty() {
            return false;
        }
        let Some(index) = phase.index() else {
            return true;
        };
        !self
            .durations
            .get(&driver_number)
            .and_then(|durations| durations.get(index))
            .map_or(false, Option::is_some)
    }
}
