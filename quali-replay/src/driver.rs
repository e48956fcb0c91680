//! Per-driver timing state machine
//!
//! A driver moves between pit lane, pit-out lap and flying lap as lap events
//! are applied:
//!
//! ```text
//! PitLane --LAP_START(pit out)--> PitOut --LAP_END--> PitLane
//! PitLane --LAP_START--------->  OnTrack --LAP_END--> PitLane
//! ```
//!
//! Every driver record lives in a [`DriverTable`] owned by the engine and is
//! only touched from the engine's tick.

use crate::config::ReplayConfig;
use crate::events::{EventKind, TimingEvent};
use crate::lap::{LapFact, SECTOR_COUNT};
use crate::prefetch::PrefetchCursor;
use crate::types::{DriverInfo, SimTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Static identity of a driver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverIdentity {
    pub number: u32,
    pub full_name: String,
    pub acronym: String,
    pub team_name: String,
    /// CSS-style colour, `#777777` when the source has none
    pub team_colour: String,
}

impl From<&DriverInfo> for DriverIdentity {
    fn from(info: &DriverInfo) -> Self {
        let number = info.driver_number;
        Self {
            number,
            full_name: info.full_name.clone().unwrap_or_else(|| format!("Driver {}", number)),
            acronym: info.name_acronym.clone().unwrap_or_else(|| number.to_string()),
            team_name: info.team_name.clone().unwrap_or_default(),
            team_colour: info
                .team_colour
                .as_deref()
                .filter(|c| !c.is_empty())
                .map_or_else(|| "#777777".to_string(), |c| format!("#{}", c)),
        }
    }
}

/// Where the car is; one variant at a time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackStatus {
    /// Not running: phase just began or driver eliminated
    Idle,
    PitLane,
    PitOut,
    OnTrack,
}

/// Best/last lap timing derived from completed laps of the current phase
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveTiming {
    pub best_lap_ms: Option<i64>,
    /// Simulated time the best lap was set
    pub best_lap_at: Option<SimTime>,
    pub best_lap_number: Option<u32>,
    pub best_sector_ms: [Option<i64>; SECTOR_COUNT],
    pub last_lap_ms: Option<i64>,
    pub last_sector_ms: [Option<i64>; SECTOR_COUNT],
    pub last_segments: Option<Vec<Option<u16>>>,
    pub last_completed_lap_number: Option<u32>,
    pub highlight_until: Option<SimTime>,
}

/// One minisector cell as it should be displayed at a given time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinisectorCell {
    /// Raw status code; `None` when the source had none
    pub value: Option<u16>,
    /// False for minisectors of the running lap not reached yet
    pub lit: bool,
}

/// Mutable timing record of one driver
#[derive(Debug, Clone)]
pub struct DriverState {
    pub identity: DriverIdentity,
    laps: Vec<Arc<LapFact>>,
    pub active_lap: Option<Arc<LapFact>>,
    pub timing: LiveTiming,
    pub status: TrackStatus,
    pub eliminated: bool,
    /// Start of the phase whose laps count towards live timing
    pub segment_start: Option<SimTime>,
    /// Index into the lap history of the last lap finished before the phase
    pub last_processed_lap_index: Option<usize>,
    pub prefetch: PrefetchCursor,
}

impl DriverState {
    /// Create a driver in the pit lane with no laps
    pub fn new(identity: DriverIdentity) -> Self {
        Self {
            identity,
            laps: Vec::new(),
            active_lap: None,
            timing: LiveTiming::default(),
            status: TrackStatus::PitLane,
            eliminated: false,
            segment_start: None,
            last_processed_lap_index: None,
            prefetch: PrefetchCursor::default(),
        }
    }

    pub fn number(&self) -> u32 {
        self.identity.number
    }

    /// Lap history ordered by start
    pub fn laps(&self) -> &[Arc<LapFact>] {
        &self.laps
    }

    /// Merge laps into the history, skipping lap numbers already known
    ///
    /// Returns the laps that were actually added.
    pub fn merge_laps(&mut self, laps: Vec<Arc<LapFact>>) -> Vec<Arc<LapFact>> {
        let mut known: HashSet<u32> = self.laps.iter().map(|lap| lap.lap_number).collect();
        let added: Vec<Arc<LapFact>> = laps
            .into_iter()
            .filter(|lap| known.insert(lap.lap_number))
            .collect();
        self.laps.extend(added.iter().cloned());
        self.laps.sort_by_key(|lap| lap.start);
        added
    }

    /// Start of the lap that follows `lap_number` in the history
    pub fn next_lap_start(&self, lap_number: u32) -> Option<SimTime> {
        let index = self.laps.iter().position(|lap| lap.lap_number == lap_number)?;
        self.laps.get(index + 1).map(|lap| lap.start)
    }

    pub fn on_track(&self) -> bool {
        self.status == TrackStatus::OnTrack
    }

    pub fn pit_out(&self) -> bool {
        self.status == TrackStatus::PitOut
    }

    pub fn pit_lane(&self) -> bool {
        self.status == TrackStatus::PitLane
    }

    /// Apply a LAP_START event
    pub fn apply_lap_start(&mut self, event: &TimingEvent) {
        self.status = if event.lap.is_pit_out_lap {
            TrackStatus::PitOut
        } else {
            TrackStatus::OnTrack
        };
        self.active_lap = Some(Arc::clone(&event.lap));
    }

    /// Apply a LAP_END event; returns true if it set a new personal best
    pub fn apply_lap_end(&mut self, event: &TimingEvent) -> bool {
        self.active_lap = None;
        self.status = TrackStatus::PitLane;
        self.timing.last_completed_lap_number = Some(event.lap_number);

        let lap = &event.lap;
        if self.segment_start.map_or(false, |start| lap.start < start) || !lap.is_timed() {
            return false;
        }
        let Some(duration) = lap.lap_duration_ms else {
            return false;
        };

        self.timing.last_lap_ms = Some(duration);
        self.timing.last_sector_ms = lap.sector_ms;
        self.timing.last_segments = Some(lap.segment_values());

        let improved = self.timing.best_lap_ms.map_or(true, |best| duration < best);
        if improved {
            self.timing.best_lap_ms = Some(duration);
            self.timing.best_lap_at = Some(event.time);
            self.timing.best_lap_number = Some(event.lap_number);
            self.timing.best_sector_ms = lap.sector_ms;
        }
        improved
    }

    /// Clear live timing and the running lap, keeping lap history
    pub fn reset_live(&mut self, status: TrackStatus) {
        self.timing = LiveTiming::default();
        self.active_lap = None;
        self.status = status;
    }

    /// Restore the state a driver has at the start of the session
    pub fn reset_runtime(&mut self) {
        self.reset_live(TrackStatus::PitLane);
        self.eliminated = false;
        self.segment_start = None;
        self.last_processed_lap_index = None;
    }

    /// Take the driver out of live timing for the rest of the session
    pub fn eliminate(&mut self) {
        self.eliminated = true;
        self.active_lap = None;
        self.status = TrackStatus::Idle;
    }

    /// Reset for a new phase starting at `segment_start`
    pub fn enter_phase(&mut self, segment_start: SimTime) {
        self.eliminated = false;
        self.reset_live(TrackStatus::Idle);
        self.segment_start = Some(segment_start);
        self.last_processed_lap_index = self
            .laps
            .iter()
            .take_while(|lap| lap.completion_marker() < segment_start)
            .count()
            .checked_sub(1);
    }

    /// Sector times to show at `now`, filling in as the running lap crosses each boundary
    pub fn display_sectors(&self, now: SimTime) -> [Option<i64>; SECTOR_COUNT] {
        let mut sectors = self.timing.last_sector_ms;
        if let Some(lap) = &self.active_lap {
            for (index, shown) in sectors.iter_mut().enumerate() {
                if lap.sector_end[index].map_or(false, |end| now >= end) {
                    *shown = lap.sector_ms[index];
                }
            }
        }
        sectors
    }

    /// Minisector cells to show at `now`
    pub fn display_minisectors(&self, now: SimTime) -> Vec<MinisectorCell> {
        match (&self.active_lap, &self.timing.last_segments) {
            (Some(lap), _) => lap
                .minisectors
                .iter()
                .map(|m| MinisectorCell {
                    value: m.value,
                    lit: now >= m.end,
                })
                .collect(),
            (None, Some(values)) => values
                .iter()
                .map(|value| MinisectorCell {
                    value: *value,
                    lit: true,
                })
                .collect(),
            (None, None) => Vec::new(),
        }
    }

    /// True while the best-lap highlight window covers `now`
    pub fn highlight_active(&self, now: SimTime) -> bool {
        self.timing.highlight_until.map_or(false, |until| now <= until)
    }
}

/// Arena of driver records keyed by driver number
#[derive(Debug, Clone, Default)]
pub struct DriverTable {
    drivers: BTreeMap<u32, DriverState>,
}

impl DriverTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, state: DriverState) {
        self.drivers.insert(state.number(), state);
    }

    pub fn get(&self, number: u32) -> Option<&DriverState> {
        self.drivers.get(&number)
    }

    pub fn get_mut(&mut self, number: u32) -> Option<&mut DriverState> {
        self.drivers.get_mut(&number)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DriverState> + Clone {
        self.drivers.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut DriverState> {
        self.drivers.values_mut()
    }

    /// Driver numbers in ascending order
    pub fn numbers(&self) -> Vec<u32> {
        self.drivers.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }

    /// Fastest current best lap across all drivers
    pub fn global_best_lap(&self) -> Option<i64> {
        self.drivers.values().filter_map(|d| d.timing.best_lap_ms).min()
    }

    /// Apply one event to its driver; unknown and eliminated drivers ignore it
    pub fn apply_event(&mut self, event: &TimingEvent, config: &ReplayConfig) {
        let Some(state) = self.drivers.get_mut(&event.driver_number) else {
            return;
        };
        if state.eliminated {
            return;
        }
        log::trace!(
            "{} driver {} lap {} at {}",
            event.kind,
            event.driver_number,
            event.lap_number,
            event.time
        );

        match event.kind {
            EventKind::LapStart => state.apply_lap_start(event),
            EventKind::LapEnd => {
                if !state.apply_lap_end(event) {
                    return;
                }
                let best = state.timing.best_lap_ms;
                let global = self.global_best_lap();
                if let Some(state) = self.drivers.get_mut(&event.driver_number) {
                    state.timing.highlight_until = if best.is_some() && best == global {
                        Some(event.time + config.highlight_ms)
                    } else {
                        None
                    };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::build_lap_events;
    use crate::lap::tests::{timed_lap, T0};
    use crate::types::parse_timestamp;

    fn identity(number: u32) -> DriverIdentity {
        DriverIdentity::from(&DriverInfo {
            driver_number: number,
            full_name: None,
            name_acronym: Some(format!("D{}", number)),
            team_name: None,
            team_colour: Some("3671C6".to_string()),
        })
    }

    fn lap_events(driver: u32, lap_number: u32, start: &str, sectors: [f64; 3]) -> Vec<TimingEvent> {
        let lap = Arc::new(LapFact::from_raw(&timed_lap(lap_number, start, sectors)).unwrap());
        build_lap_events(driver, &lap, None)
    }

    #[test]
    fn test_identity_defaults() {
        let id = DriverIdentity::from(&DriverInfo {
            driver_number: 81,
            full_name: None,
            name_acronym: None,
            team_name: None,
            team_colour: None,
        });
        assert_eq!(id.team_colour, "#777777");
        assert_eq!(id.acronym, "81");
        assert_eq!(identity(1).team_colour, "#3671C6");
    }

    #[test]
    fn test_flying_lap_transitions() {
        let mut state = DriverState::new(identity(1));
        let events = lap_events(1, 2, T0, [30.0, 35.0, 28.0]);

        state.apply_lap_start(&events[0]);
        assert!(state.on_track());
        assert!(!state.pit_out() && !state.pit_lane());
        assert!(state.active_lap.is_some());

        assert!(state.apply_lap_end(&events[1]));
        assert!(state.pit_lane());
        assert!(state.active_lap.is_none());
        assert_eq!(state.timing.best_lap_ms, Some(93_000));
        assert_eq!(state.timing.last_lap_ms, Some(93_000));
        assert_eq!(state.timing.best_lap_number, Some(2));
        assert_eq!(state.timing.last_completed_lap_number, Some(2));
        assert_eq!(state.timing.best_sector_ms, [Some(30_000), Some(35_000), Some(28_000)]);
    }

    #[test]
    fn test_pit_out_lap_sets_flags_but_no_timing() {
        let mut state = DriverState::new(identity(1));
        let mut raw = timed_lap(1, T0, [30.0, 35.0, 28.0]);
        raw.is_pit_out_lap = Some(true);
        let lap = Arc::new(LapFact::from_raw(&raw).unwrap());
        let events = build_lap_events(1, &lap, None);

        state.apply_lap_start(&events[0]);
        assert!(state.pit_out());
        assert!(!state.on_track());

        assert!(!state.apply_lap_end(&events[1]));
        assert!(state.pit_lane());
        assert_eq!(state.timing.best_lap_ms, None);
        assert_eq!(state.timing.last_lap_ms, None);
        assert_eq!(state.timing.last_completed_lap_number, Some(1));
    }

    #[test]
    fn test_best_only_improves_on_strictly_faster() {
        let mut state = DriverState::new(identity(1));
        let fast = lap_events(1, 2, T0, [30.0, 35.0, 28.0]);
        let slow = lap_events(1, 3, "2024-03-09T15:02:00+00:00", [31.0, 35.0, 28.0]);
        let equal = lap_events(1, 4, "2024-03-09T15:04:00+00:00", [30.0, 35.0, 28.0]);

        assert!(state.apply_lap_end(&fast[1]));
        assert!(!state.apply_lap_end(&slow[1]));
        assert_eq!(state.timing.best_lap_ms, Some(93_000));
        assert_eq!(state.timing.last_lap_ms, Some(94_000));
        assert_eq!(state.timing.last_sector_ms[0], Some(31_000));

        assert!(!state.apply_lap_end(&equal[1]));
        assert_eq!(state.timing.best_lap_number, Some(2));
    }

    #[test]
    fn test_laps_before_segment_start_do_not_count() {
        let mut state = DriverState::new(identity(1));
        let events = lap_events(1, 2, T0, [30.0, 35.0, 28.0]);
        state.enter_phase(parse_timestamp(T0).unwrap() + 1);

        assert!(!state.apply_lap_end(&events[1]));
        assert_eq!(state.timing.last_lap_ms, None);
        assert_eq!(state.timing.last_completed_lap_number, Some(2));
    }

    #[test]
    fn test_display_sectors_fill_in_progressively() {
        let mut state = DriverState::new(identity(1));
        let first = lap_events(1, 2, T0, [30.0, 35.0, 28.0]);
        state.apply_lap_start(&first[0]);
        state.apply_lap_end(&first[1]);

        let second = lap_events(1, 3, "2024-03-09T15:02:00+00:00", [29.0, 36.0, 27.0]);
        state.apply_lap_start(&second[0]);
        let start = second[0].time;

        assert_eq!(state.display_sectors(start + 10_000), [Some(30_000), Some(35_000), Some(28_000)]);
        assert_eq!(state.display_sectors(start + 29_000), [Some(29_000), Some(35_000), Some(28_000)]);
        assert_eq!(state.display_sectors(start + 65_000), [Some(29_000), Some(36_000), Some(28_000)]);
    }

    #[test]
    fn test_display_minisectors() {
        let mut state = DriverState::new(identity(1));
        assert!(state.display_minisectors(0).is_empty());

        let events = lap_events(1, 2, T0, [30.0, 35.0, 28.0]);
        state.apply_lap_start(&events[0]);
        let cells = state.display_minisectors(events[0].time + 10_000);
        assert_eq!(cells.len(), 9);
        assert!(cells[0].lit);
        assert!(!cells[1].lit);

        state.apply_lap_end(&events[1]);
        let cells = state.display_minisectors(events[1].time);
        assert_eq!(cells.len(), 9);
        assert!(cells.iter().all(|c| c.lit));
    }

    #[test]
    fn test_enter_phase_recomputes_processed_index() {
        let mut state = DriverState::new(identity(1));
        let laps = ["2024-03-09T15:00:00+00:00", "2024-03-09T15:02:00+00:00", "2024-03-09T15:20:00+00:00"]
            .iter()
            .enumerate()
            .map(|(i, start)| {
                Arc::new(LapFact::from_raw(&timed_lap(i as u32 + 1, start, [30.0, 35.0, 28.0])).unwrap())
            })
            .collect();
        state.merge_laps(laps);

        // Lap 2 ends at 15:03:33
        state.enter_phase(parse_timestamp("2024-03-09T15:10:00+00:00").unwrap());
        assert_eq!(state.last_processed_lap_index, Some(1));
        assert_eq!(state.status, TrackStatus::Idle);

        state.enter_phase(parse_timestamp("2024-03-09T15:00:30+00:00").unwrap());
        assert_eq!(state.last_processed_lap_index, None);
    }

    #[test]
    fn test_merge_laps_dedupes_by_lap_number() {
        let mut state = DriverState::new(identity(1));
        let lap = |n: u32, start: &str| Arc::new(LapFact::from_raw(&timed_lap(n, start, [30.0, 35.0, 28.0])).unwrap());

        let added = state.merge_laps(vec![lap(2, "2024-03-09T15:02:00+00:00")]);
        assert_eq!(added.len(), 1);
        let added = state.merge_laps(vec![lap(1, T0), lap(2, "2024-03-09T15:02:00+00:00")]);
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].lap_number, 1);

        let numbers: Vec<u32> = state.laps().iter().map(|l| l.lap_number).collect();
        assert_eq!(numbers, vec![1, 2]);
        assert_eq!(state.next_lap_start(1), Some(state.laps()[1].start));
        assert_eq!(state.next_lap_start(2), None);
    }

    #[test]
    fn test_highlight_only_for_global_best() {
        let config = ReplayConfig::default();
        let mut table = DriverTable::new();
        table.insert(DriverState::new(identity(1)));
        table.insert(DriverState::new(identity(16)));

        let quick = lap_events(1, 2, T0, [30.0, 35.0, 28.0]);
        let slower = lap_events(16, 2, T0, [30.0, 35.5, 28.0]);

        table.apply_event(&quick[1], &config);
        let until = table.get(1).unwrap().timing.highlight_until;
        assert_eq!(until, Some(quick[1].time + 5000));
        assert!(table.get(1).unwrap().highlight_active(quick[1].time + 5000));
        assert!(!table.get(1).unwrap().highlight_active(quick[1].time + 5001));

        table.apply_event(&slower[1], &config);
        assert_eq!(table.get(16).unwrap().timing.best_lap_ms, Some(93_500));
        assert_eq!(table.get(16).unwrap().timing.highlight_until, None);
        assert_eq!(table.global_best_lap(), Some(93_000));
    }

    #[test]
    fn test_eliminated_driver_ignores_events() {
        let config = ReplayConfig::default();
        let mut table = DriverTable::new();
        table.insert(DriverState::new(identity(1)));
        table.get_mut(1).unwrap().eliminate();

        for event in lap_events(1, 2, T0, [30.0, 35.0, 28.0]) {
            table.apply_event(&event, &config);
        }
        let state = table.get(1).unwrap();
        assert_eq!(state.status, TrackStatus::Idle);
        assert_eq!(state.timing, LiveTiming::default());
    }
}
