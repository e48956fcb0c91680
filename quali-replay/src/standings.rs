//! Standings ranking
//!
//! Ranking is a pure pass over driver snapshots: it holds no state and can be
//! recomputed at any simulated time. [`PositionTracker`] is the only piece
//! that remembers anything between passes, and only for display.

use crate::driver::{DriverIdentity, DriverState, MinisectorCell, TrackStatus};
use crate::lap::SECTOR_COUNT;
use crate::types::SimTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One row of the leaderboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standing {
    /// 1-based rank
    pub position: usize,
    pub driver: DriverIdentity,
    pub best_lap_ms: Option<i64>,
    pub best_lap_number: Option<u32>,
    pub last_lap_ms: Option<i64>,
    pub last_lap_number: Option<u32>,
    pub gap_to_leader_ms: Option<i64>,
    pub interval_to_ahead_ms: Option<i64>,
    pub best_sector_ms: [Option<i64>; SECTOR_COUNT],
    pub last_sector_ms: [Option<i64>; SECTOR_COUNT],
    /// Sector times as they should appear at the ranking time
    pub display_sector_ms: [Option<i64>; SECTOR_COUNT],
    pub is_global_best_sector: [bool; SECTOR_COUNT],
    /// Displayed sector is quicker than the session's best so far
    pub beats_global_best_sector: [bool; SECTOR_COUNT],
    pub minisectors: Vec<MinisectorCell>,
    pub highlight_best_lap: bool,
    pub status: TrackStatus,
    pub eliminated: bool,
    /// Recent position change, filled in by the engine's tracker
    pub movement: Option<Movement>,
}

/// Fastest known time per sector across all drivers
pub fn global_best_sectors<'a>(drivers: impl IntoIterator<Item = &'a DriverState>) -> [Option<i64>; SECTOR_COUNT] {
    let mut best = [None; SECTOR_COUNT];
    for driver in drivers {
        for (slot, value) in best.iter_mut().zip(driver.timing.best_sector_ms) {
            if let Some(value) = value {
                *slot = Some(slot.map_or(value, |current: i64| current.min(value)));
            }
        }
    }
    best
}

/// Driver numbers in rank order
///
/// Active drivers by best lap, then active drivers without a time, then
/// eliminated drivers; the last two groups follow `fallback_order`.
pub fn rank_order<'a>(drivers: impl IntoIterator<Item = &'a DriverState>, fallback_order: &[u32]) -> Vec<u32> {
    let fallback: HashMap<u32, usize> = fallback_order
        .iter()
        .enumerate()
        .map(|(index, number)| (*number, index))
        .collect();
    let fallback_index = |number: u32| fallback.get(&number).copied().unwrap_or(0);

    let (mut active, mut eliminated): (Vec<&DriverState>, Vec<&DriverState>) =
        drivers.into_iter().partition(|d| !d.eliminated);

    active.sort_by(|a, b| match (a.timing.best_lap_ms, b.timing.best_lap_ms) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => fallback_index(a.number()).cmp(&fallback_index(b.number())),
    });
    eliminated.sort_by_key(|d| fallback_index(d.number()));

    active.iter().chain(eliminated.iter()).map(|d| d.number()).collect()
}

/// Build the leaderboard at simulated time `now`
pub fn compute_standings<'a, I>(drivers: I, fallback_order: &[u32], now: SimTime) -> Vec<Standing>
where
    I: IntoIterator<Item = &'a DriverState>,
    I::IntoIter: Clone,
{
    let drivers = drivers.into_iter();
    let global_best = global_best_sectors(drivers.clone());
    let by_number: HashMap<u32, &DriverState> = drivers.clone().map(|d| (d.number(), d)).collect();
    let order = rank_order(drivers, fallback_order);

    let mut leader_best: Option<i64> = None;
    let mut previous_best: Option<i64> = None;
    let mut standings = Vec::with_capacity(order.len());

    for (index, number) in order.iter().enumerate() {
        let Some(driver) = by_number.get(number) else {
            continue;
        };
        let best = driver.timing.best_lap_ms;
        if leader_best.is_none() {
            leader_best = best;
        }

        let display = driver.display_sectors(now);
        let mut is_global_best = [false; SECTOR_COUNT];
        let mut beats_global_best = [false; SECTOR_COUNT];
        for i in 0..SECTOR_COUNT {
            is_global_best[i] = matches!(
                (driver.timing.best_sector_ms[i], global_best[i]),
                (Some(own), Some(global)) if own == global
            );
            beats_global_best[i] = matches!(
                (display[i], global_best[i]),
                (Some(shown), Some(global)) if shown < global
            );
        }

        standings.push(Standing {
            position: index + 1,
            driver: driver.identity.clone(),
            best_lap_ms: best,
            best_lap_number: driver.timing.best_lap_number,
            last_lap_ms: driver.timing.last_lap_ms,
            last_lap_number: driver.timing.last_completed_lap_number,
            gap_to_leader_ms: leader_best.zip(best).map(|(leader, own)| own - leader),
            interval_to_ahead_ms: previous_best.zip(best).map(|(ahead, own)| own - ahead),
            best_sector_ms: driver.timing.best_sector_ms,
            last_sector_ms: driver.timing.last_sector_ms,
            display_sector_ms: display,
            is_global_best_sector: is_global_best,
            beats_global_best_sector: beats_global_best,
            minisectors: driver.display_minisectors(now),
            highlight_best_lap: driver.highlight_active(now),
            status: driver.status,
            eliminated: driver.eliminated,
            movement: None,
        });
        previous_best = best;
    }

    standings
}

/// Direction of a position change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Movement {
    Up,
    Down,
}

/// A recent position change still worth showing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionMove {
    pub movement: Movement,
    pub until: SimTime,
}

/// Remembers positions between ranking passes to flag live position changes
#[derive(Debug, Clone, Default)]
pub struct PositionTracker {
    positions: HashMap<u32, usize>,
    moves: HashMap<u32, PositionMove>,
}

impl PositionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare `standings` against the previous pass
    pub fn observe(&mut self, standings: &[Standing], now: SimTime, window_ms: i64) {
        self.moves.retain(|_, m| m.until > now);
        for standing in standings {
            let number = standing.driver.number;
            if let Some(previous) = self.positions.insert(number, standing.position) {
                if previous != standing.position {
                    let movement = if standing.position < previous {
                        Movement::Up
                    } else {
                        Movement::Down
                    };
                    self.moves.insert(
                        number,
                        PositionMove {
                            movement,
                            until: now + window_ms,
                        },
                    );
                }
            }
        }
    }

    /// Active move indicator for a driver at `now`
    pub fn movement(&self, driver_number: u32, now: SimTime) -> Option<Movement> {
        self.moves
            .get(&driver_number)
            .filter(|m| now <= m.until)
            .map(|m| m.movement)
    }

    pub fn clear(&mut self) {
        self.positions.clear();
        self.moves.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DriverInfo;

    fn driver(number: u32, best: Option<i64>, sectors: [Option<i64>; 3]) -> DriverState {
        let mut state = DriverState::new(DriverIdentity::from(&DriverInfo {
            driver_number: number,
            full_name: None,
            name_acronym: None,
            team_name: None,
            team_colour: None,
        }));
        state.timing.best_lap_ms = best;
        state.timing.best_sector_ms = sectors;
        state
    }

    #[test]
    fn test_rank_by_best_lap_then_fallback() {
        let drivers = vec![
            driver(1, None, [None; 3]),
            driver(4, Some(78_500), [None; 3]),
            driver(16, Some(78_100), [None; 3]),
            driver(44, None, [None; 3]),
        ];
        let order = rank_order(&drivers, &[44, 1, 4, 16]);
        assert_eq!(order, vec![16, 4, 44, 1]);
    }

    #[test]
    fn test_eliminated_after_active() {
        let mut out = driver(2, Some(70_000), [None; 3]);
        out.eliminate();
        let drivers = vec![out, driver(3, None, [None; 3]), driver(5, Some(80_000), [None; 3])];

        let order = rank_order(&drivers, &[2, 3, 5]);
        assert_eq!(order, vec![5, 3, 2]);
    }

    #[test]
    fn test_gaps_and_intervals() {
        let drivers = vec![
            driver(1, Some(78_000), [None; 3]),
            driver(2, Some(78_300), [None; 3]),
            driver(3, None, [None; 3]),
            driver(4, Some(79_000), [None; 3]),
        ];
        let standings = compute_standings(&drivers, &[1, 2, 3, 4], 0);

        let numbers: Vec<u32> = standings.iter().map(|s| s.driver.number).collect();
        assert_eq!(numbers, vec![1, 2, 4, 3]);
        assert_eq!(standings[0].gap_to_leader_ms, Some(0));
        assert_eq!(standings[0].interval_to_ahead_ms, None);
        assert_eq!(standings[1].gap_to_leader_ms, Some(300));
        assert_eq!(standings[1].interval_to_ahead_ms, Some(300));
        assert_eq!(standings[2].gap_to_leader_ms, Some(1_000));
        assert_eq!(standings[2].interval_to_ahead_ms, Some(700));
        assert_eq!(standings[3].gap_to_leader_ms, None);
        assert_eq!(standings[3].interval_to_ahead_ms, None);
        assert_eq!(standings[3].position, 4);
    }

    #[test]
    fn test_global_best_sector_flags() {
        let drivers = vec![
            driver(1, Some(93_000), [Some(30_000), Some(35_500), Some(28_000)]),
            driver(2, Some(93_200), [Some(30_200), Some(35_000), None]),
        ];
        assert_eq!(global_best_sectors(&drivers), [Some(30_000), Some(35_000), Some(28_000)]);

        let standings = compute_standings(&drivers, &[1, 2], 0);
        assert_eq!(standings[0].is_global_best_sector, [true, false, true]);
        assert_eq!(standings[1].is_global_best_sector, [false, true, false]);
    }

    #[test]
    fn test_position_tracker_flags_moves() {
        let mut drivers = vec![driver(1, Some(78_000), [None; 3]), driver(2, Some(78_500), [None; 3])];
        let mut tracker = PositionTracker::new();

        tracker.observe(&compute_standings(&drivers, &[1, 2], 0), 0, 5000);
        assert_eq!(tracker.movement(2, 0), None);

        drivers[1].timing.best_lap_ms = Some(77_900);
        tracker.observe(&compute_standings(&drivers, &[1, 2], 1_000), 1_000, 5000);
        assert_eq!(tracker.movement(2, 1_000), Some(Movement::Up));
        assert_eq!(tracker.movement(1, 6_000), Some(Movement::Down));
        assert_eq!(tracker.movement(1, 6_001), None);

        tracker.observe(&compute_standings(&drivers, &[1, 2], 7_000), 7_000, 5000);
        assert_eq!(tracker.movement(1, 7_000), None);
    }
}
