//! Lap normalization
//!
//! Turns one raw lap record into an immutable [`LapFact`]: sector boundaries,
//! minisector boundaries and the flags that decide whether the lap may ever
//! update best/last lap timing.

use crate::types::{parse_timestamp, seconds_to_ms, RawLap, ReplayError, Result, SimTime};
use std::sync::Arc;

/// Number of timed sectors per lap
pub const SECTOR_COUNT: usize = 3;

/// A minisector status code with the simulated time it closes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Minisector {
    pub value: Option<u16>,
    pub end: SimTime,
}

/// Normalized timing of a single lap
///
/// Created once per fetched lap and never mutated afterwards. Every unknown
/// value is `None`; sector ends form a chain that stops at the first unknown
/// sector.
#[derive(Debug, Clone, PartialEq)]
pub struct LapFact {
    pub lap_number: u32,
    pub start: SimTime,
    pub is_pit_out_lap: bool,
    /// True if the source supplied an explicit lap duration
    pub has_lap_duration: bool,
    pub lap_duration_ms: Option<i64>,
    pub sector_ms: [Option<i64>; SECTOR_COUNT],
    pub sector_end: [Option<SimTime>; SECTOR_COUNT],
    /// Start plus the sum of all three sectors
    pub sector_sum_end: Option<SimTime>,
    /// Start plus lap duration
    pub end: Option<SimTime>,
    pub minisectors: Vec<Minisector>,
    /// Raw minisector codes per sector
    pub segments: [Vec<Option<u16>>; SECTOR_COUNT],
}

impl LapFact {
    /// Normalize a raw lap record
    ///
    /// Fails with [`ReplayError::DataGap`] if the lap has no parseable start.
    pub fn from_raw(raw: &RawLap) -> Result<Self> {
        let date_start = raw.date_start.as_deref().ok_or_else(|| ReplayError::DataGap {
            lap_number: raw.lap_number,
            reason: "missing date_start".to_string(),
        })?;
        let start = parse_timestamp(date_start).map_err(|e| ReplayError::DataGap {
            lap_number: raw.lap_number,
            reason: e.to_string(),
        })?;

        // A zero sector duration is as good as a missing one
        let sector_ms = [raw.duration_sector_1, raw.duration_sector_2, raw.duration_sector_3]
            .map(|secs| secs.map(seconds_to_ms).filter(|ms| *ms != 0));

        let mut sector_end = [None; SECTOR_COUNT];
        let mut previous_end = Some(start);
        for (end, duration) in sector_end.iter_mut().zip(sector_ms.iter()) {
            *end = match (previous_end, duration) {
                (Some(prev), Some(duration)) => Some(prev + duration),
                _ => None,
            };
            previous_end = *end;
        }

        let sector_sum = match sector_ms {
            [Some(s1), Some(s2), Some(s3)] => Some(s1 + s2 + s3),
            _ => None,
        };
        let has_lap_duration = raw.lap_duration.is_some();
        let lap_duration_ms = raw.lap_duration.map(seconds_to_ms).or(sector_sum);

        let segments = [
            raw.segments_sector_1.clone().unwrap_or_default(),
            raw.segments_sector_2.clone().unwrap_or_default(),
            raw.segments_sector_3.clone().unwrap_or_default(),
        ];

        let sector_starts = [Some(start), sector_end[0], sector_end[1]];
        let mut minisectors = Vec::new();
        for ((codes, sector_start), duration) in segments.iter().zip(sector_starts).zip(sector_ms) {
            if let (Some(sector_start), Some(duration)) = (sector_start, duration) {
                push_minisectors(&mut minisectors, codes, sector_start, duration);
            }
        }

        Ok(Self {
            lap_number: raw.lap_number,
            start,
            is_pit_out_lap: raw.is_pit_out_lap.unwrap_or(false),
            has_lap_duration,
            lap_duration_ms,
            sector_ms,
            sector_end,
            sector_sum_end: sector_sum.map(|sum| start + sum),
            end: lap_duration_ms.filter(|ms| *ms != 0).map(|ms| start + ms),
            minisectors,
            segments,
        })
    }

    /// True if this lap may update best/last lap timing
    pub fn is_timed(&self) -> bool {
        !self.is_pit_out_lap && self.has_lap_duration && self.sector_end.iter().all(Option::is_some)
    }

    /// End of the last minisector, if any were derived
    pub fn last_minisector_end(&self) -> Option<SimTime> {
        self.minisectors.last().map(|m| m.end)
    }

    /// Best available end marker for the LAP_END event
    ///
    /// Preference: sector sum, last minisector, sector 3, lap duration.
    pub fn derived_end(&self) -> Option<SimTime> {
        self.sector_sum_end
            .or_else(|| self.last_minisector_end())
            .or(self.sector_end[2])
            .or(self.end)
    }

    /// Point in the lap after which the next prefetch batch may be requested
    pub fn prefetch_marker(&self) -> Option<SimTime> {
        self.sector_end[1]
            .or_else(|| self.last_minisector_end())
            .or(self.end)
    }

    /// End used to decide whether the lap finished before a phase began
    pub fn completion_marker(&self) -> SimTime {
        self.last_minisector_end().or(self.end).unwrap_or(self.start)
    }

    /// All minisector codes of the lap in track order
    pub fn segment_values(&self) -> Vec<Option<u16>> {
        self.segments.iter().flatten().copied().collect()
    }
}

fn push_minisectors(out: &mut Vec<Minisector>, codes: &[Option<u16>], sector_start: SimTime, duration: i64) {
    if codes.is_empty() {
        return;
    }
    let count = codes.len() as i64;
    for (index, value) in codes.iter().enumerate() {
        let index = index as i64 + 1;
        out.push(Minisector {
            value: *value,
            end: sector_start + duration * index / count,
        });
    }
}

/// Normalize a batch of raw laps, dropping laps without a usable start
///
/// The result is sorted by lap start.
pub fn normalize_laps(raw_laps: &[RawLap]) -> Vec<Arc<LapFact>> {
    let mut laps: Vec<Arc<LapFact>> = raw_laps
        .iter()
        .filter_map(|raw| match LapFact::from_raw(raw) {
            Ok(lap) => Some(Arc::new(lap)),
            Err(e) => {
                log::debug!("{}", e);
                None
            }
        })
        .collect();
    laps.sort_by_key(|lap| lap.start);
    laps
}
