//! Session bootstrap
//!
//! [`TimingSource`] is the boundary to whatever serves timing data (an HTTP
//! client, an on-disk archive, an in-memory fixture). [`load_session`] runs
//! the bootstrap sequence against it and returns a ready, paused
//! [`ReplayEngine`].

use crate::config::ReplayConfig;
use crate::driver::DriverIdentity;
use crate::engine::ReplayEngine;
use crate::prefetch::{FetchCompletion, FetchOutcome, FetchRequest, PrefetchCursor};
use crate::types::{
    parse_timestamp, ControlEvent, DriverInfo, RawLap, ReplayError, Result, SessionQuery, SessionResult,
    SessionSummary, SimTime,
};
use std::collections::HashMap;
use std::fmt;

/// Source of timing data for a session
///
/// Implementations do their own retrying; an `Err` from `get_laps` is treated
/// as "no data yet".
pub trait TimingSource: Send {
    /// Sessions matching a country / session name / year query
    fn find_sessions(&self, query: &SessionQuery) -> Result<Vec<SessionSummary>>;

    fn get_session(&self, session_key: u32) -> Result<Vec<SessionSummary>>;

    fn get_drivers(&self, session_key: u32) -> Result<Vec<DriverInfo>>;

    fn get_results(&self, session_key: u32) -> Result<Vec<SessionResult>>;

    fn get_control_events(&self, session_key: u32) -> Result<Vec<ControlEvent>>;

    /// Laps `from_lap..=to_lap` of one driver
    fn get_laps(&self, session_key: u32, driver_number: u32, from_lap: u32, to_lap: u32) -> Result<Vec<RawLap>>;
}

impl<T: TimingSource + ?Sized> TimingSource for Box<T> {
    fn find_sessions(&self, query: &SessionQuery) -> Result<Vec<SessionSummary>> {
        (**self).find_sessions(query)
    }

    fn get_session(&self, session_key: u32) -> Result<Vec<SessionSummary>> {
        (**self).get_session(session_key)
    }

    fn get_drivers(&self, session_key: u32) -> Result<Vec<DriverInfo>> {
        (**self).get_drivers(session_key)
    }

    fn get_results(&self, session_key: u32) -> Result<Vec<SessionResult>> {
        (**self).get_results(session_key)
    }

    fn get_control_events(&self, session_key: u32) -> Result<Vec<ControlEvent>> {
        (**self).get_control_events(session_key)
    }

    fn get_laps(&self, session_key: u32, driver_number: u32, from_lap: u32, to_lap: u32) -> Result<Vec<RawLap>> {
        (**self).get_laps(session_key, driver_number, from_lap, to_lap)
    }
}

/// Bootstrap milestones, reported while a session loads
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadProgress {
    FindingSession,
    LoadingDrivers,
    LoadingSession,
    LoadingResults,
    /// Initial laps for `done` of `total` drivers
    LoadingLaps { done: usize, total: usize },
    LoadingControlEvents,
    Ready,
}

impl fmt::Display for LoadProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadProgress::FindingSession => write!(f, "Loading session..."),
            LoadProgress::LoadingDrivers => write!(f, "Loading drivers..."),
            LoadProgress::LoadingSession => write!(f, "Loading session data..."),
            LoadProgress::LoadingResults => write!(f, "Loading session results..."),
            LoadProgress::LoadingLaps { done, total } => {
                let percent = (*done * 100) / (*total).max(1);
                write!(f, "Loading laps... {}%", percent)
            }
            LoadProgress::LoadingControlEvents => write!(f, "Loading events..."),
            LoadProgress::Ready => write!(f, "Ready."),
        }
    }
}

/// One driver as delivered by the session bootstrap
#[derive(Debug, Clone)]
pub struct DriverSeed {
    pub identity: DriverIdentity,
    pub cursor: PrefetchCursor,
    pub laps: Vec<RawLap>,
}

/// Everything fetched while bootstrapping a session
#[derive(Debug, Clone)]
pub struct SessionData {
    pub summary: SessionSummary,
    pub sim_start: SimTime,
    pub sim_end: SimTime,
    pub drivers: Vec<DriverSeed>,
    pub results: Vec<SessionResult>,
    pub control_events: Vec<ControlEvent>,
    /// Initial lap requests finished and issued
    pub lap_requests: (usize, usize),
}

/// Fetch everything needed to start replaying a session
///
/// Fails with [`ReplayError::SessionNotFound`] or [`ReplayError::NoDrivers`]
/// when the source has nothing to replay. A failed initial lap request only
/// leaves that driver empty; the prefetch sweep picks it up later.
pub fn fetch_session<S, F>(
    source: &S,
    query: &SessionQuery,
    config: &ReplayConfig,
    mut on_progress: F,
) -> Result<SessionData>
where
    S: TimingSource + ?Sized,
    F: FnMut(&LoadProgress),
{
    on_progress(&LoadProgress::FindingSession);
    let found = source
        .find_sessions(query)?
        .into_iter()
        .next()
        .ok_or(ReplayError::SessionNotFound)?;
    let session_key = found.session_key;
    log::info!(
        "Found session {} ({} {} {})",
        session_key,
        query.country,
        query.session_name,
        query.year
    );

    on_progress(&LoadProgress::LoadingDrivers);
    let mut driver_infos = source.get_drivers(session_key)?;
    if driver_infos.is_empty() {
        return Err(ReplayError::NoDrivers(session_key));
    }
    driver_infos.sort_by_key(|info| info.driver_number);
    driver_infos.dedup_by_key(|info| info.driver_number);

    on_progress(&LoadProgress::LoadingSession);
    let summary = source
        .get_session(session_key)?
        .into_iter()
        .next()
        .unwrap_or(found);
    let sim_start = parse_timestamp(&summary.date_start)?;
    let sim_end = parse_timestamp(&summary.date_end)?;

    on_progress(&LoadProgress::LoadingResults);
    let results = source.get_results(session_key)?;
    let max_laps: HashMap<u32, u32> = results
        .iter()
        .filter_map(|result| result.number_of_laps.map(|laps| (result.driver_number, laps)))
        .collect();

    let total = driver_infos.len();
    on_progress(&LoadProgress::LoadingLaps { done: 0, total });
    let mut drivers = Vec::with_capacity(total);
    for (index, info) in driver_infos.iter().enumerate() {
        let number = info.driver_number;
        let max = max_laps.get(&number).copied();
        let initial_end = max.map_or(config.initial_laps, |max| max.min(config.initial_laps));

        let (laps, cursor) = if initial_end == 0 {
            (Vec::new(), PrefetchCursor::after_initial(0, max))
        } else {
            match source.get_laps(session_key, number, 1, initial_end) {
                Ok(laps) => (laps, PrefetchCursor::after_initial(initial_end, max)),
                Err(e) => {
                    log::debug!("Initial laps for driver {} failed: {}", number, e);
                    (Vec::new(), PrefetchCursor::after_initial(0, max))
                }
            }
        };

        drivers.push(DriverSeed {
            identity: DriverIdentity::from(info),
            cursor,
            laps,
        });
        on_progress(&LoadProgress::LoadingLaps { done: index + 1, total });
    }

    on_progress(&LoadProgress::LoadingControlEvents);
    let control_events = source.get_control_events(session_key)?;

    Ok(SessionData {
        summary,
        sim_start,
        sim_end,
        drivers,
        results,
        control_events,
        lap_requests: (total, total),
    })
}

/// Load a session and build a paused engine positioned at its start
pub fn load_session<S, F>(
    source: &S,
    query: &SessionQuery,
    config: ReplayConfig,
    mut on_progress: F,
) -> Result<ReplayEngine>
where
    S: TimingSource + ?Sized,
    F: FnMut(&LoadProgress),
{
    let data = fetch_session(source, query, &config, &mut on_progress)?;
    let mut engine = ReplayEngine::from_session(data, config);
    on_progress(&LoadProgress::Ready);
    engine.set_status(LoadProgress::Ready.to_string());
    Ok(engine)
}

/// Perform one lap fetch against the source
pub fn execute_fetch<S>(source: &S, session_key: u32, request: FetchRequest) -> FetchCompletion
where
    S: TimingSource + ?Sized,
{
    let outcome = match source.get_laps(session_key, request.driver_number, request.from_lap, request.to_lap) {
        Ok(laps) => FetchOutcome::Loaded(laps),
        Err(e) => FetchOutcome::Failed(e.to_string()),
    };
    FetchCompletion { request, outcome }
}
