//! Replay engine
//!
//! [`ReplayEngine`] is the single owner of all mutable replay state: the
//! driver table, the event queue, the phase schedule and the playback clock.
//! It is driven by calling [`ReplayEngine::tick`] with the current wall time,
//! and it talks to the timing source only through [`FetchRequest`]s it hands
//! out and [`FetchCompletion`]s posted back to it. Nothing in here blocks or
//! fails mid-tick.

use crate::clock::PlaybackClock;
use crate::config::ReplayConfig;
use crate::driver::{DriverState, DriverTable, TrackStatus};
use crate::events::EventQueue;
use crate::lap::normalize_laps;
use crate::phase::{Phase, PhaseResults, PhaseSchedule, NO_PHASE_LABEL};
use crate::prefetch::{loaded_laps, FetchCompletion, FetchOutcome, FetchRequest, PhaseSweep};
use crate::session::SessionData;
use crate::standings::{compute_standings, rank_order, PositionTracker, Standing};
use crate::types::{SessionSummary, SimTime};

/// What a single tick did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Clock increments processed
    pub steps: u32,
    /// Full reset-and-replay passes triggered by late events
    pub replays: u32,
    /// Playback reached the end of the session
    pub finished: bool,
}

/// The replay engine - owns and advances all per-session state
pub struct ReplayEngine {
    config: ReplayConfig,
    summary: SessionSummary,
    drivers: DriverTable,
    queue: EventQueue,
    phases: PhaseSchedule,
    results: PhaseResults,
    clock: PlaybackClock,
    current_phase: Option<Phase>,
    /// Phase ranges already passed, in schedule order
    entered_ranges: usize,
    /// Tie-break order captured at the last phase entry
    fallback_order: Vec<u32>,
    initial_order: Vec<u32>,
    sweep: PhaseSweep,
    outbox: Vec<FetchRequest>,
    positions: PositionTracker,
    status: String,
    lap_requests: (usize, usize),
}

impl ReplayEngine {
    /// Build an engine from bootstrapped session data
    ///
    /// The clock starts paused at the session start.
    pub fn from_session(data: SessionData, config: ReplayConfig) -> Self {
        let mut drivers = DriverTable::new();
        let mut queue = EventQueue::new();

        for seed in data.drivers {
            let mut state = DriverState::new(seed.identity);
            state.prefetch = seed.cursor;
            state.merge_laps(normalize_laps(&seed.laps));
            for lap in state.laps() {
                queue.enqueue_lap(state.number(), lap, state.next_lap_start(lap.lap_number));
            }
            drivers.insert(state);
        }

        let phases = PhaseSchedule::from_control_events(&data.control_events, data.sim_start, data.sim_end);
        let initial_order = drivers.numbers();
        log::info!(
            "Session {} ready: {} drivers, {} events, {} phases",
            data.summary.session_key,
            drivers.len(),
            queue.len(),
            phases.ranges().len()
        );

        Self {
            clock: PlaybackClock::new(data.sim_start, data.sim_end, config.speed),
            config,
            summary: data.summary,
            drivers,
            queue,
            phases,
            results: PhaseResults::from_results(&data.results),
            current_phase: None,
            entered_ranges: 0,
            fallback_order: initial_order.clone(),
            initial_order,
            sweep: PhaseSweep::default(),
            outbox: Vec::new(),
            positions: PositionTracker::new(),
            status: "Ready.".to_string(),
            lap_requests: data.lap_requests,
        }
    }

    /// Advance simulated time to where the wall clock says it should be
    ///
    /// `wall_now` is monotonic wall time in milliseconds.
    pub fn tick(&mut self, wall_now: f64) -> TickReport {
        let mut report = TickReport::default();
        if !self.clock.is_playing() {
            return report;
        }

        let target = self.clock.target(wall_now);
        let gap = target - self.clock.cursor();
        if gap > 0 {
            let step = self.config.step_for_gap(gap);
            while self.clock.cursor() < target && report.steps < self.config.max_iterations {
                if self.queue.replay_required() {
                    self.replay_to(self.clock.cursor());
                    report.replays += 1;
                }
                let now = self.clock.advance(step, target);
                self.process_at(now);
                report.steps += 1;
            }
        }

        report.finished = self.clock.finish_if_done(self.clock.cursor());
        let now = self.clock.cursor();
        let standings = self.rank(now);
        self.positions.observe(&standings, now, self.config.position_move_ms);
        report
    }

    /// Rebuild all derived state from the session start up to `now`
    fn replay_to(&mut self, now: SimTime) {
        log::debug!("Late events arrived, replaying from session start");
        self.reset_runtime();
        self.apply_until(now);
    }

    /// Apply events and phase entries up to and including `now`
    ///
    /// Events strictly before a phase start are applied before that phase is
    /// entered, whether the boundary is crossed by stepping or by a replay.
    fn apply_until(&mut self, now: SimTime) {
        while let Some(range) = self.phases.ranges().get(self.entered_ranges).copied() {
            if range.start > now {
                break;
            }
            self.entered_ranges += 1;
            if self.phases.range_at(range.start) != Some(&range) {
                // Empty range, never current at any instant
                continue;
            }
            for event in self.queue.drain_until(range.start - 1) {
                self.drivers.apply_event(&event, &self.config);
            }
            if self.current_phase != Some(range.phase) {
                self.enter_phase(range.phase, range.start);
            }
        }

        for event in self.queue.drain_until(now) {
            self.drivers.apply_event(&event, &self.config);
        }
    }

    /// Apply everything that happens at simulated time `now`
    fn process_at(&mut self, now: SimTime) {
        self.apply_until(now);

        for driver in self.drivers.iter_mut() {
            if driver.eliminated {
                driver.status = TrackStatus::Idle;
                driver.active_lap = None;
                continue;
            }
            let active = driver.active_lap.as_deref();
            let last_completed = driver.timing.last_completed_lap_number;
            if !driver.prefetch.should_fetch(active, last_completed, now, &self.config) {
                continue;
            }
            if let Some((from_lap, to_lap)) = driver.prefetch.next_batch(self.config.batch_size) {
                driver.prefetch.loading = true;
                self.outbox.push(FetchRequest {
                    driver_number: driver.number(),
                    from_lap,
                    to_lap,
                    sweep: false,
                });
            }
        }
    }

    /// Phase entry: snapshot order, decide eliminations, reset live timing
    fn enter_phase(&mut self, phase: Phase, segment_start: SimTime) {
        log::info!("Entering {} at {}", phase, crate::types::format_clock(segment_start));
        self.fallback_order = rank_order(self.drivers.iter(), &self.fallback_order);

        for driver in self.drivers.iter_mut() {
            if self.results.is_eliminated(driver.number(), phase) {
                log::debug!("Driver {} eliminated before {}", driver.number(), phase);
                driver.eliminate();
            } else {
                driver.enter_phase(segment_start);
            }
        }

        self.current_phase = Some(phase);
        if self.sweep.begin(phase.0, self.drivers.numbers()) {
            self.pump_sweep();
        }
    }

    /// Issue the next sweep request, if none is outstanding
    fn pump_sweep(&mut self) {
        while let Some(number) = self.sweep.next_driver() {
            let Some(driver) = self.drivers.get_mut(number) else {
                continue;
            };
            if driver.prefetch.loading {
                continue;
            }
            if let Some((from_lap, to_lap)) = driver.prefetch.next_batch(self.config.batch_size) {
                driver.prefetch.loading = true;
                self.sweep.mark_in_flight(number);
                self.outbox.push(FetchRequest {
                    driver_number: number,
                    from_lap,
                    to_lap,
                    sweep: true,
                });
                break;
            }
        }
    }

    /// Merge the result of a fetch into the session
    ///
    /// Failures are dropped; the same trigger will fire again on a later tick.
    pub fn complete_fetch(&mut self, completion: FetchCompletion) {
        let request = completion.request;
        if request.sweep {
            self.sweep.complete(request.driver_number);
        }

        if let Some(driver) = self.drivers.get_mut(request.driver_number) {
            driver.prefetch.loading = false;
            match loaded_laps(&completion.outcome) {
                Some(laps) => {
                    let added = driver.merge_laps(laps);
                    driver.prefetch.advance_past(request.to_lap);
                    for lap in driver.laps() {
                        self.queue
                            .enqueue_lap(driver.number(), lap, driver.next_lap_start(lap.lap_number));
                    }
                    log::debug!(
                        "Driver {} laps {}-{}: {} new",
                        request.driver_number,
                        request.from_lap,
                        request.to_lap,
                        added.len()
                    );
                }
                None => {
                    if let FetchOutcome::Failed(reason) = &completion.outcome {
                        log::debug!(
                            "Fetch for driver {} laps {}-{} failed: {}",
                            request.driver_number,
                            request.from_lap,
                            request.to_lap,
                            reason
                        );
                    }
                }
            }
        }

        self.pump_sweep();
    }

    /// Fetch requests produced since the last call
    pub fn take_fetch_requests(&mut self) -> Vec<FetchRequest> {
        std::mem::take(&mut self.outbox)
    }

    /// Reinitialize every driver's live state and rewind the event queue
    fn reset_runtime(&mut self) {
        for driver in self.drivers.iter_mut() {
            driver.reset_runtime();
        }
        self.current_phase = None;
        self.entered_ranges = 0;
        self.fallback_order = self.initial_order.clone();
        self.queue.rewind();
    }

    /// Start or resume playback from the current simulated time
    pub fn play(&mut self, wall_now: f64) {
        self.clock.play(wall_now);
    }

    pub fn pause(&mut self) {
        self.clock.pause();
    }

    /// Change playback speed without jumping simulated time
    pub fn set_speed(&mut self, speed: f64, wall_now: f64) {
        self.clock.set_speed(speed, wall_now);
    }

    /// Return to the session start without refetching anything
    pub fn reset(&mut self) {
        self.clock.reset();
        self.reset_runtime();
        self.positions.clear();
    }

    /// Leaderboard at the current simulated time
    pub fn standings(&self) -> Vec<Standing> {
        let now = self.clock.cursor();
        let mut standings = self.rank(now);
        for standing in &mut standings {
            standing.movement = self.positions.movement(standing.driver.number, now);
        }
        standings
    }

    fn rank(&self, now: SimTime) -> Vec<Standing> {
        compute_standings(self.drivers.iter(), &self.fallback_order, now)
    }

    pub fn sim_time(&self) -> SimTime {
        self.clock.cursor()
    }

    pub fn current_phase(&self) -> Option<Phase> {
        self.current_phase
    }

    /// Label of the current phase, `—` outside qualifying phases
    pub fn phase_label(&self) -> String {
        self.current_phase
            .map_or_else(|| NO_PHASE_LABEL.to_string(), |phase| phase.to_string())
    }

    pub fn is_playing(&self) -> bool {
        self.clock.is_playing()
    }

    pub fn speed(&self) -> f64 {
        self.clock.speed()
    }

    /// Share of the session already replayed, in percent
    pub fn progress(&self) -> f64 {
        self.clock.progress()
    }

    /// Initial lap requests finished and issued while loading
    pub fn lap_progress(&self) -> (usize, usize) {
        self.lap_requests
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
    }

    pub fn session(&self) -> &SessionSummary {
        &self.summary
    }

    pub fn clock(&self) -> &PlaybackClock {
        &self.clock
    }

    pub fn drivers(&self) -> &DriverTable {
        &self.drivers
    }

    pub fn queue(&self) -> &EventQueue {
        &self.queue
    }

    pub fn phases(&self) -> &PhaseSchedule {
        &self.phases
    }

    pub fn config(&self) -> &ReplayConfig {
        &self.config
    }

    /// True while any lap request is outstanding
    pub fn has_pending_fetches(&self) -> bool {
        !self.outbox.is_empty() || self.drivers.iter().any(|d| d.prefetch.loading)
    }
}
