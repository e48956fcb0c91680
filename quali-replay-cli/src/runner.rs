//! Playback loop
//!
//! The engine stays on the calling thread and is the only owner of replay
//! state. Lap fetches run on a worker thread that owns the timing source;
//! requests go out and completions come back over channels, and every frame
//! drains the completions before ticking.

use crate::report;
use anyhow::{Context, Result};
use quali_replay::{execute_fetch, FetchCompletion, FetchOutcome, FetchRequest, ReplayEngine, TimingSource};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Loop settings taken from the playback config
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub frame: Duration,
    /// Print every N frames; 0 prints nothing while playing
    pub print_every: u32,
    pub rows: usize,
}

/// What a finished run did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub frames: u64,
    pub fetches: u64,
    /// Requests the worker could not take; they were failed back to the engine
    pub dropped: u64,
    pub replays: u64,
}

/// Background thread serving lap requests against a timing source
pub struct FetchWorker {
    requests: Option<Sender<FetchRequest>>,
    completions: Receiver<FetchCompletion>,
    handle: Option<JoinHandle<()>>,
}

impl FetchWorker {
    pub fn spawn<S>(source: S, session_key: u32) -> Result<Self>
    where
        S: TimingSource + 'static,
    {
        let (request_tx, request_rx) = mpsc::channel::<FetchRequest>();
        let (completion_tx, completion_rx) = mpsc::channel();

        let handle = thread::Builder::new()
            .name("lap-fetch".to_string())
            .spawn(move || {
                for request in request_rx {
                    log::trace!(
                        "Fetching driver {} laps {}-{}",
                        request.driver_number,
                        request.from_lap,
                        request.to_lap
                    );
                    let completion = execute_fetch(&source, session_key, request);
                    if completion_tx.send(completion).is_err() {
                        break;
                    }
                }
            })
            .context("Failed to spawn fetch worker")?;

        Ok(Self {
            requests: Some(request_tx),
            completions: completion_rx,
            handle: Some(handle),
        })
    }

    /// Queue a request; false if the worker is gone
    pub fn submit(&self, request: FetchRequest) -> bool {
        self.requests
            .as_ref()
            .map_or(false, |tx| tx.send(request).is_ok())
    }

    /// Completions that arrived since the last call
    pub fn drain(&self) -> Vec<FetchCompletion> {
        let mut completed = Vec::new();
        loop {
            match self.completions.try_recv() {
                Ok(completion) => completed.push(completion),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return completed,
            }
        }
    }

    /// Stop accepting requests and wait for the worker to finish
    pub fn shutdown(&mut self) {
        self.requests.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("Fetch worker panicked");
            }
        }
    }
}

impl Drop for FetchWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Play the session to its end, printing the leaderboard as it goes
pub fn run(engine: &mut ReplayEngine, worker: &FetchWorker, options: RunOptions) -> RunSummary {
    let mut summary = RunSummary::default();
    let started = Instant::now();
    let wall_ms = || started.elapsed().as_secs_f64() * 1000.0;

    engine.play(wall_ms());
    log::info!(
        "Playing {} at x{}",
        engine.session().session_key,
        engine.speed()
    );

    while engine.is_playing() {
        for completion in worker.drain() {
            engine.complete_fetch(completion);
        }

        let tick = engine.tick(wall_ms());
        summary.frames += 1;
        summary.replays += u64::from(tick.replays);

        dispatch(engine, worker, &mut summary);

        if options.print_every > 0 && summary.frames % u64::from(options.print_every) == 0 {
            println!("{}", report::render(engine, options.rows));
        }
        if tick.finished {
            break;
        }
        thread::sleep(options.frame);
    }

    for completion in worker.drain() {
        engine.complete_fetch(completion);
    }
    log::info!(
        "Playback finished: {} frames, {} fetches, {} replays",
        summary.frames,
        summary.fetches,
        summary.replays
    );
    summary
}

/// Hand new requests to the worker, failing back any it cannot take
fn dispatch(engine: &mut ReplayEngine, worker: &FetchWorker, summary: &mut RunSummary) {
    for request in engine.take_fetch_requests() {
        if worker.submit(request) {
            summary.fetches += 1;
            continue;
        }
        log::warn!("Fetch worker stopped, dropping request for driver {}", request.driver_number);
        summary.dropped += 1;
        engine.complete_fetch(FetchCompletion {
            request,
            outcome: FetchOutcome::Failed("fetch worker stopped".to_string()),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::JsonArchive;
    use quali_replay::{load_session, ReplayConfig, SessionQuery};
    use std::fs;
    use tempfile::TempDir;

    fn write_archive(dir: &TempDir) {
        fs::write(
            dir.path().join("sessions.json"),
            r#"[{"session_key": 1, "session_name": "Sprint Qualifying", "country_name": "China", "year": 2024,
                 "date_start": "2024-04-19T11:30:00+00:00", "date_end": "2024-04-19T11:31:00+00:00"}]"#,
        )
        .unwrap();
        let session = dir.path().join("1");
        fs::create_dir(&session).unwrap();
        fs::write(
            session.join("drivers.json"),
            r#"[{"driver_number": 4, "name_acronym": "NOR"}, {"driver_number": 44, "name_acronym": "HAM"}]"#,
        )
        .unwrap();
        fs::write(
            session.join("session_result.json"),
            r#"[{"driver_number": 4, "number_of_laps": 4, "duration": [30.0]},
                {"driver_number": 44, "number_of_laps": 1, "duration": [31.0]}]"#,
        )
        .unwrap();
        fs::write(
            session.join("laps.json"),
            r#"[{"driver_number": 4, "lap_number": 1, "date_start": "2024-04-19T11:30:02+00:00",
                 "duration_sector_1": 10.0, "duration_sector_2": 10.0, "duration_sector_3": 10.0, "lap_duration": 30.0},
                {"driver_number": 4, "lap_number": 4, "date_start": "2024-04-19T11:30:40+00:00",
                 "duration_sector_1": 3.0, "duration_sector_2": 3.0, "duration_sector_3": 3.0, "lap_duration": 9.0},
                {"driver_number": 44, "lap_number": 1, "date_start": "2024-04-19T11:30:05+00:00",
                 "duration_sector_1": 10.0, "duration_sector_2": 11.0, "duration_sector_3": 10.0, "lap_duration": 31.0}]"#,
        )
        .unwrap();
    }

    fn load(dir: &TempDir) -> ReplayEngine {
        let query = SessionQuery {
            country: "China".to_string(),
            session_name: "Sprint Qualifying".to_string(),
            year: 2024,
        };
        let config = ReplayConfig::default().with_speed(600.0);
        load_session(&JsonArchive::new(dir.path()), &query, config, |_| {}).unwrap()
    }

    fn options() -> RunOptions {
        RunOptions {
            frame: Duration::from_millis(1),
            print_every: 0,
            rows: 0,
        }
    }

    #[test]
    fn test_run_plays_session_to_the_end() {
        let dir = TempDir::new().unwrap();
        write_archive(&dir);
        let mut engine = load(&dir);
        let mut worker = FetchWorker::spawn(JsonArchive::new(dir.path()), 1).unwrap();

        let summary = run(&mut engine, &worker, options());
        worker.shutdown();

        assert!(summary.frames > 0);
        assert!(summary.fetches >= 1);
        assert_eq!(summary.dropped, 0);
        assert!(!engine.is_playing());
        assert_eq!(engine.progress(), 100.0);

        let standings = engine.standings();
        assert_eq!(standings.len(), 2);
        assert!(standings.iter().all(|s| s.best_lap_ms.is_some()));
    }

    #[test]
    fn test_requests_to_a_stopped_worker_fail_back_to_the_engine() {
        let dir = TempDir::new().unwrap();
        write_archive(&dir);
        let mut engine = load(&dir);
        let mut worker = FetchWorker::spawn(JsonArchive::new(dir.path()), 1).unwrap();
        worker.shutdown();

        let summary = run(&mut engine, &worker, options());

        assert_eq!(summary.fetches, 0);
        assert!(summary.dropped >= 1);
        assert!(!engine.has_pending_fetches());
        let driver = engine.drivers().get(4).unwrap();
        assert!(!driver.prefetch.loading);
        assert_eq!(driver.prefetch.next_batch_start, Some(4));
        assert_eq!(driver.laps().len(), 1);
    }
}
