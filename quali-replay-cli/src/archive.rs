//! On-disk session archive
//!
//! Serves OpenF1-shaped JSON documents from a directory:
//!
//! ```text
//! <dir>/sessions.json                  every archived session
//! <dir>/<session_key>/drivers.json
//! <dir>/<session_key>/session_result.json
//! <dir>/<session_key>/race_control.json
//! <dir>/<session_key>/laps.json        all laps of all drivers
//! ```
//!
//! A missing per-session document reads as an empty list. Records that do
//! not fit their type are skipped one by one. Each session's `laps.json` is
//! parsed once and kept for later lap requests.

use quali_replay::{
    parse_records, ControlEvent, DriverInfo, RawLap, Result, SessionQuery, SessionResult, SessionSummary,
    TimingSource,
};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub struct JsonArchive {
    root: PathBuf,
    /// Parsed `laps.json` per session key
    laps: Mutex<HashMap<u32, Arc<Vec<RawLap>>>>,
}

impl JsonArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            laps: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn session_file(&self, session_key: u32, name: &str) -> PathBuf {
        self.root.join(session_key.to_string()).join(name)
    }

    fn sessions(&self) -> Result<Vec<SessionSummary>> {
        read_list(&self.root.join("sessions.json"))
    }

    /// Every lap of a session, read from disk on first use
    fn session_laps(&self, session_key: u32) -> Result<Arc<Vec<RawLap>>> {
        let mut cache = self.laps.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(laps) = cache.get(&session_key) {
            return Ok(Arc::clone(laps));
        }
        let laps: Arc<Vec<RawLap>> = Arc::new(read_list(&self.session_file(session_key, "laps.json"))?);
        log::debug!("Cached {} laps for session {}", laps.len(), session_key);
        cache.insert(session_key, Arc::clone(&laps));
        Ok(laps)
    }
}

/// Read a JSON array, treating a missing file as empty
fn read_list<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            log::debug!("{:?} not found, treating as empty", path);
            return Ok(Vec::new());
        }
        Err(e) => return Err(e.into()),
    };
    parse_records(&content)
}

fn same_text(a: Option<&str>, b: &str) -> bool {
    a.map_or(false, |a| a.trim().eq_ignore_ascii_case(b.trim()))
}

impl TimingSource for JsonArchive {
    fn find_sessions(&self, query: &SessionQuery) -> Result<Vec<SessionSummary>> {
        Ok(self
            .sessions()?
            .into_iter()
            .filter(|s| {
                same_text(s.country_name.as_deref(), &query.country)
                    && same_text(s.session_name.as_deref(), &query.session_name)
                    && s.year == Some(query.year)
            })
            .collect())
    }

    fn get_session(&self, session_key: u32) -> Result<Vec<SessionSummary>> {
        Ok(self
            .sessions()?
            .into_iter()
            .filter(|s| s.session_key == session_key)
            .collect())
    }

    fn get_drivers(&self, session_key: u32) -> Result<Vec<DriverInfo>> {
        read_list(&self.session_file(session_key, "drivers.json"))
    }

    fn get_results(&self, session_key: u32) -> Result<Vec<SessionResult>> {
        read_list(&self.session_file(session_key, "session_result.json"))
    }

    fn get_control_events(&self, session_key: u32) -> Result<Vec<ControlEvent>> {
        read_list(&self.session_file(session_key, "race_control.json"))
    }

    fn get_laps(&self, session_key: u32, driver_number: u32, from_lap: u32, to_lap: u32) -> Result<Vec<RawLap>> {
        Ok(self
            .session_laps(session_key)?
            .iter()
            .filter(|lap| lap.driver_number == Some(driver_number))
            .filter(|lap| lap.lap_number >= from_lap && lap.lap_number <= to_lap)
            .cloned()
            .collect())
    }
}
