//! Lap events and the time-ordered event queue
//!
//! Each normalized lap becomes a `LapStart` and (when an end can be derived)
//! a `LapEnd` event. The queue keeps every known event sorted by timestamp
//! and hands them out through a monotonic cursor.
//!
//! Inserting an event at or before the already-processed watermark does not
//! patch state in place: the queue flags that a full replay from the session
//! start is required, and the consumer must reset and rewind before stepping
//! forward again.

use crate::lap::LapFact;
use crate::types::SimTime;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Kind of lap transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    LapStart,
    LapEnd,
}

impl EventKind {
    /// Rank among events sharing a timestamp; a lap ends before the next one starts
    fn rank(self) -> u8 {
        match self {
            EventKind::LapEnd => 0,
            EventKind::LapStart => 1,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::LapStart => write!(f, "LAP_START"),
            EventKind::LapEnd => write!(f, "LAP_END"),
        }
    }
}

/// Identity of an event; a second event with the same key is dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventKey {
    pub kind: EventKind,
    pub driver_number: u32,
    pub lap_number: u32,
}

/// A time-stamped lap transition for one driver
#[derive(Debug, Clone, PartialEq)]
pub struct TimingEvent {
    pub kind: EventKind,
    pub driver_number: u32,
    pub lap_number: u32,
    pub time: SimTime,
    pub lap: Arc<LapFact>,
}

impl TimingEvent {
    /// Get the identity key of this event
    pub fn key(&self) -> EventKey {
        EventKey {
            kind: self.kind,
            driver_number: self.driver_number,
            lap_number: self.lap_number,
        }
    }

    /// Processing order: time, then kind; insertion order breaks the rest
    fn order(&self) -> (SimTime, u8) {
        (self.time, self.kind.rank())
    }
}

/// Build the events for one lap
///
/// `next_lap_start` is the start of the following lap, used as the end marker
/// of last resort.
pub fn build_lap_events(
    driver_number: u32,
    lap: &Arc<LapFact>,
    next_lap_start: Option<SimTime>,
) -> Vec<TimingEvent> {
    let mut events = vec![TimingEvent {
        kind: EventKind::LapStart,
        driver_number,
        lap_number: lap.lap_number,
        time: lap.start,
        lap: Arc::clone(lap),
    }];

    if let Some(end) = lap.derived_end().or(next_lap_start) {
        events.push(TimingEvent {
            kind: EventKind::LapEnd,
            driver_number,
            lap_number: lap.lap_number,
            time: end,
            lap: Arc::clone(lap),
        });
    }

    events
}

/// Result of pushing an event into the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Inserted,
    Duplicate,
}

/// Time-sorted queue of every known lap event
#[derive(Debug, Default)]
pub struct EventQueue {
    events: Vec<TimingEvent>,
    keys: HashSet<EventKey>,
    cursor: usize,
    /// Highest simulated time drained so far
    watermark: Option<SimTime>,
    replay_required: bool,
}

impl EventQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an event, keeping the queue sorted
    ///
    /// A `LapEnd` sorts ahead of a `LapStart` with the same timestamp, even
    /// when it arrives later. Otherwise ties keep insertion order.
    pub fn push(&mut self, event: TimingEvent) -> PushOutcome {
        if !self.keys.insert(event.key()) {
            return PushOutcome::Duplicate;
        }

        if let Some(watermark) = self.watermark {
            if event.time <= watermark {
                log::debug!(
                    "{} for driver {} lap {} lands before processed time, replay required",
                    event.kind,
                    event.driver_number,
                    event.lap_number
                );
                self.replay_required = true;
            }
        }

        let order = event.order();
        let index = self.events.partition_point(|queued| queued.order() <= order);
        self.events.insert(index, event);
        PushOutcome::Inserted
    }

    /// Build and insert the events for one lap; returns how many were new
    pub fn enqueue_lap(
        &mut self,
        driver_number: u32,
        lap: &Arc<LapFact>,
        next_lap_start: Option<SimTime>,
    ) -> usize {
        build_lap_events(driver_number, lap, next_lap_start)
            .into_iter()
            .filter(|event| self.push(event.clone()) == PushOutcome::Inserted)
            .count()
    }

    /// Hand out every event with timestamp <= `time` past the cursor
    pub fn drain_until(&mut self, time: SimTime) -> Vec<TimingEvent> {
        let start = self.cursor;
        while self.cursor < self.events.len() && self.events[self.cursor].time <= time {
            self.cursor += 1;
        }
        self.watermark = Some(self.watermark.map_or(time, |w| w.max(time)));
        self.events[start..self.cursor].to_vec()
    }

    /// Move the cursor back to the first event and clear the replay flag
    pub fn rewind(&mut self) {
        self.cursor = 0;
        self.watermark = None;
        self.replay_required = false;
    }

    /// True if an event arrived that invalidates already-processed state
    pub fn replay_required(&self) -> bool {
        self.replay_required
    }

    /// Remove every event
    pub fn clear(&mut self) {
        self.events.clear();
        self.keys.clear();
        self.rewind();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// All queued events in processing order
    pub fn events(&self) -> &[TimingEvent] {
        &self.events
    }
}
