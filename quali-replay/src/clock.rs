//! Playback clock
//!
//! Maps elapsed wall-clock time, scaled by the playback speed, onto the
//! simulated session timeline. Wall time is passed in by the caller as
//! monotonic milliseconds, so the clock itself never reads a system clock.

use crate::types::SimTime;

/// Simulated-time cursor driven by wall-clock ticks
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackClock {
    sim_start: SimTime,
    sim_end: SimTime,
    cursor: SimTime,
    speed: f64,
    playing: bool,
    /// Wall time that corresponds to `sim_start` at the current speed
    wall_ref: f64,
}

impl PlaybackClock {
    /// Create a paused clock positioned at `sim_start`
    pub fn new(sim_start: SimTime, sim_end: SimTime, speed: f64) -> Self {
        Self {
            sim_start,
            sim_end: sim_end.max(sim_start),
            cursor: sim_start,
            speed: sanitize_speed(speed),
            playing: false,
            wall_ref: 0.0,
        }
    }

    pub fn sim_start(&self) -> SimTime {
        self.sim_start
    }

    pub fn sim_end(&self) -> SimTime {
        self.sim_end
    }

    /// Simulated time processed so far
    pub fn cursor(&self) -> SimTime {
        self.cursor
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Start or resume from the current cursor
    pub fn play(&mut self, wall_now: f64) {
        if self.cursor >= self.sim_end {
            return;
        }
        self.playing = true;
        self.rebase(wall_now);
    }

    pub fn pause(&mut self) {
        self.playing = false;
    }

    /// Change speed without moving the simulated cursor
    pub fn set_speed(&mut self, speed: f64, wall_now: f64) {
        self.speed = sanitize_speed(speed);
        if self.playing {
            self.rebase(wall_now);
        }
    }

    /// Pause and move the cursor back to the session start
    pub fn reset(&mut self) {
        self.playing = false;
        self.cursor = self.sim_start;
    }

    /// Simulated time the clock should reach at `wall_now`
    pub fn target(&self, wall_now: f64) -> SimTime {
        let elapsed = ((wall_now - self.wall_ref) * self.speed).max(0.0);
        let target = self.sim_start.saturating_add(elapsed.floor() as i64);
        target.min(self.sim_end)
    }

    /// Advance the cursor by one increment, never past `target`
    pub fn advance(&mut self, step: i64, target: SimTime) -> SimTime {
        self.cursor = (self.cursor + step.max(1)).min(target);
        self.cursor
    }

    /// Stop once the end of the session has been reached
    pub fn finish_if_done(&mut self, target: SimTime) -> bool {
        if target >= self.sim_end {
            self.playing = false;
            true
        } else {
            false
        }
    }

    /// Share of the session already replayed, in percent
    pub fn progress(&self) -> f64 {
        let span = self.sim_end - self.sim_start;
        if span <= 0 {
            return 0.0;
        }
        ((self.cursor - self.sim_start) as f64 / span as f64 * 100.0).clamp(0.0, 100.0)
    }

    fn rebase(&mut self, wall_now: f64) {
        self.wall_ref = wall_now - (self.cursor - self.sim_start) as f64 / self.speed;
    }
}

fn sanitize_speed(speed: f64) -> f64 {
    if speed.is_finite() && speed > 0.0 {
        speed
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_scales_with_speed_and_clips() {
        let mut clock = PlaybackClock::new(0, 60_000, 10.0);
        clock.play(1_000.0);

        assert_eq!(clock.target(1_000.0), 0);
        assert_eq!(clock.target(2_000.0), 10_000);
        assert_eq!(clock.target(100_000.0), 60_000);
    }

    #[test]
    fn test_resume_rebases_without_jump() {
        let mut clock = PlaybackClock::new(0, 600_000, 5.0);
        clock.play(0.0);
        let target = clock.target(2_000.0);
        clock.advance(target, target);
        assert_eq!(clock.cursor(), 10_000);

        clock.pause();
        clock.play(50_000.0);
        assert_eq!(clock.target(50_000.0), 10_000);
        assert_eq!(clock.target(51_000.0), 15_000);
    }

    #[test]
    fn test_speed_change_takes_effect_immediately() {
        let mut clock = PlaybackClock::new(0, 600_000, 1.0);
        clock.play(0.0);
        let target = clock.target(4_000.0);
        clock.advance(target, target);

        clock.set_speed(20.0, 4_000.0);
        assert_eq!(clock.target(4_000.0), 4_000);
        assert_eq!(clock.target(5_000.0), 24_000);
    }

    #[test]
    fn test_advance_never_overshoots() {
        let mut clock = PlaybackClock::new(1_000, 2_000, 1.0);
        assert_eq!(clock.advance(80, 1_050), 1_050);
        assert_eq!(clock.advance(80, 1_050), 1_050);
    }

    #[test]
    fn test_reset_and_progress() {
        let mut clock = PlaybackClock::new(0, 1_000, 1.0);
        clock.play(0.0);
        clock.advance(250, 1_000);
        assert_eq!(clock.progress(), 25.0);
        assert!(clock.finish_if_done(1_000));
        assert!(!clock.is_playing());

        clock.reset();
        assert_eq!(clock.cursor(), 0);
        assert_eq!(clock.progress(), 0.0);
    }

    #[test]
    fn test_invalid_speed_falls_back() {
        let clock = PlaybackClock::new(0, 1_000, 0.0);
        assert_eq!(clock.speed(), 1.0);
    }
}
