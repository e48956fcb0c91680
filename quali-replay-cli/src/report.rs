//! Text leaderboard rendering

use quali_replay::{format_clock, MinisectorCategory, MinisectorCell, Movement, ReplayEngine, Standing, TrackStatus};
use std::fmt::Write;

/// Lap or sector time as `m:ss.mmm` (or `ss.mmm` under a minute)
pub fn format_time(ms: Option<i64>) -> String {
    let Some(ms) = ms else {
        return "—".to_string();
    };
    let minutes = ms / 60_000;
    let seconds = (ms % 60_000) / 1000;
    let millis = ms % 1000;
    if minutes > 0 {
        format!("{}:{:02}.{:03}", minutes, seconds, millis)
    } else {
        format!("{}.{:03}", seconds, millis)
    }
}

/// Gap or interval as `+s.mmm`
pub fn format_gap(ms: Option<i64>) -> String {
    match ms {
        Some(0) | None => String::new(),
        Some(ms) => format!("+{}.{:03}", ms / 1000, ms % 1000),
    }
}

fn minisector_symbol(cell: &MinisectorCell) -> char {
    if !cell.lit {
        return '.';
    }
    match MinisectorCategory::from_segment(cell.value) {
        MinisectorCategory::Purple => '#',
        MinisectorCategory::Green => '+',
        MinisectorCategory::Yellow => '-',
        MinisectorCategory::PitLane => 'p',
        MinisectorCategory::Empty => ' ',
        MinisectorCategory::Unknown => '?',
    }
}

fn status_label(standing: &Standing) -> &'static str {
    if standing.eliminated {
        return "OUT";
    }
    match standing.status {
        TrackStatus::Idle => "",
        TrackStatus::PitLane => "PIT",
        TrackStatus::PitOut => "OUT LAP",
        TrackStatus::OnTrack => "TRACK",
    }
}

fn movement_marker(movement: Option<Movement>) -> char {
    match movement {
        Some(Movement::Up) => '▲',
        Some(Movement::Down) => '▼',
        None => ' ',
    }
}

/// Sector cell; `*` marks the session's best, `!` a time beating it
fn sector_cell(standing: &Standing, index: usize) -> String {
    let marker = if standing.beats_global_best_sector[index] {
        "!"
    } else if standing.is_global_best_sector[index] && standing.display_sector_ms[index] == standing.best_sector_ms[index] {
        "*"
    } else {
        ""
    };
    format!("{}{}", format_time(standing.display_sector_ms[index]), marker)
}

/// One leaderboard row
pub fn format_row(standing: &Standing) -> String {
    let minisectors: String = standing.minisectors.iter().map(minisector_symbol).collect();
    let best = if standing.highlight_best_lap {
        format!("{}*", format_time(standing.best_lap_ms))
    } else {
        format_time(standing.best_lap_ms)
    };
    format!(
        "{:>2}{} {:>3} {:<4} {:>10} {:>8} {:>8}  {:>8} {:>8} {:>8}  {:>9}  {:<12} {}",
        standing.position,
        movement_marker(standing.movement),
        standing.driver.number,
        standing.driver.acronym,
        best,
        format_gap(standing.gap_to_leader_ms),
        format_gap(standing.interval_to_ahead_ms),
        sector_cell(standing, 0),
        sector_cell(standing, 1),
        sector_cell(standing, 2),
        format_time(standing.last_lap_ms),
        minisectors,
        status_label(standing),
    )
}

/// Header line: event, phase, simulated clock, progress and speed
pub fn format_header(engine: &ReplayEngine) -> String {
    let session = engine.session();
    let date = chrono::DateTime::parse_from_rfc3339(&session.date_start)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_default();
    format!(
        "{} {} {} | {} | {} | {:.1}% | x{}",
        date,
        session.circuit_short_name.as_deref().unwrap_or("—"),
        session.session_name.as_deref().unwrap_or(""),
        engine.phase_label(),
        format_clock(engine.sim_time()),
        engine.progress(),
        engine.speed(),
    )
}

/// Whole leaderboard; `rows` limits the table (0 shows everyone)
pub fn render(engine: &ReplayEngine, rows: usize) -> String {
    let standings = engine.standings();
    let shown = if rows == 0 { standings.len() } else { rows.min(standings.len()) };

    let mut out = String::new();
    let _ = writeln!(out, "{}", format_header(engine));
    let _ = writeln!(
        out,
        "{:>3} {:>3} {:<4} {:>10} {:>8} {:>8}  {:>8} {:>8} {:>8}  {:>9}",
        "Pos", "No", "Drv", "Best", "Gap", "Int", "S1", "S2", "S3", "Last"
    );
    for standing in &standings[..shown] {
        let _ = writeln!(out, "{}", format_row(standing));
    }
    out
}
