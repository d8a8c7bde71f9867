//! Sample calendar entries for the agenda strip of the panel.

use chrono::{Duration, NaiveDateTime};
use serde::Serialize;

pub const MAX_EVENTS: usize = 4;
pub const MAX_TITLE_CHARS: usize = 40;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgendaEvent {
    pub title: String,
    pub starts_at: NaiveDateTime,
    pub description: String,
    pub location: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgendaLine {
    pub title: String,
    pub time_display: String,
    pub location: String,
    pub description: String,
}

/// Fixed events relative to `now`; stands in for a real calendar source.
pub fn sample_events(now: NaiveDateTime) -> Vec<AgendaEvent> {
    [
        ("Team Meeting", Duration::hours(2), "Weekly team sync", "Conference Room A"),
        (
            "Doctor Appointment",
            Duration::days(1) + Duration::hours(10),
            "Annual checkup",
            "Medical Center",
        ),
        (
            "Birthday Party",
            Duration::days(3) + Duration::hours(18),
            "Sarah's birthday celebration",
            "Home",
        ),
        (
            "Conference Call",
            Duration::days(5) + Duration::hours(14),
            "Project review with client",
            "Virtual",
        ),
    ]
    .into_iter()
    .map(|(title, offset, description, location)| AgendaEvent {
        title: title.to_string(),
        starts_at: now + offset,
        description: description.to_string(),
        location: location.to_string(),
    })
    .collect()
}

pub fn format_events_for_display(
    events: &[AgendaEvent],
    now: NaiveDateTime,
    max_events: usize,
) -> Vec<AgendaLine> {
    events
        .iter()
        .take(max_events)
        .map(|event| AgendaLine {
            title: event.title.chars().take(MAX_TITLE_CHARS).collect(),
            time_display: time_display(event.starts_at, now),
            location: event.location.clone(),
            description: event.description.clone(),
        })
        .collect()
}

fn time_display(starts_at: NaiveDateTime, now: NaiveDateTime) -> String {
    let today = now.date();
    if starts_at.date() == today {
        return format!("Today {}", starts_at.format("%H:%M"));
    }
    if today.succ_opt() == Some(starts_at.date()) {
        return format!("Tomorrow {}", starts_at.format("%H:%M"));
    }
    starts_at.format("%a %d/%m %H:%M").to_string()
}
