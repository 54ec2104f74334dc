//! iCalendar (RFC 5545) VTODO feed for a board.

use std::fmt::Write;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;

use crate::storage::models::BoardSnapshot;

/// `@YYYY-MM-DD` followed by whitespace or end of text.
static DUE_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@(\d{4}-\d{2}-\d{2})(?:\s+|$)").expect("valid due-date regex"));

const MAX_SLUG_LEN: usize = 64;

/// Map an arbitrary `b=` parameter onto a board slug.
pub fn safe_slug(raw: &str) -> String {
    let slug: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_SLUG_LEN)
        .collect();

    if slug.is_empty() {
        "public".to_string()
    } else {
        slug
    }
}

/// Due date embedded in task text, at 09:00 UTC.
pub fn due_date(text: &str) -> Option<DateTime<Utc>> {
    let caps = DUE_DATE.captures(text)?;
    let date = NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d").ok()?;
    Some(date.and_hms_opt(9, 0, 0)?.and_utc())
}

fn ics_time(ts: DateTime<Utc>) -> String {
    ts.format("%Y%m%dT%H%M%SZ").to_string()
}

fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            _ => out.push(c),
        }
    }
    out
}

/// Render the board as a VCALENDAR with one VTODO per task.
pub fn render_calendar(snapshot: &BoardSnapshot, uid_domain: &str) -> String {
    let mut out = String::new();
    out.push_str("BEGIN:VCALENDAR\r\n");
    out.push_str("VERSION:2.0\r\n");
    out.push_str("PRODID:-//pkm-hub//Tasks//EN\r\n");
    out.push_str("CALSCALE:GREGORIAN\r\n");
    let _ = write!(out, "X-WR-CALNAME:{}\r\n", escape_text(&snapshot.board.title));

    for task in &snapshot.tasks {
        let summary = task.text.trim();
        let summary = if summary.is_empty() { "(untitled)" } else { summary };

        out.push_str("BEGIN:VTODO\r\n");
        let _ = write!(out, "UID:{}@{}\r\n", task.id, uid_domain);
        let _ = write!(out, "SUMMARY:{}\r\n", escape_text(summary));
        let _ = write!(out, "DTSTAMP:{}\r\n", ics_time(task.created_at));
        let _ = write!(out, "CREATED:{}\r\n", ics_time(task.created_at));
        if let Some(due) = due_date(summary) {
            let _ = write!(out, "DUE:{}\r\n", ics_time(due));
        }
        if task.is_done {
            out.push_str("STATUS:COMPLETED\r\n");
            out.push_str("PERCENT-COMPLETE:100\r\n");
        } else {
            out.push_str("STATUS:NEEDS-ACTION\r\n");
        }
        out.push_str("END:VTODO\r\n");
    }

    out.push_str("END:VCALENDAR\r\n");
    out
}
