//! Turning scraped rows into ordered [`EventCandidate`]s.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use trackeame_types::EventCandidate;

use crate::normalize::squash_whitespace;
use crate::rules::KeywordRules;

/// Date/time layout both supported carriers print, e.g. `"07-03-2025 14:32"`.
pub const CARRIER_TIME_FORMAT: &str = "%d-%m-%Y %H:%M";

/// Argentine carriers print wall-clock time at UTC−03:00 (no DST).
const ARGENTINA_UTC_OFFSET_SECS: i32 = -3 * 3600;

/// One timeline row as scraped, before any interpretation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEntry {
    pub date: String,
    pub time: String,
    pub description: String,
    pub raw_status: Option<String>,
    pub location: Option<String>,
}

/// Parse a carrier date and time printed in Argentine local time.
pub fn parse_carrier_time(date: &str, time: &str) -> Option<DateTime<Utc>> {
    let text = format!("{} {}", date.trim(), time.trim());
    let naive = NaiveDateTime::parse_from_str(&text, CARRIER_TIME_FORMAT).ok()?;
    let offset = FixedOffset::east_opt(ARGENTINA_UTC_OFFSET_SECS)?;
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|local| local.with_timezone(&Utc))
}

/// Find an `HH:MM` clock reading that is followed by `hs` (`"14:32 hs."`).
pub fn clock_before_hs(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    for start in 0..bytes.len().saturating_sub(4) {
        let window = &bytes[start..start + 5];
        let is_clock = window[0].is_ascii_digit()
            && window[1].is_ascii_digit()
            && window[2] == b':'
            && window[3].is_ascii_digit()
            && window[4].is_ascii_digit();
        if !is_clock {
            continue;
        }
        let rest = text[start + 5..].trim_start();
        if rest.get(..2).is_some_and(|s| s.eq_ignore_ascii_case("hs")) {
            return Some(&text[start..start + 5]);
        }
    }
    None
}

fn non_empty(text: Option<String>) -> Option<String> {
    text.map(|t| squash_whitespace(&t)).filter(|t| !t.is_empty())
}

/// Classify, filter and order scraped rows.
///
/// Rows without a description or with an unparseable timestamp are dropped.
/// The result is sorted by `occurred_at` ascending; rows sharing a timestamp
/// keep their page order.
pub fn assemble(entries: impl IntoIterator<Item = RawEntry>, rules: &KeywordRules) -> Vec<EventCandidate> {
    let mut events: Vec<EventCandidate> = entries
        .into_iter()
        .filter_map(|entry| {
            let description = squash_whitespace(&entry.description);
            if description.is_empty() {
                return None;
            }
            let occurred_at = parse_carrier_time(&entry.date, &entry.time)?;
            let raw_status = non_empty(entry.raw_status);
            let status = rules.classify(&description, raw_status.as_deref());
            let description = match &raw_status {
                Some(raw) => format!("{description} - {raw}"),
                None => description,
            };

            Some(EventCandidate {
                occurred_at,
                status: Some(status),
                raw_status,
                description: Some(description),
                location: non_empty(entry.location),
            })
        })
        .collect();

    events.sort_by_key(|e| e.occurred_at);
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;
    use proptest::prelude::*;
    use trackeame_types::Status;

    fn rules() -> KeywordRules {
        KeywordRules::builtin("correo-argentino").unwrap().unwrap()
    }

    fn entry(date: &str, time: &str, description: &str) -> RawEntry {
        RawEntry {
            date: date.into(),
            time: time.into(),
            description: description.into(),
            ..Default::default()
        }
    }

    #[test]
    fn carrier_time_is_read_as_argentine_local_time() {
        let at = parse_carrier_time("07-03-2025", "14:32").unwrap();
        assert_eq!(at.to_rfc3339(), "2025-03-07T17:32:00+00:00");
        assert!(parse_carrier_time("2025-03-07", "14:32").is_none());
        assert!(parse_carrier_time("31-02-2025", "10:00").is_none());
    }

    #[test]
    fn clock_reading_needs_hs_suffix() {
        assert_eq!(clock_before_hs("14:32 hs."), Some("14:32"));
        assert_eq!(clock_before_hs("a las 09:05hs"), Some("09:05"));
        assert_eq!(clock_before_hs("09:05 HS"), Some("09:05"));
        assert_eq!(clock_before_hs("09:05"), None);
        assert_eq!(clock_before_hs(""), None);
    }

    #[test]
    fn drops_rows_without_signal_and_sorts_ascending() {
        let events = assemble(
            vec![
                entry("09-03-2025", "10:00", "EN PODER DEL DISTRIBUIDOR"),
                entry("no-date", "10:00", "PREIMPOSICION"),
                entry("07-03-2025", "08:00", "PREIMPOSICION"),
                entry("08-03-2025", "09:30", "   "),
            ],
            &rules(),
        );
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].status, Some(Status::Pending));
        assert_eq!(events[1].status, Some(Status::InTransit));
        assert!(events[0].occurred_at < events[1].occurred_at);
    }

    #[test]
    fn raw_status_is_kept_and_appended_to_description() {
        let mut row = entry("10-03-2025", "12:15", "INTENTO DE ENTREGA");
        row.raw_status = Some(" ENTREGADO ".into());
        row.location = Some("  ".into());
        let events = assemble(vec![row], &rules());
        assert_eq!(events[0].status, Some(Status::Delivered));
        assert_eq!(events[0].raw_status.as_deref(), Some("ENTREGADO"));
        assert_eq!(events[0].description.as_deref(), Some("INTENTO DE ENTREGA - ENTREGADO"));
        assert_eq!(events[0].location, None);
    }

    proptest! {
        #[test]
        fn output_is_ascending_and_keeps_every_valid_row(
            rows in prop::collection::vec((1u32..=28, 1u32..=12, 0u32..24, 0u32..60), 0..40)
        ) {
            let entries: Vec<RawEntry> = rows
                .iter()
                .map(|(d, m, h, min)| entry(
                    &format!("{d:02}-{m:02}-2025"),
                    &format!("{h:02}:{min:02}"),
                    "EN PODER DEL CARTERO",
                ))
                .collect();
            let events = assemble(entries, &rules());
            prop_assert_eq!(events.len(), rows.len());
            prop_assert!(events.windows(2).all(|w| w[0].occurred_at <= w[1].occurred_at));
            prop_assert!(events.iter().all(|e| e.occurred_at.second() == 0));
        }
    }
}
