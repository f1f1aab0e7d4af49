use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    pub id: String,
    #[serde(default)]
    pub title: String,
    /// RFC 3339 timestamp or a bare `YYYY-MM-DD` date.
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(rename = "type", default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub source_article_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CalendarEvent {
    /// `(year, month)` of the start date, if it parses.
    pub fn start_year_month(&self) -> Option<(i32, u32)> {
        let raw = self.start_date.as_deref()?.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            let dt = dt.with_timezone(&Utc);
            return Some((dt.year(), dt.month()));
        }
        let date_part = raw.get(..10).unwrap_or(raw);
        NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
            .ok()
            .map(|d| (d.year(), d.month()))
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEventSet {
    #[serde(default)]
    pub events: Vec<CalendarEvent>,
    #[serde(default)]
    pub last_extraction: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(start: Option<&str>) -> CalendarEvent {
        CalendarEvent {
            id: "e1".to_string(),
            title: "Launch".to_string(),
            start_date: start.map(str::to_string),
            end_date: None,
            location: None,
            confidence: None,
            event_type: None,
            source_article_id: None,
            extra: Map::new(),
        }
    }

    #[test]
    fn start_month_from_timestamp_and_date() {
        assert_eq!(
            event(Some("2025-03-04T10:00:00.000Z")).start_year_month(),
            Some((2025, 3))
        );
        assert_eq!(event(Some("2024-11-30")).start_year_month(), Some((2024, 11)));
    }

    #[test]
    fn unparseable_start_has_no_month() {
        assert_eq!(event(Some("next tuesday")).start_year_month(), None);
        assert_eq!(event(None).start_year_month(), None);
    }
}
