//! Conversion between human-entered text and canonical numeric values.
//!
//! Canonical units: metres, seconds, metres/second (a pace is stored as the
//! equivalent speed), degrees Celsius, kilograms, beats or cycles per minute,
//! fractions in `0..=1`, milliseconds of stance time, millimetres of vertical
//! oscillation, and local naive date-times (as seconds since the epoch when a
//! date has to travel as a number).

mod format;
mod parse;

use chrono::{DateTime, NaiveDateTime};

pub use format::format_number;

pub const METERS_PER_KILOMETER: f64 = 1000.0;
pub const METERS_PER_MILE: f64 = 1609.344;
pub const METERS_PER_YARD: f64 = 0.9144;
pub const METERS_PER_FOOT: f64 = 0.3048;
pub const KILOGRAMS_PER_POUND: f64 = 0.453_592_37;

/// Decides which unit a value is written in, and read in when the text
/// names none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnitSystem {
    #[default]
    Metric,
    Imperial,
}

impl UnitSystem {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "metric" | "si" => Some(UnitSystem::Metric),
            "imperial" | "us" | "statute" => Some(UnitSystem::Imperial),
            _ => None,
        }
    }

    /// Parse `text` as a value of `kind`, returning it in canonical units.
    pub fn parse(self, kind: ValueKind, text: &str) -> Option<f64> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        match kind {
            ValueKind::Text | ValueKind::Keywords => None,
            ValueKind::Number => parse::parse_number(text),
            ValueKind::Distance => parse::parse_distance(self, text),
            ValueKind::Duration => parse::parse_duration(text),
            ValueKind::Pace => parse::parse_pace(self, text),
            ValueKind::Speed => parse::parse_speed(self, text),
            ValueKind::HeartRate => parse::parse_rate(text, &["bpm"]),
            ValueKind::Cadence => parse::parse_rate(text, &["rpm", "spm"]),
            ValueKind::Weight => parse::parse_weight(self, text),
            ValueKind::Temperature => parse::parse_temperature(self, text),
            ValueKind::Altitude => parse::parse_altitude(self, text),
            ValueKind::Fraction => parse::parse_fraction(text),
            ValueKind::StanceTime => parse::parse_stance_time(text),
            ValueKind::Oscillation => parse::parse_oscillation(text),
            ValueKind::Date => parse::parse_date(text).map(date_to_value),
        }
    }

    /// Format a canonical `value` of `kind` for display and storage.
    pub fn format(self, kind: ValueKind, value: f64) -> String {
        match kind {
            ValueKind::Text | ValueKind::Keywords | ValueKind::Number => format_number(value, 2),
            ValueKind::Distance => format::format_distance(self, value),
            ValueKind::Duration => format::format_duration(value),
            ValueKind::Pace => format::format_pace(self, value),
            ValueKind::Speed => format::format_speed(self, value),
            ValueKind::HeartRate => format!("{:.0} bpm", value),
            ValueKind::Cadence => format!("{:.0} rpm", value),
            ValueKind::Weight => format::format_weight(self, value),
            ValueKind::Temperature => format::format_temperature(self, value),
            ValueKind::Altitude => format::format_altitude(self, value),
            ValueKind::Fraction => format!("{}%", format_number(value * 100.0, 1)),
            ValueKind::StanceTime => format!("{:.0} ms", value),
            ValueKind::Oscillation => format!("{} cm", format_number(value / 10.0, 1)),
            ValueKind::Date => value_to_date(value)
                .map(|date| format_date(&date))
                .unwrap_or_default(),
        }
    }

    pub fn parse_date(self, text: &str) -> Option<NaiveDateTime> {
        parse::parse_date(text.trim())
    }
}

impl std::fmt::Display for UnitSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnitSystem::Metric => write!(f, "metric"),
            UnitSystem::Imperial => write!(f, "imperial"),
        }
    }
}

/// The shape of a field's value, which selects its parser and formatter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Text,
    /// Whitespace separated token list.
    Keywords,
    Number,
    Distance,
    Duration,
    Pace,
    Speed,
    HeartRate,
    Cadence,
    Weight,
    Temperature,
    Altitude,
    Fraction,
    StanceTime,
    Oscillation,
    Date,
}

impl ValueKind {
    pub fn is_numeric(self) -> bool {
        !matches!(self, ValueKind::Text | ValueKind::Keywords)
    }
}

pub fn format_date(date: &NaiveDateTime) -> String {
    date.format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn date_to_value(date: NaiveDateTime) -> f64 {
    date.and_utc().timestamp() as f64
}

pub fn value_to_date(value: f64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp(value.round() as i64, 0).map(|dt| dt.naive_utc())
}

pub fn keywords(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_string).collect()
}
