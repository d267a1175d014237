use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};

use super::{
    UnitSystem, KILOGRAMS_PER_POUND, METERS_PER_FOOT, METERS_PER_KILOMETER, METERS_PER_MILE,
    METERS_PER_YARD,
};

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];

/// Split a leading number from its unit suffix. The unit is lowercased with
/// inner whitespace removed, so `"5 Km"` yields `(5.0, "km")`.
pub(super) fn split_quantity(text: &str) -> Option<(f64, String)> {
    let text = text.trim();
    let end = text
        .char_indices()
        .find(|(i, c)| !(c.is_ascii_digit() || *c == '.' || *c == ',' || (*i == 0 && (*c == '-' || *c == '+'))))
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    let value = parse_decimal(&text[..end])?;
    let unit: String = text[end..]
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect();
    Some((value, unit))
}

/// Locale-free decimal: either `.` or `,` is accepted as the separator.
pub(super) fn parse_decimal(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let value: f64 = text.replace(',', ".").parse().ok()?;
    value.is_finite().then_some(value)
}

pub(super) fn parse_number(text: &str) -> Option<f64> {
    let (value, unit) = split_quantity(text)?;
    unit.is_empty().then_some(value)
}

fn distance_unit(unit: &str) -> Option<f64> {
    match unit {
        "m" | "meter" | "meters" | "metre" | "metres" => Some(1.0),
        "km" | "kilometer" | "kilometers" | "kilometre" | "kilometres" => Some(METERS_PER_KILOMETER),
        "mi" | "mile" | "miles" => Some(METERS_PER_MILE),
        "yd" | "yard" | "yards" => Some(METERS_PER_YARD),
        "ft" | "foot" | "feet" => Some(METERS_PER_FOOT),
        _ => None,
    }
}

pub(super) fn parse_distance(system: UnitSystem, text: &str) -> Option<f64> {
    let (value, unit) = split_quantity(text)?;
    let scale = if unit.is_empty() {
        match system {
            UnitSystem::Metric => METERS_PER_KILOMETER,
            UnitSystem::Imperial => METERS_PER_MILE,
        }
    } else {
        distance_unit(&unit)?
    };
    Some(value * scale)
}

pub(super) fn parse_altitude(system: UnitSystem, text: &str) -> Option<f64> {
    let (value, unit) = split_quantity(text)?;
    let scale = if unit.is_empty() {
        match system {
            UnitSystem::Metric => 1.0,
            UnitSystem::Imperial => METERS_PER_FOOT,
        }
    } else {
        distance_unit(&unit)?
    };
    Some(value * scale)
}

/// `h:mm:ss`, `m:ss` or `ss`, each optionally with a fractional last part.
pub(super) fn parse_clock(text: &str) -> Option<f64> {
    let parts: Vec<&str> = text.trim().split(':').collect();
    if parts.len() > 3 || parts.iter().any(|p| p.trim().is_empty()) {
        return None;
    }
    let mut total = 0.0;
    for (i, part) in parts.iter().enumerate() {
        let value = parse_decimal(part)?;
        if value < 0.0 || (i > 0 && value >= 60.0) {
            return None;
        }
        total = total * 60.0 + value;
    }
    Some(total)
}

fn duration_unit(unit: &str) -> Option<f64> {
    match unit {
        "" | "s" | "sec" | "secs" | "second" | "seconds" => Some(1.0),
        "m" | "min" | "mins" | "minute" | "minutes" => Some(60.0),
        "h" | "hr" | "hrs" | "hour" | "hours" => Some(3600.0),
        _ => None,
    }
}

/// Clock notation, or one or more `<number><unit>` terms such as `1h 20min`.
pub(super) fn parse_duration(text: &str) -> Option<f64> {
    if text.contains(':') {
        return parse_clock(text);
    }
    let mut rest = text.trim();
    let mut total = 0.0;
    while !rest.is_empty() {
        let number_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == ','))
            .unwrap_or(rest.len());
        if number_end == 0 {
            return None;
        }
        let value = parse_decimal(&rest[..number_end])?;
        rest = rest[number_end..].trim_start();
        let unit_end = rest
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(rest.len());
        let unit = rest[..unit_end].trim().to_lowercase();
        total += value * duration_unit(&unit)?;
        rest = rest[unit_end..].trim_start();
    }
    Some(total)
}

fn pace_unit(system: UnitSystem, unit: &str) -> Option<f64> {
    let unit = unit.strip_prefix("min").unwrap_or(unit);
    let unit = unit.strip_prefix('/').unwrap_or(unit);
    match unit {
        "" => Some(match system {
            UnitSystem::Metric => METERS_PER_KILOMETER,
            UnitSystem::Imperial => METERS_PER_MILE,
        }),
        "100m" => Some(100.0),
        "100yd" | "100yds" => Some(100.0 * METERS_PER_YARD),
        other => distance_unit(other),
    }
}

fn speed_unit(system: UnitSystem, unit: &str) -> Option<f64> {
    match unit {
        "" => Some(match system {
            UnitSystem::Metric => METERS_PER_KILOMETER / 3600.0,
            UnitSystem::Imperial => METERS_PER_MILE / 3600.0,
        }),
        "km/h" | "kph" | "kmh" | "kmph" => Some(METERS_PER_KILOMETER / 3600.0),
        "mph" | "mi/h" => Some(METERS_PER_MILE / 3600.0),
        "m/s" | "mps" => Some(1.0),
        _ => None,
    }
}

/// A pace, returned as the equivalent speed in m/s. Text written as a speed
/// (`12 km/h`) is accepted too.
pub(super) fn parse_pace(system: UnitSystem, text: &str) -> Option<f64> {
    let text = text.trim();
    let clock_end = text
        .find(|c: char| !(c.is_ascii_digit() || c == ':' || c == '.' || c == ','))
        .unwrap_or(text.len());
    let clock = &text[..clock_end];
    let unit: String = text[clock_end..]
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect();

    if !clock.contains(':') {
        if let Some(scale) = speed_unit_explicit(&unit) {
            return positive(parse_decimal(clock)? * scale);
        }
    }

    let seconds = if clock.contains(':') {
        parse_clock(clock)?
    } else {
        parse_decimal(clock)? * 60.0
    };
    if seconds <= 0.0 {
        return None;
    }
    Some(pace_unit(system, &unit)? / seconds)
}

fn speed_unit_explicit(unit: &str) -> Option<f64> {
    if unit.is_empty() {
        None
    } else {
        speed_unit(UnitSystem::Metric, unit)
    }
}

/// A speed in m/s. Text in clock notation is read as a pace.
pub(super) fn parse_speed(system: UnitSystem, text: &str) -> Option<f64> {
    if text.contains(':') || text.contains("/100") || text.starts_with("min/") {
        return parse_pace(system, text);
    }
    let (value, unit) = split_quantity(text)?;
    if let Some(scale) = speed_unit(system, &unit) {
        return positive_or_zero(value * scale);
    }
    if unit.starts_with('/') || unit.starts_with("min/") {
        return parse_pace(system, text);
    }
    None
}

fn positive(value: f64) -> Option<f64> {
    (value > 0.0).then_some(value)
}

fn positive_or_zero(value: f64) -> Option<f64> {
    (value >= 0.0).then_some(value)
}

pub(super) fn parse_rate(text: &str, units: &[&str]) -> Option<f64> {
    let (value, unit) = split_quantity(text)?;
    if unit.is_empty() || units.contains(&unit.as_str()) {
        Some(value)
    } else {
        None
    }
}

pub(super) fn parse_weight(system: UnitSystem, text: &str) -> Option<f64> {
    let (value, unit) = split_quantity(text)?;
    let scale = match unit.as_str() {
        "" => match system {
            UnitSystem::Metric => 1.0,
            UnitSystem::Imperial => KILOGRAMS_PER_POUND,
        },
        "kg" | "kgs" | "kilo" | "kilos" => 1.0,
        "lb" | "lbs" | "pound" | "pounds" => KILOGRAMS_PER_POUND,
        _ => return None,
    };
    Some(value * scale)
}

pub(super) fn parse_temperature(system: UnitSystem, text: &str) -> Option<f64> {
    let (value, unit) = split_quantity(text)?;
    let unit = unit.trim_start_matches('°');
    let fahrenheit = match unit {
        "" => system == UnitSystem::Imperial,
        "c" | "celsius" => false,
        "f" | "fahrenheit" => true,
        _ => return None,
    };
    if fahrenheit {
        Some((value - 32.0) * 5.0 / 9.0)
    } else {
        Some(value)
    }
}

/// `45%` is 0.45; a bare number above 1 is taken as a percentage.
pub(super) fn parse_fraction(text: &str) -> Option<f64> {
    let (value, unit) = split_quantity(text)?;
    match unit.as_str() {
        "%" => Some(value / 100.0),
        "" if value > 1.0 => Some(value / 100.0),
        "" => Some(value),
        _ => None,
    }
}

pub(super) fn parse_stance_time(text: &str) -> Option<f64> {
    let (value, unit) = split_quantity(text)?;
    match unit.as_str() {
        "" | "ms" => Some(value),
        "s" => Some(value * 1000.0),
        _ => None,
    }
}

pub(super) fn parse_oscillation(text: &str) -> Option<f64> {
    let (value, unit) = split_quantity(text)?;
    match unit.as_str() {
        "" | "cm" => Some(value * 10.0),
        "mm" => Some(value),
        _ => None,
    }
}

pub(super) fn parse_date(text: &str) -> Option<NaiveDateTime> {
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDateTime::parse_from_str(text, format) {
            return Some(date);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|dt| dt.with_timezone(&Local).naive_local())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn split_quantity_separates_unit() {
        let (value, unit) = split_quantity(" 5,5 Km ").expect("quantity");
        assert!(close(value, 5.5));
        assert_eq!(unit, "km");
    }

    #[test]
    fn distance_uses_system_default_unit() {
        assert!(close(parse_distance(UnitSystem::Metric, "5").unwrap(), 5000.0));
        assert!(close(
            parse_distance(UnitSystem::Imperial, "5").unwrap(),
            5.0 * METERS_PER_MILE
        ));
        assert!(close(parse_distance(UnitSystem::Metric, "5 mi").unwrap(), 5.0 * METERS_PER_MILE));
        assert!(parse_distance(UnitSystem::Metric, "5 parsecs").is_none());
    }

    #[test]
    fn clock_notation() {
        assert!(close(parse_clock("40:00").unwrap(), 2400.0));
        assert!(close(parse_clock("1:02:03").unwrap(), 3723.0));
        assert!(close(parse_clock("0:45.5").unwrap(), 45.5));
        assert!(parse_clock("1:75").is_none());
        assert!(parse_clock("1:2:3:4").is_none());
    }

    #[test]
    fn duration_with_unit_terms() {
        assert!(close(parse_duration("1h 20min").unwrap(), 4800.0));
        assert!(close(parse_duration("90 s").unwrap(), 90.0));
        assert!(close(parse_duration("45").unwrap(), 45.0));
        assert!(parse_duration("ten minutes").is_none());
    }

    #[test]
    fn pace_becomes_speed() {
        let speed = parse_pace(UnitSystem::Metric, "5:00 /km").unwrap();
        assert!(close(speed, 1000.0 / 300.0));
        let speed = parse_pace(UnitSystem::Metric, "8:00 min/mi").unwrap();
        assert!(close(speed, METERS_PER_MILE / 480.0));
        let speed = parse_pace(UnitSystem::Metric, "1:40/100m").unwrap();
        assert!(close(speed, 1.0));
        assert!(parse_pace(UnitSystem::Metric, "0:00").is_none());
    }

    #[test]
    fn speed_infers_pace_from_clock() {
        assert!(close(parse_speed(UnitSystem::Metric, "36 km/h").unwrap(), 10.0));
        assert!(close(parse_speed(UnitSystem::Metric, "4:00").unwrap(), 1000.0 / 240.0));
        assert!(close(parse_speed(UnitSystem::Metric, "3 m/s").unwrap(), 3.0));
    }

    #[test]
    fn temperature_and_weight() {
        assert!(close(parse_temperature(UnitSystem::Metric, "68 F").unwrap(), 20.0));
        assert!(close(parse_temperature(UnitSystem::Imperial, "68").unwrap(), 20.0));
        assert!(close(parse_temperature(UnitSystem::Metric, "-5 °C").unwrap(), -5.0));
        assert!(close(parse_weight(UnitSystem::Metric, "100 lb").unwrap(), 45.359237));
    }

    #[test]
    fn fraction_accepts_percentages() {
        assert!(close(parse_fraction("45%").unwrap(), 0.45));
        assert!(close(parse_fraction("45").unwrap(), 0.45));
        assert!(close(parse_fraction("0.45").unwrap(), 0.45));
    }

    #[test]
    fn dates_in_several_layouts() {
        let expected = NaiveDate::from_ymd_opt(2020, 1, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        assert_eq!(parse_date("2020-01-01 08:00:00"), Some(expected));
        assert_eq!(parse_date("2020-01-01 08:00"), Some(expected));
        assert_eq!(parse_date("2020-01-01T08:00:00"), Some(expected));
        assert_eq!(
            parse_date("2020-01-01"),
            NaiveDate::from_ymd_opt(2020, 1, 1).unwrap().and_hms_opt(0, 0, 0)
        );
        assert!(parse_date("yesterday").is_none());
    }
}
