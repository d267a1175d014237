use super::{UnitSystem, KILOGRAMS_PER_POUND, METERS_PER_FOOT, METERS_PER_KILOMETER, METERS_PER_MILE};

/// Fixed-point formatting with trailing zeros (and a dangling point) removed.
pub fn format_number(value: f64, decimals: usize) -> String {
    let text = format!("{:.*}", decimals, value);
    let text = if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        text
    };
    if text == "-0" {
        "0".to_string()
    } else {
        text
    }
}

pub(super) fn format_distance(system: UnitSystem, meters: f64) -> String {
    match system {
        UnitSystem::Metric => format!("{:.2} km", meters / METERS_PER_KILOMETER),
        UnitSystem::Imperial => format!("{:.2} mi", meters / METERS_PER_MILE),
    }
}

pub(super) fn format_altitude(system: UnitSystem, meters: f64) -> String {
    match system {
        UnitSystem::Metric => format!("{:.0} m", meters),
        UnitSystem::Imperial => format!("{:.0} ft", meters / METERS_PER_FOOT),
    }
}

/// `h:mm:ss` from one hour up, `m:ss` below.
pub(super) fn format_duration(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    let (hours, minutes, secs) = (total / 3600, (total / 60) % 60, total % 60);
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}

pub(super) fn format_pace(system: UnitSystem, speed: f64) -> String {
    if speed <= 0.0 || !speed.is_finite() {
        return "-".to_string();
    }
    let (unit_meters, label) = match system {
        UnitSystem::Metric => (METERS_PER_KILOMETER, "/km"),
        UnitSystem::Imperial => (METERS_PER_MILE, "/mi"),
    };
    format!("{} {}", format_duration(unit_meters / speed), label)
}

pub(super) fn format_speed(system: UnitSystem, speed: f64) -> String {
    match system {
        UnitSystem::Metric => format!("{:.1} km/h", speed * 3600.0 / METERS_PER_KILOMETER),
        UnitSystem::Imperial => format!("{:.1} mph", speed * 3600.0 / METERS_PER_MILE),
    }
}

pub(super) fn format_weight(system: UnitSystem, kilograms: f64) -> String {
    match system {
        UnitSystem::Metric => format!("{:.1} kg", kilograms),
        UnitSystem::Imperial => format!("{:.1} lb", kilograms / KILOGRAMS_PER_POUND),
    }
}

pub(super) fn format_temperature(system: UnitSystem, celsius: f64) -> String {
    match system {
        UnitSystem::Metric => format!("{:.1} C", celsius),
        UnitSystem::Imperial => format!("{:.1} F", celsius * 9.0 / 5.0 + 32.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::ValueKind;

    #[test]
    fn number_trims_trailing_zeros() {
        assert_eq!(format_number(5.0, 2), "5");
        assert_eq!(format_number(3.10, 2), "3.1");
        assert_eq!(format_number(-0.001, 2), "0");
    }

    #[test]
    fn duration_switches_to_hours() {
        assert_eq!(format_duration(2400.0), "40:00");
        assert_eq!(format_duration(3723.4), "1:02:03");
        assert_eq!(format_duration(59.6), "1:00");
    }

    #[test]
    fn pace_is_time_per_unit() {
        assert_eq!(format_pace(UnitSystem::Metric, 1000.0 / 300.0), "5:00 /km");
        assert_eq!(format_pace(UnitSystem::Imperial, METERS_PER_MILE / 480.0), "8:00 /mi");
        assert_eq!(format_pace(UnitSystem::Metric, 0.0), "-");
    }

    #[test]
    fn formatted_values_parse_back() {
        let cases = [
            (ValueKind::Distance, 8046.72),
            (ValueKind::Duration, 2400.0),
            (ValueKind::Pace, 1000.0 / 330.0),
            (ValueKind::Speed, 10.0),
            (ValueKind::Weight, 70.5),
            (ValueKind::Temperature, 21.5),
            (ValueKind::Fraction, 0.5),
            (ValueKind::Oscillation, 91.0),
        ];
        for system in [UnitSystem::Metric, UnitSystem::Imperial] {
            for (kind, value) in cases {
                let text = system.format(kind, value);
                let parsed = system.parse(kind, &text).expect("parses back");
                assert!(
                    (parsed - value).abs() / value < 0.01,
                    "{:?} {} -> {} -> {}",
                    kind,
                    value,
                    text,
                    parsed
                );
            }
        }
    }
}
