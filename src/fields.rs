//! Canonical record fields: their names, value kinds, cache groups and the
//! order in which they are written.

use crate::units::ValueKind;

/// A cluster of derived values that are recomputed together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Group {
    Date,
    Timing,
    Physiological,
    GpsExtended,
    Dynamics,
    Other,
}

impl Group {
    pub const ALL: [Group; 6] = [
        Group::Date,
        Group::Timing,
        Group::Physiological,
        Group::GpsExtended,
        Group::Dynamics,
        Group::Other,
    ];

    pub(crate) fn bit(self) -> u8 {
        1 << self as u8
    }
}

/// A value an activity can report, independent of how it is displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Date,
    Distance,
    Duration,
    Speed,
    MaxSpeed,
    RestingHeartRate,
    AvgHeartRate,
    MaxHeartRate,
    Calories,
    TrainingEffect,
    Weight,
    ElapsedTime,
    Ascent,
    Descent,
    AvgCadence,
    MaxCadence,
    AvgStanceTime,
    AvgStanceRatio,
    AvgVerticalOscillation,
    Effort,
    Quality,
    Points,
    Temperature,
    DewPoint,
    Equipment,
    Weather,
    Keywords,
    GpsFile,
}

impl Field {
    pub const COUNT: usize = Field::GpsFile as usize + 1;

    pub fn group(self) -> Option<Group> {
        use Field::*;
        match self {
            Date => Some(Group::Date),
            Distance | Duration | Speed => Some(Group::Timing),
            RestingHeartRate | AvgHeartRate | MaxHeartRate | Calories | TrainingEffect | Weight => {
                Some(Group::Physiological)
            }
            ElapsedTime | Ascent | Descent | MaxSpeed => Some(Group::GpsExtended),
            AvgCadence | MaxCadence | AvgStanceTime | AvgStanceRatio | AvgVerticalOscillation => {
                Some(Group::Dynamics)
            }
            Effort | Quality | Points | Temperature | DewPoint | Equipment | Weather | Keywords => {
                Some(Group::Other)
            }
            GpsFile => None,
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

/// One spelling of a field as it appears in a record header.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub field: Field,
    pub kind: ValueKind,
}

const fn spec(name: &'static str, field: Field, kind: ValueKind) -> FieldSpec {
    FieldSpec { name, field, kind }
}

/// Known header fields in canonical write order.
pub const FIELDS: &[FieldSpec] = &[
    spec("Date", Field::Date, ValueKind::Date),
    spec("Distance", Field::Distance, ValueKind::Distance),
    spec("Duration", Field::Duration, ValueKind::Duration),
    spec("Pace", Field::Speed, ValueKind::Pace),
    spec("Speed", Field::Speed, ValueKind::Speed),
    spec("Max-Pace", Field::MaxSpeed, ValueKind::Pace),
    spec("Max-Speed", Field::MaxSpeed, ValueKind::Speed),
    spec("Resting-HR", Field::RestingHeartRate, ValueKind::HeartRate),
    spec("Avg-HR", Field::AvgHeartRate, ValueKind::HeartRate),
    spec("Max-HR", Field::MaxHeartRate, ValueKind::HeartRate),
    spec("Calories", Field::Calories, ValueKind::Number),
    spec("Training-Effect", Field::TrainingEffect, ValueKind::Number),
    spec("Weight", Field::Weight, ValueKind::Weight),
    spec("Elapsed-Time", Field::ElapsedTime, ValueKind::Duration),
    spec("Ascent", Field::Ascent, ValueKind::Altitude),
    spec("Descent", Field::Descent, ValueKind::Altitude),
    spec("Avg-Cadence", Field::AvgCadence, ValueKind::Cadence),
    spec("Max-Cadence", Field::MaxCadence, ValueKind::Cadence),
    spec("Avg-Stance-Time", Field::AvgStanceTime, ValueKind::StanceTime),
    spec("Avg-Stance-Ratio", Field::AvgStanceRatio, ValueKind::Fraction),
    spec("Avg-Vertical-Oscillation", Field::AvgVerticalOscillation, ValueKind::Oscillation),
    spec("Effort", Field::Effort, ValueKind::Number),
    spec("Quality", Field::Quality, ValueKind::Number),
    spec("Points", Field::Points, ValueKind::Number),
    spec("Temperature", Field::Temperature, ValueKind::Temperature),
    spec("Dew-Point", Field::DewPoint, ValueKind::Temperature),
    spec("Equipment", Field::Equipment, ValueKind::Keywords),
    spec("Weather", Field::Weather, ValueKind::Keywords),
    spec("Keywords", Field::Keywords, ValueKind::Keywords),
    spec("GPS-File", Field::GpsFile, ValueKind::Text),
];

pub fn lookup(name: &str) -> Option<&'static FieldSpec> {
    FIELDS.iter().find(|spec| spec.name.eq_ignore_ascii_case(name.trim()))
}

/// Header names that carry `field`, preferred spelling first.
pub fn names_of(field: Field) -> impl Iterator<Item = &'static FieldSpec> {
    FIELDS.iter().filter(move |spec| spec.field == field)
}

pub fn spec_of(field: Field) -> &'static FieldSpec {
    // Every Field has at least one entry in FIELDS.
    names_of(field)
        .next()
        .unwrap_or(&FIELDS[0])
}

/// Rank used to canonicalize a record's field order; unknown names sort last.
pub fn priority(name: &str) -> usize {
    FIELDS
        .iter()
        .position(|spec| spec.name.eq_ignore_ascii_case(name.trim()))
        .unwrap_or(FIELDS.len())
}
