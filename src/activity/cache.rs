use std::path::{Path, PathBuf};
use std::rc::Rc;

use chrono::{Local, NaiveDateTime};

use crate::config::Config;
use crate::fields::{Field, Group, FIELDS};
use crate::pipeline::parse;
use crate::record::Record;
use crate::types::track::GpsTrack;

pub(super) const GPS_FILE: &str = "GPS-File";

/// Derived values of one activity, validated per group against the seed of
/// the backing record.
#[derive(Default)]
pub(super) struct Cache {
    seed: Option<u64>,
    valid: u8,
    /// Groups whose current values consulted the GPS track.
    gps_dependent: u8,
    values: [Option<f64>; Field::COUNT],
    date: Option<NaiveDateTime>,
    /// `GPS-File` text the track was loaded for, and the load result.
    gps: Option<(String, Option<Rc<GpsTrack>>)>,
    smoothed: Option<(usize, Rc<GpsTrack>)>,
}

impl Cache {
    /// Drop everything derived from an older revision of `record`.
    pub(super) fn sync(&mut self, record: &Record) {
        if self.seed == Some(record.seed()) {
            return;
        }
        self.seed = Some(record.seed());
        self.valid = 0;

        let source = record.field(GPS_FILE).unwrap_or("").trim();
        if matches!(&self.gps, Some((loaded, _)) if loaded != source) {
            self.gps = None;
            self.smoothed = None;
        }
    }

    pub(super) fn invalidate(&mut self) {
        self.valid = 0;
    }

    pub(super) fn invalidate_gps(&mut self) {
        self.gps = None;
        self.smoothed = None;
        self.valid &= !self.gps_dependent;
        self.gps_dependent = 0;
    }

    pub(super) fn is_gps_dependent(&self, group: Group) -> bool {
        self.gps_dependent & group.bit() != 0
    }

    pub(super) fn value(&self, field: Field) -> Option<f64> {
        self.values[field.index()]
    }

    pub(super) fn date(&self) -> Option<NaiveDateTime> {
        self.date
    }

    pub(super) fn ensure(&mut self, group: Group, record: &Record, config: &Config) {
        self.sync(record);
        if self.valid & group.bit() != 0 {
            return;
        }

        for field in fields_in(group) {
            self.values[field.index()] = None;
        }
        self.gps_dependent &= !group.bit();

        if group == Group::Date {
            self.date = record
                .field("Date")
                .and_then(|text| config.units.parse_date(text));
        } else {
            for spec in FIELDS.iter().filter(|spec| spec.field.group() == Some(group)) {
                let slot = &mut self.values[spec.field.index()];
                if slot.is_none() {
                    *slot = record
                        .field(spec.name)
                        .and_then(|text| config.units.parse(spec.kind, text));
                }
            }
        }
        if group == Group::Timing {
            self.relate_timing();
        }

        let wants_gps = match group {
            Group::Date => self.date.is_none(),
            _ => fields_in(group)
                .any(|field| self.values[field.index()].is_none() && gps_stat(field).is_some()),
        };
        if wants_gps && record.has_field(GPS_FILE) {
            self.gps_dependent |= group.bit();
            if let Some(track) = self.track(record, config) {
                self.fill_from_track(group, &track);
            }
        }
        if group == Group::Timing {
            self.relate_timing();
        }

        self.valid |= group.bit();
    }

    /// Speed follows distance over duration whenever both are known; a
    /// declared speed only fills in whichever of the two is missing.
    fn relate_timing(&mut self) {
        let distance = self.values[Field::Distance.index()];
        let duration = self.values[Field::Duration.index()];
        let speed = self.values[Field::Speed.index()];
        match (distance, duration, speed) {
            (Some(d), Some(t), _) if t > 0.0 => {
                self.values[Field::Speed.index()] = Some(d / t);
            }
            (Some(d), None, Some(s)) if s > 0.0 => {
                self.values[Field::Duration.index()] = Some(d / s);
            }
            (None, Some(t), Some(s)) => {
                self.values[Field::Distance.index()] = Some(s * t);
            }
            _ => {}
        }
    }

    fn fill_from_track(&mut self, group: Group, track: &GpsTrack) {
        if group == Group::Date {
            if self.date.is_none() {
                self.date = track
                    .summary
                    .start_time
                    .map(|start| start.with_timezone(&Local).naive_local());
            }
            return;
        }
        for field in fields_in(group) {
            let slot = &mut self.values[field.index()];
            if slot.is_some() {
                continue;
            }
            if let Some(stat) = gps_stat(field) {
                let value = stat(track);
                if value > 0.0 {
                    *slot = Some(value);
                }
            }
        }
    }

    /// The attached track, loading it on first use.
    pub(super) fn track(&mut self, record: &Record, config: &Config) -> Option<Rc<GpsTrack>> {
        let source = record.field(GPS_FILE)?.trim().to_string();
        if source.is_empty() {
            return None;
        }
        if self.gps.is_none() {
            let track = load_track(&source, record, config).map(Rc::new);
            self.gps = Some((source, track));
        }
        self.gps.as_ref().and_then(|(_, track)| track.clone())
    }

    pub(super) fn smoothed(&self, width: usize) -> Option<Rc<GpsTrack>> {
        match &self.smoothed {
            Some((cached, track)) if *cached == width => Some(Rc::clone(track)),
            _ => None,
        }
    }

    pub(super) fn store_smoothed(&mut self, width: usize, track: Rc<GpsTrack>) {
        self.smoothed = Some((width, track));
    }
}

fn fields_in(group: Group) -> impl Iterator<Item = Field> {
    FIELDS
        .iter()
        .map(|spec| spec.field)
        .filter(move |field| field.group() == Some(group))
}

/// Summary statistic a field falls back to when the record does not declare it.
fn gps_stat(field: Field) -> Option<fn(&GpsTrack) -> f64> {
    let stat: fn(&GpsTrack) -> f64 = match field {
        Field::Distance => |t| t.summary.stats.distance,
        Field::Duration => |t| t.summary.stats.duration,
        Field::Speed => |t| t.summary.stats.avg_speed,
        Field::MaxSpeed => |t| t.summary.stats.max_speed,
        Field::AvgHeartRate => |t| t.summary.stats.avg_heart_rate,
        Field::MaxHeartRate => |t| t.summary.stats.max_heart_rate,
        Field::Calories => |t| t.summary.stats.calories,
        Field::TrainingEffect => |t| t.summary.training_effect,
        Field::ElapsedTime => |t| t.summary.stats.elapsed_time,
        Field::Ascent => |t| t.summary.stats.ascent,
        Field::Descent => |t| t.summary.stats.descent,
        Field::AvgCadence => |t| t.summary.stats.avg_cadence,
        Field::MaxCadence => |t| t.summary.stats.max_cadence,
        Field::AvgStanceTime => |t| t.summary.stats.avg_stance_time,
        Field::AvgStanceRatio => |t| t.summary.stats.avg_stance_ratio,
        Field::AvgVerticalOscillation => |t| t.summary.stats.avg_vertical_oscillation,
        _ => return None,
    };
    Some(stat)
}

/// Absolute paths are used as-is; relative ones are tried against the
/// record's directory, the configured search path, then the activity
/// directory.
fn resolve_gps_path(source: &str, record: &Record, config: &Config) -> Option<PathBuf> {
    let path = Path::new(source);
    if path.is_absolute() {
        return path.exists().then(|| path.to_path_buf());
    }
    record
        .path()
        .and_then(Path::parent)
        .map(|dir| dir.join(path))
        .into_iter()
        .chain(config.gps_search_path.iter().map(|dir| dir.join(path)))
        .chain(std::iter::once(config.activity_dir.join(path)))
        .find(|candidate| candidate.exists())
}

fn load_track(source: &str, record: &Record, config: &Config) -> Option<GpsTrack> {
    let Some(path) = resolve_gps_path(source, record, config) else {
        tracing::warn!(gps_file = source, "GPS file not found");
        return None;
    };
    match parse::read_track(&path) {
        Ok(track) => Some(track),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "Failed to load GPS track");
            None
        }
    }
}
