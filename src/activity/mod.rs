//! Typed, cache-aware view over one [`Record`].
//!
//! Derived values are grouped (see [`Group`]); a group is recomputed the
//! first time one of its values is read after the record changed. Values a
//! record does not declare are taken from the attached GPS track, which is
//! parsed lazily.

mod cache;

use std::cell::RefCell;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

use chrono::NaiveDateTime;

use crate::config::Config;
use crate::error::ActivityError;
use crate::fields::{self, Field, Group};
use crate::pipeline::resample;
use crate::record::Record;
use crate::types::track::GpsTrack;
use crate::units::{self, ValueKind};

use cache::{Cache, GPS_FILE};

pub struct Activity<'c, R> {
    record: R,
    config: &'c Config,
    cache: RefCell<Cache>,
}

impl<'c, R: Deref<Target = Record>> Activity<'c, R> {
    pub fn new(record: R, config: &'c Config) -> Self {
        Self {
            record,
            config,
            cache: RefCell::new(Cache::default()),
        }
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn config(&self) -> &Config {
        self.config
    }

    pub fn value(&self, field: Field) -> Option<f64> {
        let group = field.group()?;
        let mut cache = self.cache.borrow_mut();
        cache.ensure(group, &self.record, self.config);
        cache.value(field)
    }

    pub fn date(&self) -> Option<NaiveDateTime> {
        let mut cache = self.cache.borrow_mut();
        cache.ensure(Group::Date, &self.record, self.config);
        cache.date()
    }

    pub fn distance(&self) -> Option<f64> {
        self.value(Field::Distance)
    }

    pub fn duration(&self) -> Option<f64> {
        self.value(Field::Duration)
    }

    /// Average speed in metres per second; pace is its reciprocal.
    pub fn speed(&self) -> Option<f64> {
        self.value(Field::Speed)
    }

    pub fn max_speed(&self) -> Option<f64> {
        self.value(Field::MaxSpeed)
    }

    pub fn resting_heart_rate(&self) -> Option<f64> {
        self.value(Field::RestingHeartRate)
    }

    pub fn avg_heart_rate(&self) -> Option<f64> {
        self.value(Field::AvgHeartRate)
    }

    pub fn max_heart_rate(&self) -> Option<f64> {
        self.value(Field::MaxHeartRate)
    }

    pub fn calories(&self) -> Option<f64> {
        self.value(Field::Calories)
    }

    pub fn training_effect(&self) -> Option<f64> {
        self.value(Field::TrainingEffect)
    }

    pub fn weight(&self) -> Option<f64> {
        self.value(Field::Weight)
    }

    pub fn elapsed_time(&self) -> Option<f64> {
        self.value(Field::ElapsedTime)
    }

    pub fn ascent(&self) -> Option<f64> {
        self.value(Field::Ascent)
    }

    pub fn descent(&self) -> Option<f64> {
        self.value(Field::Descent)
    }

    pub fn avg_cadence(&self) -> Option<f64> {
        self.value(Field::AvgCadence)
    }

    pub fn max_cadence(&self) -> Option<f64> {
        self.value(Field::MaxCadence)
    }

    pub fn avg_stance_time(&self) -> Option<f64> {
        self.value(Field::AvgStanceTime)
    }

    pub fn avg_stance_ratio(&self) -> Option<f64> {
        self.value(Field::AvgStanceRatio)
    }

    pub fn avg_vertical_oscillation(&self) -> Option<f64> {
        self.value(Field::AvgVerticalOscillation)
    }

    pub fn effort(&self) -> Option<f64> {
        self.value(Field::Effort)
    }

    pub fn quality(&self) -> Option<f64> {
        self.value(Field::Quality)
    }

    pub fn points(&self) -> Option<f64> {
        self.value(Field::Points)
    }

    pub fn temperature(&self) -> Option<f64> {
        self.value(Field::Temperature)
    }

    pub fn dew_point(&self) -> Option<f64> {
        self.value(Field::DewPoint)
    }

    pub fn equipment(&self) -> Vec<String> {
        self.keyword_list("Equipment")
    }

    pub fn weather(&self) -> Vec<String> {
        self.keyword_list("Weather")
    }

    pub fn keywords(&self) -> Vec<String> {
        self.keyword_list("Keywords")
    }

    fn keyword_list(&self, name: &str) -> Vec<String> {
        self.record.field(name).map(units::keywords).unwrap_or_default()
    }

    pub fn gps_file(&self) -> Option<&str> {
        self.record.field(GPS_FILE).map(str::trim).filter(|s| !s.is_empty())
    }

    pub fn body(&self) -> &str {
        self.record.body()
    }

    /// Text of `name`: the declared value when the record has one, otherwise
    /// the derived value formatted in the configured units.
    pub fn field_text(&self, name: &str) -> Option<String> {
        if let Some(text) = self.record.field(name) {
            return Some(text.to_string());
        }
        let spec = fields::lookup(name)?;
        match spec.kind {
            ValueKind::Date => self.date().map(|date| units::format_date(&date)),
            kind if kind.is_numeric() => self
                .value(spec.field)
                .map(|value| self.config.units.format(kind, value)),
            _ => None,
        }
    }

    /// Canonical numeric value of `name`. Pace fields report the speed they
    /// are stored as; dates report seconds since the epoch.
    pub fn field_value(&self, name: &str) -> Option<f64> {
        let spec = fields::lookup(name)?;
        match spec.kind {
            ValueKind::Date => self.date().map(units::date_to_value),
            kind if kind.is_numeric() => self.value(spec.field),
            _ => None,
        }
    }

    /// Whether `name` has a value, declared or derived from the GPS track.
    pub fn defines(&self, name: &str) -> bool {
        self.field_text(name).is_some()
    }

    pub fn gps_track(&self) -> Option<Rc<GpsTrack>> {
        let mut cache = self.cache.borrow_mut();
        cache.sync(&self.record);
        cache.track(&self.record, self.config)
    }

    /// The GPS track resampled and box-averaged over `width` one-second
    /// samples, ready for charting.
    pub fn smoothed_track(&self, width: usize) -> Option<Rc<GpsTrack>> {
        let mut cache = self.cache.borrow_mut();
        cache.sync(&self.record);
        if let Some(track) = cache.smoothed(width) {
            return Some(track);
        }
        let source = cache.track(&self.record, self.config)?;
        let smoothed = Rc::new(resample::smooth(&source, width));
        cache.store_smoothed(width, Rc::clone(&smoothed));
        Some(smoothed)
    }

    /// Smoothed with the configured width.
    pub fn chart_track(&self) -> Option<Rc<GpsTrack>> {
        self.smoothed_track(self.config.smoothing_width)
    }

    /// Groups whose current values were filled in from the GPS track.
    pub fn gps_dependent_groups(&self) -> Vec<Group> {
        let cache = self.cache.borrow();
        Group::ALL
            .into_iter()
            .filter(|group| cache.is_gps_dependent(*group))
            .collect()
    }

    /// Forget the parsed GPS track and every group computed from it.
    pub fn invalidate_gps(&self) {
        self.cache.borrow_mut().invalidate_gps();
    }

    pub fn invalidate(&self) {
        self.cache.borrow_mut().invalidate();
    }
}

impl<'c, R: DerefMut<Target = Record>> Activity<'c, R> {
    pub fn record_mut(&mut self) -> &mut Record {
        &mut self.record
    }

    /// Speed is derived while both distance and duration are declared.
    fn check_writable(&self, field: Field, name: &str) -> Result<(), ActivityError> {
        if field == Field::Speed
            && self.record.has_field("Distance")
            && self.record.has_field("Duration")
        {
            return Err(ActivityError::ReadOnly(name.to_string()));
        }
        Ok(())
    }

    /// Store `value` (canonical units) under header `name`, formatted for the
    /// configured units. `None` removes the field. Setting one spelling of an
    /// aliased field removes the others.
    pub fn set_field_value(&mut self, name: &str, value: Option<f64>) -> Result<(), ActivityError> {
        let spec = fields::lookup(name).ok_or_else(|| ActivityError::UnknownField(name.to_string()))?;
        if !spec.kind.is_numeric() {
            return Err(ActivityError::InvalidValue {
                field: spec.name.to_string(),
                value: value.map(|v| v.to_string()).unwrap_or_default(),
            });
        }
        self.check_writable(spec.field, spec.name)?;

        self.remove_aliases(spec.field, spec.name);
        match value {
            Some(value) => {
                let text = self.config.units.format(spec.kind, value);
                self.record.set_field(spec.name, text);
            }
            None => {
                self.record.remove_field(spec.name);
            }
        }
        Ok(())
    }

    /// Store `text` under `name` after checking it parses as the field's
    /// kind. Unknown names are stored as free text; empty text removes the
    /// field.
    pub fn set_field_text(&mut self, name: &str, text: &str) -> Result<(), ActivityError> {
        let text = text.trim();
        let Some(spec) = fields::lookup(name) else {
            if text.is_empty() {
                self.record.remove_field(name);
            } else {
                self.record.set_field(name.trim(), text);
            }
            return Ok(());
        };

        self.check_writable(spec.field, spec.name)?;
        if text.is_empty() {
            self.record.remove_field(spec.name);
            return Ok(());
        }

        let valid = match spec.kind {
            ValueKind::Date => self.config.units.parse_date(text).is_some(),
            kind if kind.is_numeric() => self.config.units.parse(kind, text).is_some(),
            _ => true,
        };
        if !valid {
            return Err(ActivityError::InvalidValue {
                field: spec.name.to_string(),
                value: text.to_string(),
            });
        }

        self.remove_aliases(spec.field, spec.name);
        self.record.set_field(spec.name, text);
        Ok(())
    }

    fn remove_aliases(&mut self, field: Field, keep: &str) {
        for alias in fields::names_of(field).filter(|alias| alias.name != keep) {
            self.record.remove_field(alias.name);
        }
    }

    pub fn set_date(&mut self, date: NaiveDateTime) {
        self.record.set_field("Date", units::format_date(&date));
    }

    pub fn set_distance(&mut self, metres: Option<f64>) -> Result<(), ActivityError> {
        self.set_field_value("Distance", metres)
    }

    pub fn set_duration(&mut self, seconds: Option<f64>) -> Result<(), ActivityError> {
        self.set_field_value("Duration", seconds)
    }

    pub fn set_speed(&mut self, metres_per_second: Option<f64>) -> Result<(), ActivityError> {
        self.set_field_value("Speed", metres_per_second)
    }

    /// Stored as a pace; the value is still a speed in metres per second.
    pub fn set_pace(&mut self, metres_per_second: Option<f64>) -> Result<(), ActivityError> {
        self.set_field_value("Pace", metres_per_second)
    }

    pub fn set_avg_heart_rate(&mut self, bpm: Option<f64>) -> Result<(), ActivityError> {
        self.set_field_value("Avg-HR", bpm)
    }

    pub fn set_weight(&mut self, kilograms: Option<f64>) -> Result<(), ActivityError> {
        self.set_field_value("Weight", kilograms)
    }

    pub fn set_equipment(&mut self, items: &[String]) {
        self.set_keyword_list("Equipment", items);
    }

    pub fn set_weather(&mut self, items: &[String]) {
        self.set_keyword_list("Weather", items);
    }

    pub fn set_keywords(&mut self, items: &[String]) {
        self.set_keyword_list("Keywords", items);
    }

    fn set_keyword_list(&mut self, name: &str, items: &[String]) {
        let joined = items
            .iter()
            .map(|item| item.trim())
            .filter(|item| !item.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if joined.is_empty() {
            self.record.remove_field(name);
        } else {
            self.record.set_field(name, joined);
        }
    }

    pub fn set_gps_file(&mut self, path: Option<&str>) {
        match path {
            Some(path) => self.record.set_field(GPS_FILE, path),
            None => {
                self.record.remove_field(GPS_FILE);
            }
        }
    }

    pub fn set_body(&mut self, body: impl Into<String>) {
        self.record.set_body(body);
    }
}
