//! Streaming TCX decoding. Each element open moves a state machine keyed on
//! (namespace, element, current state); each close interprets the text
//! collected for the state being closed.

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::NsReader;

use crate::error::ParseError;
use crate::pipeline::parse::Parser;
use crate::types::track::{GpsTrack, Lap, Point, Position, Sport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ns {
    Tcx,
    Extension,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Document,
    Database,
    Activities,
    Activity,
    ActivityId,
    Creator,
    CreatorName,
    CreatorUnitId,
    Lap,
    LapTotalTime,
    LapDistance,
    LapMaxSpeed,
    LapCalories,
    LapAvgHr,
    LapAvgHrValue,
    LapMaxHr,
    LapMaxHrValue,
    LapCadence,
    LapExtensions,
    LapLx,
    LapAvgSpeed,
    LapAvgRunCadence,
    LapMaxRunCadence,
    Track,
    Trackpoint,
    PointTime,
    Position,
    Latitude,
    Longitude,
    PointAltitude,
    PointDistance,
    PointHr,
    PointHrValue,
    PointCadence,
    PointExtensions,
    PointTpx,
    PointSpeed,
    PointRunCadence,
    /// Unrecognised element; everything beneath it is ignored.
    Unknown,
}

fn transition(state: State, ns: Ns, name: &str) -> State {
    use State::*;
    match (state, ns, name) {
        (Document, Ns::Tcx, "TrainingCenterDatabase") => Database,
        (Database, Ns::Tcx, "Activities") => Activities,
        (Activities, Ns::Tcx, "Activity") => Activity,
        (Activity, Ns::Tcx, "Id") => ActivityId,
        (Activity, Ns::Tcx, "Creator") => Creator,
        (Activity, Ns::Tcx, "Lap") => Lap,
        (Creator, Ns::Tcx, "Name") => CreatorName,
        (Creator, Ns::Tcx, "UnitId") => CreatorUnitId,
        (Lap, Ns::Tcx, "TotalTimeSeconds") => LapTotalTime,
        (Lap, Ns::Tcx, "DistanceMeters") => LapDistance,
        (Lap, Ns::Tcx, "MaximumSpeed") => LapMaxSpeed,
        (Lap, Ns::Tcx, "Calories") => LapCalories,
        (Lap, Ns::Tcx, "AverageHeartRateBpm") => LapAvgHr,
        (Lap, Ns::Tcx, "MaximumHeartRateBpm") => LapMaxHr,
        (Lap, Ns::Tcx, "Cadence") => LapCadence,
        (Lap, Ns::Tcx, "Track") => Track,
        (Lap, Ns::Tcx, "Extensions") => LapExtensions,
        (LapAvgHr, Ns::Tcx, "Value") => LapAvgHrValue,
        (LapMaxHr, Ns::Tcx, "Value") => LapMaxHrValue,
        (LapExtensions, Ns::Extension, "LX") => LapLx,
        (LapLx, Ns::Extension, "AvgSpeed") => LapAvgSpeed,
        (LapLx, Ns::Extension, "AvgRunCadence") => LapAvgRunCadence,
        (LapLx, Ns::Extension, "MaxRunCadence") => LapMaxRunCadence,
        (Track, Ns::Tcx, "Trackpoint") => Trackpoint,
        (Trackpoint, Ns::Tcx, "Time") => PointTime,
        (Trackpoint, Ns::Tcx, "Position") => Position,
        (Trackpoint, Ns::Tcx, "AltitudeMeters") => PointAltitude,
        (Trackpoint, Ns::Tcx, "DistanceMeters") => PointDistance,
        (Trackpoint, Ns::Tcx, "HeartRateBpm") => PointHr,
        (Trackpoint, Ns::Tcx, "Cadence") => PointCadence,
        (Trackpoint, Ns::Tcx, "Extensions") => PointExtensions,
        (Position, Ns::Tcx, "LatitudeDegrees") => Latitude,
        (Position, Ns::Tcx, "LongitudeDegrees") => Longitude,
        (PointHr, Ns::Tcx, "Value") => PointHrValue,
        (PointExtensions, Ns::Extension, "TPX") => PointTpx,
        (PointTpx, Ns::Extension, "Speed") => PointSpeed,
        (PointTpx, Ns::Extension, "RunCadence") => PointRunCadence,
        _ => Unknown,
    }
}

const TCX_NAMESPACE: &[u8] = b"http://www.garmin.com/xmlschemas/TrainingCenterDatabase/v2";
const EXTENSION_NAMESPACE: &[u8] = b"http://www.garmin.com/xmlschemas/ActivityExtension/v2";

fn namespace_of(resolved: &ResolveResult) -> Ns {
    match resolved {
        ResolveResult::Bound(ns) if ns.as_ref() == TCX_NAMESPACE => Ns::Tcx,
        ResolveResult::Bound(ns) if ns.as_ref() == EXTENSION_NAMESPACE => Ns::Extension,
        // Hand-written files often omit the default namespace.
        ResolveResult::Unbound => Ns::Tcx,
        _ => Ns::Other,
    }
}

#[derive(Default)]
pub struct TcxParser {
    stack: Vec<State>,
    text: String,
    start: Option<DateTime<Utc>>,
    point: Option<Point>,
    point_time: Option<DateTime<Utc>>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    /// A `<Track>` opened and has not produced a point yet.
    track_opened: bool,
    paused: f64,
}

impl Parser for TcxParser {
    fn parse(&mut self, bytes: &[u8], track: &mut GpsTrack) -> Result<(), ParseError> {
        let mut reader = NsReader::from_reader(bytes);
        let mut buf = Vec::new();

        loop {
            let (resolved, event) = reader
                .read_resolved_event_into(&mut buf)
                .map_err(|e| ParseError::InvalidTcx(e.to_string()))?;
            let ns = namespace_of(&resolved);

            match event {
                Event::Start(e) => self.open(ns, &e, track),
                Event::Empty(e) => {
                    self.open(ns, &e, track);
                    self.close(track);
                }
                Event::End(_) => self.close(track),
                Event::Text(e) => {
                    let text = e
                        .unescape()
                        .map_err(|e| ParseError::InvalidTcx(e.to_string()))?;
                    self.text.push_str(&text);
                }
                Event::CData(e) => {
                    self.text.push_str(&String::from_utf8_lossy(&e.into_inner()));
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        if !self.stack.is_empty() {
            return Err(ParseError::InvalidTcx(format!(
                "document ended inside {} open element(s)",
                self.stack.len()
            )));
        }
        if track.summary.start_time.is_none() {
            track.summary.start_time = self.start;
        }
        Ok(())
    }
}

impl TcxParser {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> State {
        self.stack.last().copied().unwrap_or(State::Document)
    }

    fn open(&mut self, ns: Ns, element: &BytesStart<'_>, track: &mut GpsTrack) {
        let local = element.local_name();
        let name = std::str::from_utf8(local.as_ref()).unwrap_or("");
        let next = transition(self.state(), ns, name);
        self.stack.push(next);
        self.text.clear();

        match next {
            State::Activity => {
                if let Some(sport) = attribute(element, b"Sport") {
                    track.sport = Sport::from_name(&sport);
                }
            }
            State::Lap => {
                let start_time = attribute(element, b"StartTime").and_then(|t| parse_time(&t));
                let anchor = match (self.start, start_time) {
                    (None, Some(t)) => {
                        self.start = Some(t);
                        Some(t)
                    }
                    (start, _) => start,
                };
                let offset = match (anchor, start_time) {
                    (Some(anchor), Some(t)) => seconds_between(anchor, t),
                    _ => track.points.last().map(|p| p.time).unwrap_or(0.0),
                };
                track.laps.push(Lap {
                    start_time,
                    offset,
                    ..Lap::default()
                });
            }
            State::Track => self.track_opened = true,
            State::Trackpoint => {
                self.point = Some(Point::default());
                self.point_time = None;
            }
            State::Position => {
                self.latitude = None;
                self.longitude = None;
            }
            _ => {}
        }
    }

    fn close(&mut self, track: &mut GpsTrack) {
        let Some(state) = self.stack.pop() else {
            return;
        };
        let text = std::mem::take(&mut self.text);
        let text = text.trim();
        let number = || text.parse::<f64>().ok();

        match state {
            State::ActivityId => {
                if let Some(t) = parse_time(text) {
                    self.start = Some(t);
                }
            }
            State::CreatorName => {
                if track.device.is_none() && !text.is_empty() {
                    track.device = Some(text.to_string());
                }
            }
            State::CreatorUnitId => {
                if !text.is_empty() {
                    track.device = Some(text.to_string());
                }
            }
            State::LapTotalTime => self.set_lap(track, number(), |s, v| s.duration = v),
            State::LapDistance => self.set_lap(track, number(), |s, v| s.distance = v),
            State::LapMaxSpeed => self.set_lap(track, number(), |s, v| s.max_speed = v),
            State::LapCalories => self.set_lap(track, number(), |s, v| s.calories = v),
            State::LapAvgHrValue => self.set_lap(track, number(), |s, v| s.avg_heart_rate = v),
            State::LapMaxHrValue => self.set_lap(track, number(), |s, v| s.max_heart_rate = v),
            State::LapCadence | State::LapAvgRunCadence => {
                self.set_lap(track, number(), |s, v| s.avg_cadence = v)
            }
            State::LapMaxRunCadence => self.set_lap(track, number(), |s, v| s.max_cadence = v),
            State::LapAvgSpeed => self.set_lap(track, number(), |s, v| s.avg_speed = v),
            State::PointTime => self.point_time = parse_time(text),
            State::Latitude => self.latitude = number(),
            State::Longitude => self.longitude = number(),
            State::Position => {
                if let (Some(point), Some(lat), Some(lon)) =
                    (self.point.as_mut(), self.latitude, self.longitude)
                {
                    point.position = Some(Position { lat, lon });
                }
            }
            State::PointAltitude => {
                if let (Some(point), Some(v)) = (self.point.as_mut(), number()) {
                    point.altitude = v;
                    track.capabilities.has_altitude = true;
                }
            }
            State::PointDistance => {
                if let (Some(point), Some(v)) = (self.point.as_mut(), number()) {
                    point.distance = v;
                    track.capabilities.has_distance = true;
                }
            }
            State::PointSpeed => {
                if let (Some(point), Some(v)) = (self.point.as_mut(), number()) {
                    point.speed = v;
                    track.capabilities.has_speed = true;
                }
            }
            State::PointHrValue => {
                if let (Some(point), Some(v)) = (self.point.as_mut(), number()) {
                    point.heart_rate = v;
                    track.capabilities.has_heart_rate = true;
                }
            }
            State::PointCadence | State::PointRunCadence => {
                if let (Some(point), Some(v)) = (self.point.as_mut(), number()) {
                    point.cadence = v;
                    track.capabilities.has_cadence = true;
                }
            }
            State::Trackpoint => self.finish_point(track),
            _ => {}
        }
    }

    fn set_lap(&self, track: &mut GpsTrack, value: Option<f64>, apply: fn(&mut crate::types::track::Stats, f64)) {
        if let (Some(lap), Some(value)) = (track.laps.last_mut(), value) {
            apply(&mut lap.stats, value);
        }
    }

    /// Place the completed point on the track clock. The first point of a
    /// second or later `<Track>` starts a new segment, and the gap before it
    /// counts as paused time.
    fn finish_point(&mut self, track: &mut GpsTrack) {
        let (Some(mut point), Some(time)) = (self.point.take(), self.point_time) else {
            return;
        };
        let start = *self.start.get_or_insert(time);
        let elapsed = seconds_between(start, time).max(0.0);

        if std::mem::take(&mut self.track_opened) {
            if let Some(prev) = track.points.last() {
                point.segment_start = true;
                self.paused += (elapsed - prev.time).max(0.0);
            }
        }

        point.time = elapsed;
        point.timer = (elapsed - self.paused).max(0.0);
        track.points.push(point);
    }
}

fn attribute(element: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    element
        .attributes()
        .flatten()
        .find(|attr| attr.key.local_name().as_ref() == key)
        .and_then(|attr| attr.unescape_value().ok().map(|v| v.into_owned()))
}

fn parse_time(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 1000.0
}
