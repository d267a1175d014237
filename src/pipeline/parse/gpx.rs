use crate::error::ParseError;
use crate::pipeline::parse::Parser;
use crate::types::track::{GpsTrack, Point, Position};
use chrono::{DateTime, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;

/// GPX has no laps and no timer; gaps between `<trkseg>` elements are
/// treated as pauses.
#[derive(Default)]
pub struct GpxParser {
    start: Option<DateTime<Utc>>,
    paused: f64,
    segment_opened: bool,
}

impl GpxParser {
    pub fn new() -> Self {
        Self::default()
    }

    fn push_point(&mut self, mut point: Point, time: DateTime<Utc>, track: &mut GpsTrack) {
        let start = *self.start.get_or_insert(time);
        let elapsed = ((time - start).num_milliseconds() as f64 / 1000.0).max(0.0);

        if std::mem::take(&mut self.segment_opened) {
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

impl Parser for GpxParser {
    fn parse(&mut self, bytes: &[u8], track: &mut GpsTrack) -> Result<(), ParseError> {
        let mut reader = Reader::from_reader(bytes);
        reader.trim_text(true);

        let mut in_trkpt = false;
        let mut current_point: Option<Point> = None;
        let mut current_time: Option<DateTime<Utc>> = None;
        let mut current_element = String::new();
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                    let name = e.local_name();
                    let name_str = std::str::from_utf8(name.as_ref())
                        .map_err(|e| ParseError::InvalidGpx(e.to_string()))?;

                    if name_str == "trkseg" {
                        self.segment_opened = true;
                    } else if name_str == "trkpt" {
                        in_trkpt = true;
                        let mut lat = None;
                        let mut lon = None;

                        for attr in e.attributes() {
                            let attr = attr.map_err(|e| ParseError::InvalidGpx(e.to_string()))?;
                            let value = std::str::from_utf8(&attr.value)
                                .map_err(|e| ParseError::InvalidGpx(e.to_string()))?;

                            match attr.key.local_name().as_ref() {
                                b"lat" => lat = value.trim().parse().ok(),
                                b"lon" => lon = value.trim().parse().ok(),
                                _ => {}
                            }
                        }

                        let position = match (lat, lon) {
                            (Some(lat), Some(lon)) => Some(Position { lat, lon }),
                            _ => None,
                        };
                        current_point = Some(Point {
                            position,
                            ..Point::default()
                        });
                        current_time = None;
                    } else if in_trkpt {
                        current_element = name_str.to_string();
                    }
                }
                Ok(Event::Text(e)) => {
                    if in_trkpt {
                        if let Some(point) = current_point.as_mut() {
                            let text = e
                                .unescape()
                                .map_err(|e| ParseError::InvalidGpx(e.to_string()))?;

                            match current_element.as_str() {
                                "ele" => {
                                    if let Ok(v) = text.parse() {
                                        point.altitude = v;
                                        track.capabilities.has_altitude = true;
                                    }
                                }
                                "time" => current_time = text.parse::<DateTime<Utc>>().ok(),
                                "hr" => point.heart_rate = text.parse().unwrap_or(0.0),
                                "cad" => point.cadence = text.parse().unwrap_or(0.0),
                                "speed" => point.speed = text.parse().unwrap_or(0.0),
                                _ => {}
                            }
                        }
                    }
                }
                Ok(Event::End(e)) => {
                    if e.local_name().as_ref() == b"trkpt" {
                        // Points without a timestamp cannot be placed on the track clock.
                        if let (Some(point), Some(time)) = (current_point.take(), current_time) {
                            self.push_point(point, time, track);
                        }
                        in_trkpt = false;
                    }
                    current_element.clear();
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(ParseError::InvalidGpx(e.to_string())),
                _ => {}
            }
            buf.clear();
        }

        track.summary.start_time = self.start;
        Ok(())
    }
}
