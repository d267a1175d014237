//! Binary FIT decoding: a header, then a stream of definition messages
//! (declaring the layout of a local message type) and data messages laid out
//! per the most recent definition of their local type.

use std::rc::Rc;

use chrono::{DateTime, Utc};

use crate::error::ParseError;
use crate::pipeline::parse::Parser;
use crate::types::track::{GpsTrack, Lap, Point, Position, Sport, Stats};

/// FIT timestamps count seconds from 1989-12-31 00:00:00 UTC.
const FIT_EPOCH_OFFSET: i64 = 631_065_600;

const HEADER_MIN_SIZE: usize = 12;
const HEADER_MAGIC: &[u8; 4] = b".FIT";

const TIMESTAMP_FIELD: u8 = 253;

mod message_type {
    pub const FILE_ID: u16 = 0;
    pub const SESSION: u16 = 18;
    pub const LAP: u16 = 19;
    pub const RECORD: u16 = 20;
    pub const EVENT: u16 = 21;
}

mod event {
    pub const TIMER: f64 = 0.0;
    pub const RECOVERY_HR: f64 = 21.0;

    pub const TYPE_START: f64 = 0.0;
    pub const TYPE_STOP: f64 = 1.0;
    pub const TYPE_STOP_ALL: f64 = 4.0;
    pub const TYPE_STOP_DISABLE: f64 = 8.0;
    pub const TYPE_STOP_DISABLE_ALL: f64 = 9.0;
}

#[derive(Debug, Clone, Copy)]
struct FieldDef {
    number: u8,
    size: u8,
    base_type: u8,
}

#[derive(Debug)]
struct Definition {
    big_endian: bool,
    global: u16,
    fields: Vec<FieldDef>,
    developer_size: usize,
}

impl Definition {
    fn data_size(&self) -> usize {
        self.fields.iter().map(|f| f.size as usize).sum::<usize>() + self.developer_size
    }
}

/// One decoded primitive field.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Value {
    Unsigned(u64),
    Signed(i64),
    /// The raw value equalled its base type's invalid sentinel.
    Invalid,
    Unsupported(u8),
}

/// Decode the first element of a field. Floats, strings and byte arrays are
/// not decoded.
fn decode(bytes: &[u8], base_type: u8, big_endian: bool) -> Value {
    let (size, signed, invalid): (usize, bool, u64) = match base_type & 0x1F {
        0x00 | 0x02 => (1, false, 0xFF),
        0x01 => (1, true, 0x7F),
        0x03 => (2, true, 0x7FFF),
        0x04 => (2, false, 0xFFFF),
        0x05 => (4, true, 0x7FFF_FFFF),
        0x06 => (4, false, 0xFFFF_FFFF),
        0x0A => (1, false, 0),
        0x0B => (2, false, 0),
        0x0C => (4, false, 0),
        0x0E => (8, true, 0x7FFF_FFFF_FFFF_FFFF),
        0x0F => (8, false, u64::MAX),
        0x10 => (8, false, 0),
        _ => return Value::Unsupported(base_type),
    };
    if bytes.len() < size {
        return Value::Unsupported(base_type);
    }

    let bytes = &bytes[..size];
    let raw = if big_endian {
        bytes.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64)
    } else {
        bytes.iter().rev().fold(0u64, |acc, b| (acc << 8) | *b as u64)
    };

    if raw == invalid {
        Value::Invalid
    } else if signed {
        let shift = 64 - size as u32 * 8;
        Value::Signed(((raw << shift) as i64) >> shift)
    } else {
        Value::Unsigned(raw)
    }
}

struct Message {
    timestamp: Option<u32>,
    values: Vec<(u8, Value)>,
}

impl Message {
    fn raw(&self, number: u8) -> Result<Option<f64>, ParseError> {
        match self.values.iter().find(|(n, _)| *n == number).map(|(_, v)| *v) {
            Some(Value::Unsigned(v)) => Ok(Some(v as f64)),
            Some(Value::Signed(v)) => Ok(Some(v as f64)),
            Some(Value::Unsupported(base_type)) => Err(ParseError::InvalidFit(format!(
                "field {} has unsupported base type {:#04x}",
                number, base_type
            ))),
            Some(Value::Invalid) | None => Ok(None),
        }
    }

    /// Field `number`, or `default` when absent or holding its sentinel.
    fn get(&self, number: u8, default: f64) -> Result<f64, ParseError> {
        Ok(self.raw(number)?.unwrap_or(default))
    }

    /// Field `number` converted as `raw / scale - offset`, or `default`.
    fn scaled(&self, number: u8, scale: f64, offset: f64, default: f64) -> Result<f64, ParseError> {
        Ok(self
            .raw(number)?
            .map(|v| v / scale - offset)
            .unwrap_or(default))
    }

    fn has(&self, number: u8) -> bool {
        matches!(
            self.values.iter().find(|(n, _)| *n == number).map(|(_, v)| v),
            Some(Value::Unsigned(_)) | Some(Value::Signed(_))
        )
    }
}

struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], ParseError> {
        let end = self.pos + len;
        if end > self.data.len() {
            return Err(ParseError::InvalidFit(format!(
                "truncated message at byte {}",
                self.pos
            )));
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, ParseError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self, big_endian: bool) -> Result<u16, ParseError> {
        let b = self.take(2)?;
        let bytes = [b[0], b[1]];
        Ok(if big_endian {
            u16::from_be_bytes(bytes)
        } else {
            u16::from_le_bytes(bytes)
        })
    }
}

pub struct FitParser {
    definitions: Vec<Option<Rc<Definition>>>,
    last_timestamp: u32,
    start_timestamp: Option<u32>,
    stopped_duration: f64,
    stopped_at: Option<u32>,
    resume_pending: bool,
    first_error: Option<ParseError>,
}

impl Default for FitParser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser for FitParser {
    fn parse(&mut self, bytes: &[u8], track: &mut GpsTrack) -> Result<(), ParseError> {
        if bytes.len() < HEADER_MIN_SIZE {
            return Err(ParseError::InvalidFit("file too short for a header".to_string()));
        }
        let header_size = bytes[0] as usize;
        if header_size < HEADER_MIN_SIZE || header_size > bytes.len() {
            return Err(ParseError::InvalidFit(format!("bad header size {}", header_size)));
        }
        if &bytes[8..12] != HEADER_MAGIC {
            return Err(ParseError::InvalidFit("missing .FIT signature".to_string()));
        }
        let data_size = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
        let end = header_size.saturating_add(data_size).min(bytes.len());

        let mut reader = ByteReader::new(&bytes[header_size..end]);
        while !reader.is_empty() {
            self.read_record(&mut reader, track)?;
        }

        if track.summary.start_time.is_none() {
            track.summary.start_time = self.start_timestamp.and_then(to_datetime);
        }

        match self.first_error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl FitParser {
    pub fn new() -> Self {
        Self {
            definitions: vec![None; 16],
            last_timestamp: 0,
            start_timestamp: None,
            stopped_duration: 0.0,
            stopped_at: None,
            resume_pending: false,
            first_error: None,
        }
    }

    fn read_record(&mut self, reader: &mut ByteReader<'_>, track: &mut GpsTrack) -> Result<(), ParseError> {
        let header = reader.u8()?;

        if header & 0x80 != 0 {
            let local = (header >> 5) & 0x03;
            let timestamp = self.compressed_timestamp((header & 0x1F) as u32);
            return self.read_data(reader, local, Some(timestamp), track);
        }

        let local = header & 0x0F;
        if header & 0x40 != 0 {
            self.read_definition(reader, local, header & 0x20 != 0)
        } else {
            self.read_data(reader, local, None, track)
        }
    }

    /// Five-bit offset against the last absolute timestamp, rolling over
    /// every 32 seconds.
    fn compressed_timestamp(&mut self, offset: u32) -> u32 {
        let last = self.last_timestamp;
        let timestamp = last.wrapping_add(offset.wrapping_sub(last & 0x1F) & 0x1F);
        self.last_timestamp = timestamp;
        timestamp
    }

    fn read_definition(
        &mut self,
        reader: &mut ByteReader<'_>,
        local: u8,
        has_developer_fields: bool,
    ) -> Result<(), ParseError> {
        let _reserved = reader.u8()?;
        let big_endian = reader.u8()? == 1;
        let global = reader.u16(big_endian)?;
        let count = reader.u8()?;

        let mut fields = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let def = reader.take(3)?;
            fields.push(FieldDef {
                number: def[0],
                size: def[1],
                base_type: def[2],
            });
        }

        let mut developer_size = 0;
        if has_developer_fields {
            let count = reader.u8()?;
            for _ in 0..count {
                developer_size += reader.take(3)?[1] as usize;
            }
        }

        self.definitions[local as usize] = Some(Rc::new(Definition {
            big_endian,
            global,
            fields,
            developer_size,
        }));
        Ok(())
    }

    fn read_data(
        &mut self,
        reader: &mut ByteReader<'_>,
        local: u8,
        compressed_timestamp: Option<u32>,
        track: &mut GpsTrack,
    ) -> Result<(), ParseError> {
        let definition = self.definitions[local as usize].clone().ok_or_else(|| {
            ParseError::InvalidFit(format!("data message for undefined local type {}", local))
        })?;

        let known = matches!(
            definition.global,
            message_type::FILE_ID
                | message_type::SESSION
                | message_type::LAP
                | message_type::RECORD
                | message_type::EVENT
        );
        if !known {
            reader.take(definition.data_size())?;
            return Ok(());
        }

        let mut values = Vec::with_capacity(definition.fields.len());
        for field in &definition.fields {
            let bytes = reader.take(field.size as usize)?;
            values.push((field.number, decode(bytes, field.base_type, definition.big_endian)));
        }
        reader.take(definition.developer_size)?;

        let mut message = Message {
            timestamp: compressed_timestamp,
            values,
        };
        if let Some(Value::Unsigned(ts)) = message
            .values
            .iter()
            .find(|(n, _)| *n == TIMESTAMP_FIELD)
            .map(|(_, v)| *v)
        {
            self.last_timestamp = ts as u32;
            message.timestamp = Some(ts as u32);
        }

        let result = match definition.global {
            message_type::FILE_ID => self.on_file_id(&message, track),
            message_type::SESSION => self.on_session(&message, track),
            message_type::LAP => self.on_lap(&message, track),
            message_type::RECORD => self.on_record(&message, track),
            message_type::EVENT => self.on_event(&message, track),
            _ => Ok(()),
        };
        if let Err(err) = result {
            tracing::debug!(error = %err, global = definition.global, "Dropping FIT message");
            if self.first_error.is_none() {
                self.first_error = Some(err);
            }
        }
        Ok(())
    }

    /// Seconds since the first timestamp, and the same less paused time.
    fn clock(&mut self, timestamp: u32) -> (f64, f64) {
        let start = *self.start_timestamp.get_or_insert(timestamp);
        let time = timestamp.saturating_sub(start) as f64;
        let paused = self.stopped_duration
            + self
                .stopped_at
                .map(|at| timestamp.saturating_sub(at) as f64)
                .unwrap_or(0.0);
        (time, (time - paused).max(0.0))
    }

    fn on_file_id(&mut self, message: &Message, track: &mut GpsTrack) -> Result<(), ParseError> {
        let serial = message.get(3, 0.0)?;
        let manufacturer = message.get(1, 0.0)?;
        let product = message.get(2, 0.0)?;
        if serial > 0.0 {
            track.device = Some(format!("{}", serial as u64));
        } else if manufacturer > 0.0 {
            track.device = Some(format!("{}-{}", manufacturer as u64, product as u64));
        }
        Ok(())
    }

    fn on_record(&mut self, message: &Message, track: &mut GpsTrack) -> Result<(), ParseError> {
        let Some(timestamp) = message.timestamp else {
            return Ok(());
        };

        let position = if message.has(0) && message.has(1) {
            Some(Position {
                lat: semicircles_to_degrees(message.get(0, 0.0)?),
                lon: semicircles_to_degrees(message.get(1, 0.0)?),
            })
        } else {
            None
        };
        let altitude = message.scaled(78, 5.0, 500.0, message.scaled(2, 5.0, 500.0, 0.0)?)?;
        let distance = message.scaled(5, 100.0, 0.0, 0.0)?;
        let speed = message.scaled(73, 1000.0, 0.0, message.scaled(6, 1000.0, 0.0, 0.0)?)?;
        let heart_rate = message.get(3, 0.0)?;
        let cadence = message.get(4, 0.0)? + message.scaled(53, 128.0, 0.0, 0.0)?;
        let vertical_oscillation = message.scaled(39, 10.0, 0.0, 0.0)?;
        let stance_ratio = message.scaled(40, 10_000.0, 0.0, 0.0)?;
        let stance_time = message.scaled(41, 10.0, 0.0, 0.0)?;

        let caps = &mut track.capabilities;
        caps.has_location |= position.is_some();
        caps.has_altitude |= message.has(2) || message.has(78);
        caps.has_distance |= message.has(5);
        caps.has_speed |= message.has(6) || message.has(73);
        caps.has_heart_rate |= message.has(3);
        caps.has_cadence |= message.has(4);
        caps.has_dynamics |= message.has(39) || message.has(41);

        let (time, timer) = self.clock(timestamp);
        track.points.push(Point {
            time,
            timer,
            position,
            altitude,
            distance,
            speed,
            heart_rate,
            cadence,
            vertical_oscillation,
            stance_time,
            stance_ratio,
            segment_start: std::mem::take(&mut self.resume_pending),
        });
        Ok(())
    }

    fn on_lap(&mut self, message: &Message, track: &mut GpsTrack) -> Result<(), ParseError> {
        let start = message
            .raw(2)?
            .map(|v| v as u32)
            .or(message.timestamp)
            .unwrap_or(self.last_timestamp);
        let anchor = *self.start_timestamp.get_or_insert(start);

        let stats = Stats {
            elapsed_time: message.scaled(7, 1000.0, 0.0, 0.0)?,
            duration: message.scaled(8, 1000.0, 0.0, 0.0)?,
            distance: message.scaled(9, 100.0, 0.0, 0.0)?,
            calories: message.get(11, 0.0)?,
            avg_speed: message.scaled(110, 1000.0, 0.0, message.scaled(13, 1000.0, 0.0, 0.0)?)?,
            max_speed: message.scaled(111, 1000.0, 0.0, message.scaled(14, 1000.0, 0.0, 0.0)?)?,
            avg_heart_rate: message.get(15, 0.0)?,
            max_heart_rate: message.get(16, 0.0)?,
            avg_cadence: message.get(17, 0.0)?,
            max_cadence: message.get(18, 0.0)?,
            ascent: message.get(21, 0.0)?,
            descent: message.get(22, 0.0)?,
            avg_vertical_oscillation: message.scaled(77, 10.0, 0.0, 0.0)?,
            avg_stance_ratio: message.scaled(78, 10_000.0, 0.0, 0.0)?,
            avg_stance_time: message.scaled(79, 10.0, 0.0, 0.0)?,
        };

        track.laps.push(Lap {
            start_time: to_datetime(start),
            offset: start.saturating_sub(anchor) as f64,
            stats,
            region: None,
        });
        Ok(())
    }

    fn on_session(&mut self, message: &Message, track: &mut GpsTrack) -> Result<(), ParseError> {
        track.sport = Sport::from_fit(message.get(5, 0.0)? as u64);

        let summary = &mut track.summary;
        if let Some(start) = message.raw(2)? {
            summary.start_time = to_datetime(start as u32);
        }
        summary.training_effect = message.scaled(24, 10.0, 0.0, 0.0)?;
        summary.stats = Stats {
            elapsed_time: message.scaled(7, 1000.0, 0.0, 0.0)?,
            duration: message.scaled(8, 1000.0, 0.0, 0.0)?,
            distance: message.scaled(9, 100.0, 0.0, 0.0)?,
            calories: message.get(11, 0.0)?,
            avg_speed: message.scaled(124, 1000.0, 0.0, message.scaled(14, 1000.0, 0.0, 0.0)?)?,
            max_speed: message.scaled(125, 1000.0, 0.0, message.scaled(15, 1000.0, 0.0, 0.0)?)?,
            avg_heart_rate: message.get(16, 0.0)?,
            max_heart_rate: message.get(17, 0.0)?,
            avg_cadence: message.get(18, 0.0)?,
            max_cadence: message.get(19, 0.0)?,
            ascent: message.get(22, 0.0)?,
            descent: message.get(23, 0.0)?,
            avg_vertical_oscillation: message.scaled(89, 10.0, 0.0, 0.0)?,
            avg_stance_ratio: message.scaled(90, 10_000.0, 0.0, 0.0)?,
            avg_stance_time: message.scaled(91, 10.0, 0.0, 0.0)?,
        };
        Ok(())
    }

    fn on_event(&mut self, message: &Message, track: &mut GpsTrack) -> Result<(), ParseError> {
        let Some(timestamp) = message.timestamp else {
            return Ok(());
        };
        let kind = message.get(0, -1.0)?;
        let event_type = message.get(1, -1.0)?;

        if kind == event::TIMER {
            if event_type == event::TYPE_START {
                self.start_timestamp.get_or_insert(timestamp);
                if let Some(at) = self.stopped_at.take() {
                    self.stopped_duration += timestamp.saturating_sub(at) as f64;
                    self.resume_pending = true;
                }
            } else if [
                event::TYPE_STOP,
                event::TYPE_STOP_ALL,
                event::TYPE_STOP_DISABLE,
                event::TYPE_STOP_DISABLE_ALL,
            ]
            .contains(&event_type)
                && self.stopped_at.is_none()
            {
                self.stopped_at = Some(timestamp);
            }
        } else if kind == event::RECOVERY_HR {
            let heart_rate = message.get(3, 0.0)?;
            if heart_rate > 0.0 {
                track.summary.recovery_heart_rate = Some(heart_rate);
            }
        }
        Ok(())
    }
}

fn to_datetime(timestamp: u32) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(timestamp as i64 + FIT_EPOCH_OFFSET, 0)
}

fn semicircles_to_degrees(semicircles: f64) -> f64 {
    semicircles * (180.0 / 2_147_483_648.0)
}
