use runlog_rs::pipeline::parse::{self, FitParser, Parser};
use runlog_rs::types::track::{FileFormat, GpsTrack, Sport};

const UINT8: u8 = 0x02;
const ENUM: u8 = 0x00;
const UINT16: u8 = 0x84;
const SINT32: u8 = 0x85;
const UINT32: u8 = 0x86;
const FLOAT32: u8 = 0x88;

/// FIT timestamp whose low five bits are zero.
const T: u32 = 1_000_000_000;

/// Builds FIT files message by message.
struct FitWriter {
    data: Vec<u8>,
}

impl FitWriter {
    fn new() -> Self {
        Self { data: Vec::new() }
    }

    fn definition(&mut self, local: u8, global: u16, fields: &[(u8, u8, u8)]) -> &mut Self {
        self.data.push(0x40 | (local & 0x0F));
        self.data.push(0); // reserved
        self.data.push(0); // little endian
        self.data.extend_from_slice(&global.to_le_bytes());
        self.data.push(fields.len() as u8);
        for (number, size, base_type) in fields {
            self.data.extend_from_slice(&[*number, *size, *base_type]);
        }
        self
    }

    fn data(&mut self, local: u8, bytes: &[u8]) -> &mut Self {
        self.data.push(local & 0x0F);
        self.data.extend_from_slice(bytes);
        self
    }

    fn compressed(&mut self, local: u8, timestamp: u32, bytes: &[u8]) -> &mut Self {
        self.data
            .push(0x80 | ((local & 0x03) << 5) | (timestamp & 0x1F) as u8);
        self.data.extend_from_slice(bytes);
        self
    }

    fn finish(&self) -> Vec<u8> {
        let mut out = vec![14, 0x10];
        out.extend_from_slice(&2132u16.to_le_bytes());
        out.extend_from_slice(&(self.data.len() as u32).to_le_bytes());
        out.extend_from_slice(b".FIT");
        out.extend_from_slice(&[0, 0]); // header crc, not checked
        out.extend_from_slice(&self.data);
        out.extend_from_slice(&[0, 0]); // file crc, not checked
        out
    }
}

fn bytes(parts: &[&[u8]]) -> Vec<u8> {
    parts.concat()
}

fn semicircles(degrees: f64) -> i32 {
    (degrees * 2_147_483_648.0 / 180.0) as i32
}

const RECORD_FIELDS: &[(u8, u8, u8)] = &[
    (253, 4, UINT32),
    (0, 4, SINT32),
    (1, 4, SINT32),
    (5, 4, UINT32),
    (3, 1, UINT8),
];

fn record(timestamp: u32, lat: f64, distance_m: f64, hr: u8) -> Vec<u8> {
    bytes(&[
        &timestamp.to_le_bytes(),
        &semicircles(lat).to_le_bytes(),
        &semicircles(8.0).to_le_bytes(),
        &((distance_m * 100.0) as u32).to_le_bytes(),
        &[hr],
    ])
}

fn parse_fit(data: &[u8]) -> GpsTrack {
    parse::parse(data, FileFormat::Fit).expect("fit parses")
}

#[test]
fn local_type_redefinition_uses_latest_layout() {
    let mut w = FitWriter::new();
    w.definition(0, 20, RECORD_FIELDS)
        .data(0, &record(T, 47.0, 0.0, 120))
        .data(0, &record(T + 1, 47.0001, 3.0, 0xFF))
        .data(0, &record(T + 2, 47.0002, 6.0, 130))
        .definition(
            0,
            19,
            &[(253, 4, UINT32), (2, 4, UINT32), (8, 4, UINT32), (9, 4, UINT32)],
        )
        .data(
            0,
            &bytes(&[
                &(T + 2).to_le_bytes(),
                &T.to_le_bytes(),
                &2000u32.to_le_bytes(),
                &600u32.to_le_bytes(),
            ]),
        );

    let track = parse_fit(&w.finish());

    assert_eq!(track.points.len(), 3);
    assert_eq!(track.laps.len(), 1);
    assert_eq!(track.laps[0].offset, 0.0);
    assert!((track.laps[0].stats.duration - 2.0).abs() < 1e-9);
    assert!((track.laps[0].stats.distance - 6.0).abs() < 1e-9);
    assert!((track.points[2].distance - 6.0).abs() < 1e-9);
    assert!((track.points[0].position.expect("position").lat - 47.0).abs() < 1e-6);
    assert!(track.capabilities.has_location);
}

#[test]
fn sentinel_heart_rate_decodes_to_default() {
    let mut w = FitWriter::new();
    w.definition(0, 20, RECORD_FIELDS)
        .data(0, &record(T, 47.0, 0.0, 120))
        .data(0, &record(T + 1, 47.0, 1.0, 0xFF));

    let track = parse_fit(&w.finish());

    assert_eq!(track.points[0].heart_rate, 120.0);
    assert_eq!(track.points[1].heart_rate, 0.0);
}

#[test]
fn compressed_timestamps_advance_from_last_absolute_time() {
    let mut w = FitWriter::new();
    w.definition(0, 20, RECORD_FIELDS)
        .definition(1, 20, &[(3, 1, UINT8)])
        .data(0, &record(T + 30, 47.0, 0.0, 100))
        .compressed(1, T + 31, &[101])
        .compressed(1, T + 33, &[102])
        .compressed(1, T + 40, &[103]);

    let track = parse_fit(&w.finish());

    let times: Vec<f64> = track.points.iter().map(|p| p.time).collect();
    assert_eq!(times, vec![0.0, 1.0, 3.0, 10.0]);
    assert_eq!(track.points[3].heart_rate, 103.0);
}

#[test]
fn timer_stop_and_start_events_pause_the_timer() {
    let event_fields = &[(253, 4, UINT32), (0, 1, ENUM), (1, 1, ENUM)];
    let event = |timestamp: u32, event_type: u8| bytes(&[&timestamp.to_le_bytes(), &[0, event_type]]);

    let mut w = FitWriter::new();
    w.definition(0, 20, RECORD_FIELDS)
        .definition(1, 21, event_fields)
        .data(1, &event(T, 0))
        .data(0, &record(T, 47.0, 0.0, 120))
        .data(0, &record(T + 1, 47.0, 3.0, 120))
        .data(1, &event(T + 1, 1))
        .data(1, &event(T + 11, 0))
        .data(0, &record(T + 11, 47.0, 4.0, 120))
        .data(0, &record(T + 12, 47.0, 7.0, 120));

    let track = parse_fit(&w.finish());

    assert_eq!(track.points.len(), 4);
    assert_eq!(track.points[2].time, 11.0);
    assert_eq!(track.points[2].timer, 1.0);
    assert!(track.points[2].segment_start);
    assert!(!track.points[2].continues_from(&track.points[1]));
    assert!(track.points[3].continues_from(&track.points[2]));
    assert!((track.summary.stats.duration - 2.0).abs() < 1e-9);
    assert!((track.summary.stats.elapsed_time - 12.0).abs() < 1e-9);
}

#[test]
fn unknown_messages_are_skipped_and_session_sets_sport() {
    let mut w = FitWriter::new();
    w.definition(2, 49, &[(0, 2, UINT16), (1, 1, UINT8)])
        .data(2, &[0x10, 0x27, 5])
        .definition(0, 0, &[(1, 2, UINT16), (2, 2, UINT16), (3, 4, UINT32)])
        .data(0, &bytes(&[&1u16.to_le_bytes(), &2697u16.to_le_bytes(), &3_900_001u32.to_le_bytes()]))
        .definition(0, 20, RECORD_FIELDS)
        .data(0, &record(T, 47.0, 0.0, 120))
        .data(0, &record(T + 4, 47.0, 12.0, 140))
        .definition(1, 18, &[(253, 4, UINT32), (2, 4, UINT32), (5, 1, ENUM), (24, 1, UINT8)])
        .data(1, &bytes(&[&(T + 4).to_le_bytes(), &T.to_le_bytes(), &[1, 32]]));

    let track = parse_fit(&w.finish());

    assert_eq!(track.sport, Sport::Running);
    assert_eq!(track.device.as_deref(), Some("3900001"));
    assert!((track.summary.training_effect - 3.2).abs() < 1e-9);
    assert_eq!(track.points.len(), 2);
    assert!((track.summary.stats.distance - 12.0).abs() < 1e-9);
    assert!(track.summary.start_time.is_some());
}

#[test]
fn unsupported_base_type_fails_but_keeps_earlier_points() {
    let mut w = FitWriter::new();
    w.definition(0, 20, RECORD_FIELDS)
        .data(0, &record(T, 47.0, 0.0, 120))
        .definition(1, 20, &[(253, 4, UINT32), (2, 4, FLOAT32)])
        .data(1, &bytes(&[&(T + 1).to_le_bytes(), &1.5f32.to_le_bytes()]))
        .data(0, &record(T + 2, 47.0, 6.0, 120));

    let mut track = GpsTrack::new();
    let result = FitParser::new().parse(&w.finish(), &mut track);

    assert!(result.is_err());
    assert_eq!(track.points.len(), 2);
}

#[test]
fn rejects_bad_signature_and_truncation() {
    let mut w = FitWriter::new();
    w.definition(0, 20, RECORD_FIELDS).data(0, &record(T, 47.0, 0.0, 120));
    let good = w.finish();

    let mut bad_magic = good.clone();
    bad_magic[8] = b'X';
    assert!(parse::parse(&bad_magic, FileFormat::Fit).is_err());

    // Drops the file crc and the tail of the last record.
    let truncated = &good[..good.len() - 5];
    assert!(parse::parse(truncated, FileFormat::Fit).is_err());

    assert!(parse::parse(&[14, 0x10], FileFormat::Fit).is_err());
}

#[test]
fn data_for_undefined_local_type_is_an_error() {
    let mut w = FitWriter::new();
    w.data(3, &[1, 2, 3]);
    assert!(parse::parse(&w.finish(), FileFormat::Fit).is_err());
}
