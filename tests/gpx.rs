use runlog_rs::error::ParseError;
use runlog_rs::pipeline::parse;
use runlog_rs::types::track::FileFormat;

fn sample_gpx() -> &'static str {
    r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test">
  <trk><name>Test Run</name>
  <trkseg>
    <trkpt lat="52.5200" lon="13.4050"><ele>34.0</ele><time>2026-01-01T12:00:00Z</time><extensions><gpxtpx:hr>140</gpxtpx:hr></extensions></trkpt>
    <trkpt lat="52.5205" lon="13.4060"><ele>39.0</ele><time>2026-01-01T12:00:10Z</time><extensions><gpxtpx:hr>145</gpxtpx:hr></extensions></trkpt>
  </trkseg>
  <trkseg>
    <trkpt lat="52.5210" lon="13.4070"><ele>40.0</ele><time>2026-01-01T12:05:10Z</time></trkpt>
    <trkpt lat="52.5215" lon="13.4080"><ele>41.0</ele><time>2026-01-01T12:05:20Z</time></trkpt>
  </trkseg>
  </trk>
</gpx>"#
}

#[test]
fn gpx_points_get_distance_and_speed_backfilled() {
    let track = parse::parse(sample_gpx().as_bytes(), FileFormat::Gpx).expect("gpx parses");

    assert_eq!(track.points.len(), 4);
    assert_eq!(track.points[1].heart_rate, 145.0);
    assert!(track.capabilities.has_location);
    assert!(track.capabilities.has_distance);
    assert!(track.capabilities.has_speed);
    assert!(track.points[1].distance > 50.0 && track.points[1].distance < 100.0);
    assert!(track.points[1].speed > 0.0);
    assert!(track.region.is_some());
}

#[test]
fn new_segment_is_a_recording_break() {
    let track = parse::parse(sample_gpx().as_bytes(), FileFormat::Gpx).expect("gpx parses");

    let third = &track.points[2];
    assert!(third.segment_start);
    assert_eq!(third.time, 310.0);
    assert_eq!(third.timer, 10.0);
    // No distance accrues across the break.
    assert_eq!(third.distance, track.points[1].distance);
    assert_eq!(third.speed, 0.0);
    assert_eq!(track.laps.len(), 1);
    assert!((track.summary.stats.duration - 20.0).abs() < 1e-9);
}

#[test]
fn file_format_follows_extension_under_compression_suffix() {
    assert_eq!(FileFormat::from_filename("run.tcx.gz"), Some(FileFormat::Tcx));
    assert_eq!(FileFormat::from_filename("RUN.FIT"), Some(FileFormat::Fit));
    assert_eq!(FileFormat::from_filename("run.tcx.Z"), Some(FileFormat::Tcx));
    assert_eq!(FileFormat::from_filename("run.gpx.bz2"), Some(FileFormat::Gpx));
    assert_eq!(FileFormat::from_filename("notes.txt"), None);
    assert_eq!(FileFormat::from_filename("gpx"), None);
}

#[test]
fn read_track_reports_missing_and_unknown_files() {
    let dir = tempfile::tempdir().expect("temp dir");

    let missing = parse::read_track(&dir.path().join("missing.gpx"));
    assert!(matches!(missing, Err(ParseError::Io { .. })));

    let compressed = parse::read_track(&dir.path().join("missing.tcx.gz"));
    assert!(matches!(compressed, Err(ParseError::Decompress { .. })));

    let unknown = parse::read_track(&dir.path().join("notes.txt"));
    assert!(matches!(unknown, Err(ParseError::UnsupportedFormat(_))));
}

#[test]
fn read_track_parses_plain_files_from_disk() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("run.gpx");
    std::fs::write(&path, sample_gpx()).expect("fixture");

    let track = parse::read_track(&path).expect("reads");
    assert_eq!(track.points.len(), 4);
}
