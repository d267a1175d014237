use runlog_rs::error::ParseError;
use runlog_rs::pipeline::parse::{self, Parser, TcxParser};
use runlog_rs::types::track::{FileFormat, GpsTrack, Sport};

fn sample_tcx() -> &'static str {
    r#"<?xml version="1.0" encoding="UTF-8"?>
<TrainingCenterDatabase xmlns="http://www.garmin.com/xmlschemas/TrainingCenterDatabase/v2"
    xmlns:ns3="http://www.garmin.com/xmlschemas/ActivityExtension/v2">
  <Activities>
    <Activity Sport="Running">
      <Id>2024-03-01T07:00:00Z</Id>
      <Lap StartTime="2024-03-01T07:00:00Z">
        <TotalTimeSeconds>20.0</TotalTimeSeconds>
        <DistanceMeters>60.0</DistanceMeters>
        <Calories>5</Calories>
        <AverageHeartRateBpm><Value>141</Value></AverageHeartRateBpm>
        <Notes><Value>ignored</Value></Notes>
        <Track>
          <Trackpoint>
            <Time>2024-03-01T07:00:00Z</Time>
            <Position>
              <LatitudeDegrees>45.5</LatitudeDegrees>
              <LongitudeDegrees>-122.5</LongitudeDegrees>
            </Position>
            <AltitudeMeters>100</AltitudeMeters>
            <DistanceMeters>0</DistanceMeters>
            <HeartRateBpm><Value>140</Value></HeartRateBpm>
            <Extensions><ns3:TPX><ns3:Speed>3.0</ns3:Speed><ns3:RunCadence>88</ns3:RunCadence></ns3:TPX></Extensions>
          </Trackpoint>
          <Trackpoint>
            <Time>2024-03-01T07:00:10Z</Time>
            <DistanceMeters>30</DistanceMeters>
            <HeartRateBpm><Value>142</Value></HeartRateBpm>
          </Trackpoint>
        </Track>
        <Track>
          <Trackpoint>
            <Time>2024-03-01T07:01:10Z</Time>
            <DistanceMeters>30</DistanceMeters>
          </Trackpoint>
          <Trackpoint>
            <Time>2024-03-01T07:01:20Z</Time>
            <DistanceMeters>60</DistanceMeters>
          </Trackpoint>
        </Track>
        <Extensions><ns3:LX><ns3:AvgRunCadence>87</ns3:AvgRunCadence></ns3:LX></Extensions>
      </Lap>
      <Creator><Name>Forerunner 255</Name></Creator>
    </Activity>
  </Activities>
</TrainingCenterDatabase>"#
}

#[test]
fn parses_laps_points_and_extensions() {
    let track = parse::parse(sample_tcx().as_bytes(), FileFormat::Tcx).expect("tcx parses");

    assert_eq!(track.sport, Sport::Running);
    assert_eq!(track.device.as_deref(), Some("Forerunner 255"));
    assert_eq!(track.laps.len(), 1);
    assert_eq!(track.points.len(), 4);

    let first = &track.points[0];
    assert_eq!(first.time, 0.0);
    assert_eq!(first.heart_rate, 140.0);
    assert_eq!(first.speed, 3.0);
    assert_eq!(first.cadence, 88.0);
    assert_eq!(first.altitude, 100.0);
    assert!((first.position.expect("position").lat - 45.5).abs() < 1e-9);

    let lap = &track.laps[0].stats;
    assert_eq!(lap.duration, 20.0);
    assert_eq!(lap.distance, 60.0);
    assert_eq!(lap.calories, 5.0);
    assert_eq!(lap.avg_heart_rate, 141.0);
    assert_eq!(lap.avg_cadence, 87.0);
    assert!(track.summary.start_time.is_some());
}

#[test]
fn second_track_starts_a_segment_and_pauses_the_timer() {
    let track = parse::parse(sample_tcx().as_bytes(), FileFormat::Tcx).expect("tcx parses");

    let third = &track.points[2];
    assert!(third.segment_start);
    assert_eq!(third.time, 70.0);
    assert_eq!(third.timer, 10.0);
    assert!(!third.continues_from(&track.points[1]));
    assert!(track.points[3].continues_from(third));
    assert_eq!(track.points[3].timer, 20.0);
}

#[test]
fn unknown_elements_are_ignored_with_their_children() {
    let xml = r#"<TrainingCenterDatabase xmlns="http://www.garmin.com/xmlschemas/TrainingCenterDatabase/v2">
  <Activities><Activity Sport="Biking"><Id>2024-03-01T07:00:00Z</Id>
    <Training><Trackpoint><Time>2024-03-01T07:00:00Z</Time></Trackpoint></Training>
    <Lap StartTime="2024-03-01T07:00:00Z"><Track>
      <Trackpoint><Time>2024-03-01T07:00:05Z</Time><Mystery><HeartRateBpm><Value>99</Value></HeartRateBpm></Mystery></Trackpoint>
    </Track></Lap>
  </Activity></Activities>
</TrainingCenterDatabase>"#;

    let track = parse::parse(xml.as_bytes(), FileFormat::Tcx).expect("tcx parses");

    assert_eq!(track.sport, Sport::Cycling);
    assert_eq!(track.points.len(), 1);
    assert_eq!(track.points[0].time, 5.0);
    assert_eq!(track.points[0].heart_rate, 0.0);
}

#[test]
fn malformed_xml_fails_after_partial_fill() {
    let xml = r#"<TrainingCenterDatabase xmlns="http://www.garmin.com/xmlschemas/TrainingCenterDatabase/v2">
  <Activities><Activity Sport="Running"><Lap StartTime="2024-03-01T07:00:00Z"><Track>
    <Trackpoint><Time>2024-03-01T07:00:00Z</Time></Trackpoint>
    <Trackpoint><Time>2024-03-01T07:00:01Z</Time></Position></Trackpoint>
  </Track></Lap></Activity></Activities>
</TrainingCenterDatabase>"#;

    let mut track = GpsTrack::new();
    let result = TcxParser::new().parse(xml.as_bytes(), &mut track);

    assert!(result.is_err());
    assert_eq!(track.points.len(), 1);
}

#[test]
fn unclosed_document_is_an_error() {
    let xml = r#"<TrainingCenterDatabase xmlns="http://www.garmin.com/xmlschemas/TrainingCenterDatabase/v2">
  <Activities><Activity Sport="Running">"#;
    assert!(parse::parse(xml.as_bytes(), FileFormat::Tcx).is_err());
}

#[test]
fn summary_averages_are_weighted_by_lap_duration() {
    let xml = r#"<TrainingCenterDatabase xmlns="http://www.garmin.com/xmlschemas/TrainingCenterDatabase/v2">
  <Activities><Activity Sport="Running"><Id>2024-03-01T07:00:00Z</Id>
    <Lap StartTime="2024-03-01T07:00:00Z">
      <TotalTimeSeconds>600</TotalTimeSeconds><DistanceMeters>2000</DistanceMeters>
      <AverageHeartRateBpm><Value>140</Value></AverageHeartRateBpm>
      <MaximumHeartRateBpm><Value>150</Value></MaximumHeartRateBpm>
      <Track><Trackpoint><Time>2024-03-01T07:00:00Z</Time></Trackpoint></Track>
    </Lap>
    <Lap StartTime="2024-03-01T07:10:00Z">
      <TotalTimeSeconds>1200</TotalTimeSeconds><DistanceMeters>3000</DistanceMeters>
      <AverageHeartRateBpm><Value>170</Value></AverageHeartRateBpm>
      <MaximumHeartRateBpm><Value>182</Value></MaximumHeartRateBpm>
      <Track><Trackpoint><Time>2024-03-01T07:10:00Z</Time></Trackpoint></Track>
    </Lap>
  </Activity></Activities>
</TrainingCenterDatabase>"#;

    let track = parse::parse(xml.as_bytes(), FileFormat::Tcx).expect("tcx parses");
    let summary = &track.summary.stats;

    assert_eq!(track.laps.len(), 2);
    assert_eq!(summary.duration, 1800.0);
    assert_eq!(summary.distance, 5000.0);
    // (600 * 140 + 1200 * 170) / 1800
    assert!((summary.avg_heart_rate - 160.0).abs() < 1e-9);
    assert_eq!(summary.max_heart_rate, 182.0);
    assert!((summary.avg_speed - 5000.0 / 1800.0).abs() < 1e-9);
}

#[test]
fn compressed_files_are_piped_through_the_decompressor() {
    let dir = tempfile::tempdir().expect("temp dir");
    let plain = dir.path().join("run.tcx");
    std::fs::write(&plain, sample_tcx()).expect("fixture");

    let status = std::process::Command::new("gzip")
        .arg(&plain)
        .status()
        .expect("gzip available");
    assert!(status.success());
    let gzipped = dir.path().join("run.tcx.gz");
    assert!(!plain.exists());

    let track = parse::read_track(&gzipped).expect("gzip input");
    assert_eq!(track.points.len(), 4);
    assert_eq!(track.device.as_deref(), Some("Forerunner 255"));

    // gzip also reads `.Z` names.
    let compressed = dir.path().join("other.tcx.Z");
    std::fs::copy(&gzipped, &compressed).expect("copy");
    let track = parse::read_track(&compressed).expect("compress input");
    assert_eq!(track.laps.len(), 1);

    let garbage = dir.path().join("broken.tcx.gz");
    std::fs::write(&garbage, b"not gzip data").expect("fixture");
    assert!(matches!(
        parse::read_track(&garbage),
        Err(ParseError::Decompress { .. })
    ));
}
