use crate::types::track::{GpsTrack, Lap, Point, Region, Stats};

/// Time deltas at or below this many seconds are too small to derive a speed.
const TIME_EPSILON: f64 = 1e-3;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Complete a freshly parsed track: fill capability flags, backfill distance
/// and speed, fill lap values the file did not record, then recompute the
/// summary and bounding region from the laps.
pub fn finalize(track: &mut GpsTrack) {
    detect_capabilities(track);
    backfill_distance(track);
    backfill_speed(track);

    if track.laps.is_empty() && !track.points.is_empty() {
        track.laps.push(Lap {
            start_time: track.summary.start_time,
            offset: track.points[0].time,
            ..Lap::default()
        });
    }

    let has_altitude = track.capabilities.has_altitude;
    for index in 0..track.laps.len() {
        let (first, last) = lap_range(track, index);
        if first >= last {
            continue;
        }
        let baseline = if first > 0 { first - 1 } else { first };
        let points = &track.points[baseline..last];
        let own = &track.points[first..last];
        let lap = &mut track.laps[index];
        lap.region = Region::of_points(own);
        fill_lap(&mut lap.stats, points, own, has_altitude);
    }

    summarize_laps(track);

    track.region = track
        .laps
        .iter()
        .filter_map(|lap| lap.region)
        .reduce(|a, b| a.union(&b))
        .or_else(|| Region::of_points(&track.points));

    if track.summary.start_time.is_none() {
        track.summary.start_time = track.laps.first().and_then(|lap| lap.start_time);
    }
}

fn lap_range(track: &GpsTrack, index: usize) -> (usize, usize) {
    let offset = track.laps[index].offset;
    let end = track
        .laps
        .get(index + 1)
        .map(|next| next.offset)
        .unwrap_or(f64::INFINITY);
    let first = track.points.partition_point(|p| p.time < offset);
    let last = track.points.partition_point(|p| p.time < end);
    (first, last)
}

fn detect_capabilities(track: &mut GpsTrack) {
    let points = &track.points;
    let caps = &mut track.capabilities;
    caps.has_location |= points.iter().any(|p| p.position.is_some());
    caps.has_distance |= points.iter().any(|p| p.distance > 0.0);
    caps.has_speed |= points.iter().any(|p| p.speed > 0.0);
    caps.has_heart_rate |= points.iter().any(|p| p.heart_rate > 0.0);
    caps.has_cadence |= points.iter().any(|p| p.cadence > 0.0);
    caps.has_altitude |= points.iter().any(|p| p.altitude != 0.0);
    caps.has_dynamics |= points
        .iter()
        .any(|p| p.vertical_oscillation > 0.0 || p.stance_time > 0.0);
}

/// Cumulative distance from great-circle deltas between continuous points.
fn backfill_distance(track: &mut GpsTrack) {
    if !track.capabilities.has_location || track.capabilities.has_distance {
        return;
    }
    let mut total = 0.0;
    let mut prev: Option<Point> = None;
    for point in track.points.iter_mut() {
        if let Some(prev) = &prev {
            if point.continues_from(prev) {
                if let (Some(a), Some(b)) = (prev.position, point.position) {
                    total += haversine_distance(a.lat, a.lon, b.lat, b.lon);
                }
            }
        }
        point.distance = total;
        prev = Some(point.clone());
    }
    track.capabilities.has_distance = true;
}

/// Speed from distance over elapsed time, reusing the previous speed when
/// the time delta is negligible.
fn backfill_speed(track: &mut GpsTrack) {
    if !track.capabilities.has_distance || track.capabilities.has_speed {
        return;
    }
    let mut prev_speed = 0.0;
    for i in 0..track.points.len() {
        let speed = if i == 0 {
            0.0
        } else {
            let (a, b) = (&track.points[i - 1], &track.points[i]);
            if !b.continues_from(a) {
                0.0
            } else {
                let dt = b.time - a.time;
                if dt > TIME_EPSILON {
                    ((b.distance - a.distance) / dt).max(0.0)
                } else {
                    prev_speed
                }
            }
        };
        track.points[i].speed = speed;
        prev_speed = speed;
    }
    track.capabilities.has_speed = true;
}

/// `points` starts with the last point of the previous lap (when there is
/// one) so deltas span the lap boundary; `own` holds only this lap's points.
fn fill_lap(stats: &mut Stats, points: &[Point], own: &[Point], has_altitude: bool) {
    let (Some(first), Some(last)) = (points.first(), points.last()) else {
        return;
    };

    if stats.elapsed_time <= 0.0 {
        stats.elapsed_time = last.time - first.time;
    }
    if stats.duration <= 0.0 {
        stats.duration = last.timer - first.timer;
    }
    if stats.distance <= 0.0 {
        stats.distance = (last.distance - first.distance).max(0.0);
    }

    if has_altitude && stats.ascent <= 0.0 && stats.descent <= 0.0 {
        for pair in points.windows(2) {
            if !pair[1].continues_from(&pair[0]) {
                continue;
            }
            let climb = pair[1].altitude - pair[0].altitude;
            if climb > 0.0 {
                stats.ascent += climb;
            } else {
                stats.descent -= climb;
            }
        }
    }

    if stats.max_speed <= 0.0 {
        stats.max_speed = own.iter().map(|p| p.speed).fold(0.0, f64::max);
    }
    if stats.avg_speed <= 0.0 && stats.duration > 0.0 {
        stats.avg_speed = stats.distance / stats.duration;
    }
    if stats.avg_heart_rate <= 0.0 {
        stats.avg_heart_rate = mean_of(own, |p| p.heart_rate);
    }
    if stats.max_heart_rate <= 0.0 {
        stats.max_heart_rate = own.iter().map(|p| p.heart_rate).fold(0.0, f64::max);
    }
    if stats.avg_cadence <= 0.0 {
        stats.avg_cadence = mean_of(own, |p| p.cadence);
    }
    if stats.max_cadence <= 0.0 {
        stats.max_cadence = own.iter().map(|p| p.cadence).fold(0.0, f64::max);
    }
    if stats.avg_vertical_oscillation <= 0.0 {
        stats.avg_vertical_oscillation = mean_of(own, |p| p.vertical_oscillation);
    }
    if stats.avg_stance_time <= 0.0 {
        stats.avg_stance_time = mean_of(own, |p| p.stance_time);
    }
    if stats.avg_stance_ratio <= 0.0 {
        stats.avg_stance_ratio = mean_of(own, |p| p.stance_ratio);
    }
}

/// Mean over points where the channel was recorded (non-zero).
fn mean_of(points: &[Point], value: impl Fn(&Point) -> f64) -> f64 {
    let (sum, count) = points
        .iter()
        .map(value)
        .filter(|v| *v > 0.0)
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Recompute the track summary from its laps: totals are summed, maxima
/// maximised, averages weighted by lap duration. Values no lap recorded keep
/// whatever the file's own summary said.
pub fn summarize_laps(track: &mut GpsTrack) {
    if track.laps.is_empty() {
        return;
    }
    let laps: Vec<&Stats> = track.laps.iter().map(|lap| &lap.stats).collect();
    let stats = &mut track.summary.stats;

    let sum = |value: fn(&Stats) -> f64| laps.iter().map(|s| value(s)).sum::<f64>();
    let max = |value: fn(&Stats) -> f64| laps.iter().map(|s| value(s)).fold(0.0, f64::max);
    let weighted = |value: fn(&Stats) -> f64| {
        let (total, weight) = laps
            .iter()
            .filter(|s| value(s) > 0.0)
            .fold((0.0, 0.0), |(total, weight), s| {
                let w = if s.duration > 0.0 { s.duration } else { 1.0 };
                (total + value(s) * w, weight + w)
            });
        if weight > 0.0 {
            total / weight
        } else {
            0.0
        }
    };

    let keep = |current: &mut f64, derived: f64| {
        if derived > 0.0 {
            *current = derived;
        }
    };

    keep(&mut stats.elapsed_time, sum(|s| s.elapsed_time));
    keep(&mut stats.duration, sum(|s| s.duration));
    keep(&mut stats.distance, sum(|s| s.distance));
    keep(&mut stats.ascent, sum(|s| s.ascent));
    keep(&mut stats.descent, sum(|s| s.descent));
    keep(&mut stats.calories, sum(|s| s.calories));
    keep(&mut stats.max_speed, max(|s| s.max_speed));
    keep(&mut stats.max_heart_rate, max(|s| s.max_heart_rate));
    keep(&mut stats.max_cadence, max(|s| s.max_cadence));
    keep(&mut stats.avg_heart_rate, weighted(|s| s.avg_heart_rate));
    keep(&mut stats.avg_cadence, weighted(|s| s.avg_cadence));
    keep(&mut stats.avg_vertical_oscillation, weighted(|s| s.avg_vertical_oscillation));
    keep(&mut stats.avg_stance_time, weighted(|s| s.avg_stance_time));
    keep(&mut stats.avg_stance_ratio, weighted(|s| s.avg_stance_ratio));

    if stats.duration > 0.0 && stats.distance > 0.0 {
        stats.avg_speed = stats.distance / stats.duration;
    } else {
        keep(&mut stats.avg_speed, weighted(|s| s.avg_speed));
    }
}

/// Great-circle distance in metres.
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);

    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}
