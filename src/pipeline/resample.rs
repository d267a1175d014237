//! Pull-based point stream transforms used to smooth noisy device samples.

use std::collections::VecDeque;

use crate::types::track::{GpsTrack, Point};

/// Spacing, in seconds, of the fine grid used before box averaging.
pub const FINE_INTERVAL: f64 = 1.0;
/// Spacing, in seconds, of the chart-ready output.
pub const COARSE_INTERVAL: f64 = 5.0;

/// Cursor over a track's flat point sequence.
pub struct InputStream<'a> {
    points: std::slice::Iter<'a, Point>,
}

impl<'a> InputStream<'a> {
    pub fn new(track: &'a GpsTrack) -> Self {
        Self::from_points(&track.points)
    }

    pub fn from_points(points: &'a [Point]) -> Self {
        Self {
            points: points.iter(),
        }
    }
}

impl Iterator for InputStream<'_> {
    type Item = Point;

    fn next(&mut self) -> Option<Point> {
        self.points.next().cloned()
    }
}

/// Evenly spaced points, linearly interpolated between the two source points
/// bracketing each grid time.
///
/// The first source point is emitted unchanged and anchors the grid. When a
/// source point does not continue from its predecessor the stream emits it
/// unchanged and re-anchors the grid on it. The stream ends on the last
/// source point, emitted as-is when it falls between grid times.
pub struct Resampler<I> {
    source: I,
    interval: f64,
    prev: Option<Point>,
    upper: Option<Point>,
    grid: f64,
    /// Time of the last point handed out.
    emitted: f64,
}

impl<I: Iterator<Item = Point>> Resampler<I> {
    pub fn new(source: I, interval: f64) -> Self {
        Self {
            source,
            interval: interval.max(f64::EPSILON),
            prev: None,
            upper: None,
            grid: 0.0,
            emitted: f64::NEG_INFINITY,
        }
    }

    fn anchor(&mut self, point: Point) -> Point {
        self.grid = point.time + self.interval;
        self.emitted = point.time;
        self.prev = Some(point.clone());
        point
    }
}

impl<I: Iterator<Item = Point>> Iterator for Resampler<I> {
    type Item = Point;

    fn next(&mut self) -> Option<Point> {
        let Some(prev) = self.prev.clone() else {
            let first = self.source.next()?;
            return Some(self.anchor(first));
        };

        let mut prev = prev;
        loop {
            let upper = match self.upper.take().or_else(|| self.source.next()) {
                Some(point) => point,
                None if prev.time > self.emitted => {
                    self.emitted = prev.time;
                    return Some(prev);
                }
                None => return None,
            };

            if !upper.continues_from(&prev) {
                self.upper = None;
                return Some(self.anchor(upper));
            }

            if upper.time < self.grid {
                prev = upper;
                self.prev = Some(prev.clone());
                continue;
            }

            let span = upper.time - prev.time;
            let f = if span > 0.0 {
                (self.grid - prev.time) / span
            } else {
                1.0
            };
            let mut sample = prev.interpolate(&upper, f);
            sample.time = self.grid.min(upper.time);
            self.emitted = sample.time;
            self.grid += self.interval;
            self.upper = Some(upper);
            return Some(sample);
        }
    }
}

#[derive(Default)]
struct Sums {
    altitude: f64,
    speed: f64,
    heart_rate: f64,
    cadence: f64,
    vertical_oscillation: f64,
    stance_time: f64,
    stance_ratio: f64,
}

impl Sums {
    fn apply(&mut self, point: &Point, sign: f64) {
        self.altitude += sign * point.altitude;
        self.speed += sign * point.speed;
        self.heart_rate += sign * point.heart_rate;
        self.cadence += sign * point.cadence;
        self.vertical_oscillation += sign * point.vertical_oscillation;
        self.stance_time += sign * point.stance_time;
        self.stance_ratio += sign * point.stance_ratio;
    }
}

/// Moving average over the last `width` points. Clock, distance, position
/// and segment flags come from the newest sample unaveraged.
pub struct BoxFilter<I> {
    source: I,
    width: usize,
    window: VecDeque<Point>,
    sums: Sums,
}

impl<I: Iterator<Item = Point>> BoxFilter<I> {
    pub fn new(source: I, width: usize) -> Self {
        let width = width.max(1);
        Self {
            source,
            width,
            window: VecDeque::with_capacity(width + 1),
            sums: Sums::default(),
        }
    }
}

impl<I: Iterator<Item = Point>> Iterator for BoxFilter<I> {
    type Item = Point;

    fn next(&mut self) -> Option<Point> {
        let point = self.source.next()?;
        self.sums.apply(&point, 1.0);
        self.window.push_back(point.clone());
        if self.window.len() > self.width {
            if let Some(old) = self.window.pop_front() {
                self.sums.apply(&old, -1.0);
            }
        }

        let n = self.window.len() as f64;
        Some(Point {
            altitude: self.sums.altitude / n,
            speed: self.sums.speed / n,
            heart_rate: self.sums.heart_rate / n,
            cadence: self.sums.cadence / n,
            vertical_oscillation: self.sums.vertical_oscillation / n,
            stance_time: self.sums.stance_time / n,
            stance_ratio: self.sums.stance_ratio / n,
            ..point
        })
    }
}

pub trait PointStreamExt: Iterator<Item = Point> + Sized {
    fn resample(self, interval: f64) -> Resampler<Self> {
        Resampler::new(self, interval)
    }

    fn box_filter(self, width: usize) -> BoxFilter<Self> {
        BoxFilter::new(self, width)
    }
}

impl<I: Iterator<Item = Point>> PointStreamExt for I {}

/// Chart-ready copy of `source`: resampled to one second, box-averaged over
/// `width` samples, then resampled to five seconds. Summary, laps and
/// metadata are copied unchanged.
pub fn smooth(source: &GpsTrack, width: usize) -> GpsTrack {
    let points: Vec<Point> = InputStream::new(source)
        .resample(FINE_INTERVAL)
        .box_filter(width)
        .resample(COARSE_INTERVAL)
        .collect();

    tracing::debug!(
        "Smoothed {} points into {} (width {})",
        source.points.len(),
        points.len(),
        width
    );

    GpsTrack {
        sport: source.sport,
        device: source.device.clone(),
        summary: source.summary.clone(),
        region: source.region,
        capabilities: source.capabilities,
        laps: source.laps.clone(),
        points,
    }
}
