use chrono::{DateTime, Utc};

/// Largest paused span, in seconds, still treated as continuous recording.
pub const CONTINUITY_EPSILON: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub lat: f64,
    pub lon: f64,
}

/// One timestamped sample. Times are seconds relative to the track start;
/// `timer` excludes paused spans.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Point {
    pub time: f64,
    pub timer: f64,
    pub position: Option<Position>,
    /// Metres.
    pub altitude: f64,
    /// Cumulative metres.
    pub distance: f64,
    /// Metres per second.
    pub speed: f64,
    pub heart_rate: f64,
    pub cadence: f64,
    /// Millimetres.
    pub vertical_oscillation: f64,
    /// Milliseconds.
    pub stance_time: f64,
    /// Fraction of the stride spent on the ground.
    pub stance_ratio: f64,
    /// First sample after a recording break.
    pub segment_start: bool,
}

impl Point {
    pub fn at(time: f64) -> Self {
        Self {
            time,
            timer: time,
            ..Self::default()
        }
    }

    /// Whether the stretch from `prev` to `self` was recorded without a pause.
    pub fn continues_from(&self, prev: &Point) -> bool {
        let paused = (self.time - prev.time) - (self.timer - prev.timer);
        !self.segment_start && paused < CONTINUITY_EPSILON
    }

    /// Linear interpolation towards `next`; `f` is clamped to `0..=1`.
    pub fn interpolate(&self, next: &Point, f: f64) -> Point {
        let f = f.clamp(0.0, 1.0);
        let lerp = |a: f64, b: f64| a + (b - a) * f;
        let position = match (self.position, next.position) {
            (Some(a), Some(b)) => Some(Position {
                lat: lerp(a.lat, b.lat),
                lon: lerp(a.lon, b.lon),
            }),
            (a, b) => {
                if f < 0.5 {
                    a.or(b)
                } else {
                    b.or(a)
                }
            }
        };
        Point {
            time: lerp(self.time, next.time),
            timer: lerp(self.timer, next.timer),
            position,
            altitude: lerp(self.altitude, next.altitude),
            distance: lerp(self.distance, next.distance),
            speed: lerp(self.speed, next.speed),
            heart_rate: lerp(self.heart_rate, next.heart_rate),
            cadence: lerp(self.cadence, next.cadence),
            vertical_oscillation: lerp(self.vertical_oscillation, next.vertical_oscillation),
            stance_time: lerp(self.stance_time, next.stance_time),
            stance_ratio: lerp(self.stance_ratio, next.stance_ratio),
            segment_start: false,
        }
    }
}

/// Latitude/longitude bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl Region {
    pub fn around(position: Position) -> Self {
        Self {
            south: position.lat,
            west: position.lon,
            north: position.lat,
            east: position.lon,
        }
    }

    pub fn extend(&mut self, position: Position) {
        self.south = self.south.min(position.lat);
        self.north = self.north.max(position.lat);
        self.west = self.west.min(position.lon);
        self.east = self.east.max(position.lon);
    }

    pub fn union(&self, other: &Region) -> Region {
        Region {
            south: self.south.min(other.south),
            west: self.west.min(other.west),
            north: self.north.max(other.north),
            east: self.east.max(other.east),
        }
    }

    pub fn contains(&self, position: Position) -> bool {
        (self.south..=self.north).contains(&position.lat)
            && (self.west..=self.east).contains(&position.lon)
    }

    /// Bounding box of every positioned point, if any.
    pub fn of_points<'a>(points: impl IntoIterator<Item = &'a Point>) -> Option<Region> {
        points
            .into_iter()
            .filter_map(|p| p.position)
            .fold(None, |region: Option<Region>, position| match region {
                Some(mut r) => {
                    r.extend(position);
                    Some(r)
                }
                None => Some(Region::around(position)),
            })
    }
}

/// Which point channels carry real data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub has_location: bool,
    pub has_distance: bool,
    pub has_speed: bool,
    pub has_heart_rate: bool,
    pub has_cadence: bool,
    pub has_altitude: bool,
    pub has_dynamics: bool,
}

/// Totals and averages shared by laps and whole-track summaries. Zero means
/// not recorded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stats {
    /// Wall-clock seconds.
    pub elapsed_time: f64,
    /// Timer seconds, excluding pauses.
    pub duration: f64,
    pub distance: f64,
    pub ascent: f64,
    pub descent: f64,
    pub calories: f64,
    pub avg_speed: f64,
    pub max_speed: f64,
    pub avg_heart_rate: f64,
    pub max_heart_rate: f64,
    pub avg_cadence: f64,
    pub max_cadence: f64,
    pub avg_vertical_oscillation: f64,
    pub avg_stance_time: f64,
    pub avg_stance_ratio: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Lap {
    pub start_time: Option<DateTime<Utc>>,
    /// Seconds from the track start to the lap start.
    pub offset: f64,
    pub stats: Stats,
    pub region: Option<Region>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Summary {
    pub start_time: Option<DateTime<Utc>>,
    pub stats: Stats,
    pub training_effect: f64,
    pub recovery_heart_rate: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Sport {
    Running,
    Cycling,
    Swimming,
    #[default]
    Other,
}

impl Sport {
    pub fn from_fit(value: u64) -> Self {
        match value {
            1 => Sport::Running,
            2 => Sport::Cycling,
            5 => Sport::Swimming,
            _ => Sport::Other,
        }
    }

    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "running" | "run" => Sport::Running,
            "biking" | "cycling" | "ride" => Sport::Cycling,
            "swimming" | "swim" => Sport::Swimming,
            _ => Sport::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Sport::Running => "running",
            Sport::Cycling => "cycling",
            Sport::Swimming => "swimming",
            Sport::Other => "other",
        }
    }
}

/// A parsed device log: laps over one flat, chronological point sequence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GpsTrack {
    pub sport: Sport,
    pub device: Option<String>,
    pub summary: Summary,
    pub region: Option<Region>,
    pub capabilities: Capabilities,
    pub laps: Vec<Lap>,
    pub points: Vec<Point>,
}

impl GpsTrack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Points recorded during lap `index`: from its offset up to the next
    /// lap's offset.
    pub fn lap_points(&self, index: usize) -> &[Point] {
        let Some(lap) = self.laps.get(index) else {
            return &[];
        };
        let end = self
            .laps
            .get(index + 1)
            .map(|next| next.offset)
            .unwrap_or(f64::INFINITY);
        let first = self.points.partition_point(|p| p.time < lap.offset);
        let last = self.points.partition_point(|p| p.time < end);
        &self.points[first..last.max(first)]
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty() && self.laps.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Fit,
    Tcx,
    Gpx,
}

impl FileFormat {
    /// Format named by the extension preceding any compression suffix.
    pub fn from_filename(filename: &str) -> Option<Self> {
        let lower = filename.to_lowercase();
        let stem = [".gz", ".bz2", ".z"]
            .iter()
            .find_map(|suffix| lower.strip_suffix(suffix))
            .unwrap_or(&lower);
        let (_, ext) = stem.rsplit_once('.')?;
        match ext {
            "fit" => Some(FileFormat::Fit),
            "tcx" => Some(FileFormat::Tcx),
            "gpx" => Some(FileFormat::Gpx),
            _ => None,
        }
    }
}
