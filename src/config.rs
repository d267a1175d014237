use std::path::PathBuf;

use crate::units::UnitSystem;

#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding one record file per activity.
    pub activity_dir: PathBuf,
    /// Directories searched, in order, for relative `GPS-File` values.
    pub gps_search_path: Vec<PathBuf>,
    pub units: UnitSystem,
    /// Box-filter width, in 1-second samples, used for chart smoothing.
    pub smoothing_width: usize,
    pub recent_limit: usize,
}

impl Config {
    pub fn new(activity_dir: impl Into<PathBuf>) -> Self {
        Self {
            activity_dir: activity_dir.into(),
            gps_search_path: Vec::new(),
            units: UnitSystem::Metric,
            smoothing_width: 30,
            recent_limit: 10,
        }
    }

    pub fn from_env() -> Self {
        let activity_dir = std::env::var("RUNLOG_ACTIVITY_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("activities"));

        let gps_search_path = std::env::var_os("RUNLOG_GPS_PATH")
            .map(|paths| std::env::split_paths(&paths).collect())
            .unwrap_or_default();

        let units = std::env::var("RUNLOG_UNITS")
            .ok()
            .and_then(|s| UnitSystem::from_name(&s))
            .unwrap_or(UnitSystem::Metric);

        let smoothing_width = std::env::var("RUNLOG_SMOOTHING_WIDTH")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|width: &usize| *width > 0)
            .unwrap_or(30);

        let recent_limit = std::env::var("RUNLOG_RECENT_LIMIT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);

        Self {
            activity_dir,
            gps_search_path,
            units,
            smoothing_width,
            recent_limit,
        }
    }
}
