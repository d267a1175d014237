use runlog_rs::config::Config;
use runlog_rs::database::{Database, Query};
use runlog_rs::units::{self, ValueKind};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// One line of output per listed activity.
#[derive(Serialize)]
struct ActivityLine {
    date: Option<String>,
    distance: Option<String>,
    duration: Option<String>,
    pace: Option<String>,
    avg_hr: Option<String>,
    keywords: Vec<String>,
    gps_file: Option<String>,
}

fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "runlog_rs=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::from_env();
    tracing::info!(
        "Opening activity log at {} ({} units)",
        config.activity_dir.display(),
        config.units
    );

    let db = match Database::open(config) {
        Ok(db) => db,
        Err(err) => {
            tracing::error!("Failed to open activity log: {}", err);
            std::process::exit(1);
        }
    };

    let query = Query::new().with_max_count(db.config().recent_limit);
    let units = db.config().units;
    for activity in db.execute_query(&query) {
        let line = ActivityLine {
            date: activity.date().map(|date| units::format_date(&date)),
            distance: activity.distance().map(|v| units.format(ValueKind::Distance, v)),
            duration: activity.duration().map(|v| units.format(ValueKind::Duration, v)),
            pace: activity.speed().map(|v| units.format(ValueKind::Pace, v)),
            avg_hr: activity.avg_heart_rate().map(|v| units.format(ValueKind::HeartRate, v)),
            keywords: activity.keywords(),
            gps_file: activity.gps_file().map(str::to_string),
        };
        match serde_json::to_string(&line) {
            Ok(json) => println!("{}", json),
            Err(err) => tracing::warn!("Failed to encode activity: {}", err),
        }
    }
}
