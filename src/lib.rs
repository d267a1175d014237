pub mod activity;
pub mod config;
pub mod database;
pub mod error;
pub mod fields;
pub mod pipeline;
pub mod record;
pub mod types;
pub mod units;

pub use activity::Activity;
pub use config::Config;
pub use database::{Database, Query, Term};
pub use error::Error;
pub use record::Record;
pub use types::track::GpsTrack;
