mod decompress;
mod fit;
mod gpx;
mod tcx;

use std::path::Path;

use crate::error::ParseError;
use crate::pipeline::process;
use crate::types::track::{FileFormat, GpsTrack};

pub use decompress::Compression;
pub use fit::FitParser;
pub use gpx::GpxParser;
pub use tcx::TcxParser;

/// Decodes one file format into a destination track.
///
/// On `Err` the track may already hold part of the file's data.
pub trait Parser {
    fn parse(&mut self, bytes: &[u8], track: &mut GpsTrack) -> Result<(), ParseError>;
}

/// Parse `bytes` and complete the resulting track (backfilled distance and
/// speed, lap-derived summary, bounding region).
pub fn parse(bytes: &[u8], format: FileFormat) -> Result<GpsTrack, ParseError> {
    let mut track = GpsTrack::new();
    match format {
        FileFormat::Fit => FitParser::new().parse(bytes, &mut track)?,
        FileFormat::Tcx => TcxParser::new().parse(bytes, &mut track)?,
        FileFormat::Gpx => GpxParser::new().parse(bytes, &mut track)?,
    }
    process::finalize(&mut track);
    Ok(track)
}

/// Load a GPS file, choosing the parser from its extension and piping
/// compressed files through the matching decompressor first.
pub fn read_track(path: &Path) -> Result<GpsTrack, ParseError> {
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let format = FileFormat::from_filename(&filename)
        .ok_or_else(|| ParseError::UnsupportedFormat(filename.clone()))?;

    let bytes = match Compression::from_filename(&filename) {
        Some(compression) => decompress::decompress(path, compression)?,
        None => std::fs::read(path).map_err(|source| ParseError::Io {
            path: path.to_path_buf(),
            source,
        })?,
    };

    tracing::debug!("Parsing {:?} file: {}", format, path.display());

    let track = parse(&bytes, format).map_err(|err| {
        tracing::warn!(path = %path.display(), error = %err, "GPS file rejected");
        err
    })?;

    tracing::debug!(
        "Parsed {} ({} points, {} laps, {:.2} km)",
        path.display(),
        track.points.len(),
        track.laps.len(),
        track.summary.stats.distance / 1000.0
    );

    Ok(track)
}
