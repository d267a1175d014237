use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};

use crate::error::ParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Gzip,
    Bzip2,
    /// Unix `compress` (`.Z`), which gzip also reads.
    Compress,
}

impl Compression {
    pub fn from_filename(filename: &str) -> Option<Self> {
        if filename.ends_with(".Z") {
            return Some(Compression::Compress);
        }
        let lower = filename.to_lowercase();
        if lower.ends_with(".gz") {
            Some(Compression::Gzip)
        } else if lower.ends_with(".bz2") {
            Some(Compression::Bzip2)
        } else {
            None
        }
    }

    fn command(self) -> (&'static str, &'static [&'static str]) {
        match self {
            Compression::Gzip | Compression::Compress => ("gzip", &["-dc"]),
            Compression::Bzip2 => ("bzip2", &["-dc"]),
        }
    }
}

/// Run the external decompressor over `path`, reading its output to the end
/// before reaping it.
pub(super) fn decompress(path: &Path, compression: Compression) -> Result<Vec<u8>, ParseError> {
    let (program, args) = compression.command();
    let failed = |reason: String| ParseError::Decompress {
        path: path.to_path_buf(),
        reason,
    };

    let mut child = Command::new(program)
        .args(args)
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| failed(format!("cannot run {}: {}", program, e)))?;

    let mut output = Vec::new();
    let read = match child.stdout.take() {
        Some(mut stdout) => stdout.read_to_end(&mut output).map(|_| ()),
        None => Err(std::io::Error::other("no output pipe")),
    };
    let status = child
        .wait()
        .map_err(|e| failed(format!("cannot wait for {}: {}", program, e)))?;

    read.map_err(|e| failed(format!("reading {} output: {}", program, e)))?;
    if !status.success() {
        tracing::warn!(path = %path.display(), %status, "Decompressor failed");
        return Err(failed(format!("{} exited with {}", program, status)));
    }
    if output.is_empty() {
        return Err(failed(format!("{} produced no output", program)));
    }
    Ok(output)
}
