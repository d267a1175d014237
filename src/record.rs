//! One activity on disk: `Name: value` header lines, a blank line, then a
//! free-text body.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::RecordError;
use crate::fields;

#[derive(Debug, Clone, Default)]
pub struct Record {
    fields: Vec<(String, String)>,
    body: String,
    path: Option<PathBuf>,
    seed: u64,
    path_seed: u64,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, RecordError> {
        let mut record = Self::new();
        record.read(path)?;
        Ok(record)
    }

    /// Replace this record's contents with the file at `path`. On failure
    /// the record is left untouched.
    pub fn read(&mut self, path: impl AsRef<Path>) -> Result<(), RecordError> {
        let path = path.as_ref();
        let content = std::fs::read(path).map_err(|source| RecordError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let content = String::from_utf8_lossy(&content);
        let (fields, body) = parse(&content);

        self.fields = fields;
        self.body = body;
        self.path = Some(path.to_path_buf());
        self.bump();
        self.path_seed = self.seed;
        Ok(())
    }

    pub fn write(&mut self, path: impl AsRef<Path>) -> Result<(), RecordError> {
        let path = path.as_ref();
        let write_err = |source| RecordError::Write {
            path: path.to_path_buf(),
            source,
        };
        let file = File::create(path).map_err(write_err)?;
        let mut out = BufWriter::new(file);
        out.write_all(self.serialize().as_bytes()).map_err(write_err)?;
        out.flush().map_err(write_err)?;

        self.path = Some(path.to_path_buf());
        self.path_seed = self.seed;
        Ok(())
    }

    /// Write back to the record's own path if it changed since last written.
    /// Returns whether a write happened.
    pub fn synchronize(&mut self) -> Result<bool, RecordError> {
        if !self.needs_synchronize() {
            return Ok(false);
        }
        let path = self.path.clone().ok_or(RecordError::NoPath)?;
        self.write(path)?;
        Ok(true)
    }

    pub fn needs_synchronize(&self) -> bool {
        self.path.is_some() && self.path_seed != self.seed
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Point the record at a new file; the next synchronize writes there.
    pub fn set_path(&mut self, path: impl Into<PathBuf>) {
        self.path = Some(path.into());
        self.bump();
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.position(name).map(|i| self.fields[i].1.as_str())
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Assign a field. An existing field keeps its position and spelling; a
    /// new one is appended. Colons and line breaks in `name` become `-`.
    pub fn set_field(&mut self, name: &str, value: impl Into<String>) {
        let name = clean_name(name);
        let value = value.into();
        match self.position(&name) {
            Some(i) => self.fields[i].1 = value,
            None => self.fields.push((name, value)),
        }
        self.bump();
    }

    pub fn remove_field(&mut self, name: &str) -> Option<String> {
        let i = self.position(name)?;
        let (_, value) = self.fields.remove(i);
        self.bump();
        Some(value)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn set_body(&mut self, body: impl Into<String>) {
        self.body = body.into();
        self.bump();
    }

    /// Stable sort of the header into canonical field order; custom fields
    /// follow every known one in their existing order.
    pub fn canonicalize_field_order(&mut self) {
        let before: Vec<String> = self.fields.iter().map(|(n, _)| n.to_lowercase()).collect();
        self.fields.sort_by_key(|(name, _)| fields::priority(name));
        let changed = self
            .fields
            .iter()
            .zip(&before)
            .any(|((name, _), old)| name.to_lowercase() != *old);
        if changed {
            self.bump();
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        let name = name.trim();
        self.fields
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    fn bump(&mut self) {
        self.seed += 1;
    }

    fn serialize(&self) -> String {
        let mut out = String::new();
        for (name, value) in &self.fields {
            out.push_str(name);
            out.push_str(": ");
            let mut lines = value.split('\n');
            if let Some(first) = lines.next() {
                out.push_str(first);
            }
            for line in lines {
                out.push_str("\n ");
                out.push_str(line);
            }
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out
    }
}

fn clean_name(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| if matches!(c, ':' | '\n' | '\r') { '-' } else { c })
        .collect()
}

/// Split file content into header fields and body. The first empty line
/// ends the header. Lines without a colon are skipped; continuation lines
/// (leading whitespace, even if nothing else) extend the previous value on a
/// new line, minus their first whitespace character.
fn parse(content: &str) -> (Vec<(String, String)>, String) {
    let mut fields: Vec<(String, String)> = Vec::new();
    let mut rest = content;

    while !rest.is_empty() {
        let (line, next) = match rest.find('\n') {
            Some(i) => (&rest[..i], &rest[i + 1..]),
            None => (rest, ""),
        };
        rest = next;
        let line = line.strip_suffix('\r').unwrap_or(line);

        if line.is_empty() {
            return (fields, rest.to_string());
        }

        let mut chars = line.chars();
        if chars.next().is_some_and(char::is_whitespace) {
            match fields.last_mut() {
                Some((_, value)) => {
                    value.push('\n');
                    value.push_str(chars.as_str());
                }
                None if line.trim().is_empty() => return (fields, rest.to_string()),
                None => {}
            }
            continue;
        }

        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        let value = value.trim().to_string();
        match fields.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(name)) {
            Some(existing) => existing.1 = value,
            None => fields.push((name.to_string(), value)),
        }
    }

    (fields, String::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_and_body_split_at_first_blank_line() {
        let (fields, body) = parse("Date: 2020-01-01\nDistance: 5 km\n\nfirst\n\nsecond\n");
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[1], ("Distance".to_string(), "5 km".to_string()));
        assert_eq!(body, "first\n\nsecond\n");
    }

    #[test]
    fn continuation_lines_fold_onto_previous_value() {
        let (fields, _) = parse("Keywords: easy\n  hills\nGarbage line\nDate: x\n\n");
        assert_eq!(fields[0].1, "easy\n hills");
        assert_eq!(fields.len(), 2);
    }

    #[test]
    fn blank_continuation_line_stays_in_header() {
        let (fields, body) = parse("Route: a\n \n b\nDistance: 5 km\n\nbody\n");
        assert_eq!(fields[0].1, "a\n\nb");
        assert_eq!(fields[1].1, "5 km");
        assert_eq!(body, "body\n");
    }

    #[test]
    fn names_lose_separators() {
        let mut record = Record::new();
        record.set_field("Odd:Name\n", "x");
        assert_eq!(record.fields().next(), Some(("Odd-Name", "x")));
        assert_eq!(record.field("odd-name"), Some("x"));
    }

    #[test]
    fn duplicate_names_overwrite() {
        let (fields, _) = parse("Distance: 5\ndistance: 6\n\n");
        assert_eq!(fields, vec![("Distance".to_string(), "6".to_string())]);
    }
}
