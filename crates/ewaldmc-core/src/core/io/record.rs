use std::collections::HashMap;
use std::fmt::Display;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("Missing required key '{key}' in '{path}'")]
    MissingKey { key: String, path: String },
    #[error("Invalid value '{value}' for key '{key}' in '{path}'")]
    InvalidValue {
        key: String,
        value: String,
        path: String,
    },
    #[error("Expected class '{expected}' in '{path}', found '{found}'")]
    ClassMismatch {
        expected: String,
        found: String,
        path: String,
    },
    #[error("Malformed record on line {line} of '{path}'")]
    MalformedLine { line: usize, path: String },
}

/// Accumulates `# key value` records and free-form body lines in memory.
///
/// Files are only touched by [`RecordWriter::write_to_path`], so a record set that fails
/// half-way never leaves a truncated checkpoint on disk.
#[derive(Debug, Default, Clone)]
pub struct RecordWriter {
    buffer: String,
}

impl RecordWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn class(&mut self, tag: &str) {
        self.record("class", tag);
    }

    pub fn record(&mut self, key: &str, value: impl Display) {
        self.buffer.push_str(&format!("# {} {}\n", key, value));
    }

    /// Writes a whitespace-separated list as a single record.
    pub fn list<T: Display>(&mut self, key: &str, values: &[T]) {
        let joined = values
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        self.record(key, joined);
    }

    pub fn line(&mut self, line: impl Display) {
        self.buffer.push_str(&format!("{}\n", line));
    }

    pub fn as_str(&self) -> &str {
        &self.buffer
    }

    pub fn into_string(self) -> String {
        self.buffer
    }

    pub fn write_to_path(&self, path: &Path) -> Result<(), RecordError> {
        fs::write(path, &self.buffer).map_err(|e| RecordError::Io {
            path: path.to_string_lossy().to_string(),
            source: e,
        })
    }
}

/// A parsed record file: keyed header records plus the ordered body lines.
#[derive(Debug, Clone)]
pub struct Records {
    source: String,
    entries: HashMap<String, String>,
    body: Vec<String>,
}

impl Records {
    pub fn parse(text: &str, source: impl Into<String>) -> Result<Self, RecordError> {
        let source = source.into();
        let mut entries = HashMap::new();
        let mut body = Vec::new();

        for (index, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            match line.strip_prefix('#') {
                Some(rest) => {
                    let rest = rest.trim_start();
                    let (key, value) = match rest.split_once(char::is_whitespace) {
                        Some((key, value)) => (key, value.trim()),
                        None => (rest, ""),
                    };
                    if key.is_empty() {
                        return Err(RecordError::MalformedLine {
                            line: index + 1,
                            path: source,
                        });
                    }
                    entries.insert(key.to_string(), value.to_string());
                }
                None => body.push(line.to_string()),
            }
        }

        Ok(Self {
            source,
            entries,
            body,
        })
    }

    pub fn read(path: &Path) -> Result<Self, RecordError> {
        let text = fs::read_to_string(path).map_err(|e| RecordError::Io {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;
        Self::parse(&text, path.to_string_lossy())
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn raw(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn body(&self) -> &[String] {
        &self.body
    }

    pub fn required<T: FromStr>(&self, key: &str) -> Result<T, RecordError> {
        let value = self.raw(key).ok_or_else(|| RecordError::MissingKey {
            key: key.to_string(),
            path: self.source.clone(),
        })?;
        self.convert(key, value)
    }

    pub fn optional<T: FromStr>(&self, key: &str) -> Result<Option<T>, RecordError> {
        self.raw(key).map(|v| self.convert(key, v)).transpose()
    }

    pub fn or_default<T: FromStr>(&self, key: &str, default: T) -> Result<T, RecordError> {
        Ok(self.optional(key)?.unwrap_or(default))
    }

    pub fn list<T: FromStr>(&self, key: &str) -> Result<Vec<T>, RecordError> {
        let value = self.raw(key).ok_or_else(|| RecordError::MissingKey {
            key: key.to_string(),
            path: self.source.clone(),
        })?;
        value
            .split_whitespace()
            .map(|token| self.convert(key, token))
            .collect()
    }

    pub fn class(&self) -> Result<&str, RecordError> {
        self.raw("class").ok_or_else(|| RecordError::MissingKey {
            key: "class".to_string(),
            path: self.source.clone(),
        })
    }

    pub fn expect_class(&self, expected: &str) -> Result<(), RecordError> {
        let found = self.class()?;
        if found != expected {
            return Err(RecordError::ClassMismatch {
                expected: expected.to_string(),
                found: found.to_string(),
                path: self.source.clone(),
            });
        }
        Ok(())
    }

    pub fn invalid(&self, key: &str, value: impl Into<String>) -> RecordError {
        RecordError::InvalidValue {
            key: key.to_string(),
            value: value.into(),
            path: self.source.clone(),
        }
    }

    fn convert<T: FromStr>(&self, key: &str, value: &str) -> Result<T, RecordError> {
        value.parse().map_err(|_| self.invalid(key, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parse_separates_records_from_body_lines() {
        let text = "# class Space\n# box 10 12 14\n1 0 0.5 0.5 0.5\n\n2 1 1.0 1.0 1.0\n";
        let records = Records::parse(text, "memory").unwrap();

        assert_eq!(records.class().unwrap(), "Space");
        assert_eq!(records.list::<f64>("box").unwrap(), vec![10.0, 12.0, 14.0]);
        assert_eq!(records.body().len(), 2);
    }

    #[test]
    fn required_key_missing_names_key_and_source() {
        let records = Records::parse("# class Space\n", "space.rst").unwrap();
        let err = records.required::<u64>("nAttempts").unwrap_err();
        match err {
            RecordError::MissingKey { key, path } => {
                assert_eq!(key, "nAttempts");
                assert_eq!(path, "space.rst");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn optional_and_default_values_fall_back_when_absent() {
        let records = Records::parse("# checkEtol 1e-5\n", "memory").unwrap();
        assert_eq!(records.or_default("checkEtol", 1e-7).unwrap(), 1e-5);
        assert_eq!(records.or_default("nFreqTune", 0u64).unwrap(), 0);
        assert_eq!(records.optional::<u64>("nFreqLog").unwrap(), None);
    }

    #[test]
    fn unparsable_value_is_reported_as_invalid() {
        let records = Records::parse("# nAttempts lots\n", "memory").unwrap();
        assert!(matches!(
            records.required::<u64>("nAttempts"),
            Err(RecordError::InvalidValue { .. })
        ));
    }

    #[test]
    fn expect_class_rejects_other_tags() {
        let records = Records::parse("# class Metropolis\n", "memory").unwrap();
        assert!(records.expect_class("Metropolis").is_ok());
        assert!(matches!(
            records.expect_class("Space"),
            Err(RecordError::ClassMismatch { .. })
        ));
    }

    #[test]
    fn floats_survive_a_write_and_read_exactly() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("values.rst");
        let value = 0.1 + 0.2;

        let mut writer = RecordWriter::new();
        writer.class("Test");
        writer.record("value", value);
        writer.write_to_path(&path).unwrap();

        let records = Records::read(&path).unwrap();
        assert_eq!(records.required::<f64>("value").unwrap(), value);
    }

    #[test]
    fn read_missing_file_reports_io_error_with_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.rst");
        match Records::read(&path) {
            Err(RecordError::Io { path: p, .. }) => assert!(p.ends_with("absent.rst")),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
