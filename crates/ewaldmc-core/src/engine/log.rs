use super::error::EngineError;
use csv::{QuoteStyle, Terminator, Writer, WriterBuilder};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Append-only, space-delimited simulation log.
///
/// The header is written only when the file is new or empty, so a resumed run keeps
/// appending to the same table. Every row is flushed immediately.
pub struct LogWriter {
    path: PathBuf,
    writer: Writer<File>,
}

impl fmt::Debug for LogWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogWriter").field("path", &self.path).finish()
    }
}

impl LogWriter {
    pub fn open(path: &Path, header: &[String]) -> Result<Self, EngineError> {
        let io_error = |e| EngineError::Io {
            path: path.to_string_lossy().to_string(),
            source: e,
        };
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(io_error)?;
        let is_empty = file.metadata().map_err(io_error)?.len() == 0;

        let writer = WriterBuilder::new()
            .delimiter(b' ')
            .has_headers(false)
            .flexible(true)
            .quote_style(QuoteStyle::Never)
            .terminator(Terminator::Any(b'\n'))
            .from_writer(file);
        let mut log = Self {
            path: path.to_path_buf(),
            writer,
        };
        if is_empty {
            log.write_row(header)?;
        }
        Ok(log)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_row(&mut self, fields: &[String]) -> Result<(), EngineError> {
        self.writer.write_record(fields).map_err(|e| self.error(e))?;
        self.writer.flush().map_err(|e| EngineError::Io {
            path: self.path.to_string_lossy().to_string(),
            source: e,
        })
    }

    /// Writes a free-form `# ...` line.
    pub fn comment(&mut self, text: &str) -> Result<(), EngineError> {
        self.write_row(&[format!("# {}", text)])
    }

    fn error(&self, source: csv::Error) -> EngineError {
        EngineError::Log {
            path: self.path.to_string_lossy().to_string(),
            source,
        }
    }
}
