//! Key/value mailboxes through which replicas exchange configurations.
//!
//! Readers never block: a missing key is simply `None`, and stale or partial
//! payloads are the reader's problem to detect.

use crate::core::io::record::{RecordError, RecordWriter, Records};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MailboxError {
    #[error("Mailbox I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("Unsupported mailbox configuration: {0}")]
    Unsupported(String),
    #[error("In-process mailbox lock was poisoned")]
    Poisoned,
    #[error("Invalid mailbox description: {source}")]
    Record {
        #[from]
        source: RecordError,
    },
}

pub trait Mailbox: fmt::Debug + Send {
    fn put(&mut self, key: &str, payload: &str) -> Result<(), MailboxError>;

    fn try_get(&mut self, key: &str) -> Result<Option<String>, MailboxError>;

    fn clone_box(&self) -> Box<dyn Mailbox>;

    /// Describes the backend so that it can be reopened from a checkpoint.
    fn write_records(&self, out: &mut RecordWriter);
}

impl Clone for Box<dyn Mailbox> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Reopens a mailbox from its checkpoint description.
pub fn restore_mailbox(records: &Records) -> Result<Box<dyn Mailbox>, MailboxError> {
    let backend: String = records.required("mailbox")?;
    match backend.as_str() {
        "directory" => {
            let dir: String = records.required("mailboxDir")?;
            Ok(Box::new(FsMailbox::new(dir)?))
        }
        other => Err(MailboxError::Unsupported(format!(
            "backend '{}' cannot be restored from a checkpoint",
            other
        ))),
    }
}

/// Publishes payloads as files in a shared directory.
///
/// Writes go to a temporary name first and are renamed into place, so readers see
/// either the previous payload or the complete new one.
#[derive(Debug, Clone)]
pub struct FsMailbox {
    dir: PathBuf,
}

impl FsMailbox {
    #[cfg(feature = "replica-exchange")]
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, MailboxError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| MailboxError::Io {
            path: dir.to_string_lossy().to_string(),
            source: e,
        })?;
        Ok(Self { dir })
    }

    #[cfg(not(feature = "replica-exchange"))]
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, MailboxError> {
        let dir: PathBuf = dir.into();
        Err(MailboxError::Unsupported(format!(
            "filesystem mailbox at '{}' requires the 'replica-exchange' feature",
            dir.display()
        )))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn io_error(path: &Path, source: std::io::Error) -> MailboxError {
        MailboxError::Io {
            path: path.to_string_lossy().to_string(),
            source,
        }
    }
}

impl Mailbox for FsMailbox {
    fn put(&mut self, key: &str, payload: &str) -> Result<(), MailboxError> {
        let target = self.dir.join(key);
        let staging = self.dir.join(format!("{}.{}.part", key, std::process::id()));
        std::fs::write(&staging, payload).map_err(|e| Self::io_error(&staging, e))?;
        std::fs::rename(&staging, &target).map_err(|e| Self::io_error(&target, e))
    }

    fn try_get(&mut self, key: &str) -> Result<Option<String>, MailboxError> {
        let path = self.dir.join(key);
        match std::fs::read_to_string(&path) {
            Ok(payload) => Ok(Some(payload)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Self::io_error(&path, e)),
        }
    }

    fn clone_box(&self) -> Box<dyn Mailbox> {
        Box::new(self.clone())
    }

    fn write_records(&self, out: &mut RecordWriter) {
        out.record("mailbox", "directory");
        out.record("mailboxDir", self.dir.display());
    }
}

/// A mailbox shared between engines in one process.
#[derive(Debug, Clone, Default)]
pub struct MemoryMailbox {
    store: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryMailbox {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Mailbox for MemoryMailbox {
    fn put(&mut self, key: &str, payload: &str) -> Result<(), MailboxError> {
        let mut store = self.store.lock().map_err(|_| MailboxError::Poisoned)?;
        store.insert(key.to_string(), payload.to_string());
        Ok(())
    }

    fn try_get(&mut self, key: &str) -> Result<Option<String>, MailboxError> {
        let store = self.store.lock().map_err(|_| MailboxError::Poisoned)?;
        Ok(store.get(key).cloned())
    }

    fn clone_box(&self) -> Box<dyn Mailbox> {
        Box::new(self.clone())
    }

    fn write_records(&self, out: &mut RecordWriter) {
        out.record("mailbox", "memory");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn memory_mailbox_is_shared_between_clones() {
        let mut a = MemoryMailbox::new();
        let mut b = a.clone();
        assert_eq!(b.try_get("k").unwrap(), None);
        a.put("k", "payload").unwrap();
        assert_eq!(b.try_get("k").unwrap().as_deref(), Some("payload"));
    }

    #[cfg(feature = "replica-exchange")]
    #[test]
    fn fs_mailbox_publishes_and_overwrites() {
        let dir = tempdir().unwrap();
        let mut mailbox = FsMailbox::new(dir.path().join("tmp")).unwrap();
        assert_eq!(mailbox.try_get("swpp0p1o3").unwrap(), None);

        mailbox.put("swpp0p1o3", "first").unwrap();
        mailbox.put("swpp0p1o3", "second").unwrap();
        assert_eq!(mailbox.try_get("swpp0p1o3").unwrap().as_deref(), Some("second"));
        assert!(!dir.path().join("tmp").join(format!("swpp0p1o3.{}.part", std::process::id())).exists());
    }

    #[cfg(feature = "replica-exchange")]
    #[test]
    fn directory_backend_is_restored_from_records() {
        let dir = tempdir().unwrap();
        let mailbox = FsMailbox::new(dir.path()).unwrap();
        let mut out = RecordWriter::new();
        mailbox.write_records(&mut out);
        let records = Records::parse(out.as_str(), "memory").unwrap();
        assert!(restore_mailbox(&records).is_ok());
    }

    #[cfg(not(feature = "replica-exchange"))]
    #[test]
    fn fs_mailbox_is_unsupported_without_feature() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            FsMailbox::new(dir.path()),
            Err(MailboxError::Unsupported(_))
        ));
    }

    #[test]
    fn memory_backend_cannot_be_restored() {
        let mut out = RecordWriter::new();
        MemoryMailbox::new().write_records(&mut out);
        let records = Records::parse(out.as_str(), "memory").unwrap();
        assert!(matches!(
            restore_mailbox(&records),
            Err(MailboxError::Unsupported(_))
        ));
    }
}
