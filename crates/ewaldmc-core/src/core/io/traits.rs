use super::record::{RecordError, RecordWriter, Records};
use std::path::Path;

/// Defines the interface for components that persist themselves in checkpoint files.
///
/// Each implementor writes its own class tag first so that a checkpoint can be
/// reconstructed without knowing the concrete type in advance.
pub trait Restartable: Sized {
    /// The class tag written as the `class` record.
    const CLASS: &'static str;

    /// Appends the component's state to a record writer.
    ///
    /// The class tag has already been written when this is called.
    fn write_records(&self, out: &mut RecordWriter);

    /// Reconstructs the component from parsed records.
    ///
    /// # Errors
    ///
    /// Returns an error if a required key is missing or a value cannot be parsed.
    fn from_records(records: &Records) -> Result<Self, RecordError>;

    fn to_records(&self) -> RecordWriter {
        let mut out = RecordWriter::new();
        out.class(Self::CLASS);
        self.write_records(&mut out);
        out
    }

    fn write_to_path<P: AsRef<Path>>(&self, path: P) -> Result<(), RecordError> {
        self.to_records().write_to_path(path.as_ref())
    }

    fn read_from_path<P: AsRef<Path>>(path: P) -> Result<Self, RecordError> {
        let records = Records::read(path.as_ref())?;
        records.expect_class(Self::CLASS)?;
        Self::from_records(&records)
    }
}
