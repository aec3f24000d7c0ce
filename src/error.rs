//! Ошибки движка снапшотов.
//!
//! Что здесь:
//! - SnapshotErrorKind — таксономия отказов (I/O, заголовки, версии, границы);
//! - SnapshotError — kind + контекст (файл, модуль, producer) + источник;
//! - Result<T> — крейтовый алиас.
//!
//! Контекст прикрепляется по мере подъёма ошибки: codec отдаёт голый kind,
//! слой модуля добавляет имя модуля, слой снапшота — имя файла.

use std::io;

use thiserror::Error;

use crate::container::ProducerInfo;

pub type Result<T> = std::result::Result<T, SnapshotError>;

/// Failure taxonomy. Version-gate kinds additionally carry producer info
/// on the error itself (see [`SnapshotError::with_producer`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotErrorKind {
    /// Short write at primitive level.
    WriteEof,
    /// Array write failed mid-way.
    WriteArray,
    /// Short read at primitive level.
    ReadEof,
    /// Array read failed mid-way.
    ReadArray,
    /// Length-prefixed string does not fit a u16 prefix.
    StringTooLong,
    /// Typed read would cross the module payload end.
    ReadOutOfBounds,
    /// Offset arithmetic overflowed or a seek target is unrepresentable.
    IllegalOffset,
    /// Could not position the stream at the first module.
    FirstModuleMissing,
    /// I/O failure while reading a candidate module header.
    ModuleHeaderRead,
    /// Scan exhausted the stream without a name match.
    ModuleNotFound,
    /// Module create attempted on a snapshot opened for reading.
    SnapshotReadOnly,
    /// Module open attempted on a snapshot being written.
    SnapshotWriteOnly,
    /// Size backpatch or final seek failed while closing a module.
    ModuleClose,
    /// Seek past a module region failed.
    ModuleSkip,
    /// Backing stream could not be created.
    CannotCreate,
    CannotWriteMagic,
    CannotWriteVersion,
    CannotWriteMachineName,
    /// Backing stream could not be opened for reading.
    CannotOpenForRead,
    /// Primary magic bytes do not match.
    MagicMismatch,
    CannotReadVersion,
    CannotReadMachineName,
    /// Machine tag in the header differs from the expected one.
    MachineMismatch { expected: String, found: String },
    /// Closing the backing stream failed.
    CloseFailed,
    /// Module version is newer than the caller supports.
    HigherVersion,
    /// Module version fails the compatibility gate.
    Incompatible,
}

/// Error value for every fallible snapshot operation.
///
/// Renders the kind plus the last-known module/file names into a message;
/// version-gate kinds append who produced the snapshot (or a legacy note).
#[derive(Debug, Error)]
#[error("{}", self.message())]
pub struct SnapshotError {
    kind: SnapshotErrorKind,
    file: Option<String>,
    module: Option<String>,
    producer: Option<ProducerInfo>,
    #[source]
    source: Option<io::Error>,
}

impl SnapshotError {
    pub fn new(kind: SnapshotErrorKind) -> Self {
        SnapshotError {
            kind,
            file: None,
            module: None,
            producer: None,
            source: None,
        }
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    pub fn with_producer(mut self, producer: Option<ProducerInfo>) -> Self {
        self.producer = producer;
        self
    }

    pub fn with_source(mut self, source: io::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// Заменить kind, сохранив источник и контекст. Заголовочные пути
    /// переводят общий отказ кодека в свой специфичный kind.
    pub(crate) fn rekind(mut self, kind: SnapshotErrorKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn kind(&self) -> &SnapshotErrorKind {
        &self.kind
    }

    pub fn file(&self) -> Option<&str> {
        self.file.as_deref()
    }

    pub fn module(&self) -> Option<&str> {
        self.module.as_deref()
    }

    pub fn producer(&self) -> Option<ProducerInfo> {
        self.producer
    }

    fn message(&self) -> String {
        use SnapshotErrorKind::*;
        let file = self.file.as_deref().unwrap_or("<stream>");
        let module = self.module.as_deref().unwrap_or("<module>");
        match &self.kind {
            WriteEof => format!("EOF while writing to module {module} in snapshot {file}"),
            WriteArray => format!("error writing array to module {module} in snapshot {file}"),
            ReadEof => format!("EOF while reading module {module} in snapshot {file}"),
            ReadArray => format!("error reading array from module {module} in snapshot {file}"),
            StringTooLong => {
                format!("string too long for module {module} in snapshot {file}")
            }
            ReadOutOfBounds => {
                format!("out of bounds read in module {module} in snapshot {file}")
            }
            IllegalOffset => format!("illegal offset in module {module} in snapshot {file}"),
            FirstModuleMissing => format!("cannot find first module in snapshot {file}"),
            ModuleHeaderRead => format!("error reading module header in snapshot {file}"),
            ModuleNotFound => format!("module {module} not found in snapshot {file}"),
            SnapshotReadOnly => format!(
                "cannot create module {module}: snapshot {file} is open for reading"
            ),
            SnapshotWriteOnly => format!(
                "cannot open module {module}: snapshot {file} is being written"
            ),
            ModuleClose => format!("error closing module {module} in snapshot {file}"),
            ModuleSkip => format!("error skipping module in snapshot {file}"),
            CannotCreate => format!("cannot create snapshot {file}"),
            CannotWriteMagic => format!("cannot write magic string to snapshot {file}"),
            CannotWriteVersion => format!("cannot write version to snapshot {file}"),
            CannotWriteMachineName => {
                format!("cannot write machine name to snapshot {file}")
            }
            CannotOpenForRead => format!("cannot open snapshot {file} for reading"),
            MagicMismatch => format!("magic string mismatch in snapshot {file}"),
            CannotReadVersion => format!("cannot read version from snapshot {file}"),
            CannotReadMachineName => {
                format!("cannot read machine name from snapshot {file}")
            }
            MachineMismatch { expected, found } => format!(
                "snapshot {file} was created for machine {found}, expected {expected}"
            ),
            CloseFailed => format!("error closing snapshot {file}"),
            HigherVersion => format!(
                "module {module} in snapshot {file} has a higher version than supported{}",
                self.producer_note()
            ),
            Incompatible => format!(
                "module {module} in snapshot {file} is incompatible with this engine{}",
                self.producer_note()
            ),
        }
    }

    fn producer_note(&self) -> String {
        match self.producer {
            Some(p) => format!("; created by {p}"),
            None => "; created by an unknown engine version".to_string(),
        }
    }
}

impl From<SnapshotErrorKind> for SnapshotError {
    fn from(kind: SnapshotErrorKind) -> Self {
        SnapshotError::new(kind)
    }
}
