use std::fmt;

#[derive(Debug)]
pub enum ZipError {
    NotZipFile,
    CorruptedArchive,
    PartiallyCorrupted { parsed: usize, declared: usize },
    BadSignature { record: &'static str, offset: u64 },
    HeaderMismatch { name: String, field: &'static str },
    CantOpenFile(std::io::Error),
    CantOpenDestFile(std::io::Error),
    InvalidEntryName,
    InflateFailed(String),
    DeflateFailed(String),
    CrcMismatch { name: String, expected: u32, got: u32 },
    UnsupportedMethod(u16),
    UnsupportedVersion(u16),
    PasswordNotSet { name: String },
    InvalidPassword { name: String },
    PasswordsExhausted,
    DuplicateEntry(String),
    EntryNotFound(String),
    PathTraversal(String),
    ArchiveClosed,
    Io(std::io::Error),
}

/// How far a failure reaches when it happens inside a batch operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The whole operation must stop.
    Fatal,
    /// Only the current entry is lost; the batch may continue.
    Recoverable,
}

impl ZipError {
    pub fn severity(&self) -> Severity {
        match self {
            Self::HeaderMismatch { .. }
            | Self::BadSignature { .. }
            | Self::InflateFailed(_)
            | Self::CrcMismatch { .. }
            | Self::UnsupportedMethod(_)
            | Self::UnsupportedVersion(_)
            | Self::PasswordNotSet { .. }
            | Self::InvalidPassword { .. }
            | Self::PasswordsExhausted
            | Self::PathTraversal(_) => Severity::Recoverable,
            _ => Severity::Fatal,
        }
    }

    /// True for faults in the stored bytes of one entry (as opposed to
    /// password or I/O problems).
    pub fn is_entry_corruption(&self) -> bool {
        matches!(
            self,
            Self::HeaderMismatch { .. }
                | Self::BadSignature { .. }
                | Self::InflateFailed(_)
                | Self::CrcMismatch { .. }
        )
    }

    pub fn is_authentication(&self) -> bool {
        matches!(
            self,
            Self::PasswordNotSet { .. } | Self::InvalidPassword { .. } | Self::PasswordsExhausted
        )
    }
}

impl fmt::Display for ZipError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotZipFile => write!(f, "not a zip file"),
            Self::CorruptedArchive => write!(f, "corrupted archive"),
            Self::PartiallyCorrupted { parsed, declared } => write!(
                f,
                "partially corrupted archive: {parsed} of {declared} entries readable"
            ),
            Self::BadSignature { record, offset } => {
                write!(f, "bad {record} signature at offset {offset}")
            }
            Self::HeaderMismatch { name, field } => {
                write!(f, "inconsistent headers for {name}: {field} differs")
            }
            Self::CantOpenFile(e) => write!(f, "can't open archive file: {e}"),
            Self::CantOpenDestFile(e) => write!(f, "can't open dest file: {e}"),
            Self::InvalidEntryName => write!(f, "invalid entry name"),
            Self::InflateFailed(s) => write!(f, "inflate failed: {s}"),
            Self::DeflateFailed(s) => write!(f, "deflate failed: {s}"),
            Self::CrcMismatch {
                name,
                expected,
                got,
            } => write!(
                f,
                "{name}: file corrupted, expected CRC {expected:08x}, got {got:08x}"
            ),
            Self::UnsupportedMethod(m) => write!(f, "unsupported compression method: {m}"),
            Self::UnsupportedVersion(v) => write!(f, "unsupported version needed: 0x{v:02x}"),
            Self::PasswordNotSet { name } => write!(f, "{name}: password was not set"),
            Self::InvalidPassword { name } => write!(f, "{name}: invalid password"),
            Self::PasswordsExhausted => write!(f, "no more passwords"),
            Self::DuplicateEntry(n) => write!(f, "duplicate entry: {n}"),
            Self::EntryNotFound(n) => write!(f, "entry not found: {n}"),
            Self::PathTraversal(p) => write!(f, "path traversal blocked: {p}"),
            Self::ArchiveClosed => write!(f, "archive is closed"),
            Self::Io(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ZipError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::CantOpenFile(e) | Self::CantOpenDestFile(e) | Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ZipError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

pub type ZipResult<T> = Result<T, ZipError>;
