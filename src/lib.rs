pub mod compress;
pub mod crypto;
pub mod decompress;
pub mod dostime;
pub mod encoding;
pub mod entry;
pub mod error;
pub mod extract;
pub mod format;
pub mod level;
pub mod reader;
pub mod writer;

pub use dostime::DosDateTime;
pub use entry::{CompressionMethod, EntryInfo};
pub use error::{Severity, ZipError, ZipResult};
pub use extract::ExtractSummary;
pub use level::CompressionLevel;
pub use reader::{ArchiveStatus, PasswordProvider, ReaderOptions, ZipReader};
pub use writer::{EntrySource, ZipWriter};
