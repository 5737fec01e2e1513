use crate::dostime::DosDateTime;

// General purpose flags
pub const FLAG_ENCRYPTED: u16 = 0x0001;
pub const FLAG_DATA_DESCR: u16 = 0x0008;

/// MS-DOS directory attribute in the low byte of the external attributes.
pub const ATTR_DIRECTORY: u32 = 0x10;
pub const ATTR_ARCHIVE: u32 = 0x20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Store,   // 0
    Deflate, // 8
    Unknown(u16),
}

impl CompressionMethod {
    pub fn from_u16(v: u16) -> Self {
        match v {
            0 => Self::Store,
            8 => Self::Deflate,
            n => Self::Unknown(n),
        }
    }

    pub fn as_u16(self) -> u16 {
        match self {
            Self::Store => 0,
            Self::Deflate => 8,
            Self::Unknown(n) => n,
        }
    }
}

impl std::fmt::Display for CompressionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store => f.pad("Stored"),
            Self::Deflate => f.pad("Deflate"),
            Self::Unknown(n) => f.pad(&format!("Unknown({n})")),
        }
    }
}

/// Metadata of one archive member, as held by a writer or reader index.
#[derive(Debug, Clone)]
pub struct ZipEntry {
    pub name: String,
    /// Name exactly as stored on disk, for byte-wise header comparison.
    pub raw_name: Vec<u8>,
    pub comment: String,
    pub local_header_offset: u32,
    /// Start of the payload; known once the local header was validated.
    pub data_offset: Option<u32>,
    pub version_needed: u16,
    pub flags: u16,
    pub compression_method: CompressionMethod,
    pub modified: DosDateTime,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub external_attr: u32,
}

impl ZipEntry {
    pub fn is_encrypted(&self) -> bool {
        self.flags & FLAG_ENCRYPTED != 0
    }

    pub fn has_data_descriptor(&self) -> bool {
        self.flags & FLAG_DATA_DESCR != 0
    }

    pub fn is_directory(&self) -> bool {
        self.name.ends_with('/') || self.external_attr & ATTR_DIRECTORY != 0
    }

    pub fn info(&self) -> EntryInfo {
        EntryInfo {
            name: self.name.clone(),
            comment: self.comment.clone(),
            compression_method: self.compression_method,
            modified: self.modified,
            crc32: self.crc32,
            compressed_size: self.compressed_size,
            uncompressed_size: self.uncompressed_size,
            is_encrypted: self.is_encrypted(),
            is_directory: self.is_directory(),
        }
    }
}

/// Metadata snapshot handed out by [`crate::reader::ZipReader::entries`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub name: String,
    pub comment: String,
    pub compression_method: CompressionMethod,
    pub modified: DosDateTime,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub is_encrypted: bool,
    pub is_directory: bool,
}
