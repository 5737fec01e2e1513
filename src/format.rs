//! On-disk records of a PKZIP 2.0 archive.
//!
//! Every record is a fixed little-endian block followed by variable-length
//! fields (name, extra, comment) whose lengths it declares. The structs here
//! hold only the fixed part; callers read or write the variable tail.

pub const SIG_LOCAL_FILE_HEADER: u32 = 0x04034b50; // "PK\x03\x04"
pub const SIG_CENTRAL_DIRECTORY: u32 = 0x02014b50; // "PK\x01\x02"
pub const SIG_END_OF_CENTRAL_DIR: u32 = 0x06054b50; // "PK\x05\x06"
pub const SIG_DATA_DESCRIPTOR: u32 = 0x08074b50; // "PK\x07\x08"

pub const LOCAL_HEADER_LEN: usize = 30;
pub const CENTRAL_RECORD_LEN: usize = 46;
pub const EOCD_LEN: usize = 22;
/// Data descriptor body (CRC + two sizes), without the optional signature.
pub const DATA_DESCRIPTOR_LEN: usize = 12;

/// Offset of the CRC field inside a local header; compressed and
/// uncompressed sizes follow it.
pub const LOCAL_CRC_OFFSET: u64 = 14;

/// Highest "version needed to extract" accepted when reading.
pub const MAX_VERSION_NEEDED: u16 = 0x1B;
pub const VERSION_STORE: u16 = 10;
pub const VERSION_DEFLATE: u16 = 20;
/// Made by: MS-DOS host, format version 2.0.
pub const VERSION_MADE_BY: u16 = 20;

pub fn load_u16(buf: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([buf[off], buf[off + 1]])
}

pub fn load_u32(buf: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

pub fn store_u16(buf: &mut [u8], off: usize, v: u16) {
    buf[off..off + 2].copy_from_slice(&v.to_le_bytes());
}

pub fn store_u32(buf: &mut [u8], off: usize, v: u32) {
    buf[off..off + 4].copy_from_slice(&v.to_le_bytes());
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LocalFileHeader {
    pub version_needed: u16,
    pub flags: u16,
    pub method: u16,
    pub mod_time: u16,
    pub mod_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub name_len: u16,
    pub extra_len: u16,
}

impl LocalFileHeader {
    /// Returns `None` when the signature does not match.
    pub fn parse(buf: &[u8; LOCAL_HEADER_LEN]) -> Option<Self> {
        if load_u32(buf, 0) != SIG_LOCAL_FILE_HEADER {
            return None;
        }
        Some(Self {
            version_needed: load_u16(buf, 4),
            flags: load_u16(buf, 6),
            method: load_u16(buf, 8),
            mod_time: load_u16(buf, 10),
            mod_date: load_u16(buf, 12),
            crc32: load_u32(buf, 14),
            compressed_size: load_u32(buf, 18),
            uncompressed_size: load_u32(buf, 22),
            name_len: load_u16(buf, 26),
            extra_len: load_u16(buf, 28),
        })
    }

    pub fn to_bytes(&self) -> [u8; LOCAL_HEADER_LEN] {
        let mut buf = [0u8; LOCAL_HEADER_LEN];
        store_u32(&mut buf, 0, SIG_LOCAL_FILE_HEADER);
        store_u16(&mut buf, 4, self.version_needed);
        store_u16(&mut buf, 6, self.flags);
        store_u16(&mut buf, 8, self.method);
        store_u16(&mut buf, 10, self.mod_time);
        store_u16(&mut buf, 12, self.mod_date);
        store_u32(&mut buf, 14, self.crc32);
        store_u32(&mut buf, 18, self.compressed_size);
        store_u32(&mut buf, 22, self.uncompressed_size);
        store_u16(&mut buf, 26, self.name_len);
        store_u16(&mut buf, 28, self.extra_len);
        buf
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CentralDirectoryRecord {
    pub version_made_by: u16,
    pub version_needed: u16,
    pub flags: u16,
    pub method: u16,
    pub mod_time: u16,
    pub mod_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub name_len: u16,
    pub extra_len: u16,
    pub comment_len: u16,
    pub disk_start: u16,
    pub internal_attr: u16,
    pub external_attr: u32,
    pub local_header_offset: u32,
}

impl CentralDirectoryRecord {
    pub fn parse(buf: &[u8; CENTRAL_RECORD_LEN]) -> Option<Self> {
        if load_u32(buf, 0) != SIG_CENTRAL_DIRECTORY {
            return None;
        }
        Some(Self {
            version_made_by: load_u16(buf, 4),
            version_needed: load_u16(buf, 6),
            flags: load_u16(buf, 8),
            method: load_u16(buf, 10),
            mod_time: load_u16(buf, 12),
            mod_date: load_u16(buf, 14),
            crc32: load_u32(buf, 16),
            compressed_size: load_u32(buf, 20),
            uncompressed_size: load_u32(buf, 24),
            name_len: load_u16(buf, 28),
            extra_len: load_u16(buf, 30),
            comment_len: load_u16(buf, 32),
            disk_start: load_u16(buf, 34),
            internal_attr: load_u16(buf, 36),
            external_attr: load_u32(buf, 38),
            local_header_offset: load_u32(buf, 42),
        })
    }

    pub fn to_bytes(&self) -> [u8; CENTRAL_RECORD_LEN] {
        let mut buf = [0u8; CENTRAL_RECORD_LEN];
        store_u32(&mut buf, 0, SIG_CENTRAL_DIRECTORY);
        store_u16(&mut buf, 4, self.version_made_by);
        store_u16(&mut buf, 6, self.version_needed);
        store_u16(&mut buf, 8, self.flags);
        store_u16(&mut buf, 10, self.method);
        store_u16(&mut buf, 12, self.mod_time);
        store_u16(&mut buf, 14, self.mod_date);
        store_u32(&mut buf, 16, self.crc32);
        store_u32(&mut buf, 20, self.compressed_size);
        store_u32(&mut buf, 24, self.uncompressed_size);
        store_u16(&mut buf, 28, self.name_len);
        store_u16(&mut buf, 30, self.extra_len);
        store_u16(&mut buf, 32, self.comment_len);
        store_u16(&mut buf, 34, self.disk_start);
        store_u16(&mut buf, 36, self.internal_attr);
        store_u32(&mut buf, 38, self.external_attr);
        store_u32(&mut buf, 42, self.local_header_offset);
        buf
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EndOfCentralDirectory {
    pub disk_number: u16,
    pub cd_disk: u16,
    pub disk_entries: u16,
    pub total_entries: u16,
    pub cd_size: u32,
    pub cd_offset: u32,
    pub comment_len: u16,
}

impl EndOfCentralDirectory {
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < EOCD_LEN || load_u32(buf, 0) != SIG_END_OF_CENTRAL_DIR {
            return None;
        }
        Some(Self {
            disk_number: load_u16(buf, 4),
            cd_disk: load_u16(buf, 6),
            disk_entries: load_u16(buf, 8),
            total_entries: load_u16(buf, 10),
            cd_size: load_u32(buf, 12),
            cd_offset: load_u32(buf, 16),
            comment_len: load_u16(buf, 20),
        })
    }

    pub fn to_bytes(&self) -> [u8; EOCD_LEN] {
        let mut buf = [0u8; EOCD_LEN];
        store_u32(&mut buf, 0, SIG_END_OF_CENTRAL_DIR);
        store_u16(&mut buf, 4, self.disk_number);
        store_u16(&mut buf, 6, self.cd_disk);
        store_u16(&mut buf, 8, self.disk_entries);
        store_u16(&mut buf, 10, self.total_entries);
        store_u32(&mut buf, 12, self.cd_size);
        store_u32(&mut buf, 16, self.cd_offset);
        store_u16(&mut buf, 20, self.comment_len);
        buf
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DataDescriptor {
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
}

impl DataDescriptor {
    /// Parse the 12-byte body (signature already stripped).
    pub fn parse(buf: &[u8; DATA_DESCRIPTOR_LEN]) -> Self {
        Self {
            crc32: load_u32(buf, 0),
            compressed_size: load_u32(buf, 4),
            uncompressed_size: load_u32(buf, 8),
        }
    }

    /// Signature plus body, as written by this crate.
    pub fn to_bytes(&self) -> [u8; DATA_DESCRIPTOR_LEN + 4] {
        let mut buf = [0u8; DATA_DESCRIPTOR_LEN + 4];
        store_u32(&mut buf, 0, SIG_DATA_DESCRIPTOR);
        store_u32(&mut buf, 4, self.crc32);
        store_u32(&mut buf, 8, self.compressed_size);
        store_u32(&mut buf, 12, self.uncompressed_size);
        buf
    }
}
