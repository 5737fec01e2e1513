use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::crypto::{ENCR_HEADER_LEN, ZipCrypto};
use crate::decompress::{deflate, raw};
use crate::dostime::DosDateTime;
use crate::encoding::decode_name;
use crate::entry::{CompressionMethod, EntryInfo, ZipEntry};
use crate::error::{ZipError, ZipResult};
use crate::format::{
    CENTRAL_RECORD_LEN, CentralDirectoryRecord, DATA_DESCRIPTOR_LEN, DataDescriptor, EOCD_LEN,
    EndOfCentralDirectory, LOCAL_HEADER_LEN, LocalFileHeader, MAX_VERSION_NEEDED,
    SIG_DATA_DESCRIPTOR, SIG_END_OF_CENTRAL_DIR, load_u32,
};
use crate::writer::BUFFER_SIZE;

/// Bytes read per step while scanning backwards for the end record.
pub const EOCD_SCAN_WINDOW: usize = 1024;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderOptions {
    /// Refuse archives whose central directory is only partly readable.
    pub strict: bool,
}

impl ReaderOptions {
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveStatus {
    Ok,
    /// Some central directory records were unreadable; the `parsed` ones
    /// may still be extracted.
    PartiallyCorrupted { parsed: usize, declared: usize },
}

/// Supplies passwords for encrypted entries, typically by asking the user.
pub trait PasswordProvider {
    /// Next password to try for `entry`, or `None` if the user gave up.
    fn password(&mut self, entry: &str) -> Option<String>;
}

/// Reads a PKZIP 2.0 archive.
///
/// The central directory is parsed once on open; local headers are checked
/// against it the first time an entry is extracted.
pub struct ZipReader<R: Read + Seek> {
    inner: Option<R>,
    entries: BTreeMap<String, ZipEntry>,
    comment: String,
    status: ArchiveStatus,
    skipped: usize,
    corrupted: usize,
    password: Option<String>,
    provider: Option<Box<dyn PasswordProvider>>,
    in_buf: Vec<u8>,
    out_buf: Vec<u8>,
}

impl ZipReader<File> {
    pub fn open<P: AsRef<Path>>(path: P) -> ZipResult<Self> {
        let file = File::open(path).map_err(ZipError::CantOpenFile)?;
        Self::new(file)
    }
}

impl ZipReader<Cursor<Vec<u8>>> {
    pub fn from_bytes(data: Vec<u8>) -> ZipResult<Self> {
        Self::new(Cursor::new(data))
    }
}

impl<R: Read + Seek> ZipReader<R> {
    pub fn new(inner: R) -> ZipResult<Self> {
        Self::with_options(inner, ReaderOptions::default())
    }

    pub fn with_options(mut inner: R, options: ReaderOptions) -> ZipResult<Self> {
        let (eocd, eocd_pos) = find_eocd(&mut inner)?;

        let mut comment = vec![0u8; eocd.comment_len as usize];
        inner.seek(SeekFrom::Start(eocd_pos + EOCD_LEN as u64))?;
        inner.read_exact(&mut comment)?;

        let mut reader = ZipReader {
            inner: None,
            entries: BTreeMap::new(),
            comment: decode_comment(&comment),
            status: ArchiveStatus::Ok,
            skipped: 0,
            corrupted: 0,
            password: None,
            provider: None,
            in_buf: vec![0u8; BUFFER_SIZE],
            out_buf: vec![0u8; BUFFER_SIZE],
        };

        let declared = eocd.total_entries as usize;
        inner.seek(SeekFrom::Start(eocd.cd_offset as u64))?;
        let parsed = reader.parse_central_directory(&mut inner, declared);

        if parsed < declared {
            reader.corrupted += declared - parsed;
            if reader.entries.is_empty() {
                log::warn!("[ZIP] central directory unreadable ({declared} entries declared)");
                return Err(ZipError::CorruptedArchive);
            }
            log::warn!(
                "[ZIP] central directory partially corrupted: {parsed} of {declared} records read"
            );
            if options.strict {
                return Err(ZipError::PartiallyCorrupted { parsed, declared });
            }
            reader.status = ArchiveStatus::PartiallyCorrupted { parsed, declared };
        }

        log::debug!(
            "[ZIP] Parsed {} central directory entries (offset {}, {} skipped)",
            reader.entries.len(),
            eocd.cd_offset,
            reader.skipped
        );

        reader.inner = Some(inner);
        Ok(reader)
    }

    /// Read up to `declared` records; returns how many were readable.
    fn parse_central_directory(&mut self, file: &mut R, declared: usize) -> usize {
        for i in 0..declared {
            let (record, raw_name, raw_comment) = match read_cd_record(file) {
                Ok(r) => r,
                Err(e) => {
                    log::warn!("[ZIP] central directory record {i}: {e}");
                    return i;
                }
            };
            match make_entry(record, raw_name, &raw_comment) {
                Ok(entry) => {
                    if self.entries.contains_key(&entry.name) {
                        log::warn!("[ZIP] duplicate entry '{}' ignored", entry.name);
                        self.skipped += 1;
                    } else {
                        self.entries.insert(entry.name.clone(), entry);
                    }
                }
                Err(e) => {
                    log::warn!("[ZIP] skipping central directory record {i}: {e}");
                    self.skipped += 1;
                }
            }
        }
        declared
    }

    pub fn set_password(&mut self, password: &str) {
        self.password = Some(password.to_string());
    }

    pub fn clear_password(&mut self) {
        self.password = None;
    }

    pub fn set_password_provider(&mut self, provider: Box<dyn PasswordProvider>) {
        self.provider = Some(provider);
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }

    pub fn status(&self) -> ArchiveStatus {
        self.status
    }

    /// Records dropped for unsupported method/version or empty names.
    pub fn skipped_entries(&self) -> usize {
        self.skipped
    }

    /// Records lost to corruption, in the directory or found on extraction.
    pub fn corrupted_entries(&self) -> usize {
        self.corrupted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn entry(&self, name: &str) -> Option<EntryInfo> {
        self.entries.get(name).map(ZipEntry::info)
    }

    /// Metadata of every readable entry, ordered by name.
    pub fn entries(&self) -> Vec<EntryInfo> {
        self.entries.values().map(ZipEntry::info).collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Drop an entry found to be corrupted from the index.
    pub(crate) fn discard_corrupted(&mut self, name: &str) {
        if self.entries.remove(name).is_some() {
            self.corrupted += 1;
        }
    }

    /// Release the archive stream. Closing twice is a no-op.
    pub fn close(&mut self) {
        self.inner = None;
    }

    /// Decompress `name` into `out`, verifying headers, password and CRC.
    ///
    /// A wrong password is detected before any output is written. Content
    /// corruption is only known at the end, after bytes were written to `out`.
    pub fn extract_to<W: Write>(&mut self, name: &str, out: &mut W) -> ZipResult<()> {
        let entry = self
            .entries
            .get(name)
            .cloned()
            .ok_or_else(|| ZipError::EntryNotFound(name.to_string()))?;
        let inner = self.inner.as_mut().ok_or(ZipError::ArchiveClosed)?;

        let data_offset = match entry.data_offset {
            Some(o) => o as u64,
            None => {
                let o = validate_local_header(inner, &entry)?;
                if let Some(e) = self.entries.get_mut(name) {
                    e.data_offset = Some(o);
                }
                o as u64
            }
        };

        if entry.is_directory() {
            return Ok(());
        }

        let (mut crypto, payload_size) = if entry.is_encrypted() {
            let crypto = self.unlock(&entry, data_offset)?;
            let size = (entry.compressed_size as u64)
                .checked_sub(ENCR_HEADER_LEN as u64)
                .ok_or_else(|| ZipError::HeaderMismatch {
                    name: entry.name.clone(),
                    field: "compressed size",
                })?;
            (Some(crypto), size)
        } else {
            (None, entry.compressed_size as u64)
        };

        let inner = self.inner.as_mut().ok_or(ZipError::ArchiveClosed)?;
        let header_len = if crypto.is_some() { ENCR_HEADER_LEN as u64 } else { 0 };
        inner.seek(SeekFrom::Start(data_offset + header_len))?;
        let mut limited = inner.take(payload_size);
        let mut counted = Counted { inner: out, len: 0 };

        let crc = match entry.compression_method {
            CompressionMethod::Store => raw::extract_raw(
                &mut limited,
                &mut counted,
                payload_size,
                crypto.as_mut(),
                &mut self.in_buf,
            ),
            CompressionMethod::Deflate => deflate::extract_deflate(
                &mut limited,
                &mut counted,
                payload_size,
                crypto.as_mut(),
                &mut self.in_buf,
                &mut self.out_buf,
            ),
            CompressionMethod::Unknown(n) => return Err(ZipError::UnsupportedMethod(n)),
        }
        .map_err(|e| truncated_as_mismatch(e, &entry.name, "compressed size"))?;

        if counted.len != entry.uncompressed_size as u64 {
            return Err(ZipError::HeaderMismatch {
                name: entry.name,
                field: "uncompressed size",
            });
        }
        if crc != entry.crc32 {
            return Err(ZipError::CrcMismatch {
                name: entry.name,
                expected: entry.crc32,
                got: crc,
            });
        }
        Ok(())
    }

    /// Decompress `name` into memory.
    pub fn read(&mut self, name: &str) -> ZipResult<Vec<u8>> {
        let capacity = self
            .entries
            .get(name)
            .map(|e| (e.uncompressed_size as usize).min(BUFFER_SIZE))
            .unwrap_or(0);
        let mut out = Vec::with_capacity(capacity);
        self.extract_to(name, &mut out)?;
        Ok(out)
    }

    /// Find a password that opens `entry`, trying the cached one first.
    fn unlock(&mut self, entry: &ZipEntry, data_offset: u64) -> ZipResult<ZipCrypto> {
        let inner = self.inner.as_mut().ok_or(ZipError::ArchiveClosed)?;
        let mut header = [0u8; ENCR_HEADER_LEN];
        inner.seek(SeekFrom::Start(data_offset))?;
        inner
            .read_exact(&mut header)
            .map_err(|e| truncated_as_mismatch(e.into(), &entry.name, "compressed size"))?;

        let attempt = |password: &str| {
            let mut c = ZipCrypto::new(password.as_bytes());
            c.check_header(
                &header,
                entry.crc32,
                entry.modified.time,
                entry.has_data_descriptor(),
            )
            .then_some(c)
        };

        if let Some(password) = &self.password {
            if let Some(c) = attempt(password) {
                return Ok(c);
            }
        }

        let Some(provider) = self.provider.as_mut() else {
            let name = entry.name.clone();
            return Err(if self.password.is_some() {
                ZipError::InvalidPassword { name }
            } else {
                ZipError::PasswordNotSet { name }
            });
        };

        loop {
            let Some(password) = provider.password(&entry.name) else {
                return Err(ZipError::PasswordsExhausted);
            };
            if let Some(c) = attempt(&password) {
                self.password = Some(password);
                return Ok(c);
            }
            log::warn!("[ZIP] wrong password for '{}'", entry.name);
        }
    }
}

/// Counts what goes through to the caller's writer.
struct Counted<'a, W: Write> {
    inner: &'a mut W,
    len: u64,
}

impl<W: Write> Write for Counted<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.len += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Locate the end of central directory record.
///
/// Without an archive comment the record sits at the very end; otherwise
/// scan backwards from there, window by window, down to the file start.
fn find_eocd<R: Read + Seek>(file: &mut R) -> ZipResult<(EndOfCentralDirectory, u64)> {
    let file_size = file.seek(SeekFrom::End(0))?;
    if file_size < EOCD_LEN as u64 {
        return Err(ZipError::NotZipFile);
    }

    let last = file_size - EOCD_LEN as u64;
    if let Some(eocd) = read_eocd_at(file, last, file_size)? {
        return Ok((eocd, last));
    }

    let mut buf = vec![0u8; EOCD_SCAN_WINDOW];
    // Exclusive end of the region in which a signature may start + 4.
    let mut hi = last + 4;
    loop {
        let lo = hi.saturating_sub(EOCD_SCAN_WINDOW as u64);
        let n = (hi - lo) as usize;
        if n < 4 {
            break;
        }
        file.seek(SeekFrom::Start(lo))?;
        file.read_exact(&mut buf[..n])?;

        for i in (0..=n - 4).rev() {
            if load_u32(&buf, i) == SIG_END_OF_CENTRAL_DIR {
                let pos = lo + i as u64;
                if pos == last {
                    continue;
                }
                if let Some(eocd) = read_eocd_at(file, pos, file_size)? {
                    return Ok((eocd, pos));
                }
            }
        }

        if lo == 0 {
            break;
        }
        // Overlap so a signature straddling two windows is still seen.
        hi = lo + 3;
    }

    Err(ZipError::NotZipFile)
}

/// Parse a candidate end record at `pos`; it only counts if its comment
/// runs exactly to the end of the file.
fn read_eocd_at<R: Read + Seek>(
    file: &mut R,
    pos: u64,
    file_size: u64,
) -> ZipResult<Option<EndOfCentralDirectory>> {
    let mut buf = [0u8; EOCD_LEN];
    file.seek(SeekFrom::Start(pos))?;
    file.read_exact(&mut buf)?;
    Ok(EndOfCentralDirectory::parse(&buf)
        .filter(|e| pos + EOCD_LEN as u64 + e.comment_len as u64 == file_size))
}

fn read_cd_record<R: Read + Seek>(
    file: &mut R,
) -> ZipResult<(CentralDirectoryRecord, Vec<u8>, Vec<u8>)> {
    let offset = file.stream_position()?;
    let mut buf = [0u8; CENTRAL_RECORD_LEN];
    file.read_exact(&mut buf)?;
    let record = CentralDirectoryRecord::parse(&buf).ok_or(ZipError::BadSignature {
        record: "central directory",
        offset,
    })?;

    let mut raw_name = vec![0u8; record.name_len as usize];
    file.read_exact(&mut raw_name)?;
    file.seek(SeekFrom::Current(record.extra_len as i64))?;
    let mut raw_comment = vec![0u8; record.comment_len as usize];
    file.read_exact(&mut raw_comment)?;

    Ok((record, raw_name, raw_comment))
}

/// Turn a central directory record into an index entry, rejecting what
/// this reader cannot extract.
fn make_entry(
    record: CentralDirectoryRecord,
    raw_name: Vec<u8>,
    raw_comment: &[u8],
) -> ZipResult<ZipEntry> {
    let method = CompressionMethod::from_u16(record.method);
    if let CompressionMethod::Unknown(n) = method {
        return Err(ZipError::UnsupportedMethod(n));
    }
    // High byte is the host system on some writers.
    if record.version_needed & 0xff > MAX_VERSION_NEEDED {
        return Err(ZipError::UnsupportedVersion(record.version_needed));
    }
    if raw_name.is_empty() {
        return Err(ZipError::InvalidEntryName);
    }

    Ok(ZipEntry {
        name: decode_name(&raw_name, record.flags),
        comment: decode_name(raw_comment, record.flags),
        raw_name,
        local_header_offset: record.local_header_offset,
        data_offset: None,
        version_needed: record.version_needed,
        flags: record.flags,
        compression_method: method,
        modified: DosDateTime::new(record.mod_time, record.mod_date),
        crc32: record.crc32,
        compressed_size: record.compressed_size,
        uncompressed_size: record.uncompressed_size,
        external_attr: record.external_attr,
    })
}

/// Cross-check the local header (and data descriptor, if any) against the
/// central directory copy. Returns the payload offset.
fn validate_local_header<R: Read + Seek>(file: &mut R, entry: &ZipEntry) -> ZipResult<u32> {
    let mismatch = |field| ZipError::HeaderMismatch {
        name: entry.name.clone(),
        field,
    };

    let file_size = file.seek(SeekFrom::End(0))?;
    let offset = entry.local_header_offset as u64;
    if offset + LOCAL_HEADER_LEN as u64 > file_size {
        return Err(ZipError::BadSignature {
            record: "local file header",
            offset,
        });
    }
    let mut buf = [0u8; LOCAL_HEADER_LEN];
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(&mut buf)?;
    let local = LocalFileHeader::parse(&buf).ok_or(ZipError::BadSignature {
        record: "local file header",
        offset,
    })?;

    if local.method != entry.compression_method.as_u16() {
        return Err(mismatch("compression method"));
    }
    if local.flags != entry.flags {
        return Err(mismatch("flags"));
    }
    if local.mod_time != entry.modified.time {
        return Err(mismatch("modification time"));
    }
    if local.mod_date != entry.modified.date {
        return Err(mismatch("modification date"));
    }
    if !entry.has_data_descriptor() {
        if local.crc32 != entry.crc32 {
            return Err(mismatch("crc32"));
        }
        if local.compressed_size != entry.compressed_size {
            return Err(mismatch("compressed size"));
        }
        if local.uncompressed_size != entry.uncompressed_size {
            return Err(mismatch("uncompressed size"));
        }
    }

    // Name, extra field, payload and descriptor must all fit in the stream.
    let mut entry_end = offset
        + (LOCAL_HEADER_LEN + local.name_len as usize + local.extra_len as usize) as u64
        + entry.compressed_size as u64;
    if entry.has_data_descriptor() {
        entry_end += DATA_DESCRIPTOR_LEN as u64;
    }
    if entry_end > file_size {
        return Err(mismatch("compressed size"));
    }

    if local.name_len as usize != entry.raw_name.len() {
        return Err(mismatch("name"));
    }
    let mut name = vec![0u8; local.name_len as usize];
    file.read_exact(&mut name)?;
    if name != entry.raw_name {
        return Err(mismatch("name"));
    }

    let data_offset = offset + (LOCAL_HEADER_LEN + name.len() + local.extra_len as usize) as u64;
    let data_offset = u32::try_from(data_offset).map_err(|_| mismatch("extra field length"))?;

    if entry.has_data_descriptor() {
        let dd = read_data_descriptor(file, data_offset as u64 + entry.compressed_size as u64)
            .map_err(|e| truncated_as_mismatch(e, &entry.name, "data descriptor"))?;
        if dd.crc32 != entry.crc32 {
            return Err(mismatch("crc32"));
        }
        if dd.compressed_size != entry.compressed_size {
            return Err(mismatch("compressed size"));
        }
        if dd.uncompressed_size != entry.uncompressed_size {
            return Err(mismatch("uncompressed size"));
        }
    }

    Ok(data_offset)
}

/// A record that ends early is damage to this entry, not an I/O failure.
fn truncated_as_mismatch(e: ZipError, name: &str, field: &'static str) -> ZipError {
    match e {
        ZipError::Io(ref err) if err.kind() == io::ErrorKind::UnexpectedEof => {
            ZipError::HeaderMismatch {
                name: name.to_string(),
                field,
            }
        }
        other => other,
    }
}

/// The descriptor signature is optional, so sniff for it.
fn read_data_descriptor<R: Read + Seek>(file: &mut R, pos: u64) -> ZipResult<DataDescriptor> {
    let mut buf = [0u8; DATA_DESCRIPTOR_LEN + 4];
    file.seek(SeekFrom::Start(pos))?;
    file.read_exact(&mut buf[..4])?;
    let body = if load_u32(&buf, 0) == SIG_DATA_DESCRIPTOR {
        file.read_exact(&mut buf[4..])?;
        &buf[4..]
    } else {
        file.read_exact(&mut buf[4..DATA_DESCRIPTOR_LEN])?;
        &buf[..DATA_DESCRIPTOR_LEN]
    };
    let mut fixed = [0u8; DATA_DESCRIPTOR_LEN];
    fixed.copy_from_slice(body);
    Ok(DataDescriptor::parse(&fixed))
}

/// Archive comments carry no encoding flag: take UTF-8 when it parses.
fn decode_comment(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => decode_name(bytes, 0),
    }
}
