use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::compress::{Written, deflate, raw};
use crate::crypto::{ENCR_HEADER_LEN, HeaderRng, ZipCrypto};
use crate::dostime::DosDateTime;
use crate::encoding::{FLAG_UTF8, encode_name};
use crate::entry::{
    ATTR_ARCHIVE, ATTR_DIRECTORY, CompressionMethod, FLAG_DATA_DESCR, FLAG_ENCRYPTED, ZipEntry,
};
use crate::error::{ZipError, ZipResult};
use crate::format::{
    CentralDirectoryRecord, DataDescriptor, EndOfCentralDirectory, LOCAL_CRC_OFFSET,
    LocalFileHeader, VERSION_DEFLATE, VERSION_MADE_BY, VERSION_STORE,
};
use crate::level::{self, CompressionLevel};

/// Size of each of the two scratch buffers a handle owns.
pub const BUFFER_SIZE: usize = 256 * 1024;

/// Description of one member to be added, supplied by whoever walks the
/// source tree.
#[derive(Debug, Clone)]
pub struct EntrySource {
    pub name: String,
    pub comment: String,
    pub modified: DosDateTime,
    /// Expected payload size; drives the store/deflate decision.
    pub size: u64,
    pub is_dir: bool,
}

impl EntrySource {
    pub fn file(name: &str, size: u64, modified: DosDateTime) -> Self {
        Self {
            name: name.to_string(),
            comment: String::new(),
            modified,
            size,
            is_dir: false,
        }
    }

    pub fn directory(name: &str, modified: DosDateTime) -> Self {
        Self {
            name: name.to_string(),
            comment: String::new(),
            modified,
            size: 0,
            is_dir: true,
        }
    }

    pub fn with_comment(mut self, comment: &str) -> Self {
        self.comment = comment.to_string();
        self
    }
}

/// Writes a PKZIP 2.0 archive, one entry at a time.
///
/// Entries are written as they are added; the central directory and end
/// record go out on [`close`](Self::close), [`into_inner`](Self::into_inner)
/// or drop.
pub struct ZipWriter<W: Write + Seek> {
    inner: Option<W>,
    entries: Vec<ZipEntry>,
    names: HashSet<String>,
    password: Option<String>,
    comment: String,
    rng: HeaderRng,
    in_buf: Vec<u8>,
    out_buf: Vec<u8>,
}

impl ZipWriter<File> {
    /// Create (or truncate) an archive file.
    pub fn create<P: AsRef<Path>>(path: P) -> ZipResult<Self> {
        let file = File::create(path).map_err(ZipError::CantOpenFile)?;
        Ok(Self::new(file))
    }
}

impl<W: Write + Seek> ZipWriter<W> {
    pub fn new(inner: W) -> Self {
        ZipWriter {
            inner: Some(inner),
            entries: Vec::new(),
            names: HashSet::new(),
            password: None,
            comment: String::new(),
            rng: HeaderRng::from_time(),
            in_buf: vec![0u8; BUFFER_SIZE],
            out_buf: vec![0u8; BUFFER_SIZE],
        }
    }

    /// Encrypt entries added from now on.
    pub fn set_password(&mut self, password: &str) {
        self.password = Some(password.to_string());
    }

    pub fn clear_password(&mut self) {
        self.password = None;
    }

    /// Archive comment stored in the end of central directory record.
    pub fn set_comment(&mut self, comment: &str) {
        self.comment = comment.to_string();
    }

    /// Seed the generator for encryption-header random bytes, making
    /// encrypted output reproducible.
    pub fn set_seed(&mut self, seed: u64) {
        self.rng = HeaderRng::new(seed);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(&normalize_name(name, false))
            || self.names.contains(&normalize_name(name, true))
    }

    pub fn add_bytes(
        &mut self,
        name: &str,
        data: &[u8],
        modified: DosDateTime,
        level: CompressionLevel,
    ) -> ZipResult<()> {
        let source = EntrySource::file(name, data.len() as u64, modified);
        self.add_entry(&source, &mut &data[..], level)
    }

    pub fn add_directory(&mut self, name: &str, modified: DosDateTime) -> ZipResult<()> {
        self.add_entry(
            &EntrySource::directory(name, modified),
            &mut io::empty(),
            CompressionLevel::Store,
        )
    }

    /// Add the file at `path` under `name`, taking size and modification
    /// time from the filesystem.
    pub fn add_file<P: AsRef<Path>>(
        &mut self,
        path: P,
        name: &str,
        level: CompressionLevel,
    ) -> ZipResult<()> {
        let mut file = File::open(path.as_ref()).map_err(ZipError::CantOpenFile)?;
        let meta = file.metadata()?;
        let modified = meta
            .modified()
            .map(DosDateTime::from_system_time)
            .unwrap_or_else(|_| DosDateTime::now());
        let source = EntrySource::file(name, meta.len(), modified);
        self.add_entry(&source, &mut file, level)
    }

    /// Add `path` under `name`; directories are walked recursively in
    /// name order.
    pub fn add_path<P: AsRef<Path>>(
        &mut self,
        path: P,
        name: &str,
        level: CompressionLevel,
    ) -> ZipResult<()> {
        let path = path.as_ref();
        let meta = fs::metadata(path).map_err(ZipError::CantOpenFile)?;
        if !meta.is_dir() {
            return self.add_file(path, name, level);
        }

        let modified = meta
            .modified()
            .map(DosDateTime::from_system_time)
            .unwrap_or_else(|_| DosDateTime::now());
        let dir_name = normalize_name(name, true);
        if !dir_name.is_empty() {
            self.add_directory(&dir_name, modified)?;
        }

        let mut children: Vec<_> = fs::read_dir(path)?.collect::<io::Result<Vec<_>>>()?;
        children.sort_by_key(|c| c.file_name());
        for child in children {
            let child_name = format!("{dir_name}{}", child.file_name().to_string_lossy());
            self.add_path(child.path(), &child_name, level)?;
        }
        Ok(())
    }

    /// Write one entry: local header, optional encryption header, payload,
    /// then back-patch CRC and sizes.
    pub fn add_entry<R: Read>(
        &mut self,
        source: &EntrySource,
        reader: &mut R,
        level: CompressionLevel,
    ) -> ZipResult<()> {
        let inner = self.inner.as_mut().ok_or(ZipError::ArchiveClosed)?;

        let name = normalize_name(&source.name, source.is_dir);
        if name.is_empty() || name == "/" {
            return Err(ZipError::InvalidEntryName);
        }
        if self.names.contains(&name) {
            return Err(ZipError::DuplicateEntry(name));
        }

        let resolved = level::resolve(level, &name, source.size, source.is_dir);
        let encrypt = self.password.is_some() && !source.is_dir;

        let (raw_name, _, text_flags) = encode_name_and_comment(&name, &source.comment);
        let mut flags = text_flags;
        if encrypt {
            // CRC is unknown when the encryption header is written, so the
            // password check byte comes from the mod time instead.
            flags |= FLAG_ENCRYPTED | FLAG_DATA_DESCR;
        }
        let version_needed = if encrypt || resolved.method == CompressionMethod::Deflate {
            VERSION_DEFLATE
        } else {
            VERSION_STORE
        };

        let offset = inner.stream_position()?;
        let local_header_offset = to_u32(offset, "archive offset")?;

        let header = LocalFileHeader {
            version_needed,
            flags,
            method: resolved.method.as_u16(),
            mod_time: source.modified.time,
            mod_date: source.modified.date,
            crc32: 0,
            compressed_size: 0,
            uncompressed_size: source.size.min(u32::MAX as u64) as u32,
            name_len: to_u16(raw_name.len(), "entry name")?,
            extra_len: 0,
        };
        inner.write_all(&header.to_bytes())?;
        inner.write_all(&raw_name)?;

        let mut crypto = match &self.password {
            Some(pwd) if encrypt => {
                let mut c = ZipCrypto::new(pwd.as_bytes());
                let mut random = [0u8; ENCR_HEADER_LEN - 2];
                self.rng.fill(&mut random);
                inner.write_all(&c.encrypt_header(&random, source.modified.time))?;
                Some(c)
            }
            _ => None,
        };

        let written = if source.is_dir {
            Written::default()
        } else {
            match resolved.method {
                CompressionMethod::Deflate => deflate::compress_deflate(
                    reader,
                    inner,
                    resolved.level,
                    resolved.strategy,
                    crypto.as_mut(),
                    &mut self.in_buf,
                    &mut self.out_buf,
                )?,
                _ => raw::store_raw(reader, inner, crypto.as_mut(), &mut self.in_buf)?,
            }
        };

        let header_len = if encrypt { ENCR_HEADER_LEN as u64 } else { 0 };
        let compressed_size = to_u32(written.compressed_size + header_len, "compressed size")?;
        let uncompressed_size = to_u32(written.uncompressed_size, "uncompressed size")?;

        let end = inner.stream_position()?;
        let mut patch = [0u8; 12];
        patch[0..4].copy_from_slice(&written.crc32.to_le_bytes());
        patch[4..8].copy_from_slice(&compressed_size.to_le_bytes());
        patch[8..12].copy_from_slice(&uncompressed_size.to_le_bytes());
        inner.seek(SeekFrom::Start(offset + LOCAL_CRC_OFFSET))?;
        inner.write_all(&patch)?;
        inner.seek(SeekFrom::Start(end))?;

        if flags & FLAG_DATA_DESCR != 0 {
            let dd = DataDescriptor {
                crc32: written.crc32,
                compressed_size,
                uncompressed_size,
            };
            inner.write_all(&dd.to_bytes())?;
        }

        log::debug!(
            "[ZIP] added '{}' ({}, {} -> {} bytes{})",
            name,
            resolved.method,
            uncompressed_size,
            compressed_size,
            if encrypt { ", encrypted" } else { "" }
        );

        self.names.insert(name.clone());
        self.entries.push(ZipEntry {
            name,
            raw_name,
            comment: source.comment.clone(),
            local_header_offset,
            data_offset: None,
            version_needed,
            flags,
            compression_method: resolved.method,
            modified: source.modified,
            crc32: written.crc32,
            compressed_size,
            uncompressed_size,
            external_attr: if source.is_dir {
                ATTR_DIRECTORY
            } else {
                ATTR_ARCHIVE
            },
        });

        Ok(())
    }

    /// Write the central directory and end record, then release the stream.
    /// Closing twice is a no-op.
    pub fn close(&mut self) -> ZipResult<()> {
        self.finish().map(drop)
    }

    /// Finish the archive and hand back the underlying stream.
    pub fn into_inner(mut self) -> ZipResult<W> {
        self.finish()?.ok_or(ZipError::ArchiveClosed)
    }

    fn finish(&mut self) -> ZipResult<Option<W>> {
        let Some(mut inner) = self.inner.take() else {
            return Ok(None);
        };

        let cd_start = inner.stream_position()?;
        for entry in &self.entries {
            let (_, raw_comment, _) = encode_name_and_comment(&entry.name, &entry.comment);
            let record = CentralDirectoryRecord {
                version_made_by: VERSION_MADE_BY,
                version_needed: entry.version_needed,
                flags: entry.flags,
                method: entry.compression_method.as_u16(),
                mod_time: entry.modified.time,
                mod_date: entry.modified.date,
                crc32: entry.crc32,
                compressed_size: entry.compressed_size,
                uncompressed_size: entry.uncompressed_size,
                name_len: to_u16(entry.raw_name.len(), "entry name")?,
                extra_len: 0,
                comment_len: to_u16(raw_comment.len(), "entry comment")?,
                disk_start: 0,
                internal_attr: 0,
                external_attr: entry.external_attr,
                local_header_offset: entry.local_header_offset,
            };
            inner.write_all(&record.to_bytes())?;
            inner.write_all(&entry.raw_name)?;
            inner.write_all(&raw_comment)?;
        }
        let cd_end = inner.stream_position()?;

        let (raw_comment, _) = encode_name(&self.comment);
        let count = to_u16(self.entries.len(), "entry count")?;
        let eocd = EndOfCentralDirectory {
            disk_number: 0,
            cd_disk: 0,
            disk_entries: count,
            total_entries: count,
            cd_size: to_u32(cd_end - cd_start, "central directory size")?,
            cd_offset: to_u32(cd_start, "central directory offset")?,
            comment_len: to_u16(raw_comment.len(), "archive comment")?,
        };
        inner.write_all(&eocd.to_bytes())?;
        inner.write_all(&raw_comment)?;
        inner.flush()?;

        log::debug!(
            "[ZIP] wrote central directory: {} entries, {} bytes at offset {}",
            count,
            cd_end - cd_start,
            cd_start
        );
        Ok(Some(inner))
    }
}

impl<W: Write + Seek> Drop for ZipWriter<W> {
    fn drop(&mut self) {
        if self.inner.is_some() {
            if let Err(e) = self.finish() {
                log::warn!("[ZIP] failed to finish archive on drop: {e}");
            }
        }
    }
}

/// Forward slashes, no leading slash, trailing slash exactly for directories.
fn normalize_name(name: &str, is_dir: bool) -> String {
    let mut n = name.replace('\\', "/").trim_start_matches('/').to_string();
    if is_dir && !n.is_empty() && !n.ends_with('/') {
        n.push('/');
    }
    n
}

/// Name and comment share the UTF-8 flag, so both go UTF-8 if either needs it.
fn encode_name_and_comment(name: &str, comment: &str) -> (Vec<u8>, Vec<u8>, u16) {
    let (raw_name, name_flags) = encode_name(name);
    let (raw_comment, comment_flags) = encode_name(comment);
    if name_flags == comment_flags {
        (raw_name, raw_comment, name_flags)
    } else {
        (
            name.as_bytes().to_vec(),
            comment.as_bytes().to_vec(),
            FLAG_UTF8,
        )
    }
}

fn to_u32(v: u64, what: &str) -> ZipResult<u32> {
    u32::try_from(v)
        .map_err(|_| ZipError::Io(io::Error::other(format!("{what} exceeds 4 GiB limit"))))
}

fn to_u16(v: usize, what: &str) -> ZipResult<u16> {
    u16::try_from(v).map_err(|_| ZipError::Io(io::Error::other(format!("{what} too long"))))
}
