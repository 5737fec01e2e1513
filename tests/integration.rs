use std::io::Cursor;
use std::sync::atomic::{AtomicU32, Ordering};

use pkzip_rs::format::{
    CENTRAL_RECORD_LEN, EOCD_LEN, EndOfCentralDirectory, LOCAL_HEADER_LEN, SIG_DATA_DESCRIPTOR,
    load_u16, load_u32,
};
use pkzip_rs::{
    ArchiveStatus, CompressionLevel, CompressionMethod, DosDateTime, PasswordProvider,
    ReaderOptions, ZipError, ZipReader, ZipWriter,
};

/// 2024-10-18 13:17:02
const MOD: DosDateTime = DosDateTime {
    time: 0x6a21,
    date: 0x5952,
};

const SEED: u64 = 42;

static COUNTER: AtomicU32 = AtomicU32::new(0);

/// Per-test unique directory to avoid conflicts with parallel test execution.
fn test_dir() -> std::path::PathBuf {
    let n = COUNTER.fetch_add(1, Ordering::SeqCst);
    let dir = std::env::temp_dir().join(format!("pkzip-rs-test-{}-{n}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn payload(len: usize) -> Vec<u8> {
    b"Rashomon;Kurosawa;1950\n"
        .iter()
        .cycle()
        .take(len)
        .copied()
        .collect()
}

fn build(
    password: Option<&str>,
    entries: &[(&str, &[u8])],
    level: CompressionLevel,
) -> Vec<u8> {
    let mut w = ZipWriter::new(Cursor::new(Vec::new()));
    w.set_seed(SEED);
    if let Some(pwd) = password {
        w.set_password(pwd);
    }
    for (name, data) in entries {
        w.add_bytes(name, data, MOD, level).unwrap();
    }
    w.into_inner().unwrap().into_inner()
}

fn eocd(bytes: &[u8]) -> EndOfCentralDirectory {
    EndOfCentralDirectory::parse(&bytes[bytes.len() - EOCD_LEN..]).unwrap()
}

/// Queue of answers; `None` once it runs dry.
struct Answers(Vec<&'static str>);

impl PasswordProvider for Answers {
    fn password(&mut self, _entry: &str) -> Option<String> {
        if self.0.is_empty() {
            None
        } else {
            Some(self.0.remove(0).to_string())
        }
    }
}

#[test]
fn roundtrip_around_store_threshold() {
    for len in [59usize, 60, 61] {
        for password in [None, Some("hunter2")] {
            for level in [CompressionLevel::Store, CompressionLevel::Level(9)] {
                let data = payload(len);
                let bytes = build(password, &[("film.csv", data.as_slice())], level);

                let mut r = ZipReader::from_bytes(bytes).unwrap();
                if let Some(pwd) = password {
                    r.set_password(pwd);
                }
                let info = r.entry("film.csv").unwrap();
                assert_eq!(info.is_encrypted, password.is_some());
                assert_eq!(info.uncompressed_size, len as u32);
                assert_eq!(info.crc32, crc32fast::hash(&data));
                assert_eq!(r.read("film.csv").unwrap(), data, "len {len} {level:?}");
            }
        }
    }
}

#[test]
fn small_payloads_are_stored() {
    let data = payload(59);
    let bytes = build(None, &[("short.txt", data.as_slice())], CompressionLevel::Level(9));
    let r = ZipReader::from_bytes(bytes).unwrap();
    let info = r.entry("short.txt").unwrap();
    assert_eq!(info.compression_method, CompressionMethod::Store);
    assert_eq!(info.compressed_size, 59);

    let data = payload(60);
    let bytes = build(None, &[("long.txt", data.as_slice())], CompressionLevel::Level(9));
    let r = ZipReader::from_bytes(bytes).unwrap();
    assert_eq!(
        r.entry("long.txt").unwrap().compression_method,
        CompressionMethod::Deflate
    );
}

#[test]
fn media_stored_by_content_type() {
    let data = payload(10 * 1024);
    let bytes = build(
        None,
        &[("cover.png", data.as_slice()), ("notes.txt", data.as_slice())],
        CompressionLevel::AutoByContentType,
    );
    let mut r = ZipReader::from_bytes(bytes).unwrap();

    let png = r.entry("cover.png").unwrap();
    assert_eq!(png.compression_method, CompressionMethod::Store);
    assert_eq!(png.compressed_size, png.uncompressed_size);

    let txt = r.entry("notes.txt").unwrap();
    assert_eq!(txt.compression_method, CompressionMethod::Deflate);
    assert!(txt.compressed_size < txt.uncompressed_size);
    assert_eq!(r.read("cover.png").unwrap(), data);
}

#[test]
fn encrypted_notes_scenario() {
    let data = payload(5000);
    let bytes = build(
        Some("hunter2"),
        &[("notes.txt", data.as_slice())],
        CompressionLevel::AutoFull,
    );

    let mut r = ZipReader::from_bytes(bytes).unwrap();
    assert!(r.contains("notes.txt"));
    assert_eq!(r.entries().len(), 1);

    r.set_password("hunter2");
    let out = r.read("notes.txt").unwrap();
    assert_eq!(out.len(), 5000);
    assert_eq!(out, data);
    assert_eq!(crc32fast::hash(&out), r.entry("notes.txt").unwrap().crc32);
}

#[test]
fn sizes_agree_across_headers() {
    let data = payload(5000);
    let bytes = build(
        Some("hunter2"),
        &[("notes.txt", data.as_slice())],
        CompressionLevel::AutoFull,
    );
    let name_len = "notes.txt".len();

    let local_crc = load_u32(&bytes, 14);
    let local_csize = load_u32(&bytes, 18);
    let local_usize = load_u32(&bytes, 22);

    let dd = LOCAL_HEADER_LEN + name_len + local_csize as usize;
    assert_eq!(load_u32(&bytes, dd), SIG_DATA_DESCRIPTOR);
    assert_eq!(load_u32(&bytes, dd + 4), local_crc);
    assert_eq!(load_u32(&bytes, dd + 8), local_csize);
    assert_eq!(load_u32(&bytes, dd + 12), local_usize);

    let cd = eocd(&bytes).cd_offset as usize;
    assert_eq!(cd, dd + 16);
    assert_eq!(load_u16(&bytes, cd + 8), load_u16(&bytes, 6));
    assert_eq!(load_u32(&bytes, cd + 16), local_crc);
    assert_eq!(load_u32(&bytes, cd + 20), local_csize);
    assert_eq!(load_u32(&bytes, cd + 24), local_usize);
    assert_eq!(local_usize, 5000);
    assert_eq!(local_crc, crc32fast::hash(&data));
}

#[test]
fn wrong_password_rejected() {
    let data = payload(5000);
    let bytes = build(
        Some("hunter2"),
        &[("notes.txt", data.as_slice())],
        CompressionLevel::AutoFull,
    );

    let mut r = ZipReader::from_bytes(bytes).unwrap();
    r.set_password("hunter3");
    let err = r.read("notes.txt").unwrap_err();
    assert!(matches!(err, ZipError::InvalidPassword { ref name } if name == "notes.txt"));
    assert!(err.is_authentication());

    r.set_password("hunter2");
    assert_eq!(r.read("notes.txt").unwrap(), data);
}

#[test]
fn flipped_payload_byte_fails_crc() {
    let data = payload(200);
    let mut bytes = build(None, &[("a.txt", data.as_slice())], CompressionLevel::Store);
    bytes[LOCAL_HEADER_LEN + 5 + 100] ^= 0xff;

    let mut r = ZipReader::from_bytes(bytes).unwrap();
    let err = r.read("a.txt").unwrap_err();
    assert!(matches!(err, ZipError::CrcMismatch { .. }));
    assert!(err.is_entry_corruption());
}

#[test]
fn corrupted_entry_dropped_by_extract_all() {
    let data = payload(200);
    let mut bytes = build(
        None,
        &[("a.txt", data.as_slice()), ("b.txt", data.as_slice())],
        CompressionLevel::Store,
    );
    bytes[LOCAL_HEADER_LEN + 5 + 100] ^= 0xff;

    let dir = test_dir();
    let mut r = ZipReader::from_bytes(bytes).unwrap();
    let summary = r.extract_all(&dir).unwrap();

    assert_eq!(summary.extracted, 1);
    assert_eq!(summary.corrupted, 1);
    assert!(!dir.join("a.txt").exists());
    assert_eq!(std::fs::read(dir.join("b.txt")).unwrap(), data);
    assert!(!r.contains("a.txt"));
    assert_eq!(r.corrupted_entries(), 1);
}

fn three_entries_third_record_garbled() -> Vec<u8> {
    let data = payload(100);
    let mut bytes = build(
        None,
        &[("a.txt", data.as_slice()), ("b.txt", data.as_slice()), ("c.txt", data.as_slice())],
        CompressionLevel::AutoFull,
    );
    let third = eocd(&bytes).cd_offset as usize + 2 * (CENTRAL_RECORD_LEN + 5);
    bytes[third] = b'X';
    bytes
}

#[test]
fn partially_corrupted_directory() {
    let mut r = ZipReader::from_bytes(three_entries_third_record_garbled()).unwrap();
    assert_eq!(
        r.status(),
        ArchiveStatus::PartiallyCorrupted {
            parsed: 2,
            declared: 3
        }
    );
    assert_eq!(r.names(), vec!["a.txt".to_string(), "b.txt".to_string()]);
    assert_eq!(r.corrupted_entries(), 1);
    assert_eq!(r.read("b.txt").unwrap(), payload(100));
}

#[test]
fn strict_mode_refuses_partial_directory() {
    let cursor = Cursor::new(three_entries_third_record_garbled());
    let result = ZipReader::with_options(cursor, ReaderOptions::default().with_strict(true));
    assert!(matches!(
        result,
        Err(ZipError::PartiallyCorrupted {
            parsed: 2,
            declared: 3
        })
    ));
}

#[test]
fn first_record_garbled_is_fatal() {
    let data = payload(100);
    let mut bytes = build(None, &[("a.txt", data.as_slice())], CompressionLevel::Store);
    let cd = eocd(&bytes).cd_offset as usize;
    bytes[cd] = b'X';
    assert!(matches!(
        ZipReader::from_bytes(bytes),
        Err(ZipError::CorruptedArchive)
    ));
}

#[test]
fn reject_non_zip() {
    let junk = vec![0x42u8; 4096];
    assert!(matches!(
        ZipReader::from_bytes(junk),
        Err(ZipError::NotZipFile)
    ));
}

#[test]
fn archive_comment_roundtrip() {
    let mut w = ZipWriter::new(Cursor::new(Vec::new()));
    w.set_comment("Film collection, autumn 2026");
    w.add_bytes("a.txt", b"abc", MOD, CompressionLevel::Store)
        .unwrap();
    let bytes = w.into_inner().unwrap().into_inner();

    let r = ZipReader::from_bytes(bytes).unwrap();
    assert_eq!(r.comment(), "Film collection, autumn 2026");
    assert_eq!(r.len(), 1);
}

#[test]
fn names_keep_their_encoding() {
    let bytes = build(
        None,
        &[("café.txt", &b"latin"[..]), ("映画/一覧.txt", &b"utf8"[..])],
        CompressionLevel::Store,
    );
    let mut r = ZipReader::from_bytes(bytes).unwrap();
    assert!(r.contains("café.txt"));
    assert!(r.contains("映画/一覧.txt"));
    assert_eq!(r.read("映画/一覧.txt").unwrap(), b"utf8");
}

#[test]
fn provider_exhaustion_skips_remaining_encrypted() {
    let data = payload(300);
    let mut w = ZipWriter::new(Cursor::new(Vec::new()));
    w.set_seed(SEED);
    w.set_password("hunter2");
    w.add_bytes("a.txt", &data, MOD, CompressionLevel::AutoFull)
        .unwrap();
    w.add_bytes("b.txt", &data, MOD, CompressionLevel::AutoFull)
        .unwrap();
    w.clear_password();
    w.add_bytes("c.txt", &data, MOD, CompressionLevel::AutoFull)
        .unwrap();
    let bytes = w.into_inner().unwrap().into_inner();

    let mut r = ZipReader::from_bytes(bytes).unwrap();
    r.set_password_provider(Box::new(Answers(vec!["nope"])));
    let summary = r.test_all().unwrap();
    assert_eq!(summary.extracted, 1);
    assert_eq!(summary.skipped_encrypted, 2);
    assert!(!summary.is_clean());
}

#[test]
fn provider_password_is_reused() {
    let data = payload(300);
    let bytes = build(
        Some("hunter2"),
        &[("a.txt", data.as_slice()), ("b.txt", data.as_slice())],
        CompressionLevel::AutoFull,
    );

    let mut r = ZipReader::from_bytes(bytes).unwrap();
    r.set_password_provider(Box::new(Answers(vec!["nope", "hunter2"])));
    let summary = r.test_all().unwrap();
    assert_eq!(summary.extracted, 2);
    assert!(summary.is_clean());
}

#[test]
fn extract_tree_to_dir() {
    let src = test_dir();
    std::fs::create_dir_all(src.join("db/covers")).unwrap();
    std::fs::write(src.join("db/movies.xml"), payload(4000)).unwrap();
    std::fs::write(src.join("db/covers/seven.png"), payload(2000)).unwrap();
    std::fs::write(src.join("db/readme.txt"), b"hi").unwrap();

    let archive = src.join("db.zip");
    let mut w = ZipWriter::create(&archive).unwrap();
    w.set_password("hunter2");
    w.add_path(src.join("db"), "db", CompressionLevel::AutoFull)
        .unwrap();
    w.close().unwrap();

    let mut r = ZipReader::open(&archive).unwrap();
    assert_eq!(
        r.names(),
        vec![
            "db/",
            "db/covers/",
            "db/covers/seven.png",
            "db/movies.xml",
            "db/readme.txt"
        ]
    );
    assert!(r.entry("db/covers/").unwrap().is_directory);

    let out = src.join("out");
    r.set_password("hunter2");
    let summary = r.extract_all(&out).unwrap();
    assert_eq!(summary.extracted, 5);
    assert!(summary.is_clean());
    assert!(out.join("db/covers").is_dir());
    assert_eq!(std::fs::read(out.join("db/movies.xml")).unwrap(), payload(4000));
    assert_eq!(
        std::fs::read(out.join("db/covers/seven.png")).unwrap(),
        payload(2000)
    );
    assert_eq!(std::fs::read(out.join("db/readme.txt")).unwrap(), b"hi");
}

#[test]
fn extracted_file_gets_entry_mtime() {
    let bytes = build(None, &[("a.txt", &b"abc"[..])], CompressionLevel::Store);
    let dir = test_dir();
    let mut r = ZipReader::from_bytes(bytes).unwrap();
    r.extract("a.txt", &dir).unwrap();

    let mtime = std::fs::metadata(dir.join("a.txt"))
        .unwrap()
        .modified()
        .unwrap();
    assert_eq!(mtime, MOD.to_system_time().unwrap());
}

#[test]
fn reject_path_traversal() {
    let bytes = build(None, &[("../evil.txt", &b"x"[..])], CompressionLevel::Store);
    let dir = test_dir();
    let out = dir.join("out");
    let mut r = ZipReader::from_bytes(bytes).unwrap();
    let err = r.extract("../evil.txt", &out).unwrap_err();
    assert!(matches!(err, ZipError::PathTraversal(_)));
    assert!(!dir.join("evil.txt").exists());
}

fn two_stored_entries() -> Vec<u8> {
    let data = payload(200);
    build(
        None,
        &[("a.txt", data.as_slice()), ("b.txt", data.as_slice())],
        CompressionLevel::Store,
    )
}

#[test]
fn bad_local_offset_only_loses_that_entry() {
    let mut bytes = two_stored_entries();
    let cd = eocd(&bytes).cd_offset as usize;
    bytes[cd + 42..cd + 46].copy_from_slice(&0xF0_0000u32.to_le_bytes());

    let mut r = ZipReader::from_bytes(bytes).unwrap();
    let summary = r.test_all().unwrap();
    assert_eq!(summary.extracted, 1);
    assert_eq!(summary.corrupted, 1);
    assert_eq!(r.names(), vec!["b.txt".to_string()]);
}

#[test]
fn oversized_payload_only_loses_that_entry() {
    let mut bytes = two_stored_entries();
    let cd = eocd(&bytes).cd_offset as usize;
    let huge = 0xF0_0000u32.to_le_bytes();
    bytes[18..22].copy_from_slice(&huge);
    bytes[cd + 20..cd + 24].copy_from_slice(&huge);

    let dir = test_dir();
    let mut r = ZipReader::from_bytes(bytes).unwrap();
    let summary = r.extract_all(&dir).unwrap();
    assert_eq!(summary.extracted, 1);
    assert_eq!(summary.corrupted, 1);
    assert!(!dir.join("a.txt").exists());
    assert_eq!(std::fs::read(dir.join("b.txt")).unwrap(), payload(200));
}
