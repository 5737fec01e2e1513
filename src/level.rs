//! Choice of compression method, deflate level and strategy for an entry.

use std::str::FromStr;

use crate::entry::CompressionMethod;

/// Payloads shorter than this are always stored: deflate's block overhead
/// would make them larger.
pub const STORE_THRESHOLD: u64 = 60;

/// Deflate level used by [`CompressionLevel::AutoByCpu`].
pub const AUTO_CPU_LEVEL: u8 = 5;
/// Level for binaries that compress poorly and slowly.
const LOW_LEVEL: u8 = 2;
const MAX_LEVEL: u8 = 9;

/// Already-compressed formats: images, audio, video, archives.
const INCOMPRESSIBLE: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "mp3", "ogg", "ogm", "flac", "avi", "mov", "mkv", "mp4", "rm",
    "ra", "zip", "rar", "bz2", "gz", "xz", "7z", "z", "jar",
];

const POOR_BINARIES: &[&str] = &["exe", "bin", "rpm", "deb", "dll", "so"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionLevel {
    Store,
    /// Explicit deflate level, 1 (fastest) to 9 (smallest).
    Level(u8),
    /// A fixed middle level that keeps the CPU cost moderate.
    AutoByCpu,
    /// Pick by file extension: store media/archives, go easy on binaries,
    /// compress everything else fully.
    AutoByContentType,
    /// Like `AutoByContentType`, but binaries get the CPU-balanced level.
    AutoFull,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Default,
    /// Tuned for PNG-style filtered data.
    Filtered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved {
    pub method: CompressionMethod,
    /// Deflate level 1-9; 0 when stored.
    pub level: u8,
    pub strategy: Strategy,
}

impl Resolved {
    const STORE: Resolved = Resolved {
        method: CompressionMethod::Store,
        level: 0,
        strategy: Strategy::Default,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContentClass {
    Incompressible,
    PoorBinary,
    Other,
}

fn extension(name: &str) -> Option<String> {
    let file = name.rsplit('/').next().unwrap_or(name);
    let (stem, ext) = file.rsplit_once('.')?;
    if stem.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

fn classify(name: &str) -> ContentClass {
    match extension(name) {
        Some(ext) if INCOMPRESSIBLE.contains(&ext.as_str()) => ContentClass::Incompressible,
        Some(ext) if POOR_BINARIES.contains(&ext.as_str()) => ContentClass::PoorBinary,
        _ => ContentClass::Other,
    }
}

/// Resolve `level` for an entry called `name` carrying `size` payload bytes.
pub fn resolve(level: CompressionLevel, name: &str, size: u64, is_dir: bool) -> Resolved {
    if is_dir || size < STORE_THRESHOLD {
        return Resolved::STORE;
    }

    let concrete = match level {
        CompressionLevel::Store => 0,
        CompressionLevel::Level(n) => n.min(MAX_LEVEL),
        CompressionLevel::AutoByCpu => AUTO_CPU_LEVEL,
        CompressionLevel::AutoByContentType => match classify(name) {
            ContentClass::Incompressible => 0,
            ContentClass::PoorBinary => LOW_LEVEL,
            ContentClass::Other => MAX_LEVEL,
        },
        CompressionLevel::AutoFull => match classify(name) {
            ContentClass::Incompressible => 0,
            ContentClass::PoorBinary => AUTO_CPU_LEVEL,
            ContentClass::Other => MAX_LEVEL,
        },
    };
    if concrete == 0 {
        return Resolved::STORE;
    }

    let strategy = if extension(name).as_deref() == Some("png") {
        Strategy::Filtered
    } else {
        Strategy::Default
    };
    Resolved {
        method: CompressionMethod::Deflate,
        level: concrete,
        strategy,
    }
}

impl FromStr for CompressionLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "store" | "0" => Ok(Self::Store),
            "cpu" => Ok(Self::AutoByCpu),
            "mime" | "type" => Ok(Self::AutoByContentType),
            "full" | "auto" => Ok(Self::AutoFull),
            other => match other.parse::<u8>() {
                Ok(n @ 1..=9) => Ok(Self::Level(n)),
                _ => Err(format!(
                    "invalid level '{s}': expected store, 1-9, cpu, mime or full"
                )),
            },
        }
    }
}
