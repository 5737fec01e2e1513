use std::io::{Read, Write};

use crate::crypto::ZipCrypto;
use crate::error::{ZipError, ZipResult};

/// Copy a stored (method 0) entry payload to `writer`, optionally decrypting.
///
/// `reader` must already sit past the 12-byte encryption header, and `size`
/// excludes it; a trailing data descriptor is never part of `size`.
/// Returns the CRC32 of the plaintext for comparison with the central directory.
pub fn extract_raw<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    size: u64,
    mut crypto: Option<&mut ZipCrypto>,
    buf: &mut [u8],
) -> ZipResult<u32> {
    let mut hasher = crc32fast::Hasher::new();
    let mut remaining = size;

    while remaining > 0 {
        let to_read = (remaining as usize).min(buf.len());
        reader.read_exact(&mut buf[..to_read])?;

        let data = &mut buf[..to_read];
        if let Some(ref mut c) = crypto {
            c.decrypt(data);
        }

        hasher.update(data);
        writer.write_all(data).map_err(ZipError::CantOpenDestFile)?;
        remaining -= to_read as u64;
    }

    Ok(hasher.finalize())
}
