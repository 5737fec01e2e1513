use std::io::{Read, Write};

use flate2::{Decompress, FlushDecompress, Status};

use crate::crypto::ZipCrypto;
use crate::error::{ZipError, ZipResult};

/// Inflate a deflated (method 8) entry payload: raw deflate, no zlib header.
///
/// As with [`super::raw::extract_raw`], the encryption header has already been
/// consumed and `compressed_size` covers only the deflate stream; the key
/// stream continues from the header into the payload.
/// Returns the CRC32 of the inflated data.
pub fn extract_deflate<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    compressed_size: u64,
    mut crypto: Option<&mut ZipCrypto>,
    in_buf: &mut [u8],
    out_buf: &mut [u8],
) -> ZipResult<u32> {
    let mut hasher = crc32fast::Hasher::new();
    let mut decompressor = Decompress::new(false); // raw deflate (no header)
    let mut remaining = compressed_size;
    let mut in_avail = 0usize; // unconsumed bytes at front of in_buf

    loop {
        // Refill input buffer if we have no pending data and there's more to read.
        if in_avail == 0 && remaining > 0 {
            let to_read = (remaining as usize).min(in_buf.len());
            reader.read_exact(&mut in_buf[..to_read])?;
            if let Some(ref mut c) = crypto {
                c.decrypt(&mut in_buf[..to_read]);
            }
            remaining -= to_read as u64;
            in_avail = to_read;
        }

        let before_in = decompressor.total_in();
        let before_out = decompressor.total_out();

        let status = decompressor
            .decompress(&in_buf[..in_avail], out_buf, FlushDecompress::Sync)
            .map_err(|e| ZipError::InflateFailed(e.to_string()))?;

        let consumed = (decompressor.total_in() - before_in) as usize;
        let produced = (decompressor.total_out() - before_out) as usize;

        // Shift unconsumed input to front of buffer.
        if consumed < in_avail {
            in_buf.copy_within(consumed..in_avail, 0);
        }
        in_avail -= consumed;

        if produced > 0 {
            hasher.update(&out_buf[..produced]);
            writer
                .write_all(&out_buf[..produced])
                .map_err(ZipError::CantOpenDestFile)?;
        }

        if status == Status::StreamEnd {
            break;
        }

        // No progress and nothing left to feed: the stream is truncated.
        if consumed == 0 && produced == 0 {
            return Err(ZipError::InflateFailed(
                "unexpected end of deflate stream".to_string(),
            ));
        }
    }

    Ok(hasher.finalize())
}
