use std::io::{Read, Write};

use miniz_oxide::deflate::core::{CompressionStrategy, CompressorOxide, create_comp_flags_from_zip_params};
use miniz_oxide::deflate::stream::deflate;
use miniz_oxide::{MZFlush, MZStatus};

use super::{Written, read_full};
use crate::crypto::ZipCrypto;
use crate::error::{ZipError, ZipResult};
use crate::level::Strategy;

/// Negative window bits select raw deflate (no zlib header).
const RAW_WINDOW_BITS: i32 = -15;

/// Deflate the payload at `level` (1-9), optionally encrypting the
/// compressed stream.
pub fn compress_deflate<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    level: u8,
    strategy: Strategy,
    mut crypto: Option<&mut ZipCrypto>,
    in_buf: &mut [u8],
    out_buf: &mut [u8],
) -> ZipResult<Written> {
    let strategy = match strategy {
        Strategy::Default => CompressionStrategy::Default,
        Strategy::Filtered => CompressionStrategy::Filtered,
    };
    let flags = create_comp_flags_from_zip_params(level as i32, RAW_WINDOW_BITS, strategy as i32);
    let mut compressor = Box::new(CompressorOxide::new(flags));

    let mut hasher = crc32fast::Hasher::new();
    let mut total_in = 0u64;
    let mut total_out = 0u64;
    let mut in_start = 0usize;
    let mut in_end = 0usize;
    let mut eof = false;

    loop {
        if in_start == in_end && !eof {
            let n = read_full(reader, in_buf)?;
            if n == 0 {
                eof = true;
            } else {
                hasher.update(&in_buf[..n]);
                total_in += n as u64;
            }
            in_start = 0;
            in_end = n;
        }

        // Only ask for the final block once all input was handed over.
        let flush = if eof { MZFlush::Finish } else { MZFlush::None };
        let res = deflate(&mut compressor, &in_buf[in_start..in_end], out_buf, flush);
        let status = res
            .status
            .map_err(|e| ZipError::DeflateFailed(format!("{e:?}")))?;

        in_start += res.bytes_consumed;

        if res.bytes_written > 0 {
            let data = &mut out_buf[..res.bytes_written];
            if let Some(ref mut c) = crypto {
                c.encrypt(data);
            }
            writer.write_all(data)?;
            total_out += res.bytes_written as u64;
        }

        if status == MZStatus::StreamEnd {
            break;
        }
    }

    Ok(Written {
        crc32: hasher.finalize(),
        uncompressed_size: total_in,
        compressed_size: total_out,
    })
}
