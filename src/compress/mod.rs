//! Payload writers: read plaintext, optionally deflate and encrypt, write
//! to the archive, and account for CRC and sizes on the way.

use std::io::{self, Read};

pub mod deflate;
pub mod raw;

/// What one payload pass produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Written {
    /// CRC32 of the plaintext.
    pub crc32: u32,
    pub uncompressed_size: u64,
    /// Bytes written to the archive, excluding any encryption header.
    pub compressed_size: u64,
}

/// Fill `buf` as far as the reader allows. Returns 0 only at end of input.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
