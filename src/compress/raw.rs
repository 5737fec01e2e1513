use std::io::{Read, Write};

use super::{Written, read_full};
use crate::crypto::ZipCrypto;
use crate::error::ZipResult;

/// Copy the payload through unchanged, optionally encrypting.
pub fn store_raw<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    mut crypto: Option<&mut ZipCrypto>,
    buf: &mut [u8],
) -> ZipResult<Written> {
    let mut hasher = crc32fast::Hasher::new();
    let mut total = 0u64;

    loop {
        let n = read_full(reader, buf)?;
        if n == 0 {
            break;
        }

        let data = &mut buf[..n];
        hasher.update(data);
        if let Some(ref mut c) = crypto {
            c.encrypt(data);
        }
        writer.write_all(data)?;
        total += n as u64;
    }

    Ok(Written {
        crc32: hasher.finalize(),
        uncompressed_size: total,
        compressed_size: total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stores_verbatim() {
        let data = b"Casablanca (1942)";
        let mut out = Vec::new();
        let mut buf = [0u8; 4];
        let w = store_raw(&mut data.as_slice(), &mut out, None, &mut buf).unwrap();

        assert_eq!(out, data);
        assert_eq!(w.crc32, crc32fast::hash(data));
        assert_eq!(w.uncompressed_size, data.len() as u64);
        assert_eq!(w.compressed_size, data.len() as u64);
    }

    #[test]
    fn crc_covers_plaintext_when_encrypting() {
        let data = b"Casablanca (1942)";
        let mut out = Vec::new();
        let mut buf = [0u8; 8];
        let mut c = ZipCrypto::new(b"pw");
        let w = store_raw(&mut data.as_slice(), &mut out, Some(&mut c), &mut buf).unwrap();

        assert_ne!(out, data);
        assert_eq!(w.crc32, crc32fast::hash(data));
        ZipCrypto::new(b"pw").decrypt(&mut out);
        assert_eq!(out, data);
    }
}
