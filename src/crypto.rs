//! PKware ZIP traditional encryption.
//! Keys initialized to [305419896, 591751049, 878082192].
//! Uses CRC32 table for key updates.

use std::time::{SystemTime, UNIX_EPOCH};

pub const ENCR_HEADER_LEN: usize = 12;

/// Standard CRC32 lookup table (polynomial 0xEDB88320).
const CRC32_TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut i = 0u32;
    while i < 256 {
        let mut crc = i;
        let mut j = 0;
        while j < 8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xEDB88320;
            } else {
                crc >>= 1;
            }
            j += 1;
        }
        table[i as usize] = crc;
        i += 1;
    }
    table
};

#[derive(Clone)]
pub struct ZipCrypto {
    key: [u32; 3],
}

impl ZipCrypto {
    pub fn new(password: &[u8]) -> Self {
        let mut c = ZipCrypto {
            key: [305419896, 591751049, 878082192],
        };
        for &b in password {
            c.update_keys(b);
        }
        c
    }

    fn crc32_byte(crc: u32, b: u8) -> u32 {
        CRC32_TABLE[((crc ^ b as u32) & 0xff) as usize] ^ (crc >> 8)
    }

    fn update_keys(&mut self, c: u8) {
        self.key[0] = Self::crc32_byte(self.key[0], c);
        self.key[1] = self.key[1].wrapping_add(self.key[0] & 0xff);
        self.key[1] = self.key[1].wrapping_mul(134775813).wrapping_add(1);
        self.key[2] = Self::crc32_byte(self.key[2], (self.key[1] >> 24) as u8);
    }

    fn decrypt_byte(&self) -> u8 {
        let temp = (self.key[2] | 2) as u16;
        ((temp.wrapping_mul(temp ^ 1)) >> 8) as u8
    }

    /// Build the 12-byte encryption header that precedes an encrypted payload.
    ///
    /// The first ten bytes are `random`; the last two carry `check`, whose high
    /// byte is what a reader verifies the password against.
    pub fn encrypt_header(
        &mut self,
        random: &[u8; ENCR_HEADER_LEN - 2],
        check: u16,
    ) -> [u8; ENCR_HEADER_LEN] {
        let mut header = [0u8; ENCR_HEADER_LEN];
        header[..ENCR_HEADER_LEN - 2].copy_from_slice(random);
        header[ENCR_HEADER_LEN - 2..].copy_from_slice(&check.to_le_bytes());
        self.encrypt(&mut header);
        header
    }

    /// Validate the 12-byte encryption header.
    /// Returns true if password is correct.
    ///
    /// With a data descriptor the writer did not know the CRC yet, so the
    /// check byte is the high byte of the DOS modification time instead.
    pub fn check_header(
        &mut self,
        enc_header: &[u8; ENCR_HEADER_LEN],
        file_crc: u32,
        mod_time: u16,
        is_data_descr: bool,
    ) -> bool {
        let mut last_byte = 0u8;
        for &b in enc_header.iter() {
            let c = b ^ self.decrypt_byte();
            self.update_keys(c);
            last_byte = c;
        }

        if is_data_descr {
            (mod_time >> 8) as u8 == last_byte
        } else {
            (file_crc >> 24) as u8 == last_byte
        }
    }

    /// Encrypt data in place.
    pub fn encrypt(&mut self, data: &mut [u8]) {
        for b in data.iter_mut() {
            let plain = *b;
            *b = plain ^ self.decrypt_byte();
            self.update_keys(plain);
        }
    }

    /// Decrypt data in place.
    pub fn decrypt(&mut self, data: &mut [u8]) {
        for b in data.iter_mut() {
            let temp = *b ^ self.decrypt_byte();
            self.update_keys(temp);
            *b = temp;
        }
    }
}

/// xorshift64 source for the random part of encryption headers.
pub struct HeaderRng {
    state: u64,
}

impl HeaderRng {
    pub fn new(seed: u64) -> Self {
        // xorshift never leaves the all-zero state
        HeaderRng {
            state: if seed == 0 { 0x9E37_79B9_7F4A_7C15 } else { seed },
        }
    }

    pub fn from_time() -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        Self::new(seed)
    }

    pub fn next_u8(&mut self) -> u8 {
        self.state ^= self.state << 13;
        self.state ^= self.state >> 7;
        self.state ^= self.state << 17;
        (self.state >> 32) as u8
    }

    pub fn fill(&mut self, buf: &mut [u8]) {
        for b in buf.iter_mut() {
            *b = self.next_u8();
        }
    }
}
