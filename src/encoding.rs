/// General purpose flag bit 11: name and comment are UTF-8.
pub const FLAG_UTF8: u16 = 0x0800;

/// Encode an entry name or comment for storage.
/// Text representable in Latin-1 (Windows-1252) is stored as such; anything
/// else is stored as UTF-8 and the returned flag bits mark it.
pub fn encode_name(name: &str) -> (Vec<u8>, u16) {
    if name.is_ascii() {
        return (name.as_bytes().to_vec(), 0);
    }
    let (bytes, _encoding_used, had_errors) = encoding_rs::WINDOWS_1252.encode(name);
    if had_errors {
        (name.as_bytes().to_vec(), FLAG_UTF8)
    } else {
        (bytes.into_owned(), 0)
    }
}

/// Decode a stored entry name or comment to UTF-8.
pub fn decode_name(bytes: &[u8], flags: u16) -> String {
    if flags & FLAG_UTF8 != 0 {
        return String::from_utf8_lossy(bytes).into_owned();
    }
    // Plain ASCII is the same in every legacy code page.
    if bytes.is_ascii() {
        return String::from_utf8_lossy(bytes).into_owned();
    }
    let (cow, _encoding_used, _had_errors) = encoding_rs::WINDOWS_1252.decode(bytes);
    cow.into_owned()
}
