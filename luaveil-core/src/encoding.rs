//! Text decoding for uploaded Lua files.
//!
//! A byte-order mark picks the decoding when present. Otherwise the
//! fallback chain is strict UTF-8, then Windows-1252, then Latin-1, with
//! lossy replacement only reachable through malformed UTF-16/32 units.

/// Decodes uploaded bytes into a UTF-8 string.
pub fn decode_lua_bytes(bytes: &[u8]) -> String {
    if let Some(text) = decode_with_bom(bytes) {
        return text;
    }
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => decode_cp1252(bytes).unwrap_or_else(|| decode_latin1(bytes)),
    }
}

/// The UTF-32 marks are checked first: the UTF-32 LE BOM starts with the
/// UTF-16 LE one, so the order matters.
fn decode_with_bom(bytes: &[u8]) -> Option<String> {
    if bytes.starts_with(&[0xFF, 0xFE, 0x00, 0x00]) {
        return Some(decode_utf32(&bytes[4..], u32::from_le_bytes));
    }
    if bytes.starts_with(&[0x00, 0x00, 0xFE, 0xFF]) {
        return Some(decode_utf32(&bytes[4..], u32::from_be_bytes));
    }
    if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
        return Some(String::from_utf8_lossy(&bytes[3..]).into_owned());
    }
    if bytes.starts_with(&[0xFF, 0xFE]) {
        return Some(decode_utf16(&bytes[2..], u16::from_le_bytes));
    }
    if bytes.starts_with(&[0xFE, 0xFF]) {
        return Some(decode_utf16(&bytes[2..], u16::from_be_bytes));
    }
    None
}

fn decode_utf16(bytes: &[u8], read: fn([u8; 2]) -> u16) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| read([pair[0], pair[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}

fn decode_utf32(bytes: &[u8], read: fn([u8; 4]) -> u32) -> String {
    bytes
        .chunks_exact(4)
        .map(|quad| {
            char::from_u32(read([quad[0], quad[1], quad[2], quad[3]]))
                .unwrap_or(char::REPLACEMENT_CHARACTER)
        })
        .collect()
}

/// Windows-1252 decode; `None` when a byte hits one of the code points
/// that encoding leaves undefined.
fn decode_cp1252(bytes: &[u8]) -> Option<String> {
    bytes.iter().map(|&b| cp1252_char(b)).collect()
}

fn cp1252_char(byte: u8) -> Option<char> {
    // 0x80..0xA0 is where cp1252 diverges from Latin-1.
    let mapped = match byte {
        0x80 => '\u{20AC}',
        0x82 => '\u{201A}',
        0x83 => '\u{0192}',
        0x84 => '\u{201E}',
        0x85 => '\u{2026}',
        0x86 => '\u{2020}',
        0x87 => '\u{2021}',
        0x88 => '\u{02C6}',
        0x89 => '\u{2030}',
        0x8A => '\u{0160}',
        0x8B => '\u{2039}',
        0x8C => '\u{0152}',
        0x8E => '\u{017D}',
        0x91 => '\u{2018}',
        0x92 => '\u{2019}',
        0x93 => '\u{201C}',
        0x94 => '\u{201D}',
        0x95 => '\u{2022}',
        0x96 => '\u{2013}',
        0x97 => '\u{2014}',
        0x98 => '\u{02DC}',
        0x99 => '\u{2122}',
        0x9A => '\u{0161}',
        0x9B => '\u{203A}',
        0x9C => '\u{0153}',
        0x9E => '\u{017E}',
        0x9F => '\u{0178}',
        0x81 | 0x8D | 0x8F | 0x90 | 0x9D => return None,
        other => other as char,
    };
    Some(mapped)
}

fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}
