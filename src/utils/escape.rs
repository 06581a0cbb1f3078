//! Byte escaping for diagnostics and command-line input

use std::fmt::Write as _;

/// Render bytes as printable ASCII, escaping everything else.
///
/// `\r`, `\n`, `\t`, `\\` and `"` get their short forms, other
/// non-printable bytes become `\xNN`.
pub fn escape_bytes(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len());
    for &b in data {
        match b {
            b'\r' => out.push_str("\\r"),
            b'\n' => out.push_str("\\n"),
            b'\t' => out.push_str("\\t"),
            b'\\' => out.push_str("\\\\"),
            b'"' => out.push_str("\\\""),
            0x20..=0x7e => out.push(b as char),
            _ => {
                let _ = write!(out, "\\x{b:02x}");
            }
        }
    }
    out
}

/// Space separated lowercase hex.
pub fn hex_dump(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Decode `\r`, `\n`, `\t`, `\0`, `\\` and `\xNN` escapes typed on a
/// command line or in a script file.
///
/// Unknown escapes are kept verbatim (`\q` stays `\q`).
pub fn unescape(text: &str) -> Result<Vec<u8>, String> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'\\' || i + 1 == bytes.len() {
            out.push(bytes[i]);
            i += 1;
            continue;
        }

        match bytes[i + 1] {
            b'r' => out.push(b'\r'),
            b'n' => out.push(b'\n'),
            b't' => out.push(b'\t'),
            b'0' => out.push(0),
            b'\\' => out.push(b'\\'),
            b'x' => {
                let digits = text
                    .get(i + 2..i + 4)
                    .ok_or_else(|| format!("truncated \\x escape at offset {i}"))?;
                let value = hex::decode(digits)
                    .map_err(|e| format!("bad \\x escape {digits:?}: {e}"))?;
                out.extend_from_slice(&value);
                i += 4;
                continue;
            }
            other => {
                out.push(b'\\');
                out.push(other);
            }
        }
        i += 2;
    }

    Ok(out)
}
