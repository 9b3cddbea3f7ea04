//! 16-bytes-per-line hex dump formatter: offset + hex + ASCII-with-dots.

use std::fmt::Write;

/// Render `data` as a classic hex dump: one line per 16 bytes, an 8-digit
/// hex offset, the hex bytes (space separated, extra gap after the 8th),
/// then the ASCII rendering with non-printable bytes shown as `.`.
pub fn hexdump(data: &[u8]) -> String {
    let mut out = String::new();
    for (line_no, chunk) in data.chunks(16).enumerate() {
        let _ = write!(out, "{:08x}  ", line_no * 16);
        for (i, b) in chunk.iter().enumerate() {
            let _ = write!(out, "{:02x} ", b);
            if i == 7 {
                out.push(' ');
            }
        }
        for _ in chunk.len()..16 {
            out.push_str("   ");
        }
        if chunk.len() <= 8 {
            out.push(' ');
        }
        out.push(' ');
        for &b in chunk {
            if (0x20..=0x7E).contains(&b) {
                out.push(b as char);
            } else {
                out.push('.');
            }
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dumps_short_buffer_on_one_line() {
        let data = b"Hi!";
        let dump = hexdump(data);
        assert!(dump.starts_with("00000000"));
        assert!(dump.contains("48 69 21"));
        assert!(dump.contains("Hi!"));
    }

    #[test]
    fn non_printable_bytes_render_as_dots() {
        let data = [0x00, 0x01, 0xFFu8];
        let dump = hexdump(&data);
        assert!(dump.trim_end().ends_with("..."));
    }

    #[test]
    fn wraps_at_sixteen_bytes_per_line() {
        let data = vec![0x41u8; 20];
        let dump = hexdump(&data);
        assert_eq!(dump.lines().count(), 2);
    }
}
