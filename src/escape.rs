//! Byte escaping for the event-FIFO `K`/`E` lines and its inverse.

/// Escape raw input bytes into the printable form used on the event FIFO.
///
/// Recognized control bytes become their two-character backslash form,
/// a literal backslash is doubled, and any other byte below 0x20 becomes
/// a three-digit octal escape. NUL uses its long form `\000` when the
/// following byte is an octal digit, otherwise the short `\0`; this keeps
/// the encoding decodable without lookahead ambiguity.
pub fn escape_bytes(src: &[u8]) -> Vec<u8> {
    let mut dst = Vec::with_capacity(src.len() * 2);
    for (i, &b) in src.iter().enumerate() {
        match b {
            0x07 => dst.extend_from_slice(b"\\a"),
            0x08 => dst.extend_from_slice(b"\\b"),
            0x0c => dst.extend_from_slice(b"\\f"),
            b'\n' => dst.extend_from_slice(b"\\n"),
            b'\r' => dst.extend_from_slice(b"\\r"),
            b'\t' => dst.extend_from_slice(b"\\t"),
            0x0b => dst.extend_from_slice(b"\\v"),
            0x1b => dst.extend_from_slice(b"\\e"),
            0x00 => {
                if matches!(src.get(i + 1), Some(b'0'..=b'7')) {
                    dst.extend_from_slice(b"\\000");
                } else {
                    dst.extend_from_slice(b"\\0");
                }
            }
            b'\\' => dst.extend_from_slice(b"\\\\"),
            b if b < b' ' => {
                dst.extend_from_slice(format!("\\{b:03o}").as_bytes());
            }
            b => dst.push(b),
        }
    }
    dst
}

/// Inverse of [`escape_bytes`]. Octal escapes are read greedily up to
/// three digits; unknown escapes are kept verbatim so a sloppy producer
/// cannot make a consumer lose bytes.
pub fn unescape_bytes(src: &[u8]) -> Vec<u8> {
    let mut dst = Vec::with_capacity(src.len());
    let mut i = 0;
    while i < src.len() {
        if src[i] != b'\\' || i + 1 >= src.len() {
            dst.push(src[i]);
            i += 1;
            continue;
        }
        match src[i + 1] {
            b'a' => dst.push(0x07),
            b'b' => dst.push(0x08),
            b'f' => dst.push(0x0c),
            b'n' => dst.push(b'\n'),
            b'r' => dst.push(b'\r'),
            b't' => dst.push(b'\t'),
            b'v' => dst.push(0x0b),
            b'e' => dst.push(0x1b),
            b'\\' => dst.push(b'\\'),
            d @ b'0'..=b'7' => {
                let mut val = u32::from(d - b'0');
                let mut used = 1;
                while used < 3 {
                    match src.get(i + 1 + used) {
                        Some(&o @ b'0'..=b'7') => {
                            val = val * 8 + u32::from(o - b'0');
                            used += 1;
                        }
                        _ => break,
                    }
                }
                dst.push(val as u8);
                i += 1 + used;
                continue;
            }
            other => {
                dst.push(b'\\');
                dst.push(other);
            }
        }
        i += 2;
    }
    dst
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn escapes_named_control_bytes() {
        let raw = b"\x07\x08\x0c\n\r\t\x0b\x1b\0";
        assert_eq!(escape_bytes(raw), b"\\a\\b\\f\\n\\r\\t\\v\\e\\0");
    }

    #[test]
    fn escapes_other_control_bytes_as_octal() {
        assert_eq!(escape_bytes(&[0x01]), b"\\001");
        assert_eq!(escape_bytes(&[0x1f]), b"\\037");
    }

    #[test]
    fn backslash_is_doubled() {
        assert_eq!(escape_bytes(b"a\\b"), b"a\\\\b");
        assert_eq!(unescape_bytes(b"a\\\\b"), b"a\\b");
    }

    #[test]
    fn printable_bytes_pass_through() {
        assert_eq!(escape_bytes(b"hello world"), b"hello world");
    }

    #[test]
    fn nul_long_form_disambiguates_digit_neighbors() {
        assert_eq!(escape_bytes(&[0x00, b'4']), b"\\0004");
        assert_eq!(unescape_bytes(b"\\0004"), vec![0x00, b'4']);
        assert_eq!(unescape_bytes(b"\\004"), vec![0x04]);
    }

    #[test]
    fn octal_reads_at_most_three_digits() {
        assert_eq!(unescape_bytes(b"\\0017"), vec![0x01, b'7']);
    }

    proptest! {
        #[test]
        fn escape_round_trips(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
            let encoded = escape_bytes(&bytes);
            prop_assert_eq!(unescape_bytes(&encoded), bytes);
        }

        #[test]
        fn escaped_form_is_control_free(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
            let encoded = escape_bytes(&bytes);
            prop_assert!(encoded.iter().all(|&b| b >= b' '));
        }
    }
}
