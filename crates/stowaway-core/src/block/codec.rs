//! Byte-level escaping codec for embedded payloads.
//!
//! A compressed archive is arbitrary binary data, but the embedded block
//! stores it as a single line of a text file. Two bytes cannot survive that:
//! the line feed (which would end the payload line early) and the carriage
//! return (which text-mode line-ending translation may rewrite). The codec
//! substitutes both with fixed ASCII tokens, and additionally substitutes the
//! escape byte `#` itself so the transform is injective.
//!
//! ## Token table
//!
//! | Byte   | Token  |
//! |--------|--------|
//! | `\n`   | `#XXX` |
//! | `\r`   | `#YYY` |
//! | `#`    | `#ZZZ` |
//!
//! Both directions run in a single left-to-right pass, so
//! `unescape(escape(x)) == x` holds for every input, including inputs that
//! contain the token text literally. Legacy payloads escaped with only the
//! first two tokens still decode: a `#` that does not start a known token is
//! copied through verbatim.

/// Token substituted for the raw line-feed byte
pub const LINE_FEED_TOKEN: &[u8] = b"#XXX";

/// Token substituted for the raw carriage-return byte
pub const CARRIAGE_RETURN_TOKEN: &[u8] = b"#YYY";

/// Token substituted for the escape byte itself
pub const HASH_TOKEN: &[u8] = b"#ZZZ";

/// First byte of every token
const ESCAPE_BYTE: u8 = b'#';

/// All tokens are the same length
const TOKEN_LEN: usize = 4;

/// Escape raw archive bytes into a form safe to store as one text line.
///
/// The output contains no raw `\n` or `\r` bytes, and every `#` in the
/// output starts a token.
pub fn escape(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len() + raw.len() / 8);

    for &byte in raw {
        match byte {
            b'\n' => out.extend_from_slice(LINE_FEED_TOKEN),
            b'\r' => out.extend_from_slice(CARRIAGE_RETURN_TOKEN),
            ESCAPE_BYTE => out.extend_from_slice(HASH_TOKEN),
            _ => out.push(byte),
        }
    }

    out
}

/// Reverse [`escape`], recovering the raw archive bytes.
///
/// This is a total function: any byte sequence decodes. Unknown `#`
/// sequences are copied through unchanged, which keeps payloads produced by
/// the original two-token scheme decodable.
pub fn unescape(text: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    let mut position = 0;

    while position < text.len() {
        if text[position] == ESCAPE_BYTE && position + TOKEN_LEN <= text.len() {
            let token = &text[position..position + TOKEN_LEN];

            let replacement = if token == LINE_FEED_TOKEN {
                Some(b'\n')
            } else if token == CARRIAGE_RETURN_TOKEN {
                Some(b'\r')
            } else if token == HASH_TOKEN {
                Some(ESCAPE_BYTE)
            } else {
                None
            };

            if let Some(byte) = replacement {
                out.push(byte);
                position += TOKEN_LEN;
                continue;
            }
        }

        out.push(text[position]);
        position += 1;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Deterministic pseudo-random bytes for round-trip coverage (xorshift)
    fn pseudo_random_bytes(seed: u64, len: usize) -> Vec<u8> {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                (state & 0xFF) as u8
            })
            .collect()
    }

    #[test]
    fn test_escape_reserved_bytes() {
        assert_eq!(escape(b"\n"), b"#XXX");
        assert_eq!(escape(b"\r"), b"#YYY");
        assert_eq!(escape(b"#"), b"#ZZZ");
        assert_eq!(escape(b"a\nb\rc"), b"a#XXXb#YYYc");
    }

    #[test]
    fn test_escaped_output_is_line_safe() {
        let input: Vec<u8> = (0..=255).collect();
        let escaped = escape(&input);
        assert!(!escaped.contains(&b'\n'));
        assert!(!escaped.contains(&b'\r'));
    }

    #[test]
    fn test_unescape_tokens() {
        assert_eq!(unescape(b"#XXX"), b"\n");
        assert_eq!(unescape(b"#YYY"), b"\r");
        assert_eq!(unescape(b"#ZZZ"), b"#");
    }

    #[test]
    fn test_unescape_legacy_scenario() {
        // The original two-token wire format: raw '#' bytes pass through
        assert_eq!(unescape(b"#XXXhello#YYYworld"), b"\nhello\rworld");
        assert_eq!(unescape(b"# plain comment"), b"# plain comment");
        assert_eq!(unescape(b"#XX"), b"#XX");
    }

    #[test]
    fn test_round_trip_empty() {
        assert_eq!(unescape(&escape(b"")), b"");
    }

    #[test]
    fn test_round_trip_every_byte() {
        for byte in 0..=255u8 {
            let input = [byte];
            assert_eq!(unescape(&escape(&input)), input, "byte {:#04x}", byte);
        }
    }

    #[test]
    fn test_round_trip_token_literals() {
        // Inputs that coincidentally contain the token text itself
        let cases: &[&[u8]] = &[
            b"#XXX",
            b"#YYY",
            b"#ZZZ",
            b"#",
            b"##",
            b"##XXX",
            b"#XXX#YYY#ZZZ",
            b"#XX#X#XXX",
            b"\n#XXX\r#YYY",
            b"#ZZZZZ",
        ];
        for case in cases {
            assert_eq!(unescape(&escape(case)), *case);
        }
    }

    #[test]
    fn test_round_trip_pseudo_random() {
        for seed in 1..=16u64 {
            let input = pseudo_random_bytes(seed, 4096);
            assert_eq!(unescape(&escape(&input)), input, "seed {}", seed);
        }
    }

    #[test]
    fn test_round_trip_bz2_like_header() {
        // Typical start of a bzip2 stream, including a '#'-adjacent byte mix
        let input = b"BZh91AY&SY\x23\x0a\x0d\x23ZZZ";
        assert_eq!(unescape(&escape(input)), input);
    }
}
