/// Rewrites a string of hex digits as escaped bytes.
///
/// Each adjacent pair of characters becomes one `\xHH` token, in order, so `2n` characters give
/// exactly `n` tokens.  A trailing unpaired character is kept as is.  The characters are not
/// checked to be hex digits; the kernel does that when the registration is written.
///
/// A value that is already nothing but `\xHH` tokens is returned unchanged.  Anything else,
/// including a mix of plain digits and escapes, is escaped pair by pair.
///
/// # Example
///
/// ```
/// # use binfmt_misc_core::escape_hex;
/// assert_eq!(escape_hex("7f454c46"), r"\x7f\x45\x4c\x46");
/// assert_eq!(escape_hex(r"\x7f\x45"), r"\x7f\x45");
/// ```
pub fn escape_hex(s: &str) -> String {
    if is_escaped(s) {
        return s.to_string();
    }

    let chars: Vec<char> = s.chars().collect();
    let mut escaped = String::with_capacity(s.len() * 2);
    for pair in chars.chunks(2) {
        if pair.len() == 2 {
            escaped.push_str("\\x");
        }
        escaped.extend(pair);
    }
    escaped
}

fn is_escaped(s: &str) -> bool {
    match s.strip_prefix("\\x") {
        Some(rest) => rest
            .split("\\x")
            .all(|token| token.len() == 2 && token.bytes().all(|b| b.is_ascii_hexdigit())),
        None => false,
    }
}
