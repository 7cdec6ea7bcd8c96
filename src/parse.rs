//! Small parsers shared by the reader: a signed-decimal integer parser and
//! a CRLF terminator check (spec.md §4.4).

/// Finds the first LF in `buf`, if any.
pub(crate) fn find_lf(buf: &[u8]) -> Option<usize> {
    buf.iter().position(|&b| b == b'\n')
}

/// True iff `buf` ends with `\r\n`.
pub(crate) fn is_terminated(buf: &[u8]) -> bool {
    buf.len() >= 2 && buf[buf.len() - 2] == b'\r' && buf[buf.len() - 1] == b'\n'
}

/// Parses an optional leading `-` followed by one or more ASCII digits.
///
/// Any other byte, or an empty digit run after the sign, is an error (this
/// is the corrected check spec.md §9 flags: the source checks
/// `len(b) < 1`, which never triggers; the intent was `len(b) == 0`).
/// Overflow outside `i64`'s range is also an error — see SPEC_FULL.md §9.
pub(crate) fn parse_int(bytes: &[u8]) -> Result<i64, ()> {
    if bytes.is_empty() {
        return Err(());
    }
    let (neg, digits) = if bytes[0] == b'-' {
        (true, &bytes[1..])
    } else {
        (false, bytes)
    };
    if digits.is_empty() {
        return Err(());
    }

    let mut magnitude: u64 = 0;
    for &b in digits {
        if !b.is_ascii_digit() {
            return Err(());
        }
        magnitude = magnitude
            .checked_mul(10)
            .and_then(|v| v.checked_add((b - b'0') as u64))
            .ok_or(())?;
    }

    let signed = if neg {
        -(magnitude as i128)
    } else {
        magnitude as i128
    };
    if signed < i64::MIN as i128 || signed > i64::MAX as i128 {
        return Err(());
    }
    Ok(signed as i64)
}
