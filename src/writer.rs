//! The streaming RESP2 serializer (spec.md §4.1).

use std::io::{self, BufWriter, Write};

use crate::error::ProtocolError;

/// Big enough for the longest decimal `i64`: `-9223372036854775808` (20 bytes).
const SCRATCH_LEN: usize = 20;

/// A buffered writer over any byte sink, emitting RESP2 frames.
///
/// Holds no connection state of its own beyond the buffered sink and a
/// scratch buffer reused across integer writes (spec.md §3).
pub struct Writer<W: Write> {
    sink: BufWriter<W>,
    scratch: [u8; SCRATCH_LEN],
}

impl<W: Write> Writer<W> {
    pub fn new(sink: W) -> Self {
        Self { sink: BufWriter::new(sink), scratch: [0; SCRATCH_LEN] }
    }

    /// Rebinds this writer to a new sink; the scratch buffer carries no
    /// state between calls, so there is nothing else to reset.
    pub fn reset(&mut self, sink: W) {
        self.sink = BufWriter::new(sink);
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.sink.flush()
    }

    /// `+<escaped s>\r\n`
    pub fn write_simple_string(&mut self, s: &str) -> io::Result<()> {
        self.sink.write_all(b"+")?;
        write_escaped(&mut self.sink, s.as_bytes())?;
        self.sink.write_all(b"\r\n")
    }

    /// `-<err.kind>[ <escaped err.msg>]\r\n`
    pub fn write_error(&mut self, err: &ProtocolError) -> io::Result<()> {
        self.write_raw_error(&err.kind, &err.msg)
    }

    pub fn write_raw_error(&mut self, kind: &str, msg: &str) -> io::Result<()> {
        let kind = if kind.is_empty() { "ERR" } else { kind };
        self.sink.write_all(b"-")?;
        self.sink.write_all(kind.as_bytes())?;
        if !msg.is_empty() {
            self.sink.write_all(b" ")?;
            write_escaped(&mut self.sink, msg.as_bytes())?;
        }
        self.sink.write_all(b"\r\n")
    }

    pub fn write_int(&mut self, i: i64) -> io::Result<()> {
        self.write_int64(i)
    }

    pub fn write_int32(&mut self, i: i32) -> io::Result<()> {
        self.write_int64(i as i64)
    }

    pub fn write_int64(&mut self, i: i64) -> io::Result<()> {
        self.sink.write_all(b":")?;
        self.write_signed_decimal(i)?;
        self.sink.write_all(b"\r\n")
    }

    pub fn write_uint(&mut self, i: u64) -> io::Result<()> {
        self.write_uint64(i)
    }

    pub fn write_uint32(&mut self, i: u32) -> io::Result<()> {
        self.write_uint64(i as u64)
    }

    pub fn write_uint64(&mut self, i: u64) -> io::Result<()> {
        self.sink.write_all(b":")?;
        self.write_unsigned_decimal(i)?;
        self.sink.write_all(b"\r\n")
    }

    /// `$<len(s)>\r\n<s>\r\n`
    pub fn write_string(&mut self, s: &str) -> io::Result<()> {
        self.write_bytes(s.as_bytes())
    }

    /// `$<len(b)>\r\n<b>\r\n`, written verbatim (no escaping — bulk strings
    /// carry their own length).
    pub fn write_bytes(&mut self, b: &[u8]) -> io::Result<()> {
        self.sink.write_all(b"$")?;
        self.write_unsigned_decimal(b.len() as u64)?;
        self.sink.write_all(b"\r\n")?;
        self.sink.write_all(b)?;
        self.sink.write_all(b"\r\n")
    }

    pub fn write_null(&mut self) -> io::Result<()> {
        self.sink.write_all(b"$-1\r\n")
    }

    /// Emits only the array header; the caller writes the `n` elements.
    pub fn write_array(&mut self, n: i64) -> io::Result<()> {
        self.sink.write_all(b"*")?;
        self.write_signed_decimal(n)?;
        self.sink.write_all(b"\r\n")
    }

    fn write_signed_decimal(&mut self, i: i64) -> io::Result<()> {
        if (0..=9).contains(&i) {
            return self.sink.write_all(&[b'0' + i as u8]);
        }
        let digits = format_i64(&mut self.scratch, i);
        self.sink.write_all(digits)
    }

    fn write_unsigned_decimal(&mut self, i: u64) -> io::Result<()> {
        if i <= 9 {
            return self.sink.write_all(&[b'0' + i as u8]);
        }
        let digits = format_u64(&mut self.scratch, i);
        self.sink.write_all(digits)
    }
}

/// Writes `payload` with every CR replaced by the two bytes `\r` and every
/// LF replaced by `\n`, in a single forward pass (spec.md §4.1.1, §9).
fn write_escaped<W: Write>(sink: &mut W, payload: &[u8]) -> io::Result<()> {
    let mut start = 0;
    for (i, &b) in payload.iter().enumerate() {
        let escape: &[u8] = match b {
            b'\r' => b"\\r",
            b'\n' => b"\\n",
            _ => continue,
        };
        sink.write_all(&payload[start..i])?;
        sink.write_all(escape)?;
        start = i + 1;
    }
    sink.write_all(&payload[start..])
}

/// Formats `value` into the tail of `buf`, returning the occupied suffix.
fn format_i64(buf: &mut [u8; SCRATCH_LEN], value: i64) -> &[u8] {
    if value == 0 {
        buf[SCRATCH_LEN - 1] = b'0';
        return &buf[SCRATCH_LEN - 1..];
    }
    let neg = value < 0;
    let mut magnitude = (value as i128).unsigned_abs() as u64;
    let mut i = SCRATCH_LEN;
    while magnitude > 0 {
        i -= 1;
        buf[i] = b'0' + (magnitude % 10) as u8;
        magnitude /= 10;
    }
    if neg {
        i -= 1;
        buf[i] = b'-';
    }
    &buf[i..]
}

fn format_u64(buf: &mut [u8; SCRATCH_LEN], mut value: u64) -> &[u8] {
    if value == 0 {
        buf[SCRATCH_LEN - 1] = b'0';
        return &buf[SCRATCH_LEN - 1..];
    }
    let mut i = SCRATCH_LEN;
    while value > 0 {
        i -= 1;
        buf[i] = b'0' + (value % 10) as u8;
        value /= 10;
    }
    &buf[i..]
}
