//! The streaming RESP2 parser (spec.md §4.2).

use std::io::{self, BufRead, BufReader, Read};

use tracing::debug;

use crate::error::{ProtocolError, RadishError};
use crate::frame::{global_pool, Frame, PooledFrame};
use crate::parse::{find_lf, is_terminated, parse_int};
use crate::value::{DataType, Value};

type Result<T> = std::result::Result<T, RadishError>;

/// Length lines (`*N\r\n`, `$N\r\n`, `:N\r\n`) never exceed this many bytes;
/// the longest representable is `:-9223372036854775808\r\n` (23 bytes).
const LENGTH_LINE_LIMIT: usize = 23;

/// Simple strings and errors have no declared length; this bounds them so a
/// CRLF-less peer cannot grow `frame.raw` without limit (spec.md §9).
const LINE_LIMIT: usize = 64 * 1024;

/// Upper bound on how much of a declared multibulk count we'll reserve
/// `frame.args` capacity for up front. A peer can claim any `i64` length
/// within range (e.g. `*9223372036854775807\r\n`), so reserving the full
/// declared count can overflow `Vec::reserve`'s internal size computation
/// and panic before a single element is read. Past this ceiling, `args`
/// grows incrementally via `push` per successfully-read bulk instead,
/// matching the teacher's lazy per-element growth
/// (`examples/Geekstime-Rust-F-02-simple-redis/src/resp/array.rs`).
const ARGS_RESERVE_CEILING: usize = 4096;

/// A buffered parser over any byte source, emitting [`Frame`]s and typed
/// reply [`Value`]s.
pub struct Reader<R> {
    source: R,
}

impl<R: Read> Reader<R> {
    pub fn new(source: R) -> Self {
        Self { source }
    }

    /// Rebinds this reader to a new source; there is no other state to free.
    pub fn reset(&mut self, source: R) {
        self.source = source;
    }
}

/// Convenience constructor wrapping a raw [`Read`] in a [`BufReader`].
impl<R: Read> Reader<BufReader<R>> {
    pub fn buffered(source: R) -> Self {
        Self::new(BufReader::new(source))
    }
}

impl<R: BufRead> Reader<R> {
    /// Reads exactly one command in array-of-bulks form (spec.md §4.2.1).
    ///
    /// Tolerates and skips leading empty-array heartbeats (length ≤ 0),
    /// retrying until a positively-lengthed array is seen or the source is
    /// exhausted. Returns [`RadishError::EndOfStream`] if the source ends
    /// cleanly before any header byte of a new command is read.
    pub fn read_command(&mut self) -> Result<PooledFrame> {
        let mut frame = global_pool().get();
        match self.read_command_into(&mut frame) {
            Ok(()) => Ok(PooledFrame::new(frame)),
            Err(e) => {
                global_pool().put(frame);
                Err(e)
            }
        }
    }

    fn read_command_into(&mut self, frame: &mut Box<Frame>) -> Result<()> {
        loop {
            frame.reset();
            let len = match self.read_length(frame, b'*') {
                Ok(len) => len,
                Err(e) => return Err(e.rewrite_invalid_value(ProtocolError::invalid_multibulk_length())),
            };
            if len <= 0 {
                continue;
            }
            let len = len as usize;
            frame.args.reserve(len.min(ARGS_RESERVE_CEILING));
            for _ in 0..len {
                let null = self.read_bulk(frame)?;
                if null {
                    return Err(RadishError::protocol(
                        "ERR",
                        "Protocol error: invalid bulk length",
                    ));
                }
            }
            return Ok(());
        }
    }

    /// Peeks the first byte without consuming it, via [`BufRead::fill_buf`]
    /// (spec.md §9's buffered-source `peek(1)` resolution).
    fn peek_byte(&mut self) -> io::Result<Option<u8>> {
        let buf = self.source.fill_buf()?;
        Ok(buf.first().copied())
    }

    /// Draws slices up to the next LF, appending each to `frame.raw`, until
    /// a CRLF terminator is seen; then validates the leading discriminant
    /// and returns the byte range of the payload (spec.md §4.2.2).
    ///
    /// `limit` of 0 means unbounded; otherwise exceeding it yields the
    /// internal "invalid value" sentinel (for length lines, the caller
    /// rewrites this; for plain lines it surfaces as a line-too-long error).
    fn read_line(&mut self, frame: &mut Box<Frame>, expected: u8, limit: usize) -> Result<(usize, usize)> {
        let start = frame.raw.len();
        let mut total = 0usize;
        loop {
            let (consumed, found_lf) = {
                let buf = self.source.fill_buf()?;
                if buf.is_empty() {
                    return Err(RadishError::EndOfStream);
                }
                match find_lf(buf) {
                    Some(idx) => {
                        frame.raw.extend_from_slice(&buf[..=idx]);
                        (idx + 1, true)
                    }
                    None => {
                        frame.raw.extend_from_slice(buf);
                        (buf.len(), false)
                    }
                }
            };
            self.source.consume(consumed);
            total += consumed;
            if found_lf {
                break;
            }
            if limit != 0 && total >= limit {
                return Err(RadishError::Protocol(ProtocolError::invalid_value()));
            }
        }
        if limit != 0 && total > limit {
            return Err(RadishError::Protocol(ProtocolError::invalid_value()));
        }

        let line = &frame.raw[start..];
        if line.first().copied() != Some(expected) {
            let got = line.first().copied().unwrap_or(0);
            debug!(expected = expected as char, got = got as char, "resp framing mismatch");
            return Err(RadishError::Protocol(ProtocolError::framing(expected, got)));
        }
        if !is_terminated(line) {
            return Err(RadishError::Protocol(ProtocolError::invalid_value()));
        }
        let payload_start = start + 1;
        let payload_end = frame.raw.len() - 2;
        Ok((payload_start, payload_end))
    }

    /// read-length: a typed line whose payload is a signed decimal
    /// (spec.md §4.2.3).
    fn read_length(&mut self, frame: &mut Box<Frame>, discriminant: u8) -> Result<i64> {
        let (start, end) = self.read_line(frame, discriminant, LENGTH_LINE_LIMIT)?;
        parse_int(&frame.raw[start..end]).map_err(|_| RadishError::Protocol(ProtocolError::invalid_value()))
    }

    /// read-bulk: returns `true` iff the bulk was null (no content consumed
    /// in that case); otherwise appends the bulk's content and argument view
    /// to `frame` (spec.md §4.2.4).
    fn read_bulk(&mut self, frame: &mut Box<Frame>) -> Result<bool> {
        let len = self
            .read_length(frame, b'$')
            .map_err(|e| e.rewrite_invalid_value(ProtocolError::invalid_bulk_length()))?;
        if len < 0 {
            return Ok(true);
        }
        let len = len as usize;
        let content_start = frame.raw.len();
        let needed = len + 2;
        frame.raw.resize(content_start + needed, 0);
        {
            let dest = &mut frame.raw[content_start..content_start + needed];
            self.source.read_exact(dest).map_err(|e| {
                if e.kind() == io::ErrorKind::UnexpectedEof {
                    RadishError::EndOfStream
                } else {
                    RadishError::Io(e)
                }
            })?;
        }
        let tail = &frame.raw[content_start + len..content_start + needed];
        if tail != b"\r\n" {
            return Err(RadishError::protocol(
                "ERR",
                "Protocol error: invalid bulk length",
            ));
        }
        frame.args.push((content_start, len));
        Ok(false)
    }

    /// Reads a `+`-prefixed line, unescaping nothing (escaping is an output
    /// concern only — see spec.md §4.1.1): returns its text as owned `String`.
    pub fn read_simple_string(&mut self) -> Result<String> {
        let mut frame = global_pool().get();
        let result = self
            .read_line(&mut frame, b'+', LINE_LIMIT)
            .map_err(|e| e.rewrite_invalid_value(ProtocolError::line_too_long()));
        let value = result.map(|(s, e)| String::from_utf8_lossy(&frame.raw[s..e]).into_owned());
        global_pool().put(frame);
        value
    }

    /// Reads a `-`-prefixed line and splits it into `kind`/`msg` on the
    /// first space or LF (spec.md §4.2.5).
    pub fn read_error(&mut self) -> Result<ProtocolError> {
        let mut frame = global_pool().get();
        let result = self
            .read_line(&mut frame, b'-', LINE_LIMIT)
            .map_err(|e| e.rewrite_invalid_value(ProtocolError::line_too_long()));
        let value = result.map(|(s, e)| split_kind_msg(&frame.raw[s..e]));
        global_pool().put(frame);
        value
    }

    pub fn read_integer(&mut self) -> Result<i64> {
        let mut frame = global_pool().get();
        let value = self
            .read_length(&mut frame, b':')
            .map_err(|e| e.rewrite_invalid_value(ProtocolError::invalid_integer_value()));
        global_pool().put(frame);
        value
    }

    /// Reads a bulk string. Returns `(bytes, is_null)`; on null the returned
    /// vector is empty.
    pub fn read_string(&mut self) -> Result<(Vec<u8>, bool)> {
        let mut frame = global_pool().get();
        let result = self.read_bulk(&mut frame);
        let value = result.map(|null| {
            if null {
                (Vec::new(), true)
            } else {
                let &(offset, len) = frame.args.last().expect("read_bulk pushed an arg view");
                (frame.raw[offset..offset + len].to_vec(), false)
            }
        });
        global_pool().put(frame);
        value
    }

    /// Reads only an array's length header, without reading its elements.
    pub fn read_array(&mut self) -> Result<i64> {
        let mut frame = global_pool().get();
        let value = self.read_length(&mut frame, b'*');
        global_pool().put(frame);
        value
    }

    /// Peeks the first byte and dispatches to the matching typed read
    /// (spec.md §4.2.8).
    pub fn read_any(&mut self) -> Result<(DataType, Value)> {
        let byte = self.peek_byte()?;
        let byte = match byte {
            Some(b) => b,
            None => return Err(RadishError::EndOfStream),
        };
        let kind = match DataType::from_byte(byte) {
            Some(k) => k,
            None => {
                return Err(RadishError::Protocol(ProtocolError::unknown_reply_type(byte)));
            }
        };
        match kind {
            DataType::SimpleString => self.read_simple_string().map(|s| (DataType::SimpleString, Value::SimpleString(s))),
            DataType::Error => self.read_error().map(|e| (DataType::Error, Value::Error(e))),
            DataType::Integer => self.read_integer().map(|i| (DataType::Integer, Value::Integer(i))),
            DataType::BulkString => {
                let (bytes, null) = self.read_string()?;
                if null {
                    Ok((DataType::Null, Value::Null))
                } else {
                    Ok((DataType::BulkString, Value::Bulk(bytes)))
                }
            }
            DataType::Array => {
                let n = self.read_array()?;
                if n < 0 {
                    Ok((DataType::Null, Value::Null))
                } else {
                    Ok((DataType::Array, Value::ArrayHeader(n)))
                }
            }
            DataType::Null => unreachable!("Null has no wire discriminant"),
        }
    }
}

/// Splits a read-error payload on the first space or LF; the remainder
/// becomes `msg`. A bare line with neither is entirely `kind`.
fn split_kind_msg(line: &[u8]) -> ProtocolError {
    let split = line.iter().position(|&b| b == b' ' || b == b'\n');
    match split {
        Some(i) => {
            let kind = String::from_utf8_lossy(&line[..i]).into_owned();
            let msg = String::from_utf8_lossy(&line[i + 1..]).into_owned();
            ProtocolError::new(kind, msg)
        }
        None => ProtocolError::new(String::from_utf8_lossy(line).into_owned(), ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::Writer;

    fn reader_over(bytes: &'static [u8]) -> Reader<&'static [u8]> {
        Reader::new(bytes)
    }

    #[test]
    fn read_pipeline_two_commands_then_eos() {
        let input = b"*2\r\n$3\r\nGET\r\n$5\r\nmykey\r\n*3\r\n$3\r\nSET\r\n$5\r\nmykey\r\n$7\r\nmyvalue\r\n";
        let mut r = reader_over(input);

        let f1 = r.read_command().unwrap();
        let args1: Vec<&[u8]> = f1.args().collect();
        assert_eq!(args1, vec![b"GET".as_slice(), b"mykey".as_slice()]);
        f1.release();

        let f2 = r.read_command().unwrap();
        let args2: Vec<&[u8]> = f2.args().collect();
        assert_eq!(args2, vec![b"SET".as_slice(), b"mykey".as_slice(), b"myvalue".as_slice()]);
        f2.release();

        match r.read_command() {
            Err(RadishError::EndOfStream) => {}
            other => panic!("expected EndOfStream, got {other:?}"),
        }
    }

    #[test]
    fn empty_array_heartbeats_are_skipped() {
        let input = b"*0\r\n*-1\r\n*1\r\n$2\r\nhi\r\n";
        let mut r = reader_over(input);
        let f = r.read_command().unwrap();
        assert_eq!(f.len(), 1);
        assert_eq!(f.arg(0), Some(b"hi".as_slice()));
    }

    #[test]
    fn frame_raw_matches_exact_wire_bytes() {
        let input = b"*1\r\n$3\r\nfoo\r\n";
        let mut r = reader_over(input);
        let f = r.read_command().unwrap();
        assert_eq!(f.raw(), &input[..]);
    }

    #[test]
    fn invalid_multibulk_length_on_overlong_header() {
        let input: &'static [u8] = b"*11111111111111111111111\r\n";
        let mut r = reader_over(input);
        match r.read_command() {
            Err(RadishError::Protocol(p)) => {
                assert_eq!(p.msg, "Protocol error: invalid multibulk length");
            }
            other => panic!("expected Protocol error, got {other:?}"),
        }
    }

    #[test]
    fn huge_multibulk_count_does_not_panic_on_reserve() {
        // A declared length of i64::MAX is well within parse_int's range and
        // the 23-byte length-line limit, so it must fail at element-read
        // time (EndOfStream, no bulk data follows) rather than panicking in
        // `Vec::reserve` while sizing `frame.args` up front.
        let input: &'static [u8] = b"*9223372036854775807\r\n";
        let mut r = reader_over(input);
        match r.read_command() {
            Err(RadishError::EndOfStream) => {}
            other => panic!("expected EndOfStream, got {other:?}"),
        }
    }

    #[test]
    fn invalid_bulk_length_on_bad_terminator() {
        let input: &'static [u8] = b"*1\r\n$3\r\nfooXX";
        let mut r = reader_over(input);
        match r.read_command() {
            Err(RadishError::Protocol(p)) => {
                assert_eq!(p.msg, "Protocol error: invalid bulk length");
            }
            other => panic!("expected Protocol error, got {other:?}"),
        }
    }

    #[test]
    fn null_bulk_in_command_is_invalid_bulk_length() {
        let input: &'static [u8] = b"*1\r\n$-1\r\n";
        let mut r = reader_over(input);
        match r.read_command() {
            Err(RadishError::Protocol(p)) => {
                assert_eq!(p.msg, "Protocol error: invalid bulk length");
            }
            other => panic!("expected Protocol error, got {other:?}"),
        }
    }

    #[test]
    fn read_any_on_null_bulk() {
        let mut r = reader_over(b"$-1\r\n");
        let (ty, val) = r.read_any().unwrap();
        assert_eq!(ty, DataType::Null);
        assert_eq!(val, Value::Null);
    }

    #[test]
    fn read_any_on_error_reply() {
        let mut r = reader_over(b"-ERR unknown command 'GO'\r\n");
        let (ty, val) = r.read_any().unwrap();
        assert_eq!(ty, DataType::Error);
        match val {
            Value::Error(e) => {
                assert_eq!(e.kind, "ERR");
                assert_eq!(e.msg, "unknown command 'GO'");
            }
            other => panic!("expected Error value, got {other:?}"),
        }
    }

    #[test]
    fn read_any_unknown_discriminant() {
        let mut r = reader_over(b"%2\r\n");
        match r.read_any() {
            Err(RadishError::Protocol(p)) => {
                assert!(p.msg.contains("got \"%\" as reply type byte"));
            }
            other => panic!("expected Protocol error, got {other:?}"),
        }
    }

    #[test]
    fn read_any_on_array_header() {
        let mut r = reader_over(b"*2\r\n");
        let (ty, val) = r.read_any().unwrap();
        assert_eq!(ty, DataType::Array);
        assert_eq!(val, Value::ArrayHeader(2));
    }

    #[test]
    fn read_any_on_simple_string() {
        let mut r = reader_over(b"+OK\r\n");
        let (ty, val) = r.read_any().unwrap();
        assert_eq!(ty, DataType::SimpleString);
        assert_eq!(val, Value::SimpleString("OK".to_string()));
    }

    #[test]
    fn read_any_on_integer() {
        let mut r = reader_over(b":1000\r\n");
        let (ty, val) = r.read_any().unwrap();
        assert_eq!(ty, DataType::Integer);
        assert_eq!(val, Value::Integer(1000));
    }

    #[test]
    fn large_argument_round_trips() {
        let mut payload = "very".repeat(16384);
        payload.push_str("-long-string");
        let mut buf = Vec::new();
        {
            let mut w = Writer::new(&mut buf);
            w.write_array(1).unwrap();
            w.write_string(&payload).unwrap();
            w.flush().unwrap();
        }
        let mut r = Reader::new(&buf[..]);
        let f = r.read_command().unwrap();
        assert_eq!(f.arg(0), Some(payload.as_bytes()));
        assert_eq!(f.raw(), &buf[..]);
    }

    #[test]
    fn line_too_long_on_unterminated_simple_string() {
        let mut input = vec![b'+'];
        input.extend(std::iter::repeat(b'a').take(LINE_LIMIT + 10));
        let mut r = Reader::new(&input[..]);
        match r.read_simple_string() {
            Err(RadishError::Protocol(p)) => assert_eq!(p.msg, "line too long"),
            other => panic!("expected line-too-long error, got {other:?}"),
        }
    }

    #[test]
    fn read_error_with_no_space_has_empty_msg() {
        let mut r = reader_over(b"-OOPS\r\n");
        let e = r.read_error().unwrap();
        assert_eq!(e.kind, "OOPS");
        assert_eq!(e.msg, "");
    }

    #[test]
    fn read_error_preserves_embedded_cr_in_msg() {
        // Only a CR immediately followed by the line's final LF terminates
        // the line; a bare `\r` earlier in the payload is ordinary content
        // and survives into `msg` untouched (spec.md §9's open question on
        // embedded `\r` in error lines).
        let mut r = reader_over(b"-KIND extra\rmore\r\n");
        let e = r.read_error().unwrap();
        assert_eq!(e.kind, "KIND");
        assert_eq!(e.msg, "extra\rmore");
    }

    #[test]
    fn framing_error_on_wrong_discriminant() {
        let mut r = reader_over(b"+OK\r\n");
        match r.read_integer() {
            Err(RadishError::Protocol(p)) => assert_eq!(p.msg, "expected ':', got '+'"),
            other => panic!("expected framing error, got {other:?}"),
        }
    }
}
