//! Serial line protocol
//!
//! Line format:
//! - `S:<float>`: steering
//! - `T:<float>`: throttle
//! - `RC:<steer>,<throttle>,<brake>`: three integers in 0..=255, any
//!   further fields are ignored
//!
//! Lines end with `\n`. A `\r` anywhere is dropped so CRLF terminals work.
//! Parsing is strict: malformed values are rejected, never read as zero.

use heapless::{String, Vec};

use crate::command::{truncate, Command, CommandBatch};

/// Longest accepted line, excluding the terminator
pub const MAX_LINE_LEN: usize = 64;

/// Longest tag kept for the unknown-tag echo
pub const MAX_TAG_LEN: usize = 8;

/// Upper bound of each legacy `RC:` field
pub const RC_MAX: i32 = 255;

/// Errors that can occur while reading or parsing a line
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LineError {
    /// Line has no `<tag>:` prefix
    MissingSeparator,
    /// Tag is not one of `S`, `T`, `RC`
    UnknownTag(String<MAX_TAG_LEN>),
    /// Value is empty, not a number, or not finite
    InvalidValue,
    /// `RC:` did not carry exactly three fields
    FieldCount,
    /// `RC:` field outside 0..=255
    OutOfRange,
    /// Line exceeded [`MAX_LINE_LEN`] and was discarded
    Overflow,
    /// Line is not valid UTF-8
    Malformed,
}

/// Accumulates serial bytes into complete lines
#[derive(Debug, Clone, Default)]
pub struct LineBuffer {
    buffer: Vec<u8, MAX_LINE_LEN>,
    overflowed: bool,
}

impl LineBuffer {
    /// Create an empty line buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop any partial line
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.overflowed = false;
    }

    /// Feed a single byte
    ///
    /// Returns `Some(Ok(line))` when a non-empty line completes,
    /// `Some(Err(_))` when a completed line had to be discarded, and `None`
    /// while more bytes are needed. Blank lines are skipped.
    pub fn feed(&mut self, byte: u8) -> Option<Result<String<MAX_LINE_LEN>, LineError>> {
        match byte {
            b'\r' => None,
            b'\n' => {
                if self.overflowed {
                    self.reset();
                    return Some(Err(LineError::Overflow));
                }
                if self.buffer.is_empty() {
                    return None;
                }
                let result = core::str::from_utf8(&self.buffer)
                    .map(truncate)
                    .map_err(|_| LineError::Malformed);
                self.reset();
                Some(result)
            }
            _ => {
                if !self.overflowed && self.buffer.push(byte).is_err() {
                    // Keep swallowing until the terminator
                    self.buffer.clear();
                    self.overflowed = true;
                }
                None
            }
        }
    }
}

/// Parse one complete line into commands
///
/// `S:` and `T:` yield a single command. `RC:` yields steering, throttle
/// and brake, converted from 0..=255 to the normalized ranges.
pub fn parse_line(line: &str) -> Result<CommandBatch, LineError> {
    let line = line.trim();
    let (tag, value) = line.split_once(':').ok_or(LineError::MissingSeparator)?;

    let mut batch = CommandBatch::new();
    match tag {
        "S" => {
            let _ = batch.push(Command::Steer(parse_float(value)?));
        }
        "T" => {
            let _ = batch.push(Command::Throttle(parse_float(value)?));
        }
        "RC" => {
            let [steer, throttle, brake] = parse_rc(value)?;
            let _ = batch.push(Command::Steer(steer as f32 / RC_MAX as f32 * 2.0 - 1.0));
            let _ = batch.push(Command::Throttle(throttle as f32 / RC_MAX as f32));
            let _ = batch.push(Command::Brake(brake as f32 / RC_MAX as f32));
        }
        other => return Err(LineError::UnknownTag(truncate(other))),
    }
    Ok(batch)
}

fn parse_float(value: &str) -> Result<f32, LineError> {
    let parsed: f32 = value.trim().parse().map_err(|_| LineError::InvalidValue)?;
    if !parsed.is_finite() {
        return Err(LineError::InvalidValue);
    }
    Ok(parsed)
}

/// Parse the first three comma-separated fields; anything after the third is ignored
fn parse_rc(value: &str) -> Result<[i32; 3], LineError> {
    let mut fields = [0i32; 3];
    let mut parts = value.splitn(fields.len() + 1, ',');
    for field in fields.iter_mut() {
        let part = parts.next().ok_or(LineError::FieldCount)?;
        let parsed: i32 = part.trim().parse().map_err(|_| LineError::InvalidValue)?;
        if !(0..=RC_MAX).contains(&parsed) {
            return Err(LineError::OutOfRange);
        }
        *field = parsed;
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(buf: &mut LineBuffer, bytes: &[u8]) -> Vec<Result<String<MAX_LINE_LEN>, LineError>, 4> {
        let mut out = Vec::new();
        for &b in bytes {
            if let Some(r) = buf.feed(b) {
                out.push(r).unwrap();
            }
        }
        out
    }

    #[test]
    fn test_parse_steer() {
        let batch = parse_line("S:0.5").unwrap();
        assert_eq!(batch.as_slice(), &[Command::Steer(0.5)]);
    }

    #[test]
    fn test_parse_throttle_passes_out_of_range_through() {
        // Clamping happens at the actuator, not here
        let batch = parse_line("T:1.7").unwrap();
        assert_eq!(batch.as_slice(), &[Command::Throttle(1.7)]);
    }

    #[test]
    fn test_parse_rc_converts_ranges() {
        let batch = parse_line("RC:255,0,0").unwrap();
        assert_eq!(
            batch.as_slice(),
            &[Command::Steer(1.0), Command::Throttle(0.0), Command::Brake(0.0)]
        );

        let batch = parse_line("RC:0,255,255").unwrap();
        assert_eq!(
            batch.as_slice(),
            &[Command::Steer(-1.0), Command::Throttle(1.0), Command::Brake(1.0)]
        );
    }

    #[test]
    fn test_parse_rc_rejects_bad_fields() {
        assert_eq!(parse_line("RC:1,2"), Err(LineError::FieldCount));
        assert_eq!(parse_line("RC:1,256,3"), Err(LineError::OutOfRange));
        assert_eq!(parse_line("RC:1,-1,3"), Err(LineError::OutOfRange));
        assert_eq!(parse_line("RC:a,b,c"), Err(LineError::InvalidValue));
    }

    #[test]
    fn test_parse_rc_ignores_trailing_fields() {
        assert_eq!(parse_line("RC:10,20,30,40"), parse_line("RC:10,20,30"));
        assert_eq!(parse_line("RC:10,20,30,junk,"), parse_line("RC:10,20,30"));
        // Only the first three fields are checked
        assert_eq!(parse_line("RC:10,20,300,40"), Err(LineError::OutOfRange));
    }

    #[test]
    fn test_same_line_parses_the_same_twice() {
        for line in ["S:-0.4", "T:0.75", "RC:12,200,0"] {
            let first = parse_line(line).unwrap();
            let second = parse_line(line).unwrap();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_buffer_keeps_nothing_between_lines() {
        let mut buf = LineBuffer::new();
        let lines = feed_all(&mut buf, b"RC:12,200,0\nRC:12,200,0\n");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], lines[1]);
        let first = parse_line(lines[0].as_ref().unwrap()).unwrap();
        let second = parse_line(lines[1].as_ref().unwrap()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_parse_rejects_garbage_values() {
        assert_eq!(parse_line("S:"), Err(LineError::InvalidValue));
        assert_eq!(parse_line("S:abc"), Err(LineError::InvalidValue));
        assert_eq!(parse_line("T:nan"), Err(LineError::InvalidValue));
        assert_eq!(parse_line("T:inf"), Err(LineError::InvalidValue));
    }

    #[test]
    fn test_parse_unknown_tag() {
        match parse_line("X:1") {
            Err(LineError::UnknownTag(tag)) => assert_eq!(tag.as_str(), "X"),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(parse_line("hello"), Err(LineError::MissingSeparator));
    }

    #[test]
    fn test_buffer_splits_lines_and_drops_cr() {
        let mut buf = LineBuffer::new();
        let lines = feed_all(&mut buf, b"S:0.1\r\nT:0.2\n\n");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].as_ref().unwrap().as_str(), "S:0.1");
        assert_eq!(lines[1].as_ref().unwrap().as_str(), "T:0.2");
    }

    #[test]
    fn test_buffer_holds_partial_line() {
        let mut buf = LineBuffer::new();
        assert!(feed_all(&mut buf, b"S:0.").is_empty());
        let lines = feed_all(&mut buf, b"25\n");
        assert_eq!(lines[0].as_ref().unwrap().as_str(), "S:0.25");
    }

    #[test]
    fn test_buffer_discards_overlong_line_then_recovers() {
        let mut buf = LineBuffer::new();
        let long = [b'9'; MAX_LINE_LEN + 10];
        assert!(feed_all(&mut buf, &long).is_empty());
        let lines = feed_all(&mut buf, b"\nS:1\n");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], Err(LineError::Overflow));
        assert_eq!(lines[1].as_ref().unwrap().as_str(), "S:1");
    }

    #[test]
    fn test_buffer_rejects_invalid_utf8() {
        let mut buf = LineBuffer::new();
        let lines = feed_all(&mut buf, &[0xFF, 0xFE, b'\n']);
        assert_eq!(lines[0], Err(LineError::Malformed));
    }
}
