//! Frame assembly over an accumulating byte buffer.
//!
//! The inbound stream is a sequence of JSON values separated only by
//! whitespace, delivered in arbitrary fragments. [`try_consume_one`] decodes
//! at most one value from the front of a buffer and reports how many bytes it
//! used; a value cut off at the end of the buffer is reported as
//! [`Decoded::Incomplete`] and nothing is consumed.

use serde_json::value::RawValue;

use crate::{DecodePolicy, FrameError, RawJson, SessionConfig};

/// Result of one decode attempt.
#[derive(Debug)]
pub enum Decoded {
    /// A whole value: `consumed` bytes (leading whitespace included) produced it.
    Complete { consumed: usize, value: RawJson },
    /// More bytes are needed; the buffer must be kept as-is.
    Incomplete,
}

/// Decode exactly one JSON value from the front of `buffer`.
///
/// The value is kept as raw text, so numbers keep their exact digits. A bare
/// number that runs to the end of the buffer is treated as incomplete, as the
/// next fragment may carry more digits.
///
/// # Errors
/// Returns [`FrameError::Syntax`] under [`DecodePolicy::Strict`] when the
/// buffer holds a syntax error that is not explained by truncation.
pub fn try_consume_one(buffer: &[u8], policy: DecodePolicy) -> Result<Decoded, FrameError> {
    let mut stream = serde_json::Deserializer::from_slice(buffer).into_iter::<RawJson>();

    match stream.next() {
        None => Ok(Decoded::Incomplete),
        Some(Ok(value)) => {
            let consumed = stream.byte_offset();
            if consumed == buffer.len() && is_open_ended(&value) {
                return Ok(Decoded::Incomplete);
            }
            Ok(Decoded::Complete { consumed, value })
        }
        Some(Err(e)) if e.is_eof() => Ok(Decoded::Incomplete),
        Some(Err(e)) => match policy {
            DecodePolicy::Lenient => {
                tracing::trace!(error = %e, "Undecodable frame, waiting for more input");
                Ok(Decoded::Incomplete)
            }
            // An error located at the very end may still be a cut-off token.
            DecodePolicy::Strict if error_offset(buffer, &e) < buffer.len() => {
                Err(FrameError::Syntax(e))
            }
            DecodePolicy::Strict => Ok(Decoded::Incomplete),
        },
    }
}

/// Byte offset of a decode error, from its line and column.
fn error_offset(buffer: &[u8], e: &serde_json::Error) -> usize {
    let line_start = match e.line() {
        0 | 1 => 0,
        line => buffer
            .iter()
            .enumerate()
            .filter(|(_, b)| **b == b'\n')
            .nth(line - 2)
            .map_or(buffer.len(), |(i, _)| i + 1),
    };
    line_start + e.column()
}

fn is_open_ended(value: &RawValue) -> bool {
    value
        .get()
        .bytes()
        .next()
        .is_some_and(|b| b == b'-' || b.is_ascii_digit())
}

/// Owns the inbound buffer and drains complete values from it.
///
/// Decoded values are skipped with a read offset; the consumed prefix is
/// dropped once per [`push`](Self::push).
#[derive(Debug, Default)]
pub struct FrameAssembler {
    buffer: Vec<u8>,
    start: usize,
    policy: DecodePolicy,
    max_frame_bytes: Option<usize>,
}

impl FrameAssembler {
    /// Create an assembler with the given policy and buffer ceiling.
    #[must_use]
    pub const fn new(policy: DecodePolicy, max_frame_bytes: Option<usize>) -> Self {
        Self {
            buffer: Vec::new(),
            start: 0,
            policy,
            max_frame_bytes,
        }
    }

    /// Create an assembler from session configuration.
    #[must_use]
    pub const fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.decode_policy, config.max_frame_bytes)
    }

    /// Append a chunk read from the stream.
    pub fn push(&mut self, chunk: &[u8]) {
        if self.start > 0 {
            self.buffer.drain(..self.start);
            self.start = 0;
        }
        self.buffer.extend_from_slice(chunk);
    }

    /// Take the next complete value, or `None` when more input is needed.
    ///
    /// Call repeatedly after each [`push`](Self::push) until it returns
    /// `Ok(None)`, since one chunk may complete several values.
    ///
    /// # Errors
    /// Returns error if the buffered bytes exceed the frame ceiling without
    /// completing a value, or on a syntax error under the strict policy.
    pub fn next_frame(&mut self) -> Result<Option<RawJson>, FrameError> {
        match try_consume_one(&self.buffer[self.start..], self.policy)? {
            Decoded::Complete { consumed, value } => {
                self.start += consumed;
                if self.start == self.buffer.len() {
                    self.buffer.clear();
                    self.start = 0;
                }
                tracing::trace!(consumed, remaining = self.buffered(), "Frame decoded");
                Ok(Some(value))
            }
            Decoded::Incomplete => match self.max_frame_bytes {
                Some(limit) if self.buffered() > limit => Err(FrameError::TooLarge {
                    buffered: self.buffered(),
                    limit,
                }),
                _ => Ok(None),
            },
        }
    }

    /// Bytes buffered and not yet decoded.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len() - self.start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete(buffer: &[u8]) -> (usize, String) {
        match try_consume_one(buffer, DecodePolicy::Lenient).unwrap() {
            Decoded::Complete { consumed, value } => (consumed, value.get().to_string()),
            Decoded::Incomplete => panic!("expected a complete value"),
        }
    }

    fn is_incomplete(buffer: &[u8]) -> bool {
        matches!(
            try_consume_one(buffer, DecodePolicy::Lenient).unwrap(),
            Decoded::Incomplete
        )
    }

    #[test]
    fn test_consumes_exactly_one_value() {
        let value = br#"{"agents":[{"id":1,"version":2,"nickname":"bot1"}]}"#;
        let mut buffer = value.to_vec();
        buffer.extend_from_slice(b"\n{\"ping\":1}\n");

        let (consumed, raw) = complete(&buffer);
        assert_eq!(consumed, value.len());
        assert_eq!(raw.as_bytes(), value);

        let (consumed, raw) = complete(value);
        assert_eq!(consumed, value.len());
        assert_eq!(raw.as_bytes(), value);
    }

    #[test]
    fn test_every_prefix_is_incomplete() {
        let value = r#"{"s":"café \"x\"","n":[1.5e3,-2,true,null],"o":{}}"#.as_bytes();
        for k in 1..value.len() {
            assert!(is_incomplete(&value[..k]), "prefix of length {k} decoded");
        }
    }

    #[test]
    fn test_split_then_complete() {
        let value = br#"{"board":"x.o","turn":12}"#;
        for k in 1..value.len() {
            let mut assembler = FrameAssembler::default();
            assembler.push(&value[..k]);
            assert!(assembler.next_frame().unwrap().is_none());
            assert_eq!(assembler.buffered(), k);

            assembler.push(&value[k..]);
            let raw = assembler.next_frame().unwrap().unwrap();
            assert_eq!(raw.get().as_bytes(), value);
            assert_eq!(assembler.buffered(), 0);
        }
    }

    #[test]
    fn test_multibyte_split() {
        let value = "{\"nickname\":\"ботик\"}".as_bytes();
        let mut assembler = FrameAssembler::default();
        assembler.push(&value[..16]);
        assert!(assembler.next_frame().unwrap().is_none());
        assembler.push(&value[16..]);
        let raw = assembler.next_frame().unwrap().unwrap();
        assert_eq!(raw.get(), "{\"nickname\":\"ботик\"}");
    }

    #[test]
    fn test_drains_back_to_back_values() {
        let mut assembler = FrameAssembler::default();
        assembler.push(b"{\"a\":1}{\"b\":2}\n  [3]\n{\"c\"");

        let frames: Vec<String> = std::iter::from_fn(|| assembler.next_frame().unwrap())
            .map(|raw| raw.get().to_string())
            .collect();
        assert_eq!(frames, vec![r#"{"a":1}"#, r#"{"b":2}"#, "[3]"]);
        assert_eq!(assembler.buffered(), "\n{\"c\"".len());
    }

    #[test]
    fn test_many_values_from_one_chunk() {
        let mut chunk = String::new();
        for n in 0..5_000 {
            chunk.push_str(&format!("{{\"n\":{n}}}\n"));
        }
        chunk.push_str("{\"n\":");

        let mut assembler = FrameAssembler::default();
        assembler.push(chunk.as_bytes());
        let mut count = 0;
        while let Some(raw) = assembler.next_frame().unwrap() {
            assert_eq!(raw.get(), format!("{{\"n\":{count}}}"));
            count += 1;
        }
        assert_eq!(count, 5_000);
        assert_eq!(assembler.buffered(), "\n{\"n\":".len());

        // The consumed prefix is dropped before new bytes are appended.
        assembler.push(b"5000}");
        assert_eq!(assembler.buffered(), "\n{\"n\":5000}".len());
        let raw = assembler.next_frame().unwrap().unwrap();
        assert_eq!(raw.get(), r#"{"n":5000}"#);
        assert_eq!(assembler.buffered(), 0);
    }

    #[test]
    fn test_frame_ceiling_counts_only_undecoded_bytes() {
        let mut assembler = FrameAssembler::new(DecodePolicy::Lenient, Some(8));
        assembler.push(b"{\"ab\":1}{\"cd\":2}{\"e");
        assert!(assembler.next_frame().unwrap().is_some());
        assert!(assembler.next_frame().unwrap().is_some());
        assert!(assembler.next_frame().unwrap().is_none());
        assert_eq!(assembler.buffered(), 3);
    }

    #[test]
    fn test_preserves_number_precision() {
        let (_, raw) = complete(br#"{"big":123456789012345678901234567890.000000000000000001}"#);
        assert_eq!(raw, r#"{"big":123456789012345678901234567890.000000000000000001}"#);
    }

    #[test]
    fn test_trailing_number_waits_for_delimiter() {
        assert!(is_incomplete(b"12"));
        let (consumed, raw) = complete(b"123 ");
        assert_eq!(consumed, 3);
        assert_eq!(raw, "123");
    }

    #[test]
    fn test_whitespace_only_is_incomplete() {
        assert!(is_incomplete(b""));
        assert!(is_incomplete(b" \n\t\r\n"));
    }

    #[test]
    fn test_lenient_policy_waits_on_syntax_error() {
        assert!(is_incomplete(b"{\"a\":}\n"));
    }

    #[test]
    fn test_strict_policy_reports_syntax_error() {
        let err = try_consume_one(b"{\"a\":}\n", DecodePolicy::Strict).unwrap_err();
        assert!(matches!(err, FrameError::Syntax(_)));

        let err = try_consume_one(b"{\"a\":1}\n{\"b\"::2}\n", DecodePolicy::Strict);
        assert!(matches!(err, Ok(Decoded::Complete { consumed: 7, .. })));
        let err = try_consume_one(b"\n{\"b\"::2}\n", DecodePolicy::Strict).unwrap_err();
        assert!(matches!(err, FrameError::Syntax(_)));

        // Truncation is still not an error.
        for prefix in [&b"{\"a\":"[..], b"{\"n\":-", b"{\"n\":1.", b"[1e", b"\n\n{\"s\":\"x\\"] {
            assert!(
                matches!(
                    try_consume_one(prefix, DecodePolicy::Strict).unwrap(),
                    Decoded::Incomplete
                ),
                "{:?} reported as malformed",
                String::from_utf8_lossy(prefix)
            );
        }
    }

    #[test]
    fn test_frame_ceiling() {
        let mut assembler = FrameAssembler::new(DecodePolicy::Lenient, Some(8));
        assembler.push(b"{\"ab\":1}");
        assert!(assembler.next_frame().unwrap().is_some());

        assembler.push(b"{\"abcdefgh");
        let err = assembler.next_frame().unwrap_err();
        assert!(matches!(
            err,
            FrameError::TooLarge {
                buffered: 10,
                limit: 8
            }
        ));
    }
}
