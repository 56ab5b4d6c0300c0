use crate::protocol::ParseError;
use bytes::{Buf, BytesMut};

/// Incremental decoder for `Transfer-Encoding: chunked` bodies.
///
/// Chunk extensions are ignored; trailer fields are consumed and discarded.
#[derive(Debug)]
pub struct ChunkedDecoder {
    state: State,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Size,
    Data { remaining: usize },
    DataCrlf,
    Trailers,
    Done,
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self { state: State::Size }
    }

    pub fn is_done(&self) -> bool {
        self.state == State::Done
    }

    /// Consume as much of `src` as possible, appending decoded data to `out`.
    ///
    /// Returns `Ok(true)` once the terminating chunk and trailers have been
    /// read. Returns `Ok(false)` when more input is needed.
    pub fn decode(&mut self, src: &mut BytesMut, out: &mut BytesMut) -> Result<bool, ParseError> {
        loop {
            match self.state {
                State::Size => {
                    let line = match take_line(src)? {
                        Some(line) => line,
                        None => return Ok(false),
                    };
                    let size = parse_chunk_size(&line)?;
                    if size == 0 {
                        self.state = State::Trailers;
                    } else {
                        self.state = State::Data { remaining: size };
                    }
                }
                State::Data { remaining } => {
                    if src.is_empty() {
                        return Ok(false);
                    }
                    let take = remaining.min(src.len());
                    out.extend_from_slice(&src[..take]);
                    src.advance(take);
                    if take == remaining {
                        self.state = State::DataCrlf;
                    } else {
                        self.state = State::Data { remaining: remaining - take };
                    }
                }
                State::DataCrlf => {
                    if src.len() < 2 {
                        return Ok(false);
                    }
                    if &src[..2] != b"\r\n" {
                        return Err(ParseError::invalid_body("chunk data not terminated by CRLF"));
                    }
                    src.advance(2);
                    self.state = State::Size;
                }
                State::Trailers => {
                    let line = match take_line(src)? {
                        Some(line) => line,
                        None => return Ok(false),
                    };
                    if line.is_empty() {
                        self.state = State::Done;
                        return Ok(true);
                    }
                    // discard the trailer field
                }
                State::Done => return Ok(true),
            }
        }
    }
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Take one CRLF-terminated line off the front of `src`, without the CRLF.
fn take_line(src: &mut BytesMut) -> Result<Option<Vec<u8>>, ParseError> {
    match src.iter().position(|&b| b == b'\n') {
        Some(pos) => {
            if pos == 0 || src[pos - 1] != b'\r' {
                return Err(ParseError::invalid_body("bare LF in chunked body"));
            }
            let line = src[..pos - 1].to_vec();
            src.advance(pos + 1);
            Ok(Some(line))
        }
        None => Ok(None),
    }
}

fn parse_chunk_size(line: &[u8]) -> Result<usize, ParseError> {
    // everything after ';' is a chunk extension
    let digits = match line.iter().position(|&b| b == b';') {
        Some(pos) => &line[..pos],
        None => line,
    };
    let digits = std::str::from_utf8(digits)
        .map_err(|_| ParseError::invalid_body("chunk size is not ascii"))?
        .trim();
    if digits.is_empty() {
        return Err(ParseError::invalid_body("empty chunk size"));
    }
    usize::from_str_radix(digits, 16).map_err(|_| ParseError::invalid_body("invalid chunk size"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(input: &[u8]) -> Result<(BytesMut, bool), ParseError> {
        let mut decoder = ChunkedDecoder::new();
        let mut src = BytesMut::from(input);
        let mut out = BytesMut::new();
        let done = decoder.decode(&mut src, &mut out)?;
        Ok((out, done))
    }

    #[test]
    fn decodes_single_chunk() {
        let (out, done) = decode_all(b"5\r\nhello\r\n0\r\n\r\n").unwrap();
        assert!(done);
        assert_eq!(&out[..], b"hello");
    }

    #[test]
    fn decodes_multiple_chunks_with_extension() {
        let (out, done) = decode_all(b"4;name=value\r\nwiki\r\n6\r\npedia \r\n0\r\n\r\n").unwrap();
        assert!(done);
        assert_eq!(&out[..], b"wikipedia ");
    }

    #[test]
    fn resumes_across_partial_input() {
        let mut decoder = ChunkedDecoder::new();
        let mut out = BytesMut::new();

        let mut src = BytesMut::from(&b"5\r\nhe"[..]);
        assert!(!decoder.decode(&mut src, &mut out).unwrap());

        src.extend_from_slice(b"llo\r\n0\r\n\r\n");
        assert!(decoder.decode(&mut src, &mut out).unwrap());
        assert_eq!(&out[..], b"hello");
    }

    #[test]
    fn discards_trailers() {
        let (out, done) = decode_all(b"3\r\nabc\r\n0\r\nx-checksum: 1\r\n\r\n").unwrap();
        assert!(done);
        assert_eq!(&out[..], b"abc");
    }

    #[test]
    fn rejects_invalid_size() {
        assert!(decode_all(b"zz\r\nabc\r\n").is_err());
    }

    #[test]
    fn rejects_missing_data_crlf() {
        assert!(decode_all(b"3\r\nabcXX0\r\n\r\n").is_err());
    }
}
