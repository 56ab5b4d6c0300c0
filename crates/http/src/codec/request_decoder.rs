use crate::codec::chunked::ChunkedDecoder;
use crate::protocol::{Limits, ParseError};
use bytes::{Buf, Bytes, BytesMut};
use http::header::{CONTENT_LENGTH, EXPECT, TRANSFER_ENCODING};
use http::{HeaderName, HeaderValue, Method, Request, Uri, Version};
use tokio_util::codec::Decoder;

/// What the decoder hands to the connection driver.
#[derive(Debug)]
pub enum DecodeEvent {
    /// The header block carried `Expect: 100-continue`; the driver must write
    /// an interim response before the client will send the body.
    NeedContinue,
    /// A complete request, body fully buffered.
    Request(Request<Bytes>),
}

/// Streaming decoder that assembles whole requests.
///
/// Operates as a state machine: header block first (via `httparse`), then the
/// body, either counted by `Content-Length` or chunked. The body is buffered
/// up to [`Limits::max_body_bytes`].
pub struct RequestDecoder {
    limits: Limits,
    phase: Phase,
}

enum Phase {
    Header,
    FixedBody {
        head: Option<http::request::Parts>,
        remaining: usize,
        collected: BytesMut,
    },
    ChunkedBody {
        head: Option<http::request::Parts>,
        chunked: ChunkedDecoder,
        collected: BytesMut,
    },
}

impl RequestDecoder {
    pub fn new(limits: Limits) -> Self {
        Self { limits, phase: Phase::Header }
    }

    /// True between requests, when no partially decoded request is pending.
    pub fn is_idle(&self) -> bool {
        matches!(self.phase, Phase::Header)
    }

    fn decode_header(
        &mut self,
        src: &mut BytesMut,
    ) -> Result<Option<(http::request::Parts, BodyFraming, bool)>, ParseError> {
        let mut headers = vec![httparse::EMPTY_HEADER; self.limits.max_headers];
        let mut parsed = httparse::Request::new(&mut headers);

        let consumed = match parsed.parse(src.as_ref()) {
            Ok(httparse::Status::Complete(consumed)) => consumed,
            Ok(httparse::Status::Partial) => {
                if src.len() > self.limits.max_header_bytes {
                    return Err(ParseError::too_large_header(self.limits.max_header_bytes));
                }
                return Ok(None);
            }
            Err(httparse::Error::TooManyHeaders) => {
                return Err(ParseError::too_many_headers(self.limits.max_headers));
            }
            Err(e) => return Err(ParseError::invalid_header(e)),
        };
        if consumed > self.limits.max_header_bytes {
            return Err(ParseError::too_large_header(self.limits.max_header_bytes));
        }

        let method =
            Method::from_bytes(parsed.method.ok_or(ParseError::InvalidMethod)?.as_bytes())
                .map_err(|_| ParseError::InvalidMethod)?;
        let uri = parsed
            .path
            .ok_or(ParseError::InvalidUri)?
            .parse::<Uri>()
            .map_err(|_| ParseError::InvalidUri)?;
        let version = match parsed.version {
            Some(0) => Version::HTTP_10,
            Some(1) => Version::HTTP_11,
            other => return Err(ParseError::InvalidVersion(other)),
        };

        let mut builder = Request::builder().method(method).uri(uri).version(version);
        {
            let header_map = builder
                .headers_mut()
                .ok_or_else(|| ParseError::invalid_header("request header build failed"))?;
            header_map.reserve(parsed.headers.len());
            for header in parsed.headers.iter().take_while(|h| !h.name.is_empty()) {
                let name = HeaderName::from_bytes(header.name.as_bytes())
                    .map_err(|e| ParseError::invalid_header(e))?;
                let value = HeaderValue::from_bytes(header.value)
                    .map_err(|e| ParseError::invalid_header(e))?;
                header_map.append(name, value);
            }
        }
        let request = builder
            .body(())
            .map_err(|e| ParseError::invalid_header(e))?;
        let (parts, ()) = request.into_parts();

        let framing = body_framing(&parts, self.limits.max_body_bytes)?;
        let expects_continue = parts
            .headers
            .get(EXPECT)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.eq_ignore_ascii_case("100-continue"));

        src.advance(consumed);
        Ok(Some((parts, framing, expects_continue)))
    }
}

#[derive(Debug, Clone, Copy)]
enum BodyFraming {
    Empty,
    Fixed(usize),
    Chunked,
}

fn body_framing(parts: &http::request::Parts, max_body: usize) -> Result<BodyFraming, ParseError> {
    let chunked = parts
        .headers
        .get_all(TRANSFER_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("chunked"));

    if chunked {
        if parts.headers.contains_key(CONTENT_LENGTH) {
            return Err(ParseError::invalid_content_length(
                "both content-length and transfer-encoding present",
            ));
        }
        return Ok(BodyFraming::Chunked);
    }

    let mut lengths = parts.headers.get_all(CONTENT_LENGTH).iter();
    let length = match lengths.next() {
        Some(value) => {
            let text = value
                .to_str()
                .map_err(|_| ParseError::invalid_content_length("not ascii"))?;
            let parsed: usize = text
                .trim()
                .parse()
                .map_err(|_| ParseError::invalid_content_length(text))?;
            for duplicate in lengths {
                if duplicate != value {
                    return Err(ParseError::invalid_content_length("conflicting values"));
                }
            }
            parsed
        }
        None => 0,
    };

    if length > max_body {
        return Err(ParseError::too_large_body(max_body));
    }
    match length {
        0 => Ok(BodyFraming::Empty),
        n => Ok(BodyFraming::Fixed(n)),
    }
}

impl Decoder for RequestDecoder {
    type Item = DecodeEvent;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if matches!(self.phase, Phase::Header) {
                let (parts, framing, expects_continue) = match self.decode_header(src)? {
                    Some(header) => header,
                    None => return Ok(None),
                };
                match framing {
                    BodyFraming::Empty => {
                        return Ok(Some(DecodeEvent::Request(Request::from_parts(
                            parts,
                            Bytes::new(),
                        ))));
                    }
                    BodyFraming::Fixed(length) => {
                        self.phase = Phase::FixedBody {
                            head: Some(parts),
                            remaining: length,
                            collected: BytesMut::with_capacity(length),
                        };
                    }
                    BodyFraming::Chunked => {
                        self.phase = Phase::ChunkedBody {
                            head: Some(parts),
                            chunked: ChunkedDecoder::new(),
                            collected: BytesMut::new(),
                        };
                    }
                }
                if expects_continue {
                    return Ok(Some(DecodeEvent::NeedContinue));
                }
                continue;
            }

            let max_body = self.limits.max_body_bytes;
            match &mut self.phase {
                Phase::Header => unreachable!("handled above"),

                Phase::FixedBody { head, remaining, collected } => {
                    if src.is_empty() {
                        return Ok(None);
                    }
                    let take = (*remaining).min(src.len());
                    collected.extend_from_slice(&src[..take]);
                    src.advance(take);
                    *remaining -= take;
                    if *remaining > 0 {
                        return Ok(None);
                    }
                    let parts = head.take().expect("header parts present in body phase");
                    let body = std::mem::take(collected).freeze();
                    self.phase = Phase::Header;
                    return Ok(Some(DecodeEvent::Request(Request::from_parts(parts, body))));
                }

                Phase::ChunkedBody { head, chunked, collected } => {
                    let done = chunked.decode(src, collected)?;
                    if collected.len() > max_body {
                        return Err(ParseError::too_large_body(max_body));
                    }
                    if !done {
                        return Ok(None);
                    }
                    let parts = head.take().expect("header parts present in body phase");
                    let body = std::mem::take(collected).freeze();
                    self.phase = Phase::Header;
                    return Ok(Some(DecodeEvent::Request(Request::from_parts(parts, body))));
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(event) => Ok(Some(event)),
            None if src.is_empty() && self.is_idle() => Ok(None),
            None => Err(ParseError::invalid_body("connection closed mid-request")),
        }
    }
}
