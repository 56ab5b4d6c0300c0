//! Request decoding.
//!
//! The wire format is parsed in two phases: the header block through
//! [`httparse`], then the body through either a content-length countdown or
//! the chunked decoder. A whole request is emitted at once; see the crate
//! docs for why bodies are not streamed.

mod chunked;
mod request_decoder;

pub use chunked::ChunkedDecoder;
pub use request_decoder::{DecodeEvent, RequestDecoder};
