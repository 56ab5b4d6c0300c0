//! An asynchronous HTTP/1.1 transport.
//!
//! This crate is the connection layer underneath `trellis-web`. It accepts a
//! readable/writable stream pair, decodes requests, hands them to a
//! [`handler::Handler`], and streams the response back. It deliberately stays
//! small:
//!
//! - HTTP/1.1 with keep-alive and `Expect: 100-continue`
//! - request bodies are read whole (bounded by [`protocol::Limits`]) before
//!   the handler runs; response bodies may stream (chunked encoding)
//! - cooperative shutdown through a [`tokio_util::sync::CancellationToken`]
//!   installed in each request's extensions
//!
//! TLS is not handled here; callers wrap the stream before constructing a
//! [`connection::HttpConnection`].
//!
//! # Example
//!
//! ```no_run
//! use std::convert::Infallible;
//! use bytes::Bytes;
//! use http::{Request, Response};
//! use http_body_util::Full;
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//! use trellis_http::connection::HttpConnection;
//! use trellis_http::handler::make_handler;
//! use trellis_http::protocol::Limits;
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let listener = TcpListener::bind("127.0.0.1:8080").await?;
//!     let handler = Arc::new(make_handler(|_req: Request<Bytes>| async {
//!         Ok::<_, Infallible>(Response::new(Full::new(Bytes::from("hello"))))
//!     }));
//!     loop {
//!         let (stream, _) = listener.accept().await?;
//!         let handler = handler.clone();
//!         tokio::spawn(async move {
//!             let (reader, writer) = stream.into_split();
//!             let conn = HttpConnection::new(reader, writer, Limits::default());
//!             let _ = conn.process(handler).await;
//!         });
//!     }
//! }
//! ```

pub mod codec;
pub mod connection;
pub mod handler;
pub mod protocol;
pub mod response;
