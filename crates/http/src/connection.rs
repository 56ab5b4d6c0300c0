//! Connection lifecycle: decode requests, dispatch, stream responses.

use std::fmt::Display;
use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use http::header::CONNECTION;
use http::{Request, StatusCode, Version};
use http_body::Body;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::select;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::codec::{DecodeEvent, RequestDecoder};
use crate::handler::Handler;
use crate::protocol::{HttpError, Limits, ParseError};
use crate::response::{send_empty_response, send_response};

/// Drives one HTTP/1.1 connection to completion.
///
/// The read half is framed with [`RequestDecoder`]; the write half is a
/// buffered writer fed by [`send_response`]. Requests are processed strictly
/// in sequence (no pipelining of handler execution).
pub struct HttpConnection<R, W> {
    framed_read: FramedRead<R, RequestDecoder>,
    writer: BufWriter<W>,
    limits: Limits,
    shutdown: CancellationToken,
}

impl<R, W> HttpConnection<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W, limits: Limits) -> Self {
        Self {
            framed_read: FramedRead::with_capacity(reader, RequestDecoder::new(limits), 8 * 1024),
            writer: BufWriter::new(writer),
            limits,
            shutdown: CancellationToken::new(),
        }
    }

    /// Attach a shutdown token. When it fires, the connection stops accepting
    /// new requests; the in-flight request observes the child token installed
    /// in its extensions.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub async fn process<H>(mut self, handler: Arc<H>) -> Result<(), HttpError>
    where
        H: Handler<Bytes>,
        H::RespBody: Body<Data = Bytes> + Send + Unpin,
        <H::RespBody as Body>::Error: Display,
    {
        loop {
            let event = select! {
                biased;
                () = self.shutdown.cancelled() => {
                    debug!("shutdown signalled, closing connection");
                    break;
                }
                event = next_event(&mut self.framed_read, &self.limits) => event,
            };

            match event {
                Some(Ok(DecodeEvent::NeedContinue)) => {
                    self.writer
                        .write_all(b"HTTP/1.1 100 Continue\r\n\r\n")
                        .await
                        .map_err(ParseError::io)?;
                    self.writer.flush().await.map_err(ParseError::io)?;
                    debug!("sent interim 100 continue response");
                }

                Some(Ok(DecodeEvent::Request(request))) => {
                    let closing = self.handle_request(request, &handler).await?;
                    if closing {
                        break;
                    }
                }

                Some(Err(e)) => {
                    warn!("failed to read request: {e}");
                    let status = error_status(&e);
                    send_empty_response(&mut self.writer, status).await?;
                    return Err(e.into());
                }

                None => {
                    debug!("peer closed the connection");
                    break;
                }
            }
        }

        self.writer.shutdown().await.map_err(ParseError::io)?;
        Ok(())
    }

    async fn handle_request<H>(
        &mut self,
        mut request: Request<Bytes>,
        handler: &Arc<H>,
    ) -> Result<bool, HttpError>
    where
        H: Handler<Bytes>,
        H::RespBody: Body<Data = Bytes> + Send + Unpin,
        <H::RespBody as Body>::Error: Display,
    {
        let head_only = request.method() == http::Method::HEAD;
        let close = wants_close(&request);
        request.extensions_mut().insert(self.shutdown.child_token());

        match handler.call(request).await {
            Ok(response) => {
                send_response(&mut self.writer, response, head_only, close).await?;
            }
            Err(e) => {
                error!("handler error: {}", e.into());
                send_empty_response(&mut self.writer, StatusCode::INTERNAL_SERVER_ERROR).await?;
            }
        }
        Ok(close)
    }
}

async fn next_event<R>(
    framed: &mut FramedRead<R, RequestDecoder>,
    limits: &Limits,
) -> Option<Result<DecodeEvent, ParseError>>
where
    R: AsyncRead + Unpin,
{
    match limits.read_timeout {
        Some(timeout) => match tokio::time::timeout(timeout, framed.next()).await {
            Ok(event) => event,
            Err(_) => Some(Err(ParseError::ReadTimeout)),
        },
        None => framed.next().await,
    }
}

fn wants_close(request: &Request<Bytes>) -> bool {
    let connection = request
        .headers()
        .get(CONNECTION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    match request.version() {
        Version::HTTP_10 => !connection.eq_ignore_ascii_case("keep-alive"),
        _ => connection.eq_ignore_ascii_case("close"),
    }
}

fn error_status(e: &ParseError) -> StatusCode {
    match e {
        ParseError::TooLargeHeader { .. } => StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE,
        ParseError::TooManyHeaders { .. } => StatusCode::BAD_REQUEST,
        ParseError::TooLargeBody { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        ParseError::ReadTimeout => StatusCode::REQUEST_TIMEOUT,
        _ => StatusCode::BAD_REQUEST,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Response;
    use http_body_util::Full;
    use std::convert::Infallible;

    use crate::handler::make_handler;

    async fn run(input: &str) -> String {
        let handler = Arc::new(make_handler(|req: Request<Bytes>| async move {
            let body = format!("{} {}", req.method(), req.uri().path());
            Ok::<_, Infallible>(Response::new(Full::new(Bytes::from(body))))
        }));

        let (mut client, server) = tokio::io::duplex(16 * 1024);
        let task = tokio::spawn(async move {
            let (reader, writer) = tokio::io::split(server);
            let conn = HttpConnection::new(reader, writer, Limits::default());
            let _ = conn.process(handler).await;
        });

        use tokio::io::{AsyncReadExt, AsyncWriteExt as _};
        client.write_all(input.as_bytes()).await.unwrap();
        client.shutdown().await.unwrap();
        let mut out = Vec::new();
        client.read_to_end(&mut out).await.unwrap();
        task.await.unwrap();
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn serves_a_simple_request() {
        let out = run("GET /hi HTTP/1.1\r\nHost: t\r\n\r\n").await;
        assert!(out.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(out.ends_with("GET /hi"));
    }

    #[tokio::test]
    async fn serves_keep_alive_requests_in_order() {
        let out = run("GET /a HTTP/1.1\r\n\r\nGET /b HTTP/1.1\r\nConnection: close\r\n\r\n").await;
        let first = out.find("GET /a").expect("first response present");
        let second = out.find("GET /b").expect("second response present");
        assert!(first < second);
    }

    #[tokio::test]
    async fn malformed_request_gets_400() {
        let out = run("NOT A REQUEST\r\n\r\n").await;
        assert!(out.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    }

    #[tokio::test]
    async fn head_request_has_no_body() {
        let out = run("HEAD /h HTTP/1.1\r\nConnection: close\r\n\r\n").await;
        assert!(out.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(out.ends_with("\r\n\r\n"));
    }

    #[tokio::test]
    async fn oversized_body_gets_413() {
        let handler = Arc::new(make_handler(|_req: Request<Bytes>| async move {
            Ok::<_, Infallible>(Response::new(Full::new(Bytes::from("ok"))))
        }));

        let (mut client, server) = tokio::io::duplex(16 * 1024);
        let limits = Limits::default().max_body_bytes(4);
        let task = tokio::spawn(async move {
            let (reader, writer) = tokio::io::split(server);
            let conn = HttpConnection::new(reader, writer, limits);
            let _ = conn.process(handler).await;
        });

        use tokio::io::{AsyncReadExt, AsyncWriteExt as _};
        client
            .write_all(b"POST /x HTTP/1.1\r\nContent-Length: 10\r\n\r\n0123456789")
            .await
            .unwrap();
        client.shutdown().await.unwrap();
        let mut out = Vec::new();
        client.read_to_end(&mut out).await.unwrap();
        task.await.unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 413 Payload Too Large\r\n"), "got: {text}");
    }

    #[tokio::test]
    async fn slow_request_gets_408() {
        let handler = Arc::new(make_handler(|_req: Request<Bytes>| async move {
            Ok::<_, Infallible>(Response::new(Full::new(Bytes::from("ok"))))
        }));

        let (mut client, server) = tokio::io::duplex(16 * 1024);
        let limits = Limits::default().read_timeout(std::time::Duration::from_millis(50));
        let task = tokio::spawn(async move {
            let (reader, writer) = tokio::io::split(server);
            let conn = HttpConnection::new(reader, writer, limits);
            let _ = conn.process(handler).await;
        });

        use tokio::io::{AsyncReadExt, AsyncWriteExt as _};
        // send only a partial header block and stall
        client.write_all(b"GET /slow HTT").await.unwrap();
        let mut out = Vec::new();
        client.read_to_end(&mut out).await.unwrap();
        task.await.unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 408 Request Timeout\r\n"), "got: {text}");
    }

    #[tokio::test]
    async fn shutdown_token_stops_accepting_new_requests() {
        let handler = Arc::new(make_handler(|_req: Request<Bytes>| async move {
            Ok::<_, Infallible>(Response::new(Full::new(Bytes::from("ok"))))
        }));

        let token = CancellationToken::new();
        let (mut client, server) = tokio::io::duplex(16 * 1024);
        let conn_token = token.clone();
        let task = tokio::spawn(async move {
            let (reader, writer) = tokio::io::split(server);
            let conn = HttpConnection::new(reader, writer, Limits::default())
                .with_shutdown(conn_token);
            conn.process(handler).await
        });

        token.cancel();
        use tokio::io::AsyncReadExt;
        let mut out = Vec::new();
        client.read_to_end(&mut out).await.unwrap();
        assert!(task.await.unwrap().is_ok());
        assert!(out.is_empty(), "no response expected after shutdown");
    }
}
