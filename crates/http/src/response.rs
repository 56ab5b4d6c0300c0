//! Response serialization.
//!
//! Responses with an exact body size are written with `Content-Length`;
//! everything else is chunked. The caller decides whether the body is
//! suppressed (HEAD) and whether to advertise `Connection: close`.

use crate::protocol::SendError;
use bytes::{Bytes, BytesMut};
use http::header::{CONNECTION, CONTENT_LENGTH, TRANSFER_ENCODING};
use http::{Response, StatusCode};
use http_body::Body;
use http_body_util::BodyExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Write `response` to `writer` and return the number of body bytes sent.
pub async fn send_response<W, B>(
    writer: &mut W,
    response: Response<B>,
    head_only: bool,
    close: bool,
) -> Result<u64, SendError>
where
    W: AsyncWrite + Unpin,
    B: Body<Data = Bytes> + Unpin,
    B::Error: std::fmt::Display,
{
    let (parts, mut body) = response.into_parts();
    let exact_size = Body::size_hint(&body).exact();

    let mut head = BytesMut::with_capacity(256);
    head.extend_from_slice(b"HTTP/1.1 ");
    head.extend_from_slice(parts.status.as_str().as_bytes());
    head.extend_from_slice(b" ");
    head.extend_from_slice(parts.status.canonical_reason().unwrap_or("Unknown").as_bytes());
    head.extend_from_slice(b"\r\n");

    for (name, value) in parts.headers.iter() {
        // framing headers are owned by the transport
        if name == CONTENT_LENGTH || name == TRANSFER_ENCODING {
            continue;
        }
        head.extend_from_slice(name.as_str().as_bytes());
        head.extend_from_slice(b": ");
        head.extend_from_slice(value.as_bytes());
        head.extend_from_slice(b"\r\n");
    }

    let chunked = exact_size.is_none();
    match exact_size {
        Some(length) => {
            head.extend_from_slice(b"content-length: ");
            head.extend_from_slice(length.to_string().as_bytes());
            head.extend_from_slice(b"\r\n");
        }
        None => head.extend_from_slice(b"transfer-encoding: chunked\r\n"),
    }
    if close && !parts.headers.contains_key(CONNECTION) {
        head.extend_from_slice(b"connection: close\r\n");
    }
    head.extend_from_slice(b"\r\n");

    writer.write_all(&head).await.map_err(SendError::io)?;

    if head_only {
        writer.flush().await.map_err(SendError::io)?;
        return Ok(0);
    }

    let mut written = 0u64;
    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(|e| SendError::invalid_body(format!("response body error: {e}")))?;
        let Ok(data) = frame.into_data() else {
            // trailers are not supported on HTTP/1.1 identity responses
            continue;
        };
        if data.is_empty() {
            continue;
        }
        written += data.len() as u64;
        if chunked {
            writer
                .write_all(format!("{:x}\r\n", data.len()).as_bytes())
                .await
                .map_err(SendError::io)?;
            writer.write_all(&data).await.map_err(SendError::io)?;
            writer.write_all(b"\r\n").await.map_err(SendError::io)?;
            // flush per chunk so streaming responses (SSE) are delivered promptly
            writer.flush().await.map_err(SendError::io)?;
        } else {
            writer.write_all(&data).await.map_err(SendError::io)?;
        }
    }
    if chunked {
        writer.write_all(b"0\r\n\r\n").await.map_err(SendError::io)?;
    }
    writer.flush().await.map_err(SendError::io)?;
    Ok(written)
}

/// Minimal empty response used when the request could not be parsed.
pub async fn send_empty_response<W>(writer: &mut W, status: StatusCode) -> Result<(), SendError>
where
    W: AsyncWrite + Unpin,
{
    let response = Response::builder()
        .status(status)
        .body(http_body_util::Empty::<Bytes>::new())
        .map_err(|e| SendError::invalid_body(e.to_string()))?;
    send_response(writer, response, false, true).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::{Full, StreamBody};

    #[tokio::test]
    async fn writes_content_length_response() {
        let response = Response::builder()
            .status(StatusCode::OK)
            .header("content-type", "text/plain")
            .body(Full::new(Bytes::from("hello")))
            .unwrap();

        let mut out = Vec::new();
        let written = send_response(&mut out, response, false, false).await.unwrap();
        assert_eq!(written, 5);

        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("content-type: text/plain\r\n"));
        assert!(text.contains("content-length: 5\r\n"));
        assert!(text.ends_with("\r\n\r\nhello"));
    }

    #[tokio::test]
    async fn head_response_suppresses_body() {
        let response = Response::builder()
            .status(StatusCode::OK)
            .body(Full::new(Bytes::from("hello")))
            .unwrap();

        let mut out = Vec::new();
        let written = send_response(&mut out, response, true, false).await.unwrap();
        assert_eq!(written, 0);

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("content-length: 5\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[tokio::test]
    async fn streams_unknown_length_as_chunked() {
        let frames = vec![
            Ok::<_, std::convert::Infallible>(http_body::Frame::data(Bytes::from("ab"))),
            Ok(http_body::Frame::data(Bytes::from("cde"))),
        ];
        let body = StreamBody::new(futures::stream::iter(frames));
        let response = Response::builder().status(StatusCode::OK).body(body).unwrap();

        let mut out = Vec::new();
        let written = send_response(&mut out, response, false, false).await.unwrap();
        assert_eq!(written, 5);

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("transfer-encoding: chunked\r\n"));
        assert!(text.contains("2\r\nab\r\n"));
        assert!(text.contains("3\r\ncde\r\n"));
        assert!(text.ends_with("0\r\n\r\n"));
    }

    #[tokio::test]
    async fn close_adds_connection_header() {
        let mut out = Vec::new();
        send_empty_response(&mut out, StatusCode::BAD_REQUEST).await.unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(text.contains("connection: close\r\n"));
    }
}
