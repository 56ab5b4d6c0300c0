//! Server-sent events: a ticking clock stream.
//!
//! ```bash
//! cargo run --example sse_server
//! curl -N http://127.0.0.1:8080/events
//! ```

use std::time::Duration;

use http::StatusCode;
use trellis_web::sse::{sse_channel, Event};
use trellis_web::{handler_fn, Context, Engine, Error};

async fn events(ctx: Context) -> Result<(), Error> {
    let (mut sender, receiver) = sse_channel(16);
    let cancel = ctx.cancellation();

    tokio::spawn(async move {
        let mut tick = 0u64;
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(Duration::from_secs(1)) => {
                    tick += 1;
                    let event = Event::new(format!("tick {tick}"))
                        .id(tick.to_string())
                        .event("clock");
                    if sender.send(event).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    ctx.sse_stream(receiver);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt().init();

    let mut engine = Engine::new().address(":8080");
    engine.get("/events", handler_fn(events));
    engine.get(
        "/",
        handler_fn(|ctx: Context| async move {
            ctx.html_body(
                StatusCode::OK,
                r#"<script>
                  const source = new EventSource("/events");
                  source.onmessage = (e) => document.body.append(e.data + "\n");
                </script>"#,
            );
            Ok(())
        }),
    );

    engine.bind()?.serve().await
}
