//! Response builders: negotiation, shape-directed respond, SSE, redirects.

use bytes::Bytes;
use futures::StreamExt;
use http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde::Serialize;
use std::time::Duration;
use trellis_web::sse::{sse_channel, Event};
use trellis_web::{handler_fn, Context, Engine, Respond};

async fn body_text(response: http::Response<trellis_web::ResponseBody>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[derive(Debug, Serialize, Respond)]
struct CreatedUser {
    #[respond(status)]
    status: u16,
    #[respond(header = "X-Request-Id")]
    request_id: String,
    #[respond(cookie = "session")]
    session: String,
    #[respond(body)]
    body: UserBody,
}

#[derive(Debug, Serialize)]
struct UserBody {
    name: String,
    role: String,
}

fn respond_app() -> trellis_web::App {
    let mut engine = Engine::new();
    engine.post(
        "/users",
        handler_fn(|ctx: Context| async move {
            ctx.respond(&CreatedUser {
                status: 201,
                request_id: "req-7".into(),
                session: "s-99".into(),
                body: UserBody { name: "ada".into(), role: "admin".into() },
            })
        }),
    );
    engine.bind().unwrap()
}

fn post_users(accept: Option<&str>) -> Request<Bytes> {
    let mut builder = Request::builder().method(http::Method::POST).uri("/users");
    if let Some(accept) = accept {
        builder = builder.header("accept", accept);
    }
    builder.body(Bytes::new()).unwrap()
}

#[tokio::test]
async fn respond_maps_fields_to_status_headers_and_cookies() {
    let app = respond_app();
    let response = app.dispatch(post_users(None)).await;

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(response.headers().get("x-request-id").unwrap(), "req-7");
    let cookie = response.headers().get("set-cookie").unwrap().to_str().unwrap();
    assert!(cookie.starts_with("session=s-99"));

    let content_type = response.headers().get("content-type").unwrap().to_str().unwrap().to_string();
    assert!(content_type.starts_with("application/json"));
    let text = body_text(response).await;
    assert!(text.contains("\"ada\""));
}

#[tokio::test]
async fn respond_negotiates_xml_yaml_and_text() {
    let app = respond_app();

    let response = app.dispatch(post_users(Some("application/xml"))).await;
    let content_type = response.headers().get("content-type").unwrap().to_str().unwrap().to_string();
    assert!(content_type.starts_with("application/xml"));
    let text = body_text(response).await;
    assert!(text.contains("<name>ada</name>"), "xml body: {text}");

    let response = app.dispatch(post_users(Some("application/yaml"))).await;
    let text = body_text(response).await;
    assert!(text.contains("name: ada"), "yaml body: {text}");

    let response = app.dispatch(post_users(Some("text/plain"))).await;
    let content_type = response.headers().get("content-type").unwrap().to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/plain"));
}

#[tokio::test]
async fn sse_stream_emits_framed_events() {
    let mut engine = Engine::new();
    engine.get(
        "/events",
        handler_fn(|ctx: Context| async move {
            let (mut sender, receiver) = sse_channel(8);
            tokio::spawn(async move {
                sender.send(Event::new("first").id("1")).await.ok();
                sender
                    .send(Event::new("line one\nline two").id("2").event("multi"))
                    .await
                    .ok();
                sender.close().await.ok();
            });
            ctx.sse_stream(receiver);
            Ok(())
        }),
    );
    let app = engine.bind().unwrap();

    let response = app
        .dispatch(Request::builder().uri("/events").body(Bytes::new()).unwrap())
        .await;
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "text/event-stream"
    );

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("id: 1\ndata: first\n\n"));
    assert!(text.contains("id: 2\nevent: multi\ndata: line one\ndata: line two\n\n"));
}

#[tokio::test]
async fn sse_stream_stops_on_cancellation() {
    let mut engine = Engine::new();
    engine.get(
        "/events",
        handler_fn(|ctx: Context| async move {
            // a source that never closes on its own
            let events = futures::stream::unfold(0u64, |n| async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Some((Event::new(format!("tick {n}")).id(n.to_string()), n + 1))
            });
            ctx.sse_stream(events.boxed());
            Ok(())
        }),
    );
    let app = engine.bind().unwrap();

    let token = tokio_util::sync::CancellationToken::new();
    let mut request = Request::builder().uri("/events").body(Bytes::new()).unwrap();
    request.extensions_mut().insert(token.clone());

    let response = app.dispatch(request).await;
    let mut body = response.into_body();

    // a first frame arrives, then cancellation ends the stream
    let first = body.frame().await.expect("first frame").unwrap();
    assert!(first.into_data().is_ok());
    token.cancel();

    let drained = tokio::time::timeout(Duration::from_secs(1), async {
        while let Some(frame) = body.frame().await {
            if frame.is_err() {
                break;
            }
        }
    })
    .await;
    assert!(drained.is_ok(), "stream must terminate after cancellation");
}

#[tokio::test]
async fn serve_file_infers_the_content_type() {
    let path = std::env::temp_dir().join("trellis-serve-file-test.json");
    std::fs::write(&path, br#"{"served": true}"#).unwrap();

    let file = path.clone();
    let mut engine = Engine::new();
    engine.get(
        "/download",
        handler_fn(move |ctx: Context| {
            let file = file.clone();
            async move { ctx.serve_file(&file).await }
        }),
    );
    let app = engine.bind().unwrap();

    let response = app
        .dispatch(Request::builder().uri("/download").body(Bytes::new()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("content-type").unwrap(), "application/json");
    assert_eq!(body_text(response).await, r#"{"served": true}"#);

    std::fs::remove_file(&path).ok();
}

#[tokio::test]
async fn serving_a_missing_file_is_404() {
    let mut engine = Engine::new();
    engine.get(
        "/download",
        handler_fn(|ctx: Context| async move {
            ctx.serve_file("/definitely/not/here.txt").await
        }),
    );
    let app = engine.bind().unwrap();

    let response = app
        .dispatch(Request::builder().uri("/download").body(Bytes::new()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn redirect_sets_location() {
    let mut engine = Engine::new();
    engine.get(
        "/old",
        handler_fn(|ctx: Context| async move {
            ctx.redirect(StatusCode::TEMPORARY_REDIRECT, "/new")
        }),
    );
    let app = engine.bind().unwrap();

    let response = app
        .dispatch(Request::builder().uri("/old").body(Bytes::new()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(response.headers().get("location").unwrap(), "/new");
}

#[tokio::test]
async fn html_view_renders_inline_templates() {
    let mut engine = Engine::new();
    engine.get(
        "/page",
        handler_fn(|ctx: Context| async move {
            ctx.html_view(
                StatusCode::OK,
                "<h1>{{ title }}</h1>",
                &serde_json::json!({"title": "Trellis"}),
            )
        }),
    );
    let app = engine.bind().unwrap();

    let response = app
        .dispatch(Request::builder().uri("/page").body(Bytes::new()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "<h1>Trellis</h1>");
}

#[tokio::test]
async fn configured_renderer_backs_render_calls() {
    struct UpperRenderer;

    impl trellis_web::Renderer for UpperRenderer {
        fn render(
            &self,
            name: &str,
            data: &serde_json::Value,
            _ctx: &Context,
        ) -> Result<String, trellis_web::Error> {
            let title = data["title"].as_str().unwrap_or("");
            Ok(format!("<{}>{}</{}>", name, title.to_uppercase(), name))
        }
    }

    let mut engine = Engine::new().renderer(UpperRenderer);
    engine.get(
        "/page",
        handler_fn(|ctx: Context| async move {
            ctx.render(StatusCode::OK, "title", &serde_json::json!({"title": "hi"}))
        }),
    );
    let app = engine.bind().unwrap();

    let response = app
        .dispatch(Request::builder().uri("/page").body(Bytes::new()).unwrap())
        .await;
    assert_eq!(body_text(response).await, "<title>HI</title>");
}

#[tokio::test]
async fn sse_event_writes_a_buffered_frame() {
    let mut engine = Engine::new();
    engine.get(
        "/one-shot",
        handler_fn(|ctx: Context| async move {
            ctx.sse_event(Event::new("done").id("final"))?;
            Ok(())
        }),
    );
    let app = engine.bind().unwrap();

    let response = app
        .dispatch(Request::builder().uri("/one-shot").body(Bytes::new()).unwrap())
        .await;
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "text/event-stream"
    );
    assert_eq!(body_text(response).await, "id: final\ndata: done\n\n");
}

#[tokio::test]
async fn render_without_renderer_is_500() {
    let mut engine = Engine::new();
    engine.get(
        "/page",
        handler_fn(|ctx: Context| async move {
            ctx.render(StatusCode::OK, "index.html", &serde_json::json!({}))
        }),
    );
    let app = engine.bind().unwrap();

    let response = app
        .dispatch(Request::builder().uri("/page").body(Bytes::new()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body_text(response).await.contains("no renderer"));
}
