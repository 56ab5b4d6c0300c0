//! Middleware ordering and CORS through the full dispatch path.

use bytes::Bytes;
use http::{Method, Request, StatusCode};
use std::sync::{Arc, Mutex};
use trellis_web::cors::Cors;
use trellis_web::middleware::{from_fn, ArcMiddleware, Next};
use trellis_web::{handler_fn, Context, Engine};

fn recorder(log: Arc<Mutex<Vec<String>>>, tag: &'static str) -> ArcMiddleware {
    Arc::new(from_fn(move |ctx: Context, next: Next| {
        let log = log.clone();
        async move {
            log.lock().unwrap().push(format!("enter {tag}"));
            let result = next.run(ctx).await;
            log.lock().unwrap().push(format!("exit {tag}"));
            result
        }
    }))
}

/// Engine middleware runs before group middleware runs before route
/// middleware; exits unwind in reverse.
#[tokio::test]
async fn chain_order_engine_group_route() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut engine = Engine::new();
    engine.wrap_arc(recorder(log.clone(), "engine"));

    let mut api = engine.group("/api");
    api.wrap_arc(recorder(log.clone(), "group"));
    let handler_log = log.clone();
    api.get(
        "/ping",
        handler_fn(move |ctx: Context| {
            let handler_log = handler_log.clone();
            async move {
                handler_log.lock().unwrap().push("handler".to_string());
                ctx.text(StatusCode::OK, "pong");
                Ok(())
            }
        }),
    )
    .with(recorder(log.clone(), "route"));
    drop(api);

    let app = engine.bind().unwrap();
    let response = app
        .dispatch(Request::builder().uri("/api/ping").body(Bytes::new()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "enter engine",
            "enter group",
            "enter route",
            "handler",
            "exit route",
            "exit group",
            "exit engine"
        ]
    );
}

/// Group middleware copies by value: a middleware added to the parent after
/// a subgroup was created does not reach the subgroup's routes.
#[tokio::test]
async fn later_parent_middleware_does_not_reach_existing_children() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut engine = Engine::new();

    let mut parent = engine.group("/parent");
    parent.wrap_arc(recorder(log.clone(), "early"));
    {
        let mut child = parent.group("/child");
        child.get(
            "/route",
            handler_fn(|ctx: Context| async move {
                ctx.text(StatusCode::OK, "ok");
                Ok(())
            }),
        );
    }
    parent.wrap_arc(recorder(log.clone(), "late"));
    parent.get(
        "/route",
        handler_fn(|ctx: Context| async move {
            ctx.text(StatusCode::OK, "ok");
            Ok(())
        }),
    );
    drop(parent);
    let app = engine.bind().unwrap();

    let _ = app
        .dispatch(Request::builder().uri("/parent/child/route").body(Bytes::new()).unwrap())
        .await;
    assert_eq!(*log.lock().unwrap(), vec!["enter early", "exit early"]);

    log.lock().unwrap().clear();
    let _ = app
        .dispatch(Request::builder().uri("/parent/route").body(Bytes::new()).unwrap())
        .await;
    assert_eq!(
        *log.lock().unwrap(),
        vec!["enter early", "enter late", "exit late", "exit early"]
    );
}

#[tokio::test]
async fn cors_preflight_through_the_app() {
    let mut engine = Engine::new().cors(
        Cors::new()
            .allow_origins(&["https://app.example"])
            .max_age(600),
    );
    engine.get(
        "/books",
        handler_fn(|ctx: Context| async move {
            ctx.text(StatusCode::OK, "list");
            Ok(())
        }),
    );
    engine.post(
        "/books",
        handler_fn(|ctx: Context| async move {
            ctx.text(StatusCode::CREATED, "created");
            Ok(())
        }),
    );
    let app = engine.bind().unwrap();

    // preflight: 204 via the CORS middleware on the auto-registered OPTIONS route
    let preflight = Request::builder()
        .method(Method::OPTIONS)
        .uri("/books")
        .header("origin", "https://app.example")
        .header("access-control-request-method", "POST")
        .header("access-control-request-headers", "content-type")
        .body(Bytes::new())
        .unwrap();
    let response = app.dispatch(preflight).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(
        response.headers().get("access-control-allow-origin").unwrap(),
        "https://app.example"
    );
    assert_eq!(
        response.headers().get("access-control-allow-headers").unwrap(),
        "content-type"
    );
    assert_eq!(response.headers().get("access-control-max-age").unwrap(), "600");

    let vary: Vec<_> = response
        .headers()
        .get_all("vary")
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect();
    assert!(vary.contains(&"Origin".to_string()));
    assert!(vary.contains(&"Access-Control-Request-Method".to_string()));
    assert!(vary.contains(&"Access-Control-Request-Headers".to_string()));

    // simple request still carries the origin echo
    let simple = Request::builder()
        .method(Method::GET)
        .uri("/books")
        .header("origin", "https://app.example")
        .body(Bytes::new())
        .unwrap();
    let response = app.dispatch(simple).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("access-control-allow-origin").unwrap(),
        "https://app.example"
    );

    // plain OPTIONS (no preflight headers) reaches the auto handler
    let options = Request::builder()
        .method(Method::OPTIONS)
        .uri("/books")
        .body(Bytes::new())
        .unwrap();
    let response = app.dispatch(options).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let allow = response.headers().get("allow").unwrap().to_str().unwrap();
    assert!(allow.contains("GET"));
    assert!(allow.contains("POST"));
    assert!(allow.contains("OPTIONS"));
}

#[tokio::test]
async fn middleware_short_circuit_skips_the_handler() {
    let mut engine = Engine::new();
    engine.wrap(from_fn(|ctx: Context, next: Next| async move {
        if ctx.header("x-allowed").is_none() {
            ctx.abort_with_error(StatusCode::FORBIDDEN, "blocked by policy");
            return Ok(());
        }
        next.run(ctx).await
    }));
    engine.get(
        "/guarded",
        handler_fn(|ctx: Context| async move {
            ctx.text(StatusCode::OK, "through");
            Ok(())
        }),
    );
    let app = engine.bind().unwrap();

    let blocked = app
        .dispatch(Request::builder().uri("/guarded").body(Bytes::new()).unwrap())
        .await;
    assert_eq!(blocked.status(), StatusCode::FORBIDDEN);

    let allowed = app
        .dispatch(
            Request::builder()
                .uri("/guarded")
                .header("x-allowed", "1")
                .body(Bytes::new())
                .unwrap(),
        )
        .await;
    assert_eq!(allowed.status(), StatusCode::OK);
}
