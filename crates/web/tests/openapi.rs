//! OpenAPI generation: served spec, schema dedup, parameter inference.

use bytes::Bytes;
use http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use trellis_web::{handler_fn, ApiType, App, Context, Engine, OpenApi, Payload};

async fn body_json(response: http::Response<trellis_web::ResponseBody>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[derive(Debug, Deserialize, Serialize, Payload, ApiType)]
struct Book {
    #[payload(body, required, min_length = 1)]
    title: String,
    #[payload(body, required)]
    year: i64,
    #[payload(body)]
    isbn: Option<String>,
}

fn save_book() -> impl trellis_web::Handler {
    handler_fn(|ctx: Context| async move {
        let book: Book = ctx.bind().await?;
        ctx.json(StatusCode::CREATED, &book)
    })
}

fn documented_app() -> App {
    let mut engine = Engine::new().openapi(
        OpenApi::new("Bookstore", "1.2.3").description("books and shelves").server("https://api.example"),
    );

    engine
        .post("/books", save_book())
        .request::<Book>()
        .response::<Book>(201)
        .summary("Create a book");
    engine
        .post("/shelf/books", save_book())
        .request::<Book>()
        .response::<Book>(201);
    engine
        .get("/books/{id}", handler_fn(|ctx: Context| async move {
            ctx.text(StatusCode::OK, "one");
            Ok(())
        }))
        .response::<Book>(200)
        .security("BearerAuth", &[]);

    engine.bind().unwrap()
}

async fn fetch_spec(app: &App) -> Value {
    let response = app
        .dispatch(Request::builder().uri("/openapi.json").body(Bytes::new()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await
}

#[tokio::test]
async fn serves_the_document_with_info_and_servers() {
    let app = documented_app();
    let spec = fetch_spec(&app).await;

    assert_eq!(spec["openapi"], "3.0.3");
    assert_eq!(spec["info"]["title"], "Bookstore");
    assert_eq!(spec["info"]["version"], "1.2.3");
    assert_eq!(spec["servers"][0]["url"], "https://api.example");
}

#[tokio::test]
async fn structurally_identical_request_bodies_share_one_component() {
    let app = documented_app();
    let spec = fetch_spec(&app).await;

    let schemas = spec["components"]["schemas"].as_object().unwrap();
    let books: Vec<&String> = schemas.keys().filter(|k| k.starts_with("Book")).collect();
    assert_eq!(books.len(), 1, "exactly one Book component, got {books:?}");

    for path in ["/books", "/shelf/books"] {
        let reference =
            &spec["paths"][path]["post"]["requestBody"]["content"]["application/json"]["schema"]["$ref"];
        assert_eq!(reference, "#/components/schemas/Book", "{path}");
    }
}

#[tokio::test]
async fn component_carries_required_and_optional_properties() {
    let app = documented_app();
    let spec = fetch_spec(&app).await;

    let book = &spec["components"]["schemas"]["Book"];
    let required: Vec<&str> = book["required"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert!(required.contains(&"title"));
    assert!(required.contains(&"year"));
    assert!(!required.contains(&"isbn"));
    assert_eq!(book["properties"]["isbn"]["nullable"], true);
}

#[tokio::test]
async fn path_params_are_inferred() {
    let app = documented_app();
    let spec = fetch_spec(&app).await;

    let parameters = spec["paths"]["/books/{id}"]["get"]["parameters"].as_array().unwrap();
    let id = parameters.iter().find(|p| p["name"] == "id").unwrap();
    assert_eq!(id["in"], "path");
    assert_eq!(id["required"], true);
    assert_eq!(id["schema"]["format"], "uuid");
}

#[tokio::test]
async fn bearer_scheme_is_synthesized_when_routes_need_it() {
    let app = documented_app();
    let spec = fetch_spec(&app).await;

    let scheme = &spec["components"]["securitySchemes"]["BearerAuth"];
    assert_eq!(scheme["type"], "http");
    assert_eq!(scheme["scheme"], "bearer");
    assert_eq!(scheme["bearerFormat"], "JWT");

    let security = spec["paths"]["/books/{id}"]["get"]["security"].as_array().unwrap();
    assert_eq!(security[0]["BearerAuth"], serde_json::json!([]));
}

#[tokio::test]
async fn hidden_and_disabled_routes_stay_out_of_the_document() {
    let mut engine = Engine::new().openapi(OpenApi::new("API", "1.0.0"));
    engine.get("/visible", handler_fn(|ctx: Context| async move {
        ctx.text(StatusCode::OK, "ok");
        Ok(())
    }));
    engine
        .get("/secret", handler_fn(|ctx: Context| async move {
            ctx.text(StatusCode::OK, "ok");
            Ok(())
        }))
        .hidden();
    engine
        .get("/off", handler_fn(|ctx: Context| async move {
            ctx.text(StatusCode::OK, "ok");
            Ok(())
        }))
        .disable();
    let app = engine.bind().unwrap();

    let spec = fetch_spec(&app).await;
    let paths = spec["paths"].as_object().unwrap();
    assert!(paths.contains_key("/visible"));
    assert!(!paths.contains_key("/secret"));
    assert!(!paths.contains_key("/off"));
    // the spec route itself is hidden too
    assert!(!paths.contains_key("/openapi.json"));
}

#[tokio::test]
async fn query_parameters_come_from_the_binding() {
    #[derive(Debug, Deserialize, Payload, ApiType)]
    struct Filter {
        #[payload(query, required)]
        q: String,
        #[payload(query, format = "email")]
        contact: Option<String>,
    }

    let mut engine = Engine::new().openapi(OpenApi::new("API", "1.0.0"));
    engine
        .get("/find", handler_fn(|ctx: Context| async move {
            let filter: Filter = ctx.bind().await?;
            ctx.json(StatusCode::OK, &serde_json::json!({"q": filter.q}))
        }))
        .request::<Filter>();
    let app = engine.bind().unwrap();

    let spec = fetch_spec(&app).await;
    let parameters = spec["paths"]["/find"]["get"]["parameters"].as_array().unwrap();

    let q = parameters.iter().find(|p| p["name"] == "q").unwrap();
    assert_eq!(q["in"], "query");
    assert_eq!(q["required"], true);

    let contact = parameters.iter().find(|p| p["name"] == "contact").unwrap();
    assert_eq!(contact["required"], false);
    assert_eq!(contact["schema"]["format"], "email");
}

#[tokio::test]
async fn group_tags_and_security_reach_the_operations() {
    let mut engine = Engine::new().openapi(OpenApi::new("API", "1.0.0"));
    {
        let mut admin = engine.group("/admin");
        admin.tag("admin").security("BearerAuth", &["admin:write"]);
        admin.post("/books", save_book());
    }
    let app = engine.bind().unwrap();
    let spec = fetch_spec(&app).await;

    let operation = &spec["paths"]["/admin/books"]["post"];
    assert_eq!(operation["tags"], serde_json::json!(["admin"]));
    assert_eq!(
        operation["security"][0]["BearerAuth"],
        serde_json::json!(["admin:write"])
    );
    // nothing supplied, so the bearer scheme is synthesized
    assert_eq!(spec["components"]["securitySchemes"]["BearerAuth"]["scheme"], "bearer");
}

#[tokio::test]
async fn any_routes_document_the_common_verbs() {
    let mut engine = Engine::new().openapi(OpenApi::new("API", "1.0.0"));
    engine.any("/mirror", handler_fn(|ctx: Context| async move {
        ctx.text(StatusCode::OK, "ok");
        Ok(())
    }));
    let app = engine.bind().unwrap();
    let spec = fetch_spec(&app).await;

    let path = spec["paths"]["/mirror"].as_object().unwrap();
    for verb in ["get", "post", "put", "delete", "patch"] {
        assert!(path.contains_key(verb), "{verb}");
    }
}

#[tokio::test]
async fn docs_prefix_redirects_and_serves_the_shell() {
    let app = documented_app();

    let response = app
        .dispatch(Request::builder().uri("/docs").body(Bytes::new()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
    assert_eq!(response.headers().get("location").unwrap(), "/docs/");

    let response = app
        .dispatch(Request::builder().uri("/docs/").body(Bytes::new()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let html = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(html.contains("/openapi.json"));
}

#[tokio::test]
async fn frozen_document_is_reachable_from_the_app_handle() {
    let app = documented_app();
    let document = app.openapi_document().expect("document built at bind time");
    assert_eq!(document["info"]["title"], "Bookstore");

    let _ = app.dispatch(Request::builder().uri("/books").method(Method::POST).body(Bytes::new()).unwrap()).await;
    // the snapshot does not change after serving starts
    assert_eq!(app.openapi_document().unwrap()["info"]["title"], "Bookstore");
}
