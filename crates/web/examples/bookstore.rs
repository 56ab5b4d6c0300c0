//! A small bookstore API showing routing, binding, auth and OpenAPI.
//!
//! ```bash
//! cargo run --example bookstore
//! curl http://127.0.0.1:8080/books
//! curl -X POST -H 'content-type: application/json' \
//!   -u admin:password -d '{"title":"Dune","year":1965}' \
//!   http://127.0.0.1:8080/admin/books
//! open http://127.0.0.1:8080/docs/
//! ```

use http::StatusCode;
use serde::{Deserialize, Serialize};
use trellis_web::auth::BasicAuth;
use trellis_web::middleware::RequestLogger;
use trellis_web::{handler_fn, ApiType, Context, Cors, Engine, Error, OpenApi, Payload};

#[derive(Debug, Deserialize, Serialize, Payload, ApiType)]
struct BookInput {
    #[payload(body, required, min_length = 1)]
    title: String,
    #[payload(body, required, min = 0)]
    year: i64,
}

#[derive(Debug, Deserialize, Serialize, Payload, ApiType)]
struct ListQuery {
    #[payload(query, default = "1", min = 1)]
    page: i64,
    #[payload(query)]
    tags: Vec<String>,
}

async fn list_books(ctx: Context) -> Result<(), Error> {
    let query: ListQuery = ctx.bind().await?;
    ctx.json(
        StatusCode::OK,
        &serde_json::json!({
            "page": query.page,
            "tags": query.tags,
            "books": [{"title": "Dune", "year": 1965}],
        }),
    )
}

async fn create_book(ctx: Context) -> Result<(), Error> {
    let book: BookInput = ctx.bind().await?;
    ctx.json(StatusCode::CREATED, &book)
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt().init();

    let mut engine = Engine::new()
        .address(":8080")
        .cors(Cors::new().allow_origins(&["*"]))
        .openapi(OpenApi::new("Bookstore", "1.0.0").description("books over HTTP"));

    engine.wrap(RequestLogger);

    engine
        .get("/books", handler_fn(list_books))
        .request::<ListQuery>()
        .summary("List books");

    let mut admin = engine.group("/admin");
    admin.wrap(BasicAuth::new("admin", "password").realm("admin"));
    admin
        .post("/books", handler_fn(create_book))
        .request::<BookInput>()
        .response::<BookInput>(201)
        .summary("Create a book");
    drop(admin);

    engine.bind()?.serve().await
}
