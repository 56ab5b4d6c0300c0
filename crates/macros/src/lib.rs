//! Derive macros for `trellis-web`.
//!
//! - `#[derive(Payload)]`: binding descriptor (`#[payload(...)]` field
//!   attributes for source, defaults and validation rules)
//! - `#[derive(ApiType)]`: OpenAPI schema derivation (`#[api(...)]`)
//! - `#[derive(Respond)]`: response shape roles (`#[respond(...)]`)

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use syn::{parse_macro_input, Data, DeriveInput, Fields, GenericArgument, PathArguments, Type};

mod payload;
mod respond;
mod schema;

/// What a field's Rust type means for coercion and schema derivation.
enum TypeClass {
    Str,
    Int,
    UInt,
    Float,
    Bool,
    List(Box<TypeClass>),
    Other,
}

fn classify(ty: &Type) -> TypeClass {
    let Type::Path(type_path) = ty else {
        return TypeClass::Other;
    };
    let Some(segment) = type_path.path.segments.last() else {
        return TypeClass::Other;
    };
    match segment.ident.to_string().as_str() {
        "String" => TypeClass::Str,
        "i8" | "i16" | "i32" | "i64" | "isize" => TypeClass::Int,
        "u8" | "u16" | "u32" | "u64" | "usize" => TypeClass::UInt,
        "f32" | "f64" => TypeClass::Float,
        "bool" => TypeClass::Bool,
        "Vec" => match generic_argument(segment) {
            Some(inner) => TypeClass::List(Box::new(classify(inner))),
            None => TypeClass::Other,
        },
        _ => TypeClass::Other,
    }
}

/// `Option<T>` detection; returns the inner type.
fn option_inner(ty: &Type) -> Option<&Type> {
    let Type::Path(type_path) = ty else { return None };
    let segment = type_path.path.segments.last()?;
    if segment.ident != "Option" {
        return None;
    }
    generic_argument(segment)
}

fn generic_argument(segment: &syn::PathSegment) -> Option<&Type> {
    let PathArguments::AngleBracketed(arguments) = &segment.arguments else {
        return None;
    };
    arguments.args.iter().find_map(|argument| match argument {
        GenericArgument::Type(ty) => Some(ty),
        _ => None,
    })
}

fn named_fields(input: &DeriveInput) -> Result<Vec<&syn::Field>, syn::Error> {
    match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => Ok(fields.named.iter().collect()),
            _ => Err(syn::Error::new_spanned(
                &input.ident,
                "only structs with named fields are supported",
            )),
        },
        _ => Err(syn::Error::new_spanned(&input.ident, "only structs are supported")),
    }
}

fn into_token_stream(result: Result<TokenStream2, syn::Error>) -> TokenStream {
    match result {
        Ok(tokens) => tokens.into(),
        Err(error) => error.to_compile_error().into(),
    }
}

/// Derive `trellis_web::bind::Payload`: a binding descriptor driving
/// `ctx.bind::<T>()`.
///
/// ```ignore
/// #[derive(serde::Deserialize, Payload)]
/// struct Search {
///     #[payload(query, required, min_length = 1)]
///     q: String,
///     #[payload(query)]
///     tags: Vec<String>,
///     #[payload(header = "X-Trace-Id")]
///     trace: Option<String>,
///     #[payload(query, default = "1", min = 1)]
///     page: i64,
/// }
/// ```
#[proc_macro_derive(Payload, attributes(payload))]
pub fn derive_payload(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    into_token_stream(payload::expand(&input))
}

/// Derive `trellis_web::openapi::ApiType`: an OpenAPI schema for the struct.
///
/// `#[api(description = "...")]`, `#[api(rename = "...")]` and
/// `#[api(skip)]` are honored per field; `Option<T>` fields are optional.
#[proc_macro_derive(ApiType, attributes(api))]
pub fn derive_api_type(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    into_token_stream(schema::expand(&input))
}

/// Derive `trellis_web::respond::Respond`: field roles for
/// `ctx.respond(&value)`.
///
/// Fields named `status` and `body` take those roles by default;
/// `#[respond(header = "X-Name")]` and `#[respond(cookie = "name")]` mark
/// header and cookie fields.
#[proc_macro_derive(Respond, attributes(respond))]
pub fn derive_respond(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    into_token_stream(respond::expand(&input))
}
