//! `#[derive(Respond)]` expansion.

use proc_macro2::TokenStream;
use quote::quote;
use syn::{DeriveInput, LitStr};

use crate::named_fields;

pub(crate) fn expand(input: &DeriveInput) -> Result<TokenStream, syn::Error> {
    let name = &input.ident;
    let fields = named_fields(input)?;

    let mut status_field: Option<String> = None;
    let mut body_field: Option<String> = None;
    let mut header_fields: Vec<(String, String)> = Vec::new();
    let mut cookie_fields: Vec<(String, String)> = Vec::new();

    for field in fields {
        let ident = field.ident.as_ref().expect("named field");
        let field_name = ident.to_string();
        let mut tagged = false;

        for attr in &field.attrs {
            if !attr.path().is_ident("respond") {
                continue;
            }
            attr.parse_nested_meta(|meta| {
                let Some(ident) = meta.path.get_ident().map(ToString::to_string) else {
                    return Err(meta.error("unsupported respond attribute"));
                };
                match ident.as_str() {
                    "status" => {
                        status_field = Some(field_name.clone());
                        tagged = true;
                    }
                    "body" => {
                        body_field = Some(field_name.clone());
                        tagged = true;
                    }
                    "header" => {
                        let header = meta.value()?.parse::<LitStr>()?.value();
                        header_fields.push((field_name.clone(), header));
                        tagged = true;
                    }
                    "cookie" => {
                        let cookie = meta.value()?.parse::<LitStr>()?.value();
                        cookie_fields.push((field_name.clone(), cookie));
                        tagged = true;
                    }
                    other => return Err(meta.error(format!("unknown respond attribute {other:?}"))),
                }
                Ok(())
            })?;
        }

        // untagged conventions: `status` and `body` take their roles by name
        if !tagged {
            match field_name.as_str() {
                "status" => status_field = status_field.take().or_else(|| Some(field_name.clone())),
                "body" => body_field = body_field.take().or_else(|| Some(field_name.clone())),
                _ => {}
            }
        }
    }

    let status_tokens = option_str(&status_field);
    let body_tokens = option_str(&body_field);
    let headers: Vec<TokenStream> = header_fields
        .iter()
        .map(|(field, header)| quote! { (#field, #header) })
        .collect();
    let cookies: Vec<TokenStream> = cookie_fields
        .iter()
        .map(|(field, cookie)| quote! { (#field, #cookie) })
        .collect();

    Ok(quote! {
        impl ::trellis_web::respond::Respond for #name {
            fn respond_spec() -> &'static ::trellis_web::respond::RespondSpec {
                static SPEC: ::trellis_web::respond::RespondSpec =
                    ::trellis_web::respond::RespondSpec {
                        status_field: #status_tokens,
                        body_field: #body_tokens,
                        header_fields: &[ #( #headers ),* ],
                        cookie_fields: &[ #( #cookies ),* ],
                    };
                &SPEC
            }
        }
    })
}

fn option_str(value: &Option<String>) -> TokenStream {
    match value {
        Some(text) => quote! { ::core::option::Option::Some(#text) },
        None => quote! { ::core::option::Option::None },
    }
}
