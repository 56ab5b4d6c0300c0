//! `#[derive(ApiType)]` expansion.

use proc_macro2::TokenStream;
use quote::quote;
use syn::{DeriveInput, LitStr};

use crate::{named_fields, option_inner};

pub(crate) fn expand(input: &DeriveInput) -> Result<TokenStream, syn::Error> {
    let name = &input.ident;
    let title = name.to_string();
    let fields = named_fields(input)?;

    let mut properties = Vec::new();
    for field in fields {
        let ident = field.ident.as_ref().expect("named field");
        let mut property_name = ident.to_string();
        let mut description: Option<String> = None;
        let mut skip = false;

        for attr in &field.attrs {
            if !attr.path().is_ident("api") {
                continue;
            }
            attr.parse_nested_meta(|meta| {
                let Some(ident) = meta.path.get_ident().map(ToString::to_string) else {
                    return Err(meta.error("unsupported api attribute"));
                };
                match ident.as_str() {
                    "skip" => skip = true,
                    "rename" => property_name = meta.value()?.parse::<LitStr>()?.value(),
                    "description" | "doc" => {
                        description = Some(meta.value()?.parse::<LitStr>()?.value());
                    }
                    other => return Err(meta.error(format!("unknown api attribute {other:?}"))),
                }
                Ok(())
            })?;
        }

        if skip {
            continue;
        }

        let (ty, optional) = match option_inner(&field.ty) {
            Some(inner) => (inner, true),
            None => (&field.ty, false),
        };

        let description_tokens = match &description {
            Some(text) => quote! { ::core::option::Option::Some(::std::string::String::from(#text)) },
            None => quote! { ::core::option::Option::None },
        };

        properties.push(quote! {
            schema.push_property(::trellis_web::openapi::Property {
                name: ::std::string::String::from(#property_name),
                schema: <#ty as ::trellis_web::openapi::ApiType>::schema(),
                optional: #optional,
                description: #description_tokens,
            });
        });
    }

    Ok(quote! {
        impl ::trellis_web::openapi::ApiType for #name {
            fn schema() -> ::trellis_web::openapi::Schema {
                let mut schema = ::trellis_web::openapi::Schema::object(#title);
                #( #properties )*
                schema
            }
        }
    })
}
