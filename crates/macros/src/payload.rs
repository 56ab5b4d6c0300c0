//! `#[derive(Payload)]` expansion.

use proc_macro2::TokenStream;
use quote::quote;
use syn::{DeriveInput, LitStr};

use crate::{classify, named_fields, option_inner, TypeClass};

#[derive(Default, Clone, Copy, PartialEq)]
enum SourceAttr {
    #[default]
    Unset,
    Path,
    Query,
    Header,
    Cookie,
    Form,
    Body,
}

#[derive(Default)]
struct FieldAttrs {
    source: SourceAttr,
    key: Option<String>,
    default: Option<String>,
    nested: bool,

    required: bool,
    min: Option<i64>,
    max: Option<i64>,
    min_length: Option<usize>,
    max_length: Option<usize>,
    multiple_of: Option<f64>,
    min_items: Option<usize>,
    max_items: Option<usize>,
    unique_items: bool,
    pattern: Option<String>,
    format: Option<String>,
    enumeration: Option<Vec<String>>,
}

pub(crate) fn expand(input: &DeriveInput) -> Result<TokenStream, syn::Error> {
    let name = &input.ident;
    let fields = named_fields(input)?;

    let mut specs = Vec::new();
    for field in fields {
        let ident = field.ident.as_ref().expect("named field");
        let field_name = ident.to_string();
        let attrs = parse_attrs(field)?;

        // Option<T> marks optionality; the descriptor works on the inner type
        let (ty, _optional) = match option_inner(&field.ty) {
            Some(inner) => (inner, true),
            None => (&field.ty, false),
        };

        let source = source_tokens(&attrs, &field_name);
        let kind = kind_tokens(field, ty, &attrs)?;
        let key = match &attrs.key {
            Some(key) => quote! { #key },
            None => quote! { "" },
        };
        let default = match &attrs.default {
            Some(literal) => quote! { ::core::option::Option::Some(#literal) },
            None => quote! { ::core::option::Option::None },
        };
        let rules = rules_tokens(field, &attrs)?;

        specs.push(quote! {
            ::trellis_web::bind::FieldSpec {
                name: #field_name,
                key: #key,
                source: #source,
                kind: #kind,
                default: #default,
                rules: #rules,
            }
        });
    }

    Ok(quote! {
        impl ::trellis_web::bind::Payload for #name {
            fn binding() -> &'static ::trellis_web::bind::BindingSpec {
                static FIELDS: &[::trellis_web::bind::FieldSpec] = &[ #( #specs ),* ];
                static SPEC: ::trellis_web::bind::BindingSpec =
                    ::trellis_web::bind::BindingSpec::new(FIELDS);
                &SPEC
            }
        }
    })
}

fn parse_attrs(field: &syn::Field) -> Result<FieldAttrs, syn::Error> {
    let mut attrs = FieldAttrs::default();

    for attr in &field.attrs {
        if !attr.path().is_ident("payload") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            let Some(ident) = meta.path.get_ident().map(ToString::to_string) else {
                return Err(meta.error("unsupported payload attribute"));
            };
            match ident.as_str() {
                "path" | "param" => {
                    attrs.source = SourceAttr::Path;
                    attrs.key = optional_string(&meta)?;
                }
                "query" => {
                    attrs.source = SourceAttr::Query;
                    attrs.key = optional_string(&meta)?;
                }
                "header" => {
                    attrs.source = SourceAttr::Header;
                    attrs.key = optional_string(&meta)?;
                }
                "cookie" => {
                    attrs.source = SourceAttr::Cookie;
                    attrs.key = optional_string(&meta)?;
                }
                "form" => {
                    attrs.source = SourceAttr::Form;
                    attrs.key = optional_string(&meta)?;
                }
                "body" | "json" => attrs.source = SourceAttr::Body,
                "nested" => attrs.nested = true,
                "default" => attrs.default = Some(required_string(&meta)?),

                "required" => attrs.required = true,
                "min" => attrs.min = Some(required_int(&meta)?),
                "max" => attrs.max = Some(required_int(&meta)?),
                "min_length" => attrs.min_length = Some(required_int(&meta)? as usize),
                "max_length" => attrs.max_length = Some(required_int(&meta)? as usize),
                "multiple_of" => attrs.multiple_of = Some(required_float(&meta)?),
                "min_items" => attrs.min_items = Some(required_int(&meta)? as usize),
                "max_items" => attrs.max_items = Some(required_int(&meta)? as usize),
                "unique_items" => attrs.unique_items = true,
                "pattern" => attrs.pattern = Some(required_string(&meta)?),
                "format" => attrs.format = Some(required_string(&meta)?),
                "enumeration" => {
                    let list = required_string(&meta)?;
                    attrs.enumeration = Some(
                        list.split(',')
                            .map(str::trim)
                            .filter(|s| !s.is_empty())
                            .map(str::to_string)
                            .collect(),
                    );
                }
                other => return Err(meta.error(format!("unknown payload attribute {other:?}"))),
            }
            Ok(())
        })?;
    }

    Ok(attrs)
}

fn optional_string(meta: &syn::meta::ParseNestedMeta) -> Result<Option<String>, syn::Error> {
    if meta.input.peek(syn::Token![=]) {
        Ok(Some(meta.value()?.parse::<LitStr>()?.value()))
    } else {
        Ok(None)
    }
}

fn required_string(meta: &syn::meta::ParseNestedMeta) -> Result<String, syn::Error> {
    Ok(meta.value()?.parse::<LitStr>()?.value())
}

fn required_int(meta: &syn::meta::ParseNestedMeta) -> Result<i64, syn::Error> {
    let literal: syn::LitInt = meta.value()?.parse()?;
    literal.base10_parse()
}

fn required_float(meta: &syn::meta::ParseNestedMeta) -> Result<f64, syn::Error> {
    let literal: syn::Lit = meta.value()?.parse()?;
    match literal {
        syn::Lit::Float(float) => float.base10_parse(),
        syn::Lit::Int(int) => int.base10_parse::<i64>().map(|n| n as f64),
        other => Err(syn::Error::new_spanned(other, "expected a number")),
    }
}

fn source_tokens(attrs: &FieldAttrs, field_name: &str) -> TokenStream {
    let source = match attrs.source {
        SourceAttr::Path => "Path",
        SourceAttr::Query => "Query",
        SourceAttr::Header => "Header",
        SourceAttr::Cookie => "Cookie",
        SourceAttr::Form => "Form",
        SourceAttr::Body => "Body",
        // untagged: a field named `body` is the request body, everything
        // else reads from the query string
        SourceAttr::Unset if field_name.eq_ignore_ascii_case("body") => "Body",
        SourceAttr::Unset => "Query",
    };
    let ident = quote::format_ident!("{source}");
    quote! { ::trellis_web::bind::Source::#ident }
}

fn scalar_tokens(class: &TypeClass) -> Option<TokenStream> {
    let ident = match class {
        TypeClass::Str => "String",
        TypeClass::Int => "Int",
        TypeClass::UInt => "UInt",
        TypeClass::Float => "Float",
        TypeClass::Bool => "Bool",
        _ => return None,
    };
    let ident = quote::format_ident!("{ident}");
    Some(quote! { ::trellis_web::bind::ScalarKind::#ident })
}

fn kind_tokens(
    field: &syn::Field,
    ty: &syn::Type,
    attrs: &FieldAttrs,
) -> Result<TokenStream, syn::Error> {
    if attrs.nested {
        return Ok(quote! {
            ::trellis_web::bind::FieldKind::Nested(<#ty as ::trellis_web::bind::Payload>::binding)
        });
    }
    match classify(ty) {
        TypeClass::List(inner) => match scalar_tokens(&inner) {
            Some(scalar) => Ok(quote! { ::trellis_web::bind::FieldKind::List(#scalar) }),
            None => Ok(quote! { ::trellis_web::bind::FieldKind::Value }),
        },
        other => match scalar_tokens(&other) {
            Some(scalar) => Ok(quote! { ::trellis_web::bind::FieldKind::Scalar(#scalar) }),
            None if attrs.source == SourceAttr::Body || attrs.source == SourceAttr::Unset => {
                Ok(quote! { ::trellis_web::bind::FieldKind::Value })
            }
            None => Err(syn::Error::new_spanned(
                field,
                "non-scalar fields can only bind from the body",
            )),
        },
    }
}

fn rules_tokens(field: &syn::Field, attrs: &FieldAttrs) -> Result<TokenStream, syn::Error> {
    let required = attrs.required;
    let unique_items = attrs.unique_items;
    let min = option_tokens(attrs.min.map(|n| quote! { #n }));
    let max = option_tokens(attrs.max.map(|n| quote! { #n }));
    let min_length = option_tokens(attrs.min_length.map(|n| quote! { #n }));
    let max_length = option_tokens(attrs.max_length.map(|n| quote! { #n }));
    let multiple_of = option_tokens(attrs.multiple_of.map(|n| quote! { #n }));
    let min_items = option_tokens(attrs.min_items.map(|n| quote! { #n }));
    let max_items = option_tokens(attrs.max_items.map(|n| quote! { #n }));
    let pattern = option_tokens(attrs.pattern.as_ref().map(|p| quote! { #p }));

    let format = match &attrs.format {
        Some(name) => {
            let variant = match name.as_str() {
                "email" => "Email",
                "date-time" | "datetime" => "DateTime",
                "date" => "Date",
                "duration" => "Duration",
                "ipv4" => "Ipv4",
                "ipv6" => "Ipv6",
                "uuid" => "Uuid",
                "regex" => "Regex",
                other => {
                    return Err(syn::Error::new_spanned(
                        field,
                        format!("unknown format {other:?}"),
                    ))
                }
            };
            let variant = quote::format_ident!("{variant}");
            quote! { ::core::option::Option::Some(::trellis_web::validate::Format::#variant) }
        }
        None => quote! { ::core::option::Option::None },
    };

    let one_of = match &attrs.enumeration {
        Some(values) => quote! { ::core::option::Option::Some(&[ #( #values ),* ]) },
        None => quote! { ::core::option::Option::None },
    };

    Ok(quote! {
        ::trellis_web::bind::Rules {
            required: #required,
            min: #min,
            max: #max,
            min_length: #min_length,
            max_length: #max_length,
            multiple_of: #multiple_of,
            min_items: #min_items,
            max_items: #max_items,
            unique_items: #unique_items,
            pattern: #pattern,
            format: #format,
            one_of: #one_of,
        }
    })
}

fn option_tokens(value: Option<TokenStream>) -> TokenStream {
    match value {
        Some(tokens) => quote! { ::core::option::Option::Some(#tokens) },
        None => quote! { ::core::option::Option::None },
    }
}
