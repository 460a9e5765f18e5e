// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parsing of `#[log_context(...)]` and `#[extracted_context(...)]` arguments.

use syn::parse::{Parse, ParseStream};
use syn::punctuated::Punctuated;
use syn::{Attribute, Error, Ident, LitStr, Meta, Token, Type};

pub const LOG_CONTEXT: &str = "log_context";
pub const EXTRACTED_CONTEXT: &str = "extracted_context";

/// Explicit labels; empty means the element's own name.
pub struct LabelArgs {
    pub labels: Vec<LitStr>,
}

impl Parse for LabelArgs {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let labels = Punctuated::<LitStr, Token![,]>::parse_terminated(input)?;
        for label in &labels {
            if label.value().trim().is_empty() {
                return Err(Error::new(label.span(), "context labels must not be blank"));
            }
        }
        Ok(Self {
            labels: labels.into_iter().collect(),
        })
    }
}

impl LabelArgs {
    /// Reads the arguments of a `#[log_context]` attribute, with or without parentheses.
    pub fn from_attribute(attr: &Attribute) -> syn::Result<Self> {
        match &attr.meta {
            Meta::Path(_) => Ok(Self { labels: Vec::new() }),
            Meta::List(_) => attr.parse_args(),
            Meta::NameValue(nv) => Err(Error::new_spanned(
                nv,
                "expected #[log_context] or #[log_context(\"label\", ...)]",
            )),
        }
    }
}

/// `extractor = Type, prefix = "p."`
pub struct ExtractorArgs {
    pub extractor: Type,
    pub prefix: Option<LitStr>,
}

impl Parse for ExtractorArgs {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let mut extractor = None;
        let mut prefix = None;
        while !input.is_empty() {
            let key: Ident = input.parse()?;
            input.parse::<Token![=]>()?;
            match key.to_string().as_str() {
                "extractor" if extractor.is_none() => extractor = Some(input.parse::<Type>()?),
                "prefix" if prefix.is_none() => prefix = Some(input.parse::<LitStr>()?),
                "extractor" | "prefix" => {
                    return Err(Error::new(key.span(), format!("duplicate `{key}` argument")));
                }
                _ => {
                    return Err(Error::new(
                        key.span(),
                        "unknown argument; expected `extractor` or `prefix`",
                    ));
                }
            }
            if input.is_empty() {
                break;
            }
            input.parse::<Token![,]>()?;
        }
        let extractor = extractor
            .ok_or_else(|| input.error("missing `extractor = Type` argument"))?;
        Ok(Self { extractor, prefix })
    }
}

pub fn is_attr(attr: &Attribute, name: &str) -> bool {
    attr.path().is_ident(name)
}

/// Removes the first attribute named `name` from `attrs` and returns it.
pub fn take_attr(attrs: &mut Vec<Attribute>, name: &str) -> Option<Attribute> {
    let index = attrs.iter().position(|attr| is_attr(attr, name))?;
    Some(attrs.remove(index))
}
