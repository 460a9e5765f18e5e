// SPDX-License-Identifier: MIT OR Apache-2.0

//! # logscope procedural macros
//!
//! This crate provides the `#[log_context]` attribute for the logscope library.  It
//! resolves the context declarations of a function at compile time into a
//! `static logscope::metadata::CallMetadata` and prefixes the function body with a
//! guard that commits the declared context and reverses it when the body exits.
//!
//! ## Declarations
//!
//! - On an `impl` block, `#[log_context]` or `#[log_context("label", ...)]`
//!   declares type-level labels for every synchronous method in the block.  The
//!   default label is the last path segment of the implementing type.  Methods
//!   may carry their own `#[log_context(...)]`.
//! - On a function (or a method in an unannotated `impl`), it declares
//!   method-level labels only.  The default label is the function name.
//! - `#[log_parameters]` on a function instruments its annotated parameters
//!   only: no type or method label is pushed.
//! - Parameters of an instrumented function may carry `#[log_context]` /
//!   `#[log_context("key")]` to record their `Display` value under the last label,
//!   or `#[extracted_context(extractor = Type, prefix = "p.")]` to record whatever
//!   `Type` (a `logscope::ContextExtractor + Default`) extracts from them.
//!
//! The generated code refers to the `logscope` crate by name.  Use the attribute
//! through `logscope::log_context`.

use proc_macro::TokenStream;
use syn::{Error, Item, parse_macro_input};

mod args;
mod expand;

/// Declares logging context for an `impl` block or a function.
///
/// See the crate documentation for the accepted forms.
#[proc_macro_attribute]
pub fn log_context(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = parse_macro_input!(attr as args::LabelArgs);
    let item = parse_macro_input!(item as Item);
    expand::log_context(args, item)
        .unwrap_or_else(Error::into_compile_error)
        .into()
}

/// Records the annotated parameters of a function without pushing any label.
///
/// Accepts no arguments.  Parameters use the same `#[log_context]` and
/// `#[extracted_context(...)]` forms as under `#[log_context]`.
#[proc_macro_attribute]
pub fn log_parameters(attr: TokenStream, item: TokenStream) -> TokenStream {
    if !attr.is_empty() {
        return Error::new(
            proc_macro2::Span::call_site(),
            "#[log_parameters] takes no arguments",
        )
        .into_compile_error()
        .into();
    }
    let item = parse_macro_input!(item as Item);
    expand::log_parameters(item)
        .unwrap_or_else(Error::into_compile_error)
        .into()
}
