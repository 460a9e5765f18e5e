// SPDX-License-Identifier: MIT OR Apache-2.0

//! Code generation for `#[log_context]` and `#[log_parameters]`.
//!
//! An instrumented function keeps its signature.  Its body becomes
//!
//! ```text
//! {
//!     static __LOGSCOPE_PARAMETERS: &[logscope::metadata::ParameterMetadata] = &[/* bindings */];
//!     static __LOGSCOPE_CALL: logscope::metadata::CallMetadata = /* resolved declarations */;
//!     let __logscope_unit = logscope::hidden::enter(&__LOGSCOPE_CALL, &[/* argument values */]);
//!     { /* original body */ }
//! }
//! ```
//!
//! and the committed context is reversed when `__logscope_unit` drops.

use proc_macro2::TokenStream;
use quote::{ToTokens, quote};
use syn::ext::IdentExt;
use syn::{Block, Error, FnArg, ImplItem, Item, ItemFn, ItemImpl, Pat, Signature, Type};

use crate::args::{EXTRACTED_CONTEXT, ExtractorArgs, LOG_CONTEXT, LabelArgs, take_attr};

pub fn log_context(args: LabelArgs, item: Item) -> syn::Result<TokenStream> {
    match item {
        Item::Impl(item) => expand_impl(args, item),
        Item::Fn(item) => expand_fn(args, item),
        other => Err(Error::new_spanned(
            other,
            "#[log_context] applies to impl blocks and functions",
        )),
    }
}

/// Parameter contributions only: neither the type nor the method is declared.
pub fn log_parameters(item: Item) -> syn::Result<TokenStream> {
    let Item::Fn(mut item) = item else {
        return Err(Error::new_spanned(item, "#[log_parameters] applies to functions"));
    };
    let declaring = quote!(logscope::metadata::ElementMetadata::undeclared(module_path!()));
    instrument(&mut item.sig, &mut item.block, &declaring, None)?;
    Ok(item.into_token_stream())
}

fn labels_tokens(args: &LabelArgs) -> TokenStream {
    let labels = &args.labels;
    quote!(logscope::metadata::Labels::new(&[#(#labels),*]))
}

fn expand_fn(args: LabelArgs, mut item: ItemFn) -> syn::Result<TokenStream> {
    // a free function or a method of an unannotated impl: no type declaration
    let declaring = quote!(logscope::metadata::ElementMetadata::undeclared(module_path!()));
    instrument(&mut item.sig, &mut item.block, &declaring, Some(&args))?;
    Ok(item.into_token_stream())
}

fn expand_impl(args: LabelArgs, mut item: ItemImpl) -> syn::Result<TokenStream> {
    let type_name = match &*item.self_ty {
        Type::Path(path) => match path.path.segments.last() {
            Some(segment) => segment.ident.unraw().to_string(),
            None => path.to_token_stream().to_string(),
        },
        other => other.to_token_stream().to_string(),
    };
    let type_labels = labels_tokens(&args);
    let declaring =
        quote!(logscope::metadata::ElementMetadata::declared(#type_name, #type_labels));

    for impl_item in &mut item.items {
        let ImplItem::Fn(method) = impl_item else {
            continue;
        };
        let method_args = take_attr(&mut method.attrs, LOG_CONTEXT)
            .map(|attr| LabelArgs::from_attribute(&attr))
            .transpose()?;
        let synchronous = method.sig.asyncness.is_none() && method.sig.constness.is_none();
        if !synchronous && method_args.is_none() {
            // only explicitly annotated async or const methods are reported
            continue;
        }
        instrument(
            &mut method.sig,
            &mut method.block,
            &declaring,
            method_args.as_ref(),
        )?;
    }
    Ok(item.into_token_stream())
}

fn instrument(
    sig: &mut Signature,
    block: &mut Block,
    declaring: &TokenStream,
    method_args: Option<&LabelArgs>,
) -> syn::Result<()> {
    if let Some(asyncness) = &sig.asyncness {
        return Err(Error::new_spanned(
            asyncness,
            "#[log_context] cannot instrument async functions; wrap the future in logscope::context::ApplyScope instead",
        ));
    }
    if let Some(constness) = &sig.constness {
        return Err(Error::new_spanned(
            constness,
            "#[log_context] cannot instrument const functions",
        ));
    }

    let method_name = sig.ident.unraw().to_string();
    let method = match method_args {
        Some(args) => {
            let labels = labels_tokens(args);
            quote!(logscope::metadata::ElementMetadata::declared(#method_name, #labels))
        }
        None => quote!(logscope::metadata::ElementMetadata::undeclared(#method_name)),
    };

    let mut parameters = Vec::new();
    let mut values = Vec::new();
    let typed = sig.inputs.iter_mut().filter_map(|input| match input {
        FnArg::Typed(typed) => Some(typed),
        FnArg::Receiver(_) => None,
    });
    for (index, param) in typed.enumerate() {
        let labeled = take_attr(&mut param.attrs, LOG_CONTEXT);
        let extracted = take_attr(&mut param.attrs, EXTRACTED_CONTEXT);
        let ident = match &*param.pat {
            Pat::Ident(pat) if pat.subpat.is_none() => Some(pat.ident.clone()),
            _ => None,
        };
        let name = match &ident {
            Some(ident) => ident.unraw().to_string(),
            None => format!("arg{index}"),
        };

        let (binding, value) = match (labeled, extracted, &ident) {
            (None, None, _) => (
                quote!(logscope::metadata::ParameterBinding::Unbound),
                quote!(logscope::ArgValue::Absent),
            ),
            (Some(_), Some(attr), _) => {
                return Err(Error::new_spanned(
                    attr,
                    "a parameter takes either #[log_context] or #[extracted_context], not both",
                ));
            }
            (Some(attr), None, Some(ident)) => {
                let labels = labels_tokens(&LabelArgs::from_attribute(&attr)?);
                (
                    quote!(logscope::metadata::ParameterBinding::Labeled(#labels)),
                    quote!(logscope::ArgValue::display(&#ident)),
                )
            }
            (None, Some(attr), Some(ident)) => {
                let ExtractorArgs { extractor, prefix } = attr.parse_args()?;
                let prefix = match prefix {
                    Some(prefix) => quote!(::core::option::Option::Some(#prefix)),
                    None => quote!(::core::option::Option::None),
                };
                let value = match &*param.ty {
                    Type::Reference(_) => quote!(logscope::ArgValue::any(&*#ident)),
                    _ => quote!(logscope::ArgValue::any(&#ident)),
                };
                (
                    quote!(logscope::metadata::ParameterBinding::Extracted(
                        logscope::metadata::ExtractedBinding::new(
                            #prefix,
                            logscope::ExtractorDescriptor::of::<#extractor>(stringify!(#extractor)),
                        )
                    )),
                    value,
                )
            }
            (Some(_), None, None) | (None, Some(_), None) => {
                return Err(Error::new_spanned(
                    &param.pat,
                    "annotated parameters must be bound to a plain identifier",
                ));
            }
        };
        parameters.push(quote!(logscope::metadata::ParameterMetadata::new(#name, #binding)));
        values.push(value);
    }

    let original = block.clone();
    *block = syn::parse_quote!({
        // a separate static so the parameter array is lifetime-extended
        static __LOGSCOPE_PARAMETERS: &[logscope::metadata::ParameterMetadata] = &[#(#parameters),*];
        static __LOGSCOPE_CALL: logscope::metadata::CallMetadata =
            logscope::metadata::CallMetadata::new(#declaring, #method, __LOGSCOPE_PARAMETERS);
        let __logscope_unit = logscope::hidden::enter(&__LOGSCOPE_CALL, &[#(#values),*]);
        #original
    });
    Ok(())
}
