/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */
#![forbid(unsafe_code)]

//! Strand Macro Library
//!
//! Procedural macros for the Strand actor framework.
//!
//! # Message Macro
//!
//! The [`strand_message`] macro turns a plain struct or enum into a type that can
//! travel inside a `Message`, be matched by a behavior and be carried by a stream:
//!
//! ```ignore
//! #[strand_message]
//! pub struct Ping;
//!
//! #[strand_message]
//! pub struct Deposit {
//!     pub amount: u64,
//! }
//! ```
//!
//! The generated code refers to the core crate as `::strand_core`. Crates that only
//! depend on the `strand` facade pass the path explicitly:
//!
//! ```ignore
//! #[strand_message(crate = strand::core)]
//! pub struct Ping;
//! ```

use proc_macro::TokenStream;

use quote::quote;
use syn::{parse_macro_input, parse_quote, DeriveInput, Path};

fn has_derive(input: &DeriveInput, trait_name: &str) -> bool {
    input.attrs.iter().any(|attr| {
        if attr.path().is_ident("derive") {
            let mut found = false;
            let _ = attr.parse_nested_meta(|meta| {
                if meta.path.is_ident(trait_name) {
                    found = true;
                }
                Ok(())
            });
            found
        } else {
            false
        }
    })
}

/// Options parsed from `#[strand_message(...)]`.
struct MessageConfig {
    /// Path under which the core crate is reachable from the expanding crate.
    core_path: Path,
}

impl Default for MessageConfig {
    fn default() -> Self {
        Self {
            core_path: parse_quote!(::strand_core),
        }
    }
}

/// Marks a struct or enum as a Strand message type.
///
/// This expands to:
/// - `#[derive(Clone, Debug)]` for whichever of the two is not already derived
/// - an implementation of `strand_core::message::MessageType`, which in turn makes
///   the type usable as a handler pattern, a message payload and a stream element
/// - a compile-time assertion that the type is `Send + Sync + 'static`
///
/// ```ignore
/// use strand_macro::strand_message;
///
/// #[strand_message]
/// pub struct Increment {
///     pub amount: u32,
/// }
/// ```
#[proc_macro_attribute]
pub fn strand_message(attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut config = MessageConfig::default();
    let config_parser = syn::meta::parser(|meta| {
        if meta.path.is_ident("crate") {
            config.core_path = meta.value()?.parse()?;
            Ok(())
        } else {
            Err(meta.error("unsupported strand_message option"))
        }
    });
    parse_macro_input!(attr with config_parser);

    let input = parse_macro_input!(item as DeriveInput);

    let name = &input.ident;
    let generics = &input.generics;
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();
    let core = &config.core_path;

    let derives = {
        let mut traits = Vec::new();
        if !has_derive(&input, "Clone") {
            traits.push(quote!(Clone));
        }
        if !has_derive(&input, "Debug") {
            traits.push(quote!(Debug));
        }
        if traits.is_empty() {
            quote!()
        } else {
            quote!(#[derive(#(#traits),*)])
        }
    };

    let assert_ident = quote::format_ident!("_AssertStrandMessage_{}", name);

    let expanded = quote! {
        #derives
        #input

        impl #impl_generics #core::message::MessageType for #name #ty_generics #where_clause {}

        #[doc(hidden)]
        #[allow(dead_code, non_camel_case_types, non_snake_case, clippy::needless_lifetimes)]
        const _: () = {
            fn #assert_ident #impl_generics () #where_clause {
                fn assert_bounds<T: Send + Sync + 'static>() {}
                assert_bounds::<#name #ty_generics>();
            }
        };
    };

    TokenStream::from(expanded)
}
