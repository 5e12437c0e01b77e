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

use proc_macro::TokenStream;

use quote::quote;
use syn::{parse_macro_input, ItemFn};

/// Runs an `async fn` test on a multi-threaded tokio runtime.
///
/// Panics raised on any runtime thread are recorded and re-raised on the test thread,
/// so a panicking actor fails the test even when the test body itself returns normally.
/// The test may return `()` or any `Result` a regular `#[test]` may return.
#[proc_macro_attribute]
pub fn strand_test(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as ItemFn);
    let vis = &input.vis;
    let sig = &input.sig;
    let body = &input.block;
    let attrs = &input.attrs;
    let name = &sig.ident;
    let inputs = &sig.inputs;
    let output = &sig.output;

    let async_name = syn::Ident::new(&format!("__{}_async", name), name.span());

    let output = quote! {
        #[test]
        #(#attrs)*
        #vis fn #name() #output {
            use std::panic;
            use std::sync::atomic::{AtomicBool, Ordering};
            use std::sync::Arc;
            use ::strand_test::__private::{parking_lot, tokio, tracing};

            #[derive(Clone, Default)]
            struct PanicInfo {
                occurred: Arc<AtomicBool>,
                message: Arc<parking_lot::Mutex<Option<String>>>,
                location: Arc<parking_lot::Mutex<Option<String>>>,
            }

            let panic_info = PanicInfo::default();
            let panic_info_hook = panic_info.clone();

            let orig_hook = panic::take_hook();
            panic::set_hook(Box::new(move |info| {
                panic_info_hook.occurred.store(true, Ordering::SeqCst);
                let message = info
                    .payload()
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| info.payload().downcast_ref::<String>().cloned());
                *panic_info_hook.message.lock() = message.clone();
                *panic_info_hook.location.lock() = info
                    .location()
                    .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()));
                tracing::error!(
                    "Panic: {}",
                    message
                        .unwrap_or_else(|| "No error message".to_string())
                        .trim()
                        .replace('\n', " ")
                );
                orig_hook(info);
            }));

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .expect("failed to build the test runtime");

            let result = runtime.block_on(async {
                let test_span = tracing::info_span!("strand_test", name = stringify!(#name));
                let _enter = test_span.enter();
                #async_name().await
            });
            drop(runtime);

            if panic_info.occurred.load(Ordering::SeqCst) {
                let message = panic_info.message.lock().clone();
                let location = panic_info
                    .location
                    .lock()
                    .clone()
                    .unwrap_or_else(|| "unknown location".to_string());
                panic!(
                    "Panic at {}: {}",
                    location,
                    message
                        .unwrap_or_else(|| "No error message".to_string())
                        .trim()
                        .replace('\n', " ")
                );
            }

            result
        }

        async fn #async_name(#inputs) #output #body
    };

    output.into()
}
