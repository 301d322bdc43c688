//! `#[timeout_test]`: async tests on a current-thread runtime with a hard
//! wall-clock deadline.
//!
//! ```ignore
//! #[timeout_test]
//! async fn default_deadline() {}
//!
//! #[timeout_test(secs = 5, paused)]
//! async fn paused_clock() {}
//! ```
//!
//! `paused` starts the runtime with a paused clock and requires tokio's
//! `test-util` feature in the consuming crate.

use proc_macro::TokenStream;
use quote::quote;
use syn::{meta, parse_macro_input, Attribute, ItemFn, LitInt};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Default)]
struct TestArgs {
    secs: Option<u64>,
    paused: bool,
}

impl TestArgs {
    fn parse(&mut self, meta: meta::ParseNestedMeta<'_>) -> syn::Result<()> {
        if meta.path.is_ident("secs") {
            let lit: LitInt = meta.value()?.parse()?;
            let secs: u64 = lit.base10_parse()?;
            if secs == 0 {
                return Err(syn::Error::new_spanned(lit, "timeout must be greater than zero"));
            }
            self.secs = Some(secs);
            Ok(())
        } else if meta.path.is_ident("paused") {
            self.paused = true;
            Ok(())
        } else {
            Err(meta.error("expected `secs = <n>` or `paused`"))
        }
    }
}

#[proc_macro_attribute]
pub fn timeout_test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut args = TestArgs::default();
    let parser = meta::parser(|meta| args.parse(meta));
    parse_macro_input!(attr with parser);

    let ItemFn {
        attrs,
        vis,
        mut sig,
        block,
    } = parse_macro_input!(item as ItemFn);

    if sig.asyncness.is_none() {
        return syn::Error::new_spanned(&sig.ident, "timeout_test expects an async function")
            .to_compile_error()
            .into();
    }
    sig.asyncness = None;

    let attrs: Vec<Attribute> = attrs
        .into_iter()
        .filter(|attr| !is_test_attribute(attr))
        .collect();
    let secs = args.secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
    let pause = args.paused.then(|| quote! { builder.start_paused(true); });

    TokenStream::from(quote! {
        #[test]
        #(#attrs)*
        #vis #sig {
            let deadline = std::time::Duration::from_secs(#secs);
            let (sender, receiver) = std::sync::mpsc::channel();
            std::thread::spawn(move || {
                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    let mut builder = tokio::runtime::Builder::new_current_thread();
                    builder.enable_all();
                    #pause
                    let runtime = builder.build().expect("failed to build Tokio runtime");
                    runtime.block_on(async move #block);
                }));
                let _ = sender.send(result);
            });
            match receiver.recv_timeout(deadline) {
                Ok(Ok(())) => {}
                Ok(Err(payload)) => std::panic::resume_unwind(payload),
                Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
                    panic!("test exceeded {}s", #secs)
                }
                Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                    panic!("test thread exited before reporting a result")
                }
            }
        }
    })
}

/// Strips `#[test]` and `#[tokio::test]` so the test is not registered twice.
fn is_test_attribute(attr: &Attribute) -> bool {
    let segments: Vec<String> = attr
        .path()
        .segments
        .iter()
        .map(|segment| segment.ident.to_string())
        .collect();
    matches!(segments.as_slice(), [one] if one == "test")
        || matches!(segments.as_slice(), [a, b] if a == "tokio" && b == "test")
}
