use proc_macro::TokenStream;
use quote::quote;
use syn::parse_macro_input;

/// A `#[test]` replacement that installs a `tracing` subscriber before the test body runs.
///
/// The subscriber is filtered by `RUST_LOG` and writes through the test harness capture.
/// Composes with `#[rstest::rstest]` when placed below it.
#[proc_macro_attribute]
pub fn test(attr: TokenStream, input: TokenStream) -> TokenStream {
    if !attr.is_empty() {
        return syn::Error::new(
            proc_macro2::Span::call_site(),
            "kiln_macros::test takes no arguments",
        )
        .to_compile_error()
        .into();
    }

    let syn::ItemFn {
        attrs,
        vis,
        sig,
        block,
    } = parse_macro_input!(input as syn::ItemFn);

    let output = quote! {
        #[::core::prelude::v1::test]
        #(#attrs)*
        #vis #sig {
            let _ = ::tracing_subscriber::fmt()
                .with_env_filter(::tracing_subscriber::EnvFilter::from_default_env())
                .with_test_writer()
                .try_init();

            #block
        }
    };

    TokenStream::from(output)
}
