// Copyright (c) The ticksync Authors.
// Licensed under the MIT License.

use proc_macro::TokenStream;
use quote::quote;
use syn::{ItemFn, ReturnType, Signature, parse_macro_input};

fn check_async(sig: &Signature) -> syn::Result<()> {
    match sig.asyncness {
        Some(_) => Ok(()),
        None => Err(syn::Error::new_spanned(
            sig.fn_token,
            "expected an `async fn`",
        )),
    }
}

fn check_main(sig: &Signature) -> syn::Result<()> {
    check_async(sig)?;
    if sig.ident != "main" {
        return Err(syn::Error::new_spanned(
            &sig.ident,
            "#[ticksync::main] can only be applied to `main`",
        ));
    }
    if !sig.inputs.is_empty() {
        return Err(syn::Error::new_spanned(
            &sig.inputs,
            "`main` takes no arguments",
        ));
    }
    Ok(())
}

/// Runs an `async fn main` to completion on a fresh `LocalScheduler`.
///
/// The body is handed to `ticksync::run`; a stalled scheduler panics with the
/// stall message. A non-unit return type is passed through unchanged.
#[proc_macro_attribute]
pub fn main(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let ItemFn {
        attrs,
        vis,
        sig,
        block,
    } = parse_macro_input!(item as ItemFn);

    if let Err(error) = check_main(&sig) {
        return error.to_compile_error().into();
    }

    let output = &sig.output;
    let run = quote! { ticksync::run(async #block) };
    let body = match output {
        ReturnType::Default => quote! {
            if let Err(stalled) = #run {
                panic!("{stalled}");
            }
        },
        ReturnType::Type(..) => quote! {
            #run.unwrap_or_else(|stalled| panic!("{stalled}"))
        },
    };

    quote! {
        #(#attrs)*
        #vis fn main() #output {
            #body
        }
    }
    .into()
}

/// Turns an `async fn` into a `#[test]` whose body is handed to
/// `crate::run_test(name, future)`.
///
/// Each test crate defines its own `run_test` and brings it into scope at
/// the crate root.
#[proc_macro_attribute]
pub fn test(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let ItemFn {
        attrs,
        vis,
        sig,
        block,
    } = parse_macro_input!(item as ItemFn);

    if let Err(error) = check_async(&sig) {
        return error.to_compile_error().into();
    }

    let name = &sig.ident;
    let name_str = name.to_string();
    let output = &sig.output;

    quote! {
        #[test]
        #(#attrs)*
        #vis fn #name() #output {
            crate::run_test(#name_str, async #block)
        }
    }
    .into()
}
