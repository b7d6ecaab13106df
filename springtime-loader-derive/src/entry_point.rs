use crate::attributes::EntryPointAttributes;
use proc_macro2::TokenStream;
use quote::quote;
use syn::spanned::Spanned;
use syn::{Error, ItemFn, Result};

pub fn generate_entry_point(item: &ItemFn, args: &EntryPointAttributes) -> Result<TokenStream> {
    let class = args
        .class
        .as_ref()
        .ok_or_else(|| Error::new(item.sig.span(), "Missing entry point class name!"))?;

    if class.value().is_empty() {
        return Err(Error::new(class.span(), "Entry point class name cannot be empty!"));
    }

    if let Some(asyncness) = &item.sig.asyncness {
        return Err(Error::new(
            asyncness.span(),
            "Entry points cannot be async!",
        ));
    }

    if !item.sig.generics.params.is_empty() {
        return Err(Error::new(
            item.sig.generics.span(),
            "Entry points cannot be generic!",
        ));
    }

    if item.sig.inputs.len() != 1 {
        return Err(Error::new(
            item.sig.inputs.span(),
            "Entry points take exactly one argument with process arguments!",
        ));
    }

    let ident = &item.sig.ident;

    Ok(quote! {
        #item

        const _: () = {
            fn invoke(
                args: ::std::vec::Vec<::std::string::String>,
            ) -> ::std::result::Result<(), springtime_loader::entry_point::ErrorPtr> {
                springtime_loader::entry_point::EntryPointResult::into_result(#ident(args))
            }

            fn register() -> springtime_loader::entry_point::ClassDefinition {
                springtime_loader::entry_point::ClassDefinition {
                    name: #class,
                    main: Some(invoke),
                }
            }

            springtime_loader::entry_point::internal::submit! {
                springtime_loader::entry_point::internal::ClassRegisterer {
                    register
                }
            };
        };
    })
}
