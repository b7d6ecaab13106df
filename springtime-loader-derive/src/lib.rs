mod attributes;
mod entry_point;

use crate::attributes::EntryPointAttributes;
use crate::entry_point::generate_entry_point;
use proc_macro::TokenStream;
use syn::{parse_macro_input, Error, ItemFn};

/// Registers a function as the entry point of a builtin class, making it runnable by the launcher
/// when the class is named by the `Start-Class` manifest attribute. The function takes process
/// arguments as `Vec<String>` and returns either `()` or `Result<(), E>`.
///
/// Supported attributes:
/// * `class = "..."` - fully qualified name of the class
#[proc_macro_attribute]
pub fn entry_point(args: TokenStream, input: TokenStream) -> TokenStream {
    let args = parse_macro_input!(args as EntryPointAttributes);
    let item = parse_macro_input!(input as ItemFn);
    generate_entry_point(&item, &args)
        .unwrap_or_else(Error::into_compile_error)
        .into()
}
