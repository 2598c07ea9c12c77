extern crate proc_macro;

use proc_macro::TokenStream;
use syn::parse_macro_input;

mod operation_table;

use operation_table::{OperationList, generate_operation_table};

/// Generate the table of intercepted operations
///
/// The input is a list of C function signatures, written like the items of
/// an `extern "C"` block. For every entry the macro generates:
/// 1. A variant of the `Operation` enum, with its C symbol name
/// 2. A `<Name>Fn` alias for the original function pointer
/// 3. A lazily resolved slot in `OperationTable`, with an accessor method
///    named after the function
///
/// # Example
///
/// ```ignore
/// operation_table! {
///     /// Original `listen`
///     fn listen(sockfd: c_int, backlog: c_int) -> c_int;
/// }
/// ```
#[proc_macro]
pub fn operation_table(input: TokenStream) -> TokenStream {
	let list = parse_macro_input!(input as OperationList);

	match generate_operation_table(&list) {
		Ok(output) => output.into(),
		Err(err) => err.to_compile_error().into(),
	}
}
