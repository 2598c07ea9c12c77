//! Operation table generation
//!
//! This module turns a list of C signatures into the `Operation` enum,
//! the original function pointer aliases and the `OperationTable` struct.

use proc_macro2::{Span, TokenStream};
use quote::{format_ident, quote};
use syn::parse::{Parse, ParseStream};
use syn::{FnArg, ForeignItemFn, LitByteStr, LitStr};

/// The signatures given to `operation_table!`
pub struct OperationList {
	items: Vec<ForeignItemFn>,
}

impl Parse for OperationList {
	fn parse(input: ParseStream) -> syn::Result<Self> {
		let mut items = Vec::new();
		while !input.is_empty() {
			items.push(input.parse::<ForeignItemFn>()?);
		}
		Ok(Self { items })
	}
}

/// Generate the operation enum, pointer aliases and slot table
pub fn generate_operation_table(list: &OperationList) -> syn::Result<TokenStream> {
	if list.items.is_empty() {
		return Err(syn::Error::new(Span::call_site(), "operation_table! needs at least one operation"));
	}

	let mut idents = Vec::new();
	let mut variants = Vec::new();
	let mut aliases = Vec::new();
	let mut names = Vec::new();
	let mut symbols = Vec::new();
	let mut pointer_types = Vec::new();
	let mut docs = Vec::new();

	for item in &list.items {
		let sig = &item.sig;
		if let Some(variadic) = &sig.variadic {
			return Err(syn::Error::new_spanned(variadic, "variadic operations cannot be interposed"));
		}

		let mut arg_types = Vec::new();
		for arg in &sig.inputs {
			match arg {
				FnArg::Typed(pat_type) => arg_types.push(&pat_type.ty),
				FnArg::Receiver(receiver) => {
					return Err(syn::Error::new_spanned(receiver, "operations cannot take self"));
				},
			}
		}

		let ident = &sig.ident;
		let name = ident.to_string();
		let variant = format_ident!("{}", fn_name_to_variant_name(&name));
		let alias = format_ident!("{}Fn", variant);
		let output = &sig.output;
		let attrs = &item.attrs;

		let mut symbol = name.clone().into_bytes();
		symbol.push(0);

		pointer_types.push(quote! { unsafe extern "C" fn(#(#arg_types),*) #output });
		symbols.push(LitByteStr::new(&symbol, ident.span()));
		names.push(LitStr::new(&name, ident.span()));
		docs.push(quote! { #(#attrs)* });
		idents.push(ident.clone());
		variants.push(variant);
		aliases.push(alias);
	}

	let count = list.items.len();

	let output = quote! {
		/// An intercepted socket lifecycle operation
		#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
		pub enum Operation {
			#(#variants),*
		}

		impl Operation {
			/// Every intercepted operation, in declaration order
			pub const ALL: [Self; #count] = [#(Self::#variants),*];

			/// The C symbol looked up for this operation
			#[must_use]
			pub const fn symbol(self) -> &'static ::std::ffi::CStr {
				match self {
					#(Self::#variants => match ::std::ffi::CStr::from_bytes_with_nul(#symbols) {
						Ok(symbol) => symbol,
						Err(_) => unreachable!(),
					}),*
				}
			}

			/// The operation's name
			#[must_use]
			pub const fn name(self) -> &'static str {
				match self {
					#(Self::#variants => #names),*
				}
			}
		}

		impl ::std::fmt::Display for Operation {
			fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
				f.write_str(self.name())
			}
		}

		#(
			#docs
			pub type #aliases = #pointer_types;
		)*

		/// Original implementations, each resolved on first use
		pub struct OperationTable {
			#(#idents: crate::table::Slot<#aliases>),*
		}

		impl OperationTable {
			/// Create a table with every slot empty
			#[must_use]
			pub const fn new() -> Self {
				Self {
					#(#idents: crate::table::Slot::new(Operation::#variants)),*
				}
			}

			#(
				#docs
				pub fn #idents(
					&self,
					resolver: &dyn crate::resolver::SymbolResolver,
				) -> crate::interposer::Result<#aliases> {
					// SAFETY: the alias is generated from this symbol's own C signature
					unsafe { self.#idents.get_or_resolve(resolver) }
				}
			)*

			/// Whether the slot for `operation` holds a resolved original
			#[must_use]
			pub fn is_resolved(&self, operation: Operation) -> bool {
				match operation {
					#(Operation::#variants => self.#idents.is_resolved()),*
				}
			}
		}

		impl Default for OperationTable {
			fn default() -> Self {
				Self::new()
			}
		}

		impl ::std::fmt::Debug for OperationTable {
			fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
				f.debug_struct("OperationTable")
					#(.field(#names, &self.#idents.is_resolved()))*
					.finish()
			}
		}
	};

	Ok(output)
}

/// Convert a snake_case C function name to a CamelCase variant name
fn fn_name_to_variant_name(name: &str) -> String {
	let mut result = String::new();
	for part in name.split('_') {
		let mut chars = part.chars();
		if let Some(first) = chars.next() {
			result.push_str(&first.to_uppercase().to_string());
			result.push_str(chars.as_str());
		}
	}
	result
}
