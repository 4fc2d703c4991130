//! The `any_of!` macro.

use proc_macro2::TokenStream;
use quote::quote;
use syn::parse::{Parse, ParseStream};
use syn::punctuated::Punctuated;
use syn::{Ident, LitStr, Result, Token};

/// One alternative.
pub enum Alternative {
    /// Matched literally.
    Literal(LitStr),
    /// A regular expression.
    Regex(LitStr),
}

impl Parse for Alternative {
    fn parse(input: ParseStream) -> Result<Self> {
        if input.peek(Ident) {
            let kind: Ident = input.parse()?;
            return match kind.to_string().as_str() {
                "regex" | "re" => {
                    let content;
                    syn::parenthesized!(content in input);
                    Ok(Self::Regex(content.parse()?))
                }
                _ => Err(syn::Error::new(
                    kind.span(),
                    format!("unknown pattern kind `{kind}`, expected a string or regex(\"...\")"),
                )),
            };
        }
        Ok(Self::Literal(input.parse()?))
    }
}

/// The any_of! macro input.
pub struct AnyOfInput {
    /// Alternatives in match-priority order.
    pub alternatives: Punctuated<Alternative, Token![,]>,
}

impl Parse for AnyOfInput {
    fn parse(input: ParseStream) -> Result<Self> {
        let alternatives = Punctuated::parse_terminated(input)?;
        if alternatives.is_empty() {
            return Err(input.error("any_of! needs at least one alternative"));
        }
        Ok(Self { alternatives })
    }
}

/// Generate code for the any_of! macro.
pub fn expand(input: AnyOfInput) -> TokenStream {
    let mut items = Vec::with_capacity(input.alternatives.len());
    for alternative in input.alternatives {
        let item = match alternative {
            Alternative::Literal(lit) => {
                quote! { ::vmm_expect::Pattern::Literal(::std::string::String::from(#lit)) }
            }
            Alternative::Regex(lit) => {
                if let Err(error) = crate::regex::validate(&lit) {
                    return error;
                }
                quote! { ::vmm_expect::Pattern::Regex(::std::string::String::from(#lit)) }
            }
        };
        items.push(item);
    }

    quote! {
        ::vmm_expect::Pattern::AnyOf(::std::vec![#(#items),*])
    }
}
