//! The `regex!` macro.

use proc_macro2::TokenStream;
use quote::quote;
use syn::parse::{Parse, ParseStream};
use syn::{LitStr, Result};

/// The regex! macro input.
pub struct RegexInput {
    /// The expression.
    pub pattern: LitStr,
}

impl Parse for RegexInput {
    fn parse(input: ParseStream) -> Result<Self> {
        let pattern = input.parse()?;
        // Allow a trailing comma.
        let _: Option<syn::Token![,]> = input.parse()?;
        Ok(Self { pattern })
    }
}

/// Check `lit` as a regular expression, producing a spanned error.
pub fn validate(lit: &LitStr) -> std::result::Result<(), TokenStream> {
    regex::Regex::new(&lit.value())
        .map(drop)
        .map_err(|e| syn::Error::new(lit.span(), format!("invalid regex: {e}")).to_compile_error())
}

/// Generate code for the regex! macro.
pub fn expand(input: RegexInput) -> TokenStream {
    if let Err(error) = validate(&input.pattern) {
        return error;
    }
    let lit = &input.pattern;
    quote! {
        ::vmm_expect::Pattern::Regex(::std::string::String::from(#lit))
    }
}

#[cfg(test)]
mod tests {
    use syn::parse_quote;

    use super::*;

    #[test]
    fn parse_simple_regex() {
        let input: RegexInput = parse_quote! {
            r"Serving ping on \d+\.\d+\.\d+\.\d+"
        };
        assert_eq!(input.pattern.value(), r"Serving ping on \d+\.\d+\.\d+\.\d+");
    }

    #[test]
    fn valid_regex_expands_to_pattern() {
        let input: RegexInput = parse_quote! { r"icmp_seq=\d+" };
        let tokens = expand(input).to_string();
        assert!(tokens.contains("Pattern :: Regex"));
    }

    #[test]
    fn invalid_regex_is_a_compile_error() {
        let input: RegexInput = parse_quote! { "[unclosed" };
        let tokens = expand(input).to_string();
        assert!(tokens.contains("compile_error"));
        assert!(tokens.contains("invalid regex"));
    }
}
