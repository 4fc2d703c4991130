//! vmm-expect-macros: compile-time checked patterns for vmm-expect.
//!
//! - [`regex!`] builds a `Pattern::Regex` whose expression is validated
//!   when the test is compiled, not when the monitor is already running.
//! - [`any_of!`] builds a `Pattern::AnyOf` from literal and regex
//!   alternatives, validating every regex.
//!
//! Both expand to paths under `::vmm_expect`; use them through the
//! re-exports of that crate.
//!
//! ```ignore
//! use vmm_expect::{any_of, regex};
//!
//! let serving = regex!(r"Serving ping on \d+\.\d+\.\d+\.\d+");
//! let outcome = any_of![
//!     "Serving ping on 10.0.0.2",
//!     regex(r"Could not attach interface: tap\w+"),
//! ];
//! ```

// In proc-macro crates, passing parsed input by value is idiomatic
#![allow(clippy::needless_pass_by_value)]

use proc_macro::TokenStream;
use syn::parse_macro_input;

mod any_of;
mod regex;

/// A regex pattern validated at compile time.
///
/// Expands to `::vmm_expect::Pattern::Regex(..)`. An invalid expression is
/// a compile error pointing at the literal.
///
/// ```ignore
/// let abort = regex!(r"solo5_abort\(\) called");
/// // regex!(r"[unclosed") does not compile
/// ```
#[proc_macro]
pub fn regex(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as regex::RegexInput);
    regex::expand(input).into()
}

/// An any-of pattern from literal and regex alternatives.
///
/// Alternatives are string literals (matched literally) or
/// `regex("...")` / `re("...")` (validated at compile time). The match
/// reports the index of the alternative in the order written.
///
/// ```ignore
/// let m = session.expect(any_of![
///     "SUCCESS",
///     regex(r"ABORT|solo5_abort"),
/// ]).await?;
/// if m.pattern_index == 1 { /* aborted */ }
/// ```
#[proc_macro]
pub fn any_of(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as any_of::AnyOfInput);
    any_of::expand(input).into()
}
