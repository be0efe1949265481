//! Identifier and literal escaping for generated SQL.

mod identifiers;

pub use identifiers::{quote_account, quote_identifier, quote_string_literal};
