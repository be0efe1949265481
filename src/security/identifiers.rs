//! MySQL identifier and literal escaping utilities.
//!
//! Uses MySQL's backtick notation `` `identifier` `` for identifiers and
//! single-quoted string literals for values.

/// Quote a MySQL identifier using backtick notation.
///
/// Embedded backticks are escaped by doubling them, so the result is always a
/// single identifier token no matter what the input contains.
///
/// # Examples
///
/// ```
/// use mysql_provider::security::quote_identifier;
///
/// assert_eq!(quote_identifier("app"), "`app`");
/// assert_eq!(quote_identifier("we`ird"), "`we``ird`");
/// ```
pub fn quote_identifier(identifier: &str) -> String {
    format!("`{}`", identifier.replace('`', "``"))
}

/// Quote a value as a MySQL string literal.
///
/// Single quotes are doubled and backslashes escaped. Doubled quotes are
/// valid in every `sql_mode`; the backslash escapes assume the default mode
/// (no `NO_BACKSLASH_ESCAPES`).
pub fn quote_string_literal(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for ch in value.chars() {
        match ch {
            '\'' => quoted.push_str("''"),
            '\\' => quoted.push_str("\\\\"),
            '\0' => quoted.push_str("\\0"),
            _ => quoted.push(ch),
        }
    }
    quoted.push('\'');
    quoted
}

/// Quote a `user@host` account name as two backtick identifiers.
pub fn quote_account(user: &str, host: &str) -> String {
    format!("{}@{}", quote_identifier(user), quote_identifier(host))
}
