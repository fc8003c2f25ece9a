//! Console reply clean-up.
//!
//! Removes ANSI/VT escape sequences (`ESC [ params letter`), then drops every
//! character outside printable ASCII except `\n` and `\r`, then trims. The
//! result is stable: sanitizing it again returns it unchanged.

use std::sync::LazyLock;

use regex::Regex;

static ANSI_ESCAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1B\[[0-9;]*[a-zA-Z]").expect("ANSI escape pattern is valid"));

/// Strip decoration from a raw console reply.
pub fn sanitize(raw: &str) -> String {
    let without_escapes = ANSI_ESCAPE.replace_all(raw, "");
    let printable: String = without_escapes
        .chars()
        .filter(|&c| c == '\n' || c == '\r' || (' '..='~').contains(&c))
        .collect();
    printable.trim().to_string()
}
