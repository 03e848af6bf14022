//! Model response cleanup.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref FENCED: Regex = Regex::new(r"(?s)```[A-Za-z]*[ \t]*\r?\n(.*?)\r?\n?[ \t]*```").unwrap();
}

/// Body of the first fenced block, or the trimmed text when there is none.
pub fn strip_code_fences(text: &str) -> String {
    match FENCED.captures(text) {
        Some(c) => c[1].trim().to_string(),
        None => text.trim().to_string(),
    }
}
