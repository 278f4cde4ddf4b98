//! Reserved segment markers that delimit prompt fields.

use regex::Regex;
use std::sync::LazyLock;

use crate::types::{Diet, StyleTag};

pub const START: &str = "<|startoftext|>";
pub const END_TEXT: &str = "<|endoftext|>";
pub const END_TITLE: &str = "<endoftitle>";
pub const ING: &str = "<ing>";
pub const END_INGS: &str = "<endofings>";
pub const INST: &str = "<inst>";
pub const END_INST: &str = "<endofinst>";
pub const END_RECIPE: &str = "<endofrecipe>";
pub const END_PROMPT: &str = "<endofprompt>";
pub const NO_INGS: &str = "<noings>";

/// Markers with a fixed spelling, in a stable order.
pub const FIXED: [&str; 10] = [
    START, END_TEXT, END_TITLE, ING, END_INGS, INST, END_INST, END_RECIPE, END_PROMPT, NO_INGS,
];

/// Markers that end a generated recipe.
pub const TERMINATORS: [&str; 3] = [END_INST, END_RECIPE, END_TEXT];

static MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    let fixed: Vec<String> = FIXED.iter().map(|m| regex::escape(m)).collect();
    let pattern = format!("{}|<(?:source|target):[a-z-]+>", fixed.join("|"));
    Regex::new(&pattern).expect("marker pattern is valid")
});

pub fn source_tag(tag: &StyleTag) -> String {
    format!("<source:{}>", tag)
}

pub fn target_tag(tag: &StyleTag) -> String {
    format!("<target:{}>", tag)
}

/// Every marker a prompt can contain, fixed markers first.
pub fn all_markers() -> Vec<String> {
    let mut markers: Vec<String> = FIXED.iter().map(|m| m.to_string()).collect();
    for diet in Diet::ALL {
        for tag in [StyleTag::positive(diet), StyleTag::negative(diet)] {
            markers.push(source_tag(&tag));
            markers.push(target_tag(&tag));
        }
    }
    markers
}

/// Regex matching any marker.
pub fn marker_regex() -> &'static Regex {
    &MARKER_RE
}

pub fn contains_marker(text: &str) -> bool {
    MARKER_RE.is_match(text)
}

/// Collapse every whitespace run into a single space and trim the ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Remove every marker and normalize the remaining whitespace.
pub fn strip_markers(text: &str) -> String {
    normalize_whitespace(&MARKER_RE.replace_all(text, " "))
}

/// Remove only termination markers.
pub fn strip_terminators(text: &str) -> String {
    let mut out = text.to_string();
    for t in TERMINATORS {
        out = out.replace(t, " ");
    }
    normalize_whitespace(&out)
}
