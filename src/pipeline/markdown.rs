//! Markdown and plain-text assembly from recognised pages.
//!
//! Both documents are built page by page in reading order, each page
//! followed by a blank line (`"\n\n"`):
//!
//! 1. **Link rewrite**: `![id](id)` references to images that were saved are
//!    pointed at `images/<file>`; anything else is left untouched.
//! 2. **Text derivation**: image spans `![...](...)` are cut out of the
//!    rewritten page Markdown and doubled newlines collapse to one.

use crate::response::Page;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::HashMap;

/// Inline image reference: `![alt](target)`.
static RE_IMAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"!\[([^\]]*)\]\(([^)]*)\)").unwrap());

/// Separator appended after every page in both outputs.
pub const PAGE_SEPARATOR: &str = "\n\n";

/// The combined documents for one response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedDocument {
    pub markdown: String,
    pub text: String,
}

/// Assemble `output.md` and `output.txt` content.
///
/// `image_paths` maps image identifiers to their output-relative paths and is
/// only consulted when `include_images` is set.
pub fn render_document(
    pages: &[Page],
    image_paths: &HashMap<String, String>,
    include_images: bool,
) -> RenderedDocument {
    let mut doc = RenderedDocument::default();
    for page in pages {
        let markdown = if include_images {
            rewrite_image_links(&page.markdown, image_paths)
        } else {
            page.markdown.clone()
        };

        doc.text.push_str(&page_text(&markdown));
        doc.text.push_str(PAGE_SEPARATOR);

        doc.markdown.push_str(&markdown);
        doc.markdown.push_str(PAGE_SEPARATOR);
    }
    doc
}

/// Point `![id](id)` at the saved file for `id`.
///
/// Only references whose alt text and target are both the identifier are
/// rewritten. Identifiers missing from `image_paths` stay dangling.
pub fn rewrite_image_links(markdown: &str, image_paths: &HashMap<String, String>) -> String {
    if image_paths.is_empty() {
        return markdown.to_string();
    }
    RE_IMAGE
        .replace_all(markdown, |caps: &Captures| {
            let alt = &caps[1];
            let target = &caps[2];
            match image_paths.get(target) {
                Some(path) if alt == target => format!("![{alt}]({path})"),
                _ => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Plain text for one page of (already rewritten) Markdown.
pub fn page_text(markdown: &str) -> String {
    strip_image_spans(markdown).replace("\n\n", "\n")
}

/// Remove every `![` through the first `)` after it.
///
/// An opener with no closing parenthesis ends the scan and is kept. Repeats
/// until stable so that a removal cannot splice a new `![` together.
pub fn strip_image_spans(markdown: &str) -> String {
    let mut current = strip_pass(markdown);
    loop {
        let next = strip_pass(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn strip_pass(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("![") {
        let Some(close) = rest[start..].find(')') else {
            break;
        };
        out.push_str(&rest[..start]);
        rest = &rest[start + close + 1..];
    }
    out.push_str(rest);
    out
}
