//! CSS helpers shared by the selector builder and the documents.

use scraper::{Html, Selector};

use super::{DomError, NodeId};

/// Escape `ident` so it parses back as the same CSS identifier
/// (`CSS.escape` rules).
pub fn escape_ident(ident: &str) -> String {
    let mut out = String::with_capacity(ident.len());
    let chars: Vec<char> = ident.chars().collect();
    if chars == ['-'] {
        return "\\-".to_string();
    }
    for (i, &c) in chars.iter().enumerate() {
        let leading_digit = c.is_ascii_digit() && (i == 0 || (i == 1 && chars[0] == '-'));
        if leading_digit || c.is_control() {
            out.push_str(&format!("\\{:x} ", c as u32));
        } else if c.is_ascii_alphanumeric() || c == '-' || c == '_' || !c.is_ascii() {
            out.push(c);
        } else {
            out.push('\\');
            out.push(c);
        }
    }
    out
}

/// Parse `selector` the way `querySelector` would, mapping syntax errors to
/// [`DomError::InvalidSelector`].
pub fn parse_selector(selector: &str) -> Result<Selector, DomError> {
    Selector::parse(selector).map_err(|err| DomError::invalid_selector(selector, err.to_string()))
}

/// Run `selector` over `html`, returning the nodes named by the `marker`
/// attribute of each match, in document order. Matches without a marker are
/// skipped.
pub fn select_marked(html: &Html, selector: &Selector, marker: &str) -> Vec<NodeId> {
    html.select(selector)
        .filter_map(|element| element.value().attr(marker)?.parse().ok())
        .map(NodeId)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{Document, MemoryDocument};

    #[test]
    fn escaped_ids_select_their_element() {
        for raw in ["plain", "with.dot", "a:b", "1st", "-2x", "sp ace", "-", "q[0]"] {
            let html = format!(r#"<p>x</p><b id="{raw}">hit</b>"#);
            let doc = MemoryDocument::parse_html("https://example.test/", &html);
            let selector = format!("#{}", escape_ident(raw));
            let found = doc.query_selector(&selector).unwrap();
            assert_eq!(found, doc.element_by_id(raw), "{selector}");
            assert!(found.is_some(), "{selector}");
        }
    }

    #[test]
    fn syntax_errors_name_the_selector() {
        let err = parse_selector("div >").unwrap_err();
        match err {
            DomError::InvalidSelector { selector, .. } => assert_eq!(selector, "div >"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(parse_selector("").is_err());
        assert!(parse_selector("[data-x").is_err());
    }
}
