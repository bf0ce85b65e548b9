use tracing::debug;

use crate::dom::{Document, DomError, NodeId};
use crate::types::ElementTarget;

/// Elements a text target is matched against.
pub const CLICKABLE_SELECTOR: &str =
    r#"button, [role="button"], a, input[type="submit"], input[type="button"]"#;
pub const NAMED_CONTROL_SELECTOR: &str = "input, textarea, select";

/// Find the live element `target` describes. Strategies run in order
/// (selector, id, text, name) and every strategy whose field is present is
/// tried, even when an earlier present field found nothing.
///
/// A malformed `css_selector` is an error, as it would be for
/// `document.querySelector`.
pub fn find_element<D: Document + ?Sized>(
    doc: &D,
    target: &ElementTarget,
) -> Result<Option<NodeId>, DomError> {
    if let Some(selector) = present(&target.css_selector) {
        if let Some(node) = doc.query_selector(selector)? {
            debug!(selector, "resolved by selector");
            return Ok(Some(node));
        }
    }

    if let Some(id) = present(&target.id) {
        if let Some(node) = doc.element_by_id(id) {
            debug!(id, "resolved by id");
            return Ok(Some(node));
        }
    }

    if let Some(text) = present(&target.text) {
        if let Some(node) = find_by_text(doc, text)? {
            debug!(text, "resolved by text");
            return Ok(Some(node));
        }
    }

    if let Some(name) = present(&target.name) {
        let found = doc
            .query_selector_all(NAMED_CONTROL_SELECTOR)?
            .into_iter()
            .find(|node| doc.attribute(*node, "name").as_deref() == Some(name));
        if let Some(node) = found {
            debug!(name, "resolved by name");
            return Ok(Some(node));
        }
    }

    Ok(None)
}

fn find_by_text<D: Document + ?Sized>(doc: &D, text: &str) -> Result<Option<NodeId>, DomError> {
    let needle = text.trim().to_lowercase();
    Ok(doc
        .query_selector_all(CLICKABLE_SELECTOR)?
        .into_iter()
        .find(|node| doc.rendered_text(*node).to_lowercase().contains(&needle)))
}

/// Only the empty string counts as absent; whitespace is a real value.
fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::MemoryDocument;

    const PAGE: &str = r#"<html><body>
        <form>
          <input id="email" name="email">
          <select name="color"><option>Red</option></select>
          <input type="submit" value="Send message">
        </form>
        <p>Submit your order</p>
        <a href="/help">Need HELP?</a>
        <button id="buy">  Buy now </button>
    </body></html>"#;

    fn doc() -> MemoryDocument {
        MemoryDocument::parse_html("https://example.test/", PAGE)
    }

    fn tag_of(doc: &MemoryDocument, node: Option<NodeId>) -> Option<String> {
        node.and_then(|n| doc.tag_name(n))
    }

    #[test]
    fn selector_comes_first() {
        let doc = doc();
        let target = ElementTarget {
            css_selector: Some("button#buy".into()),
            id: Some("email".into()),
            ..Default::default()
        };
        let found = find_element(&doc, &target).unwrap();
        assert_eq!(tag_of(&doc, found).as_deref(), Some("button"));
    }

    #[test]
    fn failed_selector_falls_through_to_id() {
        let doc = doc();
        let target = ElementTarget {
            css_selector: Some("div#missing".into()),
            id: Some("email".into()),
            ..Default::default()
        };
        assert_eq!(find_element(&doc, &target).unwrap(), doc.element_by_id("email"));
    }

    #[test]
    fn text_matches_clickables_only() {
        let doc = doc();
        let found = find_element(&doc, &ElementTarget::by_text(" help ")).unwrap();
        assert_eq!(tag_of(&doc, found).as_deref(), Some("a"));

        // Input buttons render no text of their own.
        let found = find_element(&doc, &ElementTarget::by_text("send")).unwrap();
        assert_eq!(found, None);

        // The paragraph is not a clickable candidate.
        let found = find_element(&doc, &ElementTarget::by_text("your order")).unwrap();
        assert_eq!(found, None);
    }

    #[test]
    fn name_matches_form_controls() {
        let doc = doc();
        let found = find_element(&doc, &ElementTarget::by_name("color")).unwrap();
        assert_eq!(tag_of(&doc, found).as_deref(), Some("select"));
    }

    #[test]
    fn empty_target_finds_nothing() {
        let doc = doc();
        assert_eq!(find_element(&doc, &ElementTarget::default()).unwrap(), None);
        let blank = ElementTarget {
            id: Some("".into()),
            name: Some("".into()),
            ..Default::default()
        };
        assert_eq!(find_element(&doc, &blank).unwrap(), None);
    }

    #[test]
    fn whitespace_text_matches_the_first_clickable() {
        let doc = doc();
        let found = find_element(&doc, &ElementTarget::by_text("   ")).unwrap();
        assert_eq!(tag_of(&doc, found).as_deref(), Some("input"));

        let err = find_element(&doc, &ElementTarget::by_selector("  ")).unwrap_err();
        assert!(matches!(err, DomError::InvalidSelector { .. }));
    }

    #[test]
    fn malformed_selector_is_an_error() {
        let doc = doc();
        let err = find_element(&doc, &ElementTarget::by_selector("button[")).unwrap_err();
        assert!(matches!(err, DomError::InvalidSelector { .. }));
    }
}
