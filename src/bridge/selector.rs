use crate::dom::css::escape_ident;
use crate::dom::{Document, NodeId};

/// Ancestor levels walked before giving up on reaching an id.
pub const MAX_SELECTOR_DEPTH: usize = 6;

/// Build a short structural selector for `node`: `tag:nth-of-type(n)`
/// segments joined by `" > "`, cut at the first ancestor with an id
/// (`tag#id`) or after [`MAX_SELECTOR_DEPTH`] levels. Not guaranteed unique,
/// but always matches `node` under an unchanged document.
pub fn css_selector<D: Document + ?Sized>(doc: &D, node: NodeId) -> Option<String> {
    if !doc.is_element(node) {
        return None;
    }

    let mut segments = Vec::new();
    let mut current = Some(node);
    while let Some(element) = current {
        if segments.len() >= MAX_SELECTOR_DEPTH {
            break;
        }
        let tag = doc.tag_name(element)?;
        if let Some(id) = doc.attribute(element, "id").filter(|id| !id.is_empty()) {
            segments.push(format!("{tag}#{}", escape_ident(&id)));
            break;
        }
        let position = nth_of_type_position(doc, element, &tag);
        segments.push(format!("{tag}:nth-of-type({position})"));
        current = doc.parent_element(element);
    }

    segments.reverse();
    Some(segments.join(" > "))
}

/// 1-based position of `node` among its parent's children sharing `tag`.
fn nth_of_type_position<D: Document + ?Sized>(doc: &D, node: NodeId, tag: &str) -> usize {
    let Some(parent) = doc.parent_element(node) else {
        return 1;
    };
    let mut position = 0;
    for sibling in doc.children(parent) {
        if doc.tag_name(sibling).as_deref() == Some(tag) {
            position += 1;
        }
        if sibling == node {
            break;
        }
    }
    position
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::MemoryDocument;

    const PAGE: &str = r#"<html><body>
        <div id="app"><ul><li>a</li><li><span>b</span></li></ul></div>
        <div><p>one</p><p>two</p></div>
        <section><div><div><div><div><div><em>deep</em></div></div></div></div></div></section>
        <b id="odd.id:1">weird</b>
    </body></html>"#;

    fn find(doc: &MemoryDocument, tag: &str, text: &str) -> NodeId {
        doc.elements()
            .into_iter()
            .find(|n| doc.tag_name(*n).as_deref() == Some(tag) && doc.rendered_text(*n) == text)
            .unwrap()
    }

    #[test]
    fn stops_at_nearest_id() {
        let doc = MemoryDocument::parse_html("https://example.test/", PAGE);
        let span = find(&doc, "span", "b");
        assert_eq!(
            css_selector(&doc, span).as_deref(),
            Some("div#app > ul:nth-of-type(1) > li:nth-of-type(2) > span:nth-of-type(1)")
        );
    }

    #[test]
    fn counts_only_same_tag_siblings() {
        let doc = MemoryDocument::parse_html("https://example.test/", PAGE);
        let second = find(&doc, "p", "two");
        let selector = css_selector(&doc, second).unwrap();
        assert!(selector.ends_with("div:nth-of-type(2) > p:nth-of-type(2)"), "{selector}");
    }

    #[test]
    fn depth_is_bounded() {
        let doc = MemoryDocument::parse_html("https://example.test/", PAGE);
        let em = find(&doc, "em", "deep");
        let selector = css_selector(&doc, em).unwrap();
        assert_eq!(selector.split(" > ").count(), MAX_SELECTOR_DEPTH);
        assert!(selector.starts_with("div:nth-of-type(1)"), "{selector}");
    }

    #[test]
    fn selectors_resolve_back_to_their_element() {
        let doc = MemoryDocument::parse_html("https://example.test/", PAGE);
        for node in doc.elements() {
            let selector = css_selector(&doc, node).unwrap();
            let found = doc.query_selector(&selector).unwrap();
            assert_eq!(found, Some(node), "{selector}");
        }
    }

    #[test]
    fn text_nodes_have_no_selector() {
        let doc = MemoryDocument::parse_html("https://example.test/", PAGE);
        let b = doc.element_by_id("odd.id:1").unwrap();
        let text = doc.child_nodes(b)[0];
        assert_eq!(css_selector(&doc, text), None);
    }
}
