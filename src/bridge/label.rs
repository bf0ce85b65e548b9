use crate::dom::{Document, NodeId};

/// Human-readable name of an element. Sources, first non-empty wins:
/// `<label for>`, wrapping `<label>`, `aria-label`, `placeholder`, `title`,
/// and for buttons and links their own text.
pub fn element_label<D: Document + ?Sized>(doc: &D, node: NodeId) -> Option<String> {
    if !doc.is_element(node) {
        return None;
    }

    let for_label = doc
        .attribute(node, "id")
        .filter(|id| !id.is_empty())
        .and_then(|id| {
            doc.elements().into_iter().find(|candidate| {
                doc.tag_name(*candidate).as_deref() == Some("label")
                    && doc.attribute(*candidate, "for").as_deref() == Some(id.as_str())
            })
        })
        .map(|label| doc.rendered_text(label));
    if let Some(text) = non_empty(for_label) {
        return Some(text);
    }

    let wrapping = doc
        .ancestors(node)
        .into_iter()
        .find(|ancestor| doc.tag_name(*ancestor).as_deref() == Some("label"))
        .map(|label| doc.rendered_text(label));
    if let Some(text) = non_empty(wrapping) {
        return Some(text);
    }

    for attribute in ["aria-label", "placeholder", "title"] {
        if let Some(text) = non_empty(doc.attribute(node, attribute)) {
            return Some(text);
        }
    }

    match doc.tag_name(node).as_deref() {
        Some("button" | "a") => non_empty(Some(doc.rendered_text(node))),
        _ => None,
    }
}

fn non_empty(text: Option<String>) -> Option<String> {
    text.map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}
