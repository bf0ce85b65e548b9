use std::collections::BTreeMap;

use crate::dom::{Document, NodeId, is_form_control};
use crate::types::ElementDescriptor;

use super::label::element_label;
use super::selector::css_selector;
use super::visibility::is_visible;

/// Data attribute a page can set to pin an element's role.
pub const ROLE_ATTRIBUTE: &str = "data-automation-role";

pub const ROLE_BUTTON: &str = "button";
pub const ROLE_LINK: &str = "link";
pub const ROLE_UNKNOWN: &str = "unknown";

/// Describe `node` as it is at call time. `role_override` takes precedence
/// over everything the element says about itself.
pub fn serialize_element<D: Document + ?Sized>(
    doc: &D,
    node: NodeId,
    role_override: Option<&str>,
) -> ElementDescriptor {
    let tag = doc.tag_name(node).unwrap_or_default();
    let attr = |name: &str| doc.attribute(node, name);

    let declared = |role: Option<String>| {
        role.map(|role| role.trim().to_string())
            .filter(|role| !role.is_empty())
    };
    let role = declared(role_override.map(str::to_string))
        .or_else(|| declared(attr(ROLE_ATTRIBUTE)))
        .or_else(|| declared(attr("role")))
        .unwrap_or_else(|| default_role(&tag).to_string());

    let text = doc.rendered_text(node);

    ElementDescriptor {
        id: attr("id").filter(|id| !id.is_empty()),
        kind: attr("type").map(|kind| kind.to_ascii_lowercase()),
        role,
        name: element_label(doc, node),
        text: (!text.is_empty()).then_some(text),
        value: if is_form_control(&tag) {
            doc.value(node)
        } else {
            None
        },
        css_selector: css_selector(doc, node),
        aria_label: attr("aria-label"),
        placeholder: attr("placeholder"),
        href: attr("href"),
        visible: is_visible(doc, node),
        bbox: doc.bounding_client_rect(node),
        dataset: dataset(doc, node),
        tag,
    }
}

pub fn default_role(tag: &str) -> &'static str {
    match tag {
        "button" => ROLE_BUTTON,
        "a" => ROLE_LINK,
        "input" => "input",
        "select" => "select",
        _ => ROLE_UNKNOWN,
    }
}

/// All `data-*` attributes, keyed the way `HTMLElement.dataset` keys them.
pub fn dataset<D: Document + ?Sized>(doc: &D, node: NodeId) -> BTreeMap<String, String> {
    doc.attributes(node)
        .into_iter()
        .filter_map(|(name, value)| {
            let key = name.strip_prefix("data-")?;
            Some((dataset_key(key), value))
        })
        .collect()
}

/// `foo-bar-baz` to `fooBarBaz`: a dash before a lowercase ASCII letter is
/// dropped and the letter upper-cased; other dashes stay.
fn dataset_key(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        match (c, chars.peek()) {
            ('-', Some(next)) if next.is_ascii_lowercase() => {
                out.push(next.to_ascii_uppercase());
                chars.next();
            }
            _ => out.push(c),
        }
    }
    out
}
