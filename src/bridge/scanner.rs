use tracing::{debug, warn};

use crate::dom::Document;
use crate::types::{ElementDescriptor, PageScanResult};

use super::serialize::{ROLE_BUTTON, ROLE_LINK, serialize_element};

pub const BUTTON_SELECTOR: &str =
    r#"button, [role="button"], input[type="submit"], input[type="button"]"#;
pub const FORM_CONTROL_SELECTOR: &str = "input, textarea, select";
pub const LINK_SELECTOR: &str = "a[href]";

/// Inventory of interactive elements: buttons, then form controls, then
/// links. An element matching more than one group is listed once per group.
pub fn scan<D: Document + ?Sized>(doc: &D) -> PageScanResult {
    let mut elements = Vec::new();
    collect(doc, BUTTON_SELECTOR, Some(ROLE_BUTTON), &mut elements);
    collect(doc, FORM_CONTROL_SELECTOR, None, &mut elements);
    collect(doc, LINK_SELECTOR, Some(ROLE_LINK), &mut elements);
    debug!(count = elements.len(), "page scanned");

    PageScanResult {
        url: doc.url(),
        title: doc.title(),
        elements,
    }
}

fn collect<D: Document + ?Sized>(
    doc: &D,
    selector: &str,
    role: Option<&str>,
    out: &mut Vec<ElementDescriptor>,
) {
    match doc.query_selector_all(selector) {
        Ok(nodes) => out.extend(nodes.into_iter().map(|node| serialize_element(doc, node, role))),
        Err(err) => warn!(selector, error = %err, "scan query failed"),
    }
}
