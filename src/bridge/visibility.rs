use crate::dom::{Display, Document, NodeId, Visibility};

/// Whether a user could see `node` right now: rendered, with a non-empty
/// box that overlaps the viewport at least partially.
pub fn is_visible<D: Document + ?Sized>(doc: &D, node: NodeId) -> bool {
    if !doc.is_element(node) {
        return false;
    }
    let style = doc.computed_style(node);
    if style.visibility == Visibility::Hidden || style.display == Display::None {
        return false;
    }
    let rect = doc.bounding_client_rect(node);
    if rect.width <= 0.0 || rect.height <= 0.0 {
        return false;
    }
    let viewport = doc.viewport();
    rect.bottom() > 0.0
        && rect.right() > 0.0
        && rect.y < viewport.height
        && rect.x < viewport.width
}
