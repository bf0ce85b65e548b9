//! The page as seen by the bridge.
//!
//! Everything the inspection and action code needs from a document is
//! expressed by the [`Document`] trait: a handful of primitive reads, the
//! few mutations an action performs, and provided helpers (text, ordering,
//! selector queries) built on top of them. Implementations only supply the
//! primitives.

pub mod css;
pub mod memory;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use memory::MemoryDocument;

/// Handle to a node inside one document. Handles are only meaningful for
/// the document that produced them and are never serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// Bounding client rectangle in CSS pixels, relative to the viewport.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280.0,
            height: 720.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Display {
    #[default]
    Shown,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Visible,
    Hidden,
}

/// The two computed style properties visibility depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ComputedStyle {
    pub display: Display,
    pub visibility: Visibility,
}

impl ComputedStyle {
    /// Build from CSS keyword values as reported by `getComputedStyle`.
    pub fn from_keywords(display: &str, visibility: &str) -> Self {
        Self {
            display: if display.trim().eq_ignore_ascii_case("none") {
                Display::None
            } else {
                Display::Shown
            },
            visibility: if visibility.trim().eq_ignore_ascii_case("hidden") {
                Visibility::Hidden
            } else {
                Visibility::Visible
            },
        }
    }
}

/// Synthetic events the action dispatcher emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum EventKind {
    Input,
    Change,
    Click,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum ScrollBehavior {
    Auto,
    #[default]
    Smooth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum ScrollBlock {
    Start,
    #[default]
    Center,
    End,
    Nearest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScrollOptions {
    pub behavior: ScrollBehavior,
    pub block: ScrollBlock,
}

/// One `<option>` of a select control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectOption {
    pub node: NodeId,
    pub value: String,
    pub text: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomError {
    #[error("SyntaxError: '{selector}' is not a valid selector: {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("Node {0:?} is not an element")]
    NotAnElement(NodeId),

    #[error("Element is no longer attached to the document")]
    Detached,

    #[error("{0}")]
    Script(String),
}

impl DomError {
    pub(crate) fn invalid_selector(selector: &str, reason: impl Into<String>) -> Self {
        Self::InvalidSelector {
            selector: selector.to_string(),
            reason: reason.into(),
        }
    }
}

pub trait Document {
    fn url(&self) -> String;

    fn title(&self) -> String;

    fn viewport(&self) -> Viewport;

    /// The root `<html>` element, if the document has one.
    fn document_element(&self) -> Option<NodeId>;

    fn is_element(&self, node: NodeId) -> bool;

    /// Lower-cased tag name, `None` for non-element nodes.
    fn tag_name(&self, node: NodeId) -> Option<String>;

    /// Attributes in source order with lower-cased names.
    fn attributes(&self, node: NodeId) -> Vec<(String, String)>;

    fn parent_element(&self, node: NodeId) -> Option<NodeId>;

    fn child_nodes(&self, node: NodeId) -> Vec<NodeId>;

    /// Character data of a text node, `None` for elements.
    fn node_text(&self, node: NodeId) -> Option<String>;

    fn computed_style(&self, node: NodeId) -> ComputedStyle;

    fn bounding_client_rect(&self, node: NodeId) -> Rect;

    /// The `value` property of a form control; `None` for other elements.
    fn value(&self, node: NodeId) -> Option<String>;

    fn focus(&mut self, node: NodeId) -> Result<(), DomError>;

    fn set_value(&mut self, node: NodeId, value: &str) -> Result<(), DomError>;

    fn dispatch_event(&mut self, node: NodeId, event: EventKind) -> Result<(), DomError>;

    fn scroll_into_view(&mut self, node: NodeId, options: ScrollOptions) -> Result<(), DomError>;

    fn click(&mut self, node: NodeId) -> Result<(), DomError>;

    /// Mark `name` as taken in the page's global scope. Returns `false` when
    /// it was already claimed by an earlier injection.
    fn claim_namespace(&mut self, name: &str) -> Result<bool, DomError>;

    /// Elements matching a CSS selector list, in document order. Invalid
    /// selectors fail with [`DomError::InvalidSelector`].
    fn query_selector_all(&self, selector: &str) -> Result<Vec<NodeId>, DomError>;

    fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        let name = name.to_ascii_lowercase();
        self.attributes(node)
            .into_iter()
            .find_map(|(key, value)| (key == name).then_some(value))
    }

    fn has_attribute(&self, node: NodeId, name: &str) -> bool {
        self.attribute(node, name).is_some()
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.child_nodes(node)
            .into_iter()
            .filter(|child| self.is_element(*child))
            .collect()
    }

    /// Concatenated character data of all descendant text nodes.
    fn text_content(&self, node: NodeId) -> String {
        if let Some(text) = self.node_text(node) {
            return text;
        }
        let mut out = String::new();
        let mut stack = self.child_nodes(node);
        stack.reverse();
        while let Some(current) = stack.pop() {
            if let Some(text) = self.node_text(current) {
                out.push_str(&text);
            } else {
                let mut children = self.child_nodes(current);
                children.reverse();
                stack.extend(children);
            }
        }
        out
    }

    /// Text as a user would read it: subtrees that are not rendered are
    /// skipped, whitespace runs collapsed, trimmed. An element that is itself
    /// not rendered reads as its whole text content.
    fn rendered_text(&self, node: NodeId) -> String {
        let raw = if self.is_element(node) && self.computed_style(node).display != Display::None
        {
            let mut out = String::new();
            let mut stack = self.child_nodes(node);
            stack.reverse();
            while let Some(current) = stack.pop() {
                if let Some(text) = self.node_text(current) {
                    out.push_str(&text);
                } else if self.computed_style(current).display != Display::None {
                    let mut children = self.child_nodes(current);
                    children.reverse();
                    stack.extend(children);
                }
            }
            out
        } else {
            self.text_content(node)
        };
        raw.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Every element of the document in tree order.
    fn elements(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        let Some(root) = self.document_element() else {
            return out;
        };
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            out.push(node);
            let mut children = self.children(node);
            children.reverse();
            stack.extend(children);
        }
        out
    }

    fn ancestors(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut current = self.parent_element(node);
        while let Some(parent) = current {
            out.push(parent);
            current = self.parent_element(parent);
        }
        out
    }

    fn element_by_id(&self, id: &str) -> Option<NodeId> {
        if id.is_empty() {
            return None;
        }
        self.elements()
            .into_iter()
            .find(|node| self.attribute(*node, "id").as_deref() == Some(id))
    }

    fn query_selector(&self, selector: &str) -> Result<Option<NodeId>, DomError> {
        Ok(self.query_selector_all(selector)?.into_iter().next())
    }

    /// `<option>` descendants of a select control, in order.
    fn options(&self, node: NodeId) -> Vec<SelectOption> {
        let mut out = Vec::new();
        let mut stack = self.children(node);
        stack.reverse();
        while let Some(current) = stack.pop() {
            match self.tag_name(current).as_deref() {
                Some("option") => {
                    let text = self.rendered_text(current);
                    let value = self
                        .attribute(current, "value")
                        .unwrap_or_else(|| text.clone());
                    out.push(SelectOption {
                        node: current,
                        value,
                        text,
                    });
                }
                Some("optgroup") => {
                    let mut children = self.children(current);
                    children.reverse();
                    stack.extend(children);
                }
                _ => {}
            }
        }
        out
    }
}

/// Tags whose `value` property is a user-editable form value.
pub fn is_form_control(tag: &str) -> bool {
    matches!(tag, "input" | "textarea" | "select")
}
