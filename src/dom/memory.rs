//! In-memory document.
//!
//! An arena DOM that holds everything the bridge reads (tree, attributes,
//! layout, computed display/visibility, form values) and records everything
//! it writes (focus, dispatched events, scroll requests). Built either from
//! HTML source or from a [`PageSnapshot`] captured out of a live page.
//!
//! Selector queries render the tree back to markup, tagging every element
//! with its node id, and run `scraper` over the result.

use std::collections::{HashMap, HashSet, VecDeque};

use scraper::Html;
use serde::{Deserialize, Serialize};

use super::css::{parse_selector, select_marked};
use super::{
    ComputedStyle, Display, Document, DomError, EventKind, NodeId, Rect, ScrollOptions,
    Viewport, Visibility, is_form_control,
};

/// Row height used by [`MemoryDocument::flow_layout`].
pub const FLOW_ROW_HEIGHT: f64 = 24.0;

/// Elements that never render a box.
const UNRENDERED_TAGS: &[&str] = &[
    "head", "script", "style", "template", "title", "meta", "link", "noscript",
];

/// Elements written without an end tag.
const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Attribute carrying the node id in rendered markup.
const NODE_MARKER: &str = "data-bridge-node";

/// Most recent events and scroll requests kept per document.
pub const ACTION_LOG_LIMIT: usize = 256;

#[derive(Debug, Clone)]
enum NodeKind {
    Element {
        tag: String,
        attrs: Vec<(String, String)>,
    },
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchedEvent {
    pub target: NodeId,
    pub kind: EventKind,
}

/// Flat, tree-ordered dump of a page: parents always precede children.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub viewport: Viewport,
    pub nodes: Vec<SnapshotNode>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotNode {
    /// Position of the parent in [`PageSnapshot::nodes`].
    pub parent: Option<usize>,
    /// Set for elements; text nodes carry `text` instead.
    pub tag: Option<String>,
    pub text: Option<String>,
    /// Index of the element in the page's `getElementsByTagName('*')`.
    pub live_index: Option<usize>,
    #[serde(default)]
    pub attrs: Vec<(String, String)>,
    #[serde(default)]
    pub rect: Rect,
    #[serde(default)]
    pub display: String,
    #[serde(default)]
    pub visibility: String,
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryDocument {
    url: String,
    title: Option<String>,
    viewport: Viewport,
    nodes: Vec<Node>,
    root: Option<NodeId>,
    rects: HashMap<NodeId, Rect>,
    styles: HashMap<NodeId, ComputedStyle>,
    values: HashMap<NodeId, String>,
    focused: Option<NodeId>,
    events: VecDeque<DispatchedEvent>,
    scrolls: VecDeque<(NodeId, ScrollOptions)>,
    namespaces: HashSet<String>,
}

impl MemoryDocument {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Parse an HTML document. No layout is computed: every box is empty
    /// until [`set_rect`](Self::set_rect) or [`flow_layout`](Self::flow_layout).
    pub fn parse_html(url: impl Into<String>, source: &str) -> Self {
        let html = scraper::Html::parse_document(source);
        let mut doc = Self::new(url);
        let mut mapped = HashMap::new();

        for node in html.tree.root().descendants() {
            let parent = node
                .parent()
                .and_then(|parent| mapped.get(&parent.id()).copied());
            match node.value() {
                scraper::Node::Element(element) => {
                    let attrs: Vec<(String, String)> = element
                        .attrs()
                        .map(|(name, value)| (name.to_ascii_lowercase(), value.to_string()))
                        .collect();
                    let id = doc.push_element(parent, element.name(), attrs);
                    mapped.insert(node.id(), id);
                }
                scraper::Node::Text(text) => {
                    if let Some(parent) = parent {
                        let content: &str = text;
                        doc.append_text(parent, content);
                    }
                }
                _ => {}
            }
        }

        let title = doc
            .elements()
            .into_iter()
            .find(|node| doc.tag_name(*node).as_deref() == Some("title"))
            .map(|title| doc.rendered_text(title));
        doc.title = title;
        doc
    }

    /// Rebuild a page captured from a live browser. Returns the document and
    /// the live element index of each element node.
    pub fn from_snapshot(snapshot: &PageSnapshot) -> (Self, HashMap<NodeId, usize>) {
        let mut doc = Self::new(snapshot.url.clone());
        doc.title = Some(snapshot.title.clone());
        doc.viewport = snapshot.viewport;
        let mut created: Vec<Option<NodeId>> = Vec::with_capacity(snapshot.nodes.len());
        let mut live = HashMap::new();

        for entry in &snapshot.nodes {
            let parent = entry.parent.and_then(|index| created.get(index).copied().flatten());
            let node = match (&entry.tag, &entry.text) {
                (Some(tag), _) => {
                    let id = doc.push_element(parent, tag, entry.attrs.clone());
                    doc.rects.insert(id, entry.rect);
                    doc.styles.insert(
                        id,
                        ComputedStyle::from_keywords(&entry.display, &entry.visibility),
                    );
                    if let Some(value) = &entry.value {
                        doc.values.insert(id, value.clone());
                    }
                    if let Some(index) = entry.live_index {
                        live.insert(id, index);
                    }
                    Some(id)
                }
                (None, Some(text)) => parent.map(|parent| doc.append_text(parent, text)),
                (None, None) => None,
            };
            created.push(node);
        }
        (doc, live)
    }

    pub fn append_text(&mut self, parent: NodeId, text: &str) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind: NodeKind::Text(text.to_string()),
            parent: Some(parent),
            children: Vec::new(),
        });
        if let Some(parent) = self.nodes.get_mut(parent.0) {
            parent.children.push(id);
        }
        id
    }

    fn push_element(
        &mut self,
        parent: Option<NodeId>,
        tag: &str,
        attrs: Vec<(String, String)>,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind: NodeKind::Element {
                tag: tag.to_ascii_lowercase(),
                attrs,
            },
            parent,
            children: Vec::new(),
        });
        match parent {
            Some(parent) => {
                if let Some(parent) = self.nodes.get_mut(parent.0) {
                    parent.children.push(id);
                }
            }
            None => {
                self.root.get_or_insert(id);
            }
        }
        id
    }

    pub fn set_rect(&mut self, node: NodeId, rect: Rect) {
        self.rects.insert(node, rect);
    }

    /// Give every rendered element a full-width row, top to bottom in tree
    /// order. Enough for offline pages to have meaningful visibility.
    pub fn flow_layout(&mut self) {
        let width = (self.viewport.width - 16.0).max(0.0);
        let mut row = 0.0;
        for node in self.elements() {
            if self.computed_style(node).display == Display::None {
                self.rects.remove(&node);
                continue;
            }
            let rect = Rect::new(8.0, row * FLOW_ROW_HEIGHT, width, FLOW_ROW_HEIGHT - 4.0);
            self.rects.insert(node, rect);
            row += 1.0;
        }
    }

    pub fn focused(&self) -> Option<NodeId> {
        self.focused
    }

    /// The last [`ACTION_LOG_LIMIT`] dispatched events, oldest first.
    pub fn events(&self) -> &VecDeque<DispatchedEvent> {
        &self.events
    }

    pub fn events_for(&self, node: NodeId) -> Vec<EventKind> {
        self.events
            .iter()
            .filter(|event| event.target == node)
            .map(|event| event.kind)
            .collect()
    }

    pub fn scrolls(&self) -> &VecDeque<(NodeId, ScrollOptions)> {
        &self.scrolls
    }

    /// The tree as HTML, every element tagged with [`NODE_MARKER`].
    fn marked_markup(&self) -> String {
        let mut out = String::from("<!DOCTYPE html>");
        if let Some(root) = self.root {
            self.write_markup(root, &mut out);
        }
        out
    }

    fn write_markup(&self, node: NodeId, out: &mut String) {
        let Some(entry) = self.nodes.get(node.0) else {
            return;
        };
        let (tag, attrs) = match &entry.kind {
            NodeKind::Text(text) => {
                out.push_str(&escape_markup(text));
                return;
            }
            NodeKind::Element { tag, attrs } => (tag, attrs),
        };
        out.push('<');
        out.push_str(tag);
        for (name, value) in attrs {
            if name == NODE_MARKER || !is_markup_name(name) {
                continue;
            }
            out.push_str(&format!(" {name}=\"{}\"", escape_markup(value)));
        }
        out.push_str(&format!(" {NODE_MARKER}=\"{}\">", node.0));
        if VOID_TAGS.contains(&tag.as_str()) {
            return;
        }
        for child in &entry.children {
            self.write_markup(*child, out);
        }
        out.push_str(&format!("</{tag}>"));
    }

    fn element(&self, node: NodeId) -> Option<(&str, &[(String, String)])> {
        match &self.nodes.get(node.0)?.kind {
            NodeKind::Element { tag, attrs } => Some((tag.as_str(), attrs.as_slice())),
            NodeKind::Text(_) => None,
        }
    }

    fn require_element(&self, node: NodeId) -> Result<&str, DomError> {
        self.element(node)
            .map(|(tag, _)| tag)
            .ok_or(DomError::NotAnElement(node))
    }

    /// Display/visibility this element declares itself, before inheritance.
    fn declared_style(&self, node: NodeId) -> (Option<Display>, Option<Visibility>) {
        let Some((tag, attrs)) = self.element(node) else {
            return (None, None);
        };
        let mut display = None;
        let mut visibility = None;
        if UNRENDERED_TAGS.contains(&tag) || attrs.iter().any(|(name, _)| name == "hidden") {
            display = Some(Display::None);
        }
        let inline = attrs
            .iter()
            .find_map(|(name, value)| (name == "style").then_some(value.as_str()))
            .unwrap_or_default();
        for declaration in inline.split(';') {
            let Some((property, value)) = declaration.split_once(':') else {
                continue;
            };
            let value = value
                .trim()
                .trim_end_matches("!important")
                .trim()
                .to_ascii_lowercase();
            match property.trim().to_ascii_lowercase().as_str() {
                "display" => {
                    display = Some(if value == "none" {
                        Display::None
                    } else {
                        Display::Shown
                    })
                }
                "visibility" => {
                    visibility = Some(if value == "hidden" || value == "collapse" {
                        Visibility::Hidden
                    } else {
                        Visibility::Visible
                    })
                }
                _ => {}
            }
        }
        (display, visibility)
    }

    fn default_value(&self, node: NodeId, tag: &str) -> String {
        match tag {
            "textarea" => self.text_content(node),
            "select" => {
                let options = self.options(node);
                options
                    .iter()
                    .find(|option| self.has_attribute(option.node, "selected"))
                    .or_else(|| options.first())
                    .map(|option| option.value.clone())
                    .unwrap_or_default()
            }
            _ => self.attribute(node, "value").unwrap_or_default(),
        }
    }
}

impl Document for MemoryDocument {
    fn url(&self) -> String {
        self.url.clone()
    }

    fn title(&self) -> String {
        self.title.clone().unwrap_or_default()
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn document_element(&self) -> Option<NodeId> {
        self.root
    }

    fn is_element(&self, node: NodeId) -> bool {
        self.element(node).is_some()
    }

    fn tag_name(&self, node: NodeId) -> Option<String> {
        self.element(node).map(|(tag, _)| tag.to_string())
    }

    fn attributes(&self, node: NodeId) -> Vec<(String, String)> {
        self.element(node)
            .map(|(_, attrs)| attrs.to_vec())
            .unwrap_or_default()
    }

    fn parent_element(&self, node: NodeId) -> Option<NodeId> {
        self.nodes
            .get(node.0)?
            .parent
            .filter(|parent| self.is_element(*parent))
    }

    fn child_nodes(&self, node: NodeId) -> Vec<NodeId> {
        self.nodes
            .get(node.0)
            .map(|node| node.children.clone())
            .unwrap_or_default()
    }

    fn node_text(&self, node: NodeId) -> Option<String> {
        match &self.nodes.get(node.0)?.kind {
            NodeKind::Text(text) => Some(text.clone()),
            NodeKind::Element { .. } => None,
        }
    }

    fn computed_style(&self, node: NodeId) -> ComputedStyle {
        if let Some(style) = self.styles.get(&node) {
            return *style;
        }
        let mut style = ComputedStyle::default();
        let mut visibility = None;
        let mut current = Some(node);
        while let Some(element) = current {
            let (display, declared_visibility) = self.declared_style(element);
            if display == Some(Display::None) {
                style.display = Display::None;
            }
            if visibility.is_none() {
                visibility = declared_visibility;
            }
            current = self.parent_element(element);
        }
        style.visibility = visibility.unwrap_or_default();
        style
    }

    fn bounding_client_rect(&self, node: NodeId) -> Rect {
        self.rects.get(&node).copied().unwrap_or_default()
    }

    fn value(&self, node: NodeId) -> Option<String> {
        let (tag, _) = self.element(node)?;
        if !is_form_control(tag) {
            return None;
        }
        Some(
            self.values
                .get(&node)
                .cloned()
                .unwrap_or_else(|| self.default_value(node, tag)),
        )
    }

    fn focus(&mut self, node: NodeId) -> Result<(), DomError> {
        self.require_element(node)?;
        self.focused = Some(node);
        Ok(())
    }

    fn set_value(&mut self, node: NodeId, value: &str) -> Result<(), DomError> {
        let stored = if self.require_element(node)? == "select" {
            // A select only takes values one of its options carries.
            self.options(node)
                .into_iter()
                .find(|option| option.value == value)
                .map(|option| option.value)
                .unwrap_or_default()
        } else {
            value.to_string()
        };
        self.values.insert(node, stored);
        Ok(())
    }

    fn dispatch_event(&mut self, node: NodeId, kind: EventKind) -> Result<(), DomError> {
        self.require_element(node)?;
        record(&mut self.events, DispatchedEvent { target: node, kind });
        Ok(())
    }

    fn scroll_into_view(&mut self, node: NodeId, options: ScrollOptions) -> Result<(), DomError> {
        self.require_element(node)?;
        record(&mut self.scrolls, (node, options));
        Ok(())
    }

    fn click(&mut self, node: NodeId) -> Result<(), DomError> {
        self.dispatch_event(node, EventKind::Click)
    }

    fn claim_namespace(&mut self, name: &str) -> Result<bool, DomError> {
        Ok(self.namespaces.insert(name.to_string()))
    }

    fn query_selector_all(&self, selector: &str) -> Result<Vec<NodeId>, DomError> {
        let selector = parse_selector(selector)?;
        let html = Html::parse_document(&self.marked_markup());
        Ok(select_marked(&html, &selector, NODE_MARKER))
    }
}

fn record<T>(log: &mut VecDeque<T>, entry: T) {
    if log.len() >= ACTION_LOG_LIMIT {
        log.pop_front();
    }
    log.push_back(entry);
}

fn escape_markup(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn is_markup_name(name: &str) -> bool {
    !name.is_empty()
        && !name
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '>' | '/' | '=' | '<'))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!doctype html>
        <html><head><title> Shop </title></head>
        <body>
          <div style="display: none"><span id="inner">x</span></div>
          <section style="visibility:hidden"><p id="ghost">boo</p><p id="shown" style="visibility: visible">hi</p></section>
          <input id="q" value="preset">
          <textarea id="t">notes</textarea>
          <select id="s"><option value="a">A</option><optgroup><option selected>B</option></optgroup></select>
          <button hidden id="h">Hidden</button>
        </body></html>"#;

    #[test]
    fn parses_tree_and_title() {
        let doc = MemoryDocument::parse_html("https://shop.test/", PAGE);
        assert_eq!(doc.title(), "Shop");
        let root = doc.document_element().unwrap();
        assert_eq!(doc.tag_name(root).as_deref(), Some("html"));
        let inner = doc.element_by_id("inner").unwrap();
        assert_eq!(doc.rendered_text(inner), "x");
    }

    #[test]
    fn computes_inherited_styles() {
        let doc = MemoryDocument::parse_html("https://shop.test/", PAGE);
        let style = |id: &str| doc.computed_style(doc.element_by_id(id).unwrap());
        assert_eq!(style("inner").display, Display::None);
        assert_eq!(style("ghost").visibility, Visibility::Hidden);
        assert_eq!(style("shown").visibility, Visibility::Visible);
        assert_eq!(style("h").display, Display::None);
        assert_eq!(style("q"), ComputedStyle::default());
    }

    #[test]
    fn form_values_default_from_markup() {
        let doc = MemoryDocument::parse_html("https://shop.test/", PAGE);
        let value = |id: &str| doc.value(doc.element_by_id(id).unwrap());
        assert_eq!(value("q").as_deref(), Some("preset"));
        assert_eq!(value("t").as_deref(), Some("notes"));
        assert_eq!(value("s").as_deref(), Some("B"));
        assert_eq!(value("inner"), None);
    }

    #[test]
    fn select_rejects_values_without_an_option() {
        let mut doc = MemoryDocument::parse_html("https://shop.test/", PAGE);
        let select = doc.element_by_id("s").unwrap();
        doc.set_value(select, "a").unwrap();
        assert_eq!(doc.value(select).as_deref(), Some("a"));
        doc.set_value(select, "zzz").unwrap();
        assert_eq!(doc.value(select).as_deref(), Some(""));
    }

    #[test]
    fn flow_layout_skips_unrendered_elements() {
        let mut doc = MemoryDocument::parse_html("https://shop.test/", PAGE);
        doc.flow_layout();
        let q = doc.element_by_id("q").unwrap();
        let inner = doc.element_by_id("inner").unwrap();
        assert!(doc.bounding_client_rect(q).height > 0.0);
        assert_eq!(doc.bounding_client_rect(inner), Rect::default());
    }

    #[test]
    fn rebuilds_snapshots_with_live_indices() {
        let snapshot = PageSnapshot {
            url: "https://live.test/".into(),
            title: "Live".into(),
            viewport: Viewport::default(),
            nodes: vec![
                SnapshotNode {
                    tag: Some("html".into()),
                    live_index: Some(0),
                    ..Default::default()
                },
                SnapshotNode {
                    parent: Some(0),
                    tag: Some("input".into()),
                    live_index: Some(1),
                    attrs: vec![("id".into(), "q".into())],
                    rect: Rect::new(0.0, 0.0, 10.0, 10.0),
                    display: "inline-block".into(),
                    visibility: "visible".into(),
                    value: Some("typed".into()),
                    ..Default::default()
                },
                SnapshotNode {
                    parent: Some(0),
                    text: Some("tail".into()),
                    ..Default::default()
                },
            ],
        };
        let (doc, live) = MemoryDocument::from_snapshot(&snapshot);
        let q = doc.element_by_id("q").unwrap();
        assert_eq!(live.get(&q), Some(&1));
        assert_eq!(doc.value(q).as_deref(), Some("typed"));
        assert_eq!(doc.title(), "Live");
        assert_eq!(doc.bounding_client_rect(q).width, 10.0);
        let root = doc.document_element().unwrap();
        assert_eq!(doc.text_content(root), "tail");
    }

    fn texts(doc: &MemoryDocument, selector: &str) -> Vec<String> {
        doc.query_selector_all(selector)
            .unwrap()
            .into_iter()
            .map(|n| doc.rendered_text(n))
            .collect()
    }

    #[test]
    fn selector_queries_cover_full_css() {
        let doc = MemoryDocument::parse_html(
            "https://shop.test/",
            r#"<div id="main" class="panel wide">
                 <ul><li><button id="ok">OK</button></li><li><button class="x">No</button></li></ul>
                 <p>one</p><p data-x="1">two &amp; more</p>
                 <input name="query" type="text"><input name="other">
               </div>
               <p class="panel">three</p>"#,
        );
        assert_eq!(texts(&doc, "p"), vec!["one", "two & more", "three"]);
        assert_eq!(texts(&doc, "div > p:nth-of-type(2)"), vec!["two & more"]);
        assert_eq!(texts(&doc, "li:first-child > button"), vec!["OK"]);
        assert_eq!(texts(&doc, "li + li button"), vec!["No"]);
        assert_eq!(texts(&doc, "button:not(.x)"), vec!["OK"]);
        assert_eq!(texts(&doc, "ul ~ p[data-x]"), vec!["two & more"]);
        let inputs = doc.query_selector_all(r#"input[name^="q"]"#).unwrap();
        assert_eq!(inputs.len(), 1);
        assert_eq!(doc.attribute(inputs[0], "name").as_deref(), Some("query"));
    }

    #[test]
    fn selector_lists_keep_document_order() {
        let doc = MemoryDocument::parse_html(
            "https://shop.test/",
            r#"<input name="q"><input type="submit">"#,
        );
        let nodes = doc
            .query_selector_all("input[type=submit], input[name='q']")
            .unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(doc.attribute(nodes[0], "name").as_deref(), Some("q"));
    }

    #[test]
    fn invalid_selectors_are_syntax_errors() {
        let doc = MemoryDocument::parse_html("https://shop.test/", PAGE);
        for bad in ["", "div >", "[data-x", "#", "p,,p"] {
            let err = doc.query_selector_all(bad).unwrap_err();
            assert!(matches!(err, DomError::InvalidSelector { .. }), "{bad}");
        }
    }

    #[test]
    fn snapshot_documents_answer_queries() {
        let snapshot = PageSnapshot {
            url: "https://live.test/".into(),
            nodes: vec![
                SnapshotNode {
                    tag: Some("html".into()),
                    ..Default::default()
                },
                SnapshotNode {
                    parent: Some(0),
                    tag: Some("body".into()),
                    ..Default::default()
                },
                SnapshotNode {
                    parent: Some(1),
                    tag: Some("a".into()),
                    attrs: vec![("href".into(), "/x?a=1&b=\"2\"".into())],
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        let (doc, _) = MemoryDocument::from_snapshot(&snapshot);
        let links = doc.query_selector_all("body > a[href]").unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(doc.tag_name(links[0]).as_deref(), Some("a"));
    }

    #[test]
    fn rendered_text_skips_hidden_children() {
        let doc = MemoryDocument::parse_html(
            "https://shop.test/",
            r#"<p id="p">Total:
                 <span hidden>secret</span>
                 <b>42</b></p>"#,
        );
        let p = doc.element_by_id("p").unwrap();
        assert_eq!(doc.rendered_text(p), "Total: 42");
        assert!(doc.text_content(p).contains("secret"));
    }

    #[test]
    fn action_log_is_bounded() {
        let mut doc = MemoryDocument::parse_html("https://shop.test/", PAGE);
        let q = doc.element_by_id("q").unwrap();
        for _ in 0..ACTION_LOG_LIMIT + 10 {
            doc.click(q).unwrap();
            doc.scroll_into_view(q, ScrollOptions::default()).unwrap();
        }
        assert_eq!(doc.events().len(), ACTION_LOG_LIMIT);
        assert_eq!(doc.scrolls().len(), ACTION_LOG_LIMIT);
    }

    #[test]
    fn namespace_claim_is_one_shot() {
        let mut doc = MemoryDocument::new("about:blank");
        assert!(doc.claim_namespace("__bridge").unwrap());
        assert!(!doc.claim_namespace("__bridge").unwrap());
    }
}
