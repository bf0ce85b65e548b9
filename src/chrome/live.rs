use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result, anyhow};
use headless_chrome::Tab;
use serde::Deserialize;
use tracing::debug;

use crate::dom::memory::PageSnapshot;
use crate::dom::{
    ComputedStyle, Document, DomError, EventKind, MemoryDocument, NodeId, Rect, ScrollOptions,
    Viewport,
};

/// Global the capture keeps its element list under, next to the token
/// that identifies the capture.
const CAPTURE_KEY: &str = "__domBridgeCapture";

/// Function evaluated in the page, with the capture token as argument, to
/// dump it as a [`PageSnapshot`].
///
/// Nodes are emitted in tree order (parents first). Every element is
/// remembered in `window[CAPTURE_KEY].nodes`, and its position there is the
/// `liveIndex` later writes and queries go through.
const CAPTURE_JS: &str = r#"
(token) => {
  const all = Array.from(document.getElementsByTagName('*'));
  window.__domBridgeCapture = { token, nodes: all };
  const liveIndex = new Map(all.map((el, i) => [el, i]));
  const nodes = [];
  const stack = [[document.documentElement, null]];
  while (stack.length) {
    const [node, parent] = stack.pop();
    if (!node) continue;
    if (node.nodeType === Node.TEXT_NODE) {
      nodes.push({ parent, text: node.nodeValue });
      continue;
    }
    if (node.nodeType !== Node.ELEMENT_NODE) continue;
    const rect = node.getBoundingClientRect();
    const style = getComputedStyle(node);
    const control = ['INPUT', 'TEXTAREA', 'SELECT'].includes(node.tagName);
    const index = nodes.push({
      parent,
      tag: node.tagName.toLowerCase(),
      liveIndex: liveIndex.get(node),
      attrs: Array.from(node.attributes, (a) => [a.name.toLowerCase(), a.value]),
      rect: { x: rect.x, y: rect.y, width: rect.width, height: rect.height },
      display: style.display,
      visibility: style.visibility,
      value: control ? String(node.value) : null,
    }) - 1;
    const children = Array.from(node.childNodes);
    for (let i = children.length - 1; i >= 0; i--) stack.push([children[i], index]);
  }
  return JSON.stringify({
    url: location.href,
    title: document.title,
    viewport: { width: innerWidth, height: innerHeight },
    nodes,
  });
}
"#;

/// Message a page returns when its capture was replaced or lost.
const STALE_CAPTURE: &str = "The page changed since it was captured";

static CAPTURES: AtomicU64 = AtomicU64::new(0);

/// Reply of an in-page `querySelectorAll`.
#[derive(Debug, Deserialize)]
struct QueryReply {
    #[serde(default)]
    found: Vec<usize>,
    error: Option<String>,
    #[serde(default)]
    syntax: bool,
}

/// A live tab seen through one snapshot. Reads come from the snapshot taken
/// at capture time; selector queries run in the page; writes go to the
/// captured live element and are mirrored into the snapshot. Capture a new
/// one for every request.
pub struct LiveDocument {
    tab: Arc<Tab>,
    token: String,
    snapshot: MemoryDocument,
    live: HashMap<NodeId, usize>,
    nodes: HashMap<usize, NodeId>,
}

impl LiveDocument {
    pub fn capture(tab: Arc<Tab>) -> Result<Self> {
        let token = format!(
            "{}-{}",
            chrono::Utc::now().timestamp_millis(),
            CAPTURES.fetch_add(1, Ordering::Relaxed)
        );
        let script = format!("({CAPTURE_JS})({})", serde_json::to_string(&token)?);
        let result = tab.evaluate(&script, false)?;
        let raw = result
            .value
            .and_then(|v| v.as_str().map(String::from))
            .ok_or_else(|| anyhow!("page capture returned nothing"))?;
        let snapshot: PageSnapshot =
            serde_json::from_str(&raw).context("page capture is not a valid snapshot")?;
        debug!(url = %snapshot.url, nodes = snapshot.nodes.len(), %token, "page captured");

        let (snapshot, live) = MemoryDocument::from_snapshot(&snapshot);
        let nodes = live.iter().map(|(node, index)| (*index, *node)).collect();
        Ok(Self {
            tab,
            token,
            snapshot,
            live,
            nodes,
        })
    }

    /// JS expression yielding this capture's element list, or `null` once
    /// the page no longer holds it.
    fn captured_nodes(&self) -> Result<String, DomError> {
        let token = serde_json::to_string(&self.token).map_err(|e| DomError::Script(e.to_string()))?;
        Ok(format!(
            "((c) => (c && c.token === {token} ? c.nodes : null))(window.{CAPTURE_KEY})"
        ))
    }

    /// Run `body` against the captured element behind `node`, bound to
    /// `el`. A replaced capture, a detached element and any exception come
    /// back as errors, so a write never lands on another element.
    fn run(&self, node: NodeId, body: &str) -> Result<(), DomError> {
        let index = self.live.get(&node).ok_or(DomError::Detached)?;
        let nodes = self.captured_nodes()?;
        let script = format!(
            "(() => {{ try {{ const nodes = {nodes}; \
             if (!nodes) return '{STALE_CAPTURE}'; \
             const el = nodes[{index}]; \
             if (!el || !el.isConnected) return 'Element is no longer attached to the document'; \
             {body} return ''; }} catch (e) {{ return String((e && e.message) || e); }} }})()"
        );
        match self.evaluate_str(&script)?.as_deref() {
            Some("") | None => Ok(()),
            Some(message) => Err(DomError::Script(message.to_string())),
        }
    }

    fn evaluate_str(&self, script: &str) -> Result<Option<String>, DomError> {
        let result = self
            .tab
            .evaluate(script, false)
            .map_err(|e| DomError::Script(format!("{e:#}")))?;
        Ok(result.value.and_then(|v| v.as_str().map(String::from)))
    }
}

impl Document for LiveDocument {
    fn url(&self) -> String {
        self.snapshot.url()
    }

    fn title(&self) -> String {
        self.snapshot.title()
    }

    fn viewport(&self) -> Viewport {
        self.snapshot.viewport()
    }

    fn document_element(&self) -> Option<NodeId> {
        self.snapshot.document_element()
    }

    fn is_element(&self, node: NodeId) -> bool {
        self.snapshot.is_element(node)
    }

    fn tag_name(&self, node: NodeId) -> Option<String> {
        self.snapshot.tag_name(node)
    }

    fn attributes(&self, node: NodeId) -> Vec<(String, String)> {
        self.snapshot.attributes(node)
    }

    fn parent_element(&self, node: NodeId) -> Option<NodeId> {
        self.snapshot.parent_element(node)
    }

    fn child_nodes(&self, node: NodeId) -> Vec<NodeId> {
        self.snapshot.child_nodes(node)
    }

    fn node_text(&self, node: NodeId) -> Option<String> {
        self.snapshot.node_text(node)
    }

    fn computed_style(&self, node: NodeId) -> ComputedStyle {
        self.snapshot.computed_style(node)
    }

    fn bounding_client_rect(&self, node: NodeId) -> Rect {
        self.snapshot.bounding_client_rect(node)
    }

    fn value(&self, node: NodeId) -> Option<String> {
        self.snapshot.value(node)
    }

    fn focus(&mut self, node: NodeId) -> Result<(), DomError> {
        self.run(node, "el.focus();")?;
        self.snapshot.focus(node)
    }

    fn set_value(&mut self, node: NodeId, value: &str) -> Result<(), DomError> {
        let literal =
            serde_json::to_string(value).map_err(|e| DomError::Script(e.to_string()))?;
        self.run(node, &format!("el.value = {literal};"))?;
        self.snapshot.set_value(node, value)
    }

    fn dispatch_event(&mut self, node: NodeId, event: EventKind) -> Result<(), DomError> {
        self.run(
            node,
            &format!("el.dispatchEvent(new Event('{event}', {{ bubbles: true }}));"),
        )?;
        self.snapshot.dispatch_event(node, event)
    }

    fn scroll_into_view(&mut self, node: NodeId, options: ScrollOptions) -> Result<(), DomError> {
        self.run(
            node,
            &format!(
                "el.scrollIntoView({{ behavior: '{}', block: '{}' }});",
                options.behavior.as_ref(),
                options.block.as_ref()
            ),
        )?;
        self.snapshot.scroll_into_view(node, options)
    }

    fn click(&mut self, node: NodeId) -> Result<(), DomError> {
        self.run(node, "el.click();")?;
        self.snapshot.click(node)
    }

    fn claim_namespace(&mut self, name: &str) -> Result<bool, DomError> {
        let key = serde_json::to_string(name).map_err(|e| DomError::Script(e.to_string()))?;
        let script = format!(
            "(() => {{ if (window[{key}]) return false; \
             window[{key}] = {{ installedAt: Date.now() }}; return true; }})()"
        );
        let result = self
            .tab
            .evaluate(&script, false)
            .map_err(|e| DomError::Script(format!("{e:#}")))?;
        let claimed = result.value.and_then(|v| v.as_bool()).unwrap_or(false);
        self.snapshot.claim_namespace(name)?;
        Ok(claimed)
    }

    fn query_selector_all(&self, selector: &str) -> Result<Vec<NodeId>, DomError> {
        let literal =
            serde_json::to_string(selector).map_err(|e| DomError::Script(e.to_string()))?;
        let nodes = self.captured_nodes()?;
        let script = format!(
            "(() => {{ try {{ const nodes = {nodes}; \
             if (!nodes) return JSON.stringify({{ error: '{STALE_CAPTURE}' }}); \
             const index = new Map(nodes.map((el, i) => [el, i])); \
             const found = []; \
             for (const el of document.querySelectorAll({literal})) {{ \
               const i = index.get(el); if (i !== undefined) found.push(i); }} \
             return JSON.stringify({{ found }}); \
             }} catch (e) {{ return JSON.stringify({{ syntax: !!e && e.name === 'SyntaxError', \
               error: String((e && e.message) || e) }}); }} }})()"
        );
        let raw = self
            .evaluate_str(&script)?
            .ok_or_else(|| DomError::Script("selector query returned nothing".to_string()))?;
        let reply: QueryReply =
            serde_json::from_str(&raw).map_err(|e| DomError::Script(e.to_string()))?;
        match reply.error {
            Some(reason) if reply.syntax => Err(DomError::invalid_selector(selector, reason)),
            Some(reason) => Err(DomError::Script(reason)),
            None => Ok(reply
                .found
                .into_iter()
                .filter_map(|index| self.nodes.get(&index).copied())
                .collect()),
        }
    }
}
