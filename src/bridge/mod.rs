//! The bridge proper: inspection, resolution and actions over a
//! [`Document`].

pub mod actions;
pub mod label;
pub mod resolver;
pub mod scanner;
pub mod selector;
pub mod serialize;
pub mod state;
pub mod visibility;

use tracing::{debug, info};

use crate::dom::{Document, DomError};
use crate::types::{ActionKind, ActionRequest, ActionResult, PageScanResult, PageState};

pub use actions::{ActionDefaults, ActionError};

/// Global name the bridge claims in the page on injection.
pub const NAMESPACE: &str = "__domBridge";

/// A bridge bound to one document. Owns the document for its lifetime;
/// every call reads the document afresh.
#[derive(Debug)]
pub struct Bridge<D> {
    doc: D,
    defaults: ActionDefaults,
    fresh: bool,
}

impl<D: Document> Bridge<D> {
    /// Bind to `doc`. If an earlier injection already claimed the page the
    /// claim is left alone and this bridge simply reuses it.
    pub fn inject(mut doc: D, defaults: ActionDefaults) -> Result<Self, DomError> {
        let fresh = doc.claim_namespace(NAMESPACE)?;
        if fresh {
            info!(url = %doc.url(), "bridge injected");
        } else {
            debug!(url = %doc.url(), "bridge already present, reusing");
        }
        Ok(Self {
            doc,
            defaults,
            fresh,
        })
    }

    /// Whether this bridge performed the page's first injection.
    pub fn is_fresh(&self) -> bool {
        self.fresh
    }

    pub fn scan(&self) -> PageScanResult {
        scanner::scan(&self.doc)
    }

    pub fn get_state(&self) -> PageState {
        state::read_state(&self.doc)
    }

    pub async fn perform(&mut self, request: &ActionRequest) -> ActionResult {
        actions::perform(&mut self.doc, request, &self.defaults).await
    }

    /// Perform `requests` one after another, pausing after each
    /// click/fill/select so the page can react.
    pub async fn perform_many(&mut self, requests: &[ActionRequest]) -> Vec<ActionResult> {
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            results.push(self.perform(request).await);
            if pauses_after(request) && !self.defaults.step_pause.is_zero() {
                tokio::time::sleep(self.defaults.step_pause).await;
            }
        }
        results
    }

    pub fn document(&self) -> &D {
        &self.doc
    }

    pub fn document_mut(&mut self) -> &mut D {
        &mut self.doc
    }

    pub fn into_document(self) -> D {
        self.doc
    }
}

/// Whether a batch pauses after `request`: only clicks, fills and selects do.
pub fn pauses_after(request: &ActionRequest) -> bool {
    request.kind.as_deref().is_some_and(|kind| {
        matches!(
            kind.parse::<ActionKind>(),
            Ok(ActionKind::Click | ActionKind::Fill | ActionKind::Select)
        )
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::dom::MemoryDocument;
    use crate::types::ElementTarget;

    fn page() -> MemoryDocument {
        MemoryDocument::parse_html(
            "https://example.test/",
            r#"<html><body><input id="q"><button>Go</button></body></html>"#,
        )
    }

    #[test]
    fn second_injection_reuses_the_page() {
        let first = Bridge::inject(page(), ActionDefaults::default()).unwrap();
        assert!(first.is_fresh());
        let again = Bridge::inject(first.into_document(), ActionDefaults::default()).unwrap();
        assert!(!again.is_fresh());
        assert_eq!(again.scan().elements.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn perform_many_pauses_after_interactions() {
        let defaults = ActionDefaults {
            wait: Duration::from_millis(1000),
            step_pause: Duration::from_millis(200),
        };
        let mut bridge = Bridge::inject(page(), defaults).unwrap();
        let started = tokio::time::Instant::now();
        let results = bridge
            .perform_many(&[
                ActionRequest::fill(ElementTarget::by_id("q"), "abc"),
                ActionRequest::click(ElementTarget::by_text("go")),
                ActionRequest::wait(50),
                ActionRequest::click(ElementTarget::by_id("missing")),
            ])
            .await;

        let oks: Vec<bool> = results.iter().map(|r| r.ok).collect();
        assert_eq!(oks, vec![true, true, true, false]);
        // three interactive steps pause, the wait only sleeps itself
        assert!(started.elapsed() >= Duration::from_millis(650));
        let q = bridge.document().element_by_id("q").unwrap();
        assert_eq!(bridge.document().value(q).as_deref(), Some("abc"));
    }
}
