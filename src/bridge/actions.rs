use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use crate::dom::{Document, DomError, EventKind, NodeId, ScrollOptions};
use crate::types::{ActionKind, ActionRequest, ActionResult, ElementTarget};

use super::resolver::find_element;

/// Everything that can stop an action. Rendered into
/// [`ActionResult::error`] at the dispatch boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ActionError {
    #[error("No action.type specified")]
    MissingType,

    #[error("Unknown action type: {0}")]
    UnknownType(String),

    #[error("Element not found")]
    ElementNotFound,

    #[error("Option not found")]
    OptionNotFound,

    #[error(transparent)]
    Dom(#[from] DomError),
}

/// Tunables of the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionDefaults {
    /// Sleep for a `wait` without `ms`.
    pub wait: Duration,
    /// Pause after each click/fill/select in a batch.
    pub step_pause: Duration,
}

impl Default for ActionDefaults {
    fn default() -> Self {
        Self {
            wait: Duration::from_millis(1000),
            step_pause: Duration::from_millis(200),
        }
    }
}

/// Run one action. Never fails: every problem comes back as `ok: false`.
pub async fn perform<D: Document + ?Sized>(
    doc: &mut D,
    request: &ActionRequest,
    defaults: &ActionDefaults,
) -> ActionResult {
    match dispatch(doc, request, defaults).await {
        Ok(()) => ActionResult::success(),
        Err(err) => {
            warn!(action = ?request.kind, error = %err, "action failed");
            ActionResult::failure(err.to_string())
        }
    }
}

async fn dispatch<D: Document + ?Sized>(
    doc: &mut D,
    request: &ActionRequest,
    defaults: &ActionDefaults,
) -> Result<(), ActionError> {
    let raw = request
        .kind
        .as_deref()
        .filter(|kind| !kind.is_empty())
        .ok_or(ActionError::MissingType)?;
    let kind = ActionKind::from_str(raw).map_err(|_| ActionError::UnknownType(raw.to_string()))?;
    info!(action = %kind, target = ?request.target, "performing action");

    match kind {
        ActionKind::Wait => {
            let pause = request.ms.map(Duration::from_millis).unwrap_or(defaults.wait);
            tokio::time::sleep(pause).await;
        }
        ActionKind::Click => {
            let node = resolve(doc, request.target.as_ref())?;
            doc.scroll_into_view(node, ScrollOptions::default())?;
            doc.click(node)?;
        }
        ActionKind::Fill => {
            let node = resolve(doc, request.target.as_ref())?;
            doc.focus(node)?;
            doc.set_value(node, "")?;
            doc.dispatch_event(node, EventKind::Input)?;
            doc.set_value(node, &request.value_string())?;
            doc.dispatch_event(node, EventKind::Input)?;
            doc.dispatch_event(node, EventKind::Change)?;
        }
        ActionKind::Select => {
            let node = resolve(doc, request.target.as_ref())?;
            let wanted = request.value_string();
            let wanted_text = wanted.trim().to_lowercase();
            let option = doc
                .options(node)
                .into_iter()
                .find(|option| {
                    option.value == wanted || option.text.trim().to_lowercase() == wanted_text
                })
                .ok_or(ActionError::OptionNotFound)?;
            doc.set_value(node, &option.value)?;
            doc.dispatch_event(node, EventKind::Change)?;
        }
    }
    Ok(())
}

fn resolve<D: Document + ?Sized>(
    doc: &D,
    target: Option<&ElementTarget>,
) -> Result<NodeId, ActionError> {
    let target = target.cloned().unwrap_or_default();
    find_element(doc, &target)?.ok_or(ActionError::ElementNotFound)
}
