//! In-page automation bridge: inspect the actionable elements of a page,
//! find them again from a partial description, and drive them with
//! click/fill/select/wait actions.

pub mod bridge;
pub mod chrome;
pub mod config;
pub mod dom;
pub mod logging;
pub mod server;
pub mod types;

pub use bridge::{ActionDefaults, ActionError, Bridge, NAMESPACE};
pub use config::BridgeConfig;
pub use dom::{Document, DomError, MemoryDocument, NodeId};
pub use types::{
    ActionKind, ActionRequest, ActionResult, ElementDescriptor, ElementTarget, PageScanResult,
    PageState,
};
