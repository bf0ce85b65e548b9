use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::dom::Rect;

/// Serialized view of one element, as handed to the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementDescriptor {
    pub id: Option<String>,
    pub tag: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub role: String,
    pub name: Option<String>,
    pub text: Option<String>,
    pub value: Option<String>,
    pub css_selector: Option<String>,
    pub aria_label: Option<String>,
    pub placeholder: Option<String>,
    pub href: Option<String>,
    pub visible: bool,
    pub bbox: Rect,
    pub dataset: BTreeMap<String, String>,
}

/// Any subset of descriptor fields used to find an element again. Unknown
/// descriptor fields are accepted and ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementTarget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub css_selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ElementTarget {
    pub fn by_selector(selector: impl Into<String>) -> Self {
        Self {
            css_selector: Some(selector.into()),
            ..Self::default()
        }
    }

    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn by_text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }
}

impl From<&ElementDescriptor> for ElementTarget {
    fn from(descriptor: &ElementDescriptor) -> Self {
        Self {
            css_selector: descriptor.css_selector.clone(),
            id: descriptor.id.clone(),
            text: descriptor.text.clone(),
            name: descriptor.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ActionKind {
    Wait,
    Click,
    Fill,
    Select,
}

/// One action as sent by the controller. Deserialization never rejects a
/// JSON object: `type` stays a raw string so that missing and unknown kinds
/// reach the dispatcher and fail there, a malformed `target` resolves to
/// nothing, and `ms` takes any number.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    #[serde(
        rename = "type",
        default,
        deserialize_with = "loose_kind",
        skip_serializing_if = "Option::is_none"
    )]
    pub kind: Option<String>,
    #[serde(
        default,
        deserialize_with = "loose_target",
        skip_serializing_if = "Option::is_none"
    )]
    pub target: Option<ElementTarget>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(
        default,
        deserialize_with = "loose_ms",
        skip_serializing_if = "Option::is_none"
    )]
    pub ms: Option<u64>,
}

impl ActionRequest {
    /// Read a request out of arbitrary JSON. Anything that is not an object
    /// becomes an empty request, which fails validation when performed.
    pub fn from_json(value: Value) -> Self {
        serde_json::from_value(value).unwrap_or_default()
    }

    fn of(kind: ActionKind) -> Self {
        Self {
            kind: Some(kind.to_string()),
            ..Self::default()
        }
    }

    pub fn wait(ms: u64) -> Self {
        Self {
            ms: Some(ms),
            ..Self::of(ActionKind::Wait)
        }
    }

    pub fn click(target: ElementTarget) -> Self {
        Self {
            target: Some(target),
            ..Self::of(ActionKind::Click)
        }
    }

    pub fn fill(target: ElementTarget, value: impl Into<String>) -> Self {
        Self {
            target: Some(target),
            value: Some(Value::String(value.into())),
            ..Self::of(ActionKind::Fill)
        }
    }

    pub fn select(target: ElementTarget, value: impl Into<String>) -> Self {
        Self {
            target: Some(target),
            value: Some(Value::String(value.into())),
            ..Self::of(ActionKind::Select)
        }
    }

    /// `value` as a string: strings verbatim, other JSON scalars in their
    /// JSON spelling, absent as empty.
    pub fn value_string(&self) -> String {
        match &self.value {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }
}

/// Non-string kinds keep their JSON spelling, so `5` reports as an unknown
/// type rather than a missing one.
fn loose_kind<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(kind) => Some(kind),
        other => Some(other.to_string()),
    })
}

fn loose_target<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<ElementTarget>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        other => Some(serde_json::from_value(other).unwrap_or_default()),
    })
}

/// Numbers and numeric strings, truncated to whole milliseconds; negatives
/// clamp to zero. Anything else falls back to the default wait.
fn loose_ms<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    let ms = match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(ms.filter(|ms| ms.is_finite()).map(|ms| ms.max(0.0) as u64))
}

/// Outcome of one action. `error` is set exactly when `ok` is false.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    pub ok: bool,
    pub error: Option<String>,
}

impl ActionResult {
    pub fn success() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageScanResult {
    pub url: String,
    pub title: String,
    pub elements: Vec<ElementDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageState {
    pub url: String,
    pub title: String,
    pub timestamp: i64,
    pub hint_balance: Option<String>,
}
