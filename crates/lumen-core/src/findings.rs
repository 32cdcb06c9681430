//! Per-item findings produced by the evaluators.
//!
//! Every inspected element yields exactly one [`Finding`]. When an element
//! could not be inspected the evaluator records [`Finding::Unavailable`]
//! with the reason instead of dropping the element or failing the run.

use serde::{Deserialize, Serialize};

use crate::ruleset::LinkViolation;
use crate::verdict::ClassificationVerdict;

/// Category of a per-item failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The element (or a related element) could not be queried
    ElementQueryFailure,
    /// An injected script raised or returned an unusable value
    ScriptExecutionError,
    /// A DOM command exceeded its timeout
    Timeout,
    /// The classifier replied with something that is not a verdict
    ClassificationParseFailure,
    /// No classifier verdict could be obtained (provider error, open
    /// circuit, exhausted budget, or no classifier configured)
    ClassifierUnavailable,
}

/// Why one item has no regular finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemFailure {
    pub kind: FailureKind,
    pub diagnostic: String,
}

impl ItemFailure {
    pub fn new(kind: FailureKind, diagnostic: impl Into<String>) -> Self {
        Self {
            kind,
            diagnostic: diagnostic.into(),
        }
    }
}

/// An item that could not be inspected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnavailableItem {
    /// 1-based position among the evaluator's selected elements
    pub index: usize,

    /// Tag name, when it could still be read
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element: Option<String>,

    pub failure: ItemFailure,
}

/// Tri-state outcome of a structural presence check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    Present,
    Absent,
    /// The query itself failed
    Unknown { error: String },
}

impl Presence {
    pub fn from_found(found: bool) -> Self {
        if found {
            Presence::Present
        } else {
            Presence::Absent
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoFinding {
    /// 1-based position among the page's videos
    pub index: usize,

    /// Poster URL, if the video declares one
    pub thumbnail: Option<String>,

    /// Why the poster could not be read; `thumbnail` is then `None`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_error: Option<String>,

    /// Sibling `div.transcript`
    pub transcript: Presence,

    /// Sibling `audio.audio-description`
    pub audio_description: Presence,

    /// `tabindex` attribute present
    pub keyboard_access: Presence,

    /// Some ancestor carries `aria-label` or `role`
    pub screen_reader: Presence,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContrastFinding {
    pub text: String,
    pub foreground_color: String,
    pub background_color: String,
    pub contrast_ratio: f64,
    pub wcag_compliant: bool,
    pub large_text_compliant: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyboardFinding {
    pub element: String,
    pub accessible: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FocusFinding {
    pub element: String,
    pub focused: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableFinding {
    pub headers: usize,
    pub rows: usize,
    pub compliant: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelFinding {
    pub input_type: String,
    pub id: Option<String>,
    pub label_present: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AltTextFinding {
    pub alt: Option<String>,
    pub src: Option<String>,
    pub compliant: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<ClassificationVerdict>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<ItemFailure>,

    pub message: String,
}

/// One entry in an evaluator's result list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Finding {
    Video(VideoFinding),
    Contrast(ContrastFinding),
    Keyboard(KeyboardFinding),
    Focus(FocusFinding),
    Table(TableFinding),
    Label(LabelFinding),
    AltText(AltTextFinding),
    Link(LinkViolation),
    Unavailable(UnavailableItem),
}

impl Finding {
    pub fn unavailable(
        index: usize,
        element: Option<String>,
        kind: FailureKind,
        diagnostic: impl Into<String>,
    ) -> Self {
        Finding::Unavailable(UnavailableItem {
            index,
            element,
            failure: ItemFailure::new(kind, diagnostic),
        })
    }

    /// The failure attached to this item, if any.
    pub fn failure(&self) -> Option<&ItemFailure> {
        match self {
            Finding::Unavailable(item) => Some(&item.failure),
            Finding::AltText(finding) => finding.failure.as_ref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_serializes_flat() {
        let finding = Finding::unavailable(
            3,
            Some("a".to_string()),
            FailureKind::ElementQueryFailure,
            "stale element reference",
        );
        let json = serde_json::to_value(&finding).unwrap();
        assert_eq!(json["index"], 3);
        assert_eq!(json["element"], "a");
        assert_eq!(json["failure"]["kind"], "element_query_failure");
    }

    #[test]
    fn test_presence_serialization() {
        assert_eq!(serde_json::to_value(Presence::Present).unwrap(), "present");
        let unknown = serde_json::to_value(Presence::Unknown {
            error: "timeout".to_string(),
        })
        .unwrap();
        assert_eq!(unknown["unknown"]["error"], "timeout");
    }

    #[test]
    fn test_failure_accessor() {
        let finding = Finding::AltText(AltTextFinding {
            alt: Some("logo".to_string()),
            src: None,
            compliant: false,
            evaluation: None,
            failure: Some(ItemFailure::new(
                FailureKind::ClassificationParseFailure,
                "response is not valid JSON",
            )),
            message: "Alt text could not be evaluated".to_string(),
        });
        assert_eq!(
            finding.failure().map(|f| f.kind),
            Some(FailureKind::ClassificationParseFailure)
        );
    }
}
