//! Core types shared by evaluators, the aggregator and the runtime.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::findings::Finding;

/// Identity of one accessibility check.
///
/// Ordering is the declaration order, which is also the key order of
/// [`crate::report::AuditReport::evaluators`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluatorId {
    VideoCaption,
    Contrast,
    Keyboard,
    Focus,
    TableStructure,
    Label,
    AltText,
    LinkName,
}

impl EvaluatorId {
    /// Every evaluator, in report order.
    pub const ALL: [EvaluatorId; 8] = [
        EvaluatorId::VideoCaption,
        EvaluatorId::Contrast,
        EvaluatorId::Keyboard,
        EvaluatorId::Focus,
        EvaluatorId::TableStructure,
        EvaluatorId::Label,
        EvaluatorId::AltText,
        EvaluatorId::LinkName,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EvaluatorId::VideoCaption => "video_caption",
            EvaluatorId::Contrast => "contrast",
            EvaluatorId::Keyboard => "keyboard",
            EvaluatorId::Focus => "focus",
            EvaluatorId::TableStructure => "table_structure",
            EvaluatorId::Label => "label",
            EvaluatorId::AltText => "alt_text",
            EvaluatorId::LinkName => "link_name",
        }
    }

    /// Evaluators whose input is the ruleset engine's violation list.
    pub fn is_ruleset_derived(&self) -> bool {
        matches!(self, EvaluatorId::LinkName)
    }
}

impl fmt::Display for EvaluatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for an evaluator name that is not registered.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown evaluator '{0}'")]
pub struct UnknownEvaluator(pub String);

impl FromStr for EvaluatorId {
    type Err = UnknownEvaluator;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // `link_accessibility` is the historical route name for link-name
        match s.trim() {
            "link_accessibility" => Ok(EvaluatorId::LinkName),
            other => EvaluatorId::ALL
                .into_iter()
                .find(|id| id.as_str() == other)
                .ok_or_else(|| UnknownEvaluator(other.to_string())),
        }
    }
}

/// Which counter labels a summary is reported under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryKind {
    /// Keyboard reachability: `total_elements / accessible_*`
    Reachable,
    /// Contrast: `total_elements / compliant_*`
    TextElements,
    /// Table structure: `total_tables / compliant_*`
    Tables,
    /// Alt text: `total_images / compliant_*`
    Images,
}

impl SummaryKind {
    fn keys(&self) -> (&'static str, &'static str, &'static str) {
        match self {
            SummaryKind::Reachable => ("total_elements", "accessible_count", "accessible_percentage"),
            SummaryKind::TextElements => ("total_elements", "compliant_count", "compliant_percentage"),
            SummaryKind::Tables => ("total_tables", "compliant_count", "compliant_percentage"),
            SummaryKind::Images => ("total_images", "compliant_count", "compliant_percentage"),
        }
    }
}

/// Compliance counters for one evaluator.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub kind: SummaryKind,
    pub total: usize,
    pub compliant_count: usize,
    pub percentage: f64,
}

impl Summary {
    pub fn new(kind: SummaryKind, total: usize, compliant_count: usize) -> Self {
        Self {
            kind,
            total,
            compliant_count,
            percentage: compliance_percentage(compliant_count, total),
        }
    }
}

impl Serialize for Summary {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let (total, count, percentage) = self.kind.keys();
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry(total, &self.total)?;
        map.serialize_entry(count, &self.compliant_count)?;
        map.serialize_entry(percentage, &self.percentage)?;
        map.end()
    }
}

/// `compliant / total * 100`, rounded to two decimals; 0 when `total == 0`.
pub fn compliance_percentage(compliant: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let raw = compliant as f64 / total as f64 * 100.0;
    (raw * 100.0).round() / 100.0
}

/// Output of one evaluator run.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluatorResult {
    pub evaluator: EvaluatorId,

    /// One finding per inspected item, in document order
    pub results: Vec<Finding>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<Summary>,

    /// Informational note, e.g. when the page has nothing to inspect
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl EvaluatorResult {
    pub fn new(evaluator: EvaluatorId, results: Vec<Finding>) -> Self {
        Self {
            evaluator,
            results,
            summary: None,
            message: None,
        }
    }

    pub fn with_summary(mut self, summary: Summary) -> Self {
        self.summary = Some(summary);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage_zero_total() {
        assert_eq!(compliance_percentage(0, 0), 0.0);
    }

    #[test]
    fn test_percentage_rounds_to_two_decimals() {
        assert_eq!(compliance_percentage(1, 3), 33.33);
        assert_eq!(compliance_percentage(2, 3), 66.67);
        assert_eq!(compliance_percentage(4, 4), 100.0);
    }

    #[test]
    fn test_summary_keys_follow_kind() {
        let summary = Summary::new(SummaryKind::Reachable, 0, 0);
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["total_elements"], 0);
        assert_eq!(json["accessible_count"], 0);
        assert_eq!(json["accessible_percentage"].as_f64(), Some(0.0));

        let json = serde_json::to_value(Summary::new(SummaryKind::Images, 4, 1)).unwrap();
        assert_eq!(json["total_images"], 4);
        assert_eq!(json["compliant_percentage"].as_f64(), Some(25.0));
        assert!(json.get("accessible_count").is_none());
    }

    #[test]
    fn test_evaluator_id_round_trip_names() {
        for id in EvaluatorId::ALL {
            assert_eq!(id.as_str().parse::<EvaluatorId>(), Ok(id));
            assert_eq!(serde_json::to_value(id).unwrap(), id.as_str());
        }
    }

    #[test]
    fn test_evaluator_id_aliases_and_unknown() {
        assert_eq!("link_accessibility".parse::<EvaluatorId>(), Ok(EvaluatorId::LinkName));
        assert_eq!(
            "colour".parse::<EvaluatorId>(),
            Err(UnknownEvaluator("colour".to_string()))
        );
    }

    #[test]
    fn test_result_omits_empty_optionals() {
        let result = EvaluatorResult::new(EvaluatorId::Focus, vec![]);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["evaluator"], "focus");
        assert!(json.get("summary").is_none());
        assert!(json.get("message").is_none());
    }
}
