//! Ruleset engine violations and the link-name reshape.
//!
//! The ruleset engine (axe-core) reports violations in its own shape. The
//! report carries that list as-is; only the link-name evaluator narrows it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Rule id whose violations feed the link-name evaluator.
pub const LINK_NAME_RULE: &str = "link-name";

/// One rule violation as reported by the ruleset engine.
///
/// Fields the audit does not read (`tags`, engine extensions) are kept in
/// `extra` and serialized back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    pub id: String,

    #[serde(default)]
    pub description: String,

    /// `minor`, `moderate`, `serious` or `critical`; absent for some rules
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impact: Option<String>,

    #[serde(default)]
    pub help: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help_url: Option<String>,

    #[serde(default)]
    pub nodes: Vec<ViolationNode>,

    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

/// A DOM node that violates a rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationNode {
    #[serde(default)]
    pub html: String,

    /// CSS selector path; nested arrays for shadow DOM and iframes
    #[serde(default, skip_serializing_if = "JsonValue::is_null")]
    pub target: JsonValue,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_summary: Option<String>,

    /// Node-level `impact`, `any`/`all`/`none` check results and their data
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

/// Link-name violation as reported by the link-name evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkViolation {
    pub description: String,
    pub impact: Option<String>,
    pub help: String,
    pub nodes: Vec<LinkViolationNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkViolationNode {
    pub target: JsonValue,

    #[serde(rename = "failureSummary")]
    pub failure_summary: Option<String>,
}

impl From<&Violation> for LinkViolation {
    fn from(v: &Violation) -> Self {
        Self {
            description: v.description.clone(),
            impact: v.impact.clone(),
            help: v.help.clone(),
            nodes: v
                .nodes
                .iter()
                .map(|n| LinkViolationNode {
                    target: n.target.clone(),
                    failure_summary: n.failure_summary.clone(),
                })
                .collect(),
        }
    }
}

/// Keep only `link-name` violations, in engine order, reshaped.
pub fn link_name_violations(violations: &[Violation]) -> Vec<LinkViolation> {
    violations
        .iter()
        .filter(|v| v.id == LINK_NAME_RULE)
        .map(LinkViolation::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Vec<Violation> {
        serde_json::from_value(json!([
            {
                "id": "image-alt",
                "description": "Ensures <img> elements have alternate text",
                "impact": "critical",
                "help": "Images must have alternate text",
                "helpUrl": "https://dequeuniversity.com/rules/axe/4.8/image-alt",
                "nodes": [{ "html": "<img src=\"a.png\">", "target": ["img"], "failureSummary": "Fix any of the following" }]
            },
            {
                "id": "link-name",
                "description": "Ensures links have discernible text",
                "impact": "serious",
                "help": "Links must have discernible text",
                "nodes": [
                    { "html": "<a href=\"/\"></a>", "target": ["header > a"], "failureSummary": "Element is in tab order and does not have accessible text" },
                    { "html": "<a href=\"/x\"></a>", "target": ["#nav a:nth-child(2)"] }
                ]
            }
        ]))
        .unwrap()
    }

    #[test]
    fn test_decodes_engine_shape() {
        let violations = sample();
        assert_eq!(violations.len(), 2);
        assert_eq!(
            violations[0].help_url.as_deref(),
            Some("https://dequeuniversity.com/rules/axe/4.8/image-alt")
        );
        assert_eq!(violations[1].nodes[1].failure_summary, None);
    }

    #[test]
    fn test_engine_fields_survive_reserialization() {
        let raw = json!([{
            "id": "color-contrast",
            "description": "Ensures sufficient contrast",
            "impact": "serious",
            "help": "Elements must have sufficient color contrast",
            "helpUrl": "https://dequeuniversity.com/rules/axe/4.8/color-contrast",
            "tags": ["wcag2aa", "wcag143"],
            "nodes": [{
                "html": "<p>",
                "target": ["p"],
                "failureSummary": "Fix any",
                "impact": "serious",
                "any": [{ "id": "color-contrast", "data": { "contrastRatio": 2.1 } }],
                "all": [],
                "none": []
            }]
        }]);

        let violations: Vec<Violation> = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(violations[0].extra["tags"], json!(["wcag2aa", "wcag143"]));
        assert_eq!(
            violations[0].nodes[0].extra["any"][0]["data"]["contrastRatio"],
            2.1
        );
        assert_eq!(serde_json::to_value(&violations).unwrap(), raw);
    }

    #[test]
    fn test_link_name_filter_and_reshape() {
        let links = link_name_violations(&sample());
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].impact.as_deref(), Some("serious"));
        assert_eq!(links[0].nodes.len(), 2);

        let json = serde_json::to_value(&links[0]).unwrap();
        assert_eq!(json["nodes"][0]["target"], json!(["header > a"]));
        assert_eq!(
            json["nodes"][0]["failureSummary"],
            "Element is in tab order and does not have accessible text"
        );
        assert!(json["nodes"][0].get("html").is_none());
    }

    #[test]
    fn test_no_link_violations() {
        assert!(link_name_violations(&[]).is_empty());
        assert!(link_name_violations(&sample()[..1]).is_empty());
    }
}
