//! Link names (WCAG 2.4.4), from the ruleset engine's `link-name` rule.

use async_trait::async_trait;

use lumen_core::{link_name_violations, EvaluatorId, EvaluatorResult, Finding};

use super::{AuditContext, Evaluator, EvaluatorError};

pub struct LinkNameEvaluator;

#[async_trait]
impl Evaluator for LinkNameEvaluator {
    fn id(&self) -> EvaluatorId {
        EvaluatorId::LinkName
    }

    async fn run(&self, ctx: &AuditContext) -> Result<EvaluatorResult, EvaluatorError> {
        let violations = ctx.ruleset.violations(ctx.page.as_ref()).await?;
        let results = link_name_violations(violations)
            .into_iter()
            .map(Finding::Link)
            .collect();
        Ok(EvaluatorResult::new(self.id(), results))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::fake::FakeDocument;
    use crate::evaluators::testing::context;
    use crate::ruleset::{AxeRuleset, RulesetRun};
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_only_link_name_rule_kept() {
        let mut doc = FakeDocument::new();
        doc.on_script("axe.run", |_| {
            Ok(json!([
                {
                    "id": "color-contrast",
                    "help": "Elements must meet minimum color contrast",
                    "nodes": []
                },
                {
                    "id": "link-name",
                    "description": "Ensures links have discernible text",
                    "impact": "serious",
                    "help": "Links must have discernible text",
                    "nodes": [{
                        "html": "<a href=\"/cart\"><i class=\"icon\"></i></a>",
                        "target": ["a[href=\"/cart\"]"],
                        "failureSummary": "Element is in tab order and does not have accessible text"
                    }]
                }
            ]))
        });

        let mut ctx = context(doc).await;
        ctx.ruleset = Arc::new(RulesetRun::new(Some(Arc::new(AxeRuleset::preloaded()))));

        let result = LinkNameEvaluator.run(&ctx).await.unwrap();
        assert_eq!(result.results.len(), 1);

        let json = serde_json::to_value(&result.results[0]).unwrap();
        assert_eq!(json["impact"], "serious");
        assert_eq!(json["nodes"][0]["target"][0], "a[href=\"/cart\"]");
        assert!(json["nodes"][0]["failureSummary"]
            .as_str()
            .unwrap()
            .contains("accessible text"));
    }

    #[tokio::test]
    async fn test_ruleset_failure_fails_evaluator() {
        let ctx = context(FakeDocument::new()).await;
        let err = LinkNameEvaluator.run(&ctx).await.unwrap_err();
        assert!(matches!(err, EvaluatorError::Ruleset(_)));
    }
}
