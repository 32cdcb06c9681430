//! Keyboard reachability (WCAG 2.1.1).

use async_trait::async_trait;

use lumen_core::{EvaluatorId, EvaluatorResult, Finding, KeyboardFinding, Summary, SummaryKind};

use super::{tag_or_none, unavailable, AuditContext, Evaluator, EvaluatorError};
use crate::dom::{DomError, ElementHandle, Page, QuerySpec};

pub struct KeyboardEvaluator;

async fn inspect(page: &dyn Page, element: &ElementHandle) -> Result<KeyboardFinding, DomError> {
    let tag = page.tag_name(element).await?;
    let accessible = page.is_visible(element).await? && page.is_enabled(element).await?;

    let message = if accessible {
        "element is reachable by keyboard"
    } else {
        "element is hidden or disabled and cannot be reached by keyboard"
    };

    Ok(KeyboardFinding {
        element: tag,
        accessible,
        message: message.to_string(),
    })
}

#[async_trait]
impl Evaluator for KeyboardEvaluator {
    fn id(&self) -> EvaluatorId {
        EvaluatorId::Keyboard
    }

    async fn run(&self, ctx: &AuditContext) -> Result<EvaluatorResult, EvaluatorError> {
        let page = ctx.page.as_ref();
        let elements = page.find_all(&QuerySpec::focusable()).await?;

        let mut results = Vec::with_capacity(elements.len());
        let mut accessible = 0;
        for (i, element) in elements.iter().enumerate() {
            match inspect(page, element).await {
                Ok(finding) => {
                    if finding.accessible {
                        accessible += 1;
                    }
                    results.push(Finding::Keyboard(finding));
                }
                Err(e) => results.push(unavailable(i + 1, tag_or_none(page, element).await, &e)),
            }
        }

        let summary = Summary::new(SummaryKind::Reachable, elements.len(), accessible);
        Ok(EvaluatorResult::new(self.id(), results).with_summary(summary))
    }
}
