//! Text contrast (WCAG 1.4.3).

use async_trait::async_trait;

use lumen_core::{
    contrast, ContrastFinding, EvaluatorId, EvaluatorResult, Finding, Summary, SummaryKind,
};

use super::{tag_or_none, unavailable, AuditContext, Evaluator, EvaluatorError};
use crate::dom::{DomError, ElementHandle, Page, QuerySpec};

pub struct ContrastEvaluator;

/// `None` when the element renders no text.
async fn inspect(page: &dyn Page, element: &ElementHandle) -> Result<Option<ContrastFinding>, DomError> {
    let text = page.text(element).await?;
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }

    let foreground = page.computed_style(element, "color").await?;
    let background = page.computed_style(element, "background-color").await?;
    let result = contrast::evaluate(&foreground, &background);

    Ok(Some(ContrastFinding {
        text: text.to_string(),
        foreground_color: foreground,
        background_color: background,
        contrast_ratio: result.ratio,
        wcag_compliant: result.compliant,
        large_text_compliant: result.large_text_compliant,
    }))
}

#[async_trait]
impl Evaluator for ContrastEvaluator {
    fn id(&self) -> EvaluatorId {
        EvaluatorId::Contrast
    }

    async fn run(&self, ctx: &AuditContext) -> Result<EvaluatorResult, EvaluatorError> {
        let page = ctx.page.as_ref();
        let elements = page.find_all(&QuerySpec::HasText).await?;

        let mut results = Vec::new();
        let mut compliant = 0;
        for element in &elements {
            match inspect(page, element).await {
                Ok(None) => {}
                Ok(Some(finding)) => {
                    if finding.wcag_compliant {
                        compliant += 1;
                    }
                    results.push(Finding::Contrast(finding));
                }
                Err(e) => {
                    let index = results.len() + 1;
                    results.push(unavailable(index, tag_or_none(page, element).await, &e));
                }
            }
        }

        let summary = Summary::new(SummaryKind::TextElements, results.len(), compliant);
        Ok(EvaluatorResult::new(self.id(), results).with_summary(summary))
    }
}
