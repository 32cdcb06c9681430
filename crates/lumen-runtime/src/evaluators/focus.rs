//! Focus on activation (WCAG 2.4.7).
//!
//! Activating elements moves focus and may trigger page behaviour, so this
//! evaluator runs alone, after the read-only evaluators.

use async_trait::async_trait;

use lumen_core::{EvaluatorId, EvaluatorResult, Finding, FocusFinding};

use super::{tag_or_none, unavailable, AuditContext, Evaluator, EvaluatorError};
use crate::dom::{DomError, ElementHandle, Page, QuerySpec};

pub struct FocusEvaluator;

async fn inspect(page: &dyn Page, element: &ElementHandle) -> Result<FocusFinding, DomError> {
    let tag = page.tag_name(element).await?;
    page.activate(element).await?;
    let focused = page.active_element().await?.as_ref() == Some(element);

    let message = if focused {
        "element received focus when activated"
    } else {
        "element did not receive focus when activated"
    };

    Ok(FocusFinding {
        element: tag,
        focused,
        message: message.to_string(),
    })
}

#[async_trait]
impl Evaluator for FocusEvaluator {
    fn id(&self) -> EvaluatorId {
        EvaluatorId::Focus
    }

    fn mutates_focus(&self) -> bool {
        true
    }

    async fn run(&self, ctx: &AuditContext) -> Result<EvaluatorResult, EvaluatorError> {
        let page = ctx.page.as_ref();
        let elements = page.find_all(&QuerySpec::focusable()).await?;

        let mut results = Vec::with_capacity(elements.len());
        for (i, element) in elements.iter().enumerate() {
            match inspect(page, element).await {
                Ok(finding) => results.push(Finding::Focus(finding)),
                Err(e) => results.push(unavailable(i + 1, tag_or_none(page, element).await, &e)),
            }
        }

        Ok(EvaluatorResult::new(self.id(), results))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::fake::{FakeDocument, FakeElement, FakeOp};
    use crate::evaluators::testing::context;
    use lumen_core::FailureKind;

    #[tokio::test]
    async fn test_focus_by_identity() {
        let mut doc = FakeDocument::new();
        doc.add(FakeElement::new("button").text("Save"));
        doc.add(FakeElement::new("span").attr("tabindex", "-1").unfocusable());
        doc.add(
            FakeElement::new("a")
                .failing(FakeOp::Activate, DomError::ElementQuery("element click intercepted".into())),
        );

        let ctx = context(doc).await;
        let result = FocusEvaluator.run(&ctx).await.unwrap();
        assert!(result.summary.is_none());

        assert!(matches!(&result.results[0], Finding::Focus(f) if f.focused && f.element == "button"));
        assert!(matches!(&result.results[1], Finding::Focus(f) if !f.focused));
        assert_eq!(
            result.results[2].failure().map(|f| f.kind),
            Some(FailureKind::ElementQueryFailure)
        );
    }
}
