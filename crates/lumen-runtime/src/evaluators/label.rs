//! Form control labels (WCAG 1.3.1, 3.3.2).

use async_trait::async_trait;

use lumen_core::{EvaluatorId, EvaluatorResult, Finding, LabelFinding};

use super::{tag_or_none, unavailable, AuditContext, Evaluator, EvaluatorError};
use crate::dom::{DomError, ElementHandle, Page, QuerySpec};

pub struct LabelEvaluator;

async fn inspect(page: &dyn Page, control: &ElementHandle) -> Result<LabelFinding, DomError> {
    let input_type = page.tag_name(control).await?;
    let id = page.attribute(control, "id").await?.filter(|id| !id.is_empty());

    let label_present = match &id {
        Some(id) => !page.find_all(&QuerySpec::LabelFor(id.clone())).await?.is_empty(),
        None => false,
    };

    let message = match (&id, label_present) {
        (_, true) => "control has an associated label".to_string(),
        (Some(id), false) => format!("no label references id '{}'", id),
        (None, false) => "control has no id, so no label can reference it".to_string(),
    };

    Ok(LabelFinding {
        input_type,
        id,
        label_present,
        message,
    })
}

#[async_trait]
impl Evaluator for LabelEvaluator {
    fn id(&self) -> EvaluatorId {
        EvaluatorId::Label
    }

    async fn run(&self, ctx: &AuditContext) -> Result<EvaluatorResult, EvaluatorError> {
        let page = ctx.page.as_ref();
        let controls = page.find_all(&QuerySpec::form_controls()).await?;

        let mut results = Vec::with_capacity(controls.len());
        for (i, control) in controls.iter().enumerate() {
            match inspect(page, control).await {
                Ok(finding) => results.push(Finding::Label(finding)),
                Err(e) => results.push(unavailable(i + 1, tag_or_none(page, control).await, &e)),
            }
        }

        Ok(EvaluatorResult::new(self.id(), results))
    }
}
