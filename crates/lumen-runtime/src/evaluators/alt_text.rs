//! Image alternative text (WCAG 1.1.1).
//!
//! Missing or empty alt text is non-compliant without asking the classifier.
//! Everything else goes to the Classifier Bridge; images are classified
//! concurrently but findings keep document order.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use lumen_core::{
    AltTextFinding, EvaluatorId, EvaluatorResult, FailureKind, Finding, ItemFailure, Summary,
    SummaryKind,
};

use super::{unavailable, AuditContext, Evaluator, EvaluatorError};
use crate::dom::{DomError, ElementHandle, QuerySpec};

pub struct AltTextEvaluator;

struct ImageAttrs {
    alt: Option<String>,
    src: Option<String>,
}

async fn read_attrs(ctx: &AuditContext, image: &ElementHandle) -> Result<ImageAttrs, DomError> {
    let alt = ctx.page.attribute(image, "alt").await?;
    // The property resolves relative URLs against the document
    let src = ctx
        .page
        .property(image, "src")
        .await?
        .filter(|s| !s.is_empty());
    Ok(ImageAttrs { alt, src })
}

fn without_verdict(attrs: ImageAttrs, failure: ItemFailure) -> AltTextFinding {
    AltTextFinding {
        alt: attrs.alt,
        src: attrs.src,
        compliant: false,
        evaluation: None,
        message: format!("alt text could not be evaluated: {}", failure.diagnostic),
        failure: Some(failure),
    }
}

async fn evaluate_image(ctx: &AuditContext, index: usize, image: ElementHandle) -> Finding {
    let attrs = match read_attrs(ctx, &image).await {
        Ok(attrs) => attrs,
        Err(e) => return unavailable(index, Some("img".to_string()), &e),
    };

    let alt = match attrs.alt.as_deref().map(str::trim) {
        Some(alt) if !alt.is_empty() => alt.to_string(),
        _ => {
            return Finding::AltText(AltTextFinding {
                alt: attrs.alt,
                src: attrs.src,
                compliant: false,
                evaluation: None,
                failure: None,
                message: "image has no alt text".to_string(),
            })
        }
    };

    let Some(classifier) = &ctx.classifier else {
        let failure = ItemFailure::new(FailureKind::ClassifierUnavailable, "no classifier configured");
        return Finding::AltText(without_verdict(attrs, failure));
    };

    let Some(src) = attrs.src.clone() else {
        let failure = ItemFailure::new(FailureKind::ClassifierUnavailable, "image has no source URL");
        return Finding::AltText(without_verdict(attrs, failure));
    };

    match classifier.classify(&alt, &src, &ctx.usage).await {
        Ok(verdict) => {
            let compliant = verdict.is_compliant();
            let message = if compliant {
                "alt text is appropriate".to_string()
            } else {
                format!("alt text is {}", verdict.verdict.as_str().replace('_', " "))
            };
            Finding::AltText(AltTextFinding {
                alt: attrs.alt,
                src: attrs.src,
                compliant,
                evaluation: Some(verdict),
                failure: None,
                message,
            })
        }
        Err(e) => Finding::AltText(without_verdict(attrs, e.item_failure())),
    }
}

fn is_compliant(finding: &Finding) -> bool {
    matches!(finding, Finding::AltText(f) if f.compliant)
}

#[async_trait]
impl Evaluator for AltTextEvaluator {
    fn id(&self) -> EvaluatorId {
        EvaluatorId::AltText
    }

    async fn run(&self, ctx: &AuditContext) -> Result<EvaluatorResult, EvaluatorError> {
        let images = ctx.page.find_all(&QuerySpec::Tag("img")).await?;
        let total = images.len();

        let results: Vec<Finding> = stream::iter(images.into_iter().enumerate())
            .map(|(i, image)| evaluate_image(ctx, i + 1, image))
            .buffered(ctx.classifier_concurrency.max(1))
            .collect()
            .await;

        let compliant = results.iter().filter(|f| is_compliant(f)).count();
        tracing::debug!(images = total, compliant, "Alt text evaluated");

        let summary = Summary::new(SummaryKind::Images, total, compliant);
        Ok(EvaluatorResult::new(self.id(), results).with_summary(summary))
    }
}
