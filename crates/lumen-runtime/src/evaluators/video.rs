//! Video captions and alternatives (WCAG 1.2).

use async_trait::async_trait;

use lumen_core::{EvaluatorId, EvaluatorResult, Finding, Presence, VideoFinding};

use super::{AuditContext, Evaluator, EvaluatorError};
use crate::dom::{DomError, ElementHandle, Page, QuerySpec};

pub const NO_VIDEO_MESSAGE: &str = "page contains no video elements";

const TRANSCRIPT: QuerySpec = QuerySpec::FollowingSibling {
    tag: "div",
    class_contains: "transcript",
};

const AUDIO_DESCRIPTION: QuerySpec = QuerySpec::FollowingSibling {
    tag: "audio",
    class_contains: "audio-description",
};

pub struct VideoEvaluator;

fn presence(found: Result<bool, DomError>) -> Presence {
    match found {
        Ok(found) => Presence::from_found(found),
        Err(e) => Presence::Unknown {
            error: e.to_string(),
        },
    }
}

async fn has_related(page: &dyn Page, video: &ElementHandle, query: &QuerySpec) -> Presence {
    presence(
        page.find_within(video, query)
            .await
            .map(|found| !found.is_empty()),
    )
}

async fn inspect(page: &dyn Page, index: usize, video: &ElementHandle) -> VideoFinding {
    let (thumbnail, thumbnail_error) = match page.attribute(video, "poster").await {
        Ok(poster) => (poster.filter(|p| !p.is_empty()), None),
        Err(e) => {
            tracing::debug!(index, error = %e, "Could not read video poster");
            (None, Some(e.to_string()))
        }
    };

    let keyboard_access = presence(
        page.attribute(video, "tabindex")
            .await
            .map(|tabindex| tabindex.is_some()),
    );

    let landmark = QuerySpec::AncestorWithAnyAttribute(vec!["aria-label", "role"]);

    VideoFinding {
        index,
        thumbnail,
        thumbnail_error,
        transcript: has_related(page, video, &TRANSCRIPT).await,
        audio_description: has_related(page, video, &AUDIO_DESCRIPTION).await,
        keyboard_access,
        screen_reader: has_related(page, video, &landmark).await,
    }
}

#[async_trait]
impl Evaluator for VideoEvaluator {
    fn id(&self) -> EvaluatorId {
        EvaluatorId::VideoCaption
    }

    async fn run(&self, ctx: &AuditContext) -> Result<EvaluatorResult, EvaluatorError> {
        let page = ctx.page.as_ref();
        let videos = page.find_all(&QuerySpec::Tag("video")).await?;

        if videos.is_empty() {
            return Ok(EvaluatorResult::new(self.id(), Vec::new()).with_message(NO_VIDEO_MESSAGE));
        }

        let mut results = Vec::with_capacity(videos.len());
        for (i, video) in videos.iter().enumerate() {
            results.push(Finding::Video(inspect(page, i + 1, video).await));
        }

        Ok(EvaluatorResult::new(self.id(), results))
    }
}
