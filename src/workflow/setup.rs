//! Document setup: language, genres and style guide
//!
//! Only fields still missing are generated. A failed step does not stop the
//! others; the outcome carries whatever was obtained plus the failures.

use super::{non_empty, prompts, Workflow, WorkflowContext, WorkflowError, WorkflowOutput, WorkflowRequest};
use crate::llm::{generate_typed, Message};
use crate::model::{Genre, Language, RequirementKind, SetupField, Target};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::{debug, warn};

#[derive(Debug, Deserialize, JsonSchema)]
struct LanguageReply {
    language: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct GenreReply {
    genres: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupFailure {
    pub field: SetupField,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SetupOutcome {
    pub language: Option<Language>,
    pub genres: Option<Vec<Genre>>,
    pub style_guide: Option<String>,
    pub failures: Vec<SetupFailure>,
}

impl SetupOutcome {
    pub fn obtained(&self) -> Vec<SetupField> {
        let mut fields = Vec::new();
        if self.language.is_some() {
            fields.push(SetupField::Language);
        }
        if self.genres.is_some() {
            fields.push(SetupField::Genres);
        }
        if self.style_guide.is_some() {
            fields.push(SetupField::StyleGuide);
        }
        fields
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct SetupWorkflow;

impl SetupWorkflow {
    async fn detect_language(ctx: &WorkflowContext, text: &str) -> Result<Language, WorkflowError> {
        let messages = [Message::system(prompts::LANGUAGE_DETECTION), Message::user(text)];
        let reply: LanguageReply = generate_typed(ctx.llm.as_ref(), &messages).await?;
        Language::parse(&reply.language)
            .ok_or_else(|| WorkflowError::InvalidOutput(format!("unknown language '{}'", reply.language)))
    }

    async fn detect_genres(ctx: &WorkflowContext, text: &str) -> Result<Vec<Genre>, WorkflowError> {
        let messages = [Message::system(prompts::GENRE_DETECTION), Message::user(text)];
        let reply: GenreReply = generate_typed(ctx.llm.as_ref(), &messages).await?;

        let mut genres = Vec::new();
        for label in &reply.genres {
            match Genre::parse(label) {
                Some(genre) if !genres.contains(&genre) => genres.push(genre),
                Some(_) => {}
                None => debug!(label = label.as_str(), "dropping unknown genre"),
            }
        }
        Ok(genres)
    }

    async fn write_style_guide(
        ctx: &WorkflowContext,
        text: &str,
        context: &str,
    ) -> Result<String, WorkflowError> {
        let mut system = format!(
            "{}\nThe translation is into {}.",
            prompts::STYLE_GUIDE,
            ctx.config.target_language
        );
        if !context.is_empty() {
            system.push_str("\n\n");
            system.push_str(context);
        }
        let reply = ctx.llm.invoke(&[Message::system(system), Message::user(text)]).await?;
        non_empty(reply, "style guide")
    }
}

#[async_trait]
impl Workflow for SetupWorkflow {
    fn kind(&self) -> RequirementKind {
        RequirementKind::Setup
    }

    async fn run(&self, ctx: &WorkflowContext, request: &WorkflowRequest<'_>) -> Result<WorkflowOutput, WorkflowError> {
        if request.target != Target::Document {
            return Err(WorkflowError::WrongTarget {
                kind: RequirementKind::Setup,
                target: request.target,
            });
        }

        let mut outcome = SetupOutcome::default();
        // detected values feed the style guide prompt
        let mut context = request.context.clone();

        for field in &request.context.missing_setup {
            let result = match field {
                SetupField::Language => Self::detect_language(ctx, request.text).await.map(|language| {
                    context.language = Some(language);
                    outcome.language = Some(language);
                }),
                SetupField::Genres => Self::detect_genres(ctx, request.text).await.map(|genres| {
                    context.genres = Some(genres.clone());
                    outcome.genres = Some(genres);
                }),
                SetupField::StyleGuide => Self::write_style_guide(ctx, request.text, &context.describe())
                    .await
                    .map(|guide| outcome.style_guide = Some(guide)),
            };

            if let Err(err) = result {
                warn!(field = %field, error = %err, "setup step failed");
                outcome.failures.push(SetupFailure {
                    field: *field,
                    reason: err.to_string(),
                });
            }
        }

        Ok(WorkflowOutput::Setup(outcome))
    }
}
