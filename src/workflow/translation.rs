//! Translation with a bounded review loop
//!
//! ```text
//! Translate -> IncrementCounter -> (counter >= max ? FluencyFinalize : Review)
//! Review -> (approved ? FluencyFinalize : Translate)
//! FluencyFinalize -> Done
//! ```
//!
//! The counter is explicit state, so the loop runs at most `max` translate
//! passes and the fluency pass runs exactly once.

use super::{non_empty, prompts, Workflow, WorkflowContext, WorkflowError, WorkflowOutput, WorkflowRequest};
use crate::llm::Message;
use crate::model::RequirementKind;
use async_trait::async_trait;
use regex_lite::Regex;
use tracing::debug;

const PARAGRAPH_SEPARATOR: &str = "\n\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslationState {
    Translate,
    IncrementCounter,
    Review,
    FluencyFinalize,
    Done,
}

#[derive(Debug, Clone)]
pub struct TranslationMachine {
    state: TranslationState,
    counter: u32,
    max: u32,
}

impl TranslationMachine {
    /// `max` below 1 is treated as 1.
    pub fn new(max: u32) -> Self {
        Self {
            state: TranslationState::Translate,
            counter: 0,
            max: max.max(1),
        }
    }

    pub fn state(&self) -> TranslationState {
        self.state
    }

    /// Completed translate passes
    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// Move past the current state. `approved` is only read in `Review`.
    pub fn advance(&mut self, approved: bool) -> TranslationState {
        self.state = match self.state {
            TranslationState::Translate => TranslationState::IncrementCounter,
            TranslationState::IncrementCounter => {
                self.counter += 1;
                if self.counter >= self.max {
                    TranslationState::FluencyFinalize
                } else {
                    TranslationState::Review
                }
            }
            TranslationState::Review if approved => TranslationState::FluencyFinalize,
            TranslationState::Review => TranslationState::Translate,
            TranslationState::FluencyFinalize | TranslationState::Done => TranslationState::Done,
        };
        self.state
    }
}

/// Case-insensitive search for the approval marker.
pub fn is_approved(review: &str, marker: &str) -> bool {
    review.to_lowercase().contains(&marker.to_lowercase())
}

/// Wrap each paragraph in `<index N>` tags for the fluency editor.
pub fn format_indexed_paragraphs(paragraphs: &[&str]) -> String {
    paragraphs
        .iter()
        .enumerate()
        .map(|(i, p)| format!("<index {i}>\n{p}\n</index {i}>"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Replace the paragraphs the editor returned, leaving the rest untouched.
///
/// Tags whose closing index differs from the opening one, indices out of
/// range, and empty bodies are ignored.
pub fn apply_fluency_edits(translation: &str, reply: &str) -> String {
    let mut paragraphs: Vec<String> = translation.split(PARAGRAPH_SEPARATOR).map(str::to_string).collect();

    let Ok(tag) = Regex::new(r"(?s)<index (\d+)>\s*(.*?)\s*</index (\d+)>") else {
        return translation.to_string();
    };
    for caps in tag.captures_iter(reply) {
        let (Some(open), Some(body), Some(close)) = (caps.get(1), caps.get(2), caps.get(3)) else {
            continue;
        };
        if open.as_str() != close.as_str() || body.as_str().is_empty() {
            continue;
        }
        let Ok(index) = open.as_str().parse::<usize>() else {
            continue;
        };
        if let Some(slot) = paragraphs.get_mut(index) {
            *slot = body.as_str().to_string();
        }
    }

    paragraphs.join(PARAGRAPH_SEPARATOR)
}

#[derive(Debug, Clone, PartialEq)]
pub struct TranslationOutcome {
    pub text: String,
    /// Translate passes run
    pub rounds: u32,
    /// Whether a review approved the translation before the bound
    pub approved: bool,
}

pub struct TranslationWorkflow;

impl TranslationWorkflow {
    async fn translate(
        ctx: &WorkflowContext,
        request: &WorkflowRequest<'_>,
        previous: Option<(&str, &str)>,
    ) -> Result<String, WorkflowError> {
        let system = prompts::translator(&ctx.config.target_language, &request.context.describe());
        let mut messages = vec![Message::system(system), Message::user(request.text)];
        if let Some((draft, feedback)) = previous {
            messages.push(Message::assistant(draft));
            messages.push(Message::user(format!(
                "An editor reviewed your translation:\n{}\n\nRevise the translation accordingly.",
                feedback
            )));
        }
        let reply = ctx.llm.invoke(&messages).await?;
        non_empty(reply, "translation")
    }

    async fn review(ctx: &WorkflowContext, source: &str, draft: &str) -> Result<String, WorkflowError> {
        let messages = [
            Message::system(prompts::reviewer(&ctx.config.approval_marker)),
            Message::user(format!("Source:\n{}\n\nTranslation:\n{}", source, draft)),
        ];
        Ok(ctx.llm.invoke(&messages).await?)
    }

    async fn polish(ctx: &WorkflowContext, draft: &str) -> Result<String, WorkflowError> {
        let paragraphs: Vec<&str> = draft.split(PARAGRAPH_SEPARATOR).collect();
        let messages = [
            Message::system(prompts::fluency_editor(&ctx.config.target_language)),
            Message::user(format_indexed_paragraphs(&paragraphs)),
        ];
        let reply = ctx.llm.invoke(&messages).await?;
        Ok(apply_fluency_edits(draft, &reply))
    }
}

#[async_trait]
impl Workflow for TranslationWorkflow {
    fn kind(&self) -> RequirementKind {
        RequirementKind::Translation
    }

    async fn run(&self, ctx: &WorkflowContext, request: &WorkflowRequest<'_>) -> Result<WorkflowOutput, WorkflowError> {
        let unit = request.unit_index()?;
        let mut machine = TranslationMachine::new(ctx.config.max_feedback_loops);
        let mut draft = String::new();
        let mut feedback: Option<String> = None;
        let mut approved = false;

        loop {
            match machine.state() {
                TranslationState::Translate => {
                    let previous = feedback.as_deref().map(|f| (draft.as_str(), f));
                    draft = Self::translate(ctx, request, previous).await?;
                    machine.advance(false);
                }
                TranslationState::IncrementCounter => {
                    machine.advance(false);
                }
                TranslationState::Review => {
                    let review = Self::review(ctx, request.text, &draft).await?;
                    approved = is_approved(&review, &ctx.config.approval_marker);
                    debug!(unit, round = machine.counter(), approved, "translation reviewed");
                    feedback = Some(review);
                    machine.advance(approved);
                }
                TranslationState::FluencyFinalize => {
                    draft = Self::polish(ctx, &draft).await?;
                    machine.advance(false);
                }
                TranslationState::Done => break,
            }
        }

        Ok(WorkflowOutput::Translation(TranslationOutcome {
            text: draft,
            rounds: machine.counter(),
            approved,
        }))
    }
}
