//! Unit summaries

use super::{non_empty, prompts, Workflow, WorkflowContext, WorkflowError, WorkflowOutput, WorkflowRequest};
use crate::llm::Message;
use crate::model::RequirementKind;
use async_trait::async_trait;

pub struct SummaryWorkflow;

#[async_trait]
impl Workflow for SummaryWorkflow {
    fn kind(&self) -> RequirementKind {
        RequirementKind::Summary
    }

    async fn run(&self, ctx: &WorkflowContext, request: &WorkflowRequest<'_>) -> Result<WorkflowOutput, WorkflowError> {
        request.unit_index()?;

        let mut system = prompts::SUMMARY.to_string();
        let context = request.context.describe();
        if !context.is_empty() {
            system.push_str("\n\n");
            system.push_str(&context);
        }

        let reply = ctx.llm.invoke(&[Message::system(system), Message::user(request.text)]).await?;
        Ok(WorkflowOutput::Summary(non_empty(reply, "summary")?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkflowConfig;
    use crate::llm::MockGenerator;
    use crate::model::Target;
    use crate::storage::{OpenStore, SqliteStore};
    use crate::workflow::DocumentContext;
    use std::sync::Arc;

    fn context(mock: MockGenerator) -> WorkflowContext {
        WorkflowContext {
            llm: Arc::new(mock),
            store: Arc::new(SqliteStore::open_in_memory().unwrap()),
            config: WorkflowConfig::default(),
        }
    }

    #[tokio::test]
    async fn summarizes_unit_text() {
        let ctx = context(MockGenerator::new().with_response(prompts::SUMMARY, "  Jack sets sail.  "));
        let doc_context = DocumentContext::default();
        let request = WorkflowRequest {
            kind: RequirementKind::Summary,
            target: Target::Unit(2),
            text: "chapter text",
            context: &doc_context,
        };

        let output = SummaryWorkflow.run(&ctx, &request).await.unwrap();
        assert_eq!(output, WorkflowOutput::Summary("Jack sets sail.".to_string()));
    }

    #[tokio::test]
    async fn empty_summary_is_invalid() {
        let ctx = context(MockGenerator::new().with_response(prompts::SUMMARY, "   "));
        let doc_context = DocumentContext::default();
        let request = WorkflowRequest {
            kind: RequirementKind::Summary,
            target: Target::Unit(0),
            text: "chapter text",
            context: &doc_context,
        };

        let err = SummaryWorkflow.run(&ctx, &request).await.unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidOutput(_)));
    }
}
