//! Text generation client
//!
//! Workflows call a [`TextGenerator`] for every model-backed step. Two
//! implementations:
//! - `CommandGenerator`: spawns a configured command, prompt on stdin,
//!   reply on stdout (production)
//! - `MockGenerator`: returns scripted replies (testing)

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::Mutex;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Errors from text generation.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("text generator not available: {0}")]
    Unavailable(String),
    #[error("invocation failed: {0}")]
    InvocationFailed(String),
    #[error("response parse error: {0}")]
    ParseError(String),
}

/// Abstracts over how text is generated so workflows don't depend on a
/// particular model or transport.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate free text from a conversation.
    async fn invoke(&self, messages: &[Message]) -> Result<String, LlmError>;

    /// Generate JSON conforming to `schema`.
    ///
    /// The default asks for JSON in an extra system message and parses the
    /// reply, tolerating code fences and surrounding prose.
    async fn invoke_structured(
        &self,
        messages: &[Message],
        schema: &serde_json::Value,
    ) -> Result<serde_json::Value, LlmError> {
        let mut prompt = messages.to_vec();
        prompt.push(Message::system(format!(
            "Respond only with a JSON value matching this JSON schema:\n{}",
            schema
        )));
        let reply = self.invoke(&prompt).await?;
        parse_json_reply(&reply)
    }
}

/// Generate and deserialize a `T`, deriving the schema from the type.
pub async fn generate_typed<T>(llm: &dyn TextGenerator, messages: &[Message]) -> Result<T, LlmError>
where
    T: DeserializeOwned + JsonSchema,
{
    let schema = serde_json::to_value(schemars::schema_for!(T))
        .map_err(|e| LlmError::ParseError(format!("schema: {}", e)))?;
    let value = llm.invoke_structured(messages, &schema).await?;
    serde_json::from_value(value).map_err(|e| LlmError::ParseError(e.to_string()))
}

/// Extract the JSON value from a model reply.
pub fn parse_json_reply(reply: &str) -> Result<serde_json::Value, LlmError> {
    let trimmed = reply.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Ok(value);
    }

    let unfenced = strip_code_fence(trimmed);
    if let Ok(value) = serde_json::from_str(unfenced) {
        return Ok(value);
    }

    // first opening bracket to last matching closing bracket
    let start = unfenced.find(['{', '[']);
    let end = unfenced.rfind(['}', ']']);
    if let (Some(start), Some(end)) = (start, end) {
        if start < end {
            if let Ok(value) = serde_json::from_str(&unfenced[start..=end]) {
                return Ok(value);
            }
        }
    }

    Err(LlmError::ParseError(format!(
        "no JSON value in reply: {}",
        truncate(trimmed, 120)
    )))
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // drop the language tag line
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        format!("{}...", text.chars().take(max).collect::<String>())
    }
}

/// Render a conversation as plain text for command-line generators.
pub fn render_transcript(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| {
            let role = match m.role {
                Role::System => "SYSTEM",
                Role::User => "USER",
                Role::Assistant => "ASSISTANT",
            };
            format!("{}:\n{}", role, m.content)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

// ================================================================================
// Command generator
// ================================================================================

/// Runs an external command per call: the transcript goes to stdin and the
/// trimmed stdout is the reply.
pub struct CommandGenerator {
    program: String,
    args: Vec<String>,
}

impl CommandGenerator {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[async_trait]
impl TextGenerator for CommandGenerator {
    async fn invoke(&self, messages: &[Message]) -> Result<String, LlmError> {
        let mut child = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => LlmError::Unavailable(format!("{}: {}", self.program, e)),
                _ => LlmError::InvocationFailed(format!("spawn {}: {}", self.program, e)),
            })?;

        // stdin is written while stdout is drained; stdin closes when the
        // write finishes
        let stdin = child.stdin.take();
        let prompt = render_transcript(messages);
        let write = async move {
            let Some(mut stdin) = stdin else {
                return Ok(());
            };
            match stdin.write_all(prompt.as_bytes()).await {
                Ok(()) => Ok(()),
                // child exited without reading the whole prompt
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
                Err(e) => Err(LlmError::InvocationFailed(format!("write prompt: {}", e))),
            }
        };
        let read = async move {
            child
                .wait_with_output()
                .await
                .map_err(|e| LlmError::InvocationFailed(e.to_string()))
        };
        let ((), output) = tokio::try_join!(write, read)?;

        if !output.status.success() {
            return Err(LlmError::InvocationFailed(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

// ================================================================================
// Mock generator
// ================================================================================

struct MockRule {
    needle: String,
    replies: VecDeque<Result<String, String>>,
}

/// Mock generator for testing: replies are scripted per prompt substring.
///
/// The first rule whose needle occurs in any message wins. Each rule plays
/// its replies in order and then repeats the last one.
pub struct MockGenerator {
    available: bool,
    rules: Mutex<Vec<MockRule>>,
    fallback: Option<String>,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self {
            available: true,
            rules: Mutex::new(Vec::new()),
            fallback: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    fn push_reply(self, needle: String, reply: Result<String, String>) -> Self {
        if let Ok(mut rules) = self.rules.lock() {
            match rules.iter_mut().find(|r| r.needle == needle) {
                Some(rule) => rule.replies.push_back(reply),
                None => rules.push(MockRule {
                    needle,
                    replies: VecDeque::from([reply]),
                }),
            }
        }
        self
    }

    /// Queue a reply for prompts containing `needle`.
    pub fn with_response(self, needle: impl Into<String>, reply: impl Into<String>) -> Self {
        self.push_reply(needle.into(), Ok(reply.into()))
    }

    /// Queue a failure for prompts containing `needle`.
    pub fn with_failure(self, needle: impl Into<String>, message: impl Into<String>) -> Self {
        self.push_reply(needle.into(), Err(message.into()))
    }

    /// Reply for prompts no rule matches.
    pub fn with_fallback(mut self, reply: impl Into<String>) -> Self {
        self.fallback = Some(reply.into());
        self
    }

    pub fn calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Number of calls whose prompt contained `needle`.
    pub fn call_count(&self, needle: &str) -> usize {
        self.calls()
            .iter()
            .filter(|messages| messages.iter().any(|m| m.content.contains(needle)))
            .count()
    }
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    async fn invoke(&self, messages: &[Message]) -> Result<String, LlmError> {
        if !self.available {
            return Err(LlmError::Unavailable("mock generator configured as unavailable".to_string()));
        }

        if let Ok(mut calls) = self.calls.lock() {
            calls.push(messages.to_vec());
        }

        let mut rules = self
            .rules
            .lock()
            .map_err(|_| LlmError::InvocationFailed("mock rules poisoned".to_string()))?;
        let rule = rules
            .iter_mut()
            .find(|rule| messages.iter().any(|m| m.content.contains(&rule.needle)));

        let reply = match rule {
            Some(rule) if rule.replies.len() > 1 => rule.replies.pop_front(),
            Some(rule) => rule.replies.front().cloned(),
            None => self.fallback.clone().map(Ok),
        };

        match reply {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(LlmError::InvocationFailed(message)),
            None => Err(LlmError::InvocationFailed(format!(
                "no mock reply for prompt: {}",
                truncate(&render_transcript(messages), 80)
            ))),
        }
    }
}
