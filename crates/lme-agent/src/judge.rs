use std::sync::Arc;

use tracing::debug;

use lme_core::LmeResult;

use crate::completion::{CompletionClient, CompletionRequest, Message};

/// Decides whether a candidate answer matches the reference answer.
pub trait Judge: Send + Sync {
    fn evaluate(&self, question: &str, candidate: &str, reference: &str) -> LmeResult<bool>;
}

/// Semantic-equivalence judge backed by a completion model.
pub struct CompletionJudge {
    client: Arc<dyn CompletionClient>,
    model: String,
}

impl CompletionJudge {
    pub fn new(client: Arc<dyn CompletionClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

fn judge_prompt(question: &str, candidate: &str, reference: &str) -> String {
    format!(
        r#"You are evaluating the correctness of an answer to a question.

Question: {question}

Reference Answer: {reference}

Agent Answer: {candidate}

Determine if the Agent Answer is semantically equivalent to the Reference Answer.
- The answers don't need to match word-for-word
- They should convey the same core information
- Minor differences in phrasing or detail are acceptable
- If the agent says it doesn't know or can't answer, that's incorrect (unless the reference is about abstention)

Respond with ONLY one word: "CORRECT" or "INCORRECT""#
    )
}

impl Judge for CompletionJudge {
    fn evaluate(&self, question: &str, candidate: &str, reference: &str) -> LmeResult<bool> {
        let messages = [Message::user(judge_prompt(question, candidate, reference))];
        let completion = self.client.complete(&CompletionRequest {
            model: &self.model,
            messages: &messages,
            tools: &[],
            temperature: Some(0.0),
            max_tokens: Some(10),
        })?;
        let verdict = completion
            .message
            .content
            .unwrap_or_default()
            .trim()
            .to_uppercase();
        debug!("judge verdict: {verdict}");
        Ok(verdict == "CORRECT")
    }
}
