pub mod accountant;
pub mod completion;
pub mod judge;
pub mod react;

pub use accountant::{ModelPrice, PriceTable, UsageAccountant};
pub use completion::{
    Completion, CompletionClient, CompletionRequest, Message, OpenAiClient, Role, ToolCall, Usage,
};
pub use judge::{CompletionJudge, Judge};
pub use react::{AgentConfig, ReactAgent, Termination, Trace, EXHAUSTED_ANSWER, SYSTEM_PROMPT};
