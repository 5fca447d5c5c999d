//! ReAct loop: alternate completions and tool executions until the model
//! answers without calling a tool or the iteration budget runs out.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use lme_core::LmeResult;
use lme_tools::MemoryAdapter;

use crate::accountant::{PriceTable, UsageAccountant};
use crate::completion::{CompletionClient, CompletionRequest, Message, ToolCall};

pub const SYSTEM_PROMPT: &str = "You are a helpful assistant with access to a user's conversation history. Use the available tools to search through the conversation history and answer the user's question accurately. If you cannot find the answer, say 'I don't have enough information to answer that question.'";

pub const EXHAUSTED_ANSWER: &str = "I ran out of time to answer this question.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    Done,
    Exhausted,
}

/// Summary of one loop run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub total_tokens: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_cost: f64,
    pub tool_calls: usize,
    pub iterations: usize,
    pub termination: Termination,
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub model: String,
    pub max_iterations: usize,
    pub temperature: Option<f32>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o".into(),
            max_iterations: 5,
            temperature: None,
        }
    }
}

enum LoopState {
    Init,
    AwaitingCompletion,
    ToolExecution(Vec<ToolCall>),
    Done(String),
    Exhausted,
}

pub struct ReactAgent {
    client: Arc<dyn CompletionClient>,
    prices: PriceTable,
    config: AgentConfig,
}

impl ReactAgent {
    pub fn new(client: Arc<dyn CompletionClient>, config: AgentConfig) -> Self {
        Self {
            client,
            prices: PriceTable::default(),
            config,
        }
    }

    pub fn with_prices(mut self, prices: PriceTable) -> Self {
        self.prices = prices;
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Answer `question` using the tools of `adapter`, whose environment must
    /// already be set. Completion failures and tool-side service failures
    /// abort the run.
    pub fn run(&self, question: &str, adapter: &dyn MemoryAdapter) -> LmeResult<(String, Trace)> {
        let mut messages: Vec<Message> = Vec::new();
        let mut tools: Vec<Value> = Vec::new();
        let mut usage = UsageAccountant::new(&self.prices, &self.config.model);
        let mut tool_calls = 0usize;
        let mut iterations = 0usize;
        let mut state = LoopState::Init;

        let (answer, termination) = loop {
            state = match state {
                LoopState::Init => {
                    messages.push(Message::system(SYSTEM_PROMPT));
                    messages.push(Message::user(question));
                    tools = adapter
                        .tools()
                        .iter()
                        .map(|t| t.to_function_schema())
                        .collect();
                    debug!("{} exposes {} tool(s)", adapter.name(), tools.len());
                    LoopState::AwaitingCompletion
                }
                LoopState::AwaitingCompletion => {
                    if iterations >= self.config.max_iterations {
                        LoopState::Exhausted
                    } else {
                        iterations += 1;
                        let request = CompletionRequest {
                            model: &self.config.model,
                            messages: &messages,
                            tools: &tools,
                            temperature: self.config.temperature,
                            max_tokens: None,
                        };
                        let completion = self.client.complete(&request)?;
                        let cost = usage.record(&completion.usage);
                        debug!(
                            "iteration {iterations}: {} tokens, ${cost:.5}, {} tool call(s)",
                            completion.usage.total_tokens,
                            completion.message.tool_calls.len()
                        );
                        let calls = completion.message.tool_calls.clone();
                        let content = completion.message.content.clone();
                        messages.push(completion.message);
                        if calls.is_empty() {
                            LoopState::Done(content.unwrap_or_default())
                        } else {
                            LoopState::ToolExecution(calls)
                        }
                    }
                }
                LoopState::ToolExecution(calls) => {
                    for call in &calls {
                        let output = match parse_arguments(&call.arguments) {
                            Ok(args) => {
                                debug!("tool {} args {}", call.name, args);
                                adapter.execute_tool(&call.name, &args)?
                            }
                            Err(e) => {
                                warn!("bad arguments for {}: {e}", call.name);
                                format!("Error: Invalid arguments for {}: {e}", call.name)
                            }
                        };
                        messages.push(Message::tool_result(&call.id, output));
                    }
                    tool_calls += calls.len();
                    LoopState::AwaitingCompletion
                }
                LoopState::Done(answer) => break (answer, Termination::Done),
                LoopState::Exhausted => {
                    info!("no final answer after {iterations} iteration(s)");
                    break (EXHAUSTED_ANSWER.to_string(), Termination::Exhausted);
                }
            };
        };

        let trace = Trace {
            total_tokens: usage.total_tokens,
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_cost: usage.total_cost,
            tool_calls,
            iterations,
            termination,
        };
        Ok((answer, trace))
    }
}

/// Tool arguments must be a JSON object. An empty payload means no arguments.
fn parse_arguments(raw: &str) -> Result<Value, String> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(v @ Value::Object(_)) => Ok(v),
        Ok(_) => Err("expected a JSON object".into()),
        Err(e) => Err(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::completion::{Completion, Usage};
    use lme_core::{Environment, LmeError};
    use lme_tools::{ParamSpec, ToolDescriptor};

    fn usage() -> Usage {
        Usage {
            prompt_tokens: 1000,
            completion_tokens: 100,
            total_tokens: 1100,
        }
    }

    fn call(id: &str, name: &str, args: &str) -> ToolCall {
        ToolCall {
            id: id.into(),
            name: name.into(),
            arguments: args.into(),
        }
    }

    /// Replays a script of assistant messages, then repeats the last one.
    struct Scripted {
        script: Vec<Message>,
        seen: Mutex<Vec<(usize, usize)>>,
    }

    impl Scripted {
        fn new(script: Vec<Message>) -> Self {
            Self {
                script,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl CompletionClient for Scripted {
        fn complete(&self, request: &CompletionRequest<'_>) -> LmeResult<Completion> {
            let mut seen = self.seen.lock().unwrap();
            seen.push((request.messages.len(), request.tools.len()));
            let i = (seen.len() - 1).min(self.script.len() - 1);
            Ok(Completion {
                message: self.script[i].clone(),
                usage: usage(),
            })
        }
    }

    struct Down;

    impl CompletionClient for Down {
        fn complete(&self, _request: &CompletionRequest<'_>) -> LmeResult<Completion> {
            Err(LmeError::Completion("HTTP 503".into()))
        }
    }

    /// Echoes tool name and arguments back as output.
    struct EchoAdapter {
        calls: Mutex<Vec<String>>,
        fail: bool,
    }

    impl EchoAdapter {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail: false,
            }
        }
    }

    impl MemoryAdapter for EchoAdapter {
        fn name(&self) -> &'static str {
            "echo"
        }
        fn set_environment(&mut self, _env: Arc<Environment>) -> LmeResult<()> {
            Ok(())
        }
        fn tools(&self) -> Vec<ToolDescriptor> {
            vec![ToolDescriptor::new("search_memory", "echo")
                .param(ParamSpec::string("query", "text"))]
        }
        fn execute_tool(&self, name: &str, args: &Value) -> LmeResult<String> {
            if self.fail {
                return Err(LmeError::Embedding("embedding service down".into()));
            }
            self.calls.lock().unwrap().push(name.to_string());
            Ok(format!("{name} {args}"))
        }
    }

    fn agent(client: Arc<dyn CompletionClient>, max_iterations: usize) -> ReactAgent {
        ReactAgent::new(
            client,
            AgentConfig {
                max_iterations,
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_answer_without_tools_takes_one_iteration() {
        let client = Arc::new(Scripted::new(vec![Message::assistant("Blue.")]));
        let adapter = EchoAdapter::new();
        let (answer, trace) = agent(client.clone(), 5).run("color?", &adapter).unwrap();
        assert_eq!(answer, "Blue.");
        assert_eq!(trace.iterations, 1);
        assert_eq!(trace.tool_calls, 0);
        assert_eq!(trace.termination, Termination::Done);
        assert_eq!(trace.total_tokens, 1100);
        // system + user, one tool schema
        assert_eq!(client.seen.lock().unwrap()[0], (2, 1));
    }

    #[test]
    fn test_always_calling_tools_exhausts() {
        let client = Arc::new(Scripted::new(vec![Message::assistant_calls(vec![call(
            "c",
            "search_memory",
            r#"{"query":"x"}"#,
        )])]));
        let adapter = EchoAdapter::new();
        let (answer, trace) = agent(client, 4).run("q", &adapter).unwrap();
        assert_eq!(answer, EXHAUSTED_ANSWER);
        assert_eq!(trace.iterations, 4);
        assert_eq!(trace.tool_calls, 4);
        assert_eq!(trace.termination, Termination::Exhausted);
        assert_eq!(trace.total_tokens, 4 * 1100);
        let expected_cost = 4.0 * (1000.0 / 1e6 * 2.50 + 100.0 / 1e6 * 10.00);
        assert!((trace.total_cost - expected_cost).abs() < 1e-12);
    }

    #[test]
    fn test_multi_call_turn_appends_one_result_per_call() {
        let client = Arc::new(Scripted::new(vec![
            Message::assistant_calls(vec![
                call("a", "search_memory", r#"{"query":"one"}"#),
                call("b", "list_sessions", ""),
            ]),
            Message::assistant("Done."),
        ]));
        let adapter = EchoAdapter::new();
        let (answer, trace) = agent(client.clone(), 5).run("q", &adapter).unwrap();
        assert_eq!(answer, "Done.");
        assert_eq!(trace.iterations, 2);
        assert_eq!(trace.tool_calls, 2);
        assert_eq!(
            *adapter.calls.lock().unwrap(),
            vec!["search_memory".to_string(), "list_sessions".to_string()]
        );
        // system, user, assistant calls, two tool results
        assert_eq!(client.seen.lock().unwrap()[1].0, 5);
    }

    #[test]
    fn test_bad_arguments_become_tool_output() {
        let client = Arc::new(Scripted::new(vec![
            Message::assistant_calls(vec![
                call("a", "search_memory", "{not json"),
                call("b", "search_memory", "[1,2]"),
            ]),
            Message::assistant("ok"),
        ]));
        let adapter = EchoAdapter::new();
        let (answer, trace) = agent(client, 5).run("q", &adapter).unwrap();
        assert_eq!(answer, "ok");
        assert_eq!(trace.tool_calls, 2);
        assert!(adapter.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_missing_content_yields_empty_answer() {
        let client = Arc::new(Scripted::new(vec![Message {
            content: None,
            ..Message::assistant("")
        }]));
        let (answer, _) = agent(client, 5).run("q", &EchoAdapter::new()).unwrap();
        assert_eq!(answer, "");
    }

    #[test]
    fn test_service_failures_propagate() {
        let adapter = EchoAdapter::new();
        assert!(matches!(
            agent(Arc::new(Down), 5).run("q", &adapter),
            Err(LmeError::Completion(_))
        ));

        let client = Arc::new(Scripted::new(vec![Message::assistant_calls(vec![call(
            "a",
            "search_memory",
            "{}",
        )])]));
        let failing = EchoAdapter {
            fail: true,
            ..EchoAdapter::new()
        };
        assert!(matches!(
            agent(client, 5).run("q", &failing),
            Err(LmeError::Embedding(_))
        ));
    }

    #[test]
    fn test_parse_arguments() {
        assert_eq!(parse_arguments("").unwrap(), json!({}));
        assert_eq!(parse_arguments(r#"{"top_k":2}"#).unwrap(), json!({"top_k": 2}));
        assert_eq!(parse_arguments("3").unwrap_err(), "expected a JSON object");
        assert!(parse_arguments("{").is_err());
    }

    #[test]
    fn test_trace_serializes_termination() {
        let trace = Trace {
            total_tokens: 1,
            prompt_tokens: 1,
            completion_tokens: 0,
            total_cost: 0.0,
            tool_calls: 0,
            iterations: 1,
            termination: Termination::Exhausted,
        };
        let v = serde_json::to_value(&trace).unwrap();
        assert_eq!(v["termination"], "exhausted");
    }
}
