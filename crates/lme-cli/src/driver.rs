//! Evaluation driver: one adapter, many questions, one results file.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use lme_agent::{Judge, ReactAgent, Trace};
use lme_core::{Environment, LmeResult};
use lme_tools::{AdapterKind, MemoryAdapter};

pub const QUESTIONS_FILE: &str = "evaluation/lme_s_questions.json";
pub const ENVIRONMENTS_DIR: &str = "environments";

#[derive(Debug, Clone, Deserialize)]
pub struct Question {
    pub question_id: String,
    #[serde(default)]
    pub question_type: Option<String>,
    pub question: String,
    #[serde(deserialize_with = "answer_text")]
    pub answer: String,
}

/// Some reference answers are numbers; keep their JSON text.
fn answer_text<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) => s,
        other => other.to_string(),
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionResult {
    pub question_id: String,
    pub question: String,
    pub gold_answer: String,
    pub agent_answer: String,
    pub correct: bool,
    pub time_seconds: f64,
    pub tokens: u64,
    pub cost_usd: f64,
    pub tool_calls: usize,
    pub iterations: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub memory_type: String,
    pub filesystem_enabled: bool,
    pub num_questions: usize,
    pub accuracy: f64,
    pub avg_time_seconds: f64,
    pub avg_tokens: f64,
    pub total_cost_usd: f64,
    pub avg_iterations: f64,
    pub timestamp: String,
    pub run_id: String,
}

pub fn environment_dir(data_dir: &Path, question_id: &str) -> PathBuf {
    data_dir.join(ENVIRONMENTS_DIR).join(question_id)
}

/// Questions that have an environment directory, filtered by id and then
/// truncated to `samples`.
pub fn load_questions(
    data_dir: &Path,
    samples: Option<usize>,
    sample_ids: &[String],
) -> Result<Vec<Question>> {
    let path = data_dir.join(QUESTIONS_FILE);
    let content =
        fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
    let all: Vec<Question> =
        serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;

    let mut questions: Vec<Question> = all
        .into_iter()
        .filter(|q| sample_ids.is_empty() || sample_ids.contains(&q.question_id))
        .filter(|q| {
            let present = environment_dir(data_dir, &q.question_id).is_dir();
            if !present {
                warn!("skipping {}: no environment directory", q.question_id);
            }
            present
        })
        .collect();
    if let Some(n) = samples {
        questions.truncate(n);
    }
    Ok(questions)
}

struct Attempt {
    answer: String,
    trace: Trace,
    correct: bool,
    seconds: f64,
}

fn attempt(
    adapter: &mut dyn MemoryAdapter,
    agent: &ReactAgent,
    judge: &dyn Judge,
    question: &Question,
    env_dir: &Path,
) -> LmeResult<Attempt> {
    let env = Environment::load(env_dir)?;
    info!(
        "{} ({}): {} sessions in environment",
        question.question_id,
        question.question_type.as_deref().unwrap_or("untyped"),
        env.len()
    );
    adapter.set_environment(Arc::new(env))?;

    // index builds are excluded from the timed region
    let started = Instant::now();
    let (answer, trace) = agent.run(&question.question, &*adapter)?;
    let seconds = started.elapsed().as_secs_f64();
    let correct = judge.evaluate(&question.question, &answer, &question.answer)?;
    Ok(Attempt {
        answer,
        trace,
        correct,
        seconds,
    })
}

/// Run one question end to end. Service failures are recorded on the
/// result instead of being returned, with a zero time.
pub fn evaluate_question(
    adapter: &mut dyn MemoryAdapter,
    agent: &ReactAgent,
    judge: &dyn Judge,
    question: &Question,
    env_dir: &Path,
) -> QuestionResult {
    let base = QuestionResult {
        question_id: question.question_id.clone(),
        question: question.question.clone(),
        gold_answer: question.answer.clone(),
        agent_answer: String::new(),
        correct: false,
        time_seconds: 0.0,
        tokens: 0,
        cost_usd: 0.0,
        tool_calls: 0,
        iterations: 0,
        error: None,
    };
    match attempt(adapter, agent, judge, question, env_dir) {
        Ok(a) => QuestionResult {
            agent_answer: a.answer,
            correct: a.correct,
            time_seconds: a.seconds,
            tokens: a.trace.total_tokens,
            cost_usd: a.trace.total_cost,
            tool_calls: a.trace.tool_calls,
            iterations: a.trace.iterations,
            ..base
        },
        Err(e) => {
            warn!("{} failed: {e}", question.question_id);
            QuestionResult {
                error: Some(e.to_string()),
                ..base
            }
        }
    }
}

pub fn run_questions(
    adapter: &mut dyn MemoryAdapter,
    agent: &ReactAgent,
    judge: &dyn Judge,
    questions: &[Question],
    data_dir: &Path,
) -> Vec<QuestionResult> {
    let total = questions.len();
    let mut results = Vec::with_capacity(total);
    for (i, q) in questions.iter().enumerate() {
        let env_dir = environment_dir(data_dir, &q.question_id);
        let r = evaluate_question(adapter, agent, judge, q, &env_dir);
        let verdict = match (&r.error, r.correct) {
            (Some(_), _) => "FAILED",
            (None, true) => "correct",
            (None, false) => "incorrect",
        };
        eprintln!(
            "  [{}/{total}] {} {verdict} ({:.1}s, {} tokens, {} tool calls)",
            i + 1,
            q.question_id,
            r.time_seconds,
            r.tokens,
            r.tool_calls
        );
        results.push(r);
    }
    results
}

fn mean(values: impl Iterator<Item = f64>, n: usize) -> f64 {
    if n == 0 {
        0.0
    } else {
        values.sum::<f64>() / n as f64
    }
}

pub fn summarize(
    kind: AdapterKind,
    filesystem_enabled: bool,
    results: &[QuestionResult],
    timestamp: &str,
    run_id: &str,
) -> Summary {
    let n = results.len();
    Summary {
        memory_type: kind.to_string(),
        filesystem_enabled,
        num_questions: n,
        accuracy: mean(results.iter().map(|r| f64::from(u8::from(r.correct))), n),
        avg_time_seconds: mean(results.iter().map(|r| r.time_seconds), n),
        avg_tokens: mean(results.iter().map(|r| r.tokens as f64), n),
        total_cost_usd: results.iter().map(|r| r.cost_usd).sum(),
        avg_iterations: mean(results.iter().map(|r| r.iterations as f64), n),
        timestamp: timestamp.to_string(),
        run_id: run_id.to_string(),
    }
}

/// Write `results_<ts>.json` and `summary_<ts>.json`; returns both paths.
pub fn write_outputs(
    output_dir: &Path,
    results: &[QuestionResult],
    summary: &Summary,
) -> Result<(PathBuf, PathBuf)> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("creating {}", output_dir.display()))?;
    let results_path = output_dir.join(format!("results_{}.json", summary.timestamp));
    let summary_path = output_dir.join(format!("summary_{}.json", summary.timestamp));
    fs::write(&results_path, serde_json::to_string_pretty(results)?)
        .with_context(|| format!("writing {}", results_path.display()))?;
    fs::write(&summary_path, serde_json::to_string_pretty(summary)?)
        .with_context(|| format!("writing {}", summary_path.display()))?;
    Ok((results_path, summary_path))
}
