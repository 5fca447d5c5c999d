mod config;
mod driver;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;

use lme_agent::{AgentConfig, CompletionJudge, OpenAiClient, ReactAgent};
use lme_core::{CrossEncoder, Embedder, Environment, HttpEmbedder, HttpReranker};
use lme_tools::{build_adapter, AdapterKind, MemoryAdapter, Services};

use config::{Config, EmbeddingProvider};

#[derive(Parser)]
#[command(
    name = "lme",
    version,
    about = "Benchmark memory retrieval strategies for tool-using LLM agents"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the benchmark with one memory adapter
    Run {
        /// Memory adapter (oracle, filesystem, keyword, bm25, stella, bge, hybrid, reranker, fs-protocol)
        #[arg(short, long)]
        memory: AdapterKind,

        /// Evaluate only the first N questions
        #[arg(short, long)]
        samples: Option<usize>,

        /// Evaluate only these question ids (comma-separated)
        #[arg(long, value_delimiter = ',')]
        sample_ids: Vec<String>,

        /// Dataset root containing evaluation/ and environments/
        #[arg(long, default_value = "data")]
        data: PathBuf,

        /// Directory for results and summary files
        #[arg(short, long, default_value = "results")]
        output: PathBuf,

        /// Agent model (overrides config)
        #[arg(long)]
        model: Option<String>,

        /// Judge model (overrides config)
        #[arg(long)]
        judge_model: Option<String>,

        /// Iteration budget (overrides config)
        #[arg(long)]
        max_iterations: Option<usize>,

        /// Give the keyword adapter a read_session tool
        #[arg(long)]
        filesystem: bool,
    },

    /// Execute one tool against one environment, without an agent
    Inspect {
        /// Memory adapter
        #[arg(short, long)]
        memory: AdapterKind,

        /// Environment directory (containing chat_history/)
        #[arg(short, long)]
        env: PathBuf,

        /// Tool name; omit to list the adapter's tools
        #[arg(short, long)]
        tool: Option<String>,

        /// Tool arguments as a JSON object
        #[arg(short, long, default_value = "{}")]
        args: String,
    },

    /// Show the active configuration
    Config,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::WARN.into()),
        )
        .init();

    let cli = Cli::parse();
    let mut cfg = config::load_config()?;

    match cli.command {
        Commands::Run {
            memory,
            samples,
            sample_ids,
            data,
            output,
            model,
            judge_model,
            max_iterations,
            filesystem,
        } => {
            if let Some(m) = model {
                cfg.agent.model = m;
            }
            if let Some(m) = judge_model {
                cfg.judge.model = m;
            }
            if let Some(n) = max_iterations {
                cfg.agent.max_iterations = n;
            }
            if filesystem {
                cfg.retrieval.filesystem_tools = true;
            }
            cmd_run(&cfg, memory, samples, &sample_ids, &data, &output)
        }
        Commands::Inspect {
            memory,
            env,
            tool,
            args,
        } => cmd_inspect(&cfg, memory, &env, tool.as_deref(), &args),
        Commands::Config => cmd_config(&cfg),
    }
}

#[cfg(feature = "embeddings")]
fn local_embedder(model: &str) -> Result<Arc<dyn Embedder>> {
    Ok(Arc::new(lme_core::FastEmbedder::new(model)?))
}

#[cfg(not(feature = "embeddings"))]
fn local_embedder(_model: &str) -> Result<Arc<dyn Embedder>> {
    bail!("local embeddings need a build with `--features embeddings`")
}

#[cfg(feature = "embeddings")]
fn local_reranker(model: &str) -> Result<Arc<dyn CrossEncoder>> {
    Ok(Arc::new(lme_core::FastReranker::new(model)?))
}

#[cfg(not(feature = "embeddings"))]
fn local_reranker(_model: &str) -> Result<Arc<dyn CrossEncoder>> {
    bail!("local reranking needs a build with `--features embeddings`")
}

/// Build only the model services `kind` uses.
fn init_services(cfg: &Config, kind: AdapterKind) -> Result<Services> {
    let mut services = Services::default();
    if kind.needs_embedder() {
        let embedder: Arc<dyn Embedder> = match cfg.embedding.provider {
            EmbeddingProvider::Http => Arc::new(HttpEmbedder::new(cfg.embedding_endpoint())),
            EmbeddingProvider::Local => local_embedder(&cfg.embedding.model)?,
        };
        services.embedder = Some(embedder);
    }
    if kind.needs_cross_encoder() {
        let encoder: Arc<dyn CrossEncoder> = match cfg.rerank.provider {
            EmbeddingProvider::Http => Arc::new(HttpReranker::new(cfg.rerank_endpoint())),
            EmbeddingProvider::Local => local_reranker(cfg.local_rerank_model())?,
        };
        services.cross_encoder = Some(encoder);
    }
    Ok(services)
}

fn init_adapter(cfg: &Config, kind: AdapterKind) -> Result<Box<dyn MemoryAdapter>> {
    let services = init_services(cfg, kind)?;
    let mut adapter = build_adapter(kind, &cfg.retrieval_settings(), &services)?;
    adapter
        .warm_up()
        .with_context(|| format!("warming up {kind} adapter"))?;
    Ok(adapter)
}

fn cmd_run(
    cfg: &Config,
    kind: AdapterKind,
    samples: Option<usize>,
    sample_ids: &[String],
    data: &Path,
    output: &Path,
) -> Result<()> {
    let questions = driver::load_questions(data, samples, sample_ids)?;
    if questions.is_empty() {
        bail!("no questions with an environment under {}", data.display());
    }

    let mut adapter = init_adapter(cfg, kind)?;
    let client = Arc::new(OpenAiClient::new(cfg.completion_endpoint()));
    let agent = ReactAgent::new(
        client.clone(),
        AgentConfig {
            model: cfg.agent.model.clone(),
            max_iterations: cfg.agent.max_iterations,
            temperature: None,
        },
    )
    .with_prices(cfg.price_table());
    let judge = CompletionJudge::new(client, cfg.judge.model.clone());

    let run_id = ulid::Ulid::new().to_string();
    eprintln!(
        "Run {run_id}: {} question(s), memory={kind}, model={}",
        questions.len(),
        cfg.agent.model
    );

    let results = driver::run_questions(adapter.as_mut(), &agent, &judge, &questions, data);

    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
    let summary = driver::summarize(
        kind,
        cfg.retrieval.filesystem_tools,
        &results,
        &timestamp,
        &run_id,
    );
    let (results_path, summary_path) = driver::write_outputs(output, &results, &summary)?;

    let failed = results.iter().filter(|r| r.error.is_some()).count();
    println!();
    println!("Memory:      {kind}");
    println!("Questions:   {}", summary.num_questions);
    println!("Accuracy:    {:.1}%", summary.accuracy * 100.0);
    println!("Avg time:    {:.1}s", summary.avg_time_seconds);
    println!("Avg tokens:  {}", fmt_tokens(summary.avg_tokens as u64));
    println!("Avg iters:   {:.2}", summary.avg_iterations);
    println!("Total cost:  ${:.4}", summary.total_cost_usd);
    if failed > 0 {
        println!("Failed:      {failed}");
    }
    println!();
    println!("Results: {}", results_path.display());
    println!("Summary: {}", summary_path.display());
    Ok(())
}

fn cmd_inspect(
    cfg: &Config,
    kind: AdapterKind,
    env_dir: &Path,
    tool: Option<&str>,
    args: &str,
) -> Result<()> {
    let mut adapter = init_adapter(cfg, kind)?;
    let env = Environment::load(env_dir)?;
    eprintln!("{}: {} session(s)", env.name(), env.len());
    adapter.set_environment(Arc::new(env))?;

    let Some(tool) = tool else {
        for t in adapter.tools() {
            println!("{}", serde_json::to_string_pretty(&t.to_function_schema())?);
        }
        return Ok(());
    };

    let args: Value = serde_json::from_str(args).context("--args must be JSON")?;
    if !args.is_object() {
        bail!("--args must be a JSON object");
    }
    println!("{}", adapter.execute_tool(tool, &args)?);
    Ok(())
}

fn cmd_config(cfg: &Config) -> Result<()> {
    println!("Config: {}", config::show_config_path());
    println!();
    println!("[agent]");
    println!("  model = {}", cfg.agent.model);
    println!("  max_iterations = {}", cfg.agent.max_iterations);
    println!("  base_url = {}", cfg.agent.base_url);
    println!("  api_key_env = {}", cfg.agent.api_key_env);
    println!("  timeout_secs = {}", cfg.agent.timeout_secs);
    println!();
    println!("[judge]");
    println!("  model = {}", cfg.judge.model);
    println!();
    println!("[embedding]");
    println!("  provider = {:?}", cfg.embedding.provider);
    println!("  base_url = {}", cfg.embedding.base_url);
    println!("  model = {}", cfg.embedding.model);
    if let Some(ref instr) = cfg.embedding.query_instruction {
        println!("  query_instruction = {instr:?}");
    }
    println!();
    println!("[rerank]");
    println!("  provider = {:?}", cfg.rerank.provider);
    println!("  base_url = {}", cfg.rerank.base_url);
    println!("  model = {}", cfg.rerank.model);
    println!("  first_stage_k = {}", cfg.rerank.first_stage_k);
    println!();
    println!("[retrieval]");
    println!("  k1 = {}", cfg.retrieval.k1);
    println!("  b = {}", cfg.retrieval.b);
    println!("  default_top_k = {}", cfg.retrieval.default_top_k);
    println!("  hybrid_candidates = {}", cfg.retrieval.hybrid_candidates);
    println!("  keyword_scope = {:?}", cfg.retrieval.keyword_scope);
    println!("  filesystem_tools = {}", cfg.retrieval.filesystem_tools);
    println!("  grep_snippet_chars = {}", cfg.retrieval.grep_snippet_chars);
    println!("  max_multi_read = {}", cfg.retrieval.max_multi_read);
    if !cfg.pricing.is_empty() {
        println!();
        for (model, price) in &cfg.pricing {
            println!("[pricing.{model}]");
            println!("  input_per_million = {}", price.input_per_million);
            println!("  output_per_million = {}", price.output_per_million);
        }
    }
    Ok(())
}

fn fmt_tokens(n: u64) -> String {
    if n >= 1_000_000 {
        format!("{:.1}M", n as f64 / 1_000_000.0)
    } else if n >= 1000 {
        format!("{:.1}k", n as f64 / 1000.0)
    } else {
        format!("{n}")
    }
}
