use anyhow::{Context, Result, bail};
use clap::Parser;
use owo_colors::OwoColorize;
use proposal_engine::batch::{BatchEvent, BatchReport, BatchScheduler};
use proposal_engine::cli::{Cli, Commands, Manifest};
use proposal_engine::config::EngineConfig;
use proposal_engine::gateway::Gateway;
use proposal_engine::pipeline::{JobState, Orchestrator, StdoutSink};
use proposal_engine::providers::{Credentials, build_registry};
use proposal_engine::template::{InMemoryTemplateStore, TemplateCategory, TemplateStore};
use proposal_engine::transcript::{ChunkPlan, format_timestamp};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    proposal_engine::logging::init(cli.verbose);

    let config = load_config(cli.config.as_deref(), cli.concurrency)?;

    match cli.command {
        Commands::Run {
            manifest,
            intermediate,
            json,
        } => {
            let report = run_manifest(config, &manifest, intermediate).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_summary(&report);
            }
            if report.failed() > 0 || report.halted_on_auth {
                std::process::exit(1);
            }
        }
        Commands::Models { provider } => list_models(&config, provider.as_deref()),
        Commands::Templates { category } => list_templates(category.as_deref())?,
        Commands::Plan { duration } => {
            let plan = ChunkPlan::for_duration(duration, &config.chunking);
            println!(
                "{} -> {} window(s)",
                format_timestamp(plan.duration),
                plan.len()
            );
            for (window, owned) in plan.windows.iter().zip(plan.owned_spans()) {
                println!(
                    "  #{:<3} {}  overlap {:>4}s  owns {}",
                    window.index + 1,
                    window.range,
                    window.overlap_with_previous.as_secs(),
                    owned
                );
            }
        }
    }

    Ok(())
}

/// Load configuration: custom path, else default path or defaults; then env
/// overrides, the `--concurrency` flag and validation.
fn load_config(custom_path: Option<&Path>, concurrency: Option<usize>) -> Result<EngineConfig> {
    let config = if let Some(path) = custom_path {
        EngineConfig::load(path)?
    } else {
        EngineConfig::load_or_default(&EngineConfig::default_path())?
    };
    let mut config = config.with_env_overrides()?;
    if let Some(limit) = concurrency {
        config.batch.concurrency_limit = limit;
    }
    config.validate()?;
    Ok(config)
}

async fn run_manifest(config: EngineConfig, path: &Path, intermediate: bool) -> Result<BatchReport> {
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    let jobs = Manifest::load(path)
        .and_then(|m| m.into_jobs(base))
        .with_context(|| format!("Failed to load manifest {}", path.display()))?;
    if jobs.is_empty() {
        bail!("Manifest {} lists no jobs", path.display());
    }

    let credentials = Credentials::from_env(&config.providers);
    let registry = build_registry(&credentials, &config.providers);
    if registry.is_empty() {
        bail!(
            "No provider credentials found. Set {} or {}.",
            config.providers.api_key_env("gemini"),
            config.providers.api_key_env("qwen")
        );
    }

    let limit = config.batch.concurrency_limit;
    let config = Arc::new(config);
    let gateway = Arc::new(Gateway::new(
        registry,
        config.model_catalog(),
        &config.gateway,
    ));
    let templates: Arc<dyn TemplateStore> = Arc::new(InMemoryTemplateStore::builtin()?);
    let orchestrator = Orchestrator::new(Arc::clone(&gateway), templates, Arc::clone(&config))
        .with_sink(Arc::new(StdoutSink::new(intermediate)));

    let (tx, mut rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            print_event(&event);
        }
    });

    let report = BatchScheduler::new(orchestrator)
        .with_events(tx)
        .submit(jobs, limit)
        .await;
    // The scheduler dropped its sender; drain the remaining events.
    printer.await.context("Event printer failed")?;
    Ok(report)
}

fn print_event(event: &BatchEvent) {
    match event {
        BatchEvent::Admitted { job, .. } => eprintln!("{} {}", "started ".cyan(), job),
        BatchEvent::StateChanged(status) => {
            if !status.state.is_terminal() {
                eprintln!("{} {} {}", "  stage ".dimmed(), status.id, status.state);
            }
        }
        BatchEvent::Finished {
            job, state, error, ..
        } => match (state, error) {
            (JobState::Succeeded, _) => eprintln!("{} {}", "done    ".green(), job),
            (_, Some(error)) => eprintln!("{} {}: {}", "failed  ".red(), job, error),
            (state, None) => eprintln!("{} {} ({})", "stopped ".yellow(), job, state),
        },
        BatchEvent::Halted { job } => eprintln!(
            "{} authentication failed in {}; no further jobs will start",
            "halted  ".red().bold(),
            job
        ),
    }
}

fn print_summary(report: &BatchReport) {
    println!();
    println!("{}", "Batch summary".bold());
    for job in &report.jobs {
        let state = match job.state {
            JobState::Succeeded => job.state.green().to_string(),
            JobState::Failed => job.state.red().to_string(),
            _ => job.state.yellow().to_string(),
        };
        let detail = match (&job.error, job.last_stage) {
            (Some(error), _) => error.to_string(),
            (None, Some(stage)) if job.state != JobState::Succeeded => {
                format!("stopped after {stage}")
            }
            _ => String::new(),
        };
        println!(
            "  {:<20} {:<10} {:>8} tokens  ${:<8.4} {}",
            job.id.as_str(),
            state,
            job.usage.total_tokens(),
            job.usage.cost,
            detail
        );
    }
    println!(
        "  {} succeeded, {} failed, {} cancelled; {} tokens, ${:.4}, {:.1}s",
        report.succeeded(),
        report.failed(),
        report.count(JobState::Cancelled),
        report.usage.total_tokens(),
        report.usage.cost,
        report.elapsed.as_secs_f64()
    );
    if report.halted_on_auth {
        println!("  {}", "Admission halted after an authentication failure.".red());
    }
}

fn list_models(config: &EngineConfig, provider: Option<&str>) {
    let catalog = config.model_catalog();
    println!(
        "{:<10} {:<24} {:<28} {:>10} {:>10}  {}",
        "PROVIDER", "MODEL", "NAME", "IN $/1M", "OUT $/1M", "AUDIO"
    );
    for model in catalog
        .iter()
        .filter(|m| provider.is_none_or(|p| m.provider.eq_ignore_ascii_case(p)))
    {
        println!(
            "{:<10} {:<24} {:<28} {:>10.3} {:>10.3}  {}",
            model.provider,
            model.api_name,
            model.display_name,
            model.input_price_per_million,
            model.output_price_per_million,
            if model.supports_audio { "yes" } else { "no" }
        );
    }
}

fn list_templates(category: Option<&str>) -> Result<()> {
    let store = InMemoryTemplateStore::builtin()?;
    let categories = match category {
        Some(name) => vec![name.parse::<TemplateCategory>()?],
        None => TemplateCategory::ALL.to_vec(),
    };
    for category in categories {
        println!("{}", category.to_string().bold());
        for name in store.list(category) {
            let template = store.get(category, &name)?;
            println!("  {:<24} {{{}}}", name, template.variables.join("}, {"));
        }
    }
    Ok(())
}
