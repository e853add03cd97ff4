use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Args, CommandFactory, Parser, Subcommand};
use parambot_core::config::{BotConfig, load_config};
use parambot_core::driver::{RunDriver, RunReport};
use parambot_core::rules::{RULE_NAMES, build_rule};
use parambot_core::store::FilesystemStore;

#[derive(Debug, Parser)]
#[command(
    name = "parambot",
    version,
    about = "Batch template-parameter editing bot over a wiki content mirror"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    content_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    config: Option<PathBuf>,
    content_dir: Option<PathBuf>,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            config: cli.config.clone(),
            content_dir: cli.content_dir.clone(),
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Apply a rule to every page carrying the target template")]
    Run(RunArgs),
    #[command(about = "Print the resolved configuration")]
    Check,
    #[command(about = "List available rules")]
    Rules,
}

#[derive(Debug, Args)]
struct RunArgs {
    #[arg(long, value_name = "NAME", help = "Rule to apply (see `parambot rules`)")]
    rule: Option<String>,
    #[arg(long, help = "Log every decision without touching any page")]
    dry_run: bool,
    #[arg(long, value_name = "N", help = "Process at most N pages")]
    limit: Option<usize>,
    #[arg(long, value_name = "SECONDS", help = "Blocking pause between pages")]
    delay: Option<u64>,
    #[arg(long, value_name = "TEXT", help = "Edit summary for committed pages")]
    summary: Option<String>,
    #[arg(long, help = "Print the run report as JSON")]
    json: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let runtime = RuntimeOptions::from_cli(&cli);

    match cli.command {
        Some(Commands::Run(args)) => run_run(&runtime, args),
        Some(Commands::Check) => run_check(&runtime),
        Some(Commands::Rules) => run_rules(),
        None => {
            let mut command = Cli::command();
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn run_run(runtime: &RuntimeOptions, args: RunArgs) -> Result<()> {
    let mut config = resolve_config(runtime)?;
    if args.dry_run {
        config.run.dry_run = true;
    }
    if let Some(limit) = args.limit {
        config.run.page_limit = Some(limit);
    }
    if let Some(delay) = args.delay {
        config.run.delay_seconds = delay;
    }
    if let Some(summary) = args.summary {
        config.run.summary = summary;
    }
    if let Some(rule_name) = args.rule {
        config.run.rule = rule_name;
    }

    let rule = build_rule(&config.run.rule, &config)?;
    let driver = RunDriver::new(&config, rule.as_ref());
    let mut store = FilesystemStore::new(config.content_dir());

    let plan = driver.prepare(&store)?;

    // announce before anything is mutated, so the operator can still abort
    if plan.dry_run {
        println!("[[DRY RUN]]");
    } else {
        println!("[[🟠LIVE RUN🟠]]");
    }
    println!("SUMMARY: {}", plan.summary);
    println!("template: {}", plan.template);
    println!("rule: {}", rule.name());
    println!("Total pages to process: {}", plan.page_count());
    for path in &plan.sink_paths {
        println!("audit sink: {}", normalize_path(path));
    }
    if let Some(snapshot) = &plan.input_snapshot {
        println!(
            "input copy: {} (sha256 {})",
            normalize_path(&snapshot.copy_path),
            snapshot.sha256
        );
    }

    let report = driver.execute(&mut store, plan)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &RunReport) {
    println!("run finished");
    println!("dry_run: {}", format_flag(report.dry_run));
    println!("pages_seen: {}", report.pages_seen);
    println!("pages_edited: {}", report.pages_edited);
    println!("pages_skipped: {}", report.pages_skipped);
    println!("pages_failed: {}", report.pages_failed);
    println!(
        "pages_outside_namespace: {}",
        report.pages_outside_namespace
    );
}

fn run_check(runtime: &RuntimeOptions) -> Result<()> {
    let config = resolve_config(runtime)?;
    let content_dir = config.content_dir();

    println!("parambot configuration");
    println!("template: {}", config.run.template);
    println!("rule: {}", config.run.rule);
    println!("summary: {}", config.run.summary);
    println!("dry_run: {}", format_flag(config.dry_run()));
    println!(
        "page_limit: {}",
        config
            .run
            .page_limit
            .map(|limit| limit.to_string())
            .unwrap_or_else(|| "unlimited".to_string())
    );
    println!("delay_seconds: {}", config.run.delay_seconds);
    println!(
        "content_dir: {} ({})",
        normalize_path(&content_dir),
        exists_flag(&content_dir)
    );
    println!(
        "cumulative_log: {}",
        normalize_path(&config.paths.cumulative_log)
    );
    println!("run_log_dir: {}", normalize_path(&config.paths.run_log_dir));
    println!(
        "input_copy_dir: {}",
        normalize_path(&config.paths.input_copy_dir)
    );
    println!("input.enabled: {}", format_flag(config.input.enabled));
    println!(
        "input.path: {} ({})",
        normalize_path(&config.input.path),
        exists_flag(&config.input.path)
    );
    println!(
        "input.source_pages: {}",
        format_flag(config.input.source_pages)
    );
    match config.validate() {
        Ok(()) => println!("validate: ok"),
        Err(error) => println!("validate: {error}"),
    }
    Ok(())
}

fn run_rules() -> Result<()> {
    let config = BotConfig::default();
    println!("available rules");
    for name in RULE_NAMES {
        let rule = build_rule(name, &config)?;
        println!("{}: {}", rule.name(), rule.describe());
    }
    Ok(())
}

fn resolve_config(runtime: &RuntimeOptions) -> Result<BotConfig> {
    dotenvy::dotenv().ok();

    let config_path = runtime
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from("parambot.toml"));
    let mut config = load_config(&config_path)?;
    if let Some(content_dir) = &runtime.content_dir {
        config.paths.content_dir = content_dir.clone();
    }
    Ok(config)
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn format_flag(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

fn exists_flag(path: &Path) -> &'static str {
    if path.exists() { "found" } else { "missing" }
}
