//! Cashier monitor CLI
//!
//! Usage:
//!   cashier-monitor run                     # walk every flow, archive and email the screenshots
//!   cashier-monitor run --json              # print the run summary as JSON
//!   cashier-monitor validate                # check flow files without a device
//!   cashier-monitor doctor                  # adb + Appium diagnostics
//!   cashier-monitor check-smtp              # test the SMTP relay

use anyhow::{Context, Result};
use cashier::adb::{self, DeviceBridge};
use cashier::flow::{self, FlowSource};
use cashier::health::{self, HealthCheckResult, HealthStatus};
use cashier::platforms::AppiumConnector;
use cashier::{Monitor, MonitorConfig, RunSummary};
use clap::{Parser, Subcommand};
use colored::*;
use std::env;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cashier-monitor")]
#[command(about = "Screenshot the cashier screens of mobile payment apps through Appium")]
struct Cli {
    /// YAML configuration file
    #[clap(long, short = 'c', global = true, env = "CASHIER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every flow and deliver the screenshot archive
    Run(RunArgs),
    /// Parse flow files and report configuration problems
    Validate(ValidateArgs),
    /// Diagnose adb and the Appium server
    Doctor(DoctorArgs),
    /// Test the SMTP relay connection
    CheckSmtp(JsonArgs),
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Override the flow directory
    #[clap(long)]
    flows: Option<PathBuf>,

    /// Skip email delivery for this run
    #[clap(long)]
    no_email: bool,

    /// Print the run summary as JSON
    #[clap(long)]
    json: bool,
}

#[derive(Parser, Debug)]
struct ValidateArgs {
    /// Override the flow directory
    #[clap(long)]
    flows: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct DoctorArgs {
    /// Uninstall stale UiAutomator2 server packages
    #[clap(long)]
    reset_uiautomator2: bool,

    /// Do not kill running adb processes first
    #[clap(long)]
    keep_adb: bool,

    /// Skip opening a test session
    #[clap(long)]
    skip_session: bool,

    #[clap(long)]
    json: bool,
}

#[derive(Parser, Debug)]
struct JsonArgs {
    #[clap(long)]
    json: bool,
}

fn init_logging() {
    let log_level = env::var("LOG_LEVEL")
        .map(|level| match level.to_lowercase().as_str() {
            "error" => Level::ERROR,
            "warn" => Level::WARN,
            "info" => Level::INFO,
            "debug" => Level::DEBUG,
            _ => Level::INFO,
        })
        .unwrap_or(Level::INFO);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_logging();

    let cli = Cli::parse();
    let config =
        MonitorConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Run(args) => run(config, args).await,
        Commands::Validate(args) => validate(config, args),
        Commands::Doctor(args) => doctor(config, args).await,
        Commands::CheckSmtp(args) => check_smtp(config, args).await,
    }
}

async fn run(mut config: MonitorConfig, args: RunArgs) -> Result<()> {
    if let Some(flows) = args.flows {
        config.flows.directory = flows;
    }
    if args.no_email {
        config.email.send_email = false;
    }

    let summary = Monitor::from_config(config)
        .run()
        .await
        .context("Monitoring run aborted")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }

    if summary.failed() > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!("{}", format!("Run {}", summary.run_stamp).bold());
    for outcome in &summary.outcomes {
        let status = if outcome.success {
            "✅ SUCCESS".green().bold()
        } else {
            "❌ FAILED ".red().bold()
        };
        let shot = outcome
            .screenshot
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "no screenshot".dimmed().to_string());
        println!("  {status} {:<12} {shot}", outcome.app_name);
        if let Some(error) = &outcome.error {
            println!("      {}", error.dimmed());
        }
    }
    match &summary.archive {
        Some(archive) => println!("\nArchive: {}", archive.display()),
        None => println!("\n{}", "No archive produced".yellow()),
    }
    if summary.delivered {
        println!("{}", "Report emailed".green());
    }
    println!(
        "{} succeeded, {} failed",
        summary.succeeded().to_string().green(),
        summary.failed().to_string().red()
    );
}

fn validate(mut config: MonitorConfig, args: ValidateArgs) -> Result<()> {
    if let Some(flows) = args.flows {
        config.flows.directory = flows;
    }
    let sources = flow::load_dir(&config.flows.directory)?;
    if sources.is_empty() {
        println!(
            "{} no flow files in {}",
            "⚠️".yellow(),
            config.flows.directory.display()
        );
        return Ok(());
    }

    let mut invalid = 0;
    for source in &sources {
        if !report_flow(source) {
            invalid += 1;
        }
    }

    println!();
    if invalid == 0 {
        println!("{}", format!("✅ {} flow(s) valid", sources.len()).green().bold());
        Ok(())
    } else {
        anyhow::bail!("{invalid} of {} flow file(s) have problems", sources.len())
    }
}

fn report_flow(source: &FlowSource) -> bool {
    let file = source.path.display();
    match &source.flow {
        Ok(flow) => {
            let problems = flow.problems();
            let optional = flow.steps.iter().filter(|s| !s.mandatory).count();
            if problems.is_empty() {
                println!(
                    "{} {} ({}): {} step(s), {optional} optional  [{file}]",
                    "✓".green(),
                    flow.app_name.bold(),
                    flow.app_package,
                    flow.steps.len()
                );
                true
            } else {
                println!("{} {}  [{file}]", "✗".red(), flow.app_name.bold());
                for problem in problems {
                    println!("    {problem}");
                }
                false
            }
        }
        Err(e) => {
            println!("{} {}", "✗".red(), e);
            false
        }
    }
}

async fn doctor(config: MonitorConfig, args: DoctorArgs) -> Result<()> {
    let mut results = Vec::new();

    if !args.keep_adb {
        let killed = adb::kill_adb_processes();
        info!("Terminated {killed} adb process(es)");
    }

    match DeviceBridge::locate(config.adb.path.as_deref()) {
        Ok(bridge) => results.push(health::check_bridge(&bridge, args.reset_uiautomator2).await),
        Err(e) => {
            let mut result = HealthCheckResult::new("adb");
            result.error_message = Some(e.to_string());
            results.push(result);
        }
    }

    let appium = health::check_appium_status(&config.appium).await;
    let appium_up = appium.reachable;
    results.push(appium);

    if appium_up && !args.skip_session {
        let connector = AppiumConnector::new(config.appium.clone());
        results.push(health::check_session(&connector).await);
    }

    finish_checks(&results, args.json)
}

async fn check_smtp(config: MonitorConfig, args: JsonArgs) -> Result<()> {
    let result = health::check_smtp(&config.email).await;
    finish_checks(&[result], args.json)
}

fn finish_checks(results: &[HealthCheckResult], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(results)?);
    } else {
        for result in results {
            print_check(result);
        }
    }
    if results.iter().any(|r| r.status == HealthStatus::Unhealthy) {
        anyhow::bail!("one or more checks failed");
    }
    Ok(())
}

fn print_check(result: &HealthCheckResult) {
    let status = match result.status {
        HealthStatus::Healthy => "✅ healthy  ".green().bold(),
        HealthStatus::Degraded => "⚠️  degraded ".yellow().bold(),
        HealthStatus::Unhealthy => "❌ unhealthy".red().bold(),
    };
    println!(
        "{status} {} ({} ms)",
        result.component.bold(),
        result.check_duration_ms
    );
    if let Some(error) = &result.error_message {
        println!("    {}", error.red());
    }
    let mut keys: Vec<&String> = result.diagnostics.keys().collect();
    keys.sort();
    for key in keys {
        println!("    {key}: {}", result.diagnostics[key]);
    }
}
