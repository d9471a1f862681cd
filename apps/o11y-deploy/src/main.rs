mod ansible;
mod registered_modules;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use deploykit::{DeployConfig, Deployer, ModuleRegistry, Runner};
use deploykit_bootstrap::{AppConfig, CliArgs, init_logging};

use crate::ansible::{AnsibleRunner, DryRunRunner};

/// O11y Deploy - provisions an observability stack over SSH with Ansible
#[derive(Parser)]
#[command(name = "o11y-deploy")]
#[command(about = "O11y Deploy - provisions an observability stack over SSH with Ansible")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print effective configuration (YAML) and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Data directory override (overrides global.data_directory)
    #[arg(long)]
    data_directory: Option<PathBuf>,

    /// Write inventories and playbooks under the data directory instead of running Ansible
    #[arg(long)]
    dry_run: bool,

    /// Directory holding the bundled `ansible-playbook` and roles
    #[arg(long, default_value = "/opt/o11y/deps")]
    deps_home: PathBuf,

    /// Keep generated Ansible files and run Ansible in debug mode
    #[arg(long)]
    ansible_debug: bool,

    /// List registered modules and exit
    #[arg(long)]
    list_modules: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Clone, Copy)]
enum Commands {
    /// Deploy every target group
    Run,
    /// Validate configuration and exit
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let args = CliArgs {
        config: cli.config.clone(),
        print_config: cli.print_config,
        verbose: cli.verbose,
        data_directory: cli.data_directory.clone(),
    };

    // Layered config:
    // 1) defaults -> 2) YAML (if provided) -> 3) env (O11Y__*) -> 4) CLI overrides
    let mut config = AppConfig::load_or_default(cli.config.as_deref())?;
    config.apply_cli_overrides(&args);
    init_logging(&config.logging);

    tracing::info!("O11y Deploy starting");

    if cli.print_config {
        println!("Effective configuration:\n{}", config.to_yaml()?);
        return Ok(());
    }

    let registry = ModuleRegistry::discover().context("failed to build module registry")?;
    if cli.list_modules {
        list_modules(&registry);
        return Ok(());
    }

    let deploy_config = config.resolve(&registry)?;

    // Dispatch subcommands (default: run)
    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_deploy(deploy_config, &cli).await,
        Commands::Check => check_config(&deploy_config, &registry),
    }
}

fn list_modules(registry: &ModuleRegistry) {
    let mut names: Vec<&str> = registry.names().collect();
    names.sort_unstable();
    println!("Registered modules ({}):", names.len());
    for name in names {
        let key = registry.field_key_of(name).unwrap_or_default();
        println!("  - {name} ({key})");
    }
}

fn check_config(config: &DeployConfig, registry: &ModuleRegistry) -> Result<()> {
    tracing::info!("Checking configuration...");
    println!("Configuration is valid");
    println!("{}", config.to_yaml(registry)?);
    Ok(())
}

fn build_runner(config: &DeployConfig, cli: &Cli) -> Arc<dyn Runner> {
    let global = config.global.clone();
    if cli.dry_run {
        tracing::info!(dir = %global.data_directory.display(), "Dry run, Ansible will not be started");
        return Arc::new(DryRunRunner::new(global));
    }
    Arc::new(AnsibleRunner::new(
        global,
        Path::new(&cli.deps_home),
        cli.ansible_debug,
    ))
}

async fn run_deploy(config: DeployConfig, cli: &Cli) -> Result<()> {
    let runner = build_runner(&config, cli);
    let deployer = Deployer::new(config, runner).context("invalid deployment configuration")?;
    let report = deployer.run().await.context("deployment failed")?;

    println!("Deployment finished");
    for group in &report.groups {
        let status = if group.report.is_some() {
            "deployed"
        } else {
            "skipped"
        };
        println!(
            "  {}: {} host(s), {} playbook(s), {status}",
            group.group, group.hosts, group.playbooks
        );
    }
    Ok(())
}
