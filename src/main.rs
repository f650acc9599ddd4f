use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use conveyor::cli::commands::{HistoryCommand, RunCommand, ValidateCommand};
use conveyor::cli::output::*;
use conveyor::cli::{Cli, Command};
use conveyor::core::run::CommitRef;
use conveyor::core::ProjectConfig;
use conveyor::history::{InMemoryHistory, RunHistory};
use conveyor::orchestrator::Orchestrator;
use conveyor::{EnvSecretResolver, RunStatus};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    match &cli.command {
        Command::Run(cmd) => run_pipeline(cmd).await?,
        Command::Validate(cmd) => validate_project(cmd)?,
        Command::History(cmd) => show_history(cmd).await?,
    }

    Ok(())
}

async fn open_history(ephemeral: bool) -> Result<Arc<dyn RunHistory>> {
    if ephemeral {
        return Ok(Arc::new(InMemoryHistory::new()));
    }

    #[cfg(feature = "sqlite")]
    return Ok(Arc::new(
        conveyor::history::SqliteRunHistory::with_default_path().await?,
    ));

    #[cfg(not(feature = "sqlite"))]
    Ok(Arc::new(InMemoryHistory::new()))
}

async fn run_pipeline(cmd: &RunCommand) -> Result<()> {
    let project = ProjectConfig::from_file(&cmd.file)
        .with_context(|| format!("Failed to load project from {}", cmd.file))?;

    println!("{} Loaded project: {}", INFO, style(&project.name).bold());

    let workdir = match &cmd.workdir {
        Some(dir) => std::path::PathBuf::from(dir),
        None => std::env::current_dir()?,
    };

    let history = open_history(cmd.no_history).await?;
    let orchestrator = Arc::new(
        Orchestrator::new(&project, Arc::new(EnvSecretResolver), workdir)?
            .with_history(history),
    );

    orchestrator
        .add_event_handler(|event| {
            println!("{}", format_event(&event));
        })
        .await;

    // Ctrl-C tears down active runs instead of abandoning them
    let canceller = orchestrator.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            canceller.cancel();
        }
    });

    let commit = cmd.revision.as_ref().map(|revision| CommitRef {
        revision: revision.clone(),
        branch: cmd.branch.clone(),
        committer: whoami(),
    });

    println!();
    let runs = orchestrator.run_pipeline(&cmd.target, commit).await?;

    println!();
    for run in &runs {
        println!("  {}", format_run_summary(run));
    }

    let failed = runs
        .iter()
        .any(|r| matches!(r.status, RunStatus::Failed | RunStatus::TimedOut));
    if failed {
        println!(
            "\n{} Pipeline for {} {}",
            CROSS,
            style(&cmd.target).bold(),
            style("failed").red()
        );
        if let Some(err) = runs.iter().find_map(|r| r.failure()) {
            println!("  {}", style(err).red());
        }
        std::process::exit(1);
    }

    println!(
        "\n{} Pipeline for {} completed {}",
        CHECK,
        style(&cmd.target).bold(),
        style("successfully").green()
    );
    Ok(())
}

fn validate_project(cmd: &ValidateCommand) -> Result<()> {
    println!("{} Validating project...", INFO);

    match ProjectConfig::from_file(&cmd.file) {
        Ok(project) => {
            println!("{} Project configuration is valid!", CHECK);
            println!("  Name: {}", style(&project.name).bold());
            println!(
                "  Configurations: {}",
                style(project.configurations.len()).cyan()
            );
            for config in &project.configurations {
                let mut details = format!("{} steps", config.steps.len());
                if !config.depends_on.is_empty() {
                    let upstreams: Vec<&str> =
                        config.depends_on.iter().map(|d| d.id.as_str()).collect();
                    details.push_str(&format!(", depends on {}", upstreams.join(", ")));
                }
                if config.trigger.is_some() {
                    details.push_str(", triggered");
                }
                if config.deploy.is_some() {
                    details.push_str(", deploys");
                }
                println!("    {} ({})", style(&config.id).bold(), details);
            }

            if cmd.json {
                let json = serde_json::to_string_pretty(&project)?;
                println!("\n{}", json);
            }
            Ok(())
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(e).red());
            std::process::exit(1);
        }
    }
}

async fn show_history(cmd: &HistoryCommand) -> Result<()> {
    let history = open_history(false).await?;

    if let Some(run_id) = &cmd.run_id {
        let run_id = uuid::Uuid::parse_str(run_id).context("Invalid run id format")?;
        match history.get(run_id).await? {
            Some(run) => print_run_details(&run, cmd.verbose)?,
            None => println!("{} Run not found", WARN),
        }
        return Ok(());
    }

    let runs = match &cmd.configuration {
        Some(configuration_id) => history.list(configuration_id).await?,
        None => {
            let mut all = Vec::new();
            for configuration_id in history.list_configurations().await? {
                all.extend(history.list(&configuration_id).await?);
            }
            all.sort_by(|a, b| b.started_at.cmp(&a.started_at));
            all
        }
    };
    let runs: Vec<_> = runs.into_iter().take(cmd.limit).collect();

    if runs.is_empty() {
        println!("{} No runs found", INFO);
        return Ok(());
    }

    if cmd.json {
        let data = serde_json::json!({ "runs": runs });
        println!("{}", serde_json::to_string_pretty(&data)?);
    } else {
        println!("{} Run history (showing latest {}):", INFO, cmd.limit);
        for run in &runs {
            println!("  {}", format_run_summary(run));
        }
    }

    Ok(())
}

fn print_run_details(run: &conveyor::BuildRun, verbose: bool) -> Result<()> {
    println!("{} Run Details", INFO);
    println!("  ID: {}", style(run.id).cyan());
    println!("  Configuration: {}", style(&run.configuration_id).bold());
    println!("  Build number: {}", style(run.build_number).cyan());
    println!("  Status: {}", format_status(run.status));
    if let Some(commit) = &run.commit {
        println!(
            "  Commit: {} on {} by {}",
            style(&commit.revision).cyan(),
            commit.branch,
            commit.committer
        );
    }
    if let Some(started) = run.started_at {
        println!("  Started: {}", style(started.to_rfc3339()).dim());
    }
    if let Some(finished) = run.finished_at {
        println!("  Finished: {}", style(finished.to_rfc3339()).dim());
    }
    if let Some(deployment) = &run.deployment_id {
        println!("  Deployment: {}", style(deployment).cyan());
    }

    if !run.step_results.is_empty() {
        println!("  Steps:");
        for result in &run.step_results {
            println!(
                "    {} - {}",
                style(&result.step_name).bold(),
                format_step_outcome(&result.outcome)
            );
            if verbose && !result.log.is_empty() {
                for line in format_output(&result.log, 20).lines() {
                    println!("      {}", style(line).dim());
                }
            }
        }
    }

    Ok(())
}

fn whoami() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}
