use anyhow::{Context, Result};
use run_orchestrator::cli::commands::{
    HistoryCommand, ImagesCommand, PullCommand, ValidateCommand,
};
use run_orchestrator::cli::output::*;
use run_orchestrator::cli::{Cli, Command};
use run_orchestrator::core::{OrchestratorConfig, PipelineDefinition, Run};
use run_orchestrator::images::{
    resolve_images, DockerCliImageService, ImageAcquisition, ImageClientConfig, ImageService,
};
use run_orchestrator::orchestration::Observer;
use std::sync::Arc;
use std::time::Instant;
use tracing::error;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    let config = match &cli.config {
        Some(path) => OrchestratorConfig::from_file(path)?,
        None => OrchestratorConfig::default(),
    };

    match &cli.command {
        Command::Validate(cmd) => validate_pipeline(cmd)?,
        Command::Images(cmd) => list_images(cmd, &config).await?,
        Command::Status(_) => show_status(&config).await?,
        Command::Pull(cmd) => pull_images(cmd, &config).await?,
        Command::Prune(_) => prune_images(&config).await?,
        Command::History(cmd) => show_history(cmd, &config).await?,
    }

    Ok(())
}

fn image_service(config: &OrchestratorConfig) -> Arc<DockerCliImageService> {
    Arc::new(DockerCliImageService::new(
        ImageClientConfig::new().with_docker_path(&config.docker_path),
    ))
}

fn validate_pipeline(cmd: &ValidateCommand) -> Result<()> {
    println!("{} Validating pipeline...", INFO);

    let result = PipelineDefinition::from_file(&cmd.file)
        .and_then(|pipeline| Ok((resolve_images(&pipeline)?, pipeline)));

    match result {
        Ok((images, pipeline)) => {
            println!("{} Pipeline definition is valid!", CHECK);
            println!("  Id: {}", style(&pipeline.id).bold());
            if !pipeline.name.is_empty() {
                println!("  Name: {}", style(&pipeline.name).bold());
            }
            println!("  Steps: {}", style(pipeline.steps.len()).cyan());
            println!("  Images: {}", style(images.len()).cyan());
            for image in &images {
                println!(
                    "    {} {}",
                    style(&image.reference).bold(),
                    style(format!("({})", image.computation_id)).dim()
                );
            }

            if cmd.json {
                let data = serde_json::json!({
                    "pipeline": pipeline,
                    "images": images.iter().map(|i| &i.reference).collect::<Vec<_>>(),
                });
                println!("\n{}", serde_json::to_string_pretty(&data)?);
            }
            Ok(())
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            std::process::exit(1);
        }
    }
}

async fn list_images(cmd: &ImagesCommand, config: &OrchestratorConfig) -> Result<()> {
    let images = image_service(config)
        .get_images()
        .await
        .context("Failed to list images")?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&images)?);
        return Ok(());
    }

    if images.is_empty() {
        println!("{} No images cached locally", INFO);
        return Ok(());
    }

    println!("{} Local images:", INFO);
    for image in &images {
        println!("{}", format_image(image));
    }
    Ok(())
}

async fn show_status(config: &OrchestratorConfig) -> Result<()> {
    match image_service(config).get_status().await {
        Ok(status) if status.ready => println!("{} Container daemon is {}", CHECK, style("ready").green()),
        Ok(_) => println!("{} Container daemon is {}", WARN, style("not ready").yellow()),
        Err(e) => {
            println!("{} Container daemon is {}", CROSS, style("unavailable").red());
            println!("  {}", style(e).dim());
            std::process::exit(1);
        }
    }
    Ok(())
}

async fn pull_images(cmd: &PullCommand, config: &OrchestratorConfig) -> Result<()> {
    let pipeline = PipelineDefinition::from_file(&cmd.file).context("Failed to load pipeline")?;
    let images = resolve_images(&pipeline)?;

    println!(
        "{} Pulling {} image(s) for {}",
        INFO,
        style(images.len()).cyan(),
        style(&pipeline.id).bold()
    );

    let acquisition = ImageAcquisition::new(image_service(config), config.progress_interval())
        .with_prune(config.prune_after_pull && !cmd.no_prune);
    let (observer, mut events) = Observer::channel();

    let spinner = create_spinner("Starting pulls");
    let render = {
        let spinner = spinner.clone();
        tokio::spawn(async move {
            while let Some(message) = events.recv().await {
                if let Some(text) = format_observer_message(&message) {
                    spinner.set_message(text);
                }
            }
        })
    };

    let started = Instant::now();
    let result = acquisition
        .acquire(&Run::generate_id(), &images, &observer)
        .await;
    drop(observer);
    let _ = render.await;
    spinner.finish_and_clear();

    match result {
        Ok(report) => {
            println!(
                "{} Pulled {} image(s) in {}",
                CHECK,
                style(report.pulled.len()).cyan(),
                style(format_duration(started.elapsed())).dim()
            );
            if !report.pruned && config.prune_after_pull && !cmd.no_prune {
                println!("{} Prune failed; unused images were kept", WARN);
            }
            Ok(())
        }
        Err(e) => {
            println!("{} Pull {}", CROSS, style("failed").red());
            error!("{}", e);
            std::process::exit(1);
        }
    }
}

async fn prune_images(config: &OrchestratorConfig) -> Result<()> {
    let spinner = create_spinner("Pruning unused images");
    let result = image_service(config).prune_images().await;
    spinner.finish_and_clear();

    result.context("Failed to prune images")?;
    println!("{} Unused images removed", CHECK);
    Ok(())
}

#[cfg(feature = "sqlite")]
async fn show_history(cmd: &HistoryCommand, config: &OrchestratorConfig) -> Result<()> {
    use run_orchestrator::persistence::{PersistenceBackend, SqliteRunStore};

    let store = SqliteRunStore::open(&config.history_db_path()).await?;

    if let Some(run_id) = &cmd.run_id {
        match store.load_run(run_id).await? {
            Some(record) if cmd.json => println!("{}", serde_json::to_string_pretty(&record)?),
            Some(record) => {
                println!("{} Run Details", INFO);
                println!("  ID: {}", style(&record.run_id).cyan());
                println!("  Pipeline: {}", style(&record.pipeline_id).bold());
                println!("  Consortium: {}", style(&record.consortium_id).dim());
                println!("  Status: {}", format_status(record.status));
                println!("  Started: {}", style(record.created_at.to_rfc3339()).dim());
                if let Some(ended) = record.ended_at {
                    println!("  Ended: {}", style(ended.to_rfc3339()).dim());
                    if let Ok(duration) = ended.signed_duration_since(record.created_at).to_std() {
                        println!("  Duration: {}", style(format_duration(duration)).dim());
                    }
                }
                if let Some(message) = &record.error_message {
                    println!("  Error: {}", style(message).red());
                }
            }
            None => println!("{} Run not found", WARN),
        }
        return Ok(());
    }

    let runs = store.list_runs(cmd.limit).await?;

    if cmd.json {
        let data = serde_json::json!({ "runs": runs });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    if runs.is_empty() {
        println!("{} No runs found", INFO);
        return Ok(());
    }

    println!("{} Run history (showing latest {}):", INFO, cmd.limit);
    for record in &runs {
        println!("  {}", format_run_record(record));
    }

    Ok(())
}

#[cfg(not(feature = "sqlite"))]
async fn show_history(_cmd: &HistoryCommand, _config: &OrchestratorConfig) -> Result<()> {
    println!("{} Run history requires the sqlite feature", WARN);
    Ok(())
}
