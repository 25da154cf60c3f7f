use anyhow::Result;
use clap::Parser;
use console::style;
use std::process::ExitCode;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tg2yt::cli::{Cli, Commands};
use tg2yt::config::{Config, Secrets};
use tg2yt::link::parse_link;
use tg2yt::pipeline::{BatchReport, Orchestrator};
use tg2yt::telegram::session::generate_session;
use tg2yt::utils;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json_logs);

    let secrets = Secrets::from(cli.secrets.clone());

    match cli.command {
        Commands::Upload { links, cooldown } => {
            let links = utils::split_links(&links);
            if links.is_empty() {
                anyhow::bail!("No links given");
            }

            for link in &links {
                if let Err(e) = utils::validate_telegram_url(link) {
                    tracing::warn!("{}: {}", link, e);
                }
            }

            let mut config = Config::load(cli.config.as_deref(), secrets)?;
            if let Some(secs) = cooldown {
                config.pipeline.cooldown_secs = secs;
            }

            if links.len() == 1 {
                upload_one(config, &links[0], cli.quiet).await
            } else {
                upload_batch(config, &links, cli.quiet).await
            }
        }
        Commands::Session => {
            let app = secrets.telegram_app()?;
            let session = generate_session(&app).await?;

            eprintln!(
                "\n{} Store it in TG_SESSION_STRING and keep it secret:",
                style("Session created.").green().bold()
            );
            println!("{}", session);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Config { show, init } => {
            if init {
                let path = Config::init_file()?;
                println!("Default settings written to: {}", path.display());
            } else {
                let config = Config::load(cli.config.as_deref(), secrets)?;
                if !show {
                    println!("(use --init to write a settings file)");
                }
                config.display();
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Doctor => {
            let missing = utils::check_dependencies().await;
            if missing.is_empty() {
                println!("{} ffmpeg and ffprobe are available", style("OK").green().bold());
                return Ok(ExitCode::SUCCESS);
            }

            eprintln!("Dependency check warnings:");
            for dep in missing {
                eprintln!("   • {}", dep);
            }
            Ok(ExitCode::FAILURE)
        }
    }
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = if verbose {
        EnvFilter::new("tg2yt=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "tg2yt=info".into())
    };

    // Logs go to stderr so stdout only carries results
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}

async fn upload_one(config: Config, link: &str, quiet: bool) -> Result<ExitCode> {
    // Reject malformed links before touching the network
    parse_link(link)?;

    let orchestrator = Orchestrator::connect(config).await?.show_progress(!quiet);
    let result = orchestrator.run(link).await;
    orchestrator.close().await;

    let id = result?;
    println!("{} {}", style("Uploaded:").green().bold(), id.watch_url());
    Ok(ExitCode::SUCCESS)
}

async fn upload_batch(config: Config, links: &[String], quiet: bool) -> Result<ExitCode> {
    tracing::info!("Processing {} links", links.len());

    let orchestrator = Orchestrator::connect(config).await?.show_progress(!quiet);
    let report = orchestrator.run_batch(links).await;
    orchestrator.close().await;

    print_report(&report);

    if report.aborted.is_some() {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn print_report(report: &BatchReport) {
    println!("\n{}", style("Batch summary").bold());
    for item in &report.items {
        match &item.result {
            Ok(id) => println!("  {} {} -> {}", style("ok").green(), item.link, id.watch_url()),
            Err(e) => println!("  {} {}: {}", style("failed").red(), item.link, e),
        }
    }
    println!("  {} succeeded, {} failed", report.succeeded(), report.failed());

    if let Some(reason) = &report.aborted {
        println!("  {} {}", style("stopped early:").red().bold(), reason);
    }
}
