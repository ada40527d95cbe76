// src/main.rs
use clap::Parser;
use colored::Colorize;
use ct_sift::cli::{Cli, Command};
use ct_sift::config::Config;
use ct_sift::ct_log::{fetch_head, CtLogClient, LogIdentity, LogListFetcher};
use ct_sift::database::{Datastore, MemoryDatastore, PostgresBackend};
use ct_sift::error::ErrorClass;
use ct_sift::scanner::{collect_identities, LogScanner};
use ct_sift::stats::StatsCollector;
use is_terminal::IsTerminal;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Exit status for configuration and startup failures
const EXIT_CONFIG: u8 = 1;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::from(EXIT_CONFIG)
        }
    }
}

fn init_logging(cli: &Cli, config: &Config) {
    let log_level = cli
        .log_level_override()
        .unwrap_or(config.logging.level.as_str());

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

fn exit_code(class: Option<ErrorClass>) -> ExitCode {
    match class {
        Some(class) => ExitCode::from(class.exit_code()),
        None => ExitCode::SUCCESS,
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut config = Config::from_file(&cli.config)?;
    cli.apply_overrides(&mut config);

    let command = cli.command();
    if command != Command::SyncLogs {
        config.validate()?;
    }

    init_logging(&cli, &config);
    tracing::info!("Starting ct-sift...");

    // Kept separately so matches can be printed at the end
    let memory = Arc::new(MemoryDatastore::new());
    let datastore: Arc<dyn Datastore> = if config.database.enabled {
        tracing::info!("Database enabled, connecting to PostgreSQL...");
        let postgres =
            PostgresBackend::new(&config.database.url, config.database.max_connections).await?;
        postgres.migrate().await?;
        postgres.ping().await?;
        Arc::new(postgres)
    } else {
        tracing::info!("Database disabled, keeping results in memory");
        memory.clone()
    };

    match command {
        Command::SyncLogs => sync_logs(&config, datastore.as_ref()).await,
        Command::Head => {
            let logs = resolve_logs(&config, datastore.as_ref(), None).await?;
            print_heads(&config, &logs).await
        }
        Command::Scan { start, log } => {
            let logs = resolve_logs(&config, datastore.as_ref(), log.as_deref()).await?;
            let stats = StatsCollector::new();
            let show_progress = cli.should_show_progress(std::io::stderr().is_terminal());
            let scanner = LogScanner::new(&config, datastore, stats.clone(), show_progress);

            let report = scanner.scan_all(&logs, start).await;

            for outcome in &report.completed {
                tracing::info!(
                    "{}: {} entries processed ({}..{})",
                    outcome.log_url,
                    outcome.done - outcome.start,
                    outcome.start,
                    outcome.done
                );
            }
            tracing::info!("{}", stats.format_stats());

            if !config.database.enabled {
                print_matches(&memory).await;
            }

            if let Some(failure) = report.first_failure() {
                eprintln!("{} {}", "error:".red().bold(), failure);
            }
            Ok(exit_code(report.first_failure().map(|f| f.class())))
        }
    }
}

async fn resolve_logs(
    config: &Config,
    datastore: &dyn Datastore,
    only: Option<&str>,
) -> anyhow::Result<Vec<LogIdentity>> {
    let synced = if config.log_list.use_synced_logs {
        datastore.log_sources().await?
    } else {
        Vec::new()
    };

    let mut logs = collect_identities(&config.logs, &synced);
    if let Some(url) = only {
        let url = url.trim_end_matches('/');
        logs.retain(|log| log.url() == url);
    }

    if logs.is_empty() {
        anyhow::bail!("no usable logs to scan");
    }

    tracing::info!("Scanning {} CT logs", logs.len());
    Ok(logs)
}

async fn sync_logs(config: &Config, datastore: &dyn Datastore) -> anyhow::Result<ExitCode> {
    if !config.database.enabled {
        anyhow::bail!("sync-logs requires [database] enabled = true");
    }

    let fetcher = LogListFetcher::new()?;
    let sources = fetcher
        .fetch_log_sources(&config.log_list.url, config.log_list.include_readonly)
        .await?;

    for source in &sources {
        let id = datastore.upsert_log_source(source).await?;
        tracing::debug!("Stored log {} as {}", source.url, id);
    }

    println!("Synced {} logs", sources.len());
    Ok(ExitCode::SUCCESS)
}

async fn print_heads(config: &Config, logs: &[LogIdentity]) -> anyhow::Result<ExitCode> {
    let mut first_failure = None;

    for log in logs {
        let result = match CtLogClient::new(log.url(), config.fetch.client_options()) {
            Ok(client) => fetch_head(&client, log).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(head) => println!(
                "{} size={} time={} root={}",
                log.url().bold(),
                head.tree_size,
                head.time.to_rfc3339(),
                hex::encode(head.root_hash)
            ),
            Err(e) => {
                eprintln!("{} {}: {}", "error:".red().bold(), log.url(), e);
                first_failure.get_or_insert(e.class());
            }
        }
    }

    Ok(exit_code(first_failure))
}

async fn print_matches(store: &MemoryDatastore) {
    let retained = store.matches().await;
    let omitted = store.match_count().await.saturating_sub(retained.len() as u64);
    if omitted > 0 {
        println!(
            "{} earlier matches not shown; every match is in the log output",
            omitted
        );
    }

    for (_, cert) in retained {
        let name = cert
            .subject_common_name
            .clone()
            .unwrap_or_else(|| "<no CN>".to_string());
        println!(
            "{} {} [{}] issuer={}",
            "MATCH".green().bold(),
            name.cyan(),
            cert.dns_names.join(", "),
            cert.issuer
        );
    }
}
