use anyhow::Result;
use primegrid::config::{CoordinatorConfig, WorkerConfig};
use primegrid::coordinator::service::CoordinatorService;
use primegrid::worker::agent::WorkerAgent;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        usage(&args[0]);
    }

    let verbose = args.iter().any(|a| a == "--verbose");
    tracing_subscriber::fmt()
        .with_max_level(if verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .init();

    match args[1].as_str() {
        "coordinator" => run_coordinator(&args).await,
        "worker" => run_worker(&args).await,
        _ => usage(&args[0]),
    }
}

async fn run_coordinator(args: &[String]) -> Result<()> {
    let mut config = CoordinatorConfig {
        verbose: args.iter().any(|a| a == "--verbose"),
        ..CoordinatorConfig::default()
    };
    let mut end: Option<u64> = None;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--port" => {
                config.port = args[i + 1].parse()?;
                i += 2;
            }
            "--end" => {
                end = Some(args[i + 1].parse()?);
                i += 2;
            }
            "--block-size" => {
                config.block_size = args[i + 1].parse()?;
                i += 2;
            }
            "--timeout-ms" => {
                config.assignment_timeout = Duration::from_millis(args[i + 1].parse()?);
                i += 2;
            }
            "--sweep-ms" => {
                config.sweep_interval = Duration::from_millis(args[i + 1].parse()?);
                i += 2;
            }
            "--max-reassignments" => {
                config.max_reassignments = args[i + 1].parse()?;
                i += 2;
            }
            "--collect-primes" => {
                config.collect_primes = true;
                i += 1;
            }
            "--report" => {
                config.report_path = Some(args[i + 1].clone().into());
                i += 2;
            }
            _ => {
                i += 1;
            }
        }
    }

    config.range_end = end.expect("--end is required");

    let service = CoordinatorService::bind(config).await?;
    service.clone().start().await;

    let report = service.run_until_settled().await;
    tracing::info!(
        "Run settled: {}/{} blocks completed, {} primes found",
        report.completed_blocks,
        report.total_blocks,
        report.total_primes
    );
    if report.partial {
        tracing::warn!("Completed with failed blocks: {:?}", report.failed_blocks);
    }

    service.stop().await;
    Ok(())
}

async fn run_worker(args: &[String]) -> Result<()> {
    let mut config = WorkerConfig {
        verbose: args.iter().any(|a| a == "--verbose"),
        ..WorkerConfig::default()
    };
    let mut server: Option<std::net::SocketAddr> = None;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--server" => {
                server = Some(args[i + 1].parse()?);
                i += 2;
            }
            "--timeout-ms" => {
                config.request_timeout = Duration::from_millis(args[i + 1].parse()?);
                i += 2;
            }
            "--retries" => {
                config.max_retries = args[i + 1].parse()?;
                i += 2;
            }
            "--backoff-ms" => {
                config.wait_backoff = Duration::from_millis(args[i + 1].parse()?);
                i += 2;
            }
            _ => {
                i += 1;
            }
        }
    }

    config.coordinator = server.expect("--server is required");

    let agent = WorkerAgent::connect(config).await?;
    let summary = agent.run().await?;
    tracing::info!(
        "Worker finished: {} blocks, {} primes",
        summary.blocks_completed,
        summary.primes_found
    );

    Ok(())
}

fn usage(program: &str) -> ! {
    eprintln!("Usage: {} <coordinator|worker> [options]", program);
    eprintln!();
    eprintln!("  {} coordinator --end <N> [--port <p>] [--block-size <n>]", program);
    eprintln!("      [--timeout-ms <ms>] [--sweep-ms <ms>] [--max-reassignments <n>]");
    eprintln!("      [--collect-primes] [--report <path>] [--verbose]");
    eprintln!();
    eprintln!("  {} worker --server <addr:port> [--timeout-ms <ms>]", program);
    eprintln!("      [--retries <n>] [--backoff-ms <ms>] [--verbose]");

    std::process::exit(1);
}
