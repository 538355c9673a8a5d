use anyhow::{bail, Context};
use clap::Parser;
use pulsar_bridge::config::FileConfig;
use pulsar_bridge::{register, Bridge, HostStatus};
use std::io::Read;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(name = "pulsar-bridge")]
#[command(about = "Forward agent log records to Apache Pulsar", long_about = None)]
struct Args {
    #[arg(short, long, value_name = "FILE", default_value = "bridge.toml")]
    config: PathBuf,

    #[arg(short, long, value_name = "FILE", help = "Batch buffer to publish (stdin when omitted)")]
    input: Option<PathBuf>,

    #[arg(short, long, default_value = "", help = "Source tag of the batch")]
    tag: String,

    #[arg(short, long, help = "Enable JSON output for logs")]
    json_logs: bool,

    #[arg(short, long, help = "Verbose logging")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(args.json_logs, args.verbose);

    let registration = register();
    info!(name = registration.name, "{}", registration.description);
    info!("Loading configuration from {:?}", args.config);

    let source = FileConfig::from_file(&args.config)
        .with_context(|| format!("failed to load configuration from {:?}", args.config))?;

    let mut bridge = Bridge::new();
    if bridge.initialize(&source).await != HostStatus::Ok {
        bail!("pulsar bridge initialization failed");
    }

    let data = read_batch(args.input.as_ref()).context("failed to read batch buffer")?;
    let status = bridge.flush_batch(&data, &args.tag).await;

    if let Some(stats) = bridge.stats() {
        info!(
            total = stats.total,
            sent = stats.sent,
            failed = stats.failed,
            flush_ok = stats.flush_ok,
            flush_failed = stats.flush_failed,
            status = status.code(),
            "Batch finished"
        );
    }

    bridge.exit().await;
    Ok(())
}

fn read_batch(input: Option<&PathBuf>) -> std::io::Result<Vec<u8>> {
    match input {
        Some(path) => std::fs::read(path),
        None => {
            let mut data = Vec::new();
            std::io::stdin().read_to_end(&mut data)?;
            Ok(data)
        }
    }
}

fn init_logging(json: bool, verbose: bool) {
    let env_filter = if verbose {
        EnvFilter::new("pulsar_bridge=debug,info")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("pulsar_bridge=info,warn"))
    };

    let fmt_layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_span_list(false)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
