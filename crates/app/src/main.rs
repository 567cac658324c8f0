use anyhow::Context;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use indexmover_core::{
    ElasticIndex, FileSink, FileSource, SettingsOverrides, Sink, Source, TransferCoordinator,
    TransferOptions, TransferReport,
};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "indexmover", version, about = "Export, import and copy search indices")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Dump an index (metadata and documents) into a file.
    Export(TransferArgs),
    /// Restore an index from a file produced by `export`.
    Import(TransferArgs),
    /// Copy an index from one cluster to another.
    Copy(TransferArgs),
}

#[derive(Args)]
struct TransferArgs {
    /// Input index URL or file path
    #[arg(long = "in")]
    input: String,

    /// Output index URL or file path
    #[arg(long = "out")]
    output: String,

    /// Overwrite an existing output file or delete the destination index first
    #[arg(long, default_value_t = false)]
    force: bool,

    /// Scroll page size
    #[arg(long, env = "INDEXMOVER_WINDOW", default_value = "100")]
    window: usize,

    /// Records per bulk request
    #[arg(long, env = "INDEXMOVER_BULK_SIZE", default_value = "500")]
    bulk_size: usize,

    /// Number of concurrent bulk workers
    #[arg(long, env = "INDEXMOVER_PARALLEL", default_value = "4")]
    parallel: usize,

    /// Batches buffered between reader and writers
    #[arg(long, env = "INDEXMOVER_BUFFER", default_value = "10")]
    buffer: usize,

    /// Override number of replicas of the created index
    #[arg(long)]
    repls: Option<u32>,

    /// Override number of shards of the created index
    #[arg(long)]
    shards: Option<u32>,

    /// Pause between resubmissions of throttled records, in milliseconds
    #[arg(long, env = "INDEXMOVER_RETRY_BACKOFF_MS", default_value = "100")]
    retry_backoff_ms: u64,
}

impl TransferArgs {
    fn options(&self) -> TransferOptions {
        TransferOptions {
            window: self.window,
            bulk_size: self.bulk_size,
            parallelism: self.parallel,
            channel_capacity: self.buffer,
            overwrite: self.force,
            overrides: SettingsOverrides {
                replicas: self.repls,
                shards: self.shards,
            },
            retry_backoff: self.retry_backoff(),
        }
    }

    fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    fn connect_input(&self) -> anyhow::Result<ElasticIndex> {
        ElasticIndex::connect(&self.input)
            .with_context(|| format!("invalid input index url `{}`", self.input))
    }

    fn connect_output(&self) -> anyhow::Result<ElasticIndex> {
        let index = ElasticIndex::connect(&self.output)
            .with_context(|| format!("invalid output index url `{}`", self.output))?;
        Ok(index.with_retry_backoff(self.retry_backoff()))
    }
}

async fn run_transfer<S, K>(source: S, sink: K, options: TransferOptions) -> anyhow::Result<()>
where
    S: Source + 'static,
    K: Sink,
{
    let report = TransferCoordinator::new(source, sink, options)
        .run()
        .await
        .context("transfer failed")?;
    summarize(&report);
    Ok(())
}

fn summarize(report: &TransferReport) {
    info!(
        index = %report.index,
        collections = report.collections,
        extracted = report.extraction.records,
        batches = report.ingestion.batches,
        delivered = report.ingestion.delivered,
        duplicates = report.ingestion.duplicates,
        retried = report.ingestion.retried,
        "transfer complete"
    );

    if report.ingestion.dropped > 0 {
        warn!(
            dropped = report.ingestion.dropped,
            "some records were rejected by the destination and not written"
        );
    }

    println!(
        "{}: {} of {} records delivered, {} dropped, finished at {}",
        report.index,
        report.ingestion.delivered,
        report.extraction.records,
        report.ingestion.dropped,
        Utc::now().to_rfc3339()
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "indexmover boot"
    );

    match cli.command {
        Command::Export(args) => {
            info!(input = %args.input, output = %args.output, "export");
            let source = args.connect_input()?;
            let sink = FileSink::create(&args.output, args.force)
                .await
                .with_context(|| format!("cannot create `{}`", args.output))?;
            run_transfer(source, sink, args.options()).await?;
        }
        Command::Import(args) => {
            info!(input = %args.input, output = %args.output, "import");
            let source = FileSource::open(&args.input)
                .await
                .with_context(|| format!("cannot open `{}`", args.input))?;
            let sink = args.connect_output()?;
            run_transfer(source, sink, args.options()).await?;
        }
        Command::Copy(args) => {
            info!(input = %args.input, output = %args.output, "copy");
            let source = args.connect_input()?;
            let sink = args.connect_output()?;
            run_transfer(source, sink, args.options()).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn flags_map_onto_transfer_options() -> Result<(), Box<dyn std::error::Error>> {
        let cli = Cli::try_parse_from([
            "indexmover",
            "copy",
            "--in",
            "localhost:9200/a",
            "--out",
            "localhost:9201/b",
            "--force",
            "--window",
            "50",
            "--parallel",
            "8",
            "--repls",
            "0",
        ])?;

        let Command::Copy(args) = cli.command else {
            return Err("expected copy".into());
        };
        let options = args.options();
        assert_eq!(options.window, 50);
        assert_eq!(options.parallelism, 8);
        assert!(options.overwrite);
        assert_eq!(options.overrides.replicas, Some(0));
        assert_eq!(options.overrides.shards, None);
        Ok(())
    }

    #[test]
    fn missing_out_and_unknown_command_are_rejected() {
        assert!(Cli::try_parse_from(["indexmover", "export", "--in", "localhost:9200/a"]).is_err());
        assert!(Cli::try_parse_from(["indexmover", "migrate", "--in", "a", "--out", "b"]).is_err());
    }
}
