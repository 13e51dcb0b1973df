//! Replay command implementation.

use anyhow::{Context, Result};
use ixstream_core::event::{DataEvent, EventRecord, Version};
use ixstream_core::metrics::{ConsumerMetrics, MetricsSnapshot};
use ixstream_core::pipeline::{self, BatchDriver, DriverStats, EventSender};
use ixstream_core::store::{Indexable, MemoryIndex};
use ixstream_core::{Config, EventError, IndexingConsumer, PipelineError};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Field every replayed document is keyed by.
pub const KEY_FIELD: &str = "id";

/// Summary output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// A JSON document keyed by its `id` field.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    id: String,
    body: Value,
}

impl Document {
    /// Wrap a JSON value, extracting its key.
    ///
    /// String ids are used as is; any other scalar id uses its JSON text.
    pub fn from_value(body: Value, version: &Version) -> std::result::Result<Self, EventError> {
        let id = match body.get(KEY_FIELD) {
            Some(Value::String(id)) => id.clone(),
            Some(Value::Null) | None => {
                return Err(EventError::MissingKey {
                    version: version.clone(),
                    field: KEY_FIELD.to_string(),
                })
            }
            Some(other) => other.to_string(),
        };
        Ok(Self { id, body })
    }

    pub fn body(&self) -> &Value {
        &self.body
    }
}

impl Indexable for Document {
    type Key = String;

    fn key(&self) -> String {
        self.id.clone()
    }

    /// Documents carrying `"deleted": true` are tombstones.
    fn is_deleted(&self) -> bool {
        self.body
            .get("deleted")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// Outcome of a replay.
#[derive(Debug, Clone, Serialize)]
pub struct ReplaySummary {
    pub input: PathBuf,
    pub version: Option<Version>,
    pub documents: usize,
    pub driver: DriverStats,
    pub metrics: MetricsSnapshot,
}

/// Parse one input line into an event.
///
/// Records without an explicit weight are weighted by their encoded size.
pub fn parse_line(line: &str) -> Result<DataEvent<Document>> {
    let mut record: EventRecord<Value> = serde_json::from_str(line)?;
    if record.weight == 0 {
        record.weight = u32::try_from(line.len()).unwrap_or(u32::MAX);
    }

    let event = DataEvent::try_from(record)?;
    let version = event.version().clone();
    Ok(event.try_map(|body| Document::from_value(body, &version))?)
}

/// Stream every line of `input` into the pipeline. Blank lines are skipped.
async fn produce(input: PathBuf, tx: EventSender<Document>) -> Result<u64> {
    let file = tokio::fs::File::open(&input)
        .await
        .with_context(|| format!("Failed to open {}", input.display()))?;
    let mut lines = BufReader::new(file).lines();
    let mut sent = 0u64;
    let mut line_no = 0u64;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }

        let event =
            parse_line(&line).with_context(|| format!("Invalid event on line {}", line_no))?;
        tx.send(event).await?;
        sent += 1;
    }

    debug!(events = sent, "Input exhausted");
    Ok(sent)
}

/// Replay `input` into a fresh memory index and return the outcome.
pub async fn replay(config: &Config, input: &Path) -> Result<ReplaySummary> {
    let metrics = Arc::new(ConsumerMetrics::new());
    let index: MemoryIndex<Document> = MemoryIndex::with_config(&config.store);
    let consumer: IndexingConsumer<Document, _> =
        IndexingConsumer::new(index.clone(), &config.consumer).with_metrics(Arc::clone(&metrics));

    let (tx, rx) = pipeline::channel(&config.pipeline, Arc::clone(&metrics));
    let driver = BatchDriver::new(consumer, &config.pipeline, Arc::clone(&metrics));
    let shared = driver.consumer();

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let shutdown_signal = shutdown_tx.clone();
    let signal_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received SIGINT (Ctrl+C), stopping replay");
            let _ = shutdown_signal.send(());
        }
    });

    info!(input = %input.display(), "Starting replay");

    let producer = tokio::spawn(produce(input.to_path_buf(), tx));
    let driven = driver.run(rx, shutdown_rx).await;
    signal_task.abort();

    // A driver failure closes the channel; report it rather than the
    // producer's resulting send error.
    let stats = match driven {
        Ok(stats) => stats,
        Err(e) => {
            producer.abort();
            return Err(ixstream_core::Error::from(e).into());
        }
    };

    match producer.await? {
        Ok(sent) => debug!(events = sent, "Producer finished"),
        Err(e) if is_closed(&e) => {
            warn!("Replay interrupted before all events were delivered");
            return Err(ixstream_core::Error::Shutdown.into());
        }
        Err(e) => return Err(e),
    }

    let summary = ReplaySummary {
        input: input.to_path_buf(),
        version: shared.version(),
        documents: index.len(),
        driver: stats,
        metrics: metrics.snapshot(),
    };

    info!(
        version = ?summary.version,
        documents = summary.documents,
        batches = summary.driver.batches,
        "Replay complete"
    );
    Ok(summary)
}

fn is_closed(error: &anyhow::Error) -> bool {
    matches!(
        error.downcast_ref::<PipelineError>(),
        Some(PipelineError::Closed)
    )
}

/// Run the replay command and print its summary.
pub async fn run(config: Config, input: &Path, format: OutputFormat) -> Result<()> {
    let summary = replay(&config, input).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
        OutputFormat::Text => {
            let version = summary
                .version
                .as_ref()
                .map(Version::as_str)
                .unwrap_or("-");
            println!("Input:      {}", summary.input.display());
            println!("Version:    {}", version);
            println!("Documents:  {}", summary.documents);
            println!("Batches:    {}", summary.driver.batches);
            println!("Events:     {}", summary.driver.events);
            println!(
                "Upserts:    {}  Deletes: {}  Markers: {}",
                summary.metrics.upserts_total,
                summary.metrics.deletes_total,
                summary.metrics.markers_total
            );
            println!("Retries:    {}", summary.metrics.batch_retries_total);
        }
    }

    Ok(())
}
