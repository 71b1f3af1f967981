use anyhow::{Context as _, Result};
use clap::Parser;
use linaje::{
    cli::{Cli, OutputFormat},
    config::EngineConfig,
    emitter::{RecordKind, WireRecord},
    engine::CorrelationEngine,
    propagation::SpanRecord,
    replay,
};
use std::fs::File;
use std::io::BufReader;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

fn print_record_text(record: &WireRecord) {
    match record.kind {
        RecordKind::PendingLineage => {
            println!(
                "pending   token={:#x} creator={} t={}ns",
                record.key, record.value, record.timestamp_ns
            );
        }
        RecordKind::CreationEdge => {
            println!(
                "edge      child={} parent={} t={}ns",
                record.key, record.value, record.timestamp_ns
            );
        }
        RecordKind::ThreadBinding => {
            println!(
                "binding   thread={} task={} t={}ns",
                record.key, record.value, record.timestamp_ns
            );
        }
        RecordKind::ContextBound => {
            println!(
                "context   task={} trace={} t={}ns",
                record.key,
                hex::encode(record.trace_id.to_be_bytes()),
                record.timestamp_ns
            );
        }
        RecordKind::SpanCompleted => {
            println!(
                "span      key={} task={} trace={} span={} t={}ns",
                record.key,
                record.value,
                hex::encode(record.trace_id.to_be_bytes()),
                hex::encode(record.span_id.to_be_bytes()),
                record.timestamp_ns
            );
        }
    }
}

fn print_span_text(span: &SpanRecord) {
    let parent = span
        .parent_context
        .map(|p| p.to_string())
        .unwrap_or_else(|| "-".to_string());
    println!(
        "completed key={} ctx={} parent={} root={} dur={}ns",
        span.instance_key,
        span.context,
        parent,
        span.is_root,
        span.duration_ns()
    );
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let config = match cli.capacity {
        Some(n) => EngineConfig::with_capacity(n),
        None => EngineConfig::default(),
    };
    let engine = CorrelationEngine::new(config).context("failed to initialize engine")?;

    let file = File::open(&cli.script)
        .with_context(|| format!("failed to open script {}", cli.script.display()))?;
    let outcome = replay::replay(&engine, BufReader::new(file))?;

    match cli.format {
        OutputFormat::Text => {
            for record in &outcome.records {
                print_record_text(record);
            }
            for span in &outcome.spans {
                print_span_text(span);
            }
        }
        OutputFormat::Json => {
            for record in &outcome.records {
                println!("{}", serde_json::to_string(record)?);
            }
            for span in &outcome.spans {
                println!("{}", serde_json::to_string(span)?);
            }
        }
    }

    if cli.stats {
        let stats = engine.channel_stats();
        eprintln!(
            "events: {}  spans: {}  records: {}  dropped: {}  evicted: {}",
            outcome.events,
            outcome.spans.len(),
            stats.published,
            stats.dropped,
            engine.evicted_spans()
        );
    }

    engine.shutdown();
    Ok(())
}
