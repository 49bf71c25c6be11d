use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use stack_lab_abstract::{
    Endpoint, HeaderFields, Layer, PresentationSink, StackConfig, TestScenario,
};
use stack_lab_engine::scenario::run_scenario;
use stack_lab_engine::{NoopPacer, Pacer, SessionReport, SleepPacer, StackPipeline};

#[derive(Parser, Debug)]
#[command(author, version, about = "Layer-by-layer network stack walkthrough")]
struct Args {
    /// Application payload to transmit.
    #[arg(
        long,
        default_value = "GET / HTTP/1.1\r\nHost: example.com\r\nUser-Agent: stack-lab\r\n\r\n"
    )]
    payload: String,

    /// Number of send/receive cycles to run.
    #[arg(long, default_value_t = 3)]
    cycles: u32,

    /// Activate the random-loss coin flip.
    #[arg(long, default_value_t = false)]
    loss: bool,

    /// Seed for the session's random source.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Signal one congestion event after the transfers.
    #[arg(long, default_value_t = false)]
    congestion: bool,

    /// Pace stages with real delays instead of running flat out.
    #[arg(long, default_value_t = false)]
    paced: bool,

    /// Run a TOML scenario instead of the default session.
    #[arg(long)]
    scenario: Option<PathBuf>,

    /// Write a JSON trace of the finished session.
    #[arg(long)]
    trace_out: Option<PathBuf>,
}

/// Sink that narrates the stack walkthrough through tracing. Log lines carry
/// the layer tag; header tables and status changes go to debug level.
struct TracingSink;

impl PresentationSink for TracingSink {
    fn log_event(&mut self, layer: Layer, message: &str, detail: &str) {
        if detail.is_empty() {
            info!("[{}] {}", layer.tag().to_uppercase(), message);
        } else {
            info!("[{}] {} {}", layer.tag().to_uppercase(), message, detail);
        }
    }

    fn display_header_table(&mut self, endpoint: Endpoint, layer: Layer, fields: &HeaderFields) {
        for (name, value) in fields.iter() {
            debug!("[{endpoint:?}/{layer}] {name}: {value}");
        }
    }

    fn set_status(&mut self, endpoint: Endpoint, layer: Layer, status: &str) {
        debug!("[{endpoint:?}/{layer}] status: {status}");
    }

    fn notify_transit_start(&mut self) {
        info!("[SYS] >>> frame in transit");
    }

    fn notify_transit_end(&mut self) {
        info!("[SYS] <<< transit finished");
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();
    info!("stack-lab starting…");

    let report = if let Some(path) = &args.scenario {
        let scenario = load_scenario(path)?;
        info!("Running scenario '{}': {}", scenario.name, scenario.description);
        run_scenario(&scenario, StackConfig::default())?
    } else {
        run_default_session(&args)?
    };

    summarize(&report);

    if let Some(path) = &args.trace_out {
        write_trace(path, &report)?;
    }

    Ok(())
}

fn run_default_session(args: &Args) -> Result<SessionReport> {
    let config = StackConfig {
        seed: args.seed,
        ..StackConfig::default()
    };
    let pacer: Box<dyn Pacer> = if args.paced {
        Box::new(SleepPacer)
    } else {
        Box::new(NoopPacer)
    };
    let mut pipeline = StackPipeline::new(config)
        .with_sink(Box::new(TracingSink))
        .with_pacer(pacer);

    pipeline.establish(None, None)?;
    if args.loss {
        pipeline.set_loss_active(true);
    }
    for _ in 0..args.cycles {
        pipeline.send(args.payload.as_bytes())?;
    }
    if args.congestion {
        pipeline.trigger_congestion_event();
    }
    Ok(pipeline.report())
}

fn summarize(report: &SessionReport) {
    info!(
        "State: {:?} | Client Seq={} Ack={} | Server Seq={} Ack={}",
        report.state, report.client.seq, report.client.ack, report.server.seq, report.server.ack
    );
    info!(
        "Packets sent: {} | received: {} | lost: {} | retransmissions: {}",
        report.counters.packets_sent,
        report.counters.packets_received,
        report.counters.data_packets_lost,
        report.counters.retransmissions
    );
    info!(
        "Efficiency: {:.2}% | Est. throughput: {:.0} bps",
        report.efficiency_percent, report.estimated_throughput_bps
    );
}

fn load_scenario(path: &Path) -> Result<TestScenario> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
    let scenario: TestScenario =
        toml::from_str(&content).context("Failed to parse scenario file")?;
    Ok(scenario)
}

fn write_trace(path: &Path, report: &SessionReport) -> Result<()> {
    let data = serde_json::to_vec_pretty(report).context("Failed to serialize session trace")?;
    fs::write(path, &data)
        .with_context(|| format!("Failed to write trace file {}", path.display()))?;
    Ok(())
}
