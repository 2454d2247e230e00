//! corr-runner: headless driver for the correlation engine.
//!
//! Usage:
//!   corr-runner --records records.json --towers towers.json --config engine.json --out report.json
//!   corr-runner --synthetic --seed 12345 --subscribers 40 --days 60
//!   corr-runner --synthetic --ipc-mode

use anyhow::{Context, Result};
use std::env;
use std::io::{self, BufRead, Write};
use telecorr_core::{
    classification::KeywordClassifier,
    config::AnalysisConfig,
    engine::{AnalysisEngine, AnalysisReport},
    filter::RecordFilter,
    fingerprint::compare_fingerprints,
    graph_overlay::{display_projection, GraphOverlay},
    location_resolver::TowerLookup,
    record::InteractionRecord,
    synthetic::{generate, SyntheticConfig},
    timeline::TimelineQuery,
};

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcCommand {
    /// New filter: full recomputation, complete report back.
    Analyze {
        #[serde(default)]
        filter: RecordFilter,
    },
    Timeline {
        query: TimelineQuery,
    },
    /// Layout-facing graph from the latest report.
    Display {
        #[serde(default)]
        overlay: GraphOverlay,
        max_nodes: Option<usize>,
    },
    /// Fingerprint similarity of two numbers from the latest report.
    Compare {
        a: String,
        b: String,
    },
    Quit,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");
    let synthetic = args.iter().any(|a| a == "--synthetic");
    let classify = args.iter().any(|a| a == "--classify");

    let config = match flag_value(&args, "--config") {
        Some(path) => AnalysisConfig::load(path).with_context(|| format!("loading config {path}"))?,
        None => AnalysisConfig::default(),
    };

    let (records, towers) = if synthetic {
        let defaults = SyntheticConfig::default();
        let dataset = generate(&SyntheticConfig {
            seed: parse_arg(&args, "--seed", defaults.seed),
            subscribers: parse_arg(&args, "--subscribers", defaults.subscribers),
            days: parse_arg(&args, "--days", defaults.days),
            ..defaults
        });
        (dataset.records, dataset.towers)
    } else {
        let records_path = flag_value(&args, "--records")
            .context("--records <file> is required unless --synthetic is given")?;
        let records: Vec<InteractionRecord> = read_json(records_path)?;
        let towers: TowerLookup = match flag_value(&args, "--towers") {
            Some(path) => read_json(path)?,
            None => TowerLookup::default(),
        };
        (records, towers)
    };

    let mut engine = AnalysisEngine::new(config)?;
    if classify {
        engine = engine.with_classifier(Box::new(KeywordClassifier::default()));
    }

    if ipc_mode {
        return run_ipc_loop(&engine, &records, &towers);
    }

    if flag_value(&args, "--out").is_none() {
        println!("corr-runner");
        println!("  records:   {}", records.len());
        println!("  towers:    {}", towers.len());
        println!("  parallel:  {}", engine.config().execution.parallel);
        println!();
    }

    let report = engine.run(&records, &towers, &RecordFilter::default())?;
    match flag_value(&args, "--out") {
        Some(path) => {
            let json = serde_json::to_string_pretty(&report)?;
            std::fs::write(path, json).with_context(|| format!("writing report {path}"))?;
            log::info!("report written to {path}");
        }
        None => print_summary(&report),
    }
    Ok(())
}

fn run_ipc_loop(engine: &AnalysisEngine, records: &[InteractionRecord], towers: &TowerLookup) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();
    let mut latest: Option<AnalysisReport> = None;

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }

        let cmd: IpcCommand = match serde_json::from_str(&buffer) {
            Ok(c) => c,
            Err(e) => {
                reply_error(&mut stdout, &e.to_string())?;
                continue;
            }
        };

        match cmd {
            IpcCommand::Quit => break,
            IpcCommand::Analyze { filter } => match engine.run(records, towers, &filter) {
                Ok(report) => {
                    writeln!(stdout, "{}", serde_json::to_string(&report)?)?;
                    latest = Some(report);
                }
                Err(e) => reply_error(&mut stdout, &e.to_string())?,
            },
            IpcCommand::Timeline { query } => {
                let events = engine.timeline(records, &query);
                writeln!(stdout, "{}", serde_json::to_string(&events)?)?;
            }
            IpcCommand::Display { overlay, max_nodes } => match &latest {
                Some(report) => {
                    let graph_cfg = &engine.config().graph;
                    let display = display_projection(
                        &report.graph,
                        &overlay,
                        max_nodes.unwrap_or(graph_cfg.max_display_nodes),
                        graph_cfg.hub_degree_threshold,
                    );
                    writeln!(stdout, "{}", serde_json::to_string(&display)?)?;
                }
                None => reply_error(&mut stdout, "no analysis has been run yet")?,
            },
            IpcCommand::Compare { a, b } => {
                let pair = latest
                    .as_ref()
                    .and_then(|r| Some((r.fingerprints.get(&a)?, r.fingerprints.get(&b)?)));
                match pair {
                    Some((fa, fb)) => {
                        writeln!(stdout, "{}", serde_json::to_string(&compare_fingerprints(fa, fb))?)?
                    }
                    None => reply_error(&mut stdout, "both numbers need fingerprints from a prior analyze")?,
                }
            }
        }
        stdout.flush()?;
    }
    Ok(())
}

fn reply_error(stdout: &mut io::Stdout, message: &str) -> Result<()> {
    let err_json = serde_json::json!({ "error": message });
    writeln!(stdout, "{}", err_json)?;
    stdout.flush()?;
    Ok(())
}

fn print_summary(report: &AnalysisReport) {
    let d = &report.diagnostics;
    println!("=== PASS SUMMARY ===");
    println!("  records in:        {}", d.records_in);
    println!("  analysed:          {}", d.analysed);
    println!("  unreadable times:  {}", d.unparsable_timestamps);
    println!("  nodes / edges:     {} / {}", report.graph.node_count(), report.graph.edge_count());
    println!("  graph trimmed:     {}", report.graph_trimmed);
    println!("  hubs:              {}", report.hubs.len());
    println!("  chains:            {}", report.chains.len());
    println!("  fingerprints:      {}", report.fingerprints.len());
    println!("  located entities:  {}", report.location_events.len());
    println!("  unresolved events: {}", d.unresolved_location_events);
    println!("  co-locations:      {}", report.colocations.len());
    println!("  active towers:     {}", report.tower_activity.len());
    println!("  linked numbers:    {}", report.links.len());
    if d.clamped_call_durations > 0 {
        println!("  clamped durations: {}", d.clamped_call_durations);
    }
    if report.content.capability_available {
        println!("  flagged messages:  {}", report.content.flagged.len());
    }

    println!();
    println!("=== ANOMALIES ({}) ===", report.anomalies.len());
    if report.anomalies.is_empty() {
        println!("  (none)");
    }
    for a in &report.anomalies {
        println!("  [{:?}] {} | {}", a.severity, a.category.as_str(), a.description);
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &str) -> Result<T> {
    let content = std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {path}"))
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2).find(|w| w[0] == flag).map(|w| w[1].as_str())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
