//! # gos-node
//!
//! Runs a seeded traffic scenario through one node's port set and prints
//! what the scheduler did with it.
//!
//! ## Usage
//!
//! ```bash
//! # Built-in defaults: 4 active ports, 1 MiB shared buffer
//! gos-node
//!
//! # From a config file, machine-readable output
//! gos-node --config node.toml --json
//!
//! # Scheduler decisions
//! RUST_LOG=gos_core=trace gos-node
//! ```

use std::path::PathBuf;

use anyhow::Context;

use gos_core::Priority;
use gos_sim::{run_scenario, NodeConfig, RunReport};

struct Args {
    config: Option<PathBuf>,
    json: bool,
}

fn main() -> anyhow::Result<()> {
    // ── Logging ─────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(true)
        .compact()
        .init();

    // ── Parse CLI ───────────────────────────────────────────────
    let args = parse_args()?;

    let config = match &args.config {
        Some(path) => NodeConfig::load(path)?,
        None => NodeConfig::default(),
    };
    tracing::info!(config = ?args.config, "gos-node starting");

    // ── Run ─────────────────────────────────────────────────────
    let report = run_scenario(&config)?;

    if args.json {
        let json = serde_json::to_string_pretty(&report).context("serializing report")?;
        println!("{json}");
    } else {
        print_report(&report);
    }
    Ok(())
}

fn parse_args() -> anyhow::Result<Args> {
    let args: Vec<String> = std::env::args().collect();
    let mut config = None;
    let mut json = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                i += 1;
                let val = args
                    .get(i)
                    .ok_or_else(|| anyhow::anyhow!("--config requires a value"))?;
                config = Some(PathBuf::from(val));
            }
            "--json" | "-j" => json = true,
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            other => anyhow::bail!("unknown argument '{}' (see --help)", other),
        }
        i += 1;
    }

    Ok(Args { config, json })
}

fn print_help() {
    eprintln!(
        "gos-node: run a GoS port-set scenario

USAGE:
    gos-node [OPTIONS]

OPTIONS:
    -c, --config <PATH>  TOML config ([port_set], [switching], [traffic])
    -j, --json           Print the report as JSON
    -h, --help           Show this help

ENVIRONMENT:
    RUST_LOG             Log filter (default: info)"
    );
}

fn print_report(report: &RunReport) {
    println!(
        "{:?} port set, {} ports, {} ticks",
        report.kind, report.ports, report.ticks
    );
    println!(
        "offered {}  admitted {} ({:.1}%)  discarded {}  retransmission requests {}",
        report.offered,
        report.admitted,
        report.admission_ratio() * 100.0,
        report.discarded,
        report.retransmission_requests
    );
    println!(
        "switched {} packets / {} bytes, {} still buffered",
        report.switched, report.switched_bytes, report.residual_packets
    );
    println!(
        "congestion: peak {}%  final {}%",
        report.peak_congestion_level, report.final_congestion_level
    );
    println!("{:<20}  {:>8}  {:>8}", "priority", "admitted", "switched");
    for priority in Priority::all().rev() {
        let i = priority.index();
        println!(
            "{:<20}  {:>8}  {:>8}",
            priority.to_string(),
            report.incoming_by_priority[i], report.served_by_priority[i]
        );
    }
}
