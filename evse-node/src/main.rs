//! EVSE Node - load balancer demo
//!
//! Runs the balancer against a simulated site whose meter reads back the
//! chargers' draw, so every limit change shows up in the next tick.
//!
//! # Usage
//!
//! ```bash
//! # Built-in two charger site
//! evse-node
//!
//! # Custom site, 1s ticks, stop after 60 ticks
//! evse-node --config evse-node/sites/demo.json --interval-ms 1000 --ticks 60
//! ```

mod site;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use evse_core::{
    Balancer, BalancerConfig, Charger, FuseCapacity, SimulatedCharger, SiteConfig, TickOutcome,
};
use rand::seq::SliceRandom;
use rand::Rng;
use tokio::sync::{mpsc, watch};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::site::{build_chargers, demo_site, SiteMeter};

/// Per-phase EV charger load balancer (simulated site)
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Site description (JSON). Uses a built-in demo site when omitted
    #[arg(short, long)]
    config: Option<String>,

    /// Number of ticks to run
    #[arg(short, long, default_value = "30")]
    ticks: u32,

    /// Tick interval in milliseconds
    #[arg(long, default_value = "500")]
    interval_ms: u64,

    /// Minimum seconds between two raises of the same charger
    #[arg(long, default_value = "2")]
    min_raise_secs: u64,

    /// Household load noise amplitude in amps
    #[arg(long, default_value = "3")]
    jitter: i32,

    /// Chance per tick that a random car is plugged in or out
    #[arg(long, default_value = "0.05")]
    toggle_chance: f64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Setup logging
    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let site = match &args.config {
        Some(path) => SiteConfig::load(path)?,
        None => demo_site(),
    };

    println!();
    println!("EVSE load balancer");
    println!("  Fuse:     {} A (margin {} A)", site.fuse_limit, site.margin);
    println!("  Base:     {} A", site.base_load);
    println!("  Chargers: {}", site.chargers.len());
    println!("  Interval: {} ms, {} ticks", args.interval_ms, args.ticks);
    println!();

    let chargers = build_chargers(&site);
    let meter = Arc::new(SiteMeter::new(site.base_load, chargers.clone(), args.jitter));
    let capacity = Arc::new(FuseCapacity::new(site.fuse_limit, meter).with_margin(site.margin));

    let config = BalancerConfig::default()
        .with_poll_interval(Duration::from_millis(args.interval_ms))
        .with_min_raise_interval(Duration::from_secs(args.min_raise_secs));
    let balancer = Arc::new(Balancer::new(config, capacity));

    for charger in &chargers {
        let charger: Arc<dyn Charger> = charger.clone();
        if !balancer.register(charger.clone()) {
            eprintln!("Duplicate charger id: {}", charger.id());
        }
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (report_tx, mut report_rx) = mpsc::unbounded_channel();

    let runner = {
        let balancer = balancer.clone();
        tokio::spawn(async move { balancer.run(shutdown_rx, Some(report_tx)).await })
    };

    info!("Starting balancer...");

    let mut tick = 0;
    while tick < args.ticks {
        let Some(outcome) = report_rx.recv().await else {
            break;
        };
        tick += 1;
        print_tick(tick, &outcome, &chargers);
        maybe_toggle_car(&chargers, args.toggle_chance);
    }

    shutdown_tx.send(true)?;
    runner.await?;

    Ok(())
}

/// One summary line per tick
fn print_tick(tick: u32, outcome: &TickOutcome, chargers: &[Arc<SimulatedCharger>]) {
    let draws: Vec<String> = chargers
        .iter()
        .map(|c| {
            let state = if c.can_charge() { "on" } else { "off" };
            format!("{}[{}]={}", c.id(), state, c.draw())
        })
        .collect();

    match outcome {
        TickOutcome::Idle => println!("#{:<3} idle          {}", tick, draws.join(" ")),
        TickOutcome::NoCapacityReading => println!("#{:<3} no reading", tick),
        TickOutcome::Allocated { available, report } => println!(
            "#{:<3} avail {} applied {} deferred {} failed {}  {}",
            tick,
            available,
            report.applied.len(),
            report.deferred.len(),
            report.failed.len(),
            draws.join(" ")
        ),
    }
}

/// Randomly plug a car in or out
fn maybe_toggle_car(chargers: &[Arc<SimulatedCharger>], chance: f64) {
    let mut rng = rand::thread_rng();
    if !rng.gen_bool(chance.clamp(0.0, 1.0)) {
        return;
    }

    if let Some(charger) = chargers.choose(&mut rng) {
        let plugged = !charger.can_charge();
        charger.set_can_charge(plugged);
        info!(
            "Car {} at {}",
            if plugged { "plugged in" } else { "unplugged" },
            charger.id()
        );
    }
}
