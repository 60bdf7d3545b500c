//! leasemq – runs a producer/consumer workload against one engine wiring
//! and prints how often each message was delivered.
//
//  $ leasemq run --config leasemq.toml
//  $ leasemq run --preset concurrent-plain --timeout-ms 0 --consumers 8
use leasemq::config::{load_config, Config, Preset};
use leasemq::logging::init_logging;
use leasemq::{workload, Eviction};

use clap::{Parser, Subcommand};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "leasemq", version, about = "Lease-based message queue workload driver")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a workload and print the delivery histogram.
    Run {
        /// Path to config TOML (env LEASEMQ_CONFIG overrides)
        #[arg(short, long)]
        config: Option<String>,

        /// Engine wiring; overrides the configured locks and lease.
        #[arg(short, long, value_enum)]
        preset: Option<Preset>,

        /// Lease timeout in milliseconds.
        #[arg(long, allow_negative_numbers = true)]
        timeout_ms: Option<i64>,

        #[arg(long, value_enum)]
        eviction: Option<Eviction>,

        /// Number each message.
        #[arg(long)]
        numbered: bool,

        #[arg(long)]
        producers: Option<usize>,

        #[arg(long)]
        consumers: Option<usize>,

        #[arg(long)]
        queues: Option<usize>,

        #[arg(long)]
        messages: Option<usize>,
    },
}

fn main() -> anyhow::Result<()> {
    init_logging()?;
    let cli = Cli::parse();

    match cli.cmd {
        Command::Run {
            config,
            preset,
            timeout_ms,
            eviction,
            numbered,
            producers,
            consumers,
            queues,
            messages,
        } => {
            let mut cfg: Config = match std::env::var("LEASEMQ_CONFIG").ok().or(config) {
                Some(path) => load_config(&path)?,
                None => Config::default(),
            };

            if let Some(preset) = preset {
                cfg.engine.apply_preset(preset);
            }
            if let Some(timeout_ms) = timeout_ms {
                cfg.engine.lease_timeout_ms = timeout_ms;
            }
            if let Some(eviction) = eviction {
                cfg.engine.eviction = eviction;
            }
            cfg.engine.numbered |= numbered;
            let wl = &mut cfg.workload;
            wl.producers = producers.unwrap_or(wl.producers);
            wl.consumers = consumers.unwrap_or(wl.consumers);
            wl.queues = queues.unwrap_or(wl.queues);
            wl.messages_per_producer = messages.unwrap_or(wl.messages_per_producer);

            info!(engine = %cfg.engine, "building engine");
            let service = cfg.engine.build()?;
            let report = workload::run(service.as_ref(), &cfg.workload)?;

            print!("{report}");
            print!("{}", service.stats().render());
            if !report.all_delivered() {
                anyhow::bail!("some messages were never delivered");
            }
        }
    }
    Ok(())
}
