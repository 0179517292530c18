use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing_subscriber::EnvFilter;

use spectrawatch::config::{AppConfig, DetectionConfig};
use spectrawatch::detect::classify::{classify, near_standard_frequency};
use spectrawatch::source::live::{check_hardware, Receiver};
use spectrawatch::source::rtl_tcp::RtlTcpReceiver;

#[derive(Parser)]
#[command(
    name = "spectrawatch",
    about = "Streaming RF spectrum anomaly monitor",
    version,
    long_about = None
)]
struct Cli {
    /// Path to a TOML config file (falls back to $SPECTRAWATCH_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon (API server + processing controller)
    Serve {
        /// Bind address (overrides [server] bind)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Write a synthetic labelled corpus
    GenerateCorpus {
        /// Output file (defaults to [corpus] path)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,

        /// RNG seed for a reproducible corpus
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Check whether an RTL-SDR is reachable over rtl_tcp
    CheckHardware {
        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Label a single signal by frequency and amplitude
    Classify {
        /// Frequency in MHz
        #[arg(long, allow_hyphen_values = true)]
        frequency: f64,

        /// Amplitude (relative power)
        #[arg(long, allow_hyphen_values = true)]
        amplitude: f64,
    },

    /// Run the pipeline headless for a number of cycles and print anomalies
    Monitor {
        /// Cycles to run
        #[arg(long, default_value = "10")]
        cycles: u64,

        /// JSON run configuration (defaults apply when omitted)
        #[arg(long)]
        run_config: Option<PathBuf>,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(cfg: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cfg.logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if cfg.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut cfg = AppConfig::load_or_default(cli.config.as_deref())?;
    init_tracing(&cfg);

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                cfg.server.bind = bind;
            }
            tracing::info!(bind = %cfg.server.bind, "Starting spectrawatch daemon");
            spectrawatch::serve(cfg).await?;
        }
        Commands::GenerateCorpus {
            output,
            force,
            seed,
        } => {
            let path = output.unwrap_or_else(|| cfg.corpus.path.clone());
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            let mut rng = match seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            let rows = spectrawatch::corpus::generate(&path, &mut rng)?;
            println!("Wrote {} rows to {}", rows, path.display());
        }
        Commands::CheckHardware { json } => {
            let receiver = RtlTcpReceiver::from_config(&cfg.hardware);
            tracing::info!(address = receiver.address(), "Probing rtl_tcp endpoint");
            let status = check_hardware(
                Some(&receiver as &dyn Receiver),
                &DetectionConfig::default(),
                &cfg.corpus.path,
            )
            .await;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else if status.available {
                println!("\nRTL-SDR available at {}", receiver.address());
                println!("{:<16} : {}", "Tuner", status.tuner.as_deref().unwrap_or("unknown"));
                if let Some([low, high]) = status.frequency_range {
                    println!("{:<16} : {} - {} MHz", "Tuning range", low, high);
                }
                println!();
            } else {
                println!("\nNo RTL-SDR reachable at {}", receiver.address());
                println!(
                    "{:<16} : {}",
                    "Using dataset",
                    status.dataset_path.as_deref().unwrap_or("-")
                );
                println!();
            }
        }
        Commands::Classify {
            frequency,
            amplitude,
        } => match classify(frequency, amplitude) {
            Some(category) => {
                println!("{:.3} MHz @ {:.3}: {}", frequency, amplitude, category);
                if near_standard_frequency(frequency) {
                    println!("(within 0.2 MHz of a standard broadcast carrier)");
                }
            }
            None => bail!("frequency and amplitude must be finite numbers"),
        },
        Commands::Monitor {
            cycles,
            run_config,
            json,
        } => {
            let run_config = match run_config {
                Some(path) => {
                    let raw = std::fs::read(&path)
                        .with_context(|| format!("failed to read {}", path.display()))?;
                    serde_json::from_slice::<DetectionConfig>(&raw)
                        .with_context(|| format!("invalid run configuration: {}", path.display()))?
                }
                None => DetectionConfig::default(),
            };

            let state = spectrawatch::assemble(&cfg)?;
            let monitor = state.monitor;
            monitor.start(run_config).await;

            let poll = cfg.pipeline.cycle_interval().max(Duration::from_millis(10));
            while monitor.status().await.cycles < cycles {
                tokio::time::sleep(poll).await;
            }
            monitor.stop().await;

            let status = monitor.status().await;
            let anomalies = monitor.recent_anomalies().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&anomalies)?);
            } else {
                println!(
                    "\nRan {} cycles, {} samples buffered, {} anomalies",
                    status.cycles,
                    status.buffered_samples,
                    anomalies.len()
                );
                println!("{:<10} | {:<10} | {:<6} | Classification", "MHz", "Strength", "Conf");
                println!("{:-<10}-|-{:-<10}-|-{:-<6}-|-{:-<30}", "", "", "", "");
                for a in &anomalies {
                    println!(
                        "{:<10.3} | {:<10.3} | {:<6.2} | {}",
                        a.frequency,
                        a.signal_strength,
                        a.confidence,
                        a.classification.as_deref().unwrap_or("-")
                    );
                }
                println!();
            }
        }
    }

    Ok(())
}
