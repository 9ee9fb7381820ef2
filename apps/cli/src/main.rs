mod sim;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use tracing::info;

use pcmdump_core::{
    CancellationToken, PcmInfo, Response, SeedComplement, Vehicle, VehicleConfig, VehicleEvent,
    VehicleObserver,
};

use sim::BenchPcm;

#[derive(Parser, Debug)]
#[command(
    name = "pcmdump",
    author,
    version,
    about = "GM PCM flash read-out over J1850 VPW",
    long_about = "Reads the flash image out of a GM powertrain control module by uploading \
a read kernel over the VPW bus. Adapter drivers plug in through the core's Device trait; \
this build ships the bench simulator only."
)]
struct Args {
    /// Path to a TOML dump configuration
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Run against the built-in bench PCM instead of real hardware
    #[arg(long, global = true)]
    bench: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Query VIN, serial, BCC, MEC and the id words
    Info,
    /// Unlock, upload the kernel and dump the flash image
    Read {
        /// Path to the read-kernel binary
        #[arg(long, default_value = "kernel.bin")]
        kernel: PathBuf,
        /// Where to write the image
        #[arg(long, default_value = "image.bin")]
        output: PathBuf,
    },
    /// Write a new 17-character VIN
    WriteVin { vin: String },
    /// Write a default configuration file
    InitConfig {
        #[arg(default_value = "pcmdump.toml")]
        path: PathBuf,
    },
}

/// On-disk dump configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DumpConfig {
    pcm: PcmInfo,
    engine: VehicleConfig,
}

impl Default for DumpConfig {
    fn default() -> Self {
        Self {
            pcm: PcmInfo {
                image_base_address: 0,
                image_size: 512 * 1024,
                key_algorithm_id: 40,
            },
            engine: VehicleConfig::default(),
        }
    }
}

impl DumpConfig {
    fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config = toml::from_str(&content)?;
        Ok(config)
    }

    fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }
}

/// Prints progress to stderr; everything else goes through tracing.
struct CliObserver {
    verbose: bool,
}

impl VehicleObserver for CliObserver {
    fn on_event(&self, event: &VehicleEvent) {
        match event {
            VehicleEvent::PhaseChanged { from, to } => {
                if self.verbose {
                    eprintln!("→ Phase: {} → {}", from, to);
                }
            }
            VehicleEvent::Progress {
                phase,
                operation,
                current,
                total,
            } => {
                let pct = if *total > 0 { (*current * 100) / *total } else { 0 };
                eprint!("\r[{:>3}%] {}: {}", pct, phase, operation);
                if *current == *total {
                    eprintln!();
                }
            }
            VehicleEvent::UserMessage(message) => {
                eprintln!("{}", message);
            }
            VehicleEvent::DebugMessage(message) => {
                if self.verbose {
                    eprintln!("DEBUG: {}", message);
                }
            }
            VehicleEvent::Packet { .. } => {}
            VehicleEvent::Complete => {
                eprintln!("✓ Done");
            }
        }
    }
}

fn check<T>(what: &str, response: &Response<T>) -> Result<()> {
    if response.is_success() {
        Ok(())
    } else {
        bail!("{what} failed: {}", response.status);
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let config = match &args.config {
        Some(path) => DumpConfig::load_from_file(path)?,
        None => DumpConfig::default(),
    };

    if let Command::InitConfig { path } = &args.command {
        DumpConfig::default().save_to_file(path)?;
        eprintln!("wrote {}", path.display());
        return Ok(());
    }

    if !args.bench {
        bail!(
            "no adapter driver is linked into this build; pass --bench to run \
against the simulator, or link an adapter crate through the Device trait"
        );
    }

    let device = BenchPcm::new(config.pcm.image_base_address, config.pcm.image_size);
    let observer = Arc::new(CliObserver {
        verbose: args.verbose,
    });
    let mut vehicle = Vehicle::with_observer(device, observer, config.engine.clone());
    vehicle.initialize().context("adapter initialization")?;
    info!(device = %vehicle.device_description(), "connected");

    match args.command {
        Command::Info => {
            let vin = vehicle.query_vin();
            check("VIN query", &vin)?;
            let serial = vehicle.query_serial();
            check("serial query", &serial)?;
            let bcc = vehicle.query_bcc();
            check("BCC query", &bcc)?;
            let mec = vehicle.query_mec();
            check("MEC query", &mec)?;
            let os = vehicle.query_operating_system_id();
            check("OS id query", &os)?;
            let hardware = vehicle.query_hardware_id();
            check("hardware id query", &hardware)?;
            let calibration = vehicle.query_calibration_id();
            check("calibration id query", &calibration)?;

            println!("VIN:            {}", vin.value);
            println!("Serial:         {}", serial.value);
            println!("BCC:            {}", bcc.value);
            println!("MEC:            {}", mec.value);
            println!("OS id:          {}", os.value);
            println!("Hardware id:    {}", hardware.value);
            println!("Calibration id: {}", calibration.value);
        }
        Command::Read { kernel, output } => {
            let kernel_bytes = std::fs::read(&kernel)
                .with_context(|| format!("reading kernel {}", kernel.display()))?;

            let unlocked = vehicle.unlock(config.pcm.key_algorithm_id, &SeedComplement);
            check("unlock", &unlocked)?;

            let cancel = CancellationToken::new();
            let image = vehicle.read_contents(&config.pcm, &kernel_bytes, &cancel);
            check("image read", &image)?;

            std::fs::write(&output, &image.value)
                .with_context(|| format!("writing {}", output.display()))?;
            eprintln!("wrote {} bytes to {}", image.value.len(), output.display());
        }
        Command::WriteVin { vin } => {
            let written = vehicle.update_vin(&vin);
            check("VIN write", &written)?;
        }
        Command::InitConfig { .. } => unreachable!("handled above"),
    }

    Ok(())
}
