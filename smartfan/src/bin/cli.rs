//! Command-line companion for smartfand.
//!
//! Inspects the sensor and fan registers directly, and can hand the fan
//! back to the embedded controller if the daemon died without doing so.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use smartfan::config::HardwareArgs;
use smartfan::ec::{EcDevice, MANUAL_CONTROL_OFF, RegisterIo};
use smartfan::scheduler::{HandbackGuard, hand_back};
use smartfan::sensor::{SysfsTemperature, TemperatureSource};

#[derive(Debug, Parser)]
#[command(name = "smartfan-cli", version, about = "Inspect or release the laptop fan")]
struct Cli {
    #[command(flatten)]
    hardware: HardwareArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show temperature, fan speed and who controls the fan
    Status,
    /// Give fan control back to the embedded controller
    Release,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let registers = cli.hardware.register_map();
    registers.validate().context("invalid register layout")?;

    let mut ec = EcDevice::open(&cli.hardware.ec_path).await?;

    match cli.command {
        Command::Status => {
            let mut sensor = SysfsTemperature::new(&cli.hardware.thermal_zone);
            let temperature = sensor.read_temperature().await?;
            let raw = ec.read_register(registers.speed_read).await?;
            let manual = ec.read_register(registers.manual_enable).await?;

            println!("Temperature: {temperature:.1} °C");
            println!(
                "Fan speed:   {}% (raw {raw})",
                registers.read_scale.register_to_percent(raw)
            );
            println!(
                "Control:     {}",
                if manual == MANUAL_CONTROL_OFF {
                    "embedded controller"
                } else {
                    "manual"
                }
            );
        }
        Command::Release => {
            hand_back(&mut ec, registers.handback_sequence(), &HandbackGuard::new()).await;

            let manual = ec.read_register(registers.manual_enable).await?;
            if manual != MANUAL_CONTROL_OFF {
                bail!("manual control still enabled (register reads {manual})");
            }
            println!("Fan control returned to the embedded controller");
        }
    }

    Ok(())
}
