//! Daemon configuration.
//!
//! Hardware locations come from command-line flags (or `SMARTFAN_*`
//! environment variables); control tuning comes from [`ThermalConfig`]
//! defaults, optionally overridden by a JSON file.

use std::path::PathBuf;

use clap::Args;

use crate::ec::{RegisterMap, ScaleRange};
use crate::error::ConfigError;
use crate::thermal::ThermalConfig;

/// Where the sensor and the fan registers live.
#[derive(Debug, Clone, Args)]
pub struct HardwareArgs {
    /// Temperature file holding millidegrees Celsius
    #[arg(
        long,
        env = "SMARTFAN_THERMAL_ZONE",
        default_value = "/sys/class/hwmon/hwmon4/temp1_input"
    )]
    pub thermal_zone: PathBuf,

    /// Embedded controller register device
    #[arg(long, env = "SMARTFAN_EC_PATH", default_value = "/dev/ec")]
    pub ec_path: PathBuf,

    /// Address of the fan speed control register
    #[arg(long, env = "SMARTFAN_EC_ADDR", default_value_t = 25)]
    pub ec_addr: u8,

    /// Address of the manual control enable register
    #[arg(long, env = "SMARTFAN_MANUAL_ADDR", default_value_t = 21)]
    pub manual_addr: u8,

    /// Address of the current speed register
    #[arg(long, env = "SMARTFAN_READ_ADDR", default_value_t = 17)]
    pub read_addr: u8,

    /// Minimum value to write to the speed control register
    #[arg(long, env = "SMARTFAN_EC_MIN", default_value_t = 0)]
    pub ec_min: u8,

    /// Maximum value to write to the speed control register
    #[arg(long, env = "SMARTFAN_EC_MAX", default_value_t = 59)]
    pub ec_max: u8,

    /// Minimum value read back from the current speed register
    #[arg(long, env = "SMARTFAN_READ_MIN", default_value_t = 4)]
    pub read_min: u8,

    /// Maximum value read back from the current speed register
    #[arg(long, env = "SMARTFAN_READ_MAX", default_value_t = 59)]
    pub read_max: u8,
}

impl HardwareArgs {
    pub fn register_map(&self) -> RegisterMap {
        RegisterMap {
            speed_control: self.ec_addr,
            manual_enable: self.manual_addr,
            speed_read: self.read_addr,
            write_scale: ScaleRange::new(self.ec_min, self.ec_max),
            read_scale: ScaleRange::new(self.read_min, self.read_max),
        }
    }
}

/// Validated configuration the daemon starts from.
#[derive(Debug, Clone)]
pub struct Config {
    pub thermal_zone: PathBuf,
    pub ec_path: PathBuf,
    pub registers: RegisterMap,
    pub thermal: ThermalConfig,
    pub debug: bool,
}

impl Config {
    /// Assemble and validate. `tuning` is an optional JSON override file.
    pub fn load(
        hardware: &HardwareArgs,
        tuning: Option<&std::path::Path>,
        debug: bool,
    ) -> Result<Self, ConfigError> {
        let thermal = match tuning {
            Some(path) => ThermalConfig::from_json_file(path)?,
            None => ThermalConfig::default(),
        };

        let config = Self {
            thermal_zone: hardware.thermal_zone.clone(),
            ec_path: hardware.ec_path.clone(),
            registers: hardware.register_map(),
            thermal,
            debug,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.registers.validate()?;
        self.thermal.validate()
    }
}
