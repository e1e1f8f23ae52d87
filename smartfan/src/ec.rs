//! Embedded-controller register access.
//!
//! The EC exposes its register file as a byte-addressable device (for
//! example `/dev/ec` from the `ec_sys`/`acpi_ec` modules). Each register is
//! one byte at the offset equal to its address.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::error::{ConfigError, Error, Result};

/// Value written to the manual-enable register to take fan control.
pub const MANUAL_CONTROL_ON: u8 = 1;

/// Value written to the manual-enable register to give control back.
pub const MANUAL_CONTROL_OFF: u8 = 0;

/// Byte-level access to hardware registers.
#[async_trait]
pub trait RegisterIo: Send {
    async fn read_register(&mut self, address: u8) -> Result<u8>;

    async fn write_register(&mut self, address: u8, value: u8) -> Result<()>;
}

/// A single register write, used to describe hand-back sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterWrite {
    pub address: u8,
    pub value: u8,
}

/// Linear mapping between a fan speed percentage and raw register values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaleRange {
    pub min: u8,
    pub max: u8,
}

impl ScaleRange {
    pub const fn new(min: u8, max: u8) -> Self {
        Self { min, max }
    }

    pub fn validate(&self, name: &'static str) -> Result<(), ConfigError> {
        if self.min >= self.max {
            return Err(ConfigError::DegenerateRange {
                name,
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }

    /// Register value for `percent`, rounded down.
    pub fn percent_to_register(&self, percent: f32) -> u8 {
        let span = f32::from(self.max.saturating_sub(self.min));
        let raw = (percent.clamp(0.0, 100.0) / 100.0 * span + f32::from(self.min)).floor();
        raw.clamp(f32::from(self.min), f32::from(self.max)) as u8
    }

    /// Percentage for a raw register value, rounded down and clamped to
    /// [0, 100]. Values outside the range read as 0 or 100.
    pub fn register_to_percent(&self, value: u8) -> f32 {
        let span = f32::from(self.max.saturating_sub(self.min));
        let percent = ((f32::from(value) - f32::from(self.min)) / span * 100.0).floor();
        percent.clamp(0.0, 100.0)
    }
}

/// Addresses and scales of the fan registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterMap {
    /// Speed-control register (write side).
    pub speed_control: u8,

    /// Manual-control enable register. Non-zero means the host owns the fan.
    pub manual_enable: u8,

    /// Current-speed register (read side).
    pub speed_read: u8,

    pub write_scale: ScaleRange,

    pub read_scale: ScaleRange,
}

impl Default for RegisterMap {
    fn default() -> Self {
        Self {
            speed_control: 25,
            manual_enable: 21,
            speed_read: 17,
            write_scale: ScaleRange::new(0, 59),
            read_scale: ScaleRange::new(4, 59),
        }
    }
}

impl RegisterMap {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.write_scale.validate("speed write")?;
        self.read_scale.validate("speed read")?;
        Ok(())
    }

    /// Writes that return the fan to the embedded controller: full speed
    /// first, then manual control off.
    pub fn handback_sequence(&self) -> [RegisterWrite; 2] {
        [
            RegisterWrite {
                address: self.speed_control,
                value: self.write_scale.max,
            },
            RegisterWrite {
                address: self.manual_enable,
                value: MANUAL_CONTROL_OFF,
            },
        ]
    }
}

/// Register file exposed as a seekable device node.
pub struct EcDevice {
    path: PathBuf,
    file: File,
}

impl EcDevice {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .await
            .map_err(|source| Error::DeviceOpen {
                path: path.clone(),
                source,
            })?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RegisterIo for EcDevice {
    async fn read_register(&mut self, address: u8) -> Result<u8> {
        let read = async {
            self.file.seek(SeekFrom::Start(u64::from(address))).await?;
            let mut byte = [0u8; 1];
            self.file.read_exact(&mut byte).await?;
            Ok::<_, std::io::Error>(byte[0])
        };
        read.await.map_err(|source| Error::RegisterRead { address, source })
    }

    async fn write_register(&mut self, address: u8, value: u8) -> Result<()> {
        let write = async {
            self.file.seek(SeekFrom::Start(u64::from(address))).await?;
            self.file.write_all(&[value]).await?;
            self.file.flush().await
        };
        write.await.map_err(|source| Error::RegisterWrite {
            address,
            value,
            source,
        })
    }
}
