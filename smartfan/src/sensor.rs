//! Temperature input.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Readings outside this range are treated as a broken sensor.
const PLAUSIBLE_RANGE_C: std::ops::RangeInclusive<f32> = -50.0..=150.0;

/// Source of the controlled temperature, in °C.
#[async_trait]
pub trait TemperatureSource: Send {
    async fn read_temperature(&mut self) -> Result<f32>;
}

/// hwmon/thermal-zone style file holding millidegrees Celsius as text,
/// e.g. `/sys/class/hwmon/hwmon4/temp1_input`.
pub struct SysfsTemperature {
    path: PathBuf,
}

impl SysfsTemperature {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn fault(&self, source: io::Error) -> Error {
        Error::SensorRead {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl TemperatureSource for SysfsTemperature {
    async fn read_temperature(&mut self) -> Result<f32> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| self.fault(e))?;
        parse_millidegrees(&text).map_err(|e| self.fault(e))
    }
}

fn parse_millidegrees(text: &str) -> io::Result<f32> {
    let trimmed = text.trim();
    let millidegrees: i64 = trimmed.parse().map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("not a millidegree value: {trimmed:?}"),
        )
    })?;

    let celsius = millidegrees as f32 / 1000.0;
    if !PLAUSIBLE_RANGE_C.contains(&celsius) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("implausible temperature {celsius}°C"),
        ));
    }
    Ok(celsius)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("45000\n", 45.0 ; "trailing newline")]
    #[test_case("76500", 76.5 ; "fractional degrees")]
    #[test_case("  -5000 ", -5.0 ; "negative with whitespace")]
    fn should_parse_millidegrees(text: &str, expected: f32) {
        assert_eq!(parse_millidegrees(text).unwrap(), expected);
    }

    #[test_case("" ; "empty")]
    #[test_case("hot" ; "not a number")]
    #[test_case("45.5" ; "decimal point")]
    #[test_case("200000" ; "implausibly hot")]
    #[test_case("-60000" ; "implausibly cold")]
    fn should_reject_malformed_readings(text: &str) {
        let err = parse_millidegrees(text).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn should_read_temperature_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "62125\n").unwrap();

        let mut sensor = SysfsTemperature::new(file.path());
        assert_eq!(sensor.read_temperature().await.unwrap(), 62.125);
    }

    #[tokio::test]
    async fn should_report_sensor_path_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("temp1_input");

        let mut sensor = SysfsTemperature::new(&path);
        match sensor.read_temperature().await {
            Err(Error::SensorRead { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("expected sensor read failure, got {other:?}"),
        }
    }
}
