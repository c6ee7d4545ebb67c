// Board wiring and bring-up settings, loaded from TOML.
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::stream::DmaIndices;
use crate::{Channel, Result};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Spi {
    pub path: String,
    pub speed_hz: u32,
}

impl Default for Spi {
    fn default() -> Self {
        Self {
            path: "/dev/spidev32766.0".into(),
            speed_hz: 10_000_000,
        }
    }
}

/// Line offsets on the GPIO chip, EMIO lines on the Zynq.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Gpio {
    pub chip: String,
    pub reset: u32,
    pub rx_enable: u32,
    pub tx_enable: u32,
}

impl Default for Gpio {
    #[rustfmt::skip]
    fn default() -> Self {
        Self {
            chip:      "/dev/gpiochip0".into(),
            reset:     54,
            rx_enable: 55,
            tx_enable: 56,
        }
    }
}

/// Physical window of the FPGA register file.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Fpga {
    pub base: u64,
    pub size: u64,
}

impl Default for Fpga {
    fn default() -> Self {
        Self {
            base: 0x43C0_0000,
            size: 0x1000,
        }
    }
}

/// AXI DMA controllers, `base + index * stride`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Dma {
    pub base: u64,
    pub stride: u64,
    pub rx_index: usize,
    pub tx_index: usize,
}

impl Default for Dma {
    fn default() -> Self {
        Self {
            base: 0x4040_0000,
            stride: 0x1_0000,
            rx_index: 0,
            tx_index: 1,
        }
    }
}

impl Dma {
    pub fn indices(&self) -> DmaIndices {
        DmaIndices {
            rx: self.rx_index,
            tx: self.tx_index,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Clock {
    /// CGEN reference input.
    pub reference_hz: f64,
    /// Requested CLKH, the TX TSP rate.
    pub master_hz: f64,
}

impl Default for Clock {
    fn default() -> Self {
        Self {
            reference_hz: 30.72e6,
            master_hz: 61e6,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Calibration {
    /// Channel whose monitor ADC drives the bias search.
    pub channel: Channel,
}

impl Default for Calibration {
    fn default() -> Self {
        Self { channel: Channel::A }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub spi: Spi,
    pub gpio: Gpio,
    pub fpga: Fpga,
    pub dma: Dma,
    pub clock: Clock,
    pub calibration: Calibration,
    /// Replace RX ADC samples with a DC constant on both channels.
    pub test_signal: bool,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }
}
