use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};
use thiserror::Error;

#[cfg(test)]
use proptest_derive::Arbitrary;

pub mod board;
pub mod cal;
pub mod clock;
pub mod config;
pub mod device;
pub mod field;
pub mod fpga;
pub mod frequency;
pub mod hw;
pub mod lms;
pub mod registers;
pub mod stream;

#[cfg(test)]
mod mock;

pub use device::{discover, Evb7};

/// Key/value arguments passed through from a front-end, as in device discovery
/// and tuning requests.
pub type Kwargs = BTreeMap<String, String>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(test, derive(Arbitrary))]
pub enum Direction {
    Rx,
    Tx,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::Rx, Direction::Tx];

    fn index(self) -> usize {
        match self {
            Direction::Rx => 0,
            Direction::Tx => 1,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(test, derive(Arbitrary))]
pub enum Channel {
    A,
    B,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::A, Channel::B];

    fn index(self) -> usize {
        match self {
            Channel::A => 0,
            Channel::B => 1,
        }
    }
}

impl TryFrom<usize> for Channel {
    type Error = Error;
    fn try_from(index: usize) -> Result<Self> {
        match index {
            0 => Ok(Channel::A),
            1 => Ok(Channel::B),
            _ => Err(Error::InvalidChannel(index)),
        }
    }
}

/// Bring-up step that failed during construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    MapRegisters,
    Pins,
    OpenBus,
    CreateDriver,
    ChipSetup,
    DataClock,
    Interface,
    Dsp,
    Streams,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        #[rustfmt::skip]
        let name = match self {
            Stage::MapRegisters => "register mapping",
            Stage::Pins         => "pin control",
            Stage::OpenBus      => "SPI open",
            Stage::CreateDriver => "LMS7002M driver creation",
            Stage::ChipSetup    => "LMS7002M setup",
            Stage::DataClock    => "data clock",
            Stage::Interface    => "LML interface",
            Stage::Dsp          => "TSP setup",
            Stage::Streams      => "DMA bring-up",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O failed")]
    Io(#[from] std::io::Error),
    #[error("GPIO request failed")]
    Gpio(#[from] gpiocdev::Error),
    #[error("EVB7 hardware init failed during {stage}")]
    HardwareInit {
        stage: Stage,
        #[source]
        source: Box<Error>,
    },
    #[error("Sample rate {requested} Hz out of range for base rate {base} Hz (factor {ratio:.3})")]
    RateOutOfRange {
        requested: f64,
        base: f64,
        ratio: f64,
    },
    #[error("Unsupported property: {0}")]
    UnsupportedProperty(String),
    #[error("Bias calibration aborted")]
    CalibrationAborted(#[source] Box<Error>),
    #[error("DMA channel {0:?} unavailable")]
    ChannelUnavailable(stream::DmaRole),
    #[error("DMA channel {role:?} cannot {action} while {state:?}")]
    ChannelState {
        role: stream::DmaRole,
        action: &'static str,
        state: stream::ChannelState,
    },
    #[error("AFE disabled on every {0:?} channel")]
    AfeDisabled(Direction),
    #[error("Data clock {0} Hz unreachable from the CGEN VCO")]
    ClockUnreachable(f64),
    #[error("Device not ready")]
    NotReady,
    #[error("Invalid channel index {0}")]
    InvalidChannel(usize),
    #[error("Invalid config")]
    Config(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Single register transaction on the LMS7002M command bus.
pub trait RegisterBus {
    fn read(&mut self, addr: u16) -> Result<u16>;
    fn write(&mut self, addr: u16, value: u16) -> Result<()>;
}

impl<T: RegisterBus + ?Sized> RegisterBus for &mut T {
    fn read(&mut self, addr: u16) -> Result<u16> {
        (**self).read(addr)
    }
    fn write(&mut self, addr: u16, value: u16) -> Result<()> {
        (**self).write(addr, value)
    }
}
