use serde::Serialize;
use std::str::FromStr;

use crate::clock::ClockPlan;
use crate::lms::Lms7002m;
use crate::{Channel, Direction, Error, Kwargs, RegisterBus, Result};

/// Tuning range of the RF front end.
pub const FREQUENCY_MIN: f64 = 100e3;
pub const FREQUENCY_MAX: f64 = 3.8e9;

/// LO value reported until LO tuning exists.
pub const DEFAULT_LO: f64 = 1e9;

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

/// Named part of a tuned frequency.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Component {
    /// Analog local oscillator
    Rf,
    /// Digital CMIX/NCO offset
    Bb,
}

impl Component {
    pub const ALL: [Component; 2] = [Component::Rf, Component::Bb];

    pub fn name(self) -> &'static str {
        match self {
            Component::Rf => "RF",
            Component::Bb => "BB",
        }
    }
}

impl FromStr for Component {
    type Err = Error;
    fn from_str(name: &str) -> Result<Self> {
        match name {
            "RF" => Ok(Component::Rf),
            "BB" => Ok(Component::Bb),
            _ => Err(Error::UnsupportedProperty(name.to_string())),
        }
    }
}

/// Cached baseband and LO frequencies per direction and channel.
#[derive(Clone, Debug)]
pub struct FrequencyPlan {
    baseband: [[f64; 2]; 2],
    local_oscillator: [f64; 2],
}

impl Default for FrequencyPlan {
    fn default() -> Self {
        Self {
            baseband: [[0.0; 2]; 2],
            local_oscillator: [DEFAULT_LO; 2],
        }
    }
}

impl FrequencyPlan {
    /// Tune the digital mixer. The LO is not tuned, so `args` (RF, OFFSET)
    /// have nothing to act on yet.
    pub fn set_frequency<B: RegisterBus>(
        &mut self,
        lms: &mut Lms7002m<B>,
        clock: &ClockPlan,
        direction: Direction,
        channel: Channel,
        frequency: f64,
        args: &Kwargs,
    ) -> Result<()> {
        if !args.is_empty() {
            log::debug!("ignoring tune args {:?}", args);
        }
        let freq_rel = frequency / clock.base_rate(direction);
        lms.set_nco_freq(direction, channel, freq_rel)?;
        self.baseband[direction.index()][channel.index()] = frequency;
        Ok(())
    }

    pub fn component(&self, direction: Direction, channel: Channel, component: Component) -> f64 {
        match component {
            Component::Bb => self.baseband[direction.index()][channel.index()],
            Component::Rf => self.local_oscillator[direction.index()],
        }
    }

    pub fn frequency(&self, direction: Direction, channel: Channel) -> f64 {
        self.component(direction, channel, Component::Bb)
            + self.component(direction, channel, Component::Rf)
    }

    pub fn frequency_component(&self, direction: Direction, channel: Channel, name: &str) -> Result<f64> {
        Ok(self.component(direction, channel, name.parse()?))
    }

    pub fn components() -> Vec<&'static str> {
        Component::ALL.iter().map(|c| c.name()).collect()
    }

    pub fn range() -> Vec<Range> {
        vec![Range {
            min: FREQUENCY_MIN,
            max: FREQUENCY_MAX,
        }]
    }
}
