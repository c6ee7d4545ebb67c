//! Master clock, TSP base rate and decimation/interpolation planning.
//!
//! The TX TSP runs at the CGEN output (CLKH) while the RX TSP runs at CLKL,
//! a quarter of it. The sample rate seen by the host is the TSP rate divided
//! by an integer factor, and the LimeLight interface clock has to follow at
//! half that factor because the port carries both channels interleaved on
//! both clock edges.
use crate::lms::Lms7002m;
use crate::registers::LmlPort;
use crate::{Direction, Error, RegisterBus, Result};

pub const MIN_FACTOR: u32 = 2;
pub const MAX_FACTOR: u32 = 32;

/// Number of entries in the advertised sample rate list.
pub const LISTED_RATES: u32 = 6;

// Relative slack on the factor bounds so that exact ratios survive rounding
const BOUND_TOLERANCE: f64 = 1e-9;
// Distance from an integer beyond which a ratio is reported as inexact
const INTEGER_TOLERANCE: f64 = 0.01;

/// Fixed CGEN to TSP clock divisor of a direction.
pub fn tsp_divisor(direction: Direction) -> f64 {
    match direction {
        Direction::Rx => 4.0,
        Direction::Tx => 1.0,
    }
}

/// LimeLight port that carries a direction's samples.
pub fn lml_port(direction: Direction) -> LmlPort {
    match direction {
        Direction::Tx => LmlPort::One,
        Direction::Rx => LmlPort::Two,
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RatePlan {
    pub direction: Direction,
    pub factor: u32,
    /// Sample rate the factor produces.
    pub rate: f64,
    /// Requested ratio was within 0.01 of the chosen factor.
    pub integer: bool,
    pub power_of_two: bool,
}

impl RatePlan {
    pub fn exact(&self) -> bool {
        self.integer && self.power_of_two
    }

    /// Interface clock divider matching the factor.
    pub fn interface_divider(&self) -> u32 {
        self.factor / 2
    }
}

#[derive(Clone, Debug)]
pub struct ClockPlan {
    master_clock_rate: f64,
    factors: [u32; 2],
}

impl ClockPlan {
    pub fn new(master_clock_rate: f64) -> Self {
        Self {
            master_clock_rate,
            factors: [MIN_FACTOR; 2],
        }
    }

    pub fn master_clock_rate(&self) -> f64 {
        self.master_clock_rate
    }

    pub fn set_master_clock_rate(&mut self, rate: f64) {
        self.master_clock_rate = rate;
    }

    pub fn base_rate(&self, direction: Direction) -> f64 {
        self.master_clock_rate / tsp_divisor(direction)
    }

    pub fn factor(&self, direction: Direction) -> u32 {
        self.factors[direction.index()]
    }

    pub fn sample_rate(&self, direction: Direction) -> f64 {
        self.base_rate(direction) / f64::from(self.factor(direction))
    }

    /// Validate a requested rate and pick the factor for it. Nothing is
    /// written.
    pub fn plan(&self, direction: Direction, requested: f64) -> Result<RatePlan> {
        let base = self.base_rate(direction);
        let ratio = base / requested;
        let out_of_range = Error::RateOutOfRange {
            requested,
            base,
            ratio,
        };

        if !(requested.is_finite() && requested > 0.0) {
            return Err(out_of_range);
        }
        if ratio < f64::from(MIN_FACTOR) * (1.0 - BOUND_TOLERANCE) {
            return Err(out_of_range); // rate too high
        }
        if ratio > f64::from(MAX_FACTOR) * (1.0 + BOUND_TOLERANCE) {
            return Err(out_of_range); // rate too low
        }

        let factor = (ratio.round() as u32).clamp(MIN_FACTOR, MAX_FACTOR);
        Ok(RatePlan {
            direction,
            factor,
            rate: base / f64::from(factor),
            integer: (ratio - f64::from(factor)).abs() <= INTEGER_TOLERANCE,
            power_of_two: factor.is_power_of_two(),
        })
    }

    /// Push a plan to the chip: the TSP factor, then the matching interface
    /// divider. The cached factor only moves once both writes went through.
    /// When the divider cannot be written the previous half band code goes
    /// back to the chip.
    pub fn apply<B: RegisterBus>(&mut self, lms: &mut Lms7002m<B>, plan: &RatePlan) -> Result<()> {
        let previous = lms.rate_code(plan.direction)?;
        lms.set_rate_factor(plan.direction, plan.factor)?;
        if let Err(e) = lms.configure_lml_port(
            lml_port(plan.direction),
            plan.direction,
            plan.interface_divider(),
        ) {
            if let Err(restore) = lms.set_rate_code(plan.direction, previous) {
                log::warn!("half band code restore failed: {}", restore);
            }
            return Err(e);
        }
        self.factors[plan.direction.index()] = plan.factor;
        Ok(())
    }

    pub fn set_sample_rate<B: RegisterBus>(
        &mut self,
        lms: &mut Lms7002m<B>,
        direction: Direction,
        requested: f64,
    ) -> Result<f64> {
        let plan = self.plan(direction, requested)?;
        log::trace!(
            "setSampleRate {} MHz, baseRate {} MHz, factor {}",
            requested / 1e6,
            self.base_rate(direction) / 1e6,
            plan.factor
        );
        if !plan.exact() {
            log::warn!(
                "{:?} factor {} is not an exact power of two: TSP rate = {} MHz, requested rate = {} MHz",
                direction,
                plan.factor,
                self.base_rate(direction) / 1e6,
                requested / 1e6
            );
        }
        self.apply(lms, &plan)?;
        Ok(plan.rate)
    }

    pub fn sample_rates(&self, direction: Direction) -> SampleRates {
        SampleRates {
            base: self.base_rate(direction),
            shifts: 0..LISTED_RATES,
        }
    }
}

/// Advertised sample rates, `base / 2^k` for k = 0..=5, fastest first.
#[derive(Clone, Debug)]
pub struct SampleRates {
    base: f64,
    shifts: std::ops::Range<u32>,
}

impl Iterator for SampleRates {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        self.shifts.next().map(|k| self.base / f64::from(1u32 << k))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.shifts.size_hint()
    }
}

impl ExactSizeIterator for SampleRates {}
