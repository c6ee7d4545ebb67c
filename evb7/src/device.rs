//! The EVB7 session.
//!
//! [`Evb7`] owns every hardware handle of the board together with the rate
//! and frequency plans. Construction brings the board up step by step; any
//! failure drops the half built device, which releases whatever was acquired
//! in the same order a normal teardown uses.
use crate::board::{Board, Pin, PinController};
use crate::cal::{self, Calibration};
use crate::clock::{ClockPlan, SampleRates, MIN_FACTOR};
use crate::config::Config;
use crate::fpga::{ClockCounters, Fpga};
use crate::frequency::{FrequencyPlan, Range};
use crate::lms::{Lms7002m, Revision};
use crate::registers::MacSelect;
use crate::stream::StreamResources;
use crate::{Channel, Direction, Error, Kwargs, Result, Stage};

/// DC level fed to the RX TSP when the test signal is enabled.
const TEST_SIGNAL_LEVEL: i16 = 1 << 14;

fn at(stage: Stage) -> impl FnOnce(Error) -> Error {
    move |source| Error::HardwareInit {
        stage,
        source: Box::new(source),
    }
}

/// Device discovery. The board is the whole addressable system, so the
/// caller's arguments describe the one device there is.
pub fn discover(args: &Kwargs) -> Vec<Kwargs> {
    vec![args.clone()]
}

pub struct Evb7<Bd: Board> {
    board: Bd,
    fpga: Option<Fpga<Bd::Map>>,
    pins: Option<Bd::Pins>,
    lms: Option<Lms7002m<Bd::Bus>>,
    streams: Option<StreamResources<Bd::Dma>>,
    clock: ClockPlan,
    frequency: FrequencyPlan,
    calibration: Option<Calibration>,
}

impl<Bd: Board> Evb7<Bd> {
    pub fn new(board: Bd, config: &Config) -> Result<Self> {
        log::info!("EVB7()");
        let mut dev = Self {
            board,
            fpga: None,
            pins: None,
            lms: None,
            streams: None,
            clock: ClockPlan::new(config.clock.master_hz),
            frequency: FrequencyPlan::default(),
            calibration: None,
        };
        dev.bring_up(config)?;
        log::info!("EVB7() setup OK");
        Ok(dev)
    }

    fn bring_up(&mut self, config: &Config) -> Result<()> {
        let map = self.board.map_registers().map_err(at(Stage::MapRegisters))?;
        let fpga = self.fpga.insert(Fpga::new(map));
        let sentinel = fpga.sentinel().map_err(at(Stage::MapRegisters))?;
        log::info!("Read sentinel {:#x}", sentinel);
        fpga.set_tx_test(false).map_err(at(Stage::MapRegisters))?;

        let pins = self.pins.insert(self.board.pins().map_err(at(Stage::Pins))?);
        pins.set_level(Pin::Reset, false).map_err(at(Stage::Pins))?;
        pins.set_level(Pin::Reset, true).map_err(at(Stage::Pins))?;

        let bus = self.board.open_bus().map_err(at(Stage::OpenBus))?;
        let lms = match Lms7002m::create(bus) {
            Ok(lms) => self.lms.insert(lms),
            Err((e, bus)) => {
                self.board.close_bus(bus);
                return Err(at(Stage::CreateDriver)(e));
            }
        };
        setup_chip(lms).map_err(at(Stage::ChipSetup))?;

        let rate = lms
            .set_data_clock(config.clock.reference_hz, config.clock.master_hz)
            .map_err(at(Stage::DataClock))?;
        self.clock.set_master_clock_rate(rate);
        log::info!("Master clock {} MHz", rate / 1e6);

        for direction in Direction::ALL {
            lms.configure_lml_port(crate::clock::lml_port(direction), direction, 1)
                .map_err(at(Stage::Interface))?;
        }
        fpga.pulse_ext_reset().map_err(at(Stage::Interface))?;

        pins.set_level(Pin::RxEnable, true).map_err(at(Stage::Pins))?;
        pins.set_level(Pin::TxEnable, true).map_err(at(Stage::Pins))?;

        for direction in Direction::ALL {
            lms.tsp_init(direction, MacSelect::AB).map_err(at(Stage::Dsp))?;
            let plan = self
                .clock
                .plan(direction, self.clock.base_rate(direction) / f64::from(MIN_FACTOR))
                .map_err(at(Stage::Dsp))?;
            self.clock.apply(lms, &plan).map_err(at(Stage::Dsp))?;
        }
        if config.test_signal {
            for channel in Channel::ALL {
                lms.tsg_const(channel, TEST_SIGNAL_LEVEL, TEST_SIGNAL_LEVEL)
                    .map_err(at(Stage::Dsp))?;
            }
        }

        match cal::calibrate_bias(lms, config.calibration.channel) {
            Ok(calibration) => self.calibration = Some(calibration),
            Err(e) => log::warn!("{}, continuing uncalibrated", e),
        }

        let engine = self.board.dma_engine().map_err(at(Stage::Streams))?;
        let streams = StreamResources::acquire(engine, config.dma.indices()).map_err(at(Stage::Streams))?;
        self.streams = Some(streams);
        Ok(())
    }

    pub fn revision(&mut self) -> Result<Revision> {
        self.lms.as_mut().ok_or(Error::NotReady)?.revision()
    }

    pub fn set_frequency(
        &mut self,
        direction: Direction,
        channel: Channel,
        frequency: f64,
        args: &Kwargs,
    ) -> Result<()> {
        let lms = self.lms.as_mut().ok_or(Error::NotReady)?;
        self.frequency
            .set_frequency(lms, &self.clock, direction, channel, frequency, args)
    }

    pub fn frequency(&self, direction: Direction, channel: Channel) -> f64 {
        self.frequency.frequency(direction, channel)
    }

    pub fn frequency_component(&self, direction: Direction, channel: Channel, name: &str) -> Result<f64> {
        self.frequency.frequency_component(direction, channel, name)
    }

    pub fn list_frequencies(&self, _direction: Direction, _channel: Channel) -> Vec<&'static str> {
        FrequencyPlan::components()
    }

    pub fn frequency_range(&self, _direction: Direction, _channel: Channel) -> Vec<Range> {
        FrequencyPlan::range()
    }

    /// Both channels of a direction share the rate.
    pub fn set_sample_rate(&mut self, direction: Direction, _channel: Channel, rate: f64) -> Result<f64> {
        let lms = self.lms.as_mut().ok_or(Error::NotReady)?;
        self.clock.set_sample_rate(lms, direction, rate)
    }

    pub fn sample_rate(&self, direction: Direction, _channel: Channel) -> f64 {
        self.clock.sample_rate(direction)
    }

    pub fn list_sample_rates(&self, direction: Direction, _channel: Channel) -> SampleRates {
        self.clock.sample_rates(direction)
    }

    pub fn master_clock_rate(&self) -> f64 {
        self.clock.master_clock_rate()
    }

    /// Result of the last successful bias calibration.
    pub fn calibration(&self) -> Option<Calibration> {
        self.calibration
    }

    /// Run the bias calibration again. A failed run keeps the previous result.
    pub fn calibrate(&mut self, channel: Channel) -> Result<Calibration> {
        let lms = self.lms.as_mut().ok_or(Error::NotReady)?;
        let calibration = cal::calibrate_bias(lms, channel)?;
        self.calibration = Some(calibration);
        Ok(calibration)
    }

    pub fn read_register(&mut self, offset: u32) -> Result<u32> {
        self.fpga.as_mut().ok_or(Error::NotReady)?.read_raw(offset)
    }

    pub fn write_register(&mut self, offset: u32, value: u32) -> Result<()> {
        self.fpga.as_mut().ok_or(Error::NotReady)?.write_raw(offset, value)
    }

    pub fn interface_clock_counters(&mut self) -> Result<ClockCounters> {
        self.fpga.as_mut().ok_or(Error::NotReady)?.clock_counters()
    }

    /// Drive the TX deframer outputs with fixed words instead of the TX
    /// stream. Pair with [`Self::rx_samples`] to check an RF loopback.
    pub fn tx_test_pattern(&mut self, a: u32, b: u32) -> Result<()> {
        self.fpga.as_mut().ok_or(Error::NotReady)?.tx_test_pattern(a, b)
    }

    /// Last RX sample word of channel A and B as latched by the FPGA.
    pub fn rx_samples(&mut self) -> Result<(u32, u32)> {
        self.fpga.as_mut().ok_or(Error::NotReady)?.rx_samples()
    }

    pub fn afe_enabled(&mut self, direction: Direction, channel: Channel) -> Result<bool> {
        self.lms.as_mut().ok_or(Error::NotReady)?.afe_enabled(direction, channel)
    }

    /// Switching off the last enabled AFE of a direction stops its streams
    /// first.
    pub fn set_afe_enabled(&mut self, direction: Direction, channel: Channel, enable: bool) -> Result<()> {
        let lms = self.lms.as_mut().ok_or(Error::NotReady)?;
        if !enable {
            let mut others = false;
            for other in Channel::ALL.into_iter().filter(|c| *c != channel) {
                others |= lms.afe_enabled(direction, other)?;
            }
            if !others {
                if let Some(streams) = self.streams.as_mut() {
                    streams.deactivate(direction)?;
                }
            }
        }
        lms.afe_enable(direction, channel, enable)
    }

    pub fn activate_stream(&mut self, direction: Direction) -> Result<()> {
        let lms = self.lms.as_mut().ok_or(Error::NotReady)?;
        let mut enabled = false;
        for channel in Channel::ALL {
            enabled |= lms.afe_enabled(direction, channel)?;
        }
        if !enabled {
            return Err(Error::AfeDisabled(direction));
        }
        self.streams.as_mut().ok_or(Error::NotReady)?.activate(direction)
    }

    pub fn deactivate_stream(&mut self, direction: Direction) -> Result<()> {
        self.streams.as_mut().ok_or(Error::NotReady)?.deactivate(direction)
    }

    pub fn stream_active(&self, direction: Direction) -> bool {
        self.streams.as_ref().is_some_and(|s| s.is_active(direction))
    }
}

fn setup_chip<B: crate::RegisterBus>(lms: &mut Lms7002m<B>) -> Result<()> {
    lms.set_spi_mode(true)?;
    lms.reset()?;
    for direction in [Direction::Tx, Direction::Rx] {
        for channel in Channel::ALL {
            lms.afe_enable(direction, channel, true)?;
        }
    }
    let revision = lms.revision()?;
    log::info!("rev {:#x}", revision.rev);
    log::info!("ver {:#x}", revision.ver);
    Ok(())
}

impl<Bd: Board> Drop for Evb7<Bd> {
    fn drop(&mut self) {
        let bus = self.lms.take().map(|mut lms| {
            if let Err(e) = lms.power_down() {
                log::warn!("LMS7002M power down failed: {}", e);
            }
            lms.into_bus()
        });

        if let Some(mut pins) = self.pins.take() {
            for pin in Pin::ALL {
                if let Err(e) = pins.release_pin(pin) {
                    log::warn!("{:?} release failed: {}", pin, e);
                }
            }
        }

        drop(self.streams.take());

        if let Some(bus) = bus {
            self.board.close_bus(bus);
        }
        if let Some(fpga) = self.fpga.take() {
            self.board.unmap_registers(fpga.into_map());
        }
        log::debug!("EVB7 released");
    }
}
