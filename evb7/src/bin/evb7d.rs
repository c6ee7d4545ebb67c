// Brings up the EVB7 board, then reports the measured LML interface clock
// rates once a second until interrupted.
use anyhow::{Context, Result};
use clap::Parser;
use evb7::{config::Config, hw::LinuxBoard, Direction, Evb7};
use log::{Level, LevelFilter, Log, Metadata, Record};
use mio::{unix::SourceFd, Events, Interest, Poll, Token};
use mio_signals::{Signal, Signals};
use std::{
    os::fd::AsRawFd,
    time::{Duration, Instant},
};
use timerfd::{SetTimeFlags, TimerFd, TimerState};

const LOOPBACK_A: u32 = 0xAAAA_BBBB;
const LOOPBACK_B: u32 = 0xCCCC_DDDD;

struct StderrLogger {
    level: LevelFilter,
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{:<5} {}] {}", record.level(), record.target(), record.args());
        }
    }

    fn flush(&self) {}
}

#[derive(Parser, Debug)]
/// EVB7 bring-up and interface clock monitor
struct Args {
    /// Board config, defaults apply when absent
    #[arg(short, long)]
    config: Option<String>,
    /// Override the SPI device from the config
    #[arg(short, long)]
    spi: Option<String>,
    /// Drive the RX test signal generator instead of the ADCs
    #[arg(short, long)]
    test_signal: bool,
    /// Send a fixed TX pattern and log the RX sample words every second
    #[arg(short, long)]
    loopback: bool,
    /// More output per occurrence
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => Level::Info,
        1 => Level::Debug,
        _ => Level::Trace,
    };
    log::set_boxed_logger(Box::new(StderrLogger {
        level: level.to_level_filter(),
    }))?;
    log::set_max_level(level.to_level_filter());

    let mut config = match &args.config {
        Some(path) => Config::load(path).with_context(|| format!("loading {}", path))?,
        None => Config::default(),
    };
    if let Some(spi) = args.spi {
        config.spi.path = spi;
    }
    config.test_signal |= args.test_signal;

    let mut poll = Poll::new()?;
    let registry = poll.registry();
    let mut events = Events::with_capacity(16);

    let mut tfd = TimerFd::new()?;
    tfd.set_state(
        TimerState::Periodic {
            current: Duration::new(1, 0),
            interval: Duration::new(1, 0),
        },
        SetTimeFlags::Default,
    );
    const TIMER: Token = Token(0);
    registry.register(&mut SourceFd(&tfd.as_raw_fd()), TIMER, Interest::READABLE)?;

    const CTRLC: Token = Token(1);
    let mut signals = Signals::new(Signal::Interrupt.into())?;
    registry.register(&mut signals, CTRLC, Interest::READABLE)?;

    let mut dev = Evb7::new(LinuxBoard::new(config.clone()), &config).context("EVB7 bring-up")?;
    if let Some(cal) = dev.calibration() {
        log::info!("bias {} ratio {:.3}", cal.bias, cal.ratio);
    }
    for direction in Direction::ALL {
        let rates: Vec<String> = dev
            .list_sample_rates(direction, evb7::Channel::A)
            .map(|r| format!("{:.3}", r / 1e6))
            .collect();
        log::info!("{:?} sample rates [{}] MHz", direction, rates.join(", "));
    }

    if args.loopback {
        dev.tx_test_pattern(LOOPBACK_A, LOOPBACK_B)?;
        log::info!("TX test pattern {:#010x} {:#010x}", LOOPBACK_A, LOOPBACK_B);
    }

    let mut last = (dev.interface_clock_counters()?, Instant::now());
    'outer: loop {
        poll.poll(&mut events, None)?;
        for event in events.iter() {
            match event.token() {
                TIMER => {
                    tfd.read();
                    let now = (dev.interface_clock_counters()?, Instant::now());
                    let (rx, tx) = now.0.rates_since(&last.0, now.1 - last.1);
                    log::info!("RX rate {:.3} MHz, TX rate {:.3} MHz", rx / 1e6, tx / 1e6);
                    last = now;
                    if args.loopback {
                        let (a, b) = dev.rx_samples()?;
                        log::info!("RX samples {:#010x} {:#010x}", a, b);
                    }
                }
                CTRLC => break 'outer,
                _ => unreachable!(),
            }
        }
    }

    log::info!("shutting down");
    drop(dev);
    Ok(())
}
