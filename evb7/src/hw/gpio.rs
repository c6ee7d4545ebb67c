// Transceiver control lines as gpiocdev output requests, one per pin.
use gpiocdev::{line::Value, Request};
use std::collections::HashMap;

use crate::board::{Pin, PinController};
use crate::config::Gpio;
use crate::Result;

pub struct GpioPins {
    config: Gpio,
    requests: HashMap<Pin, Request>,
}

impl GpioPins {
    pub fn new(config: &Gpio) -> Self {
        Self {
            config: config.clone(),
            requests: HashMap::new(),
        }
    }

    fn offset(&self, pin: Pin) -> u32 {
        match pin {
            Pin::Reset => self.config.reset,
            Pin::RxEnable => self.config.rx_enable,
            Pin::TxEnable => self.config.tx_enable,
        }
    }
}

fn level(high: bool) -> Value {
    if high {
        Value::Active
    } else {
        Value::Inactive
    }
}

impl PinController for GpioPins {
    fn set_level(&mut self, pin: Pin, high: bool) -> Result<()> {
        let offset = self.offset(pin);
        match self.requests.get(&pin) {
            Some(req) => {
                req.set_value(offset, level(high))?;
            }
            None => {
                let req = Request::builder()
                    .on_chip(&self.config.chip)
                    .with_consumer("evb7")
                    .with_line(offset)
                    .as_output(level(high))
                    .request()?;
                self.requests.insert(pin, req);
            }
        }
        log::trace!("{:?} ({}) {}", pin, offset, high);
        Ok(())
    }

    fn release_pin(&mut self, pin: Pin) -> Result<()> {
        if self.requests.remove(&pin).is_some() {
            log::trace!("{:?} released", pin);
        }
        Ok(())
    }
}
