// LMS7002M command bus over spidev.
//
// Every transaction is one 32 bit frame: a write flag and 15 bit address,
// then 16 bits of data, both MSB first. Reads clock the data out in the
// second half of the frame.
use spidev::{SpiModeFlags, Spidev, SpidevOptions, SpidevTransfer};
use std::path::Path;

use crate::{RegisterBus, Result};

const WRITE: u8 = 0x80;

pub fn open<P: AsRef<Path>>(path: P, speed_hz: u32) -> std::io::Result<Spidev> {
    let mut spi = Spidev::open(path)?;
    let options = SpidevOptions::new()
        .bits_per_word(8)
        .max_speed_hz(speed_hz)
        .mode(SpiModeFlags::SPI_MODE_0)
        .build();
    spi.configure(&options)?;
    Ok(spi)
}

fn read_frame(addr: u16) -> [u8; 4] {
    let [hi, lo] = addr.to_be_bytes();
    [hi & !WRITE, lo, 0, 0]
}

fn write_frame(addr: u16, value: u16) -> [u8; 4] {
    let [hi, lo] = addr.to_be_bytes();
    let [d_hi, d_lo] = value.to_be_bytes();
    [hi | WRITE, lo, d_hi, d_lo]
}

pub struct SpiBus {
    spi: Spidev,
}

impl SpiBus {
    pub fn open<P: AsRef<Path>>(path: P, speed_hz: u32) -> Result<Self> {
        Ok(Self {
            spi: open(path, speed_hz)?,
        })
    }
}

impl RegisterBus for SpiBus {
    fn read(&mut self, addr: u16) -> Result<u16> {
        let tx = read_frame(addr);
        let mut rx = [0; 4];
        self.spi
            .transfer(&mut SpidevTransfer::read_write(&tx, &mut rx))?;
        Ok(u16::from_be_bytes([rx[2], rx[3]]))
    }

    fn write(&mut self, addr: u16, value: u16) -> Result<()> {
        let tx = write_frame(addr, value);
        self.spi.transfer(&mut SpidevTransfer::write(&tx))?;
        Ok(())
    }
}

#[test]
fn frames() {
    assert_eq!(read_frame(0x002F), [0x00, 0x2F, 0, 0]);
    assert_eq!(read_frame(0x8443), [0x04, 0x43, 0, 0]);
    assert_eq!(write_frame(0x0084, 0x1234), [0x80, 0x84, 0x12, 0x34]);
    assert_eq!(write_frame(0x0442, 0xFFFF), [0x84, 0x42, 0xFF, 0xFF]);
}
