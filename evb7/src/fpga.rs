// Programmable logic register file, 32 bit words at byte offsets.
use num_enum::IntoPrimitive;
use std::time::Duration;

use crate::Result;

pub trait RegisterMap {
    fn read32(&mut self, offset: u32) -> Result<u32>;
    fn write32(&mut self, offset: u32, value: u32) -> Result<()>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, IntoPrimitive)]
#[repr(u32)]
#[rustfmt::skip]
pub enum FpgaRegister {
    Sentinel = 0x00, // RO, fixed pattern
    RxClocks = 0x04, // RO, free running RX interface clock count
    TxClocks = 0x08, // RO, free running TX interface clock count
    RxChA    = 0x0C, // RO, last RX sample, channel A
    RxChB    = 0x10, // RO, last RX sample, channel B
    TxTest   = 0x20, // 1: TxChA/TxChB drive TX, 0: deframer drives TX
    TxChA    = 0x24,
    TxChB    = 0x28,
    ExtReset = 0x2C, // Resets the LML framers, high active
}

/// Interface clock counter snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClockCounters {
    pub rx: u32,
    pub tx: u32,
}

impl ClockCounters {
    /// RX and TX interface clock rates in Hz between two snapshots.
    pub fn rates_since(&self, earlier: &ClockCounters, elapsed: Duration) -> (f64, f64) {
        let secs = elapsed.as_secs_f64();
        (
            f64::from(self.rx.wrapping_sub(earlier.rx)) / secs,
            f64::from(self.tx.wrapping_sub(earlier.tx)) / secs,
        )
    }
}

pub struct Fpga<M: RegisterMap> {
    map: M,
}

impl<M: RegisterMap> Fpga<M> {
    pub fn new(map: M) -> Self {
        Self { map }
    }

    pub fn into_map(self) -> M {
        self.map
    }

    pub fn read(&mut self, reg: FpgaRegister) -> Result<u32> {
        self.map.read32(reg.into())
    }

    pub fn write(&mut self, reg: FpgaRegister, value: u32) -> Result<()> {
        self.map.write32(reg.into(), value)
    }

    pub fn read_raw(&mut self, offset: u32) -> Result<u32> {
        self.map.read32(offset)
    }

    pub fn write_raw(&mut self, offset: u32, value: u32) -> Result<()> {
        self.map.write32(offset, value)
    }

    pub fn sentinel(&mut self) -> Result<u32> {
        self.read(FpgaRegister::Sentinel)
    }

    /// Drive TX from the deframer, or from the constant test words when enabled.
    pub fn set_tx_test(&mut self, enable: bool) -> Result<()> {
        self.write(FpgaRegister::TxTest, enable.into())
    }

    pub fn tx_test_pattern(&mut self, a: u32, b: u32) -> Result<()> {
        self.write(FpgaRegister::TxChA, a)?;
        self.write(FpgaRegister::TxChB, b)?;
        self.set_tx_test(true)
    }

    pub fn rx_samples(&mut self) -> Result<(u32, u32)> {
        Ok((self.read(FpgaRegister::RxChA)?, self.read(FpgaRegister::RxChB)?))
    }

    pub fn pulse_ext_reset(&mut self) -> Result<()> {
        self.write(FpgaRegister::ExtReset, 1)?;
        self.write(FpgaRegister::ExtReset, 0)
    }

    pub fn clock_counters(&mut self) -> Result<ClockCounters> {
        Ok(ClockCounters {
            rx: self.read(FpgaRegister::RxClocks)?,
            tx: self.read(FpgaRegister::TxClocks)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockMap, Rig};

    #[test]
    fn ext_reset_pulses() {
        let rig = Rig::default();
        let mut fpga = Fpga::new(MockMap::new(&rig));
        fpga.pulse_ext_reset().unwrap();
        assert_eq!(rig.fpga_writes(), vec![(0x2C, 1), (0x2C, 0)]);
    }

    #[test]
    fn test_pattern_enables_last() {
        let rig = Rig::default();
        let mut fpga = Fpga::new(MockMap::new(&rig));
        fpga.tx_test_pattern(0xAAAA_BBBB, 0xCCCC_DDDD).unwrap();
        assert_eq!(
            rig.fpga_writes(),
            vec![(0x24, 0xAAAA_BBBB), (0x28, 0xCCCC_DDDD), (0x20, 1)]
        );
    }

    #[test]
    fn counter_rates_wrap() {
        let before = ClockCounters {
            rx: u32::MAX - 999,
            tx: 0,
        };
        let after = ClockCounters {
            rx: 15_250_000 - 1000,
            tx: 61_000_000,
        };
        let (rx, tx) = after.rates_since(&before, Duration::from_secs(1));
        assert_eq!(rx, 15_250_000.0);
        assert_eq!(tx, 61e6);
    }

    #[test]
    fn counters_read_both() {
        let rig = Rig::default();
        rig.fpga_poke(0x04, 10);
        rig.fpga_poke(0x08, 20);
        let mut fpga = Fpga::new(MockMap::new(&rig));
        assert_eq!(fpga.clock_counters().unwrap(), ClockCounters { rx: 10, tx: 20 });
    }
}
