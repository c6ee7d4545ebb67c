// Inclusive bit ranges within 16 bit LMS7002M registers.
use crate::{RegisterBus, Result};

#[cfg(test)]
use proptest::prelude::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegisterField {
    pub addr: u16,
    pub high: u8,
    pub low: u8,
}

impl RegisterField {
    pub const fn new(addr: u16, high: u8, low: u8) -> Self {
        assert!(high < 16 && low <= high);
        Self { addr, high, low }
    }

    pub const fn width(&self) -> u8 {
        self.high - self.low + 1
    }

    /// Mask of the field, right aligned.
    pub const fn mask(&self) -> u16 {
        (((1u32 << self.width()) - 1) & 0xFFFF) as u16
    }

    pub const fn extract(&self, word: u16) -> u16 {
        (word >> self.low) & self.mask()
    }

    /// Replace the field in `word`. Bits of `value` wider than the field are dropped.
    pub const fn insert(&self, word: u16, value: u16) -> u16 {
        let mask = self.mask();
        ((value & mask) << self.low) | (word & !(mask << self.low))
    }

    pub fn get<B: RegisterBus + ?Sized>(&self, bus: &mut B) -> Result<u16> {
        Ok(self.extract(bus.read(self.addr)?))
    }

    /// Read-modify-write of just this field.
    pub fn set<B: RegisterBus + ?Sized>(&self, bus: &mut B, value: u16) -> Result<()> {
        let old = bus.read(self.addr)?;
        let new = self.insert(old, value);
        log::trace!("{:04X}: {:04X} -> {:04X}", self.addr, old, new);
        bus.write(self.addr, new)
    }
}

#[test]
fn full_width_field() {
    let f = RegisterField::new(0x040B, 15, 0);
    assert_eq!(f.mask(), 0xFFFF);
    assert_eq!(f.extract(0xBEEF), 0xBEEF);
    assert_eq!(f.insert(0x1234, 0xBEEF), 0xBEEF);
}

#[test]
fn bias_field_layout() {
    let f = RegisterField::new(0x0084, 10, 6);
    assert_eq!(f.width(), 5);
    assert_eq!(f.mask(), 0x1F);
    assert_eq!(f.insert(0x0000, 0x1F), 0b0000_0111_1100_0000);
    assert_eq!(f.extract(0b0000_0011_0100_0000), 0b01101);
}

#[test]
fn set_reads_then_writes_once() {
    let mut bus = crate::mock::MockBus::default();
    bus.poke(0x0084, 0xF83F);
    RegisterField::new(0x0084, 10, 6).set(&mut bus, 7).unwrap();
    assert_eq!(bus.peek(0x0084), 0xF83F | (7 << 6));
    assert_eq!(bus.writes(), vec![(0x0084, 0xF83F | (7 << 6))]);
}

#[cfg(test)]
fn any_field() -> impl Strategy<Value = RegisterField> {
    (0u8..16)
        .prop_flat_map(|low| (Just(low), low..16))
        .prop_map(|(low, high)| RegisterField::new(0x0100, high, low))
}

#[cfg(test)]
proptest! {
    #[test]
    fn insert_preserves_other_bits(field in any_field(), word: u16, value: u16) {
        let out = field.insert(word, value);
        let outside = !(field.mask() << field.low);
        prop_assert_eq!(out & outside, word & outside);
        prop_assert_eq!(field.extract(out), value & field.mask());
    }

    #[test]
    fn insert_extract_is_identity(field in any_field(), word: u16) {
        prop_assert_eq!(field.insert(word, field.extract(word)), word);
    }
}
