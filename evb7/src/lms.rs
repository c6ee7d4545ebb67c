// LMS7002M register level driver over a 16-bit SPI register bus.
use crate::field::RegisterField;
use crate::registers::*;
use crate::{Channel, Direction, Error, RegisterBus, Result};

/// CGEN VCO tuning range in Hz.
const CGEN_VCO_MIN: f64 = 1_930e6;
const CGEN_VCO_MAX: f64 = 2_940e6;
const CGEN_FRAC_BITS: u32 = 20;

/// CLKL runs at CLKH / 2^CLKH_OV_CLKL. The RX TSP is clocked from CLKL.
const CLKH_OV_CLKL: u16 = 2;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Revision {
    pub ver: u16,
    pub rev: u16,
    pub mask: u16,
}

/// Register level LMS7002M operations. Owns the command bus for the lifetime
/// of the driver handle.
pub struct Lms7002m<B: RegisterBus> {
    bus: B,
}

fn afe_flag(direction: Direction, channel: Channel) -> AfeFlags {
    match (direction, channel) {
        (Direction::Rx, Channel::A) => AfeFlags::PD_RX_AFE1,
        (Direction::Rx, Channel::B) => AfeFlags::PD_RX_AFE2,
        (Direction::Tx, Channel::A) => AfeFlags::PD_TX_AFE1,
        (Direction::Tx, Channel::B) => AfeFlags::PD_TX_AFE2,
    }
}

fn half_band_field(direction: Direction) -> RegisterField {
    match direction {
        Direction::Rx => HBD_OVR_RXTSP,
        Direction::Tx => HBI_OVR_TXTSP,
    }
}

/// Half band override code for a decimation/interpolation factor. Factors
/// that are not powers of two round down to the next power of two.
pub fn half_band_code(factor: u32) -> u16 {
    if factor < 2 {
        HB_BYPASS
    } else {
        (factor.ilog2() - 1).min(u32::from(HB_BYPASS) - 1) as u16
    }
}

/// Normalised frequency to NCO frequency control word, aliased into [0, 1).
pub fn nco_fcw(freq_rel: f64) -> u32 {
    let wrapped = freq_rel.rem_euclid(1.0);
    // as saturates, NaN lands on 0
    (wrapped * 4_294_967_296.0) as u32
}

impl<B: RegisterBus> Lms7002m<B> {
    /// Create the driver on an open bus. A failed probe hands the bus back so
    /// the caller can close it.
    pub fn create(mut bus: B) -> std::result::Result<Self, (Error, B)> {
        match bus.read(VER.addr) {
            Ok(_) => Ok(Self { bus }),
            Err(e) => Err((e, bus)),
        }
    }

    /// Destroy the driver handle, returning the bus.
    pub fn into_bus(self) -> B {
        self.bus
    }

    pub fn bus(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn set_spi_mode(&mut self, four_wire: bool) -> Result<()> {
        SPIMODE.set(&mut self.bus, four_wire.into())
    }

    pub fn reset(&mut self) -> Result<()> {
        // Pulse every active low reset, then leave both channels selected
        self.bus.write(RESETS.addr, 0x0000)?;
        self.bus.write(RESETS.addr, 0xFFFF)?;
        Ok(())
    }

    pub fn revision(&mut self) -> Result<Revision> {
        let word = self.bus.read(VER.addr)?;
        Ok(Revision {
            ver: VER.extract(word),
            rev: REV.extract(word),
            mask: MASK.extract(word),
        })
    }

    pub fn set_mac(&mut self, mac: MacSelect) -> Result<()> {
        MAC.set(&mut self.bus, mac.into())
    }

    pub fn afe_enable(&mut self, direction: Direction, channel: Channel, enable: bool) -> Result<()> {
        let mut flags = AfeFlags::from_bits_truncate(AFE.get(&mut self.bus)?);
        flags.set(afe_flag(direction, channel), !enable);

        let paths = AfeFlags::PD_RX_AFE1
            | AfeFlags::PD_RX_AFE2
            | AfeFlags::PD_TX_AFE1
            | AfeFlags::PD_TX_AFE2;
        let any = !flags.contains(paths);
        flags.set(AfeFlags::PD_AFE, !any);
        flags.set(AfeFlags::EN_G_AFE, any);

        AFE.set(&mut self.bus, flags.bits())
    }

    pub fn afe_enabled(&mut self, direction: Direction, channel: Channel) -> Result<bool> {
        let flags = AfeFlags::from_bits_truncate(AFE.get(&mut self.bus)?);
        Ok(flags.contains(AfeFlags::EN_G_AFE) && !flags.contains(afe_flag(direction, channel)))
    }

    /// Program CGEN so CLKH runs at `rate`. Returns the realised rate.
    pub fn set_data_clock(&mut self, reference: f64, rate: f64) -> Result<f64> {
        // fvco = fref * N, fout = fvco / (2 * (DIV_OUTCH + 1))
        let div = (0..=255u16)
            .find(|d| {
                let fvco = rate * 2.0 * f64::from(d + 1);
                (CGEN_VCO_MIN..=CGEN_VCO_MAX).contains(&fvco)
            })
            .ok_or(Error::ClockUnreachable(rate))?;
        let fdiv = 2.0 * f64::from(div + 1);

        let n = rate * fdiv / reference;
        let nint = n.trunc() as u16;
        if nint < 1 || nint > 1024 {
            return Err(Error::ClockUnreachable(rate));
        }
        let nfrac = ((n - n.trunc()) * f64::from(1u32 << CGEN_FRAC_BITS)) as u32;

        CGEN_CTRL.set(&mut self.bus, CgenFlags::PD_VCO_COMP.bits())?;
        FRAC_SDM_CGEN_LSB.set(&mut self.bus, (nfrac & 0xFFFF) as u16)?;
        FRAC_SDM_CGEN_MSB.set(&mut self.bus, (nfrac >> 16) as u16)?;
        INT_SDM_CGEN.set(&mut self.bus, nint - 1)?;
        DIV_OUTCH_CGEN.set(&mut self.bus, div)?;
        CLKH_OV_CLKL_CGEN.set(&mut self.bus, CLKH_OV_CLKL)?;
        CGEN_CTRL.set(&mut self.bus, CgenFlags::EN_G.bits())?;

        let cmp = VCO_CMP_CGEN.get(&mut self.bus)?;
        log::debug!("CGEN div {} N {}+{}/2^20 comparators {:02b}", div, nint, nfrac, cmp);

        let actual = reference * (f64::from(nint) + f64::from(nfrac) / f64::from(1u32 << CGEN_FRAC_BITS)) / fdiv;
        Ok(actual)
    }

    /// Configure a LimeLight port in TRXIQ mode for one direction, with the
    /// port clock derived from that direction's TSP clock divided by `mclk_div`.
    pub fn configure_lml_port(&mut self, port: LmlPort, direction: Direction, mclk_div: u32) -> Result<()> {
        let (mode, iq, src) = match port {
            LmlPort::One => (LML1_MODE, LML1_TXNRXIQ, MCLK1SRC),
            LmlPort::Two => (LML2_MODE, LML2_TXNRXIQ, MCLK2SRC),
        };
        mode.set(&mut self.bus, 0)?;

        let (iq_mode, undivided, divided, div_field, div_en) = match direction {
            Direction::Tx => (LmlIqMode::RxIq, MclkSource::TxTsp, MclkSource::TxTspDiv, TXTSPCLKA_DIV, TXDIVEN),
            Direction::Rx => (LmlIqMode::TxIq, MclkSource::RxTsp, MclkSource::RxTspDiv, RXTSPCLKA_DIV, RXDIVEN),
        };
        iq.set(&mut self.bus, iq_mode.into())?;

        if mclk_div <= 1 {
            src.set(&mut self.bus, undivided.into())?;
            div_en.set(&mut self.bus, 0)?;
        } else {
            // Divider is 2 * (n + 1), odd dividers round down
            let n = (mclk_div / 2).saturating_sub(1).min(u32::from(div_field.mask()));
            div_field.set(&mut self.bus, n as u16)?;
            div_en.set(&mut self.bus, 1)?;
            src.set(&mut self.bus, divided.into())?;
        }
        Ok(())
    }

    /// Enable the TSP of `direction` on the selected channels with every
    /// optional stage bypassed.
    pub fn tsp_init(&mut self, direction: Direction, mac: MacSelect) -> Result<()> {
        self.set_mac(mac)?;
        match direction {
            Direction::Rx => {
                EN_RXTSP.set(&mut self.bus, 1)?;
                RXTSP_BYP.set(&mut self.bus, RxTspBypass::all().bits())?;
                TSGCTRL_RXTSP.set(&mut self.bus, 0)?;
                HBD_OVR_RXTSP.set(&mut self.bus, HB_BYPASS)?;
                SEL_RX.set(&mut self.bus, 0)?;
                MODE_RX.set(&mut self.bus, 0)?;
            }
            Direction::Tx => {
                EN_TXTSP.set(&mut self.bus, 1)?;
                TXTSP_BYP.set(&mut self.bus, TxTspBypass::all().bits())?;
                HBI_OVR_TXTSP.set(&mut self.bus, HB_BYPASS)?;
                SEL_TX.set(&mut self.bus, 0)?;
                MODE_TX.set(&mut self.bus, 0)?;
            }
        }
        Ok(())
    }

    /// Decimation (RX) or interpolation (TX) factor on both channels.
    pub fn set_rate_factor(&mut self, direction: Direction, factor: u32) -> Result<()> {
        self.set_rate_code(direction, half_band_code(factor))
    }

    /// Raw half band override code of a direction.
    pub fn rate_code(&mut self, direction: Direction) -> Result<u16> {
        self.set_mac(MacSelect::AB)?;
        half_band_field(direction).get(&mut self.bus)
    }

    pub fn set_rate_code(&mut self, direction: Direction, code: u16) -> Result<()> {
        self.set_mac(MacSelect::AB)?;
        half_band_field(direction).set(&mut self.bus, code)
    }

    /// Tune the CMIX/NCO of one channel to `freq_rel` cycles per sample.
    ///
    /// A failed write puts the bypass and FCW registers back to what they
    /// held before the call.
    pub fn set_nco_freq(&mut self, direction: Direction, channel: Channel, freq_rel: f64) -> Result<()> {
        self.set_mac(channel.into())?;
        let (byp, cmix, sel, hi, lo) = match direction {
            Direction::Rx => (RXTSP_BYP, RxTspBypass::CMIX.bits(), SEL_RX, FCW0_HI_RX, FCW0_LO_RX),
            Direction::Tx => (TXTSP_BYP, TxTspBypass::CMIX.bits(), SEL_TX, FCW0_HI_TX, FCW0_LO_TX),
        };
        let mut saved = Vec::with_capacity(3);
        for addr in [byp.addr, hi.addr, lo.addr] {
            saved.push((addr, self.bus.read(addr)?));
        }

        let fcw = nco_fcw(freq_rel);
        let tune = |bus: &mut B| -> Result<()> {
            let previous = byp.get(bus)?;
            let next = if freq_rel == 0.0 { previous | cmix } else { previous & !cmix };
            byp.set(bus, next)?;
            hi.set(bus, (fcw >> 16) as u16)?;
            lo.set(bus, (fcw & 0xFFFF) as u16)?;
            sel.set(bus, 0)
        };
        let res = tune(&mut self.bus);
        if res.is_err() {
            for (addr, value) in saved {
                if let Err(e) = self.bus.write(addr, value) {
                    log::warn!("NCO register {:#06x} restore failed: {}", addr, e);
                }
            }
        }
        res
    }

    /// Replace the RX ADC samples of one channel with a DC constant.
    pub fn tsg_const(&mut self, channel: Channel, i: i16, q: i16) -> Result<()> {
        self.set_mac(channel.into())?;
        let base = TsgFlags::INSEL | TsgFlags::TSGMODE;
        TSGCTRL_RXTSP.set(&mut self.bus, base.bits())?;

        for (value, load) in [(i, TsgFlags::DCLDI), (q, TsgFlags::DCLDQ)] {
            self.bus.write(DC_REG_RXTSP.addr, value as u16)?;
            TSGCTRL_RXTSP.set(&mut self.bus, (base | load).bits())?;
            TSGCTRL_RXTSP.set(&mut self.bus, base.bits())?;
        }
        Ok(())
    }

    /// Power down the analog blocks and the digital signal paths.
    pub fn power_down(&mut self) -> Result<()> {
        self.set_mac(MacSelect::AB)?;
        let afe = AfeFlags::all().difference(AfeFlags::EN_G_AFE);
        AFE.set(&mut self.bus, afe.bits())?;
        EN_RXTSP.set(&mut self.bus, 0)?;
        EN_TXTSP.set(&mut self.bus, 0)?;
        CGEN_CTRL.set(&mut self.bus, (CgenFlags::PD_VCO | CgenFlags::PD_VCO_COMP).bits())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockBus;

    fn lms() -> Lms7002m<MockBus> {
        Lms7002m::create(MockBus::default()).unwrap()
    }

    #[test]
    fn half_band_codes() {
        assert_eq!(half_band_code(1), HB_BYPASS);
        assert_eq!(half_band_code(2), 0);
        assert_eq!(half_band_code(4), 1);
        assert_eq!(half_band_code(32), 4);
        assert_eq!(half_band_code(12), 2);
    }

    #[test]
    fn fcw_aliases() {
        assert_eq!(nco_fcw(0.0), 0);
        assert_eq!(nco_fcw(0.25), 0x4000_0000);
        assert_eq!(nco_fcw(1.25), 0x4000_0000);
        assert_eq!(nco_fcw(-0.75), 0x4000_0000);
        assert_eq!(nco_fcw(f64::NAN), 0);
    }

    #[test]
    fn create_hands_bus_back_on_probe_failure() {
        let mut bus = MockBus::default();
        bus.fail_reads(VER.addr);
        let (err, _bus) = Lms7002m::create(bus).err().unwrap();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn afe_enable_tracks_paths() {
        let mut lms = lms();
        lms.bus().poke(0x0082, AfeFlags::all().difference(AfeFlags::EN_G_AFE).bits());
        assert!(!lms.afe_enabled(Direction::Rx, Channel::A).unwrap());

        lms.afe_enable(Direction::Rx, Channel::A, true).unwrap();
        assert!(lms.afe_enabled(Direction::Rx, Channel::A).unwrap());
        assert!(!lms.afe_enabled(Direction::Tx, Channel::A).unwrap());

        lms.afe_enable(Direction::Rx, Channel::A, false).unwrap();
        let flags = AfeFlags::from_bits_truncate(lms.bus().peek(0x0082));
        assert!(flags.contains(AfeFlags::PD_AFE));
        assert!(!flags.contains(AfeFlags::EN_G_AFE));
    }

    #[test]
    fn afe_enable_preserves_upper_bits() {
        let mut lms = lms();
        lms.bus().poke(0x0082, 0xA400 | AfeFlags::all().bits());
        lms.afe_enable(Direction::Tx, Channel::B, true).unwrap();
        assert_eq!(lms.bus().peek(0x0082) & 0xFFC0, 0xA400);
    }

    #[test]
    fn data_clock_61mhz() {
        let mut lms = lms();
        let actual = lms.set_data_clock(30.72e6, 61e6).unwrap();
        assert!((actual - 61e6).abs() < 1.0);
        // 61 MHz * 32 = 1952 MHz is the first VCO frequency in range
        assert_eq!(DIV_OUTCH_CGEN.extract(lms.bus().peek(0x0089)), 15);
        assert_eq!(CLKH_OV_CLKL_CGEN.extract(lms.bus().peek(0x0089)), 2);
        assert_eq!(INT_SDM_CGEN.extract(lms.bus().peek(0x0088)), 62);
    }

    #[test]
    fn data_clock_out_of_range() {
        let mut lms = lms();
        assert!(matches!(
            lms.set_data_clock(30.72e6, 2e9),
            Err(Error::ClockUnreachable(_))
        ));
    }

    #[test]
    fn lml_divider() {
        let mut lms = lms();
        lms.configure_lml_port(LmlPort::Two, Direction::Rx, 4).unwrap();
        let word = lms.bus().peek(0x002B);
        assert_eq!(MCLK2SRC.extract(word), MclkSource::RxTspDiv.into());
        assert_eq!(RXDIVEN.extract(word), 1);
        assert_eq!(RXTSPCLKA_DIV.extract(lms.bus().peek(0x002C)), 1);

        lms.configure_lml_port(LmlPort::Two, Direction::Rx, 1).unwrap();
        let word = lms.bus().peek(0x002B);
        assert_eq!(MCLK2SRC.extract(word), MclkSource::RxTsp.into());
        assert_eq!(RXDIVEN.extract(word), 0);
    }

    #[test]
    fn nco_zero_bypasses_cmix() {
        let mut lms = lms();
        lms.set_nco_freq(Direction::Rx, Channel::B, 0.0).unwrap();
        assert_eq!(MAC.extract(lms.bus().peek(0x0020)), MacSelect::B.into());
        assert_ne!(lms.bus().peek(0x040C) & RxTspBypass::CMIX.bits(), 0);

        lms.set_nco_freq(Direction::Rx, Channel::B, 0.25).unwrap();
        assert_eq!(lms.bus().peek(0x040C) & RxTspBypass::CMIX.bits(), 0);
        assert_eq!(lms.bus().peek(0x0442), 0x4000);
        assert_eq!(lms.bus().peek(0x0443), 0x0000);
    }

    #[test]
    fn failed_nco_write_restores_bypass() {
        let mut lms = lms();
        lms.bus().poke(0x040C, 0x0011);
        lms.bus().poke(0x0442, 0x1234);
        lms.bus().fail_writes(0x0443);

        assert!(lms.set_nco_freq(Direction::Rx, Channel::A, 0.0).is_err());
        assert_eq!(lms.bus().peek(0x040C), 0x0011);
        assert_eq!(lms.bus().peek(0x0442), 0x1234);
    }

    #[test]
    fn power_down_sets_afe_power_downs() {
        let mut lms = lms();
        lms.power_down().unwrap();
        let flags = AfeFlags::from_bits_truncate(lms.bus().peek(0x0082));
        assert!(flags.contains(AfeFlags::PD_AFE | AfeFlags::PD_RX_AFE1 | AfeFlags::PD_TX_AFE2));
        assert!(!flags.contains(AfeFlags::EN_G_AFE));
        assert_eq!(lms.bus().peek(0x0400) & 1, 0);
    }
}
