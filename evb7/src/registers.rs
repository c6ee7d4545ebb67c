/* LMS7002M register fields and encodings
 *
 * Fields are (address, high bit, low bit), inclusive. Only the fields the
 * control plane touches are listed here.
 * */
use bitflags::bitflags;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::field::RegisterField;

// Name: [Addr, High, Low],
macro_rules! fields {
    (
        $($name:ident: [ $addr:literal, $high:literal, $low:literal ],)*
    ) => {
        $(pub const $name: RegisterField = RegisterField::new($addr, $high, $low);)*
    }
}

#[rustfmt::skip]
fields! {
    /* LimeLight & Top Level */
    RESETS:             [0x0020, 15,  2], // Active low logic/memory resets and RX/TX enables
    MAC:                [0x0020,  1,  0], // Channel select for shadowed registers
    SPIMODE:            [0x0021,  0,  0], // 0: 3 wire, 1: 4 wire
    LML2_TXNRXIQ:       [0x0023,  2,  2],
    LML1_TXNRXIQ:       [0x0023,  0,  0],
    LML2_MODE:          [0x0023,  5,  5], // 0: TRXIQ, 1: JESD207
    LML1_MODE:          [0x0023,  4,  4],
    MCLK2SRC:           [0x002B,  5,  4],
    MCLK1SRC:           [0x002B,  3,  2],
    TXDIVEN:            [0x002B,  1,  1],
    RXDIVEN:            [0x002B,  0,  0],
    TXTSPCLKA_DIV:      [0x002C, 15,  8],
    RXTSPCLKA_DIV:      [0x002C,  7,  0],
    VER:                [0x002F, 15, 11], // Chip version
    REV:                [0x002F, 10,  6], // Chip revision
    MASK:               [0x002F,  5,  0], // Mask revision
    /* AFE & BIAS */
    AFE:                [0x0082,  5,  0], // Power downs, see AfeFlags
    MUX_BIAS_OUT:       [0x0084, 12, 11],
    RP_CALIB_BIAS:      [0x0084, 10,  6], // Reference resistor trim
    /* CGEN */
    CGEN_CTRL:          [0x0086,  2,  0], // Enables, see CgenFlags
    FRAC_SDM_CGEN_LSB:  [0x0087, 15,  0],
    INT_SDM_CGEN:       [0x0088, 13,  4],
    FRAC_SDM_CGEN_MSB:  [0x0088,  3,  0],
    CLKH_OV_CLKL_CGEN:  [0x0089, 12, 11], // CLKL = CLKH / 2^n
    DIV_OUTCH_CGEN:     [0x0089, 10,  3], // Output divider = 2 * (n + 1)
    VCO_CMP_CGEN:       [0x008C, 13, 12], // Comparator readback, high/low
    /* TXTSP */
    EN_TXTSP:           [0x0200,  0,  0],
    HBI_OVR_TXTSP:      [0x0203, 14, 12], // Interpolation 2^(n+1), 7 = bypass
    TXTSP_BYP:          [0x0208,  8,  0], // See TxTspBypass
    SEL_TX:             [0x0240,  5,  2], // NCO FCW/PHO register select
    MODE_TX:            [0x0240,  0,  0], // 0: FCW mode, 1: PHO mode
    FCW0_HI_TX:         [0x0242, 15,  0],
    FCW0_LO_TX:         [0x0243, 15,  0],
    /* RXTSP */
    EN_RXTSP:           [0x0400,  0,  0],
    TSGCTRL_RXTSP:      [0x0400,  7,  2], // See TsgFlags
    HBD_OVR_RXTSP:      [0x0403, 14, 12], // Decimation 2^(n+1), 7 = bypass
    DC_REG_RXTSP:       [0x040B, 15,  0], // TSG DC value on write
    RSSI_RXTSP:         [0x040B, 15,  0], // ADC monitor on read
    RXTSP_BYP:          [0x040C,  7,  0], // See RxTspBypass
    SEL_RX:             [0x0440,  5,  2],
    MODE_RX:            [0x0440,  0,  0],
    FCW0_HI_RX:         [0x0442, 15,  0],
    FCW0_LO_RX:         [0x0443, 15,  0],
}

/// Highest RP_CALIB_BIAS code.
pub const RP_CALIB_BIAS_MAX: u16 = 31;

/// `HBD_OVR`/`HBI_OVR` value that bypasses the half band chain.
pub const HB_BYPASS: u16 = 7;

bitflags! {
    // Register 0x0082 bits 5..0, power downs are active high
    #[derive(Clone, Copy, Debug, PartialEq)]
    pub struct AfeFlags: u16 {
        const PD_AFE     = 1 << 5;
        const PD_RX_AFE1 = 1 << 4;
        const PD_RX_AFE2 = 1 << 3;
        const PD_TX_AFE1 = 1 << 2;
        const PD_TX_AFE2 = 1 << 1;
        const EN_G_AFE   = 1 << 0;
    }
}

bitflags! {
    // Register 0x0086 bits 2..0
    #[derive(Clone, Copy, Debug, PartialEq)]
    pub struct CgenFlags: u16 {
        const PD_VCO      = 1 << 2;
        const PD_VCO_COMP = 1 << 1;
        const EN_G        = 1 << 0;
    }
}

bitflags! {
    // Register 0x0208 bits 8..0
    #[derive(Clone, Copy, Debug, PartialEq)]
    pub struct TxTspBypass: u16 {
        const CMIX  = 1 << 8;
        const ISINC = 1 << 7;
        const GFIR3 = 1 << 6;
        const GFIR2 = 1 << 5;
        const GFIR1 = 1 << 4;
        const DC    = 1 << 3;
        const GC    = 1 << 1;
        const PH    = 1 << 0;
    }
}

bitflags! {
    // Register 0x040C bits 7..0
    #[derive(Clone, Copy, Debug, PartialEq)]
    pub struct RxTspBypass: u16 {
        const CMIX  = 1 << 7;
        const AGC   = 1 << 6;
        const GFIR3 = 1 << 5;
        const GFIR2 = 1 << 4;
        const GFIR1 = 1 << 3;
        const DC    = 1 << 2;
        const GC    = 1 << 1;
        const PH    = 1 << 0;
    }
}

bitflags! {
    // Register 0x0400 bits 7..2, shifted down to bit 0
    #[derive(Clone, Copy, Debug, PartialEq)]
    pub struct TsgFlags: u16 {
        const DCLDI   = 1 << 5; // Load DC_REG into I on rising edge
        const DCLDQ   = 1 << 4; // Load DC_REG into Q on rising edge
        const TSGFC   = 1 << 3;
        const TSGFCW  = 1 << 2;
        const TSGMODE = 1 << 1; // 0: NCO, 1: DC
        const INSEL   = 1 << 0; // 0: ADC, 1: test signal generator
    }
}

#[derive(Clone, Copy, Debug, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u16)]
#[rustfmt::skip]
pub enum MacSelect {
    None = 0,
    A    = 1,
    B    = 2,
    AB   = 3,
}

impl From<crate::Channel> for MacSelect {
    fn from(ch: crate::Channel) -> Self {
        match ch {
            crate::Channel::A => MacSelect::A,
            crate::Channel::B => MacSelect::B,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u16)]
#[rustfmt::skip]
pub enum MclkSource {
    TxTspDiv = 0,
    RxTspDiv = 1,
    TxTsp    = 2,
    RxTsp    = 3,
}

/// LML port sample direction as seen from the chip: a port carrying TX
/// samples receives IQ from the baseband.
#[derive(Clone, Copy, Debug, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u16)]
#[rustfmt::skip]
pub enum LmlIqMode {
    TxIq = 0,
    RxIq = 1,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LmlPort {
    One,
    Two,
}

#[test]
fn mac_codes() {
    assert_eq!(u16::from(MacSelect::from(crate::Channel::A)), 1);
    assert_eq!(u16::from(MacSelect::from(crate::Channel::B)), 2);
    assert_eq!(MacSelect::try_from(3).unwrap(), MacSelect::AB);
}

#[test]
fn afe_bits_fit_field() {
    assert_eq!(AfeFlags::all().bits(), AFE.mask());
    assert_eq!(TsgFlags::all().bits(), TSGCTRL_RXTSP.mask());
    assert_eq!(RxTspBypass::all().bits(), RXTSP_BYP.mask());
    assert_eq!(TxTspBypass::all().bits() | (1 << 2), TXTSP_BYP.mask());
}
