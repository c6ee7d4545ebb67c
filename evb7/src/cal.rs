// Reference resistor bias calibration.
use serde::Serialize;

use crate::lms::Lms7002m;
use crate::registers::{MAC, MUX_BIAS_OUT, RP_CALIB_BIAS, RP_CALIB_BIAS_MAX, RSSI_RXTSP};
use crate::{Channel, Error, RegisterBus, Result};

/// Nominal RP_CALIB_BIAS code, the numerator of the reported ratio.
pub const BIAS_REFERENCE: f64 = 16.0;

/// MUX_BIAS_OUT setting that routes the bias reference to the monitor ADC.
const MUX_BIAS_TO_ADC: u16 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Calibration {
    pub bias: u16,
    /// Monitor reading at the chosen bias.
    pub reading: u16,
    pub ratio: f64,
}

/// Sweep RP_CALIB_BIAS over its whole range, keep the code with the lowest
/// monitor reading and commit it. The first code of a tie wins and code 0 is
/// never chosen.
///
/// The channel select register is put back once the sweep is over. A bus
/// failure also restores the bias register to its value before the sweep and
/// yields [`Error::CalibrationAborted`].
pub fn calibrate_bias<B: RegisterBus>(lms: &mut Lms7002m<B>, channel: Channel) -> Result<Calibration> {
    let abort = |e| Error::CalibrationAborted(Box::new(e));

    let mac = lms.bus().read(MAC.addr).map_err(abort)?;
    let snapshot = lms.bus().read(RP_CALIB_BIAS.addr).map_err(abort)?;
    let res = lms.set_mac(channel.into()).and_then(|()| sweep(lms.bus()));

    if res.is_err() {
        if let Err(e) = lms.bus().write(RP_CALIB_BIAS.addr, snapshot) {
            log::warn!("bias register restore failed: {}", e);
        }
    }
    if let Err(e) = lms.bus().write(MAC.addr, mac) {
        log::warn!("channel select restore failed: {}", e);
    }

    let cal = res.map_err(abort)?;
    log::info!(
        "{:?} bias calibrated to {} (reading {}), ratio {:.3}",
        channel,
        cal.bias,
        cal.reading,
        cal.ratio
    );
    Ok(cal)
}

fn sweep<B: RegisterBus>(bus: &mut B) -> Result<Calibration> {
    RP_CALIB_BIAS.set(bus, 0)?;
    MUX_BIAS_OUT.set(bus, MUX_BIAS_TO_ADC)?;

    let mut readings = [0u16; RP_CALIB_BIAS_MAX as usize + 1];
    for (bias, reading) in (0..=RP_CALIB_BIAS_MAX).zip(readings.iter_mut()) {
        RP_CALIB_BIAS.set(bus, bias)?;
        *reading = RSSI_RXTSP.get(bus)?;
        log::trace!("RP_CALIB_BIAS {:2}: {}", bias, reading);
    }

    // Code 0 is read like every other code but cannot be a divisor
    let (bias, reading) = (2..=RP_CALIB_BIAS_MAX).fold((1, readings[1]), |best, bias| {
        let reading = readings[usize::from(bias)];
        if reading < best.1 {
            (bias, reading)
        } else {
            best
        }
    });

    RP_CALIB_BIAS.set(bus, bias)?;
    Ok(Calibration {
        bias,
        reading,
        ratio: BIAS_REFERENCE / f64::from(bias),
    })
}
