/* Xilinx AXI DMA engines in direct register mode
 *
 * Engine `n` sits at `n * stride` in the window. Each engine has an MM2S
 * half at 0x00 and an S2MM half at 0x30, each with a control register
 * followed by a status register. A half can be claimed by one handle at a
 * time.
 * */
use bitflags::bitflags;
use std::collections::HashSet;
use std::io::{Error, ErrorKind};

use crate::board::{DmaDirection, DmaEngine};
use crate::fpga::RegisterMap;
use crate::Result;

const MM2S: u32 = 0x00;
const S2MM: u32 = 0x30;
const CR: u32 = 0x00;
const SR: u32 = 0x04;

// Reset and halt complete within a few AXI clocks
const POLL_LIMIT: usize = 1000;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq)]
    pub struct DmaControl: u32 {
        const RS         = 1 << 0;
        const RESET      = 1 << 2;
        const KEYHOLE    = 1 << 3;
        const IOC_IRQ_EN = 1 << 12;
        const DLY_IRQ_EN = 1 << 13;
        const ERR_IRQ_EN = 1 << 14;
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq)]
    pub struct DmaStatus: u32 {
        const HALTED     = 1 << 0;
        const IDLE       = 1 << 1;
        const INT_ERR    = 1 << 4;
        const SLV_ERR    = 1 << 5;
        const DEC_ERR    = 1 << 6;
        const IOC_IRQ    = 1 << 12;
        const DLY_IRQ    = 1 << 13;
        const ERR_IRQ    = 1 << 14;
    }
}

#[derive(Debug)]
pub struct AxiChannel {
    index: usize,
    direction: DmaDirection,
}

pub struct AxiDma<M: RegisterMap> {
    map: M,
    stride: u32,
    engines: usize,
    claimed: HashSet<(usize, DmaDirection)>,
}

impl<M: RegisterMap> AxiDma<M> {
    pub fn new(map: M, stride: u32, engines: usize) -> Self {
        Self {
            map,
            stride,
            engines,
            claimed: HashSet::new(),
        }
    }

    fn base(&self, ch: &AxiChannel) -> u32 {
        let half = match ch.direction {
            DmaDirection::Mm2s => MM2S,
            DmaDirection::S2mm => S2MM,
        };
        ch.index as u32 * self.stride + half
    }

    fn control(&mut self, ch: &AxiChannel) -> Result<DmaControl> {
        let base = self.base(ch);
        Ok(DmaControl::from_bits_retain(self.map.read32(base + CR)?))
    }

    fn set_control(&mut self, ch: &AxiChannel, value: DmaControl) -> Result<()> {
        let base = self.base(ch);
        self.map.write32(base + CR, value.bits())
    }

    fn status(&mut self, ch: &AxiChannel) -> Result<DmaStatus> {
        let base = self.base(ch);
        Ok(DmaStatus::from_bits_retain(self.map.read32(base + SR)?))
    }

    fn wait(&mut self, ch: &AxiChannel, what: &str, done: impl Fn(&mut Self) -> Result<bool>) -> Result<()> {
        for _ in 0..POLL_LIMIT {
            if done(self)? {
                return Ok(());
            }
        }
        Err(Error::new(ErrorKind::TimedOut, format!("DMA {} {:?} {} timed out", ch.index, ch.direction, what)).into())
    }
}

impl<M: RegisterMap> DmaEngine for AxiDma<M> {
    type Handle = AxiChannel;

    fn create(&mut self, index: usize, direction: DmaDirection) -> Option<AxiChannel> {
        if index >= self.engines || !self.claimed.insert((index, direction)) {
            return None;
        }
        Some(AxiChannel { index, direction })
    }

    fn reset(&mut self, ch: &mut AxiChannel) -> Result<()> {
        self.set_control(ch, DmaControl::RESET)?;
        self.wait(ch, "reset", |dma| Ok(!dma.control(ch)?.contains(DmaControl::RESET)))
    }

    fn start(&mut self, ch: &mut AxiChannel) -> Result<()> {
        let cr = self.control(ch)?;
        self.set_control(ch, cr | DmaControl::RS)?;
        let sr = self.status(ch)?;
        if sr.intersects(DmaStatus::INT_ERR | DmaStatus::SLV_ERR | DmaStatus::DEC_ERR) {
            log::warn!("DMA {} {:?} error status {:?}", ch.index, ch.direction, sr);
        }
        Ok(())
    }

    fn halt(&mut self, ch: &mut AxiChannel) -> Result<()> {
        let cr = self.control(ch)?;
        self.set_control(ch, cr.difference(DmaControl::RS))?;
        self.wait(ch, "halt", |dma| Ok(dma.status(ch)?.contains(DmaStatus::HALTED)))
    }

    fn destroy(&mut self, mut ch: AxiChannel) {
        if let Err(e) = self.halt(&mut ch) {
            log::warn!("{}", e);
        }
        self.claimed.remove(&(ch.index, ch.direction));
    }
}
