//! Hardware the device is assembled from.
//!
//! A [`Board`] hands out each collaborator on request and takes it back at
//! teardown, so the device controls the acquisition and release order.
use crate::fpga::RegisterMap;
use crate::{RegisterBus, Result};

/// Digital outputs wired to the transceiver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Pin {
    Reset,
    RxEnable,
    TxEnable,
}

impl Pin {
    pub const ALL: [Pin; 3] = [Pin::Reset, Pin::RxEnable, Pin::TxEnable];
}

pub trait PinController {
    fn set_level(&mut self, pin: Pin, high: bool) -> Result<()>;
    /// Stop driving the pin and give the line back.
    fn release_pin(&mut self, pin: Pin) -> Result<()>;
}

/// Transfer direction of a DMA engine, named from the memory side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DmaDirection {
    /// Memory to stream, host to FPGA
    Mm2s,
    /// Stream to memory, FPGA to host
    S2mm,
}

pub trait DmaEngine {
    type Handle;

    /// `None` when the engine at `index` is missing or already claimed.
    fn create(&mut self, index: usize, direction: DmaDirection) -> Option<Self::Handle>;
    fn reset(&mut self, handle: &mut Self::Handle) -> Result<()>;
    fn start(&mut self, handle: &mut Self::Handle) -> Result<()>;
    fn halt(&mut self, handle: &mut Self::Handle) -> Result<()>;
    fn destroy(&mut self, handle: Self::Handle);
}

pub trait Board {
    type Map: RegisterMap;
    type Bus: RegisterBus;
    type Pins: PinController;
    type Dma: DmaEngine;

    fn map_registers(&mut self) -> Result<Self::Map>;
    fn unmap_registers(&mut self, map: Self::Map);
    fn pins(&mut self) -> Result<Self::Pins>;
    fn open_bus(&mut self) -> Result<Self::Bus>;
    fn close_bus(&mut self, bus: Self::Bus);
    fn dma_engine(&mut self) -> Result<Self::Dma>;
}
