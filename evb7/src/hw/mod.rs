//! Linux implementations of the board collaborators for the Zynq host.
use crate::board::Board;
use crate::config::Config;
use crate::Result;

pub mod axi_dma;
pub mod devmem;
pub mod gpio;
pub mod spi;

pub use axi_dma::AxiDma;
pub use devmem::DevMem;
pub use gpio::GpioPins;
pub use spi::SpiBus;

pub const DEV_MEM: &str = "/dev/mem";

pub struct LinuxBoard {
    config: Config,
}

impl LinuxBoard {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

impl Board for LinuxBoard {
    type Map = DevMem;
    type Bus = SpiBus;
    type Pins = GpioPins;
    type Dma = AxiDma<DevMem>;

    fn map_registers(&mut self) -> Result<DevMem> {
        let fpga = &self.config.fpga;
        DevMem::open(DEV_MEM, fpga.base, fpga.size)
    }

    fn unmap_registers(&mut self, map: DevMem) {
        drop(map);
    }

    fn pins(&mut self) -> Result<GpioPins> {
        Ok(GpioPins::new(&self.config.gpio))
    }

    fn open_bus(&mut self) -> Result<SpiBus> {
        let spi = &self.config.spi;
        log::debug!("opening {} at {} Hz", spi.path, spi.speed_hz);
        SpiBus::open(&spi.path, spi.speed_hz)
    }

    fn close_bus(&mut self, bus: SpiBus) {
        drop(bus);
    }

    fn dma_engine(&mut self) -> Result<AxiDma<DevMem>> {
        let dma = &self.config.dma;
        let engines = dma.rx_index.max(dma.tx_index) + 1;
        let window = DevMem::open(DEV_MEM, dma.base, dma.stride * engines as u64)?;
        Ok(AxiDma::new(window, dma.stride as u32, engines))
    }
}
