// Scripted collaborators for unit tests.
use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::rc::Rc;

use crate::board::{Board, DmaDirection, DmaEngine, Pin, PinController};
use crate::fpga::RegisterMap;
use crate::registers::{RP_CALIB_BIAS, RSSI_RXTSP, VER};
use crate::{Error, RegisterBus, Result};

fn injected(what: &str) -> Error {
    std::io::Error::other(format!("injected {} fault", what)).into()
}

#[derive(Debug, Default)]
struct BusState {
    regs: HashMap<u16, u16>,
    writes: Vec<(u16, u16)>,
    reads: HashMap<u16, usize>,
    failing_reads: HashSet<u16>,
    failing_writes: HashSet<u16>,
    read_faults: HashSet<(u16, usize)>,
    adc: Option<[u16; 32]>,
}

/// Register file behind a fake SPI bus. Clones share state, so a test can
/// keep one while the device owns another.
#[derive(Clone, Debug, Default)]
pub struct MockBus(Rc<RefCell<BusState>>);

impl MockBus {
    pub fn poke(&mut self, addr: u16, value: u16) {
        self.0.borrow_mut().regs.insert(addr, value);
    }

    pub fn peek(&self, addr: u16) -> u16 {
        self.0.borrow().regs.get(&addr).copied().unwrap_or(0)
    }

    /// Successful writes, oldest first.
    pub fn writes(&self) -> Vec<(u16, u16)> {
        self.0.borrow().writes.clone()
    }

    pub fn reads_of(&self, addr: u16) -> usize {
        self.0.borrow().reads.get(&addr).copied().unwrap_or(0)
    }

    pub fn fail_reads(&mut self, addr: u16) {
        self.0.borrow_mut().failing_reads.insert(addr);
    }

    pub fn fail_writes(&mut self, addr: u16) {
        self.0.borrow_mut().failing_writes.insert(addr);
    }

    /// Fail only the `n`th read of `addr`, counting from 0.
    pub fn fail_read_at(&mut self, addr: u16, n: usize) {
        self.0.borrow_mut().read_faults.insert((addr, n));
    }

    pub fn fail_next_read(&mut self, addr: u16) {
        let n = self.reads_of(addr);
        self.fail_read_at(addr, n);
    }

    pub fn clear_faults(&mut self) {
        let mut state = self.0.borrow_mut();
        state.failing_reads.clear();
        state.failing_writes.clear();
        state.read_faults.clear();
    }

    /// Monitor ADC readings indexed by the current RP_CALIB_BIAS code.
    pub fn adc_curve(&mut self, curve: [u16; 32]) {
        self.0.borrow_mut().adc = Some(curve);
    }
}

impl RegisterBus for MockBus {
    fn read(&mut self, addr: u16) -> Result<u16> {
        let mut state = self.0.borrow_mut();
        let count = state.reads.entry(addr).or_insert(0);
        let n = *count;
        *count += 1;
        if state.failing_reads.contains(&addr) || state.read_faults.remove(&(addr, n)) {
            return Err(injected("read"));
        }

        let value = state.regs.get(&addr).copied().unwrap_or(0);
        match state.adc {
            Some(curve) if addr == RSSI_RXTSP.addr => {
                let bias = RP_CALIB_BIAS.extract(state.regs.get(&RP_CALIB_BIAS.addr).copied().unwrap_or(0));
                Ok(curve[usize::from(bias)])
            }
            _ => Ok(value),
        }
    }

    fn write(&mut self, addr: u16, value: u16) -> Result<()> {
        let mut state = self.0.borrow_mut();
        if state.failing_writes.contains(&addr) {
            return Err(injected("write"));
        }
        state.regs.insert(addr, value);
        state.writes.push((addr, value));
        Ok(())
    }
}

/// One-shot failure of a board collaborator. DMA faults hit the `n`th call
/// of that kind on the rig, counting from 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fault {
    Map,
    Pins,
    OpenBus,
    Probe,
    DmaEngine,
    DmaCreate(usize),
    DmaReset(usize),
    DmaStart(usize),
}

#[derive(Default)]
struct RigState {
    events: Vec<String>,
    faults: Vec<Fault>,
    calls: HashMap<&'static str, usize>,
    claimed: HashMap<u32, (usize, DmaDirection)>,
    next_handle: u32,
    fpga: HashMap<u32, u32>,
    fpga_writes: Vec<(u32, u32)>,
    pins_held: BTreeSet<Pin>,
    mapped: usize,
    buses: usize,
}

/// Shared event journal and resource accounting for the mock board parts.
#[derive(Clone, Default)]
pub struct Rig(Rc<RefCell<RigState>>);

impl Rig {
    pub fn inject(&self, fault: Fault) {
        self.0.borrow_mut().faults.push(fault);
    }

    fn trip(&self, fault: Fault) -> bool {
        let mut state = self.0.borrow_mut();
        match state.faults.iter().position(|f| *f == fault) {
            Some(i) => {
                state.faults.remove(i);
                true
            }
            None => false,
        }
    }

    fn next_call(&self, kind: &'static str) -> usize {
        let mut state = self.0.borrow_mut();
        let count = state.calls.entry(kind).or_insert(0);
        *count += 1;
        *count - 1
    }

    fn record(&self, event: String) {
        self.0.borrow_mut().events.push(event);
    }

    pub fn events(&self) -> Vec<String> {
        self.0.borrow().events.clone()
    }

    pub fn events_with(&self, prefix: &str) -> Vec<String> {
        self.events().into_iter().filter(|e| e.starts_with(prefix)).collect()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.events_with(prefix).len()
    }

    /// Index of the first event starting with `prefix`.
    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.0.borrow().events.iter().position(|e| e.starts_with(prefix))
    }

    /// Index of the last event starting with `prefix`.
    pub fn last_position(&self, prefix: &str) -> Option<usize> {
        self.0.borrow().events.iter().rposition(|e| e.starts_with(prefix))
    }

    pub fn live_dma(&self) -> usize {
        self.0.borrow().claimed.len()
    }

    pub fn pins_held(&self) -> Vec<Pin> {
        self.0.borrow().pins_held.iter().copied().collect()
    }

    pub fn mapped(&self) -> usize {
        self.0.borrow().mapped
    }

    pub fn open_buses(&self) -> usize {
        self.0.borrow().buses
    }

    pub fn fpga_poke(&self, offset: u32, value: u32) {
        self.0.borrow_mut().fpga.insert(offset, value);
    }

    pub fn fpga_writes(&self) -> Vec<(u32, u32)> {
        self.0.borrow().fpga_writes.clone()
    }
}

pub struct MockMap {
    rig: Rig,
}

impl MockMap {
    pub fn new(rig: &Rig) -> Self {
        Self { rig: rig.clone() }
    }
}

impl RegisterMap for MockMap {
    fn read32(&mut self, offset: u32) -> Result<u32> {
        Ok(self.rig.0.borrow().fpga.get(&offset).copied().unwrap_or(0))
    }

    fn write32(&mut self, offset: u32, value: u32) -> Result<()> {
        let mut state = self.rig.0.borrow_mut();
        state.fpga.insert(offset, value);
        state.fpga_writes.push((offset, value));
        Ok(())
    }
}

pub struct MockPins {
    rig: Rig,
}

impl PinController for MockPins {
    fn set_level(&mut self, pin: Pin, high: bool) -> Result<()> {
        self.rig.0.borrow_mut().pins_held.insert(pin);
        self.rig
            .record(format!("pin {:?} {}", pin, if high { "high" } else { "low" }));
        Ok(())
    }

    fn release_pin(&mut self, pin: Pin) -> Result<()> {
        self.rig.0.borrow_mut().pins_held.remove(&pin);
        self.rig.record(format!("release {:?}", pin));
        Ok(())
    }
}

#[derive(Debug)]
pub struct MockHandle {
    id: u32,
}

pub struct MockDma {
    rig: Rig,
}

impl MockDma {
    pub fn new(rig: &Rig) -> Self {
        Self { rig: rig.clone() }
    }

    fn call(&self, kind: &'static str, fault: fn(usize) -> Fault, handle: &MockHandle) -> Result<()> {
        let n = self.rig.next_call(kind);
        if self.rig.trip(fault(n)) {
            return Err(injected(kind));
        }
        self.rig.record(format!("dma {} {}", kind, handle.id));
        Ok(())
    }
}

impl DmaEngine for MockDma {
    type Handle = MockHandle;

    fn create(&mut self, index: usize, direction: DmaDirection) -> Option<MockHandle> {
        let n = self.rig.next_call("create");
        if self.rig.trip(Fault::DmaCreate(n)) {
            return None;
        }
        let mut state = self.rig.0.borrow_mut();
        if state.claimed.values().any(|claim| *claim == (index, direction)) {
            return None;
        }
        let id = state.next_handle;
        state.next_handle += 1;
        state.claimed.insert(id, (index, direction));
        state.events.push(format!("dma create {} {:?}", index, direction));
        Some(MockHandle { id })
    }

    fn reset(&mut self, handle: &mut MockHandle) -> Result<()> {
        self.call("reset", Fault::DmaReset, handle)
    }

    fn start(&mut self, handle: &mut MockHandle) -> Result<()> {
        self.call("start", Fault::DmaStart, handle)
    }

    fn halt(&mut self, handle: &mut MockHandle) -> Result<()> {
        self.rig.record(format!("dma halt {}", handle.id));
        Ok(())
    }

    fn destroy(&mut self, handle: MockHandle) {
        self.rig.0.borrow_mut().claimed.remove(&handle.id);
        self.rig.record(format!("dma destroy {}", handle.id));
    }
}

/// Board assembled from the mocks above. The bus it hands out shares state
/// with [`MockBoard::bus`].
#[derive(Clone, Default)]
pub struct MockBoard {
    pub rig: Rig,
    pub bus: MockBus,
}

impl Board for MockBoard {
    type Map = MockMap;
    type Bus = MockBus;
    type Pins = MockPins;
    type Dma = MockDma;

    fn map_registers(&mut self) -> Result<MockMap> {
        if self.rig.trip(Fault::Map) {
            return Err(injected("map"));
        }
        self.rig.0.borrow_mut().mapped += 1;
        self.rig.record("map".into());
        Ok(MockMap::new(&self.rig))
    }

    fn unmap_registers(&mut self, _map: MockMap) {
        self.rig.0.borrow_mut().mapped -= 1;
        self.rig.record("unmap".into());
    }

    fn pins(&mut self) -> Result<MockPins> {
        if self.rig.trip(Fault::Pins) {
            return Err(injected("pins"));
        }
        Ok(MockPins { rig: self.rig.clone() })
    }

    fn open_bus(&mut self) -> Result<MockBus> {
        if self.rig.trip(Fault::OpenBus) {
            return Err(injected("open"));
        }
        if self.rig.trip(Fault::Probe) {
            self.bus.fail_next_read(VER.addr);
        }
        self.rig.0.borrow_mut().buses += 1;
        self.rig.record("open bus".into());
        Ok(self.bus.clone())
    }

    fn close_bus(&mut self, _bus: MockBus) {
        self.rig.0.borrow_mut().buses -= 1;
        self.rig.record("close bus".into());
    }

    fn dma_engine(&mut self) -> Result<MockDma> {
        if self.rig.trip(Fault::DmaEngine) {
            return Err(injected("dma engine"));
        }
        Ok(MockDma::new(&self.rig))
    }
}
