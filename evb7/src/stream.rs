//! DMA channels carrying sample and control data between the FPGA and host.
//!
//! Each direction uses one DMA engine index with both of its halves: RX data
//! arrives on S2MM while RX control words leave on MM2S, TX data leaves on
//! MM2S and TX status comes back on S2MM. The four channels are acquired,
//! reset and destroyed together by [`StreamResources`].
use serde::{Deserialize, Serialize};

use crate::board::{DmaDirection, DmaEngine};
use crate::{Direction, Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DmaRole {
    RxData,
    RxCtrl,
    TxData,
    TxStat,
}

impl DmaRole {
    /// Acquisition order.
    pub const ALL: [DmaRole; 4] = [DmaRole::RxData, DmaRole::RxCtrl, DmaRole::TxData, DmaRole::TxStat];

    pub fn direction(self) -> Direction {
        match self {
            DmaRole::RxData | DmaRole::RxCtrl => Direction::Rx,
            DmaRole::TxData | DmaRole::TxStat => Direction::Tx,
        }
    }

    pub fn transfer(self) -> DmaDirection {
        match self {
            DmaRole::RxData | DmaRole::TxStat => DmaDirection::S2mm,
            DmaRole::RxCtrl | DmaRole::TxData => DmaDirection::Mm2s,
        }
    }

    fn slot(self) -> usize {
        match self {
            DmaRole::RxData => 0,
            DmaRole::RxCtrl => 1,
            DmaRole::TxData => 2,
            DmaRole::TxStat => 3,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelState {
    Created,
    Idle,
    Active,
}

/// DMA engine index used by each direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DmaIndices {
    pub rx: usize,
    pub tx: usize,
}

impl DmaIndices {
    pub fn index(&self, role: DmaRole) -> usize {
        match role.direction() {
            Direction::Rx => self.rx,
            Direction::Tx => self.tx,
        }
    }
}

/// One claimed engine half. Destroying consumes the channel.
pub struct DmaChannel<H> {
    role: DmaRole,
    state: ChannelState,
    handle: H,
}

impl<H> DmaChannel<H> {
    pub fn create<E>(engine: &mut E, role: DmaRole, index: usize) -> Result<Self>
    where
        E: DmaEngine<Handle = H>,
    {
        let handle = engine
            .create(index, role.transfer())
            .ok_or(Error::ChannelUnavailable(role))?;
        log::debug!("{:?} on DMA {} {:?}", role, index, role.transfer());
        Ok(Self {
            role,
            state: ChannelState::Created,
            handle,
        })
    }

    pub fn role(&self) -> DmaRole {
        self.role
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    fn illegal(&self, action: &'static str) -> Error {
        Error::ChannelState {
            role: self.role,
            action,
            state: self.state,
        }
    }

    /// Halt and reset the engine from any state.
    pub fn reset<E: DmaEngine<Handle = H>>(&mut self, engine: &mut E) -> Result<()> {
        engine.reset(&mut self.handle)?;
        self.state = ChannelState::Idle;
        Ok(())
    }

    pub fn start<E: DmaEngine<Handle = H>>(&mut self, engine: &mut E) -> Result<()> {
        if self.state != ChannelState::Idle {
            return Err(self.illegal("start"));
        }
        engine.start(&mut self.handle)?;
        self.state = ChannelState::Active;
        Ok(())
    }

    pub fn stop<E: DmaEngine<Handle = H>>(&mut self, engine: &mut E) -> Result<()> {
        if self.state != ChannelState::Active {
            return Err(self.illegal("stop"));
        }
        engine.halt(&mut self.handle)?;
        self.state = ChannelState::Idle;
        Ok(())
    }

    pub fn destroy<E: DmaEngine<Handle = H>>(self, engine: &mut E) {
        log::debug!("destroy {:?}", self.role);
        engine.destroy(self.handle);
    }
}

/// The four channels of a session, in [`DmaRole::ALL`] order, plus the
/// engine they came from.
pub struct StreamResources<E: DmaEngine> {
    engine: E,
    channels: Vec<DmaChannel<E::Handle>>,
}

impl<E: DmaEngine> StreamResources<E> {
    /// Create and reset every channel. Whatever was created before a failure
    /// is destroyed again before the error is returned.
    pub fn acquire(engine: E, indices: DmaIndices) -> Result<Self> {
        let mut resources = Self {
            engine,
            channels: Vec::with_capacity(DmaRole::ALL.len()),
        };
        for role in DmaRole::ALL {
            let mut channel = DmaChannel::create(&mut resources.engine, role, indices.index(role))?;
            let reset = channel.reset(&mut resources.engine);
            resources.channels.push(channel);
            reset?;
        }
        Ok(resources)
    }

    pub fn state(&self, role: DmaRole) -> ChannelState {
        self.channels[role.slot()].state()
    }

    pub fn is_active(&self, direction: Direction) -> bool {
        self.channels
            .iter()
            .any(|ch| ch.role().direction() == direction && ch.state() == ChannelState::Active)
    }

    fn pair(direction: Direction) -> [DmaRole; 2] {
        match direction {
            Direction::Rx => [DmaRole::RxData, DmaRole::RxCtrl],
            Direction::Tx => [DmaRole::TxData, DmaRole::TxStat],
        }
    }

    /// Start the data and control/status channels of a direction. If the
    /// second fails to start the first is halted again.
    pub fn activate(&mut self, direction: Direction) -> Result<()> {
        let [first, second] = Self::pair(direction);
        self.channels[first.slot()].start(&mut self.engine)?;
        if let Err(e) = self.channels[second.slot()].start(&mut self.engine) {
            if let Err(halt) = self.channels[first.slot()].stop(&mut self.engine) {
                log::warn!("{:?} halt after failed start: {}", first, halt);
            }
            return Err(e);
        }
        Ok(())
    }

    /// Stop whichever channels of a direction are running.
    pub fn deactivate(&mut self, direction: Direction) -> Result<()> {
        for role in Self::pair(direction) {
            let channel = &mut self.channels[role.slot()];
            if channel.state() == ChannelState::Active {
                channel.stop(&mut self.engine)?;
            }
        }
        Ok(())
    }
}

impl<E: DmaEngine> Drop for StreamResources<E> {
    fn drop(&mut self) {
        for channel in self.channels.drain(..) {
            channel.destroy(&mut self.engine);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{Fault, MockDma, Rig};

    const INDICES: DmaIndices = DmaIndices { rx: 0, tx: 1 };

    #[test]
    fn role_mapping() {
        assert_eq!(INDICES.index(DmaRole::RxCtrl), 0);
        assert_eq!(INDICES.index(DmaRole::TxStat), 1);
        assert_eq!(DmaRole::RxData.transfer(), DmaDirection::S2mm);
        assert_eq!(DmaRole::RxCtrl.transfer(), DmaDirection::Mm2s);
        assert_eq!(DmaRole::TxData.transfer(), DmaDirection::Mm2s);
        assert_eq!(DmaRole::TxStat.transfer(), DmaDirection::S2mm);
    }

    #[test]
    fn acquire_creates_in_order() {
        let rig = Rig::default();
        let res = StreamResources::acquire(MockDma::new(&rig), INDICES).unwrap();
        assert_eq!(
            rig.events_with("dma create"),
            vec!["dma create 0 S2mm", "dma create 0 Mm2s", "dma create 1 Mm2s", "dma create 1 S2mm"]
        );
        for role in DmaRole::ALL {
            assert_eq!(res.state(role), ChannelState::Idle);
        }
        assert_eq!(rig.live_dma(), 4);
        drop(res);
        assert_eq!(rig.live_dma(), 0);
        assert_eq!(rig.count("dma destroy"), 4);
    }

    #[test]
    fn partial_acquire_rolls_back() {
        for n in 0..4 {
            let rig = Rig::default();
            rig.inject(Fault::DmaCreate(n));
            let err = StreamResources::acquire(MockDma::new(&rig), INDICES).err().unwrap();
            assert!(matches!(err, Error::ChannelUnavailable(role) if role == DmaRole::ALL[n]));
            assert_eq!(rig.live_dma(), 0, "leak after failing channel {}", n);
            assert_eq!(rig.count("dma destroy"), n);
        }
    }

    #[test]
    fn failed_reset_rolls_back() {
        let rig = Rig::default();
        rig.inject(Fault::DmaReset(2));
        assert!(StreamResources::acquire(MockDma::new(&rig), INDICES).is_err());
        assert_eq!(rig.live_dma(), 0);
        assert_eq!(rig.count("dma destroy"), 3);
    }

    #[test]
    fn activation_pairs() {
        let rig = Rig::default();
        let mut res = StreamResources::acquire(MockDma::new(&rig), INDICES).unwrap();
        res.activate(Direction::Rx).unwrap();
        assert_eq!(res.state(DmaRole::RxData), ChannelState::Active);
        assert_eq!(res.state(DmaRole::RxCtrl), ChannelState::Active);
        assert!(!res.is_active(Direction::Tx));

        let err = res.activate(Direction::Rx).unwrap_err();
        assert!(matches!(
            err,
            Error::ChannelState {
                role: DmaRole::RxData,
                state: ChannelState::Active,
                ..
            }
        ));

        res.deactivate(Direction::Rx).unwrap();
        assert!(!res.is_active(Direction::Rx));
        // Nothing running, nothing to do
        res.deactivate(Direction::Rx).unwrap();
        assert_eq!(rig.count("dma halt"), 2);
    }

    #[test]
    fn failed_start_halts_partner() {
        let rig = Rig::default();
        let mut res = StreamResources::acquire(MockDma::new(&rig), INDICES).unwrap();
        rig.inject(Fault::DmaStart(1));
        assert!(res.activate(Direction::Tx).is_err());
        assert_eq!(res.state(DmaRole::TxData), ChannelState::Idle);
        assert_eq!(res.state(DmaRole::TxStat), ChannelState::Idle);
    }

    #[test]
    fn channel_transitions() {
        let rig = Rig::default();
        let mut engine = MockDma::new(&rig);
        let mut ch = DmaChannel::create(&mut engine, DmaRole::TxData, 1).unwrap();
        assert_eq!(ch.state(), ChannelState::Created);
        assert!(ch.start(&mut engine).is_err());
        assert!(ch.stop(&mut engine).is_err());

        ch.reset(&mut engine).unwrap();
        ch.reset(&mut engine).unwrap();
        assert_eq!(ch.state(), ChannelState::Idle);
        assert!(ch.stop(&mut engine).is_err());

        ch.start(&mut engine).unwrap();
        ch.reset(&mut engine).unwrap();
        assert_eq!(ch.state(), ChannelState::Idle);
        ch.destroy(&mut engine);
        assert_eq!(rig.live_dma(), 0);
    }

    #[test]
    fn claimed_engine_unavailable() {
        let rig = Rig::default();
        let mut engine = MockDma::new(&rig);
        let first = DmaChannel::create(&mut engine, DmaRole::RxData, 0).unwrap();
        let second = DmaChannel::create(&mut engine, DmaRole::RxData, 0);
        assert!(matches!(second, Err(Error::ChannelUnavailable(DmaRole::RxData))));
        first.destroy(&mut engine);
    }
}
