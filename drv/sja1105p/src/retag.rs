// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Retagging table management
//!
//! The retagging table serves two features keyed by VLAN: retagging (frames
//! of one VLAN leave selected ports as another VLAN) and bypassing (frames
//! of a VLAN are sent to fixed destination ports, optionally without source
//! learning). Both share the table's entries, so a VLAN that uses both
//! occupies a single slot. The same slot index is used on every switch of
//! the cascade, each switch getting the ports that belong to it.

use core::fmt;

use log::debug;

use crate::dyncfg;
use crate::registers::RetaggingEntry;
use crate::vlan::LogicalPortSet;
use crate::{
    Outcome, PortMap, Sja1105Cascade, Sja1105Error, Sja1105Rw, MAX_SWITCHES,
    N_PORTS,
};

/// Number of entries in the retagging table
pub const N_RETAG_ENTRIES: usize = 32;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RetagError {
    /// Every slot is in use by another VLAN
    Exhausted,
    /// The VLAN has no active slot of the requested kind
    NotFound(u16),
    /// At least one step of the update failed. The table still reflects the
    /// requested state, so a later call for the same VLAN retries it.
    Transport(Outcome),
}

impl fmt::Display for RetagError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted => write!(f, "retagging table is full"),
            Self::NotFound(v) => write!(f, "VLAN {v} has no retagging slot"),
            Self::Transport(o) => write!(
                f,
                "{} of {} retagging table updates failed",
                o.failures(),
                o.attempts()
            ),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SlotState {
    Free,
    RetaggingOnly,
    BypassingOnly,
    Both,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
struct Retagging {
    ingress_ports: [u8; MAX_SWITCHES],
    egress_ports: [u8; MAX_SWITCHES],
    ingress_vlan: u16,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
struct Bypassing {
    dest_ports: [u8; MAX_SWITCHES],
    no_learn: bool,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
struct Slot {
    /// Only meaningful while the slot is not free
    vlan: u16,
    retagging: Option<Retagging>,
    bypassing: Option<Bypassing>,
}

impl Slot {
    const FREE: Self = Self {
        vlan: 0,
        retagging: None,
        bypassing: None,
    };

    fn state(&self) -> SlotState {
        match (self.retagging.is_some(), self.bypassing.is_some()) {
            (false, false) => SlotState::Free,
            (true, false) => SlotState::RetaggingOnly,
            (false, true) => SlotState::BypassingOnly,
            (true, true) => SlotState::Both,
        }
    }

    fn is_free(&self) -> bool {
        self.state() == SlotState::Free
    }

    /// Builds the table entry for one switch
    fn entry(&self, switch: usize) -> RetaggingEntry {
        let mut e = RetaggingEntry {
            vlan_egr: self.vlan,
            vlan_ing: self.vlan,
            ..Default::default()
        };
        if let Some(r) = &self.retagging {
            e.ing_port = r.ingress_ports[switch];
            e.egr_port = r.egress_ports[switch];
            e.vlan_ing = r.ingress_vlan;
        }
        if let Some(b) = &self.bypassing {
            e.use_dest_ports = true;
            e.destports = b.dest_ports[switch];
            e.do_not_learn = b.no_learn;
        }
        e
    }
}

/// Splits a set of logical ports into one port mask per switch
fn switch_masks<P: PortMap>(
    map: &P,
    ports: LogicalPortSet,
    outcome: &mut Outcome,
) -> [u8; MAX_SWITCHES] {
    let mut masks = [0; MAX_SWITCHES];
    for logical in ports.iter() {
        match map.physical_port(logical) {
            Some(p)
                if usize::from(p.switch) < MAX_SWITCHES
                    && usize::from(p.port) < N_PORTS =>
            {
                masks[usize::from(p.switch)] |= 1 << p.port;
            }
            _ => outcome.fail(Sja1105Error::UnknownLogicalPort(logical)),
        }
    }
    masks
}

/// Host-side copy of the retagging table, shared by every switch in a
/// cascade
#[derive(Clone, Debug)]
pub struct RetagTable {
    slots: [Slot; N_RETAG_ENTRIES],
}

impl Default for RetagTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RetagTable {
    pub const fn new() -> Self {
        Self {
            slots: [Slot::FREE; N_RETAG_ENTRIES],
        }
    }

    /// Returns the active slot for `vlan`, if any
    pub fn slot_of(&self, vlan: u16) -> Option<usize> {
        self.slots.iter().position(|s| !s.is_free() && s.vlan == vlan)
    }

    pub fn state(&self, index: usize) -> Option<SlotState> {
        self.slots.get(index).map(Slot::state)
    }

    /// Returns the slot already serving `vlan`, or else the first free one.
    ///
    /// This does not claim the slot or record `vlan` in it: a slot is free
    /// exactly while neither retagging nor bypassing is enabled in it, and
    /// only [`Self::start_retagging`] or [`Self::enable_bypassing`] enable
    /// them. Calling this repeatedly for different VLANs therefore keeps
    /// returning the same free slot, and `Exhausted` only comes back once
    /// every slot is in use.
    pub fn find_or_allocate_slot(
        &self,
        vlan: u16,
    ) -> Result<usize, RetagError> {
        self.slot_of(vlan)
            .or_else(|| self.slots.iter().position(Slot::is_free))
            .ok_or(RetagError::Exhausted)
    }

    /// Rewrites slot `index` on every switch, releasing it if it has become
    /// free.
    fn sync<R: Sja1105Rw, P: PortMap>(
        &mut self,
        cascade: &Sja1105Cascade<'_, R, P>,
        index: usize,
        mut outcome: Outcome,
    ) -> Result<(), RetagError> {
        let slot = self.slots[index];
        let valid = !slot.is_free();
        debug!(
            "retag slot {index}: VLAN {} -> {:?}",
            slot.vlan,
            slot.state()
        );

        for switch in 0..cascade.switch_count().min(MAX_SWITCHES) {
            let entry = if valid {
                slot.entry(switch)
            } else {
                RetaggingEntry::default()
            };
            outcome.record(dyncfg::write_retagging(
                cascade.rw,
                switch as u8,
                index as u8,
                &entry,
                valid,
            ));
        }
        if !valid {
            self.slots[index] = Slot::FREE;
        }
        outcome.into_result().map_err(RetagError::Transport)
    }

    /// Starts retagging `egress_vlan` to `ingress_vlan`, returning the slot
    /// used.
    pub fn start_retagging<R: Sja1105Rw, P: PortMap>(
        &mut self,
        cascade: &Sja1105Cascade<'_, R, P>,
        ingress_ports: LogicalPortSet,
        egress_ports: LogicalPortSet,
        ingress_vlan: u16,
        egress_vlan: u16,
    ) -> Result<usize, RetagError> {
        let index = self.find_or_allocate_slot(egress_vlan)?;
        let mut outcome = Outcome::new();
        let retagging = Retagging {
            ingress_ports: switch_masks(cascade.map, ingress_ports, &mut outcome),
            egress_ports: switch_masks(cascade.map, egress_ports, &mut outcome),
            ingress_vlan,
        };
        let slot = &mut self.slots[index];
        slot.vlan = egress_vlan;
        slot.retagging = Some(retagging);
        self.sync(cascade, index, outcome).map(|()| index)
    }

    pub fn stop_retagging<R: Sja1105Rw, P: PortMap>(
        &mut self,
        cascade: &Sja1105Cascade<'_, R, P>,
        egress_vlan: u16,
    ) -> Result<(), RetagError> {
        let index = self
            .slot_of(egress_vlan)
            .filter(|&i| self.slots[i].retagging.is_some())
            .ok_or(RetagError::NotFound(egress_vlan))?;
        self.slots[index].retagging = None;
        self.sync(cascade, index, Outcome::new())
    }

    /// Sends all frames of `vlan` to `dest_ports`, returning the slot used.
    pub fn enable_bypassing<R: Sja1105Rw, P: PortMap>(
        &mut self,
        cascade: &Sja1105Cascade<'_, R, P>,
        vlan: u16,
        dest_ports: LogicalPortSet,
        disable_learning: bool,
    ) -> Result<usize, RetagError> {
        let index = self.find_or_allocate_slot(vlan)?;
        let mut outcome = Outcome::new();
        let bypassing = Bypassing {
            dest_ports: switch_masks(cascade.map, dest_ports, &mut outcome),
            no_learn: disable_learning,
        };
        let slot = &mut self.slots[index];
        slot.vlan = vlan;
        slot.bypassing = Some(bypassing);
        self.sync(cascade, index, outcome).map(|()| index)
    }

    pub fn disable_bypassing<R: Sja1105Rw, P: PortMap>(
        &mut self,
        cascade: &Sja1105Cascade<'_, R, P>,
        vlan: u16,
    ) -> Result<(), RetagError> {
        let index = self
            .slot_of(vlan)
            .filter(|&i| self.slots[i].bypassing.is_some())
            .ok_or(RetagError::NotFound(vlan))?;
        self.slots[index].bypassing = None;
        self.sync(cascade, index, Outcome::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{test_config, FakeSwitch};
    use crate::spi::SpiError;

    fn ports(p: &[u8]) -> LogicalPortSet {
        p.iter().copied().collect()
    }

    #[test]
    fn slot_lifecycle() {
        let fake = FakeSwitch::new(2);
        let config = test_config(2);
        let cascade = Sja1105Cascade::new(&fake, &config);
        let mut table = RetagTable::new();

        let i = table
            .start_retagging(&cascade, ports(&[0]), ports(&[3, 4]), 20, 10)
            .unwrap();
        assert_eq!(i, 0);
        assert_eq!(table.state(0), Some(SlotState::RetaggingOnly));

        let e0 = dyncfg::read_retagging(&fake, 0, 0).unwrap().unwrap();
        assert_eq!((e0.ing_port, e0.egr_port), (0b00010, 0));
        assert_eq!((e0.vlan_ing, e0.vlan_egr), (20, 10));
        let e1 = dyncfg::read_retagging(&fake, 1, 0).unwrap().unwrap();
        assert_eq!((e1.ing_port, e1.egr_port), (0, 0b00110));

        assert_eq!(
            table.enable_bypassing(&cascade, 10, ports(&[5]), true),
            Ok(0)
        );
        assert_eq!(table.state(0), Some(SlotState::Both));
        let e1 = dyncfg::read_retagging(&fake, 1, 0).unwrap().unwrap();
        assert!(e1.use_dest_ports && e1.do_not_learn);
        assert_eq!(e1.destports, 0b01000);
        assert_eq!(e1.egr_port, 0b00110);

        table.stop_retagging(&cascade, 10).unwrap();
        assert_eq!(table.state(0), Some(SlotState::BypassingOnly));
        let e1 = dyncfg::read_retagging(&fake, 1, 0).unwrap().unwrap();
        assert_eq!((e1.ing_port, e1.egr_port), (0, 0));
        assert_eq!((e1.vlan_ing, e1.vlan_egr), (10, 10));
        assert_eq!(table.slot_of(10), Some(0));

        table.disable_bypassing(&cascade, 10).unwrap();
        assert_eq!(table.state(0), Some(SlotState::Free));
        assert_eq!(table.slot_of(10), None);
        assert_eq!(dyncfg::read_retagging(&fake, 0, 0), Ok(None));
        assert_eq!(dyncfg::read_retagging(&fake, 1, 0), Ok(None));
        assert_eq!(table.find_or_allocate_slot(77), Ok(0));
    }

    #[test]
    fn free_slots_are_reused() {
        let fake = FakeSwitch::new(1);
        let config = test_config(1);
        let cascade = Sja1105Cascade::new(&fake, &config);
        let mut table = RetagTable::new();

        for vlan in 1..=3 {
            table
                .enable_bypassing(&cascade, vlan, ports(&[0]), false)
                .unwrap();
        }
        assert_eq!(table.slot_of(2), Some(1));
        table.disable_bypassing(&cascade, 2).unwrap();
        assert_eq!(table.find_or_allocate_slot(99), Ok(1));
        assert_eq!(table.find_or_allocate_slot(3), Ok(2));
        assert_eq!(
            table.enable_bypassing(&cascade, 99, ports(&[1]), false),
            Ok(1)
        );
    }

    #[test]
    fn lookup_does_not_claim() {
        let table = RetagTable::new();
        for vlan in 0..=N_RETAG_ENTRIES as u16 {
            assert_eq!(table.find_or_allocate_slot(vlan), Ok(0));
        }
        assert_eq!(table.state(0), Some(SlotState::Free));
        assert_eq!(table.slot_of(0), None);
    }

    #[test]
    fn exhaustion() {
        let fake = FakeSwitch::new(1);
        let config = test_config(1);
        let cascade = Sja1105Cascade::new(&fake, &config);
        let mut table = RetagTable::new();

        for vlan in 0..N_RETAG_ENTRIES as u16 {
            table
                .enable_bypassing(&cascade, 100 + vlan, ports(&[0]), false)
                .unwrap();
        }
        assert_eq!(
            table.enable_bypassing(&cascade, 500, ports(&[0]), false),
            Err(RetagError::Exhausted)
        );
        assert_eq!(
            table.start_retagging(&cascade, ports(&[0]), ports(&[1]), 1, 500),
            Err(RetagError::Exhausted)
        );
        assert_eq!(
            table.find_or_allocate_slot(500),
            Err(RetagError::Exhausted)
        );
        // A VLAN that already holds a slot can still use it
        assert_eq!(
            table.start_retagging(&cascade, ports(&[0]), ports(&[1]), 1, 131),
            Ok(31)
        );
    }

    #[test]
    fn stopping_what_was_never_started() {
        let fake = FakeSwitch::new(1);
        let config = test_config(1);
        let cascade = Sja1105Cascade::new(&fake, &config);
        let mut table = RetagTable::new();

        assert_eq!(
            table.stop_retagging(&cascade, 8),
            Err(RetagError::NotFound(8))
        );
        table
            .enable_bypassing(&cascade, 8, ports(&[0]), false)
            .unwrap();
        assert_eq!(
            table.stop_retagging(&cascade, 8),
            Err(RetagError::NotFound(8))
        );
        assert_eq!(table.state(0), Some(SlotState::BypassingOnly));
        assert_eq!(table.state(N_RETAG_ENTRIES), None);
    }

    #[test]
    fn transport_failure_keeps_state() {
        let fake = FakeSwitch::new(2);
        let config = test_config(2);
        let cascade = Sja1105Cascade::new(&fake, &config);
        let mut table = RetagTable::new();
        fake.fail_device(1);

        let Err(RetagError::Transport(o)) =
            table.start_retagging(&cascade, ports(&[0]), ports(&[1]), 2, 3)
        else {
            panic!("expected a transport failure");
        };
        assert_eq!((o.attempts(), o.failures()), (2, 1));
        assert_eq!(
            o.first_error(),
            Some(Sja1105Error::SpiError(SpiError::BusFault))
        );
        assert_eq!(table.state(0), Some(SlotState::RetaggingOnly));
        assert!(dyncfg::read_retagging(&fake, 0, 0).unwrap().is_some());
    }

    #[test]
    fn unmapped_ports_are_reported() {
        let fake = FakeSwitch::new(1);
        let config = test_config(1);
        let cascade = Sja1105Cascade::new(&fake, &config);
        let mut table = RetagTable::new();

        let r = table.enable_bypassing(&cascade, 4, ports(&[0, 17]), false);
        let Err(RetagError::Transport(o)) = r else {
            panic!("expected an error, got {r:?}");
        };
        assert_eq!(
            o.first_error(),
            Some(Sja1105Error::UnknownLogicalPort(17))
        );
        let e = dyncfg::read_retagging(&fake, 0, 0).unwrap().unwrap();
        assert_eq!(e.destports, 0b00010);
    }
}
