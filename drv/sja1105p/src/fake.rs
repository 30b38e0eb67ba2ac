// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-memory switch cascade for unit tests

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};

use wordpack::Layout;

use crate::blocks::{crc_words, SCHEMA};
use crate::registers::{
    L2LookupCtrl, L2LookupEntry, RetaggingCtrl, RetaggingEntry,
    VlanLookupCtrl, VlanLookupEntry, DEVICE_ID, L2_LOOKUP_CTRL,
    L2_LOOKUP_ENTRY, PROD_ID, RETAGGING_CTRL, RETAGGING_ENTRY,
    STATIC_CONFIG_STATUS, VLAN_LOOKUP_CTRL, VLAN_LOOKUP_ENTRY,
};
use crate::spi::SpiError;
use crate::{
    CascadeConfig, DeviceId, PartNumber, PhysicalPort, Sja1105Error,
    Sja1105Rw, SwitchConfig,
};

type Table = RefCell<HashMap<(u8, u32), Vec<u32>>>;

/// A register file per switch, which also carries out dynamic
/// reconfiguration commands the way the hardware does.
pub struct FakeSwitch {
    switches: usize,
    mem: RefCell<HashMap<(u8, u32), u32>>,
    vlans: Table,
    retagging: Table,
    fdb: Table,
    failing: RefCell<HashSet<u8>>,
    /// Commands are never completed
    stuck: Cell<bool>,
    /// Commands complete with the error flag set
    reject: Cell<bool>,
    writes: RefCell<Vec<(u8, u32, usize)>>,
}

impl FakeSwitch {
    /// Builds a cascade of SJA1105P switches with a passing configuration
    /// status.
    pub fn new(switches: usize) -> Self {
        let s = Self {
            switches,
            mem: Default::default(),
            vlans: Default::default(),
            retagging: Default::default(),
            fdb: Default::default(),
            failing: Default::default(),
            stuck: Cell::new(false),
            reject: Cell::new(false),
            writes: Default::default(),
        };
        for d in 0..switches as u8 {
            s.poke(d, DEVICE_ID.addr, DeviceId::Sja1105PR as u32);
            s.poke(d, PROD_ID.addr, (PartNumber::Sja1105P as u32) << 4);
            s.poke(d, STATIC_CONFIG_STATUS.addr, 0x8000_0000);
        }
        s
    }

    pub fn peek(&self, device: u8, addr: u32) -> u32 {
        self.mem.borrow().get(&(device, addr)).copied().unwrap_or(0)
    }

    pub fn poke(&self, device: u8, addr: u32, value: u32) {
        self.mem.borrow_mut().insert((device, addr), value);
    }

    fn peek_range(&self, device: u8, addr: u32, n: usize) -> Vec<u32> {
        (0..n as u32).map(|i| self.peek(device, addr + i)).collect()
    }

    fn poke_layout<T: Layout>(&self, device: u8, addr: u32, value: &T) {
        let mut words = vec![0; T::WORDS];
        value.pack(&mut words);
        for (i, w) in words.into_iter().enumerate() {
            self.poke(device, addr + i as u32, w);
        }
    }

    /// Makes every later access to `device` fail
    pub fn fail_device(&self, device: u8) {
        self.failing.borrow_mut().insert(device);
    }

    pub fn set_stuck(&self, stuck: bool) {
        self.stuck.set(stuck);
    }

    pub fn set_reject(&self, reject: bool) {
        self.reject.set(reject);
    }

    /// Every successful write, as `(device, address, length)`
    pub fn writes(&self) -> Vec<(u8, u32, usize)> {
        self.writes.borrow().clone()
    }

    pub fn write_count(&self) -> usize {
        self.writes.borrow().len()
    }

    fn check(&self, device: u8) -> Result<(), Sja1105Error> {
        if usize::from(device) >= self.switches {
            Err(SpiError::NoDevice.into())
        } else if self.failing.borrow().contains(&device) {
            Err(SpiError::BusFault.into())
        } else {
            Ok(())
        }
    }

    /// Reads or writes one table entry, returning whether the entry is in
    /// use afterwards.
    fn execute(
        &self,
        table: &Table,
        device: u8,
        key: u32,
        entry: (u32, usize),
        write: bool,
        valident: bool,
    ) -> bool {
        let mut table = table.borrow_mut();
        if write {
            if valident {
                let words = self.peek_range(device, entry.0, entry.1);
                table.insert((device, key), words);
            } else {
                table.remove(&(device, key));
            }
            valident
        } else if let Some(words) = table.get(&(device, key)) {
            for (i, w) in words.iter().enumerate() {
                self.poke(device, entry.0 + i as u32, *w);
            }
            true
        } else {
            false
        }
    }

    fn run_vlan(&self, device: u8) {
        let ctrl = VlanLookupCtrl::unpack(&[self.peek(device, VLAN_LOOKUP_CTRL.addr)]);
        if !ctrl.valid || self.stuck.get() {
            return;
        }
        let entry = (VLAN_LOOKUP_ENTRY.addr, VlanLookupEntry::WORDS);
        let key = VlanLookupEntry::unpack(&self.peek_range(device, entry.0, entry.1))
            .vlanid;
        let valident = self.execute(
            &self.vlans,
            device,
            u32::from(key),
            entry,
            ctrl.rdwrset,
            ctrl.valident,
        );
        self.poke_layout(
            device,
            VLAN_LOOKUP_CTRL.addr,
            &VlanLookupCtrl {
                valid: false,
                valident,
                ..ctrl
            },
        );
    }

    fn run_retagging(&self, device: u8) {
        let ctrl = RetaggingCtrl::unpack(&[self.peek(device, RETAGGING_CTRL.addr)]);
        if !ctrl.valid || self.stuck.get() {
            return;
        }
        let mut reply = RetaggingCtrl {
            valid: false,
            ..ctrl
        };
        if self.reject.get() {
            reply.errors = true;
        } else {
            reply.valident = self.execute(
                &self.retagging,
                device,
                u32::from(ctrl.index),
                (RETAGGING_ENTRY.addr, RetaggingEntry::WORDS),
                ctrl.rdwrset,
                ctrl.valident,
            );
        }
        self.poke_layout(device, RETAGGING_CTRL.addr, &reply);
    }

    fn run_fdb(&self, device: u8) {
        let ctrl = L2LookupCtrl::unpack(&[self.peek(device, L2_LOOKUP_CTRL.addr)]);
        if !ctrl.valid || self.stuck.get() {
            return;
        }
        let mut reply = L2LookupCtrl {
            valid: false,
            ..ctrl
        };
        if self.reject.get() {
            reply.errors = true;
        } else {
            let entry = (L2_LOOKUP_ENTRY.addr, L2LookupEntry::WORDS);
            let key = L2LookupEntry::unpack(&self.peek_range(device, entry.0, entry.1))
                .index;
            reply.valident = self.execute(
                &self.fdb,
                device,
                u32::from(key),
                entry,
                ctrl.rdwrset,
                ctrl.valident,
            );
        }
        self.poke_layout(device, L2_LOOKUP_CTRL.addr, &reply);
    }
}

impl Sja1105Rw for FakeSwitch {
    fn read_words(
        &self,
        device: u8,
        addr: u32,
        buf: &mut [u32],
    ) -> Result<(), Sja1105Error> {
        self.check(device)?;
        for (i, w) in buf.iter_mut().enumerate() {
            *w = self.peek(device, addr + i as u32);
        }
        Ok(())
    }

    fn write_words(
        &self,
        device: u8,
        addr: u32,
        words: &[u32],
    ) -> Result<(), Sja1105Error> {
        self.check(device)?;
        self.writes.borrow_mut().push((device, addr, words.len()));
        for (i, w) in words.iter().enumerate() {
            self.poke(device, addr + i as u32, *w);
        }

        let touched = addr..addr + words.len() as u32;
        if touched.contains(&VLAN_LOOKUP_CTRL.addr) {
            self.run_vlan(device);
        }
        if touched.contains(&RETAGGING_CTRL.addr) {
            self.run_retagging(device);
        }
        if touched.contains(&L2_LOOKUP_CTRL.addr) {
            self.run_fdb(device);
        }
        Ok(())
    }
}

/// A cascade of `n` switches where switch `s` exposes ports 1 to 3 as
/// logical ports `3s` to `3s + 2`, with port 0 as host port and port 4 as
/// cascade port.
pub fn test_config(n: usize) -> CascadeConfig {
    let mut c = CascadeConfig::default();
    for s in 0..n {
        c.switches
            .push(SwitchConfig {
                host_port: (s > 0).then_some(0),
                cascade_port: (s + 1 < n).then_some(4),
            })
            .unwrap();
        for port in 1..=3 {
            c.logical_ports
                .push(PhysicalPort {
                    switch: s as u8,
                    port,
                })
                .unwrap();
        }
    }
    c.validate().unwrap();
    c
}

/// A configuration stream holding one block of each mandatory type, with
/// valid CRCs throughout.
pub fn config_stream(device: DeviceId) -> Vec<u32> {
    let mut words = vec![device as u32];
    for s in SCHEMA.iter().filter(|s| s.mandatory) {
        let size = if s.words == 0 { 2 } else { s.words };
        let header = [(s.id as u32) << 24, size as u32];
        words.extend_from_slice(&header);
        words.push(crc_words(&header));
        let body: Vec<u32> = (0..size as u32).map(|i| i ^ 0x5a5a_0000).collect();
        words.extend_from_slice(&body);
        words.push(crc_words(&body));
    }
    words.extend_from_slice(&[0, 0]);
    words.push(crc_words(&words));
    words
}
