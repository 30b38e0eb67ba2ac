// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Dynamic reconfiguration of switch tables
//!
//! Each reconfigurable table is reached through an entry register followed
//! directly by a control word. A command is issued by writing both in one
//! burst with the control word's `valid` bit set; the switch clears `valid`
//! once it has carried the command out. For reads, the entry register then
//! holds the table contents, and `valident` says whether the entry was in
//! use.

use log::trace;
use wordpack::Layout;

use crate::registers::{
    L2LookupCtrl, L2LookupEntry, RetaggingCtrl, RetaggingEntry, VlanLookupCtrl,
    VlanLookupEntry, L2_LOOKUP_CTRL, L2_LOOKUP_ENTRY, RETAGGING_CTRL,
    RETAGGING_ENTRY, VLAN_LOOKUP_CTRL, VLAN_LOOKUP_ENTRY,
};
use crate::{pack, RegisterAddress, Sja1105Error, Sja1105Rw};

/// Number of control word polls before giving up on a command
const POLL_ATTEMPTS: usize = 32;

/// Control word of a dynamically reconfigurable table
trait DynCtrl: Layout {
    fn command(write: bool, valident: bool) -> Self;

    /// The switch has not yet finished the last command
    fn busy(&self) -> bool;

    /// The entry read back (or written) is in use
    fn entry_valid(&self) -> bool;

    fn failed(&self) -> bool {
        false
    }
}

impl DynCtrl for VlanLookupCtrl {
    fn command(write: bool, valident: bool) -> Self {
        Self {
            valid: true,
            rdwrset: write,
            valident,
        }
    }
    fn busy(&self) -> bool {
        self.valid
    }
    fn entry_valid(&self) -> bool {
        self.valident
    }
}

impl DynCtrl for RetaggingCtrl {
    fn command(write: bool, valident: bool) -> Self {
        Self {
            valid: true,
            rdwrset: write,
            valident,
            ..Default::default()
        }
    }
    fn busy(&self) -> bool {
        self.valid
    }
    fn entry_valid(&self) -> bool {
        self.valident
    }
    fn failed(&self) -> bool {
        self.errors
    }
}

impl DynCtrl for L2LookupCtrl {
    fn command(write: bool, valident: bool) -> Self {
        Self {
            valid: true,
            rdwrset: write,
            valident,
            ..Default::default()
        }
    }
    fn busy(&self) -> bool {
        self.valid
    }
    fn entry_valid(&self) -> bool {
        self.valident
    }
    fn failed(&self) -> bool {
        self.errors
    }
}

/// Writes an entry and its control word in one burst, then polls the control
/// word until the switch is done with the command.
fn commit<R, E, C>(
    rw: &R,
    device: u8,
    entry_reg: RegisterAddress<E>,
    entry: &E,
    ctrl_reg: RegisterAddress<C>,
    ctrl: &C,
) -> Result<C, Sja1105Error>
where
    R: Sja1105Rw,
    E: Layout,
    C: DynCtrl,
{
    debug_assert_eq!(entry_reg.addr + E::WORDS as u32, ctrl_reg.addr);

    let mut buf = [0; 8];
    let buf = &mut buf[..E::WORDS + C::WORDS];
    let (e, c) = buf.split_at_mut(E::WORDS);
    pack(entry, e)?;
    pack(ctrl, c)?;
    rw.write_words(device, entry_reg.addr, buf)?;

    for _ in 0..POLL_ATTEMPTS {
        let c = rw.read(device, ctrl_reg)?;
        if !c.busy() {
            if c.failed() {
                return Err(Sja1105Error::DynamicConfigFailed {
                    addr: ctrl_reg.addr,
                });
            }
            return Ok(c);
        }
    }
    Err(Sja1105Error::DynamicConfigTimeout {
        addr: ctrl_reg.addr,
    })
}

/// Reads the VLAN lookup entry for `vlanid`, returning `None` if that VLAN
/// is not configured on the switch.
pub fn read_vlan_lookup<R: Sja1105Rw>(
    rw: &R,
    device: u8,
    vlanid: u16,
) -> Result<Option<VlanLookupEntry>, Sja1105Error> {
    trace!("dev {device}: read VLAN {vlanid}");
    let entry = VlanLookupEntry {
        vlanid,
        ..Default::default()
    };
    let ctrl = commit(
        rw,
        device,
        VLAN_LOOKUP_ENTRY,
        &entry,
        VLAN_LOOKUP_CTRL,
        &VlanLookupCtrl::command(false, false),
    )?;
    if ctrl.entry_valid() {
        rw.read(device, VLAN_LOOKUP_ENTRY).map(Some)
    } else {
        Ok(None)
    }
}

/// Writes a VLAN lookup entry. With `valid` false, the VLAN is removed.
pub fn write_vlan_lookup<R: Sja1105Rw>(
    rw: &R,
    device: u8,
    entry: &VlanLookupEntry,
    valid: bool,
) -> Result<(), Sja1105Error> {
    trace!("dev {device}: write VLAN {} ({valid})", entry.vlanid);
    commit(
        rw,
        device,
        VLAN_LOOKUP_ENTRY,
        entry,
        VLAN_LOOKUP_CTRL,
        &VlanLookupCtrl::command(true, valid),
    )
    .map(|_| ())
}

pub fn read_retagging<R: Sja1105Rw>(
    rw: &R,
    device: u8,
    index: u8,
) -> Result<Option<RetaggingEntry>, Sja1105Error> {
    let ctrl = RetaggingCtrl {
        index,
        ..RetaggingCtrl::command(false, false)
    };
    let ctrl = commit(
        rw,
        device,
        RETAGGING_ENTRY,
        &RetaggingEntry::default(),
        RETAGGING_CTRL,
        &ctrl,
    )?;
    if ctrl.entry_valid() {
        rw.read(device, RETAGGING_ENTRY).map(Some)
    } else {
        Ok(None)
    }
}

/// Writes retagging table entry `index`. With `valid` false, the entry is
/// disabled.
pub fn write_retagging<R: Sja1105Rw>(
    rw: &R,
    device: u8,
    index: u8,
    entry: &RetaggingEntry,
    valid: bool,
) -> Result<(), Sja1105Error> {
    trace!("dev {device}: write retagging entry {index} ({valid})");
    let ctrl = RetaggingCtrl {
        index,
        ..RetaggingCtrl::command(true, valid)
    };
    commit(rw, device, RETAGGING_ENTRY, entry, RETAGGING_CTRL, &ctrl)
        .map(|_| ())
}

/// Reads L2 address lookup entry `index`
pub fn read_l2_lookup<R: Sja1105Rw>(
    rw: &R,
    device: u8,
    index: u16,
) -> Result<Option<L2LookupEntry>, Sja1105Error> {
    let entry = L2LookupEntry {
        index,
        ..Default::default()
    };
    let ctrl = commit(
        rw,
        device,
        L2_LOOKUP_ENTRY,
        &entry,
        L2_LOOKUP_CTRL,
        &L2LookupCtrl::command(false, false),
    )?;
    if ctrl.entry_valid() {
        rw.read(device, L2_LOOKUP_ENTRY).map(Some)
    } else {
        Ok(None)
    }
}

/// Writes an L2 address lookup entry at `entry.index`
pub fn write_l2_lookup<R: Sja1105Rw>(
    rw: &R,
    device: u8,
    entry: &L2LookupEntry,
    valid: bool,
) -> Result<(), Sja1105Error> {
    trace!("dev {device}: write FDB entry {} ({valid})", entry.index);
    commit(
        rw,
        device,
        L2_LOOKUP_ENTRY,
        entry,
        L2_LOOKUP_CTRL,
        &L2LookupCtrl::command(true, valid),
    )
    .map(|_| ())
}
