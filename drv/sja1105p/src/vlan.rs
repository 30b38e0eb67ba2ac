// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! VLAN forwarding domains spanning a cascade
//!
//! A VLAN is requested in terms of logical ports. Each switch only knows
//! about its own five ports, so the request is turned into one VLAN lookup
//! entry per switch, and the links between switches are opened wherever
//! traffic has to cross them.
//!
//! Only links that touch the stretch of the chain holding member or
//! broadcast ports are opened. On such a link, frames flow towards the next
//! switch while that switch is not past the last member ("downstream": the
//! cascade port broadcasts, the next host port admits). Frames flow back
//! from the next switch once the link is at or past the first broadcast
//! port ("upstream": the next host port broadcasts, the cascade port
//! admits). Inter-switch links are always tagged so that the VLAN survives
//! the hop.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::dyncfg;
use crate::{
    Outcome, PortMap, Sja1105Cascade, Sja1105Error, Sja1105Rw,
    MAX_LOGICAL_PORTS, MAX_SWITCHES, N_PORTS,
};

/// Largest VLAN ID
pub const MAX_VLAN_ID: u16 = 4095;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForwardingMode {
    /// Frames leave this port with a VLAN tag
    Tagged,
    /// Frames leave this port with the VLAN tag stripped
    Untagged,
    /// The VLAN is never sent out of this port
    NotForwarded,
}

/// A set of logical ports, one bit per port
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct LogicalPortSet(u32);

const _: () = assert!(MAX_LOGICAL_PORTS <= u32::BITS as usize);

impl LogicalPortSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Adds a port, returning `false` if it is out of range.
    pub fn insert(&mut self, port: u8) -> bool {
        match 1u32.checked_shl(u32::from(port)) {
            Some(bit) => {
                self.0 |= bit;
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, port: u8) -> bool {
        1u32.checked_shl(u32::from(port))
            .map(|bit| self.0 & bit != 0)
            .unwrap_or(false)
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = u8> {
        let bits = self.0;
        (0..u32::BITS as u8).filter(move |i| bits & (1 << i) != 0)
    }
}

impl FromIterator<u8> for LogicalPortSet {
    fn from_iter<I: IntoIterator<Item = u8>>(iter: I) -> Self {
        let mut s = Self::empty();
        for p in iter {
            s.insert(p);
        }
        s
    }
}

/// Port masks for one VLAN on one switch, one bit per physical port
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SwitchVlanMasks {
    pub tag_port: u8,
    pub vlan_bc: u8,
    pub vmemb_port: u8,
}

impl SwitchVlanMasks {
    fn is_member(&self) -> bool {
        self.vmemb_port != 0
    }

    fn is_broadcast(&self) -> bool {
        self.vlan_bc != 0
    }
}

/// Inclusive range of switch indices
fn span(
    masks: &[SwitchVlanMasks],
    f: impl Fn(&SwitchVlanMasks) -> bool,
) -> Option<(usize, usize)> {
    let first = masks.iter().position(&f)?;
    let last = masks.iter().rposition(&f)?;
    Some((first, last))
}

/// Smallest span covering both `a` and `b`
fn union(
    a: Option<(usize, usize)>,
    b: Option<(usize, usize)>,
) -> Option<(usize, usize)> {
    match (a, b) {
        (Some((f0, l0)), Some((f1, l1))) => Some((f0.min(f1), l0.max(l1))),
        (a, None) => a,
        (None, b) => b,
    }
}

/// Returns the mask bit for a physical port, or `None` if there is no such
/// port.
fn port_bit(port: u8) -> Option<u8> {
    if usize::from(port) < N_PORTS {
        Some(1 << port)
    } else {
        None
    }
}

/// Per-switch VLAN lookup masks that together implement one logical VLAN
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForwardingDomain {
    masks: [SwitchVlanMasks; MAX_SWITCHES],
    count: usize,
}

impl ForwardingDomain {
    /// Computes the masks for every switch in `map`.
    ///
    /// `modes` is indexed by logical port; ports past its end are not
    /// forwarded to. Ports in `enabled` may receive the VLAN. Logical ports
    /// beyond the map's logical port count, or that cannot be mapped onto a
    /// physical port, are recorded in `outcome` and otherwise ignored.
    pub fn compute<P: PortMap>(
        map: &P,
        modes: &[ForwardingMode],
        enabled: LogicalPortSet,
        outcome: &mut Outcome,
    ) -> Self {
        let count = map.switch_count().min(MAX_SWITCHES);
        let logical_ports = map.logical_port_count();
        let mut masks = [SwitchVlanMasks::default(); MAX_SWITCHES];

        let locate = |logical: usize, outcome: &mut Outcome| {
            let l = u8::try_from(logical).unwrap_or(u8::MAX);
            let p = (logical < logical_ports)
                .then(|| map.physical_port(l))
                .flatten();
            let found = p.and_then(|p| {
                let bit = port_bit(p.port)?;
                (usize::from(p.switch) < count)
                    .then_some((usize::from(p.switch), bit))
            });
            if found.is_none() {
                outcome.fail(Sja1105Error::UnknownLogicalPort(l));
            }
            found
        };

        for (logical, mode) in modes.iter().enumerate() {
            if *mode == ForwardingMode::NotForwarded {
                continue;
            }
            if let Some((switch, bit)) = locate(logical, outcome) {
                masks[switch].vlan_bc |= bit;
                if *mode == ForwardingMode::Tagged {
                    masks[switch].tag_port |= bit;
                }
            }
        }
        for logical in enabled.iter() {
            if let Some((switch, bit)) = locate(usize::from(logical), outcome) {
                masks[switch].vmemb_port |= bit;
            }
        }

        let members = span(&masks[..count], SwitchVlanMasks::is_member);
        let broadcast = span(&masks[..count], SwitchVlanMasks::is_broadcast);
        debug!("VLAN spans: members {members:?}, broadcast {broadcast:?}");
        let Some((first, last)) = union(members, broadcast) else {
            return Self { masks, count };
        };

        for link in 0..count.saturating_sub(1) {
            let next = link + 1;
            if next < first || link > last {
                continue;
            }
            let down = members.is_some_and(|(_, last)| link < last);
            let up = broadcast.is_some_and(|(first, _)| link >= first);
            if !down && !up {
                continue;
            }
            let cascade = map.cascade_port(link as u8).and_then(port_bit);
            let host = map.host_port(next as u8).and_then(port_bit);
            let (Some(cascade), Some(host)) = (cascade, host) else {
                warn!("no link between switches {link} and {next}");
                continue;
            };

            if down {
                masks[link].vlan_bc |= cascade;
                masks[link].tag_port |= cascade;
                masks[next].vmemb_port |= host;
                masks[next].tag_port |= host;
            }
            if up {
                masks[link].vmemb_port |= cascade;
                masks[link].tag_port |= cascade;
                masks[next].vlan_bc |= host;
                masks[next].tag_port |= host;
            }
        }

        Self { masks, count }
    }

    pub fn masks(&self) -> &[SwitchVlanMasks] {
        &self.masks[..self.count]
    }
}

impl<R: Sja1105Rw, P: PortMap> Sja1105Cascade<'_, R, P> {
    /// Configures `vlan_id` on every switch of the cascade.
    ///
    /// Each switch's entry is read first so that its mirroring settings
    /// survive. Failures on one switch do not stop the others; all of them
    /// are tallied in the returned [`Outcome`].
    pub fn write_vlan_config(
        &self,
        vlan_id: u16,
        modes: &[ForwardingMode],
        enabled: LogicalPortSet,
    ) -> Outcome {
        let mut outcome = Outcome::new();
        let domain =
            ForwardingDomain::compute(self.map, modes, enabled, &mut outcome);

        for (device, m) in domain.masks().iter().enumerate() {
            let device = device as u8;
            let mut entry = outcome
                .record(dyncfg::read_vlan_lookup(self.rw, device, vlan_id))
                .flatten()
                .unwrap_or_default();
            entry.vlanid = vlan_id;
            entry.tag_port = m.tag_port;
            entry.vlan_bc = m.vlan_bc;
            entry.vmemb_port = m.vmemb_port;
            outcome.record(dyncfg::write_vlan_lookup(
                self.rw, device, &entry, true,
            ));
        }
        outcome
    }

    /// Removes `vlan_id` from every switch of the cascade.
    pub fn remove_vlan(&self, vlan_id: u16) -> Outcome {
        let mut outcome = Outcome::new();
        let entry = crate::registers::VlanLookupEntry {
            vlanid: vlan_id,
            ..Default::default()
        };
        for device in 0..self.switch_count().min(MAX_SWITCHES) {
            outcome.record(dyncfg::write_vlan_lookup(
                self.rw,
                device as u8,
                &entry,
                false,
            ));
        }
        outcome
    }
}
