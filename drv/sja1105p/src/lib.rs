// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Driver core for cascaded NXP SJA1105P/Q/R/S Ethernet switches
//!
//! The switches are configured in two stages. At boot, a vendor-generated
//! static configuration stream is validated ([`blocks`]) and streamed into
//! each chip ([`upload`]). Afterwards, individual table entries are changed
//! through dynamic reconfiguration registers ([`dyncfg`]). Several chips may
//! be chained, each chip's cascade port wired to the next chip's host port;
//! [`vlan`] and [`retag`] turn logical, cascade-wide requests into per-chip
//! table entries.
//!
//! All register access goes through the [`Sja1105Rw`] trait, which is
//! implemented over SPI by [`spi::Sja1105Spi`].

#![cfg_attr(not(test), no_std)]

pub mod blocks;
pub mod config;
pub mod dyncfg;
pub mod registers;
pub mod retag;
pub mod spi;
pub mod upload;
pub mod vlan;

mod error;
#[cfg(test)]
mod fake;

use log::{debug, warn};
use num_traits::FromPrimitive;
use wordpack::Layout;

use crate::registers::{
    port_hl_counters, PortHlCounters, ResetCtrl, DEVICE_ID, PROD_ID,
    RGU_RESET_CTRL,
};

pub use config::{CascadeConfig, PhysicalPort, PortMap, SwitchConfig};
pub use error::{Outcome, Sja1105Error};
pub use registers::{DeviceId, PartNumber, RegisterAddress};

/// Number of ports on each switch
pub const N_PORTS: usize = 5;

/// Maximum number of switches in one cascade
pub const MAX_SWITCHES: usize = 4;

/// Maximum number of logical ports across the cascade
pub const MAX_LOGICAL_PORTS: usize = MAX_SWITCHES * N_PORTS;

/// Largest register layout, in words
const MAX_LAYOUT_WORDS: usize = 8;

/// This trait abstracts over various ways of talking to a cascade of
/// SJA1105 switches.
///
/// `device` selects the switch (its index in the cascade), and addresses are
/// word addresses. Multi-word accesses cover ascending addresses, and must
/// not be torn by the underlying transport.
pub trait Sja1105Rw {
    fn read_words(
        &self,
        device: u8,
        addr: u32,
        buf: &mut [u32],
    ) -> Result<(), Sja1105Error>;

    fn write_words(
        &self,
        device: u8,
        addr: u32,
        words: &[u32],
    ) -> Result<(), Sja1105Error>;

    fn read<T: Layout>(
        &self,
        device: u8,
        reg: RegisterAddress<T>,
    ) -> Result<T, Sja1105Error> {
        let mut buf = [0; MAX_LAYOUT_WORDS];
        let buf = &mut buf[..T::WORDS];
        self.read_words(device, reg.addr, buf)?;
        Ok(T::unpack(buf))
    }

    /// Writes an entire register. Fails without touching the device if any
    /// field is too wide for its slot.
    fn write<T: Layout>(
        &self,
        device: u8,
        reg: RegisterAddress<T>,
        value: &T,
    ) -> Result<(), Sja1105Error> {
        let mut buf = [0; MAX_LAYOUT_WORDS];
        let buf = &mut buf[..T::WORDS];
        pack(value, buf)?;
        self.write_words(device, reg.addr, buf)
    }

    /// Performs a write operation on the given register, where the value is
    /// calculated by calling f(default).
    fn write_with<T, F>(
        &self,
        device: u8,
        reg: RegisterAddress<T>,
        f: F,
    ) -> Result<(), Sja1105Error>
    where
        T: Layout + Default,
        F: FnOnce(&mut T),
    {
        let mut data = T::default();
        f(&mut data);
        self.write(device, reg, &data)
    }

    /// Performs a read-modify-write operation on a register
    fn modify<T, F>(
        &self,
        device: u8,
        reg: RegisterAddress<T>,
        f: F,
    ) -> Result<(), Sja1105Error>
    where
        T: Layout,
        F: FnOnce(&mut T),
    {
        let mut data = self.read(device, reg)?;
        f(&mut data);
        self.write(device, reg, &data)
    }
}

/// Packs `value`, turning range violations into an error.
pub(crate) fn pack<T: Layout>(
    value: &T,
    words: &mut [u32],
) -> Result<(), Sja1105Error> {
    match value.pack(words) {
        0 => Ok(()),
        violations => {
            warn!("{violations} field(s) out of range");
            Err(Sja1105Error::FieldOutOfRange { violations })
        }
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Top-level handle for a cascade of switches: the register transport plus
/// the board's port wiring.
pub struct Sja1105Cascade<'a, R, P> {
    pub rw: &'a R,
    pub map: &'a P,
}

impl<'a, R: Sja1105Rw, P: PortMap> Sja1105Cascade<'a, R, P> {
    pub fn new(rw: &'a R, map: &'a P) -> Self {
        Self { rw, map }
    }

    pub fn switch_count(&self) -> usize {
        self.map.switch_count()
    }

    fn check_switch(&self, device: u8) -> Result<(), Sja1105Error> {
        if usize::from(device) < self.switch_count() {
            Ok(())
        } else {
            Err(Sja1105Error::UnknownSwitch(device))
        }
    }

    /// Reads the device ID and part number of one switch, checking that they
    /// agree with each other.
    pub fn identify(&self, device: u8) -> Result<PartNumber, Sja1105Error> {
        self.check_switch(device)?;
        let id = self.rw.read(device, DEVICE_ID)?.id;
        let id = DeviceId::from_u32(id).ok_or(Sja1105Error::BadDeviceId(id))?;

        let part_no = self.rw.read(device, PROD_ID)?.part_no;
        match PartNumber::from_u16(part_no) {
            Some(part) if part.device_id() == id => {
                debug!("switch {device}: {part:?}");
                Ok(part)
            }
            _ => Err(Sja1105Error::BadPartNumber(part_no)),
        }
    }

    /// Issues a cold reset, which clears the static configuration.
    pub fn reset(&self, device: u8) -> Result<(), Sja1105Error> {
        self.check_switch(device)?;
        debug!("switch {device}: cold reset");
        self.rw.write_with(device, RGU_RESET_CTRL, |r: &mut ResetCtrl| {
            r.cold_rst = true
        })
    }

    pub fn port_counters(
        &self,
        device: u8,
        port: u8,
    ) -> Result<PortHlCounters, Sja1105Error> {
        self.check_switch(device)?;
        if usize::from(port) >= N_PORTS {
            return Err(Sja1105Error::UnknownLogicalPort(port));
        }
        self.rw.read(device, port_hl_counters(port))
    }
}
