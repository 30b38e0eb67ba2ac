// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Register map and field layouts
//!
//! Each register (or dynamic-reconfiguration table entry) is described by a
//! [`layout!`] table giving the bit offset and width of every field, counted
//! from bit 0 of the register's first word. Multi-word registers are stored
//! at ascending word addresses.

use core::marker::PhantomData;

use num_derive::FromPrimitive;
use wordpack::layout;

/// Word address of a register, tagged with the layout stored there.
pub struct RegisterAddress<T> {
    pub addr: u32,
    _phantom: PhantomData<T>,
}

impl<T> RegisterAddress<T> {
    pub const fn new(addr: u32) -> Self {
        Self {
            addr,
            _phantom: PhantomData,
        }
    }
}

impl<T> Clone for RegisterAddress<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for RegisterAddress<T> {}

impl<T> core::fmt::Debug for RegisterAddress<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "RegisterAddress({:#x})", self.addr)
    }
}

/// Values of the device ID register, which is also the first word of every
/// static configuration stream.
#[derive(Copy, Clone, Debug, Eq, PartialEq, FromPrimitive)]
#[repr(u32)]
pub enum DeviceId {
    Sja1105PR = 0xaf00_030e,
    Sja1105QS = 0xae00_030e,
}

/// Part numbers in the `PROD_ID` register, which tell apart chips sharing a
/// device ID.
#[derive(Copy, Clone, Debug, Eq, PartialEq, FromPrimitive)]
#[repr(u16)]
pub enum PartNumber {
    Sja1105P = 0x9a84,
    Sja1105Q = 0x9a85,
    Sja1105R = 0x9a86,
    Sja1105S = 0x9a87,
}

impl PartNumber {
    /// Returns the device ID that this part reports.
    pub fn device_id(self) -> DeviceId {
        match self {
            Self::Sja1105P | Self::Sja1105R => DeviceId::Sja1105PR,
            Self::Sja1105Q | Self::Sja1105S => DeviceId::Sja1105QS,
        }
    }
}

layout! {
    pub struct DeviceIdReg[1] {
        pub id: u32 = bits(0, 32),
    }
}

layout! {
    /// Result of the most recent static configuration upload
    pub struct StaticConfigStatus[1] {
        /// Number of time slots in the schedule
        pub nslot: u8 = bits(0, 4),
        /// Global CRC mismatch
        pub crcchkg: bool = bits(28, 1),
        /// Device ID mismatch
        pub ids: bool = bits(29, 1),
        /// Local (per-block) CRC mismatch
        pub crcchkl: bool = bits(30, 1),
        /// Configuration is valid
        pub configs: bool = bits(31, 1),
    }
}

impl StaticConfigStatus {
    pub fn accepted(&self) -> bool {
        self.configs && !self.crcchkl && !self.ids && !self.crcchkg
    }
}

layout! {
    pub struct ProdId[1] {
        pub part_no: u16 = bits(4, 16),
    }
}

layout! {
    /// Reset generation unit control; each bit triggers one kind of reset
    pub struct ResetCtrl[1] {
        pub por_rst: bool = bits(1, 1),
        pub cold_rst: bool = bits(2, 1),
        pub warm_rst: bool = bits(3, 1),
        pub otp_rst: bool = bits(4, 1),
        pub car_rst: bool = bits(5, 1),
        pub cfg_rst: bool = bits(7, 1),
        pub switch_rst: bool = bits(8, 1),
    }
}

layout! {
    /// Per-port high-level MAC counters
    pub struct PortHlCounters[8] {
        pub n_txbyte: u64 = bits(0, 64),
        pub n_txfrm: u64 = bits(64, 64),
        pub n_rxbyte: u64 = bits(128, 64),
        pub n_rxfrm: u64 = bits(192, 64),
    }
}

layout! {
    /// VLAN lookup table entry; the port masks have one bit per port
    pub struct VlanLookupEntry[2] {
        pub vlanid: u16 = bits(27, 12),
        /// Ports on which frames leave tagged
        pub tag_port: u8 = bits(39, 5),
        /// Broadcast domain: ports this VLAN may be forwarded to
        pub vlan_bc: u8 = bits(44, 5),
        /// Member ports: ports this VLAN may be received on
        pub vmemb_port: u8 = bits(49, 5),
        pub vegr_mirr: u8 = bits(54, 5),
        pub ving_mirr: u8 = bits(59, 5),
    }
}

layout! {
    pub struct VlanLookupCtrl[1] {
        pub valident: bool = bits(27, 1),
        pub rdwrset: bool = bits(30, 1),
        pub valid: bool = bits(31, 1),
    }
}

layout! {
    /// Retagging table entry
    pub struct RetaggingEntry[2] {
        pub destports: u8 = bits(23, 5),
        pub use_dest_ports: bool = bits(28, 1),
        pub do_not_learn: bool = bits(29, 1),
        pub vlan_egr: u16 = bits(30, 12),
        pub vlan_ing: u16 = bits(42, 12),
        pub ing_port: u8 = bits(54, 5),
        pub egr_port: u8 = bits(59, 5),
    }
}

layout! {
    pub struct RetaggingCtrl[1] {
        pub index: u8 = bits(0, 6),
        pub rdwrset: bool = bits(28, 1),
        pub valident: bool = bits(29, 1),
        pub errors: bool = bits(30, 1),
        pub valid: bool = bits(31, 1),
    }
}

layout! {
    /// L2 address lookup (FDB) entry
    pub struct L2LookupEntry[5] {
        pub index: u16 = bits(6, 10),
        pub enfport: bool = bits(16, 1),
        pub destports: u8 = bits(17, 5),
        pub macaddr: u64 = bits(22, 48),
        pub vlanid: u16 = bits(70, 12),
        pub iotag: bool = bits(82, 1),
        pub mask_macaddr: u64 = bits(83, 48),
        pub mask_vlanid: u16 = bits(131, 12),
        pub mask_iotag: bool = bits(143, 1),
        pub retag: bool = bits(144, 1),
        pub mirr: bool = bits(145, 1),
        pub takets: bool = bits(146, 1),
        pub mirrvlan: u16 = bits(147, 12),
        pub tsreg: bool = bits(159, 1),
    }
}

impl L2LookupEntry {
    pub fn mac(&self) -> [u8; 6] {
        let b = self.macaddr.to_be_bytes();
        [b[2], b[3], b[4], b[5], b[6], b[7]]
    }

    pub fn set_mac(&mut self, mac: [u8; 6]) {
        let mut b = [0; 8];
        b[2..].copy_from_slice(&mac);
        self.macaddr = u64::from_be_bytes(b);
    }
}

layout! {
    pub struct L2LookupCtrl[1] {
        pub valident: bool = bits(27, 1),
        pub errors: bool = bits(29, 1),
        pub rdwrset: bool = bits(30, 1),
        pub valid: bool = bits(31, 1),
    }
}

pub const DEVICE_ID: RegisterAddress<DeviceIdReg> = RegisterAddress::new(0x0);
pub const STATIC_CONFIG_STATUS: RegisterAddress<StaticConfigStatus> =
    RegisterAddress::new(0x1);

/// Start of the static configuration area; the whole stream is written here
/// at ascending addresses.
pub const CONFIG_AREA: u32 = 0x2_0000;

pub const L2_LOOKUP_ENTRY: RegisterAddress<L2LookupEntry> =
    RegisterAddress::new(0x24);
pub const L2_LOOKUP_CTRL: RegisterAddress<L2LookupCtrl> =
    RegisterAddress::new(0x29);
pub const VLAN_LOOKUP_ENTRY: RegisterAddress<VlanLookupEntry> =
    RegisterAddress::new(0x2d);
pub const VLAN_LOOKUP_CTRL: RegisterAddress<VlanLookupCtrl> =
    RegisterAddress::new(0x2f);
pub const RETAGGING_ENTRY: RegisterAddress<RetaggingEntry> =
    RegisterAddress::new(0x31);
pub const RETAGGING_CTRL: RegisterAddress<RetaggingCtrl> =
    RegisterAddress::new(0x33);

pub const RGU_RESET_CTRL: RegisterAddress<ResetCtrl> =
    RegisterAddress::new(0x10_0440);
pub const PROD_ID: RegisterAddress<ProdId> = RegisterAddress::new(0x10_0bc3);

/// High-level MAC counters for the given port
///
/// # Panics
/// Panics if `port` is not a valid port number.
pub const fn port_hl_counters(port: u8) -> RegisterAddress<PortHlCounters> {
    assert!((port as usize) < crate::N_PORTS);
    RegisterAddress::new(0x400 + port as u32 * 0x10)
}
