// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Board-level description of a switch cascade
//!
//! Switches are numbered along the chain: switch `i`'s cascade port is wired
//! to switch `i + 1`'s host port. Every externally visible port is given a
//! logical port number, which is how the rest of the system names it.

use core::fmt;

use heapless::Vec;
use serde::{Deserialize, Serialize};

use crate::{MAX_LOGICAL_PORTS, MAX_SWITCHES, N_PORTS};

/// A port on a particular switch
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicalPort {
    pub switch: u8,
    pub port: u8,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchConfig {
    /// Port facing the previous switch in the chain (or the host CPU)
    pub host_port: Option<u8>,
    /// Port facing the next switch in the chain
    pub cascade_port: Option<u8>,
}

/// Logical to physical port mapping for a cascade
pub trait PortMap {
    fn switch_count(&self) -> usize;
    fn host_port(&self, switch: u8) -> Option<u8>;
    fn cascade_port(&self, switch: u8) -> Option<u8>;
    fn logical_port_count(&self) -> usize;
    fn physical_port(&self, logical: u8) -> Option<PhysicalPort>;
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeConfig {
    pub switches: Vec<SwitchConfig, MAX_SWITCHES>,
    /// Indexed by logical port number
    pub logical_ports: Vec<PhysicalPort, MAX_LOGICAL_PORTS>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    NoSwitches,
    BadPort { switch: u8, port: u8 },
    MissingCascadePort(u8),
    MissingHostPort(u8),
    /// The host and cascade ports of a switch are the same port
    PortConflict(u8),
    UnknownSwitch { logical: u8, switch: u8 },
    /// A logical port was mapped onto a link between switches
    LinkPort { logical: u8 },
    DuplicatePort { logical: u8 },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSwitches => write!(f, "cascade has no switches"),
            Self::BadPort { switch, port } => {
                write!(f, "switch {switch} has no port {port}")
            }
            Self::MissingCascadePort(s) => {
                write!(f, "switch {s} has no cascade port")
            }
            Self::MissingHostPort(s) => write!(f, "switch {s} has no host port"),
            Self::PortConflict(s) => {
                write!(f, "switch {s} uses one port as host and cascade")
            }
            Self::UnknownSwitch { logical, switch } => {
                write!(f, "logical port {logical} is on missing switch {switch}")
            }
            Self::LinkPort { logical } => {
                write!(f, "logical port {logical} is an inter-switch link")
            }
            Self::DuplicatePort { logical } => {
                write!(f, "logical port {logical} is mapped twice")
            }
        }
    }
}

fn check_port(switch: u8, port: u8) -> Result<(), ConfigError> {
    if usize::from(port) < N_PORTS {
        Ok(())
    } else {
        Err(ConfigError::BadPort { switch, port })
    }
}

impl CascadeConfig {
    /// Checks that the chain is wired end to end, and that logical ports
    /// land on distinct front-facing ports.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.switches.is_empty() {
            return Err(ConfigError::NoSwitches);
        }
        let last = self.switches.len() - 1;
        for (i, s) in self.switches.iter().enumerate() {
            let i = i as u8;
            if let Some(p) = s.host_port {
                check_port(i, p)?;
            }
            if let Some(p) = s.cascade_port {
                check_port(i, p)?;
            }
            if s.host_port.is_some() && s.host_port == s.cascade_port {
                return Err(ConfigError::PortConflict(i));
            }
            if usize::from(i) < last && s.cascade_port.is_none() {
                return Err(ConfigError::MissingCascadePort(i));
            }
            if i > 0 && s.host_port.is_none() {
                return Err(ConfigError::MissingHostPort(i));
            }
        }

        for (logical, p) in self.logical_ports.iter().enumerate() {
            let logical = logical as u8;
            let s = self.switches.get(usize::from(p.switch)).ok_or(
                ConfigError::UnknownSwitch {
                    logical,
                    switch: p.switch,
                },
            )?;
            check_port(p.switch, p.port)?;
            if s.host_port == Some(p.port) || s.cascade_port == Some(p.port) {
                return Err(ConfigError::LinkPort { logical });
            }
            if self.logical_ports[..usize::from(logical)].contains(p) {
                return Err(ConfigError::DuplicatePort { logical });
            }
        }
        Ok(())
    }
}

impl PortMap for CascadeConfig {
    fn switch_count(&self) -> usize {
        self.switches.len()
    }

    fn host_port(&self, switch: u8) -> Option<u8> {
        self.switches.get(usize::from(switch))?.host_port
    }

    fn cascade_port(&self, switch: u8) -> Option<u8> {
        self.switches.get(usize::from(switch))?.cascade_port
    }

    fn logical_port_count(&self) -> usize {
        self.logical_ports.len()
    }

    fn physical_port(&self, logical: u8) -> Option<PhysicalPort> {
        self.logical_ports.get(usize::from(logical)).copied()
    }
}
