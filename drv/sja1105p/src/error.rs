// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use core::fmt;

use crate::blocks::CrcError;
use crate::registers::StaticConfigStatus;
use crate::spi::SpiError;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Sja1105Error {
    SpiError(SpiError),
    /// The device ID register did not hold a recognized value
    BadDeviceId(u32),
    /// The part number in `PROD_ID` is unknown, or disagrees with the
    /// device ID
    BadPartNumber(u16),
    /// A dynamic reconfiguration command did not complete
    DynamicConfigTimeout {
        addr: u32,
    },
    /// The switch flagged a dynamic reconfiguration command as failed
    DynamicConfigFailed {
        addr: u32,
    },
    /// This many fields of a register were wider than their declared width
    FieldOutOfRange {
        violations: usize,
    },
    UnknownSwitch(u8),
    UnknownLogicalPort(u8),
    ConfigCrc(CrcError),
    /// The switch did not accept an uploaded static configuration
    ConfigRejected(StaticConfigStatus),
}

impl From<SpiError> for Sja1105Error {
    fn from(s: SpiError) -> Self {
        Self::SpiError(s)
    }
}

impl From<CrcError> for Sja1105Error {
    fn from(c: CrcError) -> Self {
        Self::ConfigCrc(c)
    }
}

impl fmt::Display for Sja1105Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SpiError(e) => write!(f, "SPI transfer failed: {e:?}"),
            Self::BadDeviceId(id) => write!(f, "unrecognized device ID {id:#010x}"),
            Self::BadPartNumber(p) => write!(f, "unexpected part number {p:#06x}"),
            Self::DynamicConfigTimeout { addr } => {
                write!(f, "dynamic reconfiguration at {addr:#x} timed out")
            }
            Self::DynamicConfigFailed { addr } => {
                write!(f, "dynamic reconfiguration at {addr:#x} failed")
            }
            Self::FieldOutOfRange { violations } => {
                write!(f, "{violations} field(s) out of range")
            }
            Self::UnknownSwitch(s) => write!(f, "no switch {s} in cascade"),
            Self::UnknownLogicalPort(p) => write!(f, "no logical port {p}"),
            Self::ConfigCrc(c) => write!(f, "{c}"),
            Self::ConfigRejected(s) => {
                write!(f, "static configuration rejected: {s:?}")
            }
        }
    }
}

/// Tally of a multi-step operation that keeps going after individual steps
/// fail.
///
/// Cascade-wide operations touch several switches with several register
/// accesses each. Rather than stopping at the first failure (and leaving the
/// caller to guess how far it got), every step is recorded here, along with
/// the first error seen.
#[must_use]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Outcome {
    attempts: u16,
    failures: u16,
    first_error: Option<Sja1105Error>,
}

impl Outcome {
    pub const fn new() -> Self {
        Self {
            attempts: 0,
            failures: 0,
            first_error: None,
        }
    }

    /// Records the result of one step, returning its value on success.
    pub fn record<T>(&mut self, r: Result<T, Sja1105Error>) -> Option<T> {
        self.attempts = self.attempts.saturating_add(1);
        match r {
            Ok(v) => Some(v),
            Err(e) => {
                self.fail(e);
                None
            }
        }
    }

    /// Records a step that failed without touching the transport.
    pub fn fail(&mut self, e: Sja1105Error) {
        self.failures = self.failures.saturating_add(1);
        if self.first_error.is_none() {
            self.first_error = Some(e);
        }
    }

    /// Folds another tally into this one.
    pub fn merge(&mut self, other: Outcome) {
        self.attempts = self.attempts.saturating_add(other.attempts);
        self.failures = self.failures.saturating_add(other.failures);
        if self.first_error.is_none() {
            self.first_error = other.first_error;
        }
    }

    pub fn attempts(&self) -> u16 {
        self.attempts
    }

    pub fn failures(&self) -> u16 {
        self.failures
    }

    pub fn first_error(&self) -> Option<Sja1105Error> {
        self.first_error
    }

    pub fn is_ok(&self) -> bool {
        self.failures == 0
    }

    /// Converts into a `Result`, keeping the whole tally on failure.
    pub fn into_result(self) -> Result<(), Outcome> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(self)
        }
    }
}
