// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! SPI access to an SJA1105P/Q/R/S
//!
//! Every transaction starts with a single big-endian command word:
//!
//! ```text
//!  31  30       25 24                       4 3    0
//! +---+-----------+--------------------------+------+
//! |R/W| read count|       word address       | 0000 |
//! +---+-----------+--------------------------+------+
//! ```
//!
//! followed by the data words (also big-endian). A single transaction moves
//! at most 64 words; longer accesses are split into bursts.

use bitfield::bitfield;
use log::trace;
use num_derive::FromPrimitive;

use crate::{Sja1105Error, Sja1105Rw};

/// Maximum number of data words in one SPI transaction
pub const MAX_BURST_WORDS: usize = 64;

/// Highest word address reachable with the 21-bit address field
pub const MAX_ADDRESS: u32 = (1 << 21) - 1;

const CMD_BYTES: usize = 4;
const BURST_BYTES: usize = CMD_BYTES + MAX_BURST_WORDS * 4;

#[derive(Copy, Clone, Debug, FromPrimitive, PartialEq, Eq)]
#[repr(u32)]
pub enum SpiError {
    /// Transfer size is 0 or exceeds maximum
    BadTransferSize = 1,

    /// The bus reported a fault during the transfer
    BusFault = 2,

    /// No device is attached at the requested chip select
    NoDevice = 3,

    /// Address does not fit in the command word
    BadAddress = 4,
}

impl From<SpiError> for u32 {
    fn from(rc: SpiError) -> Self {
        rc as u32
    }
}

/// A SPI controller with one chip select per switch in the cascade.
///
/// This mirrors the usual exchange/write pair offered by SPI servers:
/// `exchange` clocks out `source` (padding with zeroes) while filling `sink`.
pub trait SpiBus {
    fn exchange(
        &self,
        device: u8,
        source: &[u8],
        sink: &mut [u8],
    ) -> Result<(), SpiError>;

    fn write(&self, device: u8, source: &[u8]) -> Result<(), SpiError>;
}

bitfield! {
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct Command(u32);
    impl Debug;
    pub is_write, set_write: 31;
    pub u8, read_count, set_read_count: 30, 25;
    pub u32, address, set_address: 24, 4;
}

impl Command {
    /// Builds a read command for `count` words (1 to 64). The read count
    /// field is only six bits wide; a 64-word burst is encoded as zero.
    pub fn read(addr: u32, count: usize) -> Self {
        let mut c = Command(0);
        c.set_read_count((count % MAX_BURST_WORDS) as u8);
        c.set_address(addr);
        c
    }

    pub fn write(addr: u32) -> Self {
        let mut c = Command(0);
        c.set_write(true);
        c.set_address(addr);
        c
    }
}

/// Helper struct to read and write an SJA1105 over SPI
pub struct Sja1105Spi<S>(pub S);

impl<S: SpiBus> Sja1105Spi<S> {
    fn check(addr: u32, len: usize) -> Result<(), Sja1105Error> {
        if len == 0 {
            return Err(SpiError::BadTransferSize.into());
        }
        if addr as u64 + len as u64 - 1 > MAX_ADDRESS as u64 {
            return Err(SpiError::BadAddress.into());
        }
        Ok(())
    }
}

impl<S: SpiBus> Sja1105Rw for Sja1105Spi<S> {
    fn read_words(
        &self,
        device: u8,
        addr: u32,
        buf: &mut [u32],
    ) -> Result<(), Sja1105Error> {
        Self::check(addr, buf.len())?;
        let mut addr = addr;
        for chunk in buf.chunks_mut(MAX_BURST_WORDS) {
            let len = CMD_BYTES + chunk.len() * 4;
            let cmd = Command::read(addr, chunk.len()).0.to_be_bytes();
            let mut rx = [0u8; BURST_BYTES];

            trace!("spi read: dev {device} addr {addr:#x} len {}", chunk.len());
            self.0.exchange(device, &cmd, &mut rx[..len])?;

            for (w, b) in chunk.iter_mut().zip(rx[CMD_BYTES..len].chunks(4)) {
                *w = u32::from_be_bytes([b[0], b[1], b[2], b[3]]);
            }
            addr += chunk.len() as u32;
        }
        Ok(())
    }

    fn write_words(
        &self,
        device: u8,
        addr: u32,
        words: &[u32],
    ) -> Result<(), Sja1105Error> {
        Self::check(addr, words.len())?;
        let mut addr = addr;
        for chunk in words.chunks(MAX_BURST_WORDS) {
            let len = CMD_BYTES + chunk.len() * 4;
            let mut tx = [0u8; BURST_BYTES];
            tx[..CMD_BYTES]
                .copy_from_slice(&Command::write(addr).0.to_be_bytes());
            for (b, w) in tx[CMD_BYTES..len].chunks_mut(4).zip(chunk) {
                b.copy_from_slice(&w.to_be_bytes());
            }

            trace!("spi write: dev {device} addr {addr:#x} len {}", chunk.len());
            self.0.write(device, &tx[..len])?;
            addr += chunk.len() as u32;
        }
        Ok(())
    }
}
