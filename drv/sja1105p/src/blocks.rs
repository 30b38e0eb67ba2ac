// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Static configuration streams
//!
//! The vendor tooling produces the static configuration as a stream of
//! words:
//!
//! ```text
//! +-----------+
//! | device ID |
//! +-----------+--------+------------+------+----------+
//! | id << 24  |  size  | header CRC | body | body CRC |   (repeated)
//! +-----------+--------+------------+------+----------+
//! | id << 24  |   0    | global CRC |
//! +-----------+--------+------------+
//! ```
//!
//! [`split_blocks`] checks that a stream is well-formed and indexes its
//! blocks without copying them. CRCs are only checked on request, through
//! [`BlockList::verify_crc`].

use core::fmt;

use crc::{Crc, CRC_32_ISO_HDLC};
use heapless::Vec;
use log::{debug, warn};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

use crate::registers::DeviceId;

/// Maximum number of blocks in one stream
pub const MAX_BLOCKS: usize = 32;

/// Words in a block header: id, size, and header CRC
pub const HEADER_WORDS: usize = 3;

const SIZE_MASK: u32 = 0x00ff_ffff;

static CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

#[derive(Copy, Clone, Debug, Eq, PartialEq, FromPrimitive)]
#[repr(u8)]
pub enum BlockId {
    Schedule = 0x00,
    ScheduleEntryPoints = 0x01,
    L2Lookup = 0x05,
    L2Policing = 0x06,
    VlanLookup = 0x07,
    L2Forwarding = 0x08,
    MacConfig = 0x09,
    ScheduleParams = 0x0a,
    ScheduleEntryPointsParams = 0x0b,
    L2LookupParams = 0x0d,
    L2ForwardingParams = 0x0e,
    AvbParams = 0x10,
    GeneralParams = 0x11,
    Retagging = 0x12,
    XmiiParams = 0x4e,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SchemaEntry {
    pub id: BlockId,
    pub mandatory: bool,
    /// Required body length in words, or 0 if the length may vary
    pub words: usize,
}

const fn entry(id: BlockId, mandatory: bool, words: usize) -> SchemaEntry {
    SchemaEntry {
        id,
        mandatory,
        words,
    }
}

/// Blocks understood by the P/Q/R/S family
pub static SCHEMA: [SchemaEntry; 15] = [
    entry(BlockId::Schedule, false, 0),
    entry(BlockId::ScheduleEntryPoints, false, 0),
    entry(BlockId::L2Lookup, false, 0),
    entry(BlockId::L2Policing, true, 0),
    entry(BlockId::VlanLookup, true, 0),
    entry(BlockId::L2Forwarding, true, 26),
    entry(BlockId::MacConfig, true, 8 * crate::N_PORTS),
    entry(BlockId::ScheduleParams, false, 3),
    entry(BlockId::ScheduleEntryPointsParams, false, 1),
    entry(BlockId::L2LookupParams, false, 4),
    entry(BlockId::L2ForwardingParams, true, 3),
    entry(BlockId::AvbParams, false, 4),
    entry(BlockId::GeneralParams, true, 11),
    entry(BlockId::Retagging, false, 0),
    entry(BlockId::XmiiParams, true, 1),
];

// The mandatory set is tracked as a bitmask indexed by schema position
const _: () = assert!(SCHEMA.len() <= u32::BITS as usize);

impl SchemaEntry {
    pub fn lookup(raw_id: u8) -> Option<(usize, &'static SchemaEntry)> {
        SCHEMA.iter().enumerate().find(|(_, s)| s.id as u8 == raw_id)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ParseError {
    /// Fewer words than a device ID plus terminator
    TooShort,
    UnrecognizedDevice(u32),
    /// The block starting at this word offset runs past the end of the
    /// stream
    TruncatedBlock {
        offset: usize,
    },
    BlockLengthMismatch {
        id: BlockId,
        expected: usize,
        actual: usize,
    },
    MissingMandatoryBlock(BlockId),
    TooManyBlocks,
    /// The stream ran out without a zero-size terminator block
    MissingTerminator,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort => write!(f, "configuration stream too short"),
            Self::UnrecognizedDevice(id) => {
                write!(f, "unrecognized device ID {id:#010x}")
            }
            Self::TruncatedBlock { offset } => {
                write!(f, "block at word {offset} is truncated")
            }
            Self::BlockLengthMismatch {
                id,
                expected,
                actual,
            } => write!(
                f,
                "{id:?} block has {actual} words, expected {expected}"
            ),
            Self::MissingMandatoryBlock(id) => {
                write!(f, "mandatory {id:?} block is missing")
            }
            Self::TooManyBlocks => {
                write!(f, "more than {MAX_BLOCKS} blocks in stream")
            }
            Self::MissingTerminator => {
                write!(f, "configuration stream has no terminator")
            }
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CrcKind {
    Header,
    Body,
    Global,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CrcError {
    /// Raw id of the offending block, or `None` for the global CRC
    pub block: Option<u8>,
    pub kind: CrcKind,
    /// CRC stored in the stream
    pub expected: u32,
    pub computed: u32,
}

impl fmt::Display for CrcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.block {
            Some(id) => write!(f, "{:?} CRC mismatch in block {id:#04x}", self.kind)?,
            None => write!(f, "{:?} CRC mismatch", self.kind)?,
        }
        write!(
            f,
            " (stored {:#010x}, computed {:#010x})",
            self.expected, self.computed
        )
    }
}

/// CRC-32 of a run of words, each fed to the CRC in little-endian byte order
pub fn crc_words(words: &[u32]) -> u32 {
    let mut digest = CRC32.digest();
    for w in words {
        digest.update(&w.to_le_bytes());
    }
    digest.finalize()
}

/// One block of a configuration stream, borrowed from the stream
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ConfigBlock<'a> {
    raw: &'a [u32],
}

impl<'a> ConfigBlock<'a> {
    pub fn raw_id(&self) -> u8 {
        (self.raw[0] >> 24) as u8
    }

    /// Returns the block's type, or `None` if it is not in [`SCHEMA`]
    pub fn id(&self) -> Option<BlockId> {
        BlockId::from_u8(self.raw_id())
    }

    /// Body length in words
    pub fn len(&self) -> usize {
        self.raw.len() - HEADER_WORDS - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn header_crc(&self) -> u32 {
        self.raw[2]
    }

    pub fn body(&self) -> &'a [u32] {
        &self.raw[HEADER_WORDS..self.raw.len() - 1]
    }

    pub fn body_crc(&self) -> u32 {
        self.raw[self.raw.len() - 1]
    }

    /// Header, body, and body CRC, as they appear in the stream
    pub fn as_words(&self) -> &'a [u32] {
        self.raw
    }

    fn verify_crc(&self) -> Result<(), CrcError> {
        let block = Some(self.raw_id());
        check(block, CrcKind::Header, &self.raw[..2], self.header_crc())?;
        check(block, CrcKind::Body, self.body(), self.body_crc())
    }
}

fn check(
    block: Option<u8>,
    kind: CrcKind,
    words: &[u32],
    expected: u32,
) -> Result<(), CrcError> {
    let computed = crc_words(words);
    if computed == expected {
        Ok(())
    } else {
        Err(CrcError {
            block,
            kind,
            expected,
            computed,
        })
    }
}

/// A validated configuration stream
#[derive(Clone, Debug)]
pub struct BlockList<'a> {
    device: DeviceId,
    /// Device ID through the terminator, inclusive
    words: &'a [u32],
    blocks: Vec<ConfigBlock<'a>, MAX_BLOCKS>,
    trailing: usize,
}

impl<'a> BlockList<'a> {
    pub fn device(&self) -> DeviceId {
        self.device
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConfigBlock<'a>> + '_ {
        self.blocks.iter()
    }

    /// Returns the first block with the given id
    pub fn get(&self, id: BlockId) -> Option<&ConfigBlock<'a>> {
        self.blocks.iter().find(|b| b.raw_id() == id as u8)
    }

    /// Number of blocks, not counting the terminator
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// The stream to upload: device ID, blocks, and terminator
    pub fn as_words(&self) -> &'a [u32] {
        self.words
    }

    /// Words found after the terminator, which are not part of the stream
    pub fn trailing_words(&self) -> usize {
        self.trailing
    }

    /// Checks every header and body CRC, then the global CRC in the
    /// terminator.
    pub fn verify_crc(&self) -> Result<(), CrcError> {
        for b in &self.blocks {
            b.verify_crc()?;
        }
        match self.words.split_last() {
            Some((global, before)) => check(None, CrcKind::Global, before, *global),
            None => Ok(()),
        }
    }
}

/// Splits a static configuration stream into blocks, checking its framing,
/// the length of every known block, and that every mandatory block is
/// present.
///
/// Unknown blocks are kept. A zero-size header ends the stream; if anything
/// follows it, those words are logged and left out of the result.
pub fn split_blocks(words: &[u32]) -> Result<BlockList<'_>, ParseError> {
    if words.len() < 1 + HEADER_WORDS {
        return Err(ParseError::TooShort);
    }
    let device = DeviceId::from_u32(words[0])
        .ok_or(ParseError::UnrecognizedDevice(words[0]))?;

    let mut missing = SCHEMA
        .iter()
        .enumerate()
        .filter(|(_, s)| s.mandatory)
        .fold(0u32, |m, (i, _)| m | (1 << i));
    let mut blocks = Vec::new();

    let mut pos = 1;
    let end = loop {
        let remaining = words.len() - pos;
        if remaining == 0 {
            return Err(ParseError::MissingTerminator);
        }
        if remaining < HEADER_WORDS {
            return Err(ParseError::TruncatedBlock { offset: pos });
        }

        let size = (words[pos + 1] & SIZE_MASK) as usize;
        if size == 0 {
            if remaining != HEADER_WORDS {
                warn!(
                    "{} word(s) of spurious data after terminator at {pos}",
                    remaining - HEADER_WORDS
                );
            }
            break pos + HEADER_WORDS;
        }

        let total = HEADER_WORDS + size + 1;
        if remaining < total {
            return Err(ParseError::TruncatedBlock { offset: pos });
        }
        let block = ConfigBlock {
            raw: &words[pos..pos + total],
        };

        match SchemaEntry::lookup(block.raw_id()) {
            Some((i, s)) => {
                missing &= !(1 << i);
                if s.words != 0 && s.words != size {
                    return Err(ParseError::BlockLengthMismatch {
                        id: s.id,
                        expected: s.words,
                        actual: size,
                    });
                }
            }
            None => debug!(
                "unknown block {:#04x} ({size} words) at {pos}",
                block.raw_id()
            ),
        }
        blocks
            .push(block)
            .map_err(|_| ParseError::TooManyBlocks)?;
        pos += total;
    };

    if missing != 0 {
        let first = missing.trailing_zeros() as usize;
        return Err(ParseError::MissingMandatoryBlock(SCHEMA[first].id));
    }

    Ok(BlockList {
        device,
        words: &words[..end],
        blocks,
        trailing: words.len() - end,
    })
}
