// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Static configuration upload

use log::{debug, trace, warn};

use crate::blocks::BlockList;
use crate::registers::{
    ResetCtrl, StaticConfigStatus, CONFIG_AREA, DEVICE_ID, RGU_RESET_CTRL,
    STATIC_CONFIG_STATUS,
};
use crate::spi::MAX_BURST_WORDS;
use crate::{PortMap, Sja1105Cascade, Sja1105Error, Sja1105Rw};

/// Loads a static configuration into one switch.
///
/// The switch must report the device ID the stream was built for. It is
/// cold-reset, the stream is written to the configuration area, and the
/// resulting status is checked. With `verify_crc`, the stream's CRCs are
/// checked before anything is sent.
pub fn load_static_config<R: Sja1105Rw>(
    rw: &R,
    device: u8,
    config: &BlockList<'_>,
    verify_crc: bool,
) -> Result<StaticConfigStatus, Sja1105Error> {
    if verify_crc {
        config.verify_crc()?;
    }

    let id = rw.read(device, DEVICE_ID)?.id;
    if id != config.device() as u32 {
        warn!("switch {device}: ID {id:#010x} does not match configuration");
        return Err(Sja1105Error::BadDeviceId(id));
    }

    rw.write_with(device, RGU_RESET_CTRL, |r: &mut ResetCtrl| {
        r.cold_rst = true
    })?;

    let words = config.as_words();
    debug!(
        "switch {device}: loading {} blocks ({} words)",
        config.len(),
        words.len()
    );
    let mut addr = CONFIG_AREA;
    for chunk in words.chunks(MAX_BURST_WORDS) {
        trace!("config burst at {addr:#x}");
        rw.write_words(device, addr, chunk)?;
        addr += chunk.len() as u32;
    }

    let status = rw.read(device, STATIC_CONFIG_STATUS)?;
    if status.accepted() {
        Ok(status)
    } else {
        Err(Sja1105Error::ConfigRejected(status))
    }
}

impl<R: Sja1105Rw, P: PortMap> Sja1105Cascade<'_, R, P> {
    /// Loads a static configuration into one switch of the cascade.
    pub fn load_static_config(
        &self,
        device: u8,
        config: &BlockList<'_>,
        verify_crc: bool,
    ) -> Result<StaticConfigStatus, Sja1105Error> {
        self.check_switch(device)?;
        load_static_config(self.rw, device, config, verify_crc)
    }
}
