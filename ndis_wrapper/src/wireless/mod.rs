//! Wireless configuration surface of a device handle.
//!
//! Every operation is one or more request-bridge calls and must run in a
//! context that may block. Operations the miniport rejects return
//! `WrapperError::Miniport` with its status.

pub mod freq;
pub mod scan;
pub mod txpower;

use crate::bridge::RequestKind;
use crate::error::{Result, WrapperError};
use crate::handle::DeviceHandle;
use bitflags::bitflags;
use freq::{Frequency, from_ds_config, to_ds_config};
use ndis_common::consts::{ESSID_MAX_SIZE, MAX_KEY_LEN, MAX_SCAN_LIST_ITEMS};
use ndis_common::ndis::{
    MacAddress, auth_mode, encryption, mode, network_type_name, oid, power_mode,
};
use ndis_common::wire::{
    BSSID_ITEM_LEN, BSSID_LIST_HEADER_LEN, CONFIGURATION_LEN, Configuration, ESSID_REQ_LEN,
    Essid, WEP_TRANSMIT_KEY, encode_wep_request,
};
use scan::ScanResults;
use serde::Serialize;
use tracing::{debug, warn};
use txpower::{TxPower, dbm_to_mw};

/// Operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WirelessMode {
    /// Independent BSS.
    Adhoc,
    /// Managed.
    Infrastructure,
    /// Driver decides. Only reported, never set.
    Auto,
}

impl WirelessMode {
    /// Map a miniport infrastructure-mode value. Unknown values read as `Auto`.
    pub fn from_ndis(value: u32) -> Self {
        match value {
            mode::ADHOC => Self::Adhoc,
            mode::INFRASTRUCTURE => Self::Infrastructure,
            _ => Self::Auto,
        }
    }

    /// Host mode number: auto 0, ad-hoc 1, managed 2.
    pub fn to_iw(self) -> u32 {
        match self {
            Self::Auto => 0,
            Self::Adhoc => 1,
            Self::Infrastructure => 2,
        }
    }
}

bitflags! {
    /// Host-side encryption flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EncodeFlags: u16 {
        /// Key index mask.
        const INDEX = 0x00FF;
        /// Key not shown / not given.
        const NOKEY = 0x0800;
        /// Open system authentication.
        const OPEN = 0x2000;
        /// Shared key authentication.
        const RESTRICTED = 0x4000;
        /// Encryption off.
        const DISABLED = 0x8000;
    }
}

/// Encryption state as reported to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeInfo {
    /// Status and authentication flags.
    pub flags: EncodeFlags,
    /// Cached key, empty when the status carries no key.
    pub key: heapless::Vec<u8, MAX_KEY_LEN>,
}

/// Power saving mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PowerMode {
    /// Constantly awake.
    Off,
    /// Light power saving.
    Min,
    /// Maximum power saving.
    Max,
}

impl PowerMode {
    fn to_ndis(self) -> u32 {
        match self {
            Self::Off => power_mode::CAM,
            Self::Max => power_mode::MAX_PSP,
            Self::Min => power_mode::FAST_PSP,
        }
    }

    fn from_ndis(value: u32) -> Self {
        match value {
            power_mode::CAM => Self::Off,
            power_mode::FAST_PSP => Self::Min,
            _ => Self::Max,
        }
    }
}

/// Per-interface wireless statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WirelessStats {
    /// Signal level in dBm; `None` when the miniport cannot report it.
    pub level: Option<i32>,
}

impl DeviceHandle {
    /// Protocol name derived from the network type in use.
    pub fn get_name(&self) -> &'static str {
        let net_type = self.query_u32(oid::NETWORK_TYPE_IN_USE).unwrap_or(u32::MAX);
        network_type_name(net_type)
    }

    /// Associate with `essid`.
    ///
    /// # Errors
    /// `WrapperError::InvalidArgument` above 32 bytes.
    pub fn set_essid(&self, essid: &[u8]) -> Result<()> {
        let req = Essid::from_bytes(essid).ok_or_else(|| {
            WrapperError::InvalidArgument(format!(
                "ESSID of {} bytes exceeds {}",
                essid.len(),
                ESSID_MAX_SIZE
            ))
        })?;
        self.set(oid::SSID, req.encode().to_vec())?;
        Ok(())
    }

    /// Current ESSID.
    pub fn get_essid(&self) -> Result<Essid> {
        let outcome = self.query(oid::SSID, vec![0; ESSID_REQ_LEN])?;
        Essid::decode(&outcome.data).ok_or(WrapperError::Truncated {
            needed: ESSID_REQ_LEN,
            actual: outcome.data.len(),
        })
    }

    /// Switch between ad-hoc and infrastructure.
    ///
    /// # Errors
    /// `WrapperError::InvalidArgument` for `Auto`.
    pub fn set_mode(&self, wireless_mode: WirelessMode) -> Result<()> {
        let value = match wireless_mode {
            WirelessMode::Adhoc => mode::ADHOC,
            WirelessMode::Infrastructure => mode::INFRASTRUCTURE,
            WirelessMode::Auto => {
                return Err(WrapperError::InvalidArgument(
                    "mode auto cannot be set".to_string(),
                ));
            }
        };
        self.set_u32(oid::INFRASTRUCTURE_MODE, value)
    }

    /// Current mode.
    pub fn get_mode(&self) -> Result<WirelessMode> {
        self.query_u32(oid::INFRASTRUCTURE_MODE)
            .map(WirelessMode::from_ndis)
    }

    /// Current frequency.
    pub fn get_freq(&self) -> Result<Frequency> {
        let config = self.get_configuration()?;
        Ok(from_ds_config(config.ds_config))
    }

    /// Tune to `freq`: a channel index or an absolute frequency.
    pub fn set_freq(&self, freq: Frequency) -> Result<()> {
        let ds_config = to_ds_config(freq)?;
        debug!("{}: tuning to {} kHz", self.name(), ds_config);
        self.set(
            oid::CONFIGURATION,
            Configuration::with_frequency(ds_config).encode().to_vec(),
        )?;
        Ok(())
    }

    fn get_configuration(&self) -> Result<Configuration> {
        let outcome = self.query(oid::CONFIGURATION, vec![0; CONFIGURATION_LEN])?;
        Configuration::decode(&outcome.data).ok_or(WrapperError::Truncated {
            needed: CONFIGURATION_LEN,
            actual: outcome.data.len(),
        })
    }

    /// Transmit power in mW.
    pub fn get_tx_power(&self) -> Result<u32> {
        self.query_u32(oid::TX_POWER_LEVEL)
    }

    /// Set transmit power. `Disabled` disassociates instead.
    pub fn set_tx_power(&self, power: TxPower) -> Result<()> {
        let mw = match power {
            TxPower::Disabled => return self.set_u32(oid::DISASSOCIATE, 0),
            TxPower::MilliWatts(mw) => mw,
            TxPower::Dbm(dbm) => dbm_to_mw(dbm)?,
        };
        self.set_u32(oid::TX_POWER_LEVEL, mw)
    }

    /// Link speed in b/s. The miniport reports units of 100 b/s.
    pub fn get_bitrate(&self) -> Result<u64> {
        self.query_u32(oid::GEN_LINK_SPEED)
            .map(|speed| u64::from(speed) * 100)
    }

    /// RTS threshold in bytes.
    pub fn get_rts_threshold(&self) -> Result<u32> {
        self.query_u32(oid::RTS_THRESHOLD)
    }

    /// Set the RTS threshold.
    pub fn set_rts_threshold(&self, bytes: u32) -> Result<()> {
        self.set_u32(oid::RTS_THRESHOLD, bytes)
    }

    /// Fragmentation threshold in bytes.
    pub fn get_frag_threshold(&self) -> Result<u32> {
        self.query_u32(oid::FRAGMENTATION_THRESHOLD)
    }

    /// Set the fragmentation threshold.
    pub fn set_frag_threshold(&self, bytes: u32) -> Result<()> {
        self.set_u32(oid::FRAGMENTATION_THRESHOLD, bytes)
    }

    /// Address of the associated access point.
    pub fn get_ap_address(&self) -> Result<MacAddress> {
        let outcome = self.query(oid::BSSID, vec![0; 6])?;
        outcome
            .data
            .get(..6)
            .and_then(|b| b.try_into().ok())
            .map(MacAddress)
            .ok_or(WrapperError::Truncated {
                needed: 6,
                actual: outcome.data.len(),
            })
    }

    /// Associate with a specific access point.
    pub fn set_ap_address(&self, bssid: MacAddress) -> Result<()> {
        self.set(oid::BSSID, bssid.octets().to_vec())?;
        Ok(())
    }

    /// Configure WEP.
    ///
    /// With `NOKEY` or `DISABLED`: disable encryption, remove the key at the
    /// given index and fall back to open authentication. Otherwise install
    /// `key` if one is given (caching it on the handle), enable encryption
    /// and select open or restricted authentication; restricted when
    /// neither flag is present.
    ///
    /// # Errors
    /// `WrapperError::InvalidArgument` for a key above 32 bytes.
    pub fn set_encode(&self, flags: EncodeFlags, key: &[u8]) -> Result<()> {
        let index = u32::from((flags & EncodeFlags::INDEX).bits());

        if flags.intersects(EncodeFlags::NOKEY | EncodeFlags::DISABLED) {
            let results = [
                self.set_u32(oid::WEP_STATUS, encryption::DISABLED),
                self.set_u32(oid::REMOVE_WEP, index | WEP_TRANSMIT_KEY),
                self.set_u32(oid::AUTHENTICATION_MODE, auth_mode::OPEN),
            ];
            return results.into_iter().collect();
        }

        if !key.is_empty() {
            let req = encode_wep_request(index, key).ok_or_else(|| {
                WrapperError::InvalidArgument(format!(
                    "WEP key of {} bytes exceeds {}",
                    key.len(),
                    MAX_KEY_LEN
                ))
            })?;
            {
                let mut cached = self.wep_key.lock();
                cached.clear();
                // Length checked by encode_wep_request.
                let _ = cached.extend_from_slice(key);
            }
            self.set(oid::ADD_WEP, req.to_vec())?;
        }

        self.set_u32(oid::WEP_STATUS, encryption::ENABLED)?;

        let auth = if flags.contains(EncodeFlags::RESTRICTED) {
            auth_mode::SHARED
        } else if flags.contains(EncodeFlags::OPEN) {
            auth_mode::OPEN
        } else {
            warn!(
                "{}: no security mode specified, using restricted",
                self.name()
            );
            auth_mode::SHARED
        };
        self.set_u32(oid::AUTHENTICATION_MODE, auth)
    }

    /// Current encryption status, authentication mode and cached key.
    pub fn get_encode(&self) -> Result<EncodeInfo> {
        let status = self.query_u32(oid::WEP_STATUS)?;
        let mut info = EncodeInfo {
            flags: EncodeFlags::empty(),
            key: heapless::Vec::new(),
        };
        match status {
            encryption::ENABLED => info.key = self.wep_key.lock().clone(),
            encryption::DISABLED => {
                info.flags |= EncodeFlags::DISABLED;
                info.key = self.wep_key.lock().clone();
            }
            encryption::KEY_ABSENT => info.flags |= EncodeFlags::NOKEY,
            _ => {}
        }

        info.flags |= match self.query_u32(oid::AUTHENTICATION_MODE)? {
            auth_mode::OPEN => EncodeFlags::OPEN,
            auth_mode::SHARED => EncodeFlags::RESTRICTED,
            auth_mode::AUTO_SWITCH => EncodeFlags::OPEN | EncodeFlags::RESTRICTED,
            _ => EncodeFlags::empty(),
        };
        Ok(info)
    }

    /// Scans run from the scan timer; an explicit trigger does nothing.
    pub fn set_scan(&self) -> Result<()> {
        Ok(())
    }

    /// Retrieve and translate the miniport's BSSID list.
    pub fn get_scan(&self) -> Result<ScanResults> {
        let buf = vec![0; BSSID_LIST_HEADER_LEN + MAX_SCAN_LIST_ITEMS * BSSID_ITEM_LEN];
        let outcome = self.request(RequestKind::Query, oid::BSSID_LIST, buf);
        if outcome.needed > 0 {
            warn!(
                "{}: not enough space for all access points ({} bytes needed)",
                self.name(),
                outcome.needed
            );
        }
        if !outcome.status.is_success() {
            return Err(WrapperError::Miniport(outcome.status));
        }
        let written = (outcome.written as usize).min(outcome.data.len());
        Ok(scan::translate_list(&outcome.data[..written]))
    }

    /// Set the power saving mode.
    pub fn set_power_mode(&self, mode: PowerMode) -> Result<()> {
        self.set_u32(oid::POWER_MODE, mode.to_ndis())
    }

    /// Current power saving mode.
    pub fn get_power_mode(&self) -> Result<PowerMode> {
        self.query_u32(oid::POWER_MODE).map(PowerMode::from_ndis)
    }

    /// Signal level. A failed query leaves the level unset.
    pub fn wireless_stats(&self) -> WirelessStats {
        WirelessStats {
            level: self.query_u32(oid::RSSI).ok().map(|rssi| rssi as i32),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_mapping() {
        assert_eq!(WirelessMode::from_ndis(mode::ADHOC), WirelessMode::Adhoc);
        assert_eq!(
            WirelessMode::from_ndis(mode::INFRASTRUCTURE),
            WirelessMode::Infrastructure
        );
        assert_eq!(WirelessMode::from_ndis(7), WirelessMode::Auto);
        assert_eq!(WirelessMode::Infrastructure.to_iw(), 2);
    }

    #[test]
    fn test_power_mode_mapping() {
        for mode in [PowerMode::Off, PowerMode::Min, PowerMode::Max] {
            assert_eq!(PowerMode::from_ndis(mode.to_ndis()), mode);
        }
    }
}
