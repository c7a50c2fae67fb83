//! Control channel: the device-style load protocol.
//!
//! # Codes
//!
//! | Code          | Operation   | Payload (little-endian)                                   |
//! |---------------|-------------|-----------------------------------------------------------|
//! | `0x4E44_0001` | PutDriver   | name[32] NUL-padded, vendor u16, device u16, size u32, image |
//! | `0x4E44_0002` | PutSetting  | name_len u32, kind u32, payload_len u32, name, payload    |
//! | `0x4E44_0003` | StartDriver | none                                                      |
//! | `0x4E44_0004` | CancelLoad  | none                                                      |
//!
//! A channel holds at most one pending (loaded, not started) driver.
//! Dropping the channel discards it.

use crate::core::{LoadedDriver, NdisWrapper};
use crate::driver_registry::RegisteredDriver;
use crate::error::{Result, WrapperError};
use ndis_common::consts::{DRIVER_NAME_FIELD_LEN, MAX_DRIVER_NAME_LEN};
use ndis_common::hardware::HardwareId;
use ndis_common::setting::{Setting, SettingKind, SettingValue};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Control codes.
pub mod code {
    /// Load a driver image.
    pub const PUT_DRIVER: u32 = 0x4E44_0001;
    /// Attach a setting to the pending driver.
    pub const PUT_SETTING: u32 = 0x4E44_0002;
    /// Start the pending driver.
    pub const START_DRIVER: u32 = 0x4E44_0003;
    /// Discard the pending driver.
    pub const CANCEL_LOAD: u32 = 0x4E44_0004;
}

const PUT_DRIVER_HEADER_LEN: usize = DRIVER_NAME_FIELD_LEN + 2 + 2 + 4;
const PUT_SETTING_HEADER_LEN: usize = 12;

fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

fn check_len(payload: &[u8], expected: usize) -> Result<()> {
    match payload.len() {
        n if n < expected => Err(WrapperError::Truncated {
            needed: expected,
            actual: n,
        }),
        n if n > expected => Err(WrapperError::SizeMismatch {
            declared: expected,
            actual: n,
        }),
        _ => Ok(()),
    }
}

/// Decoded PutDriver request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutDriver<'a> {
    /// Driver name.
    pub name: &'a str,
    /// Hardware match key.
    pub hardware: HardwareId,
    /// Image bytes.
    pub image: &'a [u8],
}

/// Decode a PutDriver payload.
///
/// # Errors
/// - `WrapperError::Truncated` if the payload is shorter than its header or
///   its declared image size
/// - `WrapperError::SizeMismatch` if bytes follow the declared image
/// - `WrapperError::InvalidArgument` for a name that is empty or not UTF-8
pub fn decode_put_driver(payload: &[u8]) -> Result<PutDriver<'_>> {
    if payload.len() < PUT_DRIVER_HEADER_LEN {
        return Err(WrapperError::Truncated {
            needed: PUT_DRIVER_HEADER_LEN,
            actual: payload.len(),
        });
    }
    let field = &payload[..DRIVER_NAME_FIELD_LEN];
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    let name = std::str::from_utf8(&field[..end])
        .map_err(|_| WrapperError::InvalidArgument("driver name is not UTF-8".to_string()))?;
    if name.is_empty() {
        return Err(WrapperError::InvalidArgument(
            "driver name is empty".to_string(),
        ));
    }

    let vendor = read_u16(payload, DRIVER_NAME_FIELD_LEN);
    let device = read_u16(payload, DRIVER_NAME_FIELD_LEN + 2);
    let size = read_u32(payload, DRIVER_NAME_FIELD_LEN + 4) as usize;
    check_len(payload, PUT_DRIVER_HEADER_LEN.saturating_add(size))?;

    Ok(PutDriver {
        name,
        hardware: HardwareId::new(vendor, device),
        image: &payload[PUT_DRIVER_HEADER_LEN..],
    })
}

/// Decode a PutSetting payload.
///
/// # Errors
/// - `WrapperError::Truncated` / `WrapperError::SizeMismatch` if the
///   declared lengths do not match the payload
/// - `WrapperError::InvalidArgument` for an unknown kind or a non-UTF-8 name
/// - `WrapperError::Setting` if the value does not fit its kind
pub fn decode_put_setting(payload: &[u8]) -> Result<Setting> {
    if payload.len() < PUT_SETTING_HEADER_LEN {
        return Err(WrapperError::Truncated {
            needed: PUT_SETTING_HEADER_LEN,
            actual: payload.len(),
        });
    }
    let name_len = read_u32(payload, 0) as usize;
    let kind_code = read_u32(payload, 4);
    let value_len = read_u32(payload, 8) as usize;
    check_len(
        payload,
        PUT_SETTING_HEADER_LEN
            .saturating_add(name_len)
            .saturating_add(value_len),
    )?;

    let kind = SettingKind::from_code(kind_code).ok_or_else(|| {
        WrapperError::InvalidArgument(format!("unknown setting kind {kind_code}"))
    })?;
    let name_end = PUT_SETTING_HEADER_LEN + name_len;
    let name = std::str::from_utf8(&payload[PUT_SETTING_HEADER_LEN..name_end])
        .map_err(|_| WrapperError::InvalidArgument("setting name is not UTF-8".to_string()))?;
    let value = SettingValue::decode(kind, &payload[name_end..])?;
    Ok(Setting::new(name, value)?)
}

/// Encode a PutDriver payload.
///
/// # Errors
/// `WrapperError::InvalidArgument` for an empty name or one longer than 31
/// bytes.
pub fn encode_put_driver(name: &str, hardware: HardwareId, image: &[u8]) -> Result<Vec<u8>> {
    if name.is_empty() || name.len() > MAX_DRIVER_NAME_LEN {
        return Err(WrapperError::InvalidArgument(format!(
            "driver name must be 1..={MAX_DRIVER_NAME_LEN} bytes"
        )));
    }
    let size = u32::try_from(image.len())
        .map_err(|_| WrapperError::InvalidArgument("image too large".to_string()))?;
    let mut out = Vec::with_capacity(PUT_DRIVER_HEADER_LEN + image.len());
    let mut field = [0u8; DRIVER_NAME_FIELD_LEN];
    field[..name.len()].copy_from_slice(name.as_bytes());
    out.extend_from_slice(&field);
    out.extend_from_slice(&hardware.vendor.to_le_bytes());
    out.extend_from_slice(&hardware.device.to_le_bytes());
    out.extend_from_slice(&size.to_le_bytes());
    out.extend_from_slice(image);
    Ok(out)
}

/// Encode a PutSetting payload.
pub fn encode_put_setting(setting: &Setting) -> Vec<u8> {
    let name = setting.name().as_bytes();
    let value = setting.value().encode();
    let mut out = Vec::with_capacity(PUT_SETTING_HEADER_LEN + name.len() + value.len());
    out.extend_from_slice(&(name.len() as u32).to_le_bytes());
    out.extend_from_slice(&setting.value().kind().code().to_le_bytes());
    out.extend_from_slice(&(value.len() as u32).to_le_bytes());
    out.extend_from_slice(name);
    out.extend_from_slice(&value);
    out
}

/// One control session.
pub struct ControlChannel<'a> {
    wrapper: &'a NdisWrapper,
    pending: Option<LoadedDriver>,
}

impl<'a> ControlChannel<'a> {
    pub(crate) fn new(wrapper: &'a NdisWrapper) -> Self {
        Self {
            wrapper,
            pending: None,
        }
    }

    /// Driver loaded on this channel and not yet started.
    pub fn pending(&self) -> Option<&LoadedDriver> {
        self.pending.as_ref()
    }

    /// Execute one control request.
    ///
    /// # Errors
    /// - `WrapperError::InvalidArgument` for an unknown code
    /// - `WrapperError::LoadPending` for PutDriver while a driver is pending
    /// - decoding, load and start errors of the individual operations
    pub fn ioctl(&mut self, code: u32, payload: &[u8]) -> Result<()> {
        match code {
            code::PUT_DRIVER => self.put_driver(payload),
            code::PUT_SETTING => self.put_setting(payload),
            code::START_DRIVER => self.start_driver().map(|_| ()),
            code::CANCEL_LOAD => {
                self.cancel_load();
                Ok(())
            }
            _ => Err(WrapperError::InvalidArgument(format!(
                "unknown control code {code:#010x}"
            ))),
        }
    }

    fn put_driver(&mut self, payload: &[u8]) -> Result<()> {
        if let Some(pending) = &self.pending {
            warn!("{} is still pending; cancel or start it first", pending.name());
            return Err(WrapperError::LoadPending);
        }
        let request = decode_put_driver(payload)?;
        let loaded = self
            .wrapper
            .load_driver(request.name, request.hardware, request.image)?;
        self.pending = Some(loaded);
        Ok(())
    }

    fn put_setting(&mut self, payload: &[u8]) -> Result<()> {
        let Some(pending) = self.pending.as_mut() else {
            warn!("PutSetting without a pending driver, ignored");
            return Ok(());
        };
        let setting = decode_put_setting(payload)?;
        pending.add_setting(setting);
        Ok(())
    }

    /// Start the pending driver. `None` when nothing is pending.
    ///
    /// The pending record is consumed whether or not the start succeeds.
    pub fn start_driver(&mut self) -> Result<Option<Arc<RegisteredDriver>>> {
        let Some(loaded) = self.pending.take() else {
            warn!("StartDriver without a pending driver, ignored");
            return Ok(None);
        };
        self.wrapper.start_driver(loaded).map(Some)
    }

    /// Discard the pending driver, if any.
    pub fn cancel_load(&mut self) {
        if let Some(loaded) = self.pending.take() {
            info!("cancelled load of {}", loaded.name());
        }
    }
}

impl Drop for ControlChannel<'_> {
    fn drop(&mut self) {
        if let Some(loaded) = self.pending.take() {
            debug!("control channel closed, discarding {}", loaded.name());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: HardwareId = HardwareId::new(0x14e4, 0x4320);

    #[test]
    fn test_put_driver_layout() {
        let payload = encode_put_driver("bcmwl5", ID, b"MZ..").unwrap();
        assert_eq!(payload.len(), 40 + 4);
        assert_eq!(&payload[..6], b"bcmwl5");
        assert!(payload[6..32].iter().all(|&b| b == 0));
        assert_eq!(&payload[32..34], &0x14e4u16.to_le_bytes());
        assert_eq!(&payload[34..36], &0x4320u16.to_le_bytes());
        assert_eq!(&payload[36..40], &4u32.to_le_bytes());

        let decoded = decode_put_driver(&payload).unwrap();
        assert_eq!(decoded.name, "bcmwl5");
        assert_eq!(decoded.hardware, ID);
        assert_eq!(decoded.image, b"MZ..");
    }

    #[test]
    fn test_put_driver_size_checks() {
        let mut payload = encode_put_driver("bcmwl5", ID, b"MZ..").unwrap();
        payload.pop();
        assert_eq!(
            decode_put_driver(&payload).unwrap_err(),
            WrapperError::Truncated {
                needed: 44,
                actual: 43
            }
        );
        payload.extend_from_slice(b"..");
        assert_eq!(
            decode_put_driver(&payload).unwrap_err(),
            WrapperError::SizeMismatch {
                declared: 44,
                actual: 45
            }
        );
        assert!(matches!(
            decode_put_driver(&[0; 10]),
            Err(WrapperError::Truncated { needed: 40, .. })
        ));
    }

    #[test]
    fn test_put_driver_name_checks() {
        assert!(encode_put_driver("", ID, b"MZ").is_err());
        assert!(encode_put_driver(&"n".repeat(32), ID, b"MZ").is_err());

        let mut payload = encode_put_driver("x", ID, b"MZ").unwrap();
        payload[0] = 0;
        assert!(matches!(
            decode_put_driver(&payload),
            Err(WrapperError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_put_setting_decode() {
        let setting = Setting::new("Channel", SettingValue::Integer(6)).unwrap();
        let payload = encode_put_setting(&setting);
        assert_eq!(payload.len(), 12 + 7 + 4);
        assert_eq!(decode_put_setting(&payload).unwrap(), setting);

        let setting =
            Setting::new("NetworkAddress", SettingValue::String("00:11:22:33:44:55".into()))
                .unwrap();
        assert_eq!(decode_put_setting(&encode_put_setting(&setting)).unwrap(), setting);
    }

    #[test]
    fn test_put_setting_rejects_bad_payloads() {
        let setting = Setting::new("Channel", SettingValue::HexInteger(6)).unwrap();
        let mut payload = encode_put_setting(&setting);

        // Integer with a 3-byte value.
        payload[8..12].copy_from_slice(&3u32.to_le_bytes());
        payload.pop();
        assert!(matches!(
            decode_put_setting(&payload),
            Err(WrapperError::Setting(_))
        ));

        // Unknown kind.
        let mut payload = encode_put_setting(&setting);
        payload[4..8].copy_from_slice(&9u32.to_le_bytes());
        assert!(matches!(
            decode_put_setting(&payload),
            Err(WrapperError::InvalidArgument(_))
        ));

        // Declared name longer than the payload.
        let mut payload = encode_put_setting(&setting);
        payload[0..4].copy_from_slice(&100u32.to_le_bytes());
        assert!(matches!(
            decode_put_setting(&payload),
            Err(WrapperError::Truncated { .. })
        ));
    }
}
