//! Typed driver settings.
//!
//! Settings are attached to a driver record between load and start and are
//! read by the miniport once, during adapter initialization.

use crate::consts::{MAX_SETTING_NAME_LEN, MAX_SETTING_STRING_LEN};
use std::fmt;
use thiserror::Error;

/// Wire tag of a setting value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKind {
    /// Decimal integer, 4-byte payload.
    Integer,
    /// Hexadecimal integer, 4-byte payload.
    HexInteger,
    /// UTF-8 string, 1..=255 byte payload.
    String,
}

impl SettingKind {
    /// Decode the wire tag.
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(SettingKind::Integer),
            1 => Some(SettingKind::HexInteger),
            2 => Some(SettingKind::String),
            _ => None,
        }
    }

    /// Wire tag.
    pub fn code(self) -> u32 {
        match self {
            SettingKind::Integer => 0,
            SettingKind::HexInteger => 1,
            SettingKind::String => 2,
        }
    }
}

/// Setting decoding error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingError {
    /// Name empty or too long.
    #[error("invalid setting name: {0}")]
    InvalidName(String),

    /// Payload size does not match the declared kind.
    #[error("setting payload size {actual} does not fit kind {kind:?}")]
    SizeMismatch {
        /// Declared kind.
        kind: SettingKind,
        /// Payload size received.
        actual: usize,
    },

    /// String payload is not valid UTF-8.
    #[error("setting payload is not valid UTF-8")]
    InvalidUtf8,
}

/// Value of a setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingValue {
    /// Decimal integer.
    Integer(u32),
    /// Hexadecimal integer.
    HexInteger(u32),
    /// String.
    String(String),
}

impl SettingValue {
    /// Decode a payload of the given kind.
    pub fn decode(kind: SettingKind, payload: &[u8]) -> Result<Self, SettingError> {
        match kind {
            SettingKind::Integer | SettingKind::HexInteger => {
                let bytes: [u8; 4] = payload
                    .try_into()
                    .map_err(|_| SettingError::SizeMismatch {
                        kind,
                        actual: payload.len(),
                    })?;
                let value = u32::from_le_bytes(bytes);
                Ok(if kind == SettingKind::Integer {
                    SettingValue::Integer(value)
                } else {
                    SettingValue::HexInteger(value)
                })
            }
            SettingKind::String => {
                if payload.is_empty() || payload.len() > MAX_SETTING_STRING_LEN {
                    return Err(SettingError::SizeMismatch {
                        kind,
                        actual: payload.len(),
                    });
                }
                let text = std::str::from_utf8(payload).map_err(|_| SettingError::InvalidUtf8)?;
                Ok(SettingValue::String(text.to_string()))
            }
        }
    }

    /// Payload bytes, as accepted by `decode`.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            SettingValue::Integer(v) | SettingValue::HexInteger(v) => v.to_le_bytes().to_vec(),
            SettingValue::String(s) => s.as_bytes().to_vec(),
        }
    }

    /// Kind of this value.
    pub fn kind(&self) -> SettingKind {
        match self {
            SettingValue::Integer(_) => SettingKind::Integer,
            SettingValue::HexInteger(_) => SettingKind::HexInteger,
            SettingValue::String(_) => SettingKind::String,
        }
    }

    /// Integer view, for either integer kind.
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            SettingValue::Integer(v) | SettingValue::HexInteger(v) => Some(*v),
            SettingValue::String(_) => None,
        }
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingValue::Integer(v) => write!(f, "{v}"),
            SettingValue::HexInteger(v) => write!(f, "{v:#x}"),
            SettingValue::String(s) => write!(f, "{s}"),
        }
    }
}

/// Named driver setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Setting {
    name: String,
    value: SettingValue,
}

impl Setting {
    /// Create a setting, validating the name.
    pub fn new(name: &str, value: SettingValue) -> Result<Self, SettingError> {
        if name.is_empty() || name.len() > MAX_SETTING_NAME_LEN || name.contains('\0') {
            return Err(SettingError::InvalidName(name.to_string()));
        }
        Ok(Self {
            name: name.to_string(),
            value,
        })
    }

    /// Setting name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Setting value.
    pub fn value(&self) -> &SettingValue {
        &self.value
    }
}

/// Look up a setting by name, ignoring ASCII case like the registry lookups
/// foreign drivers are written against.
pub fn find_setting<'a>(settings: &'a [Setting], name: &str) -> Option<&'a SettingValue> {
    settings
        .iter()
        .find(|s| s.name.eq_ignore_ascii_case(name))
        .map(|s| &s.value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_integer_requires_four_bytes() {
        let value = SettingValue::decode(SettingKind::Integer, &7u32.to_le_bytes()).unwrap();
        assert_eq!(value, SettingValue::Integer(7));
        assert_eq!(value.as_u32(), Some(7));

        let err = SettingValue::decode(SettingKind::HexInteger, &[1, 2]).unwrap_err();
        assert_eq!(
            err,
            SettingError::SizeMismatch {
                kind: SettingKind::HexInteger,
                actual: 2
            }
        );
    }

    #[test]
    fn test_decode_string() {
        let value = SettingValue::decode(SettingKind::String, b"US").unwrap();
        assert_eq!(value, SettingValue::String("US".to_string()));
        assert!(SettingValue::decode(SettingKind::String, b"").is_err());
        assert_eq!(
            SettingValue::decode(SettingKind::String, &[0xff, 0xfe]),
            Err(SettingError::InvalidUtf8)
        );
    }

    #[test]
    fn test_setting_name_validation() {
        assert!(Setting::new("", SettingValue::Integer(1)).is_err());
        assert!(Setting::new(&"x".repeat(65), SettingValue::Integer(1)).is_err());
        assert!(Setting::new("NetworkAddress", SettingValue::Integer(1)).is_ok());
    }

    #[test]
    fn test_find_setting_ignores_case() {
        let settings = vec![
            Setting::new("PowerSaveMode", SettingValue::Integer(0)).unwrap(),
            Setting::new("Channel", SettingValue::Integer(6)).unwrap(),
        ];
        assert_eq!(
            find_setting(&settings, "channel"),
            Some(&SettingValue::Integer(6))
        );
        assert_eq!(find_setting(&settings, "missing"), None);
    }
}
