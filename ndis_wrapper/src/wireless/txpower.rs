//! Transmit power conversion.
//!
//! Miniports take power in mW. dBm values are converted in 10^12 fixed point:
//! ×10 per full decade, ×1.25892541179 per remaining dB, truncated to whole
//! mW.

use crate::error::{Result, WrapperError};
use ndis_common::consts::MAX_TX_POWER_DBM;

const SCALE: u128 = 1_000_000_000_000;
const DB_STEP: u128 = 1_258_925_411_790;

/// Requested transmit power.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxPower {
    /// Radio off; the adapter disassociates.
    Disabled,
    /// Milliwatts.
    MilliWatts(u32),
    /// dBm, at most 50.
    Dbm(i32),
}

/// Convert dBm to mW. Values at or below 0 dBm give 1 mW.
///
/// # Errors
/// `WrapperError::InvalidArgument` above 50 dBm.
pub fn dbm_to_mw(dbm: i32) -> Result<u32> {
    if dbm > MAX_TX_POWER_DBM {
        return Err(WrapperError::InvalidArgument(format!(
            "tx power {dbm} dBm above {MAX_TX_POWER_DBM} dBm"
        )));
    }
    if dbm <= 0 {
        return Ok(1);
    }
    let mut acc = SCALE * 10u128.pow((dbm / 10) as u32);
    for _ in 0..dbm % 10 {
        acc = acc * DB_STEP / SCALE;
    }
    Ok((acc / SCALE) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decades_are_exact() {
        assert_eq!(dbm_to_mw(10).unwrap(), 10);
        assert_eq!(dbm_to_mw(20).unwrap(), 100);
        assert_eq!(dbm_to_mw(30).unwrap(), 1000);
        assert_eq!(dbm_to_mw(50).unwrap(), 100_000);
    }

    #[test]
    fn test_fractional_values_truncate() {
        // 19.95 mW
        assert_eq!(dbm_to_mw(13).unwrap(), 19);
        // 50.12 mW
        assert_eq!(dbm_to_mw(17).unwrap(), 50);
        // 1.995 mW
        assert_eq!(dbm_to_mw(3).unwrap(), 1);
        // 79.43 mW
        assert_eq!(dbm_to_mw(19).unwrap(), 79);
    }

    #[test]
    fn test_low_and_high_bounds() {
        assert_eq!(dbm_to_mw(0).unwrap(), 1);
        assert_eq!(dbm_to_mw(-20).unwrap(), 1);
        assert!(dbm_to_mw(51).is_err());
    }
}
