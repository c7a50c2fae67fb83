//! Channel/frequency conversion.
//!
//! The miniport stores frequency as `ds_config` in kHz. The host uses a
//! mantissa/exponent pair in Hz, or a bare channel index when `m < 1000` and
//! `e == 0`.

use crate::error::{Result, WrapperError};
use ndis_common::consts::CHANNEL_COUNT;
use serde::Serialize;

/// 2.4 GHz channel centre frequencies in MHz, indexed by channel - 1.
pub const CHANNEL_FREQUENCIES_MHZ: [u32; CHANNEL_COUNT] = [
    2412, 2417, 2422, 2427, 2432, 2437, 2442, 2447, 2452, 2457, 2462, 2467, 2472, 2484,
];

/// Host frequency encoding: `m * 10^e` Hz, or a channel index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Frequency {
    /// Mantissa.
    pub m: i32,
    /// Exponent.
    pub e: i16,
}

impl Frequency {
    /// Channel index form.
    pub const fn channel(index: i32) -> Self {
        Self { m: index, e: 0 }
    }
}

/// Convert a host frequency to `ds_config` kHz.
///
/// Channel indices map through the 2.4 GHz table; anything else is scaled
/// with checked integer arithmetic and truncated to kHz.
///
/// # Errors
/// `WrapperError::InvalidArgument` for an out-of-range channel, a negative
/// mantissa, or a value that does not fit in 32 bits.
pub fn to_ds_config(freq: Frequency) -> Result<u32> {
    if freq.m < 1000 && freq.e == 0 {
        let index = usize::try_from(freq.m)
            .ok()
            .filter(|&i| i < CHANNEL_COUNT)
            .ok_or_else(|| WrapperError::InvalidArgument(format!("channel {} out of range", freq.m)))?;
        return Ok(CHANNEL_FREQUENCIES_MHZ[index] * 1000);
    }

    let out_of_range =
        || WrapperError::InvalidArgument(format!("frequency {}e{} out of range", freq.m, freq.e));
    let mut hz = u64::try_from(freq.m).map_err(|_| out_of_range())?;
    if freq.e >= 0 {
        for _ in 0..freq.e {
            hz = hz.checked_mul(10).ok_or_else(out_of_range)?;
        }
    } else {
        for _ in 0..freq.e.unsigned_abs() {
            hz /= 10;
        }
    }
    u32::try_from(hz / 1000).map_err(|_| out_of_range())
}

/// Convert `ds_config` kHz to the host encoding.
pub fn from_ds_config(ds_config: u32) -> Frequency {
    let (m, e) = if ds_config > 1_000_000 {
        (ds_config / 10, 1)
    } else {
        (ds_config, 0)
    };
    Frequency {
        m: m as i32,
        e: e + 3,
    }
}

/// Channel index of a `ds_config` value, if it is a table frequency.
pub fn channel_for(ds_config: u32) -> Option<usize> {
    CHANNEL_FREQUENCIES_MHZ
        .iter()
        .position(|&mhz| mhz * 1000 == ds_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_zero() {
        assert_eq!(to_ds_config(Frequency::channel(0)).unwrap(), 2_412_000);
        assert_eq!(from_ds_config(2_412_000), Frequency { m: 241_200, e: 4 });
    }

    #[test]
    fn test_every_channel_round_trips() {
        for index in 0..CHANNEL_COUNT {
            let ds = to_ds_config(Frequency::channel(index as i32)).unwrap();
            assert_eq!(ds, CHANNEL_FREQUENCIES_MHZ[index] * 1000);
            assert_eq!(to_ds_config(from_ds_config(ds)).unwrap(), ds);
            assert_eq!(channel_for(ds), Some(index));
        }
    }

    #[test]
    fn test_channel_out_of_range() {
        assert!(to_ds_config(Frequency::channel(14)).is_err());
        assert!(to_ds_config(Frequency::channel(-1)).is_err());
    }

    #[test]
    fn test_mantissa_exponent_scaling() {
        // 2.437 GHz
        assert_eq!(
            to_ds_config(Frequency { m: 2437, e: 6 }).unwrap(),
            2_437_000
        );
        // 5.18 GHz
        assert_eq!(
            to_ds_config(Frequency { m: 518, e: 7 }).unwrap(),
            5_180_000
        );
        // Sub-kHz parts truncate.
        assert_eq!(to_ds_config(Frequency { m: 1999, e: 0 }).unwrap(), 1);
        assert_eq!(to_ds_config(Frequency { m: 24_120_000, e: -1 }).unwrap(), 2_412);
    }

    #[test]
    fn test_scaling_overflow() {
        assert!(to_ds_config(Frequency { m: 1000, e: 30 }).is_err());
        assert!(to_ds_config(Frequency { m: 5000, e: 10 }).is_err());
        assert!(to_ds_config(Frequency { m: -5000, e: 3 }).is_err());
    }

    #[test]
    fn test_small_ds_config_keeps_mantissa() {
        assert_eq!(from_ds_config(5000), Frequency { m: 5000, e: 3 });
    }
}
