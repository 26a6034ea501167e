//! Typed configuration broadcast to downstream consumers.
//!
//! Projects the cached contents of designated buffered partitions into the
//! bundles hardware consumers latch: the hardware configuration bundle, the
//! key-material bundle, and the raw life-cycle words. Assembly is recomputed
//! on every query, never persisted, and never fails into the consumer: it
//! degrades to "not valid" or redacted fields, because the receiving side
//! cannot handle an error.
//!
//! # Security
//! - Key material is released only while the caller-supplied release signal
//!   is asserted *and* the source partition has a non-zero digest
//!   (provisioned). The signal is an explicit parameter on every call, never
//!   cached, so both gated and ungated paths are exercisable in tests.
//! - Redacted fields carry the fixed public `REDACTED_BYTE` pattern, which is
//!   distinguishable from both zero-filled and real key material.
//! - Bundles holding key material are zeroized on drop.

use core::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::access::AccessController;
use crate::layout::{
    PartitionId, HW_CFG_DEVICE_ID_LEN, HW_CFG_DEVICE_ID_OFFSET, HW_CFG_FEATURE_FLAGS_OFFSET,
    HW_CFG_MANUF_STATE_LEN, HW_CFG_MANUF_STATE_OFFSET, LC_STATE_LEN, LC_STATE_OFFSET,
    LC_TRANSITION_CNT_LEN, LC_TRANSITION_CNT_OFFSET, SECRET1_FLASH_ADDR_KEY_OFFSET,
    SECRET1_FLASH_DATA_KEY_OFFSET, SECRET1_SRAM_DATA_KEY_LEN, SECRET1_SRAM_DATA_KEY_OFFSET,
    SECRET2_CREATOR_KEY_SHARE0_OFFSET, SECRET2_CREATOR_KEY_SHARE1_OFFSET,
    SECRET2_CREATOR_KEY_SHARE_LEN,
};
use crate::medium::OtpMedium;

/// Byte pattern filling redacted key fields. Public by design: consumers and
/// tests can tell a withheld key from a real (or zeroed) one.
pub const REDACTED_BYTE: u8 = 0xA5;

/// Known bits of the hardware feature flag word. Remaining bits are reserved
/// and preserved byte-for-byte.
pub const FEATURE_EN_SRAM_IFETCH: u64 = 1 << 0;
pub const FEATURE_EN_CSRNG_SW_APP_READ: u64 = 1 << 8;

/// Partitions whose first read-back gates the hardware config bundle.
const HW_CFG_CONTRIBUTORS: [PartitionId; 1] = [PartitionId::HwCfg];

/// Errors returned by bundle assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastError {
    /// A contributing partition has not completed its first read-back.
    NotValid,
}

impl fmt::Display for BroadcastError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BroadcastError::NotValid => write!(f, "Contributing partition not yet read back"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for BroadcastError {}

/// Hardware configuration broadcast to the rest of the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HwConfigBundle {
    pub device_id: [u8; HW_CFG_DEVICE_ID_LEN],
    pub manuf_state: [u8; HW_CFG_MANUF_STATE_LEN],
    /// Raw feature flag word; reserved bits are carried through untouched.
    pub feature_flags: u64,
}

impl HwConfigBundle {
    pub fn en_sram_ifetch(&self) -> bool {
        self.feature_flags & FEATURE_EN_SRAM_IFETCH != 0
    }

    pub fn en_csrng_sw_app_read(&self) -> bool {
        self.feature_flags & FEATURE_EN_CSRNG_SW_APP_READ != 0
    }
}

/// Key material broadcast to the scrambling and key-derivation consumers.
///
/// Deliberately no `Debug`: key fields must not leak through formatting.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterialBundle {
    pub flash_addr_key: [u8; 32],
    pub flash_data_key: [u8; 32],
    pub sram_data_key: [u8; SECRET1_SRAM_DATA_KEY_LEN],
    pub creator_root_key_share0: [u8; SECRET2_CREATOR_KEY_SHARE_LEN],
    pub creator_root_key_share1: [u8; SECRET2_CREATOR_KEY_SHARE_LEN],
    /// Secret1 (flash/SRAM keys) has been provisioned: stored digest is
    /// non-zero.
    pub secret1_valid: bool,
    /// Secret2 (creator root key) has been provisioned.
    pub secret2_valid: bool,
}

impl KeyMaterialBundle {
    fn redacted() -> Self {
        KeyMaterialBundle {
            flash_addr_key: [REDACTED_BYTE; 32],
            flash_data_key: [REDACTED_BYTE; 32],
            sram_data_key: [REDACTED_BYTE; SECRET1_SRAM_DATA_KEY_LEN],
            creator_root_key_share0: [REDACTED_BYTE; SECRET2_CREATOR_KEY_SHARE_LEN],
            creator_root_key_share1: [REDACTED_BYTE; SECRET2_CREATOR_KEY_SHARE_LEN],
            secret1_valid: false,
            secret2_valid: false,
        }
    }
}

/// Raw life-cycle words for the life-cycle collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifeCycleBundle {
    pub lc_state: [u8; LC_STATE_LEN],
    pub lc_transition_cnt: [u8; LC_TRANSITION_CNT_LEN],
}

#[inline(always)]
fn field<const N: usize>(bytes: &[u8], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[offset..offset + N]);
    out
}

/// Assemble the hardware configuration bundle.
///
/// `NotValid` until every contributing partition has completed its first
/// read-back; stable values thereafter.
pub fn hw_config_bundle<M: OtpMedium>(
    ctrl: &AccessController<M>,
) -> Result<HwConfigBundle, BroadcastError> {
    for id in HW_CFG_CONTRIBUTORS {
        if !ctrl.is_init_done(id) {
            return Err(BroadcastError::NotValid);
        }
    }
    let bytes = ctrl
        .buffered_bytes(PartitionId::HwCfg)
        .ok_or(BroadcastError::NotValid)?;
    let flags = field::<8>(bytes, HW_CFG_FEATURE_FLAGS_OFFSET);
    Ok(HwConfigBundle {
        device_id: field(bytes, HW_CFG_DEVICE_ID_OFFSET),
        manuf_state: field(bytes, HW_CFG_MANUF_STATE_OFFSET),
        feature_flags: u64::from_le_bytes(flags),
    })
}

/// Assemble the key-material bundle. Never fails.
///
/// Each key field carries real bytes only while `release_permitted` is
/// asserted and its source partition is provisioned (non-zero digest);
/// otherwise the field holds the `REDACTED_BYTE` pattern. The valid flags are
/// reported either way.
pub fn key_material_bundle<M: OtpMedium>(
    ctrl: &AccessController<M>,
    release_permitted: bool,
) -> KeyMaterialBundle {
    let mut bundle = KeyMaterialBundle::redacted();
    bundle.secret1_valid = ctrl.stored_digest(PartitionId::Secret1) != 0;
    bundle.secret2_valid = ctrl.stored_digest(PartitionId::Secret2) != 0;

    if !release_permitted {
        log::debug!("key material withheld: release not permitted");
        return bundle;
    }
    if bundle.secret1_valid {
        if let Some(bytes) = ctrl.buffered_bytes(PartitionId::Secret1) {
            bundle.flash_addr_key = field(bytes, SECRET1_FLASH_ADDR_KEY_OFFSET);
            bundle.flash_data_key = field(bytes, SECRET1_FLASH_DATA_KEY_OFFSET);
            bundle.sram_data_key = field(bytes, SECRET1_SRAM_DATA_KEY_OFFSET);
        }
    }
    if bundle.secret2_valid {
        if let Some(bytes) = ctrl.buffered_bytes(PartitionId::Secret2) {
            bundle.creator_root_key_share0 = field(bytes, SECRET2_CREATOR_KEY_SHARE0_OFFSET);
            bundle.creator_root_key_share1 = field(bytes, SECRET2_CREATOR_KEY_SHARE1_OFFSET);
        }
    }
    bundle
}

/// Assemble the life-cycle words for the life-cycle collaborator.
pub fn life_cycle_bundle<M: OtpMedium>(
    ctrl: &AccessController<M>,
) -> Result<LifeCycleBundle, BroadcastError> {
    let bytes = ctrl
        .buffered_bytes(PartitionId::LifeCycle)
        .ok_or(BroadcastError::NotValid)?;
    Ok(LifeCycleBundle {
        lc_state: field(bytes, LC_STATE_OFFSET),
        lc_transition_cnt: field(bytes, LC_TRANSITION_CNT_OFFSET),
    })
}
