//! Fixed partition layout of the OTP address space.
//!
//! The catalog is a compiled-in table: one `PartitionDescriptor` per member of
//! the closed `PartitionId` enumeration, ordered by offset. Nothing here is
//! mutable or dynamically sized; an id that is not in the enumeration cannot
//! be expressed, so "unknown partition" is not a runtime error anywhere in
//! the crate.
//!
//! # Layout
//! Digest-bearing partitions reserve their trailing 8 bytes for the stored
//! digest word; the byte range visible through the access layer is the data
//! region in front of it. The tail of the address space past the last
//! partition is unallocated spare.

use crate::core::speck64::BLOCK_LEN;

/// Total size of the OTP address space in bytes.
pub const OTP_CAPACITY: usize = 0x400;

/// Size of a stored digest word in bytes.
pub const DIGEST_LEN: usize = 8;

/// Number of partitions in the catalog.
pub const PARTITION_COUNT: usize = 8;

/// Closed enumeration of all partitions, ordered by offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PartitionId {
    /// Vendor test words; excluded from integrity checking.
    VendorTest,
    /// Creator-controlled software configuration.
    CreatorCfg,
    /// Owner-controlled software configuration.
    OwnerCfg,
    /// Hardware configuration broadcast to the rest of the device.
    HwCfg,
    /// Test unlock/exit tokens.
    Secret0,
    /// Flash and SRAM scrambling seeds.
    Secret1,
    /// RMA token and creator root key shares.
    Secret2,
    /// Life-cycle state and transition counter; owned by the life-cycle
    /// collaborator.
    LifeCycle,
}

impl PartitionId {
    /// All partitions in catalog (offset) order.
    pub const ALL: [PartitionId; PARTITION_COUNT] = [
        PartitionId::VendorTest,
        PartitionId::CreatorCfg,
        PartitionId::OwnerCfg,
        PartitionId::HwCfg,
        PartitionId::Secret0,
        PartitionId::Secret1,
        PartitionId::Secret2,
        PartitionId::LifeCycle,
    ];

    /// Dense index into per-partition state tables.
    #[inline(always)]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Descriptor lookup. Pure; cannot fail.
    #[inline(always)]
    pub fn descriptor(self) -> &'static PartitionDescriptor {
        &CATALOG[self.index()]
    }
}

/// Buffering behavior of a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionVariant {
    /// Read-through; no local cache.
    Unbuffered,
    /// Contents cached at initialization and broadcast to consumers.
    Buffered,
    /// Cached like `Buffered`, but the contents belong to the life-cycle
    /// collaborator.
    LifeCycle,
}

/// Scrambling key selector for secret partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySel {
    Secret0Key,
    Secret1Key,
    Secret2Key,
}

/// Digest constant/IV family selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestSet {
    SwCfg,
    HwCfg,
    Secret,
}

/// Immutable, compiled-in description of one partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionDescriptor {
    pub id: PartitionId,
    pub variant: PartitionVariant,
    /// Byte offset of the partition within the OTP address space.
    pub offset: usize,
    /// Total size in bytes, including the trailing digest word if present.
    pub size: usize,
    /// Scrambling key; `Some` iff `secret`.
    pub key_sel: Option<KeySel>,
    /// Digest constant/IV family; `Some` iff a digest flag is set.
    pub digest_set: Option<DigestSet>,
    /// Contents are scrambled at rest.
    pub secret: bool,
    /// Digest computed on a software-issued command.
    pub sw_digest: bool,
    /// Digest computed by the controller logic itself.
    pub hw_digest: bool,
    /// A stored digest freezes writes.
    pub write_lock: bool,
    /// A stored digest freezes reads.
    pub read_lock: bool,
    /// Stored digest is checked against the array contents.
    pub integrity: bool,
    /// Contents feed the key-material broadcast.
    pub key_material: bool,
}

impl PartitionDescriptor {
    /// Whether this partition carries a stored digest word.
    #[inline(always)]
    pub fn has_digest(&self) -> bool {
        self.sw_digest || self.hw_digest
    }

    /// Length of the caller-visible data region in bytes.
    #[inline(always)]
    pub fn data_len(&self) -> usize {
        if self.has_digest() {
            self.size - DIGEST_LEN
        } else {
            self.size
        }
    }

    /// Absolute offset of the stored digest word, if any.
    #[inline(always)]
    pub fn digest_offset(&self) -> Option<usize> {
        if self.has_digest() {
            Some(self.offset + self.size - DIGEST_LEN)
        } else {
            None
        }
    }

    /// Whether the partition holds a local plaintext cache after init.
    #[inline(always)]
    pub fn is_buffered(&self) -> bool {
        !matches!(self.variant, PartitionVariant::Unbuffered)
    }
}

/// The partition catalog, indexed by `PartitionId::index()`.
pub const CATALOG: [PartitionDescriptor; PARTITION_COUNT] = [
    PartitionDescriptor {
        id: PartitionId::VendorTest,
        variant: PartitionVariant::Unbuffered,
        offset: 0x000,
        size: 64,
        key_sel: None,
        digest_set: Some(DigestSet::SwCfg),
        secret: false,
        sw_digest: true,
        hw_digest: false,
        write_lock: false,
        read_lock: false,
        integrity: false,
        key_material: false,
    },
    PartitionDescriptor {
        id: PartitionId::CreatorCfg,
        variant: PartitionVariant::Unbuffered,
        offset: 0x040,
        size: 192,
        key_sel: None,
        digest_set: Some(DigestSet::SwCfg),
        secret: false,
        sw_digest: true,
        hw_digest: false,
        write_lock: true,
        read_lock: false,
        integrity: true,
        key_material: false,
    },
    PartitionDescriptor {
        id: PartitionId::OwnerCfg,
        variant: PartitionVariant::Unbuffered,
        offset: 0x100,
        size: 192,
        key_sel: None,
        digest_set: Some(DigestSet::SwCfg),
        secret: false,
        sw_digest: true,
        hw_digest: false,
        write_lock: true,
        read_lock: false,
        integrity: true,
        key_material: false,
    },
    PartitionDescriptor {
        id: PartitionId::HwCfg,
        variant: PartitionVariant::Buffered,
        offset: 0x1C0,
        size: 80,
        key_sel: None,
        digest_set: Some(DigestSet::HwCfg),
        secret: false,
        sw_digest: false,
        hw_digest: true,
        write_lock: true,
        read_lock: false,
        integrity: true,
        key_material: false,
    },
    PartitionDescriptor {
        id: PartitionId::Secret0,
        variant: PartitionVariant::Buffered,
        offset: 0x210,
        size: 40,
        key_sel: Some(KeySel::Secret0Key),
        digest_set: Some(DigestSet::Secret),
        secret: true,
        sw_digest: false,
        hw_digest: true,
        write_lock: true,
        read_lock: true,
        integrity: true,
        key_material: false,
    },
    PartitionDescriptor {
        id: PartitionId::Secret1,
        variant: PartitionVariant::Buffered,
        offset: 0x238,
        size: 88,
        key_sel: Some(KeySel::Secret1Key),
        digest_set: Some(DigestSet::Secret),
        secret: true,
        sw_digest: false,
        hw_digest: true,
        write_lock: true,
        read_lock: true,
        integrity: true,
        key_material: true,
    },
    PartitionDescriptor {
        id: PartitionId::Secret2,
        variant: PartitionVariant::Buffered,
        offset: 0x290,
        size: 88,
        key_sel: Some(KeySel::Secret2Key),
        digest_set: Some(DigestSet::Secret),
        secret: true,
        sw_digest: false,
        hw_digest: true,
        write_lock: true,
        read_lock: true,
        integrity: true,
        key_material: true,
    },
    PartitionDescriptor {
        id: PartitionId::LifeCycle,
        variant: PartitionVariant::LifeCycle,
        offset: 0x2E8,
        size: 48,
        key_sel: None,
        digest_set: None,
        secret: false,
        sw_digest: false,
        hw_digest: false,
        write_lock: false,
        read_lock: false,
        integrity: false,
        key_material: false,
    },
];

/// Chained-digest order: each member's digest folds the previous member's
/// digest in as its initial value. A linear chain, first element uses the
/// fixed IV of its digest set.
pub const DIGEST_CHAIN: [PartitionId; 3] = [
    PartitionId::Secret0,
    PartitionId::Secret1,
    PartitionId::Secret2,
];

/// Predecessor of `id` in the digest chain, if `id` is a non-initial chain
/// member.
pub fn chain_predecessor(id: PartitionId) -> Option<PartitionId> {
    let pos = DIGEST_CHAIN.iter().position(|&p| p == id)?;
    if pos == 0 {
        None
    } else {
        Some(DIGEST_CHAIN[pos - 1])
    }
}

// Field offsets within partition data regions. Wire/persisted-format detail;
// correctness never relies on in-memory layout.
pub const HW_CFG_DEVICE_ID_OFFSET: usize = 0;
pub const HW_CFG_DEVICE_ID_LEN: usize = 32;
pub const HW_CFG_MANUF_STATE_OFFSET: usize = 32;
pub const HW_CFG_MANUF_STATE_LEN: usize = 32;
pub const HW_CFG_FEATURE_FLAGS_OFFSET: usize = 64;

pub const SECRET1_FLASH_ADDR_KEY_OFFSET: usize = 0;
pub const SECRET1_FLASH_DATA_KEY_OFFSET: usize = 32;
pub const SECRET1_SRAM_DATA_KEY_OFFSET: usize = 64;
pub const SECRET1_SRAM_DATA_KEY_LEN: usize = 16;

pub const SECRET2_RMA_TOKEN_OFFSET: usize = 0;
pub const SECRET2_RMA_TOKEN_LEN: usize = 16;
pub const SECRET2_CREATOR_KEY_SHARE0_OFFSET: usize = 16;
pub const SECRET2_CREATOR_KEY_SHARE1_OFFSET: usize = 48;
pub const SECRET2_CREATOR_KEY_SHARE_LEN: usize = 32;

pub const LC_STATE_OFFSET: usize = 0;
pub const LC_STATE_LEN: usize = 32;
pub const LC_TRANSITION_CNT_OFFSET: usize = 32;
pub const LC_TRANSITION_CNT_LEN: usize = 16;

/// Validate the catalog invariants.
///
/// The catalog is compiled in, so a violation is a build-time defect; this is
/// asserted once at controller construction and exercised by the test below.
pub fn check_catalog() -> Result<(), &'static str> {
    let mut end = 0usize;
    for (i, d) in CATALOG.iter().enumerate() {
        if d.id.index() != i {
            return Err("catalog order does not match PartitionId order");
        }
        if d.offset % BLOCK_LEN != 0 || d.size % BLOCK_LEN != 0 {
            return Err("partition range not block aligned");
        }
        if d.offset < end {
            return Err("partition ranges overlap");
        }
        end = d.offset + d.size;
        if end > OTP_CAPACITY {
            return Err("partition exceeds OTP capacity");
        }
        if d.secret != d.key_sel.is_some() {
            return Err("secret flag and key selector disagree");
        }
        if d.secret && !matches!(d.variant, PartitionVariant::Buffered) {
            return Err("secret partitions must be buffered");
        }
        if d.has_digest() != d.digest_set.is_some() {
            return Err("digest flags and digest set disagree");
        }
        if d.sw_digest && d.hw_digest {
            return Err("sw and hw digest are mutually exclusive");
        }
        if d.integrity && !d.has_digest() {
            return Err("integrity requires a digest");
        }
        if (d.read_lock || d.write_lock) && !d.has_digest() {
            return Err("lock flags require a digest to latch on");
        }
        if d.has_digest() && d.size <= DIGEST_LEN {
            return Err("digest-bearing partition has no data region");
        }
    }
    // The chain must be linear over distinct digest-bearing partitions.
    for (i, &p) in DIGEST_CHAIN.iter().enumerate() {
        if !p.descriptor().has_digest() {
            return Err("chain member has no digest");
        }
        if DIGEST_CHAIN[..i].contains(&p) {
            return Err("digest chain is not acyclic");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_invariants() {
        check_catalog().unwrap();
    }

    #[test]
    fn test_descriptor_lookup() {
        for id in PartitionId::ALL {
            assert_eq!(id.descriptor().id, id);
        }
        let d = PartitionId::Secret1.descriptor();
        assert!(d.secret);
        assert_eq!(d.key_sel, Some(KeySel::Secret1Key));
        assert_eq!(d.data_len(), 80);
        assert_eq!(d.digest_offset(), Some(0x238 + 88 - DIGEST_LEN));
    }

    #[test]
    fn test_chain_order() {
        assert_eq!(chain_predecessor(PartitionId::Secret0), None);
        assert_eq!(
            chain_predecessor(PartitionId::Secret1),
            Some(PartitionId::Secret0)
        );
        assert_eq!(
            chain_predecessor(PartitionId::Secret2),
            Some(PartitionId::Secret1)
        );
        assert_eq!(chain_predecessor(PartitionId::HwCfg), None);
    }

    #[test]
    fn test_life_cycle_field_layout() {
        let d = PartitionId::LifeCycle.descriptor();
        assert_eq!(d.data_len(), LC_STATE_LEN + LC_TRANSITION_CNT_LEN);
    }
}
