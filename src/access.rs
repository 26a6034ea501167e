//! Per-partition access control.
//!
//! The `AccessController` owns the storage medium handle and one
//! `PartitionState` per catalog entry; every read, write, digest computation
//! and integrity check is mediated here. No other component mutates lock
//! state or stored digests.
//!
//! # Lock model
//! Each partition is `Open` until a digest-compute operation stores a digest,
//! which transitions it to `Locked` exactly once. `Locked` is terminal: the
//! digest word lives in write-once storage, so the transition survives reset
//! (`initialize()` re-derives it from a non-zero stored digest) and nothing
//! short of re-initializing the medium itself reopens a partition. Whether
//! `Locked` denies reads, writes or both is a per-partition catalog flag.
//!
//! # Integrity
//! Digest computation and verification always read the array back through the
//! medium (descrambling secret partitions) rather than trusting the local
//! cache, and chained partitions fold in their predecessors' digests
//! recomputed the same way, so physical tampering anywhere upstream surfaces
//! on verification.
//!
//! # Concurrency
//! All operations take `&self`/`&mut self`; exclusive ownership serializes
//! the multi-step digest sequences against writes on the same partition.
//! Operations never block and are not cancellable mid-flight.

extern crate alloc;
use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

use zeroize::Zeroize;

use crate::config::ControllerConfig;
use crate::digest;
use crate::fault::{FaultKind, FaultSink};
use crate::layout::{self, PartitionId, DIGEST_CHAIN, PARTITION_COUNT};
use crate::medium::{MediumError, OtpMedium};
use crate::scramble::ScramblingEngine;

/// Errors returned by access-controller operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessError {
    /// Partition is locked and its catalog entry freezes reads.
    ReadLocked,
    /// Partition is locked and its catalog entry freezes writes.
    WriteLocked,
    /// A digest was already computed and the partition is locked.
    AlreadyLocked,
    /// Recomputed digest disagrees with the stored digest. Security-relevant;
    /// also pushed to the registered fault sinks. Never retry.
    IntegrityMismatch,
    /// Buffered partition has not completed its first read-back.
    NotReady,
    /// Requested range falls outside the partition's data region.
    OutOfBounds,
    /// Secret partition access must be aligned to the scrambling block width.
    Unaligned,
    /// The storage collaborator failed.
    Medium(MediumError),
}

impl fmt::Display for AccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessError::ReadLocked => write!(f, "Partition is read locked"),
            AccessError::WriteLocked => write!(f, "Partition is write locked"),
            AccessError::AlreadyLocked => write!(f, "Partition digest already computed"),
            AccessError::IntegrityMismatch => write!(f, "Partition integrity mismatch"),
            AccessError::NotReady => write!(f, "Partition not initialized"),
            AccessError::OutOfBounds => write!(f, "Range outside partition data region"),
            AccessError::Unaligned => write!(f, "Secret access not block aligned"),
            AccessError::Medium(e) => write!(f, "Storage medium error: {}", e),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for AccessError {}

/// Lock state of one partition. Strictly one-directional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockState {
    #[default]
    Open,
    Locked,
}

/// Mutable per-partition state. Private to this module; mutated only through
/// controller operations.
#[derive(Default)]
struct PartitionState {
    /// Plaintext data region cache; populated at init for buffered
    /// partitions, empty otherwise.
    cache: Vec<u8>,
    /// Last stored digest; zero means none computed yet.
    stored_digest: u64,
    lock_state: LockState,
    /// First full read-back after reset has completed.
    init_done: bool,
}

/// The partition controller core.
pub struct AccessController<M: OtpMedium> {
    medium: M,
    scrambler: ScramblingEngine,
    config: ControllerConfig,
    states: [PartitionState; PARTITION_COUNT],
    sinks: Vec<Box<dyn FaultSink>>,
    initialized: bool,
}

impl<M: OtpMedium> AccessController<M> {
    /// Controller with built-in scrambling keys and default configuration.
    pub fn new(medium: M) -> Self {
        Self::with_config(medium, ScramblingEngine::default(), ControllerConfig::default())
    }

    pub fn with_config(
        medium: M,
        scrambler: ScramblingEngine,
        config: ControllerConfig,
    ) -> Self {
        debug_assert!(layout::check_catalog().is_ok());
        assert!(
            medium.capacity() >= layout::OTP_CAPACITY,
            "medium smaller than the partition layout"
        );
        AccessController {
            medium,
            scrambler,
            config,
            states: core::array::from_fn(|_| PartitionState::default()),
            sinks: Vec::new(),
            initialized: false,
        }
    }

    /// Register a receiver for fatal faults.
    pub fn register_fault_sink(&mut self, sink: Box<dyn FaultSink>) {
        self.sinks.push(sink);
    }

    /// First full read-back after reset.
    ///
    /// Loads stored digests for every digest-bearing partition and re-derives
    /// `Locked` from a non-zero value, populates the plaintext caches of
    /// buffered partitions, then (config-gated) verifies the integrity of
    /// every locked `integrity` partition. Idempotent; a second call is a
    /// no-op.
    pub fn initialize(&mut self) -> Result<(), AccessError> {
        if self.initialized {
            log::debug!("initialize: already done");
            return Ok(());
        }
        for id in PartitionId::ALL {
            let desc = id.descriptor();
            if desc.has_digest() {
                let stored = self.read_stored_digest(id)?;
                self.states[id.index()].stored_digest = stored;
                if stored != 0 {
                    self.states[id.index()].lock_state = LockState::Locked;
                    log::info!(
                        "partition {:?}: provisioned, digest {}",
                        id,
                        hex::encode(stored.to_be_bytes())
                    );
                }
            }
            if desc.is_buffered() {
                let plain = self.read_data_region_plain(id)?;
                self.states[id.index()].cache = plain;
                self.states[id.index()].init_done = true;
            }
        }
        if self.config.verify_on_init {
            for id in PartitionId::ALL {
                let desc = id.descriptor();
                if desc.integrity && self.is_locked(id) {
                    self.verify_integrity(id)?;
                }
            }
        }
        self.initialized = true;
        log::info!("partition controller initialized");
        Ok(())
    }

    /// Read `len` bytes at `offset` within the data region of `id`.
    ///
    /// Secret partitions return descrambled plaintext; ciphertext never
    /// leaves this layer.
    pub fn read(&self, id: PartitionId, offset: usize, len: usize) -> Result<Vec<u8>, AccessError> {
        let desc = id.descriptor();
        if self.is_locked(id) && desc.read_lock {
            log::warn!("partition {:?}: read denied, read locked", id);
            return Err(AccessError::ReadLocked);
        }
        let end = offset.checked_add(len).ok_or(AccessError::OutOfBounds)?;
        if end > desc.data_len() {
            return Err(AccessError::OutOfBounds);
        }
        if desc.is_buffered() {
            let state = &self.states[id.index()];
            if !state.init_done {
                return Err(AccessError::NotReady);
            }
            return Ok(state.cache[offset..end].to_vec());
        }
        // Unbuffered partitions are read through; the catalog guarantees
        // they are never secret.
        let mut out = vec![0u8; len];
        self.medium
            .read(desc.offset + offset, &mut out)
            .map_err(|e| self.medium_fault(id, e))?;
        Ok(out)
    }

    /// Program `data` at `offset` within the data region of `id`.
    ///
    /// Secret payloads are scrambled before programming and must be aligned
    /// to the block width. A write does not invalidate a previously stored
    /// digest; staleness is detected by `verify_integrity`.
    pub fn write(
        &mut self,
        id: PartitionId,
        offset: usize,
        data: &[u8],
    ) -> Result<(), AccessError> {
        let desc = id.descriptor();
        if self.is_locked(id) && desc.write_lock {
            log::warn!("partition {:?}: write denied, write locked", id);
            return Err(AccessError::WriteLocked);
        }
        let end = offset.checked_add(data.len()).ok_or(AccessError::OutOfBounds)?;
        if end > desc.data_len() {
            return Err(AccessError::OutOfBounds);
        }
        if desc.secret {
            if offset % layout::DIGEST_LEN != 0 || data.len() % layout::DIGEST_LEN != 0 {
                return Err(AccessError::Unaligned);
            }
            let key_sel = desc.key_sel.expect("catalog: secret without key");
            let mut scrambled = data.to_vec();
            self.scrambler.encrypt_in_place(key_sel, &mut scrambled);
            let result = self.medium.program(desc.offset + offset, &scrambled);
            scrambled.zeroize();
            if let Err(e) = result {
                return Err(self.medium_fault(id, e));
            }
        } else if let Err(e) = self.medium.program(desc.offset + offset, data) {
            return Err(self.medium_fault(id, e));
        }
        let state = &mut self.states[id.index()];
        if state.init_done {
            state.cache[offset..end].copy_from_slice(data);
        }
        log::debug!("partition {:?}: wrote {} bytes at {:#x}", id, data.len(), offset);
        Ok(())
    }

    /// Compute the partition digest over the current array contents, store it
    /// durably, and lock the partition. One-way and not repeatable: a second
    /// call returns `AlreadyLocked` and leaves the stored digest untouched.
    pub fn compute_and_lock_digest(&mut self, id: PartitionId) -> Result<u64, AccessError> {
        let desc = id.descriptor();
        if !desc.has_digest() {
            panic!("partition {:?} has no digest configuration", id);
        }
        if self.is_locked(id) {
            log::warn!("partition {:?}: digest recompute rejected", id);
            return Err(AccessError::AlreadyLocked);
        }
        let computed = self.digest_over_current(id)?;
        let digest_offset = desc.digest_offset().expect("digest-bearing partition");
        if let Err(e) = self.medium.program(digest_offset, &computed.to_le_bytes()) {
            return Err(self.medium_fault(id, e));
        }
        let state = &mut self.states[id.index()];
        state.stored_digest = computed;
        state.lock_state = LockState::Locked;
        log::info!(
            "partition {:?}: Open -> Locked, digest {}",
            id,
            hex::encode(computed.to_be_bytes())
        );
        Ok(computed)
    }

    /// Recompute the digest over the current array contents and compare with
    /// the stored digest in constant time. A mismatch is reported to every
    /// registered fault sink and must be treated as fatal by the caller.
    pub fn verify_integrity(&self, id: PartitionId) -> Result<(), AccessError> {
        let desc = id.descriptor();
        if !desc.has_digest() {
            panic!("partition {:?} has no digest configuration", id);
        }
        let computed = self.digest_over_current(id)?;
        let stored = self.states[id.index()].stored_digest;
        if digest::ct_eq_digest(computed, stored) {
            log::debug!("partition {:?}: integrity ok", id);
            Ok(())
        } else {
            log::error!(
                "partition {:?}: integrity mismatch, stored {} computed {}",
                id,
                hex::encode(stored.to_be_bytes()),
                hex::encode(computed.to_be_bytes())
            );
            self.report_fault(FaultKind::IntegrityMismatch { partition: id });
            Err(AccessError::IntegrityMismatch)
        }
    }

    /// Whether a buffered partition has completed its first read-back.
    pub fn is_init_done(&self, id: PartitionId) -> bool {
        self.states[id.index()].init_done
    }

    /// Current lock state of `id`.
    pub fn lock_state(&self, id: PartitionId) -> LockState {
        self.states[id.index()].lock_state
    }

    /// Last stored digest of `id`; zero means none computed yet.
    pub fn stored_digest(&self, id: PartitionId) -> u64 {
        self.states[id.index()].stored_digest
    }

    /// Plaintext cache of a buffered partition, once initialized. Internal:
    /// the broadcast layer projects from this without the software-facing
    /// read-lock check, mirroring the hardware broadcast path.
    pub(crate) fn buffered_bytes(&self, id: PartitionId) -> Option<&[u8]> {
        let state = &self.states[id.index()];
        if id.descriptor().is_buffered() && state.init_done {
            Some(&state.cache)
        } else {
            None
        }
    }

    /// Borrow the storage collaborator.
    pub fn medium(&self) -> &M {
        &self.medium
    }

    /// Mutably borrow the storage collaborator. Writes through this handle
    /// bypass access control entirely; it models the physical attack surface
    /// for simulation and fault-injection harnesses, not an API path.
    pub fn medium_mut(&mut self) -> &mut M {
        &mut self.medium
    }

    #[inline(always)]
    fn is_locked(&self, id: PartitionId) -> bool {
        self.states[id.index()].lock_state == LockState::Locked
    }

    fn report_fault(&self, fault: FaultKind) {
        for sink in &self.sinks {
            sink.on_fault(fault);
        }
    }

    fn medium_fault(&self, id: PartitionId, error: MediumError) -> AccessError {
        self.report_fault(FaultKind::MediumFailure {
            partition: id,
            error,
        });
        AccessError::Medium(error)
    }

    fn read_stored_digest(&self, id: PartitionId) -> Result<u64, AccessError> {
        let offset = id
            .descriptor()
            .digest_offset()
            .expect("digest-bearing partition");
        let mut word = [0u8; layout::DIGEST_LEN];
        self.medium
            .read(offset, &mut word)
            .map_err(|e| self.medium_fault(id, e))?;
        Ok(u64::from_le_bytes(word))
    }

    /// Read the full data region of `id` back from the medium, descrambling
    /// secret partitions. Never consults the cache.
    fn read_data_region_plain(&self, id: PartitionId) -> Result<Vec<u8>, AccessError> {
        let desc = id.descriptor();
        let mut data = vec![0u8; desc.data_len()];
        self.medium
            .read(desc.offset, &mut data)
            .map_err(|e| self.medium_fault(id, e))?;
        if desc.secret {
            let key_sel = desc.key_sel.expect("catalog: secret without key");
            self.scrambler.decrypt_in_place(key_sel, &mut data);
        }
        Ok(data)
    }

    /// Digest of `id` over current array contents, chain-aware: for members
    /// of the digest chain the predecessors' digests are recomputed from
    /// their current bytes, so upstream tampering propagates.
    fn digest_over_current(&self, id: PartitionId) -> Result<u64, AccessError> {
        let chain_pos = DIGEST_CHAIN.iter().position(|&p| p == id);
        let mut iv = None;
        if let Some(pos) = chain_pos {
            for &member in &DIGEST_CHAIN[..pos] {
                let mut bytes = self.read_data_region_plain(member)?;
                iv = Some(digest::compute(member, &bytes, iv));
                bytes.zeroize();
            }
        }
        let mut bytes = self.read_data_region_plain(id)?;
        let d = digest::compute(id, &bytes, iv);
        bytes.zeroize();
        Ok(d)
    }
}

impl<M: OtpMedium> Drop for AccessController<M> {
    fn drop(&mut self) {
        if !self.config.wipe_cache_on_drop {
            return;
        }
        for id in PartitionId::ALL {
            if id.descriptor().secret {
                self.states[id.index()].cache.zeroize();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::medium::RamMedium;
    use alloc::rc::Rc;
    use core::cell::RefCell;

    fn ready_controller() -> AccessController<RamMedium> {
        let mut ctrl = AccessController::new(RamMedium::new());
        ctrl.initialize().unwrap();
        ctrl
    }

    struct RecordingSink {
        faults: Rc<RefCell<Vec<FaultKind>>>,
    }

    impl FaultSink for RecordingSink {
        fn on_fault(&self, fault: FaultKind) {
            self.faults.borrow_mut().push(fault);
        }
    }

    #[test]
    fn test_unbuffered_write_lock_read_cycle() {
        let mut ctrl = ready_controller();
        let payload: Vec<u8> = (0u8..64).collect();
        ctrl.write(PartitionId::CreatorCfg, 0, &payload).unwrap();
        assert_eq!(ctrl.read(PartitionId::CreatorCfg, 0, 64).unwrap(), payload);

        ctrl.compute_and_lock_digest(PartitionId::CreatorCfg).unwrap();
        assert_eq!(
            ctrl.write(PartitionId::CreatorCfg, 0, &payload),
            Err(AccessError::WriteLocked)
        );
        // read_lock is not set for this partition.
        assert_eq!(ctrl.read(PartitionId::CreatorCfg, 0, 64).unwrap(), payload);
    }

    #[test]
    fn test_lock_denies_writes_iff_flag_set() {
        let mut ctrl = ready_controller();
        // VendorTest stores a digest but freezes nothing; the vendor test
        // area stays mutable after bookkeeping.
        ctrl.write(PartitionId::VendorTest, 0, &[0x01; 8]).unwrap();
        ctrl.compute_and_lock_digest(PartitionId::VendorTest).unwrap();
        assert_eq!(ctrl.lock_state(PartitionId::VendorTest), LockState::Locked);
        ctrl.write(PartitionId::VendorTest, 0, &[0x02; 8]).unwrap();

        // CreatorCfg freezes writes on lock.
        ctrl.compute_and_lock_digest(PartitionId::CreatorCfg).unwrap();
        assert_eq!(
            ctrl.write(PartitionId::CreatorCfg, 0, &[0x02; 8]),
            Err(AccessError::WriteLocked)
        );
    }

    #[test]
    fn test_lifecycle_partition_never_locks_writes() {
        let mut ctrl = ready_controller();
        ctrl.write(PartitionId::LifeCycle, 0, &[0xAB; 8]).unwrap();
        ctrl.write(PartitionId::LifeCycle, 0, &[0xCD; 8]).unwrap();
        assert_eq!(ctrl.read(PartitionId::LifeCycle, 0, 8).unwrap(), vec![0xCD; 8]);
    }

    #[test]
    fn test_second_digest_request_rejected() {
        let mut ctrl = ready_controller();
        ctrl.write(PartitionId::OwnerCfg, 0, &[0x11; 32]).unwrap();
        let first = ctrl.compute_and_lock_digest(PartitionId::OwnerCfg).unwrap();
        assert_ne!(first, 0);
        assert_eq!(
            ctrl.compute_and_lock_digest(PartitionId::OwnerCfg),
            Err(AccessError::AlreadyLocked)
        );
        assert_eq!(ctrl.stored_digest(PartitionId::OwnerCfg), first);
    }

    #[test]
    fn test_secret_partition_scrambled_at_rest() {
        let mut ctrl = ready_controller();
        let token = [0x5Au8; 16];
        ctrl.write(PartitionId::Secret0, 0, &token).unwrap();

        // Reads return plaintext.
        assert_eq!(ctrl.read(PartitionId::Secret0, 0, 16).unwrap(), token);

        // The array holds ciphertext.
        let offset = PartitionId::Secret0.descriptor().offset;
        let at_rest = &ctrl.medium().image()[offset..offset + 16];
        assert_ne!(at_rest, &token[..]);
    }

    #[test]
    fn test_secret_read_locked_after_digest() {
        let mut ctrl = ready_controller();
        ctrl.write(PartitionId::Secret0, 0, &[0x77; 32]).unwrap();
        ctrl.compute_and_lock_digest(PartitionId::Secret0).unwrap();
        assert_eq!(
            ctrl.read(PartitionId::Secret0, 0, 16),
            Err(AccessError::ReadLocked)
        );
        assert_eq!(
            ctrl.write(PartitionId::Secret0, 0, &[0u8; 8]),
            Err(AccessError::WriteLocked)
        );
    }

    #[test]
    fn test_verify_integrity_detects_corruption() {
        let faults = Rc::new(RefCell::new(Vec::new()));
        let mut ctrl = AccessController::new(RamMedium::new());
        ctrl.register_fault_sink(Box::new(RecordingSink {
            faults: Rc::clone(&faults),
        }));
        ctrl.initialize().unwrap();

        ctrl.write(PartitionId::CreatorCfg, 0, &[0x3C; 48]).unwrap();
        ctrl.compute_and_lock_digest(PartitionId::CreatorCfg).unwrap();
        ctrl.verify_integrity(PartitionId::CreatorCfg).unwrap();

        let offset = PartitionId::CreatorCfg.descriptor().offset;
        ctrl.medium_mut().program(offset, &[0xFF]).unwrap();

        assert_eq!(
            ctrl.verify_integrity(PartitionId::CreatorCfg),
            Err(AccessError::IntegrityMismatch)
        );
        assert_eq!(
            *faults.borrow(),
            vec![FaultKind::IntegrityMismatch {
                partition: PartitionId::CreatorCfg
            }]
        );
    }

    #[test]
    fn test_chained_digest_detects_upstream_tamper() {
        let mut ctrl = ready_controller();
        ctrl.write(PartitionId::Secret0, 0, &[0x21; 32]).unwrap();
        ctrl.write(PartitionId::Secret1, 0, &[0x43; 80]).unwrap();
        ctrl.compute_and_lock_digest(PartitionId::Secret0).unwrap();
        ctrl.compute_and_lock_digest(PartitionId::Secret1).unwrap();
        ctrl.verify_integrity(PartitionId::Secret1).unwrap();

        // Flip one byte of Secret0 in the array. Secret1's own bytes are
        // untouched, but its chained digest must no longer verify.
        let offset = PartitionId::Secret0.descriptor().offset;
        let tampered = ctrl.medium().image()[offset] ^ 0x01;
        ctrl.medium_mut().program(offset, &[tampered]).unwrap();

        assert_eq!(
            ctrl.verify_integrity(PartitionId::Secret1),
            Err(AccessError::IntegrityMismatch)
        );
    }

    #[test]
    fn test_lock_rederived_after_reset() {
        let image = {
            let mut ctrl = ready_controller();
            ctrl.write(PartitionId::OwnerCfg, 0, &[0x66; 16]).unwrap();
            ctrl.compute_and_lock_digest(PartitionId::OwnerCfg).unwrap();
            ctrl.medium().image().to_vec()
        };

        let mut ctrl = AccessController::new(RamMedium::from_image(image));
        assert_eq!(ctrl.lock_state(PartitionId::OwnerCfg), LockState::Open);
        ctrl.initialize().unwrap();
        assert_eq!(ctrl.lock_state(PartitionId::OwnerCfg), LockState::Locked);
        assert_eq!(
            ctrl.write(PartitionId::OwnerCfg, 0, &[0u8; 8]),
            Err(AccessError::WriteLocked)
        );
    }

    #[test]
    fn test_init_verifies_locked_partitions() {
        let image = {
            let mut ctrl = ready_controller();
            ctrl.write(PartitionId::CreatorCfg, 0, &[0x12; 24]).unwrap();
            ctrl.compute_and_lock_digest(PartitionId::CreatorCfg).unwrap();
            let mut image = ctrl.medium().image().to_vec();
            // Corrupt a data byte behind the stored digest.
            image[PartitionId::CreatorCfg.descriptor().offset] ^= 0x80;
            image
        };

        let mut ctrl = AccessController::new(RamMedium::from_image(image));
        assert_eq!(ctrl.initialize(), Err(AccessError::IntegrityMismatch));
    }

    #[test]
    fn test_bounds_and_alignment() {
        let mut ctrl = ready_controller();
        let data_len = PartitionId::CreatorCfg.descriptor().data_len();
        // The stored digest is not addressable through the data surface.
        assert_eq!(
            ctrl.read(PartitionId::CreatorCfg, data_len, 8),
            Err(AccessError::OutOfBounds)
        );
        assert_eq!(
            ctrl.write(PartitionId::CreatorCfg, data_len - 4, &[0u8; 8]),
            Err(AccessError::OutOfBounds)
        );
        assert_eq!(
            ctrl.write(PartitionId::Secret0, 0, &[0u8; 7]),
            Err(AccessError::Unaligned)
        );
        assert_eq!(
            ctrl.write(PartitionId::Secret0, 4, &[0u8; 8]),
            Err(AccessError::Unaligned)
        );
    }

    #[test]
    fn test_buffered_read_requires_init() {
        let ctrl = AccessController::new(RamMedium::new());
        assert_eq!(
            ctrl.read(PartitionId::HwCfg, 0, 8),
            Err(AccessError::NotReady)
        );
    }

    #[test]
    fn test_buffered_cache_tracks_writes() {
        let mut ctrl = ready_controller();
        let mut flags = [0u8; 8];
        flags[0] = 0x01;
        flags[5] = 0xE0; // reserved bits round-trip untouched
        ctrl.write(
            PartitionId::HwCfg,
            layout::HW_CFG_FEATURE_FLAGS_OFFSET,
            &flags,
        )
        .unwrap();
        assert_eq!(
            ctrl.read(PartitionId::HwCfg, layout::HW_CFG_FEATURE_FLAGS_OFFSET, 8)
                .unwrap(),
            flags
        );
    }
}
