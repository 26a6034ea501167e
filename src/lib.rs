#![cfg_attr(not(feature = "std"), no_std)]

//! Logical core of a one-time-programmable (OTP) secure partition controller.
//!
//! The crate owns everything between the physical fuse macro and the rest of
//! the device: a fixed write-once partition layout (`layout`), keyed
//! scrambling of secret partitions (`scramble`), standard and chained
//! integrity digests (`digest`), per-partition digest-based read/write
//! locking (`access`), and gated broadcast of typed configuration bundles to
//! hardware consumers (`broadcast`).
//!
//! The physical program/read primitive, the bus transport, and life-cycle
//! transition logic are external collaborators reached through the
//! `medium::OtpMedium` and `fault::FaultSink` seams and the explicit
//! release-permission parameter on the key-material broadcast.

extern crate alloc;

#[cfg(not(feature = "std"))]
use core::panic::PanicInfo;

#[cfg(not(feature = "std"))]
#[panic_handler]
fn panic(_info: &PanicInfo) -> ! { loop {} }

pub mod core;
pub mod layout;
pub mod scramble;
pub mod digest;
pub mod medium;
pub mod access;
pub mod broadcast;
pub mod fault;
pub mod config;

#[cfg(not(feature = "std"))]
#[no_mangle]
pub extern "C" fn fusevault_version() -> u32 {
    0x000300
}

#[cfg(feature = "std")]
#[no_mangle]
pub extern "C" fn fusevault_version_std() -> u32 {
    0x000300
}
