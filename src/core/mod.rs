//! Constant-time primitives shared by the scrambling and digest layers.

pub mod speck64;
