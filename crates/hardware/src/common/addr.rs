//! Address, tick and cycle types.
//!
//! This module defines the scalar types shared by every component of the cache model:
//! 1. **Addresses:** Byte addresses in the simulated physical address space.
//! 2. **Time:** Absolute simulation ticks and relative clock cycles.
//! 3. **Block Arithmetic:** Alignment and offset helpers for power-of-two block sizes.

/// A byte address in the simulated physical address space.
pub type Addr = u64;

/// An absolute point in simulated time.
pub type Tick = u64;

/// A duration expressed in clock cycles of the owning component.
pub type Cycles = u64;

/// Identifier of the component that issued a request (a core, a prefetcher, a lower cache).
pub type RequestorId = u16;

/// The largest representable tick; used as "never".
pub const MAX_TICK: Tick = Tick::MAX;

/// Returns `true` if `n` is a non-zero power of two.
#[inline(always)]
pub const fn is_power_of_two(n: u64) -> bool {
    n != 0 && (n & (n - 1)) == 0
}

/// Floor of the base-2 logarithm of `n`.
///
/// # Arguments
///
/// * `n` - A non-zero value.
///
/// # Returns
///
/// The position of the most significant set bit (`floor_log2(1) == 0`).
#[inline(always)]
pub const fn floor_log2(n: u64) -> u32 {
    63 - n.leading_zeros()
}

/// Aligns `addr` down to the start of its block.
///
/// # Arguments
///
/// * `addr` - Any byte address.
/// * `blk_size` - Block size in bytes; must be a power of two.
#[inline(always)]
pub const fn block_align(addr: Addr, blk_size: usize) -> Addr {
    addr & !(blk_size as Addr - 1)
}

/// Returns the offset of `addr` within its block.
#[inline(always)]
pub const fn block_offset(addr: Addr, blk_size: usize) -> usize {
    (addr & (blk_size as Addr - 1)) as usize
}
