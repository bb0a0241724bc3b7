//! Fault descriptions and their temporal behaviour.

use std::fmt;

use crate::common::addr::{Addr, MAX_TICK, Tick};

/// How a fault behaves over time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Reasserted on every touch of the faulty location.
    Permanent,
    /// Corrupts the location once, on the first read after the window opens.
    Transient,
    /// Active during its window; the original byte is restored after it closes.
    Intermittent,
}

impl FaultKind {
    /// Parses the numeric (`0`, `1`, `2`) or named form used in fault lists.
    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "0" | "permanent" => Some(Self::Permanent),
            "1" | "transient" => Some(Self::Transient),
            "2" | "intermittent" => Some(Self::Intermittent),
            _ => None,
        }
    }
}

/// The value a faulty bit is forced to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StuckAt {
    /// The bit reads as 0.
    Zero,
    /// The bit reads as 1.
    One,
}

/// Where a fault lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultLocation {
    /// A block address; the fault follows the data wherever it is cached or carried.
    Address(Addr),
    /// A physical slot of the tag store.
    Slot {
        /// Set index.
        set: usize,
        /// Way index.
        way: usize,
    },
}

/// What applying a fault did to its byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultEvent {
    /// The bit was forced to its stuck-at value.
    Flipped,
    /// The byte saved at activation was written back.
    Restored,
}

/// One fault from a fault list, with its injection state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultSpec {
    /// Temporal behaviour.
    pub kind: FaultKind,
    /// Faulty block.
    pub location: FaultLocation,
    /// Byte within the block.
    pub byte_offset: usize,
    /// Bit within the byte, `0..8`.
    pub bit_offset: u8,
    /// Forced bit value.
    pub stuck_at: StuckAt,
    /// First tick of the activation window.
    pub tick_start: Tick,
    /// Last tick of the activation window.
    pub tick_end: Tick,
    /// Name of the cache the fault belongs to.
    pub owner: String,
    injected: bool,
    recovered: bool,
    altered_byte: Option<u8>,
}

impl FaultSpec {
    /// Creates a fault that is active at every tick.
    pub fn new(
        kind: FaultKind,
        location: FaultLocation,
        byte_offset: usize,
        bit_offset: u8,
        stuck_at: StuckAt,
        owner: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            location,
            byte_offset,
            bit_offset,
            stuck_at,
            tick_start: 0,
            tick_end: MAX_TICK,
            owner: owner.into(),
            injected: false,
            recovered: false,
            altered_byte: None,
        }
    }

    /// Restricts the fault to `[start, end]`.
    #[must_use]
    pub const fn with_window(mut self, start: Tick, end: Tick) -> Self {
        self.tick_start = start;
        self.tick_end = end;
        self
    }

    /// The fault has corrupted its byte at least once.
    pub const fn is_injected(&self) -> bool {
        self.injected
    }

    /// An intermittent fault has restored its byte.
    pub const fn is_recovered(&self) -> bool {
        self.recovered
    }

    /// Byte value saved when an intermittent fault first activated.
    pub const fn altered_byte(&self) -> Option<u8> {
        self.altered_byte
    }

    /// Address of the faulty byte.
    ///
    /// `None` for slot faults and for offsets that run past the address space.
    pub fn target_addr(&self) -> Option<Addr> {
        match self.location {
            FaultLocation::Address(blk_addr) => blk_addr.checked_add(self.byte_offset as Addr),
            FaultLocation::Slot { .. } => None,
        }
    }

    /// Returns `true` if the faulty byte lies inside `[addr, addr + size)`.
    ///
    /// Only address-located faults can be matched against a packet.
    pub fn is_faulty_address(&self, addr: Addr, size: usize) -> bool {
        self.target_addr()
            .is_some_and(|target| target >= addr && target - addr < size as Addr)
    }

    /// Applies the fault to the byte it targets.
    ///
    /// # Arguments
    ///
    /// * `byte` - The faulty byte, in a block or a packet.
    /// * `is_read` - The touch is a read.
    /// * `now` - Current tick.
    ///
    /// # Returns
    ///
    /// What happened to the byte, or `None` if the fault was dormant.
    pub fn apply(&mut self, byte: &mut u8, is_read: bool, now: Tick) -> Option<FaultEvent> {
        match self.kind {
            FaultKind::Permanent => {
                flip_bit(byte, self.bit_offset, self.stuck_at);
                self.injected = true;
                Some(FaultEvent::Flipped)
            }
            FaultKind::Transient => {
                if is_read && !self.injected && now >= self.tick_start {
                    flip_bit(byte, self.bit_offset, self.stuck_at);
                    self.injected = true;
                    Some(FaultEvent::Flipped)
                } else {
                    None
                }
            }
            FaultKind::Intermittent => {
                if self.recovered {
                    None
                } else if now >= self.tick_start && now <= self.tick_end {
                    if !self.injected {
                        self.altered_byte = Some(*byte);
                        self.injected = true;
                    }
                    flip_bit(byte, self.bit_offset, self.stuck_at);
                    Some(FaultEvent::Flipped)
                } else if now > self.tick_end && self.injected {
                    if let Some(original) = self.altered_byte {
                        *byte = original;
                    }
                    self.recovered = true;
                    Some(FaultEvent::Restored)
                } else {
                    None
                }
            }
        }
    }
}

impl fmt::Display for FaultSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            FaultLocation::Address(addr) => write!(f, "{:?} @{addr:#x}", self.kind)?,
            FaultLocation::Slot { set, way } => write!(f, "{:?} @{set}:{way}", self.kind)?,
        }
        write!(
            f,
            " byte {} bit {} stuck-at-{} [{}, {}] ({})",
            self.byte_offset,
            self.bit_offset,
            u8::from(self.stuck_at == StuckAt::One),
            self.tick_start,
            self.tick_end,
            self.owner
        )
    }
}

/// Forces one bit of `byte` to the stuck-at value.
///
/// Stuck-at-0 clears the bit with an AND-NOT mask; stuck-at-1 sets it with an OR mask.
pub const fn flip_bit(byte: &mut u8, bit_offset: u8, stuck_at: StuckAt) {
    let mask = 1u8 << bit_offset;
    match stuck_at {
        StuckAt::Zero => *byte &= !mask,
        StuckAt::One => *byte |= mask,
    }
}
