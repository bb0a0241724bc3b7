//! Fault-list parsing.
//!
//! One fault per line, whitespace separated. Blank lines and lines starting with
//! `#` are ignored. Three layouts are accepted:
//!
//! | Fields | Layout                                                                 |
//! |--------|------------------------------------------------------------------------|
//! | 8      | `kind blk_addr byte_off bit_off tick_start tick_end stuck_at owner`    |
//! | 5      | `kind entry_index byte_off bit_off owner`                              |
//! | 4      | `entry_index byte_off bit_off owner`                                   |
//!
//! `kind` is `0`/`permanent`, `1`/`transient` or `2`/`intermittent`. Entry indices
//! map to `set = index / assoc`, `way = index % assoc`. The two positional layouts
//! are always stuck-at-0 and active at every tick; the 4-field layout is permanent.
//! Addresses accept a `0x` prefix.

use super::model::{FaultKind, FaultLocation, FaultSpec, StuckAt};
use crate::common::addr::Addr;
use crate::common::error::FaultLineError;

/// Parses one line of a fault list.
///
/// # Arguments
///
/// * `line` - Raw line text.
/// * `assoc` - Associativity used to split entry indices into set and way.
///
/// # Returns
///
/// `Ok(None)` for blank and comment lines, the fault otherwise.
pub fn parse_line(line: &str, assoc: usize) -> Result<Option<FaultSpec>, FaultLineError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let fields: Vec<&str> = line.split_whitespace().collect();
    let spec = match fields.as_slice() {
        [kind, addr, byte, bit, start, end, stuck, owner] => {
            let (tick_start, tick_end) = (number("tick_start", start)?, number("tick_end", end)?);
            if tick_end < tick_start {
                return Err(FaultLineError::EmptyWindow {
                    start: tick_start,
                    end: tick_end,
                });
            }
            let stuck_at = match number("stuck_at", stuck)? {
                0 => StuckAt::Zero,
                1 => StuckAt::One,
                other => return Err(FaultLineError::StuckAtOutOfRange(other.min(255) as u8)),
            };
            let (blk_addr, byte_offset) = (number("blk_addr", addr)?, number("byte_offset", byte)?);
            if blk_addr.checked_add(byte_offset).is_none() {
                return Err(FaultLineError::AddressOverflow { blk_addr, byte_offset });
            }
            FaultSpec::new(
                parse_kind(kind)?,
                FaultLocation::Address(blk_addr),
                byte_offset as usize,
                bit_offset(bit)?,
                stuck_at,
                *owner,
            )
            .with_window(tick_start, tick_end)
        }
        [kind, index, byte, bit, owner] => FaultSpec::new(
            parse_kind(kind)?,
            slot(index, assoc)?,
            number("byte_offset", byte)? as usize,
            bit_offset(bit)?,
            StuckAt::Zero,
            *owner,
        ),
        [index, byte, bit, owner] => FaultSpec::new(
            FaultKind::Permanent,
            slot(index, assoc)?,
            number("byte_offset", byte)? as usize,
            bit_offset(bit)?,
            StuckAt::Zero,
            *owner,
        ),
        other => return Err(FaultLineError::FieldCount(other.len())),
    };
    Ok(Some(spec))
}

fn parse_kind(token: &str) -> Result<FaultKind, FaultLineError> {
    FaultKind::from_token(token).ok_or_else(|| FaultLineError::UnknownKind(token.to_owned()))
}

fn number(field: &'static str, token: &str) -> Result<u64, FaultLineError> {
    let parsed = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
        .map_or_else(|| token.parse::<Addr>(), |hex| Addr::from_str_radix(hex, 16));
    parsed.map_err(|_| FaultLineError::InvalidField {
        field,
        value: token.to_owned(),
    })
}

fn bit_offset(token: &str) -> Result<u8, FaultLineError> {
    let bit = number("bit_offset", token)?;
    if bit >= 8 {
        return Err(FaultLineError::BitOutOfRange(bit.min(255) as u8));
    }
    Ok(bit as u8)
}

fn slot(token: &str, assoc: usize) -> Result<FaultLocation, FaultLineError> {
    let index = number("entry_index", token)? as usize;
    let assoc = assoc.max(1);
    Ok(FaultLocation::Slot {
        set: index / assoc,
        way: index % assoc,
    })
}
