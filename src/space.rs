//! Position domain and spacing constants.
//!
//! Positions live in the 32-bit signed range but are carried as `i64` so
//! that `target + spacing + spread` never overflows before clamping.

use std::ops::Range;

use crate::config::OrderingConfig;

/// Numeric position of an item among its siblings
pub type Position = i64;

/// Lowest representable position
pub const POSITION_FLOOR: Position = i32::MIN as Position;

/// Highest representable position
pub const POSITION_CEILING: Position = i32::MAX as Position;

/// Base distance between neighbours for appends and rebalanced lists
pub const BASE_SPACING: Position = 10_000;

/// Lower bound (inclusive) of the first position in an empty scope
pub const SEED_MIN: Position = 1_000;

/// Upper bound (exclusive) of the first position in an empty scope
pub const SEED_MAX: Position = 10_000;

/// Random spread added when inserting after the last sibling
pub const AFTER_LAST_SPREAD: Position = 2_500;

/// Random spread added when appending to the end of a scope
pub const END_SPREAD: Position = 5_000;

/// Bounds and spacing used by the allocator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumericSpace {
    pub floor: Position,
    pub ceiling: Position,
    pub spacing: Position,
    pub seed_min: Position,
    pub seed_max: Position,
    pub after_last_spread: Position,
    pub end_spread: Position,
}

impl Default for NumericSpace {
    fn default() -> Self {
        Self {
            floor: POSITION_FLOOR,
            ceiling: POSITION_CEILING,
            spacing: BASE_SPACING,
            seed_min: SEED_MIN,
            seed_max: SEED_MAX,
            after_last_spread: AFTER_LAST_SPREAD,
            end_spread: END_SPREAD,
        }
    }
}

impl NumericSpace {
    pub fn from_config(config: &OrderingConfig) -> Self {
        Self {
            spacing: config.spacing,
            seed_min: config.seed_min,
            seed_max: config.seed_max,
            after_last_spread: config.after_last_spread,
            end_spread: config.end_spread,
            ..Self::default()
        }
    }

    /// Saturate a value into the representable domain
    pub fn clamp(&self, value: Position) -> Position {
        value.clamp(self.floor, self.ceiling)
    }

    pub fn contains(&self, value: Position) -> bool {
        (self.floor..=self.ceiling).contains(&value)
    }

    /// Range used for the first item of an empty scope
    pub fn seed_range(&self) -> Range<Position> {
        self.seed_min..self.seed_max
    }
}
