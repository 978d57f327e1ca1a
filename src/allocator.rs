//! Position allocation for top / after / end-of-list placement.
//!
//! The placement math lives in free functions over `(bounds, rng, jitter)`
//! so it can be exercised with a seeded generator. `PositionAllocator`
//! wraps them with store reads. There is no allocation lock: randomized
//! values make concurrent writers unlikely to collide, and the rare
//! collision is left for the rebalance worker to spread out.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::error::Result;
use crate::item::{PlacementIntention, Scope};
use crate::space::{NumericSpace, Position};
use crate::store::OrderedListStore;

/// Sub-unit jitter in `[0, 1)` added to between-sibling placements
pub trait JitterSource: Send {
    fn sample(&mut self) -> f64;
}

/// Jitter read from the fractional second of the wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct ClockJitter;

impl JitterSource for ClockJitter {
    fn sample(&mut self) -> f64 {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.subsec_nanos())
            .unwrap_or(0);
        f64::from(nanos) / 1_000_000_000.0
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedJitter(pub f64);

impl JitterSource for FixedJitter {
    fn sample(&mut self) -> f64 {
        self.0
    }
}

/// How a position was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Placement {
    /// First item of an empty scope
    Seed,
    BeforeFirst { min: Position },
    Between { target: Position, next: Position },
    /// Gap of one or less; duplicate or near-duplicate accepted
    Crowded { target: Position, next: Position },
    AfterLast { target: Position },
    End { max: Position },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Allocation {
    pub position: Position,
    pub placement: Placement,
}

fn seed_position<R: Rng + ?Sized>(space: &NumericSpace, rng: &mut R) -> Position {
    space.clamp(rng.gen_range(space.seed_range()))
}

/// Draw from `[min - spacing, min)`, clamped to the floor
pub fn top_position<R: Rng + ?Sized>(
    space: &NumericSpace,
    min: Option<Position>,
    rng: &mut R,
) -> Position {
    let Some(min) = min else {
        return seed_position(space, rng);
    };
    let low = space.clamp(min.saturating_sub(space.spacing));
    if low >= min {
        return space.floor;
    }
    rng.gen_range(low..min)
}

/// A value strictly between `target` and `next` when the gap allows it
///
/// The offset is drawn from the open middle half of the gap, then `jitter`
/// is added and the result rounded and clamped into `(target, next)`.
pub fn between_position<R: Rng + ?Sized>(
    space: &NumericSpace,
    target: Position,
    next: Position,
    jitter: f64,
    rng: &mut R,
) -> Position {
    let gap = next.saturating_sub(target);
    if gap <= 1 {
        return space.clamp(target.saturating_add(1));
    }

    let quarter = gap / 4;
    let three_quarters = gap * 3 / 4;
    let offset = if quarter + 1 < three_quarters {
        rng.gen_range(quarter + 1..three_quarters)
    } else {
        gap / 2
    };

    let jitter = if jitter.is_finite() {
        jitter.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let raw = ((target + offset) as f64 + jitter).round() as Position;
    raw.clamp(target + 1, next - 1)
}

/// `target + spacing + [0, after_last_spread)`
pub fn after_last_position<R: Rng + ?Sized>(
    space: &NumericSpace,
    target: Position,
    rng: &mut R,
) -> Position {
    let spread = rng.gen_range(0..space.after_last_spread);
    space.clamp(target.saturating_add(space.spacing).saturating_add(spread))
}

/// `max + spacing + [0, end_spread)`, or a seed value for an empty scope
pub fn end_position<R: Rng + ?Sized>(
    space: &NumericSpace,
    max: Option<Position>,
    rng: &mut R,
) -> Position {
    match max {
        Some(max) => {
            let spread = rng.gen_range(0..space.end_spread);
            space.clamp(max.saturating_add(space.spacing).saturating_add(spread))
        }
        None => seed_position(space, rng),
    }
}

pub struct PositionAllocator {
    space: NumericSpace,
    rng: StdRng,
    jitter: Box<dyn JitterSource>,
}

impl std::fmt::Debug for PositionAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PositionAllocator")
            .field("space", &self.space)
            .finish_non_exhaustive()
    }
}

impl PositionAllocator {
    pub fn new(space: NumericSpace) -> Self {
        Self {
            space,
            rng: StdRng::from_entropy(),
            jitter: Box::new(ClockJitter),
        }
    }

    /// Deterministic generator, for tests and replays
    pub fn seeded(space: NumericSpace, seed: u64) -> Self {
        Self {
            space,
            rng: StdRng::seed_from_u64(seed),
            jitter: Box::new(ClockJitter),
        }
    }

    pub fn with_jitter(mut self, jitter: impl JitterSource + 'static) -> Self {
        self.jitter = Box::new(jitter);
        self
    }

    pub fn space(&self) -> &NumericSpace {
        &self.space
    }

    /// Compute a position for an item in `scope`.
    ///
    /// `self_id` is left out of every sibling query so a moved item never
    /// collides with its own previous value. Unknown, tombstoned or
    /// out-of-scope `After` targets fall back to end-of-list.
    pub fn allocate<S>(
        &mut self,
        store: &S,
        scope: &Scope,
        intention: &PlacementIntention,
        self_id: Option<&str>,
    ) -> Result<Allocation>
    where
        S: OrderedListStore + ?Sized,
    {
        let allocation = match intention {
            PlacementIntention::Top => {
                let min = store.min_position(scope, self_id)?;
                let position = top_position(&self.space, min, &mut self.rng);
                let placement = match min {
                    Some(min) => Placement::BeforeFirst { min },
                    None => Placement::Seed,
                };
                Allocation { position, placement }
            }
            PlacementIntention::After(target_id) => {
                match self.resolve_target(store, scope, target_id, self_id)? {
                    Some(target) => self.after(store, scope, target, self_id)?,
                    None => {
                        tracing::debug!(
                            %scope,
                            target_id = %target_id,
                            "after target unusable, appending"
                        );
                        self.end(store, scope, self_id)?
                    }
                }
            }
            PlacementIntention::None => self.end(store, scope, self_id)?,
        };

        tracing::debug!(
            %scope,
            position = allocation.position,
            placement = ?allocation.placement,
            "position allocated"
        );
        Ok(allocation)
    }

    fn resolve_target<S>(
        &self,
        store: &S,
        scope: &Scope,
        target_id: &str,
        self_id: Option<&str>,
    ) -> Result<Option<Position>>
    where
        S: OrderedListStore + ?Sized,
    {
        if self_id == Some(target_id) {
            return Ok(None);
        }
        Ok(store
            .get(target_id)?
            .filter(|target| target.is_kept() && &target.scope == scope)
            .map(|target| target.position))
    }

    fn after<S>(
        &mut self,
        store: &S,
        scope: &Scope,
        target: Position,
        self_id: Option<&str>,
    ) -> Result<Allocation>
    where
        S: OrderedListStore + ?Sized,
    {
        let allocation = match store.next_sibling(scope, target, self_id)? {
            Some(next) => {
                let next = next.position;
                let jitter = self.jitter.sample();
                let position = between_position(&self.space, target, next, jitter, &mut self.rng);
                let placement = if next - target > 1 {
                    Placement::Between { target, next }
                } else {
                    Placement::Crowded { target, next }
                };
                Allocation { position, placement }
            }
            None => Allocation {
                position: after_last_position(&self.space, target, &mut self.rng),
                placement: Placement::AfterLast { target },
            },
        };
        Ok(allocation)
    }

    fn end<S>(&mut self, store: &S, scope: &Scope, self_id: Option<&str>) -> Result<Allocation>
    where
        S: OrderedListStore + ?Sized,
    {
        let max = store.max_position(scope, self_id)?;
        let position = end_position(&self.space, max, &mut self.rng);
        let placement = match max {
            Some(max) => Placement::End { max },
            None => Placement::Seed,
        };
        Ok(Allocation { position, placement })
    }
}
