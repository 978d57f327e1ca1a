//! Post-write gap detection.

use serde::Serialize;

use crate::config::RebalanceConfig;
use crate::error::Result;
use crate::item::Scope;
use crate::rebalance::RebalanceDispatcher;
use crate::space::Position;
use crate::store::OrderedListStore;

/// Whether a write is an ordinary mutation or part of a rebalance pass.
///
/// Passed explicitly down the write path; `Rebalancing` suppresses the
/// trigger so a rebalance never schedules itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WriteMode {
    #[default]
    Normal,
    Rebalancing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RebalanceReason {
    /// Smallest positive gap fell below the threshold
    MinGap { gap: Position },
    /// Largest position passed the high-water mark
    HighWater { max: Position },
}

#[derive(Debug, Clone, Copy)]
pub struct RebalanceTrigger {
    pub min_siblings: usize,
    pub min_gap: Position,
    pub high_water_mark: Position,
}

impl Default for RebalanceTrigger {
    fn default() -> Self {
        Self::from_config(&RebalanceConfig::default())
    }
}

impl RebalanceTrigger {
    pub fn from_config(config: &RebalanceConfig) -> Self {
        Self {
            min_siblings: config.min_siblings,
            min_gap: config.min_gap,
            high_water_mark: config.high_water_mark,
        }
    }

    /// Heuristic over a set of sibling positions (any order)
    pub fn evaluate_positions(&self, positions: &[Position]) -> Option<RebalanceReason> {
        if positions.len() < self.min_siblings {
            return None;
        }

        let mut sorted = positions.to_vec();
        sorted.sort_unstable();

        let min_positive_gap = sorted
            .windows(2)
            .map(|pair| pair[1] - pair[0])
            .filter(|gap| *gap > 0)
            .min();
        if let Some(gap) = min_positive_gap {
            if gap < self.min_gap {
                return Some(RebalanceReason::MinGap { gap });
            }
        }

        let max = sorted.last().copied()?;
        if max > self.high_water_mark {
            return Some(RebalanceReason::HighWater { max });
        }

        None
    }

    pub fn evaluate<S>(&self, store: &S, scope: &Scope) -> Result<Option<RebalanceReason>>
    where
        S: OrderedListStore + ?Sized,
    {
        let positions: Vec<Position> = store
            .kept_siblings(scope, None)?
            .iter()
            .map(|item| item.position)
            .collect();
        Ok(self.evaluate_positions(&positions))
    }

    pub fn should_rebalance<S>(&self, store: &S, scope: &Scope) -> Result<bool>
    where
        S: OrderedListStore + ?Sized,
    {
        Ok(self.evaluate(store, scope)?.is_some())
    }

    /// Run after a finalized write; enqueue a rebalance when warranted.
    pub fn after_write<S>(
        &self,
        store: &S,
        scope: &Scope,
        mode: WriteMode,
        dispatcher: &dyn RebalanceDispatcher,
    ) -> Result<Option<RebalanceReason>>
    where
        S: OrderedListStore + ?Sized,
    {
        if mode == WriteMode::Rebalancing {
            tracing::trace!(%scope, "trigger suppressed during rebalance");
            return Ok(None);
        }

        let reason = self.evaluate(store, scope)?;
        if let Some(reason) = reason {
            tracing::info!(%scope, ?reason, "scheduling rebalance");
            dispatcher.enqueue(scope.clone());
        }
        Ok(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_sets_never_trigger() {
        let trigger = RebalanceTrigger::default();
        let crowded: Vec<Position> = (1..10).collect();
        assert_eq!(trigger.evaluate_positions(&crowded), None);
        assert_eq!(trigger.evaluate_positions(&[]), None);
    }

    #[test]
    fn unit_gaps_trigger() {
        let trigger = RebalanceTrigger::default();
        let positions: Vec<Position> = (1..=12).collect();
        assert_eq!(
            trigger.evaluate_positions(&positions),
            Some(RebalanceReason::MinGap { gap: 1 })
        );
    }

    #[test]
    fn healthy_spacing_does_not_trigger() {
        let trigger = RebalanceTrigger::default();
        let positions: Vec<Position> = (1..=20).map(|i| i * 10_000).collect();
        assert_eq!(trigger.evaluate_positions(&positions), None);

        let mut tight: Vec<Position> = (1..=20).map(|i| i * 2).collect();
        assert_eq!(trigger.evaluate_positions(&tight), None);
        tight.push(41);
        assert_eq!(
            trigger.evaluate_positions(&tight),
            Some(RebalanceReason::MinGap { gap: 1 })
        );
    }

    #[test]
    fn exact_ties_are_not_positive_gaps() {
        let trigger = RebalanceTrigger::default();
        let mut positions: Vec<Position> = (1..=10).map(|i| i * 10_000).collect();
        positions.push(50_000);
        assert_eq!(trigger.evaluate_positions(&positions), None);
    }

    #[test]
    fn high_water_mark_triggers() {
        let trigger = RebalanceTrigger::default();
        let mut positions: Vec<Position> = (1..=10).map(|i| i * 10_000).collect();
        positions.push(2_000_000_001);
        assert_eq!(
            trigger.evaluate_positions(&positions),
            Some(RebalanceReason::HighWater { max: 2_000_000_001 })
        );
    }

    #[test]
    fn input_order_does_not_matter() {
        let trigger = RebalanceTrigger::default();
        let positions: Vec<Position> = (1..=12).rev().collect();
        assert!(trigger.evaluate_positions(&positions).is_some());
    }
}
