//! Run statistics consumed by the CSV export.
//!
//! Negotiation samples are keyed by the ordered pair of ToM orders (seat 0,
//! seat 1), stored in fixed nine-slot tables.

use tomsim_agents::NegotiationReport;
use tomsim_types::{PopulationCounts, ToMOrder};

/// Number of ordered ToM-order pairs.
pub const ORDER_PAIRS: usize = 9;

/// Slot of the ordered pair `(first, second)`.
pub const fn pair_index(first: ToMOrder, second: ToMOrder) -> usize {
    first.index().saturating_mul(3).saturating_add(second.index())
}

/// Accumulated statistics of one phase.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Statistics {
    history: Vec<PopulationCounts>,
    dominance: [u64; 3],
    ages: [Vec<u64>; 3],
    lengths: [Vec<u32>; ORDER_PAIRS],
    endings: [Vec<i8>; ORDER_PAIRS],
    gains: [Vec<[i32; 2]>; ORDER_PAIRS],
}

impl Statistics {
    /// Empty statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a history row and credit every dominant order.
    pub fn record_counts(&mut self, counts: PopulationCounts) {
        for order in counts.dominant() {
            if let Some(slot) = self.dominance.get_mut(order.index()) {
                *slot = slot.saturating_add(1);
            }
        }
        self.history.push(counts);
    }

    /// Record the age of an agent that died or outlived the experiment.
    pub fn record_age(&mut self, order: ToMOrder, age: u64) {
        if let Some(column) = self.ages.get_mut(order.index()) {
            column.push(age);
        }
    }

    /// Record a finished negotiation.
    pub fn record_negotiation(&mut self, report: &NegotiationReport) {
        let [first, second] = report.orders;
        let slot = pair_index(first, second);
        if let Some(lengths) = self.lengths.get_mut(slot) {
            lengths.push(report.rounds);
        }
        if let Some(endings) = self.endings.get_mut(slot) {
            endings.push(report.ending.code());
        }
        if let (Some(gains), Some(pair)) = (self.gains.get_mut(slot), report.gains) {
            gains.push(pair);
        }
    }

    /// Population history, one row per tick plus boundary rows.
    pub fn history(&self) -> &[PopulationCounts] {
        &self.history
    }

    /// The most recent `count` history rows.
    pub fn recent_history(&self, count: usize) -> &[PopulationCounts] {
        let start = self.history.len().saturating_sub(count);
        self.history.get(start..).unwrap_or_default()
    }

    /// Ticks each order held the (possibly shared) largest population.
    pub const fn dominance(&self) -> [u64; 3] {
        self.dominance
    }

    /// Ages per order.
    pub const fn ages(&self) -> &[Vec<u64>; 3] {
        &self.ages
    }

    /// Negotiation lengths per pair.
    pub const fn lengths(&self) -> &[Vec<u32>; ORDER_PAIRS] {
        &self.lengths
    }

    /// Ending codes per pair.
    pub const fn endings(&self) -> &[Vec<i8>; ORDER_PAIRS] {
        &self.endings
    }

    /// Score gains `(seat 0, seat 1)` of accepted trades per pair.
    pub const fn gains(&self) -> &[Vec<[i32; 2]>; ORDER_PAIRS] {
        &self.gains
    }

    /// Total negotiations recorded.
    pub fn negotiation_count(&self) -> usize {
        self.lengths.iter().map(Vec::len).sum()
    }
}
