//! DEX venue definitions

use alloy::primitives::Address;
use std::collections::HashMap;

/// A family of constant-product pools under one factory.
/// Immutable for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct Venue {
    pub name: String,
    pub factory: Address,
    /// Swap fee as a numerator/denominator pair, e.g. 997/1000 for 0.3%.
    pub fee_num: u32,
    pub fee_den: u32,
}

impl Venue {
    /// Fee taken on a swap, as a fraction of the input amount.
    pub fn fee_fraction(&self) -> f64 {
        1.0 - self.fee_num as f64 / self.fee_den as f64
    }
}

#[derive(Debug, Clone, Default)]
pub struct VenueSet {
    venues: Vec<Venue>,
    by_name: HashMap<String, usize>,
}

impl VenueSet {
    pub fn new(venues: Vec<Venue>) -> Self {
        let by_name = venues
            .iter()
            .enumerate()
            .map(|(i, v)| (v.name.clone(), i))
            .collect();
        Self { venues, by_name }
    }

    pub fn get(&self, name: &str) -> Option<&Venue> {
        self.by_name.get(name).map(|&i| &self.venues[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Venue> {
        self.venues.iter()
    }

    pub fn len(&self) -> usize {
        self.venues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.venues.is_empty()
    }
}
