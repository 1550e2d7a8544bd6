//! Phase identifiers and per-phase values
//!
//! Every current in the balancer is tracked per electrical line. A
//! [`PerPhase`] always carries all three lines, so a partially populated
//! phase map cannot be constructed.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Index, IndexMut};

/// Current in whole amps
pub type Amps = i32;

/// One of the three electrical lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Phase {
    L1,
    L2,
    L3,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::L1, Phase::L2, Phase::L3];
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::L1 => write!(f, "L1"),
            Phase::L2 => write!(f, "L2"),
            Phase::L3 => write!(f, "L3"),
        }
    }
}

/// A value for each of L1, L2 and L3
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PerPhase<T> {
    #[serde(rename = "L1")]
    pub l1: T,
    #[serde(rename = "L2")]
    pub l2: T,
    #[serde(rename = "L3")]
    pub l3: T,
}

impl<T> PerPhase<T> {
    pub fn new(l1: T, l2: T, l3: T) -> Self {
        Self { l1, l2, l3 }
    }

    pub fn get(&self, phase: Phase) -> &T {
        match phase {
            Phase::L1 => &self.l1,
            Phase::L2 => &self.l2,
            Phase::L3 => &self.l3,
        }
    }

    pub fn set(&mut self, phase: Phase, value: T) {
        self[phase] = value;
    }

    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> PerPhase<U> {
        PerPhase {
            l1: f(self.l1),
            l2: f(self.l2),
            l3: f(self.l3),
        }
    }

    /// Combine two per-phase values line by line
    pub fn zip_with<U, V>(self, other: PerPhase<U>, mut f: impl FnMut(T, U) -> V) -> PerPhase<V> {
        PerPhase {
            l1: f(self.l1, other.l1),
            l2: f(self.l2, other.l2),
            l3: f(self.l3, other.l3),
        }
    }

    /// Iterate as `(phase, value)` pairs in L1, L2, L3 order
    pub fn iter(&self) -> impl Iterator<Item = (Phase, &T)> {
        Phase::ALL.into_iter().map(move |phase| (phase, self.get(phase)))
    }
}

impl<T: Clone> PerPhase<T> {
    /// Same value on every phase
    pub fn uniform(value: T) -> Self {
        Self {
            l1: value.clone(),
            l2: value.clone(),
            l3: value,
        }
    }
}

impl<T: Copy + Ord> PerPhase<T> {
    /// Smallest of the three values
    pub fn min(&self) -> T {
        self.l1.min(self.l2).min(self.l3)
    }
}

impl<T: PartialEq> PerPhase<T> {
    pub fn is_uniform(&self) -> bool {
        self.l1 == self.l2 && self.l2 == self.l3
    }
}

impl<T> Index<Phase> for PerPhase<T> {
    type Output = T;

    fn index(&self, phase: Phase) -> &T {
        self.get(phase)
    }
}

impl<T> IndexMut<Phase> for PerPhase<T> {
    fn index_mut(&mut self, phase: Phase) -> &mut T {
        match phase {
            Phase::L1 => &mut self.l1,
            Phase::L2 => &mut self.l2,
            Phase::L3 => &mut self.l3,
        }
    }
}

impl<T: fmt::Display> fmt::Display for PerPhase<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{L1: {}, L2: {}, L3: {}}}", self.l1, self.l2, self.l3)
    }
}
