//! Admission and eviction policy
//!
//! Cost-bounded TinyLFU: when admitting a newcomer would exceed `max_cost`,
//! a handful of resident entries is sampled and the least frequently read one
//! becomes the eviction candidate. The newcomer only gets in if the sketch
//! says it is read at least as often as every candidate it displaces.
//!
//! The policy is owned by the cache's bookkeeping task, so it needs no locking.

use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use super::sketch::FrequencySketch;

/// Resident entries examined per eviction round
const SAMPLE_SIZE: usize = 5;

/// Outcome of an admission request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission<K> {
    /// Admitted; the listed keys were evicted to make room
    Admitted { victims: Vec<K> },
    /// Dropped; nothing changed
    Rejected,
}

#[derive(Debug, Clone, Copy)]
struct Resident {
    slot: usize,
    cost: u64,
}

/// Frequency-aware admission/eviction bookkeeping for one cache
#[derive(Debug)]
pub struct AdmissionPolicy<K> {
    sketch: FrequencySketch,
    residents: HashMap<K, Resident>,
    // slot -> (key, hash), for O(1) random sampling
    slots: Vec<(K, u64)>,
    used: u64,
    max_cost: u64,
}

impl<K> AdmissionPolicy<K>
where
    K: Hash + Eq + Clone,
{
    pub fn new(num_counters: usize, max_cost: u64) -> Self {
        Self {
            sketch: FrequencySketch::new(num_counters),
            residents: HashMap::new(),
            slots: Vec::new(),
            used: 0,
            max_cost,
        }
    }

    /// Record read accesses
    pub fn record_access(&mut self, hashes: &[u64]) {
        for &hash in hashes {
            self.sketch.increment(hash);
        }
    }

    pub fn contains(&self, key: &K) -> bool {
        self.residents.contains_key(key)
    }

    pub fn used_cost(&self) -> u64 {
        self.used
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Ask to admit a key; a resident key just has its cost updated
    pub fn admit(&mut self, key: K, hash: u64, cost: u64) -> Admission<K> {
        if cost > self.max_cost {
            return Admission::Rejected;
        }
        if self.residents.contains_key(&key) {
            let victims = self.update(&key, cost);
            return Admission::Admitted { victims };
        }

        let mut victims = Vec::new();
        if self.used + cost > self.max_cost {
            let incoming = self.sketch.estimate(hash);
            let mut chosen: HashSet<usize> = HashSet::new();
            let mut freed = 0u64;

            while self.used - freed + cost > self.max_cost {
                let Some((slot, frequency)) = self.sample_victim(&chosen) else {
                    return Admission::Rejected;
                };
                // ties go to the newcomer
                if incoming < frequency {
                    return Admission::Rejected;
                }
                chosen.insert(slot);
                let victim = &self.slots[slot].0;
                freed += self.residents.get(victim).map(|r| r.cost).unwrap_or(0);
                victims.push(victim.clone());
            }

            for victim in &victims {
                self.remove(victim);
            }
        }

        self.insert(key, hash, cost);
        Admission::Admitted { victims }
    }

    /// Change the cost of a resident key, evicting others if the budget is now exceeded
    pub fn update(&mut self, key: &K, cost: u64) -> Vec<K> {
        let Some(resident) = self.residents.get_mut(key) else {
            return Vec::new();
        };
        self.used = self.used - resident.cost + cost;
        resident.cost = cost;

        let mut victims = Vec::new();
        while self.used > self.max_cost {
            // the updated key itself is never its own victim; its slot moves as others go
            let exclude = HashSet::from([self.residents[key].slot]);
            let Some((slot, _)) = self.sample_victim(&exclude) else {
                break;
            };
            let victim = self.slots[slot].0.clone();
            self.remove(&victim);
            victims.push(victim);
        }
        victims
    }

    /// Forget a key, returning its cost
    pub fn remove(&mut self, key: &K) -> Option<u64> {
        let resident = self.residents.remove(key)?;
        self.slots.swap_remove(resident.slot);
        if let Some((moved, _)) = self.slots.get(resident.slot) {
            if let Some(r) = self.residents.get_mut(moved) {
                r.slot = resident.slot;
            }
        }
        self.used -= resident.cost;
        Some(resident.cost)
    }

    fn insert(&mut self, key: K, hash: u64, cost: u64) {
        let slot = self.slots.len();
        self.slots.push((key.clone(), hash));
        self.residents.insert(key, Resident { slot, cost });
        self.used += cost;
    }

    /// Least frequent of up to `SAMPLE_SIZE` residents not in `exclude`
    fn sample_victim(&self, exclude: &HashSet<usize>) -> Option<(usize, u8)> {
        let len = self.slots.len();
        if len == 0 {
            return None;
        }

        let start = rand::thread_rng().gen_range(0..len);
        let mut best: Option<(usize, u8)> = None;
        let mut sampled = 0;

        for offset in 0..len {
            let slot = (start + offset) % len;
            if exclude.contains(&slot) {
                continue;
            }
            let frequency = self.sketch.estimate(self.slots[slot].1);
            if best.map_or(true, |(_, f)| frequency < f) {
                best = Some((slot, frequency));
            }
            sampled += 1;
            if sampled == SAMPLE_SIZE {
                break;
            }
        }

        best
    }
}
