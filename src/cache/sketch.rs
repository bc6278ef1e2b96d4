//! Frequency sketch
//!
//! Count-min sketch with four rows of 4-bit counters. Estimates never
//! undercount; collisions only inflate them. After `sample_size` increments
//! every counter is halved so that old popularity fades.

use rand::Rng;

const DEPTH: usize = 4;
const MAX_COUNT: u8 = 15;

/// One row of packed 4-bit counters (two per byte)
#[derive(Debug, Clone)]
struct CounterRow {
    bytes: Vec<u8>,
}

impl CounterRow {
    fn new(width: usize) -> Self {
        Self {
            bytes: vec![0; width / 2],
        }
    }

    fn get(&self, slot: usize) -> u8 {
        (self.bytes[slot / 2] >> ((slot & 1) * 4)) & 0x0f
    }

    fn increment(&mut self, slot: usize) {
        let shift = (slot & 1) * 4;
        if (self.bytes[slot / 2] >> shift) & 0x0f < MAX_COUNT {
            self.bytes[slot / 2] += 1 << shift;
        }
    }

    fn halve(&mut self) {
        for byte in &mut self.bytes {
            *byte = (*byte >> 1) & 0x77;
        }
    }
}

/// Approximate per-key access counter
#[derive(Debug, Clone)]
pub struct FrequencySketch {
    rows: [CounterRow; DEPTH],
    seeds: [u64; DEPTH],
    mask: usize,
    additions: usize,
    sample_size: usize,
}

impl FrequencySketch {
    /// Create a sketch with at least `num_counters` counters per row
    pub fn new(num_counters: usize) -> Self {
        let width = num_counters.max(16).next_power_of_two();
        let mut rng = rand::thread_rng();

        Self {
            rows: std::array::from_fn(|_| CounterRow::new(width)),
            seeds: std::array::from_fn(|_| rng.gen()),
            mask: width - 1,
            additions: 0,
            sample_size: num_counters.max(1),
        }
    }

    /// Counters per row
    pub fn width(&self) -> usize {
        self.mask + 1
    }

    fn slot(&self, hash: u64, row: usize) -> usize {
        let mixed = (hash ^ self.seeds[row]).wrapping_mul(0x9E37_79B9_7F4A_7C15);
        (mixed >> 32) as usize & self.mask
    }

    /// Record one access
    pub fn increment(&mut self, hash: u64) {
        for row in 0..DEPTH {
            let slot = self.slot(hash, row);
            self.rows[row].increment(slot);
        }

        self.additions += 1;
        if self.additions >= self.sample_size {
            self.age();
        }
    }

    /// Estimated access count (0..=15)
    pub fn estimate(&self, hash: u64) -> u8 {
        (0..DEPTH)
            .map(|row| self.rows[row].get(self.slot(hash, row)))
            .min()
            .unwrap_or(0)
    }

    /// Halve every counter
    pub fn age(&mut self) {
        for row in &mut self.rows {
            row.halve();
        }
        self.additions /= 2;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_width_rounds_up() {
        assert_eq!(FrequencySketch::new(1000).width(), 1024);
        assert_eq!(FrequencySketch::new(1).width(), 16);
    }

    #[test]
    fn test_estimate_never_undercounts() {
        let mut sketch = FrequencySketch::new(4096);
        for hash in 0..200u64 {
            for _ in 0..(hash % 7) {
                sketch.increment(hash);
            }
        }
        for hash in 0..200u64 {
            assert!(sketch.estimate(hash) as u64 >= hash % 7);
        }
    }

    #[test]
    fn test_counter_saturates() {
        let mut sketch = FrequencySketch::new(1 << 16);
        for _ in 0..100 {
            sketch.increment(42);
        }
        assert_eq!(sketch.estimate(42), MAX_COUNT);
    }

    #[test]
    fn test_aging_halves_counts() {
        let mut sketch = FrequencySketch::new(1 << 16);
        for _ in 0..10 {
            sketch.increment(7);
        }
        assert_eq!(sketch.estimate(7), 10);
        sketch.age();
        assert_eq!(sketch.estimate(7), 5);
    }

    #[test]
    fn test_automatic_reset_after_sample_size() {
        let mut sketch = FrequencySketch::new(16);
        for _ in 0..15 {
            sketch.increment(1);
        }
        let before = sketch.estimate(1);
        // 16th addition triggers aging
        sketch.increment(1);
        assert!(sketch.estimate(1) < before);
    }
}
