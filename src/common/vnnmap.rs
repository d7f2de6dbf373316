//! The routing map ("vnn map"), §3.

use super::node::Pnn;

/// `generation == 0` is reserved and must never be produced by
/// `new_generation`.
pub const INVALID_GENERATION: u32 = 0;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VnnMap {
    pub generation: u32,
    pub size: u32,
    pub map: Vec<Pnn>,
}

impl VnnMap {
    pub fn new(generation: u32, map: Vec<Pnn>) -> Self {
        VnnMap { generation, size: map.len() as u32, map }
    }

    /// `size == num_active` and every active pnn appears in `map`.
    pub fn is_consistent_with(&self, active_pnns: &[Pnn]) -> bool {
        self.size as usize == active_pnns.len()
            && active_pnns.iter().all(|pnn| self.map.contains(pnn))
    }
}

/// Draws a new, non-zero random generation stamp, retrying until it is
/// non-zero.
pub fn new_generation() -> u32 {
    loop {
        let candidate: u32 = rand::random();
        if candidate != INVALID_GENERATION {
            return candidate;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_generation_is_never_invalid() {
        for _ in 0..1000 {
            assert_ne!(new_generation(), INVALID_GENERATION);
        }
    }

    #[test]
    fn consistency_checks_size_and_membership() {
        let vm = VnnMap::new(7, vec![Pnn(0), Pnn(1), Pnn(2)]);
        assert!(vm.is_consistent_with(&[Pnn(0), Pnn(1), Pnn(2)]));
        assert!(!vm.is_consistent_with(&[Pnn(0), Pnn(1)]));
        assert!(!vm.is_consistent_with(&[Pnn(0), Pnn(1), Pnn(3)]));
    }
}
