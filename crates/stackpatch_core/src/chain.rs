//! Chain iteration (§4.C) and the path-synthesizer entry points (§4.A) that
//! build a chain from a [`RunConfig`].

use crate::entities::{variant_chain, variant_chain_game, Patch, RunConfig};

/// Direction a [`ChainIterate`] walks the cross-product in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    fn step(self) -> i64 {
        match self {
            Direction::Forward => 1,
            Direction::Backward => -1,
        }
    }
}

/// One step of the cross-product between a run config's patch stack and a
/// variant chain: which patch, and which candidate filename within it.
#[derive(Debug, Clone)]
pub struct ChainStep<'a> {
    pub patch: &'a Patch,
    pub fn_: &'a str,
}

/// Restartable iterator state over `patches x chain`. Fresh per call, per
/// §9's design note — no state is shared between resolution calls.
pub struct ChainIterate<'a> {
    patches: &'a [Patch],
    chain: &'a [String],
    direction: Direction,
    step: i64,
    started: bool,
}

impl<'a> ChainIterate<'a> {
    pub fn new(patches: &'a [Patch], chain: &'a [String], direction: Direction) -> Self {
        let chain_size = chain.len() as i64;
        let start_step = match direction {
            Direction::Forward => 0,
            Direction::Backward => patches.len() as i64 * chain_size - 1,
        };
        Self {
            patches,
            chain,
            direction,
            step: start_step,
            started: false,
        }
    }
}

impl<'a> Iterator for ChainIterate<'a> {
    type Item = ChainStep<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let chain_size = self.chain.len() as i64;
        if chain_size == 0 || self.patches.is_empty() {
            return None;
        }
        if self.started {
            self.step += self.direction.step();
        }
        self.started = true;
        if self.step < 0 {
            return None;
        }
        let patch_idx = self.step / chain_size;
        if patch_idx as usize >= self.patches.len() {
            return None;
        }
        let chain_idx = (self.step % chain_size) as usize;
        Some(ChainStep {
            patch: &self.patches[patch_idx as usize],
            fn_: &self.chain[chain_idx],
        })
    }
}

/// Build the generic-domain variant chain for `fn`, per §4.A / §3.
pub fn resolve_chain(fn_: &str, build: Option<&str>) -> Vec<String> {
    variant_chain(fn_, build)
}

/// Build the game-scoped variant chain for `fn`, per §4.A / §3.
pub fn resolve_chain_game(fn_: &str, game: Option<&str>, build: Option<&str>) -> Vec<String> {
    variant_chain_game(fn_, game, build)
}

/// Convenience: build the generic chain using a run config's current build.
pub fn resolve_chain_for(run_config: &RunConfig, fn_: &str) -> Vec<String> {
    resolve_chain(fn_, run_config.build.as_deref())
}

/// Convenience: build the game-scoped chain using a run config's current
/// game and build.
pub fn resolve_chain_game_for(run_config: &RunConfig, fn_: &str) -> Vec<String> {
    resolve_chain_game(fn_, run_config.game.as_deref(), run_config.build.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Patch;
    use rstest::rstest;

    #[rstest]
    #[case(1, 1, 1)]
    #[case(2, 2, 4)]
    #[case(3, 2, 6)]
    #[case(5, 3, 15)]
    fn test_chain_length_is_patches_times_variants_param(
        #[case] num_patches: usize,
        #[case] num_variants: usize,
        #[case] expected_len: usize,
    ) {
        let patches: Vec<Patch> = (0..num_patches)
            .map(|i| Patch::new(format!("p{i}"), format!("/p{i}")))
            .collect();
        let chain: Vec<String> = (0..num_variants).map(|i| format!("v{i}")).collect();
        assert_eq!(
            ChainIterate::new(&patches, &chain, Direction::Forward).count(),
            expected_len
        );
        assert_eq!(
            ChainIterate::new(&patches, &chain, Direction::Backward).count(),
            expected_len
        );
    }

    fn patches(ids: &[&str]) -> Vec<Patch> {
        ids.iter().map(|id| Patch::new(*id, format!("/patches/{id}"))).collect()
    }

    #[test]
    fn test_forward_order_is_patch_major_variant_minor() {
        let patches = patches(&["a", "b"]);
        let chain = vec!["foo.js".to_string(), "foo.v1.js".to_string()];
        let steps: Vec<(String, String)> = ChainIterate::new(&patches, &chain, Direction::Forward)
            .map(|s| (s.patch.id.clone(), s.fn_.to_string()))
            .collect();
        assert_eq!(
            steps,
            vec![
                ("a".into(), "foo.js".into()),
                ("a".into(), "foo.v1.js".into()),
                ("b".into(), "foo.js".into()),
                ("b".into(), "foo.v1.js".into()),
            ]
        );
    }

    #[test]
    fn test_backward_order_is_reverse_of_forward() {
        let patches = patches(&["a", "b"]);
        let chain = vec!["foo.js".to_string(), "foo.v1.js".to_string()];
        let steps: Vec<(String, String)> = ChainIterate::new(&patches, &chain, Direction::Backward)
            .map(|s| (s.patch.id.clone(), s.fn_.to_string()))
            .collect();
        assert_eq!(
            steps,
            vec![
                ("b".into(), "foo.v1.js".into()),
                ("b".into(), "foo.js".into()),
                ("a".into(), "foo.v1.js".into()),
                ("a".into(), "foo.js".into()),
            ]
        );
    }

    #[test]
    fn test_length_is_patches_times_variants() {
        let patches = patches(&["a", "b", "c"]);
        let chain = vec!["x".to_string(), "y".to_string()];
        let count = ChainIterate::new(&patches, &chain, Direction::Forward).count();
        assert_eq!(count, 6);
    }

    #[test]
    fn test_empty_chain_is_empty() {
        let patches = patches(&["a"]);
        let chain: Vec<String> = vec![];
        assert_eq!(ChainIterate::new(&patches, &chain, Direction::Forward).count(), 0);
    }

    #[test]
    fn test_empty_patches_is_empty() {
        let patches: Vec<Patch> = vec![];
        let chain = vec!["x".to_string()];
        assert_eq!(ChainIterate::new(&patches, &chain, Direction::Forward).count(), 0);
    }

    #[test]
    fn test_iterator_is_restartable_from_fresh_state() {
        let patches = patches(&["a", "b"]);
        let chain = vec!["x".to_string()];
        let first: Vec<_> = ChainIterate::new(&patches, &chain, Direction::Forward)
            .map(|s| s.patch.id.clone())
            .collect();
        let second: Vec<_> = ChainIterate::new(&patches, &chain, Direction::Forward)
            .map(|s| s.patch.id.clone())
            .collect();
        assert_eq!(first, second);
    }
}
