//! Train / held-out split of the rating table.
//!
//! The default evaluation is in-sample; this split backs the optional
//! held-out evaluation path.

use crate::error::{FeatureError, Result};
use data_loader::Rating;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// Ratings partitioned into a training part and a held-out part
#[derive(Debug, Clone, PartialEq)]
pub struct RatingSplit {
    pub train: Vec<Rating>,
    pub held_out: Vec<Rating>,
}

/// Randomly hold out `fraction` of the ratings, reproducibly for a given seed.
///
/// Both parts keep the input order of their ratings, so duplicate policies
/// behave the same as on the unsplit table.
pub fn holdout_split(ratings: &[Rating], fraction: f64, seed: u64) -> Result<RatingSplit> {
    if !(fraction > 0.0 && fraction < 1.0) {
        return Err(FeatureError::InvalidFraction(fraction));
    }

    let mut order: Vec<usize> = (0..ratings.len()).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    order.shuffle(&mut rng);

    let n_held_out = (ratings.len() as f64 * fraction).round() as usize;
    let mut held_out_mask = vec![false; ratings.len()];
    for &idx in &order[..n_held_out] {
        held_out_mask[idx] = true;
    }

    let (held_out, train): (Vec<_>, Vec<_>) = ratings
        .iter()
        .zip(held_out_mask)
        .partition(|(_, held)| *held);

    Ok(RatingSplit {
        train: train.into_iter().map(|(r, _)| *r).collect(),
        held_out: held_out.into_iter().map(|(r, _)| *r).collect(),
    })
}
