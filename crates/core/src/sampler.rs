//! Choice sampling for decision points the driver leaves open.
//!
//! Weighted selection is a softmax over `weights / temperature` followed by
//! inverse-CDF sampling with one uniform draw.

use crate::error::{Result, SessionError};
use crate::prng::Prng;

pub const DEFAULT_TEMPERATURE: f64 = 1.0;

/// Checks the caller's side of the `select` contract.
pub fn validate(limit: usize, weights: Option<&[f64]>, temperature: f64) -> Result<()> {
    if limit == 0 {
        return Err(SessionError::InvalidArgument(
            "limit must be at least 1".to_string(),
        ));
    }
    if !(temperature.is_finite() && temperature > 0.0) {
        return Err(SessionError::InvalidArgument(format!(
            "temperature must be positive and finite, got {temperature}"
        )));
    }
    if let Some(weights) = weights {
        if weights.len() != limit {
            return Err(SessionError::InvalidArgument(format!(
                "{} weights supplied for {limit} choices",
                weights.len()
            )));
        }
        if let Some(i) = weights.iter().position(|w| !w.is_finite()) {
            return Err(SessionError::InvalidArgument(format!(
                "weight {i} is not finite ({})",
                weights[i]
            )));
        }
    }
    Ok(())
}

/// Softmax of `weights / temperature`.
pub fn softmax(weights: &[f64], temperature: f64) -> Result<Vec<f64>> {
    validate(weights.len(), Some(weights), temperature)?;

    // Shifting by the max keeps every exponent <= 0, so nothing overflows
    // and the largest term is exactly 1.
    let max = weights.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mut probs: Vec<f64> = weights
        .iter()
        .map(|w| ((w - max) / temperature).exp())
        .collect();
    let sum: f64 = probs.iter().sum();
    for p in &mut probs {
        *p /= sum;
    }
    Ok(probs)
}

/// Draws an index with probability `softmax(weights, temperature)[i]`.
pub fn sample_weighted(rng: &mut Prng, weights: &[f64], temperature: f64) -> Result<usize> {
    let probs = softmax(weights, temperature)?;
    let draw = rng.next_f64_01();

    let mut cumulative = 0.0;
    for (i, p) in probs.iter().enumerate() {
        cumulative += p;
        if cumulative >= draw {
            return Ok(i);
        }
    }
    // Rounding can leave the running sum just under the draw.
    Ok(probs.len() - 1)
}

/// Uniform index in `[0, limit)`.
pub fn sample_uniform(rng: &mut Prng, limit: usize) -> Result<usize> {
    validate(limit, None, DEFAULT_TEMPERATURE)?;
    Ok(rng.gen_range_usize(0, limit))
}

/// Chooses for one decision point: weighted if weights are given, uniform otherwise.
pub fn sample(
    rng: &mut Prng,
    limit: usize,
    weights: Option<&[f64]>,
    temperature: f64,
) -> Result<usize> {
    validate(limit, weights, temperature)?;
    match weights {
        Some(weights) => sample_weighted(rng, weights, temperature),
        None => sample_uniform(rng, limit),
    }
}

/// The zero-temperature limit of weighted sampling; ties go to the lowest index.
pub fn argmax(weights: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &w) in weights.iter().enumerate() {
        match best {
            Some((_, b)) if w <= b => {}
            _ => best = Some((i, w)),
        }
    }
    best.map(|(i, _)| i)
}
