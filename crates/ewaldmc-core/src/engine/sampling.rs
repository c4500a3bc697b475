use rand::{distributions::WeightedIndex, prelude::*};
use thiserror::Error;
use tracing::instrument;

#[derive(Debug, Error, PartialEq)]
pub enum SamplingError {
    #[error("Cannot sample from an empty set")]
    Empty,
    #[error("Invalid weight {weight} at index {index}; weights must be finite and non-negative")]
    InvalidWeight { index: usize, weight: f64 },
    #[error("Total weight is zero")]
    ZeroTotalWeight,
    #[error("Invalid beta value: {0}. Beta must be positive for Boltzmann sampling")]
    InvalidBeta(f64),
}

/// Prefix sums of normalized weights, sampled by inverse CDF against one uniform draw.
#[derive(Debug, Clone, PartialEq)]
pub struct CumulativeTable {
    cumulative: Vec<f64>,
}

impl CumulativeTable {
    pub fn new(weights: &[f64]) -> Result<Self, SamplingError> {
        if weights.is_empty() {
            return Err(SamplingError::Empty);
        }
        if let Some((index, &weight)) = weights
            .iter()
            .enumerate()
            .find(|(_, w)| !w.is_finite() || **w < 0.0)
        {
            return Err(SamplingError::InvalidWeight { index, weight });
        }
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            return Err(SamplingError::ZeroTotalWeight);
        }

        let mut running = 0.0;
        let cumulative = weights
            .iter()
            .map(|w| {
                running += w / total;
                running
            })
            .collect();
        Ok(Self { cumulative })
    }

    pub fn len(&self) -> usize {
        self.cumulative.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cumulative.is_empty()
    }

    pub fn probabilities(&self) -> impl Iterator<Item = f64> + '_ {
        let mut previous = 0.0;
        self.cumulative.iter().map(move |&c| {
            let p = c - previous;
            previous = c;
            p
        })
    }

    /// Returns the first index whose cumulative probability exceeds `u` in `[0, 1)`.
    #[inline]
    pub fn select(&self, u: f64) -> usize {
        let index = self.cumulative.partition_point(|&c| c <= u);
        index.min(self.cumulative.len() - 1)
    }
}

/// Draws an index with probability proportional to `exp(-beta * E_i)`.
///
/// Returns the index together with `ln Σ exp(-beta * E_i)`.
#[instrument(level = "trace", skip_all, fields(beta))]
pub fn boltzmann_sample(
    energies: &[f64],
    beta: f64,
    rng: &mut impl Rng,
) -> Result<(usize, f64), SamplingError> {
    if energies.is_empty() {
        return Err(SamplingError::Empty);
    }
    if beta <= 0.0 {
        return Err(SamplingError::InvalidBeta(beta));
    }

    let ln_max = energies
        .iter()
        .map(|&e| -beta * e)
        .fold(f64::NEG_INFINITY, f64::max);
    let weights: Vec<f64> = energies
        .iter()
        .map(|&e| (-beta * e - ln_max).exp())
        .collect();
    let total: f64 = weights.iter().sum();

    let dist = WeightedIndex::new(&weights).map_err(|_| SamplingError::ZeroTotalWeight)?;
    Ok((dist.sample(rng), ln_max + total.ln()))
}

/// `ln Σ exp(-beta * E_i)` evaluated without overflow.
pub fn ln_boltzmann_sum(energies: &[f64], beta: f64) -> f64 {
    let ln_max = energies
        .iter()
        .map(|&e| -beta * e)
        .fold(f64::NEG_INFINITY, f64::max);
    if !ln_max.is_finite() {
        return ln_max;
    }
    ln_max
        + energies
            .iter()
            .map(|&e| (-beta * e - ln_max).exp())
            .sum::<f64>()
            .ln()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn select_maps_uniform_draws_to_weight_intervals() {
        let table = CumulativeTable::new(&[1.0, 3.0, 6.0]).unwrap();
        assert_eq!(table.select(0.0), 0);
        assert_eq!(table.select(0.099), 0);
        assert_eq!(table.select(0.1001), 1);
        assert_eq!(table.select(0.399), 1);
        assert_eq!(table.select(0.4001), 2);
        assert_eq!(table.select(0.999_999_999), 2);
    }

    #[test]
    fn weighted_selection_converges_to_normalized_weights() {
        let table = CumulativeTable::new(&[1.0, 3.0, 6.0]).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(2024);
        let draws = 200_000;
        let mut counts = [0usize; 3];
        for _ in 0..draws {
            counts[table.select(rng.r#gen::<f64>())] += 1;
        }
        for (count, expected) in counts.iter().zip([0.1, 0.3, 0.6]) {
            let frequency = *count as f64 / draws as f64;
            assert!((frequency - expected).abs() < 0.01, "{frequency} vs {expected}");
        }
    }

    #[test]
    fn probabilities_recover_normalized_weights() {
        let table = CumulativeTable::new(&[2.0, 2.0, 4.0]).unwrap();
        let p: Vec<f64> = table.probabilities().collect();
        assert!((p[0] - 0.25).abs() < 1e-12);
        assert!((p[2] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn invalid_tables_are_rejected() {
        assert_eq!(CumulativeTable::new(&[]), Err(SamplingError::Empty));
        assert_eq!(
            CumulativeTable::new(&[0.0, 0.0]),
            Err(SamplingError::ZeroTotalWeight)
        );
        assert!(matches!(
            CumulativeTable::new(&[1.0, -1.0]),
            Err(SamplingError::InvalidWeight { index: 1, .. })
        ));
    }

    #[test]
    fn boltzmann_sample_prefers_low_energy_and_reports_log_sum() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let energies = [0.0, 50.0];
        let (index, ln_w) = boltzmann_sample(&energies, 1.0, &mut rng).unwrap();
        assert_eq!(index, 0);
        assert!((ln_w - ln_boltzmann_sum(&energies, 1.0)).abs() < 1e-12);
        assert!(ln_w.abs() < 1e-12);
    }

    #[test]
    fn boltzmann_sample_rejects_invalid_beta() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert_eq!(
            boltzmann_sample(&[1.0], 0.0, &mut rng),
            Err(SamplingError::InvalidBeta(0.0))
        );
    }
}
