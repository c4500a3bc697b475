use std::f64::consts::PI;

/// Coulomb's constant in kJ·Å/(mol·e²).
pub const COULOMB_CONSTANT: f64 = 1389.3545783908448;

#[inline]
pub fn lennard_jones(r2: f64, epsilon: f64, sigma: f64) -> f64 {
    let s2 = sigma * sigma / r2;
    let s6 = s2 * s2 * s2;
    4.0 * epsilon * (s6 * s6 - s6)
}

/// Long-range correction for the LJ interaction between `n_a` and `n_b` sites.
#[inline]
pub fn lennard_jones_tail(
    n_a: f64,
    n_b: f64,
    volume: f64,
    epsilon: f64,
    sigma: f64,
    cutoff: f64,
) -> f64 {
    let x3 = (sigma / cutoff).powi(3);
    let x9 = x3 * x3 * x3;
    8.0 / 3.0 * PI * n_a * n_b / volume * epsilon * sigma.powi(3) * (x9 / 3.0 - x3)
}

#[inline]
pub fn screened_coulomb(r: f64, alpha: f64) -> f64 {
    libm::erfc(alpha * r) / r
}

#[inline]
pub fn gaussian_overlap(r: f64, alpha: f64) -> f64 {
    libm::erf(alpha * r) / r
}

/// `erfc(αr)/r` tabulated on a uniform grid in r² up to the cutoff.
///
/// Values inside the first grid interval are evaluated exactly, where the tabulation
/// would interpolate across the 1/r singularity.
#[derive(Debug, Clone, PartialEq)]
pub struct ErfcTable {
    alpha: f64,
    dr2: f64,
    values: Vec<f64>,
}

impl ErfcTable {
    pub fn new(alpha: f64, cutoff: f64, points: usize) -> Self {
        let points = points.max(2);
        let dr2 = cutoff * cutoff / (points - 1) as f64;
        let values = (0..points)
            .map(|i| {
                if i == 0 {
                    0.0
                } else {
                    screened_coulomb((i as f64 * dr2).sqrt(), alpha)
                }
            })
            .collect();
        Self { alpha, dr2, values }
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn points(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn eval(&self, r2: f64) -> f64 {
        let x = r2 / self.dr2;
        let index = x as usize;
        if index == 0 || index + 1 >= self.values.len() {
            return screened_coulomb(r2.sqrt(), self.alpha);
        }
        let frac = x - index as f64;
        self.values[index] + frac * (self.values[index + 1] - self.values[index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f64_approx_equal(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() < tol
    }

    #[test]
    fn lennard_jones_is_zero_at_sigma_and_minimal_at_r_min() {
        let sigma = 3.0;
        let epsilon = 0.5;
        assert!(f64_approx_equal(
            lennard_jones(sigma * sigma, epsilon, sigma),
            0.0,
            1e-12
        ));
        let r_min = 2f64.powf(1.0 / 6.0) * sigma;
        assert!(f64_approx_equal(
            lennard_jones(r_min * r_min, epsilon, sigma),
            -epsilon,
            1e-12
        ));
    }

    #[test]
    fn tail_correction_is_negative_and_scales_with_density() {
        let one = lennard_jones_tail(100.0, 100.0, 1000.0, 1.0, 1.0, 3.0);
        let two = lennard_jones_tail(200.0, 200.0, 1000.0, 1.0, 1.0, 3.0);
        assert!(one < 0.0);
        assert!(f64_approx_equal(two / one, 4.0, 1e-12));
    }

    #[test]
    fn erf_and_erfc_terms_sum_to_coulomb() {
        let r = 2.5;
        let alpha = 0.3;
        let sum = screened_coulomb(r, alpha) + gaussian_overlap(r, alpha);
        assert!(f64_approx_equal(sum, 1.0 / r, 1e-14));
    }

    #[test]
    fn erfc_table_matches_direct_evaluation() {
        let alpha = 0.56;
        let cutoff = 10.0;
        let table = ErfcTable::new(alpha, cutoff, 20_000);
        for &r in &[0.05, 0.9, 1.0, 2.5, 4.2, 7.7, 9.99] {
            let exact = screened_coulomb(r, alpha);
            assert!(
                f64_approx_equal(table.eval(r * r), exact, 1e-4 * exact.max(1e-3)),
                "r = {r}"
            );
        }
    }
}
