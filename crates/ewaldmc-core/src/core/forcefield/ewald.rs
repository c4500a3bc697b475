use crate::core::models::space::{DeleteMode, Removal};
use nalgebra::Vector3;
use num_complex::Complex64;
use std::f64::consts::PI;

/// Per-site complex exponentials `exp(i 2π n r_d / L_d)`, stored as one contiguous row per site.
///
/// A row holds `n = 0..=kmax` for x and `n = -kmax..=kmax` for y and z.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseTable {
    kmax: usize,
    row_len: usize,
    data: Vec<Complex64>,
}

impl PhaseTable {
    pub fn new(kmax: usize) -> Self {
        Self {
            kmax,
            row_len: (kmax + 1) + 2 * (2 * kmax + 1),
            data: Vec::new(),
        }
    }

    pub fn kmax(&self) -> usize {
        self.kmax
    }

    pub fn row_len(&self) -> usize {
        self.row_len
    }

    pub fn len(&self) -> usize {
        self.data.len() / self.row_len
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn row(&self, site: usize) -> &[Complex64] {
        &self.data[site * self.row_len..(site + 1) * self.row_len]
    }

    pub fn row_mut(&mut self, site: usize) -> &mut [Complex64] {
        let len = self.row_len;
        &mut self.data[site * len..(site + 1) * len]
    }

    pub fn push_row(&mut self, row: &[Complex64]) {
        debug_assert_eq!(row.len(), self.row_len);
        self.data.extend_from_slice(row);
    }

    /// Removes `count` rows starting at `first`, shifting later rows down.
    pub fn erase(&mut self, first: usize, count: usize) {
        self.data
            .drain(first * self.row_len..(first + count) * self.row_len);
    }

    /// Copies the trailing `count` rows over rows `first..first + count` and truncates.
    pub fn swap_remove_block(&mut self, first: usize, count: usize) {
        let n = self.len();
        let last = n - count;
        if first != last {
            let len = self.row_len;
            self.data
                .copy_within(last * len..n * len, first * len);
        }
        self.data.truncate(last * self.row_len);
    }

    pub fn apply(&mut self, removal: &Removal) {
        match removal.mode {
            DeleteMode::Stable => self.erase(removal.first, removal.len),
            DeleteMode::SwapLast => self.swap_remove_block(removal.first, removal.len),
        }
    }

    fn x_index(&self, n: i32) -> usize {
        n as usize
    }

    fn y_index(&self, n: i32) -> usize {
        (self.kmax as i32 + 1 + self.kmax as i32 + n) as usize
    }

    fn z_index(&self, n: i32) -> usize {
        (self.kmax as i32 + 1 + 2 * self.kmax as i32 + 1 + self.kmax as i32 + n) as usize
    }
}

/// Fills one row by explicit evaluation at n = 0, ±1 and the recursion
/// `eik(n) = eik(n-1) * eik(1)`; negative n are conjugates.
pub fn fill_row(
    row: &mut [Complex64],
    position: &Vector3<f64>,
    box_lengths: &Vector3<f64>,
    kmax: usize,
) {
    let one = Complex64::new(1.0, 0.0);

    let base = Complex64::from_polar(1.0, 2.0 * PI * position.x / box_lengths.x);
    row[0] = one;
    if kmax >= 1 {
        row[1] = base;
    }
    for n in 2..=kmax {
        row[n] = row[n - 1] * base;
    }

    let width = 2 * kmax + 1;
    for (dim, offset) in [(1, kmax + 1), (2, kmax + 1 + width)] {
        let base = Complex64::from_polar(1.0, 2.0 * PI * position[dim] / box_lengths[dim]);
        let center = offset + kmax;
        row[center] = one;
        if kmax >= 1 {
            row[center + 1] = base;
            row[center - 1] = base.conj();
        }
        for n in 2..=kmax {
            row[center + n] = row[center + n - 1] * base;
            row[center - n] = row[center + n].conj();
        }
    }
}

/// Reciprocal-space state of an Ewald sum: wavevectors, their weights, per-site phase rows
/// and the charge structure factors `S(k) = Σ_i q_i exp(i k·r_i)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReciprocalCache {
    box_lengths: Vector3<f64>,
    indices: Vec<[usize; 3]>,
    weights: Vec<f64>,
    phases: PhaseTable,
    structure: Vec<Complex64>,
}

impl ReciprocalCache {
    /// Builds the wavevector set for the box, with no sites.
    pub fn empty(box_lengths: &Vector3<f64>, alpha: f64, k2max: u32) -> Self {
        let kmax = (k2max as f64).sqrt().floor() as usize + 1;
        let phases = PhaseTable::new(kmax);
        let volume = box_lengths.x * box_lengths.y * box_lengths.z;
        let k = kmax as i32;

        let mut indices = Vec::new();
        let mut weights = Vec::new();
        for nx in 0..=k {
            for ny in -k..=k {
                for nz in -k..=k {
                    let k2 = (nx * nx + ny * ny + nz * nz) as u32;
                    if k2 == 0 || k2 >= k2max {
                        continue;
                    }
                    let kvec = Vector3::new(
                        2.0 * PI * nx as f64 / box_lengths.x,
                        2.0 * PI * ny as f64 / box_lengths.y,
                        2.0 * PI * nz as f64 / box_lengths.z,
                    );
                    let ksq = kvec.norm_squared();
                    let factor = if nx == 0 { 1.0 } else { 2.0 };
                    weights.push(
                        2.0 * PI * factor * (-ksq / (4.0 * alpha * alpha)).exp() / ksq / volume,
                    );
                    indices.push([phases.x_index(nx), phases.y_index(ny), phases.z_index(nz)]);
                }
            }
        }

        let structure = vec![Complex64::new(0.0, 0.0); weights.len()];
        Self {
            box_lengths: *box_lengths,
            indices,
            weights,
            phases,
            structure,
        }
    }

    /// Builds the cache for every site in `positions` from scratch.
    pub fn build(
        box_lengths: &Vector3<f64>,
        alpha: f64,
        k2max: u32,
        positions: &[Vector3<f64>],
        charges: impl Iterator<Item = f64>,
    ) -> Self {
        let mut cache = Self::empty(box_lengths, alpha, k2max);
        let mut row = vec![Complex64::new(0.0, 0.0); cache.phases.row_len()];
        let mut structure = std::mem::take(&mut cache.structure);
        for (position, q) in positions.iter().zip(charges) {
            cache.compute_row(position, &mut row);
            cache.accumulate(&mut structure, &row, q);
            cache.phases.push_row(&row);
        }
        cache.structure = structure;
        cache
    }

    pub fn n_wavevectors(&self) -> usize {
        self.weights.len()
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn structure(&self) -> &[Complex64] {
        &self.structure
    }

    pub fn set_structure(&mut self, structure: Vec<Complex64>) {
        self.structure = structure;
    }

    pub fn phases(&self) -> &PhaseTable {
        &self.phases
    }

    pub fn phases_mut(&mut self) -> &mut PhaseTable {
        &mut self.phases
    }

    pub fn row_len(&self) -> usize {
        self.phases.row_len()
    }

    pub fn compute_row(&self, position: &Vector3<f64>, row: &mut [Complex64]) {
        fill_row(row, position, &self.box_lengths, self.phases.kmax());
    }

    /// Adds `q * exp(i k·r)` for every wavevector, with the phase taken from `row`.
    #[inline]
    pub fn accumulate(&self, structure: &mut [Complex64], row: &[Complex64], q: f64) {
        for (s, [ix, iy, iz]) in structure.iter_mut().zip(&self.indices) {
            *s += row[*ix] * row[*iy] * row[*iz] * q;
        }
    }

    pub fn energy(&self) -> f64 {
        self.energy_of(&self.structure)
    }

    pub fn energy_of(&self, structure: &[Complex64]) -> f64 {
        structure
            .iter()
            .zip(&self.weights)
            .map(|(s, w)| w * s.norm_sqr())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Complex64, b: Complex64) -> bool {
        (a - b).norm() < 1e-12
    }

    #[test]
    fn fill_row_matches_direct_exponentials() {
        let l = Vector3::new(10.0, 12.0, 9.0);
        let r = Vector3::new(1.3, -4.2, 8.7);
        let kmax = 4;
        let mut table = PhaseTable::new(kmax);
        let mut row = vec![Complex64::new(0.0, 0.0); table.row_len()];
        fill_row(&mut row, &r, &l, kmax);
        table.push_row(&row);

        for n in -(kmax as i32)..=(kmax as i32) {
            let direct = |d: usize| Complex64::from_polar(1.0, 2.0 * PI * n as f64 * r[d] / l[d]);
            if n >= 0 {
                assert!(approx(table.row(0)[table.x_index(n)], direct(0)));
            }
            assert!(approx(table.row(0)[table.y_index(n)], direct(1)));
            assert!(approx(table.row(0)[table.z_index(n)], direct(2)));
        }
    }

    #[test]
    fn wavevectors_respect_cutoff_and_half_space() {
        let cache = ReciprocalCache::empty(&Vector3::new(10.0, 10.0, 10.0), 0.5, 27);
        // Lattice points with 0 < n² < 27 in the half-space kx >= 0 (kx = 0 plane complete).
        let mut expected = 0;
        for nx in 0..=6i32 {
            for ny in -6..=6i32 {
                for nz in -6..=6i32 {
                    let k2 = nx * nx + ny * ny + nz * nz;
                    if k2 > 0 && k2 < 27 {
                        expected += 1;
                    }
                }
            }
        }
        assert_eq!(cache.n_wavevectors(), expected);
        assert!(cache.weights().iter().all(|&w| w > 0.0));
    }

    #[test]
    fn structure_factor_matches_direct_sum() {
        let l = Vector3::new(8.0, 8.0, 8.0);
        let positions = vec![Vector3::new(1.0, 2.0, 3.0), Vector3::new(4.5, 0.5, 7.0)];
        let charges = [1.0, -1.0];
        let cache = ReciprocalCache::build(&l, 0.7, 10, &positions, charges.iter().copied());

        let kmax = cache.phases().kmax() as i32;
        let mut k = 0;
        for nx in 0..=kmax {
            for ny in -kmax..=kmax {
                for nz in -kmax..=kmax {
                    let k2 = nx * nx + ny * ny + nz * nz;
                    if k2 == 0 || k2 >= 10 {
                        continue;
                    }
                    let direct: Complex64 = positions
                        .iter()
                        .zip(charges)
                        .map(|(r, q)| {
                            let phase = 2.0 * PI
                                * (nx as f64 * r.x + ny as f64 * r.y + nz as f64 * r.z)
                                / 8.0;
                            Complex64::from_polar(q, phase)
                        })
                        .sum();
                    assert!((cache.structure()[k] - direct).norm() < 1e-10);
                    k += 1;
                }
            }
        }
    }

    #[test]
    fn swap_remove_block_moves_trailing_rows() {
        let mut table = PhaseTable::new(1);
        let len = table.row_len();
        for i in 0..4 {
            table.push_row(&vec![Complex64::new(i as f64, 0.0); len]);
        }
        table.swap_remove_block(1, 1);
        assert_eq!(table.len(), 3);
        assert_eq!(table.row(1)[0].re, 3.0);

        table.erase(0, 1);
        assert_eq!(table.len(), 2);
        assert_eq!(table.row(0)[0].re, 3.0);
        assert_eq!(table.row(1)[0].re, 2.0);
    }
}
