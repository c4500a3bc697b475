use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use rand::Rng;
use std::f64::consts::PI;

/// Draws a uniformly distributed orientation (Shoemake's subgroup algorithm).
pub fn random_orientation<R: Rng + ?Sized>(rng: &mut R) -> UnitQuaternion<f64> {
    let u1: f64 = rng.r#gen();
    let u2: f64 = rng.r#gen();
    let u3: f64 = rng.r#gen();

    let a = (1.0 - u1).sqrt();
    let b = u1.sqrt();
    let (s2, c2) = (2.0 * PI * u2).sin_cos();
    let (s3, c3) = (2.0 * PI * u3).sin_cos();

    UnitQuaternion::from_quaternion(Quaternion::new(b * c3, a * s2, a * c2, b * s3))
}

/// Draws a displacement uniformly from the cube `[-max, max)^3`.
pub fn random_displacement<R: Rng + ?Sized>(rng: &mut R, max: f64) -> Vector3<f64> {
    Vector3::new(
        (2.0 * rng.r#gen::<f64>() - 1.0) * max,
        (2.0 * rng.r#gen::<f64>() - 1.0) * max,
        (2.0 * rng.r#gen::<f64>() - 1.0) * max,
    )
}

/// Applies the minimum-image convention for an orthorhombic box.
#[inline]
pub fn minimum_image(mut d: Vector3<f64>, box_lengths: &Vector3<f64>) -> Vector3<f64> {
    for k in 0..3 {
        d[k] -= box_lengths[k] * (d[k] / box_lengths[k]).round();
    }
    d
}

/// Returns the lattice shift that brings `r` into `[0, L)` along every axis.
#[inline]
pub fn wrap_shift(r: &Vector3<f64>, box_lengths: &Vector3<f64>) -> Vector3<f64> {
    Vector3::new(
        -box_lengths.x * (r.x / box_lengths.x).floor(),
        -box_lengths.y * (r.y / box_lengths.y).floor(),
        -box_lengths.z * (r.z / box_lengths.z).floor(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn f64_approx_equal(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn minimum_image_maps_into_half_box() {
        let l = Vector3::new(10.0, 10.0, 20.0);
        let d = minimum_image(Vector3::new(9.0, -6.0, 11.0), &l);
        assert!(f64_approx_equal(d.x, -1.0));
        assert!(f64_approx_equal(d.y, 4.0));
        assert!(f64_approx_equal(d.z, -9.0));
    }

    #[test]
    fn wrap_shift_brings_point_into_primary_cell() {
        let l = Vector3::new(10.0, 10.0, 10.0);
        let r = Vector3::new(-0.5, 10.5, 3.0);
        let wrapped = r + wrap_shift(&r, &l);
        assert!(f64_approx_equal(wrapped.x, 9.5));
        assert!(f64_approx_equal(wrapped.y, 0.5));
        assert!(f64_approx_equal(wrapped.z, 3.0));
    }

    #[test]
    fn random_orientation_preserves_bond_lengths() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let bond = Vector3::new(1.0, 0.0, 0.0);
        for _ in 0..100 {
            let q = random_orientation(&mut rng);
            assert!(f64_approx_equal((q * bond).norm(), 1.0));
        }
    }

    #[test]
    fn random_displacement_stays_within_bounds() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        for _ in 0..1000 {
            let d = random_displacement(&mut rng, 0.3);
            assert!(d.iter().all(|c| c.abs() <= 0.3));
        }
    }
}
