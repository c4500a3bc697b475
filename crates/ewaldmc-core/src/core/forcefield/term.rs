use std::ops::{Add, AddAssign, Neg, Sub};

/// Decomposed pair energy.
///
/// `q_self` is stored with a positive sign and subtracted in [`EnergyTerms::total`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EnergyTerms {
    pub lj: f64,
    pub lrc: f64,
    pub q_real: f64,
    pub q_fourier: f64,
    pub q_self: f64,
}

impl EnergyTerms {
    pub fn new(lj: f64, lrc: f64, q_real: f64, q_fourier: f64, q_self: f64) -> Self {
        Self {
            lj,
            lrc,
            q_real,
            q_fourier,
            q_self,
        }
    }

    #[inline]
    pub fn total(&self) -> f64 {
        self.lj + self.lrc + self.q_real + self.q_fourier - self.q_self
    }

    pub fn to_array(&self) -> [f64; 5] {
        [self.lj, self.lrc, self.q_real, self.q_fourier, self.q_self]
    }

    pub fn from_array(values: [f64; 5]) -> Self {
        Self::new(values[0], values[1], values[2], values[3], values[4])
    }
}

impl Add for EnergyTerms {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            lj: self.lj + rhs.lj,
            lrc: self.lrc + rhs.lrc,
            q_real: self.q_real + rhs.q_real,
            q_fourier: self.q_fourier + rhs.q_fourier,
            q_self: self.q_self + rhs.q_self,
        }
    }
}

impl AddAssign for EnergyTerms {
    fn add_assign(&mut self, rhs: Self) {
        self.lj += rhs.lj;
        self.lrc += rhs.lrc;
        self.q_real += rhs.q_real;
        self.q_fourier += rhs.q_fourier;
        self.q_self += rhs.q_self;
    }
}

impl Sub for EnergyTerms {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        self + (-rhs)
    }
}

impl Neg for EnergyTerms {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self {
            lj: -self.lj,
            lrc: -self.lrc,
            q_real: -self.q_real,
            q_fourier: -self.q_fourier,
            q_self: -self.q_self,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_subtracts_self_correction() {
        let terms = EnergyTerms::new(1.0, -0.5, 2.0, 0.25, 0.75);
        assert_eq!(terms.total(), 2.0);
    }

    #[test]
    fn add_sums_each_field_correctly() {
        let a = EnergyTerms::new(1.0, 2.0, 3.0, 4.0, 5.0);
        let b = EnergyTerms::new(5.0, 4.0, 3.0, 2.0, 1.0);
        assert_eq!(a + b, EnergyTerms::new(6.0, 6.0, 6.0, 6.0, 6.0));
    }

    #[test]
    fn add_assign_accumulates_each_field_correctly() {
        let mut a = EnergyTerms::new(1.0, 2.0, 3.0, 4.0, 5.0);
        a += EnergyTerms::new(1.0, 1.0, 1.0, 1.0, 1.0);
        assert_eq!(a, EnergyTerms::new(2.0, 3.0, 4.0, 5.0, 6.0));
    }

    #[test]
    fn sub_and_neg_are_consistent() {
        let a = EnergyTerms::new(1.0, 2.0, 3.0, 4.0, 5.0);
        assert_eq!(a - a, EnergyTerms::default());
        assert_eq!((-a).total(), -a.total());
    }

    #[test]
    fn array_conversion_preserves_order() {
        let a = EnergyTerms::new(1.0, 2.0, 3.0, 4.0, 5.0);
        assert_eq!(EnergyTerms::from_array(a.to_array()), a);
    }
}
