use crate::error::InputError;

pub const COEFF_COUNT: usize = 4;

/// Cubic reference path `y = c0 + c1 x + c2 x^2 + c3 x^3` in the robot frame,
/// coefficients in ascending power order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Polynomial {
    coeffs: [f64; COEFF_COUNT],
}

impl Polynomial {
    pub fn new(coeffs: [f64; COEFF_COUNT]) -> Self {
        Self { coeffs }
    }

    pub fn from_slice(coeffs: &[f64]) -> Result<Self, InputError> {
        let coeffs =
            <[f64; COEFF_COUNT]>::try_from(coeffs).map_err(|_| InputError::CoefficientCount {
                expected: COEFF_COUNT,
                found: coeffs.len(),
            })?;
        if let Some(index) = coeffs.iter().position(|c| !c.is_finite()) {
            return Err(InputError::NonFiniteCoefficient { index });
        }
        Ok(Self { coeffs })
    }

    pub fn coeffs(&self) -> &[f64; COEFF_COUNT] {
        &self.coeffs
    }

    pub fn value(&self, x: f64) -> f64 {
        let [c0, c1, c2, c3] = self.coeffs;
        c0 + x * (c1 + x * (c2 + x * c3))
    }

    pub fn slope(&self, x: f64) -> f64 {
        let [_, c1, c2, c3] = self.coeffs;
        c1 + x * (2.0 * c2 + 3.0 * c3 * x)
    }

    pub fn second_derivative(&self, x: f64) -> f64 {
        let [_, _, c2, c3] = self.coeffs;
        2.0 * c2 + 6.0 * c3 * x
    }

    pub fn third_derivative(&self) -> f64 {
        6.0 * self.coeffs[3]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use finitediff::FiniteDiff;

    #[test]
    fn evaluates_cubic() {
        let poly = Polynomial::new([1.0, -2.0, 0.5, 0.25]);
        // 1 - 4 + 2 + 2
        assert!((poly.value(2.0) - 1.0).abs() < 1e-12);
        // -2 + 2 + 3
        assert!((poly.slope(2.0) - 3.0).abs() < 1e-12);
        assert!((poly.second_derivative(2.0) - 4.0).abs() < 1e-12);
        assert!((poly.third_derivative() - 1.5).abs() < 1e-12);
    }

    #[test]
    fn derivatives_match_finite_differences() {
        let poly = Polynomial::new([0.3, 0.1, -0.02, 0.004]);
        for x in [-3.0, -0.5, 0.0, 1.25, 4.0] {
            let slope = vec![x].central_diff(&|p: &Vec<f64>| poly.value(p[0]))[0];
            let curvature = vec![x].central_diff(&|p: &Vec<f64>| poly.slope(p[0]))[0];
            assert!((slope - poly.slope(x)).abs() < 1e-6, "{x} {slope}");
            assert!((curvature - poly.second_derivative(x)).abs() < 1e-6);
        }
    }

    #[test]
    fn rejects_wrong_length() {
        assert_eq!(
            Polynomial::from_slice(&[1.0, 2.0, 3.0]),
            Err(InputError::CoefficientCount {
                expected: 4,
                found: 3
            })
        );
        assert!(Polynomial::from_slice(&[0.0; 5]).is_err());
        assert_eq!(
            Polynomial::from_slice(&[0.0, f64::NAN, 0.0, 0.0]),
            Err(InputError::NonFiniteCoefficient { index: 1 })
        );
        assert!(Polynomial::from_slice(&[1.0, 0.0, 0.0, 0.0]).is_ok());
    }
}
