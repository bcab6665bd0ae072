//! Closed-form root solvers for polynomials of degree four and below with
//! real coefficients. Roots whose residual exceeds the configured tolerance
//! are polished iteratively.

use std::ops::{Add, Div, Mul, Neg, Sub};

/// A complex root of a real-coefficient polynomial.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Complex {
    pub re: f64,
    pub im: f64,
}

impl Complex {
    pub fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }

    pub fn real(re: f64) -> Self {
        Self { re, im: 0.0 }
    }

    pub fn norm(&self) -> f64 {
        self.re.hypot(self.im)
    }

    /// Principal square root.
    pub fn sqrt(&self) -> Self {
        let r = self.norm();
        let re = ((r + self.re) / 2.0).sqrt();
        let im = ((r - self.re) / 2.0).sqrt();
        Self {
            re,
            im: if self.im < 0.0 { -im } else { im },
        }
    }

    /// Whether this root is real within the provided tolerance, relative to
    /// its magnitude.
    pub fn is_real(&self, tolerance: f64) -> bool {
        self.im.abs() <= tolerance * (1.0 + self.norm())
    }
}

impl Add for Complex {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.re + rhs.re, self.im + rhs.im)
    }
}

impl Sub for Complex {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.re - rhs.re, self.im - rhs.im)
    }
}

impl Mul for Complex {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.re * rhs.re - self.im * rhs.im,
            self.re * rhs.im + self.im * rhs.re,
        )
    }
}

impl Div for Complex {
    type Output = Self;
    fn div(self, rhs: Self) -> Self {
        let denom = rhs.re * rhs.re + rhs.im * rhs.im;
        Self::new(
            (self.re * rhs.re + self.im * rhs.im) / denom,
            (self.im * rhs.re - self.re * rhs.im) / denom,
        )
    }
}

impl Neg for Complex {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.re, -self.im)
    }
}

/// Classification of a root solution set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RootsType {
    Unknown,
    RealRoots,
    RealAndComplexRoots,
    ComplexRoots,
}

/// Finds the roots, possibly complex, of low-order polynomial equations
/// having real coefficients.
#[derive(Debug, Clone)]
pub struct LowOrderPolynomialSolver {
    /// Residual threshold above which iterative refinement kicks in
    tolerance: f64,
}

impl Default for LowOrderPolynomialSolver {
    fn default() -> Self {
        Self { tolerance: 1e-6 }
    }
}

impl LowOrderPolynomialSolver {
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn set_tolerance(&mut self, tolerance: f64) {
        self.tolerance = tolerance;
    }

    /// Evaluates the polynomial at the specified abscissa using Horner's
    /// method. The first coefficient corresponds to the highest degree.
    pub fn evaluate(coeff: &[f64], x: f64) -> f64 {
        let mut y = 0.0;
        if !coeff.is_empty() {
            y = coeff[0];
            for &c in &coeff[1..] {
                y = c + x * y;
            }
        }
        y
    }

    fn evaluate_complex(coeff: &[f64], x: Complex) -> Complex {
        let mut y = Complex::real(0.0);
        if !coeff.is_empty() {
            y = Complex::real(coeff[0]);
            for &c in &coeff[1..] {
                y = Complex::real(c) + x * y;
            }
        }
        y
    }

    /// Solves `a x^2 + b x + c = 0`.
    pub fn solve_quadratic(&self, a: f64, b: f64, c: f64) -> Vec<Complex> {
        if a == 0.0 {
            return if b == 0.0 {
                Vec::new()
            } else {
                vec![Complex::real(-c / b)]
            };
        }
        let disc = b * b - 4.0 * a * c;
        if disc >= 0.0 {
            // numerically stable pairing of the real roots
            let q = -0.5 * (b + b.signum() * disc.sqrt());
            if q == 0.0 {
                vec![Complex::real(0.0), Complex::real(0.0)]
            } else {
                vec![Complex::real(q / a), Complex::real(c / q)]
            }
        } else {
            let re = -b / (2.0 * a);
            let im = (-disc).sqrt() / (2.0 * a);
            vec![Complex::new(re, im), Complex::new(re, -im)]
        }
    }

    /// Solves `a x^3 + b x^2 + c x + d = 0`.
    pub fn solve_cubic(&self, a: f64, b: f64, c: f64, d: f64) -> Vec<Complex> {
        if a == 0.0 {
            return self.solve_quadratic(b, c, d);
        }
        let b_n = b / a;
        let c_n = c / a;
        let d_n = d / a;

        // depressed cubic t^3 + p t + q, with x = t - b_n / 3
        let shift = b_n / 3.0;
        let p = c_n - b_n * b_n / 3.0;
        let q = 2.0 * b_n.powi(3) / 27.0 - b_n * c_n / 3.0 + d_n;

        let mut roots = Vec::with_capacity(3);
        if p == 0.0 && q == 0.0 {
            roots.resize(3, Complex::real(-shift));
            return roots;
        }

        let disc = (q / 2.0).powi(2) + (p / 3.0).powi(3);
        if disc > 0.0 {
            // one real root and a complex conjugate pair
            let sq = disc.sqrt();
            let u = (-q / 2.0 + sq).cbrt();
            let v = (-q / 2.0 - sq).cbrt();
            let real = u + v;
            let im = 3f64.sqrt() / 2.0 * (u - v);
            roots.push(Complex::real(real - shift));
            roots.push(Complex::new(-real / 2.0 - shift, im));
            roots.push(Complex::new(-real / 2.0 - shift, -im));
        } else {
            // three real roots via the trigonometric form
            let m = 2.0 * (-p / 3.0).sqrt();
            let arg = (3.0 * q / (p * m)).max(-1.0).min(1.0);
            let theta = arg.acos() / 3.0;
            use std::f64::consts::PI;
            for k in 0..3 {
                let t = m * (theta - 2.0 * PI * (k as f64) / 3.0).cos();
                roots.push(Complex::real(t - shift));
            }
        }
        roots
    }

    /// Solves `a x^4 + b x^3 + c x^2 + d x + e = 0` by Ferrari's method.
    pub fn solve_quartic(&self, a: f64, b: f64, c: f64, d: f64, e: f64) -> Vec<Complex> {
        if a == 0.0 {
            return self.solve_cubic(b, c, d, e);
        }
        let b_n = b / a;
        let c_n = c / a;
        let d_n = d / a;
        let e_n = e / a;

        // depressed quartic y^4 + p y^2 + q y + r, with x = y - b_n / 4
        let shift = b_n / 4.0;
        let p = c_n - 3.0 * b_n * b_n / 8.0;
        let q = d_n - b_n * c_n / 2.0 + b_n.powi(3) / 8.0;
        let r = e_n - b_n * d_n / 4.0 + b_n * b_n * c_n / 16.0 - 3.0 * b_n.powi(4) / 256.0;

        let mut roots = Vec::with_capacity(4);
        if q.abs() <= f64::EPSILON * (1.0 + d_n.abs()) {
            // biquadratic: z^2 + p z + r with y^2 = z
            for z in self.solve_quadratic(1.0, p, r) {
                let y = z.sqrt();
                roots.push(y - Complex::real(shift));
                roots.push(-y - Complex::real(shift));
            }
            return roots;
        }

        // resolvent cubic 8 m^3 + 8 p m^2 + (2 p^2 - 8 r) m - q^2; for q != 0
        // it always carries a strictly positive real root
        let resolvent = self.solve_cubic(8.0, 8.0 * p, 2.0 * p * p - 8.0 * r, -q * q);
        let m = resolvent
            .iter()
            .filter(|root| root.is_real(1e-12))
            .map(|root| root.re)
            .fold(f64::MIN, f64::max);
        let s = (2.0 * m.max(0.0)).sqrt();
        let half = p / 2.0 + m;
        let offset = if s > 0.0 { q / (2.0 * s) } else { 0.0 };

        // (y^2 + s y + half - offset)(y^2 - s y + half + offset) = 0
        for y in self.solve_quadratic(1.0, s, half - offset) {
            roots.push(y - Complex::real(shift));
        }
        for y in self.solve_quadratic(1.0, -s, half + offset) {
            roots.push(y - Complex::real(shift));
        }
        roots
    }

    /// Solves the polynomial whose coefficients are given from the highest to
    /// the lowest degree, dispatching on the effective degree. Roots whose
    /// residual exceeds the tolerance are polished with Newton iterations on
    /// the full polynomial.
    pub fn solve(&self, coeff: &[f64]) -> (RootsType, Vec<Complex>) {
        // strip vanishing leading coefficients
        let first = coeff.iter().position(|&c| c != 0.0);
        let coeff = match first {
            Some(idx) => &coeff[idx..],
            None => return (RootsType::Unknown, Vec::new()),
        };

        let mut roots = match coeff.len() {
            0 | 1 => Vec::new(),
            2 => vec![Complex::real(-coeff[1] / coeff[0])],
            3 => self.solve_quadratic(coeff[0], coeff[1], coeff[2]),
            4 => self.solve_cubic(coeff[0], coeff[1], coeff[2], coeff[3]),
            5 => self.solve_quartic(coeff[0], coeff[1], coeff[2], coeff[3], coeff[4]),
            _ => return (RootsType::Unknown, Vec::new()),
        };

        for root in roots.iter_mut() {
            if Self::evaluate_complex(coeff, *root).norm() > self.tolerance {
                *root = Self::newton_polish(coeff, *root);
            }
        }

        let real_count = roots.iter().filter(|r| r.is_real(1e-9)).count();
        let kind = if roots.is_empty() {
            RootsType::Unknown
        } else if real_count == roots.len() {
            RootsType::RealRoots
        } else if real_count == 0 {
            RootsType::ComplexRoots
        } else {
            RootsType::RealAndComplexRoots
        };
        (kind, roots)
    }

    fn newton_polish(coeff: &[f64], start: Complex) -> Complex {
        let deriv: Vec<f64> = coeff[..coeff.len() - 1]
            .iter()
            .enumerate()
            .map(|(i, &c)| c * (coeff.len() - 1 - i) as f64)
            .collect();
        let mut x = start;
        for _ in 0..32 {
            let f = Self::evaluate_complex(coeff, x);
            let df = Self::evaluate_complex(&deriv, x);
            if df.norm() == 0.0 {
                break;
            }
            let step = f / df;
            x = x - step;
            if step.norm() <= 1e-14 * (1.0 + x.norm()) {
                break;
            }
        }
        x
    }

    /// Picks the smallest non-negative real root; if no real root is
    /// non-negative, picks the real root smallest in magnitude. Returns None
    /// when no real root exists.
    pub fn preferred_real_root(roots: &[Complex]) -> Option<f64> {
        let reals: Vec<f64> = roots
            .iter()
            .filter(|r| r.is_real(1e-9))
            .map(|r| r.re)
            .collect();
        reals
            .iter()
            .filter(|&&t| t >= 0.0)
            .cloned()
            .fold(None, |best: Option<f64>, t| match best {
                Some(b) if b <= t => Some(b),
                _ => Some(t),
            })
            .or_else(|| {
                reals.iter().cloned().fold(None, |best: Option<f64>, t| match best {
                    Some(b) if b.abs() <= t.abs() => Some(b),
                    _ => Some(t),
                })
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sorted_reals(roots: &[Complex]) -> Vec<f64> {
        let mut reals: Vec<f64> = roots
            .iter()
            .filter(|r| r.is_real(1e-9))
            .map(|r| r.re)
            .collect();
        reals.sort_by(|a, b| a.partial_cmp(b).unwrap());
        reals
    }

    #[test]
    fn quadratic_real_roots() {
        let solver = LowOrderPolynomialSolver::default();
        // (x - 2)(x + 3) = x^2 + x - 6
        let roots = solver.solve_quadratic(1.0, 1.0, -6.0);
        let reals = sorted_reals(&roots);
        assert_relative_eq!(reals[0], -3.0, epsilon = 1e-12);
        assert_relative_eq!(reals[1], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn quadratic_complex_roots() {
        let solver = LowOrderPolynomialSolver::default();
        let (kind, roots) = solver.solve(&[1.0, 0.0, 1.0]);
        assert_eq!(kind, RootsType::ComplexRoots);
        assert_relative_eq!(roots[0].im.abs(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn cubic_three_real_roots() {
        let solver = LowOrderPolynomialSolver::default();
        // (x - 1)(x - 2)(x - 3) = x^3 - 6x^2 + 11x - 6
        let roots = solver.solve_cubic(1.0, -6.0, 11.0, -6.0);
        let reals = sorted_reals(&roots);
        assert_relative_eq!(reals[0], 1.0, epsilon = 1e-9);
        assert_relative_eq!(reals[1], 2.0, epsilon = 1e-9);
        assert_relative_eq!(reals[2], 3.0, epsilon = 1e-9);
    }

    #[test]
    fn quartic_mixed_roots() {
        let solver = LowOrderPolynomialSolver::default();
        // (x^2 + 1)(x - 1)(x + 2) = x^4 + x^3 - x^2 + x - 2
        let (kind, roots) = solver.solve(&[1.0, 1.0, -1.0, 1.0, -2.0]);
        assert_eq!(kind, RootsType::RealAndComplexRoots);
        let reals = sorted_reals(&roots);
        assert_relative_eq!(reals[0], -2.0, epsilon = 1e-8);
        assert_relative_eq!(reals[1], 1.0, epsilon = 1e-8);
    }

    #[test]
    fn degenerate_leading_coefficients() {
        let solver = LowOrderPolynomialSolver::default();
        let (kind, roots) = solver.solve(&[0.0, 0.0, 2.0, -4.0]);
        assert_eq!(kind, RootsType::RealRoots);
        assert_relative_eq!(roots[0].re, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn preferred_root_selection() {
        let roots = vec![
            Complex::real(-0.5),
            Complex::real(3.0),
            Complex::real(1.0),
            Complex::new(0.1, 5.0),
        ];
        assert_relative_eq!(
            LowOrderPolynomialSolver::preferred_real_root(&roots).unwrap(),
            1.0
        );
        let negative_only = vec![Complex::real(-0.5), Complex::real(-4.0)];
        assert_relative_eq!(
            LowOrderPolynomialSolver::preferred_real_root(&negative_only).unwrap(),
            -0.5
        );
    }

    #[test]
    fn horner_evaluation() {
        let y = LowOrderPolynomialSolver::evaluate(&[2.0, -3.0, 1.0], 2.0);
        assert_relative_eq!(y, 3.0, epsilon = 1e-14);
    }
}
