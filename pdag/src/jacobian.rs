// jacobian.rs — Rational derivatives and load Jacobians
//
// A `LoadJacobian` records, for one memory access, the derivative of each
// storage coordinate with respect to each loop variable of the accessing
// stage. Derivatives are exact rationals, or "does not exist".

use std::cmp::Ordering;
use std::fmt;
use std::ops::{AddAssign, Mul, Neg};

fn gcd(a: i64, b: i64) -> i64 {
    let (mut a, mut b) = (a.abs(), b.abs());
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

fn lcm(a: i64, b: i64) -> i64 {
    let g = gcd(a, b);
    if g == 0 {
        0
    } else {
        (a / g * b).abs()
    }
}

// ── OptionalRational ─────────────────────────────────────────────────────

/// A rational number that may not exist. Comparisons against a missing value
/// are all false, so `a < x` is not the negation of `a >= x`.
#[derive(Debug, Clone, Copy)]
pub struct OptionalRational {
    pub exists: bool,
    pub numerator: i64,
    pub denominator: i64,
}

impl OptionalRational {
    pub const fn new(numerator: i64, denominator: i64) -> Self {
        OptionalRational {
            exists: true,
            numerator,
            denominator,
        }
    }

    pub const fn zero() -> Self {
        OptionalRational::new(0, 1)
    }

    pub const fn one() -> Self {
        OptionalRational::new(1, 1)
    }

    /// The "derivative does not exist" sentinel.
    pub const fn none() -> Self {
        OptionalRational {
            exists: false,
            numerator: 0,
            denominator: 0,
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == 0
    }

    pub fn is_one(&self) -> bool {
        *self == 1
    }
}

impl Default for OptionalRational {
    fn default() -> Self {
        OptionalRational::zero()
    }
}

impl AddAssign for OptionalRational {
    fn add_assign(&mut self, other: OptionalRational) {
        if !self.exists || !other.exists {
            *self = OptionalRational::none();
            return;
        }
        if self.denominator == other.denominator {
            self.numerator += other.numerator;
            return;
        }
        let l = lcm(self.denominator, other.denominator);
        self.numerator *= l / self.denominator;
        self.denominator = l;
        self.numerator += other.numerator * (l / other.denominator);
        let g = gcd(self.numerator, self.denominator);
        if g != 0 {
            self.numerator /= g;
            self.denominator /= g;
        }
    }
}

impl Neg for OptionalRational {
    type Output = OptionalRational;
    fn neg(self) -> OptionalRational {
        OptionalRational {
            numerator: -self.numerator,
            ..self
        }
    }
}

impl Mul<i64> for OptionalRational {
    type Output = OptionalRational;
    fn mul(self, factor: i64) -> OptionalRational {
        if self.is_zero() {
            return self;
        }
        OptionalRational {
            numerator: self.numerator * factor,
            ..self
        }
    }
}

impl Mul for OptionalRational {
    type Output = OptionalRational;
    fn mul(self, other: OptionalRational) -> OptionalRational {
        if self.is_zero() {
            return self;
        }
        if other.is_zero() {
            return other;
        }
        OptionalRational {
            exists: self.exists && other.exists,
            numerator: self.numerator * other.numerator,
            denominator: self.denominator * other.denominator,
        }
    }
}

impl PartialEq for OptionalRational {
    fn eq(&self, other: &Self) -> bool {
        self.exists == other.exists
            && self.numerator * other.denominator == self.denominator * other.numerator
    }
}

impl PartialEq<i64> for OptionalRational {
    fn eq(&self, x: &i64) -> bool {
        self.exists && self.numerator == x * self.denominator
    }
}

impl PartialOrd<i64> for OptionalRational {
    fn partial_cmp(&self, x: &i64) -> Option<Ordering> {
        if !self.exists {
            return None;
        }
        let scaled = x * self.denominator;
        let ord = self.numerator.cmp(&scaled);
        Some(if self.denominator < 0 {
            ord.reverse()
        } else {
            ord
        })
    }
}

impl fmt::Display for OptionalRational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.exists {
            write!(f, "_")
        } else if self.denominator == 1 {
            write!(f, "{}", self.numerator)
        } else {
            write!(f, "{}/{}", self.numerator, self.denominator)
        }
    }
}

// ── Access patterns ──────────────────────────────────────────────────────

/// Shape of a load or store, one counter per pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessPattern {
    Pointwise,
    Transpose,
    Broadcast,
    Slice,
}

impl AccessPattern {
    pub const ALL: [AccessPattern; 4] = [
        AccessPattern::Pointwise,
        AccessPattern::Transpose,
        AccessPattern::Broadcast,
        AccessPattern::Slice,
    ];
}

/// The patterns a Jacobian matches. Apart from pointwise, which excludes the
/// others, these are independent: a permutation is also a broadcast and a
/// slice, and every broadcast is a slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AccessClasses {
    /// Square identity: coordinate `i` moves with loop `i` only.
    pub pointwise: bool,
    /// Square, every row and column is a single one or all zero.
    pub transpose: bool,
    /// Every coordinate follows exactly one loop.
    pub broadcast: bool,
    /// Every coordinate follows one loop or is fixed.
    pub slice: bool,
}

impl AccessClasses {
    pub fn contains(&self, p: AccessPattern) -> bool {
        match p {
            AccessPattern::Pointwise => self.pointwise,
            AccessPattern::Transpose => self.transpose,
            AccessPattern::Broadcast => self.broadcast,
            AccessPattern::Slice => self.slice,
        }
    }

    pub fn patterns(self) -> impl Iterator<Item = AccessPattern> {
        AccessPattern::ALL.into_iter().filter(move |p| self.contains(*p))
    }
}

// ── LoadJacobian ─────────────────────────────────────────────────────────

/// `producer_storage_dims x consumer_loop_dims` matrix of derivatives, plus
/// the number of identical accesses it stands for.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadJacobian {
    coeffs: Vec<OptionalRational>,
    rows: usize,
    cols: usize,
    count: i64,
}

impl LoadJacobian {
    pub fn new(producer_storage_dims: usize, consumer_loop_dims: usize, count: i64) -> Self {
        LoadJacobian {
            coeffs: vec![OptionalRational::zero(); producer_storage_dims * consumer_loop_dims],
            rows: producer_storage_dims,
            cols: consumer_loop_dims,
            count,
        }
    }

    pub fn producer_storage_dims(&self) -> usize {
        self.rows
    }

    pub fn consumer_loop_dims(&self) -> usize {
        self.cols
    }

    pub fn count(&self) -> i64 {
        self.count
    }

    /// Derivative of storage coordinate `i` by loop `j`. A scalar producer or
    /// a scalar consumer reads as zero.
    pub fn get(&self, i: usize, j: usize) -> OptionalRational {
        if self.rows == 0 || self.cols == 0 {
            return OptionalRational::zero();
        }
        assert!(i < self.rows && j < self.cols, "jacobian index ({i}, {j}) out of range");
        self.coeffs[i * self.cols + j]
    }

    pub fn set(&mut self, i: usize, j: usize, v: OptionalRational) {
        assert!(i < self.rows && j < self.cols, "jacobian index ({i}, {j}) out of range");
        self.coeffs[i * self.cols + j] = v;
    }

    /// Fold `other` into `self` if the matrices are identical, adding its
    /// multiplicity. Returns whether the merge happened.
    pub fn merge(&mut self, other: &LoadJacobian) -> bool {
        if other.rows != self.rows || other.cols != self.cols {
            return false;
        }
        for i in 0..self.rows {
            for j in 0..self.cols {
                if other.get(i, j) != self.get(i, j) {
                    return false;
                }
            }
        }
        self.count += other.count;
        true
    }

    /// Matrix product: the Jacobian of a load through `other` followed by
    /// this one. Multiplicities multiply.
    pub fn compose(&self, other: &LoadJacobian) -> LoadJacobian {
        let mut result = LoadJacobian::new(self.rows, other.cols, self.count * other.count);
        for i in 0..self.rows {
            for j in 0..other.cols {
                let mut acc = OptionalRational::zero();
                for k in 0..self.cols {
                    acc += self.get(i, k) * other.get(k, j);
                }
                result.set(i, j, acc);
            }
        }
        result
    }

    fn row_is_single_one(&self, i: usize) -> bool {
        let ones = (0..self.cols).filter(|&j| self.get(i, j).is_one()).count();
        let zeros = (0..self.cols).filter(|&j| self.get(i, j).is_zero()).count();
        ones == 1 && zeros + 1 == self.cols
    }

    fn row_is_zero(&self, i: usize) -> bool {
        (0..self.cols).all(|j| self.get(i, j).is_zero())
    }

    fn col_is_single_one_or_zero(&self, j: usize) -> bool {
        let ones = (0..self.rows).filter(|&i| self.get(i, j).is_one()).count();
        let zeros = (0..self.rows).filter(|&i| self.get(i, j).is_zero()).count();
        (ones == 1 && zeros + 1 == self.rows) || zeros == self.rows
    }

    pub fn is_pointwise(&self) -> bool {
        self.rows == self.cols
            && (0..self.rows).all(|i| {
                (0..self.cols).all(|j| {
                    let d = self.get(i, j);
                    if i == j {
                        d.is_one()
                    } else {
                        d.is_zero()
                    }
                })
            })
    }

    /// Every access pattern this matrix matches.
    pub fn classify(&self) -> AccessClasses {
        if self.is_pointwise() {
            return AccessClasses {
                pointwise: true,
                ..AccessClasses::default()
            };
        }
        let single_or_zero = (0..self.rows).all(|i| self.row_is_single_one(i) || self.row_is_zero(i));
        AccessClasses {
            pointwise: false,
            transpose: self.rows == self.cols
                && single_or_zero
                && (0..self.cols).all(|j| self.col_is_single_one_or_zero(j)),
            broadcast: (0..self.rows).all(|i| self.row_is_single_one(i)),
            slice: single_or_zero,
        }
    }
}

impl fmt::Display for LoadJacobian {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.count > 1 {
            writeln!(f, "{} x", self.count)?;
        }
        for i in 0..self.rows {
            write!(f, "  [")?;
            for j in 0..self.cols {
                write!(f, " {:>4}", self.get(i, j).to_string())?;
            }
            writeln!(f, " ]")?;
        }
        Ok(())
    }
}
