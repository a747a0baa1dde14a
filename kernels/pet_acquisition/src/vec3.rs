// Minimal 3-vector used for positions and direction cosines
//
// All geometry in this crate lives in scanner coordinates:
// - z runs along the scanner bore (axial direction)
// - x/y span the transaxial plane of the detector ring
// Lengths are millimetres throughout.

use std::f64::consts::TAU;
use std::ops::{Add, Mul, Neg, Sub};

// Wrap an angle into [0, 2π). rem_euclid alone can return exactly 2π for
// tiny negative inputs, which would push derived indices out of range.
#[inline]
pub fn wrap_tau(angle: f64) -> f64 {
    let mut a = angle.rem_euclid(TAU);
    if a >= TAU {
        a -= TAU;
    }
    a
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    #[inline]
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Vec3 { x, y, z }
    }

    #[inline]
    pub fn dot(&self, other: &Vec3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    #[inline]
    pub fn norm_squared(&self) -> f64 {
        self.dot(self)
    }

    #[inline]
    pub fn norm(&self) -> f64 {
        self.norm_squared().sqrt()
    }

    // Radial distance from the scanner axis (transaxial projection)
    #[inline]
    pub fn radial(&self) -> f64 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    // Returns the zero vector unchanged rather than dividing by zero
    pub fn normalized(&self) -> Vec3 {
        let n = self.norm();
        if n > 0.0 {
            Vec3::new(self.x / n, self.y / n, self.z / n)
        } else {
            *self
        }
    }
}

impl Add for Vec3 {
    type Output = Vec3;

    #[inline]
    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;

    #[inline]
    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Vec3 {
    type Output = Vec3;

    #[inline]
    fn mul(self, s: f64) -> Vec3 {
        Vec3::new(self.x * s, self.y * s, self.z * s)
    }
}

impl Neg for Vec3 {
    type Output = Vec3;

    #[inline]
    fn neg(self) -> Vec3 {
        Vec3::new(-self.x, -self.y, -self.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dot_of_orthogonal_axes_is_zero() {
        let ex = Vec3::new(1.0, 0.0, 0.0);
        let ey = Vec3::new(0.0, 1.0, 0.0);
        assert_eq!(ex.dot(&ey), 0.0);
    }

    #[test]
    fn normalized_has_unit_norm() {
        let v = Vec3::new(3.0, 4.0, 12.0);
        assert!((v.normalized().norm() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn normalizing_zero_stays_zero() {
        assert_eq!(Vec3::ZERO.normalized(), Vec3::ZERO);
    }

    #[test]
    fn radial_ignores_axial_component() {
        let v = Vec3::new(3.0, 4.0, 100.0);
        assert!((v.radial() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn wrap_tau_stays_below_two_pi() {
        assert!(wrap_tau(-1e-20) < TAU);
        assert!(wrap_tau(TAU) < TAU);
        assert!((wrap_tau(TAU + 1.0) - 1.0).abs() < 1e-12);
        assert!(wrap_tau(-0.5) > 0.0);
    }
}
