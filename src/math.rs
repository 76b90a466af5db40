//! Numeric Types and Guarded Vector Helpers
//!
//! Scalar, vector and block types shared by the assembler, the sub-solvers
//! and the contact solver. All linear algebra goes through `nalgebra`; this
//! module only fixes the aliases and adds the finiteness-guarded helpers the
//! contact pipeline relies on.
//!
//! # Types
//!
//! - `Real`: simulation scalar (`f64`)
//! - `Vec3` / `Mat3` / `Quat`: spatial vector, 3x3 matrix, unit quaternion
//! - `Vec4`: per-contact impulse or velocity (normal, s, t, drilling)
//! - `Vec6`: per-body generalized velocity (linear, angular)
//! - `Mat4x6` / `Mat6x4`: Jacobian block and its mass-weighted transpose

use nalgebra::{Matrix3, SMatrix, UnitQuaternion, Vector3, Vector4, Vector6};

/// Simulation scalar
pub type Real = f64;

/// 3D vector
pub type Vec3 = Vector3<Real>;

/// 3x3 matrix (inertia tensors, rotations)
pub type Mat3 = Matrix3<Real>;

/// Unit quaternion (orientation)
pub type Quat = UnitQuaternion<Real>;

/// Per-contact 4-vector: (normal, tangent s, tangent t, drilling)
pub type Vec4 = Vector4<Real>;

/// Per-body generalized velocity: (linear, angular)
pub type Vec6 = Vector6<Real>;

/// One contact's Jacobian block against one body
pub type Mat4x6 = SMatrix<Real, 4, 6>;

/// `W * J^T` block for one body and one contact
pub type Mat6x4 = SMatrix<Real, 6, 4>;

/// 4x4 contact-space block (Delassus)
pub type Mat4 = SMatrix<Real, 4, 4>;

/// Lengths below this are treated as zero when normalizing
pub const NORMAL_EPSILON: Real = 1e-12;

/// Normalize `v`, returning `None` when it is near zero or not finite.
#[inline]
pub fn safe_normalize(v: &Vec3, epsilon: Real) -> Option<Vec3> {
    let len = v.norm();
    if !len.is_finite() || len <= epsilon {
        return None;
    }
    let n = v / len;
    if n.iter().all(|c| c.is_finite()) {
        Some(n)
    } else {
        None
    }
}

/// Build a right-handed orthonormal tangent pair `(s, t)` for unit `n`.
///
/// `s` is chosen perpendicular to the world axis least aligned with `n`,
/// so the basis is well conditioned for every direction.
pub fn tangent_basis(n: &Vec3) -> (Vec3, Vec3) {
    let ax = n.x.abs();
    let ay = n.y.abs();
    let az = n.z.abs();
    let helper = if ax <= ay && ax <= az {
        Vec3::x()
    } else if ay <= az {
        Vec3::y()
    } else {
        Vec3::z()
    };
    let s = n.cross(&helper);
    let s = safe_normalize(&s, NORMAL_EPSILON).unwrap_or_else(Vec3::x);
    let t = n.cross(&s);
    (s, t)
}

/// True when every component is finite
#[inline]
pub fn is_finite4(v: &Vec4) -> bool {
    v.iter().all(|c| c.is_finite())
}

/// Pack linear and angular parts into a generalized velocity.
#[inline]
pub fn pack6(linear: &Vec3, angular: &Vec3) -> Vec6 {
    Vec6::new(linear.x, linear.y, linear.z, angular.x, angular.y, angular.z)
}

/// Linear part of a generalized velocity
#[inline]
pub fn linear_part(v: &Vec6) -> Vec3 {
    Vec3::new(v[0], v[1], v[2])
}

/// Angular part of a generalized velocity
#[inline]
pub fn angular_part(v: &Vec6) -> Vec3 {
    Vec3::new(v[3], v[4], v[5])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_normalize_rejects_zero() {
        assert!(safe_normalize(&Vec3::zeros(), NORMAL_EPSILON).is_none());
        assert!(safe_normalize(&Vec3::new(Real::NAN, 0.0, 0.0), NORMAL_EPSILON).is_none());
        let n = safe_normalize(&Vec3::new(0.0, 3.0, 4.0), NORMAL_EPSILON).unwrap();
        assert!((n.norm() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_tangent_basis_orthonormal() {
        let normals = [
            Vec3::x(),
            Vec3::y(),
            Vec3::z(),
            Vec3::new(1.0, 1.0, 1.0).normalize(),
            Vec3::new(-0.3, 0.9, 0.1).normalize(),
        ];
        for n in normals {
            let (s, t) = tangent_basis(&n);
            assert!(s.dot(&n).abs() < 1e-12);
            assert!(t.dot(&n).abs() < 1e-12);
            assert!(s.dot(&t).abs() < 1e-12);
            assert!((s.norm() - 1.0).abs() < 1e-12);
            assert!((t.norm() - 1.0).abs() < 1e-12);
            // right-handed: s x t = n
            assert!((s.cross(&t) - n).norm() < 1e-12);
        }
    }

    #[test]
    fn test_pack_unpack() {
        let v = pack6(&Vec3::new(1.0, 2.0, 3.0), &Vec3::new(4.0, 5.0, 6.0));
        assert_eq!(linear_part(&v), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(angular_part(&v), Vec3::new(4.0, 5.0, 6.0));
    }
}
