//! Normal and Friction Sub-Solvers
//!
//! Stateless projections applied to each contact after the proximal step.
//! The normal component is projected first; its result sets the radius of
//! the friction set for the tangential and drilling components.
//!
//! Every projection is total: it returns finite values for every input,
//! including non-finite components (mapped to zero) and `λ_n <= 0`, where
//! the friction set collapses to the origin.
//!
//! # Friction sets
//!
//! With radii `rᵢ = μᵢ * λ_n` over the components (s, t, τ):
//!
//! | Variant               | Feasible set                                    |
//! |-----------------------|-------------------------------------------------|
//! | `AnalyticalSphere`    | disc `‖(s,t)‖ <= μ_s λ_n`, τ clamped separately |
//! | `AnalyticalEllipsoid` | ellipsoid, radial (closed-form) projection      |
//! | `NumericalEllipsoid`  | ellipsoid, orthogonal projection (Newton)       |
//! | `BoxModel`            | box `|xᵢ| <= rᵢ`                                |
//! | `Origin`              | `{0}`                                           |
//! | `Infinity`            | unconstrained                                   |

use crate::math::{Real, Vec3, Vec4};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Radii below this are treated as zero
const RADIUS_EPSILON: Real = 1e-14;

#[inline]
fn finite(x: Real) -> Real {
    if x.is_finite() {
        x
    } else {
        0.0
    }
}

#[inline]
fn sanitize(z: &Vec3) -> Vec3 {
    z.map(finite)
}

#[inline]
fn clamp_sym(x: Real, r: Real) -> Real {
    x.max(-r).min(r)
}

// ============================================================================
// Normal
// ============================================================================

/// Projection of the normal impulse
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum NormalSubSolver {
    /// `max(0, z)`: unilateral contact
    #[default]
    Nonnegative,
    /// Always zero: contact switched off
    #[cfg_attr(feature = "serde", serde(rename = "normal_origin"))]
    Origin,
    /// Pass-through: bilateral contact
    #[cfg_attr(feature = "serde", serde(rename = "normal_infinity"))]
    Infinity,
}

impl NormalSubSolver {
    /// Project a normal impulse
    #[inline]
    pub fn project(&self, z: Real) -> Real {
        match self {
            NormalSubSolver::Nonnegative => finite(z).max(0.0),
            NormalSubSolver::Origin => 0.0,
            NormalSubSolver::Infinity => finite(z),
        }
    }
}

// ============================================================================
// Friction
// ============================================================================

/// Iteration controls for [`FrictionSubSolver::NumericalEllipsoid`]
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct NumericalProjection {
    /// Newton iteration cap
    pub max_iterations: usize,
    /// Stop when the multiplier changes by less than this fraction
    pub relative_tolerance: Real,
}

impl Default for NumericalProjection {
    fn default() -> Self {
        Self {
            max_iterations: 32,
            relative_tolerance: 1e-10,
        }
    }
}

/// Projection of the tangential and drilling impulses
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum FrictionSubSolver {
    /// Circular cone in (s, t) with radius `μ_s λ_n`, drilling clamped
    #[default]
    AnalyticalSphere,
    /// Elliptic cone over (s, t, τ), closed-form radial projection
    AnalyticalEllipsoid,
    /// Elliptic cone over (s, t, τ), iterative orthogonal projection
    NumericalEllipsoid,
    /// Independent per-axis clamping
    BoxModel,
    /// Always zero: frictionless
    #[cfg_attr(feature = "serde", serde(rename = "friction_origin"))]
    Origin,
    /// Pass-through: unbounded friction
    #[cfg_attr(feature = "serde", serde(rename = "friction_infinity"))]
    Infinity,
}

impl FrictionSubSolver {
    /// Contact rows (1 = s, 2 = t, 3 = drilling) projected jointly.
    ///
    /// The proximal step must scale these rows by one common R, otherwise
    /// the fixed point no longer opposes the slip direction.
    pub fn coupled_rows(&self) -> &'static [usize] {
        match self {
            FrictionSubSolver::AnalyticalSphere => &[1, 2],
            FrictionSubSolver::AnalyticalEllipsoid | FrictionSubSolver::NumericalEllipsoid => {
                &[1, 2, 3]
            }
            FrictionSubSolver::BoxModel | FrictionSubSolver::Origin | FrictionSubSolver::Infinity => {
                &[]
            }
        }
    }

    /// Project `(z_s, z_t, z_tau)` onto the friction set of radius `mu * lambda_n`.
    pub fn project(
        &self,
        z: &Vec3,
        mu: &[Real; 3],
        lambda_n: Real,
        numerical: &NumericalProjection,
    ) -> Vec3 {
        let z = sanitize(z);
        let radii = || friction_radii(mu, lambda_n);
        let out = match self {
            FrictionSubSolver::Origin => Vec3::zeros(),
            FrictionSubSolver::Infinity => z,
            FrictionSubSolver::AnalyticalSphere => {
                radii().map_or_else(Vec3::zeros, |r| project_sphere(&z, r.x, r.z))
            }
            FrictionSubSolver::AnalyticalEllipsoid => {
                radii().map_or_else(Vec3::zeros, |r| project_ellipsoid_radial(&z, &r))
            }
            FrictionSubSolver::NumericalEllipsoid => radii().map_or_else(Vec3::zeros, |r| {
                project_ellipsoid_numerical(&z, &r, numerical)
            }),
            FrictionSubSolver::BoxModel => {
                radii().map_or_else(Vec3::zeros, |r| project_box(&z, &r))
            }
        };
        sanitize(&out)
    }
}

/// Semi-axes `μᵢ * λ_n`, or `None` when the cone collapses to the origin.
fn friction_radii(mu: &[Real; 3], lambda_n: Real) -> Option<Vec3> {
    let ln = finite(lambda_n);
    if ln <= 0.0 {
        return None;
    }
    Some(Vec3::new(
        finite(mu[0]).max(0.0) * ln,
        finite(mu[1]).max(0.0) * ln,
        finite(mu[2]).max(0.0) * ln,
    ))
}

/// Disc of radius `r_st` in (s, t); drilling clamped to `[-r_tau, r_tau]`.
pub fn project_sphere(z: &Vec3, r_st: Real, r_tau: Real) -> Vec3 {
    let norm = (z.x * z.x + z.y * z.y).sqrt();
    let (s, t) = if norm <= r_st {
        (z.x, z.y)
    } else if norm > 0.0 {
        let k = r_st / norm;
        (z.x * k, z.y * k)
    } else {
        (0.0, 0.0)
    };
    Vec3::new(s, t, clamp_sym(z.z, r_tau))
}

/// Independent clamping of each component to `[-rᵢ, rᵢ]`.
pub fn project_box(z: &Vec3, radii: &Vec3) -> Vec3 {
    Vec3::new(
        clamp_sym(z.x, radii.x),
        clamp_sym(z.y, radii.y),
        clamp_sym(z.z, radii.z),
    )
}

/// Ellipsoid norm `sqrt(Σ (zᵢ/rᵢ)²)` over the axes with nonzero radius, and
/// the point with the zero-radius axes pinned to zero.
fn ellipsoid_norm(z: &Vec3, radii: &Vec3) -> (Real, Vec3) {
    let mut pinned = *z;
    let mut q: Real = 0.0;
    for i in 0..3 {
        if radii[i] <= RADIUS_EPSILON {
            pinned[i] = 0.0;
        } else {
            let u = z[i] / radii[i];
            q += u * u;
        }
    }
    (q.sqrt(), pinned)
}

/// Radial projection onto the ellipsoid with semi-axes `radii`.
///
/// Exact for points inside and for equal semi-axes; otherwise the point is
/// scaled towards the origin until it reaches the boundary, which is not
/// the closest boundary point.
pub fn project_ellipsoid_radial(z: &Vec3, radii: &Vec3) -> Vec3 {
    let (q, pinned) = ellipsoid_norm(z, radii);
    if q <= 1.0 || !q.is_finite() {
        return if q.is_finite() { pinned } else { Vec3::zeros() };
    }
    pinned / q
}

/// Orthogonal projection onto the ellipsoid with semi-axes `radii`.
///
/// Solves `Σ (aᵢ yᵢ / (aᵢ² + m))² = 1` for the multiplier `m >= 0` with a
/// Newton iteration safeguarded by bisection; the function is convex and
/// decreasing in `m`, so from a lower bound Newton approaches the root from
/// below.
/// When the iteration cap is hit the current multiplier is used; the result
/// is then rescaled radially so it never leaves the ellipsoid.
pub fn project_ellipsoid_numerical(
    z: &Vec3,
    radii: &Vec3,
    numerical: &NumericalProjection,
) -> Vec3 {
    let (q, y) = ellipsoid_norm(z, radii);
    if !q.is_finite() {
        return Vec3::zeros();
    }
    if q <= 1.0 {
        return y;
    }

    // Work relative to the largest semi-axis to keep the terms well scaled.
    let scale = radii.max();
    let a = radii / scale;
    let y = y / scale;

    let active = |i: usize| radii[i] > RADIUS_EPSILON;
    let residual = |m: Real| -> (Real, Real) {
        let mut f = -1.0;
        let mut df = 0.0;
        for i in (0..3).filter(|&i| active(i)) {
            let d = a[i] * a[i] + m;
            let u = a[i] * y[i] / d;
            f += u * u;
            df += -2.0 * u * u / d;
        }
        (f, df)
    };

    // Bracket: each single-axis root is a lower bound, the weighted norm
    // an upper one.
    let mut lo: Real = 0.0;
    let mut hi: Real = 0.0;
    for i in (0..3).filter(|&i| active(i)) {
        let ay = a[i] * y[i].abs();
        lo = lo.max(ay - a[i] * a[i]);
        hi += ay * ay;
    }
    let mut hi = hi.sqrt().max(lo);
    let mut m = lo;
    for _ in 0..numerical.max_iterations.max(1) {
        let (f, df) = residual(m);
        if f > 0.0 {
            lo = m;
        } else {
            hi = m;
        }
        if f.abs() <= Real::EPSILON {
            break;
        }
        let mut next = if df < 0.0 { m - f / df } else { hi };
        if !(lo..=hi).contains(&next) {
            next = 0.5 * (lo + hi);
        }
        let step = (next - m).abs();
        m = next;
        if step <= numerical.relative_tolerance * m.max(Real::MIN_POSITIVE) {
            break;
        }
    }

    let mut x = Vec3::zeros();
    for i in (0..3).filter(|&i| active(i)) {
        x[i] = a[i] * a[i] * y[i] / (a[i] * a[i] + m);
    }
    let x = x * scale;

    // Guard against an unconverged multiplier leaving x outside.
    let (qx, _) = ellipsoid_norm(&x, radii);
    if qx > 1.0 {
        x / qx
    } else {
        x
    }
}

/// Project a full contact impulse: normal first, then friction.
#[inline]
pub fn project_contact(
    normal: NormalSubSolver,
    friction: FrictionSubSolver,
    z: &Vec4,
    mu: &[Real; 3],
    numerical: &NumericalProjection,
) -> Vec4 {
    let ln = normal.project(z[0]);
    let f = friction.project(&Vec3::new(z[1], z[2], z[3]), mu, ln, numerical);
    Vec4::new(ln, f.x, f.y, f.z)
}
