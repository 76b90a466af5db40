//! PROX Iterative Contact Solver
//!
//! Fixed-point iteration on the contact impulses
//!
//! ```text
//! λₖ ← prox(λₖ - Rₖ ((A λ)ₖ + bₖ)),    A = J W Jᵀ
//! ```
//!
//! where `prox` projects the normal component first and then the friction
//! components onto the cone of radius `μ λ_n`.
//!
//! # Key Features
//!
//! - **Gauss–Seidel scheduling**: contacts read impulses already updated in
//!   the current sweep. `W Jᵀ λ` is kept as a per-body accumulator and
//!   updated incrementally after every contact.
//! - **Jacobi scheduling**: contacts read only the previous sweep (double
//!   buffered). With the `parallel` feature the sweep fans out over contacts
//!   with Rayon.
//! - **Adaptive relaxation**: a sweep that increases the residual is rolled
//!   back and every R is shrunk by `nu_decrease`.
//! - **Stall guard**: a passed relative-change test only counts once the
//!   merit is below `merit_acceptance`. A stalled iterate keeps sweeping
//!   until the cap and is reported as not converged.
//! - **Bounded**: the iteration cap always terminates the loop. Reaching it
//!   is reported, never raised.
//!
//! The returned impulses are always finite.

use crate::assembler::SystemOperators;
use crate::math::{is_finite4, Real, Vec4, Vec6};
use crate::r_factor::{RFactorConfig, RFactorStrategy, RFactors};
use crate::sub_solvers::{project_contact, FrictionSubSolver, NormalSubSolver, NumericalProjection};
use tracing::{trace, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// ============================================================================
// Configuration
// ============================================================================

/// Sweep ordering
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Scheduling {
    /// Every contact reads the previous sweep
    Jacobi,
    /// Every contact reads the freshest impulses (sequential)
    #[default]
    GaussSeidel,
}

/// Early termination test
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ConvergenceCriterion {
    /// `‖Δλ‖∞ <= tolerance * max(‖λ‖∞, 1)`, accepted only when the merit
    /// is also below `merit_acceptance`
    #[default]
    RelativeChange,
    /// `‖λ - proj(λ - (Aλ + b))‖₂ <= tolerance`
    Merit,
}

/// Solver configuration
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SolverConfig {
    /// Sweep ordering
    pub scheduling: Scheduling,
    /// Early termination test
    pub criterion: ConvergenceCriterion,
    /// Hard cap on sweeps
    pub max_iterations: usize,
    /// Tolerance of the termination test
    pub tolerance: Real,
    /// Normal projection
    pub normal: NormalSubSolver,
    /// Friction projection
    pub friction: FrictionSubSolver,
    /// Controls of the numerical ellipsoid projection
    pub numerical: NumericalProjection,
    /// Roll back diverging sweeps and shrink R
    pub adaptive: bool,
    /// Factor applied to R after a rolled-back sweep, in (0, 1)
    pub nu_decrease: Real,
    /// Largest merit at which a passed relative-change test is accepted
    pub merit_acceptance: Real,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            scheduling: Scheduling::GaussSeidel,
            criterion: ConvergenceCriterion::RelativeChange,
            max_iterations: 100,
            tolerance: 1e-6,
            normal: NormalSubSolver::Nonnegative,
            friction: FrictionSubSolver::AnalyticalSphere,
            numerical: NumericalProjection::default(),
            adaptive: true,
            nu_decrease: 0.7,
            merit_acceptance: 1e-4,
        }
    }
}

impl SolverConfig {
    /// Set the sweep ordering
    pub fn with_scheduling(mut self, scheduling: Scheduling) -> Self {
        self.scheduling = scheduling;
        self
    }

    /// Set the termination test
    pub fn with_criterion(mut self, criterion: ConvergenceCriterion) -> Self {
        self.criterion = criterion;
        self
    }

    /// Set the iteration cap
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the tolerance
    pub fn with_tolerance(mut self, tolerance: Real) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Select the sub-solvers
    pub fn with_sub_solvers(mut self, normal: NormalSubSolver, friction: FrictionSubSolver) -> Self {
        self.normal = normal;
        self.friction = friction;
        self
    }

    /// Enable or disable adaptive relaxation
    pub fn with_adaptive(mut self, adaptive: bool) -> Self {
        self.adaptive = adaptive;
        self
    }

    /// Set the merit bound for relative-change convergence
    pub fn with_merit_acceptance(mut self, merit_acceptance: Real) -> Self {
        self.merit_acceptance = merit_acceptance;
        self
    }
}

// ============================================================================
// Output
// ============================================================================

/// Solve diagnostics
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SolveStats {
    /// Early termination test passed before the cap
    pub converged: bool,
    /// Sweeps performed, rolled-back ones included
    pub iterations: usize,
    /// Natural-map residual of the returned impulses
    pub merit: Real,
    /// Sweeps rolled back by adaptive relaxation
    pub divergence_restarts: usize,
    /// Sweeps discarded for producing non-finite values
    pub nonfinite_recoveries: usize,
}

/// Impulses and diagnostics of one solve
#[derive(Clone, Debug, Default)]
pub struct SolveOutput {
    /// Impulse per contact (normal, s, t, drilling)
    pub lambda: Vec<Vec4>,
    /// Diagnostics
    pub stats: SolveStats,
}

// ============================================================================
// Kernels
// ============================================================================

/// Proximal update of contact `k` against the accumulator `w = W Jᵀ λ`
#[inline]
fn update_contact(
    ops: &SystemOperators,
    r: &RFactors,
    config: &SolverConfig,
    k: usize,
    lambda_k: &Vec4,
    w: &[Vec6],
) -> Vec4 {
    let residual = ops.contact_velocity(k, w) + ops.b[k];
    let trial = lambda_k - r.get(k).component_mul(&residual);
    project_contact(
        config.normal,
        config.friction,
        &trial,
        &ops.friction[k],
        &config.numerical,
    )
}

/// `‖λ - proj(λ - (Aλ + b))‖₂` with unit R
pub fn merit(ops: &SystemOperators, lambda: &[Vec4], config: &SolverConfig) -> Real {
    let w = ops.apply_wjt(lambda);
    merit_with(ops, lambda, &w, config)
}

fn merit_with(ops: &SystemOperators, lambda: &[Vec4], w: &[Vec6], config: &SolverConfig) -> Real {
    let unit = RFactors {
        r: vec![Vec4::repeat(1.0); ops.contact_count()],
        nu: 1.0,
    };
    lambda
        .iter()
        .enumerate()
        .map(|(k, l)| (l - update_contact(ops, &unit, config, k, l, w)).norm_squared())
        .sum::<Real>()
        .sqrt()
}

#[inline]
fn max_abs(v: &[Vec4]) -> Real {
    v.iter().map(|l| l.amax()).fold(0.0, Real::max)
}

fn gauss_seidel_sweep(
    ops: &SystemOperators,
    r: &RFactors,
    config: &SolverConfig,
    lambda: &mut [Vec4],
    w: &mut [Vec6],
) -> Real {
    let mut change: Real = 0.0;
    for k in 0..lambda.len() {
        let next = update_contact(ops, r, config, k, &lambda[k], w);
        let delta = next - lambda[k];
        if delta != Vec4::zeros() {
            ops.accumulate_wjt(k, &delta, w);
            change = change.max(delta.amax());
        }
        lambda[k] = next;
    }
    change
}

fn jacobi_sweep(
    ops: &SystemOperators,
    r: &RFactors,
    config: &SolverConfig,
    lambda: &mut Vec<Vec4>,
    w: &mut Vec<Vec6>,
) -> Real {
    let previous: &[Vec4] = lambda;
    let read: &[Vec6] = w;

    #[cfg(feature = "parallel")]
    let next: Vec<Vec4> = (0..previous.len())
        .into_par_iter()
        .map(|k| update_contact(ops, r, config, k, &previous[k], read))
        .collect();

    #[cfg(not(feature = "parallel"))]
    let next: Vec<Vec4> = (0..previous.len())
        .map(|k| update_contact(ops, r, config, k, &previous[k], read))
        .collect();

    let change = next
        .iter()
        .zip(previous)
        .map(|(a, b)| (a - b).amax())
        .fold(0.0, Real::max);

    *w = ops.apply_wjt(&next);
    *lambda = next;
    change
}

// ============================================================================
// Solve
// ============================================================================

/// Initial iterate: the warm start when it matches the contact count,
/// with non-finite entries cleared; zeros otherwise.
fn initial_lambda(count: usize, warm_start: Option<&[Vec4]>) -> Vec<Vec4> {
    match warm_start {
        Some(ws) if ws.len() == count => ws
            .iter()
            .map(|l| if is_finite4(l) { *l } else { Vec4::zeros() })
            .collect(),
        _ => vec![Vec4::zeros(); count],
    }
}

/// Solve for the contact impulses.
///
/// `r` is copied. The copy gets one shared R per coupled friction block,
/// and adaptive relaxation scales the copy only. An `r` that does not
/// cover every contact is replaced by Local R-factors.
pub fn solve(
    ops: &SystemOperators,
    r: &RFactors,
    config: &SolverConfig,
    warm_start: Option<&[Vec4]>,
) -> SolveOutput {
    let n = ops.contact_count();
    let mut stats = SolveStats::default();
    if n == 0 {
        stats.converged = true;
        return SolveOutput {
            lambda: Vec::new(),
            stats,
        };
    }

    let mut r = if r.len() == n {
        r.clone()
    } else {
        warn!(
            expected = n,
            got = r.len(),
            "R-factor count mismatch, using local R-factors"
        );
        let nu = if r.nu.is_finite() && r.nu > 0.0 { r.nu } else { 1.0 };
        RFactorStrategy::Local.compute(ops, &RFactorConfig::default().with_nu(nu))
    };
    r.share_coupled_rows(config.friction);
    let mut lambda = initial_lambda(n, warm_start);
    let mut w = ops.apply_wjt(&lambda);
    let mut last_residual: Option<Real> = None;

    while stats.iterations < config.max_iterations {
        stats.iterations += 1;
        let saved_lambda = lambda.clone();
        let saved_w = w.clone();

        let change = match config.scheduling {
            Scheduling::GaussSeidel => gauss_seidel_sweep(ops, &r, config, &mut lambda, &mut w),
            Scheduling::Jacobi => jacobi_sweep(ops, &r, config, &mut lambda, &mut w),
        };

        let finite = change.is_finite()
            && lambda.iter().all(is_finite4)
            && w.iter().all(|v| v.iter().all(|c| c.is_finite()));
        if !finite {
            lambda = saved_lambda;
            w = saved_w;
            stats.nonfinite_recoveries += 1;
            warn!(
                iteration = stats.iterations,
                "non-finite iterate, keeping previous impulses"
            );
            break;
        }

        let (residual, threshold) = match config.criterion {
            ConvergenceCriterion::RelativeChange => {
                (change, config.tolerance * max_abs(&lambda).max(1.0))
            }
            ConvergenceCriterion::Merit => (merit_with(ops, &lambda, &w, config), config.tolerance),
        };
        trace!(iteration = stats.iterations, residual, "prox sweep");

        if config.adaptive && last_residual.is_some_and(|last| residual > last) {
            lambda = saved_lambda;
            w = saved_w;
            r.scale(config.nu_decrease);
            stats.divergence_restarts += 1;
            continue;
        }
        last_residual = Some(residual);

        if residual <= threshold {
            let accepted = match config.criterion {
                ConvergenceCriterion::RelativeChange => {
                    let m = merit_with(ops, &lambda, &w, config);
                    trace!(iteration = stats.iterations, merit = m, "stall check");
                    m <= config.merit_acceptance
                }
                ConvergenceCriterion::Merit => true,
            };
            if accepted {
                stats.converged = true;
                break;
            }
        }
    }

    stats.merit = merit_with(ops, &lambda, &w, config);
    if !stats.converged {
        warn!(
            iterations = stats.iterations,
            merit = stats.merit,
            "contact solver did not converge"
        );
    }

    SolveOutput { lambda, stats }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::{assemble, AssemblerConfig};
    use crate::body::{reindex_bodies, RigidBody};
    use crate::contact::ContactPoint;
    use crate::material::MaterialPair;
    use crate::math::Vec3;

    const H: Real = 0.01;
    const G: Real = 9.81;

    /// Ground plus two spheres resting on it, side by side.
    fn two_spheres_on_ground(mu: Real) -> SystemOperators {
        let mut bodies = vec![
            RigidBody::new_static(0, Vec3::zeros()),
            RigidBody::new_sphere(1, Vec3::new(0.0, 1.0, 0.0), 1.0, 1.0),
            RigidBody::new_sphere(2, Vec3::new(5.0, 1.0, 0.0), 3.0, 1.0),
        ];
        reindex_bodies(&mut bodies);
        let free: Vec<Vec6> = bodies
            .iter()
            .map(|b| {
                let mut v = b.velocity();
                if !b.is_fixed() {
                    v[1] -= G * H;
                    v[0] += 0.2;
                }
                v
            })
            .collect();
        let material = MaterialPair::isotropic(mu, 0.0);
        let contacts = [
            ContactPoint::new(0, 1, Vec3::zeros(), Vec3::y(), 0.0).with_material(material),
            ContactPoint::new(0, 2, Vec3::new(5.0, 0.0, 0.0), Vec3::y(), 0.0)
                .with_material(material),
        ];
        let (ops, _) = assemble(&bodies, &contacts, &free, H, false, &AssemblerConfig::default())
            .unwrap();
        ops
    }

    /// Ground plus a body with inertia (1, 1, 100) sliding at (1, 0, 1) and
    /// spinning about the normal, so its two tangent rows differ in stiffness.
    fn anisotropic_slider(material: MaterialPair) -> SystemOperators {
        let mut bodies = vec![
            RigidBody::new_static(0, Vec3::zeros()),
            RigidBody::new_dynamic(1, Vec3::new(0.0, 1.0, 0.0), 1.0, Vec3::new(1.0, 1.0, 100.0))
                .with_velocity(Vec3::new(1.0, 0.0, 1.0), Vec3::new(0.0, 2.0, 0.0)),
        ];
        reindex_bodies(&mut bodies);
        let free: Vec<Vec6> = bodies
            .iter()
            .map(|b| {
                let mut v = b.velocity();
                if !b.is_fixed() {
                    v[1] -= G * H;
                }
                v
            })
            .collect();
        let contacts =
            [ContactPoint::new(0, 1, Vec3::zeros(), Vec3::y(), 0.0).with_material(material)];
        let (ops, _) = assemble(&bodies, &contacts, &free, H, false, &AssemblerConfig::default())
            .unwrap();
        ops
    }

    /// The slider next to a resting two-sphere stack: two contact groups.
    fn slider_and_stack(material: MaterialPair) -> SystemOperators {
        let mut bodies = vec![
            RigidBody::new_static(0, Vec3::zeros()),
            RigidBody::new_dynamic(1, Vec3::new(0.0, 1.0, 0.0), 1.0, Vec3::new(1.0, 1.0, 100.0))
                .with_velocity(Vec3::new(1.0, 0.0, 1.0), Vec3::new(0.0, 2.0, 0.0)),
            RigidBody::new_sphere(2, Vec3::new(5.0, 1.0, 0.0), 1.0, 1.0),
            RigidBody::new_sphere(3, Vec3::new(5.0, 3.0, 0.0), 2.0, 1.0),
        ];
        reindex_bodies(&mut bodies);
        let free: Vec<Vec6> = bodies
            .iter()
            .map(|b| {
                let mut v = b.velocity();
                if !b.is_fixed() {
                    v[1] -= G * H;
                }
                v
            })
            .collect();
        let contacts = [
            ContactPoint::new(0, 1, Vec3::zeros(), Vec3::y(), 0.0).with_material(material),
            ContactPoint::new(0, 2, Vec3::new(5.0, 0.0, 0.0), Vec3::y(), 0.0)
                .with_material(material),
            ContactPoint::new(2, 3, Vec3::new(5.0, 2.0, 0.0), Vec3::y(), 0.0)
                .with_material(material),
        ];
        let (ops, _) = assemble(&bodies, &contacts, &free, H, false, &AssemblerConfig::default())
            .unwrap();
        ops
    }

    /// `Σ (λᵢ / (μᵢ λ_n))²` over the axes with a nonzero coefficient.
    fn ellipsoid_level(l: &Vec4, mu: &[Real; 3]) -> Real {
        (0..3)
            .filter(|&i| mu[i] > 0.0)
            .map(|i| (l[i + 1] / (mu[i] * l[0])).powi(2))
            .sum()
    }

    fn local_r(ops: &SystemOperators) -> RFactors {
        RFactorStrategy::Local.compute(ops, &RFactorConfig::default())
    }

    #[test]
    fn test_empty_system_converges() {
        let out = solve(
            &SystemOperators::default(),
            &RFactors::default(),
            &SolverConfig::default(),
            None,
        );
        assert!(out.lambda.is_empty());
        assert!(out.stats.converged);
        assert_eq!(out.stats.iterations, 0);
    }

    #[test]
    fn test_isolated_contacts_jacobi_equals_gauss_seidel() {
        let ops = two_spheres_on_ground(0.3);
        let r = local_r(&ops);
        let one = SolverConfig::default().with_max_iterations(1);
        let gs = solve(&ops, &r, &one.with_scheduling(Scheduling::GaussSeidel), None);
        let jac = solve(&ops, &r, &one.with_scheduling(Scheduling::Jacobi), None);
        assert_eq!(gs.lambda, jac.lambda);
    }

    #[test]
    fn test_resting_normal_impulse() {
        let ops = two_spheres_on_ground(0.0);
        let out = solve(&ops, &local_r(&ops), &SolverConfig::default(), None);
        assert!(out.stats.converged);
        assert!((out.lambda[0][0] - 1.0 * G * H).abs() < 1e-6);
        assert!((out.lambda[1][0] - 3.0 * G * H).abs() < 1e-6);
        assert!(out.lambda[0][1].abs() < 1e-9);
    }

    #[test]
    fn test_merit_vanishes_at_solution() {
        let ops = two_spheres_on_ground(0.5);
        let config = SolverConfig::default().with_criterion(ConvergenceCriterion::Merit);
        let out = solve(&ops, &local_r(&ops), &config, None);
        assert!(out.stats.converged);
        assert!(out.stats.merit <= 1e-6);
        assert!((merit(&ops, &out.lambda, &config) - out.stats.merit).abs() < 1e-12);
    }

    #[test]
    fn test_warm_start_is_fixed_point() {
        let ops = two_spheres_on_ground(0.5);
        let r = local_r(&ops);
        let config = SolverConfig::default().with_tolerance(1e-12);
        let first = solve(&ops, &r, &config, None);
        let second = solve(&ops, &r, &config, Some(&first.lambda));
        assert!(second.stats.converged);
        assert!(second.stats.iterations <= 2);
        for (a, b) in first.lambda.iter().zip(&second.lambda) {
            assert!((a - b).amax() < 1e-9);
        }
    }

    #[test]
    fn test_mismatched_warm_start_ignored() {
        let ops = two_spheres_on_ground(0.5);
        let r = local_r(&ops);
        let config = SolverConfig::default().with_max_iterations(1);
        let cold = solve(&ops, &r, &config, None);
        let bogus = [Vec4::repeat(7.0)];
        let warm = solve(&ops, &r, &config, Some(&bogus));
        assert_eq!(cold.lambda, warm.lambda);
    }

    #[test]
    fn test_non_finite_warm_start_entries_cleared() {
        let ops = two_spheres_on_ground(0.5);
        let r = local_r(&ops);
        let ws = [Vec4::new(Real::NAN, 0.0, 0.0, 0.0), Vec4::zeros()];
        let out = solve(&ops, &r, &SolverConfig::default(), Some(&ws));
        assert!(out.lambda.iter().all(is_finite4));
        assert!(out.stats.converged);
    }

    #[test]
    fn test_oversized_r_oscillates_without_adaptive() {
        let ops = two_spheres_on_ground(0.0);
        let r = RFactorStrategy::Local.compute(&ops, &RFactorConfig::default().with_nu(3.0));
        let config = SolverConfig::default()
            .with_scheduling(Scheduling::Jacobi)
            .with_adaptive(false)
            .with_max_iterations(50);
        let out = solve(&ops, &r, &config, None);
        assert!(!out.stats.converged);
        assert_eq!(out.stats.iterations, 50);
        assert!(out.lambda.iter().all(is_finite4));
    }

    #[test]
    fn test_adaptive_relaxation_recovers() {
        let ops = two_spheres_on_ground(0.0);
        let r = RFactorStrategy::Local.compute(&ops, &RFactorConfig::default().with_nu(2.5));
        let config = SolverConfig::default()
            .with_criterion(ConvergenceCriterion::Merit)
            .with_max_iterations(200);
        let out = solve(&ops, &r, &config, None);
        assert!(out.stats.divergence_restarts > 0);
        assert!(out.stats.converged);
        assert!((out.lambda[0][0] - G * H).abs() < 1e-5);
    }

    #[test]
    fn test_friction_stays_in_cone() {
        let ops = two_spheres_on_ground(0.1);
        let out = solve(&ops, &local_r(&ops), &SolverConfig::default(), None);
        for l in &out.lambda {
            assert!(l[0] >= 0.0);
            let tangential = (l[1] * l[1] + l[2] * l[2]).sqrt();
            assert!(tangential <= 0.1 * l[0] + 1e-12);
        }
    }

    #[test]
    fn test_anisotropic_tangent_rows_oppose_slip() {
        let ops = anisotropic_slider(MaterialPair::isotropic(0.5, 0.0));
        let d = ops.delassus_diagonal(0);
        assert!((d[1] - d[2]).abs() > 0.9, "tangent rows should differ: {d:?}");

        let config = SolverConfig::default().with_tolerance(1e-10);
        let out = solve(&ops, &local_r(&ops), &config, None);
        assert!(out.stats.converged);
        assert!(out.stats.merit < 1e-8, "merit={}", out.stats.merit);

        let l = out.lambda[0];
        let w = ops.apply_wjt(&out.lambda);
        let v = ops.contact_velocity(0, &w) + ops.b[0];
        let (vs, vt) = (v[1], v[2]);
        let slip = (vs * vs + vt * vt).sqrt();
        let friction = (l[1] * l[1] + l[2] * l[2]).sqrt();
        assert!(slip > 0.1);
        // Sliding: friction on the cone boundary, directly against the slip.
        assert!((friction - 0.5 * l[0]).abs() < 1e-8);
        let cos = -(vs * l[1] + vt * l[2]) / (slip * friction);
        assert!(cos > 1.0 - 1e-9, "cos={cos}");
    }

    #[test]
    fn test_converged_implies_small_merit() {
        let ops = two_spheres_on_ground(0.5);
        // A tiny R barely moves the iterate, so the change test passes at once.
        let tiny = RFactors {
            r: vec![Vec4::repeat(1e-12); ops.contact_count()],
            nu: 1e-12,
        };
        let config = SolverConfig::default().with_max_iterations(20);
        let stalled = solve(&ops, &tiny, &config, None);
        assert!(!stalled.stats.converged);
        assert_eq!(stalled.stats.iterations, 20);
        assert!(stalled.stats.merit > config.merit_acceptance);

        let out = solve(&ops, &local_r(&ops), &config, None);
        assert!(out.stats.converged);
        assert!(out.stats.merit <= config.merit_acceptance);
    }

    #[test]
    fn test_mismatched_r_falls_back_to_local() {
        let ops = two_spheres_on_ground(0.3);
        let config = SolverConfig::default();
        let expected = solve(&ops, &local_r(&ops), &config, None);
        let out = solve(&ops, &RFactors::default(), &config, None);
        assert_eq!(out.lambda, expected.lambda);
        assert!(out.stats.converged);
    }

    #[test]
    fn test_numerical_ellipsoid_anisotropic_friction() {
        let mu = [0.6, 0.2, 0.05];
        let ops = anisotropic_slider(MaterialPair::new(mu[0], mu[1], mu[2], 0.0));
        let config = SolverConfig::default()
            .with_sub_solvers(NormalSubSolver::Nonnegative, FrictionSubSolver::NumericalEllipsoid)
            .with_criterion(ConvergenceCriterion::Merit)
            .with_tolerance(1e-8)
            .with_max_iterations(500);
        let out = solve(&ops, &local_r(&ops), &config, None);
        assert!(out.stats.converged, "merit={}", out.stats.merit);
        let l = out.lambda[0];
        assert!((l[0] - G * H).abs() < 1e-6);
        // Sliding and spinning: the impulse sits on the ellipsoid boundary.
        assert!((ellipsoid_level(&l, &mu) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_analytical_ellipsoid_stays_feasible() {
        let mu = [0.6, 0.2, 0.05];
        let ops = anisotropic_slider(MaterialPair::new(mu[0], mu[1], mu[2], 0.0));
        let config = SolverConfig::default()
            .with_sub_solvers(NormalSubSolver::Nonnegative, FrictionSubSolver::AnalyticalEllipsoid)
            .with_max_iterations(200);
        let out = solve(&ops, &local_r(&ops), &config, None);
        let l = out.lambda[0];
        assert!(is_finite4(&l));
        assert!(l[0] > 0.0);
        assert!(ellipsoid_level(&l, &mu) <= 1.0 + 1e-9);
        if out.stats.converged {
            assert!(out.stats.merit <= config.merit_acceptance);
        }
    }

    #[test]
    fn test_blocked_groups_with_anisotropic_friction() {
        let mu = [0.6, 0.2, 0.05];
        let ops = slider_and_stack(MaterialPair::new(mu[0], mu[1], mu[2], 0.0));
        let r = RFactorStrategy::Blocked.compute(&ops, &RFactorConfig::default());
        assert_eq!(crate::r_factor::contact_groups(&ops).len(), 2);
        assert_ne!(r.r[0], r.r[1]);

        let config = SolverConfig::default()
            .with_sub_solvers(NormalSubSolver::Nonnegative, FrictionSubSolver::NumericalEllipsoid)
            .with_criterion(ConvergenceCriterion::Merit)
            .with_tolerance(1e-8)
            .with_adaptive(false)
            .with_max_iterations(2000);
        let out = solve(&ops, &r, &config, None);
        assert!(out.stats.converged, "merit={}", out.stats.merit);

        for l in &out.lambda {
            assert!(l[0] > 0.0);
            assert!(ellipsoid_level(l, &mu) <= 1.0 + 1e-6);
        }
        assert!((out.lambda[0][0] - G * H).abs() < 1e-6);
        assert!((out.lambda[1][0] - 3.0 * G * H).abs() < 1e-6);
        assert!((out.lambda[2][0] - 2.0 * G * H).abs() < 1e-6);
    }
}
