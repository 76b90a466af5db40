//! R-Factor Strategies
//!
//! Per-contact step sizes for the proximal iteration
//! `λ ← prox(λ - R (A λ + b))`, with `A = J W Jᵀ`.
//!
//! # Strategies
//!
//! - **Local**: `Rₖ = ν / diag(Jₖ W Jₖᵀ)`, per contact and per row. Cheap and
//!   independent of sweep order, but blind to cross-contact coupling.
//! - **Global**: one scalar `R = ν / ρ(A)` for every contact, with `ρ(A)`
//!   estimated by power iteration once per step.
//! - **Blocked**: `R = ν / ρ(A_g)` per group of contacts connected through
//!   shared dynamic bodies. Fixed bodies have a zero block in W and do not
//!   couple contacts, so they never merge groups.
//!
//! Near-zero diagonal entries and spectral estimates are clamped to
//! `epsilon` instead of failing.
//!
//! Rows a friction projection couples (the (s, t) disc, or all three rows
//! of an ellipsoid) need one shared R. [`RFactors::share_coupled_rows`]
//! replaces them by their smallest entry, i.e. `ν / max(dᵢ)` under Local.

use crate::assembler::SystemOperators;
use crate::math::{Real, Vec4, Vec6};
use crate::sub_solvers::FrictionSubSolver;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// R-factor strategy selector
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum RFactorStrategy {
    /// Inverse Delassus diagonal per contact
    #[default]
    Local,
    /// Inverse spectral radius of the whole operator
    Global,
    /// Inverse spectral radius per coupled contact group
    Blocked,
}

/// R-factor configuration
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RFactorConfig {
    /// Strategy
    pub strategy: RFactorStrategy,
    /// Relaxation factor ν multiplying every R
    pub nu: Real,
    /// Lower clamp for diagonal entries and spectral estimates
    pub epsilon: Real,
    /// Power iterations for the spectral radius estimate
    pub power_iterations: usize,
}

impl Default for RFactorConfig {
    fn default() -> Self {
        Self {
            strategy: RFactorStrategy::Local,
            nu: 1.0,
            epsilon: 1e-10,
            power_iterations: 32,
        }
    }
}

impl RFactorConfig {
    /// Select the strategy
    pub fn with_strategy(mut self, strategy: RFactorStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set ν
    pub fn with_nu(mut self, nu: Real) -> Self {
        self.nu = nu;
        self
    }
}

/// Per-contact relaxation parameters
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RFactors {
    /// R per contact and row
    pub r: Vec<Vec4>,
    /// Current relaxation factor ν
    pub nu: Real,
}

impl RFactors {
    /// Scale every R (and ν) by `factor`
    pub fn scale(&mut self, factor: Real) {
        for r in &mut self.r {
            *r *= factor;
        }
        self.nu *= factor;
    }

    /// R of contact `k`
    #[inline]
    pub fn get(&self, k: usize) -> &Vec4 {
        &self.r[k]
    }

    /// Number of contacts covered
    #[inline]
    pub fn len(&self) -> usize {
        self.r.len()
    }

    /// True when no contact is covered
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.r.is_empty()
    }

    /// Give the rows `friction` projects jointly their smallest R.
    pub fn share_coupled_rows(&mut self, friction: FrictionSubSolver) {
        let rows = friction.coupled_rows();
        if rows.len() < 2 {
            return;
        }
        for r in &mut self.r {
            let shared = rows.iter().map(|&i| r[i]).fold(Real::INFINITY, Real::min);
            for &i in rows {
                r[i] = shared;
            }
        }
    }
}

impl RFactorStrategy {
    /// Compute R for every contact of `ops`
    pub fn compute(&self, ops: &SystemOperators, config: &RFactorConfig) -> RFactors {
        let eps = config.epsilon.max(Real::MIN_POSITIVE);
        let nu = config.nu;
        let r = match self {
            RFactorStrategy::Local => (0..ops.contact_count())
                .map(|k| {
                    ops.delassus_diagonal(k)
                        .map(|d| nu / clamp_positive(d, eps))
                })
                .collect(),
            RFactorStrategy::Global => {
                let all: Vec<usize> = (0..ops.contact_count()).collect();
                let rho = spectral_radius(ops, &all, config.power_iterations, eps);
                vec![Vec4::repeat(nu / rho); ops.contact_count()]
            }
            RFactorStrategy::Blocked => {
                let mut r = vec![Vec4::zeros(); ops.contact_count()];
                for group in contact_groups(ops) {
                    let rho = spectral_radius(ops, &group, config.power_iterations, eps);
                    for &k in &group {
                        r[k] = Vec4::repeat(nu / rho);
                    }
                }
                r
            }
        };
        RFactors { r, nu }
    }
}

#[inline]
fn clamp_positive(x: Real, eps: Real) -> Real {
    if x.is_finite() && x > eps {
        x
    } else {
        eps
    }
}

/// True when the body block of W is zero
fn is_fixed(ops: &SystemOperators, body: usize) -> bool {
    let w = &ops.inv_mass[body];
    w.inv_mass == 0.0 && w.inv_inertia.iter().all(|&c| c == 0.0)
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

/// Partition contacts into groups connected through shared dynamic bodies.
///
/// Groups are returned in order of their first contact, and contacts keep
/// their enumeration order inside each group.
pub fn contact_groups(ops: &SystemOperators) -> Vec<Vec<usize>> {
    let n = ops.contact_count();
    let mut parent: Vec<usize> = (0..n).collect();
    let mut owner: Vec<Option<usize>> = vec![None; ops.body_count];

    for k in 0..n {
        for &body in &ops.jacobian[k].bodies {
            if is_fixed(ops, body) {
                continue;
            }
            match owner[body] {
                None => owner[body] = Some(k),
                Some(other) => {
                    let ra = find(&mut parent, k);
                    let rb = find(&mut parent, other);
                    if ra != rb {
                        parent[ra.max(rb)] = ra.min(rb);
                    }
                }
            }
        }
    }

    let mut slot: Vec<Option<usize>> = vec![None; n];
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for k in 0..n {
        let root = find(&mut parent, k);
        let g = *slot[root].get_or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[g].push(k);
    }
    groups
}

/// Power-iteration estimate of `ρ(A)` restricted to `members`.
///
/// Falls back to the largest Delassus diagonal entry when the estimate is
/// not usable; the result is always `>= eps`.
pub fn spectral_radius(
    ops: &SystemOperators,
    members: &[usize],
    iterations: usize,
    eps: Real,
) -> Real {
    if members.is_empty() {
        return eps;
    }

    let fallback = members
        .iter()
        .map(|&k| ops.delassus_diagonal(k).max())
        .fold(0.0, Real::max);

    let mut x: Vec<Vec4> = vec![Vec4::repeat(1.0); members.len()];
    let norm = (4.0 * members.len() as Real).sqrt();
    for v in &mut x {
        *v /= norm;
    }

    let mut w = vec![Vec6::zeros(); ops.body_count];
    let mut rho: Real = 0.0;
    for _ in 0..iterations.max(1) {
        for &k in members {
            for &b in &ops.jacobian[k].bodies {
                w[b] = Vec6::zeros();
            }
        }
        for (i, &k) in members.iter().enumerate() {
            ops.accumulate_wjt(k, &x[i], &mut w);
        }
        let y: Vec<Vec4> = members
            .iter()
            .map(|&k| ops.contact_velocity(k, &w))
            .collect();
        let y_norm = y.iter().map(|v| v.norm_squared()).sum::<Real>().sqrt();
        if !y_norm.is_finite() || y_norm <= eps {
            rho = y_norm;
            break;
        }
        rho = y_norm;
        for (xi, yi) in x.iter_mut().zip(&y) {
            *xi = yi / y_norm;
        }
    }

    if rho.is_finite() && rho > eps {
        rho
    } else {
        clamp_positive(fallback, eps)
    }
}
