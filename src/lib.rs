//! # proxdyn
//!
//! **Rigid-Body Dynamics with a PROX Frictional Contact Solver**
//!
//! Time stepping for rigid bodies in unilateral, frictional contact. Every
//! step the contact impulses are found by a proximal-projection fixed-point
//! iteration over the contact NCP (non-penetration plus Coulomb friction
//! cones) and the resulting velocities are integrated.
//!
//! ## Features
//!
//! | Stage | Module | Variants |
//! |-------|--------|----------|
//! | **Assembly** | [`assembler`] | two-column block Jacobian, block-diagonal W |
//! | **R-factors** | [`r_factor`] | local, global, blocked |
//! | **Normal projection** | [`sub_solvers`] | nonnegative, origin, infinity |
//! | **Friction projection** | [`sub_solvers`] | sphere, ellipsoid (analytical / numerical), box, origin, infinity |
//! | **Solver** | [`solver`] | Jacobi, Gauss–Seidel; relative change or merit |
//! | **Stepping** | [`stepper`] | Moreau, semi-implicit, empty |
//!
//! ## Design Principles
//!
//! - **Closed variant sets**: strategies are enums chosen by configuration
//! - **Flat arenas**: per-contact block pairs and per-body blocks, no general
//!   sparse matrix
//! - **Total numerics**: degenerate geometry and non-finite iterates are
//!   repaired locally; only configuration errors reach the caller
//! - **Bounded**: the solver always stops at its iteration cap
//!
//! Geometry, broad phase and narrow phase are external: contacts come in
//! through the [`CollisionSystem`] trait.
//!
//! ## Quick Start
//!
//! ```rust
//! use proxdyn::prelude::*;
//!
//! let mut bodies = vec![
//!     RigidBody::new_static(0, Vec3::zeros()),
//!     RigidBody::new_sphere(1, Vec3::new(0.0, 1.0, 0.0), 1.0, 1.0),
//! ];
//! let materials = MaterialTable::new();
//!
//! // Unit sphere above the plane y = 0.
//! let mut collision = |bodies: &[RigidBody]| {
//!     let p = bodies[1].position;
//!     vec![ContactPoint::new(0, 1, Vec3::new(p.x, 0.0, p.z), Vec3::y(), p.y - 1.0)]
//! };
//!
//! let mut stepper = Stepper::new(SimulationConfig::default());
//! for _ in 0..10 {
//!     let report = stepper.step(0.01, &mut bodies, &materials, &mut collision)?;
//!     assert!(report.stats.map_or(false, |s| s.converged));
//! }
//! assert!((bodies[1].position.y - 1.0).abs() < 1e-6);
//! # Ok::<(), proxdyn::PhysicsError>(())
//! ```
//!
//! ## Parallelism
//!
//! With the `parallel` feature, Jacobi sweeps and per-body integration fan
//! out with Rayon. Gauss–Seidel sweeps stay sequential.

pub mod assembler;
pub mod body;
pub mod config;
pub mod contact;
pub mod error;
pub mod material;
pub mod math;
pub mod r_factor;
pub mod solver;
pub mod stepper;
pub mod sub_solvers;
pub mod warm_start;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::assembler::{
        assemble, AssemblerConfig, AssemblyDiagnostics, BodyInverseMass, ContactJacobian,
        SystemOperators,
    };
    pub use crate::body::{reindex_bodies, BodyId, RigidBody};
    pub use crate::config::SimulationConfig;
    pub use crate::contact::{CollisionSystem, ContactList, ContactPoint, NoCollision};
    pub use crate::error::PhysicsError;
    pub use crate::material::{
        CombineRule, MaterialId, MaterialPair, MaterialPairKey, MaterialTable, PhysicsMaterial,
        DEFAULT_MATERIAL,
    };
    pub use crate::math::{Quat, Real, Vec3, Vec4, Vec6};
    pub use crate::r_factor::{RFactorConfig, RFactorStrategy, RFactors};
    pub use crate::solver::{
        solve, ConvergenceCriterion, Scheduling, SolveOutput, SolveStats, SolverConfig,
    };
    pub use crate::stepper::{StepReport, Stepper, StepperConfig, StepperKind};
    pub use crate::sub_solvers::{FrictionSubSolver, NormalSubSolver, NumericalProjection};
    pub use crate::warm_start::{ContactKey, WarmStartCache};
}

// Re-export main types at crate root
pub use prelude::*;
