//! Simulation Configuration
//!
//! Aggregates the per-stage settings into one value that is handed to the
//! [`Stepper`](crate::stepper::Stepper) and validated on every step. The
//! time step itself is an argument of each step, not a setting.

use crate::assembler::AssemblerConfig;
use crate::error::{PhysicsError, Result};
use crate::math::Real;
use crate::r_factor::RFactorConfig;
use crate::solver::SolverConfig;
use crate::stepper::StepperConfig;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Full simulation configuration
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SimulationConfig {
    /// Operator assembly
    pub assembler: AssemblerConfig,
    /// R-factor strategy
    pub r_factor: RFactorConfig,
    /// Contact solver
    pub solver: SolverConfig,
    /// Time stepping
    pub stepper: StepperConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            assembler: AssemblerConfig::default(),
            r_factor: RFactorConfig::default(),
            solver: SolverConfig::default(),
            stepper: StepperConfig::default(),
        }
    }
}

#[inline]
fn invalid(reason: &'static str) -> PhysicsError {
    PhysicsError::InvalidConfiguration { reason }
}

#[inline]
fn positive(x: Real) -> bool {
    x.is_finite() && x > 0.0
}

impl SimulationConfig {
    /// Set the assembler configuration
    pub fn with_assembler(mut self, assembler: AssemblerConfig) -> Self {
        self.assembler = assembler;
        self
    }

    /// Set the R-factor configuration
    pub fn with_r_factor(mut self, r_factor: RFactorConfig) -> Self {
        self.r_factor = r_factor;
        self
    }

    /// Set the solver configuration
    pub fn with_solver(mut self, solver: SolverConfig) -> Self {
        self.solver = solver;
        self
    }

    /// Set the stepper configuration
    pub fn with_stepper(mut self, stepper: StepperConfig) -> Self {
        self.stepper = stepper;
        self
    }

    /// Reject settings the pipeline cannot work with
    pub fn validate(&self) -> Result<()> {
        let solver = &self.solver;
        if solver.max_iterations == 0 {
            return Err(invalid("solver iteration cap must be at least 1"));
        }
        if !positive(solver.tolerance) {
            return Err(invalid("solver tolerance must be positive"));
        }
        if !(solver.nu_decrease > 0.0 && solver.nu_decrease < 1.0) {
            return Err(invalid("nu_decrease must lie in (0, 1)"));
        }
        if !(solver.merit_acceptance > 0.0) {
            return Err(invalid("merit acceptance must be positive"));
        }
        if solver.numerical.max_iterations == 0 {
            return Err(invalid("numerical projection needs at least one iteration"));
        }

        let r = &self.r_factor;
        if !positive(r.nu) {
            return Err(invalid("relaxation factor nu must be positive and finite"));
        }
        if !positive(r.epsilon) {
            return Err(invalid("R-factor epsilon must be positive"));
        }

        let a = &self.assembler;
        if !positive(a.normal_epsilon) {
            return Err(invalid("normal epsilon must be positive"));
        }
        if !(a.gap_stabilization.is_finite() && a.gap_stabilization >= 0.0) {
            return Err(invalid("gap stabilization must be non-negative"));
        }
        if !(a.restitution_threshold.is_finite() && a.restitution_threshold >= 0.0) {
            return Err(invalid("restitution threshold must be non-negative"));
        }

        let s = &self.stepper;
        if !s.gravity.iter().all(|g| g.is_finite()) {
            return Err(invalid("gravity must be finite"));
        }
        if !(s.linear_damping.is_finite() && s.linear_damping >= 0.0)
            || !(s.angular_damping.is_finite() && s.angular_damping >= 0.0)
        {
            return Err(invalid("damping must be non-negative"));
        }
        if !(s.warm_start_factor.is_finite() && s.warm_start_factor >= 0.0) {
            return Err(invalid("warm-start factor must be non-negative"));
        }
        if s.envelope.is_nan() {
            return Err(invalid("contact envelope must not be NaN"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::r_factor::RFactorStrategy;
    use crate::solver::Scheduling;

    #[test]
    fn test_default_is_valid() {
        assert!(SimulationConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_iteration_cap() {
        let config = SimulationConfig::default()
            .with_solver(SolverConfig::default().with_max_iterations(0));
        assert_eq!(
            config.validate(),
            Err(PhysicsError::InvalidConfiguration {
                reason: "solver iteration cap must be at least 1"
            })
        );
    }

    #[test]
    fn test_rejects_bad_relaxation() {
        let mut config = SimulationConfig::default();
        config.r_factor.nu = 0.0;
        assert!(config.validate().is_err());

        let mut config = SimulationConfig::default();
        config.solver.nu_decrease = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_negative_damping() {
        let mut config = SimulationConfig::default();
        config.stepper.linear_damping = -0.1;
        assert!(config.validate().unwrap_err().is_configuration());
    }

    #[test]
    fn test_rejects_bad_merit_acceptance() {
        let config = SimulationConfig::default()
            .with_solver(SolverConfig::default().with_merit_acceptance(Real::NAN));
        assert!(config.validate().is_err());

        // An infinite bound turns the merit gate off and is allowed.
        let config = SimulationConfig::default()
            .with_solver(SolverConfig::default().with_merit_acceptance(Real::INFINITY));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builders_compose() {
        let config = SimulationConfig::default()
            .with_r_factor(RFactorConfig::default().with_strategy(RFactorStrategy::Blocked))
            .with_solver(SolverConfig::default().with_scheduling(Scheduling::Jacobi));
        assert_eq!(config.r_factor.strategy, RFactorStrategy::Blocked);
        assert_eq!(config.solver.scheduling, Scheduling::Jacobi);
        assert!(config.validate().is_ok());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serde_round_trip_with_defaults() {
        let json = r#"{
            "solver": { "scheduling": "jacobi", "friction": "numerical_ellipsoid" },
            "r_factor": { "strategy": "global", "nu": 0.9 }
        }"#;
        let config: SimulationConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.solver.scheduling, Scheduling::Jacobi);
        assert_eq!(
            config.solver.friction,
            crate::sub_solvers::FrictionSubSolver::NumericalEllipsoid
        );
        assert_eq!(config.solver.max_iterations, 100);
        assert_eq!(config.r_factor.strategy, RFactorStrategy::Global);

        let back: SimulationConfig =
            serde_json::from_str(&serde_json::to_string(&config).unwrap()).unwrap();
        assert_eq!(back, config);
    }
}
