//! Material System with Pair-wise Combine Rules
//!
//! Resolves the friction coefficients and restitution of a contact from the
//! materials of the two bodies touching it.
//!
//! # Features
//!
//! - **Material IDs**: Assign material types to rigid bodies
//! - **Per-axis friction**: tangent s, tangent t and drilling coefficients
//! - **Combine Rules**: Average, Min, Max, Multiply for friction/restitution
//! - **Pair Overrides**: Explicit `MaterialPair` for specific material pairs
//! - **Default Materials**: Predefined materials (Metal, Wood, Rubber, Ice, etc.)

use crate::error::{PhysicsError, Result};
use crate::math::Real;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Material ID (u16 for compact storage)
pub type MaterialId = u16;

/// Default material ID
pub const DEFAULT_MATERIAL: MaterialId = 0;

/// Combine rule for friction/restitution when two materials interact
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CombineRule {
    /// Average of two values
    #[default]
    Average,
    /// Minimum of two values
    Min,
    /// Maximum of two values
    Max,
    /// Multiply two values
    Multiply,
}

impl CombineRule {
    /// Apply the combine rule to two values
    #[inline]
    pub fn apply(&self, a: Real, b: Real) -> Real {
        match self {
            CombineRule::Average => 0.5 * (a + b),
            CombineRule::Min => a.min(b),
            CombineRule::Max => a.max(b),
            CombineRule::Multiply => a * b,
        }
    }

    fn priority(self) -> u8 {
        match self {
            CombineRule::Min => 0,
            CombineRule::Average => 1,
            CombineRule::Multiply => 2,
            CombineRule::Max => 3,
        }
    }
}

/// Priority: Max > Multiply > Average > Min
fn combine_rule_priority(a: CombineRule, b: CombineRule) -> CombineRule {
    if a.priority() >= b.priority() {
        a
    } else {
        b
    }
}

/// Resolved contact material: per-axis friction and restitution
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MaterialPair {
    /// Friction coefficient along the first tangent direction
    pub mu_s: Real,
    /// Friction coefficient along the second tangent direction
    pub mu_t: Real,
    /// Drilling (torsional) friction coefficient
    pub mu_tau: Real,
    /// Coefficient of restitution
    pub restitution: Real,
}

impl MaterialPair {
    /// Create a pair with explicit per-axis coefficients.
    ///
    /// Negative or non-finite coefficients are clamped to zero.
    pub fn new(mu_s: Real, mu_t: Real, mu_tau: Real, restitution: Real) -> Self {
        let clean = |x: Real| if x.is_finite() { x.max(0.0) } else { 0.0 };
        Self {
            mu_s: clean(mu_s),
            mu_t: clean(mu_t),
            mu_tau: clean(mu_tau),
            restitution: clean(restitution),
        }
    }

    /// Isotropic tangential friction without drilling resistance
    pub fn isotropic(mu: Real, restitution: Real) -> Self {
        Self::new(mu, mu, 0.0, restitution)
    }

    /// No friction, no bounce
    pub fn frictionless() -> Self {
        Self::new(0.0, 0.0, 0.0, 0.0)
    }

    /// Friction coefficients as `[mu_s, mu_t, mu_tau]`
    #[inline]
    pub fn mu(&self) -> [Real; 3] {
        [self.mu_s, self.mu_t, self.mu_tau]
    }
}

impl Default for MaterialPair {
    fn default() -> Self {
        Self::isotropic(0.5, 0.0)
    }
}

/// Physics material definition
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PhysicsMaterial {
    /// Material identifier
    pub id: MaterialId,
    /// Tangential friction coefficient (both tangent axes)
    pub friction: Real,
    /// Drilling friction coefficient
    pub torsional_friction: Real,
    /// Restitution (bounciness)
    pub restitution: Real,
    /// Friction combine rule
    pub friction_combine: CombineRule,
    /// Restitution combine rule
    pub restitution_combine: CombineRule,
}

impl PhysicsMaterial {
    /// Create a new material with given properties
    pub fn new(id: MaterialId, friction: Real, restitution: Real) -> Self {
        Self {
            id,
            friction,
            torsional_friction: 0.0,
            restitution,
            friction_combine: CombineRule::Average,
            restitution_combine: CombineRule::Average,
        }
    }

    /// Set combine rules
    pub fn with_combine_rules(mut self, friction: CombineRule, restitution: CombineRule) -> Self {
        self.friction_combine = friction;
        self.restitution_combine = restitution;
        self
    }

    /// Set drilling friction
    pub fn with_torsional_friction(mut self, torsional_friction: Real) -> Self {
        self.torsional_friction = torsional_friction;
        self
    }
}

impl Default for PhysicsMaterial {
    fn default() -> Self {
        Self::new(DEFAULT_MATERIAL, 0.5, 0.0)
    }
}

/// Unordered pair of material ids, stored canonically (a <= b)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MaterialPairKey {
    /// Smaller material id
    pub a: MaterialId,
    /// Larger material id
    pub b: MaterialId,
}

impl MaterialPairKey {
    /// Create a canonical key
    #[inline]
    pub fn new(a: MaterialId, b: MaterialId) -> Self {
        if a <= b {
            Self { a, b }
        } else {
            Self { a: b, b: a }
        }
    }
}

/// Pair override entry
#[derive(Clone, Copy, Debug)]
struct PairOverride {
    key: MaterialPairKey,
    pair: MaterialPair,
}

/// Material pair lookup table
#[derive(Clone, Debug)]
pub struct MaterialTable {
    /// Registered materials (indexed by MaterialId)
    materials: Vec<PhysicsMaterial>,
    /// Pair-specific overrides
    pair_overrides: Vec<PairOverride>,
}

impl MaterialTable {
    /// Create a new material table with a default material
    pub fn new() -> Self {
        let mut table = Self {
            materials: Vec::new(),
            pair_overrides: Vec::new(),
        };
        table.materials.push(PhysicsMaterial::default());
        table
    }

    /// Register a material, returns its ID.
    ///
    /// Fails once every `MaterialId` is taken.
    pub fn register(&mut self, material: PhysicsMaterial) -> Result<MaterialId> {
        let id = MaterialId::try_from(self.materials.len()).map_err(|_| {
            PhysicsError::InvalidConfiguration {
                reason: "material table is full",
            }
        })?;
        let mut mat = material;
        mat.id = id;
        self.materials.push(mat);
        Ok(id)
    }

    /// Get material by ID
    pub fn get(&self, id: MaterialId) -> Result<&PhysicsMaterial> {
        self.materials
            .get(id as usize)
            .ok_or(PhysicsError::UnknownMaterial { material: id })
    }

    /// Set a pair-specific override.
    ///
    /// Both ids must already be registered.
    pub fn set_pair_override(
        &mut self,
        mat_a: MaterialId,
        mat_b: MaterialId,
        pair: MaterialPair,
    ) -> Result<()> {
        self.get(mat_a)?;
        self.get(mat_b)?;
        let key = MaterialPairKey::new(mat_a, mat_b);

        if let Some(p) = self.pair_overrides.iter_mut().find(|p| p.key == key) {
            p.pair = pair;
        } else {
            self.pair_overrides.push(PairOverride { key, pair });
        }
        Ok(())
    }

    /// Resolve the contact material for two body materials.
    ///
    /// Pair overrides win; otherwise each coefficient is combined with the
    /// higher-priority rule of the two materials.
    pub fn pair(&self, mat_a: MaterialId, mat_b: MaterialId) -> Result<MaterialPair> {
        self.pair_for(MaterialPairKey::new(mat_a, mat_b))
    }

    /// Resolve the contact material for a canonical key
    pub fn pair_for(&self, key: MaterialPairKey) -> Result<MaterialPair> {
        let mat_a = self.get(key.a)?;
        let mat_b = self.get(key.b)?;

        if let Some(p) = self.pair_overrides.iter().find(|p| p.key == key) {
            return Ok(p.pair);
        }

        let friction_rule = combine_rule_priority(mat_a.friction_combine, mat_b.friction_combine);
        let restitution_rule =
            combine_rule_priority(mat_a.restitution_combine, mat_b.restitution_combine);

        let mu = friction_rule.apply(mat_a.friction, mat_b.friction);
        Ok(MaterialPair::new(
            mu,
            mu,
            friction_rule.apply(mat_a.torsional_friction, mat_b.torsional_friction),
            restitution_rule.apply(mat_a.restitution, mat_b.restitution),
        ))
    }

    /// Number of registered materials
    #[inline]
    pub fn len(&self) -> usize {
        self.materials.len()
    }

    /// Check if empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    // ===== Predefined materials =====

    /// Register a "Metal" material
    pub fn register_metal(&mut self) -> Result<MaterialId> {
        self.register(PhysicsMaterial::new(0, 0.4, 0.1))
    }

    /// Register a "Wood" material
    pub fn register_wood(&mut self) -> Result<MaterialId> {
        self.register(PhysicsMaterial::new(0, 0.5, 0.3))
    }

    /// Register a "Rubber" material
    pub fn register_rubber(&mut self) -> Result<MaterialId> {
        self.register(
            PhysicsMaterial::new(0, 0.8, 0.8)
                .with_torsional_friction(0.05)
                .with_combine_rules(CombineRule::Max, CombineRule::Max),
        )
    }

    /// Register an "Ice" material
    pub fn register_ice(&mut self) -> Result<MaterialId> {
        self.register(
            PhysicsMaterial::new(0, 0.05, 0.1).with_combine_rules(CombineRule::Min, CombineRule::Min),
        )
    }
}

impl Default for MaterialTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combine_rules() {
        assert!((CombineRule::Average.apply(0.4, 0.8) - 0.6).abs() < 1e-12);
        assert_eq!(CombineRule::Min.apply(0.4, 0.8), 0.4);
        assert_eq!(CombineRule::Max.apply(0.4, 0.8), 0.8);
        assert!((CombineRule::Multiply.apply(0.4, 0.8) - 0.32).abs() < 1e-12);
    }

    #[test]
    fn test_material_table() {
        let mut table = MaterialTable::new();
        let metal = table.register_metal().unwrap();
        let rubber = table.register_rubber().unwrap();

        // Rubber uses Max combine, so the highest friction wins
        let pair = table.pair(metal, rubber).unwrap();
        assert!((pair.mu_s - 0.8).abs() < 1e-12);
        assert!((pair.restitution - 0.8).abs() < 1e-12);
        assert!((pair.mu_tau - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_pair_is_symmetric() {
        let mut table = MaterialTable::new();
        let wood = table.register_wood().unwrap();
        let ice = table.register_ice().unwrap();
        assert_eq!(table.pair(wood, ice).unwrap(), table.pair(ice, wood).unwrap());
    }

    #[test]
    fn test_pair_override() {
        let mut table = MaterialTable::new();
        let a = table.register(PhysicsMaterial::new(0, 0.5, 0.5)).unwrap();
        let b = table.register(PhysicsMaterial::new(0, 0.5, 0.5)).unwrap();

        table
            .set_pair_override(b, a, MaterialPair::new(0.01, 0.2, 0.0, 0.0))
            .unwrap();

        let pair = table.pair(a, b).unwrap();
        assert_eq!(pair.mu_s, 0.01);
        assert_eq!(pair.mu_t, 0.2);
    }

    #[test]
    fn test_register_fails_when_ids_run_out() {
        let mut table = MaterialTable::new();
        for _ in 1..=MaterialId::MAX as usize {
            table.register(PhysicsMaterial::default()).unwrap();
        }
        assert_eq!(table.len(), MaterialId::MAX as usize + 1);
        let err = table.register(PhysicsMaterial::default()).unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(table.len(), MaterialId::MAX as usize + 1);
    }

    #[test]
    fn test_unknown_material_is_error() {
        let table = MaterialTable::new();
        assert_eq!(
            table.pair(DEFAULT_MATERIAL, 42),
            Err(PhysicsError::UnknownMaterial { material: 42 })
        );

        let mut table = MaterialTable::new();
        assert!(table
            .set_pair_override(0, 3, MaterialPair::frictionless())
            .is_err());
    }

    #[test]
    fn test_negative_coefficients_clamped() {
        let pair = MaterialPair::new(-1.0, Real::NAN, 0.2, -0.5);
        assert_eq!(pair.mu(), [0.0, 0.0, 0.2]);
        assert_eq!(pair.restitution, 0.0);
    }

    #[test]
    fn test_combine_rule_priority() {
        let result = combine_rule_priority(CombineRule::Min, CombineRule::Max);
        assert_eq!(result, CombineRule::Max);

        let result = combine_rule_priority(CombineRule::Average, CombineRule::Multiply);
        assert_eq!(result, CombineRule::Multiply);
    }
}
