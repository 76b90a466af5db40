//! Warm-Start Impulse Cache
//!
//! Carries solved impulses from one step to the next so the solver starts
//! close to the previous solution. Contacts are matched by the stable ids
//! of their bodies plus the pipeline feature id, which survive re-indexing.
//!
//! # Features
//!
//! - **Frame ageing**: `begin_frame` ages every entry, `store` refreshes it,
//!   `end_frame` drops entries older than `max_age`
//! - **Scaled warm start**: `factor` blends the carried impulse towards zero

use crate::body::{BodyId, RigidBody};
use crate::contact::ContactPoint;
use crate::math::{is_finite4, Real, Vec4};
use std::collections::HashMap;

/// Identity of a contact across steps
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContactKey {
    /// Stable id of body A
    pub id_a: BodyId,
    /// Stable id of body B
    pub id_b: BodyId,
    /// Pipeline feature id
    pub feature: u32,
}

impl ContactKey {
    /// Key of a contact given the bodies it indexes.
    ///
    /// Body order is kept: swapping A and B flips the normal, so the cached
    /// impulse would not apply.
    #[inline]
    pub fn of(contact: &ContactPoint, bodies: &[RigidBody]) -> Option<Self> {
        let a = bodies.get(contact.body_a)?;
        let b = bodies.get(contact.body_b)?;
        Some(Self {
            id_a: a.id,
            id_b: b.id,
            feature: contact.feature,
        })
    }
}

#[derive(Clone, Copy, Debug)]
struct CachedImpulse {
    lambda: Vec4,
    stale_frames: u32,
}

/// Impulse cache keyed by [`ContactKey`]
#[derive(Clone, Debug)]
pub struct WarmStartCache {
    entries: HashMap<ContactKey, CachedImpulse>,
    /// Frames an entry may go unrefreshed before removal
    pub max_age: u32,
    /// Scale applied to carried impulses (0 = cold start, 1 = full)
    pub factor: Real,
}

impl WarmStartCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            max_age: 3,
            factor: 1.0,
        }
    }

    /// Set the maximum age
    pub fn with_max_age(mut self, max_age: u32) -> Self {
        self.max_age = max_age;
        self
    }

    /// Set the warm-start factor
    pub fn with_factor(mut self, factor: Real) -> Self {
        self.factor = factor;
        self
    }

    /// Age every entry (call at the start of a step)
    pub fn begin_frame(&mut self) {
        for entry in self.entries.values_mut() {
            entry.stale_frames += 1;
        }
    }

    /// Drop entries older than `max_age` (call at the end of a step)
    pub fn end_frame(&mut self) {
        let max_age = self.max_age;
        self.entries.retain(|_, e| e.stale_frames <= max_age);
    }

    /// Cached impulse for a key, scaled by `factor`
    pub fn lookup(&self, key: &ContactKey) -> Option<Vec4> {
        self.entries.get(key).map(|e| e.lambda * self.factor)
    }

    /// Store a solved impulse. Non-finite impulses are not cached.
    pub fn store(&mut self, key: ContactKey, lambda: Vec4) {
        if !is_finite4(&lambda) {
            self.entries.remove(&key);
            return;
        }
        self.entries.insert(
            key,
            CachedImpulse {
                lambda,
                stale_frames: 0,
            },
        );
    }

    /// Initial impulses for `contacts`, zero where nothing is cached.
    ///
    /// Returns the impulses and the number of cache hits.
    pub fn gather(&self, contacts: &[ContactPoint], bodies: &[RigidBody]) -> (Vec<Vec4>, usize) {
        let mut hits = 0;
        let lambda = contacts
            .iter()
            .map(|c| {
                match ContactKey::of(c, bodies).and_then(|key| self.lookup(&key)) {
                    Some(l) => {
                        hits += 1;
                        l
                    }
                    None => Vec4::zeros(),
                }
            })
            .collect();
        (lambda, hits)
    }

    /// Store the solved impulse of every contact
    pub fn scatter(&mut self, contacts: &[ContactPoint], bodies: &[RigidBody]) {
        for c in contacts {
            if let Some(key) = ContactKey::of(c, bodies) {
                self.store(key, c.lambda);
            }
        }
    }

    /// Number of cached contacts
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is cached
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for WarmStartCache {
    fn default() -> Self {
        Self::new()
    }
}
