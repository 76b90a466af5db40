#![no_main]
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use proxdyn::{
    ContactList, ContactPoint, MaterialPair, MaterialTable, RigidBody, SimulationConfig, Stepper,
    Vec3,
};

#[derive(Debug, Arbitrary)]
struct SolveInput {
    /// Sphere positions (i16 keeps magnitudes reasonable)
    positions: Vec<(i16, i16, i16)>,
    /// Contacts as (body_a, body_b, normal, gap, mu)
    contacts: Vec<(u8, u8, (i8, i8, i8), i8, u8)>,
    /// Steps to run (capped)
    steps: u8,
}

// Arbitrary contact lists must never panic the stepper: bad indices are
// configuration errors, degenerate normals are repaired, and the solved
// impulses stay finite.
fuzz_target!(|input: SolveInput| {
    let mut bodies = vec![RigidBody::new_static(0, Vec3::zeros())];
    for (i, &(x, y, z)) in input.positions.iter().take(16).enumerate() {
        let p = Vec3::new(x as f64, y as f64, z as f64) * 0.01;
        bodies.push(RigidBody::new_sphere(i as u32 + 1, p, 1.0, 0.5));
    }

    let contacts: Vec<ContactPoint> = input
        .contacts
        .iter()
        .take(32)
        .map(|&(a, b, (nx, ny, nz), gap, mu)| {
            let n = Vec3::new(nx as f64, ny as f64, nz as f64);
            ContactPoint::new(a as usize, b as usize, Vec3::zeros(), n, gap as f64 * 0.001)
                .with_material(MaterialPair::isotropic(mu as f64 / 128.0, 0.0))
        })
        .collect();

    let mut collision = ContactList::new(contacts);
    let mut stepper = Stepper::new(SimulationConfig::default());
    let materials = MaterialTable::new();
    for _ in 0..(input.steps as usize).min(8) {
        match stepper.step(0.01, &mut bodies, &materials, &mut collision) {
            Ok(report) => {
                for c in &report.contacts {
                    assert!(c.lambda.iter().all(|x| x.is_finite()));
                }
            }
            Err(e) => {
                assert!(e.is_configuration());
                break;
            }
        }
    }
});
