#![no_main]
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use proxdyn::sub_solvers::project_contact;
use proxdyn::{FrictionSubSolver, NormalSubSolver, NumericalProjection, Vec4};

#[derive(Debug, Arbitrary)]
struct ProjectionInput {
    /// Trial impulse (normal, s, t, drilling), any bit pattern
    z: [f64; 4],
    /// Friction coefficients
    mu: [f64; 3],
    normal: u8,
    friction: u8,
}

// Every projection must be total: no panic, finite output, inside the set.
fuzz_target!(|input: ProjectionInput| {
    let normal = match input.normal % 3 {
        0 => NormalSubSolver::Nonnegative,
        1 => NormalSubSolver::Origin,
        _ => NormalSubSolver::Infinity,
    };
    let friction = match input.friction % 6 {
        0 => FrictionSubSolver::AnalyticalSphere,
        1 => FrictionSubSolver::AnalyticalEllipsoid,
        2 => FrictionSubSolver::NumericalEllipsoid,
        3 => FrictionSubSolver::BoxModel,
        4 => FrictionSubSolver::Origin,
        _ => FrictionSubSolver::Infinity,
    };
    let z = Vec4::from(input.z);
    let out = project_contact(normal, friction, &z, &input.mu, &NumericalProjection::default());

    assert!(out.iter().all(|x| x.is_finite()), "non-finite projection {out:?}");
    if normal == NormalSubSolver::Nonnegative {
        assert!(out[0] >= 0.0);
    }
    if out[0] <= 0.0 && friction != FrictionSubSolver::Infinity {
        assert_eq!(out[1], 0.0);
        assert_eq!(out[2], 0.0);
        assert_eq!(out[3], 0.0);
    }
});
