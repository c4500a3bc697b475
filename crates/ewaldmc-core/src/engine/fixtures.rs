use super::criteria::{Criteria, Thermo};
use super::system::System;
use crate::core::forcefield::pair::LjCoulEwald;
use crate::core::forcefield::params::{GlobalParams, PairParams, SiteParams};
use crate::core::models::space::{MoleculeKind, SiteTemplate, Space};
use nalgebra::{UnitQuaternion, Vector3};

pub const BETA: f64 = 0.4;
pub const KIND_ATOM: usize = 0;
pub const KIND_DIMER: usize = 1;

pub fn params(k2max: u32) -> PairParams {
    PairParams {
        globals: GlobalParams {
            cutoff: 3.0,
            alpha_l: 5.6,
            k2max,
            tail_correction: true,
            fast_delete: false,
            erfc_table_points: 4_000,
        },
        sites: vec![
            SiteParams {
                name: "Ar".into(),
                epsilon: 1.0,
                sigma: 1.0,
                charge: 0.0,
            },
            SiteParams {
                name: "P".into(),
                epsilon: 0.6,
                sigma: 0.9,
                charge: 0.4,
            },
            SiteParams {
                name: "N".into(),
                epsilon: 0.6,
                sigma: 0.9,
                charge: -0.4,
            },
        ],
    }
}

/// An empty cubic box with a neutral atom kind and a charged dimer kind.
pub fn empty_space(length: f64) -> Space {
    let mut space = Space::cubic(length).unwrap();
    space.add_kind(MoleculeKind::atomic("Ar", 0));
    space.add_kind(MoleculeKind::new(
        "PN",
        vec![
            SiteTemplate {
                site_type: 1,
                offset: Vector3::zeros(),
            },
            SiteTemplate {
                site_type: 2,
                offset: Vector3::new(1.0, 0.0, 0.0),
            },
        ],
    ));
    space
}

/// Fills a simple cubic lattice, alternating atoms and dimers when `mixed` is set.
pub fn lattice_space(per_side: usize, spacing: f64, mixed: bool) -> Space {
    let mut space = empty_space(per_side as f64 * spacing);
    let identity = UnitQuaternion::identity();
    let mut n = 0;
    for i in 0..per_side {
        for j in 0..per_side {
            for k in 0..per_side {
                let anchor = Vector3::new(i as f64, j as f64, k as f64) * spacing
                    + Vector3::new(0.1, 0.2, 0.3);
                let kind = if mixed && n % 2 == 1 { KIND_DIMER } else { KIND_ATOM };
                space.add_molecule(kind, anchor, &identity).unwrap();
                n += 1;
            }
        }
    }
    space
}

pub fn system(space: Space, k2max: u32) -> System {
    let pair = LjCoulEwald::new(params(k2max), &space).unwrap();
    let criteria = Criteria::metropolis(Thermo::new(BETA, vec![0.02, 0.01]));
    System::new(space, Box::new(pair), criteria)
}

pub fn assert_consistent(system: &System) {
    let full = system.pair.full_terms(&system.space).unwrap().total();
    assert!(
        (full - system.pair.total()).abs() < 1e-7,
        "incremental {} vs full {}",
        system.pair.total(),
        full
    );
}
