#![allow(dead_code)]

use ewaldmc::core::forcefield::pair::LjCoulEwald;
use ewaldmc::core::forcefield::params::PairParams;
use ewaldmc::core::models::space::{MoleculeKind, SiteTemplate, Space};
use ewaldmc::engine::config::McConfig;
use ewaldmc::engine::criteria::{Criteria, Thermo};
use ewaldmc::engine::mc::MonteCarlo;
use nalgebra::{UnitQuaternion, Vector3};

pub const KIND_ATOM: usize = 0;
pub const KIND_DIMER: usize = 1;

pub fn params(k2max: u32, fast_delete: bool) -> PairParams {
    let content = format!(
        r#"
[globals]
cutoff = 3.0
alpha_l = 5.6
k2max = {k2max}
fast_delete = {fast_delete}
erfc_table_points = 4000

[[sites]]
name = "Ar"
epsilon = 1.0
sigma = 1.0
charge = 0.0

[[sites]]
name = "P"
epsilon = 0.6
sigma = 0.9
charge = 0.4

[[sites]]
name = "N"
epsilon = 0.6
sigma = 0.9
charge = -0.4
"#
    );
    PairParams::from_toml_str(&content, "test").unwrap()
}

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

/// A cubic lattice alternating neutral atoms and charged dimers.
pub fn lattice_space(per_side: usize, spacing: f64) -> Space {
    let mut space = empty_space(per_side as f64 * spacing);
    let identity = UnitQuaternion::identity();
    let mut n = 0;
    for i in 0..per_side {
        for j in 0..per_side {
            for k in 0..per_side {
                let anchor = Vector3::new(i as f64, j as f64, k as f64) * spacing
                    + Vector3::new(0.1, 0.2, 0.3);
                let kind = if n % 2 == 1 { KIND_DIMER } else { KIND_ATOM };
                space.add_molecule(kind, anchor, &identity).unwrap();
                n += 1;
            }
        }
    }
    space
}

pub fn engine(space: Space, k2max: u32, config: McConfig) -> MonteCarlo {
    engine_with(space, k2max, false, config)
}

pub fn engine_with(space: Space, k2max: u32, fast_delete: bool, config: McConfig) -> MonteCarlo {
    let pair = LjCoulEwald::new(params(k2max, fast_delete), &space).unwrap();
    let criteria = Criteria::metropolis(Thermo::new(0.4, vec![0.02, 0.01]));
    MonteCarlo::new(space, Box::new(pair), criteria, config)
}
