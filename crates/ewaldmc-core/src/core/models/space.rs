use crate::core::io::record::{RecordError, RecordWriter, Records};
use crate::core::io::traits::Restartable;
use crate::core::utils::geometry::{minimum_image, wrap_shift};
use nalgebra::{UnitQuaternion, Vector3};
use rand::Rng;
use std::ops::Range;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SpaceError {
    #[error("Box lengths must be positive, got {0:?}")]
    InvalidBox([f64; 3]),
    #[error("Unknown molecule kind index {0}")]
    UnknownKind(usize),
    #[error("Molecule index {index} out of range ({count} molecules)")]
    MoleculeOutOfRange { index: usize, count: usize },
    #[error("Expected {expected} positions for molecule {index}, got {found}")]
    PositionCount {
        index: usize,
        expected: usize,
        found: usize,
    },
    #[error("Cannot swap configurations with differing molecule kinds")]
    KindMismatch,
}

/// One site of a rigid molecule template.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteTemplate {
    pub site_type: usize,
    pub offset: Vector3<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MoleculeKind {
    pub name: String,
    pub sites: Vec<SiteTemplate>,
}

impl MoleculeKind {
    pub fn new(name: impl Into<String>, sites: Vec<SiteTemplate>) -> Self {
        Self {
            name: name.into(),
            sites,
        }
    }

    /// A single-site molecule with its site at the origin.
    pub fn atomic(name: impl Into<String>, site_type: usize) -> Self {
        Self::new(
            name,
            vec![SiteTemplate {
                site_type,
                offset: Vector3::zeros(),
            }],
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Molecule {
    pub kind: usize,
    pub start: usize,
    pub len: usize,
}

impl Molecule {
    pub fn sites(&self) -> Range<usize> {
        self.start..self.start + self.len
    }
}

/// How per-site storage is compacted when a molecule is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteMode {
    /// Erase the block and shift every later site down.
    Stable,
    /// Move the trailing molecule's block into the freed slot.
    SwapLast,
}

/// Describes how site indices changed after a removal.
///
/// Components holding per-site caches replay it to stay aligned with the space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Removal {
    pub mode: DeleteMode,
    pub first: usize,
    pub len: usize,
}

/// A periodic orthorhombic box of rigid molecules with dense site ordering.
#[derive(Debug, Clone, PartialEq)]
pub struct Space {
    box_lengths: Vector3<f64>,
    positions: Vec<Vector3<f64>>,
    site_types: Vec<usize>,
    site_molecule: Vec<usize>,
    molecules: Vec<Molecule>,
    kinds: Vec<MoleculeKind>,
    config_id: u64,
}

impl Space {
    pub fn new(box_lengths: Vector3<f64>) -> Result<Self, SpaceError> {
        if box_lengths.iter().any(|&l| !(l > 0.0)) {
            return Err(SpaceError::InvalidBox([
                box_lengths.x,
                box_lengths.y,
                box_lengths.z,
            ]));
        }
        Ok(Self {
            box_lengths,
            positions: Vec::new(),
            site_types: Vec::new(),
            site_molecule: Vec::new(),
            molecules: Vec::new(),
            kinds: Vec::new(),
            config_id: 0,
        })
    }

    pub fn cubic(length: f64) -> Result<Self, SpaceError> {
        Self::new(Vector3::new(length, length, length))
    }

    pub fn add_kind(&mut self, kind: MoleculeKind) -> usize {
        self.kinds.push(kind);
        self.kinds.len() - 1
    }

    pub fn kinds(&self) -> &[MoleculeKind] {
        &self.kinds
    }

    pub fn n_site_types(&self) -> usize {
        self.kinds
            .iter()
            .flat_map(|k| k.sites.iter().map(|s| s.site_type + 1))
            .max()
            .unwrap_or(0)
    }

    pub fn box_lengths(&self) -> &Vector3<f64> {
        &self.box_lengths
    }

    pub fn volume(&self) -> f64 {
        self.box_lengths.x * self.box_lengths.y * self.box_lengths.z
    }

    pub fn min_length(&self) -> f64 {
        self.box_lengths.min()
    }

    pub fn n_sites(&self) -> usize {
        self.positions.len()
    }

    pub fn n_molecules(&self) -> usize {
        self.molecules.len()
    }

    pub fn n_molecules_of(&self, kind: usize) -> usize {
        self.molecules.iter().filter(|m| m.kind == kind).count()
    }

    pub fn positions(&self) -> &[Vector3<f64>] {
        &self.positions
    }

    pub fn site_types(&self) -> &[usize] {
        &self.site_types
    }

    pub fn site_molecule(&self) -> &[usize] {
        &self.site_molecule
    }

    pub fn molecules(&self) -> &[Molecule] {
        &self.molecules
    }

    pub fn molecule(&self, index: usize) -> Result<&Molecule, SpaceError> {
        self.molecules
            .get(index)
            .ok_or(SpaceError::MoleculeOutOfRange {
                index,
                count: self.molecules.len(),
            })
    }

    pub fn molecule_sites(&self, index: usize) -> Result<Vec<usize>, SpaceError> {
        Ok(self.molecule(index)?.sites().collect())
    }

    pub fn config_id(&self) -> u64 {
        self.config_id
    }

    pub fn set_config_id(&mut self, id: u64) {
        self.config_id = id;
    }

    #[inline]
    pub fn minimum_image(&self, d: Vector3<f64>) -> Vector3<f64> {
        minimum_image(d, &self.box_lengths)
    }

    pub fn random_position<R: Rng + ?Sized>(&self, rng: &mut R) -> Vector3<f64> {
        Vector3::new(
            rng.r#gen::<f64>() * self.box_lengths.x,
            rng.r#gen::<f64>() * self.box_lengths.y,
            rng.r#gen::<f64>() * self.box_lengths.z,
        )
    }

    /// Appends a molecule of `kind` and returns its index. Its sites are the trailing sites.
    pub fn add_molecule(
        &mut self,
        kind: usize,
        anchor: Vector3<f64>,
        orientation: &UnitQuaternion<f64>,
    ) -> Result<usize, SpaceError> {
        let template = self.kinds.get(kind).ok_or(SpaceError::UnknownKind(kind))?;
        let index = self.molecules.len();
        let start = self.positions.len();
        let shift = wrap_shift(&anchor, &self.box_lengths);

        for site in &template.sites {
            self.positions.push(anchor + shift + orientation * site.offset);
            self.site_types.push(site.site_type);
            self.site_molecule.push(index);
        }
        self.molecules.push(Molecule {
            kind,
            start,
            len: template.sites.len(),
        });
        Ok(index)
    }

    /// Removes a molecule. `SwapLast` falls back to `Stable` when the trailing molecule
    /// has a different number of sites or is the one being removed.
    pub fn remove_molecule(
        &mut self,
        index: usize,
        mode: DeleteMode,
    ) -> Result<Removal, SpaceError> {
        let target = *self.molecule(index)?;
        let last_index = self.molecules.len() - 1;
        let last = self.molecules[last_index];

        let mode = match mode {
            DeleteMode::SwapLast if index != last_index && last.len == target.len => {
                DeleteMode::SwapLast
            }
            _ => DeleteMode::Stable,
        };

        match mode {
            DeleteMode::Stable => {
                self.positions.drain(target.sites());
                self.site_types.drain(target.sites());
                self.site_molecule.drain(target.sites());
                self.molecules.remove(index);
                for (m, molecule) in self.molecules.iter_mut().enumerate().skip(index) {
                    molecule.start -= target.len;
                    for s in molecule.sites() {
                        self.site_molecule[s] = m;
                    }
                }
            }
            DeleteMode::SwapLast => {
                for offset in 0..target.len {
                    self.positions[target.start + offset] = self.positions[last.start + offset];
                    self.site_types[target.start + offset] = self.site_types[last.start + offset];
                }
                let new_len = self.positions.len() - target.len;
                self.positions.truncate(new_len);
                self.site_types.truncate(new_len);
                self.site_molecule.truncate(new_len);
                self.molecules[index] = Molecule {
                    kind: last.kind,
                    start: target.start,
                    len: target.len,
                };
                self.molecules.truncate(last_index);
            }
        }

        Ok(Removal {
            mode,
            first: target.start,
            len: target.len,
        })
    }

    /// Rigidly displaces a molecule, returning its previous site positions.
    pub fn translate_molecule(
        &mut self,
        index: usize,
        displacement: &Vector3<f64>,
    ) -> Result<Vec<Vector3<f64>>, SpaceError> {
        let molecule = *self.molecule(index)?;
        let previous = self.positions[molecule.sites()].to_vec();
        let anchor = self.positions[molecule.start] + displacement;
        let shift = wrap_shift(&anchor, &self.box_lengths);
        for position in &mut self.positions[molecule.sites()] {
            *position += displacement + shift;
        }
        Ok(previous)
    }

    pub fn set_molecule_positions(
        &mut self,
        index: usize,
        positions: &[Vector3<f64>],
    ) -> Result<(), SpaceError> {
        let molecule = *self.molecule(index)?;
        if positions.len() != molecule.len {
            return Err(SpaceError::PositionCount {
                index,
                expected: molecule.len,
                found: positions.len(),
            });
        }
        self.positions[molecule.sites()].copy_from_slice(positions);
        Ok(())
    }

    /// Scales the volume by `factor`, moving molecules rigidly with their anchor site.
    pub fn scale_volume(&mut self, factor: f64) {
        let scale = factor.cbrt();
        self.box_lengths *= scale;
        for molecule in &self.molecules {
            let shift = self.positions[molecule.start] * (scale - 1.0);
            for position in &mut self.positions[molecule.sites()] {
                *position += shift;
            }
        }
    }

    /// Exchanges the full configuration with `other`, including the configuration id.
    ///
    /// The box lengths travel with the positions. Replicas running volume moves may hold
    /// boxes of different size, and a swapped configuration must stay inside its own box.
    pub fn swap_configuration(&mut self, other: &mut Space) -> Result<(), SpaceError> {
        if self.kinds != other.kinds {
            return Err(SpaceError::KindMismatch);
        }
        std::mem::swap(&mut self.box_lengths, &mut other.box_lengths);
        std::mem::swap(&mut self.positions, &mut other.positions);
        std::mem::swap(&mut self.site_types, &mut other.site_types);
        std::mem::swap(&mut self.site_molecule, &mut other.site_molecule);
        std::mem::swap(&mut self.molecules, &mut other.molecules);
        std::mem::swap(&mut self.config_id, &mut other.config_id);
        Ok(())
    }
}

impl Restartable for Space {
    const CLASS: &'static str = "Space";

    fn write_records(&self, out: &mut RecordWriter) {
        out.list(
            "box",
            &[self.box_lengths.x, self.box_lengths.y, self.box_lengths.z],
        );
        out.record("configID", self.config_id);
        out.record("nKinds", self.kinds.len());
        for (k, kind) in self.kinds.iter().enumerate() {
            out.record(&format!("kind{}", k), &kind.name);
            out.record(&format!("kind{}nSites", k), kind.sites.len());
            for (s, site) in kind.sites.iter().enumerate() {
                out.list(
                    &format!("kind{}site{}", k, s),
                    &[
                        site.site_type as f64,
                        site.offset.x,
                        site.offset.y,
                        site.offset.z,
                    ],
                );
            }
        }
        out.record("nMolecules", self.molecules.len());
        out.record("nSites", self.positions.len());
        for molecule in &self.molecules {
            for s in molecule.sites() {
                let r = self.positions[s];
                out.line(format!("{} {} {} {} {}", molecule.kind, self.site_types[s], r.x, r.y, r.z));
            }
        }
    }

    fn from_records(records: &Records) -> Result<Self, RecordError> {
        let lengths: Vec<f64> = records.list("box")?;
        if lengths.len() != 3 {
            return Err(records.invalid("box", format!("{:?}", lengths)));
        }
        let mut space = Space::new(Vector3::new(lengths[0], lengths[1], lengths[2]))
            .map_err(|e| records.invalid("box", e.to_string()))?;
        space.config_id = records.or_default("configID", 0)?;

        let n_kinds: usize = records.required("nKinds")?;
        for k in 0..n_kinds {
            let name: String = records.required(&format!("kind{}", k))?;
            let n_sites: usize = records.required(&format!("kind{}nSites", k))?;
            let mut sites = Vec::with_capacity(n_sites);
            for s in 0..n_sites {
                let key = format!("kind{}site{}", k, s);
                let values: Vec<f64> = records.list(&key)?;
                if values.len() != 4 {
                    return Err(records.invalid(&key, format!("{:?}", values)));
                }
                sites.push(SiteTemplate {
                    site_type: values[0] as usize,
                    offset: Vector3::new(values[1], values[2], values[3]),
                });
            }
            space.add_kind(MoleculeKind::new(name, sites));
        }

        let n_molecules: usize = records.required("nMolecules")?;
        let n_sites: usize = records.required("nSites")?;
        if records.body().len() != n_sites {
            return Err(records.invalid("nSites", records.body().len().to_string()));
        }

        let mut lines = records.body().iter();
        for index in 0..n_molecules {
            let mut kind = None;
            let start = space.positions.len();
            loop {
                let Some(line) = lines.next() else {
                    return Err(records.invalid("nMolecules", n_molecules.to_string()));
                };
                let fields: Vec<&str> = line.split_whitespace().collect();
                if fields.len() != 5 {
                    return Err(records.invalid("site", line.clone()));
                }
                let parse = |t: &str| t.parse::<f64>().map_err(|_| records.invalid("site", line.clone()));
                let k: usize = fields[0].parse().map_err(|_| records.invalid("site", line.clone()))?;
                let site_type: usize =
                    fields[1].parse().map_err(|_| records.invalid("site", line.clone()))?;
                let position = Vector3::new(parse(fields[2])?, parse(fields[3])?, parse(fields[4])?);
                let template_len = space
                    .kinds
                    .get(k)
                    .map(|t| t.sites.len())
                    .ok_or_else(|| records.invalid("site", line.clone()))?;
                if *kind.get_or_insert(k) != k || template_len == 0 {
                    return Err(records.invalid("site", line.clone()));
                }

                space.positions.push(position);
                space.site_types.push(site_type);
                space.site_molecule.push(index);
                if space.positions.len() - start == template_len {
                    break;
                }
            }
            let kind = kind.unwrap_or_default();
            space.molecules.push(Molecule {
                kind,
                start,
                len: space.positions.len() - start,
            });
        }
        if let Some(line) = lines.next() {
            return Err(records.invalid("site", line.clone()));
        }

        Ok(space)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use tempfile::tempdir;

    fn diatomic() -> MoleculeKind {
        MoleculeKind::new(
            "AB",
            vec![
                SiteTemplate {
                    site_type: 0,
                    offset: Vector3::zeros(),
                },
                SiteTemplate {
                    site_type: 1,
                    offset: Vector3::new(1.0, 0.0, 0.0),
                },
            ],
        )
    }

    fn populated() -> Space {
        let mut space = Space::cubic(10.0).unwrap();
        let kind = space.add_kind(diatomic());
        for i in 0..4 {
            let anchor = Vector3::new(1.0 + 2.0 * i as f64, 5.0, 5.0);
            space
                .add_molecule(kind, anchor, &UnitQuaternion::identity())
                .unwrap();
        }
        space
    }

    #[test]
    fn new_rejects_non_positive_box() {
        assert!(Space::new(Vector3::new(1.0, 0.0, 1.0)).is_err());
    }

    #[test]
    fn add_molecule_appends_trailing_sites() {
        let space = populated();
        assert_eq!(space.n_sites(), 8);
        assert_eq!(space.n_molecules(), 4);
        assert_eq!(space.molecule(3).unwrap().sites(), 6..8);
        assert_eq!(space.site_types(), &[0, 1, 0, 1, 0, 1, 0, 1]);
        assert_eq!(space.n_site_types(), 2);
    }

    #[test]
    fn stable_removal_preserves_order_of_remaining_molecules() {
        let mut space = populated();
        let removal = space.remove_molecule(1, DeleteMode::Stable).unwrap();

        assert_eq!(removal.first, 2);
        assert_eq!(space.n_molecules(), 3);
        assert_eq!(space.positions()[2].x, 5.0);
        assert_eq!(space.molecule(2).unwrap().start, 4);
        assert_eq!(space.site_molecule(), &[0, 0, 1, 1, 2, 2]);
    }

    #[test]
    fn swap_removal_moves_last_molecule_into_slot() {
        let mut space = populated();
        let removal = space.remove_molecule(0, DeleteMode::SwapLast).unwrap();

        assert_eq!(removal.mode, DeleteMode::SwapLast);
        assert_eq!(space.positions()[0].x, 7.0);
        assert_eq!(space.n_sites(), 6);
        assert_eq!(space.site_molecule(), &[0, 0, 1, 1, 2, 2]);
    }

    #[test]
    fn swap_removal_of_last_molecule_is_stable() {
        let mut space = populated();
        let removal = space.remove_molecule(3, DeleteMode::SwapLast).unwrap();
        assert_eq!(removal.mode, DeleteMode::Stable);
        assert_eq!(space.n_molecules(), 3);
    }

    #[test]
    fn translate_wraps_molecule_as_a_whole() {
        let mut space = populated();
        let previous = space
            .translate_molecule(3, &Vector3::new(3.5, 0.0, 0.0))
            .unwrap();
        assert_eq!(previous[0].x, 7.0);
        let sites = space.molecule(3).unwrap().sites();
        let a = space.positions()[sites.start];
        let b = space.positions()[sites.start + 1];
        assert!((a.x - 0.5).abs() < 1e-12);
        assert!(((b - a).norm() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn scale_volume_keeps_molecules_rigid() {
        let mut space = populated();
        space.scale_volume(8.0);
        assert!((space.box_lengths().x - 20.0).abs() < 1e-12);
        let a = space.positions()[2];
        let b = space.positions()[3];
        assert!((a.x - 6.0).abs() < 1e-12);
        assert!(((b - a).norm() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn random_position_lies_in_box() {
        let space = populated();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for _ in 0..100 {
            let r = space.random_position(&mut rng);
            assert!(r.iter().all(|&c| (0.0..10.0).contains(&c)));
        }
    }

    #[test]
    fn swap_configuration_exchanges_state() {
        let mut a = populated();
        let mut b = Space::cubic(12.0).unwrap();
        b.add_kind(diatomic());
        b.set_config_id(9);

        a.swap_configuration(&mut b).unwrap();
        assert_eq!(a.n_molecules(), 0);
        assert_eq!(a.config_id(), 9);
        assert_eq!(a.box_lengths().x, 12.0);
        assert_eq!(b.n_molecules(), 4);
        assert_eq!(b.box_lengths().x, 10.0);
    }

    #[test]
    fn restart_file_round_trips_configuration() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("space.rst");
        let mut space = populated();
        space.set_config_id(4);
        space.write_to_path(&path).unwrap();

        let restored = Space::read_from_path(&path).unwrap();
        assert_eq!(restored, space);
    }

    #[test]
    fn truncated_body_is_rejected() {
        let space = populated();
        let text = space.to_records().into_string();
        let truncated: String = text.lines().take(text.lines().count() - 1).map(|l| format!("{l}\n")).collect();
        let records = Records::parse(&truncated, "memory").unwrap();
        assert!(Space::from_records(&records).is_err());
    }

    #[test]
    fn molecule_with_sites_of_another_kind_is_rejected() {
        let mut space = Space::cubic(10.0).unwrap();
        let first = space.add_kind(diatomic());
        let second = space.add_kind(MoleculeKind::new("BB", diatomic().sites));
        let identity = UnitQuaternion::identity();
        space.add_molecule(first, Vector3::new(1.0, 1.0, 1.0), &identity).unwrap();
        space.add_molecule(second, Vector3::new(5.0, 5.0, 5.0), &identity).unwrap();

        let text = space.to_records().into_string();
        let mut body = 0;
        let mixed: String = text
            .lines()
            .map(|l| {
                if l.starts_with('#') {
                    return format!("{l}\n");
                }
                body += 1;
                match (body, l.strip_prefix("0 ")) {
                    (2, Some(rest)) => format!("1 {rest}\n"),
                    _ => format!("{l}\n"),
                }
            })
            .collect();
        assert_ne!(mixed, text);
        let records = Records::parse(&mixed, "memory").unwrap();
        assert!(matches!(
            Space::from_records(&records),
            Err(RecordError::InvalidValue { ref key, .. }) if key == "site"
        ));
    }

    #[test]
    fn body_lines_beyond_the_molecules_are_rejected() {
        let space = populated();
        let text = space
            .to_records()
            .into_string()
            .replace("# nMolecules 4\n", "# nMolecules 3\n");
        let records = Records::parse(&text, "memory").unwrap();
        assert!(matches!(
            Space::from_records(&records),
            Err(RecordError::InvalidValue { ref key, .. }) if key == "site"
        ));
    }
}
