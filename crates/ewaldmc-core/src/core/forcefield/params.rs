use super::potentials::COULOMB_CONSTANT;
use crate::core::io::record::{RecordError, RecordWriter, Records};
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

fn default_tail_correction() -> bool {
    true
}

fn default_erfc_table_points() -> usize {
    20_000
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct GlobalParams {
    /// Real-space and LJ cutoff in Å.
    pub cutoff: f64,
    /// Dimensionless Ewald splitting; α = alpha_l / shortest box length.
    pub alpha_l: f64,
    /// Exclusive bound on the squared integer wavevector.
    pub k2max: u32,
    #[serde(default = "default_tail_correction")]
    pub tail_correction: bool,
    #[serde(default)]
    pub fast_delete: bool,
    #[serde(default = "default_erfc_table_points")]
    pub erfc_table_points: usize,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct SiteParams {
    pub name: String,
    /// Well depth in kJ/mol.
    pub epsilon: f64,
    /// Diameter in Å.
    pub sigma: f64,
    /// Charge in units of the elementary charge.
    pub charge: f64,
}

/// Lennard-Jones and Coulomb parameters, one site entry per site type in type order.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct PairParams {
    pub globals: GlobalParams,
    pub sites: Vec<SiteParams>,
}

#[derive(Debug, Error)]
pub enum ParamLoadError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("TOML parsing error for '{path}': {source}")]
    Toml {
        path: String,
        source: toml::de::Error,
    },
    #[error("Invalid parameters in '{path}': {reason}")]
    Invalid { path: String, reason: String },
}

impl PairParams {
    pub fn load(path: &Path) -> Result<Self, ParamLoadError> {
        let content = std::fs::read_to_string(path).map_err(|e| ParamLoadError::Io {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;
        Self::from_toml_str(&content, &path.to_string_lossy())
    }

    pub fn from_toml_str(content: &str, source: &str) -> Result<Self, ParamLoadError> {
        let params: PairParams = toml::from_str(content).map_err(|e| ParamLoadError::Toml {
            path: source.to_string(),
            source: e,
        })?;
        params.validate().map_err(|reason| ParamLoadError::Invalid {
            path: source.to_string(),
            reason,
        })?;
        Ok(params)
    }

    fn validate(&self) -> Result<(), String> {
        if self.sites.is_empty() {
            return Err("at least one site type is required".to_string());
        }
        if !(self.globals.cutoff > 0.0) {
            return Err(format!("cutoff must be positive, got {}", self.globals.cutoff));
        }
        if !(self.globals.alpha_l > 0.0) {
            return Err(format!("alpha_l must be positive, got {}", self.globals.alpha_l));
        }
        if let Some(site) = self.sites.iter().find(|s| s.epsilon < 0.0 || s.sigma < 0.0) {
            return Err(format!("site '{}' has a negative epsilon or sigma", site.name));
        }
        Ok(())
    }

    pub(crate) fn write_records(&self, out: &mut RecordWriter) {
        let g = &self.globals;
        out.record("cutoff", g.cutoff);
        out.record("alphaL", g.alpha_l);
        out.record("k2max", g.k2max);
        out.record("tailCorrection", u8::from(g.tail_correction));
        out.record("fastDelete", u8::from(g.fast_delete));
        out.record("erfcTablePoints", g.erfc_table_points);
        out.record("nSiteTypes", self.sites.len());
        for (i, site) in self.sites.iter().enumerate() {
            out.record(
                &format!("site{}", i),
                format!("{} {} {} {}", site.name, site.epsilon, site.sigma, site.charge),
            );
        }
    }

    pub(crate) fn from_records(records: &Records) -> Result<Self, RecordError> {
        let globals = GlobalParams {
            cutoff: records.required("cutoff")?,
            alpha_l: records.required("alphaL")?,
            k2max: records.required("k2max")?,
            tail_correction: records.or_default::<u8>("tailCorrection", 1)? != 0,
            fast_delete: records.or_default::<u8>("fastDelete", 0)? != 0,
            erfc_table_points: records
                .or_default("erfcTablePoints", default_erfc_table_points())?,
        };
        let n: usize = records.required("nSiteTypes")?;
        let mut sites = Vec::with_capacity(n);
        for i in 0..n {
            let key = format!("site{}", i);
            let raw: String = records.required(&key)?;
            let fields: Vec<&str> = raw.split_whitespace().collect();
            if fields.len() != 4 {
                return Err(records.invalid(&key, raw.clone()));
            }
            let number = |t: &str| t.parse::<f64>().map_err(|_| records.invalid(&key, raw.clone()));
            sites.push(SiteParams {
                name: fields[0].to_string(),
                epsilon: number(fields[1])?,
                sigma: number(fields[2])?,
                charge: number(fields[3])?,
            });
        }
        Ok(Self { globals, sites })
    }
}

/// Per-type-pair coefficients derived from [`PairParams`] with Lorentz-Berthelot mixing.
///
/// Charges are pre-multiplied by the square root of Coulomb's constant, so that
/// `q_i * q_j / r` is an energy in kJ/mol.
#[derive(Debug, Clone, PartialEq)]
pub struct MixingTable {
    n_types: usize,
    epsilon: Vec<f64>,
    sigma: Vec<f64>,
    charges: Vec<f64>,
}

impl MixingTable {
    pub fn new(params: &PairParams) -> Self {
        let n = params.sites.len();
        let mut epsilon = vec![0.0; n * n];
        let mut sigma = vec![0.0; n * n];
        for (i, a) in params.sites.iter().enumerate() {
            for (j, b) in params.sites.iter().enumerate() {
                epsilon[i * n + j] = (a.epsilon * b.epsilon).sqrt();
                sigma[i * n + j] = 0.5 * (a.sigma + b.sigma);
            }
        }
        let scale = COULOMB_CONSTANT.sqrt();
        let charges = params.sites.iter().map(|s| s.charge * scale).collect();
        Self {
            n_types: n,
            epsilon,
            sigma,
            charges,
        }
    }

    pub fn n_types(&self) -> usize {
        self.n_types
    }

    #[inline]
    pub fn epsilon(&self, a: usize, b: usize) -> f64 {
        self.epsilon[a * self.n_types + b]
    }

    #[inline]
    pub fn sigma(&self, a: usize, b: usize) -> f64 {
        self.sigma[a * self.n_types + b]
    }

    #[inline]
    pub fn charge(&self, t: usize) -> f64 {
        self.charges[t]
    }

    pub fn charges(&self) -> &[f64] {
        &self.charges
    }
}
