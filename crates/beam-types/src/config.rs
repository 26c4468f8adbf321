// ─────────────────────────────────────────────────────────────────────
// SCPN Beam Dynamics — Config
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use serde::{Deserialize, Serialize};

use crate::error::{BeamError, BeamResult};

/// Top-level simulation configuration for one space-charge element acting
/// on one beam.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub name: String,
    pub beam: EnsembleParams,
    pub slicing: SlicingConfig,
    pub mesh: MeshConfig,
    pub space_charge: SpaceChargeConfig,
    #[serde(default)]
    pub backend: BackendKind,
}

/// Scalar state of a macro-particle ensemble at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleParams {
    pub macroparticle_count: usize,
    pub particles_per_macroparticle: f64,
    /// Particle charge [C]
    pub charge: f64,
    /// Particle rest mass [kg]
    pub mass: f64,
    /// Ring circumference [m]
    pub circumference: f64,
    /// Relativistic Lorentz factor
    pub gamma: f64,
    /// RF bucket tag given to every particle at creation.
    #[serde(default)]
    pub bucket_id: i32,
}

impl EnsembleParams {
    pub fn validate(&self) -> BeamResult<()> {
        if !self.particles_per_macroparticle.is_finite() || self.particles_per_macroparticle < 0.0 {
            return Err(BeamError::PhysicsViolation(format!(
                "particles_per_macroparticle must be finite and >= 0, got {}",
                self.particles_per_macroparticle
            )));
        }
        if !self.charge.is_finite() {
            return Err(BeamError::PhysicsViolation(
                "charge must be finite".to_string(),
            ));
        }
        if !self.mass.is_finite() || self.mass <= 0.0 {
            return Err(BeamError::PhysicsViolation(format!(
                "mass must be finite and > 0, got {}",
                self.mass
            )));
        }
        if !self.circumference.is_finite() || self.circumference <= 0.0 {
            return Err(BeamError::PhysicsViolation(format!(
                "circumference must be finite and > 0, got {}",
                self.circumference
            )));
        }
        if !self.gamma.is_finite() || self.gamma < 1.0 {
            return Err(BeamError::PhysicsViolation(format!(
                "gamma must be finite and >= 1, got {}",
                self.gamma
            )));
        }
        Ok(())
    }
}

/// Longitudinal binning strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SliceMode {
    /// Bins of equal width between the cuts.
    #[default]
    ConstantSpace,
    /// Bins holding (as nearly as possible) equal numbers of particles.
    ConstantCharge,
}

/// Where the slicing region starts and ends along z.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SliceCuts {
    Fixed { tail: f64, head: f64 },
    /// mean(z) ± n_sigma * sigma(z), recomputed on every slicing pass.
    Sigma { n_sigma: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlicingConfig {
    pub n_slices: usize,
    #[serde(default)]
    pub mode: SliceMode,
    pub cuts: SliceCuts,
}

impl SlicingConfig {
    pub fn validate(&self) -> BeamResult<()> {
        if self.n_slices == 0 {
            return Err(BeamError::Configuration(
                "n_slices must be >= 1".to_string(),
            ));
        }
        match self.cuts {
            SliceCuts::Fixed { tail, head } => {
                if !tail.is_finite() || !head.is_finite() || head <= tail {
                    return Err(BeamError::Configuration(format!(
                        "slice cuts must be finite with head > tail, got tail={tail}, head={head}"
                    )));
                }
            }
            SliceCuts::Sigma { n_sigma } => {
                if !n_sigma.is_finite() || n_sigma <= 0.0 {
                    return Err(BeamError::Configuration(format!(
                        "n_sigma must be finite and > 0, got {n_sigma}"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Rectangular node mesh. Two entries per vector give a planar mesh,
/// three a spatial one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshConfig {
    pub origin: Vec<f64>,
    pub spacing: Vec<f64>,
    pub nodes: Vec<usize>,
}

impl MeshConfig {
    pub fn dimension(&self) -> usize {
        self.nodes.len()
    }

    pub fn validate(&self) -> BeamResult<()> {
        let dim = self.nodes.len();
        if !(2..=3).contains(&dim) || self.origin.len() != dim || self.spacing.len() != dim {
            return Err(BeamError::Configuration(format!(
                "mesh needs 2 or 3 matching origin/spacing/nodes entries, got {}/{}/{}",
                self.origin.len(),
                self.spacing.len(),
                dim
            )));
        }
        if self.nodes.iter().any(|&n| n < 2) {
            return Err(BeamError::Configuration(
                "mesh needs at least 2 nodes per direction".to_string(),
            ));
        }
        if self.spacing.iter().any(|d| !d.is_finite() || *d <= 0.0)
            || self.origin.iter().any(|o| !o.is_finite())
        {
            return Err(BeamError::Configuration(
                "mesh origin must be finite and spacing finite and > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Space-charge model selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpaceChargeModel {
    #[serde(rename = "2.5d")]
    SliceBySlice,
    #[serde(rename = "3d")]
    Full3D,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpaceChargeConfig {
    pub model: SpaceChargeModel,
    /// Interaction length over which the kick is integrated [m]
    pub length: f64,
    #[serde(default)]
    pub sort_particles: bool,
    #[serde(default)]
    pub solver: SorConfig,
}

/// Red-Black SOR settings for the reference Poisson solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SorConfig {
    /// Relaxation parameter (default: 1.8)
    #[serde(default = "default_omega")]
    pub omega: f64,
    /// Iteration cap per solve (default: 500)
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Relative L-infinity update tolerance (default: 1e-8)
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
}

fn default_omega() -> f64 {
    1.8
}
fn default_max_iterations() -> usize {
    500
}
fn default_tolerance() -> f64 {
    1e-8
}

impl Default for SorConfig {
    fn default() -> Self {
        SorConfig {
            omega: default_omega(),
            max_iterations: default_max_iterations(),
            tolerance: default_tolerance(),
        }
    }
}

impl SorConfig {
    pub fn validate(&self) -> BeamResult<()> {
        if !self.omega.is_finite() || self.omega <= 0.0 || self.omega >= 2.0 {
            return Err(BeamError::Configuration(format!(
                "SOR omega must lie in (0, 2), got {}",
                self.omega
            )));
        }
        if self.max_iterations == 0 {
            return Err(BeamError::Configuration(
                "SOR max_iterations must be >= 1".to_string(),
            ));
        }
        if !self.tolerance.is_finite() || self.tolerance <= 0.0 {
            return Err(BeamError::Configuration(format!(
                "SOR tolerance must be finite and > 0, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }
}

/// Which compute backend executes the data-parallel array primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Serial,
    Rayon,
}

impl SimulationConfig {
    /// Load from a JSON file and validate every section.
    pub fn from_file(path: &str) -> BeamResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn from_json_str(contents: &str) -> BeamResult<Self> {
        let config: Self = serde_json::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> BeamResult<()> {
        self.beam.validate()?;
        self.slicing.validate()?;
        self.mesh.validate()?;
        self.space_charge.solver.validate()?;
        if !self.space_charge.length.is_finite() || self.space_charge.length <= 0.0 {
            return Err(BeamError::Configuration(format!(
                "space charge length must be finite and > 0, got {}",
                self.space_charge.length
            )));
        }
        Ok(())
    }
}
