// ─────────────────────────────────────────────────────────────────────
// SCPN Beam Dynamics — Ensemble Statistics
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Whole-ensemble and per-slice beam statistics.
//!
//! Normalised transverse emittances are the RMS emittance times βγ, with
//! the dispersive part removed when `dp` is present. The longitudinal one
//! is 4π·ε(z, dp)·p0/e in eV·s. Nothing here mutates or caches state.

use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use beam_math::stats;
use beam_types::constants::ELEMENTARY_CHARGE;
use beam_types::error::{BeamError, BeamResult};
use ndarray::{ArrayView1, CowArray, Ix1};

use crate::coordinate::Coordinate;
use crate::ensemble::ParticleEnsemble;
use crate::slicing::SliceSet;

/// Emittance plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Plane {
    X,
    Y,
    Z,
}

impl Plane {
    fn coordinates(self) -> (Coordinate, Coordinate) {
        match self {
            Plane::X => (Coordinate::X, Coordinate::Xp),
            Plane::Y => (Coordinate::Y, Coordinate::Yp),
            Plane::Z => (Coordinate::Z, Coordinate::Dp),
        }
    }

    fn name(self) -> &'static str {
        match self {
            Plane::X => "x",
            Plane::Y => "y",
            Plane::Z => "z",
        }
    }
}

/// A per-slice statistic a slicer can attach to its slice set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Statistic {
    Mean(Coordinate),
    Sigma(Coordinate),
    Epsn(Plane),
}

impl Statistic {
    /// Every recognised statistic, in canonical order.
    pub fn all() -> Vec<Statistic> {
        let mut out: Vec<Statistic> = Coordinate::ALL.iter().map(|&c| Statistic::Mean(c)).collect();
        out.extend(Coordinate::ALL.iter().map(|&c| Statistic::Sigma(c)));
        out.extend([Plane::X, Plane::Y, Plane::Z].map(Statistic::Epsn));
        out
    }

    /// Arrays that must exist for the statistic to be computable.
    pub fn required_coordinates(self) -> Vec<Coordinate> {
        match self {
            Statistic::Mean(c) | Statistic::Sigma(c) => vec![c],
            Statistic::Epsn(plane) => {
                let (u, up) = plane.coordinates();
                vec![u, up]
            }
        }
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statistic::Mean(c) => write!(f, "mean_{c}"),
            Statistic::Sigma(c) => write!(f, "sigma_{c}"),
            Statistic::Epsn(p) => write!(f, "epsn_{}", p.name()),
        }
    }
}

impl FromStr for Statistic {
    type Err = BeamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Statistic::all()
            .into_iter()
            .find(|stat| stat.to_string() == s)
            .ok_or_else(|| {
                BeamError::invalid_option("statistic", s, &["mean_<c>", "sigma_<c>", "epsn_{x,y,z}"])
            })
    }
}

/// Which statistics a slicing pass should attach.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StatisticsRequest {
    #[default]
    None,
    /// Every statistic whose coordinates exist on the ensemble.
    All,
    Only(Vec<Statistic>),
}

impl StatisticsRequest {
    pub fn is_none(&self) -> bool {
        matches!(self, StatisticsRequest::None)
    }

    /// Resolve against the arrays present on `ensemble`.
    fn resolve(&self, ensemble: &ParticleEnsemble) -> BeamResult<Vec<Statistic>> {
        match self {
            StatisticsRequest::None => Ok(Vec::new()),
            StatisticsRequest::All => Ok(Statistic::all()
                .into_iter()
                .filter(|s| s.required_coordinates().iter().all(|&c| ensemble.has(c)))
                .collect()),
            StatisticsRequest::Only(list) => {
                for stat in list {
                    for c in stat.required_coordinates() {
                        if !ensemble.has(c) {
                            return Err(BeamError::MissingCoordinate(format!(
                                "{} (needed by {stat})",
                                c.name()
                            )));
                        }
                    }
                }
                Ok(list.clone())
            }
        }
    }
}

type PlaneViews<'a> = (ArrayView1<'a, f64>, ArrayView1<'a, f64>, Option<ArrayView1<'a, f64>>);

/// One coordinate restricted to a subset of particles, or the full array.
fn column<'a>(
    ensemble: &'a ParticleEnsemble,
    coord: Coordinate,
    subset: Option<&[usize]>,
) -> BeamResult<CowArray<'a, f64, Ix1>> {
    let full = ensemble.coordinate(coord)?;
    Ok(match subset {
        None => CowArray::from(full),
        Some(indices) => CowArray::from(ensemble.backend().gather_f64(full, indices)),
    })
}

fn optional_column<'a>(
    ensemble: &'a ParticleEnsemble,
    coord: Coordinate,
    subset: Option<&[usize]>,
) -> BeamResult<Option<CowArray<'a, f64, Ix1>>> {
    if ensemble.has(coord) {
        column(ensemble, coord, subset).map(Some)
    } else {
        Ok(None)
    }
}

fn evaluate(
    ensemble: &ParticleEnsemble,
    statistic: Statistic,
    subset: Option<&[usize]>,
) -> BeamResult<f64> {
    match statistic {
        Statistic::Mean(c) => Ok(stats::mean(column(ensemble, c, subset)?.view())),
        Statistic::Sigma(c) => Ok(stats::std(column(ensemble, c, subset)?.view())),
        Statistic::Epsn(Plane::Z) => {
            let z = column(ensemble, Coordinate::Z, subset)?;
            let dp = column(ensemble, Coordinate::Dp, subset)?;
            Ok(longitudinal_emittance(ensemble, z.view(), dp.view()))
        }
        Statistic::Epsn(plane) => {
            let (u, up) = plane.coordinates();
            let u = column(ensemble, u, subset)?;
            let up = column(ensemble, up, subset)?;
            let dp = optional_column(ensemble, Coordinate::Dp, subset)?;
            let eps = stats::emittance(u.view(), up.view(), dp.as_ref().map(|d| d.view()));
            Ok(eps * ensemble.beta_gamma())
        }
    }
}

fn longitudinal_emittance(ensemble: &ParticleEnsemble, z: ArrayView1<f64>, dp: ArrayView1<f64>) -> f64 {
    4.0 * PI * stats::emittance(z, dp, None) * ensemble.p0() / ELEMENTARY_CHARGE
}

/// Evaluate the requested statistics over every slice of `slice_set`.
pub fn slice_statistics(
    ensemble: &ParticleEnsemble,
    slice_set: &SliceSet,
    request: &StatisticsRequest,
) -> BeamResult<BTreeMap<Statistic, Vec<f64>>> {
    let mut out = BTreeMap::new();
    for stat in request.resolve(ensemble)? {
        let values = (0..slice_set.n_slices())
            .map(|k| evaluate(ensemble, stat, Some(slice_set.particle_indices_of_slice(k))))
            .collect::<BeamResult<Vec<f64>>>()?;
        out.insert(stat, values);
    }
    Ok(out)
}

impl ParticleEnsemble {
    pub fn statistic(&self, statistic: Statistic) -> BeamResult<f64> {
        evaluate(self, statistic, None)
    }

    pub fn mean(&self, coord: Coordinate) -> BeamResult<f64> {
        self.statistic(Statistic::Mean(coord))
    }

    pub fn sigma(&self, coord: Coordinate) -> BeamResult<f64> {
        self.statistic(Statistic::Sigma(coord))
    }

    /// Normalised horizontal emittance, dp-corrected when `dp` exists.
    pub fn epsn_x(&self) -> BeamResult<f64> {
        self.statistic(Statistic::Epsn(Plane::X))
    }

    pub fn epsn_y(&self) -> BeamResult<f64> {
        self.statistic(Statistic::Epsn(Plane::Y))
    }

    /// Longitudinal emittance [eV s].
    pub fn epsn_z(&self) -> BeamResult<f64> {
        self.statistic(Statistic::Epsn(Plane::Z))
    }

    /// Normalised horizontal emittance without dispersion correction.
    pub fn effective_normalized_emittance_x(&self) -> BeamResult<f64> {
        self.effective_normalized_emittance(Plane::X)
    }

    pub fn effective_normalized_emittance_y(&self) -> BeamResult<f64> {
        self.effective_normalized_emittance(Plane::Y)
    }

    pub fn effective_normalized_emittance_z(&self) -> BeamResult<f64> {
        self.epsn_z()
    }

    fn effective_normalized_emittance(&self, plane: Plane) -> BeamResult<f64> {
        let (u, up) = plane.coordinates();
        let eps = stats::emittance(self.coordinate(u)?, self.coordinate(up)?, None);
        Ok(eps * self.beta_gamma())
    }

    pub fn dispersion_x(&self) -> BeamResult<f64> {
        Ok(stats::dispersion(
            self.coordinate(Coordinate::X)?,
            self.coordinate(Coordinate::Dp)?,
        ))
    }

    pub fn dispersion_y(&self) -> BeamResult<f64> {
        Ok(stats::dispersion(
            self.coordinate(Coordinate::Y)?,
            self.coordinate(Coordinate::Dp)?,
        ))
    }

    fn twiss_inputs(&self, plane: Plane) -> BeamResult<PlaneViews<'_>> {
        let (u, up) = plane.coordinates();
        let dp = self.coordinate(Coordinate::Dp).ok();
        Ok((self.coordinate(u)?, self.coordinate(up)?, dp))
    }

    pub fn alpha_twiss_x(&self) -> BeamResult<f64> {
        let (u, up, dp) = self.twiss_inputs(Plane::X)?;
        Ok(stats::twiss_alpha(u, up, dp))
    }

    pub fn beta_twiss_x(&self) -> BeamResult<f64> {
        let (u, up, dp) = self.twiss_inputs(Plane::X)?;
        Ok(stats::twiss_beta(u, up, dp))
    }

    pub fn gamma_twiss_x(&self) -> BeamResult<f64> {
        let (u, up, dp) = self.twiss_inputs(Plane::X)?;
        Ok(stats::twiss_gamma(u, up, dp))
    }

    pub fn alpha_twiss_y(&self) -> BeamResult<f64> {
        let (u, up, dp) = self.twiss_inputs(Plane::Y)?;
        Ok(stats::twiss_alpha(u, up, dp))
    }

    pub fn beta_twiss_y(&self) -> BeamResult<f64> {
        let (u, up, dp) = self.twiss_inputs(Plane::Y)?;
        Ok(stats::twiss_beta(u, up, dp))
    }

    pub fn gamma_twiss_y(&self) -> BeamResult<f64> {
        let (u, up, dp) = self.twiss_inputs(Plane::Y)?;
        Ok(stats::twiss_gamma(u, up, dp))
    }
}
