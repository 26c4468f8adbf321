//! Field solver interface consumed by the space-charge kicks.
//!
//! A solver returns the self-field of a set of macro-particles at their own
//! positions. Bound tables are an optional hint: omitting them must give the
//! same fields up to summation order.

use beam_types::error::{BeamError, BeamResult};
use ndarray::{Array1, ArrayView1};

use crate::cell_sort::CellBounds;
use crate::mesh::RectMesh;

/// Particle positions handed to a solver. Arrays cover the whole ensemble.
#[derive(Debug, Clone, Copy)]
pub enum Positions<'a> {
    Transverse {
        x: ArrayView1<'a, f64>,
        y: ArrayView1<'a, f64>,
    },
    Spatial {
        x: ArrayView1<'a, f64>,
        y: ArrayView1<'a, f64>,
        z: ArrayView1<'a, f64>,
    },
}

impl Positions<'_> {
    pub fn dimension(&self) -> usize {
        match self {
            Positions::Transverse { .. } => 2,
            Positions::Spatial { .. } => 3,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Positions::Transverse { x, .. } | Positions::Spatial { x, .. } => x.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One solve: which particles act as sources, their charge and optional
/// bound tables.
///
/// With a `selection`, only the selected particles deposit charge and receive
/// field; `bounds` then index into the selection. Without one, every particle
/// takes part and `bounds` index into the position arrays directly.
#[derive(Debug, Clone, Copy)]
pub struct SolveRequest<'a> {
    pub positions: Positions<'a>,
    pub selection: Option<&'a [usize]>,
    /// Charge per macro-particle [C]
    pub charge: f64,
    pub bounds: Option<&'a CellBounds>,
}

impl SolveRequest<'_> {
    /// Number of participating particles.
    pub fn participants(&self) -> usize {
        self.selection.map_or(self.positions.len(), <[usize]>::len)
    }

    /// Ensemble index of the `k`-th participant.
    #[inline]
    pub fn particle(&self, k: usize) -> usize {
        match self.selection {
            Some(sel) => sel[k],
            None => k,
        }
    }

    pub fn validate(&self) -> BeamResult<()> {
        let n = self.positions.len();
        let lengths: Vec<usize> = match self.positions {
            Positions::Transverse { x, y } => vec![x.len(), y.len()],
            Positions::Spatial { x, y, z } => vec![x.len(), y.len(), z.len()],
        };
        if let Some(&bad) = lengths.iter().find(|&&l| l != n) {
            return Err(BeamError::ShapeMismatch {
                name: "solver positions".to_string(),
                expected: n,
                found: bad,
            });
        }
        if let Some(sel) = self.selection {
            if let Some(&i) = sel.iter().find(|&&i| i >= n) {
                return Err(BeamError::Configuration(format!(
                    "selection index {i} outside {n} particles"
                )));
            }
        }
        if let Some(bounds) = self.bounds {
            if bounds.covered() != self.participants() {
                return Err(BeamError::Configuration(format!(
                    "bound tables cover {} particles, request has {}",
                    bounds.covered(),
                    self.participants()
                )));
            }
        }
        if !self.charge.is_finite() {
            return Err(BeamError::PhysicsViolation(
                "solver charge must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

/// Field components at every particle of the ensemble. Entries of particles
/// outside the selection are zero. `ez` is present for spatial requests.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldComponents {
    pub ex: Array1<f64>,
    pub ey: Array1<f64>,
    pub ez: Option<Array1<f64>>,
}

impl FieldComponents {
    pub fn zeros(n: usize, spatial: bool) -> Self {
        FieldComponents {
            ex: Array1::zeros(n),
            ey: Array1::zeros(n),
            ez: spatial.then(|| Array1::zeros(n)),
        }
    }

    pub fn len(&self) -> usize {
        self.ex.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ex.is_empty()
    }

    pub(crate) fn check_length(&self, n: usize) -> BeamResult<()> {
        let lens = [
            Some(self.ex.len()),
            Some(self.ey.len()),
            self.ez.as_ref().map(Array1::len),
        ];
        if let Some(bad) = lens.into_iter().flatten().find(|&l| l != n) {
            return Err(BeamError::ShapeMismatch {
                name: "solver field".to_string(),
                expected: n,
                found: bad,
            });
        }
        Ok(())
    }
}

/// Computes self-fields on a fixed mesh.
pub trait FieldSolver: Send + Sync {
    fn mesh(&self) -> &RectMesh;

    fn solve(&self, request: &SolveRequest<'_>) -> BeamResult<FieldComponents>;
}
