// ─────────────────────────────────────────────────────────────────────
// SCPN Beam Dynamics — Cell Sorting and Bound Tables
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Sorting particles by mesh cell and building per-cell bound tables.
//!
//! After a stable argsort by cell id, the particles of cell `c` occupy the
//! half-open range `[lower[c], upper[c])`. Both tables come from binary
//! searches of the sorted ids, one query per cell.

use std::ops::Range;

use beam_core::coordinate::Coordinate;
use beam_core::ensemble::ParticleEnsemble;
use beam_math::backend::ComputeBackend;
use beam_types::error::{BeamError, BeamResult};

use crate::mesh::RectMesh;

/// Per-cell particle ranges into a cell-sorted order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellBounds {
    lower: Vec<usize>,
    upper: Vec<usize>,
}

impl CellBounds {
    pub fn cell_count(&self) -> usize {
        self.lower.len()
    }

    pub fn lower(&self) -> &[usize] {
        &self.lower
    }

    pub fn upper(&self) -> &[usize] {
        &self.upper
    }

    pub fn range(&self, cell: usize) -> Range<usize> {
        self.lower[cell]..self.upper[cell]
    }

    pub fn population(&self, cell: usize) -> usize {
        self.upper[cell] - self.lower[cell]
    }

    /// Total number of particles covered by the table.
    pub fn covered(&self) -> usize {
        self.lower.iter().zip(&self.upper).map(|(l, u)| u - l).sum()
    }

    /// Cells holding at least one particle, ascending.
    pub fn occupied_cells(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.cell_count()).filter(|&c| self.upper[c] > self.lower[c])
    }

    /// Particle range spanned by a block of consecutive cells.
    pub fn span(&self, cells: Range<usize>) -> Range<usize> {
        if cells.is_empty() {
            return 0..0;
        }
        self.lower[cells.start]..self.upper[cells.end - 1]
    }

    /// Sub-table of a block of consecutive cells, re-based so that ranges
    /// index into [`CellBounds::span`] of the same block.
    pub fn window(&self, cells: Range<usize>) -> CellBounds {
        let base = self.span(cells.clone()).start;
        CellBounds {
            lower: self.lower[cells.clone()].iter().map(|&l| l - base).collect(),
            upper: self.upper[cells].iter().map(|&u| u - base).collect(),
        }
    }
}

/// Outcome of sorting an ensemble by cell id.
#[derive(Debug, Clone)]
pub struct CellSortIndex {
    permutation: Vec<usize>,
    sorted_cell_ids: Vec<usize>,
    bounds: CellBounds,
}

impl CellSortIndex {
    /// `sorted[i] = original[permutation[i]]`
    pub fn permutation(&self) -> &[usize] {
        &self.permutation
    }

    pub fn sorted_cell_ids(&self) -> &[usize] {
        &self.sorted_cell_ids
    }

    pub fn bounds(&self) -> &CellBounds {
        &self.bounds
    }

    pub fn into_bounds(self) -> CellBounds {
        self.bounds
    }
}

/// Cell id of every particle of `ensemble` on `mesh`.
///
/// A planar mesh is indexed by `(x, y)`, a spatial one by `(x, y, z)`. With
/// `beam_frame` set the longitudinal position is `gamma * z`.
pub fn assign_cell_ids(
    ensemble: &ParticleEnsemble,
    mesh: &RectMesh,
    beam_frame: bool,
) -> BeamResult<Vec<usize>> {
    let x = ensemble.coordinate(Coordinate::X)?;
    let y = ensemble.coordinate(Coordinate::Y)?;
    match mesh {
        RectMesh::Planar(m) => m.cell_ids(x, y),
        RectMesh::Spatial(m) if beam_frame => {
            let z = ensemble.z_beamframe()?;
            m.cell_ids(x, y, z.view())
        }
        RectMesh::Spatial(m) => m.cell_ids(x, y, ensemble.coordinate(Coordinate::Z)?),
    }
}

/// Stable-sort `ensemble` by `cell_ids` and build the bound tables over
/// `cell_count` cells.
pub fn sort_particles(
    ensemble: &mut ParticleEnsemble,
    cell_ids: &[usize],
    cell_count: usize,
) -> BeamResult<CellSortIndex> {
    if cell_ids.len() != ensemble.macroparticle_count() {
        return Err(BeamError::ShapeMismatch {
            name: "cell_ids".to_string(),
            expected: ensemble.macroparticle_count(),
            found: cell_ids.len(),
        });
    }
    let backend = ensemble.backend().clone();
    let permutation = backend.argsort_usize(cell_ids);
    let sorted_cell_ids: Vec<usize> = permutation.iter().map(|&i| cell_ids[i]).collect();
    let bounds = compute_bounds(&sorted_cell_ids, cell_count, backend.as_ref())?;
    ensemble.reorder(&permutation, &[])?;
    log::trace!(
        "cell sort: {} particles over {} occupied of {cell_count} cells",
        sorted_cell_ids.len(),
        bounds.occupied_cells().count()
    );
    Ok(CellSortIndex {
        permutation,
        sorted_cell_ids,
        bounds,
    })
}

/// Bound tables for an ascending cell-id array.
///
/// `lower[c]` is the leftmost and `upper[c]` the rightmost insertion point
/// of `c`. Empty cells get `lower[c] == upper[c]`.
pub fn compute_bounds(
    sorted_ids: &[usize],
    cell_count: usize,
    backend: &dyn ComputeBackend,
) -> BeamResult<CellBounds> {
    if let Some(position) = sorted_ids.windows(2).position(|w| w[0] > w[1]) {
        return Err(BeamError::UnsortedCellIds {
            position: position + 1,
        });
    }
    if let Some(&last) = sorted_ids.last() {
        if last >= cell_count {
            return Err(BeamError::Configuration(format!(
                "cell id {last} outside a universe of {cell_count} cells"
            )));
        }
    }
    let cells: Vec<usize> = (0..cell_count).collect();
    Ok(CellBounds {
        lower: backend.searchsorted_left(sorted_ids, &cells),
        upper: backend.searchsorted_right(sorted_ids, &cells),
    })
}
