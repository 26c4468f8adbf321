// ─────────────────────────────────────────────────────────────────────
// SCPN Beam Dynamics — Rectangular Meshes
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Uniform rectangular node meshes.
//!
//! Node `(ix, iy)` sits at `(x0 + ix·dx, y0 + iy·dy)`. A cell is named by its
//! lower-corner node, `id = ix + nx·iy (+ nx·ny·iz)`, with each index clamped
//! into `[0, n - 2]` so that particles off the mesh still receive a valid id.
//! The id universe is the node count, `nx·ny (·nz)`.

use beam_types::config::MeshConfig;
use beam_types::error::{BeamError, BeamResult};
use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

#[inline]
fn clamped_index(u: f64, u0: f64, du: f64, n: usize) -> usize {
    let f = ((u - u0) / du).floor();
    if f.is_nan() || f <= 0.0 {
        0
    } else {
        (f as usize).min(n - 2)
    }
}

fn validate_axis(label: &str, origin: f64, spacing: f64, nodes: usize) -> BeamResult<()> {
    if !origin.is_finite() || !spacing.is_finite() || spacing <= 0.0 {
        return Err(BeamError::Configuration(format!(
            "mesh axis {label}: origin must be finite and spacing finite and > 0"
        )));
    }
    if nodes < 2 {
        return Err(BeamError::Configuration(format!(
            "mesh axis {label} needs at least 2 nodes, got {nodes}"
        )));
    }
    Ok(())
}

fn check_lengths(lengths: &[usize]) -> BeamResult<usize> {
    let n = lengths.first().copied().unwrap_or(0);
    for (axis, &len) in lengths.iter().enumerate() {
        if len != n {
            return Err(BeamError::ShapeMismatch {
                name: format!("position axis {axis}"),
                expected: n,
                found: len,
            });
        }
    }
    Ok(n)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RectMesh2D {
    pub x0: f64,
    pub y0: f64,
    pub dx: f64,
    pub dy: f64,
    pub nx: usize,
    pub ny: usize,
}

impl RectMesh2D {
    pub fn new(origin: [f64; 2], spacing: [f64; 2], nodes: [usize; 2]) -> BeamResult<Self> {
        validate_axis("x", origin[0], spacing[0], nodes[0])?;
        validate_axis("y", origin[1], spacing[1], nodes[1])?;
        Ok(RectMesh2D {
            x0: origin[0],
            y0: origin[1],
            dx: spacing[0],
            dy: spacing[1],
            nx: nodes[0],
            ny: nodes[1],
        })
    }

    pub fn cell_count(&self) -> usize {
        self.nx * self.ny
    }

    /// Position in units of node spacing.
    #[inline]
    pub fn fractional(&self, x: f64, y: f64) -> (f64, f64) {
        ((x - self.x0) / self.dx, (y - self.y0) / self.dy)
    }

    #[inline]
    pub fn cell_id(&self, x: f64, y: f64) -> usize {
        let ix = clamped_index(x, self.x0, self.dx, self.nx);
        let iy = clamped_index(y, self.y0, self.dy, self.ny);
        ix + self.nx * iy
    }

    pub fn cell_ids(&self, x: ArrayView1<f64>, y: ArrayView1<f64>) -> BeamResult<Vec<usize>> {
        check_lengths(&[x.len(), y.len()])?;
        Ok(x.iter().zip(y.iter()).map(|(&xi, &yi)| self.cell_id(xi, yi)).collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RectMesh3D {
    pub x0: f64,
    pub y0: f64,
    pub z0: f64,
    pub dx: f64,
    pub dy: f64,
    pub dz: f64,
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
}

impl RectMesh3D {
    pub fn new(origin: [f64; 3], spacing: [f64; 3], nodes: [usize; 3]) -> BeamResult<Self> {
        validate_axis("x", origin[0], spacing[0], nodes[0])?;
        validate_axis("y", origin[1], spacing[1], nodes[1])?;
        validate_axis("z", origin[2], spacing[2], nodes[2])?;
        Ok(RectMesh3D {
            x0: origin[0],
            y0: origin[1],
            z0: origin[2],
            dx: spacing[0],
            dy: spacing[1],
            dz: spacing[2],
            nx: nodes[0],
            ny: nodes[1],
            nz: nodes[2],
        })
    }

    pub fn cell_count(&self) -> usize {
        self.nx * self.ny * self.nz
    }

    pub fn spacing(&self) -> [f64; 3] {
        [self.dx, self.dy, self.dz]
    }

    pub fn nodes(&self) -> [usize; 3] {
        [self.nx, self.ny, self.nz]
    }

    #[inline]
    pub fn fractional(&self, x: f64, y: f64, z: f64) -> [f64; 3] {
        [
            (x - self.x0) / self.dx,
            (y - self.y0) / self.dy,
            (z - self.z0) / self.dz,
        ]
    }

    #[inline]
    pub fn cell_id(&self, x: f64, y: f64, z: f64) -> usize {
        let ix = clamped_index(x, self.x0, self.dx, self.nx);
        let iy = clamped_index(y, self.y0, self.dy, self.ny);
        let iz = clamped_index(z, self.z0, self.dz, self.nz);
        ix + self.nx * (iy + self.ny * iz)
    }

    pub fn cell_ids(
        &self,
        x: ArrayView1<f64>,
        y: ArrayView1<f64>,
        z: ArrayView1<f64>,
    ) -> BeamResult<Vec<usize>> {
        check_lengths(&[x.len(), y.len(), z.len()])?;
        Ok((0..x.len())
            .map(|i| self.cell_id(x[i], y[i], z[i]))
            .collect())
    }

    /// The transverse (x, y) plane of this mesh.
    pub fn transverse(&self) -> RectMesh2D {
        RectMesh2D {
            x0: self.x0,
            y0: self.y0,
            dx: self.dx,
            dy: self.dy,
            nx: self.nx,
            ny: self.ny,
        }
    }
}

/// A planar or spatial mesh, as seen by the cell sorter and field solvers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RectMesh {
    Planar(RectMesh2D),
    Spatial(RectMesh3D),
}

impl RectMesh {
    pub fn from_config(config: &MeshConfig) -> BeamResult<Self> {
        config.validate()?;
        match config.dimension() {
            2 => Ok(RectMesh::Planar(RectMesh2D::new(
                [config.origin[0], config.origin[1]],
                [config.spacing[0], config.spacing[1]],
                [config.nodes[0], config.nodes[1]],
            )?)),
            3 => Ok(RectMesh::Spatial(RectMesh3D::new(
                [config.origin[0], config.origin[1], config.origin[2]],
                [config.spacing[0], config.spacing[1], config.spacing[2]],
                [config.nodes[0], config.nodes[1], config.nodes[2]],
            )?)),
            d => Err(BeamError::Configuration(format!(
                "mesh dimension must be 2 or 3, got {d}"
            ))),
        }
    }

    pub fn dimension(&self) -> usize {
        match self {
            RectMesh::Planar(_) => 2,
            RectMesh::Spatial(_) => 3,
        }
    }

    pub fn cell_count(&self) -> usize {
        match self {
            RectMesh::Planar(m) => m.cell_count(),
            RectMesh::Spatial(m) => m.cell_count(),
        }
    }

    /// Cell id of every particle; one array per mesh dimension.
    pub fn cell_ids(&self, positions: &[ArrayView1<f64>]) -> BeamResult<Vec<usize>> {
        match (self, positions) {
            (RectMesh::Planar(m), [x, y]) => m.cell_ids(x.view(), y.view()),
            (RectMesh::Spatial(m), [x, y, z]) => m.cell_ids(x.view(), y.view(), z.view()),
            _ => Err(BeamError::Configuration(format!(
                "{}D mesh given {} position arrays",
                self.dimension(),
                positions.len()
            ))),
        }
    }

    pub fn transverse(&self) -> RectMesh2D {
        match self {
            RectMesh::Planar(m) => *m,
            RectMesh::Spatial(m) => m.transverse(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn mesh3() -> RectMesh3D {
        RectMesh3D::new([-1.0, -1.0, 0.0], [0.5, 0.5, 1.0], [5, 5, 4]).unwrap()
    }

    #[test]
    fn test_cell_ids_2d() {
        let m = RectMesh2D::new([0.0, 0.0], [1.0, 1.0], [4, 3]).unwrap();
        assert_eq!(m.cell_count(), 12);
        assert_eq!(m.cell_id(0.5, 0.5), 0);
        assert_eq!(m.cell_id(2.5, 1.5), 2 + 4);
        // upper edge and beyond clamp into the last cell
        assert_eq!(m.cell_id(3.0, 2.0), 2 + 4);
        assert_eq!(m.cell_id(100.0, -100.0), 2);
        assert_eq!(m.cell_id(f64::NAN, 0.0), 0);
    }

    #[test]
    fn test_cell_ids_3d() {
        let m = mesh3();
        assert_eq!(m.cell_count(), 100);
        let ids = m
            .cell_ids(
                array![-0.9, 0.1, 0.9].view(),
                array![-0.9, -0.4, 0.9].view(),
                array![0.5, 1.5, 2.5].view(),
            )
            .unwrap();
        assert_eq!(ids, vec![0, 2 + 5 + 25, 3 + 5 * 3 + 25 * 2]);
    }

    #[test]
    fn test_dimension_dispatch() {
        let spatial = RectMesh::Spatial(mesh3());
        assert_eq!(spatial.dimension(), 3);
        assert_eq!(spatial.transverse().cell_count(), 25);
        let x = array![0.0];
        assert!(spatial.cell_ids(&[x.view(), x.view()]).is_err());
        assert!(spatial.cell_ids(&[x.view(), x.view(), x.view()]).is_ok());
    }

    #[test]
    fn test_length_mismatch() {
        let m = mesh3().transverse();
        let err = m.cell_ids(array![0.0, 1.0].view(), array![0.0].view()).unwrap_err();
        assert!(matches!(err, BeamError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_views_of_separate_owners() {
        let m = mesh3();
        let x = array![0.1, 0.2];
        let ids = {
            let y = array![0.1, 0.2];
            let z = ndarray::Array1::from_elem(2, 0.5);
            m.cell_ids(x.view(), y.view(), z.view()).unwrap()
        };
        assert_eq!(ids, vec![2 + 5 * 2, 2 + 5 * 2]);
        let short = array![0.5];
        let err = m.cell_ids(x.view(), x.view(), short.view()).unwrap_err();
        assert!(matches!(
            err,
            BeamError::ShapeMismatch { expected: 2, found: 1, .. }
        ));
    }

    #[test]
    fn test_from_config() {
        let cfg = MeshConfig {
            origin: vec![0.0, 0.0],
            spacing: vec![0.1, 0.2],
            nodes: vec![8, 9],
        };
        let mesh = RectMesh::from_config(&cfg).unwrap();
        assert_eq!(mesh.dimension(), 2);
        assert_eq!(mesh.cell_count(), 72);

        let bad = MeshConfig {
            nodes: vec![8, 1],
            ..cfg
        };
        assert!(RectMesh::from_config(&bad).is_err());
    }
}
