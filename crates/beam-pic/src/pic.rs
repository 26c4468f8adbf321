// ─────────────────────────────────────────────────────────────────────
// SCPN Beam Dynamics — Reference PIC Field Solver
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Particle-in-cell electrostatic solver on a grounded rectangular box.
//!
//! 1. Cloud-in-cell deposition of charge density onto mesh nodes.
//! 2. Red-Black SOR solve of ∇²φ = -ρ/ε₀ with φ = 0 on the boundary.
//! 3. E = -∇φ by central differences.
//! 4. Cloud-in-cell interpolation of E back to the particles.
//!
//! Transverse requests are solved on the (x, y) plane of the mesh, spatial
//! ones on the full 3D mesh. Particles off the mesh deposit nothing and
//! receive zero field.

use beam_math::interp::{gradient_2d, gradient_3d_axis, Stencil2D, Stencil3D};
use beam_math::sor::{sor_solve_2d, sor_solve_3d, SorOutcome};
use beam_types::config::{MeshConfig, SorConfig};
use beam_types::constants::EPSILON_0;
use beam_types::error::{BeamError, BeamResult};
use ndarray::{Array1, Array2, Array3, ArrayView1};

use crate::field_solver::{FieldComponents, FieldSolver, Positions, SolveRequest};
use crate::mesh::{RectMesh, RectMesh2D, RectMesh3D};

#[derive(Debug, Clone)]
pub struct PicSolver {
    mesh: RectMesh,
    sor: SorConfig,
}

impl PicSolver {
    pub fn new(mesh: RectMesh, sor: SorConfig) -> BeamResult<Self> {
        sor.validate()?;
        Ok(PicSolver { mesh, sor })
    }

    pub fn from_config(mesh: &MeshConfig, sor: &SorConfig) -> BeamResult<Self> {
        Self::new(RectMesh::from_config(mesh)?, sor.clone())
    }

    pub fn sor(&self) -> &SorConfig {
        &self.sor
    }

    /// Ensemble indices of the participants, grouped by cell when bound
    /// tables are supplied.
    fn deposition_order(request: &SolveRequest<'_>) -> Vec<usize> {
        match request.bounds {
            Some(bounds) => bounds
                .occupied_cells()
                .flat_map(|c| bounds.range(c))
                .map(|k| request.particle(k))
                .collect(),
            None => (0..request.participants())
                .map(|k| request.particle(k))
                .collect(),
        }
    }

    fn report(outcome: SorOutcome, label: &str) {
        if outcome.converged {
            log::trace!("{label} SOR converged after {} sweeps", outcome.iterations);
        } else {
            log::warn!(
                "{label} SOR stopped after {} sweeps with last update {:.3e}",
                outcome.iterations,
                outcome.last_update
            );
        }
    }

    fn solve_transverse(
        &self,
        request: &SolveRequest<'_>,
        x: ArrayView1<f64>,
        y: ArrayView1<f64>,
    ) -> FieldComponents {
        let mesh: RectMesh2D = self.mesh.transverse();
        let n = x.len();
        let mut field = FieldComponents::zeros(n, false);
        let order = Self::deposition_order(request);

        let stencils: Vec<Option<Stencil2D>> = order
            .iter()
            .map(|&i| {
                let (fx, fy) = mesh.fractional(x[i], y[i]);
                Stencil2D::locate(fx, fy, mesh.nx, mesh.ny)
            })
            .collect();

        let mut rho = Array2::zeros((mesh.nx, mesh.ny));
        let density = request.charge / (mesh.dx * mesh.dy);
        for st in stencils.iter().flatten() {
            st.deposit(&mut rho, density);
        }

        let source = rho.mapv(|r| -r / EPSILON_0);
        let mut phi = Array2::zeros((mesh.nx, mesh.ny));
        let outcome = sor_solve_2d(
            &mut phi,
            &source,
            mesh.dx,
            mesh.dy,
            self.sor.omega,
            self.sor.max_iterations,
            self.sor.tolerance,
        );
        Self::report(outcome, "2D");

        let (dphi_dx, dphi_dy) = gradient_2d(&phi, mesh.dx, mesh.dy);
        for (&i, st) in order.iter().zip(&stencils) {
            if let Some(st) = st {
                field.ex[i] = -st.interpolate(&dphi_dx);
                field.ey[i] = -st.interpolate(&dphi_dy);
            }
        }
        field
    }

    fn solve_spatial(
        &self,
        request: &SolveRequest<'_>,
        mesh: &RectMesh3D,
        [x, y, z]: [ArrayView1<f64>; 3],
    ) -> FieldComponents {
        let n = x.len();
        let mut field = FieldComponents::zeros(n, true);
        let order = Self::deposition_order(request);
        let nodes = mesh.nodes();
        let spacing = mesh.spacing();

        let stencils: Vec<Option<Stencil3D>> = order
            .iter()
            .map(|&i| Stencil3D::locate(mesh.fractional(x[i], y[i], z[i]), nodes))
            .collect();

        let mut rho = Array3::zeros((nodes[0], nodes[1], nodes[2]));
        let density = request.charge / (spacing[0] * spacing[1] * spacing[2]);
        for st in stencils.iter().flatten() {
            st.deposit(&mut rho, density);
        }

        let source = rho.mapv(|r| -r / EPSILON_0);
        let mut phi = Array3::zeros(rho.dim());
        let outcome = sor_solve_3d(
            &mut phi,
            &source,
            spacing,
            self.sor.omega,
            self.sor.max_iterations,
            self.sor.tolerance,
        );
        Self::report(outcome, "3D");

        let grad = [
            gradient_3d_axis(&phi, 0, spacing[0]),
            gradient_3d_axis(&phi, 1, spacing[1]),
            gradient_3d_axis(&phi, 2, spacing[2]),
        ];
        let mut ez = Array1::zeros(n);
        for (&i, st) in order.iter().zip(&stencils) {
            if let Some(st) = st {
                field.ex[i] = -st.interpolate(&grad[0]);
                field.ey[i] = -st.interpolate(&grad[1]);
                ez[i] = -st.interpolate(&grad[2]);
            }
        }
        field.ez = Some(ez);
        field
    }
}

impl FieldSolver for PicSolver {
    fn mesh(&self) -> &RectMesh {
        &self.mesh
    }

    fn solve(&self, request: &SolveRequest<'_>) -> BeamResult<FieldComponents> {
        request.validate()?;
        if let Some(bounds) = request.bounds {
            let cells = match request.positions {
                Positions::Transverse { .. } => self.mesh.transverse().cell_count(),
                Positions::Spatial { .. } => self.mesh.cell_count(),
            };
            if bounds.cell_count() != cells {
                return Err(BeamError::Configuration(format!(
                    "bound tables span {} cells, solver mesh has {cells}",
                    bounds.cell_count()
                )));
            }
        }
        match (request.positions, &self.mesh) {
            (Positions::Transverse { x, y }, _) => Ok(self.solve_transverse(request, x, y)),
            (Positions::Spatial { x, y, z }, RectMesh::Spatial(mesh)) => {
                Ok(self.solve_spatial(request, mesh, [x, y, z]))
            }
            (Positions::Spatial { .. }, RectMesh::Planar(_)) => Err(BeamError::Configuration(
                "spatial solve requested on a planar mesh".to_string(),
            )),
        }
    }
}
