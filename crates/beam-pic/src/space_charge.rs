// ─────────────────────────────────────────────────────────────────────
// SCPN Beam Dynamics — Space Charge Kicks
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Self-field kicks over an interaction length.
//!
//! - [`SpaceCharge25D`]: one transverse solve per longitudinal slice, kick on
//!   `xp` and `yp`, scaled by `L / (βc) · q² / p0`.
//! - [`SpaceCharge3D`]: one solve over the whole bunch in beam-frame
//!   coordinates, kick on `x`, `y` and `z`, scaled by `L / (βc) · q / p0`.
//!
//! Both kicks need a 3D solver mesh. With cell sorting enabled the ensemble
//! is reordered by cell before the solve and bound tables are passed along.

use std::fmt;
use std::sync::Arc;

use beam_core::coordinate::Coordinate;
use beam_core::ensemble::ParticleEnsemble;
use beam_core::slicing::{Slicer, UniformBinSlicer};
use beam_core::statistics::StatisticsRequest;
use beam_types::config::{SimulationConfig, SpaceChargeModel};
use beam_types::constants::SPEED_OF_LIGHT;
use beam_types::error::{BeamError, BeamResult};
use ndarray::Array1;

use crate::cell_sort::{assign_cell_ids, sort_particles, CellBounds};
use crate::field_solver::{FieldSolver, Positions, SolveRequest};
use crate::mesh::RectMesh;
use crate::pic::PicSolver;

/// A kick that updates an ensemble in place.
pub trait SpaceChargeKick: Send + Sync + fmt::Debug {
    fn track(&self, ensemble: &mut ParticleEnsemble) -> BeamResult<()>;

    /// Interaction length [m]
    fn length(&self) -> f64;

    /// Factor multiplying the solver field before it is added to the
    /// kicked coordinates.
    fn kick_factor(&self, ensemble: &ParticleEnsemble) -> f64;
}

fn validate_setup(solver: &dyn FieldSolver, length: f64) -> BeamResult<()> {
    if solver.mesh().dimension() != 3 {
        return Err(BeamError::Configuration(format!(
            "space charge needs a 3D solver mesh, got {}D",
            solver.mesh().dimension()
        )));
    }
    if !length.is_finite() || length <= 0.0 {
        return Err(BeamError::Configuration(format!(
            "space charge length must be finite and > 0, got {length}"
        )));
    }
    Ok(())
}

/// Kick factor of `kick`, rejected when the ensemble is at rest.
fn finite_kick_factor(kick: &dyn SpaceChargeKick, ensemble: &ParticleEnsemble) -> BeamResult<f64> {
    let factor = kick.kick_factor(ensemble);
    if ensemble.beta() > 0.0 && factor.is_finite() {
        Ok(factor)
    } else {
        Err(BeamError::PhysicsViolation(format!(
            "space charge kick factor {factor} at gamma {}, beta {}",
            ensemble.gamma(),
            ensemble.beta()
        )))
    }
}

fn require(ensemble: &ParticleEnsemble, coords: &[Coordinate]) -> BeamResult<()> {
    match coords.iter().find(|c| !ensemble.has(**c)) {
        Some(c) => Err(BeamError::MissingCoordinate(c.name().to_string())),
        None => Ok(()),
    }
}

/// Slice-by-slice transverse space charge.
#[derive(Clone)]
pub struct SpaceCharge25D {
    slicer: Arc<dyn Slicer>,
    length: f64,
    solver: Arc<dyn FieldSolver>,
    sort_particles: bool,
}

impl fmt::Debug for SpaceCharge25D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpaceCharge25D")
            .field("slicer", &self.slicer.id())
            .field("length", &self.length)
            .field("mesh", self.solver.mesh())
            .field("sort_particles", &self.sort_particles)
            .finish()
    }
}

impl SpaceCharge25D {
    pub fn new(
        slicer: Arc<dyn Slicer>,
        length: f64,
        solver: Arc<dyn FieldSolver>,
        sort_particles: bool,
    ) -> BeamResult<Self> {
        validate_setup(solver.as_ref(), length)?;
        Ok(SpaceCharge25D {
            slicer,
            length,
            solver,
            sort_particles,
        })
    }

    pub fn sorts_particles(&self) -> bool {
        self.sort_particles
    }

    /// Sort by (slice, transverse cell). Returns the bound table over
    /// `n_transverse * (n_slices + 1)` cells.
    fn sort_by_slice_and_cell(
        &self,
        ensemble: &mut ParticleEnsemble,
        slice_index: &[Option<usize>],
        n_slices: usize,
        n_transverse: usize,
    ) -> BeamResult<CellBounds> {
        let mesh = RectMesh::Planar(self.solver.mesh().transverse());
        let transverse = assign_cell_ids(ensemble, &mesh, false)?;
        let ids: Vec<usize> = transverse
            .iter()
            .zip(slice_index)
            .map(|(&t, s)| t + n_transverse * s.unwrap_or(n_slices))
            .collect();
        let index = sort_particles(ensemble, &ids, n_transverse * (n_slices + 1))?;
        Ok(index.into_bounds())
    }
}

impl SpaceChargeKick for SpaceCharge25D {
    fn track(&self, ensemble: &mut ParticleEnsemble) -> BeamResult<()> {
        require(
            ensemble,
            &[Coordinate::X, Coordinate::Y, Coordinate::Z, Coordinate::Xp, Coordinate::Yp],
        )?;
        let factor = finite_kick_factor(self, ensemble)?;
        let n_transverse = self.solver.mesh().transverse().cell_count();
        let mut slice_set = ensemble.get_slices(self.slicer.as_ref(), &StatisticsRequest::None)?;
        let n_slices = slice_set.n_slices();

        let sorted = if self.sort_particles {
            let bounds = self.sort_by_slice_and_cell(
                ensemble,
                slice_set.slice_index_of_particle(),
                n_slices,
                n_transverse,
            )?;
            slice_set = ensemble.get_slices(self.slicer.as_ref(), &StatisticsRequest::None)?;
            Some(bounds)
        } else {
            None
        };

        let last = n_slices - 1;
        let stray = slice_set.particle_indices_of_slice(last).len();
        if stray > 0 {
            log::warn!("last slice holds {stray} particles; they receive no space charge kick");
        }

        let n = ensemble.macroparticle_count();
        let charge = ensemble.charge_per_macroparticle();
        let mut ex = Array1::<f64>::zeros(n);
        let mut ey = Array1::<f64>::zeros(n);

        for k in 0..last {
            let (selection, bounds): (Vec<usize>, Option<CellBounds>) = match &sorted {
                Some(all) => {
                    let cells = n_transverse * k..n_transverse * (k + 1);
                    (all.span(cells.clone()).collect(), Some(all.window(cells)))
                }
                None => (slice_set.particle_indices_of_slice(k).to_vec(), None),
            };
            if selection.is_empty() {
                continue;
            }
            let request = SolveRequest {
                positions: Positions::Transverse {
                    x: ensemble.coordinate(Coordinate::X)?,
                    y: ensemble.coordinate(Coordinate::Y)?,
                },
                selection: Some(&selection),
                charge,
                bounds: bounds.as_ref(),
            };
            let field = self.solver.solve(&request)?;
            field.check_length(n)?;
            ex += &field.ex;
            ey += &field.ey;
            log::trace!("slice {k}: solved {} particles", selection.len());
        }

        let inv_gamma2 = 1.0 / (ensemble.gamma() * ensemble.gamma());
        ex *= inv_gamma2;
        ey *= inv_gamma2;

        log::debug!(
            "2.5D space charge: {n_slices} slices, sorted={}, kick factor {factor:.6e}",
            self.sort_particles
        );
        ensemble.axpy(Coordinate::Xp, factor, ex.view())?;
        ensemble.axpy(Coordinate::Yp, factor, ey.view())?;
        Ok(())
    }

    fn length(&self) -> f64 {
        self.length
    }

    fn kick_factor(&self, ensemble: &ParticleEnsemble) -> f64 {
        let q = ensemble.charge_per_macroparticle();
        self.length / (ensemble.beta() * SPEED_OF_LIGHT) * q * q / ensemble.p0()
    }
}

/// Full 3D space charge in the beam rest frame.
#[derive(Clone)]
pub struct SpaceCharge3D {
    length: f64,
    solver: Arc<dyn FieldSolver>,
    sort_particles: bool,
}

impl fmt::Debug for SpaceCharge3D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpaceCharge3D")
            .field("length", &self.length)
            .field("mesh", self.solver.mesh())
            .field("sort_particles", &self.sort_particles)
            .finish()
    }
}

impl SpaceCharge3D {
    pub fn new(length: f64, solver: Arc<dyn FieldSolver>, sort_particles: bool) -> BeamResult<Self> {
        validate_setup(solver.as_ref(), length)?;
        Ok(SpaceCharge3D {
            length,
            solver,
            sort_particles,
        })
    }

    pub fn sorts_particles(&self) -> bool {
        self.sort_particles
    }
}

impl SpaceChargeKick for SpaceCharge3D {
    fn track(&self, ensemble: &mut ParticleEnsemble) -> BeamResult<()> {
        require(ensemble, &[Coordinate::X, Coordinate::Y, Coordinate::Z])?;
        let factor = finite_kick_factor(self, ensemble)?;
        let mesh = self.solver.mesh();

        let bounds = if self.sort_particles {
            let ids = assign_cell_ids(ensemble, mesh, true)?;
            Some(sort_particles(ensemble, &ids, mesh.cell_count())?.into_bounds())
        } else {
            None
        };

        let z = ensemble.z_beamframe()?;
        let request = SolveRequest {
            positions: Positions::Spatial {
                x: ensemble.coordinate(Coordinate::X)?,
                y: ensemble.coordinate(Coordinate::Y)?,
                z: z.view(),
            },
            selection: None,
            charge: ensemble.charge_per_macroparticle(),
            bounds: bounds.as_ref(),
        };
        let field = self.solver.solve(&request)?;
        field.check_length(ensemble.macroparticle_count())?;
        let ez = field.ez.ok_or_else(|| {
            BeamError::Configuration("3D solve returned no longitudinal field".to_string())
        })?;

        let inv_gamma2 = 1.0 / (ensemble.gamma() * ensemble.gamma());
        let ex = field.ex * inv_gamma2;
        let ey = field.ey * inv_gamma2;

        log::debug!(
            "3D space charge: {} particles, sorted={}, kick factor {factor:.6e}",
            ensemble.macroparticle_count(),
            self.sort_particles
        );
        ensemble.axpy(Coordinate::X, factor, ex.view())?;
        ensemble.axpy(Coordinate::Y, factor, ey.view())?;
        ensemble.axpy(Coordinate::Z, factor, ez.view())?;
        Ok(())
    }

    fn length(&self) -> f64 {
        self.length
    }

    fn kick_factor(&self, ensemble: &ParticleEnsemble) -> f64 {
        self.length / (ensemble.beta() * SPEED_OF_LIGHT) * ensemble.charge_per_macroparticle()
            / ensemble.p0()
    }
}

/// Build the configured kick on a [`UniformBinSlicer`] and a [`PicSolver`].
pub fn space_charge_from_config(config: &SimulationConfig) -> BeamResult<Box<dyn SpaceChargeKick>> {
    config.validate()?;
    let sc = &config.space_charge;
    let solver: Arc<dyn FieldSolver> = Arc::new(PicSolver::from_config(&config.mesh, &sc.solver)?);
    let kick: Box<dyn SpaceChargeKick> = match sc.model {
        SpaceChargeModel::SliceBySlice => {
            let slicer: Arc<dyn Slicer> = Arc::new(UniformBinSlicer::from_config(&config.slicing)?);
            Box::new(SpaceCharge25D::new(slicer, sc.length, solver, sc.sort_particles)?)
        }
        SpaceChargeModel::Full3D => Box::new(SpaceCharge3D::new(sc.length, solver, sc.sort_particles)?),
    };
    log::debug!("space charge kick from config '{}': {kick:?}", config.name);
    Ok(kick)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field_solver::FieldComponents;
    use crate::mesh::{RectMesh, RectMesh2D, RectMesh3D};
    use beam_types::config::{EnsembleParams, SliceCuts, SliceMode};
    use beam_types::constants::{ELEMENTARY_CHARGE, PROTON_MASS};

    /// Returns `+value` for ex and ez and `-value` for ey at every participant.
    struct ConstantField {
        mesh: RectMesh,
        value: f64,
    }

    impl FieldSolver for ConstantField {
        fn mesh(&self) -> &RectMesh {
            &self.mesh
        }

        fn solve(&self, request: &SolveRequest<'_>) -> BeamResult<FieldComponents> {
            request.validate()?;
            let mut f = FieldComponents::zeros(request.positions.len(), request.positions.dimension() == 3);
            for k in 0..request.participants() {
                let i = request.particle(k);
                f.ex[i] = self.value;
                f.ey[i] = -self.value;
                if let Some(ez) = f.ez.as_mut() {
                    ez[i] = self.value;
                }
            }
            Ok(f)
        }
    }

    fn mesh3() -> RectMesh {
        RectMesh::Spatial(RectMesh3D::new([-0.01, -0.01, -0.5], [0.001, 0.001, 0.1], [21, 21, 11]).unwrap())
    }

    fn field(value: f64) -> Arc<dyn FieldSolver> {
        Arc::new(ConstantField { mesh: mesh3(), value })
    }

    fn slicer() -> Arc<dyn Slicer> {
        Arc::new(
            UniformBinSlicer::new(10, SliceMode::ConstantSpace, SliceCuts::Fixed { tail: -0.5, head: 0.5 })
                .unwrap(),
        )
    }

    /// z spans [-0.4, 0.3], so the last of ten bins over [-0.5, 0.5] is empty.
    fn bunch(n: usize, ppm: f64) -> ParticleEnsemble {
        bunch_at(n, ppm, 2.0)
    }

    fn bunch_at(n: usize, ppm: f64, gamma: f64) -> ParticleEnsemble {
        let params = EnsembleParams {
            macroparticle_count: n,
            particles_per_macroparticle: ppm,
            charge: ELEMENTARY_CHARGE,
            mass: PROTON_MASS,
            circumference: 157.08,
            gamma,
            bucket_id: 0,
        };
        let spread = |i: usize, m: usize| 0.008 * ((i * m % n) as f64 / n as f64 - 0.5);
        ParticleEnsemble::new(
            &params,
            [
                (Coordinate::X, (0..n).map(|i| spread(i, 7)).collect::<Array1<f64>>()),
                (Coordinate::Xp, Array1::zeros(n)),
                (Coordinate::Y, (0..n).map(|i| spread(i, 13)).collect::<Array1<f64>>()),
                (Coordinate::Yp, Array1::zeros(n)),
                (Coordinate::Z, (0..n).map(|i| -0.4 + 0.7 * i as f64 / (n - 1) as f64).collect::<Array1<f64>>()),
                (Coordinate::Dp, Array1::zeros(n)),
            ],
        )
        .unwrap()
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-12 * a.abs().max(b.abs()).max(f64::MIN_POSITIVE)
    }

    #[test]
    fn test_zero_field_leaves_momenta() {
        let kick = SpaceCharge25D::new(slicer(), 1.0, field(0.0), false).unwrap();
        let mut e = bunch(200, 1e10);
        kick.track(&mut e).unwrap();
        assert!(e.coordinate(Coordinate::Xp).unwrap().iter().all(|&v| v == 0.0));
        assert!(e.coordinate(Coordinate::Yp).unwrap().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_constant_field_kicks_every_sliced_particle() {
        for sort in [false, true] {
            let kick = SpaceCharge25D::new(slicer(), 2.0, field(1.0), sort).unwrap();
            let mut e = bunch(150, 1e10);
            let expected = kick.kick_factor(&e) / (e.gamma() * e.gamma());
            kick.track(&mut e).unwrap();
            for (&xp, &yp) in e
                .coordinate(Coordinate::Xp)
                .unwrap()
                .iter()
                .zip(e.coordinate(Coordinate::Yp).unwrap().iter())
            {
                assert!(close(xp, expected), "sort={sort}: xp {xp} vs {expected}");
                assert!(close(yp, -expected), "sort={sort}: yp {yp} vs {}", -expected);
            }
        }
    }

    #[test]
    fn test_sorting_reorders_by_slice() {
        let kick = SpaceCharge25D::new(slicer(), 1.0, field(0.0), true).unwrap();
        let mut e = bunch(120, 1e10);
        kick.track(&mut e).unwrap();
        let z = e.coordinate(Coordinate::Z).unwrap();
        let bin = |zi: f64| ((zi + 0.5) / 0.1).floor() as i64;
        assert!(z.windows(2).into_iter().all(|w| bin(w[0]) <= bin(w[1])));
    }

    #[test]
    fn test_kick_factor_exponents() {
        let k25 = SpaceCharge25D::new(slicer(), 1.0, field(0.0), false).unwrap();
        let k3 = SpaceCharge3D::new(1.0, field(0.0), false).unwrap();
        let (a, b) = (bunch(10, 1e10), bunch(10, 2e10));
        assert!(close(k25.kick_factor(&b) / k25.kick_factor(&a), 4.0));
        assert!(close(k3.kick_factor(&b) / k3.kick_factor(&a), 2.0));
    }

    #[test]
    fn test_3d_kick_scales_transverse_only() {
        for sort in [false, true] {
            let kick = SpaceCharge3D::new(0.5, field(1.0), sort).unwrap();
            let mut e = bunch(64, 1e10);
            let before = e.clone();
            let factor = kick.kick_factor(&e);
            let g2 = e.gamma() * e.gamma();
            kick.track(&mut e).unwrap();
            let old = |c: Coordinate| -> std::collections::HashMap<u64, f64> {
                before
                    .identity()
                    .iter()
                    .copied()
                    .zip(before.coordinate(c).unwrap().iter().copied())
                    .collect()
            };
            let (x0, y0, z0) = (old(Coordinate::X), old(Coordinate::Y), old(Coordinate::Z));
            for (i, id) in e.identity().iter().enumerate() {
                let x = e.coordinate(Coordinate::X).unwrap()[i];
                let y = e.coordinate(Coordinate::Y).unwrap()[i];
                let z = e.coordinate(Coordinate::Z).unwrap()[i];
                assert!((x - x0[id] - factor / g2).abs() <= 1e-12 * factor.abs().max(1e-30) + 1e-18);
                assert!((y - y0[id] + factor / g2).abs() <= 1e-12 * factor.abs().max(1e-30) + 1e-18);
                assert!((z - z0[id] - factor).abs() <= 1e-12 * factor.abs().max(1e-30) + 1e-18);
            }
        }
    }

    #[test]
    fn test_planar_mesh_rejected() {
        let planar: Arc<dyn FieldSolver> = Arc::new(ConstantField {
            mesh: RectMesh::Planar(RectMesh2D::new([0.0, 0.0], [1.0, 1.0], [4, 4]).unwrap()),
            value: 0.0,
        });
        assert!(matches!(
            SpaceCharge25D::new(slicer(), 1.0, Arc::clone(&planar), false),
            Err(BeamError::Configuration(_))
        ));
        assert!(matches!(
            SpaceCharge3D::new(1.0, planar, true),
            Err(BeamError::Configuration(_))
        ));
        assert!(SpaceCharge3D::new(0.0, field(0.0), true).is_err());
        assert!(SpaceCharge25D::new(slicer(), f64::NAN, field(0.0), true).is_err());
    }

    #[test]
    fn test_missing_momentum_fails_before_kick() {
        let kick = SpaceCharge25D::new(slicer(), 1.0, field(1.0), true).unwrap();
        let params = EnsembleParams {
            macroparticle_count: 3,
            particles_per_macroparticle: 1e10,
            charge: ELEMENTARY_CHARGE,
            mass: PROTON_MASS,
            circumference: 1.0,
            gamma: 2.0,
            bucket_id: 0,
        };
        let mut e = ParticleEnsemble::new(
            &params,
            [
                (Coordinate::X, Array1::from_vec(vec![0.0, 0.001, -0.001])),
                (Coordinate::Xp, Array1::zeros(3)),
                (Coordinate::Y, Array1::zeros(3)),
                (Coordinate::Z, Array1::from_vec(vec![0.2, -0.1, 0.0])),
            ],
        )
        .unwrap();
        let version = e.version();
        let err = kick.track(&mut e).unwrap_err();
        assert!(matches!(err, BeamError::MissingCoordinate(ref c) if c == "yp"));
        assert_eq!(e.version(), version);
        assert!(e.coordinate(Coordinate::Xp).unwrap().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_bunch_at_rest_rejected_untouched() {
        let kicks: [Box<dyn SpaceChargeKick>; 4] = [
            Box::new(SpaceCharge25D::new(slicer(), 1.0, field(0.0), false).unwrap()),
            Box::new(SpaceCharge25D::new(slicer(), 1.0, field(0.0), true).unwrap()),
            Box::new(SpaceCharge3D::new(1.0, field(0.0), false).unwrap()),
            Box::new(SpaceCharge3D::new(1.0, field(0.0), true).unwrap()),
        ];
        for kick in &kicks {
            let mut e = bunch_at(4, 1e10, 1.0);
            let before = e.clone();
            let version = e.version();
            assert!(!kick.kick_factor(&e).is_finite());
            let err = kick.track(&mut e).unwrap_err();
            assert!(matches!(err, BeamError::PhysicsViolation(_)), "{kick:?}: {err}");
            assert_eq!(e.version(), version);
            for c in Coordinate::ALL {
                assert_eq!(e.coordinate(c).unwrap(), before.coordinate(c).unwrap());
            }
        }
    }
}
