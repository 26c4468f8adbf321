//! Red-Black Successive Over-Relaxation (SOR) for the Cartesian Poisson
//! equation on a uniform node grid.
//!
//! Solves  ∇²φ = source  with φ = 0 on every boundary node (grounded box).
//! The 5-point (2D) and 7-point (3D) stencils are used; boundary rows,
//! columns and planes are never updated.
//!
//! Arrays are indexed `[[ix, iy]]` in 2D and `[[ix, iy, iz]]` in 3D.

use ndarray::{Array2, Array3};

/// Outcome of an iterative solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SorOutcome {
    pub iterations: usize,
    /// Largest absolute update of the last sweep.
    pub last_update: f64,
    pub converged: bool,
}

/// Perform one Red-Black SOR sweep in 2D. Returns the largest absolute
/// update applied to any node.
pub fn sor_step_2d(phi: &mut Array2<f64>, source: &Array2<f64>, dx: f64, dy: f64, omega: f64) -> f64 {
    let (nx, ny) = phi.dim();
    if nx < 3 || ny < 3 {
        return 0.0;
    }
    let cx = 1.0 / (dx * dx);
    let cy = 1.0 / (dy * dy);
    let center = 2.0 * (cx + cy);
    let mut max_update: f64 = 0.0;

    for color in 0..2 {
        for ix in 1..nx - 1 {
            for iy in 1..ny - 1 {
                if (ix + iy) % 2 != color {
                    continue;
                }
                let neighbours = cx * (phi[[ix + 1, iy]] + phi[[ix - 1, iy]])
                    + cy * (phi[[ix, iy + 1]] + phi[[ix, iy - 1]]);
                let p_star = (neighbours - source[[ix, iy]]) / center;
                let delta = omega * (p_star - phi[[ix, iy]]);
                phi[[ix, iy]] += delta;
                max_update = max_update.max(delta.abs());
            }
        }
    }

    max_update
}

/// Perform one Red-Black SOR sweep in 3D. Returns the largest absolute
/// update applied to any node.
pub fn sor_step_3d(
    phi: &mut Array3<f64>,
    source: &Array3<f64>,
    spacing: [f64; 3],
    omega: f64,
) -> f64 {
    let (nx, ny, nz) = phi.dim();
    if nx < 3 || ny < 3 || nz < 3 {
        return 0.0;
    }
    let cx = 1.0 / (spacing[0] * spacing[0]);
    let cy = 1.0 / (spacing[1] * spacing[1]);
    let cz = 1.0 / (spacing[2] * spacing[2]);
    let center = 2.0 * (cx + cy + cz);
    let mut max_update: f64 = 0.0;

    for color in 0..2 {
        for ix in 1..nx - 1 {
            for iy in 1..ny - 1 {
                for iz in 1..nz - 1 {
                    if (ix + iy + iz) % 2 != color {
                        continue;
                    }
                    let neighbours = cx * (phi[[ix + 1, iy, iz]] + phi[[ix - 1, iy, iz]])
                        + cy * (phi[[ix, iy + 1, iz]] + phi[[ix, iy - 1, iz]])
                        + cz * (phi[[ix, iy, iz + 1]] + phi[[ix, iy, iz - 1]]);
                    let p_star = (neighbours - source[[ix, iy, iz]]) / center;
                    let delta = omega * (p_star - phi[[ix, iy, iz]]);
                    phi[[ix, iy, iz]] += delta;
                    max_update = max_update.max(delta.abs());
                }
            }
        }
    }

    max_update
}

/// Iterate 2D sweeps until the largest update falls below
/// `tol * max|φ|` or `max_iterations` is reached.
pub fn sor_solve_2d(
    phi: &mut Array2<f64>,
    source: &Array2<f64>,
    dx: f64,
    dy: f64,
    omega: f64,
    max_iterations: usize,
    tol: f64,
) -> SorOutcome {
    iterate(max_iterations, tol, || {
        let update = sor_step_2d(phi, source, dx, dy, omega);
        (update, max_abs(phi.iter()))
    })
}

/// 3D counterpart of [`sor_solve_2d`].
pub fn sor_solve_3d(
    phi: &mut Array3<f64>,
    source: &Array3<f64>,
    spacing: [f64; 3],
    omega: f64,
    max_iterations: usize,
    tol: f64,
) -> SorOutcome {
    iterate(max_iterations, tol, || {
        let update = sor_step_3d(phi, source, spacing, omega);
        (update, max_abs(phi.iter()))
    })
}

fn iterate<F>(max_iterations: usize, tol: f64, mut sweep: F) -> SorOutcome
where
    F: FnMut() -> (f64, f64),
{
    let mut last_update = 0.0;
    for iteration in 1..=max_iterations {
        let (update, scale) = sweep();
        last_update = update;
        if update <= tol * scale {
            return SorOutcome {
                iterations: iteration,
                last_update,
                converged: true,
            };
        }
    }
    SorOutcome {
        iterations: max_iterations,
        last_update,
        converged: false,
    }
}

fn max_abs<'a>(values: impl Iterator<Item = &'a f64>) -> f64 {
    values.fold(0.0_f64, |acc, v| acc.max(v.abs()))
}

/// L-infinity residual of ∇²φ - source over interior nodes (2D).
pub fn poisson_residual_2d(phi: &Array2<f64>, source: &Array2<f64>, dx: f64, dy: f64) -> f64 {
    let (nx, ny) = phi.dim();
    let cx = 1.0 / (dx * dx);
    let cy = 1.0 / (dy * dy);
    let mut max_res: f64 = 0.0;
    for ix in 1..nx.saturating_sub(1) {
        for iy in 1..ny.saturating_sub(1) {
            let lap = cx * (phi[[ix + 1, iy]] - 2.0 * phi[[ix, iy]] + phi[[ix - 1, iy]])
                + cy * (phi[[ix, iy + 1]] - 2.0 * phi[[ix, iy]] + phi[[ix, iy - 1]]);
            max_res = max_res.max((lap - source[[ix, iy]]).abs());
        }
    }
    max_res
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sor_zero_source_stays_zero() {
        let mut phi = Array2::zeros((16, 16));
        let source = Array2::zeros((16, 16));
        let outcome = sor_solve_2d(&mut phi, &source, 0.1, 0.1, 1.8, 100, 1e-10);
        let max_val = phi.iter().cloned().fold(0.0_f64, |a, b| a.max(b.abs()));
        assert!(max_val < 1e-15, "Should stay zero with zero source");
        assert!(outcome.converged);
    }

    #[test]
    fn test_sor_residual_decreases() {
        let mut phi = Array2::zeros((33, 33));
        let source = Array2::from_elem((33, 33), -1.0);

        let res_before = poisson_residual_2d(&phi, &source, 0.1, 0.1);
        sor_solve_2d(&mut phi, &source, 0.1, 0.1, 1.5, 200, 1e-12);
        let res_after = poisson_residual_2d(&phi, &source, 0.1, 0.1);

        assert!(
            res_after < res_before,
            "Residual should decrease: {res_before} -> {res_after}"
        );
    }

    #[test]
    fn test_sor_boundary_preserved() {
        let mut phi = Array2::zeros((16, 16));
        let source = Array2::from_elem((16, 16), -1.0);
        sor_solve_2d(&mut phi, &source, 0.2, 0.1, 1.8, 100, 1e-12);
        for i in 0..16 {
            assert_eq!(phi[[0, i]], 0.0);
            assert_eq!(phi[[15, i]], 0.0);
            assert_eq!(phi[[i, 0]], 0.0);
            assert_eq!(phi[[i, 15]], 0.0);
        }
    }

    #[test]
    fn test_sor_negative_source_gives_positive_potential() {
        // ∇²φ = -ρ/ε0 with ρ > 0 must give a potential hill
        let mut phi = Array2::zeros((21, 21));
        let mut source = Array2::zeros((21, 21));
        source[[10, 10]] = -1.0;
        let outcome = sor_solve_2d(&mut phi, &source, 1.0, 1.0, 1.8, 2000, 1e-10);
        assert!(outcome.converged, "outcome = {outcome:?}");
        assert!(phi[[10, 10]] > 0.0);
        assert!(phi[[10, 10]] > phi[[5, 10]]);
        // symmetric point source → symmetric potential
        assert!((phi[[8, 10]] - phi[[12, 10]]).abs() < 1e-6);
        assert!((phi[[10, 8]] - phi[[10, 12]]).abs() < 1e-6);
    }

    #[test]
    fn test_sor_3d_converges_symmetric() {
        let mut phi = Array3::zeros((11, 11, 11));
        let mut source = Array3::zeros((11, 11, 11));
        source[[5, 5, 5]] = -1.0;
        let outcome = sor_solve_3d(&mut phi, &source, [1.0, 1.0, 1.0], 1.7, 2000, 1e-10);
        assert!(outcome.converged, "outcome = {outcome:?}");
        assert!(phi[[5, 5, 5]] > 0.0);
        assert!((phi[[4, 5, 5]] - phi[[5, 5, 4]]).abs() < 1e-6);
        assert!(!phi.iter().any(|v| v.is_nan()));
    }

    #[test]
    fn test_sor_degenerate_grid_is_noop() {
        let mut phi = Array2::zeros((2, 5));
        let source = Array2::from_elem((2, 5), -1.0);
        assert_eq!(sor_step_2d(&mut phi, &source, 1.0, 1.0, 1.5), 0.0);
    }
}
