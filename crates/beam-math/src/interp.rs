//! Cloud-in-cell (linear weighting) deposition and interpolation on
//! uniform node grids, plus finite-difference gradients.
//!
//! Positions are given as fractional node indices `f = (x - x0) / dx`.

use ndarray::{Array2, Array3};

/// Lower node index and fractional offset along one axis.
///
/// Returns `None` outside `[0, n - 1]`. The upper edge maps into the last
/// cell with offset 1.
#[inline]
pub fn cic_locate(f: f64, n: usize) -> Option<(usize, f64)> {
    if n < 2 || !f.is_finite() || f < 0.0 || f > (n - 1) as f64 {
        return None;
    }
    let i = (f.floor() as usize).min(n - 2);
    Some((i, f - i as f64))
}

/// Lower-corner node and weights of one particle on a 2D grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stencil2D {
    pub ix: usize,
    pub iy: usize,
    pub tx: f64,
    pub ty: f64,
}

impl Stencil2D {
    pub fn locate(fx: f64, fy: f64, nx: usize, ny: usize) -> Option<Self> {
        let (ix, tx) = cic_locate(fx, nx)?;
        let (iy, ty) = cic_locate(fy, ny)?;
        Some(Stencil2D { ix, iy, tx, ty })
    }

    #[inline]
    fn corners(&self) -> [([usize; 2], f64); 4] {
        let (ix, iy, tx, ty) = (self.ix, self.iy, self.tx, self.ty);
        [
            ([ix, iy], (1.0 - tx) * (1.0 - ty)),
            ([ix + 1, iy], tx * (1.0 - ty)),
            ([ix, iy + 1], (1.0 - tx) * ty),
            ([ix + 1, iy + 1], tx * ty),
        ]
    }

    pub fn deposit(&self, grid: &mut Array2<f64>, amount: f64) {
        for (node, w) in self.corners() {
            grid[node] += w * amount;
        }
    }

    pub fn interpolate(&self, grid: &Array2<f64>) -> f64 {
        self.corners().iter().map(|(node, w)| w * grid[*node]).sum()
    }
}

/// Lower-corner node and weights of one particle on a 3D grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stencil3D {
    pub ix: usize,
    pub iy: usize,
    pub iz: usize,
    pub tx: f64,
    pub ty: f64,
    pub tz: f64,
}

impl Stencil3D {
    pub fn locate(f: [f64; 3], n: [usize; 3]) -> Option<Self> {
        let (ix, tx) = cic_locate(f[0], n[0])?;
        let (iy, ty) = cic_locate(f[1], n[1])?;
        let (iz, tz) = cic_locate(f[2], n[2])?;
        Some(Stencil3D {
            ix,
            iy,
            iz,
            tx,
            ty,
            tz,
        })
    }

    #[inline]
    fn corners(&self) -> [([usize; 3], f64); 8] {
        let mut out = [([0usize; 3], 0.0); 8];
        for (k, slot) in out.iter_mut().enumerate() {
            let (bx, by, bz) = (k & 1, (k >> 1) & 1, (k >> 2) & 1);
            let wx = if bx == 1 { self.tx } else { 1.0 - self.tx };
            let wy = if by == 1 { self.ty } else { 1.0 - self.ty };
            let wz = if bz == 1 { self.tz } else { 1.0 - self.tz };
            *slot = ([self.ix + bx, self.iy + by, self.iz + bz], wx * wy * wz);
        }
        out
    }

    pub fn deposit(&self, grid: &mut Array3<f64>, amount: f64) {
        for (node, w) in self.corners() {
            grid[node] += w * amount;
        }
    }

    pub fn interpolate(&self, grid: &Array3<f64>) -> f64 {
        self.corners().iter().map(|(node, w)| w * grid[*node]).sum()
    }
}

/// Gradient of a 2D field using central differences.
///
/// Returns (df_dx, df_dy). Uses forward/backward differences at boundaries.
pub fn gradient_2d(field: &Array2<f64>, dx: f64, dy: f64) -> (Array2<f64>, Array2<f64>) {
    let (nx, ny) = field.dim();
    let mut df_dx = Array2::zeros((nx, ny));
    let mut df_dy = Array2::zeros((nx, ny));
    if nx < 2 || ny < 2 {
        return (df_dx, df_dy);
    }

    for ix in 0..nx {
        for iy in 0..ny {
            df_dx[[ix, iy]] = if ix == 0 {
                (field[[1, iy]] - field[[0, iy]]) / dx
            } else if ix == nx - 1 {
                (field[[nx - 1, iy]] - field[[nx - 2, iy]]) / dx
            } else {
                (field[[ix + 1, iy]] - field[[ix - 1, iy]]) / (2.0 * dx)
            };
            df_dy[[ix, iy]] = if iy == 0 {
                (field[[ix, 1]] - field[[ix, 0]]) / dy
            } else if iy == ny - 1 {
                (field[[ix, ny - 1]] - field[[ix, ny - 2]]) / dy
            } else {
                (field[[ix, iy + 1]] - field[[ix, iy - 1]]) / (2.0 * dy)
            };
        }
    }

    (df_dx, df_dy)
}

/// Gradient of a 3D field along one axis (0, 1 or 2).
pub fn gradient_3d_axis(field: &Array3<f64>, axis: usize, h: f64) -> Array3<f64> {
    let dims = field.dim();
    let n = [dims.0, dims.1, dims.2][axis];
    let mut out = Array3::zeros(dims);
    if n < 2 {
        return out;
    }
    for ((ix, iy, iz), value) in out.indexed_iter_mut() {
        let mut idx = [ix, iy, iz];
        let i = idx[axis];
        let (lo, hi, span) = if i == 0 {
            (0, 1, h)
        } else if i == n - 1 {
            (n - 2, n - 1, h)
        } else {
            (i - 1, i + 1, 2.0 * h)
        };
        idx[axis] = hi;
        let f_hi = field[idx];
        idx[axis] = lo;
        let f_lo = field[idx];
        *value = (f_hi - f_lo) / span;
    }
    out
}
