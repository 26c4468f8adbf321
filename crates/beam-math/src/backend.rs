// ─────────────────────────────────────────────────────────────────────
// SCPN Beam Dynamics — Compute Backend
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Data-parallel array primitives behind an injectable strategy object.
//!
//! Every ensemble and kick holds an `Arc<dyn ComputeBackend>` chosen at
//! construction. Two implementations are provided:
//! - [`SerialBackend`]: single-threaded reference
//! - [`RayonBackend`]: work-stealing parallel version on the rayon pool
//!
//! Both produce bit-identical results: sorts are stable and every gather
//! or search is element-wise.

use std::fmt;
use std::sync::Arc;

use beam_types::config::BackendKind;
use ndarray::{Array1, ArrayView1, ArrayViewMut1, Zip};
use rayon::prelude::*;

/// Array primitives used by the ensemble, the cell sorter and the kicks.
pub trait ComputeBackend: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Stable ascending argsort. NaN sorts after every finite value.
    fn argsort_f64(&self, values: ArrayView1<f64>) -> Vec<usize>;

    /// Stable ascending argsort of integer keys (cell ids).
    fn argsort_usize(&self, values: &[usize]) -> Vec<usize>;

    /// `out[i] = values[indices[i]]`
    fn gather_f64(&self, values: ArrayView1<f64>, indices: &[usize]) -> Array1<f64>;

    fn gather_u64(&self, values: ArrayView1<u64>, indices: &[usize]) -> Array1<u64>;

    fn gather_i32(&self, values: ArrayView1<i32>, indices: &[usize]) -> Array1<i32>;

    /// For each query `q`, the first index `i` with `sorted[i] >= q`.
    fn searchsorted_left(&self, sorted: &[usize], queries: &[usize]) -> Vec<usize>;

    /// For each query `q`, the first index `i` with `sorted[i] > q`.
    fn searchsorted_right(&self, sorted: &[usize], queries: &[usize]) -> Vec<usize>;

    /// `y += alpha * x`
    fn axpy(&self, y: ArrayViewMut1<f64>, alpha: f64, x: ArrayView1<f64>);
}

/// Single-threaded backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialBackend;

/// Parallel backend on the global rayon thread pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct RayonBackend;

impl ComputeBackend for SerialBackend {
    fn name(&self) -> &'static str {
        "serial"
    }

    fn argsort_f64(&self, values: ArrayView1<f64>) -> Vec<usize> {
        let mut order: Vec<usize> = (0..values.len()).collect();
        order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
        order
    }

    fn argsort_usize(&self, values: &[usize]) -> Vec<usize> {
        let mut order: Vec<usize> = (0..values.len()).collect();
        order.sort_by_key(|&i| values[i]);
        order
    }

    fn gather_f64(&self, values: ArrayView1<f64>, indices: &[usize]) -> Array1<f64> {
        indices.iter().map(|&i| values[i]).collect()
    }

    fn gather_u64(&self, values: ArrayView1<u64>, indices: &[usize]) -> Array1<u64> {
        indices.iter().map(|&i| values[i]).collect()
    }

    fn gather_i32(&self, values: ArrayView1<i32>, indices: &[usize]) -> Array1<i32> {
        indices.iter().map(|&i| values[i]).collect()
    }

    fn searchsorted_left(&self, sorted: &[usize], queries: &[usize]) -> Vec<usize> {
        queries
            .iter()
            .map(|&q| sorted.partition_point(|&v| v < q))
            .collect()
    }

    fn searchsorted_right(&self, sorted: &[usize], queries: &[usize]) -> Vec<usize> {
        queries
            .iter()
            .map(|&q| sorted.partition_point(|&v| v <= q))
            .collect()
    }

    fn axpy(&self, mut y: ArrayViewMut1<f64>, alpha: f64, x: ArrayView1<f64>) {
        y.scaled_add(alpha, &x);
    }
}

impl ComputeBackend for RayonBackend {
    fn name(&self) -> &'static str {
        "rayon"
    }

    fn argsort_f64(&self, values: ArrayView1<f64>) -> Vec<usize> {
        let mut order: Vec<usize> = (0..values.len()).collect();
        // par_sort_by is a stable merge sort
        order.par_sort_by(|&a, &b| values[a].total_cmp(&values[b]));
        order
    }

    fn argsort_usize(&self, values: &[usize]) -> Vec<usize> {
        let mut order: Vec<usize> = (0..values.len()).collect();
        order.par_sort_by_key(|&i| values[i]);
        order
    }

    fn gather_f64(&self, values: ArrayView1<f64>, indices: &[usize]) -> Array1<f64> {
        Array1::from_vec(indices.par_iter().map(|&i| values[i]).collect())
    }

    fn gather_u64(&self, values: ArrayView1<u64>, indices: &[usize]) -> Array1<u64> {
        Array1::from_vec(indices.par_iter().map(|&i| values[i]).collect())
    }

    fn gather_i32(&self, values: ArrayView1<i32>, indices: &[usize]) -> Array1<i32> {
        Array1::from_vec(indices.par_iter().map(|&i| values[i]).collect())
    }

    fn searchsorted_left(&self, sorted: &[usize], queries: &[usize]) -> Vec<usize> {
        queries
            .par_iter()
            .map(|&q| sorted.partition_point(|&v| v < q))
            .collect()
    }

    fn searchsorted_right(&self, sorted: &[usize], queries: &[usize]) -> Vec<usize> {
        queries
            .par_iter()
            .map(|&q| sorted.partition_point(|&v| v <= q))
            .collect()
    }

    fn axpy(&self, y: ArrayViewMut1<f64>, alpha: f64, x: ArrayView1<f64>) {
        Zip::from(y).and(x).par_for_each(|yi, &xi| *yi += alpha * xi);
    }
}

/// Build the backend selected in configuration.
pub fn backend_for(kind: BackendKind) -> Arc<dyn ComputeBackend> {
    match kind {
        BackendKind::Serial => Arc::new(SerialBackend),
        BackendKind::Rayon => Arc::new(RayonBackend),
    }
}

/// The backend used when none is injected explicitly.
pub fn default_backend() -> Arc<dyn ComputeBackend> {
    Arc::new(SerialBackend)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn backends() -> Vec<Arc<dyn ComputeBackend>> {
        vec![backend_for(BackendKind::Serial), backend_for(BackendKind::Rayon)]
    }

    #[test]
    fn test_argsort_is_stable() {
        let values = array![3.0, 1.0, 2.0, 1.0, 3.0];
        for backend in backends() {
            let order = backend.argsort_f64(values.view());
            assert_eq!(order, vec![1, 3, 2, 0, 4], "backend {}", backend.name());
        }
    }

    #[test]
    fn test_argsort_places_nan_last() {
        let values = array![f64::NAN, -1.0, 0.5];
        let order = SerialBackend.argsort_f64(values.view());
        assert_eq!(order, vec![1, 2, 0]);
    }

    #[test]
    fn test_argsort_usize_is_stable() {
        let ids = vec![4, 0, 4, 2, 0];
        for backend in backends() {
            assert_eq!(backend.argsort_usize(&ids), vec![1, 4, 3, 0, 2]);
        }
    }

    #[test]
    fn test_gather_follows_indices() {
        let values = array![10.0, 20.0, 30.0];
        let ids = array![7u64, 8, 9];
        let tags = array![1i32, 2, 3];
        for backend in backends() {
            assert_eq!(backend.gather_f64(values.view(), &[2, 0, 1]), array![30.0, 10.0, 20.0]);
            assert_eq!(backend.gather_u64(ids.view(), &[1, 1, 0]), array![8u64, 8, 7]);
            assert_eq!(backend.gather_i32(tags.view(), &[2]), array![3i32]);
        }
    }

    #[test]
    fn test_searchsorted_left_right() {
        let sorted = vec![0, 0, 2, 2, 2, 5];
        let queries: Vec<usize> = (0..7).collect();
        for backend in backends() {
            assert_eq!(
                backend.searchsorted_left(&sorted, &queries),
                vec![0, 2, 2, 5, 5, 5, 6]
            );
            assert_eq!(
                backend.searchsorted_right(&sorted, &queries),
                vec![2, 2, 5, 5, 5, 6, 6]
            );
        }
    }

    #[test]
    fn test_axpy_accumulates() {
        for backend in backends() {
            let mut y = array![1.0, 1.0, 1.0];
            let x = array![1.0, 2.0, 3.0];
            backend.axpy(y.view_mut(), 0.5, x.view());
            assert_eq!(y, array![1.5, 2.0, 2.5]);
        }
    }
}
