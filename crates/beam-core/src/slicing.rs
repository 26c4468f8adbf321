// ─────────────────────────────────────────────────────────────────────
// SCPN Beam Dynamics — Longitudinal Slicing
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Longitudinal slicing of an ensemble into contiguous z bins.
//!
//! A [`Slicer`] partitions the particles of one ensemble into `n_slices`
//! bins between a tail and a head cut and returns a [`SliceSet`]. Particles
//! outside the cuts belong to no slice. The ensemble caches the last set per
//! slicer (see [`crate::slice_cache`]).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use beam_math::stats;
use beam_types::config::{SliceCuts, SliceMode, SlicingConfig};
use beam_types::error::{BeamError, BeamResult};
use ndarray::ArrayView1;

use crate::coordinate::Coordinate;
use crate::ensemble::ParticleEnsemble;
use crate::statistics::{slice_statistics, Statistic, StatisticsRequest};

/// Process-unique identity of a slicer instance. Used as the cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlicerId(u64);

impl SlicerId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        SlicerId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

/// Partitions an ensemble into longitudinal bins.
pub trait Slicer: Send + Sync {
    fn id(&self) -> SlicerId;

    fn slice(
        &self,
        ensemble: &ParticleEnsemble,
        statistics: &StatisticsRequest,
    ) -> BeamResult<SliceSet>;
}

/// Partition of one ensemble's particles into longitudinal bins.
#[derive(Debug, Clone, PartialEq)]
pub struct SliceSet {
    z_bins: Vec<f64>,
    slice_index_of_particle: Vec<Option<usize>>,
    particle_indices: Vec<Vec<usize>>,
    particles_outside_cuts: Vec<usize>,
    statistics: BTreeMap<Statistic, Vec<f64>>,
}

impl SliceSet {
    /// Build a slice set from bin edges and the bin of every particle.
    ///
    /// `z_bins` holds `n_slices + 1` ascending edges. Per-slice index lists
    /// come out in ascending particle order.
    pub fn new(z_bins: Vec<f64>, slice_index_of_particle: Vec<Option<usize>>) -> BeamResult<Self> {
        if z_bins.len() < 2 {
            return Err(BeamError::Configuration(format!(
                "a slice set needs at least 2 bin edges, got {}",
                z_bins.len()
            )));
        }
        if z_bins.windows(2).any(|w| !(w[0] <= w[1])) {
            return Err(BeamError::Configuration(
                "slice bin edges must be ascending".to_string(),
            ));
        }
        let n_slices = z_bins.len() - 1;
        let mut particle_indices = vec![Vec::new(); n_slices];
        let mut particles_outside_cuts = Vec::new();

        for (i, slot) in slice_index_of_particle.iter().enumerate() {
            match *slot {
                Some(k) if k < n_slices => particle_indices[k].push(i),
                Some(k) => {
                    return Err(BeamError::Configuration(format!(
                        "particle {i} assigned to slice {k} of {n_slices}"
                    )))
                }
                None => particles_outside_cuts.push(i),
            }
        }

        Ok(SliceSet {
            z_bins,
            slice_index_of_particle,
            particle_indices,
            particles_outside_cuts,
            statistics: BTreeMap::new(),
        })
    }

    pub fn with_statistics(mut self, statistics: BTreeMap<Statistic, Vec<f64>>) -> Self {
        self.statistics = statistics;
        self
    }

    pub fn n_slices(&self) -> usize {
        self.particle_indices.len()
    }

    pub fn z_bins(&self) -> &[f64] {
        &self.z_bins
    }

    pub fn z_cut_tail(&self) -> f64 {
        self.z_bins[0]
    }

    pub fn z_cut_head(&self) -> f64 {
        self.z_bins[self.z_bins.len() - 1]
    }

    pub fn z_centers(&self) -> Vec<f64> {
        self.z_bins.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect()
    }

    pub fn slice_widths(&self) -> Vec<f64> {
        self.z_bins.windows(2).map(|w| w[1] - w[0]).collect()
    }

    pub fn n_macroparticles_per_slice(&self) -> Vec<usize> {
        self.particle_indices.iter().map(Vec::len).collect()
    }

    pub fn particle_indices_of_slice(&self, slice: usize) -> &[usize] {
        &self.particle_indices[slice]
    }

    pub fn particles_within_cuts(&self) -> usize {
        self.slice_index_of_particle.len() - self.particles_outside_cuts.len()
    }

    pub fn particles_outside_cuts(&self) -> &[usize] {
        &self.particles_outside_cuts
    }

    pub fn slice_index_of_particle(&self) -> &[Option<usize>] {
        &self.slice_index_of_particle
    }

    pub fn statistic(&self, statistic: Statistic) -> Option<&[f64]> {
        self.statistics.get(&statistic).map(Vec::as_slice)
    }

    pub fn statistics(&self) -> &BTreeMap<Statistic, Vec<f64>> {
        &self.statistics
    }
}

/// Reference slicer: equal-width or equal-population bins between two cuts.
#[derive(Debug, Clone)]
pub struct UniformBinSlicer {
    id: SlicerId,
    n_slices: usize,
    mode: SliceMode,
    cuts: SliceCuts,
}

impl UniformBinSlicer {
    pub fn new(n_slices: usize, mode: SliceMode, cuts: SliceCuts) -> BeamResult<Self> {
        Self::from_config(&SlicingConfig {
            n_slices,
            mode,
            cuts,
        })
    }

    pub fn from_config(config: &SlicingConfig) -> BeamResult<Self> {
        config.validate()?;
        Ok(UniformBinSlicer {
            id: SlicerId::next(),
            n_slices: config.n_slices,
            mode: config.mode,
            cuts: config.cuts,
        })
    }

    pub fn n_slices(&self) -> usize {
        self.n_slices
    }

    pub fn mode(&self) -> SliceMode {
        self.mode
    }

    fn cut_positions(&self, z: ArrayView1<f64>) -> BeamResult<(f64, f64)> {
        let (tail, head) = match self.cuts {
            SliceCuts::Fixed { tail, head } => (tail, head),
            SliceCuts::Sigma { n_sigma } => {
                let mean_z = stats::mean(z);
                let sigma_z = stats::std(z);
                (mean_z - n_sigma * sigma_z, mean_z + n_sigma * sigma_z)
            }
        };
        if !(tail.is_finite() && head.is_finite() && head > tail) {
            return Err(BeamError::PhysicsViolation(format!(
                "degenerate slicing region: tail={tail}, head={head}"
            )));
        }
        Ok((tail, head))
    }

    fn constant_space(&self, z: ArrayView1<f64>, tail: f64, head: f64) -> (Vec<f64>, Vec<Option<usize>>) {
        let n = self.n_slices;
        let dz = (head - tail) / n as f64;
        let edges = (0..=n)
            .map(|k| if k == n { head } else { tail + k as f64 * dz })
            .collect();
        let index = z
            .iter()
            .map(|&zi| {
                if zi >= tail && zi <= head {
                    Some((((zi - tail) / dz).floor() as usize).min(n - 1))
                } else {
                    None
                }
            })
            .collect();
        (edges, index)
    }

    fn constant_charge(
        &self,
        ensemble: &ParticleEnsemble,
        z: ArrayView1<f64>,
        tail: f64,
        head: f64,
    ) -> (Vec<f64>, Vec<Option<usize>>) {
        let n = self.n_slices;
        let order = ensemble.backend().argsort_f64(z);
        let inside: Vec<usize> = order
            .into_iter()
            .filter(|&i| z[i] >= tail && z[i] <= head)
            .collect();
        let m = inside.len();
        if m == 0 {
            return self.constant_space(z, tail, head);
        }

        let mut index = vec![None; z.len()];
        let mut edges = vec![tail; n + 1];
        edges[n] = head;
        for (rank, &i) in inside.iter().enumerate() {
            index[i] = Some(rank * n / m);
        }
        for (k, edge) in edges.iter_mut().enumerate().take(n).skip(1) {
            // first rank landing in slice k
            let first = (k * m).div_ceil(n);
            *edge = if first < m { z[inside[first]] } else { head };
        }
        (edges, index)
    }
}

impl Slicer for UniformBinSlicer {
    fn id(&self) -> SlicerId {
        self.id
    }

    fn slice(
        &self,
        ensemble: &ParticleEnsemble,
        statistics: &StatisticsRequest,
    ) -> BeamResult<SliceSet> {
        let z = ensemble.coordinate(Coordinate::Z)?;
        let (tail, head) = self.cut_positions(z)?;
        let (edges, index) = match self.mode {
            SliceMode::ConstantSpace => self.constant_space(z, tail, head),
            SliceMode::ConstantCharge => self.constant_charge(ensemble, z, tail, head),
        };
        let set = SliceSet::new(edges, index)?;
        if statistics.is_none() {
            return Ok(set);
        }
        let attached = slice_statistics(ensemble, &set, statistics)?;
        Ok(set.with_statistics(attached))
    }
}
