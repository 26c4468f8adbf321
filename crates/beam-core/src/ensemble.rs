// ─────────────────────────────────────────────────────────────────────
// SCPN Beam Dynamics — Particle Ensemble
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Macro-particle ensemble: named phase-space arrays, identities, bucket
//! tags and reference kinematics.
//!
//! Every coordinate array, `identity` and `bucket_id` have exactly
//! `macroparticle_count` entries. Any mutation of a coordinate array bumps
//! the ensemble version and drops every cached slice set.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::Add;
use std::str::FromStr;
use std::sync::Arc;

use beam_math::backend::{default_backend, ComputeBackend};
use beam_types::config::EnsembleParams;
use beam_types::constants::SPEED_OF_LIGHT;
use beam_types::error::{BeamError, BeamResult};
use ndarray::{Array1, ArrayView1, ArrayViewMut1};

use crate::coordinate::Coordinate;
use crate::slice_cache::SliceSetCache;
use crate::slicing::{SliceSet, Slicer, SlicerId};
use crate::statistics::{Statistic, StatisticsRequest};

/// Whether [`ParticleEnsemble::extract_slices`] appends the particles
/// outside the slicing cuts as a trailing sub-ensemble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IncludeUnsliced {
    Always,
    Never,
    #[default]
    IfAny,
}

impl FromStr for IncludeUnsliced {
    type Err = BeamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "always" => Ok(IncludeUnsliced::Always),
            "never" => Ok(IncludeUnsliced::Never),
            "if_any" | "ifAny" => Ok(IncludeUnsliced::IfAny),
            other => Err(BeamError::invalid_option(
                "include_unsliced",
                other,
                &["always", "never", "if_any"],
            )),
        }
    }
}

impl fmt::Display for IncludeUnsliced {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IncludeUnsliced::Always => "always",
            IncludeUnsliced::Never => "never",
            IncludeUnsliced::IfAny => "if_any",
        })
    }
}

/// Where an extracted sub-ensemble came from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SliceInfo {
    Bin {
        z_bin_left: f64,
        z_bin_center: f64,
        z_bin_right: f64,
    },
    Unsliced,
}

#[derive(Debug, Clone)]
pub struct ExtractedSlice {
    pub info: SliceInfo,
    pub ensemble: ParticleEnsemble,
}

#[derive(Debug, Clone)]
pub struct ParticleEnsemble {
    macroparticle_count: usize,
    particles_per_macroparticle: f64,
    charge: f64,
    mass: f64,
    circumference: f64,
    gamma: f64,
    coordinates: BTreeMap<Coordinate, Array1<f64>>,
    identity: Array1<u64>,
    bucket_id: Array1<i32>,
    slice_cache: SliceSetCache,
    version: u64,
    backend: Arc<dyn ComputeBackend>,
}

fn check_finite(value: f64, label: &str) -> BeamResult<()> {
    if !value.is_finite() {
        return Err(BeamError::PhysicsViolation(format!(
            "{label} must be finite, got {value}"
        )));
    }
    Ok(())
}

impl ParticleEnsemble {
    /// Create an ensemble on the default (serial) backend.
    pub fn new<I>(params: &EnsembleParams, coordinates: I) -> BeamResult<Self>
    where
        I: IntoIterator<Item = (Coordinate, Array1<f64>)>,
    {
        Self::with_backend(params, coordinates, default_backend())
    }

    pub fn with_backend<I>(
        params: &EnsembleParams,
        coordinates: I,
        backend: Arc<dyn ComputeBackend>,
    ) -> BeamResult<Self>
    where
        I: IntoIterator<Item = (Coordinate, Array1<f64>)>,
    {
        params.validate()?;
        let n = params.macroparticle_count;
        let mut ensemble = ParticleEnsemble {
            macroparticle_count: n,
            particles_per_macroparticle: params.particles_per_macroparticle,
            charge: params.charge,
            mass: params.mass,
            circumference: params.circumference,
            gamma: params.gamma,
            coordinates: BTreeMap::new(),
            identity: Array1::from_iter(1..=n as u64),
            bucket_id: Array1::from_elem(n, params.bucket_id),
            slice_cache: SliceSetCache::new(),
            version: 0,
            backend,
        };
        ensemble.update(coordinates)?;
        Ok(ensemble)
    }

    /// Same scalars and backend, different particles. Starts with an empty
    /// slice cache.
    fn with_particles(
        &self,
        identity: Array1<u64>,
        bucket_id: Array1<i32>,
        coordinates: BTreeMap<Coordinate, Array1<f64>>,
    ) -> Self {
        ParticleEnsemble {
            macroparticle_count: identity.len(),
            particles_per_macroparticle: self.particles_per_macroparticle,
            charge: self.charge,
            mass: self.mass,
            circumference: self.circumference,
            gamma: self.gamma,
            coordinates,
            identity,
            bucket_id,
            slice_cache: SliceSetCache::new(),
            version: 0,
            backend: Arc::clone(&self.backend),
        }
    }

    fn touch(&mut self) {
        self.version += 1;
        self.slice_cache.clear();
    }

    fn check_length(&self, name: &str, len: usize) -> BeamResult<()> {
        if len != self.macroparticle_count {
            return Err(BeamError::ShapeMismatch {
                name: name.to_string(),
                expected: self.macroparticle_count,
                found: len,
            });
        }
        Ok(())
    }

    // ── Coordinate Arrays ────────────────────────────────────────────

    /// Replace or create coordinate arrays.
    ///
    /// All lengths are checked before anything is written, so a failed call
    /// leaves the ensemble untouched.
    pub fn update<I>(&mut self, coordinates: I) -> BeamResult<()>
    where
        I: IntoIterator<Item = (Coordinate, Array1<f64>)>,
    {
        let incoming: Vec<(Coordinate, Array1<f64>)> = coordinates.into_iter().collect();
        for (coord, values) in &incoming {
            self.check_length(coord.name(), values.len())?;
        }
        if incoming.is_empty() {
            return Ok(());
        }
        for (coord, values) in incoming {
            self.coordinates.insert(coord, values);
        }
        self.touch();
        Ok(())
    }

    /// Like [`update`](Self::update) but refuses to overwrite.
    pub fn add_coordinates<I>(&mut self, coordinates: I) -> BeamResult<()>
    where
        I: IntoIterator<Item = (Coordinate, Array1<f64>)>,
    {
        let incoming: Vec<(Coordinate, Array1<f64>)> = coordinates.into_iter().collect();
        if let Some((coord, _)) = incoming.iter().find(|(c, _)| self.coordinates.contains_key(c)) {
            return Err(BeamError::DuplicateCoordinate(coord.name().to_string()));
        }
        self.update(incoming)
    }

    pub fn has(&self, coord: Coordinate) -> bool {
        self.coordinates.contains_key(&coord)
    }

    /// Names of the arrays currently present, in canonical order.
    pub fn coordinates(&self) -> impl Iterator<Item = Coordinate> + '_ {
        self.coordinates.keys().copied()
    }

    pub fn coordinate(&self, coord: Coordinate) -> BeamResult<ArrayView1<'_, f64>> {
        self.coordinates
            .get(&coord)
            .map(Array1::view)
            .ok_or_else(|| BeamError::MissingCoordinate(coord.name().to_string()))
    }

    /// Mutable access to one array. Counts as a mutation even if nothing is
    /// written.
    pub fn coordinate_mut(&mut self, coord: Coordinate) -> BeamResult<ArrayViewMut1<'_, f64>> {
        if !self.has(coord) {
            return Err(BeamError::MissingCoordinate(coord.name().to_string()));
        }
        self.touch();
        self.coordinates
            .get_mut(&coord)
            .map(Array1::view_mut)
            .ok_or_else(|| BeamError::MissingCoordinate(coord.name().to_string()))
    }

    /// `coord += alpha * x` on the injected backend.
    pub fn axpy(&mut self, coord: Coordinate, alpha: f64, x: ArrayView1<f64>) -> BeamResult<()> {
        self.check_length(coord.name(), x.len())?;
        let target = self
            .coordinates
            .get_mut(&coord)
            .ok_or_else(|| BeamError::MissingCoordinate(coord.name().to_string()))?;
        self.backend.axpy(target.view_mut(), alpha, x);
        self.touch();
        Ok(())
    }

    /// Longitudinal position in the beam rest frame, `z * gamma`.
    pub fn z_beamframe(&self) -> BeamResult<Array1<f64>> {
        let gamma = self.gamma;
        Ok(self.coordinate(Coordinate::Z)?.mapv(|z| z * gamma))
    }

    pub fn set_z_beamframe(&mut self, values: ArrayView1<f64>) -> BeamResult<()> {
        let gamma = self.gamma;
        self.update([(Coordinate::Z, values.mapv(|v| v / gamma))])
    }

    pub fn identity(&self) -> ArrayView1<'_, u64> {
        self.identity.view()
    }

    pub fn bucket_id(&self) -> ArrayView1<'_, i32> {
        self.bucket_id.view()
    }

    pub fn set_bucket_ids(&mut self, bucket_id: Array1<i32>) -> BeamResult<()> {
        self.check_length("bucket_id", bucket_id.len())?;
        self.bucket_id = bucket_id;
        Ok(())
    }

    // ── Reordering ───────────────────────────────────────────────────

    /// Apply `out[i] = in[permutation[i]]` to identity, bucket tags and every
    /// coordinate not listed in `except_for`.
    pub fn reorder(&mut self, permutation: &[usize], except_for: &[Coordinate]) -> BeamResult<()> {
        let n = self.macroparticle_count;
        if permutation.len() != n {
            return Err(BeamError::InvalidPermutation(format!(
                "length {} does not match macroparticle_count {n}",
                permutation.len()
            )));
        }
        let mut seen = vec![false; n];
        for &p in permutation {
            if p >= n || seen[p] {
                return Err(BeamError::InvalidPermutation(format!(
                    "index {p} is out of range or repeated"
                )));
            }
            seen[p] = true;
        }

        let backend = Arc::clone(&self.backend);
        self.identity = backend.gather_u64(self.identity.view(), permutation);
        self.bucket_id = backend.gather_i32(self.bucket_id.view(), permutation);
        for (coord, values) in self.coordinates.iter_mut() {
            if except_for.contains(coord) {
                continue;
            }
            *values = backend.gather_f64(values.view(), permutation);
        }
        self.touch();
        log::trace!("reordered {n} macroparticles on {} backend", backend.name());
        Ok(())
    }

    /// Stable ascending sort of every array by one coordinate.
    pub fn sort_by(&mut self, coord: Coordinate) -> BeamResult<()> {
        let order = self.backend.argsort_f64(self.coordinate(coord)?);
        self.reorder(&order, &[])
    }

    /// Deep copy of the particles at `indices`, in that order.
    fn select(&self, indices: &[usize]) -> ParticleEnsemble {
        let backend = &self.backend;
        let coordinates: BTreeMap<Coordinate, Array1<f64>> = self
            .coordinates
            .iter()
            .map(|(&coord, values)| (coord, backend.gather_f64(values.view(), indices)))
            .collect();
        self.with_particles(
            backend.gather_u64(self.identity.view(), indices),
            backend.gather_i32(self.bucket_id.view(), indices),
            coordinates,
        )
    }

    // ── Buckets ──────────────────────────────────────────────────────

    /// One sub-ensemble per distinct bucket id, highest id first.
    ///
    /// Every bucket must hold the same number of particles.
    pub fn split(&self) -> BeamResult<Vec<ParticleEnsemble>> {
        let ids: BTreeSet<i32> = self.bucket_id.iter().copied().collect();
        if ids.len() <= 1 {
            return Ok(vec![self.clone()]);
        }

        let mut buckets = Vec::with_capacity(ids.len());
        let mut bucket_size = None;
        for &id in ids.iter().rev() {
            let indices: Vec<usize> = self
                .bucket_id
                .iter()
                .enumerate()
                .filter_map(|(i, &b)| (b == id).then_some(i))
                .collect();
            let expected = *bucket_size.get_or_insert(indices.len());
            if indices.len() != expected {
                return Err(BeamError::UnequalBuckets {
                    bucket_id: id,
                    expected,
                    found: indices.len(),
                });
            }
            buckets.push(self.select(&indices));
        }
        log::debug!(
            "split {} macroparticles into {} buckets",
            self.macroparticle_count,
            buckets.len()
        );
        Ok(buckets)
    }

    /// Concatenate `other` after `self`. Scalars are taken from `self`.
    pub fn merge(&self, other: &ParticleEnsemble) -> BeamResult<ParticleEnsemble> {
        if !self.coordinates.keys().eq(other.coordinates.keys()) {
            let names = |e: &ParticleEnsemble| {
                e.coordinates().map(Coordinate::name).collect::<Vec<_>>().join(", ")
            };
            return Err(BeamError::IncompatibleEnsemble(format!(
                "coordinate sets differ: {{{}}} vs {{{}}}",
                names(self),
                names(other)
            )));
        }
        let coordinates: BTreeMap<Coordinate, Array1<f64>> = self
            .coordinates
            .iter()
            .map(|(&coord, a)| {
                let b = &other.coordinates[&coord];
                (coord, a.iter().chain(b.iter()).copied().collect::<Array1<f64>>())
            })
            .collect();
        Ok(self.with_particles(
            self.identity.iter().chain(other.identity.iter()).copied().collect(),
            self.bucket_id.iter().chain(other.bucket_id.iter()).copied().collect(),
            coordinates,
        ))
    }

    /// Left fold of [`merge`](Self::merge) over a list of ensembles.
    pub fn merge_all<'a, I>(ensembles: I) -> BeamResult<ParticleEnsemble>
    where
        I: IntoIterator<Item = &'a ParticleEnsemble>,
    {
        let mut iter = ensembles.into_iter();
        let first = iter.next().ok_or_else(|| {
            BeamError::IncompatibleEnsemble("cannot merge an empty list of ensembles".to_string())
        })?;
        iter.try_fold(first.clone(), |acc, next| acc.merge(next))
    }

    // ── Slicing ──────────────────────────────────────────────────────

    /// Slice set for `slicer` at the current state.
    ///
    /// A cached set is reused only when no statistics are requested.
    pub fn get_slices(
        &mut self,
        slicer: &dyn Slicer,
        statistics: &StatisticsRequest,
    ) -> BeamResult<Arc<SliceSet>> {
        if statistics.is_none() {
            if let Some(hit) = self.slice_cache.get(slicer.id(), self.version) {
                return Ok(hit);
            }
        }
        let slice_set = Arc::new(slicer.slice(self, statistics)?);
        self.slice_cache
            .insert(slicer.id(), self.version, Arc::clone(&slice_set));
        log::trace!(
            "sliced {} macroparticles into {} bins ({} outside cuts)",
            self.macroparticle_count,
            slice_set.n_slices(),
            slice_set.particles_outside_cuts().len()
        );
        Ok(slice_set)
    }

    pub fn clear_slice_cache(&mut self) {
        self.slice_cache.clear();
    }

    pub fn cached_slice_count(&self) -> usize {
        self.slice_cache.len()
    }

    /// Per-slice statistic attached to the valid cached set of `slicer`.
    pub fn cached_slice_statistics(&self, slicer: SlicerId, statistic: Statistic) -> BeamResult<Vec<f64>> {
        let slice_set = self.slice_cache.get(slicer, self.version).ok_or_else(|| {
            BeamError::UnslicedState(format!("no valid slice set cached for slicer {}", slicer.value()))
        })?;
        slice_set
            .statistic(statistic)
            .map(<[f64]>::to_vec)
            .ok_or_else(|| {
                BeamError::UnslicedState(format!("statistic {statistic} was not computed"))
            })
    }

    /// Deep-copied sub-ensemble per longitudinal bin, optionally followed by
    /// the particles outside the cuts.
    pub fn extract_slices(
        &mut self,
        slicer: &dyn Slicer,
        include_unsliced: IncludeUnsliced,
    ) -> BeamResult<Vec<ExtractedSlice>> {
        let slice_set = self.get_slices(slicer, &StatisticsRequest::None)?;
        let bins = slice_set.z_bins();
        let mut out = Vec::with_capacity(slice_set.n_slices() + 1);
        for k in 0..slice_set.n_slices() {
            out.push(ExtractedSlice {
                info: SliceInfo::Bin {
                    z_bin_left: bins[k],
                    z_bin_center: 0.5 * (bins[k] + bins[k + 1]),
                    z_bin_right: bins[k + 1],
                },
                ensemble: self.select(slice_set.particle_indices_of_slice(k)),
            });
        }

        let outside = slice_set.particles_outside_cuts();
        let append = match include_unsliced {
            IncludeUnsliced::Always => true,
            IncludeUnsliced::Never => false,
            IncludeUnsliced::IfAny => !outside.is_empty(),
        };
        if append {
            out.push(ExtractedSlice {
                info: SliceInfo::Unsliced,
                ensemble: self.select(outside),
            });
        }
        Ok(out)
    }

    // ── Weights ──────────────────────────────────────────────────────

    pub fn macroparticle_count(&self) -> usize {
        self.macroparticle_count
    }

    pub fn particles_per_macroparticle(&self) -> f64 {
        self.particles_per_macroparticle
    }

    pub fn intensity(&self) -> f64 {
        self.particles_per_macroparticle * self.macroparticle_count as f64
    }

    /// Rescale the macro-particle weight to reach `intensity`.
    pub fn set_intensity(&mut self, intensity: f64) -> BeamResult<()> {
        check_finite(intensity, "intensity")?;
        if intensity < 0.0 || self.macroparticle_count == 0 {
            return Err(BeamError::PhysicsViolation(format!(
                "cannot set intensity {intensity} on {} macroparticles",
                self.macroparticle_count
            )));
        }
        self.particles_per_macroparticle = intensity / self.macroparticle_count as f64;
        Ok(())
    }

    pub fn charge(&self) -> f64 {
        self.charge
    }

    pub fn charge_per_macroparticle(&self) -> f64 {
        self.particles_per_macroparticle * self.charge
    }

    pub fn mass(&self) -> f64 {
        self.mass
    }

    pub fn circumference(&self) -> f64 {
        self.circumference
    }

    // ── Kinematics ───────────────────────────────────────────────────

    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    pub fn beta(&self) -> f64 {
        (1.0 - 1.0 / (self.gamma * self.gamma)).sqrt()
    }

    pub fn beta_gamma(&self) -> f64 {
        (self.gamma * self.gamma - 1.0).sqrt()
    }

    /// Reference momentum [kg m/s].
    pub fn p0(&self) -> f64 {
        self.beta_gamma() * self.mass * SPEED_OF_LIGHT
    }

    pub fn set_gamma(&mut self, gamma: f64) -> BeamResult<()> {
        check_finite(gamma, "gamma")?;
        if gamma < 1.0 {
            return Err(BeamError::PhysicsViolation(format!(
                "gamma must be >= 1, got {gamma}"
            )));
        }
        self.gamma = gamma;
        Ok(())
    }

    pub fn set_beta(&mut self, beta: f64) -> BeamResult<()> {
        check_finite(beta, "beta")?;
        if !(0.0..1.0).contains(&beta) {
            return Err(BeamError::PhysicsViolation(format!(
                "beta must lie in [0, 1), got {beta}"
            )));
        }
        self.set_gamma(1.0 / (1.0 - beta * beta).sqrt())
    }

    pub fn set_beta_gamma(&mut self, beta_gamma: f64) -> BeamResult<()> {
        check_finite(beta_gamma, "beta_gamma")?;
        if beta_gamma < 0.0 {
            return Err(BeamError::PhysicsViolation(format!(
                "beta_gamma must be >= 0, got {beta_gamma}"
            )));
        }
        self.set_gamma((beta_gamma * beta_gamma + 1.0).sqrt())
    }

    pub fn set_p0(&mut self, p0: f64) -> BeamResult<()> {
        check_finite(p0, "p0")?;
        if p0 < 0.0 {
            return Err(BeamError::PhysicsViolation(format!("p0 must be >= 0, got {p0}")));
        }
        let reduced = p0 / (self.mass * SPEED_OF_LIGHT);
        self.set_gamma((1.0 + reduced * reduced).sqrt())
    }

    // ── Bookkeeping ──────────────────────────────────────────────────

    /// Bumped on every coordinate mutation.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn backend(&self) -> &Arc<dyn ComputeBackend> {
        &self.backend
    }

    pub fn set_backend(&mut self, backend: Arc<dyn ComputeBackend>) {
        self.backend = backend;
    }
}

impl Add<&ParticleEnsemble> for &ParticleEnsemble {
    type Output = BeamResult<ParticleEnsemble>;

    fn add(self, rhs: &ParticleEnsemble) -> Self::Output {
        self.merge(rhs)
    }
}
