// ─────────────────────────────────────────────────────────────────────
// SCPN Beam Dynamics — Property-Based Tests (proptest) for beam-core
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Property-based tests for the particle ensemble.
//!
//! Covers: shape invariants, reorder bijection, split/merge round trip,
//! kinematic consistency, slice extraction and cache invalidation.

use std::collections::HashMap;
use std::sync::Arc;

use beam_core::coordinate::Coordinate;
use beam_core::ensemble::{IncludeUnsliced, ParticleEnsemble, SliceInfo};
use beam_core::slicing::UniformBinSlicer;
use beam_core::statistics::StatisticsRequest;
use beam_math::backend::RayonBackend;
use beam_types::config::{EnsembleParams, SliceCuts, SliceMode};
use beam_types::constants::{ELEMENTARY_CHARGE, PROTON_MASS};
use beam_types::error::BeamError;
use ndarray::Array1;
use proptest::prelude::*;

fn params(n: usize) -> EnsembleParams {
    EnsembleParams {
        macroparticle_count: n,
        particles_per_macroparticle: 1e10,
        charge: ELEMENTARY_CHARGE,
        mass: PROTON_MASS,
        circumference: 157.08,
        gamma: 1.5,
        bucket_id: 0,
    }
}

fn ensemble_from(x: Vec<f64>, z: Vec<f64>) -> ParticleEnsemble {
    let n = x.len();
    ParticleEnsemble::new(
        &params(n),
        [
            (Coordinate::X, Array1::from_vec(x)),
            (Coordinate::Z, Array1::from_vec(z)),
        ],
    )
    .unwrap()
}

fn permutation(n: usize) -> impl Strategy<Value = Vec<usize>> {
    Just((0..n).collect::<Vec<usize>>()).prop_shuffle()
}

fn x_by_identity(e: &ParticleEnsemble) -> HashMap<u64, f64> {
    let x = e.coordinate(Coordinate::X).unwrap();
    e.identity().iter().copied().zip(x.iter().copied()).collect()
}

// ── Shape Invariants ─────────────────────────────────────────────────

proptest! {
    /// Any array whose length differs from the count is rejected.
    #[test]
    fn update_rejects_wrong_length(n in 1usize..50, m in 0usize..50) {
        prop_assume!(n != m);
        let mut e = ParticleEnsemble::new(&params(n), []).unwrap();
        let err = e.update([(Coordinate::Y, Array1::zeros(m))]).unwrap_err();
        let is_shape_mismatch = matches!(err, BeamError::ShapeMismatch { .. });
        prop_assert!(is_shape_mismatch);
        prop_assert!(!e.has(Coordinate::Y));
    }
}

// ── Reorder ──────────────────────────────────────────────────────────

proptest! {
    /// Applying P then P⁻¹ restores contents and identity order exactly.
    #[test]
    fn reorder_inverse_restores(
        (x, perm) in (1usize..200).prop_flat_map(|n| {
            (prop::collection::vec(-1.0f64..1.0, n), permutation(n))
        })
    ) {
        let z = x.iter().map(|v| 2.0 * v).collect();
        let mut e = ensemble_from(x, z);
        let original_x = e.coordinate(Coordinate::X).unwrap().to_owned();
        let original_id = e.identity().to_owned();

        let mut inverse = vec![0usize; perm.len()];
        for (i, &p) in perm.iter().enumerate() {
            inverse[p] = i;
        }
        e.reorder(&perm, &[]).unwrap();
        e.reorder(&inverse, &[]).unwrap();

        prop_assert_eq!(e.coordinate(Coordinate::X).unwrap(), original_x.view());
        prop_assert_eq!(e.identity(), original_id.view());
    }

    /// sort_by yields ascending z with identities following their particles.
    #[test]
    fn sort_by_keeps_particles_together(z in prop::collection::vec(-1.0f64..1.0, 1..200)) {
        let x: Vec<f64> = (0..z.len()).map(|i| i as f64).collect();
        let mut e = ensemble_from(x, z);
        e.sort_by(Coordinate::Z).unwrap();
        let sorted = e.coordinate(Coordinate::Z).unwrap();
        for w in sorted.as_slice().unwrap().windows(2) {
            prop_assert!(w[0] <= w[1]);
        }
        let x = e.coordinate(Coordinate::X).unwrap();
        for (id, xi) in e.identity().iter().zip(x.iter()) {
            prop_assert_eq!(*id as f64 - 1.0, *xi);
        }
    }
}

// ── Split / Merge ────────────────────────────────────────────────────

proptest! {
    /// split then merge_all preserves the identity multiset and values.
    #[test]
    fn split_merge_roundtrip(
        per_bucket in 1usize..60,
        n_buckets in 1usize..5,
        seed in any::<u64>(),
    ) {
        let n = per_bucket * n_buckets;
        let x: Vec<f64> = (0..n).map(|i| (i as f64 * 0.37 + seed as f64 * 1e-9).sin()).collect();
        let mut e = ensemble_from(x, vec![0.0; n]);
        let tags: Array1<i32> = (0..n).map(|i| (i % n_buckets) as i32).collect();
        e.set_bucket_ids(tags).unwrap();

        let parts = e.split().unwrap();
        prop_assert_eq!(parts.len(), n_buckets);
        for w in parts.windows(2) {
            prop_assert!(w[0].bucket_id()[0] > w[1].bucket_id()[0]);
        }
        let merged = ParticleEnsemble::merge_all(&parts).unwrap();
        prop_assert_eq!(merged.macroparticle_count(), n);
        prop_assert_eq!(x_by_identity(&merged), x_by_identity(&e));
    }
}

#[test]
fn alternating_buckets_split_in_descending_order() {
    let n = 1000;
    let mut e = ensemble_from(vec![0.0; n], vec![0.0; n]);
    let tags: Array1<i32> = (0..n).map(|i| if i % 2 == 0 { 1 } else { 2 }).collect();
    e.set_bucket_ids(tags).unwrap();

    let parts = e.split().unwrap();
    assert_eq!(parts.len(), 2);
    assert_eq!(parts[0].macroparticle_count(), 500);
    assert_eq!(parts[1].macroparticle_count(), 500);
    assert!(parts[0].bucket_id().iter().all(|&b| b == 2));
    assert!(parts[1].bucket_id().iter().all(|&b| b == 1));
}

// ── Kinematics ───────────────────────────────────────────────────────

proptest! {
    /// Setting p0 and reading it back through gamma is stable.
    #[test]
    fn p0_roundtrip(gamma in 1.0f64..1e4, scale in 0.01f64..100.0) {
        let mut p = params(1);
        p.gamma = gamma;
        let mut e = ParticleEnsemble::new(&p, []).unwrap();
        let target = e.p0() * scale + 1e-21;
        e.set_p0(target).unwrap();
        let gamma_now = e.gamma();
        e.set_gamma(gamma_now).unwrap();
        prop_assert!((e.p0() - target).abs() <= 1e-9 * target);
        let bg = e.beta_gamma();
        prop_assert!((e.beta() * e.gamma() - bg).abs() <= 1e-9 * bg.max(1e-12));
    }
}

// ── Slicing ──────────────────────────────────────────────────────────

proptest! {
    /// extract_slices covers every particle exactly once (with "always").
    #[test]
    fn extract_slices_partitions(z in prop::collection::vec(-2.0f64..2.0, 1..300)) {
        let x: Vec<f64> = (0..z.len()).map(|i| i as f64).collect();
        let mut e = ensemble_from(x, z);
        let slicer = UniformBinSlicer::new(
            8,
            SliceMode::ConstantSpace,
            SliceCuts::Fixed { tail: -1.0, head: 1.0 },
        )
        .unwrap();

        let slices = e.extract_slices(&slicer, IncludeUnsliced::Always).unwrap();
        prop_assert_eq!(slices.len(), 9);
        prop_assert_eq!(slices[8].info, SliceInfo::Unsliced);
        let total: usize = slices.iter().map(|s| s.ensemble.macroparticle_count()).sum();
        prop_assert_eq!(total, e.macroparticle_count());

        let never = e.extract_slices(&slicer, IncludeUnsliced::Never).unwrap();
        prop_assert!(never.iter().all(|s| s.info != SliceInfo::Unsliced));

        let outside = slices[8].ensemble.macroparticle_count();
        let if_any = e.extract_slices(&slicer, IncludeUnsliced::IfAny).unwrap();
        prop_assert_eq!(if_any.len(), if outside > 0 { 9 } else { 8 });
    }

    /// Every mutation path leaves no cached slice set behind.
    #[test]
    fn mutation_invalidates_cache(z in prop::collection::vec(-1.0f64..1.0, 2..100)) {
        let n = z.len();
        let mut e = ensemble_from(vec![0.0; n], z);
        let slicer = UniformBinSlicer::new(
            4,
            SliceMode::ConstantCharge,
            SliceCuts::Fixed { tail: -1.0, head: 1.0 },
        )
        .unwrap();

        let first = e.get_slices(&slicer, &StatisticsRequest::None).unwrap();
        e.update([(Coordinate::Dp, Array1::zeros(n))]).unwrap();
        let second = e.get_slices(&slicer, &StatisticsRequest::None).unwrap();
        prop_assert!(!Arc::ptr_eq(&first, &second));

        e.sort_by(Coordinate::Z).unwrap();
        prop_assert_eq!(e.cached_slice_count(), 0);
        let third = e.get_slices(&slicer, &StatisticsRequest::None).unwrap();
        let again = e.get_slices(&slicer, &StatisticsRequest::None).unwrap();
        prop_assert!(Arc::ptr_eq(&third, &again));
    }
}

#[test]
fn all_particles_outside_cuts() {
    let mut e = ensemble_from(vec![0.0, 1.0], vec![5.0, 6.0]);
    let slicer = UniformBinSlicer::new(
        3,
        SliceMode::ConstantSpace,
        SliceCuts::Fixed { tail: -1.0, head: 1.0 },
    )
    .unwrap();
    let slices = e.extract_slices(&slicer, IncludeUnsliced::IfAny).unwrap();
    assert_eq!(slices.len(), 4);
    assert!(slices[..3].iter().all(|s| s.ensemble.macroparticle_count() == 0));
    assert_eq!(slices[3].ensemble.macroparticle_count(), 2);
}

#[test]
fn rayon_backend_matches_serial_reorder() {
    let x: Vec<f64> = (0..500).map(|i| ((i * 7919) % 500) as f64).collect();
    let z: Vec<f64> = x.iter().map(|v| -v).collect();
    let mut serial = ensemble_from(x.clone(), z.clone());
    let mut parallel = ParticleEnsemble::with_backend(
        &params(500),
        [
            (Coordinate::X, Array1::from_vec(x)),
            (Coordinate::Z, Array1::from_vec(z)),
        ],
        Arc::new(RayonBackend),
    )
    .unwrap();
    serial.sort_by(Coordinate::Z).unwrap();
    parallel.sort_by(Coordinate::Z).unwrap();
    assert_eq!(serial.identity(), parallel.identity());
    assert_eq!(
        serial.coordinate(Coordinate::X).unwrap(),
        parallel.coordinate(Coordinate::X).unwrap()
    );
}
