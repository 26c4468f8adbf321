//! Simple particle distributions for seeding an ensemble.
//!
//! These fill all six phase-space coordinates independently. Matched
//! distributions (optics-aware) live outside this crate.

use beam_types::config::EnsembleParams;
use beam_types::error::{BeamError, BeamResult};
use ndarray::Array1;
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

use crate::coordinate::Coordinate;
use crate::ensemble::ParticleEnsemble;

/// Ensemble with every coordinate set to zero.
pub fn empty(params: &EnsembleParams) -> BeamResult<ParticleEnsemble> {
    let n = params.macroparticle_count;
    ParticleEnsemble::new(params, Coordinate::ALL.map(|c| (c, Array1::zeros(n))))
}

/// Centred Gaussian with the given RMS size per coordinate, in
/// `Coordinate::ALL` order.
pub fn gaussian(params: &EnsembleParams, sigma: [f64; 6]) -> BeamResult<ParticleEnsemble> {
    let mut rng = rand::thread_rng();
    gaussian_with_rng(params, sigma, &mut rng)
}

pub fn gaussian_with_rng<R: Rng + ?Sized>(
    params: &EnsembleParams,
    sigma: [f64; 6],
    rng: &mut R,
) -> BeamResult<ParticleEnsemble> {
    if sigma.iter().any(|s| !s.is_finite() || *s < 0.0) {
        return Err(BeamError::PhysicsViolation(format!(
            "gaussian sigmas must be finite and >= 0, got {sigma:?}"
        )));
    }
    let n = params.macroparticle_count;
    let mut coords = Vec::with_capacity(6);
    for (coord, s) in Coordinate::ALL.into_iter().zip(sigma) {
        let values: Array1<f64> = (0..n)
            .map(|_| {
                let draw: f64 = StandardNormal.sample(rng);
                s * draw
            })
            .collect();
        coords.push((coord, values));
    }
    ParticleEnsemble::new(params, coords)
}

/// Uniform in `[lo, hi)` per coordinate, in `Coordinate::ALL` order.
pub fn uniform(params: &EnsembleParams, ranges: [(f64, f64); 6]) -> BeamResult<ParticleEnsemble> {
    let mut rng = rand::thread_rng();
    uniform_with_rng(params, ranges, &mut rng)
}

pub fn uniform_with_rng<R: Rng + ?Sized>(
    params: &EnsembleParams,
    ranges: [(f64, f64); 6],
    rng: &mut R,
) -> BeamResult<ParticleEnsemble> {
    for (coord, (lo, hi)) in Coordinate::ALL.iter().zip(ranges) {
        if !lo.is_finite() || !hi.is_finite() || hi < lo {
            return Err(BeamError::PhysicsViolation(format!(
                "uniform range for {coord} must be finite with hi >= lo, got [{lo}, {hi})"
            )));
        }
    }
    let n = params.macroparticle_count;
    let mut coords = Vec::with_capacity(6);
    for (coord, (lo, hi)) in Coordinate::ALL.into_iter().zip(ranges) {
        let values: Array1<f64> = (0..n).map(|_| lo + (hi - lo) * rng.gen::<f64>()).collect();
        coords.push((coord, values));
    }
    ParticleEnsemble::new(params, coords)
}

#[cfg(test)]
mod tests {
    use super::*;
    use beam_types::constants::{ELEMENTARY_CHARGE, PROTON_MASS};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn params(n: usize) -> EnsembleParams {
        EnsembleParams {
            macroparticle_count: n,
            particles_per_macroparticle: 1e8,
            charge: ELEMENTARY_CHARGE,
            mass: PROTON_MASS,
            circumference: 6911.5,
            gamma: 27.7,
            bucket_id: 0,
        }
    }

    #[test]
    fn test_empty_has_all_coordinates() {
        let e = empty(&params(10)).unwrap();
        assert_eq!(e.coordinates().count(), 6);
        assert!(e.coordinate(Coordinate::Dp).unwrap().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_gaussian_sigma_matches_request() {
        let mut rng = StdRng::seed_from_u64(7);
        let e = gaussian_with_rng(&params(20_000), [1e-3, 1e-4, 2e-3, 2e-4, 0.1, 1e-3], &mut rng)
            .unwrap();
        let sx = e.sigma(Coordinate::X).unwrap();
        let sz = e.sigma(Coordinate::Z).unwrap();
        assert!((sx - 1e-3).abs() < 5e-5, "sigma_x = {sx}");
        assert!((sz - 0.1).abs() < 5e-3, "sigma_z = {sz}");
        assert!(e.mean(Coordinate::Y).unwrap().abs() < 1e-4);
    }

    #[test]
    fn test_uniform_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(11);
        let ranges = [(-1.0, 1.0), (0.0, 0.0), (0.0, 1.0), (0.0, 0.0), (-0.5, 0.5), (0.0, 0.0)];
        let e = uniform_with_rng(&params(500), ranges, &mut rng).unwrap();
        let x = e.coordinate(Coordinate::X).unwrap();
        assert!(x.iter().all(|&v| (-1.0..1.0).contains(&v)));
        assert!(e.coordinate(Coordinate::Xp).unwrap().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(gaussian_with_rng(&params(3), [-1.0, 0.0, 0.0, 0.0, 0.0, 0.0], &mut rng).is_err());
        let bad = [(1.0, -1.0), (0.0, 0.0), (0.0, 0.0), (0.0, 0.0), (0.0, 0.0), (0.0, 0.0)];
        assert!(uniform_with_rng(&params(3), bad, &mut rng).is_err());
    }
}
