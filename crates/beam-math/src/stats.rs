//! Sample statistics over phase-space coordinate arrays.
//!
//! Second moments use the unbiased (n - 1) normalisation. Arrays with fewer
//! than two entries have zero spread.
//!
//! The emittance of a plane (u, u') optionally removes the dispersive
//! contribution correlated with the momentum deviation dp:
//!
//!   ε² = (⟨u²⟩ - ⟨u·dp⟩²/⟨dp²⟩)(⟨u'²⟩ - ⟨u'·dp⟩²/⟨dp²⟩) - (⟨u·u'⟩ - ⟨u·dp⟩⟨u'·dp⟩/⟨dp²⟩)²
//!
//! where ⟨·⟩ are centred covariances.

use ndarray::ArrayView1;

pub fn mean(u: ArrayView1<f64>) -> f64 {
    if u.is_empty() {
        return 0.0;
    }
    u.sum() / u.len() as f64
}

/// Centred sample covariance of two equally long arrays.
pub fn cov(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    let n = a.len().min(b.len());
    if n < 2 {
        return 0.0;
    }
    let mean_a = mean(a);
    let mean_b = mean(b);
    let sum: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(&x, &y)| (x - mean_a) * (y - mean_b))
        .sum();
    sum / (n as f64 - 1.0)
}

pub fn std(u: ArrayView1<f64>) -> f64 {
    cov(u, u).max(0.0).sqrt()
}

/// Second moments of a plane with the optional dp correction applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaneMoments {
    pub u_u: f64,
    pub up_up: f64,
    pub u_up: f64,
}

impl PlaneMoments {
    pub fn compute(u: ArrayView1<f64>, up: ArrayView1<f64>, dp: Option<ArrayView1<f64>>) -> Self {
        let mut u_u = cov(u, u);
        let mut up_up = cov(up, up);
        let mut u_up = cov(u, up);

        if let Some(dp) = dp {
            let dp_dp = cov(dp, dp);
            if dp_dp > 0.0 {
                let u_dp = cov(u, dp);
                let up_dp = cov(up, dp);
                u_u -= u_dp * u_dp / dp_dp;
                up_up -= up_dp * up_dp / dp_dp;
                u_up -= u_dp * up_dp / dp_dp;
            }
        }

        PlaneMoments { u_u, up_up, u_up }
    }

    /// Geometric RMS emittance. Round-off can push the determinant slightly
    /// negative for a perfectly correlated plane; that clamps to zero.
    pub fn emittance(&self) -> f64 {
        (self.u_u * self.up_up - self.u_up * self.u_up).max(0.0).sqrt()
    }
}

/// RMS emittance of (u, u'), dp-corrected when `dp` is given.
pub fn emittance(u: ArrayView1<f64>, up: ArrayView1<f64>, dp: Option<ArrayView1<f64>>) -> f64 {
    PlaneMoments::compute(u, up, dp).emittance()
}

/// Linear dispersion ⟨u·dp⟩/⟨dp²⟩; zero without momentum spread.
pub fn dispersion(u: ArrayView1<f64>, dp: ArrayView1<f64>) -> f64 {
    let dp_dp = cov(dp, dp);
    if dp_dp <= 0.0 {
        return 0.0;
    }
    cov(u, dp) / dp_dp
}

/// Twiss alpha. NaN for a zero-emittance plane.
pub fn twiss_alpha(u: ArrayView1<f64>, up: ArrayView1<f64>, dp: Option<ArrayView1<f64>>) -> f64 {
    let m = PlaneMoments::compute(u, up, dp);
    -m.u_up / m.emittance()
}

/// Twiss beta. NaN for a zero-emittance plane.
pub fn twiss_beta(u: ArrayView1<f64>, up: ArrayView1<f64>, dp: Option<ArrayView1<f64>>) -> f64 {
    let m = PlaneMoments::compute(u, up, dp);
    m.u_u / m.emittance()
}

/// Twiss gamma. NaN for a zero-emittance plane.
pub fn twiss_gamma(u: ArrayView1<f64>, up: ArrayView1<f64>, dp: Option<ArrayView1<f64>>) -> f64 {
    let m = PlaneMoments::compute(u, up, dp);
    m.up_up / m.emittance()
}
