// ─────────────────────────────────────────────────────────────────────
// SCPN Beam Dynamics — Core
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Macro-particle ensemble data model.
//!
//! Ensemble arrays and kinematics, longitudinal slicing with a
//! version-keyed slice cache, bucket splitting and beam statistics.

pub mod coordinate;
pub mod ensemble;
pub mod generators;
pub mod slice_cache;
pub mod slicing;
pub mod statistics;

