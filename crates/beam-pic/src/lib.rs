// ─────────────────────────────────────────────────────────────────────
// SCPN Beam Dynamics — Beam PIC
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Particle-in-cell space charge for SCPN Beam Dynamics.

pub mod cell_sort;
pub mod field_solver;
pub mod mesh;
pub mod pic;
pub mod space_charge;
