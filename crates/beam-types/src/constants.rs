// ─────────────────────────────────────────────────────────────────────
// SCPN Beam Dynamics — Constants
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
/// Speed of light in vacuum (m/s), exact SI value.
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// Elementary charge (C)
pub const ELEMENTARY_CHARGE: f64 = 1.602176634e-19;

/// Vacuum permittivity (F/m)
pub const EPSILON_0: f64 = 8.8541878128e-12;

/// Proton rest mass (kg)
pub const PROTON_MASS: f64 = 1.67262192369e-27;

/// Electron rest mass (kg)
pub const ELECTRON_MASS: f64 = 9.1093837015e-31;
