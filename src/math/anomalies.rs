/*
 * Apsis Astrodynamics Toolkit
 * Copyright (C) 2024-onward the Apsis contributors (cf. AUTHORS.md)
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use core::f64::consts::TAU;
use core::fmt;

use serde_derive::{Deserialize, Serialize};

use crate::astro::PhysicsResult;
use crate::errors::{MathError, PhysicsError};
use crate::math::angles::between_0_tau;

/// Default tolerance on the eccentric anomaly when inverting Kepler's equation, in radians.
pub const KEPLER_TOLERANCE_RAD: f64 = 1e-12;

/// The kind of anomaly stored in an orbital element set.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnomalyKind {
    True,
    Mean,
    Eccentric,
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::True => write!(f, "true anomaly"),
            Self::Mean => write!(f, "mean anomaly"),
            Self::Eccentric => write!(f, "eccentric anomaly"),
        }
    }
}

/// Converts a true anomaly to the eccentric anomaly via the half-angle tangent identity.
pub fn eccentric_from_true_rad(ta_rad: f64, ecc: f64) -> PhysicsResult<f64> {
    ensure_elliptic(ecc, "converting the true anomaly to the eccentric anomaly")?;
    let half_tan = ((1.0 - ecc) / (1.0 + ecc)).sqrt() * (ta_rad / 2.0).tan();
    Ok(between_0_tau(2.0 * half_tan.atan()))
}

/// Converts an eccentric anomaly to the true anomaly via the half-angle tangent identity.
pub fn true_from_eccentric_rad(ea_rad: f64, ecc: f64) -> PhysicsResult<f64> {
    ensure_elliptic(ecc, "converting the eccentric anomaly to the true anomaly")?;
    let half_tan = ((1.0 + ecc) / (1.0 - ecc)).sqrt() * (ea_rad / 2.0).tan();
    Ok(between_0_tau(2.0 * half_tan.atan()))
}

/// Converts an eccentric anomaly to the mean anomaly via Kepler's equation.
pub fn mean_from_eccentric_rad(ea_rad: f64, ecc: f64) -> f64 {
    between_0_tau(ea_rad - ecc * ea_rad.sin())
}

/// Inverts Kepler's equation: eccentric anomaly from mean anomaly.
///
/// Uses a cubic starter (Danby) followed by third-order corrections of
/// Newton's iteration on `s = E - e sin E - M`. Only near-parabolic inputs
/// fail to converge within the iteration bound.
pub fn eccentric_from_mean_rad(ma_rad: f64, ecc: f64, tolerance_rad: f64) -> PhysicsResult<f64> {
    ensure_elliptic(ecc, "inverting Kepler's equation")?;

    // Danby cubic starter.
    let starter = |e: f64, m: f64| -> f64 {
        let e_sq = e * e;
        let e_cub = e * e_sq;
        let cos_m = m.cos();
        m + (-0.5 * e_cub + e + (e_sq + 1.5 * cos_m * e_cub) * cos_m) * m.sin()
    };

    // Third-order correction of Newton's iteration.
    let correction = |e: f64, m: f64, x: f64| -> f64 {
        let cos_x = x.cos();
        let sp = -1.0 + e * cos_x; // -s'
        let sin_x = x.sin();
        let spp = e * sin_x; // s''
        let s = -x + spp + m; // -s
        let halley = s / (0.5 * s * spp / sp + sp);
        s / (((0.5 * sin_x) - ((1.0 / 6.0) * cos_x * halley)) * e * halley + sp)
    };

    let m_norm = ma_rad % TAU;

    let mut ea = starter(ecc, m_norm);
    let mut delta = tolerance_rad + 1.0;
    let mut iter: usize = 0;

    while delta > tolerance_rad {
        let next = ea - correction(ecc, m_norm, ea);
        delta = (next - ea).abs();
        ea = next;

        iter += 1;
        if iter > 1000 {
            return Err(PhysicsError::AppliedMath {
                source: MathError::MaxIterationsReached {
                    iter,
                    action: "inverting Kepler's equation (nearly parabolic input?)",
                },
            });
        }
    }

    Ok(between_0_tau(ea))
}

/// Converts a mean anomaly to the true anomaly.
pub fn true_from_mean_rad(ma_rad: f64, ecc: f64, tolerance_rad: f64) -> PhysicsResult<f64> {
    true_from_eccentric_rad(eccentric_from_mean_rad(ma_rad, ecc, tolerance_rad)?, ecc)
}

/// Converts a true anomaly to the mean anomaly.
pub fn mean_from_true_rad(ta_rad: f64, ecc: f64) -> PhysicsResult<f64> {
    Ok(mean_from_eccentric_rad(
        eccentric_from_true_rad(ta_rad, ecc)?,
        ecc,
    ))
}

/// Converts an anomaly between two kinds, in radians.
pub fn convert_anomaly_rad(
    anomaly_rad: f64,
    ecc: f64,
    from: AnomalyKind,
    to: AnomalyKind,
    tolerance_rad: f64,
) -> PhysicsResult<f64> {
    match (from, to) {
        (AnomalyKind::True, AnomalyKind::True)
        | (AnomalyKind::Mean, AnomalyKind::Mean)
        | (AnomalyKind::Eccentric, AnomalyKind::Eccentric) => Ok(between_0_tau(anomaly_rad)),
        (AnomalyKind::True, AnomalyKind::Eccentric) => eccentric_from_true_rad(anomaly_rad, ecc),
        (AnomalyKind::True, AnomalyKind::Mean) => mean_from_true_rad(anomaly_rad, ecc),
        (AnomalyKind::Eccentric, AnomalyKind::True) => true_from_eccentric_rad(anomaly_rad, ecc),
        (AnomalyKind::Eccentric, AnomalyKind::Mean) => {
            Ok(mean_from_eccentric_rad(anomaly_rad, ecc))
        }
        (AnomalyKind::Mean, AnomalyKind::True) => {
            true_from_mean_rad(anomaly_rad, ecc, tolerance_rad)
        }
        (AnomalyKind::Mean, AnomalyKind::Eccentric) => {
            eccentric_from_mean_rad(anomaly_rad, ecc, tolerance_rad)
        }
    }
}

fn ensure_elliptic(ecc: f64, action: &'static str) -> PhysicsResult<()> {
    if !(0.0..1.0).contains(&ecc) {
        Err(PhysicsError::AppliedMath {
            source: MathError::DomainError {
                value: ecc,
                msg: action,
            },
        })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod anomalies_ut {
    use super::*;
    use crate::f64_eq_tol;
    use rstest::rstest;

    #[rstest]
    #[case(0.0)]
    #[case(0.1)]
    #[case(0.5)]
    #[case(0.85)]
    #[case(0.989)]
    fn anomaly_round_trips(#[case] ecc: f64) {
        let mut ta = 0.0;
        while ta < TAU {
            let ea = eccentric_from_true_rad(ta, ecc).unwrap();
            let ma = mean_from_eccentric_rad(ea, ecc);
            let ea_back = eccentric_from_mean_rad(ma, ecc, KEPLER_TOLERANCE_RAD).unwrap();
            let ta_back = true_from_eccentric_rad(ea_back, ecc).unwrap();
            f64_eq_tol!(ta_back, between_0_tau(ta), 1e-9, "true anomaly round trip");
            ta += 0.05;
        }
    }

    #[test]
    fn kepler_identity() {
        // For a circular orbit all anomalies coincide.
        for ma in [0.0, 0.5, 2.5, 4.0] {
            let ea = eccentric_from_mean_rad(ma, 0.0, KEPLER_TOLERANCE_RAD).unwrap();
            f64_eq_tol!(ea, ma, 1e-12, "circular anomalies coincide");
        }
    }

    #[test]
    fn hyperbolic_input_rejected() {
        assert!(eccentric_from_mean_rad(1.0, 1.3, KEPLER_TOLERANCE_RAD).is_err());
        assert!(eccentric_from_true_rad(1.0, -0.1).is_err());
    }

    #[test]
    fn anomaly_kind_conversions() {
        let ecc = 0.2;
        let ta = 1.234;
        let ma = convert_anomaly_rad(
            ta,
            ecc,
            AnomalyKind::True,
            AnomalyKind::Mean,
            KEPLER_TOLERANCE_RAD,
        )
        .unwrap();
        let ta_back = convert_anomaly_rad(
            ma,
            ecc,
            AnomalyKind::Mean,
            AnomalyKind::True,
            KEPLER_TOLERANCE_RAD,
        )
        .unwrap();
        f64_eq_tol!(ta_back, ta, 1e-10, "kind conversion round trip");
    }
}
