/*
 * Apsis Astrodynamics Toolkit
 * Copyright (C) 2024-onward the Apsis contributors (cf. AUTHORS.md)
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use core::fmt;

use hifitime::Epoch;
use serde_derive::{Deserialize, Serialize};
use snafu::ensure;

use super::coe::ClassicalElements;
use super::PhysicsResult;
use crate::errors::{PhysicsError, RadiusSnafu, RetrogradeSingularitySnafu};
use crate::frames::Frame;
use crate::math::angles::between_0_360;
use crate::math::anomalies::AnomalyKind;
use crate::math::cartesian::CartesianState;
use crate::math::Vector3;

/// Modified equinoctial elements, non-singular for circular and equatorial
/// (prograde) orbits.
///
/// `p_km` is the semi-latus rectum; `f`/`g` carry the eccentricity vector,
/// `h`/`k` the inclination vector (`tan(i/2)`), and the true longitude is
/// `L = raan + aop + true anomaly`. The parameterization is singular at
/// i = 180 deg.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EquinoctialElements {
    pub p_km: f64,
    pub f: f64,
    pub g: f64,
    pub h: f64,
    pub k: f64,
    pub true_longitude_deg: f64,
}

impl EquinoctialElements {
    pub fn try_new(
        p_km: f64,
        f: f64,
        g: f64,
        h: f64,
        k: f64,
        true_longitude_deg: f64,
    ) -> PhysicsResult<Self> {
        ensure!(
            p_km > 0.0,
            RadiusSnafu {
                action: "semi-latus rectum must be strictly positive"
            }
        );
        Ok(Self {
            p_km,
            f,
            g,
            h,
            k,
            true_longitude_deg: between_0_360(true_longitude_deg),
        })
    }

    /// Eccentricity of the orbit (no unit).
    pub fn ecc(&self) -> f64 {
        (self.f.powi(2) + self.g.powi(2)).sqrt()
    }

    /// Inclination of the orbit, in degrees.
    pub fn inc_deg(&self) -> f64 {
        (2.0 * (self.h.powi(2) + self.k.powi(2)).sqrt().atan()).to_degrees()
    }

    /// Semi-major axis, in km.
    pub fn sma_km(&self) -> f64 {
        self.p_km / (1.0 - self.f.powi(2) - self.g.powi(2))
    }

    /// Converts a classical element set into equinoctial elements.
    pub fn from_classical(coe: &ClassicalElements) -> PhysicsResult<Self> {
        ensure!(
            180.0 - coe.inc_deg > 1e-9,
            RetrogradeSingularitySnafu {
                inc_deg: coe.inc_deg
            }
        );
        let aop_raan_rad = (coe.aop_deg + coe.raan_deg).to_radians();
        let raan_rad = coe.raan_deg.to_radians();
        let tan_half_inc = (coe.inc_deg.to_radians() / 2.0).tan();
        Self::try_new(
            coe.semi_latus_rectum_km(),
            coe.ecc * aop_raan_rad.cos(),
            coe.ecc * aop_raan_rad.sin(),
            tan_half_inc * raan_rad.cos(),
            tan_half_inc * raan_rad.sin(),
            coe.raan_deg + coe.aop_deg + coe.true_anomaly_deg()?,
        )
    }

    /// Converts these elements into a classical element set storing its true
    /// anomaly.
    pub fn to_classical(&self) -> PhysicsResult<ClassicalElements> {
        let ecc = self.ecc();
        ensure!(
            ecc < 1.0,
            RadiusSnafu {
                action: "equinoctial eccentricity vector describes a non-elliptic orbit"
            }
        );
        let sma_km = self.sma_km();
        let inc_deg = self.inc_deg();
        let raan_deg = self.k.atan2(self.h).to_degrees();
        let aop_plus_raan_deg = self.g.atan2(self.f).to_degrees();
        let aop_deg = aop_plus_raan_deg - raan_deg;
        let ta_deg = self.true_longitude_deg - aop_plus_raan_deg;

        ClassicalElements::try_new(
            sma_km,
            ecc,
            inc_deg,
            raan_deg,
            aop_deg,
            ta_deg,
            AnomalyKind::True,
        )
    }

    /// Derives the equinoctial elements of the provided Cartesian state.
    ///
    /// The inclination vector comes from the normalized angular momentum
    /// (singular for the exactly retrograde orbit), and the eccentricity
    /// vector is projected onto the equinoctial in-plane basis.
    pub fn from_cartesian(state: &CartesianState) -> PhysicsResult<Self> {
        let mu_km3_s2 = state.frame.mu_km3_s2()?;
        let r = state.radius_km;
        let v = state.velocity_km_s;

        let h_vec = r.cross(&v);
        ensure!(
            h_vec.norm() > f64::EPSILON,
            RadiusSnafu {
                action: "cannot derive equinoctial elements from a rectilinear state"
            }
        );
        let h_hat = h_vec / h_vec.norm();
        let p_km = h_vec.norm_squared() / mu_km3_s2;

        ensure!(
            (1.0 + h_hat[2]).abs() > 1e-12,
            RetrogradeSingularitySnafu { inc_deg: 180.0 }
        );
        let k = h_hat[0] / (1.0 + h_hat[2]);
        let h = -h_hat[1] / (1.0 + h_hat[2]);

        let e_vec = ((v.norm_squared() - mu_km3_s2 / r.norm()) * r - r.dot(&v) * v) / mu_km3_s2;

        let s_sq = 1.0 + h.powi(2) + k.powi(2);
        let f_hat = Vector3::new(
            1.0 - k.powi(2) + h.powi(2),
            2.0 * h * k,
            -2.0 * k,
        ) / s_sq;
        let g_hat = Vector3::new(
            2.0 * h * k,
            1.0 + k.powi(2) - h.powi(2),
            2.0 * h,
        ) / s_sq;

        let f = e_vec.dot(&f_hat);
        let g = e_vec.dot(&g_hat);
        let true_longitude_deg = r.dot(&g_hat).atan2(r.dot(&f_hat)).to_degrees();

        Self::try_new(p_km, f, g, h, k, true_longitude_deg)
    }

    /// Converts these elements to a Cartesian state, through the classical set.
    pub fn to_cartesian(&self, epoch: Epoch, frame: Frame) -> PhysicsResult<CartesianState> {
        self.to_classical()?.to_cartesian(epoch, frame)
    }
}

impl TryFrom<&ClassicalElements> for EquinoctialElements {
    type Error = PhysicsError;

    fn try_from(coe: &ClassicalElements) -> PhysicsResult<Self> {
        Self::from_classical(coe)
    }
}

impl fmt::Display for EquinoctialElements {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let decimals = f.precision().unwrap_or(6);
        write!(
            f,
            "p = {:.*} km\tf = {:.*}\tg = {:.*}\th = {:.*}\tk = {:.*}\tL = {:.*} deg",
            decimals,
            self.p_km,
            decimals,
            self.f,
            decimals,
            self.g,
            decimals,
            self.h,
            decimals,
            self.k,
            decimals,
            self.true_longitude_deg,
        )
    }
}

#[cfg(test)]
mod mee_ut {
    use super::*;
    use crate::constants::frames::EARTH_J2000;
    use crate::f64_eq_tol;
    use rstest::rstest;

    fn epoch() -> Epoch {
        Epoch::from_gregorian_utc_at_midnight(2018, 1, 1)
    }

    #[rstest]
    #[case(7000.0, 0.01, 45.0, 30.0, 20.0, 10.0)]
    #[case(7000.0, 0.0, 0.0, 0.0, 0.0, 150.0)] // circular equatorial: non-singular here
    #[case(26560.0, 0.01, 55.0, 120.0, 270.0, 80.0)]
    #[case(24396.0, 0.7283, 7.0, 194.0, 178.0, 20.0)]
    fn classical_round_trip(
        #[case] sma_km: f64,
        #[case] ecc: f64,
        #[case] inc_deg: f64,
        #[case] raan_deg: f64,
        #[case] aop_deg: f64,
        #[case] ta_deg: f64,
    ) {
        let coe =
            ClassicalElements::try_keplerian(sma_km, ecc, inc_deg, raan_deg, aop_deg, ta_deg)
                .unwrap();
        let mee = EquinoctialElements::from_classical(&coe).unwrap();
        let back = mee.to_classical().unwrap();

        f64_eq_tol!(back.sma_km, sma_km, sma_km * 1e-9, "sma round trip");
        f64_eq_tol!(back.ecc, ecc, 1e-9, "ecc round trip");
        f64_eq_tol!(back.inc_deg, inc_deg, 1e-9, "inc round trip");
        // Individual angles may shift by the degenerate-geometry conventions,
        // but the true longitude is well defined.
        f64_eq_tol!(
            between_0_360(back.raan_deg + back.aop_deg + back.anomaly_deg),
            between_0_360(raan_deg + aop_deg + ta_deg),
            1e-7,
            "true longitude round trip"
        );
    }

    #[rstest]
    #[case(7000.0, 0.001, 98.7, 110.0, 90.0, 35.0)]
    #[case(42164.0, 0.0003, 0.1, 20.0, 10.0, 200.0)]
    fn cartesian_round_trip(
        #[case] sma_km: f64,
        #[case] ecc: f64,
        #[case] inc_deg: f64,
        #[case] raan_deg: f64,
        #[case] aop_deg: f64,
        #[case] ta_deg: f64,
    ) {
        let coe =
            ClassicalElements::try_keplerian(sma_km, ecc, inc_deg, raan_deg, aop_deg, ta_deg)
                .unwrap();
        let cartesian = coe.to_cartesian(epoch(), EARTH_J2000).unwrap();
        let mee = EquinoctialElements::from_cartesian(&cartesian).unwrap();
        let back = mee.to_cartesian(epoch(), EARTH_J2000).unwrap();

        assert!(back.rss_radius_km(&cartesian).unwrap() < 1e-6);
        assert!(back.rms_velocity_km_s(&cartesian).unwrap() < 1e-9);

        f64_eq_tol!(mee.ecc(), ecc, 1e-9, "eccentricity from cartesian");
        f64_eq_tol!(mee.inc_deg(), inc_deg, 1e-9, "inclination from cartesian");
        f64_eq_tol!(
            mee.p_km,
            coe.semi_latus_rectum_km(),
            1e-6,
            "semi-latus rectum"
        );
    }

    #[test]
    fn retrograde_singularity() {
        let coe = ClassicalElements::try_keplerian(7000.0, 0.0, 180.0, 0.0, 0.0, 0.0).unwrap();
        assert!(matches!(
            EquinoctialElements::from_classical(&coe),
            Err(PhysicsError::RetrogradeSingularity { .. })
        ));
    }
}
