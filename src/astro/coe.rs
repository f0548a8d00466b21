/*
 * Apsis Astrodynamics Toolkit
 * Copyright (C) 2024-onward the Apsis contributors (cf. AUTHORS.md)
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use core::f64::consts::PI;
use core::fmt;

use hifitime::{Duration, Epoch, TimeUnits};
use log::warn;
use serde_derive::{Deserialize, Serialize};
use snafu::ensure;

use super::PhysicsResult;
use crate::environment::SolarGeometry;
use crate::errors::{
    NotQuasiInertialSnafu, ParabolicEccentricitySnafu, ParabolicSemiParamSnafu, PhysicsError,
    RadiusSnafu,
};
use crate::frames::Frame;
use crate::math::angles::{between_0_360, between_0_tau};
use crate::math::anomalies::{convert_anomaly_rad, AnomalyKind, KEPLER_TOLERANCE_RAD};
use crate::math::cartesian::CartesianState;
use crate::math::{Matrix3, Vector3};

/// If an orbit has an eccentricity below the following value, it is considered circular.
pub const ECC_EPSILON: f64 = 1e-11;

/// Inclinations closer to 0 or 180 degrees than this value are considered equatorial.
pub const INC_EPSILON_DEG: f64 = 1e-9;

/// Classical (Keplerian) orbital elements with an explicit anomaly kind.
///
/// Only elliptic orbits are representable: `0 <= ecc < 1`. Angles are stored
/// in degrees, normalized to [0, 360), with the inclination in [0, 180].
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassicalElements {
    pub sma_km: f64,
    pub ecc: f64,
    pub inc_deg: f64,
    pub raan_deg: f64,
    pub aop_deg: f64,
    pub anomaly_deg: f64,
    pub anomaly_kind: AnomalyKind,
}

impl ClassicalElements {
    /// Attempts to build a new element set, validating the elliptic domain.
    #[allow(clippy::too_many_arguments)]
    pub fn try_new(
        sma_km: f64,
        ecc: f64,
        inc_deg: f64,
        raan_deg: f64,
        aop_deg: f64,
        anomaly_deg: f64,
        anomaly_kind: AnomalyKind,
    ) -> PhysicsResult<Self> {
        ensure!(
            (1.0 - ecc).abs() >= ECC_EPSILON,
            ParabolicEccentricitySnafu { limit: ECC_EPSILON }
        );
        if !(0.0..1.0).contains(&ecc) {
            return Err(PhysicsError::AppliedMath {
                source: crate::errors::MathError::DomainError {
                    value: ecc,
                    msg: "eccentricity must be in [0, 1) for an elliptic element set",
                },
            });
        }
        ensure!(
            sma_km > 0.0,
            RadiusSnafu {
                action: "semi-major axis must be strictly positive for an elliptic orbit"
            }
        );
        if !(0.0..=180.0).contains(&inc_deg) {
            return Err(PhysicsError::AppliedMath {
                source: crate::errors::MathError::DomainError {
                    value: inc_deg,
                    msg: "inclination must be in [0, 180] degrees",
                },
            });
        }

        Ok(Self {
            sma_km,
            ecc,
            inc_deg,
            raan_deg: between_0_360(raan_deg),
            aop_deg: between_0_360(aop_deg),
            anomaly_deg: between_0_360(anomaly_deg),
            anomaly_kind,
        })
    }

    /// Shortcut for a set stored with its true anomaly.
    pub fn try_keplerian(
        sma_km: f64,
        ecc: f64,
        inc_deg: f64,
        raan_deg: f64,
        aop_deg: f64,
        ta_deg: f64,
    ) -> PhysicsResult<Self> {
        Self::try_new(
            sma_km,
            ecc,
            inc_deg,
            raan_deg,
            aop_deg,
            ta_deg,
            AnomalyKind::True,
        )
    }

    /// Shortcut for a set stored with its mean anomaly.
    pub fn try_keplerian_mean_anomaly(
        sma_km: f64,
        ecc: f64,
        inc_deg: f64,
        raan_deg: f64,
        aop_deg: f64,
        ma_deg: f64,
    ) -> PhysicsResult<Self> {
        Self::try_new(
            sma_km,
            ecc,
            inc_deg,
            raan_deg,
            aop_deg,
            ma_deg,
            AnomalyKind::Mean,
        )
    }

    /// Returns a copy of this set whose anomaly is converted to the requested kind.
    pub fn with_anomaly_kind(&self, kind: AnomalyKind) -> PhysicsResult<Self> {
        let anomaly_rad = convert_anomaly_rad(
            self.anomaly_deg.to_radians(),
            self.ecc,
            self.anomaly_kind,
            kind,
            KEPLER_TOLERANCE_RAD,
        )?;
        let mut me = *self;
        me.anomaly_deg = between_0_360(anomaly_rad.to_degrees());
        me.anomaly_kind = kind;
        Ok(me)
    }

    /// Returns the true anomaly in degrees, converting from the stored kind if needed.
    pub fn true_anomaly_deg(&self) -> PhysicsResult<f64> {
        if self.ecc < ECC_EPSILON {
            warn!(
                "true anomaly ill-defined for circular orbit (e = {})",
                self.ecc
            );
        }
        Ok(self.with_anomaly_kind(AnomalyKind::True)?.anomaly_deg)
    }

    /// Returns the eccentric anomaly in degrees, converting from the stored kind if needed.
    pub fn eccentric_anomaly_deg(&self) -> PhysicsResult<f64> {
        Ok(self.with_anomaly_kind(AnomalyKind::Eccentric)?.anomaly_deg)
    }

    /// Returns the mean anomaly in degrees, converting from the stored kind if needed.
    pub fn mean_anomaly_deg(&self) -> PhysicsResult<f64> {
        Ok(self.with_anomaly_kind(AnomalyKind::Mean)?.anomaly_deg)
    }

    /// Returns the semi parameter (or semilatus rectum), in km.
    pub fn semi_latus_rectum_km(&self) -> f64 {
        self.sma_km * (1.0 - self.ecc.powi(2))
    }

    /// Returns the radius of periapsis, in km.
    pub fn periapsis_radius_km(&self) -> f64 {
        self.sma_km * (1.0 - self.ecc)
    }

    /// Returns the radius of apoapsis, in km.
    pub fn apoapsis_radius_km(&self) -> f64 {
        self.sma_km * (1.0 + self.ecc)
    }

    /// Returns the mean motion in rad/s.
    pub fn mean_motion_rad_s(&self, mu_km3_s2: f64) -> f64 {
        (mu_km3_s2 / self.sma_km.powi(3)).sqrt()
    }

    /// Returns the orbital period.
    pub fn period(&self, mu_km3_s2: f64) -> Duration {
        (2.0 * PI / self.mean_motion_rad_s(mu_km3_s2)).seconds()
    }

    /// Returns the secular nodal precession rate under the J2 zonal term, in rad/s.
    pub fn nodal_precession_rate_rad_s(&self, mu_km3_s2: f64, re_km: f64, j2: f64) -> f64 {
        let n = self.mean_motion_rad_s(mu_km3_s2);
        let p = self.semi_latus_rectum_km();
        -1.5 * n * j2 * (re_km / p).powi(2) * self.inc_deg.to_radians().cos()
    }

    /// Returns the local time of the ascending node in fractional hours,
    /// from the solar geometry oracle at the provided epoch.
    pub fn ltan_hours(&self, epoch: Epoch, sun: &dyn SolarGeometry) -> PhysicsResult<f64> {
        let alpha_sun_deg = sun.right_ascension_deg(epoch)?;
        let eot_deg = sun.equation_of_time(epoch)?.to_seconds() / 240.0;
        Ok((12.0 + (self.raan_deg - alpha_sun_deg + eot_deg) / 15.0).rem_euclid(24.0))
    }

    /// Converts this element set to a Cartesian state in the provided frame at
    /// the provided epoch.
    ///
    /// The perifocal state is rotated into the inertial frame with the 3-1-3
    /// sequence R3(-raan) R1(-inc) R3(-aop). The frame must carry a
    /// gravitational parameter and be quasi-inertial.
    pub fn to_cartesian(&self, epoch: Epoch, frame: Frame) -> PhysicsResult<CartesianState> {
        let mu_km3_s2 = frame.mu_km3_s2()?;
        ensure!(
            frame.is_quasi_inertial(),
            NotQuasiInertialSnafu {
                action: "converting orbital elements to a Cartesian state",
                frame
            }
        );

        let p = self.semi_latus_rectum_km();
        ensure!(p.abs() >= f64::EPSILON, ParabolicSemiParamSnafu { p });

        let ta_rad = self.true_anomaly_deg()?.to_radians();
        let (sin_ta, cos_ta) = ta_rad.sin_cos();
        let radius = p / (1.0 + self.ecc * cos_ta);

        let r_perifocal = Vector3::new(radius * cos_ta, radius * sin_ta, 0.0);
        let v_perifocal =
            (mu_km3_s2 / p).sqrt() * Vector3::new(-sin_ta, self.ecc + cos_ta, 0.0);

        let dcm = r3(-self.raan_deg.to_radians())
            * r1(-self.inc_deg.to_radians())
            * r3(-self.aop_deg.to_radians());

        Ok(CartesianState::from_vectors(
            dcm * r_perifocal,
            dcm * v_perifocal,
            epoch,
            frame,
        ))
    }

    /// Derives the classical elements of the provided Cartesian state from its
    /// specific angular momentum and eccentricity vectors.
    ///
    /// Degenerate geometries follow the canonical conventions: a circular
    /// orbit stores aop = 0 and measures the anomaly from the node (or from
    /// the X axis when also equatorial), an equatorial orbit stores raan = 0.
    pub fn from_cartesian(state: &CartesianState) -> PhysicsResult<Self> {
        Self::from_rv(
            state.frame.mu_km3_s2()?,
            &state.radius_km,
            &state.velocity_km_s,
        )
    }

    /// Derives the classical elements from bare position and velocity vectors
    /// and a gravitational parameter, without any frame bookkeeping.
    pub fn from_rv(
        mu_km3_s2: f64,
        radius_km: &Vector3,
        velocity_km_s: &Vector3,
    ) -> PhysicsResult<Self> {
        ensure!(
            radius_km.norm() > f64::EPSILON,
            RadiusSnafu {
                action: "cannot derive orbital elements from a zero radius"
            }
        );

        let r = *radius_km;
        let v = *velocity_km_s;
        let rmag = r.norm();

        let h = r.cross(&v);
        let node = Vector3::new(0.0, 0.0, 1.0).cross(&h);
        let e_vec = ((v.norm_squared() - mu_km3_s2 / rmag) * r - r.dot(&v) * v) / mu_km3_s2;
        let ecc = e_vec.norm();

        let energy = v.norm_squared() / 2.0 - mu_km3_s2 / rmag;
        ensure!(
            energy.abs() > f64::EPSILON,
            ParabolicEccentricitySnafu { limit: ECC_EPSILON }
        );
        let sma_km = -mu_km3_s2 / (2.0 * energy);

        let inc_deg = (h[2] / h.norm()).clamp(-1.0, 1.0).acos().to_degrees();
        let equatorial = inc_deg < INC_EPSILON_DEG || (180.0 - inc_deg) < INC_EPSILON_DEG;
        let circular = ecc < ECC_EPSILON;

        let raan_rad = if equatorial {
            0.0
        } else {
            let raan = (node[0] / node.norm()).clamp(-1.0, 1.0).acos();
            if node[1] < 0.0 {
                2.0 * PI - raan
            } else {
                raan
            }
        };

        let aop_rad = if circular {
            0.0
        } else if equatorial {
            // Longitude of periapsis, measured from the X axis.
            let aop = (e_vec[0] / ecc).clamp(-1.0, 1.0).acos();
            if e_vec[1] < 0.0 {
                2.0 * PI - aop
            } else {
                aop
            }
        } else {
            let aop = (node.dot(&e_vec) / (node.norm() * ecc))
                .clamp(-1.0, 1.0)
                .acos();
            if e_vec[2] < 0.0 {
                2.0 * PI - aop
            } else {
                aop
            }
        };

        let ta_rad = if circular && equatorial {
            // True longitude, measured from the X axis.
            let ta = (r[0] / rmag).clamp(-1.0, 1.0).acos();
            if r[1] < 0.0 {
                2.0 * PI - ta
            } else {
                ta
            }
        } else if circular {
            // Argument of latitude, measured from the ascending node.
            let ta = (node.dot(&r) / (node.norm() * rmag)).clamp(-1.0, 1.0).acos();
            if r[2] < 0.0 {
                2.0 * PI - ta
            } else {
                ta
            }
        } else {
            let ta = (e_vec.dot(&r) / (ecc * rmag)).clamp(-1.0, 1.0).acos();
            if r.dot(&v) < 0.0 {
                2.0 * PI - ta
            } else {
                ta
            }
        };

        Self::try_new(
            sma_km,
            ecc,
            inc_deg,
            raan_rad.to_degrees(),
            aop_rad.to_degrees(),
            between_0_tau(ta_rad).to_degrees(),
            AnomalyKind::True,
        )
    }
}

impl fmt::Display for ClassicalElements {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let decimals = f.precision().unwrap_or(6);
        write!(
            f,
            "sma = {:.*} km\tecc = {:.*}\tinc = {:.*} deg\traan = {:.*} deg\taop = {:.*} deg\t{} = {:.*} deg",
            decimals,
            self.sma_km,
            decimals,
            self.ecc,
            decimals,
            self.inc_deg,
            decimals,
            self.raan_deg,
            decimals,
            self.aop_deg,
            self.anomaly_kind,
            decimals,
            self.anomaly_deg,
        )
    }
}

/// Frame rotation about the first axis.
fn r1(angle_rad: f64) -> Matrix3 {
    let (s, c) = angle_rad.sin_cos();
    Matrix3::new(1.0, 0.0, 0.0, 0.0, c, s, 0.0, -s, c)
}

/// Frame rotation about the third axis.
fn r3(angle_rad: f64) -> Matrix3 {
    let (s, c) = angle_rad.sin_cos();
    Matrix3::new(c, s, 0.0, -s, c, 0.0, 0.0, 0.0, 1.0)
}

#[cfg(test)]
mod coe_ut {
    use super::*;
    use crate::constants::frames::{EARTH_ITRF93, EARTH_J2000};
    use crate::constants::usual::EARTH_GM_KM3_S2;
    use crate::f64_eq_tol;
    use rstest::rstest;

    fn epoch() -> Epoch {
        Epoch::from_gregorian_utc_at_midnight(2018, 1, 1)
    }

    #[rstest]
    #[case(7000.0, 0.01, 45.0, 30.0, 20.0, 10.0)]
    #[case(6778.0, 0.0005, 51.6, 200.0, 80.0, 300.0)]
    #[case(24396.0, 0.7283, 7.0, 194.0, 178.0, 20.0)]
    #[case(42164.0, 0.0002, 0.05, 10.0, 50.0, 190.0)]
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
        let cart = coe.to_cartesian(epoch(), EARTH_J2000).unwrap();
        let back = ClassicalElements::from_cartesian(&cart).unwrap();

        f64_eq_tol!(back.sma_km, sma_km, sma_km * 1e-9, "sma round trip");
        f64_eq_tol!(back.ecc, ecc, 1e-9, "ecc round trip");
        f64_eq_tol!(back.inc_deg, inc_deg, 1e-7, "inc round trip");
        f64_eq_tol!(back.raan_deg, raan_deg, 1e-7, "raan round trip");
        f64_eq_tol!(back.aop_deg, aop_deg, 1e-6, "aop round trip");
        f64_eq_tol!(back.anomaly_deg, ta_deg, 1e-6, "ta round trip");
    }

    #[test]
    fn circular_convention() {
        let coe = ClassicalElements::try_keplerian(7000.0, 0.0, 45.0, 30.0, 0.0, 85.0).unwrap();
        let cart = coe.to_cartesian(epoch(), EARTH_J2000).unwrap();
        let back = ClassicalElements::from_cartesian(&cart).unwrap();

        assert_eq!(back.aop_deg, 0.0);
        f64_eq_tol!(back.anomaly_deg, 85.0, 1e-6, "argument of latitude");
    }

    #[test]
    fn equatorial_convention() {
        let coe = ClassicalElements::try_keplerian(7000.0, 0.01, 0.0, 0.0, 75.0, 10.0).unwrap();
        let cart = coe.to_cartesian(epoch(), EARTH_J2000).unwrap();
        let back = ClassicalElements::from_cartesian(&cart).unwrap();

        assert_eq!(back.raan_deg, 0.0);
        f64_eq_tol!(back.aop_deg, 75.0, 1e-6, "longitude of periapsis");
        f64_eq_tol!(back.anomaly_deg, 10.0, 1e-6, "true anomaly");
    }

    #[test]
    fn period_law() {
        let coe = ClassicalElements::try_keplerian(7000.0, 0.0, 45.0, 0.0, 0.0, 0.0).unwrap();
        let period_s = coe.period(EARTH_GM_KM3_S2).to_seconds();
        let expected = 2.0 * PI * (7000.0_f64.powi(3) / EARTH_GM_KM3_S2).sqrt();
        f64_eq_tol!(period_s, expected, 1e-9, "orbital period");
    }

    #[test]
    fn ltan_at_equinox() {
        use crate::environment::MeanSun;

        // Near the March equinox the solar right ascension is about zero, so
        // a node at the vernal direction sees local noon.
        let equinox = Epoch::from_gregorian_utc_hms(2020, 3, 20, 3, 50, 0);
        let coe = ClassicalElements::try_keplerian(7000.0, 0.001, 97.8, 0.0, 0.0, 0.0).unwrap();
        let ltan = coe.ltan_hours(equinox, &MeanSun).unwrap();
        assert!((ltan - 12.0).abs() < 0.6, "LTAN {ltan} h");

        // Rotating the node by 90 degrees shifts the local time by 6 hours.
        let dawn_dusk =
            ClassicalElements::try_keplerian(7000.0, 0.001, 97.8, 90.0, 0.0, 0.0).unwrap();
        let ltan = dawn_dusk.ltan_hours(equinox, &MeanSun).unwrap();
        assert!((ltan - 18.0).abs() < 0.6, "LTAN {ltan} h");
    }

    #[test]
    fn rejects_non_inertial_frame() {
        let coe = ClassicalElements::try_keplerian(7000.0, 0.0, 45.0, 0.0, 0.0, 0.0).unwrap();
        assert!(matches!(
            coe.to_cartesian(epoch(), EARTH_ITRF93),
            Err(PhysicsError::NotQuasiInertial { .. })
        ));
    }

    #[test]
    fn rejects_hyperbolic() {
        assert!(ClassicalElements::try_keplerian(7000.0, 1.2, 45.0, 0.0, 0.0, 0.0).is_err());
        assert!(ClassicalElements::try_keplerian(-7000.0, 0.5, 45.0, 0.0, 0.0, 0.0).is_err());
    }
}
