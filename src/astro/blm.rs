/*
 * Apsis Astrodynamics Toolkit
 * Copyright (C) 2024-onward the Apsis contributors (cf. AUTHORS.md)
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Brouwer-Lyddane mean orbital elements.
//!
//! The mean-to-osculating map applies the Brouwer (1959) J2 short-period
//! corrections and the odd-zonal long-period corrections, composed through
//! the Lyddane (1963) vector elements so that small-eccentricity and
//! small-inclination sets remain well defined. The osculating-to-mean map is
//! the fixed-point inversion of that correction in equinoctial space.
//!
//! The theory is only defined around the Earth and away from the critical
//! inclinations, where the long-period divisors vanish.

use core::f64::consts::PI;
use core::fmt;

use hifitime::Epoch;
use log::warn;
use serde_derive::{Deserialize, Serialize};
use snafu::ensure;

use super::coe::ClassicalElements;
use super::PhysicsResult;
use crate::constants::celestial_objects::EARTH;
use crate::constants::usual::{EARTH_J2, EARTH_J3};
use crate::errors::{MeanElementSnafu, NearCriticalInclinationSnafu};
use crate::frames::Frame;
use crate::math::angles::{between_0_360, between_0_tau};
use crate::math::anomalies::{true_from_mean_rad, AnomalyKind, KEPLER_TOLERANCE_RAD};
use crate::math::cartesian::CartesianState;

/// The two inclinations at which `1 - 5 cos^2(i)` vanishes, in degrees.
pub const CRITICAL_INCLINATIONS_DEG: [f64; 2] = [63.434_948_822_922, 116.565_051_177_078];

/// Half width of the refused band around the critical inclinations, in degrees.
pub const CRITICAL_INCLINATION_BAND_DEG: f64 = 0.15;

const MEAN_TOLERANCE: f64 = 1.0e-8;
const MAX_ITER: u32 = 100;

/// Brouwer-Lyddane mean (long-period averaged) orbital elements, with the
/// anomaly stored as a mean anomaly. Angles in degrees.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BrouwerLyddaneMean {
    pub sma_km: f64,
    pub ecc: f64,
    pub inc_deg: f64,
    pub raan_deg: f64,
    pub aop_deg: f64,
    pub ma_deg: f64,
}

impl BrouwerLyddaneMean {
    /// Attempts to build a mean element set, validating the domain of the
    /// averaging theory.
    pub fn try_new(
        sma_km: f64,
        ecc: f64,
        inc_deg: f64,
        raan_deg: f64,
        aop_deg: f64,
        ma_deg: f64,
    ) -> PhysicsResult<Self> {
        ensure!(
            (0.0..0.99).contains(&ecc),
            MeanElementSnafu {
                detail: "mean eccentricity must be in [0, 0.99)"
            }
        );
        ensure!(
            sma_km * (1.0 - ecc) > 3000.0,
            MeanElementSnafu {
                detail: "mean perigee radius must be greater than 3,000 km"
            }
        );
        ensure!(
            (0.0..=180.0).contains(&inc_deg),
            MeanElementSnafu {
                detail: "mean inclination must be in [0, 180] degrees"
            }
        );
        check_critical_inclination(inc_deg)?;
        warn_singular_aop(between_0_360(aop_deg));

        Ok(Self {
            sma_km,
            ecc,
            inc_deg,
            raan_deg: between_0_360(raan_deg),
            aop_deg: between_0_360(aop_deg),
            ma_deg: between_0_360(ma_deg),
        })
    }

    /// Applies the short- and long-period corrections to produce the
    /// osculating classical elements, stored with their mean anomaly.
    pub fn to_osculating(&self, frame: Frame) -> PhysicsResult<ClassicalElements> {
        ensure_earth(frame)?;
        let re_km = frame.mean_equatorial_radius_km()?;
        let kep = mean_to_osculating_kep(
            [
                self.sma_km,
                self.ecc,
                self.inc_deg,
                self.raan_deg,
                self.aop_deg,
                self.ma_deg,
            ],
            re_km,
        )?;
        ClassicalElements::try_new(
            kep[0],
            kep[1],
            kep[2],
            kep[3],
            kep[4],
            kep[5],
            AnomalyKind::Mean,
        )
    }

    /// Recovers the mean element set whose corrected (osculating) elements
    /// match the provided classical set, by fixed-point iteration on the
    /// corrections in equinoctial space.
    pub fn from_osculating(coe: &ClassicalElements, frame: Frame) -> PhysicsResult<Self> {
        ensure_earth(frame)?;
        let re_km = frame.mean_equatorial_radius_km()?;

        ensure!(
            coe.periapsis_radius_km() > 3000.0,
            MeanElementSnafu {
                detail: "osculating perigee radius must be greater than 3,000 km"
            }
        );
        check_critical_inclination(coe.inc_deg)?;
        if coe.periapsis_radius_km() < re_km {
            warn!("mean element recovery may be inaccurate because the orbit intersects the Earth");
        }

        let osc_kep = [
            coe.sma_km,
            coe.ecc,
            coe.inc_deg,
            coe.raan_deg,
            coe.aop_deg,
            coe.mean_anomaly_deg()?,
        ];

        // Target osculating elements in equinoctial space.
        let aeq_target = kep_to_aeq(&osc_kep);

        // Initial guess: mean elements equal the osculating elements.
        let mut aeq_mean = kep_to_aeq(&osc_kep);
        let mut aeq_next = [0.0; 6];
        let corrected = mean_to_osculating_kep(osc_kep, re_km)?;
        let aeq_corrected = kep_to_aeq(&corrected);
        for i in 0..6 {
            aeq_next[i] = aeq_mean[i] + (aeq_target[i] - aeq_corrected[i]);
        }

        let mut error = MEAN_TOLERANCE + 1.0;
        let mut previous_error = f64::INFINITY;
        let mut iteration = 0;

        while error > MEAN_TOLERANCE {
            let mean_kep = aeq_to_kep(&aeq_next);
            let corrected = mean_to_osculating_kep(mean_kep, re_km)?;
            let aeq_corrected = kep_to_aeq(&corrected);

            error = aeq_target
                .iter()
                .zip(aeq_corrected.iter())
                .map(|(t, c)| {
                    // Normalize the semi-major axis entry so every component
                    // is comparable to the dimensionless elements.
                    if t.abs() > 100.0 {
                        ((t - c) / t).powi(2)
                    } else {
                        (t - c).powi(2)
                    }
                })
                .sum::<f64>()
                .sqrt();

            if previous_error > error {
                previous_error = error;
                aeq_mean = aeq_next;
                for i in 0..6 {
                    aeq_next[i] = aeq_mean[i] + (aeq_target[i] - aeq_corrected[i]);
                }
            } else {
                warn!("mean element recovery stopped improving, residual {previous_error:e}");
                break;
            }

            iteration += 1;
            if iteration > MAX_ITER {
                warn!("mean element recovery stopped after {MAX_ITER} iterations, may be inaccurate");
                break;
            }
        }

        let kep = aeq_to_kep(&aeq_mean);
        Self::try_new(kep[0], kep[1], kep[2], kep[3], kep[4], kep[5])
    }

    /// Derives the mean elements of the provided Cartesian state.
    pub fn from_cartesian(state: &CartesianState) -> PhysicsResult<Self> {
        Self::from_osculating(&ClassicalElements::from_cartesian(state)?, state.frame)
    }

    /// Converts these mean elements to a Cartesian state through the
    /// osculating classical set.
    pub fn to_cartesian(&self, epoch: Epoch, frame: Frame) -> PhysicsResult<CartesianState> {
        self.to_osculating(frame)?.to_cartesian(epoch, frame)
    }
}

impl fmt::Display for BrouwerLyddaneMean {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let decimals = f.precision().unwrap_or(6);
        write!(
            f,
            "mean sma = {:.*} km\tmean ecc = {:.*}\tmean inc = {:.*} deg\tmean raan = {:.*} deg\tmean aop = {:.*} deg\tmean ma = {:.*} deg",
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
            decimals,
            self.ma_deg,
        )
    }
}

fn ensure_earth(frame: Frame) -> PhysicsResult<()> {
    ensure!(
        frame.ephemeris_id == EARTH,
        MeanElementSnafu {
            detail: "Brouwer-Lyddane mean elements are only defined around the Earth"
        }
    );
    Ok(())
}

fn check_critical_inclination(inc_deg: f64) -> PhysicsResult<()> {
    for critical in CRITICAL_INCLINATIONS_DEG {
        ensure!(
            (inc_deg - critical).abs() > CRITICAL_INCLINATION_BAND_DEG,
            NearCriticalInclinationSnafu { inc_deg }
        );
    }
    Ok(())
}

fn warn_singular_aop(aop_deg: f64) {
    for singular in [90.0, 270.0] {
        if (aop_deg - singular).abs() < CRITICAL_INCLINATION_BAND_DEG {
            warn!(
                "argument of periapsis {aop_deg} deg is near the {singular} deg locus where the long-period terms degrade"
            );
        }
    }
}

/// Keplerian [sma, ecc, inc, raan, aop, ma] (degrees) to equinoctial
/// [a, h, k, p, q, mean longitude (degrees)].
fn kep_to_aeq(kep: &[f64; 6]) -> [f64; 6] {
    let (sma, ecc, inc_deg, raan_deg, aop_deg, ma_deg) =
        (kep[0], kep[1], kep[2], kep[3], kep[4], kep[5]);

    let half_inc_rad = (inc_deg / 2.0).to_radians();
    let raan_rad = raan_deg.to_radians();
    let aop_raan_rad = (aop_deg + raan_deg).to_radians();

    [
        sma,
        ecc * aop_raan_rad.sin(),
        ecc * aop_raan_rad.cos(),
        half_inc_rad.sin() * raan_rad.sin(),
        half_inc_rad.sin() * raan_rad.cos(),
        raan_deg + aop_deg + ma_deg,
    ]
}

/// Inverse of [kep_to_aeq].
fn aeq_to_kep(aeq: &[f64; 6]) -> [f64; 6] {
    let (sma, h, k, p, q, lambda_deg) = (aeq[0], aeq[1], aeq[2], aeq[3], aeq[4], aeq[5]);

    let ecc = (h * h + k * k).sqrt();
    let s_sq = p * p + q * q; // sin^2(i/2)
    let inc_deg = if s_sq <= 1.0 {
        (1.0 - 2.0 * s_sq).acos().to_degrees()
    } else {
        180.0
    };
    let raan_deg = p.atan2(q).to_degrees();
    let aop_plus_raan_deg = h.atan2(k).to_degrees();

    [
        sma,
        ecc,
        inc_deg,
        between_0_360(raan_deg),
        between_0_360(aop_plus_raan_deg - raan_deg),
        between_0_360(lambda_deg - aop_plus_raan_deg),
    ]
}

/// Applies the Brouwer corrections to a mean Keplerian set
/// [sma (km), ecc, inc, raan, aop, ma (degrees)], returning the osculating
/// set in the same layout.
///
/// Short-period terms are the first-order J2 corrections; long-period terms
/// are the first-order odd-zonal (J3) corrections. The results are composed
/// through the Lyddane vector elements (e cos l, e sin l and the sin(i/2)
/// node vector) to stay defined at low eccentricity and inclination.
fn mean_to_osculating_kep(mean: [f64; 6], re_km: f64) -> PhysicsResult<[f64; 6]> {
    let k2 = 0.5 * EARTH_J2;

    let smap = mean[0] / re_km; // normalized SMA
    let mut eccp = mean[1];
    let mut incp = mean[2].to_radians();
    let mut raanp = mean[3].to_radians();
    let mut aopp = mean[4].to_radians();
    let mut mean_anom = mean[5].to_radians();

    if eccp < 0.0 {
        eccp = -eccp;
        mean_anom -= PI;
        aopp += PI;
    }
    ensure!(
        eccp < 1.0,
        MeanElementSnafu {
            detail: "corrections are not applicable to hyperbolic orbits"
        }
    );

    // Near-retrograde sets go through the flipped pseudo-state.
    let mut pseudostate = false;
    if incp > 175.0_f64.to_radians() {
        incp = PI - incp;
        raanp = -raanp;
        aopp = -aopp;
        pseudostate = true;
    }

    raanp = between_0_tau(raanp);
    aopp = between_0_tau(aopp);
    mean_anom = between_0_tau(mean_anom);

    let eta = (1.0 - eccp.powi(2)).sqrt();
    let theta = incp.cos();
    let theta_sq = theta.powi(2);
    let p_norm = smap * eta.powi(2); // normalized semi-latus rectum
    let gm2 = k2 / smap.powi(2);
    let gm2p = gm2 / eta.powi(4);

    let tap = true_from_mean_rad(mean_anom, eccp, KEPLER_TOLERANCE_RAD)?;
    let rp = p_norm / (1.0 + eccp * tap.cos());
    let adr = smap / rp;

    let sin_incp = incp.sin();

    // --- J2 short-period corrections ---

    let sma1 = smap
        + smap
            * gm2
            * ((adr.powi(3) - 1.0 / eta.powi(3)) * (-1.0 + 3.0 * theta_sq)
                + 3.0 * (1.0 - theta_sq) * adr.powi(3) * (2.0 * aopp + 2.0 * tap).cos());

    let mut decc = eta.powi(2) / 2.0
        * ((3.0
            * (1.0 / eta.powi(6))
            * gm2
            * (1.0 - theta_sq)
            * (2.0 * aopp + 2.0 * tap).cos()
            * (3.0 * eccp * tap.cos().powi(2)
                + 3.0 * tap.cos()
                + eccp.powi(2) * tap.cos().powi(3)
                + eccp))
            - (gm2p
                * (1.0 - theta_sq)
                * (3.0 * (2.0 * aopp + tap).cos() + (3.0 * tap + 2.0 * aopp).cos()))
            + (3.0 * theta_sq - 1.0) * gm2 / eta.powi(6)
                * (eccp * eta
                    + eccp / (1.0 + eta)
                    + 3.0 * eccp * tap.cos().powi(2)
                    + 3.0 * tap.cos()
                    + eccp.powi(2) * tap.cos().powi(3)));

    let mut dinc = gm2p / 2.0
        * theta
        * sin_incp
        * (3.0 * (2.0 * aopp + 2.0 * tap).cos()
            + 3.0 * eccp * (2.0 * aopp + tap).cos()
            + eccp * (2.0 * aopp + 3.0 * tap).cos());

    let draan = -gm2p / 2.0
        * theta
        * (6.0 * (tap - mean_anom + eccp * tap.sin())
            - 3.0 * (2.0 * aopp + 2.0 * tap).sin()
            - 3.0 * eccp * (2.0 * aopp + tap).sin()
            - eccp * (2.0 * aopp + 3.0 * tap).sin());

    // --- odd-zonal long-period corrections ---
    // First order in J3: the frozen-orbit coupling between the eccentricity
    // and the argument of periapsis. Even zonals only contribute at O(J2^2).

    let odd_ratio = -EARTH_J3 / (2.0 * EARTH_J2) * (1.0 / p_norm);
    decc += odd_ratio * sin_incp * aopp.sin();
    dinc += odd_ratio * eccp * theta * aopp.sin();

    // --- mean longitude correction (J2 short-period) ---

    let lgh = raanp
        + aopp
        + mean_anom
        + gm2p / 4.0
            * (6.0 * (-1.0 - 2.0 * theta + 5.0 * theta_sq)
                * (tap - mean_anom + eccp * tap.sin())
                + (3.0 + 2.0 * theta - 5.0 * theta_sq)
                    * (3.0 * (2.0 * aopp + 2.0 * tap).sin()
                        + 3.0 * eccp * (2.0 * aopp + tap).sin()
                        + eccp * (2.0 * aopp + 3.0 * tap).sin()))
        + gm2p / 4.0 * eta.powi(2) / (eta + 1.0)
            * eccp
            * (3.0
                * (1.0 - theta_sq)
                * ((3.0 * tap + 2.0 * aopp).sin()
                    * (1.0 / 3.0 + adr.powi(2) * eta.powi(2) + adr)
                    + (2.0 * aopp + tap).sin() * (1.0 - adr.powi(2) * eta.powi(2) - adr))
                + 2.0
                    * tap.sin()
                    * (3.0 * theta_sq - 1.0)
                    * (1.0 + adr.powi(2) * eta.powi(2) + adr));

    let eccpdl = -eta.powi(3) / 4.0
        * gm2p
        * (2.0 * (-1.0 + 3.0 * theta_sq) * (adr.powi(2) * eta.powi(2) + adr + 1.0) * tap.sin()
            + 3.0
                * (1.0 - theta_sq)
                * ((-adr.powi(2) * eta.powi(2) - adr + 1.0) * (2.0 * aopp + tap).sin()
                    + (adr.powi(2) * eta.powi(2) + adr + 1.0 / 3.0)
                        * (2.0 * aopp + 3.0 * tap).sin()));

    // --- Lyddane composition of the eccentricity and anomaly ---

    let ecosl = (eccp + decc) * mean_anom.cos() - eccpdl * mean_anom.sin();
    let esinl = (eccp + decc) * mean_anom.sin() + eccpdl * mean_anom.cos();
    let ecc1 = (ecosl.powi(2) + esinl.powi(2)).sqrt();

    let ma1 = if ecc1 < 1.0e-11 {
        0.0
    } else {
        between_0_tau(esinl.atan2(ecosl))
    };

    // --- Lyddane composition of the inclination and node ---

    let sin_half_i = (0.5 * incp).sin();
    let cos_half_i = (0.5 * incp).cos();

    let sin_half_sin_raan =
        (sin_half_i + cos_half_i * 0.5 * dinc) * raanp.sin() + sin_half_i * draan * raanp.cos();
    let sin_half_cos_raan =
        (sin_half_i + cos_half_i * 0.5 * dinc) * raanp.cos() - sin_half_i * draan * raanp.sin();

    let sin_half_i_new = (sin_half_sin_raan.powi(2) + sin_half_cos_raan.powi(2))
        .sqrt()
        .clamp(-1.0, 1.0);
    let inc1 = 2.0 * sin_half_i_new.asin();

    let raan1;
    let mut aop1 = if inc1.abs() < 1.0e-9 || (inc1 - PI).abs() < 1.0e-9 {
        raan1 = 0.0;
        lgh - ma1 - raan1
    } else {
        raan1 = between_0_tau(sin_half_sin_raan.atan2(sin_half_cos_raan));
        lgh - ma1 - raan1
    };
    aop1 = between_0_tau(aop1);

    let mut kep = [
        sma1 * re_km,
        ecc1,
        inc1.to_degrees(),
        raan1.to_degrees(),
        aop1.to_degrees(),
        ma1.to_degrees(),
    ];

    if pseudostate {
        kep[2] = 180.0 - kep[2];
        kep[3] = 360.0 - kep[3];
    }

    kep[3] = between_0_360(kep[3]);
    kep[4] = between_0_360(kep[4]);
    kep[5] = between_0_360(kep[5]);

    Ok(kep)
}

#[cfg(test)]
mod blm_ut {
    use super::*;
    use crate::constants::frames::EARTH_J2000;
    use crate::errors::PhysicsError;
    use crate::f64_eq_tol;
    use rstest::rstest;

    #[rstest]
    #[case(7000.0, 0.01, 51.6, 30.0, 20.0, 10.0)]
    #[case(7200.0, 0.02, 98.0, 45.0, 10.0, 5.0)]
    #[case(26560.0, 0.01, 55.0, 120.0, 200.0, 80.0)]
    fn mean_osculating_round_trip(
        #[case] sma_km: f64,
        #[case] ecc: f64,
        #[case] inc_deg: f64,
        #[case] raan_deg: f64,
        #[case] aop_deg: f64,
        #[case] ma_deg: f64,
    ) {
        let mean =
            BrouwerLyddaneMean::try_new(sma_km, ecc, inc_deg, raan_deg, aop_deg, ma_deg).unwrap();
        let osculating = mean.to_osculating(EARTH_J2000).unwrap();
        let recovered = BrouwerLyddaneMean::from_osculating(&osculating, EARTH_J2000).unwrap();

        f64_eq_tol!(recovered.sma_km, sma_km, 1e-3, "mean sma round trip");
        f64_eq_tol!(recovered.ecc, ecc, 1e-6, "mean ecc round trip");
        f64_eq_tol!(recovered.inc_deg, inc_deg, 1e-5, "mean inc round trip");
        f64_eq_tol!(recovered.raan_deg, raan_deg, 1e-4, "mean raan round trip");
        f64_eq_tol!(recovered.aop_deg, aop_deg, 1e-3, "mean aop round trip");
        f64_eq_tol!(recovered.ma_deg, ma_deg, 1e-3, "mean ma round trip");
    }

    #[test]
    fn corrections_are_small() {
        let mean = BrouwerLyddaneMean::try_new(7000.0, 0.01, 51.6, 30.0, 20.0, 10.0).unwrap();
        let osculating = mean.to_osculating(EARTH_J2000).unwrap();

        // J2-order corrections: a few km in SMA, small fractions elsewhere.
        assert!((osculating.sma_km - 7000.0).abs() < 20.0);
        assert!((osculating.ecc - 0.01).abs() < 5e-3);
        assert!((osculating.inc_deg - 51.6).abs() < 0.1);
    }

    #[test]
    fn critical_inclination_refused() {
        assert!(matches!(
            BrouwerLyddaneMean::try_new(7000.0, 0.01, 63.43, 0.0, 0.0, 0.0),
            Err(PhysicsError::NearCriticalInclination { .. })
        ));
        assert!(matches!(
            BrouwerLyddaneMean::try_new(7000.0, 0.01, 116.6, 0.0, 0.0, 0.0),
            Err(PhysicsError::NearCriticalInclination { .. })
        ));
        // Just outside the band is accepted.
        assert!(BrouwerLyddaneMean::try_new(7000.0, 0.01, 63.6, 0.0, 0.0, 0.0).is_ok());
    }

    #[test]
    fn domain_refused() {
        // Perigee below 3000 km.
        assert!(matches!(
            BrouwerLyddaneMean::try_new(3000.0, 0.01, 51.6, 0.0, 0.0, 0.0),
            Err(PhysicsError::MeanElement { .. })
        ));
        // Hyperbolic.
        assert!(BrouwerLyddaneMean::try_new(7000.0, 1.2, 51.6, 0.0, 0.0, 0.0).is_err());
    }

    #[test]
    fn cartesian_round_trip() {
        let mean = BrouwerLyddaneMean::try_new(7100.0, 0.015, 51.6, 80.0, 30.0, 220.0).unwrap();
        let epoch = Epoch::from_gregorian_utc_at_midnight(2021, 3, 4);
        let cartesian = mean.to_cartesian(epoch, EARTH_J2000).unwrap();
        let recovered = BrouwerLyddaneMean::from_cartesian(&cartesian).unwrap();

        f64_eq_tol!(recovered.sma_km, mean.sma_km, 1e-3, "sma via cartesian");
        f64_eq_tol!(recovered.ecc, mean.ecc, 1e-6, "ecc via cartesian");
        f64_eq_tol!(recovered.inc_deg, mean.inc_deg, 1e-5, "inc via cartesian");
    }
}
