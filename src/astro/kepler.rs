/*
 * Apsis Astrodynamics Toolkit
 * Copyright (C) 2024-onward the Apsis contributors (cf. AUTHORS.md)
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Analytic two-body orbit model with optional secular J2 drift, revolution
//! counting, and ascending-node pass search.

use core::f64::consts::TAU;
use core::fmt;

use hifitime::{Duration, Epoch, TimeUnits};
use serde_derive::{Deserialize, Serialize};
use snafu::ensure;

use super::coe::{ClassicalElements, INC_EPSILON_DEG};
use super::PhysicsResult;
use crate::errors::{NotImplementedSnafu, NotQuasiInertialSnafu, PhysicsError};
use crate::frames::Frame;
use crate::math::cartesian::CartesianState;

/// Secular drift applied on top of the two-body motion.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecularRates {
    /// Pure two-body motion: only the anomaly advances.
    TwoBody,
    /// First-order J2 secular rates on the node, the argument of periapsis,
    /// and the mean anomaly.
    J2,
}

impl fmt::Display for SecularRates {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::TwoBody => write!(f, "two-body"),
            Self::J2 => write!(f, "J2"),
        }
    }
}

/// An analytic Keplerian orbit model around a celestial frame.
#[derive(Clone, Debug, PartialEq)]
pub struct KeplerModel {
    elements: ClassicalElements,
    epoch: Epoch,
    frame: Frame,
    rates: SecularRates,
    j2: f64,
}

impl KeplerModel {
    /// Builds a model from the elements osculating at the provided epoch.
    /// The J2 coefficient is only read for [SecularRates::J2].
    pub fn try_new(
        elements: ClassicalElements,
        epoch: Epoch,
        frame: Frame,
        rates: SecularRates,
        j2: f64,
    ) -> PhysicsResult<Self> {
        frame.mu_km3_s2()?;
        ensure!(
            frame.is_quasi_inertial(),
            NotQuasiInertialSnafu {
                action: "building an analytic orbit model",
                frame
            }
        );
        if rates == SecularRates::J2 {
            frame.mean_equatorial_radius_km()?;
        }
        Ok(Self {
            elements,
            epoch,
            frame,
            rates,
            j2,
        })
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn frame(&self) -> Frame {
        self.frame
    }

    pub fn elements_at_epoch(&self) -> ClassicalElements {
        self.elements
    }

    /// Drifted mean motion, in rad/s: the two-body rate corrected by the J2
    /// secular term when enabled.
    pub fn mean_motion_rad_s(&self) -> PhysicsResult<f64> {
        let mu = self.frame.mu_km3_s2()?;
        let n = self.elements.mean_motion_rad_s(mu);
        match self.rates {
            SecularRates::TwoBody => Ok(n),
            SecularRates::J2 => {
                let sin_inc_sq = self.elements.inc_deg.to_radians().sin().powi(2);
                let eta = (1.0 - self.elements.ecc.powi(2)).sqrt();
                Ok(n * (1.0 + self.secular_factor()? * eta * (1.0 - 1.5 * sin_inc_sq)))
            }
        }
    }

    /// Nodal drift rate, in rad/s (zero for the two-body model).
    pub fn raan_dot_rad_s(&self) -> PhysicsResult<f64> {
        match self.rates {
            SecularRates::TwoBody => Ok(0.0),
            SecularRates::J2 => {
                let cos_inc = self.elements.inc_deg.to_radians().cos();
                Ok(-self.secular_factor()? * cos_inc * self.mean_motion_rad_s()?)
            }
        }
    }

    /// Apsidal drift rate, in rad/s (zero for the two-body model).
    pub fn aop_dot_rad_s(&self) -> PhysicsResult<f64> {
        match self.rates {
            SecularRates::TwoBody => Ok(0.0),
            SecularRates::J2 => {
                let sin_inc_sq = self.elements.inc_deg.to_radians().sin().powi(2);
                Ok(self.secular_factor()? * (2.0 - 2.5 * sin_inc_sq) * self.mean_motion_rad_s()?)
            }
        }
    }

    /// (3/2) J2 (Re / p)^2
    fn secular_factor(&self) -> PhysicsResult<f64> {
        let re_km = self.frame.mean_equatorial_radius_km()?;
        Ok(1.5 * self.j2 * (re_km / self.elements.semi_latus_rectum_km()).powi(2))
    }

    /// Orbital period of the model (drifted for J2).
    pub fn period(&self) -> PhysicsResult<Duration> {
        Ok((TAU / self.mean_motion_rad_s()?).seconds())
    }

    /// Classical elements at the provided instant.
    pub fn elements_at(&self, instant: Epoch) -> PhysicsResult<ClassicalElements> {
        let dt_s = (instant - self.epoch).to_seconds();
        let ma_epoch_rad = self.elements.mean_anomaly_deg()?.to_radians();

        let ma_rad = ma_epoch_rad + self.mean_motion_rad_s()? * dt_s;
        let raan_rad = self.elements.raan_deg.to_radians() + self.raan_dot_rad_s()? * dt_s;
        let aop_rad = self.elements.aop_deg.to_radians() + self.aop_dot_rad_s()? * dt_s;

        ClassicalElements::try_keplerian_mean_anomaly(
            self.elements.sma_km,
            self.elements.ecc,
            self.elements.inc_deg,
            raan_rad.to_degrees(),
            aop_rad.to_degrees(),
            ma_rad.to_degrees(),
        )
    }

    /// Cartesian state at the provided instant.
    pub fn state_at(&self, instant: Epoch) -> PhysicsResult<CartesianState> {
        self.elements_at(instant)?.to_cartesian(instant, self.frame)
    }

    /// Revolution number at the provided instant. The revolution at the model
    /// epoch is 1 and the count increments at each completed period.
    ///
    /// Instants before the model epoch would require the pass history to be
    /// rebuilt backwards, which is not supported.
    pub fn revolution_number_at(&self, instant: Epoch) -> PhysicsResult<i64> {
        let dt_s = (instant - self.epoch).to_seconds();
        ensure!(
            dt_s >= 0.0,
            NotImplementedSnafu {
                feature: "revolution numbers before the model epoch"
            }
        );
        let revolutions = self.mean_motion_rad_s()? * dt_s / TAU;
        Ok(revolutions.floor() as i64 + 1)
    }

    /// First ascending-node crossing at or after the provided instant,
    /// located to the provided temporal tolerance.
    ///
    /// Equatorial orbits never leave the equator plane, and their node
    /// crossing convention is not defined here.
    pub fn next_ascending_node_pass(
        &self,
        after: Epoch,
        tolerance: Duration,
    ) -> PhysicsResult<Epoch> {
        ensure!(
            self.elements.inc_deg > INC_EPSILON_DEG
                && (180.0 - self.elements.inc_deg) > INC_EPSILON_DEG,
            NotImplementedSnafu {
                feature: "equatorial orbit pass detection"
            }
        );

        let period = self.period()?;
        let step = period / 20;
        let mut t_prev = after;
        let mut z_prev = self.state_at(t_prev)?.radius_km[2];

        // Scan a little over one period: an ascending node is guaranteed within.
        for i in 1..=24 {
            let t_curr = after + step * i;
            let z_curr = self.state_at(t_curr)?.radius_km[2];
            if z_prev < 0.0 && z_curr >= 0.0 {
                // Bisect the bracket down to the temporal tolerance.
                let mut lo = t_prev;
                let mut hi = t_curr;
                while hi - lo > tolerance {
                    let mid = lo + (hi - lo) / 2;
                    if self.state_at(mid)?.radius_km[2] < 0.0 {
                        lo = mid;
                    } else {
                        hi = mid;
                    }
                }
                return Ok(hi);
            }
            t_prev = t_curr;
            z_prev = z_curr;
        }

        Err(PhysicsError::Undefined {
            param: "ascending node pass within the scanned revolution",
        })
    }
}

#[cfg(test)]
mod kepler_ut {
    use super::*;
    use crate::constants::frames::EARTH_J2000;
    use crate::constants::usual::{EARTH_GM_KM3_S2, EARTH_J2};
    use crate::f64_eq_tol;

    fn epoch() -> Epoch {
        Epoch::from_gregorian_utc_at_midnight(2018, 1, 1)
    }

    fn circular_model() -> KeplerModel {
        let coe = ClassicalElements::try_keplerian(7000.0, 0.0, 45.0, 0.0, 0.0, 0.0).unwrap();
        KeplerModel::try_new(coe, epoch(), EARTH_J2000, SecularRates::TwoBody, EARTH_J2).unwrap()
    }

    #[test]
    fn two_body_period_recovered() {
        let model = circular_model();
        let period = model.period().unwrap();
        let state_epoch = model.state_at(epoch()).unwrap();
        let state_period = model.state_at(epoch() + period).unwrap();

        // One full revolution returns to the same position.
        assert!(
            (state_epoch.radius_km - state_period.radius_km).norm() < 1e-6,
            "period does not close the orbit"
        );
    }

    #[test]
    fn revolution_counting() {
        let model = circular_model();
        let period = model.period().unwrap();

        assert_eq!(model.revolution_number_at(epoch()).unwrap(), 1);
        assert_eq!(model.revolution_number_at(epoch() + period / 2).unwrap(), 1);
        assert_eq!(model.revolution_number_at(epoch() + period).unwrap(), 2);
        assert_eq!(
            model
                .revolution_number_at(epoch() + period * 2 + period / 2)
                .unwrap(),
            3
        );
    }

    #[test]
    fn reverse_revolution_not_implemented() {
        let model = circular_model();
        assert!(matches!(
            model.revolution_number_at(epoch() - 1.seconds()),
            Err(PhysicsError::NotImplemented { .. })
        ));
    }

    #[test]
    fn j2_regresses_the_node() {
        let coe = ClassicalElements::try_keplerian(7000.0, 0.001, 51.6, 60.0, 0.0, 0.0).unwrap();
        let model =
            KeplerModel::try_new(coe, epoch(), EARTH_J2000, SecularRates::J2, EARTH_J2).unwrap();

        // Prograde orbit: the node regresses westward.
        assert!(model.raan_dot_rad_s().unwrap() < 0.0);

        let day_later = model.elements_at(epoch() + 1.days()).unwrap();
        assert!(day_later.raan_deg < 60.0);
        // Roughly -4.5 degrees per day for this orbit.
        f64_eq_tol!(day_later.raan_deg, 60.0 - 4.47, 0.5, "nodal regression rate");
    }

    #[test]
    fn nodal_precession_matches_closed_form() {
        let coe = ClassicalElements::try_keplerian(7000.0, 0.001, 51.6, 60.0, 0.0, 0.0).unwrap();
        let model =
            KeplerModel::try_new(coe, epoch(), EARTH_J2000, SecularRates::J2, EARTH_J2).unwrap();

        let closed_form = coe.nodal_precession_rate_rad_s(
            EARTH_GM_KM3_S2,
            EARTH_J2000.mean_equatorial_radius_km().unwrap(),
            EARTH_J2,
        );
        // The model applies the rate to the drifted mean motion; both agree
        // to the J2^2 order.
        f64_eq_tol!(
            model.raan_dot_rad_s().unwrap(),
            closed_form,
            closed_form.abs() * 1e-2,
            "nodal precession"
        );
    }

    #[test]
    fn ascending_node_pass() {
        let model = circular_model();
        // Starting at the ascending node, the next crossing is one period away.
        let pass = model
            .next_ascending_node_pass(epoch() + 1.seconds(), 1.microseconds())
            .unwrap();
        let period_s = model.period().unwrap().to_seconds();
        f64_eq_tol!(
            (pass - epoch()).to_seconds(),
            period_s,
            1e-3,
            "node pass epoch"
        );
    }

    #[test]
    fn equatorial_pass_not_implemented() {
        let coe = ClassicalElements::try_keplerian(7000.0, 0.0, 0.0, 0.0, 0.0, 0.0).unwrap();
        let model =
            KeplerModel::try_new(coe, epoch(), EARTH_J2000, SecularRates::TwoBody, EARTH_J2)
                .unwrap();
        assert!(matches!(
            model.next_ascending_node_pass(epoch(), 1.milliseconds()),
            Err(PhysicsError::NotImplemented {
                feature: "equatorial orbit pass detection"
            })
        ));
    }
}
