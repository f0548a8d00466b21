/*
 * Apsis Astrodynamics Toolkit
 * Copyright (C) 2024-onward the Apsis contributors (cf. AUTHORS.md)
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::sync::Arc;

use hifitime::Epoch;
use snafu::ensure;

use super::{subset_range, DynamicsTerm};
use crate::astro::PhysicsResult;
use crate::environment::Ephemeris;
use crate::errors::RadiusSnafu;
use crate::frames::Frame;
use crate::math::{DVector, Vector3};
use crate::state::{CoordinateBroker, CoordinateSubset, CARTESIAN_POSITION, CARTESIAN_VELOCITY};

/// Point-mass gravity of the central body: -mu r / |r|^3.
#[derive(Copy, Clone, Debug)]
pub struct CentralBodyGravity {
    pub mu_km3_s2: f64,
}

impl CentralBodyGravity {
    pub const fn new(mu_km3_s2: f64) -> Self {
        Self { mu_km3_s2 }
    }

    /// Builds the term from the gravitational parameter of the provided frame.
    pub fn try_from_frame(frame: Frame) -> PhysicsResult<Self> {
        Ok(Self {
            mu_km3_s2: frame.mu_km3_s2()?,
        })
    }
}

impl DynamicsTerm for CentralBodyGravity {
    fn name(&self) -> &'static str {
        "central body gravity"
    }

    fn read_subsets(&self) -> Vec<CoordinateSubset> {
        vec![CARTESIAN_POSITION, CARTESIAN_VELOCITY]
    }

    fn write_subsets(&self) -> Vec<CoordinateSubset> {
        vec![CARTESIAN_VELOCITY]
    }

    fn contribute(
        &self,
        _epoch: Epoch,
        coordinates: &DVector,
        _frame: Frame,
        broker: &CoordinateBroker,
        rates: &mut DVector,
    ) -> PhysicsResult<()> {
        let position = subset_range(broker, &CARTESIAN_POSITION)?;
        let velocity = subset_range(broker, &CARTESIAN_VELOCITY)?;

        let r = coordinates.fixed_rows::<3>(position.start).into_owned();
        let rmag = r.norm();
        ensure!(
            rmag > f64::EPSILON,
            RadiusSnafu {
                action: "cannot evaluate point-mass gravity at zero radius"
            }
        );

        let acceleration = -self.mu_km3_s2 / rmag.powi(3) * r;
        for i in 0..3 {
            rates[velocity.start + i] += acceleration[i];
        }
        Ok(())
    }
}

/// Zonal harmonic perturbations of an oblate central body (J2, J3, J4),
/// expressed in the body equator frame.
#[derive(Copy, Clone, Debug)]
pub struct ZonalGravity {
    pub mu_km3_s2: f64,
    pub re_km: f64,
    pub j2: f64,
    pub j3: f64,
    pub j4: f64,
}

impl ZonalGravity {
    /// J2-only field.
    pub const fn j2(mu_km3_s2: f64, re_km: f64, j2: f64) -> Self {
        Self {
            mu_km3_s2,
            re_km,
            j2,
            j3: 0.0,
            j4: 0.0,
        }
    }

    /// Full J2/J3/J4 field.
    pub const fn new(mu_km3_s2: f64, re_km: f64, j2: f64, j3: f64, j4: f64) -> Self {
        Self {
            mu_km3_s2,
            re_km,
            j2,
            j3,
            j4,
        }
    }
}

impl DynamicsTerm for ZonalGravity {
    fn name(&self) -> &'static str {
        "zonal gravity"
    }

    fn read_subsets(&self) -> Vec<CoordinateSubset> {
        vec![CARTESIAN_POSITION, CARTESIAN_VELOCITY]
    }

    fn write_subsets(&self) -> Vec<CoordinateSubset> {
        vec![CARTESIAN_VELOCITY]
    }

    fn contribute(
        &self,
        _epoch: Epoch,
        coordinates: &DVector,
        _frame: Frame,
        broker: &CoordinateBroker,
        rates: &mut DVector,
    ) -> PhysicsResult<()> {
        let position = subset_range(broker, &CARTESIAN_POSITION)?;
        let velocity = subset_range(broker, &CARTESIAN_VELOCITY)?;

        let r = coordinates.fixed_rows::<3>(position.start).into_owned();
        let rmag = r.norm();
        ensure!(
            rmag > f64::EPSILON,
            RadiusSnafu {
                action: "cannot evaluate zonal gravity at zero radius"
            }
        );

        let (x, y, z) = (r[0], r[1], r[2]);
        let z2_r2 = (z / rmag).powi(2);
        let mut acceleration = Vector3::zeros();

        if self.j2 != 0.0 {
            let factor = -1.5 * self.j2 * self.mu_km3_s2 * self.re_km.powi(2) / rmag.powi(5);
            acceleration += factor
                * Vector3::new(
                    x * (1.0 - 5.0 * z2_r2),
                    y * (1.0 - 5.0 * z2_r2),
                    z * (3.0 - 5.0 * z2_r2),
                );
        }

        if self.j3 != 0.0 {
            let factor = -2.5 * self.j3 * self.mu_km3_s2 * self.re_km.powi(3) / rmag.powi(7);
            acceleration += factor
                * Vector3::new(
                    x * (3.0 * z - 7.0 * z.powi(3) / rmag.powi(2)),
                    y * (3.0 * z - 7.0 * z.powi(3) / rmag.powi(2)),
                    6.0 * z.powi(2) - 7.0 * z.powi(4) / rmag.powi(2) - 0.6 * rmag.powi(2),
                );
        }

        if self.j4 != 0.0 {
            let factor = 1.875 * self.j4 * self.mu_km3_s2 * self.re_km.powi(4) / rmag.powi(7);
            let z4_r4 = z2_r2 * z2_r2;
            acceleration += factor
                * Vector3::new(
                    x * (1.0 - 14.0 * z2_r2 + 21.0 * z4_r4),
                    y * (1.0 - 14.0 * z2_r2 + 21.0 * z4_r4),
                    z * (5.0 - 70.0 / 3.0 * z2_r2 + 21.0 * z4_r4),
                );
        }

        for i in 0..3 {
            rates[velocity.start + i] += acceleration[i];
        }
        Ok(())
    }
}

/// Differential gravity of an external body: mu_b (rho/|rho|^3 - r_b/|r_b|^3),
/// where rho points from the spacecraft to the body.
#[derive(Clone)]
pub struct ThirdBodyGravity {
    body: Arc<dyn Ephemeris>,
}

impl ThirdBodyGravity {
    pub fn new(body: Arc<dyn Ephemeris>) -> Self {
        Self { body }
    }

    pub fn body_name(&self) -> &str {
        self.body.name()
    }
}

impl DynamicsTerm for ThirdBodyGravity {
    fn name(&self) -> &'static str {
        "third body gravity"
    }

    fn read_subsets(&self) -> Vec<CoordinateSubset> {
        vec![CARTESIAN_POSITION, CARTESIAN_VELOCITY]
    }

    fn write_subsets(&self) -> Vec<CoordinateSubset> {
        vec![CARTESIAN_VELOCITY]
    }

    fn is_autonomous(&self) -> bool {
        false
    }

    fn contribute(
        &self,
        epoch: Epoch,
        coordinates: &DVector,
        _frame: Frame,
        broker: &CoordinateBroker,
        rates: &mut DVector,
    ) -> PhysicsResult<()> {
        let position = subset_range(broker, &CARTESIAN_POSITION)?;
        let velocity = subset_range(broker, &CARTESIAN_VELOCITY)?;

        let r = coordinates.fixed_rows::<3>(position.start).into_owned();
        let r_body = self.body.position_km(epoch)?;
        let rho = r_body - r;

        ensure!(
            rho.norm() > f64::EPSILON && r_body.norm() > f64::EPSILON,
            RadiusSnafu {
                action: "third body is co-located with the spacecraft or the center"
            }
        );

        let acceleration = self.body.mu_km3_s2()
            * (rho / rho.norm().powi(3) - r_body / r_body.norm().powi(3));
        for i in 0..3 {
            rates[velocity.start + i] += acceleration[i];
        }
        Ok(())
    }
}
