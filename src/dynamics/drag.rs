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
use crate::environment::Atmosphere;
use crate::errors::MassSnafu;
use crate::frames::Frame;
use crate::math::{DVector, Vector3};
use crate::state::{
    CoordinateBroker, CoordinateSubset, CARTESIAN_POSITION, CARTESIAN_VELOCITY, MASS,
};

/// Rotation rate of the Earth, in rad/s, used for the co-rotating atmosphere.
pub const EARTH_ROTATION_RATE_RAD_S: f64 = 7.292_115_9e-5;

/// Atmospheric drag: -1/2 rho Cd A/m |v_rel| v_rel, with the relative
/// velocity taken against the co-rotating atmosphere and the density provided
/// by the injected oracle.
#[derive(Clone)]
pub struct AtmosphericDrag {
    atmosphere: Arc<dyn Atmosphere>,
    pub drag_coefficient: f64,
    pub cross_section_m2: f64,
}

impl AtmosphericDrag {
    pub fn new(atmosphere: Arc<dyn Atmosphere>, drag_coefficient: f64, cross_section_m2: f64) -> Self {
        Self {
            atmosphere,
            drag_coefficient,
            cross_section_m2,
        }
    }
}

impl DynamicsTerm for AtmosphericDrag {
    fn name(&self) -> &'static str {
        "atmospheric drag"
    }

    fn read_subsets(&self) -> Vec<CoordinateSubset> {
        vec![CARTESIAN_POSITION, CARTESIAN_VELOCITY, MASS]
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
        let mass = subset_range(broker, &MASS)?;

        let r = coordinates.fixed_rows::<3>(position.start).into_owned();
        let v = coordinates.fixed_rows::<3>(velocity.start).into_owned();
        let mass_kg = coordinates[mass.start];
        ensure!(
            mass_kg > f64::EPSILON,
            MassSnafu {
                action: "cannot evaluate drag on a massless body"
            }
        );

        let density_kg_m3 = self.atmosphere.density_kg_m3(&r, epoch)?;

        // Atmosphere co-rotates with the central body about its polar axis.
        let omega = Vector3::new(0.0, 0.0, EARTH_ROTATION_RATE_RAD_S);
        let v_rel_km_s = v - omega.cross(&r);

        // rho [kg/m^3] * (1e3 v_rel [km/s])^2 [m^2/s^2] / 1e3 -> km/s^2
        let factor = -0.5 * density_kg_m3 * self.drag_coefficient * self.cross_section_m2
            / mass_kg
            * v_rel_km_s.norm()
            * 1e3;
        let acceleration = factor * v_rel_km_s;

        for i in 0..3 {
            rates[velocity.start + i] += acceleration[i];
        }
        Ok(())
    }
}

#[cfg(test)]
mod drag_ut {
    use super::*;
    use crate::constants::frames::EARTH_J2000;
    use crate::constants::usual::EARTH_EQUATORIAL_RADIUS_KM;
    use crate::environment::ExponentialAtmosphere;
    use crate::state::CoordinateBroker;

    #[test]
    fn drag_opposes_relative_velocity() {
        let atmosphere = Arc::new(ExponentialAtmosphere {
            body_radius_km: EARTH_EQUATORIAL_RADIUS_KM,
            reference_altitude_km: 400.0,
            reference_density_kg_m3: 3.7e-12,
            scale_height_km: 59.4,
        });
        let drag = AtmosphericDrag::new(atmosphere, 2.2, 10.0);

        let broker = CoordinateBroker::try_new(vec![
            CARTESIAN_POSITION,
            CARTESIAN_VELOCITY,
            MASS,
        ])
        .unwrap();
        let mut coordinates = DVector::zeros(7);
        coordinates[0] = EARTH_EQUATORIAL_RADIUS_KM + 400.0;
        coordinates[4] = 7.7; // prograde, faster than the co-rotation
        coordinates[6] = 500.0; // kg

        let mut rates = DVector::zeros(7);
        let epoch = Epoch::from_gregorian_utc_at_midnight(2020, 1, 1);
        drag.contribute(epoch, &coordinates, EARTH_J2000, &broker, &mut rates)
            .unwrap();

        // Deceleration along the velocity direction, tiny but nonzero.
        assert!(rates[4] < 0.0);
        assert!(rates[4].abs() < 1e-6);
        assert_eq!(rates[6], 0.0, "drag does not consume mass");
    }
}
