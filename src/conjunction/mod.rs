/*
 * Apsis Astrodynamics Toolkit
 * Copyright (C) 2024-onward the Apsis contributors (cf. AUTHORS.md)
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Close-approach search between two independently propagated trajectories.

use core::fmt;

use hifitime::{Duration, Epoch, TimeUnits};
use serde_derive::{Deserialize, Serialize};
use snafu::ensure;

use crate::astro::kepler::KeplerModel;
use crate::errors::{
    CoLocatedStatesSnafu, ConjunctionError, InvalidIntervalSnafu, NonPositiveStepSnafu,
    PropagationError,
};
use crate::math::cartesian::CartesianState;
use crate::math::Vector3;
use crate::propagation::Propagator;
use crate::state::State;

/// A trajectory sampler: a value handle to an immutable propagation
/// configuration whose state can be requested at any instant.
pub trait Trajectory: Send + Sync {
    fn state_at(&self, epoch: Epoch) -> Result<CartesianState, PropagationError>;
}

impl Trajectory for KeplerModel {
    fn state_at(&self, epoch: Epoch) -> Result<CartesianState, PropagationError> {
        Ok(KeplerModel::state_at(self, epoch)?)
    }
}

/// A propagator bound to its initial state. Propagation scratch is per call:
/// the handle itself never mutates.
#[derive(Clone)]
pub struct PropagatedTrajectory {
    pub propagator: Propagator,
    pub initial_state: State,
}

impl Trajectory for PropagatedTrajectory {
    fn state_at(&self, epoch: Epoch) -> Result<CartesianState, PropagationError> {
        Ok(self.propagator.state_at(&self.initial_state, epoch)?.to_cartesian()?)
    }
}

/// A local minimum of the inter-trajectory distance.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CloseApproach {
    /// Time of closest approach.
    pub tca: Epoch,
    pub miss_distance_km: f64,
    /// Target minus reference position at TCA, in km.
    pub relative_position_km: Vector3,
    /// Target minus reference velocity at TCA, in km/s.
    pub relative_velocity_km_s: Vector3,
}

impl fmt::Display for CloseApproach {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "TCA {}\tmiss distance = {:.3} m\trelative speed = {:.3} m/s",
            self.tca,
            self.miss_distance_km * 1e3,
            self.relative_velocity_km_s.norm() * 1e3,
        )
    }
}

/// Grid-scan generator of close approaches.
///
/// The distance between both trajectories is sampled on a uniform grid;
/// every local-minimum triple brackets a time of closest approach, which is
/// refined by bisection on the sign of the distance derivative (the dot
/// product of the relative position and velocity).
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CloseApproachGenerator {
    pub step: Duration,
    pub tolerance: Duration,
}

impl Default for CloseApproachGenerator {
    fn default() -> Self {
        Self {
            step: 60.seconds(),
            tolerance: 1.microseconds(),
        }
    }
}

/// Distances below this threshold denote co-located trajectories.
const CO_LOCATION_THRESHOLD_KM: f64 = 1e-6;

impl CloseApproachGenerator {
    pub fn try_new(step: Duration, tolerance: Duration) -> Result<Self, ConjunctionError> {
        ensure!(
            step > Duration::ZERO && tolerance > Duration::ZERO,
            NonPositiveStepSnafu
        );
        Ok(Self { step, tolerance })
    }

    /// Enumerates all local minima of the inter-trajectory distance in the
    /// provided interval, sorted by TCA.
    pub fn compute_close_approaches(
        &self,
        reference: &dyn Trajectory,
        target: &dyn Trajectory,
        start: Epoch,
        end: Epoch,
    ) -> Result<Vec<CloseApproach>, ConjunctionError> {
        ensure!(end > start, InvalidIntervalSnafu);

        // Sample the distance on the uniform grid, end instant included.
        let mut epochs = Vec::new();
        let mut epoch = start;
        while epoch < end {
            epochs.push(epoch);
            epoch = epoch + self.step;
        }
        epochs.push(end);

        let mut distances = Vec::with_capacity(epochs.len());
        let mut max_distance: f64 = 0.0;
        for &epoch in &epochs {
            let relative = self.relative_state(reference, target, epoch)?;
            let distance = relative.radius_km.norm();
            max_distance = max_distance.max(distance);
            distances.push(distance);
        }

        ensure!(max_distance > CO_LOCATION_THRESHOLD_KM, CoLocatedStatesSnafu);

        // Bracket each local-minimum triple and refine it.
        let mut approaches = Vec::new();
        for i in 1..epochs.len().saturating_sub(1) {
            if distances[i] < distances[i - 1] && distances[i] < distances[i + 1] {
                let tca = self.refine(reference, target, epochs[i - 1], epochs[i + 1])?;
                let relative = self.relative_state(reference, target, tca)?;
                approaches.push(CloseApproach {
                    tca,
                    miss_distance_km: relative.radius_km.norm(),
                    relative_position_km: relative.radius_km,
                    relative_velocity_km_s: relative.velocity_km_s,
                });
            }
        }

        Ok(approaches)
    }

    /// Target state relative to the reference state, frames checked.
    fn relative_state(
        &self,
        reference: &dyn Trajectory,
        target: &dyn Trajectory,
        epoch: Epoch,
    ) -> Result<CartesianState, ConjunctionError> {
        let reference_state = reference.state_at(epoch)?;
        let target_state = target.state_at(epoch)?;
        Ok((target_state - reference_state).map_err(PropagationError::from)?)
    }

    /// Bisects the zero of d|r|/dt inside the bracket down to the temporal
    /// tolerance. Within a bracketed minimum the derivative is negative
    /// before the TCA and positive after it.
    fn refine(
        &self,
        reference: &dyn Trajectory,
        target: &dyn Trajectory,
        mut lo: Epoch,
        mut hi: Epoch,
    ) -> Result<Epoch, ConjunctionError> {
        while hi - lo > self.tolerance {
            let mid = lo + (hi - lo) / 2;
            let relative = self.relative_state(reference, target, mid)?;
            let range_rate = relative.radius_km.dot(&relative.velocity_km_s);
            if range_rate < 0.0 {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        Ok(lo + (hi - lo) / 2)
    }
}

#[cfg(test)]
mod conjunction_ut {
    use super::*;
    use crate::astro::coe::ClassicalElements;
    use crate::astro::kepler::SecularRates;
    use crate::constants::frames::EARTH_J2000;
    use crate::constants::usual::{EARTH_GM_KM3_S2, EARTH_J2};

    fn epoch() -> Epoch {
        Epoch::from_gregorian_utc_at_midnight(2022, 2, 2)
    }

    fn circular_model(inc_deg: f64, ta_deg: f64) -> KeplerModel {
        let coe = ClassicalElements::try_keplerian(7000.0, 0.0, inc_deg, 0.0, 0.0, ta_deg).unwrap();
        KeplerModel::try_new(coe, epoch(), EARTH_J2000, SecularRates::TwoBody, EARTH_J2).unwrap()
    }

    #[test]
    fn perpendicular_circular_orbits_cross_four_times() {
        // Equatorial and polar circular orbits of the same radius cross the
        // mutual line of nodes twice per revolution. The small phase offset
        // keeps every minimum inside the search interval.
        let reference = circular_model(0.0, 0.0);
        let target = circular_model(90.0, 10.0);

        let period_s = ClassicalElements::try_keplerian(7000.0, 0.0, 0.0, 0.0, 0.0, 0.0)
            .unwrap()
            .period(EARTH_GM_KM3_S2)
            .to_seconds();
        let generator = CloseApproachGenerator::default();
        let approaches = generator
            .compute_close_approaches(
                &reference,
                &target,
                epoch(),
                epoch() + (2.0 * period_s).seconds(),
            )
            .unwrap();

        assert_eq!(approaches.len(), 4, "expected four close approaches");

        // Sorted by TCA, roughly half a period apart.
        for pair in approaches.windows(2) {
            assert!(pair[1].tca > pair[0].tca);
            let gap_s = (pair[1].tca - pair[0].tca).to_seconds();
            assert!(
                (gap_s - period_s / 2.0).abs() < period_s * 0.05,
                "unexpected TCA spacing {gap_s}"
            );
        }

        // Both start at the shared ascending node: the first approach is at
        // a multiple of half a period.
        let first_s = (approaches[0].tca - epoch()).to_seconds();
        assert!(
            (first_s - period_s / 2.0).abs() < period_s * 0.05,
            "first TCA at {first_s}"
        );
    }

    #[test]
    fn co_located_trajectories_are_rejected() {
        let reference = circular_model(45.0, 10.0);
        let target = circular_model(45.0, 10.0);

        let generator = CloseApproachGenerator::default();
        let result = generator.compute_close_approaches(
            &reference,
            &target,
            epoch(),
            epoch() + 3600.seconds(),
        );
        assert!(matches!(result, Err(ConjunctionError::CoLocatedStates)));
    }

    #[test]
    fn interval_and_step_discipline() {
        let generator = CloseApproachGenerator::default();
        let reference = circular_model(0.0, 0.0);
        let target = circular_model(90.0, 0.0);

        assert!(matches!(
            generator.compute_close_approaches(&reference, &target, epoch(), epoch()),
            Err(ConjunctionError::InvalidInterval)
        ));

        assert!(matches!(
            CloseApproachGenerator::try_new(Duration::ZERO, 1.microseconds()),
            Err(ConjunctionError::NonPositiveStep)
        ));
    }

    #[test]
    fn refined_tca_beats_the_grid() {
        // Offset the target phase so the minimum falls between grid points.
        let reference = circular_model(0.0, 0.0);
        let target = circular_model(90.0, 7.3);

        let generator = CloseApproachGenerator::default();
        let period_s = ClassicalElements::try_keplerian(7000.0, 0.0, 0.0, 0.0, 0.0, 0.0)
            .unwrap()
            .period(EARTH_GM_KM3_S2)
            .to_seconds();
        let approaches = generator
            .compute_close_approaches(
                &reference,
                &target,
                epoch(),
                epoch() + period_s.seconds(),
            )
            .unwrap();
        assert!(!approaches.is_empty());

        for approach in &approaches {
            // At the refined TCA the range rate vanishes.
            let range_rate = approach
                .relative_position_km
                .dot(&approach.relative_velocity_km_s)
                / approach.miss_distance_km;
            assert!(
                range_rate.abs() < 1e-4,
                "range rate at TCA: {range_rate} km/s"
            );
        }
    }
}
