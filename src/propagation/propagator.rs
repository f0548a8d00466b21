/*
 * Apsis Astrodynamics Toolkit
 * Copyright (C) 2024-onward the Apsis contributors (cf. AUTHORS.md)
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Composition of dynamics terms into a trajectory sampler.

use std::sync::Arc;

use hifitime::{Duration, Epoch, TimeUnits};
use snafu::ensure;

use crate::dynamics::Dynamics;
use crate::errors::{PropagationError, UndefinedSnafu, UnsortedInstantsSnafu};
use crate::events::EventCondition;
use crate::math::DVector;
use crate::propagation::integrator::NumericalSolver;
use crate::state::{CoordinateBroker, State};

/// Drives the numerical solver over the additive combination of a set of
/// dynamics terms.
///
/// The propagation broker is the ordered union of every term's read and
/// write subsets; input states must carry all of those subsets (extra
/// subsets are ignored).
#[derive(Clone)]
pub struct Propagator {
    dynamics: Vec<Dynamics>,
    solver: NumericalSolver,
    /// Temporal tolerance of the event root refinement.
    event_time_tol: Duration,
    broker: Arc<CoordinateBroker>,
}

impl Propagator {
    pub fn try_new(
        dynamics: Vec<Dynamics>,
        solver: NumericalSolver,
        event_time_tol: Duration,
    ) -> Result<Self, PropagationError> {
        ensure!(
            !dynamics.is_empty(),
            UndefinedSnafu {
                param: "dynamics set"
            }
        );

        let mut subsets = Vec::new();
        for term in &dynamics {
            for subset in term.read_subsets().into_iter().chain(term.write_subsets()) {
                if !subsets.contains(&subset) {
                    subsets.push(subset);
                }
            }
        }
        let broker = Arc::new(CoordinateBroker::try_new(subsets)?);

        Ok(Self {
            dynamics,
            solver,
            event_time_tol,
            broker,
        })
    }

    pub fn broker(&self) -> &CoordinateBroker {
        &self.broker
    }

    pub fn solver(&self) -> &NumericalSolver {
        &self.solver
    }

    pub fn event_time_tolerance(&self) -> Duration {
        self.event_time_tol
    }

    /// Reorders the input state coordinates into the propagation broker
    /// layout.
    fn coordinates_of(&self, state: &State) -> Result<DVector, PropagationError> {
        Ok(state.extract_many(self.broker.subsets())?)
    }

    fn build(&self, epoch: Epoch, coordinates: DVector, template: &State) -> Result<State, PropagationError> {
        Ok(State::try_new(
            epoch,
            coordinates,
            template.frame(),
            self.broker.clone(),
        )?)
    }

    /// Propagates the provided state to the target instant (forward or
    /// backward).
    pub fn state_at(&self, state: &State, instant: Epoch) -> Result<State, PropagationError> {
        let y0 = self.coordinates_of(state)?;
        let duration_s = (instant - state.epoch()).to_seconds();
        let epoch = state.epoch();
        let frame = state.frame();
        let broker = self.broker.clone();
        let dynamics = &self.dynamics;

        let y = self.solver.integrate(&y0, duration_s, |t, y, dy| {
            let at = epoch + t.seconds();
            for term in dynamics {
                term.contribute(at, y, frame, &broker, dy)?;
            }
            Ok(())
        })?;

        self.build(instant, y, state)
    }

    /// Propagates the provided state through an ascending array of instants.
    pub fn states_at(
        &self,
        state: &State,
        instants: &[Epoch],
    ) -> Result<Vec<State>, PropagationError> {
        ensure!(
            instants.windows(2).all(|pair| pair[0] <= pair[1]),
            UnsortedInstantsSnafu
        );

        let y0 = self.coordinates_of(state)?;
        let epoch = state.epoch();
        let frame = state.frame();
        let broker = self.broker.clone();
        let dynamics = &self.dynamics;

        let offsets: Vec<f64> = instants
            .iter()
            .map(|instant| (*instant - epoch).to_seconds())
            .collect();

        let logged = self.solver.integrate_dense(&y0, &offsets, |t, y, dy| {
            let at = epoch + t.seconds();
            for term in dynamics {
                term.contribute(at, y, frame, &broker, dy)?;
            }
            Ok(())
        })?;

        instants
            .iter()
            .zip(logged)
            .map(|(instant, y)| self.build(*instant, y, state))
            .collect()
    }

    /// Propagates until the event condition is first satisfied, or returns
    /// `None` if it does not fire before the horizon.
    ///
    /// The event is bracketed on accepted integrator steps and refined by
    /// bisection down to the propagator's temporal tolerance.
    pub fn propagate_to_event(
        &self,
        state: &State,
        condition: &EventCondition,
        horizon: Epoch,
    ) -> Result<Option<State>, PropagationError> {
        let y0 = self.coordinates_of(state)?;
        let duration_s = (horizon - state.epoch()).to_seconds();
        let epoch = state.epoch();
        let frame = state.frame();
        let broker = self.broker.clone();
        let dynamics = &self.dynamics;

        let rhs = |t: f64, y: &DVector, dy: &mut DVector| {
            let at = epoch + t.seconds();
            for term in dynamics {
                term.contribute(at, y, frame, &broker, dy)?;
            }
            Ok(())
        };

        // Scan for a sign bracket on the accepted steps.
        let initial_state = self.build(epoch, y0.clone(), state)?;
        let mut previous_offset = 0.0;
        let mut previous_y = y0.clone();
        let mut previous_state = initial_state;
        let mut bracket: Option<(f64, DVector, f64)> = None;
        let mut scan_failure: Option<PropagationError> = None;

        self.solver.integrate_observed(&y0, duration_s, rhs, |t, y| {
            let current_state =
                match State::try_new(epoch + t.seconds(), y.clone(), frame, broker.clone()) {
                    Ok(state) => state,
                    Err(error) => {
                        scan_failure = Some(error.into());
                        return false;
                    }
                };
            match condition.is_satisfied(&current_state, &previous_state) {
                Ok(true) => {
                    bracket = Some((previous_offset, previous_y.clone(), t));
                    false
                }
                Ok(false) => {
                    previous_offset = t;
                    previous_y.copy_from(y);
                    previous_state = current_state;
                    true
                }
                Err(error) => {
                    scan_failure = Some(error.into());
                    false
                }
            }
        })?;

        if let Some(error) = scan_failure {
            return Err(error);
        }
        let Some((mut lo_offset, mut lo_y, mut hi_offset)) = bracket else {
            return Ok(None);
        };

        // Bisect: keep the invariant that the event fires in (lo, hi].
        let tolerance_s = self.event_time_tol.to_seconds();
        let mut lo_state = self.build(epoch + lo_offset.seconds(), lo_y.clone(), state)?;

        while hi_offset - lo_offset > tolerance_s {
            let mid_offset = lo_offset + (hi_offset - lo_offset) / 2.0;
            let mid_y = self.solver.integrate(&lo_y, mid_offset - lo_offset, rhs)?;
            let mid_state = self.build(epoch + mid_offset.seconds(), mid_y.clone(), state)?;

            if condition.is_satisfied(&mid_state, &lo_state)? {
                hi_offset = mid_offset;
            } else {
                lo_offset = mid_offset;
                lo_y = mid_y;
                lo_state = mid_state;
            }
        }

        let final_y = self.solver.integrate(&lo_y, hi_offset - lo_offset, rhs)?;
        Ok(Some(self.build(epoch + hi_offset.seconds(), final_y, state)?))
    }
}

#[cfg(test)]
mod propagator_ut {
    use super::*;
    use crate::astro::coe::ClassicalElements;
    use crate::constants::frames::EARTH_J2000;
    use crate::constants::usual::EARTH_GM_KM3_S2;
    use crate::dynamics::{CentralBodyGravity, PositionDerivative};
    use crate::events::{AngularCondition, AngularCriterion, AngularElement};
    use crate::f64_eq_tol;
    use crate::state::{CARTESIAN_POSITION, CARTESIAN_VELOCITY};

    fn epoch() -> Epoch {
        Epoch::from_gregorian_utc_at_midnight(2018, 1, 1)
    }

    fn two_body_propagator() -> Propagator {
        Propagator::try_new(
            vec![
                Dynamics::PositionDerivative(PositionDerivative),
                Dynamics::CentralBodyGravity(CentralBodyGravity::new(EARTH_GM_KM3_S2)),
            ],
            NumericalSolver::default(),
            1.microseconds(),
        )
        .unwrap()
    }

    fn circular_state() -> State {
        let coe = ClassicalElements::try_keplerian(7000.0, 0.0, 45.0, 0.0, 0.0, 0.0).unwrap();
        State::from_cartesian(&coe.to_cartesian(epoch(), EARTH_J2000).unwrap())
    }

    #[test]
    fn broker_is_union_of_subsets() {
        let propagator = two_body_propagator();
        assert_eq!(
            propagator.broker().subsets(),
            &[CARTESIAN_POSITION, CARTESIAN_VELOCITY]
        );
    }

    #[test]
    fn kepler_problem_round_trip() {
        let propagator = two_body_propagator();
        let state = circular_state();
        let period = ClassicalElements::try_keplerian(7000.0, 0.0, 45.0, 0.0, 0.0, 0.0)
            .unwrap()
            .period(EARTH_GM_KM3_S2);

        let back = propagator.state_at(&state, epoch() + period).unwrap();

        // Within 1 mm and 1 um/s after one orbit at 1e-12 relative tolerance.
        let delta_position = (back.position_km().unwrap()
            - state.position_km().unwrap())
        .norm();
        let delta_velocity = (back.velocity_km_s().unwrap()
            - state.velocity_km_s().unwrap())
        .norm();
        assert!(delta_position < 1e-6, "position error {delta_position} km");
        assert!(delta_velocity < 1e-9, "velocity error {delta_velocity} km/s");
    }

    #[test]
    fn states_at_requires_sorted_instants() {
        let propagator = two_body_propagator();
        let state = circular_state();
        let result = propagator.states_at(
            &state,
            &[epoch() + 100.seconds(), epoch() + 50.seconds()],
        );
        assert!(matches!(result, Err(PropagationError::UnsortedInstants)));

        let states = propagator
            .states_at(&state, &[epoch() + 50.seconds(), epoch() + 100.seconds()])
            .unwrap();
        assert_eq!(states.len(), 2);
        assert_eq!(states[1].epoch(), epoch() + 100.seconds());
    }

    #[test]
    fn event_finds_the_antipode() {
        let propagator = two_body_propagator();
        let state = circular_state();
        let period_s = ClassicalElements::try_keplerian(7000.0, 0.0, 45.0, 0.0, 0.0, 0.0)
            .unwrap()
            .period(EARTH_GM_KM3_S2)
            .to_seconds();

        // Starting at the ascending node, the 180 degree argument of
        // latitude is reached half a period later.
        let condition = EventCondition::Angular(AngularCondition::classical(
            AngularElement::TrueAnomaly,
            core::f64::consts::PI,
            AngularCriterion::PositiveCrossing,
        ));

        let hit = propagator
            .propagate_to_event(&state, &condition, epoch() + (2.0 * period_s).seconds())
            .unwrap()
            .expect("the crossing fires within two periods");

        f64_eq_tol!(
            (hit.epoch() - epoch()).to_seconds(),
            period_s / 2.0,
            1e-3,
            "event at half period"
        );
    }

    #[test]
    fn event_none_within_horizon() {
        let propagator = two_body_propagator();
        let state = circular_state();

        let condition = EventCondition::Angular(AngularCondition::classical(
            AngularElement::TrueAnomaly,
            core::f64::consts::PI,
            AngularCriterion::PositiveCrossing,
        ));

        // A ten second horizon never reaches the antipode.
        let hit = propagator
            .propagate_to_event(&state, &condition, epoch() + 10.seconds())
            .unwrap();
        assert!(hit.is_none());
    }
}
