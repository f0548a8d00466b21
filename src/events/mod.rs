/*
 * Apsis Astrodynamics Toolkit
 * Copyright (C) 2024-onward the Apsis contributors (cf. AUTHORS.md)
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Event conditions evaluated along a trajectory.
//!
//! A condition inspects the previous and current states of a propagation and
//! decides whether the event fired between them. The element factories
//! convert the incoming Cartesian state to classical or mean elements on
//! every evaluation, which stays cheap because a condition is only evaluated
//! once or twice per integrator step.

use core::f64::consts::{FRAC_PI_2, TAU};
use core::fmt;
use std::sync::Arc;

use crate::astro::blm::BrouwerLyddaneMean;
use crate::astro::coe::ClassicalElements;
use crate::astro::PhysicsResult;
use crate::errors::PhysicsError;
use crate::math::angles::{between_0_tau, between_pm_pi};
use crate::math::cartesian::CartesianState;
use crate::state::State;

/// Criteria on the sign of a scalar event function between two states.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EventCriterion {
    /// The function crossed zero from negative to positive.
    PositiveCrossing,
    /// The function crossed zero from positive to negative.
    NegativeCrossing,
    /// The function crossed zero in either direction.
    AnyCrossing,
    /// The function is positive at the current state.
    StrictlyPositive,
    /// The function is negative at the current state.
    StrictlyNegative,
}

/// Criteria on an angular event function, interpreted modulo 2 pi.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum AngularCriterion {
    /// The wrapped difference to the target crossed zero upward.
    PositiveCrossing,
    /// The wrapped difference to the target crossed zero downward.
    NegativeCrossing,
    /// The wrapped difference to the target crossed zero either way.
    AnyCrossing,
    /// The angle entered or left the counterclockwise arc from lo to hi.
    WithinRange { lo_rad: f64, hi_rad: f64 },
}

type Evaluator = Arc<dyn Fn(&State) -> PhysicsResult<f64> + Send + Sync>;

/// A scalar-valued event condition `g(state) - target` paired with a
/// criterion.
#[derive(Clone)]
pub struct RealCondition {
    pub name: String,
    pub criterion: EventCriterion,
    evaluator: Evaluator,
    pub target: f64,
}

impl RealCondition {
    pub fn new(
        name: impl Into<String>,
        criterion: EventCriterion,
        evaluator: Evaluator,
        target: f64,
    ) -> Self {
        Self {
            name: name.into(),
            criterion,
            evaluator,
            target,
        }
    }

    /// Condition over a real-valued element of the osculating classical set
    /// of the state.
    pub fn classical(element: RealElement, target: f64, criterion: EventCriterion) -> Self {
        Self::new(
            format!("osculating {element}"),
            criterion,
            Arc::new(move |state: &State| {
                let elements = ClassicalElements::from_cartesian(&cartesian_of(state)?)?;
                Ok(element.of(&elements))
            }),
            target,
        )
    }

    /// Condition over a real-valued Brouwer-Lyddane mean element of the state.
    pub fn mean_classical(element: RealElement, target: f64, criterion: EventCriterion) -> Self {
        Self::new(
            format!("mean {element}"),
            criterion,
            Arc::new(move |state: &State| {
                let mean = BrouwerLyddaneMean::from_cartesian(&cartesian_of(state)?)?;
                Ok(element.of_mean(&mean))
            }),
            target,
        )
    }

    /// The shifted event function `g(state) - target`.
    pub fn evaluate(&self, state: &State) -> PhysicsResult<f64> {
        Ok((self.evaluator)(state)? - self.target)
    }

    /// Whether the event fired between the previous and the current state.
    pub fn is_satisfied(&self, current: &State, previous: &State) -> PhysicsResult<bool> {
        let curr = self.evaluate(current)?;
        let prev = self.evaluate(previous)?;
        Ok(match self.criterion {
            EventCriterion::PositiveCrossing => prev < 0.0 && curr >= 0.0,
            EventCriterion::NegativeCrossing => prev > 0.0 && curr <= 0.0,
            EventCriterion::AnyCrossing => (prev < 0.0) != (curr < 0.0),
            EventCriterion::StrictlyPositive => curr > 0.0,
            EventCriterion::StrictlyNegative => curr < 0.0,
        })
    }
}

impl fmt::Display for RealCondition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {:?} {}", self.name, self.criterion, self.target)
    }
}

/// An angular event condition, evaluated modulo 2 pi.
#[derive(Clone)]
pub struct AngularCondition {
    pub name: String,
    pub criterion: AngularCriterion,
    evaluator: Evaluator,
    pub target_rad: f64,
}

impl AngularCondition {
    pub fn new(
        name: impl Into<String>,
        criterion: AngularCriterion,
        evaluator: Evaluator,
        target_rad: f64,
    ) -> Self {
        Self {
            name: name.into(),
            criterion,
            evaluator,
            target_rad,
        }
    }

    /// Condition over an angular element of the osculating classical set of
    /// the state.
    pub fn classical(element: AngularElement, target_rad: f64, criterion: AngularCriterion) -> Self {
        Self::new(
            format!("osculating {element}"),
            criterion,
            Arc::new(move |state: &State| {
                let elements = ClassicalElements::from_cartesian(&cartesian_of(state)?)?;
                element.of(&elements)
            }),
            target_rad,
        )
    }

    /// Condition over an angular Brouwer-Lyddane mean element of the state.
    pub fn mean_classical(
        element: AngularElement,
        target_rad: f64,
        criterion: AngularCriterion,
    ) -> Self {
        Self::new(
            format!("mean {element}"),
            criterion,
            Arc::new(move |state: &State| {
                let mean = BrouwerLyddaneMean::from_cartesian(&cartesian_of(state)?)?;
                Ok(element.of_mean(&mean))
            }),
            target_rad,
        )
    }

    /// The raw angle, wrapped to [0, 2 pi).
    pub fn evaluate(&self, state: &State) -> PhysicsResult<f64> {
        Ok(between_0_tau((self.evaluator)(state)?))
    }

    /// Whether the event fired between the previous and the current state.
    ///
    /// Crossings compare the differences to the target wrapped to
    /// [-pi, pi); a jump larger than a quarter turn between two successive
    /// states is treated as wrap-around rather than a crossing.
    pub fn is_satisfied(&self, current: &State, previous: &State) -> PhysicsResult<bool> {
        let curr = self.evaluate(current)?;
        let prev = self.evaluate(previous)?;
        Ok(match self.criterion {
            AngularCriterion::PositiveCrossing => {
                let curr_diff = between_pm_pi(curr - self.target_rad);
                let prev_diff = between_pm_pi(prev - self.target_rad);
                prev_diff < 0.0
                    && curr_diff >= 0.0
                    && prev_diff.abs() < FRAC_PI_2
                    && curr_diff < FRAC_PI_2
            }
            AngularCriterion::NegativeCrossing => {
                let curr_diff = between_pm_pi(curr - self.target_rad);
                let prev_diff = between_pm_pi(prev - self.target_rad);
                prev_diff > 0.0
                    && curr_diff <= 0.0
                    && prev_diff < FRAC_PI_2
                    && curr_diff.abs() < FRAC_PI_2
            }
            AngularCriterion::AnyCrossing => {
                let curr_diff = between_pm_pi(curr - self.target_rad);
                let prev_diff = between_pm_pi(prev - self.target_rad);
                (prev_diff < 0.0) != (curr_diff < 0.0)
                    && prev_diff.abs() < FRAC_PI_2
                    && curr_diff.abs() < FRAC_PI_2
            }
            AngularCriterion::WithinRange { lo_rad, hi_rad } => {
                in_ccw_arc(curr, lo_rad, hi_rad) != in_ccw_arc(prev, lo_rad, hi_rad)
            }
        })
    }
}

impl fmt::Display for AngularCondition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {:?} {}", self.name, self.criterion, self.target_rad)
    }
}

/// Whether the angle lies in the counterclockwise arc from lo to hi.
fn in_ccw_arc(angle_rad: f64, lo_rad: f64, hi_rad: f64) -> bool {
    let span = (hi_rad - lo_rad).rem_euclid(TAU);
    (angle_rad - lo_rad).rem_euclid(TAU) <= span
}

/// The real-valued classical elements available to condition factories.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RealElement {
    SmaKm,
    Ecc,
}

impl RealElement {
    fn of(&self, elements: &ClassicalElements) -> f64 {
        match self {
            Self::SmaKm => elements.sma_km,
            Self::Ecc => elements.ecc,
        }
    }

    fn of_mean(&self, mean: &BrouwerLyddaneMean) -> f64 {
        match self {
            Self::SmaKm => mean.sma_km,
            Self::Ecc => mean.ecc,
        }
    }
}

impl fmt::Display for RealElement {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::SmaKm => write!(f, "semi-major axis"),
            Self::Ecc => write!(f, "eccentricity"),
        }
    }
}

/// The angular classical elements available to condition factories, in
/// radians.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AngularElement {
    Inc,
    Raan,
    Aop,
    TrueAnomaly,
    MeanAnomaly,
    EccentricAnomaly,
}

impl AngularElement {
    fn of(&self, elements: &ClassicalElements) -> PhysicsResult<f64> {
        Ok(match self {
            Self::Inc => elements.inc_deg.to_radians(),
            Self::Raan => elements.raan_deg.to_radians(),
            Self::Aop => elements.aop_deg.to_radians(),
            Self::TrueAnomaly => elements.true_anomaly_deg()?.to_radians(),
            Self::MeanAnomaly => elements.mean_anomaly_deg()?.to_radians(),
            Self::EccentricAnomaly => elements.eccentric_anomaly_deg()?.to_radians(),
        })
    }

    fn of_mean(&self, mean: &BrouwerLyddaneMean) -> f64 {
        match self {
            Self::Inc => mean.inc_deg.to_radians(),
            Self::Raan => mean.raan_deg.to_radians(),
            Self::Aop => mean.aop_deg.to_radians(),
            // The mean set stores its mean anomaly; the anomaly conditions
            // all target it.
            Self::TrueAnomaly | Self::MeanAnomaly | Self::EccentricAnomaly => {
                mean.ma_deg.to_radians()
            }
        }
    }
}

impl fmt::Display for AngularElement {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Inc => write!(f, "inclination"),
            Self::Raan => write!(f, "right ascension of the ascending node"),
            Self::Aop => write!(f, "argument of periapsis"),
            Self::TrueAnomaly => write!(f, "true anomaly"),
            Self::MeanAnomaly => write!(f, "mean anomaly"),
            Self::EccentricAnomaly => write!(f, "eccentric anomaly"),
        }
    }
}

/// Either family of event condition, as consumed by the propagator.
#[derive(Clone)]
pub enum EventCondition {
    Real(RealCondition),
    Angular(AngularCondition),
}

impl EventCondition {
    pub fn name(&self) -> &str {
        match self {
            Self::Real(condition) => &condition.name,
            Self::Angular(condition) => &condition.name,
        }
    }

    pub fn is_satisfied(&self, current: &State, previous: &State) -> PhysicsResult<bool> {
        match self {
            Self::Real(condition) => condition.is_satisfied(current, previous),
            Self::Angular(condition) => condition.is_satisfied(current, previous),
        }
    }
}

impl From<RealCondition> for EventCondition {
    fn from(condition: RealCondition) -> Self {
        Self::Real(condition)
    }
}

impl From<AngularCondition> for EventCondition {
    fn from(condition: AngularCondition) -> Self {
        Self::Angular(condition)
    }
}

fn cartesian_of(state: &State) -> PhysicsResult<CartesianState> {
    state.to_cartesian().map_err(|_| PhysicsError::Undefined {
        param: "Cartesian position and velocity subsets",
    })
}

#[cfg(test)]
mod events_ut {
    use super::*;
    use crate::constants::frames::EARTH_J2000;
    use hifitime::Epoch;

    fn state_from_coe(coe: &ClassicalElements, epoch: Epoch) -> State {
        State::from_cartesian(&coe.to_cartesian(epoch, EARTH_J2000).unwrap())
    }

    #[test]
    fn real_crossing_criteria() {
        let epoch = Epoch::from_gregorian_utc_at_midnight(2020, 1, 1);
        let low = ClassicalElements::try_keplerian(6900.0, 0.001, 45.0, 0.0, 0.0, 10.0).unwrap();
        let high = ClassicalElements::try_keplerian(7100.0, 0.001, 45.0, 0.0, 0.0, 10.0).unwrap();
        let state_low = state_from_coe(&low, epoch);
        let state_high = state_from_coe(&high, epoch);

        let ascending =
            RealCondition::classical(RealElement::SmaKm, 7000.0, EventCriterion::PositiveCrossing);
        assert!(ascending.is_satisfied(&state_high, &state_low).unwrap());
        assert!(!ascending.is_satisfied(&state_low, &state_high).unwrap());

        let descending =
            RealCondition::classical(RealElement::SmaKm, 7000.0, EventCriterion::NegativeCrossing);
        assert!(descending.is_satisfied(&state_low, &state_high).unwrap());

        let any = RealCondition::classical(RealElement::SmaKm, 7000.0, EventCriterion::AnyCrossing);
        assert!(any.is_satisfied(&state_high, &state_low).unwrap());
        assert!(any.is_satisfied(&state_low, &state_high).unwrap());

        let positive =
            RealCondition::classical(RealElement::SmaKm, 7000.0, EventCriterion::StrictlyPositive);
        assert!(positive.is_satisfied(&state_high, &state_low).unwrap());
        assert!(!positive.is_satisfied(&state_low, &state_high).unwrap());
    }

    #[test]
    fn angular_crossing_wraps() {
        let epoch = Epoch::from_gregorian_utc_at_midnight(2020, 1, 1);
        let before =
            ClassicalElements::try_keplerian(7000.0, 0.01, 45.0, 0.0, 0.0, 350.0).unwrap();
        let after = ClassicalElements::try_keplerian(7000.0, 0.01, 45.0, 0.0, 0.0, 5.0).unwrap();
        let state_before = state_from_coe(&before, epoch);
        let state_after = state_from_coe(&after, epoch);

        // Periapsis passage: the true anomaly crosses zero upward across the
        // wrap.
        let periapsis = AngularCondition::classical(
            AngularElement::TrueAnomaly,
            0.0,
            AngularCriterion::PositiveCrossing,
        );
        assert!(periapsis.is_satisfied(&state_after, &state_before).unwrap());
        assert!(!periapsis
            .is_satisfied(&state_before, &state_after)
            .unwrap());
    }

    #[test]
    fn angular_range_entry() {
        let epoch = Epoch::from_gregorian_utc_at_midnight(2020, 1, 1);
        let outside =
            ClassicalElements::try_keplerian(7000.0, 0.01, 45.0, 0.0, 0.0, 80.0).unwrap();
        let inside =
            ClassicalElements::try_keplerian(7000.0, 0.01, 45.0, 0.0, 0.0, 100.0).unwrap();
        let state_outside = state_from_coe(&outside, epoch);
        let state_inside = state_from_coe(&inside, epoch);

        let range = AngularCondition::classical(
            AngularElement::TrueAnomaly,
            0.0,
            AngularCriterion::WithinRange {
                lo_rad: 90.0_f64.to_radians(),
                hi_rad: 180.0_f64.to_radians(),
            },
        );
        // Entering and leaving the arc both fire; staying put does not.
        assert!(range.is_satisfied(&state_inside, &state_outside).unwrap());
        assert!(range.is_satisfied(&state_outside, &state_inside).unwrap());
        assert!(!range.is_satisfied(&state_inside, &state_inside).unwrap());
    }

    #[test]
    fn arc_membership() {
        let lo = 0.5;
        let hi = 1.5;
        assert!(in_ccw_arc(1.0, lo, hi));
        assert!(!in_ccw_arc(2.0, lo, hi));
        // An arc crossing zero.
        assert!(in_ccw_arc(0.1, 6.0, 0.5));
        assert!(!in_ccw_arc(3.0, 6.0, 0.5));
    }
}
