/*
 * Apsis Astrodynamics Toolkit
 * Copyright (C) 2024-onward the Apsis contributors (cf. AUTHORS.md)
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Instant-tagged coordinate vectors with a named subset schema.

use core::fmt;
use core::ops::Range;
use std::sync::Arc;

use hifitime::Epoch;
use serde_derive::{Deserialize, Serialize};
use snafu::ensure;

use crate::errors::{
    ArityMismatchSnafu, BrokerMismatchSnafu, DuplicateSubsetSnafu, InstantMismatchSnafu,
    MissingSubsetSnafu, StateError, StateFrameMismatchSnafu,
};
use crate::frames::Frame;
use crate::math::cartesian::CartesianState;
use crate::math::{DVector, Vector3};

pub type StateResult<T> = Result<T, StateError>;

/// A named slice of a state vector with a fixed number of elements.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CoordinateSubset {
    pub name: &'static str,
    pub nelems: usize,
}

/// Position in the state frame, in km.
pub const CARTESIAN_POSITION: CoordinateSubset = CoordinateSubset {
    name: "CARTESIAN_POSITION",
    nelems: 3,
};

/// Velocity in the state frame, in km/s.
pub const CARTESIAN_VELOCITY: CoordinateSubset = CoordinateSubset {
    name: "CARTESIAN_VELOCITY",
    nelems: 3,
};

/// Total mass, in kg.
pub const MASS: CoordinateSubset = CoordinateSubset {
    name: "MASS",
    nelems: 1,
};

/// TLE mean element vector: inclination, RAAN, eccentricity, AoP, mean
/// anomaly (degrees) and mean motion (rev/day).
pub const TLE_MEAN_ELEMENTS: CoordinateSubset = CoordinateSubset {
    name: "TLE_MEAN_ELEMENTS",
    nelems: 6,
};

/// SGP4 B* drag term, in inverse Earth radii.
pub const B_STAR: CoordinateSubset = CoordinateSubset {
    name: "B_STAR",
    nelems: 1,
};

/// Maps subset identities to contiguous index ranges of a state vector.
///
/// Subsets are laid out in registration order; identities are unique and the
/// ranges are disjoint and cover `[0, arity)` by construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoordinateBroker {
    subsets: Vec<CoordinateSubset>,
}

impl CoordinateBroker {
    /// Attempts to build a broker over the provided subsets, rejecting duplicates.
    pub fn try_new(subsets: Vec<CoordinateSubset>) -> StateResult<Self> {
        for (index, subset) in subsets.iter().enumerate() {
            ensure!(
                !subsets[..index].contains(subset),
                DuplicateSubsetSnafu { name: subset.name }
            );
        }
        Ok(Self { subsets })
    }

    /// Broker over position and velocity only.
    pub fn cartesian_pos_vel() -> Self {
        Self {
            subsets: vec![CARTESIAN_POSITION, CARTESIAN_VELOCITY],
        }
    }

    pub fn subsets(&self) -> &[CoordinateSubset] {
        &self.subsets
    }

    /// Total number of coordinates described by this broker.
    pub fn arity(&self) -> usize {
        self.subsets.iter().map(|s| s.nelems).sum()
    }

    /// Returns the index range of the provided subset, if registered.
    pub fn range_of(&self, subset: &CoordinateSubset) -> Option<Range<usize>> {
        let mut offset = 0;
        for registered in &self.subsets {
            if registered == subset {
                return Some(offset..offset + registered.nelems);
            }
            offset += registered.nelems;
        }
        None
    }

    pub fn contains(&self, subset: &CoordinateSubset) -> bool {
        self.subsets.contains(subset)
    }
}

/// An immutable instant-tagged coordinate vector in a frame, described by a
/// coordinate broker.
#[derive(Clone, Debug)]
pub struct State {
    epoch: Epoch,
    coordinates: DVector,
    frame: Frame,
    broker: Arc<CoordinateBroker>,
}

impl State {
    /// Attempts to build a state, enforcing that the coordinate vector length
    /// matches the broker arity.
    pub fn try_new(
        epoch: Epoch,
        coordinates: DVector,
        frame: Frame,
        broker: Arc<CoordinateBroker>,
    ) -> StateResult<Self> {
        ensure!(
            coordinates.len() == broker.arity(),
            ArityMismatchSnafu {
                expected: broker.arity(),
                got: coordinates.len(),
            }
        );
        Ok(Self {
            epoch,
            coordinates,
            frame,
            broker,
        })
    }

    /// Builds a position/velocity state from a Cartesian state.
    pub fn from_cartesian(cartesian: &CartesianState) -> Self {
        let mut coordinates = DVector::zeros(6);
        coordinates
            .fixed_rows_mut::<3>(0)
            .copy_from(&cartesian.radius_km);
        coordinates
            .fixed_rows_mut::<3>(3)
            .copy_from(&cartesian.velocity_km_s);
        Self {
            epoch: cartesian.epoch,
            coordinates,
            frame: cartesian.frame,
            broker: Arc::new(CoordinateBroker::cartesian_pos_vel()),
        }
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn frame(&self) -> Frame {
        self.frame
    }

    pub fn coordinates(&self) -> &DVector {
        &self.coordinates
    }

    pub fn broker(&self) -> &CoordinateBroker {
        &self.broker
    }

    pub(crate) fn broker_handle(&self) -> Arc<CoordinateBroker> {
        self.broker.clone()
    }

    pub fn arity(&self) -> usize {
        self.coordinates.len()
    }

    /// Extracts the coordinates of a single subset.
    pub fn extract(&self, subset: &CoordinateSubset) -> StateResult<DVector> {
        let range = self
            .broker
            .range_of(subset)
            .ok_or(StateError::MissingSubset { name: subset.name })?;
        Ok(self.coordinates.rows(range.start, range.len()).into_owned())
    }

    /// Extracts and concatenates the coordinates of several subsets, in the
    /// provided order.
    pub fn extract_many(&self, subsets: &[CoordinateSubset]) -> StateResult<DVector> {
        let total: usize = subsets.iter().map(|s| s.nelems).sum();
        let mut out = DVector::zeros(total);
        let mut offset = 0;
        for subset in subsets {
            let piece = self.extract(subset)?;
            out.rows_mut(offset, subset.nelems).copy_from(&piece);
            offset += subset.nelems;
        }
        Ok(out)
    }

    /// Position coordinates, in km.
    pub fn position_km(&self) -> StateResult<Vector3> {
        let range = self
            .broker
            .range_of(&CARTESIAN_POSITION)
            .ok_or(StateError::MissingSubset {
                name: CARTESIAN_POSITION.name,
            })?;
        Ok(self.coordinates.fixed_rows::<3>(range.start).into_owned())
    }

    /// Velocity coordinates, in km/s.
    pub fn velocity_km_s(&self) -> StateResult<Vector3> {
        let range = self
            .broker
            .range_of(&CARTESIAN_VELOCITY)
            .ok_or(StateError::MissingSubset {
                name: CARTESIAN_VELOCITY.name,
            })?;
        Ok(self.coordinates.fixed_rows::<3>(range.start).into_owned())
    }

    /// Total mass, in kg.
    pub fn mass_kg(&self) -> StateResult<f64> {
        Ok(self.extract(&MASS)?[0])
    }

    /// Projects this state onto its Cartesian position and velocity.
    pub fn to_cartesian(&self) -> StateResult<CartesianState> {
        Ok(CartesianState::from_vectors(
            self.position_km()?,
            self.velocity_km_s()?,
            self.epoch,
            self.frame,
        ))
    }

    /// Returns a copy of this state with new coordinates.
    pub fn with_coordinates(&self, coordinates: DVector) -> StateResult<Self> {
        Self::try_new(self.epoch, coordinates, self.frame, self.broker.clone())
    }

    /// Coordinate-wise difference between two states sharing the same
    /// instant, frame, and subsets, as used for observation residuals.
    pub fn try_sub(&self, other: &Self) -> StateResult<Self> {
        ensure!(
            self.epoch == other.epoch,
            InstantMismatchSnafu {
                epoch1: self.epoch,
                epoch2: other.epoch,
            }
        );
        ensure!(
            self.frame == other.frame,
            StateFrameMismatchSnafu {
                frame1: self.frame,
                frame2: other.frame,
            }
        );
        ensure!(self.broker == other.broker, BrokerMismatchSnafu);
        Ok(Self {
            epoch: self.epoch,
            coordinates: &self.coordinates - &other.coordinates,
            frame: self.frame,
            broker: self.broker.clone(),
        })
    }
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        self.epoch == other.epoch
            && self.frame == other.frame
            && self.broker == other.broker
            && self.coordinates == other.coordinates
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "[{:x}] {} {:?}",
            self.frame,
            self.epoch,
            self.coordinates.as_slice()
        )
    }
}

/// Caches a frame and a broker to stamp many (instant, coordinates) pairs.
#[derive(Clone, Debug)]
pub struct StateBuilder {
    frame: Frame,
    broker: Arc<CoordinateBroker>,
}

impl StateBuilder {
    pub fn new(frame: Frame, broker: CoordinateBroker) -> Self {
        Self {
            frame,
            broker: Arc::new(broker),
        }
    }

    /// Builds a builder sharing the frame and broker of an existing state.
    pub fn from_state(state: &State) -> Self {
        Self {
            frame: state.frame,
            broker: state.broker.clone(),
        }
    }

    pub fn frame(&self) -> Frame {
        self.frame
    }

    pub fn broker(&self) -> &CoordinateBroker {
        &self.broker
    }

    pub fn arity(&self) -> usize {
        self.broker.arity()
    }

    pub fn build(&self, epoch: Epoch, coordinates: DVector) -> StateResult<State> {
        State::try_new(epoch, coordinates, self.frame, self.broker.clone())
    }
}

#[cfg(test)]
mod state_ut {
    use super::*;
    use crate::constants::frames::{EARTH_J2000, SUN_J2000};

    fn epoch() -> Epoch {
        Epoch::from_gregorian_utc_at_midnight(2021, 6, 1)
    }

    #[test]
    fn broker_invariants() {
        let broker =
            CoordinateBroker::try_new(vec![CARTESIAN_POSITION, CARTESIAN_VELOCITY, MASS]).unwrap();
        assert_eq!(broker.arity(), 7);
        assert_eq!(broker.range_of(&CARTESIAN_POSITION), Some(0..3));
        assert_eq!(broker.range_of(&CARTESIAN_VELOCITY), Some(3..6));
        assert_eq!(broker.range_of(&MASS), Some(6..7));
        assert_eq!(broker.range_of(&B_STAR), None);

        assert_eq!(
            CoordinateBroker::try_new(vec![MASS, MASS]),
            Err(StateError::DuplicateSubset { name: "MASS" })
        );
    }

    #[test]
    fn arity_enforced() {
        let broker = Arc::new(CoordinateBroker::cartesian_pos_vel());
        let wrong = State::try_new(epoch(), DVector::zeros(5), EARTH_J2000, broker.clone());
        assert_eq!(
            wrong,
            Err(StateError::ArityMismatch {
                expected: 6,
                got: 5
            })
        );
        assert!(State::try_new(epoch(), DVector::zeros(6), EARTH_J2000, broker).is_ok());
    }

    #[test]
    fn cartesian_round_trip() {
        let cartesian = CartesianState::new(
            7000.0,
            -1.2,
            3.5,
            0.1,
            7.5,
            -0.3,
            epoch(),
            EARTH_J2000,
        );
        let state = State::from_cartesian(&cartesian);
        assert_eq!(state.position_km().unwrap(), cartesian.radius_km);
        assert_eq!(state.velocity_km_s().unwrap(), cartesian.velocity_km_s);
        assert_eq!(state.to_cartesian().unwrap(), cartesian);
        assert!(state.mass_kg().is_err());
    }

    #[test]
    fn residual_discipline() {
        let builder = StateBuilder::new(EARTH_J2000, CoordinateBroker::cartesian_pos_vel());
        let a = builder
            .build(epoch(), DVector::from_element(6, 2.0))
            .unwrap();
        let b = builder
            .build(epoch(), DVector::from_element(6, 0.5))
            .unwrap();
        let residual = a.try_sub(&b).unwrap();
        assert_eq!(residual.coordinates(), &DVector::from_element(6, 1.5));

        let sun_state = StateBuilder::new(SUN_J2000, CoordinateBroker::cartesian_pos_vel())
            .build(epoch(), DVector::zeros(6))
            .unwrap();
        assert!(matches!(
            a.try_sub(&sun_state),
            Err(StateError::StateFrameMismatch { .. })
        ));
    }

    #[test]
    fn extract_many_concatenates() {
        let broker =
            CoordinateBroker::try_new(vec![CARTESIAN_POSITION, CARTESIAN_VELOCITY, MASS]).unwrap();
        let builder = StateBuilder::new(EARTH_J2000, broker);
        let mut coordinates = DVector::zeros(7);
        for i in 0..7 {
            coordinates[i] = i as f64;
        }
        let state = builder.build(epoch(), coordinates).unwrap();
        let extracted = state.extract_many(&[MASS, CARTESIAN_POSITION]).unwrap();
        assert_eq!(extracted.as_slice(), &[6.0, 0.0, 1.0, 2.0]);
    }
}
