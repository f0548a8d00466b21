/*
 * Apsis Astrodynamics Toolkit
 * Copyright (C) 2024-onward the Apsis contributors (cf. AUTHORS.md)
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Named contributions to the state derivative, composed by the propagator.
//!
//! The built-in terms form a closed set dispatched by match, which keeps the
//! inner Runge-Kutta loop free of virtual calls; [Dynamics::Custom] is the
//! escape hatch for user-provided terms.

use core::ops::Range;
use std::sync::Arc;

use hifitime::Epoch;

use crate::astro::PhysicsResult;
use crate::errors::PhysicsError;
use crate::frames::Frame;
use crate::math::DVector;
use crate::state::{CoordinateBroker, CoordinateSubset, CARTESIAN_POSITION, CARTESIAN_VELOCITY};

pub mod drag;
pub mod gravity;
pub mod qlaw;
pub mod thrust;

pub use drag::AtmosphericDrag;
pub use gravity::{CentralBodyGravity, ThirdBodyGravity, ZonalGravity};
pub use qlaw::{GradientStrategy, QLaw, QLawWeights};
pub use thrust::{GuidanceLaw, LocalOrbitalFrameKind, Thruster};

/// A contribution to the time derivative of a subset of the state vector.
pub trait DynamicsTerm: Send + Sync {
    /// Name of the contribution, for diagnostics.
    fn name(&self) -> &'static str;

    /// Subsets that must be present in the state for this term to evaluate.
    fn read_subsets(&self) -> Vec<CoordinateSubset>;

    /// Subsets whose derivative this term contributes to (additively).
    fn write_subsets(&self) -> Vec<CoordinateSubset>;

    /// Whether the contribution is independent of the epoch.
    fn is_autonomous(&self) -> bool {
        true
    }

    /// Adds this term's contribution to the `rates` vector, which is laid out
    /// by the provided broker, as are the input coordinates.
    fn contribute(
        &self,
        epoch: Epoch,
        coordinates: &DVector,
        frame: Frame,
        broker: &CoordinateBroker,
        rates: &mut DVector,
    ) -> PhysicsResult<()>;
}

/// The closed set of built-in dynamics, plus the user escape hatch.
#[derive(Clone)]
pub enum Dynamics {
    PositionDerivative(PositionDerivative),
    CentralBodyGravity(CentralBodyGravity),
    ZonalGravity(ZonalGravity),
    ThirdBodyGravity(ThirdBodyGravity),
    AtmosphericDrag(AtmosphericDrag),
    Thruster(Thruster),
    Custom(Arc<dyn DynamicsTerm>),
}

impl Dynamics {
    pub fn name(&self) -> &'static str {
        match self {
            Self::PositionDerivative(term) => term.name(),
            Self::CentralBodyGravity(term) => term.name(),
            Self::ZonalGravity(term) => term.name(),
            Self::ThirdBodyGravity(term) => term.name(),
            Self::AtmosphericDrag(term) => term.name(),
            Self::Thruster(term) => term.name(),
            Self::Custom(term) => term.name(),
        }
    }

    pub fn read_subsets(&self) -> Vec<CoordinateSubset> {
        match self {
            Self::PositionDerivative(term) => term.read_subsets(),
            Self::CentralBodyGravity(term) => term.read_subsets(),
            Self::ZonalGravity(term) => term.read_subsets(),
            Self::ThirdBodyGravity(term) => term.read_subsets(),
            Self::AtmosphericDrag(term) => term.read_subsets(),
            Self::Thruster(term) => term.read_subsets(),
            Self::Custom(term) => term.read_subsets(),
        }
    }

    pub fn write_subsets(&self) -> Vec<CoordinateSubset> {
        match self {
            Self::PositionDerivative(term) => term.write_subsets(),
            Self::CentralBodyGravity(term) => term.write_subsets(),
            Self::ZonalGravity(term) => term.write_subsets(),
            Self::ThirdBodyGravity(term) => term.write_subsets(),
            Self::AtmosphericDrag(term) => term.write_subsets(),
            Self::Thruster(term) => term.write_subsets(),
            Self::Custom(term) => term.write_subsets(),
        }
    }

    pub fn is_autonomous(&self) -> bool {
        match self {
            Self::PositionDerivative(term) => term.is_autonomous(),
            Self::CentralBodyGravity(term) => term.is_autonomous(),
            Self::ZonalGravity(term) => term.is_autonomous(),
            Self::ThirdBodyGravity(term) => term.is_autonomous(),
            Self::AtmosphericDrag(term) => term.is_autonomous(),
            Self::Thruster(term) => term.is_autonomous(),
            Self::Custom(term) => term.is_autonomous(),
        }
    }

    pub fn contribute(
        &self,
        epoch: Epoch,
        coordinates: &DVector,
        frame: Frame,
        broker: &CoordinateBroker,
        rates: &mut DVector,
    ) -> PhysicsResult<()> {
        match self {
            Self::PositionDerivative(term) => {
                term.contribute(epoch, coordinates, frame, broker, rates)
            }
            Self::CentralBodyGravity(term) => {
                term.contribute(epoch, coordinates, frame, broker, rates)
            }
            Self::ZonalGravity(term) => term.contribute(epoch, coordinates, frame, broker, rates),
            Self::ThirdBodyGravity(term) => {
                term.contribute(epoch, coordinates, frame, broker, rates)
            }
            Self::AtmosphericDrag(term) => {
                term.contribute(epoch, coordinates, frame, broker, rates)
            }
            Self::Thruster(term) => term.contribute(epoch, coordinates, frame, broker, rates),
            Self::Custom(term) => term.contribute(epoch, coordinates, frame, broker, rates),
        }
    }
}

/// The kinematic contribution: the derivative of the position is the velocity.
#[derive(Copy, Clone, Debug, Default)]
pub struct PositionDerivative;

impl DynamicsTerm for PositionDerivative {
    fn name(&self) -> &'static str {
        "position derivative"
    }

    fn read_subsets(&self) -> Vec<CoordinateSubset> {
        vec![CARTESIAN_POSITION, CARTESIAN_VELOCITY]
    }

    fn write_subsets(&self) -> Vec<CoordinateSubset> {
        vec![CARTESIAN_POSITION]
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
        for i in 0..3 {
            rates[position.start + i] += coordinates[velocity.start + i];
        }
        Ok(())
    }
}

/// Index range of a subset within the propagation broker, surfaced as an
/// undefined-input error when the subset was not registered.
pub(crate) fn subset_range(
    broker: &CoordinateBroker,
    subset: &CoordinateSubset,
) -> PhysicsResult<Range<usize>> {
    broker
        .range_of(subset)
        .ok_or(PhysicsError::Undefined { param: subset.name })
}
