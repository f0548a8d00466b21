#![doc = include_str!("../README.md")]
/*
 * Apsis Astrodynamics Toolkit
 * Copyright (C) 2024-onward the Apsis contributors (cf. AUTHORS.md)
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

extern crate hifitime;
extern crate log;

pub mod astro;
pub mod conjunction;
pub mod constants;
pub mod dynamics;
pub mod environment;
pub mod errors;
pub mod events;
pub mod frames;
pub mod math;
pub mod propagation;
pub mod solvers;
pub mod state;
pub mod tle;

/// Re-export of hifitime
pub mod time {
    pub use core::str::FromStr;
    pub use hifitime::*;
}

pub mod prelude {
    pub use crate::astro::{
        BrouwerLyddaneMean, ClassicalElements, EquinoctialElements, KeplerModel, PhysicsResult,
        SecularRates,
    };
    pub use crate::conjunction::{CloseApproach, CloseApproachGenerator, Trajectory};
    pub use crate::constants::frames::*;
    pub use crate::dynamics::{Dynamics, DynamicsTerm};
    pub use crate::environment::{Atmosphere, Ephemeris, Sgp4, SolarGeometry};
    pub use crate::events::{
        AngularCondition, AngularCriterion, EventCondition, EventCriterion, RealCondition,
    };
    pub use crate::frames::Frame;
    pub use crate::math::cartesian::CartesianState;
    pub use crate::propagation::{NumericalSolver, Propagator, StepperKind};
    pub use crate::solvers::{FiniteDifferenceSolver, LeastSquaresSolver, TleSolver};
    pub use crate::state::{CoordinateBroker, CoordinateSubset, State, StateBuilder};
    pub use crate::time::*;
    pub use crate::tle::Tle;
}

/// Identifier of a celestial body or orientation, NAIF numbering.
pub type NaifId = i32;
