/*
 * Apsis Astrodynamics Toolkit
 * Copyright (C) 2024-onward the Apsis contributors (cf. AUTHORS.md)
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use hifitime::Epoch;
use snafu::prelude::*;

use crate::frames::Frame;

#[derive(Copy, Clone, PartialEq, Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MathError {
    #[snafu(display("prevented a division by zero when {action}"))]
    DivisionByZero { action: &'static str },
    #[snafu(display("{msg}: {value}"))]
    DomainError { value: f64, msg: &'static str },
    #[snafu(display("max iterations reached ({iter}) when {action}"))]
    MaxIterationsReached { iter: usize, action: &'static str },
    #[snafu(display("singular linear system encountered when {action}"))]
    SingularMatrix { action: &'static str },
}

#[derive(Copy, Clone, PartialEq, Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PhysicsError {
    #[snafu(display("{param} is undefined"))]
    Undefined { param: &'static str },
    #[snafu(display("epochs {epoch1} and {epoch2} differ while {action}"))]
    EpochMismatch {
        action: &'static str,
        epoch1: Epoch,
        epoch2: Epoch,
    },
    #[snafu(display("frames {frame1} and {frame2} differ while {action}"))]
    FrameMismatch {
        action: &'static str,
        frame1: Frame,
        frame2: Frame,
    },
    #[snafu(display("{action} requires the frame {frame} to have {data} defined"))]
    MissingFrameData {
        action: &'static str,
        data: &'static str,
        frame: Frame,
    },
    #[snafu(display("{action} requires a quasi-inertial frame, but {frame} is not"))]
    NotQuasiInertial {
        action: &'static str,
        frame: Frame,
    },
    #[snafu(display("parabolic orbits are physically impossible and the eccentricity calculated to be within {limit:e} of 1.0"))]
    ParabolicEccentricity { limit: f64 },
    #[snafu(display("parabolic orbits are physically impossible and the semilatus rectum (semi-parameter) calculated to be {p}"))]
    ParabolicSemiParam { p: f64 },
    #[snafu(display("hyperbolic true anomaly is physically impossible: {ta_deg} deg"))]
    HyperbolicTrueAnomaly { ta_deg: f64 },
    #[snafu(display("infinite value encountered when {action}"))]
    InfiniteValue { action: &'static str },
    #[snafu(display("invalid radius: {action}"))]
    RadiusError { action: &'static str },
    #[snafu(display("invalid mass: {action}"))]
    MassError { action: &'static str },
    #[snafu(display("{source}"))]
    AppliedMath { source: MathError },
    #[snafu(display("mean element conversion out of domain: {detail}"))]
    MeanElement { detail: &'static str },
    #[snafu(display("inclination {inc_deg} deg is within the critical inclination band where the mean element theory is singular"))]
    NearCriticalInclination { inc_deg: f64 },
    #[snafu(display("equinoctial elements are singular for the retrograde inclination {inc_deg} deg"))]
    RetrogradeSingularity { inc_deg: f64 },
    #[snafu(display("not implemented: {feature}"))]
    NotImplemented { feature: &'static str },
}

#[derive(Clone, PartialEq, Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StateError {
    #[snafu(display("coordinate subset {name} registered more than once in the broker"))]
    DuplicateSubset { name: &'static str },
    #[snafu(display("coordinate vector has {got} entries but the broker arity is {expected}"))]
    ArityMismatch { expected: usize, got: usize },
    #[snafu(display("coordinate subset {name} is not part of this state"))]
    MissingSubset { name: &'static str },
    #[snafu(display("states at {epoch1} and {epoch2} cannot be differenced"))]
    InstantMismatch { epoch1: Epoch, epoch2: Epoch },
    #[snafu(display("states in {frame1} and {frame2} cannot be differenced"))]
    StateFrameMismatch { frame1: Frame, frame2: Frame },
    #[snafu(display("states with different coordinate subsets cannot be differenced"))]
    BrokerMismatch,
    #[snafu(context(false), display("{source}"))]
    StatePhysics { source: PhysicsError },
}

#[derive(Clone, PartialEq, Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum IntegrationError {
    #[snafu(display(
        "step limit ({max_steps}) reached after {elapsed_s} s of the requested {requested_s} s"
    ))]
    StepLimitExceeded {
        max_steps: usize,
        elapsed_s: f64,
        requested_s: f64,
        /// Last accepted integration state.
        last_state: Vec<f64>,
    },
    #[snafu(display("the dynamics could not be evaluated: {source}"))]
    DynamicsEvaluation { source: PhysicsError },
    #[snafu(display("integration tolerances must be strictly positive, got {value}"))]
    NonPositiveTolerance { value: f64 },
}

#[derive(Clone, PartialEq, Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PropagationError {
    #[snafu(context(false), display("{source}"))]
    PropIntegration { source: IntegrationError },
    #[snafu(context(false), display("{source}"))]
    PropState { source: StateError },
    #[snafu(context(false), display("{source}"))]
    PropPhysics { source: PhysicsError },
    #[snafu(display("requested instants must be sorted in the propagation direction"))]
    UnsortedInstants,
}

#[derive(Clone, PartialEq, Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum TleError {
    #[snafu(display("line {line} must have 69 characters, got {got}"))]
    InvalidLineLength { line: usize, got: usize },
    #[snafu(display("line {line} must start with the character '{expected}'"))]
    InvalidLineNumber { line: usize, expected: char },
    #[snafu(display("line {line} column {column} must be a space character"))]
    UnexpectedCharacter { line: usize, column: usize },
    #[snafu(display("line {line} checksum is {expected} but the digit sum yields {computed}"))]
    ChecksumMismatch {
        line: usize,
        expected: u8,
        computed: u8,
    },
    #[snafu(display("could not parse {field}: {reason}"))]
    FieldParse { field: &'static str, reason: String },
    #[snafu(display("lines 1 and 2 have different satellite numbers ({first} and {second})"))]
    SatelliteNumberMismatch { first: u32, second: u32 },
    #[snafu(display("{field} = {value} cannot be represented in the fixed column format"))]
    Unrepresentable { field: &'static str, value: f64 },
}

#[derive(Clone, PartialEq, Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum EstimationError {
    #[snafu(display("{param} is undefined"))]
    UndefinedInput { param: &'static str },
    #[snafu(display("max iteration count must be greater than 0"))]
    ZeroIterationCount,
    #[snafu(display("RMS update threshold must be greater than 0"))]
    NonPositiveThreshold,
    #[snafu(display("initial guess state and observation states must share the frame {expected}, got {got}"))]
    ObservationFrameMismatch { expected: Frame, got: Frame },
    #[snafu(display("all observations must share the coordinate subsets of the first observation"))]
    ObservationSubsetMismatch,
    #[snafu(display(
        "{observation_count} observations of dimension {observation_dimension} cannot determine {estimation_dimension} parameters"
    ))]
    UnderdeterminedSystem {
        observation_count: usize,
        observation_dimension: usize,
        estimation_dimension: usize,
    },
    #[snafu(display("sigma for subset {subset} must be greater than 0, got {value}"))]
    NonPositiveSigma { subset: &'static str, value: f64 },
    #[snafu(display("sigma dictionary covers {got} subsets but the state has {expected}"))]
    SigmaCountMismatch { expected: usize, got: usize },
    #[snafu(display("normal equations became singular at iteration {iteration}"))]
    SingularNormalEquations { iteration: usize },
    #[snafu(display("residual arrays must have the same length ({expected} and {got})"))]
    ResidualLengthMismatch { expected: usize, got: usize },
    #[snafu(context(false), display("{source}"))]
    EstimationPropagation { source: PropagationError },
    #[snafu(context(false), display("{source}"))]
    EstimationState { source: StateError },
    #[snafu(context(false), display("{source}"))]
    EstimationPhysics { source: PhysicsError },
    #[snafu(context(false), display("{source}"))]
    EstimationTle { source: TleError },
}

#[derive(Clone, PartialEq, Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConjunctionError {
    #[snafu(display("states are co-located"))]
    CoLocatedStates,
    #[snafu(display("search interval must end after it starts"))]
    InvalidInterval,
    #[snafu(display("search step and temporal tolerance must be strictly positive"))]
    NonPositiveStep,
    #[snafu(context(false), display("{source}"))]
    ConjunctionPropagation { source: PropagationError },
}
