/*
 * Apsis Astrodynamics Toolkit
 * Copyright (C) 2024-onward the Apsis contributors (cf. AUTHORS.md)
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Batch least-squares estimation by iterated normal equations.
//!
//! Notation follows Tapley, Schutz & Born, Statistical Orbit Determination,
//! chapter 4: at each iteration the information matrix
//! `Lambda = P_bar^-1 + sum H^T R^-1 H` and right-hand side
//! `N = P_bar^-1 x_bar + sum H^T R^-1 y` are accumulated over the
//! observations, the correction `x_hat = Lambda^-1 N` updates the nominal
//! trajectory, and the a-priori deviation is shifted accordingly.

use core::fmt;
use std::collections::HashMap;

use hifitime::Epoch;
use snafu::ensure;

use crate::errors::{
    EstimationError, NonPositiveSigmaSnafu, ObservationFrameMismatchSnafu,
    ObservationSubsetMismatchSnafu, PropagationError, ResidualLengthMismatchSnafu,
    SigmaCountMismatchSnafu, UndefinedInputSnafu, UnderdeterminedSystemSnafu,
    ZeroIterationCountSnafu,
};
use crate::math::{DMatrix, DVector};
use crate::solvers::finite_diff::FiniteDifferenceSolver;
use crate::state::{CoordinateSubset, State, StateBuilder};

pub type EstimationResult<T> = Result<T, EstimationError>;

/// One iteration of the solver: the residual RMS before the correction, and
/// the correction itself.
#[derive(Clone, Debug, PartialEq)]
pub struct Step {
    pub rms_error: f64,
    pub x_hat: DVector,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "rms = {:.6e}, |x_hat| = {:.6e}", self.rms_error, self.x_hat.norm())
    }
}

/// Why the iteration stopped.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TerminationCriteria {
    RmsUpdateThreshold,
    MaximumIterations,
}

impl fmt::Display for TerminationCriteria {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::RmsUpdateThreshold => write!(f, "RMS Update Threshold"),
            Self::MaximumIterations => write!(f, "Maximum Iteration Threshold"),
        }
    }
}

/// Everything the solver learned: the estimate, its covariances, the
/// computed observations of the final iteration, and the step history.
#[derive(Clone, Debug)]
pub struct Analysis {
    pub rms_error: f64,
    pub observation_count: usize,
    pub iteration_count: usize,
    pub termination_criteria: TerminationCriteria,
    pub estimated_state: State,
    pub estimated_covariance: DMatrix,
    pub estimated_frisbee_covariance: DMatrix,
    pub computed_observation_states: Vec<State>,
    pub steps: Vec<Step>,
}

impl Analysis {
    /// Differences the provided observations against the computed
    /// observations of the final iteration.
    pub fn compute_residual_states(&self, observations: &[State]) -> EstimationResult<Vec<State>> {
        ensure!(
            observations.len() == self.computed_observation_states.len(),
            ResidualLengthMismatchSnafu {
                expected: self.computed_observation_states.len(),
                got: observations.len(),
            }
        );
        observations
            .iter()
            .zip(&self.computed_observation_states)
            .map(|(observed, computed)| Ok(observed.try_sub(computed)?))
            .collect()
    }
}

impl fmt::Display for Analysis {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "rms error: {:.6e}", self.rms_error)?;
        writeln!(f, "observation count: {}", self.observation_count)?;
        writeln!(f, "iteration count: {}", self.iteration_count)?;
        write!(f, "termination criteria: {}", self.termination_criteria)
    }
}

/// Batch least-squares solver configuration.
#[derive(Clone, Debug)]
pub struct LeastSquaresSolver {
    max_iteration_count: usize,
    rms_update_threshold: f64,
    finite_difference_solver: FiniteDifferenceSolver,
}

impl LeastSquaresSolver {
    pub fn try_new(
        max_iteration_count: usize,
        rms_update_threshold: f64,
        finite_difference_solver: FiniteDifferenceSolver,
    ) -> EstimationResult<Self> {
        ensure!(max_iteration_count > 0, ZeroIterationCountSnafu);
        ensure!(
            rms_update_threshold > 0.0,
            crate::errors::NonPositiveThresholdSnafu
        );
        Ok(Self {
            max_iteration_count,
            rms_update_threshold,
            finite_difference_solver,
        })
    }

    /// 20 iterations, one-unit RMS update threshold, central differences.
    pub fn standard() -> Self {
        Self {
            max_iteration_count: 20,
            rms_update_threshold: 1.0,
            finite_difference_solver: FiniteDifferenceSolver::default(),
        }
    }

    pub fn max_iteration_count(&self) -> usize {
        self.max_iteration_count
    }

    pub fn rms_update_threshold(&self) -> f64 {
        self.rms_update_threshold
    }

    pub fn finite_difference_solver(&self) -> &FiniteDifferenceSolver {
        &self.finite_difference_solver
    }

    /// Fits the initial-guess state to the observations.
    ///
    /// The state generator maps a candidate estimation state and the
    /// observation instants to the corresponding predicted states; it is
    /// typically a closure over a propagator. The sigma dictionaries carry a
    /// diagonal uncertainty per coordinate subset: an empty a-priori
    /// dictionary means no a-priori information, an empty observation
    /// dictionary means unit weighting.
    pub fn solve<G>(
        &self,
        initial_guess: &State,
        observations: &[State],
        state_generator: G,
        initial_guess_sigmas: &HashMap<CoordinateSubset, DVector>,
        observation_sigmas: &HashMap<CoordinateSubset, DVector>,
    ) -> EstimationResult<Analysis>
    where
        G: Fn(&State, &[Epoch]) -> Result<Vec<State>, PropagationError>,
    {
        ensure!(
            !observations.is_empty(),
            UndefinedInputSnafu {
                param: "observation state array"
            }
        );

        let estimation_instant = initial_guess.epoch();
        let estimation_builder = StateBuilder::from_state(initial_guess);
        let estimation_frame = initial_guess.frame();
        let observation_builder = StateBuilder::from_state(&observations[0]);
        let observation_subsets = observation_builder.broker().subsets().to_vec();

        ensure!(
            estimation_frame == observation_builder.frame(),
            ObservationFrameMismatchSnafu {
                expected: estimation_frame,
                got: observation_builder.frame(),
            }
        );
        for observation in observations {
            ensure!(
                observation.broker() == observation_builder.broker()
                    && observation.frame() == observation_builder.frame(),
                ObservationSubsetMismatchSnafu
            );
        }

        let estimation_dimension = initial_guess.arity();
        let observation_dimension = observation_builder.arity();
        let observation_count = observations.len();
        ensure!(
            observation_dimension * observation_count > estimation_dimension,
            UnderdeterminedSystemSnafu {
                observation_count,
                observation_dimension,
                estimation_dimension,
            }
        );

        // P_bar^-1 and R^-1, from the squared-inverted sigma dictionaries.
        let p_apriori_inverse = if initial_guess_sigmas.is_empty() {
            DMatrix::zeros(estimation_dimension, estimation_dimension)
        } else {
            inverse_squared_sigmas(initial_guess_sigmas, &estimation_builder)?
        };
        let r_inverse = if observation_sigmas.is_empty() {
            DMatrix::identity(observation_dimension, observation_dimension)
        } else {
            inverse_squared_sigmas(observation_sigmas, &observation_builder)?
        };

        // Nominal trajectory X*, a-priori deviation x_bar.
        let mut x_nominal = initial_guess.coordinates().clone();
        let mut x_apriori = DVector::zeros(estimation_dimension);

        let observation_instants: Vec<Epoch> =
            observations.iter().map(|state| state.epoch()).collect();

        // Observed coordinates Y, one column per observation.
        let mut observed = DMatrix::zeros(observation_dimension, observation_count);
        for (i, observation) in observations.iter().enumerate() {
            observed
                .column_mut(i)
                .copy_from(&observation.extract_many(&observation_subsets)?);
        }

        // G(X*): the predicted observation coordinates of a candidate state.
        let compute_observations = |state: &State| -> Result<DMatrix, PropagationError> {
            let states = state_generator(state, &observation_instants)?;
            let mut computed = DMatrix::zeros(observation_dimension, observation_count);
            for (i, predicted) in states.iter().enumerate() {
                computed
                    .column_mut(i)
                    .copy_from(&predicted.extract_many(&observation_subsets)?);
            }
            Ok(computed)
        };

        let mut steps: Vec<Step> = Vec::new();
        let mut termination_criteria = TerminationCriteria::MaximumIterations;
        let mut previous_rms = 0.0;
        let mut lambda = DMatrix::zeros(estimation_dimension, estimation_dimension);
        let mut frisbee = DMatrix::zeros(estimation_dimension, estimation_dimension);
        let mut computed = DMatrix::zeros(observation_dimension, observation_count);
        let mut estimated_state = initial_guess.clone();

        for iteration in 0..self.max_iteration_count {
            lambda = p_apriori_inverse.clone();
            let mut n_vector = &p_apriori_inverse * &x_apriori;
            frisbee = DMatrix::zeros(estimation_dimension, estimation_dimension);

            estimated_state = estimation_builder.build(estimation_instant, x_nominal.clone())?;

            computed = compute_observations(&estimated_state)?;
            let residuals = &observed - &computed;

            // H(t_i, t_0) for every observation, by finite differences of
            // the generator around the nominal trajectory.
            let sensitivity = self.finite_difference_solver.state_transition_matrices(
                &estimated_state,
                &observation_instants,
                |state, _| compute_observations(state),
            )?;

            for i in 0..observation_count {
                let y_i = residuals.column(i);
                let h_i = &sensitivity[i];
                let h_t_r = h_i.transpose() * &r_inverse;
                lambda += &h_t_r * h_i;
                n_vector += &h_t_r * y_i;
                let weighted = &h_t_r * y_i;
                frisbee += &weighted * weighted.transpose();
            }

            let x_hat = lambda
                .clone()
                .lu()
                .solve(&n_vector)
                .ok_or(EstimationError::SingularNormalEquations { iteration })?;

            x_nominal += &x_hat;
            x_apriori -= &x_hat;

            let rms_error =
                (residuals.column_iter().map(|c| c.norm_squared()).sum::<f64>()
                    / observation_count as f64)
                    .sqrt();
            steps.push(Step { rms_error, x_hat });

            if (rms_error - previous_rms).abs() < self.rms_update_threshold {
                termination_criteria = TerminationCriteria::RmsUpdateThreshold;
                break;
            }
            previous_rms = rms_error;
        }

        // P_hat = Lambda^-1, and the Frisbee empirical covariance
        // P_hat (sum H^T R^-1 y y^T R^-1 H) P_hat.
        let identity = DMatrix::identity(estimation_dimension, estimation_dimension);
        let covariance = lambda
            .lu()
            .solve(&identity)
            .ok_or(EstimationError::SingularNormalEquations {
                iteration: steps.len(),
            })?;
        let frisbee_covariance = &covariance * frisbee * &covariance;

        let mut computed_observation_states = Vec::with_capacity(observation_count);
        for (i, observation) in observations.iter().enumerate() {
            computed_observation_states.push(
                observation_builder
                    .build(observation.epoch(), computed.column(i).into_owned())?,
            );
        }

        let rms_error = steps.last().map(|step| step.rms_error).unwrap_or(f64::NAN);
        Ok(Analysis {
            rms_error,
            observation_count,
            iteration_count: steps.len(),
            termination_criteria,
            estimated_state,
            estimated_covariance: covariance,
            estimated_frisbee_covariance: frisbee_covariance,
            computed_observation_states,
            steps,
        })
    }

    /// Empirical covariance of an array of residual states: the normalized
    /// outer product of their coordinates.
    pub fn empirical_covariance(residuals: &[State]) -> EstimationResult<DMatrix> {
        ensure!(
            !residuals.is_empty(),
            UndefinedInputSnafu {
                param: "residual state array"
            }
        );
        let dimension = residuals[0].arity();
        let count = residuals.len();

        let mut coordinates = DMatrix::zeros(count, dimension);
        for (i, residual) in residuals.iter().enumerate() {
            coordinates
                .row_mut(i)
                .copy_from(&residual.coordinates().transpose());
        }
        Ok(coordinates.transpose() * coordinates / count as f64)
    }
}

/// Assembles the block-diagonal weighting matrix diag(1 / sigma^2) from a
/// per-subset sigma dictionary, scaling each sigma by the square root of its
/// subset size.
fn inverse_squared_sigmas(
    sigmas: &HashMap<CoordinateSubset, DVector>,
    builder: &StateBuilder,
) -> EstimationResult<DMatrix> {
    let subsets = builder.broker().subsets();
    ensure!(
        sigmas.len() == subsets.len(),
        SigmaCountMismatchSnafu {
            expected: subsets.len(),
            got: sigmas.len(),
        }
    );

    let mut diagonal = DVector::zeros(builder.arity());
    let mut offset = 0;
    for subset in subsets {
        let sigma = sigmas
            .get(subset)
            .ok_or(EstimationError::UndefinedInput {
                param: "sigma for a state coordinate subset",
            })?;
        ensure!(
            sigma.len() == subset.nelems,
            SigmaCountMismatchSnafu {
                expected: subset.nelems,
                got: sigma.len(),
            }
        );
        for (i, &value) in sigma.iter().enumerate() {
            ensure!(
                value > 0.0,
                NonPositiveSigmaSnafu {
                    subset: subset.name,
                    value,
                }
            );
            let scaled = value / (subset.nelems as f64).sqrt();
            diagonal[offset + i] = 1.0 / (scaled * scaled);
        }
        offset += subset.nelems;
    }
    Ok(DMatrix::from_diagonal(&diagonal))
}
