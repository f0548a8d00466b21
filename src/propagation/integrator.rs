/*
 * Apsis Astrodynamics Toolkit
 * Copyright (C) 2024-onward the Apsis contributors (cf. AUTHORS.md)
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Adaptive embedded Runge-Kutta integration.
//!
//! The solver is single threaded and non-suspending: the right-hand side is
//! called synchronously, and a call returns only when the requested interval
//! is covered, the step bound is exhausted, or the observer stops it.
//! Integration proceeds strictly monotonically in the signed direction of
//! the requested duration; adaptive step rejection may re-evaluate the
//! right-hand side at an already visited time.

use crate::astro::PhysicsResult;
use crate::errors::IntegrationError;
use crate::math::DVector;

/// The embedded Runge-Kutta pairs available to the propagator.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StepperKind {
    RungeKuttaCashKarp54,
    RungeKuttaFehlberg78,
}

impl StepperKind {
    /// Exponent used in the standard step-size update, 1/order.
    fn error_exponent(&self) -> f64 {
        match self {
            Self::RungeKuttaCashKarp54 => 1.0 / 5.0,
            Self::RungeKuttaFehlberg78 => 1.0 / 8.0,
        }
    }
}

/// Adaptive integration of `y' = f(t, y)` with per-component error control
/// `err <= max(abs_tol, rel_tol * |y|)`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct NumericalSolver {
    pub stepper: StepperKind,
    /// Magnitude of the initial step guess, in seconds. The actual first
    /// step is signed by the integration direction.
    pub initial_step_s: f64,
    pub rel_tol: f64,
    pub abs_tol: f64,
    /// Hard bound on the number of attempted steps (accepted or rejected).
    pub max_steps: usize,
}

impl Default for NumericalSolver {
    fn default() -> Self {
        Self {
            stepper: StepperKind::RungeKuttaCashKarp54,
            initial_step_s: 30.0,
            rel_tol: 1e-12,
            abs_tol: 1e-12,
            max_steps: 1_000_000,
        }
    }
}

impl NumericalSolver {
    pub fn try_new(
        stepper: StepperKind,
        initial_step_s: f64,
        rel_tol: f64,
        abs_tol: f64,
        max_steps: usize,
    ) -> Result<Self, IntegrationError> {
        for tolerance in [rel_tol, abs_tol] {
            if tolerance <= 0.0 {
                return Err(IntegrationError::NonPositiveTolerance { value: tolerance });
            }
        }
        if initial_step_s <= 0.0 {
            return Err(IntegrationError::NonPositiveTolerance {
                value: initial_step_s,
            });
        }
        Ok(Self {
            stepper,
            initial_step_s,
            rel_tol,
            abs_tol,
            max_steps,
        })
    }

    /// Integrates from `t = 0` over the signed duration and returns the
    /// terminal state only. A zero duration returns the input unchanged
    /// without evaluating the right-hand side.
    pub fn integrate<F>(
        &self,
        y0: &DVector,
        duration_s: f64,
        mut rhs: F,
    ) -> Result<DVector, IntegrationError>
    where
        F: FnMut(f64, &DVector, &mut DVector) -> PhysicsResult<()>,
    {
        let mut y = y0.clone();
        let mut steps = 0;
        self.advance(0.0, &mut y, duration_s, &mut rhs, &mut |_, _| true, &mut steps)?;
        Ok(y)
    }

    /// Integrates through the provided monotone time offsets (seconds from
    /// the start), returning the state at each of them.
    pub fn integrate_dense<F>(
        &self,
        y0: &DVector,
        offsets_s: &[f64],
        mut rhs: F,
    ) -> Result<Vec<DVector>, IntegrationError>
    where
        F: FnMut(f64, &DVector, &mut DVector) -> PhysicsResult<()>,
    {
        let mut y = y0.clone();
        let mut t = 0.0;
        let mut steps = 0;
        let mut log = Vec::with_capacity(offsets_s.len());
        for &offset in offsets_s {
            self.advance(t, &mut y, offset, &mut rhs, &mut |_, _| true, &mut steps)?;
            t = offset;
            log.push(y.clone());
        }
        Ok(log)
    }

    /// Integrates over the signed duration, reporting every accepted step to
    /// the observer. An observer returning false stops the integration; the
    /// returned offset is then the time of the last accepted step.
    pub(crate) fn integrate_observed<F, O>(
        &self,
        y0: &DVector,
        duration_s: f64,
        mut rhs: F,
        mut observer: O,
    ) -> Result<(f64, DVector, bool), IntegrationError>
    where
        F: FnMut(f64, &DVector, &mut DVector) -> PhysicsResult<()>,
        O: FnMut(f64, &DVector) -> bool,
    {
        let mut y = y0.clone();
        let mut steps = 0;
        let stopped_at = self.advance(0.0, &mut y, duration_s, &mut rhs, &mut observer, &mut steps)?;
        match stopped_at {
            Some(t) => Ok((t, y, true)),
            None => Ok((duration_s, y, false)),
        }
    }

    /// Core adaptive loop between two absolute time offsets. Returns the
    /// stop time if the observer interrupted the integration.
    fn advance<F, O>(
        &self,
        t_start: f64,
        y: &mut DVector,
        t_end: f64,
        rhs: &mut F,
        observer: &mut O,
        steps_used: &mut usize,
    ) -> Result<Option<f64>, IntegrationError>
    where
        F: FnMut(f64, &DVector, &mut DVector) -> PhysicsResult<()>,
        O: FnMut(f64, &DVector) -> bool,
    {
        if t_end == t_start {
            return Ok(None);
        }

        let (stages, tableau_a, tableau_c, weights_high, weights_low) = match self.stepper {
            StepperKind::RungeKuttaCashKarp54 => (
                6,
                CK54_A.as_slice(),
                CK54_C.as_slice(),
                CK54_B5.as_slice(),
                CK54_B4.as_slice(),
            ),
            StepperKind::RungeKuttaFehlberg78 => (
                13,
                F78_A.as_slice(),
                F78_C.as_slice(),
                F78_B8.as_slice(),
                F78_B7.as_slice(),
            ),
        };

        let direction = (t_end - t_start).signum();
        let mut t = t_start;
        let mut h = self
            .initial_step_s
            .min((t_end - t_start).abs())
            * direction;

        let dimension = y.len();
        let mut k: Vec<DVector> = (0..stages).map(|_| DVector::zeros(dimension)).collect();
        let mut y_stage = DVector::zeros(dimension);
        let exponent = self.stepper.error_exponent();

        while (t - t_end) * direction < 0.0 {
            *steps_used += 1;
            if *steps_used > self.max_steps {
                return Err(IntegrationError::StepLimitExceeded {
                    max_steps: self.max_steps,
                    elapsed_s: t,
                    requested_s: t_end,
                    last_state: y.as_slice().to_vec(),
                });
            }

            // Do not overshoot the terminal instant.
            let landing = (t + h - t_end) * direction >= 0.0;
            if landing {
                h = t_end - t;
            }

            // Evaluate the stages.
            for i in 0..stages {
                y_stage.copy_from(y);
                for (j, k_j) in k.iter().enumerate().take(i) {
                    let a_ij = tableau_a[i][j];
                    if a_ij != 0.0 {
                        y_stage.axpy(h * a_ij, k_j, 1.0);
                    }
                }
                k[i].fill(0.0);
                rhs(t + tableau_c[i] * h, &y_stage, &mut k[i])
                    .map_err(|source| IntegrationError::DynamicsEvaluation { source })?;
            }

            // Higher-order solution and embedded error estimate.
            let mut y_high = y.clone();
            let mut error = DVector::zeros(dimension);
            for i in 0..stages {
                if weights_high[i] != 0.0 {
                    y_high.axpy(h * weights_high[i], &k[i], 1.0);
                }
                let delta = weights_high[i] - weights_low[i];
                if delta != 0.0 {
                    error.axpy(h * delta, &k[i], 1.0);
                }
            }

            let mut error_ratio = 0.0_f64;
            for i in 0..dimension {
                let tolerance = self.abs_tol.max(self.rel_tol * y_high[i].abs());
                error_ratio = error_ratio.max(error[i].abs() / tolerance);
            }

            if error_ratio <= 1.0 {
                t = if landing { t_end } else { t + h };
                y.copy_from(&y_high);
                if !observer(t, y) {
                    return Ok(Some(t));
                }
            }

            // Standard 1/order step update, with safety factor and clamps.
            let factor = if error_ratio > 0.0 {
                (0.9 * error_ratio.powf(-exponent)).clamp(0.2, 5.0)
            } else {
                5.0
            };
            h *= factor;
        }

        Ok(None)
    }
}

// Cash-Karp 5(4) tableau.
const CK54_C: [f64; 6] = [0.0, 1.0 / 5.0, 3.0 / 10.0, 3.0 / 5.0, 1.0, 7.0 / 8.0];
const CK54_A: [[f64; 12]; 6] = [
    [0.0; 12],
    pad([1.0 / 5.0]),
    pad([3.0 / 40.0, 9.0 / 40.0]),
    pad([3.0 / 10.0, -9.0 / 10.0, 6.0 / 5.0]),
    pad([-11.0 / 54.0, 5.0 / 2.0, -70.0 / 27.0, 35.0 / 27.0]),
    pad([
        1631.0 / 55296.0,
        175.0 / 512.0,
        575.0 / 13824.0,
        44275.0 / 110592.0,
        253.0 / 4096.0,
    ]),
];
const CK54_B5: [f64; 6] = [
    37.0 / 378.0,
    0.0,
    250.0 / 621.0,
    125.0 / 594.0,
    0.0,
    512.0 / 1771.0,
];
const CK54_B4: [f64; 6] = [
    2825.0 / 27648.0,
    0.0,
    18575.0 / 48384.0,
    13525.0 / 55296.0,
    277.0 / 14336.0,
    1.0 / 4.0,
];

// Fehlberg 7(8) tableau.
const F78_C: [f64; 13] = [
    0.0,
    2.0 / 27.0,
    1.0 / 9.0,
    1.0 / 6.0,
    5.0 / 12.0,
    1.0 / 2.0,
    5.0 / 6.0,
    1.0 / 6.0,
    2.0 / 3.0,
    1.0 / 3.0,
    1.0,
    0.0,
    1.0,
];
const F78_A: [[f64; 12]; 13] = [
    [0.0; 12],
    pad([2.0 / 27.0]),
    pad([1.0 / 36.0, 1.0 / 12.0]),
    pad([1.0 / 24.0, 0.0, 1.0 / 8.0]),
    pad([5.0 / 12.0, 0.0, -25.0 / 16.0, 25.0 / 16.0]),
    pad([1.0 / 20.0, 0.0, 0.0, 1.0 / 4.0, 1.0 / 5.0]),
    pad([-25.0 / 108.0, 0.0, 0.0, 125.0 / 108.0, -65.0 / 27.0, 125.0 / 54.0]),
    pad([31.0 / 300.0, 0.0, 0.0, 0.0, 61.0 / 225.0, -2.0 / 9.0, 13.0 / 900.0]),
    pad([2.0, 0.0, 0.0, -53.0 / 6.0, 704.0 / 45.0, -107.0 / 9.0, 67.0 / 90.0, 3.0]),
    pad([
        -91.0 / 108.0,
        0.0,
        0.0,
        23.0 / 108.0,
        -976.0 / 135.0,
        311.0 / 54.0,
        -19.0 / 60.0,
        17.0 / 6.0,
        -1.0 / 12.0,
    ]),
    pad([
        2383.0 / 4100.0,
        0.0,
        0.0,
        -341.0 / 164.0,
        4496.0 / 1025.0,
        -301.0 / 82.0,
        2133.0 / 4100.0,
        45.0 / 82.0,
        45.0 / 164.0,
        18.0 / 41.0,
    ]),
    pad([
        3.0 / 205.0,
        0.0,
        0.0,
        0.0,
        0.0,
        -6.0 / 41.0,
        -3.0 / 205.0,
        -3.0 / 41.0,
        3.0 / 41.0,
        6.0 / 41.0,
        0.0,
    ]),
    pad([
        -1777.0 / 4100.0,
        0.0,
        0.0,
        -341.0 / 164.0,
        4496.0 / 1025.0,
        -289.0 / 82.0,
        2193.0 / 4100.0,
        51.0 / 82.0,
        33.0 / 164.0,
        12.0 / 41.0,
        0.0,
        1.0,
    ]),
];
const F78_B7: [f64; 13] = [
    41.0 / 840.0,
    0.0,
    0.0,
    0.0,
    0.0,
    34.0 / 105.0,
    9.0 / 35.0,
    9.0 / 35.0,
    9.0 / 280.0,
    9.0 / 280.0,
    41.0 / 840.0,
    0.0,
    0.0,
];
const F78_B8: [f64; 13] = [
    0.0,
    0.0,
    0.0,
    0.0,
    0.0,
    34.0 / 105.0,
    9.0 / 35.0,
    9.0 / 35.0,
    9.0 / 280.0,
    9.0 / 280.0,
    0.0,
    41.0 / 840.0,
    41.0 / 840.0,
];

/// Pads a Butcher-tableau row to the shared 12-column layout.
const fn pad<const N: usize>(row: [f64; N]) -> [f64; 12] {
    let mut padded = [0.0; 12];
    let mut i = 0;
    while i < N {
        padded[i] = row[i];
        i += 1;
    }
    padded
}
