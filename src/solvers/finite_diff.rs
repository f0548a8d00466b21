/*
 * Apsis Astrodynamics Toolkit
 * Copyright (C) 2024-onward the Apsis contributors (cf. AUTHORS.md)
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Jacobians and state transition matrices by numerical differentiation.

use core::fmt;

use hifitime::Epoch;

use crate::errors::PropagationError;
use crate::math::{DMatrix, DVector};
use crate::state::State;

/// Differencing scheme of the numerical derivatives.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FiniteDifferenceScheme {
    Forward,
    Backward,
    Central,
}

impl fmt::Display for FiniteDifferenceScheme {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Forward => write!(f, "forward"),
            Self::Backward => write!(f, "backward"),
            Self::Central => write!(f, "central"),
        }
    }
}

/// Differentiates user-supplied maps of a state by perturbing each coordinate
/// with a relative step `max(step_pct * |y_i|, step_floor)`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FiniteDifferenceSolver {
    pub scheme: FiniteDifferenceScheme,
    pub step_pct: f64,
    pub step_floor: f64,
}

impl Default for FiniteDifferenceSolver {
    fn default() -> Self {
        Self {
            scheme: FiniteDifferenceScheme::Central,
            step_pct: 1e-3,
            step_floor: 1e-9,
        }
    }
}

impl FiniteDifferenceSolver {
    pub fn new(scheme: FiniteDifferenceScheme, step_pct: f64, step_floor: f64) -> Self {
        Self {
            scheme,
            step_pct,
            step_floor,
        }
    }

    fn step_for(&self, value: f64) -> f64 {
        (self.step_pct * value.abs()).max(self.step_floor)
    }

    /// Jacobian of `f` with respect to the state coordinates, at the state.
    ///
    /// `f` maps a state at one instant to a coordinate vector at the same
    /// instant; the result is (dim f) x (state arity).
    pub fn jacobian<F>(&self, state: &State, f: F) -> Result<DMatrix, PropagationError>
    where
        F: Fn(&State) -> Result<DVector, PropagationError>,
    {
        let n = state.arity();
        let base = match self.scheme {
            FiniteDifferenceScheme::Central => None,
            _ => Some(f(state)?),
        };

        let mut jacobian: Option<DMatrix> = None;
        for i in 0..n {
            let h = self.step_for(state.coordinates()[i]);

            let column = match (&self.scheme, &base) {
                (FiniteDifferenceScheme::Forward, Some(base)) => {
                    let plus = f(&perturbed(state, i, h)?)?;
                    (plus - base) / h
                }
                (FiniteDifferenceScheme::Backward, Some(base)) => {
                    let minus = f(&perturbed(state, i, -h)?)?;
                    (base - minus) / h
                }
                _ => {
                    let plus = f(&perturbed(state, i, h)?)?;
                    let minus = f(&perturbed(state, i, -h)?)?;
                    (plus - minus) / (2.0 * h)
                }
            };

            let jac = jacobian.get_or_insert_with(|| DMatrix::zeros(column.len(), n));
            jac.column_mut(i).copy_from(&column);
        }

        Ok(jacobian.unwrap_or_else(|| DMatrix::zeros(0, 0)))
    }

    /// State transition matrices d y(t_k) / d y(t_0) for each downstream
    /// instant, by perturbing each coordinate of the state and invoking the
    /// trajectory generator.
    ///
    /// The generator must return a matrix whose k-th column holds the
    /// downstream coordinates at `instants[k]`.
    pub fn state_transition_matrices<G>(
        &self,
        state: &State,
        instants: &[Epoch],
        generator: G,
    ) -> Result<Vec<DMatrix>, PropagationError>
    where
        G: Fn(&State, &[Epoch]) -> Result<DMatrix, PropagationError>,
    {
        let n = state.arity();
        let base = match self.scheme {
            FiniteDifferenceScheme::Central => None,
            _ => Some(generator(state, instants)?),
        };

        // columns_per_coordinate[i] is the (m x instants) sensitivity of the
        // downstream coordinates to the i-th initial coordinate.
        let mut sensitivities = Vec::with_capacity(n);
        for i in 0..n {
            let h = self.step_for(state.coordinates()[i]);
            let sensitivity = match (&self.scheme, &base) {
                (FiniteDifferenceScheme::Forward, Some(base)) => {
                    let plus = generator(&perturbed(state, i, h)?, instants)?;
                    (plus - base) / h
                }
                (FiniteDifferenceScheme::Backward, Some(base)) => {
                    let minus = generator(&perturbed(state, i, -h)?, instants)?;
                    (base - minus) / h
                }
                _ => {
                    let plus = generator(&perturbed(state, i, h)?, instants)?;
                    let minus = generator(&perturbed(state, i, -h)?, instants)?;
                    (plus - minus) / (2.0 * h)
                }
            };
            sensitivities.push(sensitivity);
        }

        let m = sensitivities
            .first()
            .map(|s| s.nrows())
            .unwrap_or_default();
        let mut stms = Vec::with_capacity(instants.len());
        for (k, _) in instants.iter().enumerate() {
            let mut stm = DMatrix::zeros(m, n);
            for (i, sensitivity) in sensitivities.iter().enumerate() {
                stm.column_mut(i).copy_from(&sensitivity.column(k));
            }
            stms.push(stm);
        }
        Ok(stms)
    }
}

fn perturbed(state: &State, index: usize, delta: f64) -> Result<State, PropagationError> {
    let mut coordinates = state.coordinates().clone();
    coordinates[index] += delta;
    Ok(state.with_coordinates(coordinates)?)
}

#[cfg(test)]
mod finite_diff_ut {
    use super::*;
    use crate::constants::frames::EARTH_J2000;
    use crate::f64_eq_tol;
    use crate::state::{CoordinateBroker, StateBuilder};
    use rstest::rstest;

    fn quadratic_state() -> State {
        let builder = StateBuilder::new(EARTH_J2000, CoordinateBroker::cartesian_pos_vel());
        let mut coordinates = DVector::zeros(6);
        for i in 0..6 {
            coordinates[i] = (i as f64) + 1.0;
        }
        builder
            .build(
                Epoch::from_gregorian_utc_at_midnight(2020, 1, 1),
                coordinates,
            )
            .unwrap()
    }

    #[rstest]
    #[case(FiniteDifferenceScheme::Forward, 1e-4)]
    #[case(FiniteDifferenceScheme::Backward, 1e-4)]
    #[case(FiniteDifferenceScheme::Central, 1e-8)]
    fn jacobian_of_square_map(#[case] scheme: FiniteDifferenceScheme, #[case] tolerance: f64) {
        let solver = FiniteDifferenceSolver::new(scheme, 1e-6, 1e-9);
        let state = quadratic_state();

        // f(y) = [y_0^2, y_1 y_2]: the analytic Jacobian is known.
        let jacobian = solver
            .jacobian(&state, |s| {
                let y = s.coordinates();
                let mut out = DVector::zeros(2);
                out[0] = y[0] * y[0];
                out[1] = y[1] * y[2];
                Ok(out)
            })
            .unwrap();

        assert_eq!(jacobian.shape(), (2, 6));
        f64_eq_tol!(jacobian[(0, 0)], 2.0, tolerance, "d(y0^2)/dy0");
        f64_eq_tol!(jacobian[(1, 1)], 3.0, tolerance, "d(y1 y2)/dy1");
        f64_eq_tol!(jacobian[(1, 2)], 2.0, tolerance, "d(y1 y2)/dy2");
        f64_eq_tol!(jacobian[(0, 3)], 0.0, tolerance, "independent coordinate");
    }

    #[test]
    fn stm_of_linear_flow() {
        let solver = FiniteDifferenceSolver::default();
        let state = quadratic_state();
        let epoch = state.epoch();
        let instants = [epoch, epoch + hifitime::Unit::Second * 10];

        // A linear flow y(t) = y0 * (1 + dt): the STM is (1 + dt) I.
        let stms = solver
            .state_transition_matrices(&state, &instants, |s, instants| {
                let mut out = DMatrix::zeros(6, instants.len());
                for (k, instant) in instants.iter().enumerate() {
                    let dt = (*instant - s.epoch()).to_seconds();
                    out.column_mut(k).copy_from(&(s.coordinates() * (1.0 + dt)));
                }
                Ok(out)
            })
            .unwrap();

        assert_eq!(stms.len(), 2);
        for i in 0..6 {
            f64_eq_tol!(stms[0][(i, i)], 1.0, 1e-9, "identity at t0");
            f64_eq_tol!(stms[1][(i, i)], 11.0, 1e-7, "scaling at t0 + 10 s");
        }
        f64_eq_tol!(stms[1][(0, 1)], 0.0, 1e-9, "diagonal flow");
    }
}
