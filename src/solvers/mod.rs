/*
 * Apsis Astrodynamics Toolkit
 * Copyright (C) 2024-onward the Apsis contributors (cf. AUTHORS.md)
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

pub mod finite_diff;
pub mod least_squares;
pub mod tle_solver;

pub use finite_diff::{FiniteDifferenceScheme, FiniteDifferenceSolver};
pub use least_squares::{Analysis, LeastSquaresSolver, Step, TerminationCriteria};
pub use tle_solver::{InitialGuess, TleAnalysis, TleSolver};
