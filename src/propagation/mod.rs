/*
 * Apsis Astrodynamics Toolkit
 * Copyright (C) 2024-onward the Apsis contributors (cf. AUTHORS.md)
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

pub mod integrator;
pub mod propagator;

pub use integrator::{NumericalSolver, StepperKind};
pub use propagator::Propagator;
