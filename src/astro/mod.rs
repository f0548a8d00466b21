/*
 * Apsis Astrodynamics Toolkit
 * Copyright (C) 2024-onward the Apsis contributors (cf. AUTHORS.md)
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use crate::errors::PhysicsError;

pub mod blm;
pub mod coe;
pub mod kepler;
pub mod mee;

pub use blm::BrouwerLyddaneMean;
pub use coe::ClassicalElements;
pub use kepler::{KeplerModel, SecularRates};
pub use mee::EquinoctialElements;

pub type PhysicsResult<T> = Result<T, PhysicsError>;
