/*
 * Apsis Astrodynamics Toolkit
 * Copyright (C) 2024-onward the Apsis contributors (cf. AUTHORS.md)
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use core::fmt;

use serde_derive::{Deserialize, Serialize};

use crate::astro::PhysicsResult;
use crate::constants::celestial_objects::celestial_name_from_id;
use crate::constants::orientations::{orientation_name_from_id, J2000};
use crate::errors::PhysicsError;
use crate::NaifId;

/// Biaxial ellipsoid shape of a celestial body.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ellipsoid {
    pub equatorial_radius_km: f64,
    pub polar_radius_km: f64,
}

impl Ellipsoid {
    pub const fn from_spheroid(equatorial_radius_km: f64, polar_radius_km: f64) -> Self {
        Self {
            equatorial_radius_km,
            polar_radius_km,
        }
    }

    pub fn flattening(&self) -> f64 {
        (self.equatorial_radius_km - self.polar_radius_km) / self.equatorial_radius_km
    }
}

/// A reference frame uniquely defined by its ephemeris center and orientation.
///
/// Gravitational parameter and shape are only defined on celestial frames; the
/// fallible accessors surface a [PhysicsError::MissingFrameData] otherwise.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub ephemeris_id: NaifId,
    pub orientation_id: NaifId,
    /// Gravity parameter of this frame, only defined on celestial frames
    pub mu_km3_s2: Option<f64>,
    /// Shape of the geoid of this frame, only defined on celestial frames
    pub shape: Option<Ellipsoid>,
}

impl Frame {
    /// Constructs a new frame given its ephemeris and orientation IDs, without
    /// defining its gravitational data.
    pub const fn new(ephemeris_id: NaifId, orientation_id: NaifId) -> Self {
        Self {
            ephemeris_id,
            orientation_id,
            mu_km3_s2: None,
            shape: None,
        }
    }

    /// Returns a copy of this frame with the provided gravitational parameter.
    pub const fn with_mu_km3_s2(mut self, mu_km3_s2: f64) -> Self {
        self.mu_km3_s2 = Some(mu_km3_s2);
        self
    }

    /// Returns a copy of this frame with the provided shape.
    pub const fn with_ellipsoid(mut self, shape: Ellipsoid) -> Self {
        self.shape = Some(shape);
        self
    }

    /// Returns the gravitational parameter of this frame, in km^3/s^2.
    pub fn mu_km3_s2(&self) -> PhysicsResult<f64> {
        self.mu_km3_s2.ok_or(PhysicsError::MissingFrameData {
            action: "retrieving the gravitational parameter",
            data: "mu",
            frame: *self,
        })
    }

    /// Returns the mean equatorial radius of this frame's center, in km.
    pub fn mean_equatorial_radius_km(&self) -> PhysicsResult<f64> {
        Ok(self
            .shape
            .ok_or(PhysicsError::MissingFrameData {
                action: "retrieving the equatorial radius",
                data: "shape",
                frame: *self,
            })?
            .equatorial_radius_km)
    }

    /// Returns whether this is a celestial frame, i.e. whether its
    /// gravitational parameter is defined.
    pub const fn is_celestial(&self) -> bool {
        self.mu_km3_s2.is_some()
    }

    /// Returns whether Newton's equations hold in this frame to within the
    /// perturbations modeled elsewhere. Only the J2000/GCRF orientation
    /// qualifies; body-fixed frames do not.
    pub const fn is_quasi_inertial(&self) -> bool {
        self.orientation_id == J2000
    }

    /// Returns whether this frame and another share their ephemeris center.
    pub const fn ephem_origin_match(&self, other: Self) -> bool {
        self.ephemeris_id == other.ephemeris_id
    }

    /// Returns whether this frame and another share their orientation.
    pub const fn orient_origin_match(&self, other: Self) -> bool {
        self.orientation_id == other.orientation_id
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let body = celestial_name_from_id(self.ephemeris_id);
        let orientation = orientation_name_from_id(self.orientation_id);
        match (body, orientation) {
            (Some(body), Some(orientation)) => write!(f, "{body} {orientation}"),
            (Some(body), None) => write!(f, "{body} orientation {}", self.orientation_id),
            (None, Some(orientation)) => write!(f, "body {} {orientation}", self.ephemeris_id),
            (None, None) => write!(f, "body {} orientation {}", self.ephemeris_id, self.orientation_id),
        }
    }
}

impl fmt::LowerHex for Frame {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{self}")
    }
}
