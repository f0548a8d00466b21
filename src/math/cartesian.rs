/*
 * Apsis Astrodynamics Toolkit
 * Copyright (C) 2024-onward the Apsis contributors (cf. AUTHORS.md)
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use core::fmt;
use core::ops::{Add, Neg, Sub};

use hifitime::Epoch;
use serde_derive::{Deserialize, Serialize};
use snafu::ensure;

use super::{root_mean_squared, root_sum_squared, Vector3, Vector6};
use crate::astro::PhysicsResult;
use crate::errors::{EpochMismatchSnafu, FrameMismatchSnafu};
use crate::frames::Frame;

/// An inertial state: position and velocity in a given frame at a given epoch.
///
/// Radius data is expressed in kilometers, velocity data in kilometers per
/// second. Cartesian coordinates are the only non-singular representation, so
/// every orbital element set converts through this type.
#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
pub struct CartesianState {
    /// Position radius in kilometers
    pub radius_km: Vector3,
    /// Velocity in kilometers per second
    pub velocity_km_s: Vector3,
    /// Epoch with time scale at which this state is valid.
    pub epoch: Epoch,
    /// Frame in which this Cartesian state lives.
    pub frame: Frame,
}

impl CartesianState {
    /// Creates a new Cartesian state in the provided frame at the provided epoch.
    ///
    /// **Units:** km, km, km, km/s, km/s, km/s
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        x_km: f64,
        y_km: f64,
        z_km: f64,
        vx_km_s: f64,
        vy_km_s: f64,
        vz_km_s: f64,
        epoch: Epoch,
        frame: Frame,
    ) -> Self {
        Self {
            radius_km: Vector3::new(x_km, y_km, z_km),
            velocity_km_s: Vector3::new(vx_km_s, vy_km_s, vz_km_s),
            epoch,
            frame,
        }
    }

    /// Builds a state of zero radius and velocity at the provided epoch in the provided frame.
    pub fn zero_at_epoch(epoch: Epoch, frame: Frame) -> Self {
        Self {
            radius_km: Vector3::zeros(),
            velocity_km_s: Vector3::zeros(),
            epoch,
            frame,
        }
    }

    /// Creates a new Cartesian state from position and velocity vectors.
    pub fn from_vectors(
        radius_km: Vector3,
        velocity_km_s: Vector3,
        epoch: Epoch,
        frame: Frame,
    ) -> Self {
        Self {
            radius_km,
            velocity_km_s,
            epoch,
            frame,
        }
    }

    /// Creates a new Cartesian state from the borrowed state vector, which
    /// **must** be ordered x, y, z, vx, vy, vz in km and km/s.
    pub fn from_cartesian_pos_vel(pos_vel: Vector6, epoch: Epoch, frame: Frame) -> Self {
        Self::new(
            pos_vel[0], pos_vel[1], pos_vel[2], pos_vel[3], pos_vel[4], pos_vel[5], epoch, frame,
        )
    }

    /// Returns this state as a Vector6 in [km, km, km, km/s, km/s, km/s].
    ///
    /// Note that the epoch is **not** returned in the vector.
    pub fn to_cartesian_pos_vel(self) -> Vector6 {
        Vector6::from_iterator(
            self.radius_km
                .iter()
                .chain(self.velocity_km_s.iter())
                .cloned(),
        )
    }

    /// Returns the magnitude of the radius vector in km
    pub fn rmag_km(&self) -> f64 {
        self.radius_km.norm()
    }

    /// Returns the magnitude of the velocity vector in km/s
    pub fn vmag_km_s(&self) -> f64 {
        self.velocity_km_s.norm()
    }

    /// Returns the unit vector in the direction of the state radius
    pub fn r_hat(&self) -> Vector3 {
        self.radius_km / self.rmag_km()
    }

    /// Returns the distance in kilometers between this state and a point assumed to be in the same frame.
    pub fn distance_to_point_km(&self, other_km: &Vector3) -> f64 {
        (self.radius_km - other_km).norm()
    }

    /// Returns the distance in kilometers between this state and another
    /// state, if both frames match (the epochs do not need to match).
    pub fn distance_to_km(&self, other: &Self) -> PhysicsResult<f64> {
        ensure!(
            self.frame.ephem_origin_match(other.frame)
                && self.frame.orient_origin_match(other.frame),
            FrameMismatchSnafu {
                action: "computing distance between states",
                frame1: self.frame,
                frame2: other.frame
            }
        );

        Ok(self.distance_to_point_km(&other.radius_km))
    }

    /// Returns the root sum squared radius difference between this state and another.
    pub fn rss_radius_km(&self, other: &Self) -> PhysicsResult<f64> {
        ensure!(
            self.frame.ephem_origin_match(other.frame)
                && self.frame.orient_origin_match(other.frame),
            FrameMismatchSnafu {
                action: "computing radius RSS",
                frame1: self.frame,
                frame2: other.frame
            }
        );
        Ok(root_sum_squared(&self.radius_km, &other.radius_km))
    }

    /// Returns the root mean squared velocity difference between this state and another.
    pub fn rms_velocity_km_s(&self, other: &Self) -> PhysicsResult<f64> {
        ensure!(
            self.frame.ephem_origin_match(other.frame)
                && self.frame.orient_origin_match(other.frame),
            FrameMismatchSnafu {
                action: "computing velocity RMS",
                frame1: self.frame,
                frame2: other.frame
            }
        );
        Ok(root_mean_squared(&self.velocity_km_s, &other.velocity_km_s))
    }

    /// Returns whether this state and another are equal within the specified
    /// radial and velocity absolute tolerances.
    pub fn eq_within(&self, other: &Self, radial_tol_km: f64, velocity_tol_km_s: f64) -> bool {
        self.epoch == other.epoch
            && (self.radius_km - other.radius_km)
                .iter()
                .all(|c| c.abs() < radial_tol_km)
            && (self.velocity_km_s - other.velocity_km_s)
                .iter()
                .all(|c| c.abs() < velocity_tol_km_s)
            && self.frame.ephem_origin_match(other.frame)
            && self.frame.orient_origin_match(other.frame)
    }

    pub(crate) fn add_unchecked(&self, other: &Self) -> Self {
        Self {
            radius_km: self.radius_km + other.radius_km,
            velocity_km_s: self.velocity_km_s + other.velocity_km_s,
            epoch: self.epoch,
            frame: self.frame,
        }
    }

    pub(crate) fn sub_unchecked(&self, other: &Self) -> Self {
        Self {
            radius_km: self.radius_km - other.radius_km,
            velocity_km_s: self.velocity_km_s - other.velocity_km_s,
            epoch: self.epoch,
            frame: self.frame,
        }
    }
}

impl Add for CartesianState {
    type Output = PhysicsResult<CartesianState>;

    /// Adds one state to another. This will return an error if the epochs or frames differ.
    fn add(self, other: CartesianState) -> Self::Output {
        ensure!(
            self.epoch == other.epoch,
            EpochMismatchSnafu {
                action: "adding states",
                epoch1: self.epoch,
                epoch2: other.epoch
            }
        );

        ensure!(
            self.frame.ephemeris_id == other.frame.ephemeris_id,
            FrameMismatchSnafu {
                action: "adding states",
                frame1: self.frame,
                frame2: other.frame
            }
        );

        Ok(self.add_unchecked(&other))
    }
}

impl Sub for CartesianState {
    type Output = PhysicsResult<CartesianState>;

    /// Subtracts one state from another. This will return an error if the epochs or frames differ.
    fn sub(self, other: CartesianState) -> Self::Output {
        ensure!(
            self.epoch == other.epoch,
            EpochMismatchSnafu {
                action: "subtracting states",
                epoch1: self.epoch,
                epoch2: other.epoch
            }
        );

        ensure!(
            self.frame.ephemeris_id == other.frame.ephemeris_id,
            FrameMismatchSnafu {
                action: "subtracting states",
                frame1: self.frame,
                frame2: other.frame
            }
        );

        Ok(self.sub_unchecked(&other))
    }
}

impl Neg for CartesianState {
    type Output = Self;

    fn neg(self) -> Self::Output {
        let mut me = self;
        me.radius_km = -me.radius_km;
        me.velocity_km_s = -me.velocity_km_s;
        me
    }
}

impl PartialEq for CartesianState {
    /// Two states are equal if their positions are equal within one centimeter
    /// and their velocities within one centimeter per second.
    fn eq(&self, other: &Self) -> bool {
        let radial_tol = 1e-5; // centimeter
        let velocity_tol = 1e-5; // centimeter per second
        self.eq_within(other, radial_tol, velocity_tol)
    }
}

#[allow(clippy::format_in_format_args)]
impl fmt::Display for CartesianState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let decimals = f.precision().unwrap_or(6);
        write!(
            f,
            "[{:x}] {}\tposition = [{}, {}, {}] km\tvelocity = [{}, {}, {}] km/s",
            self.frame,
            self.epoch,
            format!("{:.*}", decimals, self.radius_km.x),
            format!("{:.*}", decimals, self.radius_km.y),
            format!("{:.*}", decimals, self.radius_km.z),
            format!("{:.*}", decimals, self.velocity_km_s.x),
            format!("{:.*}", decimals, self.velocity_km_s.y),
            format!("{:.*}", decimals, self.velocity_km_s.z)
        )
    }
}

#[cfg(test)]
mod cartesian_state_ut {
    use super::*;
    use crate::constants::frames::{EARTH_J2000, SUN_J2000};
    use crate::errors::PhysicsError;

    #[test]
    fn add_wrong_epoch() {
        let e = Epoch::from_gregorian_utc_at_midnight(2020, 1, 1);
        let e2 = Epoch::from_gregorian_utc_at_midnight(2020, 1, 2);
        let s1 = CartesianState::new(10.0, 20.0, 30.0, 1.0, 2.0, 2.0, e, EARTH_J2000);
        let s2 = CartesianState::new(10.0, 20.0, 30.0, 1.0, 2.0, 2.0, e2, EARTH_J2000);

        assert_eq!(
            s1 + s2,
            Err(PhysicsError::EpochMismatch {
                action: "adding states",
                epoch1: e,
                epoch2: e2,
            })
        )
    }

    #[test]
    fn add_wrong_frame() {
        let e = Epoch::from_gregorian_utc_at_midnight(2020, 1, 1);
        let s1 = CartesianState::new(10.0, 20.0, 30.0, 1.0, 2.0, 2.0, e, EARTH_J2000);
        let s2 = CartesianState::new(10.0, 20.0, 30.0, 1.0, 2.0, 2.0, e, SUN_J2000);

        assert_eq!(
            s1 + s2,
            Err(PhysicsError::FrameMismatch {
                action: "adding states",
                frame1: EARTH_J2000,
                frame2: SUN_J2000,
            })
        )
    }

    #[test]
    fn serde_round_trip() {
        let e = Epoch::from_gregorian_utc_at_midnight(2020, 1, 1);
        let state = CartesianState::new(10.0, 20.0, 30.0, 1.0, 2.0, 2.0, e, EARTH_J2000);

        let serialized = serde_yaml::to_string(&state).unwrap();
        let rtn: CartesianState = serde_yaml::from_str(&serialized).unwrap();

        assert_eq!(rtn, state);
    }

    #[test]
    fn vector_round_trip() {
        let e = Epoch::from_gregorian_utc_at_midnight(2020, 1, 1);
        let s1 = CartesianState::new(10.0, 20.0, 30.0, 1.0, 2.0, 2.0, e, EARTH_J2000);
        let as_vec6 = Vector6::new(10.0, 20.0, 30.0, 1.0, 2.0, 2.0);

        assert_eq!(s1.to_cartesian_pos_vel(), as_vec6);
        assert_eq!(
            CartesianState::from_cartesian_pos_vel(as_vec6, e, EARTH_J2000),
            s1
        );
        assert!(s1.distance_to_km(&s1).unwrap().abs() < f64::EPSILON);
    }
}
