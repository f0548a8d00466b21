/*
 * Apsis Astrodynamics Toolkit
 * Copyright (C) 2024-onward the Apsis contributors (cf. AUTHORS.md)
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Oracles consumed by the core: ephemerides, atmosphere density, solar
//! geometry, and the SGP4 propagation model.
//!
//! Every oracle is injected explicitly into the function or dynamics term
//! that needs it. The core holds no singleton environment and performs no
//! synchronization: implementations must be `Send + Sync` if the embedding
//! application calls the core from multiple threads.

use hifitime::{Duration, Epoch, TimeUnits};

use crate::astro::PhysicsResult;
use crate::math::cartesian::CartesianState;
use crate::math::Vector3;
use crate::tle::Tle;

/// Position oracle for a perturbing celestial body.
pub trait Ephemeris: Send + Sync {
    /// Name of the body, for diagnostics.
    fn name(&self) -> &str;

    /// Gravitational parameter of the body, in km^3/s^2.
    fn mu_km3_s2(&self) -> f64;

    /// Position of the body in the GCRF frame at the provided epoch, in km.
    fn position_km(&self, epoch: Epoch) -> PhysicsResult<Vector3>;
}

/// Atmosphere density oracle.
pub trait Atmosphere: Send + Sync {
    /// Total mass density at the provided GCRF position and epoch, in kg/m^3.
    fn density_kg_m3(&self, position_km: &Vector3, epoch: Epoch) -> PhysicsResult<f64>;
}

/// Solar right ascension and equation of time, as needed for the local time
/// of the ascending node.
pub trait SolarGeometry: Send + Sync {
    /// Apparent right ascension of the Sun at the provided epoch, in degrees.
    fn right_ascension_deg(&self, epoch: Epoch) -> PhysicsResult<f64>;

    /// Equation of time (apparent minus mean solar time) at the provided epoch.
    fn equation_of_time(&self, epoch: Epoch) -> PhysicsResult<Duration>;
}

/// The SGP4 model, consumed as a black box by the TLE estimator.
pub trait Sgp4: Send + Sync {
    /// Propagates the provided TLE to the provided epoch, returning the
    /// Cartesian state in the GCRF frame.
    fn state_at(&self, tle: &Tle, epoch: Epoch) -> PhysicsResult<CartesianState>;
}

/// An ephemeris whose body does not move over the span of interest.
///
/// Useful for short propagation spans and for tests; mission-grade use cases
/// should inject a real ephemeris implementation instead.
#[derive(Clone, Debug)]
pub struct FrozenEphemeris {
    pub name: String,
    pub mu_km3_s2: f64,
    pub position_km: Vector3,
}

impl Ephemeris for FrozenEphemeris {
    fn name(&self) -> &str {
        &self.name
    }

    fn mu_km3_s2(&self) -> f64 {
        self.mu_km3_s2
    }

    fn position_km(&self, _epoch: Epoch) -> PhysicsResult<Vector3> {
        Ok(self.position_km)
    }
}

/// Piecewise exponential density model: rho = rho0 * exp(-(h - h0) / H).
#[derive(Copy, Clone, Debug)]
pub struct ExponentialAtmosphere {
    pub body_radius_km: f64,
    pub reference_altitude_km: f64,
    pub reference_density_kg_m3: f64,
    pub scale_height_km: f64,
}

impl Atmosphere for ExponentialAtmosphere {
    fn density_kg_m3(&self, position_km: &Vector3, _epoch: Epoch) -> PhysicsResult<f64> {
        let altitude_km = position_km.norm() - self.body_radius_km;
        Ok(self.reference_density_kg_m3
            * (-(altitude_km - self.reference_altitude_km) / self.scale_height_km).exp())
    }
}

/// Low-precision analytic solar geometry (mean-element Sun), accurate to a
/// fraction of a degree over several decades around J2000.
#[derive(Copy, Clone, Debug, Default)]
pub struct MeanSun;

impl MeanSun {
    fn days_since_j2000(epoch: Epoch) -> f64 {
        let j2000 = Epoch::from_gregorian_utc_hms(2000, 1, 1, 12, 0, 0);
        (epoch - j2000).to_seconds() / 86_400.0
    }

    /// Mean longitude and apparent right ascension of the Sun, in degrees.
    fn longitudes_deg(epoch: Epoch) -> (f64, f64) {
        let n = Self::days_since_j2000(epoch);
        let mean_longitude_deg = (280.460 + 0.985_647_4 * n).rem_euclid(360.0);
        let mean_anomaly_rad = (357.528 + 0.985_600_3 * n).rem_euclid(360.0).to_radians();
        let ecliptic_longitude_rad = (mean_longitude_deg
            + 1.915 * mean_anomaly_rad.sin()
            + 0.020 * (2.0 * mean_anomaly_rad).sin())
        .to_radians();
        let obliquity_rad = (23.439 - 4.0e-7 * n).to_radians();
        let alpha_rad = (obliquity_rad.cos() * ecliptic_longitude_rad.sin())
            .atan2(ecliptic_longitude_rad.cos());
        (mean_longitude_deg, alpha_rad.to_degrees().rem_euclid(360.0))
    }
}

impl SolarGeometry for MeanSun {
    fn right_ascension_deg(&self, epoch: Epoch) -> PhysicsResult<f64> {
        Ok(Self::longitudes_deg(epoch).1)
    }

    fn equation_of_time(&self, epoch: Epoch) -> PhysicsResult<Duration> {
        let (mean_longitude_deg, alpha_deg) = Self::longitudes_deg(epoch);
        let mut delta_deg = (mean_longitude_deg - alpha_deg).rem_euclid(360.0);
        if delta_deg > 180.0 {
            delta_deg -= 360.0;
        }
        // One degree of hour angle is four minutes of time.
        Ok((delta_deg * 240.0).seconds())
    }
}
