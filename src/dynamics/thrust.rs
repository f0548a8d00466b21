/*
 * Apsis Astrodynamics Toolkit
 * Copyright (C) 2024-onward the Apsis contributors (cf. AUTHORS.md)
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use hifitime::Epoch;
use snafu::ensure;

use super::qlaw::QLaw;
use super::{subset_range, DynamicsTerm};
use crate::astro::PhysicsResult;
use crate::constants::usual::STD_GRAVITY_M_S2;
use crate::errors::{MassSnafu, RadiusSnafu};
use crate::frames::Frame;
use crate::math::{Matrix3, Vector3};
use crate::math::DVector;
use crate::state::{
    CoordinateBroker, CoordinateSubset, CARTESIAN_POSITION, CARTESIAN_VELOCITY, MASS,
};

/// Local orbital frames in which a constant thrust direction can be held.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LocalOrbitalFrameKind {
    /// Radial, transverse, normal.
    Rtn,
    /// Velocity, orbit normal, co-normal.
    Vnc,
    /// Tangential, normal (in-plane), cross-track.
    Tnw,
}

impl LocalOrbitalFrameKind {
    /// Rotation whose columns are the frame axes expressed in the inertial
    /// frame, so that `dcm * v_local` is the inertial vector.
    pub fn dcm_to_inertial(&self, r: &Vector3, v: &Vector3) -> PhysicsResult<Matrix3> {
        let h = r.cross(v);
        ensure!(
            r.norm() > f64::EPSILON && v.norm() > f64::EPSILON && h.norm() > f64::EPSILON,
            RadiusSnafu {
                action: "local orbital frame undefined for a rectilinear state"
            }
        );
        let h_hat = h / h.norm();
        Ok(match self {
            Self::Rtn => {
                let r_hat = r / r.norm();
                let t_hat = h_hat.cross(&r_hat);
                Matrix3::from_columns(&[r_hat, t_hat, h_hat])
            }
            Self::Vnc => {
                let v_hat = v / v.norm();
                let c_hat = v_hat.cross(&h_hat);
                Matrix3::from_columns(&[v_hat, h_hat, c_hat])
            }
            Self::Tnw => {
                let t_hat = v / v.norm();
                let n_hat = h_hat.cross(&t_hat);
                Matrix3::from_columns(&[t_hat, n_hat, h_hat])
            }
        })
    }
}

/// Steering of a thruster: a fixed direction in a local orbital frame, or the
/// Q-law feedback for orbital transfers.
#[derive(Clone)]
pub enum GuidanceLaw {
    Constant {
        /// Unit direction in the local orbital frame.
        direction: Vector3,
        frame_kind: LocalOrbitalFrameKind,
    },
    QLaw(QLaw),
}

impl GuidanceLaw {
    /// Inertial unit thrust direction for the provided position/velocity and
    /// current thrust acceleration.
    pub fn inertial_direction(
        &self,
        r: &Vector3,
        v: &Vector3,
        thrust_accel_km_s2: f64,
    ) -> PhysicsResult<Vector3> {
        match self {
            Self::Constant {
                direction,
                frame_kind,
            } => {
                let dcm = frame_kind.dcm_to_inertial(r, v)?;
                let inertial = dcm * direction;
                Ok(inertial / inertial.norm())
            }
            Self::QLaw(qlaw) => qlaw.thrust_direction(r, v, thrust_accel_km_s2),
        }
    }
}

/// Constant-magnitude thrust steered by a guidance law, with the matching
/// mass flow rate dm/dt = -F / (g0 Isp).
#[derive(Clone)]
pub struct Thruster {
    pub thrust_n: f64,
    pub isp_s: f64,
    pub guidance: GuidanceLaw,
}

impl Thruster {
    pub fn new(thrust_n: f64, isp_s: f64, guidance: GuidanceLaw) -> Self {
        Self {
            thrust_n,
            isp_s,
            guidance,
        }
    }

    /// Mass flow rate, in kg/s (negative: propellant is consumed).
    pub fn mass_flow_rate_kg_s(&self) -> f64 {
        -self.thrust_n / (STD_GRAVITY_M_S2 * self.isp_s)
    }
}

impl DynamicsTerm for Thruster {
    fn name(&self) -> &'static str {
        "thruster"
    }

    fn read_subsets(&self) -> Vec<CoordinateSubset> {
        vec![CARTESIAN_POSITION, CARTESIAN_VELOCITY, MASS]
    }

    fn write_subsets(&self) -> Vec<CoordinateSubset> {
        vec![CARTESIAN_VELOCITY, MASS]
    }

    fn contribute(
        &self,
        _epoch: Epoch,
        coordinates: &DVector,
        _frame: Frame,
        broker: &CoordinateBroker,
        rates: &mut DVector,
    ) -> PhysicsResult<()> {
        let position = subset_range(broker, &CARTESIAN_POSITION)?;
        let velocity = subset_range(broker, &CARTESIAN_VELOCITY)?;
        let mass = subset_range(broker, &MASS)?;

        let r = coordinates.fixed_rows::<3>(position.start).into_owned();
        let v = coordinates.fixed_rows::<3>(velocity.start).into_owned();
        let mass_kg = coordinates[mass.start];
        ensure!(
            mass_kg > f64::EPSILON,
            MassSnafu {
                action: "cannot thrust a massless body"
            }
        );

        // N / kg = m/s^2, converted to km/s^2.
        let thrust_accel_km_s2 = self.thrust_n / mass_kg * 1e-3;
        let direction = self
            .guidance
            .inertial_direction(&r, &v, thrust_accel_km_s2)?;

        for i in 0..3 {
            rates[velocity.start + i] += thrust_accel_km_s2 * direction[i];
        }
        rates[mass.start] += self.mass_flow_rate_kg_s();
        Ok(())
    }
}

#[cfg(test)]
mod thrust_ut {
    use super::*;
    use crate::constants::frames::EARTH_J2000;
    use crate::f64_eq_tol;

    #[test]
    fn local_orbital_frames_are_orthonormal() {
        let r = Vector3::new(7000.0, 0.0, 0.0);
        let v = Vector3::new(0.0, 7.5, 0.3);

        for kind in [
            LocalOrbitalFrameKind::Rtn,
            LocalOrbitalFrameKind::Vnc,
            LocalOrbitalFrameKind::Tnw,
        ] {
            let dcm = kind.dcm_to_inertial(&r, &v).unwrap();
            let should_be_identity = dcm.transpose() * dcm;
            for i in 0..3 {
                for j in 0..3 {
                    let expected = if i == j { 1.0 } else { 0.0 };
                    f64_eq_tol!(
                        should_be_identity[(i, j)],
                        expected,
                        1e-12,
                        "orthonormality"
                    );
                }
            }
            f64_eq_tol!(dcm.determinant(), 1.0, 1e-12, "right-handedness");
        }
    }

    #[test]
    fn prograde_thrust_accelerates_and_burns_mass() {
        let thruster = Thruster::new(
            1.0,
            3000.0,
            GuidanceLaw::Constant {
                direction: Vector3::new(1.0, 0.0, 0.0),
                frame_kind: LocalOrbitalFrameKind::Vnc,
            },
        );

        let broker = CoordinateBroker::try_new(vec![
            CARTESIAN_POSITION,
            CARTESIAN_VELOCITY,
            MASS,
        ])
        .unwrap();
        let mut coordinates = DVector::zeros(7);
        coordinates[0] = 7000.0;
        coordinates[4] = 7.5;
        coordinates[6] = 100.0;

        let mut rates = DVector::zeros(7);
        let epoch = Epoch::from_gregorian_utc_at_midnight(2020, 1, 1);
        thruster
            .contribute(epoch, &coordinates, EARTH_J2000, &broker, &mut rates)
            .unwrap();

        // 1 N on 100 kg = 1e-5 km/s^2, along +Y (the velocity direction).
        f64_eq_tol!(rates[4], 1e-5, 1e-12, "thrust acceleration");
        f64_eq_tol!(
            rates[6],
            -1.0 / (STD_GRAVITY_M_S2 * 3000.0),
            1e-15,
            "mass flow"
        );
    }
}
