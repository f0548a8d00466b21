/*
 * Apsis Astrodynamics Toolkit
 * Copyright (C) 2024-onward the Apsis contributors (cf. AUTHORS.md)
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Q-law feedback guidance for low-thrust orbital transfers (Petropoulos).
//!
//! The proximity quotient `Q = sum W_oe S_oe ((oe - oe_T) / oe_xx)^2` scales
//! each element error by the maximum achievable rate of that element under
//! the available thrust acceleration. The commanded thrust direction is the
//! unit vector that minimizes dQ/dt through the Gauss variational equations.

use crate::astro::coe::ClassicalElements;
use crate::astro::PhysicsResult;
use crate::errors::{MathError, PhysicsError};
use crate::math::angles::between_pm_pi;
use crate::math::Vector3;

use super::thrust::LocalOrbitalFrameKind;

/// How the partial derivatives of Q with respect to the orbital elements are
/// obtained. Both strategies agree to about 1e-5 relative.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum GradientStrategy {
    /// Closed-form partials, including the derivatives of the max-rate
    /// scalings.
    Analytical,
    /// Central differences with the provided relative step.
    FiniteDifference { step: f64 },
}

/// Per-element weights of the proximity quotient. A zero weight removes the
/// element from the quotient entirely (its scaling is never evaluated).
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct QLawWeights {
    pub sma: f64,
    pub ecc: f64,
    pub inc: f64,
    pub raan: f64,
    pub aop: f64,
}

impl Default for QLawWeights {
    fn default() -> Self {
        Self {
            sma: 1.0,
            ecc: 1.0,
            inc: 1.0,
            raan: 0.0,
            aop: 0.0,
        }
    }
}

/// Elements tracked by the quotient: [sma (km), ecc, inc, raan, aop (rad)].
type Oe5 = [f64; 5];

const SMA_SCALING_M: f64 = 3.0;
const SMA_SCALING_N: i32 = 4;

#[derive(Clone, Debug)]
pub struct QLaw {
    target: ClassicalElements,
    mu_km3_s2: f64,
    weights: QLawWeights,
    gradient: GradientStrategy,
}

impl QLaw {
    pub fn new(
        target: ClassicalElements,
        mu_km3_s2: f64,
        weights: QLawWeights,
        gradient: GradientStrategy,
    ) -> Self {
        Self {
            target,
            mu_km3_s2,
            weights,
            gradient,
        }
    }

    pub fn target(&self) -> &ClassicalElements {
        &self.target
    }

    fn target_oe(&self) -> Oe5 {
        [
            self.target.sma_km,
            self.target.ecc,
            self.target.inc_deg.to_radians(),
            self.target.raan_deg.to_radians(),
            self.target.aop_deg.to_radians(),
        ]
    }

    fn weight(&self, index: usize) -> f64 {
        [
            self.weights.sma,
            self.weights.ecc,
            self.weights.inc,
            self.weights.raan,
            self.weights.aop,
        ][index]
    }

    /// Element errors, with the angular entries wrapped to [-pi, pi).
    fn deltas(&self, oe: &Oe5) -> Oe5 {
        let target = self.target_oe();
        [
            oe[0] - target[0],
            oe[1] - target[1],
            oe[2] - target[2],
            between_pm_pi(oe[3] - target[3]),
            between_pm_pi(oe[4] - target[4]),
        ]
    }

    /// Maximum achievable rates of each tracked element under the thrust
    /// acceleration `f` (km/s^2). Entries with a zero weight are left at 1.
    fn max_rates(&self, oe: &Oe5, f: f64) -> PhysicsResult<Oe5> {
        let (a, e, inc, _, aop) = (oe[0], oe[1], oe[2], oe[3], oe[4]);
        let mu = self.mu_km3_s2;
        let p = a * (1.0 - e * e);
        ensure_positive(p, "semi-latus rectum in the Q-law scalings")?;
        let sqrt_p_mu = (p / mu).sqrt();

        let mut xx = [1.0; 5];

        if self.weights.sma > 0.0 {
            xx[0] = 2.0 * f * (a.powi(3) * (1.0 + e) / (mu * (1.0 - e))).sqrt();
        }
        if self.weights.ecc > 0.0 {
            xx[1] = 2.0 * f * sqrt_p_mu;
        }
        if self.weights.inc > 0.0 {
            let gi = (1.0 - e * e * aop.sin().powi(2)).sqrt() - e * aop.cos().abs();
            ensure_positive(gi, "inclination scaling denominator")?;
            xx[2] = f * sqrt_p_mu / gi;
        }
        if self.weights.raan > 0.0 {
            let gr = (1.0 - e * e * aop.cos().powi(2)).sqrt() - e * aop.sin().abs();
            ensure_positive(inc.sin() * gr, "node scaling denominator")?;
            xx[3] = f * sqrt_p_mu / (inc.sin() * gr);
        }
        if self.weights.aop > 0.0 {
            ensure_positive(e - 1e-4, "eccentricity for the periapsis scaling")?;
            let h = (mu * p).sqrt();
            let (b, _) = cos_theta_xx(e);
            let r_xx = p / (1.0 + e * b);
            let g = (p.powi(2) * b.powi(2) + (p + r_xx).powi(2) * (1.0 - b.powi(2))).sqrt();
            xx[4] = f * g / (e * h);
        }

        Ok(xx)
    }

    /// The proximity quotient for the provided elements and thrust
    /// acceleration.
    pub fn proximity_quotient(&self, oe: &Oe5, f: f64) -> PhysicsResult<f64> {
        let deltas = self.deltas(oe);
        let xx = self.max_rates(oe, f)?;

        let mut q = 0.0;
        for k in 0..5 {
            let weight = self.weight(k);
            if weight > 0.0 {
                let scaled = deltas[k] / xx[k];
                q += weight * self.scaling(k, deltas[0]) * scaled * scaled;
            }
        }
        Ok(q)
    }

    /// The distance scaling S_oe: identity except for the semi-major axis,
    /// which is inflated far from the target to avoid escape trajectories.
    fn scaling(&self, index: usize, delta_sma_km: f64) -> f64 {
        if index == 0 {
            let x = delta_sma_km / (SMA_SCALING_M * self.target.sma_km);
            (1.0 + x.powi(SMA_SCALING_N)).sqrt()
        } else {
            1.0
        }
    }

    /// dQ/d(oe), by the configured strategy.
    pub fn gradient(&self, oe: &Oe5, f: f64) -> PhysicsResult<Oe5> {
        match self.gradient {
            GradientStrategy::Analytical => self.gradient_analytical(oe, f),
            GradientStrategy::FiniteDifference { step } => self.gradient_finite_difference(oe, f, step),
        }
    }

    fn gradient_finite_difference(&self, oe: &Oe5, f: f64, step: f64) -> PhysicsResult<Oe5> {
        let mut gradient = [0.0; 5];
        for j in 0..5 {
            let h = (step * oe[j].abs()).max(step);
            let mut forward = *oe;
            forward[j] += h;
            let mut backward = *oe;
            backward[j] -= h;
            gradient[j] = (self.proximity_quotient(&forward, f)?
                - self.proximity_quotient(&backward, f)?)
                / (2.0 * h);
        }
        Ok(gradient)
    }

    fn gradient_analytical(&self, oe: &Oe5, f: f64) -> PhysicsResult<Oe5> {
        let (a, e, inc, _, aop) = (oe[0], oe[1], oe[2], oe[3], oe[4]);
        let mu = self.mu_km3_s2;
        let p = a * (1.0 - e * e);
        ensure_positive(p, "semi-latus rectum in the Q-law scalings")?;
        let dp_de = -2.0 * a * e;
        let h = (mu * p).sqrt();
        let dh_de = mu * dp_de / (2.0 * h);

        let deltas = self.deltas(oe);
        let xx = self.max_rates(oe, f)?;

        // dxx[k][j]: partial of the k-th max rate with respect to oe_j.
        let mut dxx = [[0.0; 5]; 5];

        if self.weights.sma > 0.0 {
            dxx[0][0] = 1.5 * xx[0] / a;
            dxx[0][1] = xx[0] / (1.0 - e * e);
        }
        if self.weights.ecc > 0.0 {
            dxx[1][0] = xx[1] / (2.0 * a);
            dxx[1][1] = -xx[1] * e / (1.0 - e * e);
        }
        if self.weights.inc > 0.0 {
            let root = (1.0 - e * e * aop.sin().powi(2)).sqrt();
            let gi = root - e * aop.cos().abs();
            let dgi_de = -e * aop.sin().powi(2) / root - aop.cos().abs();
            let dgi_daop = -e * e * aop.sin() * aop.cos() / root
                + e * aop.cos().signum() * aop.sin();
            dxx[2][0] = xx[2] / (2.0 * a);
            dxx[2][1] = xx[2] * (-e / (1.0 - e * e) - dgi_de / gi);
            dxx[2][4] = -xx[2] * dgi_daop / gi;
        }
        if self.weights.raan > 0.0 {
            let root = (1.0 - e * e * aop.cos().powi(2)).sqrt();
            let gr = root - e * aop.sin().abs();
            let dgr_de = -e * aop.cos().powi(2) / root - aop.sin().abs();
            let dgr_daop = e * e * aop.sin() * aop.cos() / root
                - e * aop.sin().signum() * aop.cos();
            dxx[3][0] = xx[3] / (2.0 * a);
            dxx[3][1] = xx[3] * (-e / (1.0 - e * e) - dgr_de / gr);
            dxx[3][2] = -xx[3] * inc.cos() / inc.sin();
            dxx[3][4] = -xx[3] * dgr_daop / gr;
        }
        if self.weights.aop > 0.0 {
            let (b, db_de) = cos_theta_xx(e);
            let r_xx = p / (1.0 + e * b);
            let dr_de = (dp_de * (1.0 + e * b) - p * (b + e * db_de)) / (1.0 + e * b).powi(2);
            let g = (p.powi(2) * b.powi(2) + (p + r_xx).powi(2) * (1.0 - b.powi(2))).sqrt();
            let dg_de = (p * dp_de * b.powi(2) + p.powi(2) * b * db_de
                + (p + r_xx) * (dp_de + dr_de) * (1.0 - b.powi(2))
                - (p + r_xx).powi(2) * b * db_de)
                / g;
            dxx[4][0] = xx[4] / (2.0 * a);
            dxx[4][1] = xx[4] * (dg_de / g - 1.0 / e - dh_de / h);
        }
        let mut gradient = [0.0; 5];
        for k in 0..5 {
            let weight = self.weight(k);
            if weight <= 0.0 {
                continue;
            }
            let d = deltas[k] / xx[k];
            let s = self.scaling(k, deltas[0]);
            for j in 0..5 {
                let ddelta = if j == k { 1.0 } else { 0.0 };
                let dd = (ddelta * xx[k] - deltas[k] * dxx[k][j]) / xx[k].powi(2);
                gradient[j] += weight * s * 2.0 * d * dd;
            }
            if k == 0 {
                // The sma scaling S also depends on the sma error.
                let x = deltas[0] / (SMA_SCALING_M * self.target.sma_km);
                let ds_da = 0.5 / s * f64::from(SMA_SCALING_N) * x.powi(SMA_SCALING_N - 1)
                    / (SMA_SCALING_M * self.target.sma_km);
                gradient[0] += weight * ds_da * d * d;
            }
        }
        Ok(gradient)
    }

    /// Unit thrust direction (inertial) minimizing dQ/dt at the provided
    /// position and velocity, for the provided thrust acceleration (km/s^2).
    pub fn thrust_direction(
        &self,
        r: &Vector3,
        v: &Vector3,
        thrust_accel_km_s2: f64,
    ) -> PhysicsResult<Vector3> {
        let elements = ClassicalElements::from_rv(self.mu_km3_s2, r, v)?;
        let ta_rad = elements.true_anomaly_deg()?.to_radians();
        let oe = [
            elements.sma_km,
            elements.ecc,
            elements.inc_deg.to_radians(),
            elements.raan_deg.to_radians(),
            elements.aop_deg.to_radians(),
        ];

        let gradient = self.gradient(&oe, thrust_accel_km_s2)?;

        // D = A^T dQ/doe, with A the Gauss variational matrix (per unit
        // acceleration, components radial/transverse/normal). Rows with a
        // zero gradient entry are skipped, which keeps the singular rows of
        // unweighted elements out of the computation.
        let (a, e, inc, aop) = (oe[0], oe[1], oe[2], oe[4]);
        let mu = self.mu_km3_s2;
        let p = a * (1.0 - e * e);
        let h = (mu * p).sqrt();
        let radius = p / (1.0 + e * ta_rad.cos());
        let argument_of_latitude = aop + ta_rad;

        let mut d_rtn = Vector3::zeros();
        if gradient[0] != 0.0 {
            d_rtn += gradient[0]
                * Vector3::new(
                    2.0 * a.powi(2) / h * e * ta_rad.sin(),
                    2.0 * a.powi(2) / h * p / radius,
                    0.0,
                );
        }
        if gradient[1] != 0.0 {
            d_rtn += gradient[1]
                * Vector3::new(
                    p * ta_rad.sin() / h,
                    ((p + radius) * ta_rad.cos() + radius * e) / h,
                    0.0,
                );
        }
        if gradient[2] != 0.0 {
            d_rtn += gradient[2]
                * Vector3::new(0.0, 0.0, radius * argument_of_latitude.cos() / h);
        }
        if gradient[3] != 0.0 {
            ensure_positive(inc.sin(), "node row of the variational equations")?;
            d_rtn += gradient[3]
                * Vector3::new(
                    0.0,
                    0.0,
                    radius * argument_of_latitude.sin() / (h * inc.sin()),
                );
        }
        if gradient[4] != 0.0 {
            ensure_positive(e - 1e-4, "periapsis row of the variational equations")?;
            let normal = if inc.sin().abs() > f64::EPSILON {
                -radius * argument_of_latitude.sin() * inc.cos() / (h * inc.sin())
            } else {
                0.0
            };
            d_rtn += gradient[4]
                * Vector3::new(
                    -p * ta_rad.cos() / (h * e),
                    (p + radius) * ta_rad.sin() / (h * e),
                    normal,
                );
        }

        if d_rtn.norm() < f64::EPSILON {
            return Err(PhysicsError::AppliedMath {
                source: MathError::DomainError {
                    value: d_rtn.norm(),
                    msg: "the Q-law gradient vanished (target reached?)",
                },
            });
        }

        let direction_rtn = -d_rtn / d_rtn.norm();
        let dcm = LocalOrbitalFrameKind::Rtn.dcm_to_inertial(r, v)?;
        Ok(dcm * direction_rtn)
    }
}

/// The Petropoulos true anomaly of maximum periapsis rate: the closed-form
/// root `cos(theta_xx)` of the in-plane maximization cubic
/// `e^2 x^3 + 3 e x^2 + (3 + e^2) x + 2 e = 0`, and its derivative with
/// respect to the eccentricity.
fn cos_theta_xx(e: f64) -> (f64, f64) {
    // Depressing the cubic by x = y - 1/e leaves y^3 + y = (1 - e^2)/e^3,
    // solved by Cardano.
    let u = (1.0 - e * e) / (2.0 * e.powi(3));
    let w = (u * u + 1.0 / 27.0).sqrt();
    let y = (u + w).cbrt() - (w - u).cbrt();

    let du = (e * e - 3.0) / (2.0 * e.powi(4));
    let dw = u * du / w;
    let dy = (du + dw) / (3.0 * (u + w).powi(2).cbrt())
        - (dw - du) / (3.0 * (w - u).powi(2).cbrt());

    (y - 1.0 / e, dy + 1.0 / (e * e))
}

fn ensure_positive(value: f64, msg: &'static str) -> PhysicsResult<()> {
    if value <= f64::EPSILON {
        Err(PhysicsError::AppliedMath {
            source: MathError::DomainError { value, msg },
        })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod qlaw_ut {
    use super::*;
    use crate::constants::usual::EARTH_GM_KM3_S2;
    use crate::f64_eq_tol;
    use rstest::rstest;

    fn geo_target() -> ClassicalElements {
        ClassicalElements::try_keplerian(42_164.0, 0.01, 0.5, 10.0, 30.0, 0.0).unwrap()
    }

    fn qlaw(weights: QLawWeights, gradient: GradientStrategy) -> QLaw {
        QLaw::new(geo_target(), EARTH_GM_KM3_S2, weights, gradient)
    }

    #[rstest]
    #[case([24_396.0, 0.55, 0.2, 0.3, 1.2])]
    #[case([10_000.0, 0.2, 0.9, 2.0, 4.0])]
    fn gradient_strategies_agree(#[case] oe: [f64; 5]) {
        let weights = QLawWeights {
            sma: 1.0,
            ecc: 1.0,
            inc: 1.0,
            raan: 0.5,
            aop: 0.2,
        };
        let f = 1e-7; // km/s^2

        let analytical = qlaw(weights, GradientStrategy::Analytical)
            .gradient(&oe, f)
            .unwrap();
        let finite = qlaw(weights, GradientStrategy::FiniteDifference { step: 1e-7 })
            .gradient(&oe, f)
            .unwrap();

        let scale = analytical.iter().map(|g| g.abs()).fold(0.0, f64::max);
        for j in 0..5 {
            f64_eq_tol!(
                finite[j],
                analytical[j],
                scale * 1e-5,
                "gradient strategy agreement"
            );
        }
    }

    #[test]
    fn raising_orbit_thrusts_prograde() {
        let weights = QLawWeights {
            sma: 1.0,
            ecc: 0.0,
            inc: 0.0,
            raan: 0.0,
            aop: 0.0,
        };
        let qlaw = qlaw(weights, GradientStrategy::Analytical);

        // Circular LEO in the equator plane, prograde.
        let r = Vector3::new(7000.0, 0.0, 0.0);
        let v = Vector3::new(0.0, (EARTH_GM_KM3_S2 / 7000.0_f64).sqrt(), 0.001);
        let direction = qlaw.thrust_direction(&r, &v, 1e-7).unwrap();

        f64_eq_tol!(direction.norm(), 1.0, 1e-12, "unit direction");
        // Mostly along the velocity.
        assert!(
            direction.dot(&(v / v.norm())) > 0.99,
            "expected prograde thrust, got {direction}"
        );
    }

    #[test]
    fn quotient_decreases_toward_target() {
        let weights = QLawWeights::default();
        let qlaw = qlaw(weights, GradientStrategy::Analytical);
        let f = 1e-7;

        let far = qlaw
            .proximity_quotient(&[10_000.0, 0.3, 0.4, 0.1, 0.5], f)
            .unwrap();
        let near = qlaw
            .proximity_quotient(&[41_000.0, 0.02, 0.01, 0.1, 0.5], f)
            .unwrap();
        assert!(near < far);

        let at_target = qlaw
            .proximity_quotient(
                &[42_164.0, 0.01, 0.5_f64.to_radians(), 10.0_f64.to_radians(), 30.0_f64.to_radians()],
                f,
            )
            .unwrap();
        assert!(at_target < near);
    }
}
