/*
 * Apsis Astrodynamics Toolkit
 * Copyright (C) 2024-onward the Apsis contributors (cf. AUTHORS.md)
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

// Vector3 is nalgebra's Vector3 with a 64-bit floating point representation.
pub type Vector3 = nalgebra::Vector3<f64>;
pub type Vector6 = nalgebra::Vector6<f64>;
pub type Matrix3 = nalgebra::Matrix3<f64>;
pub type Matrix6 = nalgebra::Matrix6<f64>;
pub type DVector = nalgebra::DVector<f64>;
pub type DMatrix = nalgebra::DMatrix<f64>;

pub mod angles;
pub mod anomalies;
pub mod cartesian;

/// Returns the projection of a onto b
pub fn proj_vector(a: &Vector3, b: &Vector3) -> Vector3 {
    b * a.dot(b) / b.dot(b)
}

/// Returns the components of vector a orthogonal to b
pub fn perp_vector(a: &Vector3, b: &Vector3) -> Vector3 {
    let big_a = a[0].abs().max(a[1].abs().max(a[2].abs()));
    let big_b = b[0].abs().max(b[1].abs().max(b[2].abs()));
    if big_a < f64::EPSILON {
        Vector3::zeros()
    } else if big_b < f64::EPSILON {
        *a
    } else {
        let a_scl = a / big_a;
        let b_scl = b / big_b;
        let v = proj_vector(&a_scl, &b_scl);
        big_a * (a_scl - v)
    }
}

/// Root sum squared difference between two vectors
pub fn root_sum_squared(vec_a: &Vector3, vec_b: &Vector3) -> f64 {
    vec_a
        .iter()
        .zip(vec_b.iter())
        .map(|(a, b)| (a - b).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// Root mean squared difference between two vectors
pub fn root_mean_squared(vec_a: &Vector3, vec_b: &Vector3) -> f64 {
    (vec_a
        .iter()
        .zip(vec_b.iter())
        .map(|(a, b)| (a - b).powi(2))
        .sum::<f64>()
        / (vec_a.len() as f64))
        .sqrt()
}

#[macro_export]
macro_rules! f64_eq {
    ($x:expr, $val:expr, $msg:expr) => {
        $crate::f64_eq_tol!($x, $val, 1e-10, $msg)
    };
}

#[macro_export]
macro_rules! f64_eq_tol {
    ($x:expr, $val:expr, $tol:expr, $msg:expr) => {
        assert!(
            ($x - $val).abs() < $tol,
            "{}: {:.2e}\tgot: {}\twant: {}",
            $msg,
            ($x - $val).abs(),
            $x,
            $val
        )
    };
}
