/*
 * Apsis Astrodynamics Toolkit
 * Copyright (C) 2024-onward the Apsis contributors (cf. AUTHORS.md)
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

pub mod celestial_objects {
    use crate::NaifId;

    pub const SUN: NaifId = 10;
    pub const MOON: NaifId = 301;
    pub const EARTH: NaifId = 399;

    pub const fn celestial_name_from_id(id: NaifId) -> Option<&'static str> {
        match id {
            SUN => Some("Sun"),
            MOON => Some("Moon"),
            EARTH => Some("Earth"),
            _ => None,
        }
    }
}

pub mod orientations {
    use crate::NaifId;

    /// Generic International Celestial Reference Frame orientation, the only
    /// quasi-inertial orientation known to this crate.
    pub const J2000: NaifId = 1;
    /// International Terrestrial Reference Frame (Earth fixed).
    pub const ITRF93: NaifId = 3000;

    pub const fn orientation_name_from_id(id: NaifId) -> Option<&'static str> {
        match id {
            J2000 => Some("J2000"),
            ITRF93 => Some("ITRF93"),
            _ => None,
        }
    }
}

pub mod usual {
    /// EGM2008 gravitational parameter of the Earth, in km^3/s^2
    pub const EARTH_GM_KM3_S2: f64 = 398_600.4418;
    /// EGM2008 equatorial radius of the Earth, in km
    pub const EARTH_EQUATORIAL_RADIUS_KM: f64 = 6_378.137;
    /// EGM2008 polar radius of the Earth, in km
    pub const EARTH_POLAR_RADIUS_KM: f64 = 6_356.7523;
    /// EGM2008 zonal coefficients of the Earth geopotential (unnormalized)
    pub const EARTH_J2: f64 = 1.082_626_925_638_815e-3;
    pub const EARTH_J3: f64 = -2.532_656_485_332_24e-6;
    pub const EARTH_J4: f64 = -1.619_621_591_367e-6;
    pub const EARTH_J5: f64 = -2.272_960_828_686_98e-7;
    /// Gravitational parameter of the Sun, in km^3/s^2
    pub const SUN_GM_KM3_S2: f64 = 1.327_124_400_18e11;
    /// Gravitational parameter of the Moon, in km^3/s^2
    pub const MOON_GM_KM3_S2: f64 = 4_902.800_066;
    /// Standard gravity, in m/s^2 (mass flow rate of thrusters)
    pub const STD_GRAVITY_M_S2: f64 = 9.80665;
}

pub mod frames {
    use super::celestial_objects::{EARTH, MOON, SUN};
    use super::orientations::{ITRF93, J2000};
    use super::usual::*;
    use crate::frames::{Ellipsoid, Frame};

    /// Geocentric Celestial Reference Frame: Earth centered, quasi-inertial.
    pub const EARTH_J2000: Frame = Frame {
        ephemeris_id: EARTH,
        orientation_id: J2000,
        mu_km3_s2: Some(EARTH_GM_KM3_S2),
        shape: Some(Ellipsoid {
            equatorial_radius_km: EARTH_EQUATORIAL_RADIUS_KM,
            polar_radius_km: EARTH_POLAR_RADIUS_KM,
        }),
    };

    /// Alias kept for readers used to the IAU naming.
    pub const GCRF: Frame = EARTH_J2000;

    /// International Terrestrial Reference Frame: Earth centered, Earth fixed.
    pub const EARTH_ITRF93: Frame = Frame {
        ephemeris_id: EARTH,
        orientation_id: ITRF93,
        mu_km3_s2: Some(EARTH_GM_KM3_S2),
        shape: Some(Ellipsoid {
            equatorial_radius_km: EARTH_EQUATORIAL_RADIUS_KM,
            polar_radius_km: EARTH_POLAR_RADIUS_KM,
        }),
    };

    pub const SUN_J2000: Frame = Frame {
        ephemeris_id: SUN,
        orientation_id: J2000,
        mu_km3_s2: Some(SUN_GM_KM3_S2),
        shape: None,
    };

    pub const MOON_J2000: Frame = Frame {
        ephemeris_id: MOON,
        orientation_id: J2000,
        mu_km3_s2: Some(MOON_GM_KM3_S2),
        shape: None,
    };
}
