/*
 * Apsis Astrodynamics Toolkit
 * Copyright (C) 2024-onward the Apsis contributors (cf. AUTHORS.md)
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Bit-exact codec for the NORAD two-line element (TLE) text format.
//!
//! Parsing is column exact and checksum verified; formatting emits the
//! canonical fixed-column layout (zero-padded catalog numbers, assumed
//! decimal points, single-digit exponents) such that parsing then formatting
//! canonical text reproduces it byte for byte.

use core::fmt;

use hifitime::{Epoch, TimeUnits};
use serde_derive::{Deserialize, Serialize};
use snafu::ensure;

use crate::errors::{
    ChecksumMismatchSnafu, InvalidLineLengthSnafu, InvalidLineNumberSnafu,
    SatelliteNumberMismatchSnafu, TleError, UnexpectedCharacterSnafu, UnrepresentableSnafu,
};

pub type TleResult<T> = Result<T, TleError>;

const LINE_LENGTH: usize = 69;
/// Columns that must be blank on line 1 (0-indexed).
const LINE1_SPACES: [usize; 8] = [1, 8, 17, 32, 43, 52, 61, 63];
/// Columns that must be blank on line 2 (0-indexed).
const LINE2_SPACES: [usize; 7] = [1, 7, 16, 25, 33, 42, 51];

const MONTH_STARTS: [u16; 12] = [0, 31, 59, 90, 120, 151, 181, 212, 243, 273, 304, 334];

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Classification {
    Unclassified,
    Classified,
    Secret,
}

impl Classification {
    fn from_char(c: char) -> Option<Self> {
        match c {
            'U' => Some(Self::Unclassified),
            'C' => Some(Self::Classified),
            'S' => Some(Self::Secret),
            _ => None,
        }
    }

    const fn to_char(self) -> char {
        match self {
            Self::Unclassified => 'U',
            Self::Classified => 'C',
            Self::Secret => 'S',
        }
    }
}

/// A two-line element set, optionally named.
///
/// The mean motion derivative fields hold the values as printed on the card:
/// `mean_motion_dot` is the first derivative divided by two (rev/day^2) and
/// `mean_motion_ddot` the second derivative divided by six (rev/day^3).
/// `bstar` is in inverse Earth radii.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tle {
    pub name: Option<String>,
    pub satellite_number: u32,
    pub classification: Classification,
    pub international_designator: String,
    pub epoch: Epoch,
    pub mean_motion_dot: f64,
    pub mean_motion_ddot: f64,
    pub bstar: f64,
    pub ephemeris_type: u8,
    pub element_set_number: u16,
    pub inc_deg: f64,
    pub raan_deg: f64,
    pub ecc: f64,
    pub aop_deg: f64,
    pub mean_anomaly_deg: f64,
    pub mean_motion_rev_day: f64,
    pub revolution_number: u32,
}

impl Tle {
    /// Parses a TLE from its two 69-character lines.
    pub fn parse(first_line: &str, second_line: &str) -> TleResult<Self> {
        Self::parse_with_name(None, first_line, second_line)
    }

    /// Parses a three-line TLE: a satellite name line (up to 24 characters)
    /// followed by the two element lines.
    pub fn parse_with_name(
        name: Option<&str>,
        first_line: &str,
        second_line: &str,
    ) -> TleResult<Self> {
        validate_structure(first_line, 1, '1', &LINE1_SPACES)?;
        validate_structure(second_line, 2, '2', &LINE2_SPACES)?;

        let satellite_number = parse_integer::<u32>(&first_line[2..7], "satellite number")?;
        let second_number = parse_integer::<u32>(&second_line[2..7], "satellite number")?;
        ensure!(
            satellite_number == second_number,
            SatelliteNumberMismatchSnafu {
                first: satellite_number,
                second: second_number,
            }
        );

        let classification = first_line[7..8]
            .chars()
            .next()
            .and_then(Classification::from_char)
            .ok_or_else(|| TleError::FieldParse {
                field: "classification",
                reason: format!("unknown designator {:?}", &first_line[7..8]),
            })?;

        Ok(Self {
            name: name.map(|n| n.trim_end().to_string()),
            satellite_number,
            classification,
            international_designator: first_line[9..17].trim_end().to_string(),
            epoch: parse_epoch(&first_line[18..32])?,
            mean_motion_dot: parse_real(&first_line[33..43], false, "mean motion derivative")?,
            mean_motion_ddot: parse_real(
                &first_line[44..52],
                true,
                "mean motion second derivative",
            )?,
            bstar: parse_real(&first_line[53..61], true, "B* drag term")?,
            ephemeris_type: parse_integer::<u8>(&first_line[62..63], "ephemeris type")?,
            element_set_number: parse_integer::<u16>(&first_line[64..68], "element set number")?,
            inc_deg: parse_real(&second_line[8..16], false, "inclination")?,
            raan_deg: parse_real(&second_line[17..25], false, "right ascension")?,
            ecc: parse_real(&second_line[26..33], true, "eccentricity")?,
            aop_deg: parse_real(&second_line[34..42], false, "argument of periapsis")?,
            mean_anomaly_deg: parse_real(&second_line[43..51], false, "mean anomaly")?,
            mean_motion_rev_day: parse_real(&second_line[52..63], false, "mean motion")?,
            revolution_number: parse_integer::<u32>(&second_line[63..68], "revolution number")?,
        })
    }

    /// Returns both element lines in the canonical fixed-column format.
    pub fn to_lines(&self) -> TleResult<(String, String)> {
        Ok((self.first_line()?, self.second_line()?))
    }

    /// Formats the first element line, checksum included.
    pub fn first_line(&self) -> TleResult<String> {
        let (epoch_yy, epoch_doy) = epoch_to_year_doy(self.epoch);
        let mut line = format!(
            "1 {:05}{} {:<8} {:02}{:012.8} {} {} {} {} {:4}",
            self.satellite_number,
            self.classification.to_char(),
            self.international_designator,
            epoch_yy,
            epoch_doy,
            format_point_assumed(self.mean_motion_dot, "mean motion derivative")?,
            format_exponent_assumed(self.mean_motion_ddot, "mean motion second derivative")?,
            format_exponent_assumed(self.bstar, "B* drag term")?,
            self.ephemeris_type,
            self.element_set_number,
        );
        line.push(char::from(b'0' + generate_checksum(&line)));
        Ok(line)
    }

    /// Formats the second element line, checksum included.
    pub fn second_line(&self) -> TleResult<String> {
        let ecc_digits = (self.ecc * 1e7).round() as u64;
        ensure!(
            ecc_digits < 10_000_000,
            UnrepresentableSnafu {
                field: "eccentricity",
                value: self.ecc,
            }
        );
        let mut line = format!(
            "2 {:05} {:8.4} {:8.4} {:07} {:8.4} {:8.4} {:11.8}{:5}",
            self.satellite_number,
            self.inc_deg,
            self.raan_deg,
            ecc_digits,
            self.aop_deg,
            self.mean_anomaly_deg,
            self.mean_motion_rev_day,
            self.revolution_number,
        );
        line.push(char::from(b'0' + generate_checksum(&line)));
        Ok(line)
    }

    /// Checksum digit of the formatted first line.
    pub fn first_line_checksum(&self) -> TleResult<u8> {
        Ok(generate_checksum(&self.first_line()?))
    }

    /// Checksum digit of the formatted second line.
    pub fn second_line_checksum(&self) -> TleResult<u8> {
        Ok(generate_checksum(&self.second_line()?))
    }
}

impl fmt::Display for Tle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.to_lines() {
            Ok((first, second)) => {
                if let Some(name) = &self.name {
                    writeln!(f, "{name}")?;
                }
                writeln!(f, "{first}")?;
                write!(f, "{second}")
            }
            Err(_) => Err(fmt::Error),
        }
    }
}

/// Computes the modulo-10 checksum of an element line: the sum of all digits
/// plus one for each minus sign, over all columns but the last.
pub fn generate_checksum(line: &str) -> u8 {
    let end = line.len().min(LINE_LENGTH - 1);
    (line.as_bytes()[..end]
        .iter()
        .fold(0u32, |acc, &c| match c {
            b'-' => acc + 1,
            b'0'..=b'9' => acc + u32::from(c - b'0'),
            _ => acc,
        })
        % 10) as u8
}

fn validate_structure(
    line: &str,
    line_number: usize,
    leading: char,
    spaces: &[usize],
) -> TleResult<()> {
    ensure!(
        line.len() == LINE_LENGTH,
        InvalidLineLengthSnafu {
            line: line_number,
            got: line.len(),
        }
    );
    if let Some(position) = line.bytes().position(|b| !b.is_ascii()) {
        return Err(TleError::UnexpectedCharacter {
            line: line_number,
            column: position + 1,
        });
    }
    ensure!(
        line.starts_with(leading),
        InvalidLineNumberSnafu {
            line: line_number,
            expected: leading,
        }
    );
    let bytes = line.as_bytes();
    for &index in spaces {
        ensure!(
            bytes[index] == b' ',
            UnexpectedCharacterSnafu {
                line: line_number,
                column: index + 1,
            }
        );
    }

    let expected = bytes[LINE_LENGTH - 1];
    ensure!(
        expected.is_ascii_digit(),
        ChecksumMismatchSnafu {
            line: line_number,
            expected: 0u8,
            computed: generate_checksum(line),
        }
    );
    let computed = generate_checksum(line);
    ensure!(
        computed == expected - b'0',
        ChecksumMismatchSnafu {
            line: line_number,
            expected: expected - b'0',
            computed,
        }
    );
    Ok(())
}

fn parse_integer<T: core::str::FromStr>(field: &str, name: &'static str) -> TleResult<T>
where
    T::Err: fmt::Display,
{
    field
        .trim()
        .parse::<T>()
        .map_err(|err| TleError::FieldParse {
            field: name,
            reason: format!("{err} in {field:?}"),
        })
}

/// Parses a fixed-column real number.
///
/// With `decimal_point_assumed`, a `0.` is inserted after the optional sign,
/// and a bare trailing exponent is expanded (`12345-6` becomes `0.12345e-6`).
fn parse_real(field: &str, decimal_point_assumed: bool, name: &'static str) -> TleResult<f64> {
    let trimmed = field.trim();
    let mut normalized = if decimal_point_assumed {
        if let Some(rest) = trimmed.strip_prefix('-') {
            format!("-0.{rest}")
        } else if let Some(rest) = trimmed.strip_prefix('+') {
            format!("+0.{rest}")
        } else {
            format!("0.{trimmed}")
        }
    } else {
        trimmed.to_string()
    };

    // Expand the assumed exponent marker, e.g. `0.12345-6` to `0.12345e-6`.
    for sign in ['-', '+'] {
        if let Some(index) = normalized.rfind(sign) {
            if index > 0 && !normalized[..index].ends_with(['e', 'E']) {
                normalized.replace_range(index..index + 1, &format!("e{sign}"));
            }
        }
    }

    normalized.parse::<f64>().map_err(|err| TleError::FieldParse {
        field: name,
        reason: format!("{err} in {field:?}"),
    })
}

fn is_leap_year(year: i32) -> bool {
    year % 4 == 0 && (year % 100 != 0 || year % 400 == 0)
}

fn day_of_year(year: i32, month: u8, day: u8) -> u16 {
    let mut doy = MONTH_STARTS[usize::from(month) - 1] + u16::from(day);
    if month > 2 && is_leap_year(year) {
        doy += 1;
    }
    doy
}

/// Parses the `YYDDD.DDDDDDDD` epoch field into a UTC epoch. Years below 57
/// belong to the 21st century, per the NORAD convention.
fn parse_epoch(field: &str) -> TleResult<Epoch> {
    let yy = parse_integer::<i32>(&field[..2], "epoch year")?;
    let year = if yy < 57 { 2000 + yy } else { 1900 + yy };
    let doy = parse_real(&field[2..], false, "epoch day of year")?;
    ensure!(
        doy >= 1.0,
        UnrepresentableSnafu {
            field: "epoch day of year",
            value: doy,
        }
    );
    Ok(Epoch::from_gregorian_utc_at_midnight(year, 1, 1) + (doy - 1.0).days())
}

fn epoch_to_year_doy(epoch: Epoch) -> (i32, f64) {
    let (year, month, day, hour, minute, second, nanos) = epoch.to_gregorian_utc();
    let doy = f64::from(day_of_year(year, month, day));
    let seconds_of_day = f64::from(hour) * 3600.0
        + f64::from(minute) * 60.0
        + f64::from(second)
        + f64::from(nanos) / 1e9;
    (year % 100, doy + seconds_of_day / 86_400.0)
}

/// Formats a point-assumed 10-column field: sign, point, eight digits.
fn format_point_assumed(value: f64, field: &'static str) -> TleResult<String> {
    let digits = (value.abs() * 1e8).round() as u64;
    ensure!(
        digits < 100_000_000,
        UnrepresentableSnafu { field, value }
    );
    let sign = if value.is_sign_negative() { '-' } else { ' ' };
    Ok(format!("{sign}.{digits:08}"))
}

/// Formats an exponent-assumed 8-column field: sign, five mantissa digits,
/// exponent sign, one exponent digit.
fn format_exponent_assumed(value: f64, field: &'static str) -> TleResult<String> {
    if value == 0.0 {
        return Ok(" 00000-0".to_string());
    }
    let sign = if value < 0.0 { '-' } else { ' ' };
    let mut exponent = value.abs().log10().floor() as i32 + 1;
    let mut digits = (value.abs() / 10f64.powi(exponent) * 1e5).round() as u64;
    if digits == 100_000 {
        digits = 10_000;
        exponent += 1;
    }
    ensure!(
        (-9..=9).contains(&exponent),
        UnrepresentableSnafu { field, value }
    );
    let exponent_sign = if exponent >= 0 { '+' } else { '-' };
    Ok(format!(
        "{sign}{digits:05}{exponent_sign}{}",
        exponent.abs()
    ))
}

#[cfg(test)]
mod tle_ut {
    use super::*;
    use crate::f64_eq_tol;

    const ISS_LINE1: &str = "1 25544U 98067A   08264.51782528 -.00002182  00000-0 -11606-4 0  2927";
    const ISS_LINE2: &str = "2 25544  51.6416 247.4627 0006703 130.5360 325.0288 15.72125391563537";

    #[test]
    fn parse_iss() {
        let tle = Tle::parse(ISS_LINE1, ISS_LINE2).unwrap();

        assert_eq!(tle.satellite_number, 25544);
        assert_eq!(tle.classification, Classification::Unclassified);
        assert_eq!(tle.international_designator, "98067A");
        assert_eq!(tle.element_set_number, 292);
        assert_eq!(tle.ephemeris_type, 0);
        assert_eq!(tle.revolution_number, 56353);

        f64_eq_tol!(tle.mean_motion_dot, -0.00002182, 1e-12, "ndot");
        f64_eq_tol!(tle.mean_motion_ddot, 0.0, 1e-12, "nddot");
        f64_eq_tol!(tle.bstar, -1.1606e-5, 1e-12, "bstar");
        f64_eq_tol!(tle.inc_deg, 51.6416, 1e-9, "inclination");
        f64_eq_tol!(tle.raan_deg, 247.4627, 1e-9, "raan");
        f64_eq_tol!(tle.ecc, 0.0006703, 1e-12, "eccentricity");
        f64_eq_tol!(tle.aop_deg, 130.5360, 1e-9, "aop");
        f64_eq_tol!(tle.mean_anomaly_deg, 325.0288, 1e-9, "mean anomaly");
        f64_eq_tol!(tle.mean_motion_rev_day, 15.72125391, 1e-9, "mean motion");

        // 2008-09-20T12:25:40.104192 UTC
        let expected_epoch = Epoch::from_gregorian_utc(2008, 9, 20, 12, 25, 40, 104_192_000);
        assert!((tle.epoch - expected_epoch).abs() < 1.microseconds());
    }

    #[test]
    fn round_trip_is_byte_exact() {
        let tle = Tle::parse(ISS_LINE1, ISS_LINE2).unwrap();
        let (first, second) = tle.to_lines().unwrap();
        assert_eq!(first, ISS_LINE1);
        assert_eq!(second, ISS_LINE2);
    }

    #[test]
    fn checksum_law() {
        assert_eq!(generate_checksum(ISS_LINE1), 7);
        assert_eq!(generate_checksum(ISS_LINE2), 7);

        // The trailing checksum column is excluded from its own digit sum.
        let tle = Tle::parse(ISS_LINE1, ISS_LINE2).unwrap();
        assert_eq!(tle.first_line_checksum().unwrap(), 7);
    }

    #[test]
    fn bad_checksum_rejected() {
        let mut corrupted = ISS_LINE1.to_string();
        corrupted.replace_range(68..69, "3");
        assert!(matches!(
            Tle::parse(&corrupted, ISS_LINE2),
            Err(TleError::ChecksumMismatch { line: 1, .. })
        ));
    }

    #[test]
    fn structural_validation() {
        assert!(matches!(
            Tle::parse("1 25544U", ISS_LINE2),
            Err(TleError::InvalidLineLength { line: 1, .. })
        ));
        assert!(matches!(
            Tle::parse(ISS_LINE2, ISS_LINE1),
            Err(TleError::InvalidLineNumber { line: 1, .. })
        ));

        let mut wrong_satnum = ISS_LINE2.to_string();
        wrong_satnum.replace_range(2..7, "25545");
        // Fix the checksum so the satellite number check is what trips.
        wrong_satnum.truncate(68);
        wrong_satnum.push(char::from(b'0' + generate_checksum(&wrong_satnum)));
        assert!(matches!(
            Tle::parse(ISS_LINE1, &wrong_satnum),
            Err(TleError::SatelliteNumberMismatch { .. })
        ));
    }

    #[test]
    fn with_name() {
        let tle = Tle::parse_with_name(Some("ISS (ZARYA)             "), ISS_LINE1, ISS_LINE2)
            .unwrap();
        assert_eq!(tle.name.as_deref(), Some("ISS (ZARYA)"));
    }

    #[test]
    fn exponent_field_formatting() {
        assert_eq!(format_exponent_assumed(0.0, "t").unwrap(), " 00000-0");
        assert_eq!(format_exponent_assumed(-1.1606e-5, "t").unwrap(), "-11606-4");
        assert_eq!(format_exponent_assumed(0.5, "t").unwrap(), " 50000+0");
    }
}
