//! Unit conversion for distance, angle and time attributes
//!
//! Hosts store values in native units: centimeters, radians and seconds.
//! A [`Unit`] converts between a caller unit and the native one.

use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};

/// Physical dimension carried by a unit-typed attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    Distance,
    Angle,
    Time,
}

impl UnitKind {
    /// The unit values of this kind are stored in
    pub fn native(&self) -> Unit {
        match self {
            Self::Distance => Unit::Centimeters,
            Self::Angle => Unit::Radians,
            Self::Time => Unit::Seconds,
        }
    }
}

/// A concrete unit a caller may read or write in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    Millimeters,
    Centimeters,
    Meters,
    Kilometers,
    Inches,
    Feet,
    Yards,
    Radians,
    Degrees,
    AngularMinutes,
    AngularSeconds,
    Seconds,
    Milliseconds,
    Minutes,
    Hours,
    /// 24 fps
    Film,
    /// 25 fps
    Pal,
    /// 30 fps
    Ntsc,
    /// 15 fps
    Game,
}

impl Unit {
    pub fn kind(&self) -> UnitKind {
        match self {
            Self::Millimeters
            | Self::Centimeters
            | Self::Meters
            | Self::Kilometers
            | Self::Inches
            | Self::Feet
            | Self::Yards => UnitKind::Distance,
            Self::Radians | Self::Degrees | Self::AngularMinutes | Self::AngularSeconds => {
                UnitKind::Angle
            }
            Self::Seconds
            | Self::Milliseconds
            | Self::Minutes
            | Self::Hours
            | Self::Film
            | Self::Pal
            | Self::Ntsc
            | Self::Game => UnitKind::Time,
        }
    }

    /// How many of this unit make up one native unit
    pub fn per_native(&self) -> f64 {
        use std::f64::consts::PI;
        match self {
            Self::Millimeters => 10.0,
            Self::Centimeters => 1.0,
            Self::Meters => 0.01,
            Self::Kilometers => 0.00001,
            Self::Inches => 1.0 / 2.54,
            Self::Feet => 1.0 / 30.48,
            Self::Yards => 1.0 / 91.44,
            Self::Radians => 1.0,
            Self::Degrees => 180.0 / PI,
            Self::AngularMinutes => 180.0 * 60.0 / PI,
            Self::AngularSeconds => 180.0 * 3600.0 / PI,
            Self::Seconds => 1.0,
            Self::Milliseconds => 1000.0,
            Self::Minutes => 1.0 / 60.0,
            Self::Hours => 1.0 / 3600.0,
            Self::Film => 24.0,
            Self::Pal => 25.0,
            Self::Ntsc => 30.0,
            Self::Game => 15.0,
        }
    }

    /// Convert a native value into this unit
    #[inline]
    pub fn from_native(&self, value: f64) -> f64 {
        value * self.per_native()
    }

    /// Convert a value in this unit into the native unit
    #[inline]
    pub fn to_native(&self, value: f64) -> f64 {
        value / self.per_native()
    }

    /// Convert between two units of the same kind
    pub fn convert(value: f64, from: Unit, to: Unit) -> Option<f64> {
        if from.kind() != to.kind() {
            return None;
        }
        Some(to.from_native(from.to_native(value)))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Millimeters => "mm",
            Self::Centimeters => "cm",
            Self::Meters => "m",
            Self::Kilometers => "km",
            Self::Inches => "in",
            Self::Feet => "ft",
            Self::Yards => "yd",
            Self::Radians => "rad",
            Self::Degrees => "deg",
            Self::AngularMinutes => "arcmin",
            Self::AngularSeconds => "arcsec",
            Self::Seconds => "s",
            Self::Milliseconds => "ms",
            Self::Minutes => "min",
            Self::Hours => "h",
            Self::Film => "film",
            Self::Pal => "pal",
            Self::Ntsc => "ntsc",
            Self::Game => "game",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Unit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mm" | "millimeters" => Ok(Self::Millimeters),
            "cm" | "centimeters" => Ok(Self::Centimeters),
            "m" | "meters" => Ok(Self::Meters),
            "km" | "kilometers" => Ok(Self::Kilometers),
            "in" | "inches" => Ok(Self::Inches),
            "ft" | "feet" => Ok(Self::Feet),
            "yd" | "yards" => Ok(Self::Yards),
            "rad" | "radians" => Ok(Self::Radians),
            "deg" | "degrees" => Ok(Self::Degrees),
            "arcmin" => Ok(Self::AngularMinutes),
            "arcsec" => Ok(Self::AngularSeconds),
            "s" | "sec" | "seconds" => Ok(Self::Seconds),
            "ms" | "milliseconds" => Ok(Self::Milliseconds),
            "min" | "minutes" => Ok(Self::Minutes),
            "h" | "hours" => Ok(Self::Hours),
            "film" | "24fps" => Ok(Self::Film),
            "pal" | "25fps" => Ok(Self::Pal),
            "ntsc" | "30fps" => Ok(Self::Ntsc),
            "game" | "15fps" => Ok(Self::Game),
            _ => Err(format!("Unknown unit: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_distance_factors() {
        assert!(close(Unit::Meters.from_native(100.0), 1.0));
        assert!(close(Unit::Meters.to_native(1.0), 100.0));
        assert!(close(Unit::Millimeters.from_native(1.0), 10.0));
        assert!(close(Unit::Inches.to_native(1.0), 2.54));
    }

    #[test]
    fn test_angle_and_time() {
        assert!(close(Unit::Degrees.from_native(std::f64::consts::PI), 180.0));
        assert!(close(Unit::Film.from_native(1.0), 24.0));
        assert!(close(Unit::Pal.to_native(50.0), 2.0));
    }

    #[test]
    fn test_convert_rejects_mixed_kinds() {
        assert_eq!(Unit::convert(1.0, Unit::Meters, Unit::Degrees), None);
        let feet = Unit::convert(1.0, Unit::Yards, Unit::Feet).unwrap();
        assert!(close(feet, 3.0));
    }

    #[test]
    fn test_parse_display() {
        for unit in [Unit::Meters, Unit::Degrees, Unit::Ntsc, Unit::AngularSeconds] {
            assert_eq!(unit.to_string().parse::<Unit>(), Ok(unit));
        }
        assert!("furlong".parse::<Unit>().is_err());
    }
}
