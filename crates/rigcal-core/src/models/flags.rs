//! Structured calibration flags.
//!
//! Each [`CalibFlag`] frees or fixes one group of camera parameters, mirroring
//! the flag vocabulary of common calibration toolkits. A [`CalibFlags`] set
//! serializes as a list of flag names:
//!
//! ```json
//! ["USE_INTRINSIC_GUESS", "RATIONAL_MODEL", "FIX_K3"]
//! ```

use serde::{Deserialize, Serialize};

/// Number of coefficients in the full perspective distortion vector
/// `k1 k2 p1 p2 k3 k4 k5 k6 s1 s2 s3 s4 tau_x tau_y`.
pub const PERSPECTIVE_COEFFS: usize = 14;
/// Number of coefficients in the equidistant fisheye vector `k1 k2 k3 k4`.
pub const FISHEYE_COEFFS: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CalibFlag {
    /// Start from the supplied intrinsics instead of a closed-form estimate.
    UseIntrinsicGuess,
    /// Keep `fx / fy` at the ratio of the initial guess.
    FixAspectRatio,
    /// Hold `cx, cy` at their initial values.
    FixPrincipalPoint,
    /// Hold `fx, fy` at their initial values.
    FixFocalLength,
    /// Tangential coefficients are zeroed and held.
    ZeroTangentDist,
    FixK1,
    FixK2,
    FixK3,
    FixK4,
    FixK5,
    FixK6,
    /// Enable the rational radial denominator `k4 k5 k6`.
    RationalModel,
    /// Enable thin-prism coefficients `s1..s4`.
    ThinPrismModel,
    FixS1S2S3S4,
    /// Enable the tilted-sensor coefficients `tau_x tau_y`.
    TiltedModel,
    FixTauxTauy,
}

impl CalibFlag {
    const ALL: [CalibFlag; 16] = [
        CalibFlag::UseIntrinsicGuess,
        CalibFlag::FixAspectRatio,
        CalibFlag::FixPrincipalPoint,
        CalibFlag::FixFocalLength,
        CalibFlag::ZeroTangentDist,
        CalibFlag::FixK1,
        CalibFlag::FixK2,
        CalibFlag::FixK3,
        CalibFlag::FixK4,
        CalibFlag::FixK5,
        CalibFlag::FixK6,
        CalibFlag::RationalModel,
        CalibFlag::ThinPrismModel,
        CalibFlag::FixS1S2S3S4,
        CalibFlag::TiltedModel,
        CalibFlag::FixTauxTauy,
    ];

    fn bit(self) -> u32 {
        1 << (self as u32)
    }
}

/// A set of [`CalibFlag`]s.
///
/// The default set is `{USE_INTRINSIC_GUESS, RATIONAL_MODEL}`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<CalibFlag>", into = "Vec<CalibFlag>")]
pub struct CalibFlags {
    bits: u32,
}

impl CalibFlags {
    pub const fn empty() -> Self {
        Self { bits: 0 }
    }

    pub fn contains(&self, flag: CalibFlag) -> bool {
        self.bits & flag.bit() != 0
    }

    #[must_use]
    pub fn with(mut self, flag: CalibFlag) -> Self {
        self.bits |= flag.bit();
        self
    }

    #[must_use]
    pub fn without(mut self, flag: CalibFlag) -> Self {
        self.bits &= !flag.bit();
        self
    }

    /// Flags in declaration order, without duplicates.
    pub fn iter(&self) -> impl Iterator<Item = CalibFlag> + '_ {
        CalibFlag::ALL
            .iter()
            .copied()
            .filter(move |f| self.contains(*f))
    }

    /// Length of the distortion vector reported for a perspective camera.
    pub fn perspective_coefficient_count(&self) -> usize {
        if self.contains(CalibFlag::TiltedModel) {
            14
        } else if self.contains(CalibFlag::ThinPrismModel) {
            12
        } else if self.contains(CalibFlag::RationalModel) {
            8
        } else {
            5
        }
    }

    /// Which perspective coefficients the solver may move, in
    /// `k1 k2 p1 p2 k3 k4 k5 k6 s1 s2 s3 s4 tau_x tau_y` order.
    pub fn free_perspective_coefficients(&self) -> [bool; PERSPECTIVE_COEFFS] {
        let tangential = !self.contains(CalibFlag::ZeroTangentDist);
        let rational = self.contains(CalibFlag::RationalModel);
        let prism =
            self.contains(CalibFlag::ThinPrismModel) && !self.contains(CalibFlag::FixS1S2S3S4);
        let tilt =
            self.contains(CalibFlag::TiltedModel) && !self.contains(CalibFlag::FixTauxTauy);
        [
            !self.contains(CalibFlag::FixK1),
            !self.contains(CalibFlag::FixK2),
            tangential,
            tangential,
            !self.contains(CalibFlag::FixK3),
            rational && !self.contains(CalibFlag::FixK4),
            rational && !self.contains(CalibFlag::FixK5),
            rational && !self.contains(CalibFlag::FixK6),
            prism,
            prism,
            prism,
            prism,
            tilt,
            tilt,
        ]
    }

    /// Which equidistant fisheye coefficients `k1..k4` the solver may move.
    pub fn free_fisheye_coefficients(&self) -> [bool; FISHEYE_COEFFS] {
        [
            !self.contains(CalibFlag::FixK1),
            !self.contains(CalibFlag::FixK2),
            !self.contains(CalibFlag::FixK3),
            !self.contains(CalibFlag::FixK4),
        ]
    }
}

impl Default for CalibFlags {
    fn default() -> Self {
        CalibFlags::empty()
            .with(CalibFlag::UseIntrinsicGuess)
            .with(CalibFlag::RationalModel)
    }
}

impl std::fmt::Debug for CalibFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl FromIterator<CalibFlag> for CalibFlags {
    fn from_iter<I: IntoIterator<Item = CalibFlag>>(iter: I) -> Self {
        iter.into_iter().fold(CalibFlags::empty(), CalibFlags::with)
    }
}

impl From<Vec<CalibFlag>> for CalibFlags {
    fn from(flags: Vec<CalibFlag>) -> Self {
        flags.into_iter().collect()
    }
}

impl From<CalibFlags> for Vec<CalibFlag> {
    fn from(flags: CalibFlags) -> Self {
        flags.iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_rational_with_guess() {
        let flags = CalibFlags::default();
        assert!(flags.contains(CalibFlag::UseIntrinsicGuess));
        assert!(flags.contains(CalibFlag::RationalModel));
        assert_eq!(flags.perspective_coefficient_count(), 8);

        let free = flags.free_perspective_coefficients();
        assert_eq!(free.iter().filter(|f| **f).count(), 8);
        assert!(!free[8] && !free[12]);
    }

    #[test]
    fn zero_tangent_fixes_p1_p2() {
        let flags = CalibFlags::empty().with(CalibFlag::ZeroTangentDist);
        let free = flags.free_perspective_coefficients();
        assert!(!free[2] && !free[3]);
        assert!(free[0] && free[1] && free[4]);
        assert_eq!(flags.perspective_coefficient_count(), 5);
    }

    #[test]
    fn tilted_model_reports_full_vector() {
        let flags = CalibFlags::default()
            .with(CalibFlag::ThinPrismModel)
            .with(CalibFlag::TiltedModel)
            .with(CalibFlag::FixTauxTauy);
        assert_eq!(flags.perspective_coefficient_count(), 14);
        let free = flags.free_perspective_coefficients();
        assert!(free[8] && free[11]);
        assert!(!free[12] && !free[13]);
    }

    #[test]
    fn serde_as_flag_list() {
        let flags = CalibFlags::default().with(CalibFlag::FixK3);
        let json = serde_json::to_string(&flags).unwrap();
        assert_eq!(json, r#"["USE_INTRINSIC_GUESS","FIX_K3","RATIONAL_MODEL"]"#);

        let back: CalibFlags = serde_json::from_str(&json).unwrap();
        assert_eq!(back, flags);
    }
}
