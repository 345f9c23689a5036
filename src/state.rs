use serde::{Deserialize, Serialize};

use crate::error::{EditError, Result};

pub const BRIGHTNESS_RANGE: std::ops::RangeInclusive<f32> = -1.0..=1.0;
pub const CONTRAST_RANGE: std::ops::RangeInclusive<f32> = 0.0..=2.0;
pub const SATURATION_RANGE: std::ops::RangeInclusive<f32> = 0.0..=2.0;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// Orthogonal rotation applied after color adjustments.
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn from_degrees(degrees: i32) -> Option<Self> {
        match degrees.rem_euclid(360) {
            0 => Some(Rotation::Deg0),
            90 => Some(Rotation::Deg90),
            180 => Some(Rotation::Deg180),
            270 => Some(Rotation::Deg270),
            _ => None,
        }
    }

    pub fn degrees(self) -> i32 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    /// Next quarter turn clockwise, wrapping 270 back to 0.
    pub fn rotated_cw(self) -> Self {
        match self {
            Rotation::Deg0 => Rotation::Deg90,
            Rotation::Deg90 => Rotation::Deg180,
            Rotation::Deg180 => Rotation::Deg270,
            Rotation::Deg270 => Rotation::Deg0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
/// Slider and rotation values the compositor renders from.
pub struct AdjustmentState {
    pub brightness: f32,
    pub contrast: f32,
    pub saturation: f32,
    pub rotation: Rotation,
}

impl Default for AdjustmentState {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

impl AdjustmentState {
    pub const NEUTRAL: Self = Self {
        brightness: 0.0,
        contrast: 1.0,
        saturation: 1.0,
        rotation: Rotation::Deg0,
    };

    pub fn is_neutral(&self) -> bool {
        *self == Self::NEUTRAL
    }

    /// Rejects out-of-range or non-finite values instead of clamping them.
    pub fn validate(&self) -> Result<()> {
        check("brightness", self.brightness, BRIGHTNESS_RANGE)?;
        check("contrast", self.contrast, CONTRAST_RANGE)?;
        check("saturation", self.saturation, SATURATION_RANGE)?;
        Ok(())
    }
}

fn check(name: &str, value: f32, range: std::ops::RangeInclusive<f32>) -> Result<()> {
    if value.is_finite() && range.contains(&value) {
        Ok(())
    } else {
        Err(EditError::InvalidAdjustment(format!(
            "{} {} outside [{}, {}]",
            name,
            value,
            range.start(),
            range.end()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_cycles_through_quarter_turns() {
        let mut r = Rotation::Deg0;
        let mut seen = Vec::new();
        for _ in 0..4 {
            r = r.rotated_cw();
            seen.push(r.degrees());
        }
        assert_eq!(seen, vec![90, 180, 270, 0]);
    }

    #[test]
    fn rotation_from_degrees_normalizes_and_rejects_odd_angles() {
        assert_eq!(Rotation::from_degrees(-90), Some(Rotation::Deg270));
        assert_eq!(Rotation::from_degrees(450), Some(Rotation::Deg90));
        assert_eq!(Rotation::from_degrees(45), None);
    }

    #[test]
    fn neutral_state_validates() {
        assert!(AdjustmentState::default().is_neutral());
        assert!(AdjustmentState::NEUTRAL.validate().is_ok());
    }

    #[test]
    fn range_edges_are_accepted() {
        let state = AdjustmentState {
            brightness: -1.0,
            contrast: 2.0,
            saturation: 0.0,
            rotation: Rotation::Deg270,
        };
        assert!(state.validate().is_ok());
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let mut state = AdjustmentState::NEUTRAL;
        state.brightness = 1.01;
        assert!(matches!(
            state.validate(),
            Err(EditError::InvalidAdjustment(_))
        ));

        let mut state = AdjustmentState::NEUTRAL;
        state.contrast = -0.1;
        assert!(state.validate().is_err());

        let mut state = AdjustmentState::NEUTRAL;
        state.saturation = f32::NAN;
        assert!(state.validate().is_err());
    }
}
