//! Distance attenuation and Doppler shift.

use crate::math::Vec3;

/// Range the Doppler pitch factor is held to.
pub const MIN_DOPPLER_PITCH: f32 = 0.1;
pub const MAX_DOPPLER_PITCH: f32 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttenuationModel {
    #[default]
    Inverse,
    Linear,
    Exponent,
}

/// Maps listener-relative geometry to a gain and a Doppler pitch factor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceModel {
    pub model: AttenuationModel,
    /// Clip distances into `[reference_distance, max_distance]` first.
    pub clamped: bool,
    pub reference_distance: f32,
    pub max_distance: f32,
    pub rolloff_factor: f32,
    /// 0 disables Doppler.
    pub doppler_factor: f32,
    pub speed_of_sound: f32,
    /// World units per distance unit.
    pub distance_divisor: f32,
    /// How many sources sharing one name may be rendered at once.
    pub same_sounds_limit: usize,
}

impl Default for DistanceModel {
    fn default() -> Self {
        Self::new(AttenuationModel::Inverse, true, 128.0)
    }
}

impl DistanceModel {
    pub fn new(model: AttenuationModel, clamped: bool, max_distance: f32) -> Self {
        Self {
            model,
            clamped,
            reference_distance: 1.0,
            max_distance,
            rolloff_factor: 1.0,
            doppler_factor: 0.0,
            speed_of_sound: 343.3,
            distance_divisor: 1.0,
            same_sounds_limit: 4,
        }
    }

    pub fn gain(&self, distance: f32) -> f32 {
        let mut distance = distance / self.distance_divisor;
        if self.clamped {
            distance = distance.clamp(self.reference_distance, self.max_distance);
        }
        let gain = match self.model {
            AttenuationModel::Inverse => {
                self.reference_distance
                    / (self.reference_distance
                        + self.rolloff_factor * (distance - self.reference_distance))
            }
            AttenuationModel::Linear => {
                1.0 - self.rolloff_factor * (distance - self.reference_distance)
                    / (self.max_distance - self.reference_distance)
            }
            AttenuationModel::Exponent => {
                (distance / self.reference_distance).powf(-self.rolloff_factor)
            }
        };
        if gain.is_nan() {
            return 0.0;
        }
        gain.clamp(0.0, 1.0)
    }

    /// Pitch factor for a source seen along `source_to_listener`, within
    /// `MIN_DOPPLER_PITCH..=MAX_DOPPLER_PITCH`.
    pub fn doppler_pitch(
        &self,
        source_to_listener: Vec3,
        source_velocity: Vec3,
        listener_velocity: Vec3,
    ) -> f32 {
        if self.doppler_factor <= 0.0 {
            return 1.0;
        }
        let len = source_to_listener.length();
        if !(len > 0.0) || !len.is_finite() {
            return 1.0;
        }

        let max_speed = self.speed_of_sound / self.doppler_factor;
        let vls = (source_to_listener.dot(listener_velocity) / len).min(max_speed);
        let vss = (source_to_listener.dot(source_velocity) / len).min(max_speed);

        let pitch = (self.speed_of_sound - self.doppler_factor * vls)
            / (self.speed_of_sound - self.doppler_factor * vss);
        if pitch.is_nan() {
            return 1.0;
        }
        // a source at the speed of sound divides by zero
        pitch.clamp(MIN_DOPPLER_PITCH, MAX_DOPPLER_PITCH)
    }
}
