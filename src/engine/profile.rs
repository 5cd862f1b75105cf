// src/engine/profile.rs
use serde::{Deserialize, Serialize};

/// One stage of a run: hold `target_temperature` for `dwell_seconds` of
/// in-tolerance time while driving the light at `light_intensity_percent`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub target_temperature: f64,
    #[serde(default)]
    pub dwell_seconds: u64,
    #[serde(default)]
    pub light_intensity_percent: f64,
}

impl Profile {
    pub fn new(target_temperature: f64, dwell_seconds: u64, light_intensity_percent: f64) -> Self {
        Self {
            target_temperature,
            dwell_seconds,
            light_intensity_percent,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.target_temperature.is_finite() {
            return Err(format!("target temperature {} is not a finite number", self.target_temperature));
        }
        if !(self.light_intensity_percent.is_finite() && (0.0..=100.0).contains(&self.light_intensity_percent)) {
            return Err(format!(
                "light intensity {} is outside 0-100%",
                self.light_intensity_percent
            ));
        }
        Ok(())
    }
}

/// Checks every profile, naming the first offending index.
pub fn validate_profiles(profiles: &[Profile]) -> Result<(), String> {
    for (index, profile) in profiles.iter().enumerate() {
        profile.validate().map_err(|reason| format!("profile {}: {}", index, reason))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_profile() {
        assert!(Profile::new(37.0, 300, 50.0).validate().is_ok());
        assert!(Profile::new(-5.0, 0, 0.0).validate().is_ok());
        assert!(Profile::new(80.0, 10, 100.0).validate().is_ok());
    }

    #[test]
    fn test_light_out_of_range() {
        assert!(Profile::new(37.0, 10, 100.5).validate().is_err());
        assert!(Profile::new(37.0, 10, -1.0).validate().is_err());
        assert!(Profile::new(37.0, 10, f64::NAN).validate().is_err());
    }

    #[test]
    fn test_non_finite_target() {
        assert!(Profile::new(f64::INFINITY, 10, 10.0).validate().is_err());
        assert!(Profile::new(f64::NAN, 10, 10.0).validate().is_err());
    }

    #[test]
    fn test_validate_profiles_names_index() {
        let profiles = vec![Profile::new(37.0, 5, 50.0), Profile::new(40.0, 5, 120.0)];
        let err = validate_profiles(&profiles).unwrap_err();
        assert!(err.starts_with("profile 1:"), "{}", err);
    }

    #[test]
    fn test_deserialize_defaults() {
        let profile: Profile = serde_json::from_str(r#"{"target_temperature": 42.5}"#).unwrap();
        assert_eq!(profile, Profile::new(42.5, 0, 0.0));
    }

    #[test]
    fn test_negative_dwell_rejected_by_serde() {
        let result: Result<Profile, _> =
            serde_json::from_str(r#"{"target_temperature": 42.5, "dwell_seconds": -3}"#);
        assert!(result.is_err());
    }
}
