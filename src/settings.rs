use glam::Vec3;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::renderer::light_manager::LightBudget;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("unknown renderer option '{0}'")]
    UnknownKey(String),
    #[error("invalid value '{value}' for option '{key}': {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: &'static str,
    },
    #[error("failed to read settings: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererSettings {
    pub hdr: bool,
    pub bloom: bool,
    pub hdr_exposure: f32,
    pub bloom_factor: f32,
    pub bloom_threshold: f32,
    pub clear_background: bool,
    pub background_color: [f32; 3],
    /// Only consulted by the combined pipeline; multi-pass always pre-passes.
    pub depth_prepass: bool,
    /// Route refractive meshes into the blended transparent bucket.
    pub merge_transparent_buckets: bool,
    pub shadow_map_size: u32,
    pub bloom_downscale: u32,
    pub luminance_size: u32,
    pub blur_radius: f32,
    pub max_shadow_casters_per_category: usize,
    /// Frames with more lights than this take the multi-pass pipeline.
    pub combined_light_limit: usize,
    pub light_budget: LightBudget,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            hdr: true,
            bloom: true,
            hdr_exposure: 1.0,
            bloom_factor: 0.3,
            bloom_threshold: 1.0,
            clear_background: true,
            background_color: [0.05, 0.05, 0.08],
            depth_prepass: true,
            merge_transparent_buckets: true,
            shadow_map_size: Self::default_shadow_map_size(),
            bloom_downscale: Self::default_bloom_downscale(),
            luminance_size: Self::default_luminance_size(),
            blur_radius: Self::default_blur_radius(),
            max_shadow_casters_per_category: 1,
            combined_light_limit: 4,
            light_budget: LightBudget::default(),
        }
    }
}

/// Keys accepted by [`RendererSettings::set_option`].
pub const OPTION_KEYS: &[&str] = &[
    "hdr",
    "bloom",
    "hdr_exposure",
    "bloom_factor",
    "bloom_threshold",
    "clear_background",
    "background_color",
    "depth_prepass",
    "merge_transparent_buckets",
    "shadow_map_size",
    "bloom_downscale",
    "luminance_size",
    "blur_radius",
    "max_shadow_casters_per_category",
    "combined_light_limit",
];

impl RendererSettings {
    pub fn load() -> Self {
        Self::load_from_path("settings.json")
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Self {
        let path = path.as_ref();
        match Self::try_load_from_path(path) {
            Ok(settings) => {
                info!("Loaded renderer settings from {:?}", path);
                settings
            }
            Err(SettingsError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "Renderer settings file {:?} not found. Using default settings.",
                    path
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    "Failed to load {:?} ({}). Falling back to default renderer settings.",
                    path, err
                );
                Self::default()
            }
        }
    }

    pub fn try_load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self, SettingsError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> Result<Self, SettingsError> {
        let settings: RendererSettings = serde_json::from_str(contents)?;
        Ok(settings.validate())
    }

    pub fn validate(mut self) -> Self {
        if self.shadow_map_size == 0 {
            warn!("Shadow map size must be greater than zero. Using default value.");
            self.shadow_map_size = Self::default_shadow_map_size();
        }

        if self.bloom_downscale == 0 {
            warn!("Bloom downscale must be greater than zero. Using default value.");
            self.bloom_downscale = Self::default_bloom_downscale();
        }

        if self.luminance_size == 0 {
            warn!("Luminance size must be greater than zero. Using default value.");
            self.luminance_size = Self::default_luminance_size();
        } else if !self.luminance_size.is_power_of_two() {
            let rounded = self.luminance_size.next_power_of_two();
            warn!(
                "Luminance size {} is not a power of two. Using {} instead.",
                self.luminance_size, rounded
            );
            self.luminance_size = rounded;
        }

        if !self.hdr_exposure.is_finite() || self.hdr_exposure <= 0.0 {
            warn!("HDR exposure must be positive. Using 1.0 instead.");
            self.hdr_exposure = 1.0;
        }

        if !self.bloom_factor.is_finite() || self.bloom_factor < 0.0 {
            warn!("Bloom factor must not be negative. Disabling the bloom term.");
            self.bloom_factor = 0.0;
        }

        if !self.blur_radius.is_finite() || self.blur_radius < 0.0 {
            warn!("Blur radius must not be negative. Using default value.");
            self.blur_radius = Self::default_blur_radius();
        }

        if self.max_shadow_casters_per_category == 0 {
            warn!("At least one shadow caster per category is required. Using 1 instead.");
            self.max_shadow_casters_per_category = 1;
        }

        self
    }

    pub fn background(&self) -> Vec3 {
        Vec3::from_array(self.background_color)
    }

    /// Applies one string-keyed option. Validation runs afterwards, so an
    /// accepted value may still be clamped.
    pub fn set_option(&mut self, key: &str, value: &str) -> Result<(), SettingsError> {
        let value = value.trim();
        match key {
            "hdr" => self.hdr = parse_bool(key, value)?,
            "bloom" => self.bloom = parse_bool(key, value)?,
            "hdr_exposure" => self.hdr_exposure = parse_number(key, value)?,
            "bloom_factor" => self.bloom_factor = parse_number(key, value)?,
            "bloom_threshold" => self.bloom_threshold = parse_number(key, value)?,
            "clear_background" => self.clear_background = parse_bool(key, value)?,
            "background_color" => self.background_color = parse_color(key, value)?,
            "depth_prepass" => self.depth_prepass = parse_bool(key, value)?,
            "merge_transparent_buckets" => {
                self.merge_transparent_buckets = parse_bool(key, value)?
            }
            "shadow_map_size" => self.shadow_map_size = parse_number(key, value)?,
            "bloom_downscale" => self.bloom_downscale = parse_number(key, value)?,
            "luminance_size" => self.luminance_size = parse_number(key, value)?,
            "blur_radius" => self.blur_radius = parse_number(key, value)?,
            "max_shadow_casters_per_category" => {
                self.max_shadow_casters_per_category = parse_number(key, value)?
            }
            "combined_light_limit" => self.combined_light_limit = parse_number(key, value)?,
            _ => return Err(SettingsError::UnknownKey(key.to_string())),
        }
        *self = self.clone().validate();
        Ok(())
    }

    pub fn option(&self, key: &str) -> Result<String, SettingsError> {
        let value = match key {
            "hdr" => self.hdr.to_string(),
            "bloom" => self.bloom.to_string(),
            "hdr_exposure" => self.hdr_exposure.to_string(),
            "bloom_factor" => self.bloom_factor.to_string(),
            "bloom_threshold" => self.bloom_threshold.to_string(),
            "clear_background" => self.clear_background.to_string(),
            "background_color" => {
                let [r, g, b] = self.background_color;
                format!("{r},{g},{b}")
            }
            "depth_prepass" => self.depth_prepass.to_string(),
            "merge_transparent_buckets" => self.merge_transparent_buckets.to_string(),
            "shadow_map_size" => self.shadow_map_size.to_string(),
            "bloom_downscale" => self.bloom_downscale.to_string(),
            "luminance_size" => self.luminance_size.to_string(),
            "blur_radius" => self.blur_radius.to_string(),
            "max_shadow_casters_per_category" => self.max_shadow_casters_per_category.to_string(),
            "combined_light_limit" => self.combined_light_limit.to_string(),
            _ => return Err(SettingsError::UnknownKey(key.to_string())),
        };
        Ok(value)
    }

    const fn default_shadow_map_size() -> u32 {
        1024
    }

    const fn default_bloom_downscale() -> u32 {
        2
    }

    const fn default_luminance_size() -> u32 {
        64
    }

    const fn default_blur_radius() -> f32 {
        2.0
    }
}

fn invalid(key: &str, value: &str, reason: &'static str) -> SettingsError {
    SettingsError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason,
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, SettingsError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        _ => Err(invalid(key, value, "expected a boolean")),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, SettingsError> {
    value
        .parse()
        .map_err(|_| invalid(key, value, "expected a number"))
}

/// Accepts `r,g,b` or `r g b`.
fn parse_color(key: &str, value: &str) -> Result<[f32; 3], SettingsError> {
    let components = value
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .map(|part| part.parse::<f32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| invalid(key, value, "expected three numbers"))?;
    match components.as_slice() {
        [r, g, b] => Ok([*r, *g, *b]),
        _ => Err(invalid(key, value, "expected three numbers")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invalid_settings() -> RendererSettings {
        RendererSettings {
            shadow_map_size: 0,
            bloom_downscale: 0,
            luminance_size: 48,
            hdr_exposure: -1.0,
            bloom_factor: f32::NAN,
            max_shadow_casters_per_category: 0,
            ..RendererSettings::default()
        }
    }

    #[test]
    fn validate_replaces_invalid_values_with_defaults() {
        let validated = invalid_settings().validate();
        let defaults = RendererSettings::default();

        assert_eq!(validated.shadow_map_size, defaults.shadow_map_size);
        assert_eq!(validated.bloom_downscale, defaults.bloom_downscale);
        assert_eq!(validated.luminance_size, 64);
        assert_eq!(validated.hdr_exposure, 1.0);
        assert_eq!(validated.bloom_factor, 0.0);
        assert_eq!(validated.max_shadow_casters_per_category, 1);
    }

    #[test]
    fn validate_preserves_valid_values() {
        let valid = RendererSettings {
            shadow_map_size: 2048,
            luminance_size: 128,
            hdr_exposure: 0.5,
            max_shadow_casters_per_category: 2,
            ..RendererSettings::default()
        };
        assert_eq!(valid.clone().validate(), valid);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let json = r#"{ "hdr": false, "light_budget": { "point": 8 } }"#;
        let settings = RendererSettings::from_json(json).unwrap();
        assert!(!settings.hdr);
        assert_eq!(settings.light_budget.point, 8);
        assert_eq!(settings.light_budget.spot, LightBudget::default().spot);
        assert_eq!(settings.shadow_map_size, RendererSettings::default().shadow_map_size);
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(
            RendererSettings::from_json("{ hdr: "),
            Err(SettingsError::Parse(_))
        ));
    }

    #[test]
    fn missing_file_uses_defaults() {
        let settings = RendererSettings::load_from_path("does/not/exist/settings.json");
        assert_eq!(settings, RendererSettings::default());
    }

    #[test]
    fn string_options_round_trip() {
        let mut settings = RendererSettings::default();
        settings.set_option("hdr", "off").unwrap();
        settings.set_option("hdr_exposure", "2.5").unwrap();
        settings.set_option("background_color", "0.1, 0.2 0.3").unwrap();

        assert!(!settings.hdr);
        assert_eq!(settings.option("hdr_exposure").unwrap(), "2.5");
        assert_eq!(settings.background(), Vec3::new(0.1, 0.2, 0.3));
        assert_eq!(settings.option("background_color").unwrap(), "0.1,0.2,0.3");
    }

    #[test]
    fn bad_options_are_rejected() {
        let mut settings = RendererSettings::default();
        assert!(matches!(
            settings.set_option("gamma", "2.2"),
            Err(SettingsError::UnknownKey(_))
        ));
        assert!(matches!(
            settings.set_option("bloom", "maybe"),
            Err(SettingsError::InvalidValue { .. })
        ));
        assert!(settings.set_option("background_color", "1,2").is_err());
        assert_eq!(settings, RendererSettings::default());
    }

    #[test]
    fn every_listed_key_is_readable() {
        let settings = RendererSettings::default();
        for key in OPTION_KEYS {
            assert!(settings.option(key).is_ok(), "{key}");
        }
    }
}
