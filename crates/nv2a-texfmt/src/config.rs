use thiserror::Error;

/// Texture-coordinate value written for linear (`LU_IMAGE_*`) formats.
///
/// Linear textures are sampled with unnormalized coordinates. The scale has only been checked
/// against 256x256 sources and may need revisiting on hardware.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub enum LinearTexcoordScale {
    /// `width` for U and `height` for V.
    #[default]
    ImageDimensions,
    Fixed(f32),
}

impl LinearTexcoordScale {
    pub fn resolve(self, width: u32, height: u32) -> (f32, f32) {
        match self {
            LinearTexcoordScale::ImageDimensions => (width as f32, height as f32),
            LinearTexcoordScale::Fixed(v) => (v, v),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("display size must be non-zero (got {width}x{height})")]
    DisplaySize { width: u32, height: u32 },

    #[error("field of view must be in (0, 180) degrees (got {0})")]
    FieldOfView(f32),

    #[error("near plane {near} must be positive and closer than far plane {far}")]
    DepthRange { near: f32, far: f32 },

    #[error("linear texcoord scale must be positive (got {0})")]
    TexcoordScale(f32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DemoConfig {
    pub display_width: u32,
    pub display_height: u32,
    pub fov_y_degrees: f32,
    pub z_near: f32,
    pub z_far: f32,
    pub color_clear_value: u32,
    pub zstencil_clear_value: u32,
    pub initial_format: usize,
    pub linear_texcoord_scale: LinearTexcoordScale,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            display_width: 640,
            display_height: 480,
            fov_y_degrees: 60.0,
            z_near: 1.0,
            z_far: 10000.0,
            color_clear_value: 0xFFFF_FFFF,
            zstencil_clear_value: 0xFFFF_FF00,
            initial_format: 0,
            linear_texcoord_scale: LinearTexcoordScale::default(),
        }
    }
}

impl DemoConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.display_width == 0 || self.display_height == 0 {
            return Err(ConfigError::DisplaySize {
                width: self.display_width,
                height: self.display_height,
            });
        }
        if !(self.fov_y_degrees > 0.0 && self.fov_y_degrees < 180.0) {
            return Err(ConfigError::FieldOfView(self.fov_y_degrees));
        }
        if !(self.z_near > 0.0 && self.z_near < self.z_far) {
            return Err(ConfigError::DepthRange {
                near: self.z_near,
                far: self.z_far,
            });
        }
        if let LinearTexcoordScale::Fixed(v) = self.linear_texcoord_scale {
            if !(v > 0.0) {
                return Err(ConfigError::TexcoordScale(v));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = DemoConfig::default();
        assert_eq!(cfg.validate(), Ok(()));
        assert_eq!((cfg.display_width, cfg.display_height), (640, 480));
        assert_eq!(cfg.zstencil_clear_value, 0xFFFF_FF00);
    }

    #[test]
    fn bad_values_are_rejected() {
        let cfg = DemoConfig {
            display_height: 0,
            ..DemoConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::DisplaySize { .. })));

        let cfg = DemoConfig {
            z_near: 10.0,
            z_far: 1.0,
            ..DemoConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::DepthRange { .. })));

        let cfg = DemoConfig {
            linear_texcoord_scale: LinearTexcoordScale::Fixed(0.0),
            ..DemoConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::TexcoordScale(0.0)));
    }

    #[test]
    fn scale_resolves_per_axis() {
        assert_eq!(
            LinearTexcoordScale::ImageDimensions.resolve(256, 128),
            (256.0, 128.0)
        );
        assert_eq!(LinearTexcoordScale::Fixed(2.0).resolve(256, 128), (2.0, 2.0));
    }
}
