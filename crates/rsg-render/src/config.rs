//! Renderer configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::property::{COLLISION_MODEL_VISIBILITY, PropertyKey};
use crate::renderer::SceneRenderer;

/// Configuration error types.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("serialization error: {0}")]
    Serialize(String),
}

/// Display configuration for a renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Whether visual shapes are drawn.
    pub show_visual_shapes: bool,
    /// Whether collision shapes are drawn.
    pub show_collision_shapes: bool,
    /// Fallback color for shapes without material information.
    pub default_color: [f32; 4],
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            show_visual_shapes: true,
            show_collision_shapes: false,
            default_color: [0.7, 0.7, 0.7, 1.0],
        }
    }
}

impl RenderConfig {
    /// The visibility bitmask consulted by link shape groups: bit 0 for
    /// visual shapes, bit 1 for collision shapes.
    pub fn visibility_mask(&self) -> i32 {
        (self.show_visual_shapes as i32) | ((self.show_collision_shapes as i32) << 1)
    }

    /// Pushes the visibility mask into the renderer's property scope.
    pub fn apply_to<R: SceneRenderer>(&self, renderer: &mut R) {
        renderer.set_property(
            PropertyKey::new(COLLISION_MODEL_VISIBILITY),
            self.visibility_mask(),
        );
    }

    /// Load configuration from a file path, falling back to `None` when the
    /// file is missing or malformed.
    pub fn load(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        match ron::from_str(&content) {
            Ok(config) => {
                tracing::info!("Loaded render config from {:?}", path);
                Some(config)
            }
            Err(e) => {
                tracing::warn!("Failed to parse render config: {}", e);
                None
            }
        }
    }

    /// Save the configuration to disk.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io(e.to_string()))?;
        }
        let content = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;
        std::fs::write(path, &content).map_err(|e| ConfigError::Io(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visibility_mask_bits() {
        let mut config = RenderConfig::default();
        assert_eq!(config.visibility_mask(), 1);

        config.show_collision_shapes = true;
        assert_eq!(config.visibility_mask(), 3);

        config.show_visual_shapes = false;
        assert_eq!(config.visibility_mask(), 2);
    }

    #[test]
    fn test_config_round_trip() {
        let mut config = RenderConfig::default();
        config.show_collision_shapes = true;

        let text = ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::default()).unwrap();
        let parsed: RenderConfig = ron::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
