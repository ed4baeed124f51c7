// SPDX-License-Identifier: CEPL-1.0
use quad_render::{RenderOptions, RenderSize};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct WindowCfg {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_side")]
    pub width: u32,
    #[serde(default = "default_side")]
    pub height: u32,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct RenderCfg {
    #[serde(default = "default_frame_interval")]
    pub frame_interval_ms: u64,
    #[serde(default = "default_validation")]
    pub validation: bool,
    #[serde(default)]
    pub shader_dir: Option<PathBuf>,
    #[serde(default)]
    pub texture: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct AppCfg {
    #[serde(default)]
    pub window: WindowCfg,
    #[serde(default)]
    pub render: RenderCfg,
}

impl Default for WindowCfg {
    fn default() -> Self {
        WindowCfg {
            title: default_title(),
            width: default_side(),
            height: default_side(),
        }
    }
}

impl Default for RenderCfg {
    fn default() -> Self {
        RenderCfg {
            frame_interval_ms: default_frame_interval(),
            validation: default_validation(),
            shader_dir: None,
            texture: None,
        }
    }
}

fn default_title() -> String {
    "quad".to_owned()
}
fn default_side() -> u32 {
    500
}
fn default_frame_interval() -> u64 {
    10
}
fn default_validation() -> bool {
    cfg!(debug_assertions)
}

impl AppCfg {
    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Command-line values win over the file.
    pub fn apply_overrides(
        &mut self,
        width: Option<u32>,
        height: Option<u32>,
        no_validation: bool,
    ) {
        if let Some(w) = width {
            self.window.width = w;
        }
        if let Some(h) = height {
            self.window.height = h;
        }
        if no_validation {
            self.render.validation = false;
        }
    }

    pub fn window_size(&self) -> RenderSize {
        RenderSize::new(self.window.width, self.window.height)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.render.frame_interval_ms)
    }

    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            validation: self.render.validation,
            shader_dir: self.render.shader_dir.clone(),
            texture: self.render.texture.clone(),
        }
    }
}

/// Missing file → defaults; unreadable TOML → defaults plus a warning.
pub fn load_cfg(path: &Path) -> AppCfg {
    match fs::read_to_string(path) {
        Ok(s) => AppCfg::parse(&s).unwrap_or_else(|e| {
            warn!("{}: {e}; using defaults", path.display());
            AppCfg::default()
        }),
        Err(_) => {
            debug!("{} not found; using defaults", path.display());
            AppCfg::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let cfg = AppCfg::parse("").unwrap();
        assert_eq!(cfg, AppCfg::default());
        assert_eq!(cfg.window.title, "quad");
        assert_eq!(cfg.window_size(), RenderSize::new(500, 500));
        assert_eq!(cfg.frame_interval(), Duration::from_millis(10));
        assert_eq!(cfg.render.validation, cfg!(debug_assertions));
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = AppCfg::parse(
            r#"
            [window]
            width = 1280

            [render]
            texture = "textures/chibi.png"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.window.width, 1280);
        assert_eq!(cfg.window.height, 500);
        assert_eq!(cfg.window.title, "quad");
        assert_eq!(cfg.render.frame_interval_ms, 10);
        assert_eq!(
            cfg.render_options().texture,
            Some(PathBuf::from("textures/chibi.png"))
        );
        assert_eq!(cfg.render_options().shader_dir, None);
    }

    #[test]
    fn malformed_toml_is_an_error() {
        assert!(AppCfg::parse("[window]\nwidth = \"wide\"").is_err());
    }

    #[test]
    fn cli_overrides_file() {
        let text = "[window]\nwidth = 800\nheight = 600\n[render]\nvalidation = true";
        let mut cfg = AppCfg::parse(text).unwrap();
        cfg.apply_overrides(Some(1024), None, true);
        assert_eq!(cfg.window_size(), RenderSize::new(1024, 600));
        assert!(!cfg.render_options().validation);
    }

    #[test]
    fn missing_file_falls_back() {
        assert_eq!(load_cfg(Path::new("no/such/quad.toml")), AppCfg::default());
    }
}
