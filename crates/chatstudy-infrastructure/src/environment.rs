//! Host environment probe.
//!
//! Native counterpart of the browser characteristics a fingerprint is
//! built from. Display geometry and a graphics signature are not
//! discoverable from a headless process, so embedders that have them pass
//! them in.

use chatstudy_core::identity::{DeviceCharacteristics, EnvironmentProbe};
use std::env;

#[derive(Debug, Clone, Default)]
pub struct HostEnvironment {
    display: Option<(u32, u32)>,
    color_depth: Option<u32>,
    graphics_signature: Option<String>,
}

impl HostEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_display(mut self, width: u32, height: u32) -> Self {
        self.display = Some((width, height));
        self
    }

    pub fn with_color_depth(mut self, depth: u32) -> Self {
        self.color_depth = Some(depth);
        self
    }

    pub fn with_graphics_signature(mut self, signature: impl Into<String>) -> Self {
        self.graphics_signature = Some(signature.into());
        self
    }
}

impl EnvironmentProbe for HostEnvironment {
    fn characteristics(&self) -> DeviceCharacteristics {
        DeviceCharacteristics {
            screen_width: self.display.map(|(w, _)| w),
            screen_height: self.display.map(|(_, h)| h),
            color_depth: self.color_depth,
            timezone: read_timezone(),
            languages: read_languages(),
            platform: Some(format!("{}-{}", env::consts::OS, env::consts::ARCH)),
            cpu_cores: std::thread::available_parallelism()
                .ok()
                .and_then(|n| u32::try_from(n.get()).ok()),
            graphics_signature: self.graphics_signature.clone(),
        }
    }
}

fn read_timezone() -> Option<String> {
    if let Some(tz) = env::var("TZ").ok().filter(|s| !s.trim().is_empty()) {
        return Some(tz.trim().trim_start_matches(':').to_string());
    }
    std::fs::read_to_string("/etc/timezone")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn read_languages() -> Option<Vec<String>> {
    let raw = env::var("LANGUAGE")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .or_else(|| env::var("LC_ALL").ok().filter(|s| !s.trim().is_empty()))
        .or_else(|| env::var("LANG").ok().filter(|s| !s.trim().is_empty()))?;
    parse_languages(&raw)
}

/// Turns `en_US.UTF-8:fr_FR` into `["en-US", "fr-FR"]`.
fn parse_languages(raw: &str) -> Option<Vec<String>> {
    let langs: Vec<String> = raw
        .split(':')
        .map(|part| part.split(['.', '@']).next().unwrap_or("").trim())
        .filter(|part| !part.is_empty() && *part != "C" && *part != "POSIX")
        .map(|part| part.replace('_', "-"))
        .collect();
    (!langs.is_empty()).then_some(langs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_languages() {
        assert_eq!(
            parse_languages("en_US.UTF-8:fr_FR"),
            Some(vec!["en-US".to_string(), "fr-FR".to_string()])
        );
        assert_eq!(parse_languages("C.UTF-8"), None);
        assert_eq!(parse_languages("de_DE@euro"), Some(vec!["de-DE".to_string()]));
    }

    #[test]
    fn test_host_probe_reads_platform_and_embedder_values() {
        let probe = HostEnvironment::new()
            .with_display(1920, 1080)
            .with_graphics_signature("gfx-1");
        let characteristics = probe.characteristics();

        assert_eq!(characteristics.screen_width, Some(1920));
        assert_eq!(characteristics.screen_height, Some(1080));
        assert!(characteristics.platform.is_some());
        assert!(characteristics.cpu_cores.unwrap_or(1) >= 1);
        assert_eq!(characteristics.graphics_signature.as_deref(), Some("gfx-1"));
    }
}
