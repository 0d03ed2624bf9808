//! Named upload-target presets and the target-size selection they drive.

use crate::media::CompressionRequest;

/// Target size used before the user picks anything (fits a 20 MB limit).
pub const DEFAULT_TARGET_SIZE_MB: f64 = 19.5;

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadPreset {
    pub name: &'static str,
    pub hard_limit_mb: f64,
    /// Recommended target, below the hard limit.
    pub safe_value_mb: f64,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresetGroup {
    pub label: &'static str,
    pub items: &'static [UploadPreset],
}

const fn preset(name: &'static str, hard_limit_mb: f64, safe_value_mb: f64) -> UploadPreset {
    UploadPreset {
        name,
        hard_limit_mb,
        safe_value_mb,
    }
}

static PRESET_GROUPS: &[PresetGroup] = &[
    PresetGroup {
        label: "Handmade & Marketplaces",
        items: &[
            preset("Etsy", 20.0, 19.5),
            // BOOTH allows far more; 500 MB keeps local processing and downloads practical.
            preset("BOOTH", 1000.0, 500.0),
        ],
    },
    PresetGroup {
        label: "Social",
        items: &[
            preset("X (Twitter)", 512.0, 500.0),
            // Reels allow 4 GB; capped for local processing.
            preset("Instagram", 4000.0, 1000.0),
            // Android app limit.
            preset("TikTok", 72.0, 70.0),
        ],
    },
    PresetGroup {
        label: "Messaging & Other",
        items: &[
            preset("Discord (Free)", 8.0, 7.8),
            preset("Discord (Nitro)", 50.0, 49.5),
            preset("Gmail", 25.0, 24.5),
        ],
    },
];

/// All preset groups in display order.
pub fn list_groups() -> &'static [PresetGroup] {
    PRESET_GROUPS
}

pub fn find_by_name(name: &str) -> Option<&'static UploadPreset> {
    PRESET_GROUPS
        .iter()
        .flat_map(|group| group.items.iter())
        .find(|preset| preset.name == name)
}

/// Where the current target size came from. A preset selection and a manual value
/// are mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SizeTarget {
    Custom(f64),
    FromPreset(&'static UploadPreset),
}

impl SizeTarget {
    pub fn size_mb(&self) -> f64 {
        match self {
            SizeTarget::Custom(value) => *value,
            SizeTarget::FromPreset(preset) => preset.safe_value_mb,
        }
    }

    pub fn preset(&self) -> Option<&'static UploadPreset> {
        match self {
            SizeTarget::Custom(_) => None,
            SizeTarget::FromPreset(preset) => Some(preset),
        }
    }
}

impl Default for SizeTarget {
    fn default() -> Self {
        SizeTarget::Custom(DEFAULT_TARGET_SIZE_MB)
    }
}

/// User-facing compression settings that produce a [`CompressionRequest`] per job.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressionSettings {
    target: SizeTarget,
    preserve_resolution: bool,
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self {
            target: SizeTarget::default(),
            preserve_resolution: true,
        }
    }
}

impl CompressionSettings {
    /// Select a preset by name. Unknown names leave the settings unchanged and return `None`.
    pub fn select_preset(&mut self, name: &str) -> Option<&'static UploadPreset> {
        let preset = find_by_name(name)?;
        self.target = SizeTarget::FromPreset(preset);
        Some(preset)
    }

    /// Manual edit of the target size; clears any preset selection.
    /// Values that are not finite and positive are ignored.
    pub fn set_target_size_mb(&mut self, size_mb: f64) -> bool {
        if !size_mb.is_finite() || size_mb <= 0.0 {
            return false;
        }
        self.target = SizeTarget::Custom(size_mb);
        true
    }

    pub fn set_preserve_resolution(&mut self, preserve: bool) {
        self.preserve_resolution = preserve;
    }

    pub fn target(&self) -> SizeTarget {
        self.target
    }

    pub fn target_size_mb(&self) -> f64 {
        self.target.size_mb()
    }

    pub fn selected_preset_name(&self) -> Option<&'static str> {
        self.target.preset().map(|p| p.name)
    }

    pub fn preserve_resolution(&self) -> bool {
        self.preserve_resolution
    }

    pub fn to_request(&self) -> CompressionRequest {
        CompressionRequest::new(self.target_size_mb(), self.preserve_resolution)
    }
}
