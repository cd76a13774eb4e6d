use crate::error::{EdifyError, Result};
use crate::fstab::{Fstab, FstabEntry};
use crate::generator::{EdifyGenerator, LegacyMount};
use crate::setup::SetupStep;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const PRESET_NAMES: &[&str] = &["generic", "samsung-bml"];

/// Per-device generator configuration, usually read from a TOML file.
///
/// ```toml
/// name = "captivatemtd"
/// recovery_fstab = "recovery.fstab"
///
/// [[setup]]
/// kind = "tool"
/// name = "busybox"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceProfile {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub setup: Vec<SetupStep>,
    #[serde(default)]
    pub fstab: Vec<FstabEntry>,
    #[serde(default)]
    pub recovery_fstab: Option<PathBuf>,
    #[serde(default)]
    pub legacy_mount: Option<LegacyMount>,
}

impl DeviceProfile {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Reads a profile; a relative `recovery_fstab` is taken relative to
    /// the profile's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let mut profile = Self::from_toml_str(&text)?;
        if let Some(fstab) = profile.recovery_fstab.take() {
            let resolved = match path.parent() {
                Some(dir) if fstab.is_relative() => dir.join(fstab),
                _ => fstab,
            };
            profile.recovery_fstab = Some(resolved);
        }
        tracing::debug!(profile = %profile.name, path = %path.display(), "loaded device profile");
        Ok(profile)
    }

    pub fn preset(name: &str) -> Result<Self> {
        match name {
            "generic" => Ok(Self {
                name: "generic".to_string(),
                description: Some("Base generator without device setup steps".to_string()),
                ..Self::default()
            }),
            "samsung-bml" => Ok(Self {
                name: "samsung-bml".to_string(),
                description: Some(
                    "Samsung BML devices: stage mke2fs, busybox, bmlunlock and boot.img in /tmp".to_string(),
                ),
                setup: SetupStep::samsung_bml(),
                ..Self::default()
            }),
            other => Err(EdifyError::UnknownPreset(other.to_string())),
        }
    }

    /// Recovery fstab entries first, inline entries override them.
    pub fn load_fstab(&self) -> Result<Fstab> {
        let mut fstab = match &self.recovery_fstab {
            Some(path) => Fstab::parse(&fs::read_to_string(path)?)?,
            None => Fstab::new(),
        };
        for entry in &self.fstab {
            fstab.insert(entry.clone());
        }
        Ok(fstab)
    }

    pub fn generator(&self) -> Result<EdifyGenerator> {
        let mut generator = EdifyGenerator::new()
            .with_fstab(self.load_fstab()?)
            .with_extra_setup(self.setup.clone());
        if let Some(legacy) = &self.legacy_mount {
            generator = generator.with_legacy_mount(legacy.clone());
        }
        Ok(generator)
    }
}
