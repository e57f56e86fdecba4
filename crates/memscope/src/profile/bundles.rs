//! Registry of version-specific overlay bundles.
//!
//! Callers register bundles at startup under `(os, version range, arch)` and
//! query the registry with the facts recorded in a profile's metadata
//! (`os`, `major`/`minor` or `version`, `arch`). Matching bundles are returned
//! in registration order, so a generic bundle registered first is applied
//! before a more specific one and loses to it field by field.

use std::fmt;
use std::sync::Arc;
use tracing::debug;
use vtype::{LayoutBatch, OverlayBatch, Profile};

/// `major.minor` kernel version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OsVersion {
    pub major: u32,
    pub minor: u32,
}

impl OsVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        OsVersion { major, minor }
    }

    /// Parse `"6.1"` or `"10"`.
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.trim().splitn(2, '.');
        let major = parts.next()?.parse().ok()?;
        let minor = match parts.next() {
            Some(m) => m.parse().ok()?,
            None => 0,
        };
        Some(OsVersion { major, minor })
    }

    /// Version recorded in profile metadata: `major`/`minor` numbers win
    /// over a `version` string. Numbers that do not fit a `u32` are ignored.
    pub fn from_profile(profile: &Profile) -> Option<Self> {
        let number = |key: &str| {
            profile
                .metadata(key)
                .and_then(|v| v.as_u64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
                .and_then(|n| u32::try_from(n).ok())
        };
        if let Some(major) = number("major") {
            let minor = number("minor").unwrap_or(0);
            return Some(OsVersion::new(major, minor));
        }
        profile.metadata_str("version").and_then(OsVersion::parse)
    }
}

impl fmt::Display for OsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Half-open range `[min, max)`; `max: None` is unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionRange {
    pub min: OsVersion,
    pub max: Option<OsVersion>,
}

impl VersionRange {
    pub fn any() -> Self {
        VersionRange {
            min: OsVersion::new(0, 0),
            max: None,
        }
    }

    /// Only `version`; the last minor of a major ends at the next major.
    pub fn exactly(version: OsVersion) -> Self {
        let next = match version.minor.checked_add(1) {
            Some(minor) => Some(OsVersion::new(version.major, minor)),
            None => version.major.checked_add(1).map(|major| OsVersion::new(major, 0)),
        };
        VersionRange { min: version, max: next }
    }

    pub fn between(min: OsVersion, max: OsVersion) -> Self {
        VersionRange { min, max: Some(max) }
    }

    pub fn starting_at(min: OsVersion) -> Self {
        VersionRange { min, max: None }
    }

    pub fn contains(&self, version: OsVersion) -> bool {
        version >= self.min && self.max.map_or(true, |max| version < max)
    }
}

/// Which images a bundle applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleKey {
    pub os: String,
    pub versions: VersionRange,
    /// `None` matches every architecture.
    pub arch: Option<String>,
}

impl BundleKey {
    pub fn new(os: impl Into<String>, versions: VersionRange) -> Self {
        BundleKey {
            os: os.into(),
            versions,
            arch: None,
        }
    }

    pub fn arch(mut self, arch: impl Into<String>) -> Self {
        self.arch = Some(arch.into());
        self
    }

    /// A bundle without a version range still matches an image of unknown
    /// version; a ranged bundle never does.
    fn matches(&self, os: &str, version: Option<OsVersion>, arch: Option<&str>) -> bool {
        if !self.os.eq_ignore_ascii_case(os) {
            return false;
        }
        let version_ok = match version {
            Some(v) => self.versions.contains(v),
            None => self.versions == VersionRange::any(),
        };
        let arch_ok = match (&self.arch, arch) {
            (None, _) => true,
            (Some(want), Some(have)) => want.eq_ignore_ascii_case(have),
            (Some(_), None) => false,
        };
        version_ok && arch_ok
    }
}

/// Layouts and overlays applied together for one OS version family.
#[derive(Debug, Clone, Default)]
pub struct OverlayBundle {
    pub name: String,
    /// Extra struct definitions (undocumented types) added before the overlays.
    pub layouts: LayoutBatch,
    pub overlays: OverlayBatch,
    pub constants: Vec<(String, u64)>,
}

impl OverlayBundle {
    pub fn new(name: impl Into<String>) -> Self {
        OverlayBundle {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_layouts(mut self, layouts: LayoutBatch) -> Self {
        self.layouts = layouts;
        self
    }

    pub fn with_overlays(mut self, overlays: OverlayBatch) -> Self {
        self.overlays = overlays;
        self
    }

    pub fn with_constant(mut self, name: impl Into<String>, value: u64) -> Self {
        self.constants.push((name.into(), value));
        self
    }
}

/// Caller-owned bundle registry.
#[derive(Debug, Clone, Default)]
pub struct OverlayRegistry {
    entries: Vec<(BundleKey, Arc<OverlayBundle>)>,
}

impl OverlayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, key: BundleKey, bundle: OverlayBundle) -> &mut Self {
        self.entries.push((key, Arc::new(bundle)));
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bundles matching the given facts, in registration order.
    pub fn select(&self, os: &str, version: Option<OsVersion>, arch: Option<&str>) -> Vec<Arc<OverlayBundle>> {
        self.entries
            .iter()
            .filter(|(key, _)| key.matches(os, version, arch))
            .map(|(_, bundle)| Arc::clone(bundle))
            .collect()
    }

    /// Bundles matching the profile's `os`, version and `arch` metadata.
    /// A profile without `os` metadata matches nothing.
    pub fn select_for(&self, profile: &Profile) -> Vec<Arc<OverlayBundle>> {
        let Some(os) = profile.metadata_str("os") else {
            debug!("Profile has no 'os' metadata; no overlay bundles apply");
            return Vec::new();
        };
        let version = OsVersion::from_profile(profile);
        let arch = profile.metadata_str("arch");
        let selected = self.select(os, version, arch);
        debug!(
            "Selected {} overlay bundle(s) for os={} version={} arch={}: {:?}",
            selected.len(),
            os,
            version.map(|v| v.to_string()).unwrap_or_else(|| "?".to_string()),
            arch.unwrap_or("?"),
            selected.iter().map(|b| b.name.as_str()).collect::<Vec<_>>()
        );
        selected
    }
}
