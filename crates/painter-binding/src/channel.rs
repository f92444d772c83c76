//! Maps texture keys from the job description (`BaseColor`, `_MetallicGlossMap`,
//! `Normal`) onto members of the remote channel enumeration.
//!
//! The remote enumeration differs between application versions, so resolution
//! only ever consults a snapshot of its member names. The alias table is data.

use serde::{Deserialize, Serialize};

/// Keys naming packed textures that feed more than one channel.
const COMPOSITE_MARKERS: &[&str] = &["metallicsmoothness", "metallicgloss"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AliasBucket {
    pub name: &'static str,
    pub triggers: &'static [&'static str],
    pub candidates: &'static [&'static str],
}

/// Consulted in order. A key may trigger several buckets; the first bucket with
/// a candidate present in the enumeration wins.
pub const ALIAS_BUCKETS: &[AliasBucket] = &[
    AliasBucket {
        name: "base_color",
        triggers: &["base", "albedo", "diffuse", "color"],
        candidates: &["basecolor", "base_color", "albedo", "diffuse", "color"],
    },
    AliasBucket {
        name: "normal",
        triggers: &["normal"],
        candidates: &["normal", "normalmap", "normal_map"],
    },
    AliasBucket {
        name: "roughness",
        triggers: &["rough"],
        candidates: &["roughness", "rough"],
    },
    AliasBucket {
        name: "metallic",
        triggers: &["metal"],
        candidates: &["metallic", "metalness", "metal"],
    },
    AliasBucket {
        name: "ambient_occlusion",
        triggers: &["ao", "occlusion"],
        candidates: &["ao", "ambientocclusion", "occlusion"],
    },
    AliasBucket {
        name: "emissive",
        triggers: &["emis", "emission"],
        candidates: &["emissive", "emission", "emis"],
    },
    AliasBucket {
        name: "height",
        triggers: &["height", "parallax", "displacement"],
        candidates: &["height", "displacement", "parallax"],
    },
];

pub fn normalize_key(key: &str) -> String {
    key.trim()
        .chars()
        .filter(|c| *c != ' ' && *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

pub fn is_composite_key(key: &str) -> bool {
    let normalized = normalize_key(key);
    COMPOSITE_MARKERS
        .iter()
        .any(|marker| normalized.contains(marker))
}

/// Snapshot of the remote channel enumeration's member names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelEnumeration {
    members: Vec<String>,
}

impl ChannelEnumeration {
    pub fn new<I, S>(members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            members: members.into_iter().map(Into::into).collect(),
        }
    }

    pub fn members(&self) -> &[String] {
        &self.members
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Member whose normalized name equals the normalized `name`. Members are
    /// scanned in snapshot order so the result is stable.
    pub fn find(&self, name: &str) -> Option<&str> {
        let wanted = normalize_key(name);
        if wanted.is_empty() {
            return None;
        }
        self.members
            .iter()
            .find(|member| normalize_key(member) == wanted)
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum ChannelMatch {
    Exact,
    Alias { bucket: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedChannel {
    pub member: String,
    #[serde(flatten)]
    pub matched: ChannelMatch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ResolutionFailure {
    #[error("composite key {key} maps to no single channel")]
    CompositeKey { key: String },
    #[error("no channel matches key {key}")]
    NoChannel { key: String },
    #[error("channel enumeration unavailable")]
    NoEnumeration,
    #[error("no identifier strategy produced a canonical id for {key}")]
    NoIdentifier { key: String },
}

/// Deterministic for a fixed enumeration snapshot.
pub fn resolve_channel(
    key: &str,
    enumeration: &ChannelEnumeration,
) -> Result<ResolvedChannel, ResolutionFailure> {
    if is_composite_key(key) {
        return Err(ResolutionFailure::CompositeKey {
            key: key.to_string(),
        });
    }
    if enumeration.is_empty() {
        return Err(ResolutionFailure::NoEnumeration);
    }
    if let Some(member) = enumeration.find(key) {
        return Ok(ResolvedChannel {
            member: member.to_string(),
            matched: ChannelMatch::Exact,
        });
    }
    let normalized = normalize_key(key);
    for bucket in ALIAS_BUCKETS {
        if !bucket.triggers.iter().any(|t| normalized.contains(t)) {
            continue;
        }
        for candidate in bucket.candidates {
            if let Some(member) = enumeration.find(candidate) {
                return Ok(ResolvedChannel {
                    member: member.to_string(),
                    matched: ChannelMatch::Alias {
                        bucket: bucket.name.to_string(),
                    },
                });
            }
        }
    }
    Err(ResolutionFailure::NoChannel {
        key: key.to_string(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelCategory {
    Grayscale,
    Color,
    Other,
}

const GRAYSCALE_WORDS: &[&str] = &["ao", "occlusion", "metallic", "roughness", "height", "glossi"];
const COLOR_WORDS: &[&str] = &["emissive", "emission", "basecolor", "base_color", "diffuse", "normal"];

const GRAYSCALE_FORMATS: &[&str] = &["L8", "L16", "L32F"];
const COLOR_FORMATS: &[&str] = &["sRGB8", "RGB8", "RGB16", "RGB32F"];
const FALLBACK_FORMATS: &[&str] = &["L8", "sRGB8", "RGB8"];

pub fn channel_categories(channel: &str) -> Vec<ChannelCategory> {
    let lower = channel.to_lowercase();
    let mut categories = Vec::new();
    if GRAYSCALE_WORDS.iter().any(|w| lower.contains(w)) {
        categories.push(ChannelCategory::Grayscale);
    }
    if COLOR_WORDS.iter().any(|w| lower.contains(w)) {
        categories.push(ChannelCategory::Color);
    }
    if categories.is_empty() {
        categories.push(ChannelCategory::Other);
    }
    categories
}

/// Format members to try when provisioning `channel`, restricted to those the
/// remote format enumeration offers. `None` (no explicit format) is always
/// the last entry.
pub fn candidate_formats(channel: &str, available: &[String]) -> Vec<Option<String>> {
    let mut formats: Vec<Option<String>> = Vec::new();
    for category in channel_categories(channel) {
        match category {
            ChannelCategory::Grayscale => push_available(&mut formats, GRAYSCALE_FORMATS, available),
            ChannelCategory::Color => push_available(&mut formats, COLOR_FORMATS, available),
            ChannelCategory::Other => {}
        }
    }
    if formats.is_empty() {
        push_available(&mut formats, FALLBACK_FORMATS, available);
    }
    formats.push(None);
    formats
}

fn push_available(formats: &mut Vec<Option<String>>, names: &[&str], available: &[String]) {
    for name in names {
        let entry = Some(name.to_string());
        if available.iter().any(|a| a == name) && !formats.contains(&entry) {
            formats.push(entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unity_like() -> ChannelEnumeration {
        ChannelEnumeration::new([
            "AO",
            "BaseColor",
            "Emissive",
            "Height",
            "Metallic",
            "Normal",
            "Opacity",
            "Roughness",
        ])
    }

    #[test]
    fn exact_match_ignores_case_spaces_and_underscores() {
        let enumeration = unity_like();
        let resolved = resolve_channel("base_color", &enumeration).expect("resolved");
        assert_eq!(resolved.member, "BaseColor");
        assert_eq!(resolved.matched, ChannelMatch::Exact);
        assert_eq!(
            resolve_channel(" Roughness ", &enumeration).expect("rough").member,
            "Roughness"
        );
    }

    #[test]
    fn aliases_follow_bucket_order() {
        let enumeration = unity_like();
        let albedo = resolve_channel("Albedo", &enumeration).expect("albedo");
        assert_eq!(albedo.member, "BaseColor");
        assert_eq!(
            albedo.matched,
            ChannelMatch::Alias {
                bucket: "base_color".to_string()
            }
        );
        assert_eq!(
            resolve_channel("Occlusion", &enumeration).expect("ao").member,
            "AO"
        );
        assert_eq!(
            resolve_channel("Emission", &enumeration).expect("emission").member,
            "Emissive"
        );
        assert_eq!(
            resolve_channel("ParallaxMap", &enumeration).expect("height").member,
            "Height"
        );
    }

    #[test]
    fn falls_through_bucket_without_candidates() {
        let enumeration = ChannelEnumeration::new(["Normal", "Metallic"]);
        // "NormalColor" triggers base_color first, which has no member here.
        let resolved = resolve_channel("NormalColor", &enumeration).expect("normal");
        assert_eq!(resolved.member, "Normal");
    }

    #[test]
    fn composite_and_unknown_keys_fail() {
        let enumeration = unity_like();
        assert!(matches!(
            resolve_channel("MetallicSmoothness", &enumeration),
            Err(ResolutionFailure::CompositeKey { .. })
        ));
        assert!(matches!(
            resolve_channel("_MetallicGlossMap", &enumeration),
            Err(ResolutionFailure::CompositeKey { .. })
        ));
        assert!(matches!(
            resolve_channel("Specular", &enumeration),
            Err(ResolutionFailure::NoChannel { .. })
        ));
        assert!(matches!(
            resolve_channel("BaseColor", &ChannelEnumeration::default()),
            Err(ResolutionFailure::NoEnumeration)
        ));
    }

    #[test]
    fn resolution_is_deterministic() {
        let enumeration = unity_like();
        let keys = ["BaseColor", "Normal", "AO", "Emission", "Height", "Metallic", "Roughness"];
        let first: Vec<_> = keys.iter().map(|k| resolve_channel(k, &enumeration)).collect();
        for _ in 0..5 {
            let again: Vec<_> = keys.iter().map(|k| resolve_channel(k, &enumeration)).collect();
            assert_eq!(first, again);
        }
    }

    #[test]
    fn formats_follow_channel_category() {
        let available: Vec<String> = ["L8", "L16", "sRGB8", "RGB8", "RGB16"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            candidate_formats("Roughness", &available),
            vec![Some("L8".into()), Some("L16".into()), None]
        );
        assert_eq!(
            candidate_formats("BaseColor", &available),
            vec![Some("sRGB8".into()), Some("RGB8".into()), Some("RGB16".into()), None]
        );
        assert_eq!(
            candidate_formats("Opacity", &available),
            vec![Some("L8".into()), Some("sRGB8".into()), Some("RGB8".into()), None]
        );
        assert_eq!(candidate_formats("Normal", &[]), vec![None]);
    }
}
