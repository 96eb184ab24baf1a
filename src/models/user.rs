//! Per-request user configuration: the subset of a user profile that drives
//! filtering, ranking and deduplication. Every field defaults so partial
//! configurations parse.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserData {
    pub preferred_resolutions: Vec<String>,
    pub excluded_qualities: Vec<String>,
    pub excluded_visual_tags: Vec<String>,
    pub preferred_keywords: Vec<String>,
    pub preferred_regex_patterns: Vec<RegexPatternConfig>,
    pub preferred_stream_expressions: Vec<String>,
    pub ranked_stream_expressions: Vec<RankedExpression>,
    pub included_stream_expressions: Vec<String>,
    pub required_stream_expressions: Vec<String>,
    pub excluded_stream_expressions: Vec<String>,
    pub deduplicator: DeduplicatorConfig,
    /// SeaDex tagging gate; absent means enabled.
    pub enable_seadex: Option<bool>,
    pub title_matching: TitleMatching,
    pub year_matching: YearMatching,
    pub season_episode_matching: SeasonEpisodeMatching,
    pub digital_release_filter: DigitalReleaseFilter,
    pub sort_criteria: SortCriteria,
    /// Whether user-authored regex patterns may be compiled for this user.
    pub regex_allowed: bool,
}

impl UserData {
    #[must_use]
    pub fn seadex_enabled(&self) -> bool {
        self.enable_seadex != Some(false)
    }

    /// Every expression string in the configuration, across all lists.
    pub fn all_expressions(&self) -> impl Iterator<Item = &str> {
        self.preferred_stream_expressions
            .iter()
            .map(String::as_str)
            .chain(self.ranked_stream_expressions.iter().map(|r| r.expression.as_str()))
            .chain(self.included_stream_expressions.iter().map(String::as_str))
            .chain(self.required_stream_expressions.iter().map(String::as_str))
            .chain(self.excluded_stream_expressions.iter().map(String::as_str))
    }
}

/// A named user regex pattern. The pattern string may carry trailing
/// `/flags`-style modifiers; the synthetic `n` flag negates the match.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegexPatternConfig {
    pub name: String,
    pub pattern: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedExpression {
    pub expression: String,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupeKey {
    Filename,
    InfoHash,
    Size,
    SmartDetect,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupeMode {
    SingleResult,
    #[default]
    PerService,
    Disabled,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MultiGroupBehaviour {
    Aggressive,
    #[default]
    Conservative,
    KeepAll,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeduplicatorConfig {
    pub enabled: bool,
    pub keys: Vec<DedupeKey>,
    pub multi_group_behaviour: MultiGroupBehaviour,
    pub cached: DedupeMode,
    pub uncached: DedupeMode,
    pub p2p: DedupeMode,
}

impl Default for DeduplicatorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            keys: vec![DedupeKey::InfoHash],
            multi_group_behaviour: MultiGroupBehaviour::default(),
            cached: DedupeMode::default(),
            uncached: DedupeMode::default(),
            p2p: DedupeMode::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TitleMatchMode {
    Exact,
    #[default]
    Contains,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TitleMatching {
    pub enabled: bool,
    pub mode: TitleMatchMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct YearMatching {
    pub enabled: bool,
    /// Permitted distance from the catalog year (or year range).
    pub tolerance: u32,
}

impl Default for YearMatching {
    fn default() -> Self {
        Self {
            enabled: false,
            tolerance: 1,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SeasonEpisodeMatching {
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DigitalReleaseFilter {
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortKey {
    Cached,
    Resolution,
    Library,
    RegexPatterns,
    StreamType,
    VisualTag,
    AudioTag,
    AudioChannel,
    Encode,
    Language,
    Size,
    Seadex,
    Keyword,
    StreamExpression,
    StreamExpressionScore,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Desc,
    Asc,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortCriterion {
    pub key: SortKey,
    #[serde(default)]
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SortCriteria {
    pub global: Vec<SortCriterion>,
}

impl Default for SortCriteria {
    fn default() -> Self {
        Self {
            global: vec![
                SortCriterion {
                    key: SortKey::Cached,
                    direction: SortDirection::Desc,
                },
                SortCriterion {
                    key: SortKey::Resolution,
                    direction: SortDirection::Desc,
                },
                SortCriterion {
                    key: SortKey::Size,
                    direction: SortDirection::Desc,
                },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_parses_with_defaults() {
        let user: UserData = serde_json::from_str("{}").unwrap();
        assert!(user.seadex_enabled());
        assert!(!user.deduplicator.enabled);
        assert_eq!(user.year_matching.tolerance, 1);
        assert_eq!(user.sort_criteria.global.len(), 3);
    }

    #[test]
    fn wire_names_are_camel_case() {
        let json = serde_json::json!({
            "excludedQualities": ["CAM"],
            "enableSeadex": false,
            "sortCriteria": {
                "global": [{ "key": "regexPatterns", "direction": "asc" }]
            },
            "deduplicator": {
                "enabled": true,
                "keys": ["info_hash", "smart_detect"],
                "multiGroupBehaviour": "keep_all"
            }
        });
        let user: UserData = serde_json::from_value(json).unwrap();
        assert!(!user.seadex_enabled());
        assert_eq!(user.excluded_qualities, vec!["CAM"]);
        assert_eq!(user.sort_criteria.global[0].key, SortKey::RegexPatterns);
        assert_eq!(
            user.deduplicator.multi_group_behaviour,
            MultiGroupBehaviour::KeepAll
        );
        assert_eq!(
            user.deduplicator.keys,
            vec![DedupeKey::InfoHash, DedupeKey::SmartDetect]
        );
    }
}
