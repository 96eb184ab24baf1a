//! Stream filtering: expression rules, static allow/deny lists, and the
//! metadata-backed matchers.
//!
//! Order: required expressions, then excluded expressions, then the static
//! lists, then title/year/season-episode matching and the digital-release
//! filter. Streams claimed by an `included` expression are exempt from
//! everything after the required stage; `error`/`statistic` streams pass
//! through untouched so their messages stay visible.

use super::precompute::compile_expressions;
use crate::constants::PRE_RELEASE_QUALITIES;
use crate::context::StreamContext;
use crate::expr::{EvalScope, Expression, Value, stream_record};
use crate::models::{MediaType, ParsedStream, StreamType};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

pub async fn filter_streams(
    streams: Vec<ParsedStream>,
    context: &StreamContext,
    expression_context: &BTreeMap<String, Value>,
    warnings: &mut Vec<String>,
) -> Vec<ParsedStream> {
    let user = context.user();
    let included = compile_expressions(&user.included_stream_expressions, warnings);
    let required = compile_expressions(&user.required_stream_expressions, warnings);
    let excluded = compile_expressions(&user.excluded_stream_expressions, warnings);

    let matcher = MetadataMatcher::build(context).await;

    streams
        .into_iter()
        .filter(|stream| {
            if matches!(stream.stream_type, StreamType::Error | StreamType::Statistic) {
                return true;
            }

            let record = stream_record(stream);
            let scope = EvalScope {
                stream: &record,
                context: expression_context,
            };

            if !required.is_empty() && !matches_any(&required, &scope) {
                return false;
            }
            if matches_any(&included, &scope) {
                return true;
            }
            if matches_any(&excluded, &scope) {
                return false;
            }
            if excluded_by_lists(stream, user) {
                return false;
            }
            matcher.keeps(stream)
        })
        .collect()
}

fn matches_any(expressions: &[Expression], scope: &EvalScope<'_>) -> bool {
    expressions.iter().any(|e| e.matches(scope))
}

fn excluded_by_lists(stream: &ParsedStream, user: &crate::models::UserData) -> bool {
    if let Some(quality) = stream.quality()
        && user
            .excluded_qualities
            .iter()
            .any(|q| q.eq_ignore_ascii_case(quality))
    {
        return true;
    }
    if let Some(file) = &stream.parsed_file
        && file.visual_tags.iter().any(|tag| {
            user.excluded_visual_tags
                .iter()
                .any(|excluded| excluded.eq_ignore_ascii_case(tag))
        })
    {
        return true;
    }
    false
}

/// The metadata-backed matchers, resolved once per request.
struct MetadataMatcher {
    titles: Option<Vec<String>>,
    title_mode: crate::models::user::TitleMatchMode,
    year_window: Option<(i32, i32)>,
    season_episode: Option<(u32, u32)>,
    absolute_episode: Option<u32>,
    unreleased_movie: bool,
}

impl MetadataMatcher {
    async fn build(context: &StreamContext) -> Self {
        let user = context.user();

        let titles = if user.title_matching.enabled {
            context.get_metadata().await.map(|metadata| {
                let mut titles: Vec<String> =
                    metadata.titles.iter().map(|t| normalize_title(t)).collect();
                if let Some(title) = &metadata.title {
                    let normalized = normalize_title(title);
                    if !titles.contains(&normalized) {
                        titles.push(normalized);
                    }
                }
                titles.retain(|t| !t.is_empty());
                titles
            })
        } else {
            None
        };

        let year_window = if user.year_matching.enabled {
            let tolerance = i32::try_from(user.year_matching.tolerance).unwrap_or(0);
            context.get_metadata().await.and_then(|metadata| {
                metadata.year.map(|year| {
                    let end = metadata.year_end.unwrap_or(year);
                    (year - tolerance, end + tolerance)
                })
            })
        } else {
            None
        };

        let season_episode = if user.season_episode_matching.enabled {
            context.season().zip(context.episode())
        } else {
            None
        };
        let absolute_episode = if user.season_episode_matching.enabled {
            context.absolute_episode().await
        } else {
            None
        };

        let unreleased_movie = user.digital_release_filter.enabled
            && context.media_type() == MediaType::Movie
            && match context.get_release_dates().await {
                // Unknown release dates never suppress streams.
                None => false,
                Some(dates) => {
                    let today = chrono::Utc::now().date_naive();
                    !dates.is_empty()
                        && !dates
                            .iter()
                            .any(|r| r.kind.is_home_release() && r.date <= today)
                }
            };

        Self {
            titles,
            title_mode: user.title_matching.mode,
            year_window,
            season_episode,
            absolute_episode,
            unreleased_movie,
        }
    }

    fn keeps(&self, stream: &ParsedStream) -> bool {
        self.title_keeps(stream)
            && self.year_keeps(stream)
            && self.season_episode_keeps(stream)
            && self.release_keeps(stream)
    }

    fn title_keeps(&self, stream: &ParsedStream) -> bool {
        let Some(titles) = &self.titles else {
            return true;
        };
        // Streams without a filename carry nothing to verify against.
        let Some(name) = stream.filename.as_deref().or(stream.folder_name.as_deref()) else {
            return true;
        };
        let normalized = normalize_title(name);
        titles.iter().any(|title| match self.title_mode {
            crate::models::user::TitleMatchMode::Exact => normalized.starts_with(title),
            crate::models::user::TitleMatchMode::Contains => normalized.contains(title),
        })
    }

    fn year_keeps(&self, stream: &ParsedStream) -> bool {
        let Some((from, to)) = self.year_window else {
            return true;
        };
        let Some(name) = stream.filename.as_deref().or(stream.folder_name.as_deref()) else {
            return true;
        };
        let years = extract_years(name);
        if years.is_empty() {
            return true;
        }
        years.iter().any(|year| (from..=to).contains(year))
    }

    fn season_episode_keeps(&self, stream: &ParsedStream) -> bool {
        let Some((season, episode)) = self.season_episode else {
            return true;
        };
        let Some(name) = stream.filename.as_deref() else {
            return true;
        };
        match extract_season_episode(name) {
            Some((Some(file_season), file_episode)) => {
                (file_season == season && file_episode == episode)
                    || self.absolute_episode == Some(file_episode)
            }
            Some((None, file_episode)) => {
                // Bare episode numbers: accept the season-relative or the
                // absolute numbering.
                file_episode == episode || self.absolute_episode == Some(file_episode)
            }
            None => true,
        }
    }

    fn release_keeps(&self, stream: &ParsedStream) -> bool {
        if !self.unreleased_movie {
            return true;
        }
        match stream.quality() {
            // A quality claiming a digital source cannot exist yet.
            Some(quality) => PRE_RELEASE_QUALITIES
                .iter()
                .any(|q| q.eq_ignore_ascii_case(quality)),
            None => true,
        }
    }
}

/// Lowercases and strips everything but alphanumerics, so release names
/// and catalog titles compare on content alone.
fn normalize_title(raw: &str) -> String {
    raw.chars()
        .filter_map(|c| {
            if c.is_ascii_alphanumeric() {
                Some(c.to_ascii_lowercase())
            } else {
                None
            }
        })
        .collect()
}

fn extract_years(name: &str) -> Vec<i32> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"\b(19|20)\d{2}\b").expect("Invalid regex pattern defined in code")
    });
    let mut years: Vec<i32> = re
        .find_iter(name)
        .filter_map(|m| m.as_str().parse().ok())
        .collect();
    years.dedup();
    years
}

/// Pulls `(season?, episode)` out of a release name: `S01E02`, `1x02`, or
/// a bare `- 02` / `E02` episode marker.
fn extract_season_episode(name: &str) -> Option<(Option<u32>, u32)> {
    static SXXEXX: OnceLock<Regex> = OnceLock::new();
    static NXM: OnceLock<Regex> = OnceLock::new();
    static BARE: OnceLock<Regex> = OnceLock::new();

    let sxxexx = SXXEXX.get_or_init(|| {
        Regex::new(r"[Ss](\d{1,2})[Ee](\d{1,4})").expect("Invalid regex pattern defined in code")
    });
    if let Some(caps) = sxxexx.captures(name) {
        return Some((caps[1].parse().ok(), caps[2].parse().ok()?));
    }

    let nxm = NXM.get_or_init(|| {
        Regex::new(r"\b(\d{1,2})x(\d{1,4})\b").expect("Invalid regex pattern defined in code")
    });
    if let Some(caps) = nxm.captures(name) {
        return Some((caps[1].parse().ok(), caps[2].parse().ok()?));
    }

    let bare = BARE.get_or_init(|| {
        Regex::new(r"(?:\s-\s|[Ee][Pp]?\s?)(\d{1,4})(?:\s|v\d|\.|\[|\(|$)")
            .expect("Invalid regex pattern defined in code")
    });
    if let Some(caps) = bare.captures(name) {
        return Some((None, caps[1].parse().ok()?));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_normalization_strips_separators() {
        assert_eq!(normalize_title("Attack.on.Titan!"), "attackontitan");
        assert_eq!(normalize_title("[SubsPlease] Spy x Family"), "subspleasespyxfamily");
    }

    #[test]
    fn year_extraction_finds_all_years() {
        assert_eq!(extract_years("Blade.Runner.2049.2017.1080p"), vec![2049, 2017]);
        assert!(extract_years("No.Year.Here.1080p").is_empty());
    }

    #[test]
    fn season_episode_extraction_handles_common_shapes() {
        assert_eq!(
            extract_season_episode("Show.S02E05.1080p.mkv"),
            Some((Some(2), 5))
        );
        assert_eq!(extract_season_episode("Show 2x05 720p"), Some((Some(2), 5)));
        assert_eq!(
            extract_season_episode("[Group] Show - 17 (1080p).mkv"),
            Some((None, 17))
        );
        assert_eq!(extract_season_episode("Some Movie 1080p"), None);
    }

    #[test]
    fn metadata_matcher_checks_season_episode_and_absolute() {
        let matcher = MetadataMatcher {
            titles: None,
            title_mode: crate::models::user::TitleMatchMode::Contains,
            year_window: None,
            season_episode: Some((2, 5)),
            absolute_episode: Some(17),
            unreleased_movie: false,
        };

        let make = |filename: &str| ParsedStream {
            id: "s".into(),
            filename: Some(filename.to_string()),
            ..ParsedStream::default()
        };

        assert!(matcher.season_episode_keeps(&make("Show.S02E05.mkv")));
        assert!(matcher.season_episode_keeps(&make("[Group] Show - 17.mkv")));
        assert!(!matcher.season_episode_keeps(&make("Show.S01E05.mkv")));
        assert!(!matcher.season_episode_keeps(&make("[Group] Show - 05.mkv")));
        // Nothing recognizable stays in.
        assert!(matcher.season_episode_keeps(&make("Show Complete 1080p")));
    }

    #[test]
    fn unreleased_movies_keep_only_pre_release_qualities() {
        let matcher = MetadataMatcher {
            titles: None,
            title_mode: crate::models::user::TitleMatchMode::Contains,
            year_window: None,
            season_episode: None,
            absolute_episode: None,
            unreleased_movie: true,
        };

        let with_quality = |quality: Option<&str>| ParsedStream {
            id: "s".into(),
            parsed_file: quality.map(|q| crate::models::ParsedFile {
                quality: Some(q.to_string()),
                ..crate::models::ParsedFile::default()
            }),
            ..ParsedStream::default()
        };

        assert!(matcher.release_keeps(&with_quality(Some("CAM"))));
        assert!(!matcher.release_keeps(&with_quality(Some("WEB-DL"))));
        assert!(matcher.release_keeps(&with_quality(None)));
    }
}
