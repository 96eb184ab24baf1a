//! Precompute stages: SeaDex tags (early, before filtering) and the
//! preferred/ranked annotations (late, after filtering).

use crate::clients::SeaDexInfo;
use crate::expr::{EvalScope, Expression, Value, stream_record};
use crate::models::stream::RegexMatch;
use crate::models::{ParsedStream, SeaDexTag, UserData};
use regex::Regex;
use std::collections::BTreeMap;
use tracing::warn;

/// Tags streams against the SeaDex sets. Info-hash membership decides; the
/// release-group fallback applies only when not a single stream's hash hit
/// the "all" set.
pub fn apply_seadex_tags(streams: &mut [ParsedStream], info: &SeaDexInfo) {
    let any_hash_hit = streams
        .iter()
        .filter_map(ParsedStream::info_hash)
        .any(|hash| info.all_hashes.contains(&hash));

    if any_hash_hit {
        for stream in streams.iter_mut() {
            if let Some(hash) = stream.info_hash()
                && info.all_hashes.contains(&hash)
            {
                stream.seadex = Some(SeaDexTag {
                    is_best: info.best_hashes.contains(&hash),
                    is_seadex: true,
                });
            }
        }
        return;
    }

    for stream in streams.iter_mut() {
        let Some(group) = stream.release_group().map(str::to_lowercase) else {
            continue;
        };
        let in_all = info.all_groups.contains(&group);
        let in_best = info.best_groups.contains(&group);
        if in_all || in_best {
            stream.seadex = Some(SeaDexTag {
                is_best: in_best,
                is_seadex: in_all,
            });
        }
    }
}

/// Compiles an expression list, collecting failures as warnings; a failed
/// expression is dropped from its stage.
pub fn compile_expressions(sources: &[String], warnings: &mut Vec<String>) -> Vec<Expression> {
    sources
        .iter()
        .filter_map(|source| match Expression::compile(source) {
            Ok(expression) => Some(expression),
            Err(e) => {
                warn!(error = %e, "Dropping uncompilable expression");
                warnings.push(e.to_string());
                None
            }
        })
        .collect()
}

/// A user regex pattern after flag extraction: `/pattern/ni` style strings
/// carry their flags inline; the synthetic `n` flag negates the match.
struct CompiledPattern {
    name: String,
    source: String,
    regex: Regex,
    negated: bool,
}

fn compile_user_pattern(name: &str, raw: &str) -> Option<CompiledPattern> {
    let (bare, flags) = split_pattern_flags(raw);
    let negated = flags.contains('n');
    let pattern = if flags.contains('i') {
        format!("(?i){bare}")
    } else {
        bare.to_string()
    };
    match Regex::new(&pattern) {
        Ok(regex) => Some(CompiledPattern {
            name: name.to_string(),
            source: raw.to_string(),
            regex,
            negated,
        }),
        Err(e) => {
            warn!(name, error = %e, "Dropping invalid preferred pattern");
            None
        }
    }
}

/// Splits `/pattern/flags` into its parts; plain strings have no flags.
fn split_pattern_flags(raw: &str) -> (&str, &str) {
    if raw.len() >= 2
        && raw.starts_with('/')
        && let Some(end) = raw.rfind('/')
        && end > 0
    {
        let flags = &raw[end + 1..];
        if flags.chars().all(|c| c.is_ascii_alphabetic()) {
            return (&raw[1..end], flags);
        }
    }
    (raw, "")
}

fn haystacks_match(stream: &ParsedStream, regex: &Regex) -> bool {
    stream
        .annotation_haystacks()
        .iter()
        .flatten()
        .any(|haystack| regex.is_match(haystack))
}

/// Preferred-match annotations: keyword flag, first-winning regex pattern,
/// first-claiming preferred expression.
pub fn annotate_preferred(
    streams: &mut [ParsedStream],
    user: &UserData,
    context: &BTreeMap<String, Value>,
    warnings: &mut Vec<String>,
) {
    annotate_keywords(streams, user);
    annotate_regex_patterns(streams, user);
    annotate_preferred_expressions(streams, user, context, warnings);
}

fn annotate_keywords(streams: &mut [ParsedStream], user: &UserData) {
    if user.preferred_keywords.is_empty() {
        return;
    }
    let alternatives = user
        .preferred_keywords
        .iter()
        .map(|kw| regex::escape(kw))
        .collect::<Vec<_>>()
        .join("|");
    let Ok(regex) = Regex::new(&format!("(?i)({alternatives})")) else {
        return;
    };
    for stream in streams.iter_mut() {
        if haystacks_match(stream, &regex) {
            stream.keyword_matched = Some(true);
        }
    }
}

fn annotate_regex_patterns(streams: &mut [ParsedStream], user: &UserData) {
    if user.preferred_regex_patterns.is_empty() {
        return;
    }
    if !user.regex_allowed {
        warn!("User regex patterns refused by permission set, treating as empty");
        return;
    }
    let patterns: Vec<CompiledPattern> = user
        .preferred_regex_patterns
        .iter()
        .filter_map(|p| compile_user_pattern(&p.name, &p.pattern))
        .collect();

    for stream in streams.iter_mut() {
        for (index, pattern) in patterns.iter().enumerate() {
            let mut matched = haystacks_match(stream, &pattern.regex);
            if pattern.negated {
                matched = !matched;
            }
            if matched {
                stream.regex_matched = Some(RegexMatch {
                    name: pattern.name.clone(),
                    pattern: pattern.source.clone(),
                    index,
                });
                break;
            }
        }
    }
}

fn annotate_preferred_expressions(
    streams: &mut [ParsedStream],
    user: &UserData,
    context: &BTreeMap<String, Value>,
    warnings: &mut Vec<String>,
) {
    let expressions = compile_expressions(&user.preferred_stream_expressions, warnings);
    for stream in streams.iter_mut() {
        if stream.stream_expression_matched.is_some() {
            continue;
        }
        let record = stream_record(stream);
        let scope = EvalScope {
            stream: &record,
            context,
        };
        // First expression that selects the stream claims it for good.
        for (index, expression) in expressions.iter().enumerate() {
            if expression.matches(&scope) {
                stream.stream_expression_matched = Some(index);
                break;
            }
        }
    }
}

/// Ranked scoring: every matching expression adds its score. A stream no
/// expression touched keeps a `None` score, distinct from an earned zero.
pub fn apply_ranked_scores(
    streams: &mut [ParsedStream],
    user: &UserData,
    context: &BTreeMap<String, Value>,
    warnings: &mut Vec<String>,
) {
    for ranked in &user.ranked_stream_expressions {
        let expression = match Expression::compile(&ranked.expression) {
            Ok(expression) => expression,
            Err(e) => {
                warn!(error = %e, "Dropping uncompilable ranked expression");
                warnings.push(e.to_string());
                continue;
            }
        };
        for stream in streams.iter_mut() {
            let record = stream_record(stream);
            let scope = EvalScope {
                stream: &record,
                context,
            };
            if expression.matches(&scope) {
                stream.stream_expression_score =
                    Some(stream.stream_expression_score.unwrap_or(0.0) + ranked.score);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::{RankedExpression, RegexPatternConfig};
    use crate::models::{ParsedFile, ServiceInfo, TorrentInfo};

    fn stream(id: &str, hash: Option<&str>, group: Option<&str>) -> ParsedStream {
        ParsedStream {
            id: id.to_string(),
            filename: Some(format!("[{}] Show - 01.mkv", group.unwrap_or("NoGroup"))),
            torrent: hash.map(|h| TorrentInfo {
                info_hash: Some(h.to_string()),
                seeders: None,
            }),
            parsed_file: Some(ParsedFile {
                release_group: group.map(String::from),
                ..ParsedFile::default()
            }),
            ..ParsedStream::default()
        }
    }

    fn seadex(best: &[&str], all: &[&str], best_groups: &[&str], all_groups: &[&str]) -> SeaDexInfo {
        SeaDexInfo {
            best_hashes: best.iter().map(|s| (*s).to_string()).collect(),
            all_hashes: all.iter().map(|s| (*s).to_string()).collect(),
            best_groups: best_groups.iter().map(|s| (*s).to_string()).collect(),
            all_groups: all_groups.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    #[test]
    fn hash_hits_suppress_the_group_fallback() {
        let mut streams = vec![
            stream("s1", Some("aaaa"), Some("SubsPlease")),
            stream("s2", Some("bbbb"), Some("SubsPlease")),
        ];
        let info = seadex(&["aaaa"], &["aaaa"], &[], &["subsplease"]);
        apply_seadex_tags(&mut streams, &info);

        assert_eq!(
            streams[0].seadex,
            Some(SeaDexTag {
                is_best: true,
                is_seadex: true
            })
        );
        assert_eq!(streams[1].seadex, None);
    }

    #[test]
    fn group_fallback_applies_only_without_hash_hits() {
        let mut streams = vec![
            stream("s1", Some("eeee"), Some("SubsPlease")),
            stream("s2", None, Some("Unknown-Group")),
        ];
        let info = seadex(&["aaaa"], &["aaaa"], &["subsplease"], &["subsplease"]);
        apply_seadex_tags(&mut streams, &info);

        assert_eq!(
            streams[0].seadex,
            Some(SeaDexTag {
                is_best: true,
                is_seadex: true
            })
        );
        assert_eq!(streams[1].seadex, None);
    }

    #[test]
    fn keyword_annotation_scans_all_haystacks() {
        let user = UserData {
            preferred_keywords: vec!["dual audio".into()],
            ..UserData::default()
        };
        let mut streams = vec![ParsedStream {
            id: "s".into(),
            folder_name: Some("Show.S01.Dual-Audio.1080p".into()),
            ..ParsedStream::default()
        }];
        // Keyword with a space does not hit the dashed folder name.
        annotate_keywords(&mut streams, &user);
        assert_eq!(streams[0].keyword_matched, None);

        let user = UserData {
            preferred_keywords: vec!["Dual-Audio".into()],
            ..UserData::default()
        };
        annotate_keywords(&mut streams, &user);
        assert_eq!(streams[0].keyword_matched, Some(true));
    }

    #[test]
    fn regex_patterns_first_hit_wins_and_supports_negation() {
        let user = UserData {
            regex_allowed: true,
            preferred_regex_patterns: vec![
                RegexPatternConfig {
                    name: "no-cam".into(),
                    pattern: "/CAM/n".into(),
                },
                RegexPatternConfig {
                    name: "subsplease".into(),
                    pattern: "/subsplease/i".into(),
                },
            ],
            ..UserData::default()
        };
        let mut streams = vec![
            stream("clean", None, Some("SubsPlease")),
            ParsedStream {
                id: "cam".into(),
                filename: Some("Movie.2024.CAM.mkv".into()),
                ..ParsedStream::default()
            },
        ];
        annotate_regex_patterns(&mut streams, &user);

        // The negated no-CAM pattern claims the clean stream first.
        let first = streams[0].regex_matched.as_ref().unwrap();
        assert_eq!(first.name, "no-cam");
        assert_eq!(first.index, 0);
        // The CAM stream fails the negated pattern and no later pattern
        // matches it.
        assert!(streams[1].regex_matched.is_none());
    }

    #[test]
    fn regex_patterns_require_permission() {
        let user = UserData {
            regex_allowed: false,
            preferred_regex_patterns: vec![RegexPatternConfig {
                name: "x".into(),
                pattern: "SubsPlease".into(),
            }],
            ..UserData::default()
        };
        let mut streams = vec![stream("s", None, Some("SubsPlease"))];
        annotate_regex_patterns(&mut streams, &user);
        assert!(streams[0].regex_matched.is_none());
    }

    #[test]
    fn preferred_expressions_first_claim_sticks() {
        let user = UserData {
            preferred_stream_expressions: vec![
                "resolution == '2160p'".into(),
                "resolution == '1080p'".into(),
                "resolution == '2160p'".into(),
            ],
            ..UserData::default()
        };
        let mut streams = vec![
            ParsedStream {
                id: "uhd".into(),
                parsed_file: Some(ParsedFile {
                    resolution: Some("2160p".into()),
                    ..ParsedFile::default()
                }),
                ..ParsedStream::default()
            },
            ParsedStream {
                id: "fhd".into(),
                parsed_file: Some(ParsedFile {
                    resolution: Some("1080p".into()),
                    ..ParsedFile::default()
                }),
                ..ParsedStream::default()
            },
        ];
        let mut warnings = Vec::new();
        annotate_preferred_expressions(&mut streams, &user, &BTreeMap::new(), &mut warnings);

        assert_eq!(streams[0].stream_expression_matched, Some(0));
        assert_eq!(streams[1].stream_expression_matched, Some(1));
        assert!(warnings.is_empty());
    }

    #[test]
    fn ranked_scores_are_additive_and_distinguish_untouched() {
        let user = UserData {
            ranked_stream_expressions: vec![
                RankedExpression {
                    expression: "resolution == '1080p'".into(),
                    score: 10.0,
                },
                RankedExpression {
                    expression: "cached".into(),
                    score: 5.0,
                },
            ],
            ..UserData::default()
        };
        let cached_service = ServiceInfo {
            id: "rd".into(),
            short_name: "RD".into(),
            cached: true,
        };
        let mut streams = vec![
            ParsedStream {
                id: "both".into(),
                parsed_file: Some(ParsedFile {
                    resolution: Some("1080p".into()),
                    ..ParsedFile::default()
                }),
                service: Some(cached_service.clone()),
                ..ParsedStream::default()
            },
            ParsedStream {
                id: "cached-only".into(),
                parsed_file: Some(ParsedFile {
                    resolution: Some("720p".into()),
                    ..ParsedFile::default()
                }),
                service: Some(cached_service),
                ..ParsedStream::default()
            },
            ParsedStream {
                id: "1080-only".into(),
                parsed_file: Some(ParsedFile {
                    resolution: Some("1080p".into()),
                    ..ParsedFile::default()
                }),
                ..ParsedStream::default()
            },
            ParsedStream {
                id: "neither".into(),
                ..ParsedStream::default()
            },
        ];
        let mut warnings = Vec::new();
        apply_ranked_scores(&mut streams, &user, &BTreeMap::new(), &mut warnings);

        assert_eq!(streams[0].stream_expression_score, Some(15.0));
        assert_eq!(streams[1].stream_expression_score, Some(5.0));
        assert_eq!(streams[2].stream_expression_score, Some(10.0));
        assert_eq!(streams[3].stream_expression_score, None);
    }

    #[test]
    fn pattern_flag_splitting() {
        assert_eq!(split_pattern_flags("/abc/ni"), ("abc", "ni"));
        assert_eq!(split_pattern_flags("plain"), ("plain", ""));
        assert_eq!(split_pattern_flags("/a/b/i"), ("a/b", "i"));
    }
}
