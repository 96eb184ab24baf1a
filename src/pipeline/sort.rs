//! Multi-key stable sort.
//!
//! Every key maps a stream onto a numeric rank where higher is better;
//! `desc` puts better first. Ties fall through to the next key, and the
//! underlying sort is stable so fetch order survives full ties.

use crate::constants::RESOLUTION_ORDER;
use crate::models::user::{SortDirection, SortKey};
use crate::models::{ParsedStream, StreamType, UserData};
use std::cmp::Ordering;

/// Acquisition-type ranking for the `streamType` key, best first.
const STREAM_TYPE_ORDER: &[StreamType] = &[
    StreamType::Debrid,
    StreamType::Usenet,
    StreamType::P2p,
    StreamType::Http,
    StreamType::Live,
    StreamType::Youtube,
    StreamType::External,
    StreamType::Statistic,
    StreamType::Error,
];

pub fn sort_streams(streams: &mut [ParsedStream], user: &UserData) {
    let criteria = &user.sort_criteria.global;
    if criteria.is_empty() {
        return;
    }
    streams.sort_by(|a, b| {
        for criterion in criteria {
            let ra = rank(a, criterion.key, user);
            let rb = rank(b, criterion.key, user);
            let ordering = match criterion.direction {
                SortDirection::Desc => rb.partial_cmp(&ra),
                SortDirection::Asc => ra.partial_cmp(&rb),
            }
            .unwrap_or(Ordering::Equal);
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

#[allow(clippy::cast_precision_loss)]
fn rank(stream: &ParsedStream, key: SortKey, user: &UserData) -> f64 {
    match key {
        SortKey::Cached => bool_rank(stream.is_cached()),
        SortKey::Resolution => resolution_rank(stream.resolution(), user),
        SortKey::Library => bool_rank(stream.library == Some(true)),
        SortKey::RegexPatterns => stream
            .regex_matched
            .as_ref()
            .map_or(0.0, |m| claim_rank(m.index)),
        SortKey::StreamType => {
            let position = STREAM_TYPE_ORDER
                .iter()
                .position(|t| *t == stream.stream_type)
                .unwrap_or(STREAM_TYPE_ORDER.len());
            (STREAM_TYPE_ORDER.len() - position) as f64
        }
        SortKey::VisualTag => tag_rank(stream, |f| &f.visual_tags),
        SortKey::AudioTag => tag_rank(stream, |f| &f.audio_tags),
        SortKey::AudioChannel => tag_rank(stream, |f| &f.audio_channels),
        SortKey::Encode => bool_rank(
            stream
                .parsed_file
                .as_ref()
                .is_some_and(|f| f.encode.is_some()),
        ),
        SortKey::Language => tag_rank(stream, |f| &f.languages),
        SortKey::Size => stream.size.or(stream.folder_size).unwrap_or(0) as f64,
        SortKey::Seadex => stream.seadex.map_or(0.0, |tag| {
            if tag.is_best {
                2.0
            } else if tag.is_seadex {
                1.0
            } else {
                0.0
            }
        }),
        SortKey::Keyword => bool_rank(stream.keyword_matched == Some(true)),
        SortKey::StreamExpression => stream
            .stream_expression_matched
            .map_or(0.0, claim_rank),
        SortKey::StreamExpressionScore => stream.stream_expression_score.unwrap_or(0.0),
    }
}

const fn bool_rank(value: bool) -> f64 {
    if value { 1.0 } else { 0.0 }
}

/// First-claim annotations rank by index: lower index, higher rank. Any
/// claim beats no claim.
#[allow(clippy::cast_precision_loss)]
fn claim_rank(index: usize) -> f64 {
    1_000_000.0 - index as f64
}

#[allow(clippy::cast_precision_loss)]
fn tag_rank(stream: &ParsedStream, select: impl Fn(&crate::models::ParsedFile) -> &Vec<String>) -> f64 {
    stream
        .parsed_file
        .as_ref()
        .map_or(0.0, |f| select(f).len() as f64)
}

#[allow(clippy::cast_precision_loss)]
fn resolution_rank(resolution: Option<&str>, user: &UserData) -> f64 {
    let Some(resolution) = resolution else {
        return 0.0;
    };
    let order: Vec<&str> = if user.preferred_resolutions.is_empty() {
        RESOLUTION_ORDER.to_vec()
    } else {
        user.preferred_resolutions
            .iter()
            .map(String::as_str)
            .collect()
    };
    order
        .iter()
        .position(|r| r.eq_ignore_ascii_case(resolution))
        .map_or(0.0, |position| (order.len() - position) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::{SortCriteria, SortCriterion};
    use crate::models::{ParsedFile, ServiceInfo};

    fn stream(id: &str, resolution: Option<&str>, cached: bool, size: Option<u64>) -> ParsedStream {
        ParsedStream {
            id: id.to_string(),
            parsed_file: resolution.map(|r| ParsedFile {
                resolution: Some(r.to_string()),
                ..ParsedFile::default()
            }),
            service: cached.then(|| ServiceInfo {
                id: "rd".into(),
                short_name: "RD".into(),
                cached: true,
            }),
            size,
            ..ParsedStream::default()
        }
    }

    fn user_with(criteria: Vec<SortCriterion>) -> UserData {
        UserData {
            sort_criteria: SortCriteria { global: criteria },
            ..UserData::default()
        }
    }

    #[test]
    fn cached_beats_uncached_then_resolution_breaks_ties() {
        let user = user_with(vec![
            SortCriterion {
                key: SortKey::Cached,
                direction: SortDirection::Desc,
            },
            SortCriterion {
                key: SortKey::Resolution,
                direction: SortDirection::Desc,
            },
        ]);
        let mut streams = vec![
            stream("u-2160", Some("2160p"), false, None),
            stream("c-720", Some("720p"), true, None),
            stream("c-1080", Some("1080p"), true, None),
        ];
        sort_streams(&mut streams, &user);
        let ids: Vec<_> = streams.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["c-1080", "c-720", "u-2160"]);
    }

    #[test]
    fn unknown_resolution_ranks_last() {
        let user = user_with(vec![SortCriterion {
            key: SortKey::Resolution,
            direction: SortDirection::Desc,
        }]);
        let mut streams = vec![
            stream("none", None, false, None),
            stream("480", Some("480p"), false, None),
        ];
        sort_streams(&mut streams, &user);
        assert_eq!(streams[0].id, "480");
    }

    #[test]
    fn preferred_resolutions_override_canonical_order() {
        let mut user = user_with(vec![SortCriterion {
            key: SortKey::Resolution,
            direction: SortDirection::Desc,
        }]);
        user.preferred_resolutions = vec!["1080p".into(), "2160p".into()];
        let mut streams = vec![
            stream("uhd", Some("2160p"), false, None),
            stream("fhd", Some("1080p"), false, None),
        ];
        sort_streams(&mut streams, &user);
        assert_eq!(streams[0].id, "fhd");
    }

    #[test]
    fn sort_is_stable_for_full_ties() {
        let user = user_with(vec![SortCriterion {
            key: SortKey::Cached,
            direction: SortDirection::Desc,
        }]);
        let mut streams = vec![
            stream("first", Some("1080p"), true, Some(1)),
            stream("second", Some("720p"), true, Some(2)),
            stream("third", Some("480p"), true, Some(3)),
        ];
        sort_streams(&mut streams, &user);
        let ids: Vec<_> = streams.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second", "third"]);
    }

    #[test]
    fn regex_claims_rank_by_index_on_desc() {
        let user = user_with(vec![SortCriterion {
            key: SortKey::RegexPatterns,
            direction: SortDirection::Desc,
        }]);
        let mut early = stream("early", None, false, None);
        early.regex_matched = Some(crate::models::stream::RegexMatch {
            name: "a".into(),
            pattern: "a".into(),
            index: 0,
        });
        let mut late = stream("late", None, false, None);
        late.regex_matched = Some(crate::models::stream::RegexMatch {
            name: "b".into(),
            pattern: "b".into(),
            index: 3,
        });
        let unmatched = stream("unmatched", None, false, None);

        let mut streams = vec![unmatched, late, early];
        sort_streams(&mut streams, &user);
        let ids: Vec<_> = streams.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["early", "late", "unmatched"]);
    }

    #[test]
    fn asc_direction_reverses() {
        let user = user_with(vec![SortCriterion {
            key: SortKey::Size,
            direction: SortDirection::Asc,
        }]);
        let mut streams = vec![
            stream("big", None, false, Some(2_000)),
            stream("small", None, false, Some(1_000)),
        ];
        sort_streams(&mut streams, &user);
        assert_eq!(streams[0].id, "small");
    }
}
