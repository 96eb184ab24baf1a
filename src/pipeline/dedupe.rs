//! Deduplication.
//!
//! Streams are grouped by a composite key built from the configured key
//! parts, each group is partitioned by acquisition class (cached service
//! hit, uncached service, P2P), and each class keeps survivors per its
//! configured mode. Cross-class drops between cached and uncached copies
//! follow the multi-group behaviour. Runs after sorting, so "best" means
//! "first in the current order".

use crate::models::user::{DedupeKey, DedupeMode, MultiGroupBehaviour};
use crate::models::{ParsedStream, StreamType, UserData};
use std::collections::{HashMap, HashSet};

pub fn deduplicate(streams: Vec<ParsedStream>, user: &UserData) -> Vec<ParsedStream> {
    let config = &user.deduplicator;
    if !config.enabled || config.keys.is_empty() {
        return streams;
    }

    let mut groups: HashMap<String, Vec<usize>> = HashMap::new();
    for (position, stream) in streams.iter().enumerate() {
        if let Some(key) = composite_key(stream, &config.keys) {
            groups.entry(key).or_default().push(position);
        }
    }

    let mut dropped: HashSet<usize> = HashSet::new();
    for members in groups.values() {
        if members.len() < 2 {
            continue;
        }
        dedupe_group(&streams, members, config, &mut dropped);
    }

    streams
        .into_iter()
        .enumerate()
        .filter_map(|(position, stream)| (!dropped.contains(&position)).then_some(stream))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AcquisitionClass {
    Cached,
    Uncached,
    P2p,
    Other,
}

fn classify(stream: &ParsedStream) -> AcquisitionClass {
    match &stream.service {
        Some(service) if service.cached => AcquisitionClass::Cached,
        Some(_) => AcquisitionClass::Uncached,
        None if stream.stream_type == StreamType::P2p => AcquisitionClass::P2p,
        None => AcquisitionClass::Other,
    }
}

fn dedupe_group(
    streams: &[ParsedStream],
    members: &[usize],
    config: &crate::models::user::DeduplicatorConfig,
    dropped: &mut HashSet<usize>,
) {
    let of_class = |class: AcquisitionClass| -> Vec<usize> {
        members
            .iter()
            .copied()
            .filter(|&position| classify(&streams[position]) == class)
            .collect()
    };

    let cached = of_class(AcquisitionClass::Cached);
    let uncached = of_class(AcquisitionClass::Uncached);
    let p2p = of_class(AcquisitionClass::P2p);

    apply_mode(streams, &cached, config.cached, dropped);
    apply_mode(streams, &uncached, config.uncached, dropped);
    apply_mode(streams, &p2p, config.p2p, dropped);

    let surviving_cached: Vec<usize> = cached
        .iter()
        .copied()
        .filter(|position| !dropped.contains(position))
        .collect();
    if surviving_cached.is_empty() {
        return;
    }

    match config.multi_group_behaviour {
        MultiGroupBehaviour::Aggressive => {
            // Any surviving cached copy makes every uncached copy redundant.
            for position in uncached {
                dropped.insert(position);
            }
        }
        MultiGroupBehaviour::Conservative => {
            // Only drop an uncached copy when its own service already has a
            // surviving cached one.
            let cached_services: HashSet<&str> = surviving_cached
                .iter()
                .filter_map(|&position| streams[position].service_id())
                .collect();
            for position in uncached {
                if streams[position]
                    .service_id()
                    .is_some_and(|id| cached_services.contains(id))
                {
                    dropped.insert(position);
                }
            }
        }
        MultiGroupBehaviour::KeepAll => {}
    }
}

/// Applies a class mode to the class members (already in sort order).
fn apply_mode(
    streams: &[ParsedStream],
    members: &[usize],
    mode: DedupeMode,
    dropped: &mut HashSet<usize>,
) {
    match mode {
        DedupeMode::Disabled => {}
        DedupeMode::SingleResult => {
            for &position in members.iter().skip(1) {
                dropped.insert(position);
            }
        }
        DedupeMode::PerService => {
            let mut seen_services: HashSet<Option<&str>> = HashSet::new();
            for &position in members {
                if !seen_services.insert(streams[position].service_id()) {
                    dropped.insert(position);
                }
            }
        }
    }
}

fn composite_key(stream: &ParsedStream, keys: &[DedupeKey]) -> Option<String> {
    let mut parts: Vec<String> = Vec::with_capacity(keys.len());
    for key in keys {
        let part = match key {
            DedupeKey::Filename => stream.filename.as_deref().map(normalize_name),
            DedupeKey::InfoHash => stream.info_hash(),
            DedupeKey::Size => stream.size.or(stream.folder_size).map(|s| s.to_string()),
            DedupeKey::SmartDetect => stream.info_hash().or_else(|| {
                let name = stream.filename.as_deref().map(normalize_name)?;
                let size = stream.size.or(stream.folder_size).unwrap_or(0);
                Some(format!("{name}@{size}"))
            }),
        };
        if let Some(part) = part {
            parts.push(part);
        }
    }
    // A stream exposing none of the configured key parts is exempt.
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("|"))
    }
}

fn normalize_name(raw: &str) -> String {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::DeduplicatorConfig;
    use crate::models::{ServiceInfo, TorrentInfo};

    fn stream(id: &str, hash: &str, service: Option<(&str, bool)>) -> ParsedStream {
        ParsedStream {
            id: id.to_string(),
            stream_type: if service.is_some() {
                StreamType::Debrid
            } else {
                StreamType::P2p
            },
            torrent: Some(TorrentInfo {
                info_hash: Some(hash.to_string()),
                seeders: None,
            }),
            service: service.map(|(service_id, cached)| ServiceInfo {
                id: service_id.to_string(),
                short_name: service_id.to_uppercase(),
                cached,
            }),
            ..ParsedStream::default()
        }
    }

    fn user(config: DeduplicatorConfig) -> UserData {
        UserData {
            deduplicator: config,
            ..UserData::default()
        }
    }

    fn ids(streams: &[ParsedStream]) -> Vec<&str> {
        streams.iter().map(|s| s.id.as_str()).collect()
    }

    #[test]
    fn disabled_deduplicator_keeps_everything() {
        let streams = vec![
            stream("a", "hash1", Some(("rd", true))),
            stream("b", "hash1", Some(("rd", true))),
        ];
        let result = deduplicate(streams, &user(DeduplicatorConfig::default()));
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn conservative_drops_only_same_service_uncached() {
        let config = DeduplicatorConfig {
            enabled: true,
            keys: vec![DedupeKey::InfoHash],
            multi_group_behaviour: MultiGroupBehaviour::Conservative,
            cached: DedupeMode::PerService,
            uncached: DedupeMode::PerService,
            p2p: DedupeMode::PerService,
        };
        let streams = vec![
            stream("cached-x", "hash1", Some(("x", true))),
            stream("uncached-x", "hash1", Some(("x", false))),
            stream("uncached-y", "hash1", Some(("y", false))),
        ];
        let result = deduplicate(streams, &user(config));
        assert_eq!(ids(&result), vec!["cached-x", "uncached-y"]);
    }

    #[test]
    fn aggressive_drops_all_uncached_when_cached_survives() {
        let config = DeduplicatorConfig {
            enabled: true,
            keys: vec![DedupeKey::InfoHash],
            multi_group_behaviour: MultiGroupBehaviour::Aggressive,
            cached: DedupeMode::PerService,
            uncached: DedupeMode::PerService,
            p2p: DedupeMode::PerService,
        };
        let streams = vec![
            stream("cached-x", "hash1", Some(("x", true))),
            stream("uncached-x", "hash1", Some(("x", false))),
            stream("uncached-y", "hash1", Some(("y", false))),
        ];
        let result = deduplicate(streams, &user(config));
        assert_eq!(ids(&result), vec!["cached-x"]);
    }

    #[test]
    fn keep_all_makes_no_cross_class_drops() {
        let config = DeduplicatorConfig {
            enabled: true,
            keys: vec![DedupeKey::InfoHash],
            multi_group_behaviour: MultiGroupBehaviour::KeepAll,
            cached: DedupeMode::PerService,
            uncached: DedupeMode::PerService,
            p2p: DedupeMode::PerService,
        };
        let streams = vec![
            stream("cached-x", "hash1", Some(("x", true))),
            stream("uncached-y", "hash1", Some(("y", false))),
        ];
        let result = deduplicate(streams, &user(config));
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn single_result_keeps_the_best_per_class() {
        let config = DeduplicatorConfig {
            enabled: true,
            keys: vec![DedupeKey::InfoHash],
            multi_group_behaviour: MultiGroupBehaviour::KeepAll,
            cached: DedupeMode::SingleResult,
            uncached: DedupeMode::Disabled,
            p2p: DedupeMode::SingleResult,
        };
        let streams = vec![
            stream("cached-1", "hash1", Some(("x", true))),
            stream("cached-2", "hash1", Some(("y", true))),
            stream("p2p-1", "hash1", None),
            stream("p2p-2", "hash1", None),
        ];
        let result = deduplicate(streams, &user(config));
        assert_eq!(ids(&result), vec!["cached-1", "p2p-1"]);
    }

    #[test]
    fn per_service_keeps_one_per_service() {
        let config = DeduplicatorConfig {
            enabled: true,
            keys: vec![DedupeKey::InfoHash],
            multi_group_behaviour: MultiGroupBehaviour::KeepAll,
            cached: DedupeMode::PerService,
            uncached: DedupeMode::Disabled,
            p2p: DedupeMode::Disabled,
        };
        let streams = vec![
            stream("x-first", "hash1", Some(("x", true))),
            stream("x-second", "hash1", Some(("x", true))),
            stream("y-first", "hash1", Some(("y", true))),
        ];
        let result = deduplicate(streams, &user(config));
        assert_eq!(ids(&result), vec!["x-first", "y-first"]);
    }

    #[test]
    fn different_keys_never_group() {
        let config = DeduplicatorConfig {
            enabled: true,
            keys: vec![DedupeKey::InfoHash],
            multi_group_behaviour: MultiGroupBehaviour::Aggressive,
            cached: DedupeMode::SingleResult,
            uncached: DedupeMode::SingleResult,
            p2p: DedupeMode::SingleResult,
        };
        let streams = vec![
            stream("a", "hash1", Some(("x", true))),
            stream("b", "hash2", Some(("x", true))),
        ];
        let result = deduplicate(streams, &user(config));
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn smart_detect_falls_back_to_name_and_size() {
        let mut a = ParsedStream {
            id: "a".into(),
            filename: Some("[Group] Show - 01.mkv".into()),
            size: Some(1000),
            ..ParsedStream::default()
        };
        a.stream_type = StreamType::P2p;
        let mut b = a.clone();
        b.id = "b".into();

        let config = DeduplicatorConfig {
            enabled: true,
            keys: vec![DedupeKey::SmartDetect],
            multi_group_behaviour: MultiGroupBehaviour::KeepAll,
            cached: DedupeMode::SingleResult,
            uncached: DedupeMode::SingleResult,
            p2p: DedupeMode::SingleResult,
        };
        let result = deduplicate(vec![a, b], &user(config));
        assert_eq!(ids(&result), vec!["a"]);
    }
}
