//! User expression engine.
//!
//! Expressions are boolean/score formulas over a candidate stream and the
//! request context, e.g. `resolution == '1080p' and cached` or
//! `seadex() or stream.parsedFile.releaseGroup in ['SubsPlease', 'Erai-raws']`.
//! Stream fields are addressed as `stream.<field>` or by bare name (stream
//! shadows context); context fields by bare name. Evaluation is
//! deterministic and side-effect-free; unknown fields read as null.

mod eval;
mod lexer;
mod parser;

pub use eval::Value;

use crate::models::ParsedStream;
use std::collections::BTreeMap;
use thiserror::Error;

/// Compilation failure, carrying the offending expression verbatim.
#[derive(Debug, Error)]
#[error("failed to compile expression `{expression}`: {message}")]
pub struct ExpressionError {
    pub expression: String,
    pub message: String,
}

/// A compiled expression, reusable across streams.
#[derive(Debug, Clone)]
pub struct Expression {
    source: String,
    ast: parser::Ast,
}

impl Expression {
    pub fn compile(source: &str) -> Result<Self, ExpressionError> {
        let tokens = lexer::tokenize(source).map_err(|message| ExpressionError {
            expression: source.to_string(),
            message,
        })?;
        let ast = parser::parse(&tokens).map_err(|message| ExpressionError {
            expression: source.to_string(),
            message,
        })?;
        Ok(Self {
            source: source.to_string(),
            ast,
        })
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluates to a raw value.
    #[must_use]
    pub fn evaluate(&self, scope: &EvalScope<'_>) -> Value {
        eval::evaluate(&self.ast, scope)
    }

    /// Evaluates and collapses to a predicate via truthiness.
    #[must_use]
    pub fn matches(&self, scope: &EvalScope<'_>) -> bool {
        self.evaluate(scope).is_truthy()
    }
}

/// The resolution scope for one stream within one request.
pub struct EvalScope<'a> {
    /// Object projection of the stream under evaluation.
    pub stream: &'a Value,
    /// Flat request-context fields (`title`, `season`, `isAnime`, ...).
    pub context: &'a BTreeMap<String, Value>,
}

impl EvalScope<'_> {
    /// Resolves the first path segment: `stream` names the stream record,
    /// any other bare name tries the stream record first, then context.
    fn root(&self, name: &str) -> Value {
        if name == "stream" {
            return self.stream.clone();
        }
        let from_stream = self.stream.member(name);
        if from_stream != Value::Null {
            return from_stream;
        }
        lookup_ci(self.context, name)
    }
}

fn lookup_ci(map: &BTreeMap<String, Value>, name: &str) -> Value {
    if let Some(v) = map.get(name) {
        return v.clone();
    }
    map.iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map_or(Value::Null, |(_, v)| v.clone())
}

/// Projects a stream into the object the engine evaluates against: its wire
/// shape plus flattened conveniences (`resolution`, `cached`, `infoHash`,
/// `seeders`, ...) so common expressions stay short.
#[must_use]
pub fn stream_record(stream: &ParsedStream) -> Value {
    let mut object = match serde_json::to_value(stream).map(Value::from_json) {
        Ok(Value::Object(map)) => map,
        _ => BTreeMap::new(),
    };

    if let Some(file) = &stream.parsed_file {
        let flat = [
            ("resolution", file.resolution.clone().map(Value::Str)),
            ("quality", file.quality.clone().map(Value::Str)),
            ("encode", file.encode.clone().map(Value::Str)),
            ("releaseGroup", file.release_group.clone().map(Value::Str)),
        ];
        for (name, value) in flat {
            object
                .entry(name.to_string())
                .or_insert(value.unwrap_or(Value::Null));
        }
        object
            .entry("visualTags".to_string())
            .or_insert_with(|| Value::str_list(&file.visual_tags));
        object
            .entry("audioTags".to_string())
            .or_insert_with(|| Value::str_list(&file.audio_tags));
        object
            .entry("audioChannels".to_string())
            .or_insert_with(|| Value::str_list(&file.audio_channels));
        object
            .entry("languages".to_string())
            .or_insert_with(|| Value::str_list(&file.languages));
    }
    if let Some(torrent) = &stream.torrent {
        object
            .entry("infoHash".to_string())
            .or_insert_with(|| torrent.info_hash.as_ref().map_or(Value::Null, |h| Value::Str(h.to_lowercase())));
        object
            .entry("seeders".to_string())
            .or_insert_with(|| torrent.seeders.map_or(Value::Null, |s| Value::Num(f64::from(s))));
    }
    object.insert("cached".to_string(), Value::Bool(stream.is_cached()));

    Value::Object(object)
}

/// Returns the subset of `streams` satisfying the predicate.
#[must_use]
pub fn select<'a>(
    streams: &'a [ParsedStream],
    expression: &Expression,
    context: &BTreeMap<String, Value>,
) -> Vec<&'a ParsedStream> {
    streams
        .iter()
        .filter(|stream| {
            let record = stream_record(stream);
            expression.matches(&EvalScope {
                stream: &record,
                context,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ParsedFile, ServiceInfo, TorrentInfo};

    fn stream(resolution: &str, cached: bool) -> ParsedStream {
        ParsedStream {
            id: format!("{resolution}-{cached}"),
            parsed_file: Some(ParsedFile {
                resolution: Some(resolution.to_string()),
                release_group: Some("SubsPlease".to_string()),
                ..ParsedFile::default()
            }),
            torrent: Some(TorrentInfo {
                info_hash: Some("AABBCC".to_string()),
                seeders: Some(12),
            }),
            service: cached.then(|| ServiceInfo {
                id: "rd".to_string(),
                short_name: "RD".to_string(),
                cached: true,
            }),
            ..ParsedStream::default()
        }
    }

    fn scope_ctx() -> BTreeMap<String, Value> {
        let mut ctx = BTreeMap::new();
        ctx.insert("isAnime".to_string(), Value::Bool(true));
        ctx.insert("season".to_string(), Value::Num(2.0));
        ctx.insert("title".to_string(), Value::Str("Mushoku Tensei".to_string()));
        ctx
    }

    fn eval(source: &str, stream: &ParsedStream) -> Value {
        let record = stream_record(stream);
        let ctx = scope_ctx();
        Expression::compile(source).unwrap().evaluate(&EvalScope {
            stream: &record,
            context: &ctx,
        })
    }

    #[test]
    fn bare_names_prefer_stream_fields() {
        let s = stream("1080p", true);
        assert_eq!(eval("resolution", &s), Value::Str("1080p".to_string()));
        assert_eq!(eval("cached", &s), Value::Bool(true));
    }

    #[test]
    fn context_fields_resolve_by_bare_name() {
        let s = stream("1080p", false);
        assert_eq!(eval("isAnime and season == 2", &s), Value::Bool(true));
    }

    #[test]
    fn dotted_stream_paths_resolve() {
        let s = stream("720p", false);
        assert!(eval("stream.parsedFile.releaseGroup == 'subsplease'", &s).is_truthy());
        assert!(eval("stream.torrent.seeders >= 10", &s).is_truthy());
    }

    #[test]
    fn info_hash_flattens_lowercased() {
        let s = stream("720p", false);
        assert_eq!(eval("infoHash", &s), Value::Str("aabbcc".to_string()));
    }

    #[test]
    fn unknown_fields_are_null_not_errors() {
        let s = stream("720p", false);
        assert_eq!(eval("stream.nope.deeper", &s), Value::Null);
        assert!(!eval("exists(stream.nope)", &s).is_truthy());
    }

    #[test]
    fn select_filters_by_predicate() {
        let streams = vec![stream("2160p", true), stream("1080p", false)];
        let expr = Expression::compile("resolution == '2160p'").unwrap();
        let picked = select(&streams, &expr, &scope_ctx());
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].id, "2160p-true");
    }

    #[test]
    fn compile_error_carries_source() {
        let err = Expression::compile("resolution ==").unwrap_err();
        assert_eq!(err.expression, "resolution ==");
    }
}
