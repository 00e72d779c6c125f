//! Stack trace parsing.
//!
//! Understands V8 frames (`    at fn (file:line:col)`) and Firefox / Safari
//! frames (`fn@file:line:col`). Frames that belong to the runtime or to the
//! test framework itself are dropped.

use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::types::{ErrorWithDiff, ParsedStack};

static V8_FRAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*at .*(?:\S:\d+|\(native\))").unwrap());
static EVAL_AT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\(eval at [^()]*)|(,.*$)").unwrap());
static LEADING_TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^.*?\s+").unwrap());
static PAREN_LOCATION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" (\(.+\)$)").unwrap());
static LOCATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?)(?::(\d+))?(?::(\d+))?$").unwrap());
static SSR_IMPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"__vite_ssr_import_\d+__\.").unwrap());
static FF_EVAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r" line (\d+)(?: > eval line \d+)* > eval:\d+:\d+").unwrap()
});
static FF_FUNCTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"((.*".+"[^@]*)?[^@]*)(@)"#).unwrap());
static NODE_BUILTIN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"node:\w+").unwrap());

/// Path fragments of frames that never point at user code.
pub const DEFAULT_IGNORED_FRAGMENTS: &[&str] = &[
    "node:internal",
    "/vista/dist/",
    "/vista/src/",
    "node_modules/vista",
    "/node_modules/chai/",
    "/node_modules/tinypool/",
    "/node_modules/tinyspy/",
    "/deps/chunk-",
];

/// Turns raw stack text into frames.
pub trait StackParser: Send + Sync {
    /// Parse stack text.
    fn parse_stack(&self, stack: &str) -> Vec<ParsedStack>;

    /// Parse the stack of `error` and store the frames on it.
    ///
    /// An error that already carries frames is returned as is, so each error
    /// is parsed at most once.
    fn parse_error(&self, error: &mut ErrorWithDiff) -> Vec<ParsedStack> {
        if let Some(stacks) = &error.stacks {
            return stacks.clone();
        }
        let stacks = error
            .raw_stack()
            .map(|stack| self.parse_stack(stack))
            .unwrap_or_default();
        error.stacks = Some(stacks.clone());
        stacks
    }
}

/// Maps a generated position back to its original source.
pub trait SourceMapResolver: Send + Sync {
    /// Original position of `frame`, if a source map covers it.
    fn original_position(&self, frame: &ParsedStack) -> Option<ParsedStack>;
}

/// Parser for stacks produced by the native runtime.
#[derive(Clone)]
pub struct NativeStackParser {
    ignored: Vec<String>,
    source_maps: Option<Arc<dyn SourceMapResolver>>,
}

impl NativeStackParser {
    /// Parser with the default ignore list and no source maps.
    pub fn new() -> Self {
        Self {
            ignored: DEFAULT_IGNORED_FRAGMENTS
                .iter()
                .map(|s| (*s).to_owned())
                .collect(),
            source_maps: None,
        }
    }

    /// Resolve frames through `resolver`.
    #[must_use]
    pub fn with_source_maps(mut self, resolver: Arc<dyn SourceMapResolver>) -> Self {
        self.source_maps = Some(resolver);
        self
    }

    /// Drop frames whose file contains `fragment`, too.
    #[must_use]
    pub fn ignore(mut self, fragment: impl Into<String>) -> Self {
        self.ignored.push(fragment.into());
        self
    }

    fn is_ignored(&self, file: &str) -> bool {
        NODE_BUILTIN.is_match(file) || self.ignored.iter().any(|f| file.contains(f.as_str()))
    }
}

impl Default for NativeStackParser {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for NativeStackParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeStackParser")
            .field("ignored", &self.ignored)
            .field("source_maps", &self.source_maps.is_some())
            .finish()
    }
}

impl StackParser for NativeStackParser {
    fn parse_stack(&self, stack: &str) -> Vec<ParsedStack> {
        stack
            .lines()
            .filter_map(parse_frame)
            .filter(|frame| !self.is_ignored(&frame.file))
            .filter_map(|frame| {
                let Some(resolver) = &self.source_maps else {
                    return Some(frame);
                };
                match resolver.original_position(&frame) {
                    Some(original) if self.is_ignored(&original.file) => None,
                    Some(original) => Some(original),
                    None => Some(frame),
                }
            })
            .collect()
    }
}

/// Parse one line of stack text.
pub fn parse_frame(line: &str) -> Option<ParsedStack> {
    if V8_FRAME.is_match(line) {
        parse_v8_frame(line)
    } else {
        parse_firefox_frame(line)
    }
}

fn parse_v8_frame(raw: &str) -> Option<ParsedStack> {
    let mut line = raw.to_owned();
    if line.contains("(eval ") {
        line = line.replace("eval code", "eval");
        line = EVAL_AT.replace_all(&line, "").into_owned();
    }

    let sanitized = line.trim_start().replace("(eval code", "(");
    let mut sanitized = LEADING_TOKEN.replace(&sanitized, "").into_owned();

    let location = PAREN_LOCATION
        .captures(&sanitized)
        .map(|caps| (caps[0].to_owned(), caps[1].to_owned()));
    let target = match &location {
        Some((whole, inner)) => {
            sanitized = sanitized.replacen(whole.as_str(), "", 1);
            inner.clone()
        }
        None => sanitized.clone(),
    };

    let (url, line_no, column) = extract_location(&target);
    let mut method = if location.is_some() { sanitized } else { String::new() };
    if matches!(url.as_str(), "eval" | "<anonymous>") {
        return None;
    }
    let (line_no, column) = (line_no?, column?);

    if let Some(rest) = method.strip_prefix("async ") {
        method = rest.to_owned();
    }
    let method = SSR_IMPORT.replace_all(&method, "").into_owned();

    Some(ParsedStack {
        method,
        file: clean_file(&url),
        line: line_no,
        column,
    })
}

fn parse_firefox_frame(raw: &str) -> Option<ParsedStack> {
    let line = if raw.contains(" > eval") {
        FF_EVAL.replace_all(raw, ":$1").into_owned()
    } else {
        raw.to_owned()
    };
    if !line.contains('@') && !line.contains(':') {
        return None;
    }

    let method = FF_FUNCTION
        .captures(&line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_owned())
        .unwrap_or_default();
    let rest = FF_FUNCTION.replace(&line, "");
    let (url, line_no, column) = extract_location(&rest);
    if url.is_empty() {
        return None;
    }

    Some(ParsedStack {
        method,
        file: clean_file(&url),
        line: line_no?,
        column: column?,
    })
}

/// Split `file:line:col` (optionally parenthesized) into its parts.
fn extract_location(url_like: &str) -> (String, Option<u32>, Option<u32>) {
    if !url_like.contains(':') {
        return (url_like.to_owned(), None, None);
    }
    let trimmed = url_like.strip_prefix('(').unwrap_or(url_like);
    let trimmed = trimmed.strip_suffix(')').unwrap_or(trimmed);
    let Some(caps) = LOCATION.captures(trimmed) else {
        return (url_like.to_owned(), None, None);
    };

    let mut url = caps[1].to_owned();
    if let Some(rest) = url.strip_prefix("async ") {
        url = rest.to_owned();
    }
    if url.starts_with("http:") || url.starts_with("https:") {
        url = url_path(&url);
    }
    if url.starts_with("/@fs/") {
        let windows = url.len() > 7 && url.as_bytes()[6] == b':' && url.as_bytes()[5].is_ascii_alphabetic();
        url = url[if windows { 5 } else { 4 }..].to_owned();
    }

    let number = |i: usize| caps.get(i).and_then(|m| m.as_str().parse().ok());
    (url, number(2), number(3))
}

/// Path component of an absolute URL.
fn url_path(url: &str) -> String {
    let after_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    let path = after_scheme.find('/').map_or("/", |i| &after_scheme[i..]);
    path.split(['?', '#']).next().unwrap_or(path).to_owned()
}

fn clean_file(url: &str) -> String {
    let file = url.strip_prefix("file://").unwrap_or(url);
    file.split('?').next().unwrap_or(file).to_owned()
}
