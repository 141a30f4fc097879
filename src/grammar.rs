//! URL path grammar.
//!
//! A gateway path always starts with `/{endpoint}/{region}` and may continue
//! with `/{bucket}` and then an object key or key prefix:
//!
//! | Shape         | Path                                        |
//! |---------------|---------------------------------------------|
//! | Service       | `/{endpoint}/{region}[/]`                   |
//! | Bucket        | `/{endpoint}/{region}/{bucket}[/]`          |
//! | Object        | `/{endpoint}/{region}/{bucket}/{key}`       |
//! | Object prefix | `/{endpoint}/{region}/{bucket}/{prefix}/`   |
//!
//! The shapes are tried in that order and are mutually exclusive: an object
//! tail never ends with `/`, a prefix tail always does. The compiled patterns
//! live in a process-wide [`LazyLock`] and are read-only once built.

use percent_encoding::percent_decode_str;
use regex::{Captures, Regex};
use std::sync::LazyLock;

/// A single DNS-name character: lowercase letter, digit, `.` or `-`.
const DNS_CHAR: &str = "[a-z0-9.-]";

/// Endpoint host with an optional scheme marker and port.
const ENDPOINT: &str = "(?:https?://)?[a-z0-9.-]+(?::[0-9]+)?";

const ENDPOINT_GROUP: &str = "endpoint";
const REGION_GROUP: &str = "region";
const BUCKET_GROUP: &str = "bucket";
const OBJECT_GROUP: &str = "object";
const PREFIX_GROUP: &str = "prefix";

static GRAMMAR: LazyLock<PathGrammar> = LazyLock::new(PathGrammar::compile);

/// The resource level a path addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Service,
    Bucket,
    Object,
    ObjectPrefix,
}

impl Level {
    /// Label used in logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Service => "service",
            Level::Bucket => "bucket",
            Level::Object => "object",
            Level::ObjectPrefix => "object_prefix",
        }
    }

    /// Route template with every user-supplied segment replaced by a placeholder.
    pub fn route_template(self) -> &'static str {
        match self {
            Level::Service => "/{endpoint}/{region}",
            Level::Bucket => "/{endpoint}/{region}/{bucket}",
            Level::Object => "/{endpoint}/{region}/{bucket}/{key}",
            Level::ObjectPrefix => "/{endpoint}/{region}/{bucket}/{prefix}/",
        }
    }
}

/// Result of classifying a path against the grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathMatch {
    Service {
        endpoint: String,
        region: String,
    },
    Bucket {
        endpoint: String,
        region: String,
        bucket: String,
    },
    Object {
        endpoint: String,
        region: String,
        bucket: String,
        object: String,
    },
    ObjectPrefix {
        endpoint: String,
        region: String,
        bucket: String,
        prefix: String,
    },
}

impl PathMatch {
    pub fn level(&self) -> Level {
        match self {
            PathMatch::Service { .. } => Level::Service,
            PathMatch::Bucket { .. } => Level::Bucket,
            PathMatch::Object { .. } => Level::Object,
            PathMatch::ObjectPrefix { .. } => Level::ObjectPrefix,
        }
    }

    pub fn endpoint(&self) -> &str {
        match self {
            PathMatch::Service { endpoint, .. }
            | PathMatch::Bucket { endpoint, .. }
            | PathMatch::Object { endpoint, .. }
            | PathMatch::ObjectPrefix { endpoint, .. } => endpoint,
        }
    }

    pub fn region(&self) -> &str {
        match self {
            PathMatch::Service { region, .. }
            | PathMatch::Bucket { region, .. }
            | PathMatch::Object { region, .. }
            | PathMatch::ObjectPrefix { region, .. } => region,
        }
    }
}

/// The four compiled path matchers.
#[derive(Debug)]
pub struct PathGrammar {
    service: Regex,
    bucket: Regex,
    object: Regex,
    object_prefix: Regex,
}

impl PathGrammar {
    fn compile() -> Self {
        let service = format!("/(?P<{ENDPOINT_GROUP}>{ENDPOINT})/(?P<{REGION_GROUP}>{DNS_CHAR}+)");
        let bucket = format!("{service}/(?P<{BUCKET_GROUP}>{DNS_CHAR}{{3,63}})");
        let object = format!("{bucket}/(?P<{OBJECT_GROUP}>(?s:.*)[^/])");
        let object_prefix = format!("{bucket}/(?P<{PREFIX_GROUP}>(?s:.*)/)");

        Self {
            service: exact(&format!("{service}/?")),
            bucket: exact(&format!("{bucket}/?")),
            object: exact(&object),
            object_prefix: exact(&object_prefix),
        }
    }

    /// Classify `path`, trying each shape in precedence order.
    ///
    /// Returns `None` when no shape applies; callers must treat that as
    /// "not found" rather than defaulting to any shape.
    pub fn classify(&self, path: &str) -> Option<PathMatch> {
        self.match_service(path)
            .or_else(|| self.match_bucket(path))
            .or_else(|| self.match_object(path))
            .or_else(|| self.match_object_prefix(path))
    }

    pub fn match_service(&self, path: &str) -> Option<PathMatch> {
        let caps = self.service.captures(path)?;
        Some(PathMatch::Service {
            endpoint: group(&caps, ENDPOINT_GROUP),
            region: group(&caps, REGION_GROUP),
        })
    }

    pub fn match_bucket(&self, path: &str) -> Option<PathMatch> {
        let caps = self.bucket.captures(path)?;
        Some(PathMatch::Bucket {
            endpoint: group(&caps, ENDPOINT_GROUP),
            region: group(&caps, REGION_GROUP),
            bucket: group(&caps, BUCKET_GROUP),
        })
    }

    pub fn match_object(&self, path: &str) -> Option<PathMatch> {
        let caps = self.object.captures(path)?;
        Some(PathMatch::Object {
            endpoint: group(&caps, ENDPOINT_GROUP),
            region: group(&caps, REGION_GROUP),
            bucket: group(&caps, BUCKET_GROUP),
            object: group(&caps, OBJECT_GROUP),
        })
    }

    pub fn match_object_prefix(&self, path: &str) -> Option<PathMatch> {
        let caps = self.object_prefix.captures(path)?;
        Some(PathMatch::ObjectPrefix {
            endpoint: group(&caps, ENDPOINT_GROUP),
            region: group(&caps, REGION_GROUP),
            bucket: group(&caps, BUCKET_GROUP),
            prefix: group(&caps, PREFIX_GROUP),
        })
    }
}

/// The process-wide grammar. Built on first use.
pub fn grammar() -> &'static PathGrammar {
    &GRAMMAR
}

/// Classify `path` against the process-wide grammar.
pub fn classify(path: &str) -> Option<PathMatch> {
    grammar().classify(path)
}

/// Percent-decode a raw request path, then classify it.
///
/// Escapes that do not decode to UTF-8 match nothing; they are never
/// replaced, so a request cannot silently address a different key.
pub fn classify_request_path(raw: &str) -> Option<PathMatch> {
    let decoded = percent_decode_str(raw).decode_utf8().ok()?;
    classify(&decoded)
}

fn exact(pattern: &str) -> Regex {
    Regex::new(&format!("^{pattern}$")).expect("path grammar pattern must compile")
}

fn group(caps: &Captures<'_>, name: &str) -> String {
    caps.name(name)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

// -- Tests -------------------------------------------------------------------
