//! Remote path model
//!
//! A `RemotePath` is an ordered list of segments below an implicit root. It has
//! two serializations with different escaping rules:
//!
//! - URL-segment form: every segment percent-encoded on its own, used to
//!   address endpoints (`to_url_segments`).
//! - Body-literal form: `/seg1/seg2`, never encoded, used inside JSON request
//!   bodies (`to_body_path`, `parse_body_path`).
//!
//! Segments never contain `/` and are never empty, so both forms decode to the
//! same segment list.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct RemotePath {
    segments: Vec<String>,
}

impl RemotePath {
    pub fn root() -> Self {
        Self::default()
    }

    /// Build a path from raw segments. Empty segments and root markers (`/`)
    /// are dropped; a segment holding a `/` is split at it.
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let segments = segments
            .into_iter()
            .flat_map(|s| {
                s.as_ref()
                    .split('/')
                    .filter(|part| !part.is_empty())
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .collect();
        Self { segments }
    }

    /// Parse a body-literal path. Repeated, leading and trailing slashes are
    /// ignored; an empty string is the root.
    pub fn parse_body_path(s: &str) -> Self {
        Self::from_segments(s.split('/'))
    }

    /// Percent-encoded segments for addressing an endpoint.
    pub fn to_url_segments(&self) -> Vec<String> {
        self.segments
            .iter()
            .map(|s| urlencoding::encode(s).into_owned())
            .collect()
    }

    /// URL-segment form of this path with an optional trailing entry name,
    /// joined with `/`. The root with no name is the empty string.
    pub fn to_url_path(&self, name: Option<&str>) -> String {
        let mut parts = self.to_url_segments();
        if let Some(name) = name.filter(|n| !n.is_empty()) {
            parts.push(urlencoding::encode(name).into_owned());
        }
        parts.join("/")
    }

    /// Body-literal form: `/seg1/seg2[/name]`, unencoded.
    pub fn to_body_path(&self, name: Option<&str>) -> String {
        let mut out = String::from("/");
        out.push_str(&self.segments.join("/"));
        if let Some(name) = name {
            let name = name.trim_matches('/');
            if !name.is_empty() {
                if !out.ends_with('/') {
                    out.push('/');
                }
                out.push_str(name);
            }
        }
        collapse_slashes(&out)
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Number of segments below the root
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    pub fn parent(&self) -> Option<RemotePath> {
        if self.is_root() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Split into (parent, name). `None` for the root.
    pub fn split_last(&self) -> Option<(RemotePath, &str)> {
        let name = self.name()?;
        Some((self.parent().unwrap_or_default(), name))
    }

    pub fn join(&self, name: &str) -> RemotePath {
        self.join_all([name])
    }

    pub fn join_all<I, S>(&self, more: I) -> RemotePath
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut joined = self.clone();
        joined.segments.extend(Self::from_segments(more).segments);
        joined
    }

    /// True when `prefix` is equal to this path or one of its ancestors.
    pub fn starts_with(&self, prefix: &RemotePath) -> bool {
        self.segments.starts_with(&prefix.segments)
    }
}

fn collapse_slashes(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c == '/' && out.ends_with('/') {
            continue;
        }
        out.push(c);
    }
    out
}

impl fmt::Display for RemotePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_body_path(None))
    }
}

impl From<String> for RemotePath {
    fn from(s: String) -> Self {
        Self::parse_body_path(&s)
    }
}

impl From<&str> for RemotePath {
    fn from(s: &str) -> Self {
        Self::parse_body_path(s)
    }
}

impl From<RemotePath> for String {
    fn from(p: RemotePath) -> Self {
        p.to_body_path(None)
    }
}
