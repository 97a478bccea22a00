//! Hierarchical identifiers in the render-cache namespace.
//!
//! A [`ScenePath`] is an absolute, `/`-separated prim path such as
//! `/SceneLink/pCube1/pCubeShape1`. Property paths append a single
//! `.name` suffix to a prim path (`/SceneLink/pCube1/pCubeShape1.instancer`)
//! and are used for synthetic entities derived from a prim.

use std::fmt;

use thiserror::Error;

/// Errors produced when parsing a [`ScenePath`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// The input was empty.
    #[error("empty path")]
    Empty,
    /// The input did not start with `/`.
    #[error("path must be absolute: {0}")]
    Relative(String),
    /// The input contained `.` or `..` segments.
    #[error("relative segments not allowed: {0}")]
    Traversal(String),
    /// A segment contained characters outside `[A-Za-z0-9_]`.
    #[error("invalid segment {segment:?} in {path}")]
    InvalidSegment { path: String, segment: String },
}

/// An absolute prim or property path.
///
/// The empty path is a valid value and is used as "no path" (for example
/// the instancer id of a non-instanced prim).
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScenePath(String);

impl ScenePath {
    /// The absolute root path `/`.
    pub fn root() -> Self {
        Self("/".to_owned())
    }

    /// The empty path.
    pub fn empty() -> Self {
        Self(String::new())
    }

    /// Parse and normalize an absolute path.
    ///
    /// - Collapses redundant separators (`/a//b` → `/a/b`)
    /// - Strips a trailing slash
    /// - Rejects `.` and `..` segments
    /// - Rejects segments with characters other than ASCII alphanumerics
    ///   and `_`; the last segment may carry one `.property` suffix
    pub fn new(path: &str) -> Result<Self, PathError> {
        if path.is_empty() {
            return Err(PathError::Empty);
        }
        if !path.starts_with('/') {
            return Err(PathError::Relative(path.to_owned()));
        }

        let raw: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut out = String::with_capacity(path.len());
        for (i, segment) in raw.iter().enumerate() {
            if *segment == "." || *segment == ".." {
                return Err(PathError::Traversal(path.to_owned()));
            }
            let is_last = i + 1 == raw.len();
            let (prim, property) = match segment.split_once('.') {
                Some((prim, property)) if is_last => (prim, Some(property)),
                _ => (*segment, None),
            };
            let valid = is_identifier(prim) && property.is_none_or(is_identifier);
            if !valid {
                return Err(PathError::InvalidSegment {
                    path: path.to_owned(),
                    segment: (*segment).to_owned(),
                });
            }
            out.push('/');
            out.push_str(segment);
        }

        if out.is_empty() {
            return Ok(Self::root());
        }
        Ok(Self(out))
    }

    /// Returns the path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` for the empty path.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns `true` for `/`.
    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Returns `true` if this path carries a `.property` suffix.
    pub fn is_property_path(&self) -> bool {
        self.last_segment().contains('.')
    }

    /// Appends a child prim, sanitizing the name.
    ///
    /// Scene-graph node names may contain namespace separators and other
    /// punctuation; every character outside `[A-Za-z0-9_]` becomes `_`,
    /// and a leading digit is prefixed with `_`.
    pub fn append_child(&self, name: &str) -> Self {
        let mut sanitized = sanitize_identifier(name);
        if sanitized.is_empty() {
            sanitized.push('_');
        }
        let prim = self.prim_path();
        if prim.is_root() || prim.is_empty() {
            Self(format!("/{sanitized}"))
        } else {
            Self(format!("{}/{sanitized}", prim.0))
        }
    }

    /// Appends a `.property` suffix to the prim portion of this path.
    pub fn append_property(&self, property: &str) -> Self {
        let prim = self.prim_path();
        Self(format!("{}.{}", prim.0, sanitize_identifier(property)))
    }

    /// Strips a `.property` suffix, if any.
    pub fn prim_path(&self) -> Self {
        if !self.is_property_path() {
            return self.clone();
        }
        match self.0.rfind('.') {
            Some(dot) => Self(self.0[..dot].to_owned()),
            None => self.clone(),
        }
    }

    /// Returns the property name of a property path.
    pub fn property_name(&self) -> Option<&str> {
        if !self.is_property_path() {
            return None;
        }
        self.0.rfind('.').map(|dot| &self.0[dot + 1..])
    }

    /// Returns the final prim name (without property suffix).
    pub fn name(&self) -> &str {
        let last = self.last_segment();
        last.split('.').next().unwrap_or(last)
    }

    /// Returns the parent prim path. The parent of a property path is its
    /// prim; the parent of `/` and of the empty path is the empty path.
    pub fn parent(&self) -> Self {
        if self.is_empty() || self.is_root() {
            return Self::empty();
        }
        if self.is_property_path() {
            return self.prim_path();
        }
        match self.0.rfind('/') {
            Some(0) => Self::root(),
            Some(pos) => Self(self.0[..pos].to_owned()),
            None => Self::empty(),
        }
    }

    /// Returns `true` if `self` equals `prefix` or lies beneath it.
    pub fn has_prefix(&self, prefix: &ScenePath) -> bool {
        if prefix.is_root() {
            return self.0.starts_with('/');
        }
        match self.0.strip_prefix(&prefix.0) {
            Some(rest) => rest.is_empty() || rest.starts_with('/') || rest.starts_with('.'),
            None => false,
        }
    }

    fn last_segment(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or("")
    }
}

impl fmt::Display for ScenePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ScenePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScenePath({:?})", self.0)
    }
}

impl AsRef<str> for ScenePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn sanitize_identifier(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple() {
        let p = ScenePath::new("/SceneLink/pCube1").unwrap();
        assert_eq!(p.as_str(), "/SceneLink/pCube1");
        assert_eq!(p.name(), "pCube1");
    }

    #[test]
    fn parse_collapses_separators() {
        let p = ScenePath::new("//SceneLink///pCube1/").unwrap();
        assert_eq!(p.as_str(), "/SceneLink/pCube1");
    }

    #[test]
    fn parse_root() {
        assert!(ScenePath::new("/").unwrap().is_root());
        assert!(ScenePath::new("///").unwrap().is_root());
    }

    #[test]
    fn reject_relative_and_traversal() {
        assert_eq!(ScenePath::new(""), Err(PathError::Empty));
        assert!(matches!(
            ScenePath::new("a/b"),
            Err(PathError::Relative(_))
        ));
        assert!(matches!(
            ScenePath::new("/a/../b"),
            Err(PathError::Traversal(_))
        ));
    }

    #[test]
    fn reject_property_in_middle_segment() {
        assert!(matches!(
            ScenePath::new("/a.b/c"),
            Err(PathError::InvalidSegment { .. })
        ));
    }

    #[test]
    fn append_child_sanitizes() {
        let root = ScenePath::new("/SceneLink").unwrap();
        let child = root.append_child("ns:pCube|1");
        assert_eq!(child.as_str(), "/SceneLink/ns_pCube_1");
        assert_eq!(root.append_child("1abc").name(), "_1abc");
        assert_eq!(ScenePath::root().append_child("a").as_str(), "/a");
    }

    #[test]
    fn property_round_trip() {
        let prim = ScenePath::new("/SceneLink/shape").unwrap();
        let instancer = prim.append_property("instancer");
        assert_eq!(instancer.as_str(), "/SceneLink/shape.instancer");
        assert!(instancer.is_property_path());
        assert_eq!(instancer.property_name(), Some("instancer"));
        assert_eq!(instancer.prim_path(), prim);
        assert_eq!(instancer.parent(), prim);
        assert_eq!(instancer.name(), "shape");
        assert_eq!(ScenePath::new(instancer.as_str()).unwrap(), instancer);
    }

    #[test]
    fn parent_chain() {
        let p = ScenePath::new("/a/b").unwrap();
        assert_eq!(p.parent().as_str(), "/a");
        assert!(p.parent().parent().is_root());
        assert!(ScenePath::root().parent().is_empty());
        assert!(ScenePath::empty().parent().is_empty());
    }

    #[test]
    fn prefix_matching() {
        let a = ScenePath::new("/a").unwrap();
        let ab = ScenePath::new("/a/b").unwrap();
        let abc = ScenePath::new("/abc").unwrap();
        assert!(ab.has_prefix(&a));
        assert!(a.has_prefix(&a));
        assert!(!abc.has_prefix(&a));
        assert!(ab.append_property("x").has_prefix(&ab));
        assert!(ab.has_prefix(&ScenePath::root()));
    }
}
