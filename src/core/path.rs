//! Path codec.
//!
//! A [`Path`] is a sequence of [`Name`] segments; the empty sequence is the
//! root. Parsing is lenient (empty tokens are dropped) while formatting is
//! strict (always a leading slash, never a trailing or doubled one).

use crate::util::{Error, Name, Result};

/// Location within a scene, relative to the root.
pub type Path = Vec<Name>;

/// String form of the root location.
pub const ROOT: &str = "/";

/// Format a path as `/a/b/c`. The empty path formats as `/`.
pub fn path_to_string(path: &[Name]) -> String {
    if path.is_empty() {
        return ROOT.to_string();
    }
    let len: usize = path.iter().map(|seg| seg.len() + 1).sum();
    let mut out = String::with_capacity(len);
    for seg in path {
        out.push('/');
        out.push_str(seg);
    }
    out
}

/// Parse a slash separated path. Leading, trailing and repeated slashes
/// are tolerated.
pub fn string_to_path(s: &str) -> Path {
    s.split('/').filter(|tok| !tok.is_empty()).map(Name::new).collect()
}

/// Parse an absolute path, rejecting strings without a leading `/` or
/// containing NUL.
pub fn string_to_path_checked(s: &str) -> Result<Path> {
    if !s.starts_with('/') {
        return Err(Error::invalid_arg(format!("path '{s}' is not absolute")));
    }
    if s.contains('\0') {
        return Err(Error::invalid_arg("path contains a NUL character"));
    }
    Ok(string_to_path(s))
}

/// Name reported by the root location.
pub fn root_name() -> Name {
    Name::new(ROOT)
}

/// `true` if `prefix` is an ancestor of `path` or equal to it.
pub fn is_prefix(prefix: &[Name], path: &[Name]) -> bool {
    prefix.len() <= path.len() && prefix.iter().zip(path).all(|(a, b)| a == b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::names;

    #[test]
    fn test_root() {
        assert_eq!(path_to_string(&[]), "/");
        assert!(string_to_path("/").is_empty());
        assert!(string_to_path("").is_empty());
        assert!(string_to_path("///").is_empty());
    }

    #[test]
    fn test_lenient_parse() {
        let p = string_to_path("//a/b//c/");
        assert_eq!(p, names(&["a", "b", "c"]));
        assert_eq!(path_to_string(&p), "/a/b/c");
        assert_eq!(string_to_path("a/b"), names(&["a", "b"]));
    }

    #[test]
    fn test_round_trip() {
        for s in ["/", "/a", "/a/b/c", "/char/geo/body"] {
            assert_eq!(path_to_string(&string_to_path(s)), s);
        }
        let p = names(&["x", "y"]);
        assert_eq!(string_to_path(&path_to_string(&p)), p);
    }

    #[test]
    fn test_checked() {
        assert!(string_to_path_checked("/a/b").is_ok());
        assert!(matches!(
            string_to_path_checked("a/b"),
            Err(Error::InvalidArgument(_))
        ));
        assert!(string_to_path_checked("/a\0b").is_err());
    }

    #[test]
    fn test_is_prefix() {
        let a = names(&["a"]);
        let ab = names(&["a", "b"]);
        assert!(is_prefix(&a, &ab));
        assert!(is_prefix(&ab, &ab));
        assert!(!is_prefix(&ab, &a));
        assert!(is_prefix(&[], &a));
    }
}
