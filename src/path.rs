//! Namespace-scoped path arguments (C6).
//!
//! Grounded on `dllexports::data_mgmt::PathSequence`, a `Vec<PathBuf>`-backed path abstraction;
//! generalized here to carry which namespace a path addresses, since every public operation
//! accepts up to four mutually-independent paths for the same payload.

use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Namespace {
    Iso9660,
    RockRidge,
    Joliet,
    Udf,
}

/// Splits an absolute, `/`-rooted path into its non-empty components.
///
/// Rejects relative paths, `.`/`..` components, and empty components (doubled slashes), matching
/// the "every path argument is absolute; intermediate directories must exist" contract.
pub fn split_absolute_path(path: &str) -> Result<Vec<String>> {
    if !path.starts_with('/') {
        return Err(Error::invalid_input(format!("path '{}' is not absolute", path)));
    }
    if path == "/" {
        return Ok(Vec::new());
    }
    let mut components = Vec::new();
    for part in path.split('/').skip(1) {
        if part.is_empty() {
            return Err(Error::invalid_input(format!("path '{}' contains an empty component", path)));
        }
        if part == "." || part == ".." {
            return Err(Error::invalid_input(format!(
                "path '{}' contains the reserved component '{}'", path, part,
            )));
        }
        components.push(part.to_string());
    }
    Ok(components)
}

/// Joins components back into an absolute path string.
pub fn join_absolute_path(components: &[String]) -> String {
    if components.is_empty() {
        return "/".to_string();
    }
    let mut out = String::new();
    for component in components {
        out.push('/');
        out.push_str(component);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_nested_path() {
        assert_eq!(split_absolute_path("/a/b/c").unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn root_splits_to_empty() {
        assert_eq!(split_absolute_path("/").unwrap(), Vec::<String>::new());
    }

    #[test]
    fn rejects_relative_path() {
        assert!(split_absolute_path("a/b").unwrap_err().is_invalid_input());
    }

    #[test]
    fn rejects_dot_dot() {
        assert!(split_absolute_path("/a/../b").unwrap_err().is_invalid_input());
    }

    #[test]
    fn join_round_trips_split() {
        let components = split_absolute_path("/a/b/c").unwrap();
        assert_eq!(join_absolute_path(&components), "/a/b/c");
    }
}
