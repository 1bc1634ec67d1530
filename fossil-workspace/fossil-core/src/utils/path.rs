use std::path::{Component, Path, PathBuf};

use crate::error::{FossilError, Result};

/// Check that an entry id is safe to use as a file stem.
pub fn check_id(id: &str) -> Result<&str> {
    if is_valid_id(id) {
        Ok(id)
    } else {
        Err(FossilError::InvalidId(id.to_string()))
    }
}

pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// True when `candidate` sits under `prefix`, compared component-wise after
/// normalizing `./` and separators. Rejects `..` components outright.
pub fn is_under(candidate: &Path, prefix: &Path) -> bool {
    let Some(candidate) = normalize(candidate) else {
        return false;
    };
    let Some(prefix) = normalize(prefix) else {
        return false;
    };
    if prefix.as_os_str().is_empty() {
        return true;
    }
    candidate.starts_with(&prefix)
}

fn normalize(p: &Path) -> Option<PathBuf> {
    let text = p.to_string_lossy().replace('\\', "/");
    let mut out = PathBuf::new();
    for c in Path::new(&text).components() {
        match c {
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
            Component::ParentDir => return None,
            Component::Normal(s) => out.push(s),
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_restricted_to_file_safe_chars() {
        assert!(is_valid_id("3f1c0e6a-4d2b-4b43-9a8e-0b1f2a3c4d5e"));
        assert!(is_valid_id("fossil_01"));
        assert!(!is_valid_id(""));
        assert!(!is_valid_id("../etc/passwd"));
        assert!(!is_valid_id("a/b"));
        assert!(check_id("a.json").is_err());
    }

    #[test]
    fn prefix_matching_is_component_wise() {
        let prefix = Path::new(".fossils");
        assert!(is_under(Path::new(".fossils/canonical/test.json"), prefix));
        assert!(is_under(Path::new("./.fossils/entries/a.json"), prefix));
        assert!(!is_under(Path::new(".fossils-old/a.json"), prefix));
        assert!(!is_under(Path::new("src/lib.rs"), prefix));
        assert!(!is_under(Path::new(".fossils/../src/lib.rs"), prefix));
        assert!(is_under(Path::new("docs\\fossils\\x.json"), Path::new("docs/fossils")));
    }
}
