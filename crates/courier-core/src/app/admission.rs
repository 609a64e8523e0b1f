//! Admission - リポジトリパスの許可リスト
//!
//! 判定は文字列の前方一致ではなくパスのコンポーネント単位で行う
//! （`/srv/repos` は `/srv/repos-evil` を許可しない）。

use std::path::{Component, Path, PathBuf};

use crate::domain::{AdmissionError, ConfigError};

/// Allowed repository roots. Empty means nothing is allowed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowedRoots {
    roots: Vec<PathBuf>,
}

impl AllowedRoots {
    pub fn new<I, P>(roots: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut out = Vec::new();
        for root in roots {
            let root = root.into();
            if !root.is_absolute() {
                return Err(ConfigError::Invalid {
                    name: "ALLOWED_ROOTS",
                    expected: "a list of absolute paths",
                    value: root.display().to_string(),
                });
            }
            out.push(root);
        }
        Ok(Self { roots: out })
    }

    /// Parse a comma-separated list, ignoring blank entries.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        Self::new(raw.split(',').map(str::trim).filter(|r| !r.is_empty()))
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Fails closed: the path must be absolute, free of `..`, and inside one
    /// of the roots.
    pub fn check(&self, repo_path: &str) -> Result<PathBuf, AdmissionError> {
        if self.roots.is_empty() {
            return Err(AdmissionError::NoRoots);
        }
        let path = Path::new(repo_path);
        if !path.is_absolute() {
            return Err(AdmissionError::NotAbsolute(repo_path.to_string()));
        }
        if path.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(AdmissionError::ParentTraversal(repo_path.to_string()));
        }
        if self.roots.iter().any(|root| path.starts_with(root)) {
            Ok(path.to_path_buf())
        } else {
            Err(AdmissionError::OutsideRoots(repo_path.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn roots() -> AllowedRoots {
        AllowedRoots::parse("/srv/repos, /home/dev/work/").unwrap()
    }

    #[rstest]
    #[case::root_itself("/srv/repos")]
    #[case::nested("/srv/repos/app")]
    #[case::deep("/home/dev/work/a/b/c")]
    #[case::trailing_slash("/srv/repos/app/")]
    fn paths_inside_a_root_are_admitted(#[case] path: &str) {
        assert!(roots().check(path).is_ok());
    }

    #[rstest]
    #[case::etc("/etc", AdmissionError::OutsideRoots("/etc".into()))]
    #[case::sibling_prefix(
        "/srv/repos-evil",
        AdmissionError::OutsideRoots("/srv/repos-evil".into())
    )]
    #[case::relative("srv/repos/app", AdmissionError::NotAbsolute("srv/repos/app".into()))]
    #[case::traversal(
        "/srv/repos/../../etc",
        AdmissionError::ParentTraversal("/srv/repos/../../etc".into())
    )]
    fn paths_outside_are_rejected(#[case] path: &str, #[case] expected: AdmissionError) {
        assert_eq!(roots().check(path), Err(expected));
    }

    #[test]
    fn no_roots_denies_everything() {
        let roots = AllowedRoots::parse(" , ").unwrap();
        assert!(roots.is_empty());
        assert_eq!(roots.check("/srv/repos"), Err(AdmissionError::NoRoots));
    }

    #[test]
    fn relative_roots_are_a_config_error() {
        assert!(matches!(
            AllowedRoots::parse("/ok,relative/root"),
            Err(ConfigError::Invalid { name: "ALLOWED_ROOTS", .. })
        ));
    }

    #[test]
    fn every_rejection_mentions_not_allowed() {
        for path in ["/etc", "x", "/srv/repos/.."] {
            let err = roots().check(path).unwrap_err();
            assert!(err.to_string().starts_with("Repository path not allowed"));
        }
    }
}
