use std::fmt;

/// Template for the default folder: every release gets its own `project/tag/` prefix.
pub const DEFAULT_FOLDER: &str = "{{ ProjectName }}/{{ Tag }}";

/// Remote object key, `folder/name` joined with `/`.
///
/// Building the same key twice always yields the same string, so re-publishing a
/// release overwrites its objects instead of duplicating them.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RemoteKey(String);

impl RemoteKey {
    /// Key for `name` under an already-resolved folder.
    ///
    /// Surrounding slashes on the folder are dropped, so an empty folder places the
    /// object at the bucket root.
    pub fn new(folder: &str, name: &str) -> Self {
        let folder = folder.trim_matches('/');
        if folder.is_empty() {
            Self(name.to_string())
        } else {
            Self(format!("{folder}/{name}"))
        }
    }

    /// Key under the default `project/tag` folder.
    pub fn for_release(project: &str, tag: &str, name: &str) -> Self {
        Self::new(&format!("{project}/{tag}"), name)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemoteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RemoteKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_key_layout() {
        let key = RemoteKey::for_release("testupload", "v1.0.0", "bin.tar.gz");
        assert_eq!(key.as_str(), "testupload/v1.0.0/bin.tar.gz");
    }

    #[test]
    fn folder_key_matches_release_key() {
        assert_eq!(
            RemoteKey::new("testupload/v1.0.0", "bin.deb"),
            RemoteKey::for_release("testupload", "v1.0.0", "bin.deb")
        );
    }

    #[test]
    fn idempotent() {
        let a = RemoteKey::for_release("p", "v2", "checksum.txt");
        let b = RemoteKey::for_release("p", "v2", "checksum.txt");
        assert_eq!(a, b);
    }

    #[test]
    fn release_key_shares_folder_trimming() {
        assert_eq!(
            RemoteKey::for_release("/testupload", "v1.0.0/", "bin.deb").as_str(),
            "testupload/v1.0.0/bin.deb"
        );
    }

    #[test]
    fn surrounding_slashes_are_trimmed() {
        assert_eq!(RemoteKey::new("/releases/v1/", "a.zip").as_str(), "releases/v1/a.zip");
    }

    #[test]
    fn empty_folder_is_bucket_root() {
        assert_eq!(RemoteKey::new("", "a.zip").as_str(), "a.zip");
        assert_eq!(RemoteKey::new("/", "a.zip").as_str(), "a.zip");
    }
}
