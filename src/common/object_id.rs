//! Object identifier type.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::common::{Error, Result};

/// Stable identity of a persisted object (a data block or a vector index).
///
/// The id doubles as the object's file name inside the data directory, so it
/// must be a single non-empty path component.
///
/// # Example
/// ```
/// use vectorpool::ObjectId;
///
/// let id = ObjectId::new("idx1");
/// assert_eq!(id.as_str(), "idx1");
/// assert!(id.validate().is_ok());
/// assert!(ObjectId::new("../escape").validate().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(Arc<str>);

impl ObjectId {
    /// Create a new ObjectId.
    pub fn new(id: impl AsRef<str>) -> Self {
        ObjectId(Arc::from(id.as_ref()))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check that the id is usable as a file name.
    pub fn validate(&self) -> Result<()> {
        let s = self.as_str();
        let bad = s.is_empty()
            || s == "."
            || s == ".."
            || s.contains(|c: char| matches!(c, '/' | '\\' | '\0'));
        if bad {
            return Err(Error::InvalidObjectId(s.to_string()));
        }
        Ok(())
    }

    /// Path of this object's file inside `data_dir`.
    pub fn file_path(&self, data_dir: &Path) -> PathBuf {
        data_dir.join(self.as_str())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectId {
    fn from(s: &str) -> Self {
        ObjectId::new(s)
    }
}

impl From<String> for ObjectId {
    fn from(s: String) -> Self {
        ObjectId::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_id_equality() {
        assert_eq!(ObjectId::new("a"), ObjectId::from("a"));
        assert_ne!(ObjectId::new("a"), ObjectId::new("b"));
    }

    #[test]
    fn test_object_id_display() {
        assert_eq!(format!("{}", ObjectId::new("seg_3.blk")), "seg_3.blk");
    }

    #[test]
    fn test_validate() {
        assert!(ObjectId::new("seg_3.blk").validate().is_ok());
        assert!(ObjectId::new("").validate().is_err());
        assert!(ObjectId::new("..").validate().is_err());
        assert!(ObjectId::new("a/b").validate().is_err());
        assert!(ObjectId::new("a\\b").validate().is_err());
    }

    #[test]
    fn test_file_path() {
        let id = ObjectId::new("idx1");
        assert_eq!(id.file_path(Path::new("/data")), PathBuf::from("/data/idx1"));
    }
}
