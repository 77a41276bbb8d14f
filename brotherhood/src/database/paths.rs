//! Document store paths
//!
//! Collections alternate with document ids: `users/{uid}/brothers` is a
//! collection, `users/{uid}/brothers/{id}` a document in it.

use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const USERS: &str = "users";
pub const BROTHERS: &str = "brothers";
pub const GOALS: &str = "goals";
pub const INTERACTIONS: &str = "interactions";
pub const DUA_REQUESTS: &str = "duaRequests";
pub const ANNOUNCEMENTS: &str = "announcements";

fn valid_segment(segment: &str) -> bool {
    !segment.is_empty() && !segment.contains('/')
}

/// Path to a collection (odd number of segments)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CollectionPath(String);

impl CollectionPath {
    pub fn parse(path: &str) -> Result<Self> {
        let segments: Vec<&str> = path.split('/').collect();
        if segments.len() % 2 == 0 || !segments.iter().all(|s| valid_segment(s)) {
            return Err(AppError::Validation(format!(
                "Invalid collection path: {}",
                path
            )));
        }
        Ok(Self(path.to_string()))
    }

    fn user_scoped(uid: &str, name: &str) -> Self {
        Self(format!("{}/{}/{}", USERS, uid, name))
    }

    pub fn brothers(uid: &str) -> Self {
        Self::user_scoped(uid, BROTHERS)
    }

    pub fn goals(uid: &str) -> Self {
        Self::user_scoped(uid, GOALS)
    }

    pub fn interactions(uid: &str) -> Self {
        Self::user_scoped(uid, INTERACTIONS)
    }

    pub fn dua_requests() -> Self {
        Self(DUA_REQUESTS.to_string())
    }

    pub fn announcements() -> Self {
        Self(ANNOUNCEMENTS.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Owning user id for `users/{uid}/...` collections
    pub fn owner(&self) -> Option<&str> {
        let mut segments = self.0.split('/');
        match (segments.next(), segments.next()) {
            (Some(USERS), Some(uid)) => Some(uid),
            _ => None,
        }
    }

    pub fn doc(&self, id: &str) -> DocPath {
        DocPath {
            collection: self.clone(),
            id: id.to_string(),
        }
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CollectionPath {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<CollectionPath> for String {
    fn from(path: CollectionPath) -> Self {
        path.0
    }
}

/// Path to a single document (even number of segments)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocPath {
    pub collection: CollectionPath,
    pub id: String,
}

impl DocPath {
    pub fn parse(path: &str) -> Result<Self> {
        let (collection, id) = path
            .rsplit_once('/')
            .ok_or_else(|| AppError::Validation(format!("Invalid document path: {}", path)))?;

        if !valid_segment(id) {
            return Err(AppError::Validation(format!(
                "Invalid document path: {}",
                path
            )));
        }

        Ok(Self {
            collection: CollectionPath::parse(collection)?,
            id: id.to_string(),
        })
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_scoped_paths() {
        let brothers = CollectionPath::brothers("u1");
        assert_eq!(brothers.as_str(), "users/u1/brothers");
        assert_eq!(brothers.owner(), Some("u1"));
        assert_eq!(brothers.doc("b1").to_string(), "users/u1/brothers/b1");

        assert_eq!(CollectionPath::dua_requests().owner(), None);
    }

    #[test]
    fn test_parse_doc_path() {
        let path = DocPath::parse("users/u1/goals/g1").unwrap();
        assert_eq!(path.collection, CollectionPath::goals("u1"));
        assert_eq!(path.id, "g1");

        let top = DocPath::parse("duaRequests/d1").unwrap();
        assert_eq!(top.collection, CollectionPath::dua_requests());
    }

    #[test]
    fn test_rejects_malformed_paths() {
        assert!(CollectionPath::parse("users/u1").is_err());
        assert!(CollectionPath::parse("users//brothers").is_err());
        assert!(DocPath::parse("users/u1/brothers").is_err());
        assert!(DocPath::parse("brothers").is_err());
    }
}
