//! Storage key construction.
//!
//! Object keys are namespaced by content category and owner so that one
//! user's objects stay grouped under a common prefix. Bulk operations
//! such as provider migration rely on that grouping.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use stratavault_common::{sanitize_file_name, ItemId, Result, UserId};

/// Content category an object belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentCategory {
    Vault,
    Stories,
    Events,
    Profiles,
}

impl ContentCategory {
    /// Key prefix segment for this category.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentCategory::Vault => "vault",
            ContentCategory::Stories => "stories",
            ContentCategory::Events => "events",
            ContentCategory::Profiles => "profiles",
        }
    }
}

/// Build a namespaced object key for a new upload.
///
/// Layout: `{category}/{owner}/[{parent}/]{timestamp}_{sanitized-name}`.
/// The timestamp keeps same-named uploads from colliding.
///
/// # Errors
/// - `InvalidArgument` if the file name cannot be sanitized
pub fn build_object_key(
    category: ContentCategory,
    owner: &UserId,
    parent: Option<&ItemId>,
    file_name: &str,
) -> Result<String> {
    let safe_name = sanitize_file_name(file_name)?;
    let timestamp = Utc::now().timestamp_millis();

    let key = match parent {
        Some(parent) => format!(
            "{}/{}/{}/{}_{}",
            category.as_str(),
            owner,
            parent,
            timestamp,
            safe_name
        ),
        None => format!("{}/{}/{}_{}", category.as_str(), owner, timestamp, safe_name),
    };

    Ok(key)
}

/// Prefix under which all of one user's objects in a category live.
pub fn owner_prefix(category: ContentCategory, owner: &UserId) -> String {
    format!("{}/{}/", category.as_str(), owner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_namespaced_by_owner() {
        let owner = UserId::new("user-1").unwrap();
        let key = build_object_key(ContentCategory::Vault, &owner, None, "photo.jpg").unwrap();

        assert!(key.starts_with("vault/user-1/"));
        assert!(key.ends_with("_photo.jpg"));
    }

    #[test]
    fn test_key_includes_parent_folder() {
        let owner = UserId::new("user-1").unwrap();
        let parent = ItemId::new("folder-9").unwrap();
        let key =
            build_object_key(ContentCategory::Vault, &owner, Some(&parent), "doc.pdf").unwrap();

        assert!(key.starts_with("vault/user-1/folder-9/"));
    }

    #[test]
    fn test_unsafe_names_are_sanitized_into_keys() {
        let owner = UserId::new("user-1").unwrap();
        let key =
            build_object_key(ContentCategory::Profiles, &owner, None, "../../avatar.png").unwrap();

        assert!(!key.contains(".."));
        assert!(key.starts_with("profiles/user-1/"));
    }

    #[test]
    fn test_owner_prefix_covers_keys() {
        let owner = UserId::new("user-1").unwrap();
        let prefix = owner_prefix(ContentCategory::Vault, &owner);
        let key = build_object_key(ContentCategory::Vault, &owner, None, "a.txt").unwrap();

        assert!(key.starts_with(&prefix));
    }
}
