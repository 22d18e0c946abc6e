// Entity catalogue - the kinds this backend persists and their
// filterable-field declarations. Entities are stored arena-style as JSON
// documents keyed by id; there are no live object pointers between them.

use once_cell::sync::Lazy;

use crate::core::field_spec::{FieldKind, FieldSpec, FieldSpecRegistry};

pub const PROJECT_STATUSES: &[&str] = &["DRAFT", "ACTIVE", "ARCHIVED"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Project,
    Team,
    Tag,
    Comment,
    Notification,
    UserProfile,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Project => "project",
            EntityKind::Team => "team",
            EntityKind::Tag => "tag",
            EntityKind::Comment => "comment",
            EntityKind::Notification => "notification",
            EntityKind::UserProfile => "user_profile",
        }
    }

    /// Parse the plural route segment used by the HTTP surface.
    pub fn from_route(segment: &str) -> Option<EntityKind> {
        match segment {
            "projects" => Some(EntityKind::Project),
            "teams" => Some(EntityKind::Team),
            "tags" => Some(EntityKind::Tag),
            "comments" => Some(EntityKind::Comment),
            "notifications" => Some(EntityKind::Notification),
            "user-profiles" => Some(EntityKind::UserProfile),
            _ => None,
        }
    }

    /// Payload fields that must be present and non-null on create.
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            EntityKind::Project => &["name"],
            EntityKind::Team => &["name"],
            EntityKind::Tag => &["name"],
            EntityKind::Comment => &["content", "projectId"],
            EntityKind::Notification => &["userId", "message"],
            EntityKind::UserProfile => &["login", "email"],
        }
    }

    /// Denormalized counter fields. Derived state: written only by the
    /// engagement aggregator and the comment create/delete path, preserved
    /// verbatim across update/partialUpdate.
    pub fn counter_fields(&self) -> &'static [&'static str] {
        match self {
            EntityKind::Project => &[
                "totalLikes",
                "totalFavorites",
                "totalShares",
                "totalViews",
                "totalComments",
            ],
            EntityKind::Team => &["totalLikes", "totalFavorites", "totalShares", "totalViews"],
            _ => &[],
        }
    }
}

static REGISTRY: Lazy<FieldSpecRegistry> = Lazy::new(build_registry);

/// The process-wide field registry, read-only after first use.
pub fn registry() -> &'static FieldSpecRegistry {
    &REGISTRY
}

fn build_registry() -> FieldSpecRegistry {
    use FieldKind::*;
    let mut registry = FieldSpecRegistry::new();

    registry.register(
        EntityKind::Project,
        vec![
            FieldSpec::new("id", Long),
            FieldSpec::new("name", Text),
            FieldSpec::new("description", Text),
            FieldSpec::enumeration("status", PROJECT_STATUSES),
            FieldSpec::new("createdAt", Instant),
            FieldSpec::new("totalLikes", Long),
            FieldSpec::new("totalFavorites", Long),
            FieldSpec::new("totalShares", Long),
            FieldSpec::new("totalViews", Long),
            FieldSpec::new("totalComments", Long),
        ],
    );

    registry.register(
        EntityKind::Team,
        vec![
            FieldSpec::new("id", Long),
            FieldSpec::new("name", Text),
            FieldSpec::new("description", Text),
            FieldSpec::new("createdAt", Instant),
            FieldSpec::new("totalLikes", Long),
            FieldSpec::new("totalFavorites", Long),
            FieldSpec::new("totalShares", Long),
            FieldSpec::new("totalViews", Long),
        ],
    );

    registry.register(
        EntityKind::Tag,
        vec![FieldSpec::new("id", Long), FieldSpec::new("name", Text)],
    );

    registry.register(
        EntityKind::Comment,
        vec![
            FieldSpec::new("id", Long),
            FieldSpec::new("content", Text),
            FieldSpec::new("projectId", Long),
            FieldSpec::new("authorId", Long),
            FieldSpec::new("createdAt", Instant),
        ],
    );

    registry.register(
        EntityKind::Notification,
        vec![
            FieldSpec::new("id", Long),
            FieldSpec::new("userId", Long),
            FieldSpec::new("message", Text),
            FieldSpec::new("read", Boolean),
            FieldSpec::new("createdAt", Instant),
        ],
    );

    registry.register(
        EntityKind::UserProfile,
        vec![
            FieldSpec::new("id", Long),
            FieldSpec::new("login", Text),
            FieldSpec::new("email", Text),
            FieldSpec::new("displayName", Text),
            FieldSpec::new("activated", Boolean),
            FieldSpec::new("createdAt", Instant),
        ],
    );

    registry
}
