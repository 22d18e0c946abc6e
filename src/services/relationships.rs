// Relationship consistency manager - the sole mutator of association link
// rows. Every mutation writes the owning direction and its mirror in one
// transaction, so no completed write can leave a half-link behind.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

use crate::entities::EntityKind;
use crate::error::{AppError, AppResult};
use crate::services::retry_transient;
use crate::storage::StorageInterface;

/// Closed set of association directions. Each direction knows its mirror;
/// the pair is written together, never through a re-entrant manager call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssocKind {
    ProjectTags,
    TagProjects,
    ProjectFavorites,
    FavoriteProjects,
    TeamMembers,
    MemberTeams,
}

impl AssocKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssocKind::ProjectTags => "project_tags",
            AssocKind::TagProjects => "tag_projects",
            AssocKind::ProjectFavorites => "project_favorites",
            AssocKind::FavoriteProjects => "favorite_projects",
            AssocKind::TeamMembers => "team_members",
            AssocKind::MemberTeams => "member_teams",
        }
    }

    pub fn from_route(segment: &str) -> Option<AssocKind> {
        match segment {
            "project-tags" => Some(AssocKind::ProjectTags),
            "tag-projects" => Some(AssocKind::TagProjects),
            "project-favorites" => Some(AssocKind::ProjectFavorites),
            "favorite-projects" => Some(AssocKind::FavoriteProjects),
            "team-members" => Some(AssocKind::TeamMembers),
            "member-teams" => Some(AssocKind::MemberTeams),
            _ => None,
        }
    }

    pub fn inverse(&self) -> AssocKind {
        match self {
            AssocKind::ProjectTags => AssocKind::TagProjects,
            AssocKind::TagProjects => AssocKind::ProjectTags,
            AssocKind::ProjectFavorites => AssocKind::FavoriteProjects,
            AssocKind::FavoriteProjects => AssocKind::ProjectFavorites,
            AssocKind::TeamMembers => AssocKind::MemberTeams,
            AssocKind::MemberTeams => AssocKind::TeamMembers,
        }
    }

    /// Entity kind on the owning side of this direction.
    pub fn owner_kind(&self) -> EntityKind {
        match self {
            AssocKind::ProjectTags | AssocKind::ProjectFavorites => EntityKind::Project,
            AssocKind::TagProjects => EntityKind::Tag,
            AssocKind::FavoriteProjects | AssocKind::MemberTeams => EntityKind::UserProfile,
            AssocKind::TeamMembers => EntityKind::Team,
        }
    }

    /// Entity kind on the member side of this direction.
    pub fn member_kind(&self) -> EntityKind {
        self.inverse().owner_kind()
    }
}

pub struct RelationshipManager {
    storage: Arc<dyn StorageInterface>,
}

impl RelationshipManager {
    pub fn new(storage: Arc<dyn StorageInterface>) -> Self {
        Self { storage }
    }

    /// Add a link. Fails NotFound when either endpoint is missing; adding
    /// an existing link is a no-op.
    pub async fn add(&self, assoc: AssocKind, owner: i64, member: i64) -> AppResult<()> {
        retry_transient(|| self.try_add(assoc, owner, member)).await
    }

    /// Remove a link from either direction. Removing an absent link is a
    /// no-op, not an error.
    pub async fn remove(&self, assoc: AssocKind, owner: i64, member: i64) -> AppResult<()> {
        retry_transient(|| self.try_remove(assoc, owner, member)).await
    }

    /// Replace the owner's member set: symmetric difference against the
    /// current set, removals applied before additions, all in one
    /// transaction. An empty new set is a full detach; an identical set
    /// changes nothing.
    pub async fn replace(&self, assoc: AssocKind, owner: i64, members: &[i64]) -> AppResult<()> {
        retry_transient(|| self.try_replace(assoc, owner, members)).await
    }

    pub async fn members_of(&self, assoc: AssocKind, owner: i64) -> AppResult<Vec<i64>> {
        self.ensure_exists(assoc.owner_kind(), owner).await?;
        self.storage.links_from(owner, assoc.as_str()).await
    }

    async fn try_add(&self, assoc: AssocKind, owner: i64, member: i64) -> AppResult<()> {
        self.ensure_exists(assoc.owner_kind(), owner).await?;
        self.ensure_exists(assoc.member_kind(), member).await?;

        let mut tx = self.storage.begin_transaction().await?;
        let inserted = self
            .storage
            .insert_link_tx(&mut tx, owner, assoc.as_str(), member)
            .await?;
        self.storage
            .insert_link_tx(&mut tx, member, assoc.inverse().as_str(), owner)
            .await?;
        tx.commit().await?;

        if inserted {
            info!("linked {} {} -> {}", assoc.as_str(), owner, member);
        }
        Ok(())
    }

    async fn try_remove(&self, assoc: AssocKind, owner: i64, member: i64) -> AppResult<()> {
        let mut tx = self.storage.begin_transaction().await?;
        let removed = self
            .storage
            .delete_link_tx(&mut tx, owner, assoc.as_str(), member)
            .await?;
        self.storage
            .delete_link_tx(&mut tx, member, assoc.inverse().as_str(), owner)
            .await?;
        tx.commit().await?;

        if removed {
            info!("unlinked {} {} -> {}", assoc.as_str(), owner, member);
        }
        Ok(())
    }

    async fn try_replace(&self, assoc: AssocKind, owner: i64, members: &[i64]) -> AppResult<()> {
        self.ensure_exists(assoc.owner_kind(), owner).await?;
        let wanted: HashSet<i64> = members.iter().copied().collect();
        for member in &wanted {
            self.ensure_exists(assoc.member_kind(), *member).await?;
        }

        let current: HashSet<i64> = self
            .storage
            .links_from(owner, assoc.as_str())
            .await?
            .into_iter()
            .collect();

        let mut tx = self.storage.begin_transaction().await?;
        for member in current.difference(&wanted) {
            self.storage
                .delete_link_tx(&mut tx, owner, assoc.as_str(), *member)
                .await?;
            self.storage
                .delete_link_tx(&mut tx, *member, assoc.inverse().as_str(), owner)
                .await?;
        }
        for member in wanted.difference(&current) {
            self.storage
                .insert_link_tx(&mut tx, owner, assoc.as_str(), *member)
                .await?;
            self.storage
                .insert_link_tx(&mut tx, *member, assoc.inverse().as_str(), owner)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn ensure_exists(&self, kind: EntityKind, id: i64) -> AppResult<()> {
        if self.storage.entity_exists(kind, id).await? {
            Ok(())
        } else {
            Err(AppError::NotFound(format!(
                "{} {} not found",
                kind.as_str(),
                id
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inverse_is_an_involution() {
        for assoc in [
            AssocKind::ProjectTags,
            AssocKind::TagProjects,
            AssocKind::ProjectFavorites,
            AssocKind::FavoriteProjects,
            AssocKind::TeamMembers,
            AssocKind::MemberTeams,
        ] {
            assert_eq!(assoc.inverse().inverse(), assoc);
            assert_eq!(assoc.member_kind(), assoc.inverse().owner_kind());
        }
    }

    #[test]
    fn test_endpoint_kinds() {
        assert_eq!(AssocKind::ProjectTags.owner_kind(), EntityKind::Project);
        assert_eq!(AssocKind::ProjectTags.member_kind(), EntityKind::Tag);
        assert_eq!(AssocKind::TeamMembers.member_kind(), EntityKind::UserProfile);
        assert_eq!(AssocKind::FavoriteProjects.owner_kind(), EntityKind::UserProfile);
    }
}
