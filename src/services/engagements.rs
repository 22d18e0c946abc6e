// Engagement aggregator - per (subject, user, type) state machine with two
// states, absent and active. A transition writes the engagement row and
// moves the subject's counter by exactly one in the same transaction; the
// row's primary key serializes concurrent engages of the same tuple.

use std::sync::Arc;
use tracing::info;

use crate::entities::EntityKind;
use crate::error::{AppError, AppResult};
use crate::services::retry_transient;
use crate::storage::StorageInterface;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngagementType {
    Like,
    Favorite,
    Share,
    View,
}

pub const ENGAGEMENT_TYPES: &[EngagementType] = &[
    EngagementType::Like,
    EngagementType::Favorite,
    EngagementType::Share,
    EngagementType::View,
];

impl EngagementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngagementType::Like => "LIKE",
            EngagementType::Favorite => "FAVORITE",
            EngagementType::Share => "SHARE",
            EngagementType::View => "VIEW",
        }
    }

    pub fn from_route(segment: &str) -> Option<EngagementType> {
        match segment {
            "like" => Some(EngagementType::Like),
            "favorite" => Some(EngagementType::Favorite),
            "share" => Some(EngagementType::Share),
            "view" => Some(EngagementType::View),
            _ => None,
        }
    }

    /// Parse the stored row discriminator, the inverse of `as_str`.
    pub fn parse(name: &str) -> Option<EngagementType> {
        match name {
            "LIKE" => Some(EngagementType::Like),
            "FAVORITE" => Some(EngagementType::Favorite),
            "SHARE" => Some(EngagementType::Share),
            "VIEW" => Some(EngagementType::View),
            _ => None,
        }
    }

    /// JSON field of the denormalized counter this type drives.
    pub fn counter_field(&self) -> &'static str {
        match self {
            EngagementType::Like => "totalLikes",
            EngagementType::Favorite => "totalFavorites",
            EngagementType::Share => "totalShares",
            EngagementType::View => "totalViews",
        }
    }
}

/// Entities that can be engaged with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubjectKind {
    Project,
    Team,
}

impl SubjectKind {
    pub fn entity_kind(&self) -> EntityKind {
        match self {
            SubjectKind::Project => EntityKind::Project,
            SubjectKind::Team => EntityKind::Team,
        }
    }

    pub fn from_route(segment: &str) -> Option<SubjectKind> {
        match segment {
            "projects" => Some(SubjectKind::Project),
            "teams" => Some(SubjectKind::Team),
            _ => None,
        }
    }
}

pub struct EngagementAggregator {
    storage: Arc<dyn StorageInterface>,
}

impl EngagementAggregator {
    pub fn new(storage: Arc<dyn StorageInterface>) -> Self {
        Self { storage }
    }

    /// absent -> active. Returns whether a transition happened; engaging
    /// an already-active tuple is a no-op and moves no counter.
    pub async fn engage(
        &self,
        subject: SubjectKind,
        subject_id: i64,
        user_id: i64,
        etype: EngagementType,
    ) -> AppResult<bool> {
        retry_transient(|| self.try_engage(subject, subject_id, user_id, etype)).await
    }

    /// active -> absent. Disengaging an absent tuple is a no-op.
    pub async fn disengage(
        &self,
        subject: SubjectKind,
        subject_id: i64,
        user_id: i64,
        etype: EngagementType,
    ) -> AppResult<bool> {
        retry_transient(|| self.try_disengage(subject, subject_id, user_id, etype)).await
    }

    /// Recompute every counter of the subject from the literal count of
    /// active engagement rows (and the live comment count for projects).
    /// Fixed point: running it twice in a row changes nothing. This is the
    /// authoritative recovery path for counter drift.
    pub async fn reconcile_counters(&self, subject: SubjectKind, subject_id: i64) -> AppResult<()> {
        retry_transient(|| self.try_reconcile(subject, subject_id)).await
    }

    async fn try_engage(
        &self,
        subject: SubjectKind,
        subject_id: i64,
        user_id: i64,
        etype: EngagementType,
    ) -> AppResult<bool> {
        self.ensure_exists(subject.entity_kind(), subject_id).await?;
        self.ensure_exists(EntityKind::UserProfile, user_id).await?;

        let mut tx = self.storage.begin_transaction().await?;
        let transitioned = self
            .storage
            .insert_engagement_tx(
                &mut tx,
                subject_id,
                subject.entity_kind(),
                user_id,
                etype.as_str(),
            )
            .await?;
        if transitioned {
            self.storage
                .adjust_counter_tx(&mut tx, subject_id, etype.counter_field(), 1)
                .await?;
        }
        tx.commit().await?;

        if transitioned {
            info!(
                "engaged {} {} by user {} ({})",
                subject.entity_kind().as_str(),
                subject_id,
                user_id,
                etype.as_str()
            );
        }
        Ok(transitioned)
    }

    async fn try_disengage(
        &self,
        subject: SubjectKind,
        subject_id: i64,
        user_id: i64,
        etype: EngagementType,
    ) -> AppResult<bool> {
        self.ensure_exists(subject.entity_kind(), subject_id).await?;

        let mut tx = self.storage.begin_transaction().await?;
        let transitioned = self
            .storage
            .delete_engagement_tx(&mut tx, subject_id, user_id, etype.as_str())
            .await?;
        if transitioned {
            self.storage
                .adjust_counter_tx(&mut tx, subject_id, etype.counter_field(), -1)
                .await?;
        }
        tx.commit().await?;
        Ok(transitioned)
    }

    async fn try_reconcile(&self, subject: SubjectKind, subject_id: i64) -> AppResult<()> {
        self.ensure_exists(subject.entity_kind(), subject_id).await?;

        let mut counts = Vec::with_capacity(ENGAGEMENT_TYPES.len() + 1);
        for etype in ENGAGEMENT_TYPES {
            let n = self
                .storage
                .count_engagements(subject_id, etype.as_str())
                .await?;
            counts.push((etype.counter_field(), n));
        }
        if subject == SubjectKind::Project {
            let n = self.storage.count_comments_for(subject_id).await?;
            counts.push(("totalComments", n));
        }

        let mut tx = self.storage.begin_transaction().await?;
        for (field, value) in counts {
            self.storage
                .set_counter_tx(&mut tx, subject_id, field, value)
                .await?;
        }
        tx.commit().await?;

        info!(
            "reconciled counters of {} {}",
            subject.entity_kind().as_str(),
            subject_id
        );
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
