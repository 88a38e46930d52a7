use async_graphql::SimpleObject;
use bson::datetime::DateTime;
use bson::Uuid;
use serde::{Deserialize, Serialize};

use super::review::ModerationState;
use super::user::User;

/// A helpful/unhelpful vote given by a user on an approved review.
///
/// Feedback is moderated like reviews; only approved feedback is counted
/// publicly.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, SimpleObject)]
pub struct Feedback {
    /// Feedback UUID.
    pub _id: Uuid,
    /// User that gave the feedback.
    pub user: User,
    /// UUID of the review the feedback is about.
    pub review_id: Uuid,
    /// `true` marks the review as helpful, `false` as unhelpful.
    pub helpful: bool,
    /// Moderation state deciding public visibility.
    pub moderation_state: ModerationState,
    /// Timestamp when the feedback was created.
    pub created_at: DateTime,
    /// Timestamp when the feedback was last updated.
    pub last_updated_at: DateTime,
}
