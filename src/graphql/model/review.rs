use async_graphql::{ComplexObject, Context, Enum, Result, SimpleObject};
use bson::datetime::DateTime;
use bson::{Bson, Uuid, doc};
use mongodb::{Collection, Database};
use serde::{Deserialize, Serialize};

use super::feedback::Feedback;
use super::product::Product;
use super::user::User;

/// The review of a product, written by a user or submitted anonymously.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, SimpleObject)]
#[graphql(complex)]
pub struct Review {
    /// Review UUID.
    pub _id: Uuid,
    /// User owning the review. `None` for anonymous submissions.
    pub user: Option<User>,
    /// Product that the review is about.
    pub product: Product,
    /// Optional title of the review.
    pub title: Option<String>,
    /// Body of the review.
    pub body: String,
    /// Rating of the review in 1-5 stars.
    pub rating: Rating,
    /// Display name of the reviewer, used when no user is associated.
    pub reviewer_name: Option<String>,
    /// Flag if the reviewer name is shown publicly.
    pub show_identifier: bool,
    /// Locale captured at submission time, for reporting only.
    pub locale: Option<String>,
    /// Network origin captured at submission, audit only. Not exposed.
    #[graphql(skip)]
    pub origin_address: Option<String>,
    /// Moderation state deciding public visibility.
    pub moderation_state: ModerationState,
    /// Timestamp when the review was created.
    pub created_at: DateTime,
    /// Timestamp when the review was last updated.
    pub last_updated_at: DateTime,
}

#[ComplexObject]
impl Review {
    /// Retrieves the approved feedback given on this review.
    async fn feedbacks<'a>(&self, ctx: &Context<'a>) -> Result<Vec<Feedback>> {
        let db_client = ctx.data::<Database>()?;
        let collection: Collection<Feedback> = db_client.collection::<Feedback>("feedbacks");
        let filter = doc! {"review_id": self._id, "moderation_state": ModerationState::Approved};
        let cursor = collection
            .find(filter, None)
            .await
            .map_err(|_| async_graphql::Error::new("Retrieving feedbacks failed in MongoDB."))?;
        collect_feedbacks(cursor).await
    }

    /// Number of approved helpful votes on this review.
    async fn helpful_count<'a>(&self, ctx: &Context<'a>) -> Result<u64> {
        count_feedbacks(ctx, self._id, true).await
    }

    /// Number of approved unhelpful votes on this review.
    async fn not_helpful_count<'a>(&self, ctx: &Context<'a>) -> Result<u64> {
        count_feedbacks(ctx, self._id, false).await
    }
}

async fn collect_feedbacks(mut cursor: mongodb::Cursor<Feedback>) -> Result<Vec<Feedback>> {
    let mut feedbacks = Vec::new();
    while cursor
        .advance()
        .await
        .map_err(|_| async_graphql::Error::new("Retrieving feedbacks failed in MongoDB."))?
    {
        let feedback = cursor
            .deserialize_current()
            .map_err(|_| async_graphql::Error::new("Retrieving feedbacks failed in MongoDB."))?;
        feedbacks.push(feedback);
    }
    Ok(feedbacks)
}

async fn count_feedbacks(ctx: &Context<'_>, review_id: Uuid, helpful: bool) -> Result<u64> {
    let db_client = ctx.data::<Database>()?;
    let collection: Collection<Feedback> = db_client.collection::<Feedback>("feedbacks");
    let filter = doc! {
        "review_id": review_id,
        "helpful": helpful,
        "moderation_state": ModerationState::Approved,
    };
    let count = collection
        .count_documents(filter, None)
        .await
        .map_err(|_| async_graphql::Error::new("Counting feedbacks failed in MongoDB."))?;
    Ok(count)
}

/// Rating of a review in 1-5 stars.
#[derive(Enum, Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum Rating {
    OneStars = 1,
    TwoStars = 2,
    ThreeStars = 3,
    FourStars = 4,
    FiveStars = 5,
}

impl Rating {
    /// Parses a submitted rating string.
    ///
    /// Submissions may carry a trailing non-numeric suffix, e.g. `"5 stars"`.
    /// The trailing run of non-digit characters is stripped before parsing.
    /// Returns `None` when no digits remain or the value is outside 1-5.
    pub fn parse(input: &str) -> Option<Self> {
        let digits = input.trim().trim_end_matches(|c: char| !c.is_ascii_digit());
        let value = digits.parse::<u8>().ok()?;
        Self::from_stars(value)
    }

    pub fn from_stars(value: u8) -> Option<Self> {
        match value {
            1 => Some(Rating::OneStars),
            2 => Some(Rating::TwoStars),
            3 => Some(Rating::ThreeStars),
            4 => Some(Rating::FourStars),
            5 => Some(Rating::FiveStars),
            _ => None,
        }
    }

    /// Numeric star value of the rating.
    pub fn stars(self) -> u8 {
        self as u8
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Rating::OneStars => "OneStars",
            Rating::TwoStars => "TwoStars",
            Rating::ThreeStars => "ThreeStars",
            Rating::FourStars => "FourStars",
            Rating::FiveStars => "FiveStars",
        }
    }
}

impl From<Rating> for Bson {
    fn from(value: Rating) -> Self {
        Bson::String(value.as_str().to_string())
    }
}

/// Moderation state of a review or a feedback vote.
///
/// Only `Approved` entities are publicly visible; `Pending` and `Rejected`
/// ones remain visible to their owner and to moderators.
#[derive(Enum, Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum ModerationState {
    Pending,
    Approved,
    Rejected,
}

impl ModerationState {
    /// State assigned on creation, depending on the deployment configuration.
    pub fn on_create(auto_approve: bool) -> Self {
        if auto_approve {
            ModerationState::Approved
        } else {
            ModerationState::Pending
        }
    }

    /// Whether a moderator may move an entity from this state to `target`.
    ///
    /// Every cross-state transition is allowed: approve, reject, moderator
    /// override and reopening (a transition back to `Pending`). There are no
    /// self-transitions.
    pub fn can_transition_to(self, target: ModerationState) -> bool {
        self != target
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModerationState::Pending => "Pending",
            ModerationState::Approved => "Approved",
            ModerationState::Rejected => "Rejected",
        }
    }
}

impl From<ModerationState> for Bson {
    fn from(value: ModerationState) -> Self {
        Bson::String(value.as_str().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rating_with_trailing_suffix() {
        assert_eq!(Rating::parse("4 stars"), Some(Rating::FourStars));
        assert_eq!(Rating::parse("5 ★★★★★"), Some(Rating::FiveStars));
        assert_eq!(Rating::parse(" 3 "), Some(Rating::ThreeStars));
        assert_eq!(Rating::parse("1"), Some(Rating::OneStars));
    }

    #[test]
    fn rejects_ratings_without_leading_integer() {
        assert_eq!(Rating::parse("abc"), None);
        assert_eq!(Rating::parse(""), None);
        assert_eq!(Rating::parse("stars"), None);
        assert_eq!(Rating::parse("4.5"), None);
    }

    #[test]
    fn rejects_ratings_outside_range() {
        assert_eq!(Rating::parse("0"), None);
        assert_eq!(Rating::parse("6"), None);
        assert_eq!(Rating::parse("42 stars"), None);
    }

    #[test]
    fn stars_match_numeric_values() {
        assert_eq!(Rating::OneStars.stars(), 1);
        assert_eq!(Rating::FiveStars.stars(), 5);
    }

    #[test]
    fn initial_state_follows_auto_approve_flag() {
        assert_eq!(ModerationState::on_create(false), ModerationState::Pending);
        assert_eq!(ModerationState::on_create(true), ModerationState::Approved);
    }

    #[test]
    fn no_self_transitions() {
        for state in [
            ModerationState::Pending,
            ModerationState::Approved,
            ModerationState::Rejected,
        ] {
            assert!(!state.can_transition_to(state));
        }
    }

    #[test]
    fn cross_state_transitions_are_allowed() {
        assert!(ModerationState::Pending.can_transition_to(ModerationState::Approved));
        assert!(ModerationState::Pending.can_transition_to(ModerationState::Rejected));
        assert!(ModerationState::Approved.can_transition_to(ModerationState::Rejected));
        assert!(ModerationState::Rejected.can_transition_to(ModerationState::Approved));
        assert!(ModerationState::Approved.can_transition_to(ModerationState::Pending));
        assert!(ModerationState::Rejected.can_transition_to(ModerationState::Pending));
    }
}
