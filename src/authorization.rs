use bson::Uuid;

use crate::authentication::Actor;
use crate::error::ReviewError;
use crate::graphql::model::feedback::Feedback;
use crate::graphql::model::review::{ModerationState, Review};

/// What an actor attempts to do to a review or a feedback vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Submit a new review.
    Create,
    /// Read an entity, including non-approved ones.
    Read,
    /// Change the content fields of a review.
    UpdateContent,
    /// Delete an entity permanently.
    Delete,
    /// Transition the moderation state.
    Moderate,
    /// Give feedback on a review.
    Vote,
    /// Flip or delete an existing feedback vote.
    EditVote,
}

/// Ownership and visibility facts about the entity an action is aimed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    /// UUID of the owning user, `None` for anonymous reviews.
    pub owner: Option<Uuid>,
    /// Whether the entity is in the approved, publicly visible state.
    pub approved: bool,
}

impl Target {
    pub fn of_review(review: &Review) -> Self {
        Target {
            owner: review.user.as_ref().map(|user| user._id),
            approved: review.moderation_state == ModerationState::Approved,
        }
    }

    pub fn of_feedback(feedback: &Feedback) -> Self {
        Target {
            owner: Some(feedback.user._id),
            approved: feedback.moderation_state == ModerationState::Approved,
        }
    }
}

/// Single decision table deciding, per actor and action, whether an operation
/// is permitted.
///
/// Moderators may act on anything. Owners may read, update and delete their
/// own entities but never transition moderation state, and never vote on
/// their own review. Anonymous actors may only create reviews and read the
/// approved subset.
pub fn can(actor: Actor, action: Action, target: &Target) -> bool {
    let user_id = actor.user_id();
    let is_moderator = actor.is_moderator();
    let is_owner = user_id.is_some() && user_id == target.owner;
    match action {
        Action::Create => true,
        Action::Read => target.approved || is_owner || is_moderator,
        Action::UpdateContent | Action::Delete | Action::EditVote => is_owner || is_moderator,
        Action::Moderate => is_moderator,
        Action::Vote => is_moderator || (user_id.is_some() && !is_owner),
    }
}

/// Evaluates the decision table and surfaces `Forbidden` on denial.
///
/// Called before every mutating operation and before any read beyond the
/// public approved subset. A denial has no side effects.
pub fn authorize(actor: Actor, action: Action, target: &Target) -> Result<(), ReviewError> {
    if can(actor, action, target) {
        Ok(())
    } else {
        Err(ReviewError::Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner_id() -> Uuid {
        Uuid::parse_str("00000000-0000-0000-0000-000000000001").unwrap()
    }

    fn other_id() -> Uuid {
        Uuid::parse_str("00000000-0000-0000-0000-000000000002").unwrap()
    }

    fn owner() -> Actor {
        Actor::User {
            id: owner_id(),
            is_moderator: false,
        }
    }

    fn other() -> Actor {
        Actor::User {
            id: other_id(),
            is_moderator: false,
        }
    }

    fn moderator() -> Actor {
        Actor::User {
            id: other_id(),
            is_moderator: true,
        }
    }

    fn pending_target() -> Target {
        Target {
            owner: Some(owner_id()),
            approved: false,
        }
    }

    fn approved_target() -> Target {
        Target {
            owner: Some(owner_id()),
            approved: true,
        }
    }

    #[test]
    fn everyone_may_create() {
        let target = pending_target();
        for actor in [Actor::Anonymous, owner(), other(), moderator()] {
            assert!(can(actor, Action::Create, &target));
        }
    }

    #[test]
    fn approved_entities_are_publicly_readable() {
        let target = approved_target();
        for actor in [Actor::Anonymous, owner(), other(), moderator()] {
            assert!(can(actor, Action::Read, &target));
        }
    }

    #[test]
    fn pending_entities_are_only_readable_by_owner_and_moderator() {
        let target = pending_target();
        assert!(!can(Actor::Anonymous, Action::Read, &target));
        assert!(can(owner(), Action::Read, &target));
        assert!(!can(other(), Action::Read, &target));
        assert!(can(moderator(), Action::Read, &target));
    }

    #[test]
    fn content_updates_require_owner_or_moderator() {
        let target = approved_target();
        assert!(!can(Actor::Anonymous, Action::UpdateContent, &target));
        assert!(can(owner(), Action::UpdateContent, &target));
        assert!(!can(other(), Action::UpdateContent, &target));
        assert!(can(moderator(), Action::UpdateContent, &target));
    }

    #[test]
    fn deletion_requires_owner_or_moderator() {
        let target = approved_target();
        assert!(!can(Actor::Anonymous, Action::Delete, &target));
        assert!(can(owner(), Action::Delete, &target));
        assert!(!can(other(), Action::Delete, &target));
        assert!(can(moderator(), Action::Delete, &target));
    }

    #[test]
    fn moderation_is_moderator_only() {
        let target = pending_target();
        assert!(!can(Actor::Anonymous, Action::Moderate, &target));
        assert!(!can(owner(), Action::Moderate, &target));
        assert!(!can(other(), Action::Moderate, &target));
        assert!(can(moderator(), Action::Moderate, &target));
    }

    #[test]
    fn voting_requires_authentication_and_forbids_self_votes() {
        let target = approved_target();
        assert!(!can(Actor::Anonymous, Action::Vote, &target));
        assert!(!can(owner(), Action::Vote, &target));
        assert!(can(other(), Action::Vote, &target));
        assert!(can(moderator(), Action::Vote, &target));
    }

    #[test]
    fn anonymous_reviews_have_no_owner() {
        let target = Target {
            owner: None,
            approved: false,
        };
        // Nobody but a moderator owns an anonymous review.
        assert!(!can(owner(), Action::UpdateContent, &target));
        assert!(!can(other(), Action::Read, &target));
        assert!(can(moderator(), Action::Delete, &target));
        // Authenticated users may vote on it once approved.
        assert!(can(other(), Action::Vote, &target));
    }

    #[test]
    fn denial_surfaces_forbidden() {
        let target = pending_target();
        assert_eq!(
            authorize(other(), Action::Moderate, &target),
            Err(ReviewError::Forbidden)
        );
        assert_eq!(authorize(moderator(), Action::Moderate, &target), Ok(()));
    }
}
