use async_graphql::{Error, ErrorExtensions, Value};
use bson::Uuid;
use thiserror::Error as ThisError;

use crate::graphql::model::review::ModerationState;

/// A single field-level violation found while validating a review submission.
///
/// Violations are collected, not short-circuited, so a submission with a bad
/// rating and a blank body reports both at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ThisError)]
pub enum ValidationIssue {
    #[error("Rating must be an integer between 1 and 5.")]
    InvalidRating,
    #[error("Review body must not be empty.")]
    MissingBody,
    #[error("Product is not present in the system.")]
    ProductNotFound,
}

/// Errors surfaced by review and feedback operations.
///
/// Converted into GraphQL errors with a stable `code` extension so clients can
/// dispatch on the failure kind instead of parsing messages.
#[derive(Debug, Clone, PartialEq, ThisError)]
pub enum ReviewError {
    #[error("Review validation failed: {}", join_issues(.0))]
    Invalid(Vec<ValidationIssue>),
    #[error("Operation is not permitted for this actor.")]
    Forbidden,
    #[error("{entity} with UUID: `{id}` not found.")]
    NotFound { entity: &'static str, id: Uuid },
    #[error("User has already written a review for this product (review UUID: `{0}`).")]
    AlreadyReviewed(Uuid),
    #[error("User has already given feedback on this review (feedback UUID: `{0}`).")]
    DuplicateVote(Uuid),
    #[error("Feedback can only be given on approved reviews.")]
    ReviewNotApproved,
    #[error("Moderation transition from `{from:?}` to `{to:?}` is not allowed.")]
    InvalidTransition {
        from: ModerationState,
        to: ModerationState,
    },
    #[error("{0} failed in MongoDB.")]
    Storage(&'static str),
}

impl ReviewError {
    /// Stable machine-readable code exposed in the GraphQL error extensions.
    pub fn code(&self) -> &'static str {
        match self {
            ReviewError::Invalid(_) => "INVALID_REVIEW",
            ReviewError::Forbidden => "FORBIDDEN",
            ReviewError::NotFound { .. } => "NOT_FOUND",
            ReviewError::AlreadyReviewed(_) => "ALREADY_REVIEWED",
            ReviewError::DuplicateVote(_) => "DUPLICATE_VOTE",
            ReviewError::ReviewNotApproved => "REVIEW_NOT_APPROVED",
            ReviewError::InvalidTransition { .. } => "INVALID_TRANSITION",
            ReviewError::Storage(_) => "INTERNAL",
        }
    }
}

impl ErrorExtensions for ReviewError {
    fn extend(&self) -> Error {
        Error::new(self.to_string()).extend_with(|_, extensions| {
            extensions.set("code", self.code());
            match self {
                ReviewError::Invalid(issues) => {
                    let violations = issues
                        .iter()
                        .map(|issue| Value::String(issue.to_string()))
                        .collect();
                    extensions.set("violations", Value::List(violations));
                }
                ReviewError::AlreadyReviewed(id) | ReviewError::DuplicateVote(id) => {
                    extensions.set("conflictingId", id.to_string());
                }
                _ => {}
            }
        })
    }
}

fn join_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_error_lists_every_violation() {
        let error = ReviewError::Invalid(vec![
            ValidationIssue::InvalidRating,
            ValidationIssue::MissingBody,
        ]);
        let message = error.to_string();
        assert!(message.contains("Rating must be an integer between 1 and 5."));
        assert!(message.contains("Review body must not be empty."));
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(ReviewError::Forbidden.code(), "FORBIDDEN");
        assert_eq!(
            ReviewError::AlreadyReviewed(Uuid::new()).code(),
            "ALREADY_REVIEWED"
        );
        assert_eq!(ReviewError::ReviewNotApproved.code(), "REVIEW_NOT_APPROVED");
        assert_eq!(ReviewError::Storage("Querying object").code(), "INTERNAL");
    }
}
