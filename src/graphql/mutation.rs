use async_graphql::{Context, ErrorExtensions, Object, Result};
use bson::Uuid;
use mongodb::{
    Collection, Database,
    bson::{DateTime, Document, doc},
    error::{ErrorKind, WriteFailure},
};

use crate::ServiceConfig;
use crate::authentication::{Actor, ClientLocale, ClientOrigin};
use crate::authorization::{Action, Target, authorize};
use crate::error::{ReviewError, ValidationIssue};

use super::model::feedback::Feedback;
use super::model::product::Product;
use super::model::review::{ModerationState, Rating, Review};
use super::model::user::User;
use super::mutation_input_structs::{
    CreateFeedbackInput, CreateReviewInput, UpdateFeedbackInput, UpdateReviewInput,
};
use super::query::{query_object, query_object_optional};

/// Describes GraphQL review mutations.
pub struct Mutation;

#[Object]
impl Mutation {
    /// Adds a review for a product with a rating, body and optional title.
    ///
    /// Anonymous submissions are accepted; authenticated users may review
    /// each product at most once.
    async fn create_review<'a>(
        &self,
        ctx: &Context<'a>,
        #[graphql(desc = "CreateReviewInput")] input: CreateReviewInput,
    ) -> Result<Review> {
        let actor = Actor::from_context(ctx);
        let db_client = ctx.data::<Database>()?;
        let config = ctx.data::<ServiceConfig>()?;
        let review_collection: Collection<Review> = db_client.collection::<Review>("reviews");
        authorize(
            actor,
            Action::Create,
            &Target {
                owner: actor.user_id(),
                approved: false,
            },
        )
        .map_err(|err| err.extend())?;
        let product_exists = product_exists(db_client, input.product_id).await?;
        let (rating, body) = validate_submission(&input.rating, &input.body, product_exists)
            .map_err(|err| err.extend())?;
        // Duplicate-submission guard; anonymous submissions bypass it.
        if let Some(user_id) = actor.user_id() {
            if let Some(existing) =
                existing_review(&review_collection, user_id, input.product_id).await?
            {
                return Err(duplicate_review_error(Some(existing._id)).extend());
            }
        }
        let current_timestamp = DateTime::now();
        let review = Review {
            _id: Uuid::new(),
            user: actor.user_id().map(User::from),
            product: Product::from(input.product_id),
            title: input.title.clone(),
            body,
            rating,
            reviewer_name: input.reviewer_name.clone(),
            show_identifier: input.show_identifier.unwrap_or(false),
            locale: locale_if_tracked(ctx, config),
            origin_address: ctx.data_opt::<ClientOrigin>().map(|origin| origin.0.clone()),
            moderation_state: ModerationState::on_create(config.auto_approve),
            created_at: current_timestamp,
            last_updated_at: current_timestamp,
        };
        match review_collection.insert_one(&review, None).await {
            Ok(_) => query_object(&review_collection, review._id)
                .await
                .map_err(|err| err.extend()),
            Err(err) if is_duplicate_key_error(&err) => {
                // The unique index closed a check-then-create race; surface
                // the winning review instead of a generic failure.
                let existing = match actor.user_id() {
                    Some(user_id) => {
                        existing_review(&review_collection, user_id, input.product_id).await?
                    }
                    None => None,
                };
                Err(duplicate_review_error(existing.map(|review| review._id)).extend())
            }
            Err(_) => Err(ReviewError::Storage("Adding review").extend()),
        }
    }

    /// Updates the content fields of a review referenced by UUID.
    ///
    /// Only the owning user and moderators may update. The moderation state
    /// is never touched here.
    async fn update_review<'a>(
        &self,
        ctx: &Context<'a>,
        #[graphql(desc = "UpdateReviewInput")] input: UpdateReviewInput,
    ) -> Result<Review> {
        let actor = Actor::from_context(ctx);
        let db_client = ctx.data::<Database>()?;
        let collection: Collection<Review> = db_client.collection::<Review>("reviews");
        let review = query_object(&collection, input.id)
            .await
            .map_err(|err| err.extend())?;
        authorize(actor, Action::UpdateContent, &Target::of_review(&review))
            .map_err(|err| err.extend())?;
        let (rating, body) = validate_patch(input.rating.as_deref(), input.body.as_deref())
            .map_err(|err| err.extend())?;
        let current_timestamp = DateTime::now();
        // All patched fields go into one update, so a failing update cannot
        // leave the review partially mutated.
        if let Some(patch) = review_patch_document(
            rating,
            body,
            input.title.clone(),
            input.reviewer_name.clone(),
            input.show_identifier,
            &current_timestamp,
        ) {
            collection
                .update_one(doc! {"_id": input.id }, doc! {"$set": patch}, None)
                .await
                .map_err(|_| ReviewError::Storage("Updating review").extend())?;
        }
        query_object(&collection, input.id)
            .await
            .map_err(|err| err.extend())
    }

    /// Deletes review of UUID, together with all feedback given on it.
    async fn delete_review<'a>(
        &self,
        ctx: &Context<'a>,
        #[graphql(desc = "UUID of review to delete.")] id: Uuid,
    ) -> Result<bool> {
        let actor = Actor::from_context(ctx);
        let db_client = ctx.data::<Database>()?;
        let collection: Collection<Review> = db_client.collection::<Review>("reviews");
        let review = query_object(&collection, id)
            .await
            .map_err(|err| err.extend())?;
        authorize(actor, Action::Delete, &Target::of_review(&review))
            .map_err(|err| err.extend())?;
        collection
            .delete_one(doc! {"_id": id }, None)
            .await
            .map_err(|_| ReviewError::Storage("Deleting review").extend())?;
        let feedback_collection: Collection<Feedback> =
            db_client.collection::<Feedback>("feedbacks");
        feedback_collection
            .delete_many(doc! {"review_id": id }, None)
            .await
            .map_err(|_| ReviewError::Storage("Deleting feedbacks of review").extend())?;
        Ok(true)
    }

    /// Approves a review, making it publicly visible. Moderator only.
    async fn approve_review<'a>(
        &self,
        ctx: &Context<'a>,
        #[graphql(desc = "UUID of review to approve.")] id: Uuid,
    ) -> Result<Review> {
        transition_review(ctx, id, ModerationState::Approved).await
    }

    /// Rejects a review, removing it from public visibility. Moderator only.
    async fn reject_review<'a>(
        &self,
        ctx: &Context<'a>,
        #[graphql(desc = "UUID of review to reject.")] id: Uuid,
    ) -> Result<Review> {
        transition_review(ctx, id, ModerationState::Rejected).await
    }

    /// Reopens a moderated review back to pending. Moderator only.
    async fn reopen_review<'a>(
        &self,
        ctx: &Context<'a>,
        #[graphql(desc = "UUID of review to reopen.")] id: Uuid,
    ) -> Result<Review> {
        transition_review(ctx, id, ModerationState::Pending).await
    }

    /// Gives feedback on an approved review.
    ///
    /// Requires an authenticated user, forbids voting on the own review and
    /// allows at most one vote per user and review.
    async fn create_feedback<'a>(
        &self,
        ctx: &Context<'a>,
        #[graphql(desc = "CreateFeedbackInput")] input: CreateFeedbackInput,
    ) -> Result<Feedback> {
        let actor = Actor::from_context(ctx);
        let db_client = ctx.data::<Database>()?;
        let config = ctx.data::<ServiceConfig>()?;
        let review_collection: Collection<Review> = db_client.collection::<Review>("reviews");
        let feedback_collection: Collection<Feedback> =
            db_client.collection::<Feedback>("feedbacks");
        let review = query_object(&review_collection, input.review_id)
            .await
            .map_err(|err| err.extend())?;
        authorize(actor, Action::Vote, &Target::of_review(&review))
            .map_err(|err| err.extend())?;
        let Some(user_id) = actor.user_id() else {
            return Err(ReviewError::Forbidden.extend());
        };
        if review.moderation_state != ModerationState::Approved {
            return Err(ReviewError::ReviewNotApproved.extend());
        }
        if let Some(existing) =
            existing_feedback(&feedback_collection, user_id, input.review_id).await?
        {
            return Err(duplicate_feedback_error(Some(existing._id)).extend());
        }
        let current_timestamp = DateTime::now();
        let feedback = Feedback {
            _id: Uuid::new(),
            user: User::from(user_id),
            review_id: input.review_id,
            helpful: input.helpful,
            moderation_state: ModerationState::on_create(config.auto_approve),
            created_at: current_timestamp,
            last_updated_at: current_timestamp,
        };
        match feedback_collection.insert_one(&feedback, None).await {
            Ok(_) => query_object(&feedback_collection, feedback._id)
                .await
                .map_err(|err| err.extend()),
            Err(err) if is_duplicate_key_error(&err) => {
                let existing =
                    existing_feedback(&feedback_collection, user_id, input.review_id).await?;
                Err(duplicate_feedback_error(existing.map(|feedback| feedback._id)).extend())
            }
            Err(_) => Err(ReviewError::Storage("Adding feedback").extend()),
        }
    }

    /// Flips an existing feedback vote. Owner of the vote or moderator only.
    async fn update_feedback<'a>(
        &self,
        ctx: &Context<'a>,
        #[graphql(desc = "UpdateFeedbackInput")] input: UpdateFeedbackInput,
    ) -> Result<Feedback> {
        let actor = Actor::from_context(ctx);
        let db_client = ctx.data::<Database>()?;
        let collection: Collection<Feedback> = db_client.collection::<Feedback>("feedbacks");
        let feedback = query_object(&collection, input.id)
            .await
            .map_err(|err| err.extend())?;
        authorize(actor, Action::EditVote, &Target::of_feedback(&feedback))
            .map_err(|err| err.extend())?;
        let current_timestamp = DateTime::now();
        collection
            .update_one(
                doc! {"_id": input.id },
                doc! {"$set": {"helpful": input.helpful, "last_updated_at": current_timestamp}},
                None,
            )
            .await
            .map_err(|_| ReviewError::Storage("Updating feedback").extend())?;
        query_object(&collection, input.id)
            .await
            .map_err(|err| err.extend())
    }

    /// Deletes feedback of UUID. Owner of the vote or moderator only.
    async fn delete_feedback<'a>(
        &self,
        ctx: &Context<'a>,
        #[graphql(desc = "UUID of feedback to delete.")] id: Uuid,
    ) -> Result<bool> {
        let actor = Actor::from_context(ctx);
        let db_client = ctx.data::<Database>()?;
        let collection: Collection<Feedback> = db_client.collection::<Feedback>("feedbacks");
        let feedback = query_object(&collection, id)
            .await
            .map_err(|err| err.extend())?;
        authorize(actor, Action::EditVote, &Target::of_feedback(&feedback))
            .map_err(|err| err.extend())?;
        collection
            .delete_one(doc! {"_id": id }, None)
            .await
            .map_err(|_| ReviewError::Storage("Deleting feedback").extend())?;
        Ok(true)
    }

    /// Approves a feedback vote, including it in public counts. Moderator only.
    async fn approve_feedback<'a>(
        &self,
        ctx: &Context<'a>,
        #[graphql(desc = "UUID of feedback to approve.")] id: Uuid,
    ) -> Result<Feedback> {
        transition_feedback(ctx, id, ModerationState::Approved).await
    }

    /// Rejects a feedback vote. Moderator only.
    async fn reject_feedback<'a>(
        &self,
        ctx: &Context<'a>,
        #[graphql(desc = "UUID of feedback to reject.")] id: Uuid,
    ) -> Result<Feedback> {
        transition_feedback(ctx, id, ModerationState::Rejected).await
    }

    /// Reopens a moderated feedback vote back to pending. Moderator only.
    async fn reopen_feedback<'a>(
        &self,
        ctx: &Context<'a>,
        #[graphql(desc = "UUID of feedback to reopen.")] id: Uuid,
    ) -> Result<Feedback> {
        transition_feedback(ctx, id, ModerationState::Pending).await
    }
}

/// Validates a review submission, collecting every violation instead of
/// failing on the first.
///
/// Returns the parsed rating and the trimmed body on success.
fn validate_submission(
    rating: &str,
    body: &str,
    product_exists: bool,
) -> Result<(Rating, String), ReviewError> {
    let mut violations = Vec::new();
    let parsed_rating = Rating::parse(rating);
    if parsed_rating.is_none() {
        violations.push(ValidationIssue::InvalidRating);
    }
    let trimmed_body = body.trim();
    if trimmed_body.is_empty() {
        violations.push(ValidationIssue::MissingBody);
    }
    if !product_exists {
        violations.push(ValidationIssue::ProductNotFound);
    }
    match parsed_rating {
        Some(rating) if violations.is_empty() => Ok((rating, trimmed_body.to_string())),
        _ => Err(ReviewError::Invalid(violations)),
    }
}

/// Validates the fields present in a review patch.
fn validate_patch(
    rating: Option<&str>,
    body: Option<&str>,
) -> Result<(Option<Rating>, Option<String>), ReviewError> {
    let mut violations = Vec::new();
    let parsed_rating = match rating {
        Some(submitted) => match Rating::parse(submitted) {
            Some(rating) => Some(rating),
            None => {
                violations.push(ValidationIssue::InvalidRating);
                None
            }
        },
        None => None,
    };
    let trimmed_body = match body {
        Some(submitted) => {
            let trimmed = submitted.trim();
            if trimmed.is_empty() {
                violations.push(ValidationIssue::MissingBody);
            }
            Some(trimmed.to_string())
        }
        None => None,
    };
    if violations.is_empty() {
        Ok((parsed_rating, trimmed_body))
    } else {
        Err(ReviewError::Invalid(violations))
    }
}

/// Checks if the product is in the system (MongoDB database populated with
/// events).
async fn product_exists(db_client: &Database, product_id: Uuid) -> Result<bool> {
    let collection: Collection<Product> = db_client.collection::<Product>("products");
    let maybe_product = query_object_optional(&collection, product_id)
        .await
        .map_err(|err| err.extend())?;
    Ok(maybe_product.is_some())
}

/// Looks up the review a user has already written for a product, if any.
async fn existing_review(
    collection: &Collection<Review>,
    user_id: Uuid,
    product_id: Uuid,
) -> Result<Option<Review>> {
    collection
        .find_one(doc! {"product._id": product_id, "user._id": user_id }, None)
        .await
        .map_err(|_| ReviewError::Storage("Querying reviews").extend())
}

/// Looks up the feedback a user has already given on a review, if any.
async fn existing_feedback(
    collection: &Collection<Feedback>,
    user_id: Uuid,
    review_id: Uuid,
) -> Result<Option<Feedback>> {
    collection
        .find_one(doc! {"review_id": review_id, "user._id": user_id }, None)
        .await
        .map_err(|_| ReviewError::Storage("Querying feedbacks").extend())
}

/// Whether a MongoDB error is a unique index violation.
fn is_duplicate_key_error(err: &mongodb::error::Error) -> bool {
    matches!(
        &*err.kind,
        ErrorKind::Write(WriteFailure::WriteError(write_error)) if write_error.code == 11000
    )
}

/// Transitions the moderation state of a review. Moderator only.
///
/// The update carries the observed state as a precondition, so two
/// conflicting concurrent transitions cannot both apply.
async fn transition_review(
    ctx: &Context<'_>,
    id: Uuid,
    target_state: ModerationState,
) -> Result<Review> {
    let actor = Actor::from_context(ctx);
    let db_client = ctx.data::<Database>()?;
    let collection: Collection<Review> = db_client.collection::<Review>("reviews");
    let review = query_object(&collection, id)
        .await
        .map_err(|err| err.extend())?;
    authorize(actor, Action::Moderate, &Target::of_review(&review))
        .map_err(|err| err.extend())?;
    if !review.moderation_state.can_transition_to(target_state) {
        return Err(ReviewError::InvalidTransition {
            from: review.moderation_state,
            to: target_state,
        }
        .extend());
    }
    let current_timestamp = DateTime::now();
    let result = collection
        .update_one(
            doc! {"_id": id, "moderation_state": review.moderation_state },
            doc! {"$set": {"moderation_state": target_state, "last_updated_at": current_timestamp}},
            None,
        )
        .await
        .map_err(|_| ReviewError::Storage("Updating moderation state of review").extend())?;
    if result.modified_count == 0 {
        // Lost against a concurrent transition; report against the current state.
        let current = query_object(&collection, id)
            .await
            .map_err(|err| err.extend())?;
        return Err(ReviewError::InvalidTransition {
            from: current.moderation_state,
            to: target_state,
        }
        .extend());
    }
    query_object(&collection, id).await.map_err(|err| err.extend())
}

/// Transitions the moderation state of a feedback vote. Moderator only.
async fn transition_feedback(
    ctx: &Context<'_>,
    id: Uuid,
    target_state: ModerationState,
) -> Result<Feedback> {
    let actor = Actor::from_context(ctx);
    let db_client = ctx.data::<Database>()?;
    let collection: Collection<Feedback> = db_client.collection::<Feedback>("feedbacks");
    let feedback = query_object(&collection, id)
        .await
        .map_err(|err| err.extend())?;
    authorize(actor, Action::Moderate, &Target::of_feedback(&feedback))
        .map_err(|err| err.extend())?;
    if !feedback.moderation_state.can_transition_to(target_state) {
        return Err(ReviewError::InvalidTransition {
            from: feedback.moderation_state,
            to: target_state,
        }
        .extend());
    }
    let current_timestamp = DateTime::now();
    let result = collection
        .update_one(
            doc! {"_id": id, "moderation_state": feedback.moderation_state },
            doc! {"$set": {"moderation_state": target_state, "last_updated_at": current_timestamp}},
            None,
        )
        .await
        .map_err(|_| ReviewError::Storage("Updating moderation state of feedback").extend())?;
    if result.modified_count == 0 {
        let current = query_object(&collection, id)
            .await
            .map_err(|err| err.extend())?;
        return Err(ReviewError::InvalidTransition {
            from: current.moderation_state,
            to: target_state,
        }
        .extend());
    }
    query_object(&collection, id).await.map_err(|err| err.extend())
}

/// Builds the `$set` document for a review patch.
///
/// Only submitted fields are included. Returns `None` when the patch carries
/// no fields, so an empty update does not bump `last_updated_at`.
fn review_patch_document(
    rating: Option<Rating>,
    body: Option<String>,
    title: Option<String>,
    reviewer_name: Option<String>,
    show_identifier: Option<bool>,
    current_timestamp: &DateTime,
) -> Option<Document> {
    let mut fields = Document::new();
    if let Some(definitely_rating) = rating {
        fields.insert("rating", definitely_rating);
    }
    if let Some(definitely_body) = body {
        fields.insert("body", definitely_body);
    }
    if let Some(definitely_title) = title {
        fields.insert("title", definitely_title);
    }
    if let Some(definitely_reviewer_name) = reviewer_name {
        fields.insert("reviewer_name", definitely_reviewer_name);
    }
    if let Some(definitely_show_identifier) = show_identifier {
        fields.insert("show_identifier", definitely_show_identifier);
    }
    if fields.is_empty() {
        return None;
    }
    fields.insert("last_updated_at", *current_timestamp);
    Some(fields)
}

/// Maps the outcome of the review duplicate guard to the surfaced error.
///
/// `existing_id` is the review found for the same (user, product) pair,
/// either by the pre-insert check or by the re-query after a unique index
/// violation. Without a conflicting review the duplicate-key error was not
/// caused by the guard and is reported as a storage fault.
fn duplicate_review_error(existing_id: Option<Uuid>) -> ReviewError {
    match existing_id {
        Some(id) => ReviewError::AlreadyReviewed(id),
        None => ReviewError::Storage("Adding review"),
    }
}

/// Maps the outcome of the feedback duplicate guard to the surfaced error.
fn duplicate_feedback_error(existing_id: Option<Uuid>) -> ReviewError {
    match existing_id {
        Some(id) => ReviewError::DuplicateVote(id),
        None => ReviewError::Storage("Adding feedback"),
    }
}

/// Locale captured at submission time, when the deployment tracks it.
fn locale_if_tracked(ctx: &Context<'_>, config: &ServiceConfig) -> Option<String> {
    if config.track_locale {
        ctx.data_opt::<ClientLocale>().map(|locale| locale.0.clone())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submission_with_suffixed_rating_is_normalized() {
        let (rating, body) = validate_submission("4 stars", "Solid product.", true).unwrap();
        assert_eq!(rating, Rating::FourStars);
        assert_eq!(body, "Solid product.");
    }

    #[test]
    fn submission_body_is_trimmed() {
        let (_, body) = validate_submission("5", "  Great!  ", true).unwrap();
        assert_eq!(body, "Great!");
    }

    #[test]
    fn submission_violations_are_collected_together() {
        let err = validate_submission("abc", "   ", false).unwrap_err();
        assert_eq!(
            err,
            ReviewError::Invalid(vec![
                ValidationIssue::InvalidRating,
                ValidationIssue::MissingBody,
                ValidationIssue::ProductNotFound,
            ])
        );
    }

    #[test]
    fn out_of_range_rating_is_rejected() {
        let err = validate_submission("6", "Fine.", true).unwrap_err();
        assert_eq!(
            err,
            ReviewError::Invalid(vec![ValidationIssue::InvalidRating])
        );
    }

    #[test]
    fn patch_without_fields_is_valid() {
        assert_eq!(validate_patch(None, None), Ok((None, None)));
    }

    #[test]
    fn patch_with_blank_body_is_rejected() {
        let err = validate_patch(Some("3"), Some(" ")).unwrap_err();
        assert_eq!(err, ReviewError::Invalid(vec![ValidationIssue::MissingBody]));
    }

    #[test]
    fn patch_normalizes_suffixed_rating() {
        let (rating, body) = validate_patch(Some("2 stars"), None).unwrap();
        assert_eq!(rating, Some(Rating::TwoStars));
        assert_eq!(body, None);
    }

    #[test]
    fn patch_document_contains_only_submitted_fields() {
        let current_timestamp = DateTime::now();
        let patch = review_patch_document(
            Some(Rating::TwoStars),
            None,
            Some("Updated title".to_string()),
            None,
            None,
            &current_timestamp,
        )
        .unwrap();
        assert!(patch.contains_key("rating"));
        assert!(patch.contains_key("title"));
        assert!(patch.contains_key("last_updated_at"));
        assert!(!patch.contains_key("body"));
        assert!(!patch.contains_key("reviewer_name"));
        assert!(!patch.contains_key("show_identifier"));
    }

    #[test]
    fn empty_patch_produces_no_update() {
        let current_timestamp = DateTime::now();
        assert_eq!(
            review_patch_document(None, None, None, None, None, &current_timestamp),
            None
        );
    }

    #[test]
    fn duplicate_review_surfaces_the_existing_id() {
        let existing_id = Uuid::new();
        assert_eq!(
            duplicate_review_error(Some(existing_id)),
            ReviewError::AlreadyReviewed(existing_id)
        );
    }

    #[test]
    fn duplicate_key_without_conflicting_review_is_a_storage_fault() {
        assert_eq!(
            duplicate_review_error(None),
            ReviewError::Storage("Adding review")
        );
    }

    #[test]
    fn duplicate_feedback_surfaces_the_existing_id() {
        let existing_id = Uuid::new();
        assert_eq!(
            duplicate_feedback_error(Some(existing_id)),
            ReviewError::DuplicateVote(existing_id)
        );
        assert_eq!(
            duplicate_feedback_error(None),
            ReviewError::Storage("Adding feedback")
        );
    }
}
