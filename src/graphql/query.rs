use async_graphql::{Context, Error, ErrorExtensions, Object, Result};
use std::any::type_name;

use bson::{Document, Uuid, doc};
use mongodb::{Collection, Database, options::FindOptions};
use mongodb_cursor_pagination::{FindResult, PaginatedCursor, error::CursorError};
use serde::Deserialize;

use crate::authentication::Actor;
use crate::authorization::{Action, Target, authorize};
use crate::error::ReviewError;

use super::model::{
    connection::{
        base_connection::{BaseConnection, FindResultWrapper},
        review_connection::ReviewConnection,
    },
    feedback::Feedback,
    order_datatypes::ReviewOrderInput,
    product::Product,
    review::{ModerationState, Review},
    user::User,
};

/// Describes GraphQL review queries.
pub struct Query;

#[Object]
impl Query {
    /// Entity resolver for user of specific UUID.
    #[graphql(entity)]
    async fn user_entity_resolver<'a>(
        &self,
        ctx: &Context<'a>,
        #[graphql(desc = "UUID of user to retrieve.")] id: Uuid,
    ) -> Result<Option<User>> {
        let db_client = ctx.data::<Database>()?;
        let collection: Collection<User> = db_client.collection::<User>("users");
        query_object_optional(&collection, id)
            .await
            .map_err(|err| err.extend())
    }

    /// Entity resolver for product of specific UUID.
    #[graphql(entity)]
    async fn product_entity_resolver<'a>(
        &self,
        ctx: &Context<'a>,
        #[graphql(desc = "UUID of product to retrieve.")] id: Uuid,
    ) -> Result<Option<Product>> {
        let db_client = ctx.data::<Database>()?;
        let collection: Collection<Product> = db_client.collection::<Product>("products");
        query_object_optional(&collection, id)
            .await
            .map_err(|err| err.extend())
    }

    /// Retrieves reviews.
    ///
    /// Moderators see reviews in every moderation state, everyone else only
    /// sees the approved subset (plus their own reviews).
    async fn reviews<'a>(
        &self,
        ctx: &Context<'a>,
        #[graphql(desc = "Describes that the `first` N reviews should be retrieved.")]
        first: Option<u32>,
        #[graphql(desc = "Describes how many reviews should be skipped at the beginning.")]
        skip: Option<u64>,
        #[graphql(desc = "Specifies the order in which reviews are retrieved.")] order_by: Option<
            ReviewOrderInput,
        >,
    ) -> Result<ReviewConnection> {
        let db_client = ctx.data::<Database>()?;
        let collection: Collection<Review> = db_client.collection::<Review>("reviews");
        let actor = Actor::from_context(ctx);
        let review_order = order_by.unwrap_or_default();
        let sorting_doc = doc! {review_order.field.unwrap_or_default().as_str(): i32::from(review_order.direction.unwrap_or_default())};
        let find_options = FindOptions::builder()
            .skip(skip)
            .limit(first.map(|definitely_first| i64::from(definitely_first)))
            .sort(sorting_doc)
            .build();
        let filter = review_visibility_filter(actor, doc! {});
        let document_collection = collection.clone_with_type::<Document>();
        let maybe_find_results: Result<FindResult<Review>, CursorError> =
            PaginatedCursor::new(Some(find_options.clone()), None, None)
                .find(&document_collection, Some(&filter))
                .await;
        match maybe_find_results {
            Ok(find_results) => {
                let find_result_wrapper = FindResultWrapper(find_results);
                let connection = Into::<BaseConnection<Review>>::into(find_result_wrapper);
                Ok(Into::<ReviewConnection>::into(connection))
            }
            Err(_) => Err(Error::new("Retrieving reviews failed in MongoDB.")),
        }
    }

    /// Retrieves review of specific UUID.
    ///
    /// Non-approved reviews are only readable by their owner and moderators.
    async fn review<'a>(
        &self,
        ctx: &Context<'a>,
        #[graphql(desc = "UUID of review to retrieve.")] id: Uuid,
    ) -> Result<Review> {
        let db_client = ctx.data::<Database>()?;
        let collection: Collection<Review> = db_client.collection::<Review>("reviews");
        let actor = Actor::from_context(ctx);
        let review = query_object(&collection, id)
            .await
            .map_err(|err| err.extend())?;
        authorize(actor, Action::Read, &Target::of_review(&review))
            .map_err(|err| err.extend())?;
        Ok(review)
    }

    /// Entity resolver for review of specific UUID.
    #[graphql(entity)]
    async fn review_entity_resolver<'a>(
        &self,
        ctx: &Context<'a>,
        #[graphql(key, desc = "UUID of review to retrieve.")] id: Uuid,
    ) -> Result<Review> {
        self.review(ctx, id).await
    }

    /// Retrieves feedback of specific UUID.
    ///
    /// Non-approved feedback is only readable by its owner and moderators.
    async fn feedback<'a>(
        &self,
        ctx: &Context<'a>,
        #[graphql(desc = "UUID of feedback to retrieve.")] id: Uuid,
    ) -> Result<Feedback> {
        let db_client = ctx.data::<Database>()?;
        let collection: Collection<Feedback> = db_client.collection::<Feedback>("feedbacks");
        let actor = Actor::from_context(ctx);
        let feedback = query_object(&collection, id)
            .await
            .map_err(|err| err.extend())?;
        authorize(actor, Action::Read, &Target::of_feedback(&feedback))
            .map_err(|err| err.extend())?;
        Ok(feedback)
    }
}

/// Restricts a review filter to what the actor may see.
///
/// Moderators see everything, authenticated users additionally see their own
/// reviews, everyone else only the approved subset.
pub fn review_visibility_filter(actor: Actor, mut filter: Document) -> Document {
    match actor {
        Actor::User {
            is_moderator: true, ..
        } => filter,
        Actor::User { id, .. } => {
            filter.insert(
                "$or",
                vec![
                    doc! {"moderation_state": ModerationState::Approved},
                    doc! {"user._id": id},
                ],
            );
            filter
        }
        Actor::Anonymous => {
            filter.insert("moderation_state", ModerationState::Approved);
            filter
        }
    }
}

/// Shared function to query an object: `T` from a MongoDB collection of object: `T`.
///
/// * `collection` - MongoDB collection to query.
/// * `id` - UUID of object.
pub async fn query_object<T: for<'a> Deserialize<'a> + Unpin + Send + Sync>(
    collection: &Collection<T>,
    id: Uuid,
) -> Result<T, ReviewError> {
    match collection.find_one(doc! {"_id": id }, None).await {
        Ok(Some(object)) => Ok(object),
        Ok(None) => Err(ReviewError::NotFound {
            entity: type_name::<T>(),
            id,
        }),
        Err(_) => Err(ReviewError::Storage("Querying object")),
    }
}

/// Shared function to query an optional object: `T` from a MongoDB collection of object: `T`.
///
/// * `collection` - MongoDB collection to query.
/// * `id` - UUID of object.
pub async fn query_object_optional<T: for<'a> Deserialize<'a> + Unpin + Send + Sync>(
    collection: &Collection<T>,
    id: Uuid,
) -> Result<Option<T>, ReviewError> {
    match collection.find_one(doc! {"_id": id }, None).await {
        Ok(maybe_object) => Ok(maybe_object),
        Err(_) => Err(ReviewError::Storage("Querying object")),
    }
}
