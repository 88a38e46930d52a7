use async_graphql::{ComplexObject, Context, Error, Result, SimpleObject};
use bson::{Bson, Document, Uuid, doc};
use mongodb::{Collection, Database, options::FindOptions};
use mongodb_cursor_pagination::{FindResult, PaginatedCursor, error::CursorError};
use serde::{Deserialize, Serialize};

use crate::authentication::Actor;
use crate::graphql::query::review_visibility_filter;

use super::connection::base_connection::{BaseConnection, FindResultWrapper};
use super::connection::review_connection::ReviewConnection;
use super::order_datatypes::ReviewOrderInput;
use super::review::Review;

/// A user known to the service, replicated from identity events.
#[derive(Debug, Serialize, Deserialize, Hash, Eq, PartialEq, Copy, Clone, SimpleObject)]
#[graphql(complex)]
pub struct User {
    /// UUID of the user.
    pub _id: Uuid,
}

#[ComplexObject]
impl User {
    /// Retrieves the reviews written by this user.
    ///
    /// The user themselves and moderators see reviews in every moderation
    /// state; everyone else only sees the approved subset.
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
        let base_filter = doc! {"user._id": self._id};
        let filter = if actor.is_moderator() || actor.user_id() == Some(self._id) {
            base_filter
        } else {
            review_visibility_filter(actor, base_filter)
        };
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
}

impl From<User> for Bson {
    fn from(value: User) -> Self {
        Bson::Document(doc!("_id": value._id))
    }
}

impl From<Uuid> for User {
    fn from(value: Uuid) -> Self {
        User { _id: value }
    }
}
