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
use super::review::{ModerationState, Review};

/// A product known to the service, replicated from catalog events.
#[derive(Debug, Serialize, Deserialize, PartialEq, Copy, Clone, SimpleObject)]
#[graphql(complex)]
pub struct Product {
    /// UUID of the product.
    pub _id: Uuid,
}

#[ComplexObject]
impl Product {
    /// Retrieves the reviews of this product.
    ///
    /// The public set contains approved reviews only. Authenticated users
    /// additionally see their own pending or rejected reviews, moderators see
    /// everything.
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
        let filter = review_visibility_filter(actor, doc! {"product._id": self._id});
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

    /// Number of approved reviews of this product.
    async fn review_count<'a>(&self, ctx: &Context<'a>) -> Result<u64> {
        let db_client = ctx.data::<Database>()?;
        let collection: Collection<Review> = db_client.collection::<Review>("reviews");
        let filter = doc! {"product._id": self._id, "moderation_state": ModerationState::Approved};
        let count = collection
            .count_documents(filter, None)
            .await
            .map_err(|_| Error::new("Counting reviews failed in MongoDB."))?;
        Ok(count)
    }

    /// Average rating over the approved reviews of this product.
    ///
    /// `0.0` when the product has no approved reviews. Recomputed on every
    /// call over the complete approved set; no counters are maintained.
    async fn average_rating<'a>(
        &self,
        ctx: &Context<'a>,
        #[graphql(desc = "Rounds the average to the nearest integer.")] rounded: Option<bool>,
    ) -> Result<f64> {
        let db_client = ctx.data::<Database>()?;
        let collection: Collection<Review> = db_client.collection::<Review>("reviews");
        let filter = doc! {"product._id": self._id, "moderation_state": ModerationState::Approved};
        let mut cursor = collection
            .find(filter, None)
            .await
            .map_err(|_| Error::new("Retrieving reviews failed in MongoDB."))?;
        let mut reviews = Vec::new();
        while cursor
            .advance()
            .await
            .map_err(|_| Error::new("Retrieving reviews failed in MongoDB."))?
        {
            let review = cursor
                .deserialize_current()
                .map_err(|_| Error::new("Retrieving reviews failed in MongoDB."))?;
            reviews.push(review);
        }
        let average = calculate_average_rating(&reviews);
        if rounded.unwrap_or(false) {
            Ok(average.round())
        } else {
            Ok(average)
        }
    }
}

/// Arithmetic mean of the ratings of the given reviews, `0.0` for an empty
/// set.
pub fn calculate_average_rating(reviews: &[Review]) -> f64 {
    if reviews.is_empty() {
        return 0.0;
    }
    let total: u64 = reviews
        .iter()
        .map(|review| u64::from(review.rating.stars()))
        .sum();
    total as f64 / reviews.len() as f64
}

impl From<Product> for Bson {
    fn from(value: Product) -> Self {
        Bson::Document(doc!("_id": value._id))
    }
}

impl From<Uuid> for Product {
    fn from(value: Uuid) -> Self {
        Product { _id: value }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphql::model::review::Rating;
    use bson::DateTime;

    fn review_with_rating(rating: Rating) -> Review {
        Review {
            _id: Uuid::new(),
            user: None,
            product: Product { _id: Uuid::new() },
            title: None,
            body: "Does what it says.".to_string(),
            rating,
            reviewer_name: None,
            show_identifier: false,
            locale: None,
            origin_address: None,
            moderation_state: ModerationState::Approved,
            created_at: DateTime::now(),
            last_updated_at: DateTime::now(),
        }
    }

    #[test]
    fn average_of_empty_set_is_zero() {
        assert_eq!(calculate_average_rating(&[]), 0.0);
    }

    #[test]
    fn average_over_single_review_is_its_rating() {
        let reviews = vec![review_with_rating(Rating::FiveStars)];
        assert_eq!(calculate_average_rating(&reviews), 5.0);
    }

    #[test]
    fn average_covers_every_review_beyond_a_single_page() {
        let mut reviews: Vec<Review> = (0..30).map(|_| review_with_rating(Rating::FiveStars)).collect();
        reviews.extend((0..10).map(|_| review_with_rating(Rating::OneStars)));
        // (30 * 5 + 10 * 1) / 40
        assert_eq!(calculate_average_rating(&reviews), 4.0);
    }

    #[test]
    fn average_over_mixed_ratings() {
        let reviews = vec![
            review_with_rating(Rating::TwoStars),
            review_with_rating(Rating::ThreeStars),
            review_with_rating(Rating::FourStars),
        ];
        assert_eq!(calculate_average_rating(&reviews), 3.0);
        let reviews = vec![
            review_with_rating(Rating::FourStars),
            review_with_rating(Rating::FiveStars),
        ];
        assert_eq!(calculate_average_rating(&reviews), 4.5);
    }
}
