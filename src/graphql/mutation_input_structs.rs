use async_graphql::InputObject;
use bson::Uuid;

#[derive(InputObject)]
pub struct CreateReviewInput {
    /// UUID of product the review is about.
    pub product_id: Uuid,
    /// Rating of the review in 1-5 stars. A trailing non-numeric suffix
    /// (e.g. "5 stars") is tolerated.
    pub rating: String,
    /// Body of the review.
    pub body: String,
    /// Optional title of the review.
    pub title: Option<String>,
    /// Display name of the reviewer, used for anonymous submissions.
    pub reviewer_name: Option<String>,
    /// Flag if the reviewer name is shown publicly, by default set to false.
    pub show_identifier: Option<bool>,
}

#[derive(InputObject)]
pub struct UpdateReviewInput {
    /// UUID of review to update.
    pub id: Uuid,
    /// Rating of the review in 1-5 stars to update.
    pub rating: Option<String>,
    /// Body of the review to update.
    pub body: Option<String>,
    /// Title of the review to update.
    pub title: Option<String>,
    /// Display name of the reviewer to update.
    pub reviewer_name: Option<String>,
    /// Flag if the reviewer name is shown publicly.
    pub show_identifier: Option<bool>,
}

#[derive(InputObject)]
pub struct CreateFeedbackInput {
    /// UUID of the review the feedback is about.
    pub review_id: Uuid,
    /// `true` marks the review as helpful, `false` as unhelpful.
    pub helpful: bool,
}

#[derive(InputObject)]
pub struct UpdateFeedbackInput {
    /// UUID of feedback to update.
    pub id: Uuid,
    /// `true` marks the review as helpful, `false` as unhelpful.
    pub helpful: bool,
}
