use axum::{Json, debug_handler, extract::State, http::StatusCode};
use bson::Uuid;
use log::info;
use mongodb::Collection;
use serde::{Deserialize, Serialize};

use crate::graphql::model::{product::Product, user::User};

/// Data to send to Dapr in order to describe a subscription.
#[derive(Serialize)]
pub struct Pubsub {
    #[serde(rename(serialize = "pubsubName"))]
    pub pubsubname: String,
    pub topic: String,
    pub route: String,
}

/// Reponse data to send to Dapr when receiving an event.
#[derive(Serialize)]
pub struct TopicEventResponse {
    pub status: u8,
}

/// Default status is `0` -> Ok, according to Dapr specs.
impl Default for TopicEventResponse {
    fn default() -> Self {
        Self { status: 0 }
    }
}

/// Relevant part of Dapr event wrapped in a cloud envelope.
#[derive(Deserialize, Debug)]
pub struct Event {
    pub topic: String,
    pub data: EventData,
}

/// Relevant part of Dapr event data.
#[derive(Deserialize, Debug)]
pub struct EventData {
    pub id: Uuid,
}

/// Service state containing database connections.
#[derive(Clone)]
pub struct HttpEventServiceState {
    pub product_collection: Collection<Product>,
    pub user_collection: Collection<User>,
}

/// HTTP endpoint to list topic subsciptions.
pub async fn list_topic_subscriptions() -> Result<Json<Vec<Pubsub>>, StatusCode> {
    let pubsub_user = Pubsub {
        pubsubname: "pubsub".to_string(),
        topic: "user/user/created".to_string(),
        route: "/on-topic-event".to_string(),
    };
    let pubsub_product = Pubsub {
        pubsubname: "pubsub".to_string(),
        topic: "catalog/product/created".to_string(),
        route: "/on-topic-event".to_string(),
    };
    Ok(Json(vec![pubsub_user, pubsub_product]))
}

/// HTTP endpoint to receive user and product creation events.
///
/// The received ids populate the local replicas that review submissions are
/// validated against.
///
/// * `state` - Service state containing database connections.
/// * `event` - Event handled by endpoint.
#[debug_handler(state = HttpEventServiceState)]
pub async fn on_topic_event(
    State(state): State<HttpEventServiceState>,
    Json(event): Json<Event>,
) -> Result<Json<TopicEventResponse>, StatusCode> {
    info!("{:?}", event);

    match event.topic.as_str() {
        "user/user/created" => create_in_mongodb(&state.user_collection, event.data.id).await?,
        "catalog/product/created" => {
            create_in_mongodb(&state.product_collection, event.data.id).await?
        }
        _ => return Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
    Ok(Json(TopicEventResponse::default()))
}

/// Create a new object: `T` in MongoDB.
///
/// * `collection` - MongoDB collection to add newly created object to.
/// * `id` - UUID of newly created object.
pub async fn create_in_mongodb<T: Serialize + From<Uuid>>(
    collection: &Collection<T>,
    id: Uuid,
) -> Result<(), StatusCode> {
    let object = T::from(id);
    match collection.insert_one(object, None).await {
        Ok(_) => Ok(()),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}
