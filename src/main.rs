use std::{env, fs::File, io::Write};

use async_graphql::{
    EmptySubscription, SDLExportOptions, Schema, extensions::Logger, http::GraphiQLSource,
};
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};

use axum::{
    Router,
    extract::State,
    http::HeaderMap,
    response::{self, IntoResponse},
    routing::{get, post},
};
use clap::{Parser, arg, command};
use simple_logger::SimpleLogger;

use log::info;
use mongodb::{
    Client, Collection, Database, IndexModel,
    bson::doc,
    options::{ClientOptions, IndexOptions},
};

mod authentication;
mod authorization;
mod error;
mod event;
mod graphql;

use authentication::{AuthorizedUserHeader, ClientLocale, ClientOrigin};
use event::http_event_service::{HttpEventServiceState, list_topic_subscriptions, on_topic_event};
use graphql::model::feedback::Feedback;
use graphql::model::product::Product;
use graphql::model::review::Review;
use graphql::model::user::User;
use graphql::mutation::Mutation;
use graphql::query::Query;

/// Deployment configuration of the review service.
///
/// * `auto_approve` - Whether newly created reviews and feedback skip the
///   moderation queue and start out approved.
/// * `track_locale` - Whether the client locale is captured on submission.
#[derive(Debug, Clone, Copy)]
pub struct ServiceConfig {
    pub auto_approve: bool,
    pub track_locale: bool,
}

impl ServiceConfig {
    /// Reads the configuration from `AUTO_APPROVE_REVIEWS` and
    /// `TRACK_LOCALE`. Both default to `false`.
    fn from_env() -> Self {
        ServiceConfig {
            auto_approve: env_flag("AUTO_APPROVE_REVIEWS"),
            track_locale: env_flag("TRACK_LOCALE"),
        }
    }
}

fn env_flag(name: &str) -> bool {
    env::var(name)
        .map(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

/// Builds the GraphiQL frontend.
async fn graphiql() -> impl IntoResponse {
    response::Html(GraphiQLSource::build().endpoint("/").finish())
}

/// Establishes database connection and returns the client.
async fn db_connection() -> Client {
    let uri = match env::var_os("MONGODB_URI") {
        Some(uri) => uri.into_string().unwrap(),
        None => panic!("$MONGODB_URI is not set."),
    };

    // Parse a connection string into an options struct.
    let mut client_options = ClientOptions::parse(uri).await.unwrap();

    // Manually set an option.
    client_options.app_name = Some("ReviewService".to_string());

    // Get a handle to the deployment.
    Client::with_options(client_options).unwrap()
}

/// Creates the unique indexes backing the duplicate guards.
///
/// The partial index on reviews only covers authenticated submissions;
/// anonymous reviews are never deduplicated. The indexes close the
/// check-then-create race of concurrent submissions.
async fn ensure_indexes(db_client: &Database) {
    let review_collection: Collection<Review> = db_client.collection::<Review>("reviews");
    let review_index_options = IndexOptions::builder()
        .unique(true)
        .partial_filter_expression(doc! {"user._id": {"$exists": true}})
        .build();
    let review_index = IndexModel::builder()
        .keys(doc! {"product._id": 1, "user._id": 1})
        .options(review_index_options)
        .build();
    review_collection
        .create_index(review_index, None)
        .await
        .expect("Creating unique review index failed.");

    let feedback_collection: Collection<Feedback> = db_client.collection::<Feedback>("feedbacks");
    let feedback_index_options = IndexOptions::builder().unique(true).build();
    let feedback_index = IndexModel::builder()
        .keys(doc! {"review_id": 1, "user._id": 1})
        .options(feedback_index_options)
        .build();
    feedback_collection
        .create_index(feedback_index, None)
        .await
        .expect("Creating unique feedback index failed.");
}

/// Returns Router that establishes connection to Dapr.
///
/// Adds endpoints to define pub/sub interaction with Dapr.
async fn build_dapr_router(db_client: Database) -> Router {
    let product_collection: Collection<Product> = db_client.collection::<Product>("products");
    let user_collection: Collection<User> = db_client.collection::<User>("users");

    // Define routes.
    let app = Router::new()
        .route("/dapr/subscribe", get(list_topic_subscriptions))
        .route("/on-topic-event", post(on_topic_event))
        .with_state(HttpEventServiceState {
            product_collection,
            user_collection,
        });
    app
}

/// Command line argument to toggle schema generation instead of service execution.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Generates GraphQL schema in `./schemas/review-service.graphql`.
    #[arg(long)]
    generate_schema: bool,
}

/// Activates logger and parses argument for optional schema generation. Otherwise starts the service.
#[tokio::main]
async fn main() -> std::io::Result<()> {
    SimpleLogger::new().init().unwrap();

    let args = Args::parse();
    if args.generate_schema {
        let schema = Schema::build(Query, Mutation, EmptySubscription).finish();
        let mut file = File::create("./schemas/review-service.graphql")?;
        let sdl_export_options = SDLExportOptions::new().federation();
        let schema_sdl = schema.sdl_with_options(sdl_export_options);
        file.write_all(schema_sdl.as_bytes())?;
        info!("GraphQL schema: ./schemas/review-service.graphql was successfully generated!");
    } else {
        start_service().await;
    }
    Ok(())
}

/// Describes the handler for GraphQL requests.
///
/// Parses the "Authorized-User" header and writes it in the context data of the specific request.
/// Captures the client origin and locale of the submission.
/// Then executes the GraphQL schema with the request.
async fn graphql_handler(
    State(schema): State<Schema<Query, Mutation, EmptySubscription>>,
    headers: HeaderMap,
    req: GraphQLRequest,
) -> GraphQLResponse {
    let mut req = req.into_inner();
    if let Ok(authorized_user_header) = AuthorizedUserHeader::try_from(&headers) {
        req = req.data(authorized_user_header);
    }
    if let Ok(client_origin) = ClientOrigin::try_from(&headers) {
        req = req.data(client_origin);
    }
    if let Ok(client_locale) = ClientLocale::try_from(&headers) {
        req = req.data(client_locale);
    }
    schema.execute(req).await.into()
}

/// Starts review service on port 8080.
async fn start_service() {
    let client = db_connection().await;
    let db_client: Database = client.database("review-service-database");
    ensure_indexes(&db_client).await;

    let config = ServiceConfig::from_env();
    info!("{:?}", config);

    let schema = Schema::build(Query, Mutation, EmptySubscription)
        .extension(Logger)
        .data(db_client.clone())
        .data(config)
        .enable_federation()
        .finish();

    let graphiql = Router::new()
        .route("/", get(graphiql).post(graphql_handler))
        .with_state(schema);
    let dapr_router = build_dapr_router(db_client).await;
    let app = Router::new().merge(graphiql).merge(dapr_router);

    info!("GraphiQL IDE: http://0.0.0.0:8080");
    let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
