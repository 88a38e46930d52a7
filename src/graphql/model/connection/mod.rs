pub mod base_connection;
pub mod review_connection;
