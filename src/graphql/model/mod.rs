pub mod connection;
pub mod feedback;
pub mod order_datatypes;
pub mod product;
pub mod review;
pub mod user;
