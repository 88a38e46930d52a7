use mongodb_cursor_pagination::FindResult;

/// A page of nodes loaded from MongoDB together with pagination metadata.
///
/// Only used internally; every GraphQL connection type is a conversion target
/// of this struct.
#[derive(Debug)]
pub struct BaseConnection<Node> {
    /// The resulting entities.
    pub nodes: Vec<Node>,
    /// Whether this connection has a next page.
    pub has_next_page: bool,
    /// The total amount of items in this connection.
    pub total_count: u64,
}

/// Wrapper for `FindResult`, which enables conversions to `BaseConnection`
/// despite the orphan rule.
pub struct FindResultWrapper<Node>(pub FindResult<Node>);

impl<Node> From<FindResultWrapper<Node>> for BaseConnection<Node> {
    fn from(value: FindResultWrapper<Node>) -> Self {
        BaseConnection {
            nodes: value.0.items,
            has_next_page: value.0.page_info.has_next_page,
            total_count: value.0.total_count as u64,
        }
    }
}
