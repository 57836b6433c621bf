// ABOUTME: PostgreSQL implementation of the source-database abstraction
// ABOUTME: Connection setup plus catalog and paging queries

pub mod connection;
pub mod source;

pub use connection::connect;
pub use source::PgConnectionFactory;
