//! GraphQL surface: custom scalars and the dynamic schema built from the
//! synthesized mutation fields.

pub mod scalars;
pub mod schema;

pub use async_graphql::dynamic::Schema;
pub use schema::build_schema;
