//! sqlriver-elastic: Elasticsearch index backend
//!
//! Index creation via `PUT /{index}` and batch submission via the `_bulk`
//! NDJSON endpoint, over the async reqwest client.

mod bulk;
mod client;

pub use bulk::{classify_create_response, parse_bulk_response, render_bulk};
pub use client::{ElasticClient, ElasticSettings};
