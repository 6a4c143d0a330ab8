//! Storage layer: `VectorStore`, `MetadataStore`, `ConnectionGraph`
//! (spec §4.4–§4.6).

pub mod graph;
pub mod metadata;
pub mod migrations;
pub mod vector;

pub use graph::ConnectionGraph;
pub use metadata::{MetadataStore, SqliteMetadataStore, StoreError};
pub use vector::{UsearchVectorStore, VectorFilter, VectorPayload, VectorStore, VectorStoreError};
