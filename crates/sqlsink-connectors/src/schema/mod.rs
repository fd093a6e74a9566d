//! Schema handling for incoming streams.
//!
//! - [`naming`] - Column and table identifier normalization
//! - [`flatten`] - Schema and record flattening
//! - [`types`] - JSON Schema to Arrow type mapping

pub mod flatten;
pub mod naming;
pub mod types;

pub use flatten::{flatten_record, flatten_schema, FlatSchema};
pub use naming::{flatten_key, inflect_column_name, table_name, MAX_IDENTIFIER_LEN};
pub use types::json_schema_to_arrow;
