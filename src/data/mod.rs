//! Tabular data model shared by every store
//!
//! Entities are flattened into rows of typed fields before they reach a
//! store, and stores hand back the same shape on load:
//! - `DataField`: a named, typed cell with id/autogenerated flags
//! - `DataRow`: ordered fields with unique names
//! - `DataTable`: named rows plus the id column list; row 0 is the header

pub mod row;
pub mod table;
pub mod types;

pub use row::{DataField, DataRow};
pub use table::DataTable;
pub use types::{CacheKey, DataType, Value};
