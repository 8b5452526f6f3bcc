pub mod btree;
pub mod cursor;
pub mod encoding;
pub mod pager;
pub mod row;
pub mod schema;
pub mod table;

pub use row::{Row, Value};
pub use schema::{Field, FieldType, Schema};
pub use table::Table;
