mod document;
mod result_set;
mod row;

pub use document::{QueryDocument, QueryStatus};
pub use result_set::ResultSet;
pub use row::DbRow;
