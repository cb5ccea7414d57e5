// Operations
mod operations;
pub use operations::*;

// Results and errors
mod results;
pub use results::*;

// Documents
pub mod documents;
pub use documents::{CREATED_AT, ID_FIELD, UPDATED_AT};

pub use bson::{doc, oid::ObjectId, Bson, DateTime, Document};
