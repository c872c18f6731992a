pub mod inject;
pub mod json;
pub mod pagination;

pub use inject::Inject;
pub use json::Json;
pub use pagination::Pagination;
