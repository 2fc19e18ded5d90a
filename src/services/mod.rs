pub mod archive;
pub mod search_api;
