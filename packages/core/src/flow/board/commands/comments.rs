pub mod remove_comment;
pub mod upsert_comment;
