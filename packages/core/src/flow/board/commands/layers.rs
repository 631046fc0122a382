pub mod remove_layer;
pub mod upsert_layer;
