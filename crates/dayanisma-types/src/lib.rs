pub mod api;
pub mod events;
pub mod metadata;
pub mod models;
