pub mod chat;
pub mod config;
pub mod feedback;
pub mod health;
pub mod models;
pub mod rag;
pub mod sessions;
pub mod tokens;
