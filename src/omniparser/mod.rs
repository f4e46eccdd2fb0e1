//! Screenshot parsing through an OmniParser service, and the context setup
//! job that turns a screenshot folder into the docstore.

pub mod client;
pub mod setup;

pub use client::{parsed_text, OmniParserClient};
pub use setup::{ContextSetup, ContextSetupReport};
