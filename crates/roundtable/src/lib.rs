//! Roundtable: a personal advisory board in the terminal.
//!
//! Wires the `coordination` debate engine to concrete adapters:
//! - [`provider::OpenAiCompatProvider`] for chat completions
//! - [`workspace::LocalWorkspace`] for search and calendar context
//! - [`app::App`] for the interactive loop

pub mod app;
pub mod cli;
pub mod config;
pub mod provider;
pub mod render;
pub mod telemetry;
pub mod workspace;
