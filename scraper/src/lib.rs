pub mod api;
pub mod cli;
pub mod config;
pub mod discussions;
pub mod error;
pub mod events;
pub mod run;
pub mod store;
pub mod supplemental;

#[cfg(test)]
mod tests;

pub use run::{run, Context, RunSummary};
