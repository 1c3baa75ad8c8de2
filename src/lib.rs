pub mod autosave;
pub mod cli;
pub mod config;
pub mod export;
pub mod model;
pub mod persistence;
pub mod photos;
pub mod placement;
pub mod sections;
pub mod session;
pub mod store;
pub mod templates;
pub mod util;
