pub mod audit;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod geometry;
pub mod grid;
pub mod interaction;
pub mod layout;
pub mod model;
pub mod persist;
pub mod store;
pub mod timing;
pub mod validate;

#[cfg(feature = "cli")]
pub use cli::run;
