pub mod browser;
pub mod config;
pub mod constants;
pub mod dom;
pub mod error;
pub mod extract;
pub mod harvest;
pub mod logging;
pub mod output;
pub mod pipeline;
pub mod session;
pub mod types;
