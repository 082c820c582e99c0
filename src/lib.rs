pub mod combine;
pub mod config;
pub mod domain;
pub mod edirect;
pub mod ena;
pub mod error;
pub mod merge;
pub mod output;
pub mod queries;
pub mod runner;
pub mod slim;
pub mod source;
pub mod store;
pub mod tabular;
