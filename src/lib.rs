//! Language services and LSP server for the Nevod pattern language.

pub mod analysis;
pub mod completion;
pub mod config;
pub mod diagnostics;
pub mod document;
pub mod error;
pub mod finders;
pub mod formatting;
pub mod info_table;
pub mod rename;
pub mod resolver;
pub mod server;
pub mod services;
pub mod syntax;
pub mod trivia;
pub mod types;
pub mod workspace;

pub use error::{Result, ServiceError};
pub use services::{Services, ServicesMode};
