pub mod editing;
pub mod error;
pub mod request;
pub mod settings;
pub mod timeline;
pub mod types;
