pub mod ai;
pub mod analyzer;
pub mod config;
pub mod docker;
pub mod error;
pub mod github;
pub mod parser;
pub mod pipeline;
pub mod scanner;
pub mod suggestor;

pub use analyzer::report::{Finding, FindingCategory, Recommendation, Report, Severity};
pub use config::Config;
pub use error::CollaboratorError;
pub use parser::dockerfile::Instruction;
pub use parser::runtime::Runtime;
