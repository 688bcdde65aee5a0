//! Automatic conflict resolution for machine-translated LR grammars.

pub mod ast;
pub mod build;
pub mod conflict;
pub mod driver;
pub mod engine;
pub mod fuzz;
pub mod oracle;
pub mod origin;
pub mod patch;
pub mod reduce;
pub mod syntax;
pub mod types;
pub mod util;
