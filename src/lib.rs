pub mod classfile;
pub mod config;
pub mod context;
pub mod disasm;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod filter;
pub mod insn;
pub mod mutants;
pub mod operators;
pub mod output;
pub mod prescan;
pub mod source;

pub use config::EngineConfig;
pub use engine::MutationEngine;
pub use error::{ConfigError, DecodeError, EngineError, PluginError};
pub use filter::{MethodFilter, MethodInfo};
pub use mutants::{ClassName, Mutant, MutationDetails, MutationIdentifier};
pub use operators::{Candidate, InsnCursor, MethodMutator, Mutator, OperatorRegistry};
pub use source::{ByteSource, DirectorySource, MemorySource};
