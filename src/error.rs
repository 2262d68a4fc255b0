use thiserror::Error;

use crate::mutants::{ClassName, MutationIdentifier};

/// Boxed error raised by an operator plugin.
pub type PluginError = Box<dyn std::error::Error + Send + Sync>;

/// Malformed or unsupported class-file input.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unexpected end of input at byte {offset}")]
    UnexpectedEof { offset: usize },

    #[error("bad magic number {0:#010x}")]
    BadMagic(u32),

    #[error("unknown constant pool tag {tag} at index {index}")]
    BadConstantTag { tag: u8, index: u16 },

    #[error("constant pool index {index} is not a {expected}")]
    BadConstantIndex { index: u16, expected: &'static str },

    #[error("unknown opcode {opcode:#04x} at code offset {offset}")]
    UnknownOpcode { opcode: u8, offset: usize },

    #[error("malformed {what}: {detail}")]
    Malformed { what: &'static str, detail: String },
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("class {0} not found")]
    ClassNotFound(ClassName),

    #[error("failed to decode {class}: {source}")]
    Decode {
        class: ClassName,
        #[source]
        source: DecodeError,
    },

    #[error("mutation {0} not found; re-run discovery")]
    MutationNotFound(MutationIdentifier),

    #[error("operator {operator} failed: {source}")]
    Plugin {
        operator: String,
        #[source]
        source: PluginError,
    },

    #[error("operator {operator} produced {actual} bytes for a {expected} byte instruction at offset {offset}")]
    InvalidRewrite {
        operator: String,
        offset: usize,
        expected: usize,
        actual: usize,
    },

    #[error("failed to read {class}: {source}")]
    Io {
        class: ClassName,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("unknown mutator '{0}'")]
    UnknownMutator(String),

    #[error("operator id '{0}' registered twice")]
    DuplicateOperator(String),
}
