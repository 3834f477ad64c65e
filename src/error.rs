//! Diagnostics: the uniform error type threaded through every pipeline stage.
//!
//! Each stage (lexer, parser, semantic analyzer, emitter, VM) raises its own
//! internal [`Error`] variants, which are converted into a [`Diagnostic`] —
//! a `(stage, line, col, message)` tuple whose `Display` impl renders the
//! single-line form `[Line L, Col C] <Stage>Error : <message>`.

use std::fmt;
use thiserror::Error;

/// Which pipeline stage raised a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Lexer,
    Parser,
    Semantic,
    Bytecode,
    Runtime,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Lexer => "Lexer",
            Stage::Parser => "Parser",
            Stage::Semantic => "Semantic",
            Stage::Bytecode => "Bytecode",
            Stage::Runtime => "Runtime",
        };
        write!(f, "{s}")
    }
}

/// A single reported error, positioned at a source location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub stage: Stage,
    pub line: usize,
    pub col: usize,
    pub message: String,
}

impl Diagnostic {
    pub fn new(stage: Stage, line: usize, col: usize, message: impl Into<String>) -> Self {
        Self { stage, line, col, message: message.into() }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[Line {} , Col {}] {}Error : {}", self.line, self.col, self.stage, self.message)
    }
}

impl std::error::Error for Diagnostic {}

/// Internal runtime error kinds, raised by the VM during dispatch.
///
/// These map 1:1 to the Runtime taxonomy in spec.md §7. A `Diagnostic` is
/// built from one of these plus the instruction's source position.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("Division by zero")]
    DivisionByZero,

    #[error("Modulo by zero")]
    ModuloByZero,

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("wrong number of arguments to '{0}': expected {1}, got {2}")]
    ArgCount(String, usize, usize),

    #[error("stack underflow")]
    StackUnderflow,

    #[error("unknown package constant '{0}.{1}'")]
    UnknownPackageConst(String, String),

    #[error("instruction limit of {0} exceeded")]
    InstructionLimitExceeded(u64),

    #[error("recursion limit of {0} exceeded")]
    RecursionLimitExceeded(usize),

    #[error("{0}")]
    Custom(String),
}
