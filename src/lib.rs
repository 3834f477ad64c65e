//! Linh - a small dynamically-typed scripting language
//!
//! Linh source runs through five stages, each usable on its own: a lexer
//! that tokenizes (and, for string interpolation, re-enters itself), a
//! recursive-descent parser that builds an AST, a semantic analyzer that
//! resolves scopes and folds package member access, a bytecode emitter
//! that lowers the AST to a flat instruction stream, and a stack VM that
//! runs it.
//!
//! # Quick Start
//!
//! ```
//! use linh::{lex, parse, SemanticAnalyzer, Emitter, Vm, NullPackageHost};
//!
//! let (mut program, parse_errors) = parse(lex("print(1 + 2);"));
//! assert!(parse_errors.is_empty());
//!
//! let host = NullPackageHost;
//! let sem_errors = SemanticAnalyzer::new(&host).analyze(&mut program, true);
//! assert!(sem_errors.is_empty());
//!
//! let emitted = Emitter::new().emit(&program).unwrap();
//!
//! let mut host = NullPackageHost;
//! Vm::new().execute(&emitted, &mut host).unwrap();
//! ```
//!
//! # Language
//!
//! - `var`/`vas`/`let`/`const` declarations, typed (`int32`, `str<16>`, ...)
//!   or inferred from an initializer
//! - Arithmetic (`+ - * / % #` floor division `**` power), bitwise, logical
//!   and comparison operators across a 15-tier precedence chain
//! - `if`/`else`, `while`, `do`/`while`, `for`, `switch`/`case`, `break`,
//!   `continue`
//! - `try`/`catch`/`finally`, with the caught value bound to the `catch`
//!   identifier's own variable slot
//! - Arrays and maps with literal syntax and `append`/`remove`/`clear`/
//!   `clone`/`pop`/`delete`/`keys`/`values`/`len` methods
//! - `&{ ... }` string interpolation
//! - User functions (`func`) and a fixed builtin set: `print`, `printf`,
//!   `input`, `str`, `int`, `uint`, `float`, `bool`, `len`, `id`, `type`,
//!   `pow`
//! - Package constants and functions (`math.pi`, `math.sqrt(x)`) resolved
//!   through the [`PackageHost`] trait, so embedders supply their own
//!   math/time packages without this crate depending on them
//!
//! # Not Supported
//!
//! - Classes, `this`/`new` beyond the no-op compatibility forms the
//!   grammar still parses
//! - Modules beyond the [`ModuleSource`] loading hook
//! - Async

mod ast;
mod bytecode;
mod emitter;
mod error;
mod intern;
mod lexer;
mod package;
mod parser;
mod semantic;
mod token;
mod value;
mod vm;

pub use ast::Program;
pub use bytecode::{BytecodeChunk, Instruction, OpCode, Operand};
pub use emitter::{EmittedProgram, Emitter};
pub use error::{Diagnostic, RuntimeError, Stage};
pub use lexer::lex;
pub use package::{ModuleSource, NullModuleSource, NullPackageHost, PackageHost};
pub use parser::parse;
pub use semantic::SemanticAnalyzer;
pub use token::Token;
pub use value::{Array, Function, FunctionObject, Map, Value};
pub use vm::Vm;
