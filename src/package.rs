//! Host hooks: collaborators the embedding application supplies.
//!
//! The original implementation's package manager (`LiPM`) resolves external
//! math/time packages and the module loader reads source files from disk.
//! Both are out of scope here (spec.md Non-goals) — this crate exposes them
//! as traits so an embedder can plug in real implementations, and ships a
//! null object for each so the pipeline runs standalone.

use crate::error::RuntimeError;
use crate::value::Value;

/// Resolves `package.constant` member expressions and the math package's
/// unary functions, the only two entry points the VM ever calls through to
/// an embedder. Which identifiers count as package names at all is decided
/// by the semantic analyzer's own fixed package list, not by this trait.
pub trait PackageHost {
    /// Look up a constant exposed by `package`, e.g. `math.pi`.
    fn get_constant(&self, package: &str, name: &str) -> Option<Value>;

    /// Invoke a math package unary function, e.g. `math.sqrt(2.0)`.
    fn call_math_function(&self, name: &str, arg: Value) -> Option<Value>;
}

/// A host with no packages registered; every lookup fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPackageHost;

impl PackageHost for NullPackageHost {
    fn get_constant(&self, _package: &str, _name: &str) -> Option<Value> {
        None
    }

    fn call_math_function(&self, _name: &str, _arg: Value) -> Option<Value> {
        None
    }
}

/// Resolves `import "name"` statements to source text.
pub trait ModuleSource {
    fn read(&self, name: &str) -> Result<String, RuntimeError>;
}

/// A module source with nothing mounted; every import fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullModuleSource;

impl ModuleSource for NullModuleSource {
    fn read(&self, name: &str) -> Result<String, RuntimeError> {
        Err(RuntimeError::Custom(format!("no module source configured for import '{name}'")))
    }
}
