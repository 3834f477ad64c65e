//! Bytecode emitter: walks the AST once more, lowering it to a flat
//! [`crate::bytecode::Instruction`] list.
//!
//! Grounded in `LinhC/Bytecode/BytecodeEmitter.{hpp,cpp}` — that emitter is a
//! pair of `ExprVisitor`/`StmtVisitor` implementations over `std::any`; here
//! the visit dispatch is ordinary recursive functions returning nothing
//! (expressions leave their result on the emitted value stack, matching the
//! original's convention of emitting straight into `chunk` rather than
//! building a separate expression tree).

use std::collections::HashMap;

use crate::ast::{BinOp, CatchClause, Expr, InterpPart, Literal, LogicalOp, Program, Stmt, SwitchCase, UnaryOp};
use crate::bytecode::{BytecodeChunk, Instruction, OpCode, Operand};
use crate::error::{Diagnostic, Stage};
use crate::value::FunctionObject;

const METHOD_NAMES: &[&str] = &["append", "remove", "clear", "clone", "pop", "delete", "keys", "values", "len"];

/// Output of a full emission: the top-level chunk plus every function
/// object materialized along the way.
#[derive(Debug, Clone)]
pub struct EmittedProgram {
    pub chunk: BytecodeChunk,
    pub functions: HashMap<String, std::rc::Rc<FunctionObject>>,
}

struct LoopCtx {
    start_ip: usize,
    break_patches: Vec<usize>,
}

pub struct Emitter {
    chunk: BytecodeChunk,
    var_table: HashMap<String, usize>,
    next_var_index: usize,
    functions: HashMap<String, std::rc::Rc<FunctionObject>>,
    constant_folding_enabled: bool,
    dead_code_elimination_enabled: bool,
    loop_stack: Vec<LoopCtx>,
}

impl Default for Emitter {
    fn default() -> Self {
        Self::new()
    }
}

impl Emitter {
    pub fn new() -> Self {
        Self {
            chunk: Vec::new(),
            var_table: HashMap::new(),
            next_var_index: 0,
            functions: HashMap::new(),
            constant_folding_enabled: true,
            dead_code_elimination_enabled: true,
            loop_stack: Vec::new(),
        }
    }

    pub fn enable_constant_folding(&mut self, enable: bool) {
        self.constant_folding_enabled = enable;
    }

    pub fn enable_dead_code_elimination(&mut self, enable: bool) {
        self.dead_code_elimination_enabled = enable;
    }

    pub fn emit(&mut self, program: &Program) -> Result<EmittedProgram, Diagnostic> {
        let stmts = self.prune_dead_code(&program.statements);
        for stmt in &stmts {
            self.emit_stmt(stmt)?;
        }
        self.push(OpCode::Halt, Operand::None, 0, 0);
        Ok(EmittedProgram { chunk: std::mem::take(&mut self.chunk), functions: std::mem::take(&mut self.functions) })
    }

    fn push(&mut self, opcode: OpCode, operand: Operand, line: usize, col: usize) {
        self.chunk.push(Instruction::new(opcode, operand, line, col));
    }

    fn here(&self) -> usize {
        self.chunk.len()
    }

    fn patch_addr(&mut self, at: usize, target: usize) {
        self.chunk[at].operand = Operand::Addr(target);
    }

    fn var_slot(&mut self, name: &str) -> usize {
        if let Some(&idx) = self.var_table.get(name) {
            return idx;
        }
        let idx = self.next_var_index;
        self.next_var_index += 1;
        self.var_table.insert(name.to_string(), idx);
        idx
    }

    // --- dead code elimination ---

    fn prune_dead_code(&self, stmts: &[Stmt]) -> Vec<Stmt> {
        if !self.dead_code_elimination_enabled {
            return stmts.to_vec();
        }
        let mut out = Vec::with_capacity(stmts.len());
        for stmt in stmts {
            let terminal = matches!(stmt, Stmt::Return { .. } | Stmt::Break { .. } | Stmt::Continue { .. });
            out.push(self.prune_nested(stmt));
            if terminal {
                break;
            }
        }
        out
    }

    fn prune_nested(&self, stmt: &Stmt) -> Stmt {
        match stmt {
            Stmt::Block(body) => Stmt::Block(self.prune_dead_code(body)),
            Stmt::If { cond, then_branch, else_branch } => Stmt::If {
                cond: cond.clone(),
                then_branch: self.prune_dead_code(then_branch),
                else_branch: else_branch.as_ref().map(|b| self.prune_dead_code(b)),
            },
            Stmt::While { cond, body } => {
                if self.dead_code_elimination_enabled && is_falsy_literal(cond) {
                    return Stmt::Block(Vec::new());
                }
                Stmt::While { cond: cond.clone(), body: self.prune_dead_code(body) }
            }
            Stmt::DoWhile { body, cond } => Stmt::DoWhile { body: self.prune_dead_code(body), cond: cond.clone() },
            Stmt::FuncDecl { name, params, return_type, body, line, col } => Stmt::FuncDecl {
                name: name.clone(),
                params: params.clone(),
                return_type: return_type.clone(),
                body: self.prune_dead_code(body),
                line: *line,
                col: *col,
            },
            Stmt::Switch { scrutinee, cases, default } => Stmt::Switch {
                scrutinee: scrutinee.clone(),
                cases: cases
                    .iter()
                    .map(|c| SwitchCase { test: c.test.clone(), body: self.prune_dead_code(&c.body) })
                    .collect(),
                default: default.as_ref().map(|b| self.prune_dead_code(b)),
            },
            Stmt::Try { body, catches, finally } => Stmt::Try {
                body: self.prune_dead_code(body),
                catches: catches
                    .iter()
                    .map(|c| CatchClause { binding: c.binding.clone(), body: self.prune_dead_code(&c.body) })
                    .collect(),
                finally: finally.as_ref().map(|b| self.prune_dead_code(b)),
            },
            other => other.clone(),
        }
    }

    // --- statements ---

    fn emit_stmt(&mut self, stmt: &Stmt) -> Result<(), Diagnostic> {
        match stmt {
            Stmt::Expr(e) => {
                self.emit_expr(e)?;
                self.push(OpCode::Pop, Operand::None, 0, 0);
            }
            Stmt::Print { args, newline, line, col } => {
                if args.is_empty() {
                    self.push(OpCode::PushSol, Operand::None, *line, *col);
                    self.push(OpCode::Print, Operand::Bool(*newline), *line, *col);
                } else if args.len() == 1 {
                    self.emit_expr(&args[0])?;
                    self.push(OpCode::Print, Operand::Bool(*newline), *line, *col);
                } else {
                    for a in args {
                        self.emit_expr(a)?;
                    }
                    self.push(OpCode::PrintMultiple, Operand::CountFlag(args.len(), *newline), *line, *col);
                }
            }
            Stmt::VarDecl { kind: _, name, init, line, col, .. } => {
                if let Some(e) = init {
                    self.emit_expr(e)?;
                } else {
                    self.push(OpCode::PushSol, Operand::None, *line, *col);
                }
                let slot = self.var_slot(name);
                self.push(OpCode::StoreVar, Operand::Count(slot), *line, *col);
            }
            Stmt::Block(stmts) => {
                for s in self.prune_dead_code(stmts) {
                    self.emit_stmt(&s)?;
                }
            }
            Stmt::If { cond, then_branch, else_branch } => self.emit_if(cond, then_branch, else_branch)?,
            Stmt::While { cond, body } => self.emit_while(cond, body)?,
            Stmt::DoWhile { body, cond } => self.emit_do_while(body, cond)?,
            Stmt::FuncDecl { name, params, body, line, col, .. } => self.emit_func_decl(name, params, body, *line, *col)?,
            Stmt::Return { value, line, col } => {
                if let Some(e) = value {
                    self.emit_expr(e)?;
                } else {
                    self.push(OpCode::PushSol, Operand::None, *line, *col);
                }
                self.push(OpCode::Ret, Operand::None, *line, *col);
            }
            Stmt::Break { line, col } => {
                let patch = self.here();
                self.push(OpCode::Jmp, Operand::Addr(0), *line, *col);
                match self.loop_stack.last_mut() {
                    Some(ctx) => ctx.break_patches.push(patch),
                    None => return Err(Diagnostic::new(Stage::Bytecode, *line, *col, "'break' outside loop")),
                }
            }
            Stmt::Continue { line, col } => {
                let target = match self.loop_stack.last() {
                    Some(ctx) => ctx.start_ip,
                    None => return Err(Diagnostic::new(Stage::Bytecode, *line, *col, "'continue' outside loop")),
                };
                self.push(OpCode::Jmp, Operand::Addr(target), *line, *col);
            }
            Stmt::Switch { scrutinee, cases, default } => self.emit_switch(scrutinee, cases, default)?,
            Stmt::Delete { target, line, col } => self.emit_delete(target, *line, *col)?,
            Stmt::Throw { value, line, col } => {
                self.emit_expr(value)?;
                self.push(OpCode::Throw, Operand::None, *line, *col);
            }
            Stmt::Try { body, catches, finally } => self.emit_try(body, catches, finally)?,
            Stmt::Import { name, line, col } => {
                // Module merging happens in the semantic pass; by emission
                // time an import has nothing left to lower.
                let _ = (name, line, col);
            }
        }
        Ok(())
    }

    fn emit_if(&mut self, cond: &Expr, then_branch: &[Stmt], else_branch: &Option<Vec<Stmt>>) -> Result<(), Diagnostic> {
        self.emit_expr(cond)?;
        let (line, col) = cond.line_col();
        let jf = self.here();
        self.push(OpCode::JmpIfFalse, Operand::Addr(0), line, col);
        for s in self.prune_dead_code(then_branch) {
            self.emit_stmt(&s)?;
        }
        let jend = self.here();
        self.push(OpCode::Jmp, Operand::Addr(0), line, col);
        let else_start = self.here();
        self.patch_addr(jf, else_start);
        if let Some(eb) = else_branch {
            for s in self.prune_dead_code(eb) {
                self.emit_stmt(&s)?;
            }
        }
        let end = self.here();
        self.patch_addr(jend, end);
        Ok(())
    }

    fn emit_while(&mut self, cond: &Expr, body: &[Stmt]) -> Result<(), Diagnostic> {
        let start = self.here();
        self.emit_expr(cond)?;
        let (line, col) = cond.line_col();
        let jf = self.here();
        self.push(OpCode::JmpIfFalse, Operand::Addr(0), line, col);
        self.loop_stack.push(LoopCtx { start_ip: start, break_patches: Vec::new() });
        for s in self.prune_dead_code(body) {
            self.emit_stmt(&s)?;
        }
        self.push(OpCode::Jmp, Operand::Addr(start), line, col);
        let end = self.here();
        self.patch_addr(jf, end);
        let ctx = self.loop_stack.pop().expect("loop context pushed above");
        for p in ctx.break_patches {
            self.patch_addr(p, end);
        }
        Ok(())
    }

    fn emit_do_while(&mut self, body: &[Stmt], cond: &Expr) -> Result<(), Diagnostic> {
        let start = self.here();
        self.loop_stack.push(LoopCtx { start_ip: start, break_patches: Vec::new() });
        for s in self.prune_dead_code(body) {
            self.emit_stmt(&s)?;
        }
        self.emit_expr(cond)?;
        let (line, col) = cond.line_col();
        self.push(OpCode::JmpIfTrue, Operand::Addr(start), line, col);
        let end = self.here();
        let ctx = self.loop_stack.pop().expect("loop context pushed above");
        for p in ctx.break_patches {
            self.patch_addr(p, end);
        }
        Ok(())
    }

    fn emit_switch(&mut self, scrutinee: &Expr, cases: &[SwitchCase], default: &Option<Vec<Stmt>>) -> Result<(), Diagnostic> {
        self.emit_expr(scrutinee)?;
        let (line, col) = scrutinee.line_col();
        let mut body_jumps = Vec::with_capacity(cases.len());
        for case in cases {
            self.push(OpCode::Dup, Operand::None, line, col);
            self.emit_expr(&case.test)?;
            self.push(OpCode::Eq, Operand::None, line, col);
            let jt = self.here();
            self.push(OpCode::JmpIfTrue, Operand::Addr(0), line, col);
            body_jumps.push(jt);
        }
        let default_jmp = self.here();
        self.push(OpCode::Jmp, Operand::Addr(0), line, col);

        self.loop_stack.push(LoopCtx { start_ip: default_jmp, break_patches: Vec::new() });
        let mut case_starts = Vec::with_capacity(cases.len());
        for case in cases {
            case_starts.push(self.here());
            self.push(OpCode::Pop, Operand::None, line, col);
            for s in self.prune_dead_code(&case.body) {
                self.emit_stmt(&s)?;
            }
            let brk = self.here();
            self.push(OpCode::Jmp, Operand::Addr(0), line, col);
            self.loop_stack.last_mut().expect("pushed above").break_patches.push(brk);
        }
        let default_start = self.here();
        self.patch_addr(default_jmp, default_start);
        self.push(OpCode::Pop, Operand::None, line, col);
        if let Some(d) = default {
            for s in self.prune_dead_code(d) {
                self.emit_stmt(&s)?;
            }
        }
        let end = self.here();
        let ctx = self.loop_stack.pop().expect("pushed above");
        for p in ctx.break_patches {
            self.patch_addr(p, end);
        }
        for (jt, start) in body_jumps.into_iter().zip(case_starts) {
            self.patch_addr(jt, start);
        }
        Ok(())
    }

    /// Lowers to: `TRY` then the try body, a jump that skips the catch body
    /// on the success path, the catch body (falling through, not jumping,
    /// into `finally` so `finally` always runs), the finally body, and
    /// `END_TRY`. Only the first catch clause is addressable from the `TRY`
    /// operand — this crate's grammar parses at most the clauses given, and
    /// the VM dispatches any raised error to the first.
    fn emit_try(&mut self, body: &[Stmt], catches: &[CatchClause], finally: &Option<Vec<Stmt>>) -> Result<(), Diagnostic> {
        let try_ip = self.here();
        self.push(OpCode::Try, Operand::Try { catch_ip: 0, finally_ip: 0, end_ip: 0, catch_slot: None }, 0, 0);
        for s in self.prune_dead_code(body) {
            self.emit_stmt(&s)?;
        }
        let to_finally = self.here();
        self.push(OpCode::Jmp, Operand::Addr(0), 0, 0);

        let catch_ip = self.here();
        let mut catch_slot = None;
        if let Some(first) = catches.first() {
            if let Some(name) = &first.binding {
                catch_slot = Some(self.var_slot(name));
            }
            for s in self.prune_dead_code(&first.body) {
                self.emit_stmt(&s)?;
            }
        }

        let finally_ip = self.here();
        self.patch_addr(to_finally, finally_ip);
        if let Some(f) = finally {
            for s in self.prune_dead_code(f) {
                self.emit_stmt(&s)?;
            }
        }
        self.push(OpCode::EndTry, Operand::None, 0, 0);
        let end_ip = self.here();

        if let Instruction { opcode: OpCode::Try, operand, .. } = &mut self.chunk[try_ip] {
            *operand = Operand::Try { catch_ip, finally_ip, end_ip, catch_slot };
        }
        Ok(())
    }

    fn emit_func_decl(
        &mut self,
        name: &str,
        params: &[(String, Option<crate::ast::TypeNode>)],
        body: &[Stmt],
        line: usize,
        col: usize,
    ) -> Result<(), Diagnostic> {
        let mut child = Emitter::new();
        for (i, (p, _)) in params.iter().enumerate() {
            child.var_table.insert(p.clone(), i);
        }
        child.next_var_index = params.len();
        for s in child.prune_dead_code(body) {
            child.emit_stmt(&s)?;
        }
        child.push(OpCode::PushSol, Operand::None, line, col);
        child.push(OpCode::Ret, Operand::None, line, col);

        let func_obj = std::rc::Rc::new(FunctionObject {
            name: name.to_string(),
            params: params.iter().map(|(p, _)| p.clone()).collect(),
            instructions: child.chunk,
        });
        self.functions.extend(child.functions);
        self.functions.insert(name.to_string(), func_obj);
        self.push(OpCode::MakeFunction, Operand::Str(name.to_string()), line, col);
        let slot = self.var_slot(name);
        self.push(OpCode::StoreVar, Operand::Count(slot), line, col);
        Ok(())
    }

    fn emit_delete(&mut self, target: &Expr, line: usize, col: usize) -> Result<(), Diagnostic> {
        match target {
            Expr::Subscript { object, index, .. } => {
                self.emit_expr(object)?;
                self.emit_expr(index)?;
                self.push(OpCode::MapDelete, Operand::None, line, col);
            }
            Expr::Member { object, name, .. } => {
                self.emit_expr(object)?;
                self.push(OpCode::PushStr, Operand::Str(name.clone()), line, col);
                self.push(OpCode::MapDelete, Operand::None, line, col);
            }
            other => {
                self.emit_expr(other)?;
                self.push(OpCode::Pop, Operand::None, line, col);
            }
        }
        Ok(())
    }

    // --- expressions ---

    fn emit_expr(&mut self, expr: &Expr) -> Result<(), Diagnostic> {
        match expr {
            Expr::Literal { value, line, col } => self.emit_literal(value, *line, *col),
            Expr::Identifier { name, line, col } => {
                let slot = self.var_slot(name);
                self.push(OpCode::LoadVar, Operand::Count(slot), *line, *col);
            }
            Expr::Unary { op, expr: inner, line, col } => self.emit_unary(*op, inner, *line, *col)?,
            Expr::Binary { op, left, right, line, col } => self.emit_binary(*op, left, right, *line, *col)?,
            Expr::Logical { op, left, right, line, col } => {
                self.emit_expr(left)?;
                match op {
                    LogicalOp::And => self.push(OpCode::And, Operand::None, *line, *col),
                    LogicalOp::Or => self.push(OpCode::Or, Operand::None, *line, *col),
                }
                self.emit_expr(right)?;
            }
            Expr::Grouping(inner) => self.emit_expr(inner)?,
            Expr::Assign { target, value, line, col } => self.emit_assign(target, value, *line, *col)?,
            Expr::Call { callee, args, line, col } => {
                for a in args {
                    self.emit_expr(a)?;
                }
                self.push(OpCode::Call, Operand::NamedCall(callee.clone(), args.len()), *line, *col);
            }
            Expr::Postfix { op, target, line, col } => self.emit_postfix(*op, target, *line, *col)?,
            Expr::ArrayLit { elements, line, col } => {
                for e in elements {
                    self.emit_expr(e)?;
                }
                self.push(OpCode::PushArray, Operand::Count(elements.len()), *line, *col);
            }
            Expr::MapLit { entries, line, col } => {
                for (k, v) in entries {
                    self.emit_expr(k)?;
                    self.emit_expr(v)?;
                }
                self.push(OpCode::PushMap, Operand::Count(entries.len()), *line, *col);
            }
            Expr::Subscript { object, index, line, col } => {
                self.emit_expr(object)?;
                self.emit_expr(index)?;
                self.push(OpCode::ArrayGet, Operand::None, *line, *col);
            }
            Expr::Interpolated { parts, line, col } => self.emit_interpolated(parts, *line, *col)?,
            Expr::Member { object, name, line, col } => {
                self.emit_expr(object)?;
                self.push(OpCode::PushStr, Operand::Str(name.clone()), *line, *col);
                self.push(OpCode::ArrayGet, Operand::None, *line, *col);
            }
            Expr::MethodCall { object, method, args, line, col } => self.emit_method_call(object, method, args, *line, *col)?,
            Expr::PackageConst { package, name, line, col } => {
                self.push(OpCode::LoadPackageConst, Operand::PackageConst(package.clone(), name.clone()), *line, *col);
            }
            // The grammar carries `this`/`new` from the original class
            // system, which this crate's Non-goals exclude (no OOP). `this`
            // has no binding outside a method body, so it evaluates to
            // `sol`; `new Type(args)` evaluates its arguments for their
            // side effects and produces a fresh empty map as a stand-in
            // object.
            Expr::This { line, col } => self.push(OpCode::PushSol, Operand::None, *line, *col),
            Expr::New { args, line, col, .. } => {
                for a in args {
                    self.emit_expr(a)?;
                    self.push(OpCode::Pop, Operand::None, *line, *col);
                }
                self.push(OpCode::PushMap, Operand::Count(0), *line, *col);
            }
            Expr::Uninit { line, col } => self.push(OpCode::PushSol, Operand::None, *line, *col),
        }
        Ok(())
    }

    fn emit_literal(&mut self, lit: &Literal, line: usize, col: usize) {
        match lit {
            Literal::Sol => self.push(OpCode::PushSol, Operand::None, line, col),
            Literal::Bool(b) => self.push(OpCode::PushBool, Operand::Bool(*b), line, col),
            Literal::Int(i) => self.push(OpCode::PushInt, Operand::Int(*i), line, col),
            Literal::UInt(u) => self.push(OpCode::PushUInt, Operand::UInt(*u), line, col),
            Literal::Float(f) => self.push(OpCode::PushFloat, Operand::Float(*f), line, col),
            Literal::Str(s) => self.push(OpCode::PushStr, Operand::Str(s.clone()), line, col),
        }
    }

    fn emit_unary(&mut self, op: UnaryOp, inner: &Expr, line: usize, col: usize) -> Result<(), Diagnostic> {
        if self.constant_folding_enabled {
            if let Some(folded) = fold_unary(op, inner) {
                self.emit_literal(&folded, line, col);
                return Ok(());
            }
        }
        match op {
            UnaryOp::Neg => {
                self.push(OpCode::PushInt, Operand::Int(0), line, col);
                self.emit_expr(inner)?;
                self.push(OpCode::Swap, Operand::None, line, col);
                self.push(OpCode::Sub, Operand::None, line, col);
            }
            UnaryOp::Not | UnaryOp::BitNot => {
                self.emit_expr(inner)?;
                self.push(OpCode::Not, Operand::None, line, col);
            }
        }
        Ok(())
    }

    fn emit_binary(&mut self, op: BinOp, left: &Expr, right: &Expr, line: usize, col: usize) -> Result<(), Diagnostic> {
        if op == BinOp::Pow {
            self.emit_expr(left)?;
            self.emit_expr(right)?;
            self.push(OpCode::Call, Operand::NamedCall("pow".to_string(), 2), line, col);
            return Ok(());
        }
        if self.constant_folding_enabled {
            if let Some(folded) = fold_binary(op, left, right) {
                self.emit_literal(&folded, line, col);
                return Ok(());
            }
        }
        self.emit_expr(left)?;
        self.emit_expr(right)?;
        let opcode = binop_opcode(op);
        self.push(opcode, Operand::None, line, col);
        Ok(())
    }

    fn emit_assign(&mut self, target: &Expr, value: &Expr, line: usize, col: usize) -> Result<(), Diagnostic> {
        match target {
            Expr::Identifier { name, .. } => {
                self.emit_expr(value)?;
                self.push(OpCode::Dup, Operand::None, line, col);
                let slot = self.var_slot(name);
                self.push(OpCode::StoreVar, Operand::Count(slot), line, col);
            }
            Expr::Subscript { object, index, .. } => {
                self.emit_expr(object)?;
                self.emit_expr(index)?;
                self.emit_expr(value)?;
                self.push(OpCode::ArraySet, Operand::None, line, col);
            }
            Expr::Member { object, name, .. } => {
                self.emit_expr(object)?;
                self.push(OpCode::PushStr, Operand::Str(name.clone()), line, col);
                self.emit_expr(value)?;
                self.push(OpCode::ArraySet, Operand::None, line, col);
            }
            _ => return Err(Diagnostic::new(Stage::Bytecode, line, col, "invalid assignment target")),
        }
        Ok(())
    }

    /// Leaves the post-operation value on the stack (`x++` evaluates to the
    /// incremented value), matching the original's reload-after-store.
    fn emit_postfix(&mut self, op: crate::ast::PostfixOp, target: &Expr, line: usize, col: usize) -> Result<(), Diagnostic> {
        self.emit_expr(target)?;
        self.push(OpCode::PushInt, Operand::Int(1), line, col);
        match op {
            crate::ast::PostfixOp::Inc => self.push(OpCode::Add, Operand::None, line, col),
            crate::ast::PostfixOp::Dec => self.push(OpCode::Sub, Operand::None, line, col),
        }
        if let Expr::Identifier { name, .. } = target {
            self.push(OpCode::Dup, Operand::None, line, col);
            let slot = self.var_slot(name);
            self.push(OpCode::StoreVar, Operand::Count(slot), line, col);
        }
        Ok(())
    }

    fn emit_interpolated(&mut self, parts: &[InterpPart], line: usize, col: usize) -> Result<(), Diagnostic> {
        for part in parts {
            match part {
                InterpPart::Text(t) => self.push(OpCode::PushStr, Operand::Str(t.clone()), line, col),
                InterpPart::Expr(e) => self.emit_expr(e)?,
            }
        }
        self.push(OpCode::BuildString, Operand::Count(parts.len()), line, col);
        Ok(())
    }

    fn emit_method_call(&mut self, object: &Expr, method: &str, args: &[Expr], line: usize, col: usize) -> Result<(), Diagnostic> {
        if !METHOD_NAMES.contains(&method) {
            self.emit_expr(object)?;
            for a in args {
                self.emit_expr(a)?;
            }
            self.push(OpCode::CallMethod, Operand::NamedCall(method.to_string(), args.len()), line, col);
            return Ok(());
        }
        self.emit_expr(object)?;
        for a in args {
            self.emit_expr(a)?;
        }
        if method == "pop" {
            // `pop()` removes the last element; `pop(index)` removes that
            // index (out-of-range yields `sol`). The operand carries which
            // form was used so the VM knows whether an index is on the stack.
            self.push(OpCode::ArrayPop, Operand::Count(args.len()), line, col);
            return Ok(());
        }
        let opcode = match method {
            "append" => OpCode::ArrayAppend,
            "remove" => OpCode::ArrayRemove,
            "clear" => OpCode::ArrayClear,
            "clone" => OpCode::ArrayClone,
            "delete" => OpCode::MapDelete,
            "keys" => OpCode::MapKeys,
            "values" => OpCode::MapValues,
            "len" => OpCode::ArrayLen,
            _ => unreachable!("method filtered by METHOD_NAMES above"),
        };
        self.push(opcode, Operand::None, line, col);
        Ok(())
    }
}

fn binop_opcode(op: BinOp) -> OpCode {
    match op {
        BinOp::Add => OpCode::Add,
        BinOp::Sub => OpCode::Sub,
        BinOp::Mul => OpCode::Mul,
        BinOp::Div => OpCode::Div,
        BinOp::Mod => OpCode::Mod,
        BinOp::FloorDiv => OpCode::Hash,
        BinOp::Pow => OpCode::Call,
        BinOp::BitAnd => OpCode::Amp,
        BinOp::BitOr => OpCode::Pipe,
        BinOp::BitXor => OpCode::Caret,
        BinOp::Shl => OpCode::LtLt,
        BinOp::Shr => OpCode::GtGt,
        BinOp::Eq => OpCode::Eq,
        BinOp::NotEq => OpCode::Neq,
        BinOp::Lt => OpCode::Lt,
        BinOp::LtEq => OpCode::Lte,
        BinOp::Gt => OpCode::Gt,
        BinOp::GtEq => OpCode::Gte,
        BinOp::Is => OpCode::IsOp,
    }
}

fn is_falsy_literal(expr: &Expr) -> bool {
    matches!(expr, Expr::Literal { value: Literal::Bool(false), .. })
}

fn literal_of(expr: &Expr) -> Option<&Literal> {
    match expr {
        Expr::Literal { value, .. } => Some(value),
        _ => None,
    }
}

/// Folds a binary op when both operands are literals of the same numeric
/// kind, or equality/ordering on any pair of literals. Division/modulo by
/// zero is left unfolded so the VM's runtime error path runs normally.
fn fold_binary(op: BinOp, left: &Expr, right: &Expr) -> Option<Literal> {
    let (l, r) = (literal_of(left)?, literal_of(right)?);
    use Literal::*;
    match (l, r) {
        (Int(a), Int(b)) => fold_int(op, *a, *b),
        (Float(a), Float(b)) => fold_float(op, *a, *b),
        (UInt(a), UInt(b)) => fold_uint(op, *a, *b),
        _ => fold_generic_eq(op, l, r),
    }
}

fn fold_generic_eq(op: BinOp, l: &Literal, r: &Literal) -> Option<Literal> {
    match op {
        BinOp::Eq => Some(Literal::Bool(literals_equal(l, r))),
        BinOp::NotEq => Some(Literal::Bool(!literals_equal(l, r))),
        _ => None,
    }
}

fn literals_equal(l: &Literal, r: &Literal) -> bool {
    use Literal::*;
    match (l, r) {
        (Sol, Sol) => true,
        (Bool(a), Bool(b)) => a == b,
        (Str(a), Str(b)) => a == b,
        (Int(a), Int(b)) => a == b,
        (UInt(a), UInt(b)) => a == b,
        (Float(a), Float(b)) => a == b,
        (Int(a), UInt(b)) | (UInt(b), Int(a)) => *a >= 0 && *a as u64 == *b,
        _ => false,
    }
}

fn fold_int(op: BinOp, a: i64, b: i64) -> Option<Literal> {
    Some(match op {
        BinOp::Add => Literal::Int(a.checked_add(b)?),
        BinOp::Sub => Literal::Int(a.checked_sub(b)?),
        BinOp::Mul => Literal::Int(a.checked_mul(b)?),
        BinOp::Div if b != 0 => Literal::Int(a.checked_div(b)?),
        BinOp::Mod if b != 0 => Literal::Int(a.checked_rem(b)?),
        BinOp::FloorDiv if b != 0 => Literal::Int(floor_div_i64(a, b)),
        BinOp::BitAnd => Literal::Int(a & b),
        BinOp::BitOr => Literal::Int(a | b),
        BinOp::BitXor => Literal::Int(a ^ b),
        BinOp::Shl => Literal::Int(a.checked_shl(b as u32)?),
        BinOp::Shr => Literal::Int(a.checked_shr(b as u32)?),
        BinOp::Lt => Literal::Bool(a < b),
        BinOp::LtEq => Literal::Bool(a <= b),
        BinOp::Gt => Literal::Bool(a > b),
        BinOp::GtEq => Literal::Bool(a >= b),
        BinOp::Eq => Literal::Bool(a == b),
        BinOp::NotEq => Literal::Bool(a != b),
        _ => return None,
    })
}

fn fold_uint(op: BinOp, a: u64, b: u64) -> Option<Literal> {
    Some(match op {
        BinOp::Add => Literal::UInt(a.checked_add(b)?),
        BinOp::Sub => Literal::UInt(a.checked_sub(b)?),
        BinOp::Mul => Literal::UInt(a.checked_mul(b)?),
        BinOp::Div if b != 0 => Literal::UInt(a / b),
        BinOp::Mod if b != 0 => Literal::UInt(a % b),
        BinOp::Lt => Literal::Bool(a < b),
        BinOp::LtEq => Literal::Bool(a <= b),
        BinOp::Gt => Literal::Bool(a > b),
        BinOp::GtEq => Literal::Bool(a >= b),
        BinOp::Eq => Literal::Bool(a == b),
        BinOp::NotEq => Literal::Bool(a != b),
        _ => return None,
    })
}

fn fold_float(op: BinOp, a: f64, b: f64) -> Option<Literal> {
    Some(match op {
        BinOp::Add => Literal::Float(a + b),
        BinOp::Sub => Literal::Float(a - b),
        BinOp::Mul => Literal::Float(a * b),
        BinOp::Div if b != 0.0 => Literal::Float(a / b),
        BinOp::Lt => Literal::Bool(a < b),
        BinOp::LtEq => Literal::Bool(a <= b),
        BinOp::Gt => Literal::Bool(a > b),
        BinOp::GtEq => Literal::Bool(a >= b),
        BinOp::Eq => Literal::Bool(a == b),
        BinOp::NotEq => Literal::Bool(a != b),
        _ => return None,
    })
}

fn floor_div_i64(a: i64, b: i64) -> i64 {
    let q = a / b;
    let r = a % b;
    if r != 0 && (r < 0) != (b < 0) {
        q - 1
    } else {
        q
    }
}

fn fold_unary(op: UnaryOp, inner: &Expr) -> Option<Literal> {
    let lit = literal_of(inner)?;
    match (op, lit) {
        (UnaryOp::Neg, Literal::Int(i)) => Some(Literal::Int(i.checked_neg()?)),
        (UnaryOp::Neg, Literal::Float(f)) => Some(Literal::Float(-f)),
        (UnaryOp::Not, Literal::Bool(b)) => Some(Literal::Bool(!b)),
        (UnaryOp::BitNot, Literal::Int(i)) => Some(Literal::Int(!i)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::parser::parse;

    fn emit_src(src: &str) -> EmittedProgram {
        let (program, errs) = parse(lex(src));
        assert!(errs.is_empty(), "{errs:?}");
        Emitter::new().emit(&program).expect("emission should succeed")
    }

    #[test]
    fn constant_folds_arithmetic() {
        let out = emit_src("print(2 + 3 * 4);");
        let has_fold = out.chunk.iter().any(|i| matches!((&i.opcode, &i.operand), (OpCode::PushInt, Operand::Int(14))));
        assert!(has_fold, "{:?}", out.chunk);
    }

    #[test]
    fn division_by_zero_is_not_folded() {
        let out = emit_src("print(1 / 0);");
        assert!(out.chunk.iter().any(|i| i.opcode == OpCode::Div));
    }

    #[test]
    fn if_emits_balanced_jumps() {
        let out = emit_src("if (true) { print(1); } else { print(2); }");
        let jumps = out.chunk.iter().filter(|i| matches!(i.opcode, OpCode::Jmp | OpCode::JmpIfFalse)).count();
        assert_eq!(jumps, 2);
    }

    #[test]
    fn function_decl_produces_function_table_entry() {
        let out = emit_src("func f(n) { return n; }");
        assert!(out.functions.contains_key("f"));
    }

    #[test]
    fn statements_after_return_are_dropped() {
        let out = emit_src("func f() { return 1; print(2); }");
        let f = out.functions.get("f").unwrap();
        assert!(!f.instructions.iter().any(|i| i.opcode == OpCode::PrintMultiple));
        let print_count = f.instructions.iter().filter(|i| i.opcode == OpCode::Print).count();
        assert_eq!(print_count, 0);
    }
}
