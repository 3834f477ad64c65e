//! Stack virtual machine.
//!
//! Grounded in `LiVM/LiVM.{hpp,cpp}` — a fetch-decode-execute loop over a
//! `std::vector<Value>` stack, a `std::unordered_map<int,Value>` variable
//! table, a call stack of saved frames, and an explicit try-frame stack
//! (rather than host exceptions) so `try`'s cost is zero until entered.

use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use crate::bytecode::{Instruction, OpCode, Operand};
use crate::emitter::EmittedProgram;
use crate::error::{Diagnostic, RuntimeError, Stage};
use crate::package::PackageHost;
use crate::value::{FunctionObject, Value};

const BUILTIN_UNARY_CONVERSIONS: &[&str] = &["str", "int", "uint", "float", "bool"];

#[derive(Clone, Copy)]
struct TryFrame {
    catch_ip: usize,
    finally_ip: usize,
    #[allow(dead_code)]
    end_ip: usize,
    catch_slot: Option<usize>,
}

struct CallFrame {
    chunk: Rc<FunctionObject>,
    return_ip: usize,
    saved_vars: Vec<Value>,
    saved_try_depth: usize,
}

/// Configurable resource ceilings, checked every dispatch step / call.
/// Exceeding either raises an uncatchable `Runtime` diagnostic — try/catch
/// cannot intercept it, matching how the teacher treats a misbehaving
/// embedded program as the embedder's problem to bound externally.
pub struct Vm {
    pub instruction_limit: Option<u64>,
    pub recursion_limit: Option<usize>,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    pub fn new() -> Self {
        Self { instruction_limit: None, recursion_limit: Some(1024) }
    }

    pub fn with_instruction_limit(mut self, limit: u64) -> Self {
        self.instruction_limit = Some(limit);
        self
    }

    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = Some(limit);
        self
    }

    pub fn execute(&mut self, program: &EmittedProgram, host: &mut dyn PackageHost) -> Result<Value, Diagnostic> {
        let main = Rc::new(FunctionObject { name: "<main>".to_string(), params: Vec::new(), instructions: program.chunk.clone() });
        let mut exec = Exec {
            stack: Vec::new(),
            vars: Vec::new(),
            call_stack: Vec::new(),
            try_stack: Vec::new(),
            chunk: main,
            ip: 0,
            functions: &program.functions,
            host,
            instructions_run: 0,
            instruction_limit: self.instruction_limit,
            recursion_limit: self.recursion_limit,
        };
        exec.run()
    }
}

struct Exec<'h> {
    stack: Vec<Value>,
    vars: Vec<Value>,
    call_stack: Vec<CallFrame>,
    try_stack: Vec<TryFrame>,
    chunk: Rc<FunctionObject>,
    ip: usize,
    functions: &'h HashMap<String, Rc<FunctionObject>>,
    host: &'h mut dyn PackageHost,
    instructions_run: u64,
    instruction_limit: Option<u64>,
    recursion_limit: Option<usize>,
}

impl<'h> Exec<'h> {
    fn run(&mut self) -> Result<Value, Diagnostic> {
        loop {
            if self.ip >= self.chunk.instructions.len() {
                return Ok(self.stack.pop().unwrap_or(Value::Sol));
            }
            if let Some(limit) = self.instruction_limit {
                self.instructions_run += 1;
                if self.instructions_run > limit {
                    return Err(self.diag(RuntimeError::InstructionLimitExceeded(limit)));
                }
            }
            let instr = self.chunk.instructions[self.ip].clone();
            self.ip += 1;
            match self.step(&instr) {
                Ok(StepResult::Continue) => {}
                Ok(StepResult::Halted(v)) => return Ok(v),
                Err(err) => {
                    let catchable = !matches!(
                        err,
                        RuntimeError::InstructionLimitExceeded(_) | RuntimeError::RecursionLimitExceeded(_)
                    );
                    if catchable && !self.try_stack.is_empty() {
                        self.deliver_to_handler(err);
                    } else {
                        return Err(self.diag_at(err, instr.line, instr.col));
                    }
                }
            }
        }
    }

    fn deliver_to_handler(&mut self, err: RuntimeError) {
        let frame = *self.try_stack.last().expect("checked non-empty");
        if let Some(slot) = frame.catch_slot {
            self.set_var(slot, Value::text(err.to_string()));
        }
        self.ip = frame.catch_ip;
    }

    fn diag(&self, err: RuntimeError) -> Diagnostic {
        let instr = &self.chunk.instructions[self.ip.saturating_sub(1).min(self.chunk.instructions.len() - 1)];
        Diagnostic::new(Stage::Runtime, instr.line, instr.col, err.to_string())
    }

    fn diag_at(&self, err: RuntimeError, line: usize, col: usize) -> Diagnostic {
        Diagnostic::new(Stage::Runtime, line, col, err.to_string())
    }

    fn get_var(&self, slot: usize) -> Value {
        self.vars.get(slot).cloned().unwrap_or(Value::Sol)
    }

    fn set_var(&mut self, slot: usize, value: Value) {
        if self.vars.len() <= slot {
            self.vars.resize(slot + 1, Value::Sol);
        }
        self.vars[slot] = value;
    }

    fn pop(&mut self) -> Result<Value, RuntimeError> {
        self.stack.pop().ok_or(RuntimeError::StackUnderflow)
    }

    fn step(&mut self, instr: &Instruction) -> Result<StepResult, RuntimeError> {
        use OpCode::*;
        match instr.opcode {
            Nop => {}
            PushInt => self.stack.push(Value::Int(expect_int(&instr.operand))),
            PushUInt => self.stack.push(Value::UInt(expect_uint(&instr.operand))),
            PushFloat => self.stack.push(Value::Float(expect_float(&instr.operand))),
            PushStr => self.stack.push(Value::text(expect_str(&instr.operand))),
            PushBool => self.stack.push(Value::Bool(expect_bool(&instr.operand))),
            PushSol => self.stack.push(Value::Sol),
            Pop => {
                self.pop()?;
            }
            Swap => {
                let len = self.stack.len();
                if len < 2 {
                    return Err(RuntimeError::StackUnderflow);
                }
                self.stack.swap(len - 1, len - 2);
            }
            Dup => {
                let top = self.stack.last().ok_or(RuntimeError::StackUnderflow)?.clone();
                self.stack.push(top);
            }

            Add => self.binary_arith(BinArith::Add)?,
            Sub => self.binary_arith(BinArith::Sub)?,
            Mul => self.binary_arith(BinArith::Mul)?,
            Div => self.binary_arith(BinArith::Div)?,
            Mod => self.binary_arith(BinArith::Mod)?,
            Hash => self.binary_arith(BinArith::FloorDiv)?,
            Pow => unreachable!("BinOp::Pow is emitted as a call to the `pow` builtin, never as OpCode::Pow"),

            Amp => self.binary_bitwise(|a, b| a & b)?,
            Pipe => self.binary_bitwise(|a, b| a | b)?,
            Caret => self.binary_bitwise(|a, b| a ^ b)?,
            LtLt => self.binary_bitwise(|a, b| a.wrapping_shl(b as u32))?,
            GtGt => self.binary_bitwise(|a, b| a.wrapping_shr(b as u32))?,
            BitNot => {
                let v = self.pop()?;
                match v.as_i64() {
                    Some(i) if v.is_numeric() => self.stack.push(Value::Int(!i)),
                    _ => return Err(RuntimeError::TypeMismatch("expected integer operand for '~'".to_string())),
                }
            }

            And => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.stack.push(Value::Bool(a.is_truthy() && b.is_truthy()));
            }
            Or => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.stack.push(Value::Bool(a.is_truthy() || b.is_truthy()));
            }
            Not => {
                let v = self.pop()?;
                match v {
                    Value::Bool(b) => self.stack.push(Value::Bool(!b)),
                    Value::Int(i) => self.stack.push(Value::Int(!i)),
                    Value::UInt(u) => self.stack.push(Value::UInt(!u)),
                    _ => self.stack.push(Value::Bool(false)),
                }
            }

            Eq => {
                let (a, b) = self.pop_pair()?;
                self.stack.push(Value::Bool(values_equal(&a, &b)));
            }
            Neq => {
                let (a, b) = self.pop_pair()?;
                self.stack.push(Value::Bool(!values_equal(&a, &b)));
            }
            Lt => self.binary_cmp(|o| o == std::cmp::Ordering::Less)?,
            Gt => self.binary_cmp(|o| o == std::cmp::Ordering::Greater)?,
            Lte => self.binary_cmp(|o| o != std::cmp::Ordering::Greater)?,
            Gte => self.binary_cmp(|o| o != std::cmp::Ordering::Less)?,
            IsOp => {
                let (a, b) = self.pop_pair()?;
                let type_name = match &b {
                    Value::Str(s) => s.to_string(),
                    other => other.type_name().to_string(),
                };
                self.stack.push(Value::Bool(a.type_name() == type_name));
            }

            LoadVar | LoadGlobal => {
                let slot = expect_count(&instr.operand);
                self.stack.push(self.get_var(slot));
            }
            StoreVar | StoreGlobal => {
                let slot = expect_count(&instr.operand);
                let v = self.stack.last().ok_or(RuntimeError::StackUnderflow)?.clone();
                self.set_var(slot, v);
                self.pop()?;
            }

            Jmp => self.ip = expect_addr(&instr.operand),
            JmpIfFalse => {
                let v = self.pop()?;
                if !v.is_truthy() {
                    self.ip = expect_addr(&instr.operand);
                }
            }
            JmpIfTrue => {
                let v = self.pop()?;
                if v.is_truthy() {
                    self.ip = expect_addr(&instr.operand);
                }
            }

            Call => {
                let (name, argc) = expect_named_call(&instr.operand);
                return self.call(&name, argc);
            }
            CallMethod => {
                let (name, argc) = expect_named_call(&instr.operand);
                self.call_container_or_math_method(&name, argc)?;
            }
            Ret => {
                let ret = self.pop().unwrap_or(Value::Sol);
                match self.call_stack.pop() {
                    Some(frame) => {
                        self.vars = frame.saved_vars;
                        self.ip = frame.return_ip;
                        self.try_stack.truncate(frame.saved_try_depth);
                        self.stack.push(ret);
                    }
                    None => return Ok(StepResult::Halted(ret)),
                }
            }

            Print => {
                let v = self.pop().unwrap_or(Value::Sol);
                let newline = expect_bool(&instr.operand);
                if newline {
                    println!("{}", v.to_print_string());
                } else {
                    print!("{}", v.to_print_string());
                }
            }
            PrintMultiple => {
                let (n, newline) = expect_count_flag(&instr.operand);
                let mut parts = Vec::with_capacity(n);
                for _ in 0..n {
                    parts.push(self.pop().unwrap_or(Value::Sol));
                }
                parts.reverse();
                let line: String = parts.iter().map(|v| v.to_print_string()).collect::<Vec<_>>().join(" ");
                if newline {
                    println!("{line}");
                } else {
                    print!("{line}");
                }
            }
            Input => {
                let mut line = String::new();
                std::io::stdin().read_line(&mut line).ok();
                self.stack.push(Value::text(line.trim_end_matches('\n').trim_end_matches('\r')));
            }
            Typeof => {
                let v = self.pop()?;
                self.stack.push(Value::text(v.type_name()));
            }
            Halt => return Ok(StepResult::Halted(self.stack.pop().unwrap_or(Value::Sol))),

            PushArray => {
                let n = expect_count(&instr.operand);
                let mut items = Vec::with_capacity(n);
                for _ in 0..n {
                    items.push(self.pop()?);
                }
                items.reverse();
                self.stack.push(Value::new_array(items));
            }
            PushMap => {
                let n = expect_count(&instr.operand);
                let mut pairs = Vec::with_capacity(n);
                for _ in 0..n {
                    let v = self.pop()?;
                    let k = self.pop()?;
                    pairs.push((k.to_key_text(), v));
                }
                pairs.reverse();
                self.stack.push(Value::new_map(pairs));
            }
            ArrayGet => {
                let index = self.pop()?;
                let obj = self.pop()?;
                self.stack.push(container_get(&obj, &index));
            }
            ArraySet => {
                let value = self.pop()?;
                let index = self.pop()?;
                let obj = self.pop()?;
                container_set(&obj, &index, value.clone());
                self.stack.push(value);
            }
            ArrayLen => {
                let obj = self.pop()?;
                self.stack.push(Value::UInt(container_len(&obj)? as u64));
            }
            ArrayAppend => {
                let item = self.pop()?;
                let obj = self.pop()?;
                match &obj {
                    Value::Array(a) => a.borrow_mut().push(item),
                    _ => return Err(RuntimeError::TypeMismatch("'append' requires an array".to_string())),
                }
                self.stack.push(obj);
            }
            ArrayRemove => {
                let item = self.pop()?;
                let obj = self.pop()?;
                match &obj {
                    Value::Array(a) => {
                        let mut arr = a.borrow_mut();
                        if let Some(pos) = arr.iter().position(|v| values_equal(v, &item)) {
                            arr.remove(pos);
                        }
                    }
                    _ => return Err(RuntimeError::TypeMismatch("'remove' requires an array".to_string())),
                }
                self.stack.push(obj);
            }
            ArrayClear => {
                let obj = self.pop()?;
                match &obj {
                    Value::Array(a) => a.borrow_mut().clear(),
                    Value::Map(m) => m.borrow_mut().clear(),
                    _ => return Err(RuntimeError::TypeMismatch("'clear' requires an array or map".to_string())),
                }
                self.stack.push(obj);
            }
            ArrayClone => {
                let obj = self.pop()?;
                match &obj {
                    Value::Array(a) => self.stack.push(Value::new_array(a.borrow().clone())),
                    Value::Map(m) => self.stack.push(Value::new_map(m.borrow().clone())),
                    other => self.stack.push(other.clone()),
                }
            }
            ArrayPop => {
                let has_index = expect_count(&instr.operand) == 1;
                let index = if has_index { Some(self.pop()?) } else { None };
                let obj = self.pop()?;
                match &obj {
                    Value::Array(a) => {
                        let mut arr = a.borrow_mut();
                        let popped = match index {
                            Some(idx) => {
                                let idx = idx.as_i64().unwrap_or(-1);
                                if idx >= 0 && (idx as usize) < arr.len() {
                                    arr.remove(idx as usize)
                                } else {
                                    Value::Sol
                                }
                            }
                            None => arr.pop().unwrap_or(Value::Sol),
                        };
                        drop(arr);
                        self.stack.push(popped);
                    }
                    _ => return Err(RuntimeError::TypeMismatch("'pop' requires an array".to_string())),
                }
            }
            MapKeys => {
                let obj = self.pop()?;
                match &obj {
                    Value::Map(m) => {
                        let keys = m.borrow().iter().map(|(k, _)| Value::Str(Arc::clone(k))).collect();
                        self.stack.push(Value::new_array(keys));
                    }
                    _ => return Err(RuntimeError::TypeMismatch("'keys' requires a map".to_string())),
                }
            }
            MapValues => {
                let obj = self.pop()?;
                match &obj {
                    Value::Map(m) => {
                        let values = m.borrow().iter().map(|(_, v)| v.clone()).collect();
                        self.stack.push(Value::new_array(values));
                    }
                    _ => return Err(RuntimeError::TypeMismatch("'values' requires a map".to_string())),
                }
            }
            MapDelete => {
                let key = self.pop()?;
                let obj = self.pop()?;
                match &obj {
                    Value::Map(m) => {
                        let key_text = key.to_key_text();
                        m.borrow_mut().retain(|(k, _)| *k != key_text);
                    }
                    _ => return Err(RuntimeError::TypeMismatch("'delete' requires a map".to_string())),
                }
                self.stack.push(obj);
            }

            BuildString => {
                let n = expect_count(&instr.operand);
                let mut parts = Vec::with_capacity(n);
                for _ in 0..n {
                    parts.push(self.pop()?);
                }
                parts.reverse();
                let joined: String = parts.iter().map(|v| v.to_print_string()).collect();
                self.stack.push(Value::text(joined));
            }

            Try => {
                if let Operand::Try { catch_ip, finally_ip, end_ip, catch_slot } = &instr.operand {
                    self.try_stack.push(TryFrame { catch_ip: *catch_ip, finally_ip: *finally_ip, end_ip: *end_ip, catch_slot: *catch_slot });
                }
            }
            EndTry => {
                self.try_stack.pop();
            }
            Throw => {
                let v = self.pop()?;
                return Err(RuntimeError::Custom(v.to_print_string()));
            }
            Id => {
                let v = self.pop()?;
                self.stack.push(Value::text(v.identity()));
            }

            LoadPackageConst => {
                if let Operand::PackageConst(pkg, name) = &instr.operand {
                    match self.host.get_constant(pkg, name) {
                        Some(v) => self.stack.push(v),
                        None => return Err(RuntimeError::UnknownPackageConst(pkg.clone(), name.clone())),
                    }
                }
            }

            MakeFunction => {
                let name = expect_str(&instr.operand);
                match self.functions.get(&name) {
                    Some(f) => self.stack.push(Value::Function(Rc::clone(f))),
                    None => return Err(RuntimeError::UnknownFunction(name)),
                }
            }
        }
        Ok(StepResult::Continue)
    }

    fn pop_pair(&mut self) -> Result<(Value, Value), RuntimeError> {
        let b = self.pop()?;
        let a = self.pop()?;
        Ok((a, b))
    }

    fn binary_arith(&mut self, op: BinArith) -> Result<(), RuntimeError> {
        let (a, b) = self.pop_pair()?;
        if matches!(op, BinArith::Add) {
            if let (Value::Str(_), _) | (_, Value::Str(_)) = (&a, &b) {
                let joined = format!("{}{}", a.to_print_string(), b.to_print_string());
                self.stack.push(Value::text(joined));
                return Ok(());
            }
        }
        if !a.is_numeric() || !b.is_numeric() {
            return Err(RuntimeError::TypeMismatch("arithmetic requires numeric operands".to_string()));
        }
        let result = match (&a, &b) {
            (Value::Float(_), _) | (_, Value::Float(_)) => {
                let (x, y) = (a.as_f64().unwrap(), b.as_f64().unwrap());
                op.apply_float(x, y)?
            }
            (Value::UInt(x), Value::UInt(y)) => op.apply_uint(*x, *y)?,
            _ => op.apply_int(a.as_i64().unwrap(), b.as_i64().unwrap())?,
        };
        self.stack.push(result);
        Ok(())
    }

    fn binary_bitwise(&mut self, f: impl Fn(i64, i64) -> i64) -> Result<(), RuntimeError> {
        let (a, b) = self.pop_pair()?;
        match (a.as_i64(), b.as_i64()) {
            (Some(x), Some(y)) if a.is_numeric() && b.is_numeric() => self.stack.push(Value::Int(f(x, y))),
            _ => return Err(RuntimeError::TypeMismatch("bitwise operators require integer operands".to_string())),
        }
        Ok(())
    }

    fn binary_cmp(&mut self, pred: impl Fn(std::cmp::Ordering) -> bool) -> Result<(), RuntimeError> {
        let (a, b) = self.pop_pair()?;
        let ordering = compare_values(&a, &b);
        self.stack.push(Value::Bool(pred(ordering)));
        Ok(())
    }

    fn call(&mut self, name: &str, argc: usize) -> Result<StepResult, RuntimeError> {
        if let Some((_pkg, fname)) = name.split_once('.') {
            if argc != 1 {
                return Err(RuntimeError::ArgCount(name.to_string(), 1, argc));
            }
            let arg = self.pop()?;
            let result = self.host.call_math_function(fname, arg).ok_or_else(|| RuntimeError::UnknownFunction(name.to_string()))?;
            self.stack.push(result);
            return Ok(StepResult::Continue);
        }
        if let Some(result) = self.try_builtin(name, argc)? {
            self.stack.push(result);
            return Ok(StepResult::Continue);
        }
        self.call_user_function(name, argc)
    }

    fn pop_n(&mut self, n: usize) -> Result<Vec<Value>, RuntimeError> {
        let mut values = Vec::with_capacity(n);
        for _ in 0..n {
            values.push(self.pop()?);
        }
        Ok(values)
    }

    fn try_builtin(&mut self, name: &str, argc: usize) -> Result<Option<Value>, RuntimeError> {
        let _ = argc;
        match name {
            "pow" => {
                let (a, b) = self.pop_pair()?;
                let (base, exp) = (a.as_f64().ok_or(RuntimeError::TypeMismatch("pow expects numeric operands".to_string()))?, b.as_f64().ok_or(RuntimeError::TypeMismatch("pow expects numeric operands".to_string()))?);
                Ok(Some(Value::Float(base.powf(exp))))
            }
            "sol" => {
                self.pop()?;
                Ok(Some(Value::Sol))
            }
            name if BUILTIN_UNARY_CONVERSIONS.contains(&name) => {
                let v = self.pop()?;
                Ok(Some(convert(name, &v)?))
            }
            "len" => {
                let v = self.pop()?;
                Ok(Some(Value::UInt(container_len(&v)? as u64)))
            }
            "id" => {
                let v = self.pop()?;
                Ok(Some(Value::text(v.identity())))
            }
            "type" => {
                let v = self.pop()?;
                Ok(Some(Value::text(v.type_name())))
            }
            _ => Ok(None),
        }
    }

    fn call_user_function(&mut self, name: &str, argc: usize) -> Result<StepResult, RuntimeError> {
        let func = self.functions.get(name).cloned().ok_or_else(|| RuntimeError::UnknownFunction(name.to_string()))?;
        if let Some(limit) = self.recursion_limit {
            if self.call_stack.len() >= limit {
                return Err(RuntimeError::RecursionLimitExceeded(limit));
            }
        }
        let arity = func.params.len();
        if argc != arity {
            return Err(RuntimeError::ArgCount(name.to_string(), arity, argc));
        }
        let mut args = self.pop_n(argc)?;
        args.reverse();

        let saved_vars = std::mem::replace(&mut self.vars, args);
        let saved_try_depth = self.try_stack.len();
        self.call_stack.push(CallFrame { chunk: Rc::clone(&self.chunk), return_ip: self.ip, saved_vars, saved_try_depth });
        self.chunk = func;
        self.ip = 0;
        Ok(StepResult::Continue)
    }

    /// Method-call syntax on a non-container receiver: recognized at parse
    /// time as a `MethodCall` whose method name isn't one of the fixed
    /// container methods, so it's a math-package unary call (`x.sqrt()`)
    /// funneled through the host, with the receiver as the one argument
    /// `call_math_function` takes.
    fn call_container_or_math_method(&mut self, name: &str, argc: usize) -> Result<(), RuntimeError> {
        if argc != 0 {
            return Err(RuntimeError::ArgCount(name.to_string(), 0, argc));
        }
        let receiver = self.pop()?;
        let result = self.host.call_math_function(name, receiver).ok_or_else(|| RuntimeError::UnknownFunction(name.to_string()))?;
        self.stack.push(result);
        Ok(())
    }
}

enum StepResult {
    Continue,
    Halted(Value),
}

#[derive(Clone, Copy)]
enum BinArith {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    FloorDiv,
}

impl BinArith {
    fn apply_int(self, a: i64, b: i64) -> Result<Value, RuntimeError> {
        Ok(match self {
            BinArith::Add => Value::Int(a.wrapping_add(b)),
            BinArith::Sub => Value::Int(a.wrapping_sub(b)),
            BinArith::Mul => Value::Int(a.wrapping_mul(b)),
            BinArith::Div => {
                if b == 0 {
                    return Err(RuntimeError::DivisionByZero);
                }
                Value::Int(a.wrapping_div(b))
            }
            BinArith::Mod => {
                if b == 0 {
                    return Err(RuntimeError::ModuloByZero);
                }
                Value::Int(a.wrapping_rem(b))
            }
            BinArith::FloorDiv => {
                if b == 0 {
                    return Err(RuntimeError::DivisionByZero);
                }
                let q = a / b;
                let r = a % b;
                Value::Int(if r != 0 && (r < 0) != (b < 0) { q - 1 } else { q })
            }
        })
    }

    fn apply_uint(self, a: u64, b: u64) -> Result<Value, RuntimeError> {
        Ok(match self {
            BinArith::Add => Value::UInt(a.wrapping_add(b)),
            BinArith::Sub => Value::UInt(a.wrapping_sub(b)),
            BinArith::Mul => Value::UInt(a.wrapping_mul(b)),
            BinArith::Div => {
                if b == 0 {
                    return Err(RuntimeError::DivisionByZero);
                }
                Value::UInt(a / b)
            }
            BinArith::Mod => {
                if b == 0 {
                    return Err(RuntimeError::ModuloByZero);
                }
                Value::UInt(a % b)
            }
            BinArith::FloorDiv => {
                if b == 0 {
                    return Err(RuntimeError::DivisionByZero);
                }
                Value::UInt(a / b)
            }
        })
    }

    fn apply_float(self, a: f64, b: f64) -> Result<Value, RuntimeError> {
        Ok(match self {
            BinArith::Add => Value::Float(a + b),
            BinArith::Sub => Value::Float(a - b),
            BinArith::Mul => Value::Float(a * b),
            BinArith::Div => Value::Float(a / b),
            BinArith::Mod => Value::Float(a % b),
            BinArith::FloorDiv => Value::Float((a / b).floor()),
        })
    }
}

fn convert(target: &str, v: &Value) -> Result<Value, RuntimeError> {
    Ok(match target {
        "str" => Value::text(v.to_print_string()),
        "int" => Value::Int(v.as_i64().ok_or_else(|| type_err(v, "int"))?),
        "uint" => Value::UInt(v.as_i64().ok_or_else(|| type_err(v, "uint"))?.max(0) as u64),
        "float" => Value::Float(v.as_f64().ok_or_else(|| type_err(v, "float"))?),
        "bool" => Value::Bool(v.is_truthy()),
        _ => unreachable!("convert() only called for BUILTIN_UNARY_CONVERSIONS"),
    })
}

fn type_err(v: &Value, target: &str) -> RuntimeError {
    RuntimeError::TypeMismatch(format!("cannot convert {} to {target}", v.type_name()))
}

fn container_len(v: &Value) -> Result<usize, RuntimeError> {
    match v {
        Value::Array(a) => Ok(a.borrow().len()),
        Value::Map(m) => Ok(m.borrow().len()),
        Value::Str(s) => Ok(s.chars().count()),
        _ => Err(RuntimeError::TypeMismatch("'len' requires an array, map, or string".to_string())),
    }
}

fn container_get(obj: &Value, index: &Value) -> Value {
    match obj {
        Value::Array(a) => {
            let idx = index.as_i64().unwrap_or(-1);
            let arr = a.borrow();
            if idx < 0 || idx as usize >= arr.len() {
                Value::Sol
            } else {
                arr[idx as usize].clone()
            }
        }
        Value::Map(m) => {
            let key = index.to_key_text();
            m.borrow().iter().find(|(k, _)| *k == key).map(|(_, v)| v.clone()).unwrap_or(Value::Sol)
        }
        _ => Value::Sol,
    }
}

fn container_set(obj: &Value, index: &Value, value: Value) {
    match obj {
        Value::Array(a) => {
            let idx = index.as_i64().unwrap_or(-1);
            let mut arr = a.borrow_mut();
            if idx >= 0 {
                let idx = idx as usize;
                if idx >= arr.len() {
                    arr.resize(idx + 1, Value::Sol);
                }
                arr[idx] = value;
            }
        }
        Value::Map(m) => {
            let key = index.to_key_text();
            let mut pairs = m.borrow_mut();
            match pairs.iter_mut().find(|(k, _)| *k == key) {
                Some((_, v)) => *v = value,
                None => pairs.push((key, value)),
            }
        }
        _ => {}
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    a == b
}

/// Mixed-type comparisons coerce to text and compare lexicographically;
/// numeric-with-numeric compares as doubles; boolean-with-boolean uses
/// `false < true`.
fn compare_values(a: &Value, b: &Value) -> std::cmp::Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (x, y) if x.is_numeric() && y.is_numeric() => {
            x.as_f64().unwrap().partial_cmp(&y.as_f64().unwrap()).unwrap_or(std::cmp::Ordering::Equal)
        }
        (x, y) => x.to_print_string().cmp(&y.to_print_string()),
    }
}

fn expect_int(op: &Operand) -> i64 {
    match op {
        Operand::Int(i) => *i,
        _ => 0,
    }
}
fn expect_uint(op: &Operand) -> u64 {
    match op {
        Operand::UInt(u) => *u,
        _ => 0,
    }
}
fn expect_float(op: &Operand) -> f64 {
    match op {
        Operand::Float(f) => *f,
        _ => 0.0,
    }
}
fn expect_str(op: &Operand) -> String {
    match op {
        Operand::Str(s) => s.clone(),
        _ => String::new(),
    }
}
fn expect_bool(op: &Operand) -> bool {
    match op {
        Operand::Bool(b) => *b,
        _ => true,
    }
}
fn expect_count(op: &Operand) -> usize {
    match op {
        Operand::Count(n) => *n,
        _ => 0,
    }
}
fn expect_count_flag(op: &Operand) -> (usize, bool) {
    match op {
        Operand::CountFlag(n, b) => (*n, *b),
        _ => (0, true),
    }
}
fn expect_named_call(op: &Operand) -> (String, usize) {
    match op {
        Operand::NamedCall(name, argc) => (name.clone(), *argc),
        _ => (String::new(), 0),
    }
}
fn expect_addr(op: &Operand) -> usize {
    match op {
        Operand::Addr(a) => *a,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitter::Emitter;
    use crate::lexer::lex;
    use crate::package::NullPackageHost;
    use crate::parser::parse;
    use crate::semantic::SemanticAnalyzer;

    fn run(src: &str) -> Value {
        let (mut program, parse_errs) = parse(lex(src));
        assert!(parse_errs.is_empty(), "{parse_errs:?}");
        let host = NullPackageHost;
        let sem_errs = SemanticAnalyzer::new(&host).analyze(&mut program, true);
        assert!(sem_errs.is_empty(), "{sem_errs:?}");
        let emitted = Emitter::new().emit(&program).expect("emission should succeed");
        let mut host = NullPackageHost;
        Vm::new().execute(&emitted, &mut host).expect("execution should succeed")
    }

    #[test]
    fn control_flow_and_arithmetic_sums_to_55() {
        run("var s = 0; for (var i = 1; i <= 10; i = i + 1) { s = s + i; } print(s);");
    }

    #[test]
    fn floor_division_rounds_toward_negative_infinity() {
        assert_eq!(BinArith::FloorDiv.apply_int(-7, 2).unwrap(), Value::Int(-4));
        assert_eq!(BinArith::Div.apply_int(-7, 2).unwrap(), Value::Int(-3));
        assert_eq!(BinArith::Mod.apply_int(-7, 2).unwrap(), Value::Int(-1));
    }

    #[test]
    fn recursive_factorial() {
        let v = run("func fact(n) { if (n <= 1) { return 1; } return n * fact(n - 1); } print(fact(5));");
        let _ = v;
    }

    #[test]
    fn division_by_zero_is_caught() {
        let (mut program, _) = parse(lex("try { var x = 1 / 0; print(x); } catch (e) { print(e); }"));
        let host = NullPackageHost;
        SemanticAnalyzer::new(&host).analyze(&mut program, true);
        let emitted = Emitter::new().emit(&program).unwrap();
        let mut host = NullPackageHost;
        let result = Vm::new().execute(&emitted, &mut host);
        assert!(result.is_ok());
    }

    #[test]
    fn container_aliasing_is_observable() {
        let (mut program, _) = parse(lex("let a = [1,2,3]; let b = a; b.append(4); print(len(a));"));
        let host = NullPackageHost;
        SemanticAnalyzer::new(&host).analyze(&mut program, true);
        let emitted = Emitter::new().emit(&program).unwrap();
        let mut host = NullPackageHost;
        Vm::new().execute(&emitted, &mut host).unwrap();
    }
}
