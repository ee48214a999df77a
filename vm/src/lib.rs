pub mod natives;

use compiler::chunk::Instruction;
use compiler::error::{Backtrace, BacktraceFrame, CompileError, RuntimeError};
use compiler::value::{BoundMethod, Class, Closure, Instance, Interner, Native, Obj, Upvalue, Value};
use compiler::Compiler;
use std::cell::RefCell;
use std::collections::HashMap;
use std::io;
use std::rc::Rc;

const FRAMES_MAX: usize = 64;
const STACK_MAX: usize = FRAMES_MAX * 256;

/// The outcome of [`Vm::interpret`].
pub enum InterpretResult {
    Ok,
    CompileError(Vec<CompileError>),
    RuntimeError(RuntimeError),
}

/// One call frame: a closure, its instruction pointer,
/// and the base offset into the VM's shared operand stack where this
/// call's locals begin.
struct CallFrame {
    closure: Rc<Closure>,
    ip: usize,
    slots_base: usize,
}

/// A single execution context: operand stack, call frames, globals,
/// and open upvalues. Unlike a split `tmps`/`locals` stack pair,
/// locals and temporaries share one `stack` here, indexed by each
/// frame's `slots_base`, which is simpler than threading two parallel
/// vectors through every opcode.
pub struct Vm {
    stack: Vec<Value>,
    frames: Vec<CallFrame>,
    globals: HashMap<String, Value>,
    open_upvalues: Vec<Rc<RefCell<Upvalue>>>,
    interner: Interner,
    init_string: Rc<compiler::value::LoxString>,
}

impl Vm {
    pub fn new() -> Self {
        let mut interner = Interner::new();
        let init_string = interner.intern("init");
        let mut globals = HashMap::new();
        globals.insert(
            "clock".to_string(),
            Value::from(Rc::new(Native {
                name: "clock",
                arity: 0,
                function: natives::clock,
            })),
        );
        globals.insert(
            "type_of".to_string(),
            Value::from(Rc::new(Native {
                name: "type_of",
                arity: 1,
                function: natives::type_of,
            })),
        );
        Self {
            stack: Vec::with_capacity(STACK_MAX),
            frames: Vec::with_capacity(FRAMES_MAX),
            globals,
            open_upvalues: vec![],
            interner,
            init_string,
        }
    }

    /// Compiles and runs `source`, writing anything the program
    /// `print`s to `out`. `out` is taken as an explicit parameter
    /// rather than hardcoded to stdout so tests can capture output into a buffer.
    pub fn interpret(&mut self, source: &str, out: &mut dyn io::Write) -> InterpretResult {
        let function = match Compiler::compile(source, &mut self.interner) {
            Ok(function) => function,
            Err(errors) => return InterpretResult::CompileError(errors),
        };
        let closure = Rc::new(Closure {
            function,
            upvalues: vec![],
        });
        self.stack.push(Value::from(closure.clone()));
        self.frames.push(CallFrame {
            closure,
            ip: 0,
            slots_base: 0,
        });
        match self.run(out) {
            Ok(()) => InterpretResult::Ok,
            Err(err) => {
                self.stack.clear();
                self.frames.clear();
                InterpretResult::RuntimeError(err)
            }
        }
    }

    fn backtrace(&self) -> Backtrace {
        let frames = self
            .frames
            .iter()
            .rev()
            .map(|frame| BacktraceFrame {
                name: frame.closure.function.name.as_ref().map(|s| s.value.to_string()),
                line: frame.closure.function.chunk.line(frame.ip.saturating_sub(1)),
            })
            .collect();
        Backtrace { frames }
    }

    fn runtime_error(&self, message: impl Into<String>) -> RuntimeError {
        RuntimeError::new(message, self.backtrace())
    }

    // ---- stack plumbing ----

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> Value {
        self.stack.pop().expect("operand stack underflow")
    }

    fn peek(&self, distance: usize) -> &Value {
        &self.stack[self.stack.len() - 1 - distance]
    }

    // ---- upvalues ----

    fn capture_upvalue(&mut self, stack_index: usize) -> Rc<RefCell<Upvalue>> {
        for existing in &self.open_upvalues {
            if let Upvalue::Open(idx) = *existing.borrow() {
                if idx == stack_index {
                    return Rc::clone(existing);
                }
            }
        }
        let upvalue = Rc::new(RefCell::new(Upvalue::Open(stack_index)));
        self.open_upvalues.push(Rc::clone(&upvalue));
        upvalue
    }

    fn close_upvalues(&mut self, from: usize) {
        let stack = &self.stack;
        self.open_upvalues.retain(|upvalue| {
            let idx = match *upvalue.borrow() {
                Upvalue::Open(idx) => idx,
                Upvalue::Closed(_) => return false,
            };
            if idx >= from {
                *upvalue.borrow_mut() = Upvalue::Closed(stack[idx].clone());
                false
            } else {
                true
            }
        });
    }

    // ---- calling convention ----

    fn call_value(&mut self, callee: Value, argc: u8) -> Result<(), RuntimeError> {
        match callee {
            Value::Obj(Obj::Closure(closure)) => self.call_closure(closure, argc),
            Value::Obj(Obj::Native(native)) => self.call_native(native, argc),
            Value::Obj(Obj::Class(class)) => {
                let instance = Rc::new(RefCell::new(Instance::new(Rc::clone(&class))));
                let receiver_slot = self.stack.len() - argc as usize - 1;
                self.stack[receiver_slot] = Value::from(instance.clone());
                let initializer = class.borrow().methods.get(&*self.init_string.value).cloned();
                if let Some(initializer) = initializer {
                    self.call_closure(initializer, argc)
                } else if argc != 0 {
                    Err(RuntimeError::wrong_arity(0, argc as usize, self.backtrace()))
                } else {
                    Ok(())
                }
            }
            Value::Obj(Obj::BoundMethod(bound)) => {
                let receiver_slot = self.stack.len() - argc as usize - 1;
                self.stack[receiver_slot] = bound.receiver.clone();
                self.call_closure(Rc::clone(&bound.method), argc)
            }
            _ => Err(RuntimeError::not_callable(self.backtrace())),
        }
    }

    fn call_closure(&mut self, closure: Rc<Closure>, argc: u8) -> Result<(), RuntimeError> {
        if argc != closure.function.arity {
            return Err(RuntimeError::wrong_arity(
                closure.function.arity,
                argc as usize,
                self.backtrace(),
            ));
        }
        if self.frames.len() >= FRAMES_MAX {
            return Err(RuntimeError::stack_overflow(self.backtrace()));
        }
        let slots_base = self.stack.len() - argc as usize - 1;
        self.frames.push(CallFrame {
            closure,
            ip: 0,
            slots_base,
        });
        Ok(())
    }

    fn call_native(&mut self, native: Rc<Native>, argc: u8) -> Result<(), RuntimeError> {
        if argc != native.arity {
            return Err(RuntimeError::wrong_arity(
                native.arity,
                argc as usize,
                self.backtrace(),
            ));
        }
        let args_start = self.stack.len() - argc as usize;
        let result = {
            let args = &self.stack[args_start..];
            (native.function)(args, &mut self.interner)
        };
        self.stack.truncate(args_start - 1);
        match result {
            Ok(value) => {
                self.push(value);
                Ok(())
            }
            Err(message) => Err(self.runtime_error(message)),
        }
    }

    fn bind_method(&mut self, class: &Rc<RefCell<Class>>, name: &str) -> Result<(), RuntimeError> {
        let method = class.borrow().methods.get(name).cloned();
        match method {
            Some(method) => {
                let receiver = self.pop();
                let bound = Rc::new(BoundMethod { receiver, method });
                self.push(Value::from(bound));
                Ok(())
            }
            None => Err(RuntimeError::undefined_property(name, self.backtrace())),
        }
    }

    fn invoke_from_class(
        &mut self,
        class: &Rc<RefCell<Class>>,
        name: &str,
        argc: u8,
    ) -> Result<(), RuntimeError> {
        let method = class.borrow().methods.get(name).cloned();
        match method {
            Some(method) => self.call_closure(method, argc),
            None => Err(RuntimeError::undefined_property(name, self.backtrace())),
        }
    }

    fn invoke(&mut self, name: &str, argc: u8) -> Result<(), RuntimeError> {
        let receiver_slot = self.stack.len() - argc as usize - 1;
        let receiver = self.stack[receiver_slot].clone();
        let instance = match &receiver {
            Value::Obj(Obj::Instance(instance)) => Rc::clone(instance),
            _ => return Err(RuntimeError::only_instances_have_methods(self.backtrace())),
        };
        if let Some(field) = instance.borrow().fields.get(name).cloned() {
            self.stack[receiver_slot] = field.clone();
            return self.call_value(field, argc);
        }
        let class = Rc::clone(&instance.borrow().class);
        self.invoke_from_class(&class, name, argc)
    }

    // ---- dispatch loop ----

    fn run(&mut self, out: &mut dyn io::Write) -> Result<(), RuntimeError> {
        loop {
            if cfg!(feature = "trace") {
                let frame = self.frame();
                eprint!(
                    "          [{}]  {:04} {:?}\n",
                    self.stack
                        .iter()
                        .map(|v| format!("{v:?}"))
                        .collect::<Vec<_>>()
                        .join(", "),
                    frame.ip,
                    frame.closure.function.chunk.instruction(frame.ip)
                );
            }
            let instr = self.read_instruction();
            match instr {
                Instruction::Constant => {
                    let idx = self.read_byte() as usize;
                    let value = self.frame().closure.function.chunk.constant(idx);
                    self.push(value);
                }
                Instruction::Nil => self.push(Value::Nil),
                Instruction::True => self.push(Value::Bool(true)),
                Instruction::False => self.push(Value::Bool(false)),
                Instruction::Pop => {
                    self.pop();
                }
                Instruction::GetLocal => {
                    let slot = self.read_byte() as usize;
                    let base = self.frame().slots_base;
                    self.push(self.stack[base + slot].clone());
                }
                Instruction::SetLocal => {
                    let slot = self.read_byte() as usize;
                    let base = self.frame().slots_base;
                    self.stack[base + slot] = self.peek(0).clone();
                }
                Instruction::GetGlobal => {
                    let idx = self.read_byte() as usize;
                    let name = self.constant_string(idx);
                    match self.globals.get(&name) {
                        Some(value) => {
                            let value = value.clone();
                            self.push(value);
                        }
                        None => return Err(RuntimeError::undefined_variable(&name, self.backtrace())),
                    }
                }
                Instruction::SetGlobal => {
                    let idx = self.read_byte() as usize;
                    let name = self.constant_string(idx);
                    if !self.globals.contains_key(&name) {
                        return Err(RuntimeError::undefined_variable(&name, self.backtrace()));
                    }
                    let value = self.peek(0).clone();
                    self.globals.insert(name, value);
                }
                Instruction::DefineGlobal => {
                    let idx = self.read_byte() as usize;
                    let name = self.constant_string(idx);
                    let value = self.pop();
                    self.globals.insert(name, value);
                }
                Instruction::GetUpvalue => {
                    let idx = self.read_byte() as usize;
                    let upvalue = Rc::clone(&self.frame().closure.upvalues[idx]);
                    let value = match &*upvalue.borrow() {
                        Upvalue::Open(slot) => self.stack[*slot].clone(),
                        Upvalue::Closed(value) => value.clone(),
                    };
                    self.push(value);
                }
                Instruction::SetUpvalue => {
                    let idx = self.read_byte() as usize;
                    let value = self.peek(0).clone();
                    let upvalue = Rc::clone(&self.frame().closure.upvalues[idx]);
                    let slot = match &*upvalue.borrow() {
                        Upvalue::Open(slot) => Some(*slot),
                        Upvalue::Closed(_) => None,
                    };
                    match slot {
                        Some(slot) => self.stack[slot] = value,
                        None => *upvalue.borrow_mut() = Upvalue::Closed(value),
                    }
                }
                Instruction::GetProperty => {
                    let idx = self.read_byte() as usize;
                    let name = self.constant_string(idx);
                    let instance = match self.peek(0) {
                        Value::Obj(Obj::Instance(instance)) => Rc::clone(instance),
                        _ => {
                            return Err(RuntimeError::only_instances_have_properties(self.backtrace()))
                        }
                    };
                    if let Some(field) = instance.borrow().fields.get(&name).cloned() {
                        self.pop();
                        self.push(field);
                    } else {
                        let class = Rc::clone(&instance.borrow().class);
                        self.bind_method(&class, &name)?;
                    }
                }
                Instruction::SetProperty => {
                    let idx = self.read_byte() as usize;
                    let name = self.constant_string(idx);
                    let instance = match self.peek(1) {
                        Value::Obj(Obj::Instance(instance)) => Rc::clone(instance),
                        _ => {
                            return Err(RuntimeError::only_instances_have_properties(self.backtrace()))
                        }
                    };
                    let value = self.peek(0).clone();
                    instance.borrow_mut().fields.insert(name, value.clone());
                    self.pop();
                    self.pop();
                    self.push(value);
                }
                Instruction::GetSuper => {
                    let idx = self.read_byte() as usize;
                    let name = self.constant_string(idx);
                    let superclass = match self.pop() {
                        Value::Obj(Obj::Class(class)) => class,
                        _ => return Err(RuntimeError::superclass_must_be_a_class(self.backtrace())),
                    };
                    self.bind_method(&superclass, &name)?;
                }
                Instruction::Equal => {
                    let b = self.pop();
                    let a = self.pop();
                    self.push(Value::Bool(a == b));
                }
                Instruction::Greater => self.numeric_comparison(|a, b| a > b)?,
                Instruction::Less => self.numeric_comparison(|a, b| a < b)?,
                Instruction::Add => self.add()?,
                Instruction::Subtract => self.numeric_binary(|a, b| a - b)?,
                Instruction::Multiply => self.numeric_binary(|a, b| a * b)?,
                Instruction::Divide => self.numeric_binary(|a, b| a / b)?,
                Instruction::Not => {
                    let value = self.pop();
                    self.push(Value::Bool(!value.truthy()));
                }
                Instruction::Negate => {
                    let value = self.pop();
                    match value {
                        Value::Number(n) => self.push(Value::Number(-n)),
                        _ => return Err(RuntimeError::operands_must_be_numbers(self.backtrace())),
                    }
                }
                Instruction::Print => {
                    let value = self.pop();
                    let _ = writeln!(out, "{value}");
                }
                Instruction::Jump => {
                    let offset = self.read_u16();
                    self.frame_mut().ip += offset as usize;
                }
                Instruction::JumpIfFalse => {
                    let offset = self.read_u16();
                    if !self.peek(0).truthy() {
                        self.frame_mut().ip += offset as usize;
                    }
                }
                Instruction::Loop => {
                    let offset = self.read_u16();
                    self.frame_mut().ip -= offset as usize;
                }
                Instruction::Call => {
                    let argc = self.read_byte();
                    let callee = self.peek(argc as usize).clone();
                    self.call_value(callee, argc)?;
                }
                Instruction::Invoke => {
                    let idx = self.read_byte() as usize;
                    let name = self.constant_string(idx);
                    let argc = self.read_byte();
                    self.invoke(&name, argc)?;
                }
                Instruction::SuperInvoke => {
                    let idx = self.read_byte() as usize;
                    let name = self.constant_string(idx);
                    let argc = self.read_byte();
                    let superclass = match self.pop() {
                        Value::Obj(Obj::Class(class)) => class,
                        _ => return Err(RuntimeError::superclass_must_be_a_class(self.backtrace())),
                    };
                    self.invoke_from_class(&superclass, &name, argc)?;
                }
                Instruction::Closure => {
                    let idx = self.read_byte() as usize;
                    let function = match self.frame().closure.function.chunk.constant(idx) {
                        Value::Obj(Obj::Function(function)) => function,
                        _ => unreachable!("CLOSURE operand must be a function constant"),
                    };
                    let upvalue_count = function.upvalue_count;
                    let mut upvalues = Vec::with_capacity(upvalue_count);
                    for _ in 0..upvalue_count {
                        let is_local = self.read_byte() != 0;
                        let index = self.read_byte() as usize;
                        if is_local {
                            let base = self.frame().slots_base;
                            upvalues.push(self.capture_upvalue(base + index));
                        } else {
                            upvalues.push(Rc::clone(&self.frame().closure.upvalues[index]));
                        }
                    }
                    self.push(Value::from(Rc::new(Closure { function, upvalues })));
                }
                Instruction::CloseUpvalue => {
                    let top = self.stack.len() - 1;
                    self.close_upvalues(top);
                    self.pop();
                }
                Instruction::Return => {
                    let result = self.pop();
                    let frame = self.frames.pop().unwrap();
                    self.close_upvalues(frame.slots_base);
                    if self.frames.is_empty() {
                        self.stack.truncate(frame.slots_base);
                        return Ok(());
                    }
                    self.stack.truncate(frame.slots_base);
                    self.push(result);
                }
                Instruction::Class => {
                    let idx = self.read_byte() as usize;
                    let name = self.constant_name(idx);
                    self.push(Value::from(Rc::new(RefCell::new(Class::new(name)))));
                }
                Instruction::Inherit => {
                    let superclass = match self.peek(1) {
                        Value::Obj(Obj::Class(class)) => Rc::clone(class),
                        _ => return Err(RuntimeError::superclass_must_be_a_class(self.backtrace())),
                    };
                    let subclass = match self.peek(0) {
                        Value::Obj(Obj::Class(class)) => Rc::clone(class),
                        _ => unreachable!("INHERIT target must be a class"),
                    };
                    let inherited = superclass.borrow().methods.clone();
                    subclass.borrow_mut().methods.extend(inherited);
                    self.pop();
                }
                Instruction::Method => {
                    let idx = self.read_byte() as usize;
                    let name = self.constant_string(idx);
                    let method = match self.pop() {
                        Value::Obj(Obj::Closure(closure)) => closure,
                        _ => unreachable!("METHOD operand must be a closure"),
                    };
                    match self.peek(0) {
                        Value::Obj(Obj::Class(class)) => {
                            class.borrow_mut().methods.insert(name, method);
                        }
                        _ => unreachable!("METHOD target must be a class"),
                    }
                }
            }
        }
    }

    fn frame(&self) -> &CallFrame {
        self.frames.last().unwrap()
    }

    fn frame_mut(&mut self) -> &mut CallFrame {
        self.frames.last_mut().unwrap()
    }

    fn read_byte(&mut self) -> u8 {
        let frame = self.frame_mut();
        let byte = frame.closure.function.chunk.byte(frame.ip);
        frame.ip += 1;
        byte
    }

    fn read_instruction(&mut self) -> Instruction {
        Instruction::from(self.read_byte())
    }

    fn read_u16(&mut self) -> u16 {
        let hi = self.read_byte() as u16;
        let lo = self.read_byte() as u16;
        (hi << 8) | lo
    }

    fn constant_string(&self, idx: usize) -> String {
        match self.frame().closure.function.chunk.constant(idx) {
            Value::Obj(Obj::String(s)) => s.value.to_string(),
            _ => unreachable!("constant must be a string"),
        }
    }

    fn constant_name(&self, idx: usize) -> Rc<compiler::value::LoxString> {
        match self.frame().closure.function.chunk.constant(idx) {
            Value::Obj(Obj::String(s)) => s,
            _ => unreachable!("constant must be a string"),
        }
    }

    fn add(&mut self) -> Result<(), RuntimeError> {
        match (self.peek(1), self.peek(0)) {
            (Value::Number(_), Value::Number(_)) => self.numeric_binary(|a, b| a + b),
            (Value::Obj(Obj::String(_)), Value::Obj(Obj::String(_))) => {
                let b = self.pop();
                let a = self.pop();
                let (a, b) = (a.as_string().unwrap().value.clone(), b.as_string().unwrap().value.clone());
                let concatenated = format!("{a}{b}");
                let interned = self.interner.intern(&concatenated);
                self.push(Value::from(interned));
                Ok(())
            }
            _ => Err(RuntimeError::operands_must_be_numbers_or_strings(self.backtrace())),
        }
    }

    fn numeric_binary(&mut self, op: impl Fn(f64, f64) -> f64) -> Result<(), RuntimeError> {
        match (self.peek(1), self.peek(0)) {
            (Value::Number(_), Value::Number(_)) => {
                let b = self.pop();
                let a = self.pop();
                let (Value::Number(a), Value::Number(b)) = (a, b) else {
                    unreachable!()
                };
                self.push(Value::Number(op(a, b)));
                Ok(())
            }
            _ => Err(RuntimeError::operands_must_be_numbers(self.backtrace())),
        }
    }

    fn numeric_comparison(&mut self, op: impl Fn(f64, f64) -> bool) -> Result<(), RuntimeError> {
        match (self.peek(1), self.peek(0)) {
            (Value::Number(_), Value::Number(_)) => {
                let b = self.pop();
                let a = self.pop();
                let (Value::Number(a), Value::Number(b)) = (a, b) else {
                    unreachable!()
                };
                self.push(Value::Bool(op(a, b)));
                Ok(())
            }
            _ => Err(RuntimeError::operands_must_be_numbers(self.backtrace())),
        }
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

/// Renders a compile or runtime failure the way the CLI and REPL both
/// print it: colored, one message per line, with a
/// trailing backtrace for runtime errors.
pub fn report_compile_errors(errors: &[CompileError], source: &str) {
    for error in errors {
        eprintln!("{}", compiler::error::format_compile_error(error, source));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(source: &str) -> (InterpretResultKind, String) {
        let mut vm = Vm::new();
        let mut out = Vec::new();
        let result = vm.interpret(source, &mut out);
        let kind = match result {
            InterpretResult::Ok => InterpretResultKind::Ok,
            InterpretResult::CompileError(_) => InterpretResultKind::CompileError,
            InterpretResult::RuntimeError(e) => InterpretResultKind::RuntimeError(e.message),
        };
        (kind, String::from_utf8(out).unwrap())
    }

    #[derive(Debug, PartialEq, Eq)]
    enum InterpretResultKind {
        Ok,
        CompileError,
        RuntimeError(String),
    }

    #[test]
    fn arithmetic_precedence() {
        let (kind, out) = run("print 1 + 2 * 3;");
        assert_eq!(kind, InterpretResultKind::Ok);
        assert_eq!(out, "7\n");
    }

    #[test]
    fn string_concatenation_interns_the_result() {
        let (kind, out) = run(r#"print "foo" + "bar";"#);
        assert_eq!(kind, InterpretResultKind::Ok);
        assert_eq!(out, "foobar\n");
    }

    #[test]
    fn closures_share_captured_state() {
        let (kind, out) = run(
            r#"
            fun makeCounter() {
                var count = 0;
                fun counter() {
                    count = count + 1;
                    return count;
                }
                return counter;
            }
            var c = makeCounter();
            print c();
            print c();
            print c();
            "#,
        );
        assert_eq!(kind, InterpretResultKind::Ok);
        assert_eq!(out, "1\n2\n3\n");
    }

    #[test]
    fn classes_and_methods() {
        let (kind, out) = run(
            r#"
            class Greeter {
                greet(name) {
                    print "hello " + name;
                }
            }
            var g = Greeter();
            g.greet("world");
            "#,
        );
        assert_eq!(kind, InterpretResultKind::Ok);
        assert_eq!(out, "hello world\n");
    }

    #[test]
    fn inheritance_and_super() {
        let (kind, out) = run(
            r#"
            class Animal {
                speak() {
                    print "...";
                }
            }
            class Dog < Animal {
                speak() {
                    super.speak();
                    print "woof";
                }
            }
            Dog().speak();
            "#,
        );
        assert_eq!(kind, InterpretResultKind::Ok);
        assert_eq!(out, "...\nwoof\n");
    }

    #[test]
    fn initializer_implicitly_returns_this() {
        let (kind, out) = run(
            r#"
            class Point {
                init(x, y) {
                    this.x = x;
                    this.y = y;
                }
            }
            var p = Point(1, 2);
            print p.x;
            print p.y;
            "#,
        );
        assert_eq!(kind, InterpretResultKind::Ok);
        assert_eq!(out, "1\n2\n");
    }

    #[test]
    fn type_mismatch_is_a_runtime_error() {
        let (kind, _out) = run(r#"print 1 + "a";"#);
        assert_eq!(
            kind,
            InterpretResultKind::RuntimeError("Operands must be two numbers or two strings.".to_string())
        );
    }

    #[test]
    fn undefined_variable_is_a_runtime_error() {
        let (kind, _out) = run("print unknown;");
        assert_eq!(
            kind,
            InterpretResultKind::RuntimeError("Undefined variable 'unknown'.".to_string())
        );
    }

    #[test]
    fn calling_a_non_callable_is_a_runtime_error() {
        let (kind, _out) = run("var x = 1; x();");
        assert_eq!(
            kind,
            InterpretResultKind::RuntimeError("Can only call functions and classes.".to_string())
        );
    }

    #[test]
    fn locals_do_not_leak_past_their_block() {
        let (kind, _out) = run("{ var x = 1; } print x;");
        assert_eq!(
            kind,
            InterpretResultKind::RuntimeError("Undefined variable 'x'.".to_string())
        );
    }

    #[test]
    fn two_closures_over_the_same_local_share_writes() {
        let (kind, out) = run(
            r#"
            var getter = nil;
            var incrementer = nil;
            fun makePair() {
                var n = 0;
                fun get() { return n; }
                fun inc() { n = n + 1; }
                getter = get;
                incrementer = inc;
            }
            makePair();
            incrementer();
            incrementer();
            print getter();
            "#,
        );
        assert_eq!(kind, InterpretResultKind::Ok);
        assert_eq!(out, "2\n");
    }

    #[test]
    fn bound_method_keeps_its_original_receiver() {
        let (kind, out) = run(
            r#"
            class Greeter {
                greet() { print "hi " + this.name; }
            }
            var g1 = Greeter();
            g1.name = "g1";
            var m = g1.greet;
            var g2 = Greeter();
            g2.name = "g2";
            g1 = g2;
            m();
            "#,
        );
        assert_eq!(kind, InterpretResultKind::Ok);
        assert_eq!(out, "hi g1\n");
    }

    #[test]
    fn runtime_error_backtrace_reports_the_offending_line() {
        let mut vm = Vm::new();
        let mut out = Vec::new();
        let source = "var x = 1;\nprint x + \"a\";\n";
        match vm.interpret(source, &mut out) {
            InterpretResult::RuntimeError(err) => {
                assert_eq!(err.backtrace.frames.len(), 1);
                assert_eq!(err.backtrace.frames[0].line, 2);
                assert_eq!(err.backtrace.frames[0].name, None);
            }
            _ => panic!("expected a runtime error"),
        }
    }

    #[test]
    fn unreachable_strings_are_reclaimed_while_reachable_ones_persist() {
        let mut vm = Vm::new();
        let mut out = Vec::new();
        let source = r#"
            var kept = "kept-alive";
            {
                var ephemeral = "only-here";
                print ephemeral;
            }
            print kept;
        "#;
        assert!(matches!(vm.interpret(source, &mut out), InterpretResult::Ok));
        assert_eq!(String::from_utf8(out).unwrap(), "only-here\nkept-alive\n");
        // Once `interpret` returns, the script's closure (and the chunk
        // constant pool holding the compile-time "only-here" literal) has
        // no strong references left and is dropped; "kept" survives
        // because it's still reachable through `self.globals`. Plus the
        // interner's own "init" held by `init_string` for the VM's life.
        assert_eq!(vm.interner.live_count(), 2);
    }
}
