pub mod chunk;
pub mod error;
pub mod value;

use chunk::{Chunk, Instruction};
use error::CompileError;
use lexer::{Scanner, Token, TokenKind};
use std::rc::Rc;
use value::{Function, Interner, LoxString, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    None,
    Assignment, // =
    Or,         // or
    And,        // and
    Equality,   // == !=
    Comparison, // < > <= >=
    Term,       // + -
    Factor,     // * /
    Unary,      // ! -
    Call,       // . ()
    Primary,
}

impl Precedence {
    fn next(self) -> Self {
        use Precedence::*;
        match self {
            None => Assignment,
            Assignment => Or,
            Or => And,
            And => Equality,
            Equality => Comparison,
            Comparison => Term,
            Term => Factor,
            Factor => Unary,
            Unary => Call,
            Call => Primary,
            Primary => Primary,
        }
    }
}

type ParseFn = fn(&mut Compiler, bool);

#[derive(Clone, Copy)]
struct ParseRule {
    prefix: Option<ParseFn>,
    infix: Option<ParseFn>,
    precedence: Precedence,
}

const fn rule(prefix: Option<ParseFn>, infix: Option<ParseFn>, precedence: Precedence) -> ParseRule {
    ParseRule {
        prefix,
        infix,
        precedence,
    }
}

fn get_rule(kind: TokenKind) -> ParseRule {
    use Precedence::*;
    use TokenKind::*;
    match kind {
        OParen => rule(Some(Compiler::grouping), Some(Compiler::call), Call),
        Dot => rule(None, Some(Compiler::dot), Call),
        Minus => rule(Some(Compiler::unary), Some(Compiler::binary), Term),
        Plus => rule(None, Some(Compiler::binary), Term),
        Slash => rule(None, Some(Compiler::binary), Factor),
        Star => rule(None, Some(Compiler::binary), Factor),
        Bang => rule(Some(Compiler::unary), None, None),
        BangEqual => rule(None, Some(Compiler::binary), Equality),
        EqualEqual => rule(None, Some(Compiler::binary), Equality),
        Greater => rule(None, Some(Compiler::binary), Comparison),
        GreaterEqual => rule(None, Some(Compiler::binary), Comparison),
        Less => rule(None, Some(Compiler::binary), Comparison),
        LessEqual => rule(None, Some(Compiler::binary), Comparison),
        Identifier => rule(Some(Compiler::variable), None, None),
        String => rule(Some(Compiler::string), None, None),
        Number => rule(Some(Compiler::number), None, None),
        And => rule(None, Some(Compiler::and_), And),
        Or => rule(None, Some(Compiler::or_), Or),
        False | True | Nil => rule(Some(Compiler::literal), None, None),
        Super => rule(Some(Compiler::super_), None, None),
        This => rule(Some(Compiler::this_), None, None),
        _ => rule(None, None, None),
    }
}

struct Local {
    name: String,
    /// `None` means "declared but not yet initialized" — the own-
    /// initializer sentinel calls depth `-1`.
    depth: Option<usize>,
    is_captured: bool,
}

struct UpvalueDesc {
    index: u8,
    is_local: bool,
}

/// Outcome of looking a name up in a function's own `locals`.
/// `Uninitialized` is the own-initializer sentinel: the local exists
/// (so it shadows any enclosing/global binding) but its `depth` hasn't
/// been set yet, because its initializer expression is still being
/// compiled.
enum LocalLookup {
    Found(usize),
    Uninitialized,
    NotFound,
}

/// Outcome of resolving a name as an upvalue into an enclosing function.
enum UpvalueLookup {
    Found(u8),
    Uninitialized,
    TooMany,
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FunctionType {
    Script,
    Function,
    Method,
    Initializer,
}

/// One nested compiler per function being compiled. The
/// chain of enclosing functions is modeled with `Box` + `mem::replace`
/// swaps rather than `Rc<RefCell<_>>` sharing — only one
/// `FunctionState` is ever live at a time (single-pass, single-
/// threaded), so unique ownership is enough and avoids interior
/// mutability that nothing needs (see DESIGN.md).
struct FunctionState {
    enclosing: Option<Box<FunctionState>>,
    function: Function,
    function_type: FunctionType,
    locals: Vec<Local>,
    upvalues: Vec<UpvalueDesc>,
    scope_depth: usize,
}

impl FunctionState {
    fn new(
        enclosing: Option<Box<FunctionState>>,
        function_type: FunctionType,
        name: Option<Rc<LoxString>>,
    ) -> Self {
        let reserved_name = match function_type {
            FunctionType::Method | FunctionType::Initializer => "this".to_string(),
            _ => String::new(),
        };
        Self {
            enclosing,
            function: Function {
                name,
                arity: 0,
                upvalue_count: 0,
                chunk: Chunk::new(),
            },
            function_type,
            locals: vec![Local {
                name: reserved_name,
                depth: Some(0),
                is_captured: false,
            }],
            upvalues: vec![],
            scope_depth: 0,
        }
    }

    /// Searches `locals` from the top (innermost/most-recently-declared
    /// first) so shadowing resolves to the nearest declaration. A local
    /// found with `depth == None` is still being initialized — its own
    /// initializer expression referencing it is the
    /// "read a local variable in its own initializer" case.
    fn resolve_local(&self, name: &str) -> LocalLookup {
        match self.locals.iter().enumerate().rev().find(|(_, local)| local.name == name) {
            Some((idx, local)) => match local.depth {
                Some(_) => LocalLookup::Found(idx),
                None => LocalLookup::Uninitialized,
            },
            None => LocalLookup::NotFound,
        }
    }

    fn add_upvalue(&mut self, index: u8, is_local: bool) -> Result<u8, ()> {
        for (i, up) in self.upvalues.iter().enumerate() {
            if up.index == index && up.is_local == is_local {
                return Ok(i as u8);
            }
        }
        if self.upvalues.len() >= u8::MAX as usize + 1 {
            return Err(());
        }
        self.upvalues.push(UpvalueDesc { index, is_local });
        self.function.upvalue_count = self.upvalues.len();
        Ok((self.upvalues.len() - 1) as u8)
    }
}

fn resolve_upvalue(state: &mut FunctionState, name: &str) -> UpvalueLookup {
    let enclosing = match state.enclosing.as_deref_mut() {
        Some(e) => e,
        None => return UpvalueLookup::NotFound,
    };
    match enclosing.resolve_local(name) {
        LocalLookup::Found(local_idx) => {
            enclosing.locals[local_idx].is_captured = true;
            match state.add_upvalue(local_idx as u8, true) {
                Ok(idx) => UpvalueLookup::Found(idx),
                Err(()) => UpvalueLookup::TooMany,
            }
        }
        LocalLookup::Uninitialized => UpvalueLookup::Uninitialized,
        LocalLookup::NotFound => match resolve_upvalue(enclosing, name) {
            UpvalueLookup::Found(up_idx) => match state.add_upvalue(up_idx, false) {
                Ok(idx) => UpvalueLookup::Found(idx),
                Err(()) => UpvalueLookup::TooMany,
            },
            other => other,
        },
    }
}

struct ClassState {
    has_superclass: bool,
}

/// Single-pass Pratt parser: the only compiler stage. Tokens come
/// straight from the [`Scanner`]; there is no intermediate AST — each parse function both consumes tokens and emits bytecode
/// into the current [`FunctionState`]'s chunk.
pub struct Compiler<'s> {
    source: &'s str,
    scanner: Scanner<'s>,
    interner: &'s mut Interner,
    previous: Token,
    current: Token,
    had_error: bool,
    panic_mode: bool,
    errors: Vec<CompileError>,
    state: Box<FunctionState>,
    classes: Vec<ClassState>,
}

impl<'s> Compiler<'s> {
    /// Compiles `source` into a top-level `Function` (whose `chunk` is
    /// the script body). `interner` is the same string table the VM
    /// will run against, passed explicitly rather than reached through
    /// global state.
    pub fn compile(source: &'s str, interner: &'s mut Interner) -> Result<Rc<Function>, Vec<CompileError>> {
        let mut scanner = Scanner::new(source);
        let current = scanner.next_token();
        let mut compiler = Compiler {
            source,
            scanner,
            interner,
            previous: current,
            current,
            had_error: false,
            panic_mode: false,
            errors: vec![],
            state: Box::new(FunctionState::new(None, FunctionType::Script, None)),
            classes: vec![],
        };
        compiler.advance();
        while !compiler.check(TokenKind::Eof) {
            compiler.declaration();
        }
        compiler.consume(TokenKind::Eof, "Expect end of expression.");
        let function = compiler.end_function();
        if compiler.had_error {
            Err(compiler.errors)
        } else {
            Ok(Rc::new(function))
        }
    }

    // ---- token stream plumbing ----

    fn advance(&mut self) {
        self.previous = self.current;
        loop {
            self.current = self.scanner.next_token();
            if self.current.kind != TokenKind::Error {
                break;
            }
            let message = self.current.error_message();
            self.error_at_current(message);
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn match_token(&mut self, kind: TokenKind) -> bool {
        if !self.check(kind) {
            return false;
        }
        self.advance();
        true
    }

    fn consume(&mut self, kind: TokenKind, message: &str) {
        if self.current.kind == kind {
            self.advance();
        } else {
            self.error_at_current(message);
        }
    }

    fn lexeme(&self, token: Token) -> &'s str {
        token.lexeme(self.source)
    }

    // ---- error reporting ----

    fn error_at_current(&mut self, message: impl Into<String>) {
        self.error_at(self.current, message);
    }

    fn error(&mut self, message: impl Into<String>) {
        self.error_at(self.previous, message);
    }

    fn error_at(&mut self, token: Token, message: impl Into<String>) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        self.had_error = true;
        self.errors.push(CompileError::new(token, message));
    }

    fn synchronize(&mut self) {
        self.panic_mode = false;
        while self.current.kind != TokenKind::Eof {
            if self.previous.kind == TokenKind::Semicolon {
                return;
            }
            use TokenKind::*;
            match self.current.kind {
                Class | Fun | Var | For | If | While | Print | Return => return,
                _ => {}
            }
            self.advance();
        }
    }

    // ---- bytecode emission ----

    fn chunk(&mut self) -> &mut Chunk {
        &mut self.state.function.chunk
    }

    fn emit(&mut self, instr: Instruction) {
        let line = self.previous.line;
        self.chunk().write_instr(instr, line);
    }

    fn emit_byte(&mut self, byte: u8) {
        let line = self.previous.line;
        self.chunk().write_byte(byte, line);
    }

    fn emit_two(&mut self, instr: Instruction, byte: u8) {
        self.emit(instr);
        self.emit_byte(byte);
    }

    fn emit_loop(&mut self, loop_start: usize) {
        let line = self.previous.line;
        if self.chunk().emit_loop(loop_start, line).is_err() {
            self.error("Loop body too large.");
        }
    }

    fn emit_jump(&mut self, instr: Instruction) -> usize {
        let line = self.previous.line;
        self.chunk().emit_jump(instr, line)
    }

    fn patch_jump(&mut self, offset: usize) {
        if self.chunk().patch_jump(offset).is_err() {
            self.error("Too much code to jump over.");
        }
    }

    fn make_constant(&mut self, value: Value) -> u8 {
        match self.chunk().add_constant(value) {
            Ok(idx) => idx,
            Err(()) => {
                self.error("Too many constants in one chunk.");
                0
            }
        }
    }

    fn emit_constant(&mut self, value: Value) {
        let idx = self.make_constant(value);
        self.emit_two(Instruction::Constant, idx);
    }

    fn identifier_constant(&mut self, name: &str) -> u8 {
        let interned = self.interner.intern(name);
        self.make_constant(Value::from(interned))
    }

    fn emit_return(&mut self) {
        if self.state.function_type == FunctionType::Initializer {
            self.emit_two(Instruction::GetLocal, 0);
        } else {
            self.emit(Instruction::Nil);
        }
        self.emit(Instruction::Return);
    }

    // ---- scopes, locals, upvalues ----

    fn begin_scope(&mut self) {
        self.state.scope_depth += 1;
    }

    fn end_scope(&mut self) {
        self.state.scope_depth -= 1;
        while let Some(local) = self.state.locals.last() {
            if local.depth.map_or(false, |d| d > self.state.scope_depth) {
                if local.is_captured {
                    self.emit(Instruction::CloseUpvalue);
                } else {
                    self.emit(Instruction::Pop);
                }
                self.state.locals.pop();
            } else {
                break;
            }
        }
    }

    fn add_local(&mut self, name: String) {
        if self.state.locals.len() >= 256 {
            self.error("Too many local variables in function.");
            return;
        }
        self.state.locals.push(Local {
            name,
            depth: None,
            is_captured: false,
        });
    }

    fn declare_variable(&mut self) {
        if self.state.scope_depth == 0 {
            return;
        }
        let name = self.lexeme(self.previous).to_string();
        for local in self.state.locals.iter().rev() {
            if let Some(depth) = local.depth {
                if depth < self.state.scope_depth {
                    break;
                }
            }
            if local.name == name {
                self.error("Already a variable with this name in this scope.");
                return;
            }
        }
        self.add_local(name);
    }

    fn parse_variable(&mut self, message: &str) -> u8 {
        self.consume(TokenKind::Identifier, message);
        self.declare_variable();
        if self.state.scope_depth > 0 {
            return 0;
        }
        let name = self.lexeme(self.previous).to_string();
        self.identifier_constant(&name)
    }

    fn mark_initialized(&mut self) {
        if self.state.scope_depth == 0 {
            return;
        }
        let depth = self.state.scope_depth;
        if let Some(local) = self.state.locals.last_mut() {
            local.depth = Some(depth);
        }
    }

    fn define_variable(&mut self, global: u8) {
        if self.state.scope_depth > 0 {
            self.mark_initialized();
            return;
        }
        self.emit_two(Instruction::DefineGlobal, global);
    }

    fn argument_list(&mut self) -> u8 {
        let mut argc: u16 = 0;
        if !self.check(TokenKind::CParen) {
            loop {
                self.expression();
                if argc == 255 {
                    self.error("Can't have more than 255 arguments.");
                }
                argc += 1;
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::CParen, "Expect ')' after arguments.");
        argc as u8
    }

    // ---- function / method compilation ----

    fn begin_function(&mut self, function_type: FunctionType, name: Option<Rc<LoxString>>) {
        let enclosing = std::mem::replace(
            &mut self.state,
            Box::new(FunctionState::new(None, FunctionType::Script, None)),
        );
        self.state = Box::new(FunctionState::new(Some(enclosing), function_type, name));
    }

    fn end_function(&mut self) -> Function {
        self.emit_return();
        let enclosing = self.state.enclosing.take();
        let finished = std::mem::replace(
            &mut self.state,
            enclosing.unwrap_or_else(|| Box::new(FunctionState::new(None, FunctionType::Script, None))),
        );
        if cfg!(feature = "trace") {
            eprintln!("== {} ==\n{}", finished.function, finished.function.chunk);
        }
        finished.function
    }

    fn function(&mut self, function_type: FunctionType) {
        let name_text = self.lexeme(self.previous).to_string();
        let name = self.interner.intern(&name_text);
        self.begin_function(function_type, Some(name));
        self.begin_scope();

        self.consume(TokenKind::OParen, "Expect '(' after function name.");
        if !self.check(TokenKind::CParen) {
            loop {
                if self.state.function.arity == 255 {
                    self.error_at_current("Can't have more than 255 parameters.");
                }
                self.state.function.arity += 1;
                let constant = self.parse_variable("Expect parameter name.");
                self.define_variable(constant);
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::CParen, "Expect ')' after parameters.");
        self.consume(TokenKind::OBrace, "Expect '{' before function body.");
        self.block();

        let upvalues: Vec<(bool, u8)> = self
            .state
            .upvalues
            .iter()
            .map(|u| (u.is_local, u.index))
            .collect();
        let function = self.end_function();
        let idx = self.make_constant(Value::from(Rc::new(function)));
        self.emit_two(Instruction::Closure, idx);
        for (is_local, index) in upvalues {
            self.emit_byte(is_local as u8);
            self.emit_byte(index);
        }
    }

    fn method(&mut self) {
        self.consume(TokenKind::Identifier, "Expect method name.");
        let name_text = self.lexeme(self.previous).to_string();
        let constant = self.identifier_constant(&name_text);
        let function_type = if name_text == "init" {
            FunctionType::Initializer
        } else {
            FunctionType::Method
        };
        self.function(function_type);
        self.emit_two(Instruction::Method, constant);
    }

    // ---- declarations & statements ----

    fn declaration(&mut self) {
        if self.match_token(TokenKind::Class) {
            self.class_declaration();
        } else if self.match_token(TokenKind::Fun) {
            self.fun_declaration();
        } else if self.match_token(TokenKind::Var) {
            self.var_declaration();
        } else {
            self.statement();
        }
        if self.panic_mode {
            self.synchronize();
        }
    }

    fn class_declaration(&mut self) {
        self.consume(TokenKind::Identifier, "Expect class name.");
        let class_name_token = self.previous;
        let class_name = self.lexeme(class_name_token).to_string();
        let name_constant = self.identifier_constant(&class_name);
        self.declare_variable();

        self.emit_two(Instruction::Class, name_constant);
        self.define_variable(name_constant);

        self.classes.push(ClassState {
            has_superclass: false,
        });

        if self.match_token(TokenKind::Less) {
            self.consume(TokenKind::Identifier, "Expect superclass name.");
            let super_name = self.lexeme(self.previous).to_string();
            self.named_variable(&super_name, false);
            if super_name == class_name {
                self.error("A class can't inherit from itself.");
            }
            self.begin_scope();
            self.add_local("super".to_string());
            self.define_variable(0);

            self.named_variable(&class_name, false);
            self.emit(Instruction::Inherit);
            self.classes.last_mut().unwrap().has_superclass = true;
        }

        self.named_variable(&class_name, false);
        self.consume(TokenKind::OBrace, "Expect '{' before class body.");
        while !self.check(TokenKind::CBrace) && !self.check(TokenKind::Eof) {
            self.method();
        }
        self.consume(TokenKind::CBrace, "Expect '}' after class body.");
        self.emit(Instruction::Pop);

        let class = self.classes.pop().unwrap();
        if class.has_superclass {
            self.end_scope();
        }
    }

    fn fun_declaration(&mut self) {
        let global = self.parse_variable("Expect function name.");
        self.mark_initialized();
        self.function(FunctionType::Function);
        self.define_variable(global);
    }

    fn var_declaration(&mut self) {
        let global = self.parse_variable("Expect variable name.");
        if self.match_token(TokenKind::Equal) {
            self.expression();
        } else {
            self.emit(Instruction::Nil);
        }
        self.consume(TokenKind::Semicolon, "Expect ';' after variable declaration.");
        self.define_variable(global);
    }

    fn statement(&mut self) {
        if self.match_token(TokenKind::Print) {
            self.print_statement();
        } else if self.match_token(TokenKind::For) {
            self.for_statement();
        } else if self.match_token(TokenKind::If) {
            self.if_statement();
        } else if self.match_token(TokenKind::Return) {
            self.return_statement();
        } else if self.match_token(TokenKind::While) {
            self.while_statement();
        } else if self.match_token(TokenKind::OBrace) {
            self.begin_scope();
            self.block();
            self.end_scope();
        } else {
            self.expression_statement();
        }
    }

    fn block(&mut self) {
        while !self.check(TokenKind::CBrace) && !self.check(TokenKind::Eof) {
            self.declaration();
        }
        self.consume(TokenKind::CBrace, "Expect '}' after block.");
    }

    fn print_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after value.");
        self.emit(Instruction::Print);
    }

    fn expression_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after expression.");
        self.emit(Instruction::Pop);
    }

    fn if_statement(&mut self) {
        self.consume(TokenKind::OParen, "Expect '(' after 'if'.");
        self.expression();
        self.consume(TokenKind::CParen, "Expect ')' after condition.");

        let then_jump = self.emit_jump(Instruction::JumpIfFalse);
        self.emit(Instruction::Pop);
        self.statement();

        let else_jump = self.emit_jump(Instruction::Jump);
        self.patch_jump(then_jump);
        self.emit(Instruction::Pop);

        if self.match_token(TokenKind::Else) {
            self.statement();
        }
        self.patch_jump(else_jump);
    }

    fn while_statement(&mut self) {
        let loop_start = self.chunk().len();
        self.consume(TokenKind::OParen, "Expect '(' after 'while'.");
        self.expression();
        self.consume(TokenKind::CParen, "Expect ')' after condition.");

        let exit_jump = self.emit_jump(Instruction::JumpIfFalse);
        self.emit(Instruction::Pop);
        self.statement();
        self.emit_loop(loop_start);

        self.patch_jump(exit_jump);
        self.emit(Instruction::Pop);
    }

    fn for_statement(&mut self) {
        self.begin_scope();
        self.consume(TokenKind::OParen, "Expect '(' after 'for'.");
        if self.match_token(TokenKind::Semicolon) {
            // no initializer
        } else if self.match_token(TokenKind::Var) {
            self.var_declaration();
        } else {
            self.expression_statement();
        }

        let mut loop_start = self.chunk().len();
        let mut exit_jump = None;
        if !self.match_token(TokenKind::Semicolon) {
            self.expression();
            self.consume(TokenKind::Semicolon, "Expect ';' after loop condition.");
            exit_jump = Some(self.emit_jump(Instruction::JumpIfFalse));
            self.emit(Instruction::Pop);
        }

        if !self.match_token(TokenKind::CParen) {
            let body_jump = self.emit_jump(Instruction::Jump);
            let increment_start = self.chunk().len();
            self.expression();
            self.emit(Instruction::Pop);
            self.consume(TokenKind::CParen, "Expect ')' after for clauses.");

            self.emit_loop(loop_start);
            loop_start = increment_start;
            self.patch_jump(body_jump);
        }

        self.statement();
        self.emit_loop(loop_start);

        if let Some(exit_jump) = exit_jump {
            self.patch_jump(exit_jump);
            self.emit(Instruction::Pop);
        }
        self.end_scope();
    }

    fn return_statement(&mut self) {
        if self.state.function_type == FunctionType::Script {
            self.error("Can't return from top-level code.");
        }
        if self.match_token(TokenKind::Semicolon) {
            self.emit_return();
        } else {
            if self.state.function_type == FunctionType::Initializer {
                self.error("Can't return a value from an initializer.");
            }
            self.expression();
            self.consume(TokenKind::Semicolon, "Expect ';' after return value.");
            self.emit(Instruction::Return);
        }
    }

    // ---- expressions ----

    fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();
        let prefix = get_rule(self.previous.kind).prefix;
        let prefix = match prefix {
            Some(f) => f,
            None => {
                self.error("Expect expression.");
                return;
            }
        };
        let can_assign = precedence <= Precedence::Assignment;
        prefix(self, can_assign);

        while precedence <= get_rule(self.current.kind).precedence {
            self.advance();
            let infix = get_rule(self.previous.kind).infix.unwrap();
            infix(self, can_assign);
        }

        if can_assign && self.match_token(TokenKind::Equal) {
            self.error("Invalid assignment target.");
        }
    }

    fn number(&mut self, _can_assign: bool) {
        let text = self.lexeme(self.previous);
        let value: f64 = text.parse().unwrap();
        self.emit_constant(Value::Number(value));
    }

    fn string(&mut self, _can_assign: bool) {
        let text = self.lexeme(self.previous);
        let content = &text[1..text.len() - 1];
        let interned = self.interner.intern(content);
        self.emit_constant(Value::from(interned));
    }

    fn literal(&mut self, _can_assign: bool) {
        match self.previous.kind {
            TokenKind::False => self.emit(Instruction::False),
            TokenKind::True => self.emit(Instruction::True),
            TokenKind::Nil => self.emit(Instruction::Nil),
            _ => unreachable!(),
        }
    }

    fn grouping(&mut self, _can_assign: bool) {
        self.expression();
        self.consume(TokenKind::CParen, "Expect ')' after expression.");
    }

    fn unary(&mut self, _can_assign: bool) {
        let kind = self.previous.kind;
        self.parse_precedence(Precedence::Unary);
        match kind {
            TokenKind::Bang => self.emit(Instruction::Not),
            TokenKind::Minus => self.emit(Instruction::Negate),
            _ => unreachable!(),
        }
    }

    fn binary(&mut self, _can_assign: bool) {
        let kind = self.previous.kind;
        let rule = get_rule(kind);
        self.parse_precedence(rule.precedence.next());
        match kind {
            TokenKind::BangEqual => {
                self.emit(Instruction::Equal);
                self.emit(Instruction::Not);
            }
            TokenKind::EqualEqual => self.emit(Instruction::Equal),
            TokenKind::Greater => self.emit(Instruction::Greater),
            TokenKind::GreaterEqual => {
                self.emit(Instruction::Less);
                self.emit(Instruction::Not);
            }
            TokenKind::Less => self.emit(Instruction::Less),
            TokenKind::LessEqual => {
                self.emit(Instruction::Greater);
                self.emit(Instruction::Not);
            }
            TokenKind::Plus => self.emit(Instruction::Add),
            TokenKind::Minus => self.emit(Instruction::Subtract),
            TokenKind::Star => self.emit(Instruction::Multiply),
            TokenKind::Slash => self.emit(Instruction::Divide),
            _ => unreachable!(),
        }
    }

    fn and_(&mut self, _can_assign: bool) {
        let end_jump = self.emit_jump(Instruction::JumpIfFalse);
        self.emit(Instruction::Pop);
        self.parse_precedence(Precedence::And);
        self.patch_jump(end_jump);
    }

    fn or_(&mut self, _can_assign: bool) {
        let else_jump = self.emit_jump(Instruction::JumpIfFalse);
        let end_jump = self.emit_jump(Instruction::Jump);
        self.patch_jump(else_jump);
        self.emit(Instruction::Pop);
        self.parse_precedence(Precedence::Or);
        self.patch_jump(end_jump);
    }

    fn call(&mut self, _can_assign: bool) {
        let argc = self.argument_list();
        self.emit_two(Instruction::Call, argc);
    }

    fn dot(&mut self, can_assign: bool) {
        self.consume(TokenKind::Identifier, "Expect property name after '.'.");
        let name = self.lexeme(self.previous).to_string();
        let name_constant = self.identifier_constant(&name);

        if can_assign && self.match_token(TokenKind::Equal) {
            self.expression();
            self.emit_two(Instruction::SetProperty, name_constant);
        } else if self.match_token(TokenKind::OParen) {
            let argc = self.argument_list();
            self.emit_two(Instruction::Invoke, name_constant);
            self.emit_byte(argc);
        } else {
            self.emit_two(Instruction::GetProperty, name_constant);
        }
    }

    fn this_(&mut self, _can_assign: bool) {
        if self.classes.is_empty() {
            self.error("Can't use 'this' outside of a class.");
            return;
        }
        self.named_variable("this", false);
    }

    fn super_(&mut self, _can_assign: bool) {
        if self.classes.is_empty() {
            self.error("Can't use 'super' outside of a class.");
        } else if !self.classes.last().unwrap().has_superclass {
            self.error("Can't use 'super' in a class with no superclass.");
        }
        self.consume(TokenKind::Dot, "Expect '.' after 'super'.");
        self.consume(TokenKind::Identifier, "Expect superclass method name.");
        let name = self.lexeme(self.previous).to_string();
        let name_constant = self.identifier_constant(&name);

        self.named_variable("this", false);
        if self.match_token(TokenKind::OParen) {
            let argc = self.argument_list();
            self.named_variable("super", false);
            self.emit_two(Instruction::SuperInvoke, name_constant);
            self.emit_byte(argc);
        } else {
            self.named_variable("super", false);
            self.emit_two(Instruction::GetSuper, name_constant);
        }
    }

    fn variable(&mut self, can_assign: bool) {
        let name = self.lexeme(self.previous).to_string();
        self.named_variable(&name, can_assign);
    }

    /// Resolves `name` as local, upvalue, or global and emits the
    /// matching get/set instruction. Shared by plain
    /// identifier references and the synthetic `this`/`super` locals.
    fn named_variable(&mut self, name: &str, can_assign: bool) {
        let (get_instr, set_instr, arg) = match self.state.resolve_local(name) {
            LocalLookup::Found(idx) => (Instruction::GetLocal, Instruction::SetLocal, idx as u8),
            LocalLookup::Uninitialized => {
                self.error("Can't read local variable in its own initializer.");
                (Instruction::GetLocal, Instruction::SetLocal, 0)
            }
            LocalLookup::NotFound => match resolve_upvalue(&mut self.state, name) {
                UpvalueLookup::Found(idx) => (Instruction::GetUpvalue, Instruction::SetUpvalue, idx),
                UpvalueLookup::Uninitialized => {
                    self.error("Can't read local variable in its own initializer.");
                    (Instruction::GetUpvalue, Instruction::SetUpvalue, 0)
                }
                UpvalueLookup::TooMany => {
                    self.error("Too many closure variables in function.");
                    let idx = self.identifier_constant(name);
                    (Instruction::GetGlobal, Instruction::SetGlobal, idx)
                }
                UpvalueLookup::NotFound => {
                    let idx = self.identifier_constant(name);
                    (Instruction::GetGlobal, Instruction::SetGlobal, idx)
                }
            },
        };

        if can_assign && self.match_token(TokenKind::Equal) {
            self.expression();
            self.emit_two(set_instr, arg);
        } else {
            self.emit_two(get_instr, arg);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile_ok(src: &str) -> Rc<Function> {
        let mut interner = Interner::new();
        Compiler::compile(src, &mut interner).expect("expected successful compile")
    }

    fn compile_err(src: &str) -> Vec<CompileError> {
        let mut interner = Interner::new();
        Compiler::compile(src, &mut interner).expect_err("expected a compile error")
    }

    #[test]
    fn compiles_arithmetic() {
        let function = compile_ok("print 1 + 2 * 3;");
        assert!(function.chunk.len() > 0);
    }

    #[test]
    fn reports_expect_expression() {
        let errors = compile_err("print ;");
        assert!(errors.iter().any(|e| e.message == "Expect expression."));
    }

    #[test]
    fn reports_invalid_assignment_target() {
        let errors = compile_err("1 + 2 = 3;");
        assert!(errors.iter().any(|e| e.message == "Invalid assignment target."));
    }

    #[test]
    fn reports_self_inheriting_class() {
        let errors = compile_err("class A < A {}");
        assert!(errors
            .iter()
            .any(|e| e.message == "A class can't inherit from itself."));
    }

    #[test]
    fn reports_return_from_initializer() {
        let errors = compile_err("class A { init() { return 1; } }");
        assert!(errors
            .iter()
            .any(|e| e.message == "Can't return a value from an initializer."));
    }

    #[test]
    fn reports_local_reading_itself_in_its_own_initializer() {
        let errors = compile_err("{ var a = a; }");
        assert!(errors
            .iter()
            .any(|e| e.message == "Can't read local variable in its own initializer."));
    }

    #[test]
    fn panic_mode_suppresses_cascading_errors_until_synchronization() {
        let errors = compile_err("print ; print ; var x = 1;");
        // two statements, each with a missing-expression error, but no
        // extra noise from resynchronizing badly.
        assert_eq!(
            errors
                .iter()
                .filter(|e| e.message == "Expect expression.")
                .count(),
            2
        );
    }

    #[test]
    fn closures_capture_enclosing_locals_as_upvalues() {
        let function = compile_ok(
            "fun makeCounter() { var n = 0; fun c() { n = n + 1; return n; } return c; }",
        );
        assert!(function.chunk.len() > 0);
    }
}
