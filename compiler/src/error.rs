use colored::Colorize;
use lexer::{Token, TokenKind};
use std::fmt;

/// A compile-time diagnostic, reported at the token that triggered it.
/// `message` is the static text describing what went wrong (e.g.
/// "Expect expression.").
#[derive(Debug, Clone)]
pub struct CompileError {
    pub token: Token,
    pub message: String,
}

impl CompileError {
    pub fn new(token: Token, message: impl Into<String>) -> Self {
        Self {
            token,
            message: message.into(),
        }
    }
}

/// Renders as `[line N] Error at 'lexeme': message`, or `at end` for
/// EOF, or nothing between "Error" and the message for an `Error`
/// token whose lexeme IS the message already. `source` is
/// the original program text; required explicitly rather than stashed
/// as global state, redesign note against singletons.
pub fn format_compile_error(err: &CompileError, source: &str) -> String {
    let mut out = format!("[line {}] Error", err.token.line);
    match err.token.kind {
        TokenKind::Eof => out.push_str(" at end"),
        TokenKind::Error => {}
        _ => out.push_str(&format!(" at '{}'", err.token.lexeme(source))),
    }
    out.push_str(&format!(": {}", err.message));
    out.red().to_string()
}

impl fmt::Display for CompileError {
    /// Source-free rendering (no `source` at hand to resolve the
    /// lexeme), so this always reads like an in-band `Error` token:
    /// `[line N] Error: message`. Use [`format_compile_error`] when the
    /// original source is available and the full `at 'lexeme'`/`at end`
    /// detail matters.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[line {}] Error: {}", self.token.line, self.message)
    }
}

/// One call frame's contribution to a runtime error report: the line the frame's instruction pointer was at, and the name
/// of the function that frame belongs to (`None` for the top-level
/// script, mirroring [`super::value::Function::name`]).
#[derive(Debug, Clone)]
pub struct BacktraceFrame {
    pub name: Option<String>,
    pub line: usize,
}

/// The call stack at the moment a [`RuntimeError`] was raised, innermost
/// frame first.
#[derive(Debug, Clone, Default)]
pub struct Backtrace {
    pub frames: Vec<BacktraceFrame>,
}

impl fmt::Display for Backtrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for frame in &self.frames {
            match &frame.name {
                Some(name) => writeln!(f, "[line {}] in {name}()", frame.line)?,
                None => writeln!(f, "[line {}] in script", frame.line)?,
            }
        }
        Ok(())
    }
}

/// A runtime fault. Unlike [`CompileError`], which
/// always carries the triggering token, a `RuntimeError` carries just
/// the message and the frame stack at the point of failure — the VM has
/// no surviving token once it's past compilation, only chunk offsets
/// and the line table.
#[derive(Debug, Clone)]
pub struct RuntimeError {
    pub message: String,
    pub backtrace: Backtrace,
}

impl RuntimeError {
    pub fn new(message: impl Into<String>, backtrace: Backtrace) -> Self {
        Self {
            message: message.into(),
            backtrace,
        }
    }

    pub fn operands_must_be_numbers(backtrace: Backtrace) -> Self {
        Self::new("Operands must be numbers.", backtrace)
    }

    pub fn operands_must_be_numbers_or_strings(backtrace: Backtrace) -> Self {
        Self::new("Operands must be two numbers or two strings.", backtrace)
    }

    pub fn undefined_variable(name: &str, backtrace: Backtrace) -> Self {
        Self::new(format!("Undefined variable '{name}'."), backtrace)
    }

    pub fn undefined_property(name: &str, backtrace: Backtrace) -> Self {
        Self::new(format!("Undefined property '{name}'."), backtrace)
    }

    pub fn not_callable(backtrace: Backtrace) -> Self {
        Self::new("Can only call functions and classes.", backtrace)
    }

    pub fn only_instances_have_properties(backtrace: Backtrace) -> Self {
        Self::new("Only instances have properties.", backtrace)
    }

    pub fn only_instances_have_methods(backtrace: Backtrace) -> Self {
        Self::new("Only instances have methods.", backtrace)
    }

    pub fn superclass_must_be_a_class(backtrace: Backtrace) -> Self {
        Self::new("Superclass must be a class.", backtrace)
    }

    pub fn wrong_arity(expected: u8, got: usize, backtrace: Backtrace) -> Self {
        Self::new(
            format!("Expected {expected} arguments but got {got}."),
            backtrace,
        )
    }

    pub fn stack_overflow(backtrace: Backtrace) -> Self {
        Self::new("Stack overflow.", backtrace)
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.message.as_str().red())?;
        write!(f, "{}", self.backtrace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backtrace_renders_innermost_frame_first() {
        let backtrace = Backtrace {
            frames: vec![
                BacktraceFrame {
                    name: Some("inner".to_string()),
                    line: 4,
                },
                BacktraceFrame {
                    name: None,
                    line: 9,
                },
            ],
        };
        let rendered = backtrace.to_string();
        let inner_pos = rendered.find("inner").unwrap();
        let script_pos = rendered.find("script").unwrap();
        assert!(inner_pos < script_pos);
    }

    #[test]
    fn runtime_error_constructors_match_spec_messages() {
        let bt = Backtrace::default();
        assert_eq!(
            RuntimeError::operands_must_be_numbers(bt.clone()).message,
            "Operands must be numbers."
        );
        assert_eq!(
            RuntimeError::operands_must_be_numbers_or_strings(bt).message,
            "Operands must be two numbers or two strings."
        );
    }
}
