mod args;

use args::{get_action, Action, EvalMode};
use path_absolutize::Absolutize;
use rustyline::error::ReadlineError;
use rustyline::Editor;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::exit;
use std::{fs, process};
use vm::{InterpretResult, Vm};

const HELP_MSG: &str = "usage:
  bantam [flags] [path]

Without a file the language runs as a REPL.

flags:
  --untrusted
    reserved for hosts that want to sandbox file and IO access (no
    effect on the interpreter itself; the flag only requires a path).
  --version
    prints the current version and exits, ignoring any path given.
  --help
    prints this message and exits, ignoring any path given.
";

fn main() {
    match get_action() {
        Ok(Action::Eval(EvalMode::File(path, untrusted))) => run_file(path, untrusted),
        Ok(Action::Eval(EvalMode::Repl)) => run_repl(),
        Ok(Action::Version) => println!("{}", env!("CARGO_PKG_VERSION")),
        Ok(Action::Help) => {
            println!("{} {}\n\n{HELP_MSG}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        }
        Err(err) => {
            eprintln!("{err}");
            eprintln!("see '--help' for usage");
            exit(exitcode::USAGE);
        }
    }
}

fn run_repl() {
    let mut vm = Vm::new();
    let mut editor = Editor::<()>::new().expect("failed to start line editor");
    loop {
        match editor.readline("> ") {
            Ok(line) => {
                editor.add_history_entry(line.as_str());
                run_source(&mut vm, &line);
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("readline error: {err}");
                break;
            }
        }
    }
}

fn run_file(path: PathBuf, _untrusted: bool) {
    let absolute = path
        .absolutize()
        .unwrap_or_else(|_| std::borrow::Cow::Borrowed(&path));
    let source = match fs::read_to_string(&absolute) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("couldn't read '{}': {err}", absolute.display());
            process::exit(exitcode::IOERR);
        }
    };
    let mut vm = Vm::new();
    let code = run_source(&mut vm, &source);
    if code != exitcode::OK {
        process::exit(code);
    }
}

/// Compiles and runs `source` through `vm`, printing to stdout and
/// returning the process exit code the run corresponds to:
/// `OK` on success, `DATAERR` for a compile error, `SOFTWARE` for a
/// runtime error.
fn run_source(vm: &mut Vm, source: &str) -> exitcode::ExitCode {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    let code = match vm.interpret(source, &mut handle) {
        InterpretResult::Ok => exitcode::OK,
        InterpretResult::CompileError(errors) => {
            vm::report_compile_errors(&errors, source);
            exitcode::DATAERR
        }
        InterpretResult::RuntimeError(err) => {
            eprintln!("{err}");
            exitcode::SOFTWARE
        }
    };
    let _ = handle.flush();
    code
}
