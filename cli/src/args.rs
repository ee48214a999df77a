use std::{env, fmt, path::PathBuf};

#[derive(Debug, Clone)]
enum Setting {
    Version,
    Help,
    Untrusted,
    Unknown(String),
}

const VERSION: &str = "--version";
const HELP: &str = "--help";
const UNTRUSTED: &str = "--untrusted";

impl From<String> for Setting {
    fn from(value: String) -> Self {
        match value.as_str() {
            VERSION => Self::Version,
            HELP => Self::Help,
            UNTRUSTED => Self::Untrusted,
            string => Self::Unknown(string.to_owned()),
        }
    }
}

#[derive(Debug, Clone)]
enum Token {
    Setting(Setting),
    Path(PathBuf),
}

fn lex(iter: &mut env::Args) -> Vec<Token> {
    iter.next();
    let mut tokens = vec![];
    for string in iter {
        match string.as_str() {
            x if x.starts_with("--") => tokens.push(Token::Setting(Setting::from(string))),
            path => tokens.push(Token::Path(PathBuf::from(path))),
        }
    }
    tokens
}

#[derive(Debug, Clone)]
struct Args {
    settings: Vec<Setting>,
    path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub enum ParseError {
    ExpectedPathOrSetting(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExpectedPathOrSetting(string) => {
                write!(f, "expected a file path or a setting but got \"{string}\"")
            }
        }
    }
}

fn parse(tokens: Vec<Token>) -> Result<Args, ParseError> {
    let mut iter = tokens.into_iter().peekable();
    let mut settings = vec![];
    while let Some(Token::Setting(_)) = iter.peek() {
        let Some(Token::Setting(setting)) = iter.next() else {
            unreachable!()
        };
        if let Setting::Unknown(string) = &setting {
            return Err(ParseError::ExpectedPathOrSetting(string.clone()));
        }
        settings.push(setting);
    }
    let path = match iter.next() {
        Some(Token::Path(path)) => Some(path),
        Some(Token::Setting(Setting::Unknown(string))) => {
            return Err(ParseError::ExpectedPathOrSetting(string))
        }
        _ => None,
    };
    Ok(Args { settings, path })
}

#[derive(Debug, Clone)]
pub enum EvalMode {
    File(PathBuf, bool),
    Repl,
}

#[derive(Clone)]
pub enum Action {
    Eval(EvalMode),
    Version,
    Help,
}

#[derive(Debug, Clone)]
pub enum CompileError {
    ExpectedPath,
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExpectedPath => write!(f, "expected a file path"),
        }
    }
}

impl TryFrom<Args> for Action {
    type Error = CompileError;

    fn try_from(value: Args) -> Result<Self, Self::Error> {
        let mut expect_path = false;
        let mut untrusted = false;
        for setting in value.settings {
            match setting {
                Setting::Help => return Ok(Self::Help),
                Setting::Version => return Ok(Self::Version),
                Setting::Untrusted => {
                    expect_path = true;
                    untrusted = true;
                }
                Setting::Unknown(_) => unreachable!("filtered out during parse"),
            }
        }
        match value.path {
            Some(path) => Ok(Self::Eval(EvalMode::File(path, untrusted))),
            None if expect_path => Err(CompileError::ExpectedPath),
            None => Ok(Self::Eval(EvalMode::Repl)),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Error {
    Parse(ParseError),
    Compile(CompileError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "{err}"),
            Self::Compile(err) => write!(f, "{err}"),
        }
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        Self::Parse(err)
    }
}

impl From<CompileError> for Error {
    fn from(err: CompileError) -> Self {
        Self::Compile(err)
    }
}

pub fn get_action() -> Result<Action, Error> {
    let tokens = lex(&mut env::args());
    let args = parse(tokens)?;
    Ok(Action::try_from(args)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_setting_is_rejected() {
        let tokens = lex_from(&["--nope"]);
        assert!(matches!(parse(tokens), Err(ParseError::ExpectedPathOrSetting(_))));
    }

    #[test]
    fn bare_invocation_means_repl() {
        let tokens = lex_from(&[]);
        let action = Action::try_from(parse(tokens).unwrap()).unwrap();
        assert!(matches!(action, Action::Eval(EvalMode::Repl)));
    }

    #[test]
    fn untrusted_without_a_path_is_rejected() {
        let tokens = lex_from(&["--untrusted"]);
        let action = Action::try_from(parse(tokens).unwrap());
        assert!(matches!(action, Err(CompileError::ExpectedPath)));
    }

    fn lex_from(args: &[&str]) -> Vec<Token> {
        let mut tokens = vec![];
        for arg in args {
            match *arg {
                x if x.starts_with("--") => tokens.push(Token::Setting(Setting::from(x.to_string()))),
                path => tokens.push(Token::Path(PathBuf::from(path))),
            }
        }
        tokens
    }
}
