use std::fmt::Write as _;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use once_cell::sync::Lazy;
use rand::distr::Alphanumeric;
use rand::Rng;
use regex::Regex;

/// `name(args)` with the whole placeholder body consumed
static CALL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\w+)\((.*)\)$").unwrap());

const MAX_RANDOM_STRING_LEN: i64 = 10_000;
const DEFAULT_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum FunctionError {
    #[error("Unknown function: {0}")]
    Unknown(String),

    #[error("Malformed argument list: {0}")]
    MalformedArgs(String),

    #[error("Invalid argument for {function}: {reason}")]
    InvalidArgument {
        function: &'static str,
        reason: String,
    },
}

/// Argument literal
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Str(String),
    Int(i64),
    Float(f64),
    Bare(String),
}

impl Literal {
    fn parse(token: &str) -> Literal {
        if let Ok(i) = token.parse::<i64>() {
            return Literal::Int(i);
        }
        if let Ok(f) = token.parse::<f64>() {
            if f.is_finite() {
                return Literal::Float(f);
            }
        }
        Literal::Bare(token.to_string())
    }

    fn as_text(&self) -> String {
        match self {
            Literal::Str(s) | Literal::Bare(s) => s.clone(),
            Literal::Int(i) => i.to_string(),
            Literal::Float(f) => f.to_string(),
        }
    }

    fn as_int(&self, function: &'static str) -> Result<i64, FunctionError> {
        match self {
            Literal::Int(i) => Ok(*i),
            Literal::Float(f) if f.fract() == 0.0 => Ok(*f as i64),
            Literal::Str(s) | Literal::Bare(s) => {
                s.trim()
                    .parse()
                    .map_err(|_| FunctionError::InvalidArgument {
                        function,
                        reason: format!("expected an integer, got {:?}", s),
                    })
            }
            Literal::Float(f) => Err(FunctionError::InvalidArgument {
                function,
                reason: format!("expected an integer, got {}", f),
            }),
        }
    }
}

/// Parsed `{{name(args)}}` placeholder
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    pub args: Vec<Literal>,
}

impl FunctionCall {
    /// Parse a trimmed placeholder body. `None` when it is not call-shaped.
    pub fn parse(expr: &str) -> Option<Result<FunctionCall, FunctionError>> {
        let caps = CALL_RE.captures(expr)?;
        let name = caps[1].to_string();
        Some(split_args(&caps[2]).map(|args| FunctionCall { name, args }))
    }

    /// Evaluate against the built-in registry. Fresh on every call.
    pub fn evaluate(&self) -> Result<String, FunctionError> {
        let builtin = Builtin::lookup(&self.name)
            .ok_or_else(|| FunctionError::Unknown(self.name.clone()))?;
        builtin.call(&self.args)
    }
}

/// Split a comma-separated argument list, honoring single and double quotes
fn split_args(raw: &str) -> Result<Vec<Literal>, FunctionError> {
    let mut args = Vec::new();
    if raw.trim().is_empty() {
        return Ok(args);
    }

    let mut chars = raw.chars().peekable();
    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }

        let literal = match chars.peek().copied() {
            Some(quote @ ('"' | '\'')) => {
                chars.next();
                let mut text = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == quote {
                        closed = true;
                        break;
                    }
                    text.push(c);
                }
                if !closed {
                    return Err(FunctionError::MalformedArgs(raw.to_string()));
                }
                Literal::Str(text)
            }
            _ => {
                let mut token = String::new();
                while let Some(&c) = chars.peek() {
                    if c == ',' {
                        break;
                    }
                    token.push(c);
                    chars.next();
                }
                let token = token.trim();
                if token.is_empty() {
                    return Err(FunctionError::MalformedArgs(raw.to_string()));
                }
                Literal::parse(token)
            }
        };
        args.push(literal);

        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        match chars.next() {
            None => break,
            Some(',') => continue,
            Some(_) => return Err(FunctionError::MalformedArgs(raw.to_string())),
        }
    }

    Ok(args)
}

/// The closed set of template functions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    RandomString,
    RandomInt,
    Timestamp,
    Datetime,
    Uuid,
    RandomEmail,
    RandomPhone,
    Base64,
}

impl Builtin {
    pub const ALL: [Builtin; 8] = [
        Self::RandomString,
        Self::RandomInt,
        Self::Timestamp,
        Self::Datetime,
        Self::Uuid,
        Self::RandomEmail,
        Self::RandomPhone,
        Self::Base64,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::RandomString => "randomString",
            Self::RandomInt => "randomInt",
            Self::Timestamp => "timestamp",
            Self::Datetime => "datetime",
            Self::Uuid => "uuid",
            Self::RandomEmail => "randomEmail",
            Self::RandomPhone => "randomPhone",
            Self::Base64 => "base64",
        }
    }

    pub fn lookup(name: &str) -> Option<Builtin> {
        Self::ALL.into_iter().find(|b| b.name() == name)
    }

    pub fn call(&self, args: &[Literal]) -> Result<String, FunctionError> {
        let name = self.name();
        match self {
            Self::RandomString => {
                let len = args.first().map(|a| a.as_int(name)).transpose()?.unwrap_or(10);
                if !(0..=MAX_RANDOM_STRING_LEN).contains(&len) {
                    return Err(FunctionError::InvalidArgument {
                        function: name,
                        reason: format!("length must be between 0 and {}", MAX_RANDOM_STRING_LEN),
                    });
                }
                Ok(rand::rng()
                    .sample_iter(&Alphanumeric)
                    .take(len as usize)
                    .map(char::from)
                    .collect())
            }
            Self::RandomInt => {
                let min = args.first().map(|a| a.as_int(name)).transpose()?.unwrap_or(1);
                let max = args.get(1).map(|a| a.as_int(name)).transpose()?.unwrap_or(100);
                if min > max {
                    return Err(FunctionError::InvalidArgument {
                        function: name,
                        reason: format!("min {} is greater than max {}", min, max),
                    });
                }
                Ok(rand::rng().random_range(min..=max).to_string())
            }
            Self::Timestamp => Ok(time::OffsetDateTime::now_utc().unix_timestamp().to_string()),
            Self::Datetime => {
                let format = args
                    .first()
                    .map(Literal::as_text)
                    .unwrap_or_else(|| DEFAULT_DATETIME_FORMAT.to_string());
                let mut out = String::new();
                write!(out, "{}", chrono::Local::now().format(&format)).map_err(|_| {
                    FunctionError::InvalidArgument {
                        function: name,
                        reason: format!("invalid format string {:?}", format),
                    }
                })?;
                Ok(out)
            }
            Self::Uuid => Ok(uuid::Uuid::new_v4().to_string()),
            Self::RandomEmail => {
                let domain = args
                    .first()
                    .map(Literal::as_text)
                    .unwrap_or_else(|| "example.com".to_string());
                let mut rng = rand::rng();
                let local: String = (0..8)
                    .map(|_| char::from(rng.random_range(b'a'..=b'z')))
                    .collect();
                Ok(format!("{}@{}", local, domain))
            }
            Self::RandomPhone => {
                let mut rng = rand::rng();
                let digits: String = (0..10)
                    .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
                    .collect();
                Ok(format!("1{}", digits))
            }
            Self::Base64 => {
                let text = args
                    .first()
                    .map(Literal::as_text)
                    .unwrap_or_else(|| "test".to_string());
                Ok(STANDARD.encode(text.as_bytes()))
            }
        }
    }
}
