//! Positional argument validation for matched commands.
//!
//! A command declares a static arity -- no arguments, a single schema, or
//! an ordered tuple of schemas -- and the dispatcher validates the raw
//! tokens left over after the basename match. Validation failure produces
//! one message per failing field, in schema order, and the command handler
//! never runs.

use std::fmt;

/// The value type a schema accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Str,
    Int,
    Bool,
}

impl ArgKind {
    fn describe(&self) -> &'static str {
        match self {
            ArgKind::Str => "string",
            ArgKind::Int => "integer",
            ArgKind::Bool => "boolean",
        }
    }
}

/// One positional argument declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgSchema {
    /// Field name used in validation messages.
    pub name: String,
    pub kind: ArgKind,
    /// Required by default; optional fields validate to [`ArgValue::Missing`]
    /// when the token is absent.
    pub required: bool,
}

impl ArgSchema {
    pub fn str(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: ArgKind::Str,
            required: true,
        }
    }

    pub fn int(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: ArgKind::Int,
            required: true,
        }
    }

    pub fn bool(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: ArgKind::Bool,
            required: true,
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

/// Declared arity of a command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ArgSpec {
    /// No arguments; trailing tokens are ignored.
    #[default]
    None,
    /// Exactly one schema, validated against the first remaining token.
    Single(ArgSchema),
    /// Fixed-length tuple, validated position by position.
    Tuple(Vec<ArgSchema>),
}

/// A validated, typed argument.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Str(String),
    Int(i64),
    Bool(bool),
    /// An optional field whose token was absent.
    Missing,
}

impl ArgValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ArgValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ArgValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ArgValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

/// A structured validation failure: one message per failing field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    pub issues: Vec<String>,
}

impl ValidationFailure {
    /// Render as the multi-line reply sent back to the caller.
    pub fn render(&self) -> String {
        let mut out = String::from("invalid arguments:");
        for issue in &self.issues {
            out.push('\n');
            out.push_str("  ");
            out.push_str(issue);
        }
        out
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

/// Validate raw tokens against a spec.
pub fn validate(spec: &ArgSpec, raw: &[String]) -> Result<Vec<ArgValue>, ValidationFailure> {
    let schemas: &[ArgSchema] = match spec {
        ArgSpec::None => return Ok(Vec::new()),
        ArgSpec::Single(schema) => std::slice::from_ref(schema),
        ArgSpec::Tuple(schemas) => schemas,
    };

    let mut values = Vec::with_capacity(schemas.len());
    let mut issues = Vec::new();

    for (i, schema) in schemas.iter().enumerate() {
        match check_one(schema, raw.get(i).map(String::as_str)) {
            Ok(value) => values.push(value),
            Err(issue) => issues.push(issue),
        }
    }

    if issues.is_empty() {
        Ok(values)
    } else {
        Err(ValidationFailure { issues })
    }
}

fn check_one(schema: &ArgSchema, token: Option<&str>) -> Result<ArgValue, String> {
    let Some(token) = token else {
        if schema.required {
            return Err(format!("{}: missing required argument", schema.name));
        }
        return Ok(ArgValue::Missing);
    };

    match schema.kind {
        ArgKind::Str => Ok(ArgValue::Str(token.to_string())),
        ArgKind::Int => token.parse::<i64>().map(ArgValue::Int).map_err(|_| {
            format!(
                "{}: expected {}, got '{token}'",
                schema.name,
                schema.kind.describe()
            )
        }),
        ArgKind::Bool => match token {
            "true" | "yes" | "on" => Ok(ArgValue::Bool(true)),
            "false" | "no" | "off" => Ok(ArgValue::Bool(false)),
            _ => Err(format!(
                "{}: expected {}, got '{token}'",
                schema.name,
                schema.kind.describe()
            )),
        },
    }
}
