use crate::graph::NodeId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("pattern `{pattern}` matched no targets")]
    NoMatch { pattern: String },
    #[error("invalid target pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("unexpected character `{ch}` at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },
    #[error("unterminated string starting at offset {offset}")]
    UnterminatedString { offset: usize },
    #[error("expected {expected} at offset {offset}, found {found}")]
    UnexpectedToken { expected: String, found: String, offset: usize },
    #[error("unknown function `{name}`")]
    UnknownFunction { name: String },
    #[error("`{name}` takes {expected} argument(s), got {found}")]
    Arity { name: String, expected: String, found: usize },
    #[error("trailing input at offset {offset}")]
    TrailingInput { offset: usize },
    #[error("query nested deeper than {limit} levels at offset {offset}")]
    TooDeep { offset: usize, limit: usize },
}

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("malformed query: {0}")]
    Parse(#[from] ParseError),
    #[error("invalid kind pattern `{pattern}`: {source}")]
    KindPattern { pattern: String, source: regex::Error },
    #[error("expression nested deeper than {limit} levels")]
    TooDeep { limit: usize },
}

#[derive(Debug, Error)]
pub enum MaterializeError {
    #[error("declared {build_kind} output {output} is also an input of the target")]
    OutputIsInput { output: NodeId, build_kind: String },
    #[error("{0}")]
    Rule(String),
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("resolution failed: {0}")]
    Resolution(#[from] ResolveError),

    #[error("evaluation failed: {0}")]
    Evaluation(#[from] EvalError),

    #[error("materialization failed for {target}: {source}")]
    Materialization { target: NodeId, source: MaterializeError },
}

impl From<ParseError> for QueryError {
    fn from(err: ParseError) -> Self {
        Self::Evaluation(EvalError::Parse(err))
    }
}

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("duplicate node id {0}")]
    DuplicateId(NodeId),
}
