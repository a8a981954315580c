use std::fmt;

/// Error type for the analysis pipeline, separating failures by stage.
///
/// Keeping structural store errors distinct from parse/import failures lets
/// the driver decide per-module recovery (skip a module vs. abort the run)
/// without string matching.
#[derive(Debug, Clone)]
pub enum PycgError {
    /// A source file failed to parse.
    Parse(ParseError),
    /// A `DefinitionManager`/`ScopeManager`/`ClassTable` invariant was violated.
    Store(StoreError),
    /// The import resolver could not place a module.
    Import(ImportError),
}

impl fmt::Display for PycgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(error) => write!(f, "parse error: {error}"),
            Self::Store(error) => write!(f, "{error}"),
            Self::Import(error) => write!(f, "{error}"),
        }
    }
}

impl std::error::Error for PycgError {}

impl From<ParseError> for PycgError {
    fn from(error: ParseError) -> Self {
        Self::Parse(error)
    }
}

impl From<StoreError> for PycgError {
    fn from(error: StoreError) -> Self {
        Self::Store(error)
    }
}

impl From<ImportError> for PycgError {
    fn from(error: ImportError) -> Self {
        Self::Import(error)
    }
}

/// A source file could not be turned into an AST.
#[derive(Debug, Clone)]
pub struct ParseError {
    pub filename: String,
    pub msg: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.filename, self.msg)
    }
}

impl std::error::Error for ParseError {}

/// A misuse of the definition/scope/class stores. These are programming
/// errors in the analyzer itself, not findings about the analyzed program.
#[derive(Debug, Clone)]
pub enum StoreError {
    EmptyNamespace,
    InvalidDefinitionType { ns: String, type_name: &'static str },
    DuplicateDefinition { ns: String },
    UnknownDefinition { ns: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyNamespace => write!(f, "namespace must not be empty"),
            Self::InvalidDefinitionType { ns, type_name } => {
                write!(f, "invalid definition type {type_name:?} for {ns}")
            }
            Self::DuplicateDefinition { ns } => write!(f, "definition already exists at {ns}"),
            Self::UnknownDefinition { ns } => write!(f, "no definition at {ns}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// An import could not be resolved to a file under the package root. Callers
/// degrade to an external definition rather than propagating this as fatal.
#[derive(Debug, Clone)]
pub struct ImportError {
    pub requested: String,
    pub reason: &'static str,
}

impl fmt::Display for ImportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "could not resolve import {:?}: {}", self.requested, self.reason)
    }
}

impl std::error::Error for ImportError {}
