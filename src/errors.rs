use thiserror::Error;

/// Everything that can go wrong in a hook.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum Error {
    /// Settings or hook context could not be read or parsed
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),

    /// An external tool exited unsuccessfully
    #[error("Command `{command}` failed with exit code {code:?}: {stderr}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    /// An external tool could not be started
    #[error("Failed to spawn `{command}`: {source}")]
    CommandSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// A role or database name that cannot be quoted safely
    #[error("Identifier {identifier:?} is not pure ASCII")]
    NonAsciiIdentifier { identifier: String },

    /// A bundled package could not be inspected
    #[error("Package error: {message}")]
    Package { message: String },

    #[error("Invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
