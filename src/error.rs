use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum KiraError {
    #[error("input file not found: {}", .0.display())]
    MissingInput(PathBuf),

    #[error("invalid query id: {0:?}")]
    InvalidQueryId(String),

    #[error("failed to read config file at {}", .0.display())]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid value for {name}: {value}")]
    InvalidSetting { name: String, value: String },

    #[error("required tool not found: {0}")]
    #[diagnostic(help("install NCBI EDirect and make sure it is on PATH"))]
    MissingTool(String),

    #[error("EDirect command failed: {0}")]
    EdirectCommand(String),

    #[error("ENA request failed: {0}")]
    EnaHttp(String),

    #[error("ENA returned status {status}: {message}")]
    EnaStatus { status: u16, message: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to process table {path}: {message}")]
    Table { path: String, message: String },

    #[error("input file is empty or has no header: {0}")]
    EmptyTable(String),

    #[error("missing required columns in {path}: {}", .missing.join(", "))]
    MissingColumns { path: String, missing: Vec<String> },

    #[error("header mismatch in {path}\nexpected: {expected}\nfound:    {found}")]
    #[diagnostic(help("make sure all per-query files were fetched with the same fields"))]
    HeaderMismatch {
        path: String,
        expected: String,
        found: String,
    },

    #[error("no input files matched {0}")]
    NoInputFiles(String),
}
