use std::ffi::OsStr;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::thread;

use serde::Serialize;

use crate::domain::Source;
use crate::error::KiraError;
use crate::source::MetadataSource;

pub const REQUIRED_TOOLS: [&str; 3] = ["esearch", "efetch", "xtract"];

#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub esearch: String,
    pub efetch: String,
    pub xtract: String,
    pub api_key: bool,
}

/// SRA RunInfo through the NCBI EDirect command line tools.
#[derive(Debug, Clone)]
pub struct EdirectSource {
    esearch: PathBuf,
    efetch: PathBuf,
    xtract: PathBuf,
    database: String,
}

impl EdirectSource {
    /// Looks up all EDirect tools on `PATH`; any missing one is fatal.
    pub fn discover() -> Result<Self, KiraError> {
        let path_var = std::env::var_os("PATH").unwrap_or_default();
        Self::discover_in(&path_var)
    }

    pub fn discover_in(path_var: &OsStr) -> Result<Self, KiraError> {
        let [esearch, efetch, xtract] = REQUIRED_TOOLS;
        Ok(Self {
            esearch: require_tool(path_var, esearch)?,
            efetch: require_tool(path_var, efetch)?,
            xtract: require_tool(path_var, xtract)?,
            database: "sra".to_string(),
        })
    }

    pub fn tool_info(&self) -> ToolInfo {
        ToolInfo {
            esearch: self.esearch.display().to_string(),
            efetch: self.efetch.display().to_string(),
            xtract: self.xtract.display().to_string(),
            api_key: std::env::var("NCBI_API_KEY")
                .map(|key| !key.trim().is_empty())
                .unwrap_or(false),
        }
    }

    fn esearch(&self, query: &str) -> Command {
        let mut cmd = Command::new(&self.esearch);
        cmd.args(["-db", self.database.as_str(), "-query", query]);
        cmd
    }

    fn count_hits(&self, query: &str) -> Result<String, KiraError> {
        let mut xtract = Command::new(&self.xtract);
        xtract.args(["-pattern", "ENTREZ_DIRECT", "-element", "Count"]);
        let output = run_pipeline(&mut self.esearch(query), &mut xtract, Stdio::piped())?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl MetadataSource for EdirectSource {
    fn source(&self) -> Source {
        Source::Sra
    }

    fn count(&self, query: &str) -> Option<Result<String, KiraError>> {
        Some(self.count_hits(query))
    }

    fn fetch(&self, query: &str, destination: &Path) -> Result<(), KiraError> {
        let file = File::create(destination)
            .map_err(|err| KiraError::Filesystem(format!("create {}: {err}", destination.display())))?;
        let mut efetch = Command::new(&self.efetch);
        efetch.args(["-format", "runinfo"]);
        run_pipeline(&mut self.esearch(query), &mut efetch, Stdio::from(file))?;
        Ok(())
    }
}

/// Runs `upstream | downstream`. Either side exiting non-zero is an error
/// carrying that side's stderr.
fn run_pipeline(
    upstream: &mut Command,
    downstream: &mut Command,
    stdout: Stdio,
) -> Result<Output, KiraError> {
    let mut first = upstream
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| spawn_error(upstream, err))?;
    let pipe = first
        .stdout
        .take()
        .ok_or_else(|| KiraError::EdirectCommand("upstream stdout unavailable".to_string()))?;

    let second = match downstream
        .stdin(Stdio::from(pipe))
        .stdout(stdout)
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(err) => {
            let _ = first.kill();
            let _ = first.wait();
            return Err(spawn_error(downstream, err));
        }
    };

    // upstream stderr is read while downstream runs
    let first_stderr = first.stderr.take().map(|mut stderr| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = stderr.read_to_end(&mut buf);
            buf
        })
    });

    let second_output = second
        .wait_with_output()
        .map_err(|err| KiraError::EdirectCommand(err.to_string()))?;
    let first_status = first
        .wait()
        .map_err(|err| KiraError::EdirectCommand(err.to_string()))?;
    let first_output = Output {
        status: first_status,
        stdout: Vec::new(),
        stderr: first_stderr
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default(),
    };

    check_status(upstream, &first_output)?;
    check_status(downstream, &second_output)?;
    Ok(second_output)
}

fn check_status(cmd: &Command, output: &Output) -> Result<(), KiraError> {
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let message = if stderr.is_empty() {
        format!("command failed: {} ({})", program_name(cmd), output.status)
    } else {
        format!("{}: {stderr}", program_name(cmd))
    };
    Err(KiraError::EdirectCommand(message))
}

fn spawn_error(cmd: &Command, err: std::io::Error) -> KiraError {
    KiraError::EdirectCommand(format!("failed to start {}: {err}", program_name(cmd)))
}

fn program_name(cmd: &Command) -> String {
    Path::new(cmd.get_program())
        .file_name()
        .unwrap_or(cmd.get_program())
        .to_string_lossy()
        .into_owned()
}

fn require_tool(path_var: &OsStr, name: &str) -> Result<PathBuf, KiraError> {
    find_in_path(path_var, name).ok_or_else(|| KiraError::MissingTool(name.to_string()))
}

fn find_in_path(path_var: &OsStr, name: &str) -> Option<PathBuf> {
    for dir in std::env::split_paths(path_var) {
        let exe = dir.join(format!("{name}.exe"));
        if exe.is_file() {
            return Some(exe);
        }
        let plain = dir.join(name);
        if plain.is_file() {
            return Some(plain);
        }
    }
    None
}
