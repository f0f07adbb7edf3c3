use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::domain::FileFormat;
use crate::error::BioAgeError;
use crate::genomic::{GenomicTool, ToolReport};
use crate::tools::find_in_path;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

// Invoked as `<program> [args...] <format> <file>`; prints a JSON ToolReport.
#[derive(Debug, Clone)]
pub struct ExternalTool {
    name: String,
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl ExternalTool {
    pub fn new(program: &str, args: Vec<String>, timeout: Duration) -> Result<Self, BioAgeError> {
        let resolved = resolve_program(program)
            .ok_or_else(|| BioAgeError::MissingTool(program.to_string()))?;
        let name = resolved
            .file_name()
            .map(|value| value.to_string_lossy().to_string())
            .unwrap_or_else(|| program.to_string());
        Ok(Self {
            name,
            program: resolved,
            args,
            timeout,
        })
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn spawn(&self, path: &Path, format: FileFormat) -> Result<Child, BioAgeError> {
        tracing::debug!(
            program = %self.program.display(),
            input = %path.display(),
            "spawning genomic tool"
        );
        Command::new(&self.program)
            .args(&self.args)
            .arg(format.extension())
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| BioAgeError::Processing(format!("{}: {err}", self.name)))
    }
}

impl GenomicTool for ExternalTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn summarize(&self, path: &Path, format: FileFormat) -> Result<ToolReport, BioAgeError> {
        let mut child = self.spawn(path, format)?;
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let started = Instant::now();
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if started.elapsed() >= self.timeout => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(BioAgeError::Timeout {
                        tool: self.name.clone(),
                        limit: self.timeout,
                    });
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(err) => {
                    let _ = child.kill();
                    return Err(BioAgeError::Processing(format!("{}: {err}", self.name)));
                }
            }
        };

        let stdout = collect(stdout);
        let stderr = collect(stderr);

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr).trim().to_string();
            let message = if stderr.is_empty() {
                format!("{} exited with {status}", self.name)
            } else {
                format!("{}: {stderr}", self.name)
            };
            return Err(BioAgeError::Processing(message));
        }

        serde_json::from_slice(&stdout)
            .map_err(|err| BioAgeError::parse(format!("{} output", self.name), err))
    }
}

fn resolve_program(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 || candidate.is_absolute() {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    find_in_path(program)
}

fn drain<R: Read + Send + 'static>(stream: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    stream.map(|mut stream| {
        thread::spawn(move || {
            let mut buffer = Vec::new();
            let _ = stream.read_to_end(&mut buffer);
            buffer
        })
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

#[cfg(all(test, unix))]
mod tests {
    use std::fs;

    use assert_matches::assert_matches;

    use super::*;

    // Run through /bin/sh so the script is never exec'd directly (ETXTBSY).
    fn shell_tool(dir: &Path, body: &str, mut args: Vec<String>, timeout: Duration) -> ExternalTool {
        let path = dir.join("tool.sh");
        fs::write(&path, format!("{body}\n")).unwrap();
        args.insert(0, path.to_string_lossy().to_string());
        ExternalTool::new("/bin/sh", args, timeout).unwrap()
    }

    #[test]
    fn parses_json_report() {
        let temp = tempfile::tempdir().unwrap();
        let tool = shell_tool(
            temp.path(),
            r#"echo '{"record_count": 2, "variant_ids": ["rs7412"], "coverage_depth": 12.5, "accuracy_percent": 99.1}'"#,
            Vec::new(),
            Duration::from_secs(10),
        );
        let report = tool
            .summarize(Path::new("input.vcf"), FileFormat::Vcf)
            .unwrap();
        assert_eq!(report.record_count, 2);
        assert_eq!(report.variant_ids, vec!["rs7412"]);
        assert_eq!(tool.name(), "sh");
    }

    #[test]
    fn receives_format_and_path() {
        let temp = tempfile::tempdir().unwrap();
        let tool = shell_tool(
            temp.path(),
            r#"[ "$1" = "--fast" ] && [ "$2" = "fasta" ] && [ "$3" = "genome.fasta" ] || exit 4
echo '{"record_count": 0, "coverage_depth": 0, "accuracy_percent": 0}'"#,
            vec!["--fast".to_string()],
            Duration::from_secs(10),
        );
        let report = tool
            .summarize(Path::new("genome.fasta"), FileFormat::Fasta)
            .unwrap();
        assert!(report.variant_ids.is_empty());
    }

    #[test]
    fn non_zero_exit_is_processing_failure() {
        let temp = tempfile::tempdir().unwrap();
        let tool = shell_tool(
            temp.path(),
            "echo 'index missing' >&2\nexit 3",
            Vec::new(),
            Duration::from_secs(10),
        );
        let err = tool
            .summarize(Path::new("input.vcf"), FileFormat::Vcf)
            .unwrap_err();
        assert_matches!(err, BioAgeError::Processing(message) if message.contains("index missing"));
    }

    #[test]
    fn garbage_output_is_parse_failure() {
        let temp = tempfile::tempdir().unwrap();
        let tool = shell_tool(
            temp.path(),
            "echo 'not json'",
            Vec::new(),
            Duration::from_secs(10),
        );
        let err = tool
            .summarize(Path::new("input.vcf"), FileFormat::Vcf)
            .unwrap_err();
        assert_matches!(err, BioAgeError::Parse { .. });
    }

    #[test]
    fn slow_tool_is_killed() {
        let temp = tempfile::tempdir().unwrap();
        let tool = shell_tool(
            temp.path(),
            "exec sleep 5",
            Vec::new(),
            Duration::from_millis(100),
        );
        let started = Instant::now();
        let err = tool
            .summarize(Path::new("input.vcf"), FileFormat::Vcf)
            .unwrap_err();
        assert_matches!(err, BioAgeError::Timeout { .. });
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn missing_program() {
        let err = ExternalTool::new(
            "kira-bioage-no-such-tool",
            Vec::new(),
            Duration::from_secs(1),
        )
        .unwrap_err();
        assert_matches!(err, BioAgeError::MissingTool(_));

        let err = ExternalTool::new("/nonexistent/bin/tool", Vec::new(), Duration::from_secs(1))
            .unwrap_err();
        assert_matches!(err, BioAgeError::MissingTool(_));
    }
}
