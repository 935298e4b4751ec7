// Command processor: bridges a queue to the web application's handler scripts
// reason: tokio::process for async child management, nix for SIGTERM
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use clarity_core::domain::Job;
use clarity_core::port::{JobProcessor, ProcessorError};

/// Handler command used when none is configured; the processor kind is appended
pub const DEFAULT_PROCESSOR_COMMAND: &str = "node scripts/jobs/run-processor.js";

/// Time a child gets between SIGTERM and SIGKILL
const KILL_GRACE_PERIOD: Duration = Duration::from_secs(2);

/// Variables passed through from the worker's own environment
pub const DEFAULT_ENV_ALLOWLIST: &[&str] = &[
    "PATH",
    "HOME",
    "USER",
    "LANG",
    "TZ",
    "NODE_ENV",
    "DATABASE_URL",
];

/// Runs one child process per job
///
/// Contract with the handler:
/// - payload JSON on stdin
/// - `JOB_ID`, `JOB_NAME`, `JOB_QUEUE`, `JOB_ATTEMPTS_MADE` in the environment,
///   plus the allowlisted variables (nothing else leaks through)
/// - exit 0 succeeds; stdout is the result (JSON, or a string when not JSON)
/// - non-zero exit fails the job with stderr as the message
/// - `payload.timeoutMs` bounds the run (SIGTERM, then SIGKILL)
pub struct CommandProcessor {
    name: String,
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    env_allowlist: Vec<String>,
}

impl CommandProcessor {
    /// Create a processor running `program args...`
    ///
    /// # Arguments
    /// * `name` - Processor kind shown in logs
    /// * `program` - Executable
    /// * `args` - Fixed arguments
    ///
    /// # Example
    /// ```ignore
    /// let echo = CommandProcessor::new("echo", "sh", vec!["-c".into(), "cat".into()]);
    /// ```
    pub fn new(name: impl Into<String>, program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args,
            working_dir: None,
            env_allowlist: DEFAULT_ENV_ALLOWLIST.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Split a command line on whitespace and append the processor kind
    pub fn for_kind(kind: &str, command_line: &str) -> Result<Self, ProcessorError> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| ProcessorError::SpawnFailed("empty processor command".to_string()))?;
        let mut args: Vec<String> = parts.collect();
        args.push(kind.to_string());
        Ok(Self::new(kind, program, args))
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_env_allowlist(mut self, allowlist: Vec<String>) -> Self {
        self.env_allowlist = allowlist;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Allowlisted variables from the current environment
    fn filtered_env(&self) -> Vec<(String, String)> {
        std::env::vars()
            .filter(|(k, _)| self.env_allowlist.iter().any(|allowed| allowed == k))
            .collect()
    }

    fn job_env(job: &Job) -> [(&'static str, String); 4] {
        [
            ("JOB_ID", job.id.clone()),
            ("JOB_NAME", job.name.clone()),
            ("JOB_QUEUE", job.queue.clone()),
            ("JOB_ATTEMPTS_MADE", job.attempts_made.to_string()),
        ]
    }

    fn timeout_for(job: &Job) -> Option<Duration> {
        job.payload
            .as_value()
            .get("timeoutMs")
            .and_then(|v| v.as_u64())
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    fn spawn(&self, job: &Job) -> Result<Child, ProcessorError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .env_clear()
            .envs(self.filtered_env())
            .envs(Self::job_env(job))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        command
            .spawn()
            .map_err(|e| ProcessorError::SpawnFailed(format!("{}: {}", self.program, e)))
    }

    /// SIGTERM, give the child a grace period, then SIGKILL
    async fn terminate(&self, child: &mut Child) {
        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            if let Some(pid) = child.id() {
                info!(pid, processor = %self.name, "Sending SIGTERM to timed out job");
                if kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok()
                    && tokio::time::timeout(KILL_GRACE_PERIOD, child.wait()).await.is_ok()
                {
                    return;
                }
            }
        }

        warn!(processor = %self.name, "Job process did not exit, sending SIGKILL");
        if let Err(e) = child.kill().await {
            warn!(processor = %self.name, error = %e, "Failed to kill job process");
        }
    }

    fn build_result(status: ExitStatus, stdout: &[u8], stderr: &[u8]) -> Result<serde_json::Value, ProcessorError> {
        if !status.success() {
            let stderr = String::from_utf8_lossy(stderr).trim().to_string();
            let code = status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            return Err(ProcessorError::Failed(if stderr.is_empty() {
                format!("exit code {}", code)
            } else {
                format!("exit code {}: {}", code, stderr)
            }));
        }

        let stdout = String::from_utf8_lossy(stdout);
        let stdout = stdout.trim();
        if stdout.is_empty() {
            return Ok(serde_json::Value::Null);
        }
        Ok(serde_json::from_str(stdout).unwrap_or_else(|_| serde_json::Value::String(stdout.to_string())))
    }
}

async fn read_all<R: AsyncRead + Unpin>(pipe: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf).await;
    }
    buf
}

#[async_trait]
impl JobProcessor for CommandProcessor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, job: &Job) -> Result<serde_json::Value, ProcessorError> {
        let body = serde_json::to_vec(job.payload.as_value())
            .map_err(|e| ProcessorError::InvalidPayload(e.to_string()))?;
        let limit = Self::timeout_for(job);

        debug!(
            processor = %self.name,
            job_id = %job.id,
            program = %self.program,
            timeout_ms = limit.map(|d| d.as_millis() as u64),
            "Spawning job process"
        );

        let mut child = self.spawn(job)?;

        // Readers first so a chatty child never blocks on a full pipe
        let stdout = tokio::spawn(read_all(child.stdout.take()));
        let stderr = tokio::spawn(read_all(child.stderr.take()));

        // Writing stdin counts against the timeout
        let stdin = child.stdin.take();
        let writer = tokio::spawn(async move {
            match stdin {
                Some(mut stdin) => stdin.write_all(&body).await,
                None => Ok(()),
            }
        });

        let status = match limit {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => status.map_err(|e| ProcessorError::Io(e.to_string()))?,
                Err(_) => {
                    writer.abort();
                    self.terminate(&mut child).await;
                    return Err(ProcessorError::Timeout(limit.as_millis() as u64));
                }
            },
            None => child
                .wait()
                .await
                .map_err(|e| ProcessorError::Io(e.to_string()))?,
        };

        match writer.await {
            // A handler may exit without reading its input
            Ok(Err(e)) if e.kind() != std::io::ErrorKind::BrokenPipe => {
                return Err(ProcessorError::Io(e.to_string()));
            }
            Err(e) => return Err(ProcessorError::Io(e.to_string())),
            Ok(_) => {}
        }

        let stdout = stdout.await.unwrap_or_default();
        let stderr = stderr.await.unwrap_or_default();
        Self::build_result(status, &stdout, &stderr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clarity_core::domain::JobPayload;
    use serde_json::json;

    fn job(payload: serde_json::Value) -> Job {
        let mut job = Job::new("job-7", 0, "email", "send-digest", JobPayload::new(payload));
        job.attempts_made = 2;
        job
    }

    fn shell(script: &str) -> CommandProcessor {
        CommandProcessor::new("test", "sh", vec!["-c".to_string(), script.to_string()])
    }

    #[tokio::test]
    async fn test_payload_goes_in_on_stdin_and_json_comes_back() {
        let payload = json!({"userId": "u-1", "items": [1, 2]});
        let result = shell("cat").process(&job(payload.clone())).await.unwrap();
        assert_eq!(result, payload);
    }

    #[tokio::test]
    async fn test_job_env_and_plain_text_result() {
        let result = shell("echo \"$JOB_ID:$JOB_QUEUE:$JOB_ATTEMPTS_MADE\"")
            .process(&job(json!({})))
            .await
            .unwrap();
        assert_eq!(result, json!("job-7:email:2"));
    }

    #[tokio::test]
    async fn test_non_zero_exit_fails_with_stderr() {
        let err = shell("echo 'smtp unreachable' >&2; exit 3")
            .process(&job(json!({})))
            .await
            .unwrap_err();
        assert_eq!(err, ProcessorError::Failed("exit code 3: smtp unreachable".to_string()));
    }

    #[tokio::test]
    async fn test_timeout_kills_child() {
        let started = std::time::Instant::now();
        let err = shell("sleep 10")
            .process(&job(json!({"timeoutMs": 100})))
            .await
            .unwrap_err();
        assert_eq!(err, ProcessorError::Timeout(100));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_timeout_covers_unread_stdin() {
        // Far larger than a pipe buffer and never read by the child
        let payload = json!({"timeoutMs": 100, "blob": "x".repeat(512 * 1024)});
        let started = std::time::Instant::now();
        let err = shell("sleep 3").process(&job(payload)).await.unwrap_err();
        assert_eq!(err, ProcessorError::Timeout(100));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_environment_is_allowlisted() {
        let processor = shell("echo ${HOME:-unset}").with_env_allowlist(vec!["PATH".to_string()]);
        let result = processor.process(&job(json!({}))).await.unwrap();
        assert_eq!(result, json!("unset"));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let processor = CommandProcessor::new("ghost", "/nonexistent/handler", vec![]);
        let err = processor.process(&job(json!({}))).await.unwrap_err();
        assert!(matches!(err, ProcessorError::SpawnFailed(_)));
    }

    #[test]
    fn test_for_kind_appends_kind() {
        let processor = CommandProcessor::for_kind("sync", DEFAULT_PROCESSOR_COMMAND).unwrap();
        assert_eq!(processor.program(), "node");
        assert_eq!(processor.args(), ["scripts/jobs/run-processor.js", "sync"]);
        assert_eq!(processor.name(), "sync");
        assert!(CommandProcessor::for_kind("sync", "   ").is_err());
    }
}
