//! Sandbox execution orchestrator
//!
//! One call, one sandbox. The sandbox is killed exactly once on every exit
//! path: explicitly after the run, or from [`TeardownGuard`]'s `Drop` when
//! the caller's future is cancelled mid-flight.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::{debug, info, info_span, warn, Instrument};

use super::{
    ExecuteRequest, ExecuteResponse, ExecutionResult, GeneratedFile, Sandbox, SandboxError,
    SandboxProvider, MOUNT_DIR,
};
use crate::metrics::{
    GENERATED_FILES, GENERATED_FILES_SKIPPED, SANDBOX_DURATION, SANDBOX_EXECUTIONS,
    SANDBOX_TEARDOWN_FAILURES,
};
use crate::preview;

/// Largest single generated file returned to the client (5 MB)
pub const MAX_GENERATED_FILE_BYTES: u64 = 5 * 1024 * 1024;

/// Largest total of generated files returned for one run (20 MB)
pub const MAX_GENERATED_TOTAL_BYTES: u64 = 20 * 1024 * 1024;

/// Number of base64 characters compared when deduplicating figures
pub const IMAGE_FINGERPRINT_CHARS: usize = 200;

/// Kills the sandbox if it is dropped before [`TeardownGuard::teardown`]
struct TeardownGuard {
    sandbox: Option<Arc<dyn Sandbox>>,
}

impl TeardownGuard {
    fn new(sandbox: Arc<dyn Sandbox>) -> Self {
        Self {
            sandbox: Some(sandbox),
        }
    }

    async fn teardown(mut self) {
        if let Some(sandbox) = self.sandbox.take() {
            kill(sandbox).await;
        }
    }
}

impl Drop for TeardownGuard {
    fn drop(&mut self) {
        if let Some(sandbox) = self.sandbox.take() {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(kill(sandbox));
                }
                Err(_) => {
                    warn!(sandbox_id = %sandbox.id(), "no runtime to tear down sandbox");
                    SANDBOX_TEARDOWN_FAILURES.inc();
                }
            }
        }
    }
}

async fn kill(sandbox: Arc<dyn Sandbox>) {
    if let Err(e) = sandbox.kill().await {
        warn!(sandbox_id = %sandbox.id(), error = %e, "sandbox teardown failed");
        SANDBOX_TEARDOWN_FAILURES.inc();
    }
}

/// Runs approved code in fresh sandboxes
#[derive(Clone)]
pub struct Orchestrator {
    provider: Arc<dyn SandboxProvider>,
    execution_timeout: Duration,
}

impl Orchestrator {
    pub fn new(provider: Arc<dyn SandboxProvider>, execution_timeout: Duration) -> Self {
        Self {
            provider,
            execution_timeout,
        }
    }

    /// Provision, stage, run, collect and tear down
    pub async fn execute(&self, request: ExecuteRequest) -> Result<ExecuteResponse, SandboxError> {
        let staged = decode_inputs(&request)?;
        let started = Instant::now();

        let sandbox = match self.provider.create().await {
            Ok(sandbox) => sandbox,
            Err(e) => {
                SANDBOX_EXECUTIONS.with_label_values(&["provision_failed"]).inc();
                return Err(match e {
                    SandboxError::Provision(message) => SandboxError::Provision(message),
                    other => SandboxError::Provision(other.to_string()),
                });
            }
        };

        let span = info_span!("sandbox_execution", sandbox_id = %sandbox.id(), otel.name = "sandbox_execution");
        let guard = TeardownGuard::new(sandbox.clone());

        let result = self
            .run_in(sandbox.as_ref(), &request.code, &staged)
            .instrument(span)
            .await;
        guard.teardown().await;

        SANDBOX_DURATION.observe(started.elapsed().as_secs_f64());
        let status = match &result {
            Ok(response) if response.error.is_some() => "error",
            Ok(_) => "success",
            Err(_) => "failed",
        };
        SANDBOX_EXECUTIONS.with_label_values(&[status]).inc();
        result
    }

    async fn run_in(
        &self,
        sandbox: &dyn Sandbox,
        code: &str,
        staged: &[(String, Vec<u8>)],
    ) -> Result<ExecuteResponse, SandboxError> {
        for (name, content) in staged {
            sandbox
                .write_file(&format!("{}/{}", MOUNT_DIR, name), content)
                .await?;
        }
        debug!(files = staged.len(), "inputs staged");

        let output = tokio::time::timeout(
            self.execution_timeout,
            sandbox.run_code(code, self.execution_timeout),
        )
        .await
        .map_err(|_| SandboxError::Timeout {
            secs: self.execution_timeout.as_secs(),
        })??;

        let generated_files = if output.error.is_none() {
            let inputs: HashSet<&str> = staged.iter().map(|(name, _)| name.as_str()).collect();
            collect_generated(sandbox, &inputs).await
        } else {
            Vec::new()
        };

        info!(
            results = output.results.len(),
            generated = generated_files.len(),
            failed = output.error.is_some(),
            "execution finished"
        );

        Ok(ExecuteResponse {
            stdout: output.stdout,
            stderr: output.stderr,
            results: dedupe_images(output.results),
            generated_files,
            error: output.error,
        })
    }
}

/// Validate names and decode contents before anything is provisioned
fn decode_inputs(request: &ExecuteRequest) -> Result<Vec<(String, Vec<u8>)>, SandboxError> {
    if request.code.trim().is_empty() {
        return Err(SandboxError::InvalidInput("code is empty".to_string()));
    }
    request
        .files
        .iter()
        .map(|file| {
            if file.name.is_empty()
                || file.name.contains('/')
                || file.name.contains('\\')
                || file.name == ".."
            {
                return Err(SandboxError::InvalidInput(format!(
                    "invalid file name '{}'",
                    file.name
                )));
            }
            let bytes = STANDARD.decode(file.content.trim()).map_err(|e| {
                SandboxError::InvalidInput(format!("'{}' is not valid base64: {}", file.name, e))
            })?;
            Ok((file.name.clone(), bytes))
        })
        .collect()
}

/// Files the run left in the mount directory
///
/// Best effort: a listing failure yields no files, a read failure skips
/// that file. Files over either ceiling are skipped whole.
async fn collect_generated(sandbox: &dyn Sandbox, inputs: &HashSet<&str>) -> Vec<GeneratedFile> {
    let entries = match sandbox.list_dir(MOUNT_DIR).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!(error = %e, "generated file discovery failed");
            return Vec::new();
        }
    };

    let mut total: u64 = 0;
    let mut files = Vec::new();

    for entry in entries {
        if entry.is_dir || entry.name.starts_with('.') || inputs.contains(entry.name.as_str()) {
            continue;
        }
        if let Some(size) = entry.size {
            if size > MAX_GENERATED_FILE_BYTES || total + size > MAX_GENERATED_TOTAL_BYTES {
                skip(&entry.name, size);
                continue;
            }
        }

        let content = match sandbox
            .read_file(&format!("{}/{}", MOUNT_DIR, entry.name))
            .await
        {
            Ok(content) => content,
            Err(e) => {
                warn!(file = %entry.name, error = %e, "failed to read generated file");
                continue;
            }
        };

        // Listed sizes are advisory; the bytes read are authoritative
        let size = content.len() as u64;
        if size > MAX_GENERATED_FILE_BYTES || total + size > MAX_GENERATED_TOTAL_BYTES {
            skip(&entry.name, size);
            continue;
        }
        total += size;

        let rich_preview = if preview::is_tabular(&entry.name) {
            preview::preview_bytes(&entry.name, &content).ok()
        } else {
            None
        };

        GENERATED_FILES.inc();
        files.push(GeneratedFile {
            content: STANDARD.encode(&content),
            size: content.len(),
            name: entry.name,
            rich_preview,
        });
    }

    files
}

fn skip(name: &str, size: u64) {
    debug!(file = %name, size, "generated file over size ceiling, skipped");
    GENERATED_FILES_SKIPPED.inc();
}

/// Drop figures whose payload starts like one already kept
pub fn dedupe_images(results: Vec<ExecutionResult>) -> Vec<ExecutionResult> {
    let mut seen: HashSet<String> = HashSet::new();
    results
        .into_iter()
        .filter(|result| match result.image() {
            Some(payload) => {
                let fingerprint: String = payload.chars().take(IMAGE_FINGERPRINT_CHARS).collect();
                seen.insert(fingerprint)
            }
            None => true,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::{DirEntry, ExecutionError, InputFile, RunOutput};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeSandbox {
        files: Mutex<BTreeMap<String, Vec<u8>>>,
        output: RunOutput,
        /// Files the "code" writes when it runs
        creates: Vec<(String, Vec<u8>)>,
        hang: bool,
        fail_listing: bool,
        kills: AtomicUsize,
    }

    #[async_trait]
    impl Sandbox for FakeSandbox {
        fn id(&self) -> &str {
            "fake"
        }

        async fn write_file(&self, path: &str, content: &[u8]) -> Result<(), SandboxError> {
            self.files.lock().insert(path.to_string(), content.to_vec());
            Ok(())
        }

        async fn read_file(&self, path: &str) -> Result<Vec<u8>, SandboxError> {
            self.files
                .lock()
                .get(path)
                .cloned()
                .ok_or_else(|| SandboxError::InvalidInput(path.to_string()))
        }

        async fn list_dir(&self, path: &str) -> Result<Vec<DirEntry>, SandboxError> {
            if self.fail_listing {
                return Err(SandboxError::Status { status: 500, body: "boom".to_string() });
            }
            let prefix = format!("{}/", path);
            Ok(self
                .files
                .lock()
                .iter()
                .filter_map(|(p, c)| {
                    p.strip_prefix(&prefix).map(|name| DirEntry {
                        name: name.to_string(),
                        is_dir: false,
                        size: Some(c.len() as u64),
                    })
                })
                .collect())
        }

        async fn run_code(&self, _code: &str, _timeout: Duration) -> Result<RunOutput, SandboxError> {
            if self.hang {
                std::future::pending::<()>().await;
            }
            let mut files = self.files.lock();
            for (name, content) in &self.creates {
                files.insert(format!("{}/{}", MOUNT_DIR, name), content.clone());
            }
            Ok(self.output.clone())
        }

        async fn kill(&self) -> Result<(), SandboxError> {
            self.kills.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FakeProvider {
        sandbox: Option<Arc<FakeSandbox>>,
    }

    #[async_trait]
    impl SandboxProvider for FakeProvider {
        async fn create(&self) -> Result<Arc<dyn Sandbox>, SandboxError> {
            match &self.sandbox {
                Some(sandbox) => Ok(sandbox.clone() as Arc<dyn Sandbox>),
                None => Err(SandboxError::Status { status: 503, body: "no capacity".to_string() }),
            }
        }
    }

    fn orchestrator(sandbox: &Arc<FakeSandbox>) -> Orchestrator {
        Orchestrator::new(
            Arc::new(FakeProvider { sandbox: Some(sandbox.clone()) }),
            Duration::from_millis(200),
        )
    }

    fn request(files: &[(&str, &[u8])]) -> ExecuteRequest {
        ExecuteRequest {
            code: "print('hi')".to_string(),
            files: files
                .iter()
                .map(|(name, content)| InputFile {
                    name: name.to_string(),
                    content: STANDARD.encode(content),
                })
                .collect(),
        }
    }

    fn png(payload: &str) -> ExecutionResult {
        ExecutionResult { png: Some(payload.to_string()), ..Default::default() }
    }

    #[tokio::test]
    async fn test_stages_runs_and_collects() {
        let sandbox = Arc::new(FakeSandbox {
            output: RunOutput { stdout: "hi\n".to_string(), ..Default::default() },
            creates: vec![
                ("summary.csv".to_string(), b"a,b\n1,2\n".to_vec()),
                (".cache".to_string(), b"x".to_vec()),
            ],
            ..Default::default()
        });

        let response = orchestrator(&sandbox)
            .execute(request(&[("data.csv", b"x\n1\n")]))
            .await
            .unwrap();

        assert_eq!(response.stdout, "hi\n");
        assert_eq!(response.generated_files.len(), 1);
        let generated = &response.generated_files[0];
        assert_eq!(generated.name, "summary.csv");
        assert_eq!(generated.size, 8);
        assert_eq!(generated.rich_preview.as_ref().map(|p| p.shape), Some([1, 2]));
        assert!(sandbox.files.lock().contains_key("/home/user/data.csv"));
        assert_eq!(sandbox.kills.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fatal_error_skips_discovery() {
        let sandbox = Arc::new(FakeSandbox {
            output: RunOutput {
                error: Some(ExecutionError {
                    name: "NameError".to_string(),
                    value: "name 'x' is not defined".to_string(),
                    traceback: String::new(),
                }),
                ..Default::default()
            },
            creates: vec![("out.txt".to_string(), b"x".to_vec())],
            ..Default::default()
        });

        let response = orchestrator(&sandbox).execute(request(&[])).await.unwrap();
        assert!(response.generated_files.is_empty());
        assert_eq!(response.error.unwrap().name, "NameError");
        assert_eq!(sandbox.kills.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_size_ceilings_skip_whole_files() {
        let big = vec![0u8; MAX_GENERATED_FILE_BYTES as usize + 1];
        let chunk = vec![1u8; 4 * 1024 * 1024];
        let sandbox = Arc::new(FakeSandbox {
            creates: vec![
                ("a_big.bin".to_string(), big),
                ("b1.bin".to_string(), chunk.clone()),
                ("b2.bin".to_string(), chunk.clone()),
                ("b3.bin".to_string(), chunk.clone()),
                ("b4.bin".to_string(), chunk.clone()),
                ("b5.bin".to_string(), chunk),
                ("c.txt".to_string(), b"small".to_vec()),
            ],
            ..Default::default()
        });

        let response = orchestrator(&sandbox).execute(request(&[])).await.unwrap();
        let names: Vec<&str> = response.generated_files.iter().map(|f| f.name.as_str()).collect();
        // 5 x 4 MB hits the 20 MB ceiling exactly, the small file no longer fits
        assert_eq!(names, vec!["b1.bin", "b2.bin", "b3.bin", "b4.bin", "b5.bin"]);
        assert!(response.generated_files.iter().all(|f| f.size == 4 * 1024 * 1024));
    }

    #[tokio::test]
    async fn test_listing_failure_degrades_to_no_files() {
        let sandbox = Arc::new(FakeSandbox { fail_listing: true, ..Default::default() });
        let response = orchestrator(&sandbox).execute(request(&[])).await.unwrap();
        assert!(response.generated_files.is_empty());
        assert_eq!(sandbox.kills.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_still_tears_down() {
        let sandbox = Arc::new(FakeSandbox { hang: true, ..Default::default() });
        let err = orchestrator(&sandbox).execute(request(&[])).await.unwrap_err();
        assert!(matches!(err, SandboxError::Timeout { .. }));
        assert_eq!(sandbox.kills.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancellation_tears_down_once() {
        let sandbox = Arc::new(FakeSandbox { hang: true, ..Default::default() });
        let orch = Orchestrator::new(
            Arc::new(FakeProvider { sandbox: Some(sandbox.clone()) }),
            Duration::from_secs(60),
        );

        let call = orch.execute(request(&[]));
        let cancelled = tokio::time::timeout(Duration::from_millis(50), call).await;
        assert!(cancelled.is_err());

        // The guard spawned the kill; let it run
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(sandbox.kills.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_provision_failure_is_distinct() {
        let orch = Orchestrator::new(Arc::new(FakeProvider { sandbox: None }), Duration::from_secs(1));
        let err = orch.execute(request(&[])).await.unwrap_err();
        assert!(err.is_provision());
    }

    #[tokio::test]
    async fn test_invalid_input_rejected_before_provisioning() {
        let sandbox = Arc::new(FakeSandbox::default());
        let mut req = request(&[]);
        req.files.push(InputFile { name: "x.csv".to_string(), content: "%%%".to_string() });
        let err = orchestrator(&sandbox).execute(req).await.unwrap_err();
        assert!(matches!(err, SandboxError::InvalidInput(_)));
        assert_eq!(sandbox.kills.load(Ordering::SeqCst), 0);

        let mut req = request(&[]);
        req.code = "  ".to_string();
        assert!(orchestrator(&sandbox).execute(req).await.is_err());
    }

    #[test]
    fn test_dedupe_images() {
        let same_prefix = "A".repeat(IMAGE_FINGERPRINT_CHARS);
        let results = vec![
            png(&format!("{}tail-one", same_prefix)),
            ExecutionResult { text: Some("42".to_string()), ..Default::default() },
            png(&format!("{}tail-two", same_prefix)),
            png(&"B".repeat(IMAGE_FINGERPRINT_CHARS + 5)),
        ];
        let kept = dedupe_images(results);
        assert_eq!(kept.len(), 3);
        assert!(kept[0].png.as_deref().unwrap().ends_with("tail-one"));
        assert_eq!(kept[1].text.as_deref(), Some("42"));
        assert!(kept[2].png.as_deref().unwrap().starts_with('B'));
    }
}
