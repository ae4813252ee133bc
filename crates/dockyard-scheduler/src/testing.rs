//! In-memory collaborators shared by the scheduler tests.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use dockyard_config::BUILD_SPEC_PATH;
use dockyard_core::{
    Build, BuildId, BuildSpec, BuildStatus, CommitStatus, ContainerConfig, ContainerRuntime,
    Error, Event, EventType, ImageSpec, OutputSink, PipelineSpec, PullRequest,
    RepositorySummary, Result, SourceControl, SourceControlFactory, Task, TriggerSpec,
};
use dockyard_db::{BuildRepo, DbError, DbResult, HookRecord, HookRepo, LogRepo};
use dockyard_executor::RuntimePool;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::{BuildOrchestrator, RegisterFactory};

pub const DOCKERFILE_SHA: &str = "3f786850e387550fdab836ed7e6dc881de23001b";
pub const DOCKERFILE_PATH: &str = "docker/Dockerfile";
pub const ACCESS_TOKEN: &str = "gho_widgets";

pub fn event(event_type: EventType, branch: &str) -> Event {
    let pull_request = (event_type == EventType::Pull).then(|| PullRequest {
        number: 7,
        head_sha: "fedcba9876543210".to_string(),
    });
    let revision = match &pull_request {
        Some(pr) => format!("pull/{}/head", pr.number),
        None => "0123456789abcdef".to_string(),
    };
    Event {
        event_type,
        branch: branch.to_string(),
        organization: "acme".to_string(),
        repository: "widgets".to_string(),
        clone_url: "https://github.com/acme/widgets.git".to_string(),
        revision,
        pull_request,
    }
}

/// Push on `main` runs `ci`: `build` then `test`.
pub fn spec() -> BuildSpec {
    BuildSpec {
        docker: ImageSpec {
            file: DOCKERFILE_PATH.to_string(),
            user: Some("builder".to_string()),
            working_dir: Some("/workspace".to_string()),
        },
        jobs: HashMap::from([
            ("build".to_string(), "make build".to_string()),
            ("test".to_string(), "make test".to_string()),
        ]),
        pipelines: vec![PipelineSpec {
            name: "ci".to_string(),
            jobs: vec!["build".to_string(), "test".to_string()],
        }],
        triggers: vec![TriggerSpec {
            name: "main".to_string(),
            event: "push".to_string(),
            branch: "main".to_string(),
            pipeline: "ci".to_string(),
            env_vars: BTreeMap::from([("RUST_LOG".to_string(), "debug".to_string())]),
        }],
    }
}

#[derive(Default)]
pub struct MemorySink {
    data: Mutex<Vec<u8>>,
}

impl MemorySink {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.data.lock().unwrap()).into_owned()
    }
}

#[async_trait]
impl OutputSink for MemorySink {
    async fn write(&self, chunk: Bytes) -> Result<()> {
        self.data.lock().unwrap().extend_from_slice(&chunk);
        Ok(())
    }
}

/// One `build_image` call.
#[derive(Debug, Clone)]
pub struct ImageBuild {
    pub image: String,
    pub dockerfile: String,
    pub context: PathBuf,
    /// Whether the Dockerfile was present in the context at build time.
    pub context_had_dockerfile: bool,
}

#[derive(Default)]
struct RuntimeState {
    images: HashSet<String>,
    builds: Vec<ImageBuild>,
    tags: Vec<(String, String)>,
    created: Vec<ContainerConfig>,
    exec_argv: Vec<Vec<String>>,
    exit_codes: HashMap<String, i64>,
    removed: Vec<String>,
    fail_build: bool,
    fail_start: bool,
    panic_on: Option<String>,
}

/// Container runtime that records calls. `exec` echoes `ran <command>` and
/// exits 0 unless told otherwise.
#[derive(Default)]
pub struct FakeRuntime {
    state: Mutex<RuntimeState>,
}

impl FakeRuntime {
    fn state(&self) -> std::sync::MutexGuard<'_, RuntimeState> {
        self.state.lock().unwrap()
    }

    pub fn set_exit_code(&self, command: &str, code: i64) {
        self.state().exit_codes.insert(command.to_string(), code);
    }

    pub fn fail_build(&self) {
        self.state().fail_build = true;
    }

    pub fn fail_start(&self) {
        self.state().fail_start = true;
    }

    pub fn panic_on(&self, command: &str) {
        self.state().panic_on = Some(command.to_string());
    }

    pub fn has_image(&self, image: &str) -> bool {
        self.state().images.contains(image)
    }

    pub fn builds(&self) -> Vec<ImageBuild> {
        self.state().builds.clone()
    }

    pub fn tags(&self) -> Vec<(String, String)> {
        self.state().tags.clone()
    }

    pub fn created(&self) -> Vec<ContainerConfig> {
        self.state().created.clone()
    }

    pub fn exec_argv(&self) -> Vec<Vec<String>> {
        self.state().exec_argv.clone()
    }

    /// The shell command of every exec, in order.
    pub fn commands(&self) -> Vec<String> {
        self.state()
            .exec_argv
            .iter()
            .filter_map(|argv| argv.get(2).cloned())
            .collect()
    }

    pub fn removed(&self) -> Vec<String> {
        self.state().removed.clone()
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    fn endpoint(&self) -> &str {
        "fake://runtime"
    }

    async fn image_exists(&self, tagged_image: &str) -> Result<bool> {
        Ok(self.state().images.contains(tagged_image))
    }

    async fn build_image(&self, image_name: &str, context_dir: &Path, dockerfile: &str) -> Result<()> {
        let mut state = self.state();
        if state.fail_build {
            return Err(Error::Runtime("Failed to build image: step 2/5 failed".to_string()));
        }
        state.builds.push(ImageBuild {
            image: image_name.to_string(),
            dockerfile: dockerfile.to_string(),
            context: context_dir.to_path_buf(),
            context_had_dockerfile: context_dir.join(dockerfile).is_file(),
        });
        state.images.insert(format!("{}:latest", image_name));
        Ok(())
    }

    async fn tag_image(&self, image_name: &str, tag: &str) -> Result<()> {
        let mut state = self.state();
        state.images.insert(format!("{}:{}", image_name, tag));
        state.tags.push((image_name.to_string(), tag.to_string()));
        Ok(())
    }

    async fn create_container(&self, config: &ContainerConfig) -> Result<String> {
        let mut state = self.state();
        state.created.push(config.clone());
        Ok(format!("container-{}", state.created.len()))
    }

    async fn start_container(&self, container_id: &str) -> Result<()> {
        if self.state().fail_start {
            return Err(Error::Runtime(format!(
                "Failed to start container {}: no such image",
                container_id
            )));
        }
        Ok(())
    }

    async fn exec(&self, _container_id: &str, cmd: Vec<String>, sink: &dyn OutputSink) -> Result<i64> {
        let command = cmd.get(2).cloned().unwrap_or_default();
        let (code, explode) = {
            let mut state = self.state();
            state.exec_argv.push(cmd);
            (
                state.exit_codes.get(&command).copied().unwrap_or(0),
                state.panic_on.as_deref() == Some(command.as_str()),
            )
        };
        if explode {
            panic!("exec exploded: {}", command);
        }
        sink.write(Bytes::from(format!("ran {}\n", command))).await?;
        Ok(code)
    }

    async fn remove_container(&self, container_id: &str) -> Result<()> {
        self.state().removed.push(container_id.to_string());
        Ok(())
    }
}

/// Repository with a Dockerfile at [`DOCKERFILE_PATH`]; more files can be added.
pub struct FakeSourceControl {
    /// Path to content and content SHA.
    files: Mutex<HashMap<String, (Vec<u8>, String)>>,
    downloads: AtomicUsize,
    statuses: Mutex<Vec<(String, CommitStatus)>>,
    fail_statuses: AtomicBool,
}

impl Default for FakeSourceControl {
    fn default() -> Self {
        let files = HashMap::from([(
            DOCKERFILE_PATH.to_string(),
            (b"FROM alpine:3.19\n".to_vec(), DOCKERFILE_SHA.to_string()),
        )]);
        Self {
            files: Mutex::new(files),
            downloads: AtomicUsize::new(0),
            statuses: Mutex::new(Vec::new()),
            fail_statuses: AtomicBool::new(false),
        }
    }
}

impl FakeSourceControl {
    pub fn set_file(&self, path: &str, content: &[u8]) {
        let sha = format!("{:040x}", content.len());
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), (content.to_vec(), sha));
    }

    pub fn set_file_sha(&self, path: &str, sha: &str) {
        if let Some(entry) = self.files.lock().unwrap().get_mut(path) {
            entry.1 = sha.to_string();
        }
    }

    pub fn fail_statuses(&self) {
        self.fail_statuses.store(true, Ordering::SeqCst);
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    pub fn statuses(&self) -> Vec<(String, CommitStatus)> {
        self.statuses.lock().unwrap().clone()
    }

    fn file(&self, path: &str) -> Result<(Vec<u8>, String)> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("file {}", path)))
    }
}

#[async_trait]
impl SourceControl for FakeSourceControl {
    async fn get_file_content(&self, _owner: &str, _repo: &str, path: &str, _revision: &str) -> Result<Vec<u8>> {
        Ok(self.file(path)?.0)
    }

    async fn get_file_sha(&self, _owner: &str, _repo: &str, path: &str, _revision: &str) -> Result<String> {
        Ok(self.file(path)?.1)
    }

    async fn download_archive(&self, _owner: &str, _repo: &str, _revision: &str, dest: &Path) -> Result<()> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        let files = self.files.lock().unwrap().clone();
        for (path, (content, _)) in files {
            let target = dest.join(path);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).map_err(|e| Error::Internal(e.to_string()))?;
            }
            std::fs::write(&target, content).map_err(|e| Error::Internal(e.to_string()))?;
        }
        Ok(())
    }

    async fn create_status(&self, _owner: &str, _repo: &str, sha: &str, status: &CommitStatus) -> Result<()> {
        if self.fail_statuses.load(Ordering::SeqCst) {
            return Err(Error::SourceControl("statuses API unavailable".to_string()));
        }
        self.statuses
            .lock()
            .unwrap()
            .push((sha.to_string(), status.clone()));
        Ok(())
    }

    async fn create_hook(&self, _owner: &str, _repo: &str) -> Result<i64> {
        Ok(1)
    }

    async fn delete_hook(&self, _owner: &str, _repo: &str, _hook_id: i64) -> Result<()> {
        Ok(())
    }

    async fn list_repositories(&self) -> Result<Vec<RepositorySummary>> {
        Ok(Vec::new())
    }
}

/// Hands out the same client for every token, remembering the tokens.
pub struct FakeFactory {
    client: Arc<FakeSourceControl>,
    tokens: Mutex<Vec<String>>,
}

impl FakeFactory {
    pub fn new(client: Arc<FakeSourceControl>) -> Self {
        Self {
            client,
            tokens: Mutex::new(Vec::new()),
        }
    }

    pub fn tokens(&self) -> Vec<String> {
        self.tokens.lock().unwrap().clone()
    }
}

impl SourceControlFactory for FakeFactory {
    fn client(&self, access_token: &str) -> Arc<dyn SourceControl> {
        self.tokens.lock().unwrap().push(access_token.to_string());
        self.client.clone()
    }
}

#[derive(Default)]
pub struct FakeBuildRepo {
    builds: Mutex<Vec<Build>>,
    end_build_calls: AtomicUsize,
    fail_end_task: AtomicBool,
}

impl FakeBuildRepo {
    pub fn get(&self, id: BuildId) -> Build {
        self.builds
            .lock()
            .unwrap()
            .iter()
            .find(|b| b.id == id)
            .cloned()
            .expect("build exists")
    }

    pub fn all(&self) -> Vec<Build> {
        self.builds.lock().unwrap().clone()
    }

    pub fn end_build_calls(&self) -> usize {
        self.end_build_calls.load(Ordering::SeqCst)
    }

    pub fn fail_end_task(&self) {
        self.fail_end_task.store(true, Ordering::SeqCst);
    }

    fn with_build<T>(&self, id: BuildId, f: impl FnOnce(&mut Build) -> DbResult<T>) -> DbResult<T> {
        let mut builds = self.builds.lock().unwrap();
        let build = builds
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or_else(|| DbError::NotFound(format!("build {}", id)))?;
        f(build)
    }
}

#[async_trait]
impl BuildRepo for FakeBuildRepo {
    async fn create_build(&self, build: &Build) -> DbResult<()> {
        self.builds.lock().unwrap().push(build.clone());
        Ok(())
    }

    async fn add_task(&self, build_id: BuildId, position: usize, task: &Task) -> DbResult<()> {
        self.with_build(build_id, |build| {
            if position != build.tasks.len() {
                return Err(DbError::Duplicate(format!("task {} of build {}", position, build_id)));
            }
            build.tasks.push(task.clone());
            Ok(())
        })
    }

    async fn end_task(&self, build_id: BuildId, position: usize, status: BuildStatus, error: Option<&str>) -> DbResult<()> {
        if self.fail_end_task.load(Ordering::SeqCst) {
            return Err(DbError::Corrupt(format!("task {} of build {}", position, build_id)));
        }
        self.with_build(build_id, |build| {
            let task = build
                .tasks
                .get_mut(position)
                .ok_or_else(|| DbError::NotFound(format!("task {} of build {}", position, build_id)))?;
            task.status = status;
            task.error = error.map(str::to_string);
            task.finished_at = Some(Utc::now());
            Ok(())
        })
    }

    async fn end_build(&self, build_id: BuildId, status: BuildStatus, error: Option<&str>) -> DbResult<()> {
        self.end_build_calls.fetch_add(1, Ordering::SeqCst);
        self.with_build(build_id, |build| {
            build.status = status;
            build.error = error.map(str::to_string);
            build.finished_at = Some(Utc::now());
            Ok(())
        })
    }

    async fn get_build(&self, id: BuildId) -> DbResult<Build> {
        self.with_build(id, |build| Ok(build.clone()))
    }

    async fn list_recent(&self, limit: i64) -> DbResult<Vec<Build>> {
        let mut builds = self.all();
        builds.reverse();
        builds.truncate(limit as usize);
        Ok(builds)
    }

    async fn list_by_repository(&self, organization: &str, repository: &str, limit: i64) -> DbResult<Vec<Build>> {
        let mut builds: Vec<Build> = self
            .all()
            .into_iter()
            .rev()
            .filter(|b| b.organization == organization && b.repository == repository)
            .collect();
        builds.truncate(limit as usize);
        Ok(builds)
    }
}

#[derive(Default)]
struct StoredLog {
    data: Vec<u8>,
    closed: bool,
}

#[derive(Default)]
pub struct FakeLogRepo {
    logs: Mutex<HashMap<String, StoredLog>>,
    fail_create: AtomicBool,
}

impl FakeLogRepo {
    pub fn fail_create(&self) {
        self.fail_create.store(true, Ordering::SeqCst);
    }

    pub fn exists(&self, path: &str) -> bool {
        self.logs.lock().unwrap().contains_key(path)
    }

    pub fn contents(&self, path: &str) -> Vec<u8> {
        self.logs
            .lock()
            .unwrap()
            .get(path)
            .map(|log| log.data.clone())
            .unwrap_or_default()
    }

    pub fn is_closed(&self, path: &str) -> bool {
        self.logs
            .lock()
            .unwrap()
            .get(path)
            .is_some_and(|log| log.closed)
    }
}

#[async_trait]
impl LogRepo for FakeLogRepo {
    async fn create_log(&self, path: &str) -> DbResult<()> {
        let mut logs = self.logs.lock().unwrap();
        if self.fail_create.load(Ordering::SeqCst) || logs.contains_key(path) {
            return Err(DbError::Duplicate(format!("log {}", path)));
        }
        logs.insert(path.to_string(), StoredLog::default());
        Ok(())
    }

    async fn append_log(&self, path: &str, data: &[u8]) -> DbResult<()> {
        let mut logs = self.logs.lock().unwrap();
        match logs.get_mut(path) {
            Some(log) if !log.closed => {
                log.data.extend_from_slice(data);
                Ok(())
            }
            _ => Err(DbError::NotFound(format!("open log {}", path))),
        }
    }

    async fn close_log(&self, path: &str) -> DbResult<()> {
        let mut logs = self.logs.lock().unwrap();
        let log = logs
            .get_mut(path)
            .ok_or_else(|| DbError::NotFound(format!("log {}", path)))?;
        log.closed = true;
        Ok(())
    }

    async fn read_log(&self, path: &str) -> DbResult<Vec<u8>> {
        self.logs
            .lock()
            .unwrap()
            .get(path)
            .map(|log| log.data.clone())
            .ok_or_else(|| DbError::NotFound(format!("log {}", path)))
    }
}

#[derive(Default)]
pub struct FakeHookRepo {
    hooks: Mutex<Vec<HookRecord>>,
}

impl FakeHookRepo {
    pub fn with_hook(organization: &str, repository: &str, access_token: &str) -> Self {
        let hook = HookRecord {
            id: 1,
            organization: organization.to_string(),
            repository: repository.to_string(),
            access_token: access_token.to_string(),
            created_at: Utc::now(),
        };
        Self {
            hooks: Mutex::new(vec![hook]),
        }
    }
}

#[async_trait]
impl HookRepo for FakeHookRepo {
    async fn get_hook(&self, organization: &str, repository: &str) -> DbResult<Option<HookRecord>> {
        Ok(self
            .hooks
            .lock()
            .unwrap()
            .iter()
            .find(|h| h.organization == organization && h.repository == repository)
            .cloned())
    }

    async fn list_hooks(&self, organization: &str) -> DbResult<Vec<HookRecord>> {
        Ok(self
            .hooks
            .lock()
            .unwrap()
            .iter()
            .filter(|h| h.organization == organization)
            .cloned()
            .collect())
    }

    async fn create_hook(&self, hook: &HookRecord) -> DbResult<()> {
        self.hooks.lock().unwrap().push(hook.clone());
        Ok(())
    }

    async fn delete_hook(&self, id: i64) -> DbResult<()> {
        let mut hooks = self.hooks.lock().unwrap();
        let before = hooks.len();
        hooks.retain(|h| h.id != id);
        if hooks.len() == before {
            return Err(DbError::NotFound(format!("hook {}", id)));
        }
        Ok(())
    }
}

/// Every collaborator of a build, wired to `acme/widgets`. `spec` is what
/// the repository serves as its build spec when [`Harness::orchestrator`]
/// is called.
pub struct Harness {
    pub spec: BuildSpec,
    pub scm: Arc<FakeSourceControl>,
    pub factory: Arc<FakeFactory>,
    pub runtime: Arc<FakeRuntime>,
    pub builds: Arc<FakeBuildRepo>,
    pub logs: Arc<FakeLogRepo>,
    pub hooks: Arc<FakeHookRepo>,
}

impl Harness {
    pub fn new() -> Self {
        let scm = Arc::new(FakeSourceControl::default());
        Self {
            spec: spec(),
            factory: Arc::new(FakeFactory::new(scm.clone())),
            scm,
            runtime: Arc::new(FakeRuntime::default()),
            builds: Arc::new(FakeBuildRepo::default()),
            logs: Arc::new(FakeLogRepo::default()),
            hooks: Arc::new(FakeHookRepo::with_hook("acme", "widgets", ACCESS_TOKEN)),
        }
    }

    pub fn registers(&self) -> RegisterFactory {
        RegisterFactory::new(self.builds.clone(), self.logs.clone())
    }

    pub fn orchestrator(&self) -> BuildOrchestrator {
        let yaml = serde_yaml::to_string(&self.spec).expect("spec serializes");
        self.scm.set_file(BUILD_SPEC_PATH, yaml.as_bytes());
        let pool = RuntimePool::new(vec![self.runtime.clone() as Arc<dyn ContainerRuntime>])
            .expect("one endpoint");
        BuildOrchestrator::new(
            self.hooks.clone(),
            self.factory.clone(),
            Arc::new(pool),
            self.registers(),
            1_024_000_000,
        )
    }
}
