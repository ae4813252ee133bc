//! In-memory state for route tests.

use async_trait::async_trait;
use chrono::Utc;
use dockyard_core::{
    Build, BuildId, BuildStatus, CommitStatus, ContainerConfig, ContainerRuntime, Error,
    OutputSink, RepositorySummary, Result, SourceControl, SourceControlFactory, Task,
};
use dockyard_db::{BuildRepo, DbError, DbResult, HookRecord, HookRepo, LogRepo};
use dockyard_executor::RuntimePool;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::AppState;

pub fn finished_build(organization: &str, repository: &str) -> Build {
    let mut build = Build::start(organization, repository, "push", "main", "ci", BTreeMap::new());
    let mut task = Task::start("build", "make build");
    task.status = BuildStatus::Success;
    task.finished_at = Some(Utc::now());
    build.tasks.push(task);
    build.status = BuildStatus::Success;
    build.finished_at = Some(Utc::now());
    build
}

pub fn push_body(git_ref: &str) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "ref": git_ref,
        "after": "0123456789abcdef",
        "head_commit": { "id": "0123456789abcdef" },
        "repository": {
            "name": "widgets",
            "owner": { "name": "acme", "login": "acme" },
            "clone_url": "https://github.com/acme/widgets.git",
        },
    }))
    .unwrap()
}

pub fn repository(owner: &str, name: &str) -> RepositorySummary {
    RepositorySummary {
        owner: owner.to_string(),
        name: name.to_string(),
        full_name: format!("{}/{}", owner, name),
        clone_url: format!("https://github.com/{}/{}.git", owner, name),
        private: false,
        default_branch: "main".to_string(),
    }
}

pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

#[derive(Default)]
pub struct MemoryBuildRepo {
    builds: Mutex<Vec<Build>>,
}

impl MemoryBuildRepo {
    pub fn all(&self) -> Vec<Build> {
        self.builds.lock().unwrap().clone()
    }

    fn update(&self, id: BuildId, f: impl FnOnce(&mut Build)) -> DbResult<()> {
        let mut builds = self.builds.lock().unwrap();
        let build = builds
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or_else(|| DbError::NotFound(format!("build {}", id)))?;
        f(build);
        Ok(())
    }
}

#[async_trait]
impl BuildRepo for MemoryBuildRepo {
    async fn create_build(&self, build: &Build) -> DbResult<()> {
        self.builds.lock().unwrap().push(build.clone());
        Ok(())
    }

    async fn add_task(&self, build_id: BuildId, _position: usize, task: &Task) -> DbResult<()> {
        self.update(build_id, |b| b.tasks.push(task.clone()))
    }

    async fn end_task(&self, build_id: BuildId, position: usize, status: BuildStatus, error: Option<&str>) -> DbResult<()> {
        self.update(build_id, |b| {
            if let Some(task) = b.tasks.get_mut(position) {
                task.status = status;
                task.error = error.map(str::to_string);
            }
        })
    }

    async fn end_build(&self, build_id: BuildId, status: BuildStatus, error: Option<&str>) -> DbResult<()> {
        self.update(build_id, |b| {
            b.status = status;
            b.error = error.map(str::to_string);
        })
    }

    async fn get_build(&self, id: BuildId) -> DbResult<Build> {
        self.all()
            .into_iter()
            .find(|b| b.id == id)
            .ok_or_else(|| DbError::NotFound(format!("build {}", id)))
    }

    async fn list_recent(&self, limit: i64) -> DbResult<Vec<Build>> {
        Ok(self.all().into_iter().rev().take(limit as usize).collect())
    }

    async fn list_by_repository(&self, organization: &str, repository: &str, limit: i64) -> DbResult<Vec<Build>> {
        Ok(self
            .all()
            .into_iter()
            .rev()
            .filter(|b| b.organization == organization && b.repository == repository)
            .take(limit as usize)
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryLogRepo {
    logs: Mutex<HashMap<String, Vec<u8>>>,
}

#[async_trait]
impl LogRepo for MemoryLogRepo {
    async fn create_log(&self, path: &str) -> DbResult<()> {
        self.logs.lock().unwrap().insert(path.to_string(), Vec::new());
        Ok(())
    }

    async fn append_log(&self, path: &str, data: &[u8]) -> DbResult<()> {
        self.logs
            .lock()
            .unwrap()
            .get_mut(path)
            .ok_or_else(|| DbError::NotFound(format!("open log {}", path)))?
            .extend_from_slice(data);
        Ok(())
    }

    async fn close_log(&self, _path: &str) -> DbResult<()> {
        Ok(())
    }

    async fn read_log(&self, path: &str) -> DbResult<Vec<u8>> {
        self.logs
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| DbError::NotFound(format!("log {}", path)))
    }
}

#[derive(Default)]
pub struct MemoryHookRepo {
    hooks: Mutex<Vec<HookRecord>>,
}

#[async_trait]
impl HookRepo for MemoryHookRepo {
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

/// GitHub stand-in that only knows about hooks and repositories.
#[derive(Default)]
pub struct FakeGitHub {
    tokens: Mutex<Vec<String>>,
    deleted_hooks: Mutex<Vec<i64>>,
    repositories: Mutex<Vec<RepositorySummary>>,
}

impl FakeGitHub {
    pub fn tokens(&self) -> Vec<String> {
        self.tokens.lock().unwrap().clone()
    }

    pub fn deleted_hooks(&self) -> Vec<i64> {
        self.deleted_hooks.lock().unwrap().clone()
    }

    pub fn set_repositories(&self, repositories: Vec<RepositorySummary>) {
        *self.repositories.lock().unwrap() = repositories;
    }
}

#[async_trait]
impl SourceControl for FakeGitHub {
    async fn get_file_content(&self, _owner: &str, _repo: &str, path: &str, _revision: &str) -> Result<Vec<u8>> {
        Err(Error::NotFound(path.to_string()))
    }

    async fn get_file_sha(&self, _owner: &str, _repo: &str, path: &str, _revision: &str) -> Result<String> {
        Err(Error::NotFound(path.to_string()))
    }

    async fn download_archive(&self, owner: &str, repo: &str, _revision: &str, _dest: &Path) -> Result<()> {
        Err(Error::NotFound(format!("{}/{}", owner, repo)))
    }

    async fn create_status(&self, _owner: &str, _repo: &str, _sha: &str, _status: &CommitStatus) -> Result<()> {
        Ok(())
    }

    async fn create_hook(&self, _owner: &str, _repo: &str) -> Result<i64> {
        Ok(4242)
    }

    async fn delete_hook(&self, _owner: &str, _repo: &str, hook_id: i64) -> Result<()> {
        self.deleted_hooks.lock().unwrap().push(hook_id);
        Ok(())
    }

    async fn list_repositories(&self) -> Result<Vec<RepositorySummary>> {
        Ok(self.repositories.lock().unwrap().clone())
    }
}

struct FakeGitHubFactory(Arc<FakeGitHub>);

impl SourceControlFactory for FakeGitHubFactory {
    fn client(&self, access_token: &str) -> Arc<dyn SourceControl> {
        self.0.tokens.lock().unwrap().push(access_token.to_string());
        self.0.clone()
    }
}

/// Runtime endpoint that refuses every call.
struct NoRuntime;

#[async_trait]
impl ContainerRuntime for NoRuntime {
    fn endpoint(&self) -> &str {
        "none"
    }

    async fn image_exists(&self, _tagged_image: &str) -> Result<bool> {
        Err(Error::Runtime("no runtime in tests".to_string()))
    }

    async fn build_image(&self, _image_name: &str, _context_dir: &Path, _dockerfile: &str) -> Result<()> {
        Err(Error::Runtime("no runtime in tests".to_string()))
    }

    async fn tag_image(&self, _image_name: &str, _tag: &str) -> Result<()> {
        Err(Error::Runtime("no runtime in tests".to_string()))
    }

    async fn create_container(&self, _config: &ContainerConfig) -> Result<String> {
        Err(Error::Runtime("no runtime in tests".to_string()))
    }

    async fn start_container(&self, _container_id: &str) -> Result<()> {
        Err(Error::Runtime("no runtime in tests".to_string()))
    }

    async fn exec(&self, _container_id: &str, _cmd: Vec<String>, _sink: &dyn OutputSink) -> Result<i64> {
        Err(Error::Runtime("no runtime in tests".to_string()))
    }

    async fn remove_container(&self, _container_id: &str) -> Result<()> {
        Ok(())
    }
}

pub struct TestState {
    pub builds: Arc<MemoryBuildRepo>,
    pub logs: Arc<MemoryLogRepo>,
    pub hooks: Arc<MemoryHookRepo>,
    pub scm: Arc<FakeGitHub>,
    webhook_secret: Option<String>,
}

impl TestState {
    pub fn new(webhook_secret: Option<&str>) -> Self {
        Self {
            builds: Arc::new(MemoryBuildRepo::default()),
            logs: Arc::new(MemoryLogRepo::default()),
            hooks: Arc::new(MemoryHookRepo::default()),
            scm: Arc::new(FakeGitHub::default()),
            webhook_secret: webhook_secret.map(str::to_string),
        }
    }

    pub fn app_state(&self) -> AppState {
        let runtimes = RuntimePool::new(vec![Arc::new(NoRuntime) as Arc<dyn ContainerRuntime>]).unwrap();
        AppState::from_parts(
            self.builds.clone(),
            self.logs.clone(),
            self.hooks.clone(),
            Arc::new(FakeGitHubFactory(self.scm.clone())),
            Arc::new(runtimes),
            1_024_000_000,
            self.webhook_secret.clone(),
        )
    }

    pub fn insert(&self, build: Build) -> Build {
        self.builds.builds.lock().unwrap().push(build.clone());
        build
    }

    pub fn write_log(&self, path: &str, data: &[u8]) {
        self.logs
            .logs
            .lock()
            .unwrap()
            .insert(path.to_string(), data.to_vec());
    }
}
