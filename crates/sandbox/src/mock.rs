//! In-memory container runtime for testing without Docker.
//!
//! Volumes are maps from volume-relative paths to file contents. A
//! [`ContainerBehavior`] decides what each launched container "does": its exit
//! status, its log output and the files it writes into bound volumes.
//! Every runtime call is recorded so tests can assert on ordering and cleanup.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::Read;
use std::path::Path;
use std::sync::{Arc, Mutex};

use vibebolt_core::{Error, Result};

use crate::runtime::{ContainerHandle, ContainerRuntime, ContainerSpec};

type VolumeFiles = BTreeMap<String, Vec<u8>>;

/// A recorded runtime call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    CreateVolume(String),
    RemoveVolume(String),
    Run(String),
    Wait(String),
    Logs(String),
    PutArchive { container: String, target_dir: String },
    GetArchive { container: String, path: String },
    RemoveContainer { container: String, force: bool },
}

/// What a mock container did.
#[derive(Debug, Clone, Default)]
pub struct MockOutcome {
    pub exit_code: i64,
    pub logs: String,
}

impl MockOutcome {
    pub fn exited(exit_code: i64, logs: impl Into<String>) -> Self {
        Self {
            exit_code,
            logs: logs.into(),
        }
    }
}

/// Scripted behavior for containers launched on a [`MockRuntime`].
pub trait ContainerBehavior: Send + Sync {
    fn run(&self, spec: &ContainerSpec, fs: &mut MountedFs<'_>) -> MockOutcome;
}

impl<F> ContainerBehavior for F
where
    F: Fn(&ContainerSpec, &mut MountedFs<'_>) -> MockOutcome + Send + Sync,
{
    fn run(&self, spec: &ContainerSpec, fs: &mut MountedFs<'_>) -> MockOutcome {
        self(spec, fs)
    }
}

/// A container's view of its bound volumes, addressed by in-container path.
pub struct MountedFs<'a> {
    volumes: &'a mut HashMap<String, VolumeFiles>,
    binds: Vec<(String, String, bool)>,
}

impl MountedFs<'_> {
    fn locate(&self, path: &str) -> Option<(String, String, bool)> {
        self.binds.iter().find_map(|(volume, target, read_only)| {
            let prefix = format!("{}/", target.trim_end_matches('/'));
            path.strip_prefix(&prefix)
                .map(|rest| (volume.clone(), normalize_key(rest), *read_only))
        })
    }

    /// Read a file by in-container path.
    pub fn read(&self, path: &str) -> Option<Vec<u8>> {
        let (volume, key, _) = self.locate(path)?;
        self.volumes.get(&volume)?.get(&key).cloned()
    }

    pub fn exists(&self, path: &str) -> bool {
        self.read(path).is_some()
    }

    /// Write a file by in-container path. Returns false for unbound or read-only paths.
    pub fn write(&mut self, path: &str, content: impl Into<Vec<u8>>) -> bool {
        match self.locate(path) {
            Some((volume, key, false)) => match self.volumes.get_mut(&volume) {
                Some(files) => {
                    files.insert(key, content.into());
                    true
                }
                None => false,
            },
            _ => false,
        }
    }
}

fn normalize_key(path: &str) -> String {
    path.split('/')
        .filter(|part| !part.is_empty() && *part != ".")
        .collect::<Vec<_>>()
        .join("/")
}

struct MockContainer {
    spec: ContainerSpec,
    outcome: MockOutcome,
    removed: bool,
}

#[derive(Default)]
struct MockState {
    volumes: HashMap<String, VolumeFiles>,
    containers: HashMap<String, MockContainer>,
    calls: Vec<RuntimeCall>,
    fail_launch_prefix: Option<String>,
    fail_put_archive: bool,
    fail_volume_removal: bool,
    stall_wait_prefix: Option<String>,
}

/// In-memory container runtime.
pub struct MockRuntime {
    state: Mutex<MockState>,
    behavior: Arc<dyn ContainerBehavior>,
}

impl Default for MockRuntime {
    fn default() -> Self {
        Self::new(ToolchainSimulator::default())
    }
}

impl MockRuntime {
    /// Create a mock runtime with the given container behavior.
    pub fn new(behavior: impl ContainerBehavior + 'static) -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            behavior: Arc::new(behavior),
        }
    }

    /// Create a mock runtime from a closure.
    pub fn scripted<F>(behavior: F) -> Self
    where
        F: Fn(&ContainerSpec, &mut MountedFs<'_>) -> MockOutcome + Send + Sync + 'static,
    {
        Self::new(behavior)
    }

    /// Refuse to launch containers whose name starts with `prefix`.
    pub fn fail_launch_for(self, prefix: impl Into<String>) -> Self {
        self.lock().fail_launch_prefix = Some(prefix.into());
        self
    }

    /// Fail every archive upload.
    pub fn fail_put_archive(self) -> Self {
        self.lock().fail_put_archive = true;
        self
    }

    /// Fail every volume removal.
    pub fn fail_volume_removal(self) -> Self {
        self.lock().fail_volume_removal = true;
        self
    }

    /// Never finish waiting on containers whose name starts with `prefix`.
    pub fn stall_wait_for(self, prefix: impl Into<String>) -> Self {
        self.lock().stall_wait_prefix = Some(prefix.into());
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        // A panicking test thread must not hide the state from the others
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// All recorded calls, in order.
    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.lock().calls.clone()
    }

    /// Specs of every container launched, in order.
    pub fn launched(&self) -> Vec<ContainerSpec> {
        let state = self.lock();
        state
            .calls
            .iter()
            .filter_map(|call| match call {
                RuntimeCall::Run(name) => state.containers.get(name).map(|c| c.spec.clone()),
                _ => None,
            })
            .collect()
    }

    /// Names of existing volumes.
    pub fn volumes(&self) -> BTreeSet<String> {
        self.lock().volumes.keys().cloned().collect()
    }

    /// Files currently stored in a volume.
    pub fn volume_files(&self, volume: &str) -> Option<BTreeMap<String, Vec<u8>>> {
        self.lock().volumes.get(volume).cloned()
    }

    /// Names of containers that were launched and not removed.
    pub fn live_containers(&self) -> BTreeSet<String> {
        self.lock()
            .containers
            .iter()
            .filter(|(_, c)| !c.removed)
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn container_binds(state: &MockState, name: &str) -> Result<Vec<(String, String, bool)>> {
        let container = state
            .containers
            .get(name)
            .filter(|c| !c.removed)
            .ok_or_else(|| Error::runtime(format!("No such container: {}", name)))?;
        Ok(container
            .spec
            .binds
            .iter()
            .map(|b| (b.volume.clone(), b.target.clone(), b.read_only))
            .collect())
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn create_volume(&self, name: &str) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(RuntimeCall::CreateVolume(name.to_string()));
        if state.volumes.contains_key(name) {
            return Err(Error::runtime(format!("Volume already exists: {}", name)));
        }
        state.volumes.insert(name.to_string(), VolumeFiles::new());
        Ok(())
    }

    async fn remove_volume(&self, name: &str) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(RuntimeCall::RemoveVolume(name.to_string()));
        if state.fail_volume_removal {
            return Err(Error::runtime(format!("Simulated removal failure: {}", name)));
        }
        // Docker refuses to remove a volume referenced by a container, even with force
        if let Some((container, _)) = state
            .containers
            .iter()
            .find(|(_, c)| !c.removed && c.spec.binds.iter().any(|b| b.volume == name))
        {
            return Err(Error::runtime(format!(
                "Volume {} is in use by container {}",
                name, container
            )));
        }
        state
            .volumes
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| Error::runtime(format!("No such volume: {}", name)))
    }

    async fn run_container(&self, spec: &ContainerSpec) -> Result<ContainerHandle> {
        let mut state = self.lock();
        if let Some(prefix) = &state.fail_launch_prefix {
            if spec.name.starts_with(prefix.as_str()) {
                return Err(Error::container_launch(format!(
                    "Simulated launch failure: {}",
                    spec.name
                )));
            }
        }
        if state.containers.contains_key(&spec.name) {
            return Err(Error::container_launch(format!(
                "Container name already in use: {}",
                spec.name
            )));
        }
        if let Some(missing) = spec
            .binds
            .iter()
            .find(|b| !state.volumes.contains_key(&b.volume))
        {
            return Err(Error::container_launch(format!(
                "No such volume: {}",
                missing.volume
            )));
        }

        let binds = spec
            .binds
            .iter()
            .map(|b| (b.volume.clone(), b.target.clone(), b.read_only))
            .collect();
        let outcome = {
            let mut fs = MountedFs {
                volumes: &mut state.volumes,
                binds,
            };
            self.behavior.run(spec, &mut fs)
        };

        state.calls.push(RuntimeCall::Run(spec.name.clone()));
        state.containers.insert(
            spec.name.clone(),
            MockContainer {
                spec: spec.clone(),
                outcome,
                removed: false,
            },
        );

        Ok(ContainerHandle {
            id: format!("mock-{}", spec.name),
            name: spec.name.clone(),
        })
    }

    async fn wait(&self, handle: &ContainerHandle) -> Result<i64> {
        let (stall, exit_code) = {
            let mut state = self.lock();
            state.calls.push(RuntimeCall::Wait(handle.name.clone()));
            let stall = state
                .stall_wait_prefix
                .as_deref()
                .is_some_and(|prefix| handle.name.starts_with(prefix));
            let exit_code = state
                .containers
                .get(&handle.name)
                .map(|c| c.outcome.exit_code)
                .ok_or_else(|| Error::runtime(format!("No such container: {}", handle)));
            (stall, exit_code)
        };
        if stall {
            std::future::pending::<()>().await;
        }
        exit_code
    }

    async fn logs(&self, handle: &ContainerHandle) -> Result<Vec<u8>> {
        let mut state = self.lock();
        state.calls.push(RuntimeCall::Logs(handle.name.clone()));
        state
            .containers
            .get(&handle.name)
            .map(|c| c.outcome.logs.clone().into_bytes())
            .ok_or_else(|| Error::runtime(format!("No such container: {}", handle)))
    }

    async fn put_archive(
        &self,
        handle: &ContainerHandle,
        target_dir: &str,
        archive: Vec<u8>,
    ) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(RuntimeCall::PutArchive {
            container: handle.name.clone(),
            target_dir: target_dir.to_string(),
        });
        if state.fail_put_archive {
            return Err(Error::runtime("Simulated archive upload failure"));
        }

        let binds = Self::container_binds(&state, &handle.name)?;
        let mut unpacked = Vec::new();
        let mut tar = tar::Archive::new(archive.as_slice());
        let entries = tar
            .entries()
            .map_err(|e| Error::runtime(format!("Invalid archive: {}", e)))?;
        for entry in entries {
            let mut entry = entry.map_err(|e| Error::runtime(format!("Invalid archive: {}", e)))?;
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let path = entry
                .path()
                .map_err(|e| Error::runtime(format!("Invalid archive path: {}", e)))?
                .to_string_lossy()
                .into_owned();
            let mut content = Vec::new();
            entry
                .read_to_end(&mut content)
                .map_err(|e| Error::runtime(format!("Invalid archive entry: {}", e)))?;
            unpacked.push((
                format!("{}/{}", target_dir.trim_end_matches('/'), normalize_key(&path)),
                content,
            ));
        }

        let mut fs = MountedFs {
            volumes: &mut state.volumes,
            binds,
        };
        for (path, content) in unpacked {
            if !fs.write(&path, content) {
                return Err(Error::runtime(format!("Path is not writable: {}", path)));
            }
        }
        Ok(())
    }

    async fn get_archive(&self, handle: &ContainerHandle, path: &str) -> Result<Option<Vec<u8>>> {
        let mut state = self.lock();
        state.calls.push(RuntimeCall::GetArchive {
            container: handle.name.clone(),
            path: path.to_string(),
        });

        let binds = Self::container_binds(&state, &handle.name)?;
        let fs = MountedFs {
            volumes: &mut state.volumes,
            binds,
        };
        let Some(content) = fs.read(path) else {
            return Ok(None);
        };

        let name = path.rsplit('/').next().unwrap_or(path);
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, name, content.as_slice())
            .map_err(|e| Error::runtime(format!("Failed to pack archive: {}", e)))?;
        let archive = builder
            .into_inner()
            .map_err(|e| Error::runtime(format!("Failed to pack archive: {}", e)))?;
        Ok(Some(archive))
    }

    async fn remove_container(&self, handle: &ContainerHandle, force: bool) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(RuntimeCall::RemoveContainer {
            container: handle.name.clone(),
            force,
        });
        match state.containers.get_mut(&handle.name) {
            Some(container) if !container.removed => {
                container.removed = true;
                Ok(())
            }
            _ => Err(Error::runtime(format!("No such container: {}", handle))),
        }
    }

    async fn is_available(&self) -> bool {
        true
    }
}

// =============================================================================
// Toolchain Simulator
// =============================================================================

/// Default [`ContainerBehavior`] imitating `rustc` and the compiled program.
///
/// Source markers drive the outcome:
/// - `COMPILE_ERROR` anywhere in the entry file fails the build.
/// - `EXIT_CODE=<n>` sets the program's exit status.
/// - Each `println!("...")` literal is echoed as a line of program output.
///
/// The "binary" is the source text itself. The program also prints its
/// arguments, its stdin payload and the `VIBEBOLT_` variables of its
/// environment, which lets tests observe what the run container received.
#[derive(Debug, Clone, Default)]
pub struct ToolchainSimulator {
    /// Emission kinds (rustc names, e.g. `mir`) the compiler silently skips.
    pub missing_emissions: BTreeSet<String>,
}

impl ToolchainSimulator {
    pub fn without_emission(mut self, rustc_kind: &str) -> Self {
        self.missing_emissions.insert(rustc_kind.to_string());
        self
    }

    fn compile(&self, spec: &ContainerSpec, fs: &mut MountedFs<'_>) -> MockOutcome {
        let args = &spec.cmd[1..];
        let Some(entry) = args.first() else {
            return MockOutcome::exited(1, "error: no input filename given\n");
        };
        let output = args
            .windows(2)
            .find(|w| w[0] == "-o")
            .map(|w| w[1].clone())
            .unwrap_or_else(|| "a.out".to_string());

        let entry_path = if entry.starts_with('/') {
            entry.clone()
        } else {
            format!("{}/{}", spec.working_dir.trim_end_matches('/'), entry)
        };
        let Some(source) = fs.read(&entry_path) else {
            return MockOutcome::exited(
                1,
                format!("error: couldn't read `{}`: No such file or directory\n", entry),
            );
        };
        let source = String::from_utf8_lossy(&source).into_owned();
        if source.contains("COMPILE_ERROR") {
            return MockOutcome::exited(
                1,
                format!(
                    "error[E0425]: cannot find value `COMPILE_ERROR` in this scope\n --> {}\n\nerror: aborting due to 1 previous error\n",
                    entry
                ),
            );
        }

        let requested: Vec<&str> = args
            .iter()
            .filter_map(|a| a.strip_prefix("--emit="))
            .flat_map(|kinds| kinds.split(','))
            .collect();
        let requested = if requested.is_empty() {
            vec!["link"]
        } else {
            requested
        };

        // With several output types rustc keeps only the stem of `-o` and
        // derives every file name from it; the executable gets no extension.
        if requested.len() == 1 {
            fs.write(&output, source.clone());
        } else {
            let stem = Path::new(&output).with_extension("").to_string_lossy().into_owned();
            for kind in requested {
                let suffix = match kind {
                    "link" => {
                        fs.write(&stem, source.clone());
                        continue;
                    }
                    _ if self.missing_emissions.contains(kind) => continue,
                    "asm" => "s",
                    "llvm-ir" => "ll",
                    "mir" => "mir",
                    _ => continue,
                };
                fs.write(
                    &format!("{}.{}", stem, suffix),
                    format!("; simulated {} for {}\n", kind, entry),
                );
            }
        }

        MockOutcome::exited(0, "")
    }

    fn execute(&self, spec: &ContainerSpec, fs: &mut MountedFs<'_>) -> MockOutcome {
        let Some(binary) = fs.read(&spec.cmd[0]) else {
            return MockOutcome::exited(
                127,
                format!("exec {}: no such file or directory\n", spec.cmd[0]),
            );
        };
        let source = String::from_utf8_lossy(&binary).into_owned();

        let mut logs = String::new();
        for literal in source.split("println!(\"").skip(1) {
            if let Some(end) = literal.find("\")") {
                logs.push_str(&literal[..end]);
                logs.push('\n');
            }
        }
        logs.push_str(&format!("args={:?}\n", &spec.cmd[1..]));
        if let Some(stdin) = &spec.stdin {
            logs.push_str(&format!("stdin={}\n", String::from_utf8_lossy(stdin)));
        }
        for (key, value) in spec.env.iter().filter(|(k, _)| k.starts_with("VIBEBOLT_")) {
            logs.push_str(&format!("env {}={}\n", key, value));
        }

        let exit_code = source
            .split("EXIT_CODE=")
            .nth(1)
            .and_then(|rest| {
                let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
                digits.parse().ok()
            })
            .unwrap_or(0);

        MockOutcome::exited(exit_code, logs)
    }
}

impl ContainerBehavior for ToolchainSimulator {
    fn run(&self, spec: &ContainerSpec, fs: &mut MountedFs<'_>) -> MockOutcome {
        match spec.cmd.first().map(String::as_str) {
            Some("rustc") => self.compile(spec, fs),
            Some("sleep") | None => MockOutcome::default(),
            Some(_) => self.execute(spec, fs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::VolumeBinding;

    fn bound(name: &str, volume: &str) -> ContainerSpec {
        ContainerSpec::new(name, "rust:latest", vec!["sleep".into(), "infinity".into()])
            .working_dir("/workspace")
            .bind(VolumeBinding {
                volume: volume.into(),
                target: "/workspace".into(),
                read_only: false,
            })
    }

    #[tokio::test]
    async fn test_archive_round_trip_through_volume() {
        let runtime = MockRuntime::default();
        runtime.create_volume("vol").await.unwrap();
        let handle = runtime.run_container(&bound("placer", "vol")).await.unwrap();

        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_size(5);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, "./src/main.rs", "hello".as_bytes())
            .unwrap();
        let archive = builder.into_inner().unwrap();

        runtime.put_archive(&handle, "/workspace", archive).await.unwrap();
        let files = runtime.volume_files("vol").unwrap();
        assert_eq!(files.get("src/main.rs").unwrap(), b"hello");

        assert!(runtime
            .get_archive(&handle, "/workspace/src/main.rs")
            .await
            .unwrap()
            .is_some());
        assert!(runtime
            .get_archive(&handle, "/workspace/missing.rs")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_volume_in_use_cannot_be_removed() {
        let runtime = MockRuntime::default();
        runtime.create_volume("vol").await.unwrap();
        let handle = runtime.run_container(&bound("placer", "vol")).await.unwrap();

        assert!(runtime.remove_volume("vol").await.is_err());
        runtime.remove_container(&handle, true).await.unwrap();
        runtime.remove_volume("vol").await.unwrap();
    }

    fn rustc(output: &str, emit: Option<&str>) -> ContainerSpec {
        let mut cmd: Vec<String> = vec!["rustc".into(), "main.rs".into(), "-o".into(), output.into()];
        cmd.extend(emit.map(String::from));
        ContainerSpec::new("build", "rust:latest", cmd)
            .working_dir("/workspace")
            .bind(VolumeBinding {
                volume: "vol".into(),
                target: "/workspace".into(),
                read_only: false,
            })
    }

    async fn compiled(output: &str, emit: Option<&str>) -> Vec<String> {
        let runtime = MockRuntime::default();
        runtime.create_volume("vol").await.unwrap();
        let placer = runtime.run_container(&bound("placer", "vol")).await.unwrap();
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_size(12);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, "main.rs", "fn main() {}".as_bytes())
            .unwrap();
        runtime
            .put_archive(&placer, "/workspace", builder.into_inner().unwrap())
            .await
            .unwrap();
        let handle = runtime.run_container(&rustc(output, emit)).await.unwrap();
        assert_eq!(runtime.wait(&handle).await.unwrap(), 0);
        runtime
            .volume_files("vol")
            .unwrap()
            .into_keys()
            .filter(|k| k.starts_with("out/"))
            .collect()
    }

    #[tokio::test]
    async fn test_simulator_follows_rustc_output_naming() {
        // A single output type is written to the `-o` path as given
        assert_eq!(compiled("/workspace/out/a.out", None).await, vec!["out/a.out"]);
        // Several output types keep only the stem of `-o`
        assert_eq!(
            compiled("/workspace/out/a.out", Some("--emit=link,asm")).await,
            vec!["out/a", "out/a.s"]
        );
        assert_eq!(
            compiled("/workspace/out/a", Some("--emit=link,asm,llvm-ir")).await,
            vec!["out/a", "out/a.ll", "out/a.s"]
        );
    }

    #[tokio::test]
    async fn test_launch_requires_existing_volume() {
        let runtime = MockRuntime::default();
        let err = runtime.run_container(&bound("c", "nope")).await.unwrap_err();
        assert!(matches!(err, Error::ContainerLaunch(_)));
    }

    #[tokio::test]
    async fn test_read_only_binds_reject_writes() {
        let runtime = MockRuntime::scripted(|_spec, fs| {
            let wrote = fs.write("/inspect/x", "data");
            MockOutcome::exited(if wrote { 0 } else { 1 }, "")
        });
        runtime.create_volume("vol").await.unwrap();
        let spec = ContainerSpec::new("c", "img", vec!["probe".into()]).bind(VolumeBinding {
            volume: "vol".into(),
            target: "/inspect".into(),
            read_only: true,
        });
        let handle = runtime.run_container(&spec).await.unwrap();
        assert_eq!(runtime.wait(&handle).await.unwrap(), 1);
    }
}
