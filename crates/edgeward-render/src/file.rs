//! File-backed renderer.
//!
//! Layout of the output directory:
//!
//! ```text
//! <output_dir>/
//!   proxy.json      logical proxy config
//!   routes.json     active routes as received
//!   certs/*.pem     certificate + key (+ CA chain) per edge/reencrypt route
//!   cacerts/*.pem   destination CA per reencrypt route
//! ```
//!
//! Every file is written to a temporary sibling and renamed into place,
//! so the proxy never reads a half-written file. The optional reload
//! command runs after all files are in place; a non-zero exit fails the
//! activation and leaves the previous fingerprint live.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;

use edgeward_table::Snapshot;
use tracing::{debug, info, warn};

use crate::config::RenderSettings;
use crate::error::RenderError;
use crate::renderer::{Activation, ConfigArtifact, Renderer};

const CONFIG_FILE: &str = "proxy.json";
const STATE_FILE: &str = "routes.json";
const PEM_DIRS: [&str; 2] = ["certs", "cacerts"];

pub struct FileRenderer {
    output_dir: PathBuf,
    settings: RenderSettings,
    reload_command: Option<PathBuf>,
    active: Mutex<Option<String>>,
}

impl FileRenderer {
    pub fn new(output_dir: impl Into<PathBuf>, settings: RenderSettings) -> Self {
        Self {
            output_dir: output_dir.into(),
            settings,
            reload_command: None,
            active: Mutex::new(None),
        }
    }

    pub fn with_reload_command(mut self, command: Option<PathBuf>) -> Self {
        self.reload_command = command;
        self
    }

    /// Fingerprint of the live artifact, if any.
    pub fn active_fingerprint(&self) -> Option<String> {
        self.active.lock().expect("renderer lock").clone()
    }

    fn write_files(&self, artifact: &ConfigArtifact) -> Result<(), RenderError> {
        for dir in PEM_DIRS {
            let path = self.output_dir.join(dir);
            fs::create_dir_all(&path).map_err(|e| RenderError::io(&path, e))?;
        }

        for pem in &artifact.pem_files {
            write_atomic(&self.output_dir.join(&pem.path), pem.contents.as_bytes())?;
        }
        self.remove_stale_pems(artifact)?;

        write_atomic(&self.output_dir.join(STATE_FILE), &artifact.state)?;
        write_atomic(&self.output_dir.join(CONFIG_FILE), &artifact.body)?;
        Ok(())
    }

    fn remove_stale_pems(&self, artifact: &ConfigArtifact) -> Result<(), RenderError> {
        let wanted: HashSet<PathBuf> = artifact
            .pem_files
            .iter()
            .map(|pem| self.output_dir.join(&pem.path))
            .collect();

        for dir in PEM_DIRS {
            let dir = self.output_dir.join(dir);
            let entries = fs::read_dir(&dir).map_err(|e| RenderError::io(&dir, e))?;
            for entry in entries {
                let path = entry.map_err(|e| RenderError::io(&dir, e))?.path();
                if path.extension().is_some_and(|ext| ext == "pem") && !wanted.contains(&path) {
                    debug!(path = %path.display(), "removing stale certificate");
                    fs::remove_file(&path).map_err(|e| RenderError::io(&path, e))?;
                }
            }
        }
        Ok(())
    }

    fn run_reload(&self) -> Result<(), RenderError> {
        let Some(command) = &self.reload_command else {
            return Ok(());
        };

        debug!(command = %command.display(), "running reload command");
        let output = Command::new(command)
            .env("EDGEWARD_CONFIG_DIR", &self.output_dir)
            .current_dir(&self.output_dir)
            .output()
            .map_err(|source| RenderError::ReloadSpawn {
                command: command.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(RenderError::ReloadFailed {
                command: command.clone(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

impl Renderer for FileRenderer {
    fn render(&self, snapshot: &Snapshot) -> Result<ConfigArtifact, RenderError> {
        ConfigArtifact::build(snapshot, &self.settings)
    }

    fn activate(&self, artifact: &ConfigArtifact) -> Result<Activation, RenderError> {
        let mut active = self.active.lock().expect("renderer lock");
        if active.as_deref() == Some(artifact.fingerprint.as_str()) {
            debug!(fingerprint = %artifact.fingerprint, "config already active");
            return Ok(Activation::Unchanged);
        }

        self.write_files(artifact)?;
        if let Err(e) = self.run_reload() {
            warn!(error = %e, "proxy reload failed");
            return Err(e);
        }

        info!(
            fingerprint = %artifact.fingerprint,
            routes = artifact.config.routes.len(),
            dir = %self.output_dir.display(),
            "activated proxy config"
        );
        *active = Some(artifact.fingerprint.clone());
        Ok(Activation::Applied)
    }
}

fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), RenderError> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));
    fs::write(&tmp, contents).map_err(|e| RenderError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| RenderError::io(path, e))
}
