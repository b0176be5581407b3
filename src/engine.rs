use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result, bail};
use log::{debug, info, warn};

use crate::chain::InvocationDescription;
use crate::clip::MissingArtifact;

static STAGING_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Runs invocation descriptions through the SoX command line tool.
#[derive(Clone, Debug)]
pub struct SoxEngine {
    program: String,
}

impl SoxEngine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Checks that the engine can be launched at all.
    pub fn probe(&self) -> Result<String> {
        let output = Command::new(&self.program)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("{} is not installed or not on PATH", self.program))?;
        if !output.status.success() {
            bail!("{} --version exited with {}", self.program, output.status);
        }
        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        debug!("engine probe: {version}");
        Ok(version)
    }

    /// Renders into a staging file next to the target and moves it into place
    /// only after the engine succeeded. The previous artifact is untouched
    /// on any failure.
    pub fn render(&self, description: &InvocationDescription) -> Result<PathBuf> {
        let target = description.output.clone();
        let staging = staging_path(&target);
        let staged = description.with_output(&staging);

        match self.run(&staged) {
            Ok(()) => {
                fs::rename(&staging, &target).with_context(|| {
                    format!("moving {} into {}", staging.display(), target.display())
                })?;
                info!("rendered {}", target.display());
                Ok(target)
            }
            Err(err) => {
                if staging.exists() {
                    if let Err(cleanup) = fs::remove_file(&staging) {
                        warn!("could not remove {}: {cleanup}", staging.display());
                    }
                }
                Err(err)
            }
        }
    }

    fn run(&self, description: &InvocationDescription) -> Result<()> {
        if let Some(input) = &description.input {
            if !input.exists() {
                return Err(MissingArtifact(input.clone()).into());
            }
        }
        debug!("exec: {}", description.command_line(&self.program));
        let output = Command::new(&self.program)
            .args(description.to_args())
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("launching {}", self.program))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            );
        }
        if !description.output.exists() {
            bail!(
                "{} reported success but produced no {}",
                self.program,
                description.output.display()
            );
        }
        Ok(())
    }
}

fn staging_path(target: &Path) -> PathBuf {
    let stem = target
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "render".to_string());
    let extension = target
        .extension()
        .map(|ext| ext.to_string_lossy().into_owned())
        .unwrap_or_else(|| "wav".to_string());
    let serial = STAGING_COUNTER.fetch_add(1, Ordering::Relaxed);
    // The engine picks the file type from the extension, so it has to stay last.
    let name = format!(".{stem}.{}-{serial}.{extension}", std::process::id());
    target.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::chain::{EffectChainBuilder, ParameterSnapshot};

    fn description(output: &Path) -> InvocationDescription {
        EffectChainBuilder::default().build(&ParameterSnapshot::default(), output)
    }

    #[test]
    fn test_staging_path_keeps_extension_and_directory() {
        let staging = staging_path(Path::new("/srv/art/delia_current.wav"));
        assert_eq!(staging.parent(), Some(Path::new("/srv/art")));
        assert_eq!(staging.extension().and_then(|e| e.to_str()), Some("wav"));
        assert_ne!(staging, Path::new("/srv/art/delia_current.wav"));
    }

    #[test]
    fn test_missing_engine_fails_probe() {
        let engine = SoxEngine::new("definitely-not-an-audio-engine-4711");
        assert!(engine.probe().is_err());
    }

    #[test]
    fn test_failed_render_leaves_previous_artifact_alone() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("delia_current.wav");
        let previous = b"RIFF previous take".to_vec();
        fs::write(&target, &previous).unwrap();

        let engine = SoxEngine::new("definitely-not-an-audio-engine-4711");
        let result = engine.render(&description(&target));

        assert!(result.is_err());
        assert_eq!(fs::read(&target).unwrap(), previous);
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name() != "delia_current.wav")
            .collect();
        assert!(leftovers.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_non_zero_exit_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("delia_current.wav");
        fs::write(&target, b"keep me").unwrap();

        let engine = SoxEngine::new("false");
        let err = engine.render(&description(&target)).unwrap_err();

        assert!(err.to_string().contains("exited with"));
        assert_eq!(fs::read(&target).unwrap(), b"keep me");
    }

    #[cfg(unix)]
    #[test]
    fn test_successful_render_replaces_artifact() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("delia_current.wav");
        fs::write(&target, b"RIFF previous take").unwrap();

        let take = tempfile::tempdir().unwrap();
        let fixture = take.path().join("take.wav");
        fs::write(&fixture, b"RIFF fresh take").unwrap();
        // Stands in for sox: the output path is the sixth argument.
        let script = take.path().join("fake-sox");
        fs::write(&script, format!("#!/bin/sh\ncp '{}' \"$6\"\n", fixture.display())).unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let engine = SoxEngine::new(script.to_string_lossy());
        let rendered = engine.render(&description(&target)).unwrap();

        assert_eq!(rendered, target);
        assert_eq!(fs::read(&target).unwrap(), b"RIFF fresh take");
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["delia_current.wav"]);
    }

    #[test]
    fn test_loop_without_current_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let looped = EffectChainBuilder::default().build_loop(
            &dir.path().join("delia_current.wav"),
            &dir.path().join("delia_loop.wav"),
            5,
        );
        let err = SoxEngine::new("sox").render(&looped).unwrap_err();
        assert!(err.downcast_ref::<MissingArtifact>().is_some());
        assert!(!dir.path().join("delia_loop.wav").exists());
    }
}
