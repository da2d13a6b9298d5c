use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use log::{debug, warn};
use tokio::process::Command;

use crate::config::settings::GeneratorSettings;
use crate::errors::LadderError;

const PATCH_FILE: &str = "patch.bin";
const SPOILER_LOG_FILE: &str = "spoiler.json";

/// Output of one seed generation. Both parts are opaque to the ladder.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedSeed {
    pub patch: Vec<u8>,
    pub spoiler_log: String,
}

#[async_trait]
pub trait SeedGenerator: Send + Sync {
    /// Produces the race content for `seed` using the league's settings.
    /// Failures worth retrying are reported as [`LadderError::Generator`],
    /// the others as [`LadderError::GeneratorUnavailable`].
    async fn generate(&self, settings_ref: &str, seed: &str) -> Result<GeneratedSeed>;
}

/// Picks the generator matching the configuration.
pub fn from_settings(settings: &GeneratorSettings) -> Arc<dyn SeedGenerator> {
    match &settings.command {
        Some(command) => Arc::new(CommandGenerator::new(
            command.clone(),
            settings.output_dir.clone(),
            settings.timeout,
        )),
        None => Arc::new(FixtureGenerator),
    }
}

/// Runs an external randomizer executable as
/// `<command> --settings <ref> --seed <seed> --output <dir>` and reads
/// `patch.bin` and `spoiler.json` back from `<dir>`.
pub struct CommandGenerator {
    command: String,
    output_dir: PathBuf,
    timeout: Duration,
}

impl CommandGenerator {
    pub fn new(command: String, output_dir: PathBuf, timeout: Duration) -> Self {
        Self {
            command,
            output_dir,
            timeout,
        }
    }

    async fn run(&self, settings_ref: &str, seed: &str, dir: &Path) -> Result<GeneratedSeed> {
        let child = Command::new(&self.command)
            .arg("--settings")
            .arg(settings_ref)
            .arg("--seed")
            .arg(seed)
            .arg("--output")
            .arg(dir)
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| LadderError::Generator(format!("timed out after {:?}", self.timeout)))?
            .map_err(|e| LadderError::GeneratorUnavailable(format!("unable to run {}: {}", self.command, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(LadderError::Generator(format!(
                "{} exited with {}: {}",
                self.command,
                output.status,
                stderr.trim()
            ))
            .into());
        }

        // The output only depends on the seed, so bad output stays bad.
        let patch = read_output(dir.join(PATCH_FILE)).await?;
        if patch.is_empty() {
            return Err(LadderError::GeneratorUnavailable("got an empty patch".to_string()).into());
        }
        let spoiler_log = String::from_utf8(read_output(dir.join(SPOILER_LOG_FILE)).await?)
            .map_err(|_| LadderError::GeneratorUnavailable("spoiler log is not valid UTF-8".to_string()))?;

        Ok(GeneratedSeed { patch, spoiler_log })
    }
}

async fn read_output(path: PathBuf) -> Result<Vec<u8>> {
    tokio::fs::read(&path)
        .await
        .map_err(|e| LadderError::Generator(format!("unable to read {}: {}", path.display(), e)).into())
}

#[async_trait]
impl SeedGenerator for CommandGenerator {
    async fn generate(&self, settings_ref: &str, seed: &str) -> Result<GeneratedSeed> {
        let dir = self.output_dir.join(seed);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| LadderError::GeneratorUnavailable(format!("unable to create {}: {}", dir.display(), e)))?;

        debug!("Generating seed {} with {}", seed, settings_ref);
        let result = self.run(settings_ref, seed, &dir).await;

        if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
            warn!("Unable to clean up {}: {}", dir.display(), e);
        }

        result
    }
}

/// In-process generator for development databases. Output only depends on
/// its inputs.
pub struct FixtureGenerator;

#[async_trait]
impl SeedGenerator for FixtureGenerator {
    async fn generate(&self, settings_ref: &str, seed: &str) -> Result<GeneratedSeed> {
        let spoiler_log = serde_json::json!({
            ":seed": seed,
            ":settings_string": settings_ref,
            "locations": {},
        })
        .to_string();

        Ok(GeneratedSeed {
            patch: format!("PATCH:{}:{}", settings_ref, seed).into_bytes(),
            spoiler_log,
        })
    }
}
