pub mod grid;
pub mod inspect;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use kgrid_app::{KotsInstaller, SupportBundleCollector};
use kgrid_core::{ApplicationSpec, GridSpec, Settings};
use kgrid_eks::AwsCli;
use kgrid_kube::Kubectl;
use kgrid_orchestrator::Coordinator;
use kgrid_state::FileStore;

/// Flags shared by every subcommand.
pub struct GlobalArgs {
    pub config_file: Option<PathBuf>,
    pub settings: Option<PathBuf>,
}

impl GlobalArgs {
    /// Settings file merged with the `--config-file` override.
    pub fn settings(&self) -> anyhow::Result<Settings> {
        let mut settings = Settings::load(self.settings.as_deref()).context("failed to load settings")?;
        if let Some(path) = &self.config_file {
            settings.store.path = Some(path.clone());
        }
        Ok(settings)
    }

    pub fn store(&self) -> anyhow::Result<FileStore> {
        Ok(FileStore::new(self.settings()?.store_path()))
    }

    pub fn coordinator(&self) -> anyhow::Result<Coordinator> {
        let settings = self.settings()?;
        Ok(Coordinator::new(
            Arc::new(FileStore::new(settings.store_path())),
            Arc::new(AwsCli::from_settings(&settings)),
            Arc::new(Kubectl::from_settings(&settings)),
            Arc::new(KotsInstaller::from_settings(&settings).context("failed to set up kots")?),
            Arc::new(
                SupportBundleCollector::from_settings(&settings)
                    .context("failed to set up support bundle collection")?,
            ),
            settings.timeouts,
        ))
    }
}

/// Read a grid manifest, replacing its name when `name` is given.
pub fn read_grid(path: &Path, name: Option<&str>) -> anyhow::Result<GridSpec> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read grid spec {}", path.display()))?;
    let mut grid = GridSpec::from_yaml(&content)
        .with_context(|| format!("failed to parse grid spec {}", path.display()))?;
    if let Some(name) = name.filter(|n| !n.is_empty()) {
        grid.name = name.to_string();
    }
    if grid.name.is_empty() {
        anyhow::bail!("grid in {} has no name, pass --name", path.display());
    }
    Ok(grid)
}

pub fn read_app(path: &Path) -> anyhow::Result<ApplicationSpec> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read application spec {}", path.display()))?;
    ApplicationSpec::from_yaml(&content)
        .with_context(|| format!("failed to parse application spec {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRID: &str = r#"apiVersion: kgrid.io/v1alpha1
kind: Grid
metadata:
  name: nightly
spec:
  clusters:
    - eks:
        newCluster:
          description: smoke
          region: us-west-1
          accessKeyId:
            value: AKIA
          secretAccessKey:
            valueFrom:
              osEnv: AWS_SECRET_ACCESS_KEY
"#;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn grid_name_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "grid.yaml", GRID);
        assert_eq!(read_grid(&path, None).unwrap().name, "nightly");
        assert_eq!(read_grid(&path, Some("pr-42")).unwrap().name, "pr-42");
        assert_eq!(read_grid(&path, Some("")).unwrap().name, "nightly");
    }

    #[test]
    fn missing_grid_file_names_the_path() {
        let err = read_grid(Path::new("/nonexistent/grid.yaml"), None).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/grid.yaml"));
    }

    #[test]
    fn config_file_overrides_store_path() {
        let dir = tempfile::tempdir().unwrap();
        let settings = write(dir.path(), "kgrid.toml", "[store]\npath = \"/from/settings.yaml\"\n");
        let global = GlobalArgs {
            config_file: None,
            settings: Some(settings.clone()),
        };
        assert_eq!(global.settings().unwrap().store_path(), PathBuf::from("/from/settings.yaml"));

        let global = GlobalArgs {
            config_file: Some(PathBuf::from("/from/flag.yaml")),
            settings: Some(settings),
        };
        assert_eq!(global.settings().unwrap().store_path(), PathBuf::from("/from/flag.yaml"));
    }
}
