//! `create`, `deploy` and `delete`.

use std::path::Path;

use anyhow::Context;
use tracing::info;

use super::{GlobalArgs, read_app, read_grid};

pub async fn create(
    global: &GlobalArgs,
    from_yaml: &Path,
    name: Option<&str>,
    app: Option<&Path>,
) -> anyhow::Result<()> {
    let grid = read_grid(from_yaml, name)?;
    // Parse the app up front so a bad manifest fails before anything is provisioned.
    let app = app.map(read_app).transpose()?;
    let coordinator = global.coordinator()?;

    coordinator
        .create(&grid)
        .await
        .with_context(|| format!("failed to create grid {}", grid.name))?;
    println!("✓ Grid {} created ({} clusters)", grid.name, grid.clusters.len());

    if let Some(app) = app {
        info!(grid = %grid.name, app = %app.display_name(), "deploying app to new grid");
        coordinator
            .deploy_grid(&grid.name, &app)
            .await
            .with_context(|| format!("failed to deploy {} to grid {}", app.display_name(), grid.name))?;
        println!("✓ {} deployed to grid {}", app.display_name(), grid.name);
    }
    Ok(())
}

pub async fn deploy(global: &GlobalArgs, grid: &str, app: &Path) -> anyhow::Result<()> {
    let app = read_app(app)?;
    global
        .coordinator()?
        .deploy_grid(grid, &app)
        .await
        .with_context(|| format!("failed to deploy {} to grid {grid}", app.display_name()))?;
    println!("✓ {} deployed to grid {grid}", app.display_name());
    Ok(())
}

pub async fn delete(global: &GlobalArgs, from_yaml: &Path, name: Option<&str>) -> anyhow::Result<()> {
    let grid = read_grid(from_yaml, name)?;
    global
        .coordinator()?
        .delete(&grid)
        .await
        .with_context(|| format!("failed to delete grid {}", grid.name))?;
    println!("✓ Grid {} deleted", grid.name);
    Ok(())
}
