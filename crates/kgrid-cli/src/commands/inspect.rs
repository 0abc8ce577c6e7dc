//! Read-only commands: `get grids`, `get namespaces`, `describe grid`, `settings`.

use anyhow::{Context, bail};
use kgrid_kube::{KubeClient, Kubectl, NamespaceList};
use kgrid_state::{ClusterRecord, GridRecord, GridStore};

use super::GlobalArgs;
use crate::OutputFormat;

pub fn get_grids(global: &GlobalArgs, output: OutputFormat) -> anyhow::Result<()> {
    let grids = global.store()?.list().context("failed to list grids")?;
    match output {
        OutputFormat::Json => {
            let summary: Vec<serde_json::Value> = grids
                .iter()
                .map(|g| serde_json::json!({ "name": g.name, "clusters": g.clusters.len() }))
                .collect();
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        OutputFormat::Text => print!("{}", grids_table(&grids)),
    }
    Ok(())
}

pub async fn get_namespaces(
    global: &GlobalArgs,
    grid: &str,
    cluster: &str,
    output: OutputFormat,
) -> anyhow::Result<()> {
    let settings = global.settings()?;
    let store = kgrid_state::FileStore::new(settings.store_path());
    let record = find_cluster(&store, grid, cluster)?;
    let namespaces = Kubectl::from_settings(&settings)
        .namespaces(&record.kubeconfig)
        .await
        .with_context(|| format!("failed to list namespaces in cluster {cluster}"))?;
    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&namespaces)?),
        OutputFormat::Text => print!("{}", namespaces_table(&namespaces)),
    }
    Ok(())
}

/// Look up a stored cluster by grid and cluster name.
fn find_cluster(store: &dyn GridStore, grid: &str, cluster: &str) -> anyhow::Result<ClusterRecord> {
    let Some(record) = store.get(grid).context("failed to read grids")? else {
        bail!("grid not found");
    };
    match record.cluster(cluster) {
        Some(found) => Ok(found.clone()),
        None => bail!("cluster not found"),
    }
}

pub fn describe_grid(
    global: &GlobalArgs,
    name: &str,
    show_kubeconfig: bool,
    output: OutputFormat,
) -> anyhow::Result<()> {
    let mut grid = global
        .store()?
        .get(name)
        .context("failed to read grids")?
        .with_context(|| format!("grid {name} not found"))?;
    if !show_kubeconfig {
        for cluster in &mut grid.clusters {
            cluster.kubeconfig.clear();
        }
    }
    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&grid)?),
        OutputFormat::Text => print!("{}", describe_text(&grid)),
    }
    Ok(())
}

pub fn settings(global: &GlobalArgs) -> anyhow::Result<()> {
    print!("{}", global.settings()?.to_toml_string()?);
    Ok(())
}

fn grids_table(grids: &[GridRecord]) -> String {
    let width = grids
        .iter()
        .map(|g| g.name.len())
        .max()
        .unwrap_or(0)
        .max("NAME".len());
    let mut out = format!("{:<width$}  CLUSTERS\n", "NAME");
    for grid in grids {
        out.push_str(&format!("{:<width$}  {}\n", grid.name, grid.clusters.len()));
    }
    out
}

fn namespaces_table(namespaces: &NamespaceList) -> String {
    if namespaces.items.is_empty() {
        return "No namespaces found\n".to_string();
    }
    let width = namespaces
        .items
        .iter()
        .map(|ns| ns.metadata.name.len())
        .max()
        .unwrap_or(0)
        .max("NAME".len());
    let mut out = format!("{:<width$}  STATUS\n", "NAME");
    for ns in &namespaces.items {
        out.push_str(&format!("{:<width$}  {}\n", ns.metadata.name, ns.status.phase));
    }
    out
}

fn describe_text(grid: &GridRecord) -> String {
    let mut out = format!("Name:     {}\nClusters: {}\n", grid.name, grid.clusters.len());
    for cluster in &grid.clusters {
        out.push_str(&format!("\n  {}\n", cluster.name));
        out.push_str(&format!("    Provider:    {}\n", cluster.provider));
        out.push_str(&format!("    Region:      {}\n", cluster.region));
        out.push_str(&format!("    Existing:    {}\n", cluster.is_existing));
        if !cluster.version.is_empty() {
            out.push_str(&format!("    Version:     {}\n", cluster.version));
        }
        if !cluster.description.is_empty() {
            out.push_str(&format!("    Description: {}\n", cluster.description));
        }
        if !cluster.kubeconfig.is_empty() {
            out.push_str("    Kubeconfig:\n");
            for line in cluster.kubeconfig.lines() {
                out.push_str(&format!("      {line}\n"));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use kgrid_kube::Namespace;
    use kgrid_state::MemoryStore;

    use super::*;

    fn grid() -> GridRecord {
        GridRecord {
            name: "nightly".to_string(),
            clusters: vec![ClusterRecord {
                name: "grid-0123".to_string(),
                provider: "aws".to_string(),
                region: "us-west-1".to_string(),
                version: "1.18".to_string(),
                kubeconfig: "apiVersion: v1\nkind: Config\n".to_string(),
                ..Default::default()
            }],
        }
    }

    #[test]
    fn table_aligns_names() {
        let mut long = grid();
        long.name = "a-much-longer-grid-name".to_string();
        let table = grids_table(&[grid(), long]);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("NAME "));
        assert_eq!(lines[0].find("CLUSTERS"), lines[1].find('1'));
    }

    #[test]
    fn empty_table_has_header_only() {
        assert_eq!(grids_table(&[]), "NAME  CLUSTERS\n");
    }

    #[test]
    fn describe_shows_kubeconfig_only_when_present() {
        let text = describe_text(&grid());
        assert!(text.contains("Region:      us-west-1"));
        assert!(text.contains("      kind: Config"));
        assert!(!text.contains("Description"));

        let mut hidden = grid();
        hidden.clusters[0].kubeconfig.clear();
        assert!(!describe_text(&hidden).contains("Kubeconfig"));
    }

    #[test]
    fn describe_reads_from_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grids.yaml");
        let store = kgrid_state::FileStore::new(&path);
        store.add_grid("nightly").unwrap();

        let global = GlobalArgs {
            config_file: Some(path),
            settings: Some(dir.path().join("missing.toml")),
        };
        // An explicit settings path must exist.
        assert!(describe_grid(&global, "nightly", false, OutputFormat::Text).is_err());

        let global = GlobalArgs {
            config_file: global.config_file,
            settings: None,
        };
        describe_grid(&global, "nightly", false, OutputFormat::Json).unwrap();
        assert!(describe_grid(&global, "absent", false, OutputFormat::Text).is_err());
    }

    #[test]
    fn find_cluster_reports_missing_grid_and_cluster() {
        let store = MemoryStore::new();
        store.add_grid("nightly").unwrap();
        store.append_cluster("nightly", grid().clusters[0].clone()).unwrap();

        let found = find_cluster(&store, "nightly", "grid-0123").unwrap();
        assert_eq!(found.region, "us-west-1");

        let err = find_cluster(&store, "weekly", "grid-0123").unwrap_err();
        assert_eq!(err.to_string(), "grid not found");
        let err = find_cluster(&store, "nightly", "grid-9999").unwrap_err();
        assert_eq!(err.to_string(), "cluster not found");
    }

    #[test]
    fn namespaces_table_lists_phase() {
        let mut list = NamespaceList::default();
        for (name, phase) in [("default", "Active"), ("sentry-pro", "Terminating")] {
            let mut ns = Namespace::default();
            ns.metadata.name = name.to_string();
            ns.status.phase = phase.to_string();
            list.items.push(ns);
        }
        let table = namespaces_table(&list);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "NAME        STATUS");
        assert_eq!(lines[2], "sentry-pro  Terminating");
    }

    #[test]
    fn empty_namespaces_table() {
        assert_eq!(namespaces_table(&NamespaceList::default()), "No namespaces found\n");
    }
}
