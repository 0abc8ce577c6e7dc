//! Kubectl against a scripted stand-in for the `kubectl` binary.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use kgrid_kube::{KubeClient, KubeError, Kubectl, default_storage_class};

const FAKE_KUBECTL: &str = r#"#!/bin/sh
dir="$(dirname "$0")"
# $1 = --kubeconfig, $2 = path
cp "$2" "$dir/last-kubeconfig"
case "$3" in
  apply)
    cat > "$dir/applied.yaml"
    echo "storageclass.storage.k8s.io/default created"
    ;;
  get)
    case "$4" in
      nodes)
        echo '{"items": [
          {"metadata": {"name": "n1"}, "status": {"conditions": [{"type": "Ready", "status": "True"}]}},
          {"metadata": {"name": "n2"}, "status": {"conditions": [{"type": "Ready", "status": "False"}]}}
        ]}'
        ;;
      namespaces)
        if [ -f "$dir/no-namespaces" ]; then
          echo '{"apiVersion": "v1", "kind": "List", "items": []}'
        else
          echo '{"apiVersion": "v1", "kind": "List", "items": [
            {"metadata": {"name": "default"}, "status": {"phase": "Active"}},
            {"metadata": {"name": "kube-system"}, "status": {"phase": "Active"}},
            {"metadata": {"name": "sentry-pro"}, "status": {"phase": "Terminating"}}
          ]}'
        fi
        ;;
      *)
        echo "unexpected resource $4" >&2
        exit 1
        ;;
    esac
    ;;
  cluster-info)
    if [ -f "$dir/api-up" ]; then
      printf 'Kubernetes control plane is running at https://example\n'
    else
      echo "Unable to connect to the server" >&2
      exit 1
    fi
    ;;
esac
"#;

fn install_fake(dir: &Path) -> PathBuf {
    let path = dir.join("kubectl");
    std::fs::write(&path, FAKE_KUBECTL).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[tokio::test]
async fn kubectl_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let kubectl = Kubectl::new(install_fake(dir.path()));
    let kubeconfig = "apiVersion: v1\nkind: Config\ncurrent-context: aws\n";

    kubectl.apply(kubeconfig, default_storage_class()).await.unwrap();
    assert_eq!(
        std::fs::read_to_string(dir.path().join("applied.yaml")).unwrap(),
        default_storage_class()
    );
    assert_eq!(
        std::fs::read_to_string(dir.path().join("last-kubeconfig")).unwrap(),
        kubeconfig
    );

    let nodes = kubectl.nodes(kubeconfig).await.unwrap();
    assert_eq!(nodes.items.len(), 2);
    assert_eq!(nodes.ready_count(), 1);
    assert!(!nodes.all_ready(2));

    let err = kubectl.check_api_server(kubeconfig).await.unwrap_err();
    assert!(matches!(err, KubeError::Command(_)), "{err}");
    assert!(err.to_string().contains("Unable to connect"), "{err}");

    std::fs::write(dir.path().join("api-up"), "").unwrap();
    kubectl.check_api_server(kubeconfig).await.unwrap();
}

#[tokio::test]
async fn lists_namespaces() {
    let dir = tempfile::tempdir().unwrap();
    let kubectl = Kubectl::new(install_fake(dir.path()));
    let kubeconfig = "apiVersion: v1\nkind: Config\ncurrent-context: grid\n";

    let namespaces = kubectl.namespaces(kubeconfig).await.unwrap();
    assert_eq!(namespaces.names(), ["default", "kube-system", "sentry-pro"]);
    assert_eq!(namespaces.items[2].status.phase, "Terminating");
    assert_eq!(
        std::fs::read_to_string(dir.path().join("last-kubeconfig")).unwrap(),
        kubeconfig
    );

    std::fs::write(dir.path().join("no-namespaces"), "").unwrap();
    assert!(kubectl.namespaces(kubeconfig).await.unwrap().items.is_empty());
}
