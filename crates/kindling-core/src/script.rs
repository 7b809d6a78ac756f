//! Installer scripts and the environment variables they consume.
//!
//! Scripts live in the project repository and are addressed by raw URL at
//! a release tag. Nodes fetch them directly; the RKE and skuba engines
//! download them once into the local bin dir and run them there.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::BootstrapperVersion;
use crate::error::Result;
use crate::types::BootstrapperKind;

const SCRIPTS_REPO: &str = "lutra/kindling";

/// Tag of the script set matching this build.
pub fn scripts_tag() -> String {
    concat!("v", env!("CARGO_PKG_VERSION")).to_string()
}

/// Name of the installer script for a distribution.
pub fn script_name(kind: BootstrapperKind) -> &'static str {
    match kind {
        BootstrapperKind::Kubeadm => "install-kubeadm.sh",
        BootstrapperKind::K3s => "install-k3s.sh",
        BootstrapperKind::Rke => "install-rke.sh",
        BootstrapperKind::Rke2 => "install-rke2.sh",
        BootstrapperKind::K0s => "install-k0s.sh",
        BootstrapperKind::Skuba => "install-skuba.sh",
        BootstrapperKind::Rancherd => "install-rancherd.sh",
    }
}

/// Raw download URL for a script at a tag.
pub fn raw_script_url(tag: &str, name: &str) -> String {
    format!("https://raw.githubusercontent.com/{SCRIPTS_REPO}/{tag}/scripts/{name}")
}

/// Download a script into `<bin_dir>/<tag>/<name>` and mark it
/// executable. Idempotent unless `force` is set.
pub async fn download_script(
    bin_dir: &Path,
    tag: &str,
    name: &str,
    force: bool,
) -> Result<PathBuf> {
    let dest = bin_dir.join(tag).join(name);
    if dest.exists() && !force {
        debug!(script = name, tag, "script already downloaded");
        return Ok(dest);
    }

    let url = raw_script_url(tag, name);
    info!(%url, "downloading installer script");
    let body = reqwest::get(&url).await?.error_for_status()?.bytes().await?;

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&dest, &body).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(&dest, std::fs::Permissions::from_mode(0o755)).await?;
    }

    Ok(dest)
}

/// Commands a node runs to fetch its installer script into the remote
/// working directory.
pub fn fetch_script_commands(kind: BootstrapperKind) -> Vec<String> {
    let name = script_name(kind);
    let url = raw_script_url(&scripts_tag(), name);
    vec![
        format!("curl -sfSLO {url}"),
        format!("chmod +x {name}"),
    ]
}

/// Single-quote `value` for the shell, escaping embedded single quotes.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Shell prefix exporting env vars ahead of a remote command. Empty when
/// there is nothing to export.
pub fn env_prefix(envs: &[(String, String)]) -> String {
    if envs.is_empty() {
        return String::new();
    }
    let assignments: Vec<String> = envs
        .iter()
        .map(|(key, value)| format!("{key}={}", shell_quote(value)))
        .collect();
    format!("export {} && ", assignments.join(" "))
}

/// Env vars consumed by the kubeadm installer.
pub fn kubeadm_envs(record: &BootstrapperVersion) -> Vec<(String, String)> {
    match record {
        BootstrapperVersion::Kubeadm {
            version,
            crictl_version,
            kube_release_version,
        } => vec![
            ("KUBE_VERSION".to_string(), version.to_string()),
            ("CRICTL_VERSION".to_string(), crictl_version.to_string()),
            (
                "KUBE_RELEASE_VERSION".to_string(),
                kube_release_version.to_string(),
            ),
        ],
        other => vec![("KUBE_VERSION".to_string(), other.version().to_string())],
    }
}

/// Env vars consumed by the k3s installer.
pub fn k3s_envs(version: &str, install_exec: &str) -> Vec<(String, String)> {
    vec![
        ("INSTALL_K3S_VERSION".to_string(), version.to_string()),
        ("INSTALL_K3S_EXEC".to_string(), install_exec.to_string()),
        ("INSTALL_K3S_SKIP_START".to_string(), "true".to_string()),
    ]
}

/// Env vars consumed by the RKE2 and rancherd installers.
pub fn rke2_envs(version: &str, install_type: &str) -> Vec<(String, String)> {
    vec![
        ("RKE2_VERSION".to_string(), version.to_string()),
        ("INSTALL_RKE2_TYPE".to_string(), install_type.to_string()),
    ]
}

/// Env vars consumed by the k0s installer.
pub fn k0s_envs(version: &str, config_path: &str, cmd_opts: &str) -> Vec<(String, String)> {
    vec![
        ("K0S_VERSION".to_string(), version.to_string()),
        ("K0S_CONFIG".to_string(), config_path.to_string()),
        ("K0S_CMD_OPTS".to_string(), cmd_opts.to_string()),
    ]
}
