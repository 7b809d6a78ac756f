//! Shared domain types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Built-in cluster bootstrap technologies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BootstrapperKind {
    /// kubeadm against upstream Kubernetes releases
    Kubeadm,
    /// Rancher k3s
    K3s,
    /// Rancher Kubernetes Engine (local `rke up`)
    Rke,
    /// RKE2 (rke2-server/rke2-agent services)
    Rke2,
    /// k0s single-binary distribution
    K0s,
    /// SUSE CaaSP skuba
    Skuba,
    /// rancherd on top of RKE2
    Rancherd,
}

impl BootstrapperKind {
    /// All kinds selectable from user input.
    pub const ALL: [BootstrapperKind; 7] = [
        BootstrapperKind::Kubeadm,
        BootstrapperKind::K3s,
        BootstrapperKind::Rke,
        BootstrapperKind::Rke2,
        BootstrapperKind::K0s,
        BootstrapperKind::Skuba,
        BootstrapperKind::Rancherd,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BootstrapperKind::Kubeadm => "kubeadm",
            BootstrapperKind::K3s => "k3s",
            BootstrapperKind::Rke => "rke",
            BootstrapperKind::Rke2 => "rke2",
            BootstrapperKind::K0s => "k0s",
            BootstrapperKind::Skuba => "skuba",
            BootstrapperKind::Rancherd => "rancherd",
        }
    }
}

impl fmt::Display for BootstrapperKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BootstrapperKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            // kubeadm is the default when nothing is specified
            "" | "kubeadm" => Ok(BootstrapperKind::Kubeadm),
            "k3s" => Ok(BootstrapperKind::K3s),
            "rke" => Ok(BootstrapperKind::Rke),
            "rke2" => Ok(BootstrapperKind::Rke2),
            "k0s" => Ok(BootstrapperKind::K0s),
            "skuba" => Ok(BootstrapperKind::Skuba),
            "rancherd" => Ok(BootstrapperKind::Rancherd),
            other => Err(Error::UnsupportedBootstrapper(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trip() {
        for kind in BootstrapperKind::ALL {
            assert_eq!(kind.as_str().parse::<BootstrapperKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_empty_defaults_to_kubeadm() {
        assert_eq!(
            "".parse::<BootstrapperKind>().unwrap(),
            BootstrapperKind::Kubeadm
        );
    }

    #[test]
    fn test_unknown_kind_rejected() {
        assert!("microk8s".parse::<BootstrapperKind>().is_err());
    }
}
