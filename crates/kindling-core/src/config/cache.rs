//! Cached per-distribution version records.

use serde::{Deserialize, Serialize};

use crate::types::BootstrapperKind;
use crate::version::Version;

/// One installable version of a distribution, with whatever companion
/// versions that distribution needs at install time. Cached as YAML under
/// `<cache-root>/<bootstrapper>/<latest>.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "bootstrapper", rename_all = "lowercase")]
pub enum BootstrapperVersion {
    Kubeadm {
        version: Version,
        crictl_version: Version,
        kube_release_version: Version,
    },
    K3s {
        version: Version,
    },
    Rke {
        version: Version,
        /// Kubernetes versions this RKE release can deploy.
        kubernetes_versions: Vec<String>,
    },
    Rke2 {
        version: Version,
    },
    K0s {
        version: Version,
    },
    Skuba {
        version: Version,
    },
    Rancherd {
        version: Version,
    },
}

impl BootstrapperVersion {
    /// Plain record carrying only the version itself.
    pub fn plain(kind: BootstrapperKind, version: Version) -> Self {
        match kind {
            BootstrapperKind::Kubeadm => BootstrapperVersion::Kubeadm {
                crictl_version: version.clone(),
                kube_release_version: version.clone(),
                version,
            },
            BootstrapperKind::K3s => BootstrapperVersion::K3s { version },
            BootstrapperKind::Rke => BootstrapperVersion::Rke {
                version,
                kubernetes_versions: Vec::new(),
            },
            BootstrapperKind::Rke2 => BootstrapperVersion::Rke2 { version },
            BootstrapperKind::K0s => BootstrapperVersion::K0s { version },
            BootstrapperKind::Skuba => BootstrapperVersion::Skuba { version },
            BootstrapperKind::Rancherd => BootstrapperVersion::Rancherd { version },
        }
    }

    pub fn kind(&self) -> BootstrapperKind {
        match self {
            BootstrapperVersion::Kubeadm { .. } => BootstrapperKind::Kubeadm,
            BootstrapperVersion::K3s { .. } => BootstrapperKind::K3s,
            BootstrapperVersion::Rke { .. } => BootstrapperKind::Rke,
            BootstrapperVersion::Rke2 { .. } => BootstrapperKind::Rke2,
            BootstrapperVersion::K0s { .. } => BootstrapperKind::K0s,
            BootstrapperVersion::Skuba { .. } => BootstrapperKind::Skuba,
            BootstrapperVersion::Rancherd { .. } => BootstrapperKind::Rancherd,
        }
    }

    pub fn version(&self) -> &Version {
        match self {
            BootstrapperVersion::Kubeadm { version, .. }
            | BootstrapperVersion::K3s { version }
            | BootstrapperVersion::Rke { version, .. }
            | BootstrapperVersion::Rke2 { version }
            | BootstrapperVersion::K0s { version }
            | BootstrapperVersion::Skuba { version }
            | BootstrapperVersion::Rancherd { version } => version,
        }
    }

    /// The same record pointing at a different release of the same minor
    /// line, used when a requested patch release is confirmed upstream.
    pub fn with_version(&self, version: Version) -> Self {
        let mut out = self.clone();
        match &mut out {
            BootstrapperVersion::Kubeadm { version: v, .. }
            | BootstrapperVersion::K3s { version: v }
            | BootstrapperVersion::Rke { version: v, .. }
            | BootstrapperVersion::Rke2 { version: v }
            | BootstrapperVersion::K0s { version: v }
            | BootstrapperVersion::Skuba { version: v }
            | BootstrapperVersion::Rancherd { version: v } => *v = version,
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_record_kinds() {
        for kind in BootstrapperKind::ALL {
            let v = Version::parse("v1.19.2").unwrap();
            let record = BootstrapperVersion::plain(kind, v.clone());
            assert_eq!(record.kind(), kind);
            assert_eq!(record.version(), &v);
        }
    }

    #[test]
    fn test_with_version_keeps_companions() {
        let record = BootstrapperVersion::Kubeadm {
            version: Version::parse("v1.19.2").unwrap(),
            crictl_version: Version::parse("v1.19.0").unwrap(),
            kube_release_version: Version::parse("v0.4.0").unwrap(),
        };
        let updated = record.with_version(Version::parse("v1.19.4").unwrap());
        match updated {
            BootstrapperVersion::Kubeadm {
                version,
                crictl_version,
                ..
            } => {
                assert_eq!(version.to_string(), "v1.19.4");
                assert_eq!(crictl_version.to_string(), "v1.19.0");
            }
            other => panic!("unexpected record: {other:?}"),
        }
    }

    #[test]
    fn test_yaml_tagging() {
        let record = BootstrapperVersion::K3s {
            version: Version::parse("v1.19.2").unwrap(),
        };
        let yaml = serde_yaml::to_string(&record).unwrap();
        assert!(yaml.contains("bootstrapper: k3s"));
        let back: BootstrapperVersion = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, record);
    }
}
