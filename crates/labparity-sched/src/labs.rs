//! Lab catalog: which labs accept submissions and which of them compare.

use serde::{Deserialize, Serialize};

pub const DEFAULT_LAB_ID: &str = "lab1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lab {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub compare_enabled: bool,
}

impl Lab {
    pub fn new(id: &str, title: &str, compare_enabled: bool) -> Self {
        Self {
            id: normalize_lab_id(id),
            title: title.to_string(),
            compare_enabled,
        }
    }
}

/// Trimmed, lower-cased lab id.
pub fn normalize_lab_id(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabCatalog {
    labs: Vec<Lab>,
}

impl Default for LabCatalog {
    fn default() -> Self {
        Self::new(vec![
            Lab::new("lab1", "Zero-Downtime Migration", true),
            Lab::new("lab2", "Terraform Modules: Files Service + S3", false),
            Lab::new("lab3", "CI/CD on GitHub Actions + EKS", false),
            Lab::new(
                "lab4",
                "Observability on EKS: Prometheus + Grafana + SLI/SLO for GratitudeApp",
                false,
            ),
            Lab::new("lab5", "Identity & Secrets on EKS: AWS SSO + IRSA + Vault", false),
            Lab::new("lab6", "GitOps on EKS with Argo CD + Flux", false),
            Lab::new(
                "lab7",
                "EKS Networking Masterclass: AWS VPC CNI + Policies + Debugging",
                false,
            ),
        ])
    }
}

impl LabCatalog {
    /// Build a catalog sorted by id. Later duplicates replace earlier ones.
    pub fn new(labs: Vec<Lab>) -> Self {
        let mut by_id = std::collections::BTreeMap::new();
        for mut lab in labs {
            lab.id = normalize_lab_id(&lab.id);
            by_id.insert(lab.id.clone(), lab);
        }
        Self {
            labs: by_id.into_values().collect(),
        }
    }

    pub fn labs(&self) -> &[Lab] {
        &self.labs
    }

    /// Look up a lab by raw id (normalized first).
    pub fn get(&self, raw_id: &str) -> Option<&Lab> {
        let id = normalize_lab_id(raw_id);
        self.labs.iter().find(|lab| lab.id == id)
    }
}
