use db::{models::stop::CreateStop, types::StopOwnerType};
use serde::{Deserialize, Serialize};

/// The stop roster a new train is created with. Deserializable so deployments
/// can ship their own; the default is the standard ten-stop mobile release
/// run. Admins may disable entries at creation time and only enabled entries
/// are persisted, renumbered 1..M.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopTemplate {
    pub entries: Vec<StopTemplateEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopTemplateEntry {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub owner_type: StopOwnerType,
    pub owner_name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl StopTemplate {
    pub fn enabled_specs(&self) -> Vec<CreateStop> {
        self.entries
            .iter()
            .filter(|entry| entry.enabled)
            .enumerate()
            .map(|(index, entry)| CreateStop {
                number: index as i32 + 1,
                title: entry.title.clone(),
                description: entry.description.clone(),
                owner_type: entry.owner_type,
                owner_name: entry.owner_name.clone(),
            })
            .collect()
    }
}

impl Default for StopTemplate {
    fn default() -> Self {
        fn entry(title: &str, owner_type: StopOwnerType, owner_name: &str) -> StopTemplateEntry {
            StopTemplateEntry {
                title: title.to_string(),
                description: None,
                owner_type,
                owner_name: owner_name.to_string(),
                enabled: true,
            }
        }

        Self {
            entries: vec![
                entry("Cut release branch", StopOwnerType::Person, "Release manager"),
                entry("Bump version and changelog", StopOwnerType::Automation, "CI"),
                entry("Build release candidate", StopOwnerType::Automation, "CI"),
                entry("Regression test pass", StopOwnerType::Person, "QA"),
                entry("Fix and verify blockers", StopOwnerType::Person, "Engineering"),
                entry("Submit for store review", StopOwnerType::Person, "Release manager"),
                entry("Store review approved", StopOwnerType::Automation, "Store watcher"),
                entry("Staged rollout to 10%", StopOwnerType::Person, "Release manager"),
                entry("Monitor crashes and vitals", StopOwnerType::Person, "On-call"),
                entry("Full rollout", StopOwnerType::Person, "Release manager"),
            ],
        }
    }
}
