use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Legacy capability that marks a whole role as not-to-be-tracked. Older
/// deployments stored the opt-out on the role instead of in the settings
/// record; the resolver still honors it when the per-role key is missing.
pub const NO_TRACK_CAPABILITY: &str = "wga_no_track";

/// A host-defined user role. Owned by the role table; this crate only reads
/// role identifiers and capabilities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub capabilities: HashMap<String, bool>,
}

/// Enumerable role table supplied by the host.
pub trait RoleTable: Send + Sync {
    fn roles(&self) -> Vec<Role>;
    fn get(&self, id: &str) -> Option<Role>;

    fn role_ids(&self) -> Vec<String> {
        self.roles().into_iter().map(|role| role.id).collect()
    }
}

/// Role table loaded once at startup, either from a TOML file or from the
/// built-in defaults.
pub struct StaticRoleTable {
    roles: BTreeMap<String, Role>,
}

#[derive(Debug, Deserialize)]
struct RolesFile {
    #[serde(default)]
    roles: BTreeMap<String, RoleSpec>,
}

#[derive(Debug, Deserialize)]
struct RoleSpec {
    name: String,
    #[serde(default)]
    capabilities: HashMap<String, bool>,
}

impl StaticRoleTable {
    /// The five conventional roles, used when no roles file is configured.
    pub fn builtin() -> Self {
        let mut roles = BTreeMap::new();
        for (id, name) in [
            ("administrator", "Administrators"),
            ("editor", "Editors"),
            ("author", "Authors"),
            ("contributor", "Contributors"),
            ("subscriber", "Subscribers"),
        ] {
            roles.insert(
                id.to_string(),
                Role {
                    id: id.to_string(),
                    name: name.to_string(),
                    capabilities: HashMap::new(),
                },
            );
        }
        Self { roles }
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading roles file {path:?}"))?;
        Self::parse(&contents).with_context(|| format!("parsing roles file {path:?}"))
    }

    pub fn parse(contents: &str) -> anyhow::Result<Self> {
        let file: RolesFile = toml::from_str(contents)?;
        let roles = file
            .roles
            .into_iter()
            .map(|(id, spec)| {
                let role = Role {
                    id: id.clone(),
                    name: spec.name,
                    capabilities: spec.capabilities,
                };
                (id, role)
            })
            .collect();
        Ok(Self { roles })
    }
}

impl RoleTable for StaticRoleTable {
    fn roles(&self) -> Vec<Role> {
        self.roles.values().cloned().collect()
    }

    fn get(&self, id: &str) -> Option<Role> {
        self.roles.get(id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table_carries_the_conventional_roles() {
        let table = StaticRoleTable::builtin();
        assert_eq!(
            table.role_ids(),
            vec![
                "administrator",
                "author",
                "contributor",
                "editor",
                "subscriber"
            ]
        );
        assert_eq!(table.get("editor").unwrap().name, "Editors");
    }

    #[test]
    fn parses_roles_file_with_capabilities() {
        let table = StaticRoleTable::parse(
            r#"
            [roles.editor]
            name = "Editors"

            [roles.editor.capabilities]
            wga_no_track = true

            [roles.viewer]
            name = "Viewers"
            "#,
        )
        .unwrap();
        assert_eq!(table.role_ids(), vec!["editor", "viewer"]);
        let editor = table.get("editor").unwrap();
        assert_eq!(editor.capabilities.get(NO_TRACK_CAPABILITY), Some(&true));
        assert!(table.get("viewer").unwrap().capabilities.is_empty());
    }

    #[test]
    fn unknown_role_lookup_is_none() {
        assert!(StaticRoleTable::builtin().get("ghost").is_none());
    }
}
