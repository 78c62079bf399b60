use crate::roles::RoleTable;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, LazyLock};

/// Name of the settings record and of the form field group (`wga[<key>]`).
pub const OPTION_GROUP: &str = "wga";

/// Per-role opt-out keys are `ignore_role_<role id>`.
pub const ROLE_FLAG_PREFIX: &str = "ignore_role_";

/// Checkbox keys that exist independently of the role table. The `log_*`
/// entries are accepted and stored but have no consumer yet.
pub const BASE_CHECKBOXES: [&str; 4] = [
    "log_404s",
    "log_searches",
    "log_outgoing",
    "ignore_admin_area",
];

/// Raw form data, field names already unwrapped from the `wga[...]` group.
pub type RawSettings = HashMap<String, String>;

/// Canonical stored settings: option name to string value. Boolean options
/// are stored as the literal strings `"true"` / `"false"`.
pub type OptionRecord = BTreeMap<String, String>;

static TRACKING_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^G-[A-Z0-9]{10}$").unwrap());

/// Returns the canonical GA4 tracking ID if `raw` is one, `None` otherwise.
pub fn validate_tracking_id(raw: &str) -> Option<&str> {
    TRACKING_ID.find(raw).map(|m| m.as_str())
}

/// Pulls the `<group>[<key>]` fields out of a submitted form, dropping the
/// wrapper. Fields outside the group are ignored.
pub fn fields_for_group(form: &HashMap<String, String>, group: &str) -> RawSettings {
    let mut raw = RawSettings::new();
    for (field, value) in form {
        if let Some(key) = field
            .strip_prefix(group)
            .and_then(|f| f.strip_prefix('['))
            .and_then(|f| f.strip_suffix(']'))
        {
            raw.insert(key.to_string(), value.clone());
        }
    }
    raw
}

/// Normalizes raw submitted settings into the canonical record.
///
/// The tracking ID is kept only in its canonical form, anything else becomes
/// the empty string. Every whitelisted checkbox key is written out, `"true"`
/// only for an exact `"true"` submission. Unknown keys are dropped. This
/// never fails; bad input degrades to defaults.
pub fn sanitize_options(raw: &RawSettings, known_roles: &[String]) -> OptionRecord {
    let mut out = OptionRecord::new();

    let code = raw.get("code").map(String::as_str).unwrap_or("");
    out.insert(
        "code".to_string(),
        validate_tracking_id(code).unwrap_or("").to_string(),
    );

    let mut checkboxes: Vec<String> = BASE_CHECKBOXES.iter().map(|k| k.to_string()).collect();
    checkboxes.extend(
        known_roles
            .iter()
            .map(|role| format!("{ROLE_FLAG_PREFIX}{role}")),
    );

    for key in checkboxes {
        let ticked = raw.get(&key).is_some_and(|v| v == "true");
        out.insert(key, if ticked { "true" } else { "false" }.to_string());
    }

    out
}

/// Seam the settings store drives right before persisting a submission.
pub trait Sanitizer: Send + Sync {
    fn sanitize(&self, raw: &RawSettings) -> OptionRecord;
}

/// Sanitizer wired to the live role table, so the per-role opt-out keys track
/// whatever roles the host defines at save time.
pub struct OptionSanitizer {
    roles: Arc<dyn RoleTable>,
}

impl OptionSanitizer {
    pub fn new(roles: Arc<dyn RoleTable>) -> Self {
        Self { roles }
    }
}

impl Sanitizer for OptionSanitizer {
    fn sanitize(&self, raw: &RawSettings) -> OptionRecord {
        sanitize_options(raw, &self.roles.role_ids())
    }
}
