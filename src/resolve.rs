use crate::options::{OptionRecord, ROLE_FLAG_PREFIX, validate_tracking_id};
use crate::roles::{NO_TRACK_CAPABILITY, RoleTable};

/// Computes the effective value of a stored option.
///
/// Borrows the record as loaded from the store (`None` when settings were
/// never saved) plus the live role table for the legacy capability fallback.
/// Values come back as the stored `"true"`/`"false"` strings; the typed
/// accessors below convert them at the boundary.
pub struct OptionResolver<'a> {
    record: Option<&'a OptionRecord>,
    roles: &'a dyn RoleTable,
}

impl<'a> OptionResolver<'a> {
    pub fn new(record: Option<&'a OptionRecord>, roles: &'a dyn RoleTable) -> Self {
        Self { record, roles }
    }

    /// Pass-through query mode: the whole record, unmodified.
    pub fn record(&self) -> Option<&'a OptionRecord> {
        self.record
    }

    /// Effective value of one option, `None` standing for the absent/false
    /// default.
    ///
    /// The stored tracking ID is re-validated on every read, which tolerates
    /// records written before the sanitizer was this strict. A missing
    /// `ignore_role_*` key falls back to the role's legacy no-track
    /// capability and never to a caller default.
    pub fn resolve(&self, name: &str) -> Option<String> {
        let record = self.record?;
        match record.get(name) {
            Some(value) if name == "code" => {
                Some(validate_tracking_id(value).unwrap_or("").to_string())
            }
            Some(value) => Some(value.clone()),
            None => {
                let role_id = name.strip_prefix(ROLE_FLAG_PREFIX)?;
                let no_track = self.roles.get(role_id).is_some_and(|role| {
                    role.capabilities
                        .get(NO_TRACK_CAPABILITY)
                        .copied()
                        .unwrap_or(false)
                });
                no_track.then(|| "true".to_string())
            }
        }
    }

    /// The canonical tracking ID, empty when unset or malformed.
    pub fn tracking_id(&self) -> String {
        self.resolve("code").unwrap_or_default()
    }

    /// A boolean flag is on only when the stored value is exactly `"true"`.
    pub fn flag(&self, name: &str) -> bool {
        self.resolve(name).is_some_and(|value| value == "true")
    }

    pub fn ignores_role(&self, role: &str) -> bool {
        self.flag(&format!("{ROLE_FLAG_PREFIX}{role}"))
    }

    /// The admin-area check is inverted in the stored format: anything other
    /// than the literal `"false"` (a missing key included) counts as ignore.
    pub fn ignores_admin_area(&self) -> bool {
        self.resolve("ignore_admin_area")
            .is_none_or(|value| value != "false")
    }
}
