//! Extension manifest - declared metadata and its validation
//!
//! An extension declares its identity through `ExtensionDeclaration`. Every
//! field is optional at the type level so that a malformed unit can be
//! represented and rejected with a precise reason rather than failing to
//! build at all.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

// ============================================================================
// Category
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ExtensionCategory {
    Enumeration,
    CredentialDumping,
    PrivilegeEscalation,
}

impl ExtensionCategory {
    pub const ALL: [ExtensionCategory; 3] = [
        ExtensionCategory::Enumeration,
        ExtensionCategory::CredentialDumping,
        ExtensionCategory::PrivilegeEscalation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExtensionCategory::Enumeration => "Enumeration",
            ExtensionCategory::CredentialDumping => "Credential Dumping",
            ExtensionCategory::PrivilegeEscalation => "Privilege Escalation",
        }
    }

    /// Exact, case-sensitive match against the display names.
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == value)
    }
}

impl fmt::Display for ExtensionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Declaration
// ============================================================================

/// Hooks an extension implements beyond the defaults
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Entrypoints {
    pub options: bool,
    pub on_login: bool,
    pub on_admin_login: bool,
}

/// Raw metadata as the extension declares it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionDeclaration {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub supported_protocols: Option<Vec<String>>,
    pub options_doc: Option<String>,
    pub entrypoints: Entrypoints,
}

impl ExtensionDeclaration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn category(mut self, category: ExtensionCategory) -> Self {
        self.category = Some(category.as_str().to_string());
        self
    }

    pub fn supports<I, S>(mut self, protocols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.supported_protocols = Some(protocols.into_iter().map(Into::into).collect());
        self
    }

    pub fn options_doc(mut self, doc: impl Into<String>) -> Self {
        self.options_doc = Some(doc.into());
        self
    }

    pub fn with_options(mut self) -> Self {
        self.entrypoints.options = true;
        self
    }

    pub fn with_on_login(mut self) -> Self {
        self.entrypoints.on_login = true;
        self
    }

    pub fn with_on_admin_login(mut self) -> Self {
        self.entrypoints.on_admin_login = true;
        self
    }
}

// ============================================================================
// Validated descriptor
// ============================================================================

/// Metadata of an extension that passed validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionDescriptor {
    pub name: String,
    pub description: String,
    pub category: ExtensionCategory,
    pub supported_protocols: BTreeSet<String>,
    /// True iff the extension implements the admin-login hook
    pub requires_elevated_access: bool,
    pub options_doc: String,
}

impl ExtensionDescriptor {
    pub fn supports(&self, protocol: &str) -> bool {
        self.supported_protocols.contains(protocol)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing the name variable")]
    MissingName,

    #[error("declared name '{declared}' does not match unit name '{expected}'")]
    NameMismatch { declared: String, expected: String },

    #[error("missing the description variable")]
    MissingDescription,

    #[error("invalid category '{0}'")]
    InvalidCategory(String),

    #[error("missing the supported_protocols variable")]
    MissingSupportedProtocols,

    #[error("missing the options function")]
    MissingOptions,

    #[error("missing the on_login/on_admin_login function(s)")]
    MissingLoginHook,
}

/// Check a declaration against the unit it was loaded from.
///
/// Rules are applied in a fixed order and the first failure is returned.
pub fn validate(
    declaration: &ExtensionDeclaration,
    unit_name: &str,
) -> Result<ExtensionDescriptor, ValidationError> {
    let name = declaration
        .name
        .as_deref()
        .filter(|n| !n.is_empty())
        .ok_or(ValidationError::MissingName)?;
    if name != unit_name {
        return Err(ValidationError::NameMismatch {
            declared: name.to_string(),
            expected: unit_name.to_string(),
        });
    }

    let description = declaration
        .description
        .as_deref()
        .ok_or(ValidationError::MissingDescription)?;

    let raw_category = declaration.category.clone().unwrap_or_default();
    let category = ExtensionCategory::parse(&raw_category)
        .ok_or(ValidationError::InvalidCategory(raw_category))?;

    let supported_protocols: BTreeSet<String> = declaration
        .supported_protocols
        .as_ref()
        .ok_or(ValidationError::MissingSupportedProtocols)?
        .iter()
        .cloned()
        .collect();

    let hooks = declaration.entrypoints;
    if !hooks.options {
        return Err(ValidationError::MissingOptions);
    }
    if !hooks.on_login && !hooks.on_admin_login {
        return Err(ValidationError::MissingLoginHook);
    }

    Ok(ExtensionDescriptor {
        name: name.to_string(),
        description: description.to_string(),
        category,
        supported_protocols,
        requires_elevated_access: hooks.on_admin_login,
        options_doc: declaration.options_doc.clone().unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete(name: &str) -> ExtensionDeclaration {
        ExtensionDeclaration::new(name)
            .description("Dumps things")
            .category(ExtensionCategory::CredentialDumping)
            .supports(["smb"])
            .with_options()
            .with_on_admin_login()
    }

    #[test]
    fn test_valid_declaration() {
        let descriptor = validate(&complete("dump"), "dump").unwrap();
        assert_eq!(descriptor.category, ExtensionCategory::CredentialDumping);
        assert!(descriptor.requires_elevated_access);
        assert!(descriptor.supports("smb"));
        assert!(!descriptor.supports("ssh"));
        assert_eq!(descriptor.options_doc, "");
    }

    #[test]
    fn test_name_mismatch_is_case_sensitive() {
        assert_eq!(
            validate(&complete("Dump"), "dump"),
            Err(ValidationError::NameMismatch {
                declared: "Dump".into(),
                expected: "dump".into()
            })
        );
    }

    #[test]
    fn test_each_missing_field() {
        let mut d = complete("x");
        d.name = None;
        assert_eq!(validate(&d, "x"), Err(ValidationError::MissingName));

        let mut d = complete("x");
        d.description = None;
        assert_eq!(validate(&d, "x"), Err(ValidationError::MissingDescription));

        let mut d = complete("x");
        d.category = Some("enumeration".into());
        assert_eq!(
            validate(&d, "x"),
            Err(ValidationError::InvalidCategory("enumeration".into()))
        );

        let mut d = complete("x");
        d.supported_protocols = None;
        assert_eq!(validate(&d, "x"), Err(ValidationError::MissingSupportedProtocols));

        let mut d = complete("x");
        d.entrypoints.options = false;
        assert_eq!(validate(&d, "x"), Err(ValidationError::MissingOptions));

        let mut d = complete("x");
        d.entrypoints.on_admin_login = false;
        assert_eq!(validate(&d, "x"), Err(ValidationError::MissingLoginHook));
    }

    #[test]
    fn test_declared_but_empty_values_are_accepted() {
        let mut d = complete("x").description("");
        d.supported_protocols = Some(Vec::new());

        let descriptor = validate(&d, "x").unwrap();
        assert_eq!(descriptor.description, "");
        assert!(descriptor.supported_protocols.is_empty());
        assert!(!descriptor.supports("smb"));
    }

    #[test]
    fn test_first_failing_rule_wins() {
        let d = ExtensionDeclaration {
            name: Some("x".into()),
            ..Default::default()
        };
        assert_eq!(validate(&d, "x"), Err(ValidationError::MissingDescription));
    }

    #[test]
    fn test_login_only_is_low_privilege() {
        let mut d = complete("x");
        d.entrypoints.on_admin_login = false;
        d.entrypoints.on_login = true;
        assert!(!validate(&d, "x").unwrap().requires_elevated_access);
    }
}
