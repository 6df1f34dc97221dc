//! Text rendering of the extension catalogue

use crate::plugin::{ExtensionCategory, ExtensionDescriptor};
use std::collections::BTreeMap;
use std::fmt::Write;

pub const LOW_PRIVILEGE_HEADER: &str = "LOW PRIVILEGE MODULES";
pub const HIGH_PRIVILEGE_HEADER: &str = "HIGH PRIVILEGE MODULES";

/// Render every extension, split by whether it needs an admin session and
/// grouped by category within each half.
pub fn render_module_listing(modules: &BTreeMap<String, ExtensionDescriptor>) -> String {
    let mut out = String::new();
    for (header, elevated) in [(LOW_PRIVILEGE_HEADER, false), (HIGH_PRIVILEGE_HEADER, true)] {
        if !out.is_empty() {
            out.push('\n');
        }
        let _ = writeln!(out, "{}", header);

        for category in ExtensionCategory::ALL {
            let mut entries = modules
                .values()
                .filter(|m| m.requires_elevated_access == elevated && m.category == category)
                .peekable();
            if entries.peek().is_none() {
                continue;
            }

            let _ = writeln!(out, "{}", category.as_str().to_uppercase());
            for module in entries {
                let _ = writeln!(out, "[*] {:<24} {}", module.name, module.description);
                for line in module.options_doc.lines().filter(|l| !l.trim().is_empty()) {
                    let _ = writeln!(out, "    {}", line.trim());
                }
            }
        }
    }
    out
}

/// Options help for one extension.
pub fn render_module_options(module: &ExtensionDescriptor) -> String {
    let doc = module.options_doc.trim();
    if doc.is_empty() {
        return format!("{} module options:\n    (none)\n", module.name);
    }

    let mut out = format!("{} module options:\n", module.name);
    for line in doc.lines() {
        let _ = writeln!(out, "    {}", line.trim());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(name: &str, category: ExtensionCategory, elevated: bool) -> ExtensionDescriptor {
        ExtensionDescriptor {
            name: name.to_string(),
            description: format!("{} description", name),
            category,
            supported_protocols: ["smb".to_string()].into_iter().collect(),
            requires_elevated_access: elevated,
            options_doc: "USER  account to target\n".to_string(),
        }
    }

    #[test]
    fn test_listing_partitions_by_privilege() {
        let modules: BTreeMap<_, _> = [
            module("shares", ExtensionCategory::Enumeration, false),
            module("lsassy", ExtensionCategory::CredentialDumping, true),
            module("users", ExtensionCategory::Enumeration, true),
        ]
        .into_iter()
        .map(|m| (m.name.clone(), m))
        .collect();

        let listing = render_module_listing(&modules);
        let (low, high) = listing.split_once(HIGH_PRIVILEGE_HEADER).unwrap();

        assert!(low.starts_with(LOW_PRIVILEGE_HEADER));
        assert!(low.contains("shares"));
        assert!(!low.contains("lsassy"));
        assert!(high.contains("ENUMERATION\n[*] users"));
        assert!(high.contains("CREDENTIAL DUMPING\n[*] lsassy"));
        assert!(high.contains("    USER  account to target"));
        assert!(!high.contains("PRIVILEGE ESCALATION"));
    }

    #[test]
    fn test_empty_listing_keeps_headers() {
        let listing = render_module_listing(&BTreeMap::new());
        assert_eq!(
            listing,
            format!("{}\n\n{}\n", LOW_PRIVILEGE_HEADER, HIGH_PRIVILEGE_HEADER)
        );
    }

    #[test]
    fn test_options_rendering() {
        let mut m = module("shares", ExtensionCategory::Enumeration, false);
        assert_eq!(
            render_module_options(&m),
            "shares module options:\n    USER  account to target\n"
        );
        m.options_doc.clear();
        assert!(render_module_options(&m).contains("(none)"));
    }
}
