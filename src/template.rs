//! Template Resolver: versioned, embedded template bundles.
//!
//! Each bundle is a markup template plus a print-only stylesheet, compiled
//! into the binary so rendering never touches the filesystem or network.
//! Versions are immutable: a new look is a new version directory, and
//! records keep reproducing against the version bound at issuance.

use crate::error::PipelineError;
use crate::models::DocumentKind;

#[derive(Debug, Clone, Copy)]
pub struct TemplateBundle {
    pub kind: DocumentKind,
    pub version: &'static str,
    pub markup: &'static str,
    pub stylesheet: &'static str,
}

// Ordered oldest to newest per kind; the newest is what issuance binds.
static BUNDLES: &[TemplateBundle] = &[
    TemplateBundle {
        kind: DocumentKind::Invoice,
        version: "v1",
        markup: include_str!("../templates/invoice/v1/template.html"),
        stylesheet: include_str!("../templates/invoice/v1/print.css"),
    },
    TemplateBundle {
        kind: DocumentKind::Invoice,
        version: "v2",
        markup: include_str!("../templates/invoice/v2/template.html"),
        stylesheet: include_str!("../templates/invoice/v2/print.css"),
    },
    TemplateBundle {
        kind: DocumentKind::Invoice,
        version: "v3",
        markup: include_str!("../templates/invoice/v3/template.html"),
        stylesheet: include_str!("../templates/invoice/v3/print.css"),
    },
    TemplateBundle {
        kind: DocumentKind::Letterhead,
        version: "v1",
        markup: include_str!("../templates/letterhead/v1/template.html"),
        stylesheet: include_str!("../templates/letterhead/v1/print.css"),
    },
];

/// Look up the exact bundle bound to a record. A missing version is a
/// data-integrity fault for the operator; there is never a fallback to
/// another version, which would break reproducibility.
pub fn resolve(
    kind: DocumentKind,
    version: &str,
) -> Result<&'static TemplateBundle, PipelineError> {
    BUNDLES
        .iter()
        .find(|b| b.kind == kind && b.version == version)
        .ok_or_else(|| PipelineError::TemplateNotFound {
            kind,
            version: version.to_string(),
        })
}

/// Newest version for a kind, bound at issuance/finalization. A kind with
/// no bundle at all fails closed.
pub fn current_version(kind: DocumentKind) -> Result<&'static str, PipelineError> {
    BUNDLES
        .iter()
        .rev()
        .find(|b| b.kind == kind)
        .map(|b| b.version)
        .ok_or_else(|| PipelineError::TemplateNotFound {
            kind,
            version: "none".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_bound_versions() {
        for version in ["v1", "v2", "v3"] {
            let bundle = resolve(DocumentKind::Invoice, version).unwrap();
            assert_eq!(bundle.version, version);
            assert!(!bundle.markup.is_empty());
            assert!(!bundle.stylesheet.is_empty());
        }
    }

    #[test]
    fn removed_version_is_an_integrity_fault() {
        let err = resolve(DocumentKind::Invoice, "v9").unwrap_err();
        assert!(matches!(
            err,
            PipelineError::TemplateNotFound { kind: DocumentKind::Invoice, ref version } if version == "v9"
        ));
    }

    #[test]
    fn current_version_is_newest() {
        assert_eq!(current_version(DocumentKind::Invoice).unwrap(), "v3");
        assert_eq!(current_version(DocumentKind::Letterhead).unwrap(), "v1");
    }

    #[test]
    fn bundles_carry_no_remote_references() {
        for bundle in BUNDLES {
            assert!(!bundle.markup.contains("http://"));
            assert!(!bundle.markup.contains("https://"));
            assert!(!bundle.markup.contains("<script"));
        }
    }
}
