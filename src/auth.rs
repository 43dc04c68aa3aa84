//! Authorization Gate: the single role check consulted by every entry
//! point. Roles and actions are closed enums; request strings that do not
//! parse never get here (fail closed at the boundary).

use crate::models::{Action, DocumentKind, Role};

/// What the gate needs to know about the target record.
#[derive(Debug, Clone, Copy)]
pub struct ResourceScope {
    pub kind: DocumentKind,
    /// Issued invoice or finalized document.
    pub frozen: bool,
    /// Secondary confirmation carried by the caller; required for
    /// Operations to void.
    pub void_confirmed: bool,
}

impl ResourceScope {
    pub fn new(kind: DocumentKind, frozen: bool) -> Self {
        Self {
            kind,
            frozen,
            void_confirmed: false,
        }
    }

    pub fn with_void_confirmation(mut self, confirmed: bool) -> Self {
        self.void_confirmed = confirmed;
        self
    }
}

/// Outcome of an authorization check. `Deny` is ordinary control flow; it is
/// audited but never logged as an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(String),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Role/action matrix.
///
/// SuperAdmin: everything. Operations: view, generate and issue freely,
/// void only with the confirmation flag. Viewer: view of frozen records
/// only.
pub fn authorize(role: Role, action: Action, scope: ResourceScope) -> Decision {
    match (role, action) {
        (Role::SuperAdmin, _) => Decision::Allow,

        (Role::Operations, Action::View | Action::Generate | Action::Issue) => Decision::Allow,
        (Role::Operations, Action::Void) => {
            if scope.void_confirmed {
                Decision::Allow
            } else {
                Decision::Deny("void requires secondary confirmation".to_string())
            }
        }

        (Role::Viewer, Action::View) => {
            if scope.frozen {
                Decision::Allow
            } else {
                Decision::Deny("viewers may only view issued or finalized records".to_string())
            }
        }
        (Role::Viewer, Action::Generate | Action::Issue | Action::Void) => Decision::Deny(
            format!("viewers may not {action}"),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> ResourceScope {
        ResourceScope::new(DocumentKind::Invoice, true)
    }

    #[test]
    fn super_admin_allowed_everything() {
        for action in [Action::View, Action::Generate, Action::Issue, Action::Void] {
            assert!(authorize(Role::SuperAdmin, action, scope()).is_allowed());
        }
    }

    #[test]
    fn viewer_denied_mutating_actions() {
        for action in [Action::Generate, Action::Issue, Action::Void] {
            assert!(!authorize(Role::Viewer, action, scope()).is_allowed());
        }
        assert!(authorize(Role::Viewer, Action::View, scope()).is_allowed());
    }

    #[test]
    fn viewer_cannot_view_drafts() {
        let draft = ResourceScope::new(DocumentKind::Invoice, false);
        assert!(!authorize(Role::Viewer, Action::View, draft).is_allowed());
    }

    #[test]
    fn operations_void_needs_confirmation() {
        assert!(!authorize(Role::Operations, Action::Void, scope()).is_allowed());
        let confirmed = scope().with_void_confirmation(true);
        assert!(authorize(Role::Operations, Action::Void, confirmed).is_allowed());
    }

    #[test]
    fn unknown_role_fails_closed_at_parse() {
        assert!(Role::parse("intern").is_none());
        assert!(Action::parse("export").is_none());
    }
}
