//! Role and ownership authorization policy
//!
//! Every mutation is gated here before the owning service runs its
//! entity-specific checks. The table is built once at startup and injected
//! through `AppState`; services never consult module-level globals.
//!
//! Two gate shapes recur across the system:
//! - role-gate: the operation is restricted to a fixed role set
//! - ownership-gate: the actor must be a participant of the resource
//!   (project investigator, publication author, request solicitante, or the
//!   evaluation's own evaluator)
//!
//! Existence is always checked before authorization, so a caller can only
//! learn "not found" when the resource truly does not exist.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// User roles. A closed set: the system defines no dynamic permission
/// groups, so a reference collection would add a dangling-reference hazard
/// for nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Administrador,
    Investigador,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Administrador => write!(f, "Administrador"),
            Role::Investigador => write!(f, "Investigador"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Administrador" => Ok(Role::Administrador),
            "Investigador" => Ok(Role::Investigador),
            other => Err(format!("Rol desconocido: {}", other)),
        }
    }
}

/// How participation interacts with the role set for an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// Role membership alone decides.
    RoleOnly,
    /// Participants pass regardless of role; otherwise the role set decides.
    ParticipantOverride,
    /// The actor must hold a listed role AND be the participant.
    ParticipantRequired,
}

/// Gated operations across all resource services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ProjectCreate,
    ProjectUpdate,
    ProjectDelete,
    /// Deleting a project whose estado is Finalizado or Cancelado.
    ProjectDeleteTerminal,
    ProjectRestore,
    EvaluationCreate,
    /// Update, delete and restore share the self-authorship rule.
    EvaluationMutate,
    /// The unscoped evaluation listing.
    EvaluationList,
    PublicationCreate,
    PublicationUpdate,
    /// Setting estado = Publicado, at creation or by update.
    PublicationPublish,
    PublicationDelete,
    /// Deleting a publication already in estado Publicado.
    PublicationDeletePublished,
    PublicationRestore,
    RequestCreate,
    /// Changing estado / stamping revisadoPor and fechaResolucion.
    RequestResolve,
    RequestComment,
    RequestDelete,
    RequestRestore,
    /// Reading a request the actor did not create.
    RequestReadOther,
    UserAdminister,
    ReportGlobal,
    ReportOwn,
}

#[derive(Debug, Clone)]
struct Rule {
    roles: &'static [Role],
    ownership: Ownership,
}

/// Immutable operation table, built once at startup.
#[derive(Debug, Clone)]
pub struct PolicyTable {
    rules: HashMap<Operation, Rule>,
}

use Operation::*;
use Ownership::*;
use Role::*;

const ADMIN: &[Role] = &[Administrador];
const ANY: &[Role] = &[Administrador, Investigador];

impl PolicyTable {
    /// The standard institutional policy.
    pub fn standard() -> Self {
        let entries: &[(Operation, &'static [Role], Ownership)] = &[
            (ProjectCreate, ANY, RoleOnly),
            (ProjectUpdate, ADMIN, ParticipantOverride),
            (ProjectDelete, ADMIN, ParticipantOverride),
            (ProjectDeleteTerminal, ADMIN, RoleOnly),
            (ProjectRestore, ADMIN, RoleOnly),
            (EvaluationCreate, ADMIN, RoleOnly),
            (EvaluationMutate, ADMIN, ParticipantRequired),
            (EvaluationList, ADMIN, RoleOnly),
            (PublicationCreate, ADMIN, ParticipantOverride),
            (PublicationUpdate, ADMIN, ParticipantOverride),
            (PublicationPublish, ADMIN, RoleOnly),
            (PublicationDelete, ADMIN, ParticipantOverride),
            (PublicationDeletePublished, ADMIN, RoleOnly),
            (PublicationRestore, ADMIN, RoleOnly),
            (RequestCreate, ANY, RoleOnly),
            (RequestResolve, ADMIN, RoleOnly),
            (RequestComment, ADMIN, ParticipantOverride),
            (RequestDelete, ADMIN, ParticipantOverride),
            (RequestRestore, ADMIN, RoleOnly),
            (RequestReadOther, ADMIN, RoleOnly),
            (UserAdminister, ADMIN, RoleOnly),
            (ReportGlobal, ADMIN, RoleOnly),
            (ReportOwn, ANY, RoleOnly),
        ];

        let rules = entries
            .iter()
            .map(|(op, roles, ownership)| {
                (
                    *op,
                    Rule {
                        roles,
                        ownership: *ownership,
                    },
                )
            })
            .collect();

        Self { rules }
    }

    /// Evaluate the gate for an operation. Unknown operations are denied.
    pub fn allows(&self, role: Role, is_participant: bool, op: Operation) -> bool {
        let Some(rule) = self.rules.get(&op) else {
            return false;
        };

        let role_ok = rule.roles.contains(&role);
        match rule.ownership {
            RoleOnly => role_ok,
            ParticipantOverride => is_participant || role_ok,
            ParticipantRequired => role_ok && is_participant,
        }
    }
}

/// Convenience wrapper matching the policy signature used by services.
pub fn can_perform(table: &PolicyTable, role: Role, is_participant: bool, op: Operation) -> bool {
    table.allows(role, is_participant, op)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> PolicyTable {
        PolicyTable::standard()
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("Administrador".parse::<Role>().unwrap(), Administrador);
        assert_eq!("Investigador".parse::<Role>().unwrap(), Investigador);
        assert!("Becario".parse::<Role>().is_err());
    }

    #[test]
    fn test_project_gates() {
        let t = table();
        // Any role may create.
        assert!(t.allows(Investigador, false, ProjectCreate));
        assert!(t.allows(Administrador, false, ProjectCreate));

        // Update/delete: member or admin.
        assert!(t.allows(Investigador, true, ProjectUpdate));
        assert!(!t.allows(Investigador, false, ProjectUpdate));
        assert!(t.allows(Administrador, false, ProjectUpdate));

        // Terminal-state delete and restore are admin-only, membership is
        // irrelevant.
        assert!(!t.allows(Investigador, true, ProjectDeleteTerminal));
        assert!(t.allows(Administrador, false, ProjectDeleteTerminal));
        assert!(!t.allows(Investigador, true, ProjectRestore));
        assert!(t.allows(Administrador, false, ProjectRestore));
    }

    #[test]
    fn test_evaluation_self_authorship() {
        let t = table();
        // Creation is a pure role gate.
        assert!(t.allows(Administrador, false, EvaluationCreate));
        assert!(!t.allows(Investigador, false, EvaluationCreate));

        // Mutation needs the role AND authorship: an administrator who is
        // not the evaluator is denied.
        assert!(t.allows(Administrador, true, EvaluationMutate));
        assert!(!t.allows(Administrador, false, EvaluationMutate));
        assert!(!t.allows(Investigador, true, EvaluationMutate));
    }

    #[test]
    fn test_publication_gates() {
        let t = table();
        assert!(t.allows(Investigador, true, PublicationUpdate));
        assert!(!t.allows(Investigador, false, PublicationUpdate));
        assert!(t.allows(Administrador, false, PublicationUpdate));

        // Publishing is admin-only even for authors.
        assert!(!t.allows(Investigador, true, PublicationPublish));
        assert!(t.allows(Administrador, false, PublicationPublish));

        // Deleting a published publication is admin-only.
        assert!(!t.allows(Investigador, true, PublicationDeletePublished));
        assert!(t.allows(Administrador, false, PublicationDeletePublished));
    }

    #[test]
    fn test_request_gates() {
        let t = table();
        assert!(t.allows(Investigador, false, RequestCreate));
        assert!(!t.allows(Investigador, true, RequestResolve));
        assert!(t.allows(Administrador, false, RequestResolve));

        // Any authorized viewer may comment; viewing another's request is
        // admin-only.
        assert!(t.allows(Investigador, true, RequestComment));
        assert!(!t.allows(Investigador, false, RequestReadOther));
        assert!(t.allows(Administrador, false, RequestReadOther));
    }

    #[test]
    fn test_report_scopes() {
        let t = table();
        assert!(!t.allows(Investigador, false, ReportGlobal));
        assert!(t.allows(Administrador, false, ReportGlobal));
        assert!(t.allows(Investigador, false, ReportOwn));
    }

    #[test]
    fn test_user_administration() {
        let t = table();
        assert!(!t.allows(Investigador, true, UserAdminister));
        assert!(t.allows(Administrador, false, UserAdminister));
    }
}
