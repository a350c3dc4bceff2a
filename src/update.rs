//! Per-entity update schemas
//!
//! Each mutable entity declares the fields a PATCH may touch and what to do
//! with keys outside that set. Project updates silently drop unknown keys
//! while publication updates reject the whole patch; the asymmetry is part
//! of the API contract and lives here, not in the services.

use serde_json::{Map, Value};

use crate::types::{ClaustroError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnknownFieldPolicy {
    /// Drop unknown keys and apply the rest.
    Ignore,
    /// Any unknown key fails the whole update.
    Reject,
}

#[derive(Debug, Clone)]
pub struct UpdateSchema {
    pub allowed: &'static [&'static str],
    pub on_unknown: UnknownFieldPolicy,
}

impl UpdateSchema {
    /// Screen a patch against this schema. Returns the allowed keys that
    /// are actually present, in schema order.
    pub fn screen(&self, patch: &Map<String, Value>) -> Result<Vec<&'static str>> {
        if self.on_unknown == UnknownFieldPolicy::Reject {
            let unknown: Vec<&String> = patch
                .keys()
                .filter(|k| !self.allowed.contains(&k.as_str()))
                .collect();
            if !unknown.is_empty() {
                return Err(ClaustroError::BadRequest(
                    "Intento de actualización no válido.".into(),
                ));
            }
        }

        Ok(self
            .allowed
            .iter()
            .filter(|k| patch.contains_key(**k))
            .copied()
            .collect())
    }
}

/// Project PATCH whitelist; unknown keys are ignored.
pub const PROJECT_UPDATE: UpdateSchema = UpdateSchema {
    allowed: &[
        "nombre",
        "descripcion",
        "objetivos",
        "presupuesto",
        "cronograma",
        "hitos",
        "investigadores",
        "recursos",
        "estado",
        "imagen",
    ],
    on_unknown: UnknownFieldPolicy::Ignore,
};

/// Publication PATCH whitelist; unknown keys reject the update.
pub const PUBLICATION_UPDATE: UpdateSchema = UpdateSchema {
    allowed: &[
        "titulo",
        "fecha",
        "proyecto",
        "revista",
        "resumen",
        "palabrasClave",
        "tipoPublicacion",
        "estado",
        "anexos",
        "idioma",
        "autores",
    ],
    on_unknown: UnknownFieldPolicy::Reject,
};

/// Fields a user may change on their own profile; unknown keys ignored.
pub const USER_SELF_UPDATE: UpdateSchema = UpdateSchema {
    allowed: &[
        "nombre",
        "apellido",
        "email",
        "especializacion",
        "responsabilidades",
        "fotoPerfil",
    ],
    on_unknown: UnknownFieldPolicy::Ignore,
};

/// Fields an administrator may change on any user; adds role.
pub const USER_ADMIN_UPDATE: UpdateSchema = UpdateSchema {
    allowed: &[
        "nombre",
        "apellido",
        "email",
        "especializacion",
        "responsabilidades",
        "fotoPerfil",
        "role",
    ],
    on_unknown: UnknownFieldPolicy::Ignore,
};

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn patch(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_project_ignores_unknown_keys() {
        let p = patch(json!({
            "nombre": "Nuevo",
            "isEvaluated": true,
            "metadata": { "is_deleted": false }
        }));

        let keys = PROJECT_UPDATE.screen(&p).unwrap();
        assert_eq!(keys, vec!["nombre"]);
    }

    #[test]
    fn test_publication_rejects_unknown_keys() {
        let p = patch(json!({ "titulo": "Nuevo", "isDeleted": false }));
        assert!(PUBLICATION_UPDATE.screen(&p).is_err());

        let p = patch(json!({ "titulo": "Nuevo", "revista": "Nature" }));
        let keys = PUBLICATION_UPDATE.screen(&p).unwrap();
        assert_eq!(keys, vec!["titulo", "revista"]);
    }

    #[test]
    fn test_asymmetry_between_project_and_publication() {
        // The exact same stray key is dropped by one schema and fatal for
        // the other.
        let p = patch(json!({ "descripcion": "x", "extra": 1 }));
        assert!(PROJECT_UPDATE.screen(&p).is_ok());

        let p = patch(json!({ "resumen": "x", "extra": 1 }));
        assert!(PUBLICATION_UPDATE.screen(&p).is_err());
    }

    #[test]
    fn test_self_update_cannot_touch_role() {
        let p = patch(json!({ "role": "Administrador", "nombre": "Eva" }));
        let keys = USER_SELF_UPDATE.screen(&p).unwrap();
        assert_eq!(keys, vec!["nombre"]);

        let keys = USER_ADMIN_UPDATE.screen(&p).unwrap();
        assert_eq!(keys, vec!["nombre", "role"]);
    }

    #[test]
    fn test_empty_patch_is_empty() {
        let p = Map::new();
        assert!(PROJECT_UPDATE.screen(&p).unwrap().is_empty());
        assert!(PUBLICATION_UPDATE.screen(&p).unwrap().is_empty());
    }
}
