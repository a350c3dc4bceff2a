//! Project document schema
//!
//! A research project with its timeline, milestone list and investigator
//! roster. `nombre` is unique among non-deleted projects; the partial
//! unique index is the authoritative guard behind the service check.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for projects
pub const PROJECT_COLLECTION: &str = "projects";

/// Project lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectStatus {
    Planeado,
    #[serde(rename = "En Proceso")]
    EnProceso,
    Finalizado,
    Cancelado,
}

impl ProjectStatus {
    /// Terminal states may only be soft-deleted by an Administrador.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProjectStatus::Finalizado | ProjectStatus::Cancelado)
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectStatus::Planeado => write!(f, "Planeado"),
            ProjectStatus::EnProceso => write!(f, "En Proceso"),
            ProjectStatus::Finalizado => write!(f, "Finalizado"),
            ProjectStatus::Cancelado => write!(f, "Cancelado"),
        }
    }
}

/// Project timeline; both dates are required
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cronograma {
    pub fecha_inicio: DateTime,
    pub fecha_fin: DateTime,
}

/// Project milestone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hito {
    pub nombre: String,
    pub fecha: DateTime,
    #[serde(default)]
    pub entregables: Vec<String>,
}

/// Project document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDoc {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    pub nombre: String,
    pub descripcion: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub objetivos: Option<String>,

    pub presupuesto: f64,
    pub cronograma: Cronograma,

    /// Participating researchers; the creator is always a member
    pub investigadores: Vec<ObjectId>,

    #[serde(default)]
    pub recursos: Vec<String>,

    /// Milestones; at least one, each with nombre and fecha
    pub hitos: Vec<Hito>,

    /// Blob reference to the project image
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imagen: Option<String>,

    pub estado: ProjectStatus,

    /// One-way flag, set when the project receives its first evaluation
    #[serde(default)]
    pub is_evaluated: bool,
}

impl ProjectDoc {
    pub fn is_investigador(&self, user_id: &ObjectId) -> bool {
        self.investigadores.contains(user_id)
    }

    /// Response-facing projection with hex ids
    pub fn view_json(&self) -> Value {
        json!({
            "id": self._id.map(|id| id.to_hex()).unwrap_or_default(),
            "nombre": self.nombre,
            "descripcion": self.descripcion,
            "objetivos": self.objetivos,
            "presupuesto": self.presupuesto,
            "cronograma": {
                "fechaInicio": self.cronograma.fecha_inicio.try_to_rfc3339_string().unwrap_or_default(),
                "fechaFin": self.cronograma.fecha_fin.try_to_rfc3339_string().unwrap_or_default(),
            },
            "investigadores": self.investigadores.iter().map(|id| id.to_hex()).collect::<Vec<_>>(),
            "recursos": self.recursos,
            "hitos": self.hitos.iter().map(|h| json!({
                "nombre": h.nombre,
                "fecha": h.fecha.try_to_rfc3339_string().unwrap_or_default(),
                "entregables": h.entregables,
            })).collect::<Vec<_>>(),
            "imagen": self.imagen,
            "estado": self.estado.to_string(),
            "isEvaluated": self.is_evaluated,
            "isDeleted": self.metadata.is_deleted,
        })
    }
}

impl IntoIndexes for ProjectDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // Uniqueness among active projects only; deleted rows keep their
            // name without blocking reuse.
            (
                doc! { "nombre": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .partial_filter_expression(doc! { "metadata.is_deleted": false })
                        .name("nombre_unique_active".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "investigadores": 1 },
                Some(
                    IndexOptions::builder()
                        .name("investigadores_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for ProjectDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!ProjectStatus::Planeado.is_terminal());
        assert!(!ProjectStatus::EnProceso.is_terminal());
        assert!(ProjectStatus::Finalizado.is_terminal());
        assert!(ProjectStatus::Cancelado.is_terminal());
    }

    #[test]
    fn test_estado_wire_format() {
        assert_eq!(
            serde_json::to_string(&ProjectStatus::EnProceso).unwrap(),
            "\"En Proceso\""
        );
        assert_eq!(
            serde_json::from_str::<ProjectStatus>("\"Planeado\"").unwrap(),
            ProjectStatus::Planeado
        );
        assert!(serde_json::from_str::<ProjectStatus>("\"Suspendido\"").is_err());
    }

    #[test]
    fn test_membership() {
        let member = ObjectId::new();
        let outsider = ObjectId::new();
        let project = ProjectDoc {
            _id: Some(ObjectId::new()),
            metadata: Metadata::new(),
            nombre: "Genoma".into(),
            descripcion: "desc".into(),
            objetivos: None,
            presupuesto: 1000.0,
            cronograma: Cronograma {
                fecha_inicio: DateTime::now(),
                fecha_fin: DateTime::now(),
            },
            investigadores: vec![member],
            recursos: vec![],
            hitos: vec![],
            imagen: None,
            estado: ProjectStatus::Planeado,
            is_evaluated: false,
        };

        assert!(project.is_investigador(&member));
        assert!(!project.is_investigador(&outsider));
    }
}
