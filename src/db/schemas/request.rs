//! Request (ticketing) document schema
//!
//! Typed requests from researchers to the administration. The comment
//! thread is append-only; resolution stamps are set only by the
//! administrator who resolves the request.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for requests
pub const REQUEST_COLLECTION: &str = "requests";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestType {
    #[serde(rename = "Aprobación")]
    Aprobacion,
    Recurso,
    Permiso,
    Otros,
}

impl RequestType {
    /// Approval and resource requests are meaningless without a project.
    pub fn requires_project(&self) -> bool {
        matches!(self, RequestType::Aprobacion | RequestType::Recurso)
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestType::Aprobacion => "Aprobación",
            RequestType::Recurso => "Recurso",
            RequestType::Permiso => "Permiso",
            RequestType::Otros => "Otros",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestStatus {
    Pendiente,
    Aprobada,
    Rechazada,
    #[serde(rename = "En Proceso")]
    EnProceso,
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestStatus::Pendiente => "Pendiente",
            RequestStatus::Aprobada => "Aprobada",
            RequestStatus::Rechazada => "Rechazada",
            RequestStatus::EnProceso => "En Proceso",
        };
        write!(f, "{}", name)
    }
}

/// One entry of the append-only comment thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestComment {
    pub usuario: ObjectId,
    pub comentario: String,
    pub fecha: DateTime,
}

/// Request document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RequestDoc {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    /// The user who filed the request
    pub solicitante: ObjectId,

    pub tipo_solicitud: RequestType,
    pub descripcion: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub proyecto: Option<ObjectId>,

    pub estado: RequestStatus,

    #[serde(default)]
    pub comentarios: Vec<RequestComment>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub revisado_por: Option<ObjectId>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub fecha_resolucion: Option<DateTime>,
}

impl RequestDoc {
    pub fn new(
        solicitante: ObjectId,
        tipo_solicitud: RequestType,
        descripcion: String,
        proyecto: Option<ObjectId>,
    ) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            solicitante,
            tipo_solicitud,
            descripcion,
            proyecto,
            estado: RequestStatus::Pendiente,
            comentarios: Vec::new(),
            revisado_por: None,
            fecha_resolucion: None,
        }
    }

    pub fn is_solicitante(&self, user_id: &ObjectId) -> bool {
        self.solicitante == *user_id
    }

    pub fn view_json(&self) -> Value {
        json!({
            "id": self._id.map(|id| id.to_hex()).unwrap_or_default(),
            "solicitante": self.solicitante.to_hex(),
            "tipoSolicitud": self.tipo_solicitud.to_string(),
            "descripcion": self.descripcion,
            "proyecto": self.proyecto.map(|id| id.to_hex()),
            "estado": self.estado.to_string(),
            "comentarios": self.comentarios.iter().map(|c| json!({
                "usuario": c.usuario.to_hex(),
                "comentario": c.comentario,
                "fecha": c.fecha.try_to_rfc3339_string().unwrap_or_default(),
            })).collect::<Vec<_>>(),
            "revisadoPor": self.revisado_por.map(|id| id.to_hex()),
            "fechaResolucion": self.fecha_resolucion
                .and_then(|f| f.try_to_rfc3339_string().ok()),
            "isDeleted": self.metadata.is_deleted,
        })
    }
}

impl IntoIndexes for RequestDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "solicitante": 1 },
            Some(
                IndexOptions::builder()
                    .name("solicitante_index".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for RequestDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_requirement_by_type() {
        assert!(RequestType::Aprobacion.requires_project());
        assert!(RequestType::Recurso.requires_project());
        assert!(!RequestType::Permiso.requires_project());
        assert!(!RequestType::Otros.requires_project());
    }

    #[test]
    fn test_new_request_defaults() {
        let req = RequestDoc::new(
            ObjectId::new(),
            RequestType::Permiso,
            "Acceso al laboratorio".into(),
            None,
        );
        assert_eq!(req.estado, RequestStatus::Pendiente);
        assert!(req.comentarios.is_empty());
        assert!(req.revisado_por.is_none());
        assert!(req.fecha_resolucion.is_none());
    }

    #[test]
    fn test_estado_wire_format() {
        assert_eq!(
            serde_json::to_string(&RequestStatus::EnProceso).unwrap(),
            "\"En Proceso\""
        );
        assert_eq!(
            serde_json::to_string(&RequestType::Aprobacion).unwrap(),
            "\"Aprobación\""
        );
    }
}
