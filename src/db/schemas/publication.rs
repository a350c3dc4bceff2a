//! Publication document schema
//!
//! A publication always belongs to a project; its author list is a
//! snapshot of the project roster taken at creation time.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for publications
pub const PUBLICATION_COLLECTION: &str = "publications";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PublicationType {
    Articulo,
    Informe,
    Tesis,
    Presentacion,
    Otro,
}

impl fmt::Display for PublicationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PublicationType::Articulo => "Articulo",
            PublicationType::Informe => "Informe",
            PublicationType::Tesis => "Tesis",
            PublicationType::Presentacion => "Presentacion",
            PublicationType::Otro => "Otro",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PublicationStatus {
    Borrador,
    Revisado,
    Publicado,
}

impl PublicationStatus {
    /// Once reviewed or published, autores and proyecto freeze for
    /// non-administrators.
    pub fn locks_provenance(&self) -> bool {
        matches!(self, PublicationStatus::Revisado | PublicationStatus::Publicado)
    }
}

impl fmt::Display for PublicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PublicationStatus::Borrador => "Borrador",
            PublicationStatus::Revisado => "Revisado",
            PublicationStatus::Publicado => "Publicado",
        };
        write!(f, "{}", name)
    }
}

/// Publication document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PublicationDoc {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    pub titulo: String,
    pub fecha: DateTime,
    pub proyecto: ObjectId,
    pub revista: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resumen: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub palabras_clave: Option<String>,

    pub tipo_publicacion: PublicationType,
    pub estado: PublicationStatus,

    /// Blob references to attached files
    #[serde(default)]
    pub anexos: Vec<String>,

    pub idioma: String,

    /// Snapshot of the project roster at creation time
    pub autores: Vec<ObjectId>,
}

impl PublicationDoc {
    pub fn is_autor(&self, user_id: &ObjectId) -> bool {
        self.autores.contains(user_id)
    }

    pub fn view_json(&self) -> Value {
        json!({
            "id": self._id.map(|id| id.to_hex()).unwrap_or_default(),
            "titulo": self.titulo,
            "fecha": self.fecha.try_to_rfc3339_string().unwrap_or_default(),
            "proyecto": self.proyecto.to_hex(),
            "revista": self.revista,
            "resumen": self.resumen,
            "palabrasClave": self.palabras_clave,
            "tipoPublicacion": self.tipo_publicacion.to_string(),
            "estado": self.estado.to_string(),
            "anexos": self.anexos,
            "idioma": self.idioma,
            "autores": self.autores.iter().map(|id| id.to_hex()).collect::<Vec<_>>(),
            "isDeleted": self.metadata.is_deleted,
        })
    }
}

impl IntoIndexes for PublicationDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "proyecto": 1 },
                Some(
                    IndexOptions::builder()
                        .name("proyecto_index".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "autores": 1 },
                Some(
                    IndexOptions::builder()
                        .name("autores_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for PublicationDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provenance_lock() {
        assert!(!PublicationStatus::Borrador.locks_provenance());
        assert!(PublicationStatus::Revisado.locks_provenance());
        assert!(PublicationStatus::Publicado.locks_provenance());
    }

    #[test]
    fn test_tipo_wire_format() {
        assert_eq!(
            serde_json::to_string(&PublicationType::Articulo).unwrap(),
            "\"Articulo\""
        );
        assert!(serde_json::from_str::<PublicationType>("\"Novela\"").is_err());
    }
}
