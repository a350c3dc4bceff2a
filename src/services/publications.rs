//! Publication service
//!
//! Publications inherit their author list from the owning project's roster
//! at creation time. Once a publication reaches Revisado or Publicado its
//! provenance (autores, proyecto) freezes for non-administrators, and only
//! an administrator may move it to Publicado at all. Unlike projects, a
//! publication PATCH with unknown keys fails outright.

use bson::{doc, oid::ObjectId, Document};
use chrono::{DateTime as ChronoDateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::auth::{Operation, PolicyTable, Role};
use crate::db::schemas::{
    ProjectDoc, PublicationDoc, PublicationStatus, PublicationType, PROJECT_COLLECTION,
    PUBLICATION_COLLECTION,
};
use crate::db::{MongoClient, MongoCollection, Page};
use crate::types::{ClaustroError, Result};
use crate::update::PUBLICATION_UPDATE;

/// Creation payload; required fields are optional here so their absence is
/// a validation failure with the contract's message, not a parse failure.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPublication {
    #[serde(default)]
    pub titulo: Option<String>,
    #[serde(default)]
    pub fecha: Option<ChronoDateTime<Utc>>,
    #[serde(default)]
    pub proyecto: Option<String>,
    #[serde(default)]
    pub revista: Option<String>,
    #[serde(default)]
    pub resumen: Option<String>,
    #[serde(default)]
    pub palabras_clave: Option<String>,
    #[serde(default)]
    pub tipo_publicacion: Option<String>,
    #[serde(default)]
    pub estado: Option<String>,
    #[serde(default)]
    pub anexos: Vec<String>,
    #[serde(default)]
    pub idioma: Option<String>,
}

/// The validated core of a creation payload
#[derive(Debug)]
pub struct ValidatedPublication {
    pub titulo: String,
    pub fecha: bson::DateTime,
    pub proyecto: ObjectId,
    pub revista: String,
    pub tipo_publicacion: PublicationType,
    pub estado: PublicationStatus,
    pub idioma: String,
}

pub struct PublicationService {
    mongo: MongoClient,
    policy: Arc<PolicyTable>,
}

impl PublicationService {
    pub fn new(mongo: MongoClient, policy: Arc<PolicyTable>) -> Self {
        Self { mongo, policy }
    }

    async fn publications(&self) -> Result<MongoCollection<PublicationDoc>> {
        self.mongo
            .collection::<PublicationDoc>(PUBLICATION_COLLECTION)
            .await
    }

    async fn projects(&self) -> Result<MongoCollection<ProjectDoc>> {
        self.mongo.collection::<ProjectDoc>(PROJECT_COLLECTION).await
    }

    pub async fn create(
        &self,
        data: NewPublication,
        actor: ObjectId,
        actor_role: Role,
    ) -> Result<PublicationDoc> {
        let validated = validate_new_publication(&data)?;

        let projects = self.projects().await?;
        let project = projects
            .find_one(doc! { "_id": validated.proyecto })
            .await?
            .ok_or_else(|| ClaustroError::NotFound("Proyecto no encontrado.".into()))?;

        let is_member = project.is_investigador(&actor);
        if !self
            .policy
            .allows(actor_role, is_member, Operation::PublicationCreate)
        {
            return Err(ClaustroError::Forbidden(
                "No tienes permiso para crear publicaciones en este proyecto.".into(),
            ));
        }

        if validated.estado == PublicationStatus::Publicado
            && !self
                .policy
                .allows(actor_role, false, Operation::PublicationPublish)
        {
            return Err(ClaustroError::Forbidden(
                "Solo un administrador puede establecer el estado como \"Publicado\".".into(),
            ));
        }

        // The author list is always the roster snapshot, never caller input.
        let autores = project.investigadores.clone();

        let mut publication = PublicationDoc {
            _id: None,
            metadata: Default::default(),
            titulo: validated.titulo,
            fecha: validated.fecha,
            proyecto: validated.proyecto,
            revista: validated.revista,
            resumen: data.resumen,
            palabras_clave: data.palabras_clave,
            tipo_publicacion: validated.tipo_publicacion,
            estado: validated.estado,
            anexos: data.anexos,
            idioma: validated.idioma,
            autores,
        };

        let publications = self.publications().await?;
        let id = publications.insert_one(publication.clone()).await?;
        publication._id = Some(id);
        Ok(publication)
    }

    pub async fn update(
        &self,
        id: ObjectId,
        patch: Map<String, Value>,
        actor: ObjectId,
        actor_role: Role,
    ) -> Result<PublicationDoc> {
        let publications = self.publications().await?;
        let mut publication = publications
            .find_one(doc! { "_id": id })
            .await?
            .ok_or_else(|| ClaustroError::NotFound("Publicación no encontrada.".into()))?;

        let is_author = publication.is_autor(&actor);
        if !self
            .policy
            .allows(actor_role, is_author, Operation::PublicationUpdate)
        {
            return Err(ClaustroError::Forbidden(
                "No tienes permiso para actualizar esta publicación.".into(),
            ));
        }

        // Unknown keys reject the whole patch before anything else runs.
        let keys = PUBLICATION_UPDATE.screen(&patch)?;

        let is_admin = self
            .policy
            .allows(actor_role, false, Operation::PublicationPublish);

        if provenance_locked(&keys, publication.estado, is_admin) {
            return Err(ClaustroError::BadRequest(
                "No puedes cambiar autores o el proyecto de una publicación revisada o publicada."
                    .into(),
            ));
        }

        // Resolve the effective project: the patched one if present.
        let target_project = if keys.contains(&"proyecto") {
            let new_id = object_id_field(&patch["proyecto"], "proyecto")?;
            let projects = self.projects().await?;
            let project = projects
                .find_one(doc! { "_id": new_id })
                .await?
                .ok_or_else(|| {
                    ClaustroError::NotFound("El proyecto especificado no existe.".into())
                })?;

            if !is_admin && !project.is_investigador(&actor) {
                return Err(ClaustroError::Forbidden(
                    "No tienes permiso para asignar esta publicación a un proyecto en el que no participas."
                        .into(),
                ));
            }
            Some(project)
        } else {
            None
        };

        // Caller-supplied autores must all belong to the effective project.
        let requested_autores = if keys.contains(&"autores") {
            let autores = object_id_list(&patch["autores"], "autores")?;
            let roster: Vec<ObjectId> = match &target_project {
                Some(project) => project.investigadores.clone(),
                None => {
                    let projects = self.projects().await?;
                    projects
                        .find_one(doc! { "_id": publication.proyecto })
                        .await?
                        .map(|p| p.investigadores)
                        .unwrap_or_default()
                }
            };

            let invalid = invalid_autores(&autores, &roster);
            if !invalid.is_empty() {
                let listed = invalid
                    .iter()
                    .map(|id| id.to_hex())
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(ClaustroError::BadRequest(format!(
                    "Algunos autores no pertenecen al proyecto especificado: {}",
                    listed
                )));
            }
            Some(autores)
        } else {
            None
        };

        if let Some(estado) = patch.get("estado") {
            let estado: PublicationStatus = serde_json::from_value(estado.clone())
                .map_err(|_| ClaustroError::BadRequest("Estado de publicación inválido.".into()))?;
            if estado == PublicationStatus::Publicado
                && !self
                    .policy
                    .allows(actor_role, false, Operation::PublicationPublish)
            {
                return Err(ClaustroError::Forbidden(
                    "Solo un administrador puede publicar esta publicación.".into(),
                ));
            }
        }

        apply_publication_patch(&mut publication, &keys, &patch)?;
        if let Some(project) = target_project {
            publication.proyecto = project._id.unwrap_or(publication.proyecto);
        }
        if let Some(autores) = requested_autores {
            publication.autores = autores;
        }

        publications.replace_one(id, publication.clone()).await?;
        Ok(publication)
    }

    pub async fn delete(&self, id: ObjectId, actor: ObjectId, actor_role: Role) -> Result<()> {
        let publications = self.publications().await?;
        let publication = publications
            .find_one(doc! { "_id": id })
            .await?
            .ok_or_else(|| ClaustroError::NotFound("Publicación no encontrada.".into()))?;

        let is_author = publication.is_autor(&actor);
        if !self
            .policy
            .allows(actor_role, is_author, Operation::PublicationDelete)
        {
            return Err(ClaustroError::Forbidden(
                "No tienes permiso para eliminar esta publicación.".into(),
            ));
        }

        if publication.estado == PublicationStatus::Publicado
            && !self
                .policy
                .allows(actor_role, is_author, Operation::PublicationDeletePublished)
        {
            return Err(ClaustroError::BadRequest(
                "No puedes eliminar una publicación que ya ha sido publicada.".into(),
            ));
        }

        publications.soft_delete(doc! { "_id": id }).await?;
        Ok(())
    }

    pub async fn restore(&self, id: ObjectId, actor_role: Role) -> Result<PublicationDoc> {
        let publications = self.publications().await?;
        let publication = publications.find_one_any(doc! { "_id": id }).await?;

        let publication = match publication {
            Some(p) if p.metadata.is_deleted => p,
            _ => {
                return Err(ClaustroError::NotFound(
                    "Publicación no encontrada o no está eliminada.".into(),
                ))
            }
        };

        if !self
            .policy
            .allows(actor_role, false, Operation::PublicationRestore)
        {
            return Err(ClaustroError::Forbidden(
                "No tienes permisos para restaurar esta publicación.".into(),
            ));
        }

        publications.restore(doc! { "_id": id }).await?;

        let mut restored = publication;
        restored.metadata.is_deleted = false;
        restored.metadata.deleted_at = None;
        Ok(restored)
    }

    pub async fn get(&self, id: ObjectId) -> Result<PublicationDoc> {
        let publications = self.publications().await?;
        publications
            .find_one(doc! { "_id": id })
            .await?
            .ok_or_else(|| ClaustroError::NotFound("Publicación no encontrada".into()))
    }

    pub async fn list(
        &self,
        titulo: Option<&str>,
        tipo: Option<&str>,
        page: u64,
        limit: u64,
    ) -> Result<Page<PublicationDoc>> {
        let mut filter = doc! {};
        if let Some(titulo) = titulo.filter(|t| !t.is_empty()) {
            filter.insert("titulo", doc! { "$regex": regex_escape(titulo), "$options": "i" });
        }
        if let Some(tipo) = tipo.filter(|t| !t.is_empty()) {
            filter.insert(
                "tipoPublicacion",
                doc! { "$regex": format!("^{}$", regex_escape(tipo)), "$options": "i" },
            );
        }

        let publications = self.publications().await?;
        publications.find_page(filter, page, limit).await
    }

    pub async fn list_mine(
        &self,
        actor: ObjectId,
        page: u64,
        limit: u64,
    ) -> Result<Page<PublicationDoc>> {
        let publications = self.publications().await?;
        publications
            .find_page(doc! { "autores": actor }, page, limit)
            .await
    }

    pub async fn search(&self, query: &str, page: u64, limit: u64) -> Result<Page<PublicationDoc>> {
        let pattern = regex_escape(query);
        let filter: Document = doc! {
            "$or": [
                { "titulo": { "$regex": &pattern, "$options": "i" } },
                { "resumen": { "$regex": &pattern, "$options": "i" } },
                { "palabrasClave": { "$regex": &pattern, "$options": "i" } },
            ]
        };

        let publications = self.publications().await?;
        publications.find_page(filter, page, limit).await
    }
}

/// Check required fields and enum values for creation.
pub fn validate_new_publication(data: &NewPublication) -> Result<ValidatedPublication> {
    let (Some(titulo), Some(fecha), Some(proyecto), Some(revista), Some(tipo), Some(idioma)) = (
        data.titulo.as_deref().filter(|s| !s.trim().is_empty()),
        data.fecha,
        data.proyecto.as_deref(),
        data.revista.as_deref().filter(|s| !s.trim().is_empty()),
        data.tipo_publicacion.as_deref(),
        data.idioma.as_deref().filter(|s| !s.trim().is_empty()),
    ) else {
        return Err(ClaustroError::BadRequest(
            "Todos los campos obligatorios deben ser proporcionados.".into(),
        ));
    };

    let tipo_publicacion: PublicationType =
        serde_json::from_value(Value::String(tipo.to_string()))
            .map_err(|_| ClaustroError::BadRequest("Tipo de publicación inválido.".into()))?;

    let estado = match data.estado.as_deref() {
        None => PublicationStatus::Borrador,
        Some(raw) => serde_json::from_value(Value::String(raw.to_string()))
            .map_err(|_| ClaustroError::BadRequest("Estado de publicación inválido.".into()))?,
    };

    let proyecto = ObjectId::parse_str(proyecto)
        .map_err(|_| ClaustroError::BadRequest("Identificador de proyecto inválido.".into()))?;

    Ok(ValidatedPublication {
        titulo: titulo.to_string(),
        fecha: bson::DateTime::from_chrono(fecha),
        proyecto,
        revista: revista.to_string(),
        tipo_publicacion,
        estado,
        idioma: idioma.to_string(),
    })
}

/// Whether this patch trips the provenance freeze: autores/proyecto cannot
/// change on a reviewed or published publication unless the actor is an
/// administrator.
pub fn provenance_locked(keys: &[&str], estado: PublicationStatus, is_admin: bool) -> bool {
    let touches_provenance = keys.contains(&"autores") || keys.contains(&"proyecto");
    touches_provenance && estado.locks_provenance() && !is_admin
}

/// Authors requested by the caller that are not on the project roster.
pub fn invalid_autores(requested: &[ObjectId], roster: &[ObjectId]) -> Vec<ObjectId> {
    requested
        .iter()
        .filter(|id| !roster.contains(id))
        .copied()
        .collect()
}

/// Apply the simple fields of a screened patch. proyecto and autores are
/// resolved by the caller after membership validation.
fn apply_publication_patch(
    publication: &mut PublicationDoc,
    keys: &[&str],
    patch: &Map<String, Value>,
) -> Result<()> {
    for key in keys {
        let value = &patch[*key];
        match *key {
            "titulo" => {
                publication.titulo = string_field(value, "titulo")?;
            }
            "fecha" => {
                let fecha: ChronoDateTime<Utc> = serde_json::from_value(value.clone())
                    .map_err(|_| ClaustroError::BadRequest("Fecha inválida.".into()))?;
                publication.fecha = bson::DateTime::from_chrono(fecha);
            }
            "revista" => publication.revista = string_field(value, "revista")?,
            "resumen" => publication.resumen = value.as_str().map(str::to_string),
            "palabrasClave" => publication.palabras_clave = value.as_str().map(str::to_string),
            "tipoPublicacion" => {
                publication.tipo_publicacion = serde_json::from_value(value.clone())
                    .map_err(|_| ClaustroError::BadRequest("Tipo de publicación inválido.".into()))?
            }
            "estado" => {
                publication.estado = serde_json::from_value(value.clone())
                    .map_err(|_| ClaustroError::BadRequest("Estado de publicación inválido.".into()))?
            }
            "anexos" => {
                publication.anexos = serde_json::from_value(value.clone()).map_err(|_| {
                    ClaustroError::BadRequest("Los anexos deben ser una lista de referencias".into())
                })?
            }
            "idioma" => publication.idioma = string_field(value, "idioma")?,
            // Handled by the caller.
            "proyecto" | "autores" => {}
            _ => {}
        }
    }
    Ok(())
}

fn string_field(value: &Value, field: &str) -> Result<String> {
    match value.as_str() {
        Some(s) if !s.trim().is_empty() => Ok(s.to_string()),
        _ => Err(ClaustroError::BadRequest(format!(
            "El campo {} no puede estar vacío",
            field
        ))),
    }
}

fn object_id_field(value: &Value, field: &str) -> Result<ObjectId> {
    value
        .as_str()
        .and_then(|s| ObjectId::parse_str(s).ok())
        .ok_or_else(|| ClaustroError::BadRequest(format!("Identificador inválido en {}", field)))
}

fn object_id_list(value: &Value, field: &str) -> Result<Vec<ObjectId>> {
    let raw: Vec<String> = serde_json::from_value(value.clone())
        .map_err(|_| ClaustroError::BadRequest(format!("El campo {} debe ser una lista", field)))?;
    raw.iter()
        .map(|id| {
            ObjectId::parse_str(id).map_err(|_| {
                ClaustroError::BadRequest(format!("Identificador inválido en {}", field))
            })
        })
        .collect()
}

fn regex_escape(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if r".^$*+?()[]{}|\".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_input() -> NewPublication {
        serde_json::from_value(json!({
            "titulo": "Genómica del cacao",
            "fecha": "2026-05-01T00:00:00Z",
            "proyecto": ObjectId::new().to_hex(),
            "revista": "Ciencia Hoy",
            "tipoPublicacion": "Articulo",
            "idioma": "Español"
        }))
        .unwrap()
    }

    #[test]
    fn test_valid_creation_defaults_to_borrador() {
        let validated = validate_new_publication(&valid_input()).unwrap();
        assert_eq!(validated.estado, PublicationStatus::Borrador);
        assert_eq!(validated.tipo_publicacion, PublicationType::Articulo);
    }

    #[test]
    fn test_missing_required_field_rejected() {
        let mut data = valid_input();
        data.revista = None;
        assert!(validate_new_publication(&data).is_err());

        let mut data = valid_input();
        data.fecha = None;
        assert!(validate_new_publication(&data).is_err());
    }

    #[test]
    fn test_invalid_tipo_rejected() {
        let mut data = valid_input();
        data.tipo_publicacion = Some("Novela".into());
        let err = validate_new_publication(&data).unwrap_err();
        match err {
            ClaustroError::BadRequest(msg) => assert!(msg.contains("Tipo de publicación")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_provenance_lock_matrix() {
        // Draft: anyone may retarget.
        assert!(!provenance_locked(&["autores"], PublicationStatus::Borrador, false));

        // Reviewed/published: non-admins are locked out of autores/proyecto.
        assert!(provenance_locked(&["autores"], PublicationStatus::Revisado, false));
        assert!(provenance_locked(&["proyecto"], PublicationStatus::Publicado, false));

        // Administrators pass.
        assert!(!provenance_locked(&["autores"], PublicationStatus::Publicado, true));

        // Patches that leave provenance alone never trip the lock.
        assert!(!provenance_locked(&["titulo", "resumen"], PublicationStatus::Publicado, false));
    }

    #[test]
    fn test_invalid_autores_detection() {
        let a = ObjectId::new();
        let b = ObjectId::new();
        let outsider = ObjectId::new();
        let roster = vec![a, b];

        assert!(invalid_autores(&[a, b], &roster).is_empty());
        assert_eq!(invalid_autores(&[a, outsider], &roster), vec![outsider]);
    }

    #[test]
    fn test_author_snapshot_not_caller_supplied() {
        // Creation input has no autores field at all: the type system
        // guarantees the roster snapshot is the only source.
        let value = json!({
            "titulo": "t",
            "fecha": "2026-05-01T00:00:00Z",
            "proyecto": ObjectId::new().to_hex(),
            "revista": "r",
            "tipoPublicacion": "Tesis",
            "idioma": "Español",
            "autores": ["ignored"]
        });
        let parsed: NewPublication = serde_json::from_value(value).unwrap();
        assert!(validate_new_publication(&parsed).is_ok());
    }
}
