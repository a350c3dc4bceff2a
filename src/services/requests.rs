//! Request (ticketing) service
//!
//! Typed requests from researchers. Resolution (estado, revisadoPor,
//! fechaResolucion) is administrator-only; the comment thread is
//! append-only and open to anyone allowed to see the request.
//! Investigators only ever see their own requests.

use bson::{doc, oid::ObjectId, DateTime};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use crate::auth::{Operation, PolicyTable, Role};
use crate::db::schemas::{
    ProjectDoc, RequestComment, RequestDoc, RequestStatus, RequestType, PROJECT_COLLECTION,
    REQUEST_COLLECTION,
};
use crate::db::{MongoClient, MongoCollection, Page};
use crate::types::{ClaustroError, Result};

/// Creation payload
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRequest {
    #[serde(default)]
    pub tipo_solicitud: Option<String>,
    #[serde(default)]
    pub descripcion: Option<String>,
    #[serde(default)]
    pub proyecto: Option<String>,
}

/// Update payload: a resolution, a comment to append, or both
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestUpdate {
    #[serde(default)]
    pub estado: Option<String>,
    #[serde(default)]
    pub comentarios: Option<String>,
}

pub struct RequestService {
    mongo: MongoClient,
    policy: Arc<PolicyTable>,
}

impl RequestService {
    pub fn new(mongo: MongoClient, policy: Arc<PolicyTable>) -> Self {
        Self { mongo, policy }
    }

    async fn requests(&self) -> Result<MongoCollection<RequestDoc>> {
        self.mongo.collection::<RequestDoc>(REQUEST_COLLECTION).await
    }

    pub async fn create(&self, data: NewRequest, actor: ObjectId) -> Result<RequestDoc> {
        let (tipo, descripcion, proyecto) = validate_new_request(&data)?;

        if let Some(proyecto) = proyecto {
            let projects = self
                .mongo
                .collection::<ProjectDoc>(PROJECT_COLLECTION)
                .await?;
            if projects
                .find_one(doc! { "_id": proyecto })
                .await?
                .is_none()
            {
                return Err(ClaustroError::NotFound("Proyecto no encontrado.".into()));
            }
        }

        let mut request = RequestDoc::new(actor, tipo, descripcion, proyecto);
        let requests = self.requests().await?;
        let id = requests.insert_one(request.clone()).await?;
        request._id = Some(id);
        Ok(request)
    }

    pub async fn update(
        &self,
        id: ObjectId,
        data: RequestUpdate,
        actor: ObjectId,
        actor_role: Role,
    ) -> Result<RequestDoc> {
        let requests = self.requests().await?;
        let mut request = requests
            .find_one(doc! { "_id": id })
            .await?
            .ok_or_else(|| ClaustroError::NotFound("Solicitud no encontrada.".into()))?;

        let is_owner = request.is_solicitante(&actor);

        if let Some(raw) = &data.estado {
            if !self.policy.allows(actor_role, is_owner, Operation::RequestResolve) {
                return Err(ClaustroError::Forbidden(
                    "No tienes permiso para actualizar el estado de esta solicitud.".into(),
                ));
            }

            let estado: RequestStatus = serde_json::from_value(Value::String(raw.clone()))
                .map_err(|_| ClaustroError::BadRequest("Estado de solicitud inválido.".into()))?;

            request.estado = estado;
            request.revisado_por = Some(actor);
            request.fecha_resolucion = Some(DateTime::now());
        }

        if let Some(comentario) = &data.comentarios {
            if !self.policy.allows(actor_role, is_owner, Operation::RequestComment) {
                return Err(ClaustroError::Forbidden(
                    "No tienes permiso para comentar esta solicitud.".into(),
                ));
            }
            append_comment(&mut request.comentarios, actor, comentario.clone());
        }

        requests.replace_one(id, request.clone()).await?;
        Ok(request)
    }

    pub async fn delete(&self, id: ObjectId, actor: ObjectId, actor_role: Role) -> Result<()> {
        let requests = self.requests().await?;
        let request = requests
            .find_one(doc! { "_id": id })
            .await?
            .ok_or_else(|| ClaustroError::NotFound("Solicitud no encontrada.".into()))?;

        let is_owner = request.is_solicitante(&actor);
        if !self.policy.allows(actor_role, is_owner, Operation::RequestDelete) {
            return Err(ClaustroError::Forbidden(
                "No tienes permiso para eliminar esta solicitud.".into(),
            ));
        }

        requests.soft_delete(doc! { "_id": id }).await?;
        Ok(())
    }

    pub async fn restore(&self, id: ObjectId, actor_role: Role) -> Result<RequestDoc> {
        let requests = self.requests().await?;
        let request = requests.find_one_any(doc! { "_id": id }).await?;

        let request = match request {
            Some(r) if r.metadata.is_deleted => r,
            _ => {
                return Err(ClaustroError::NotFound(
                    "Solicitud no encontrada o no está eliminada.".into(),
                ))
            }
        };

        if !self.policy.allows(actor_role, false, Operation::RequestRestore) {
            return Err(ClaustroError::Forbidden(
                "No tienes permiso para restaurar esta solicitud.".into(),
            ));
        }

        requests.restore(doc! { "_id": id }).await?;

        let mut restored = request;
        restored.metadata.is_deleted = false;
        restored.metadata.deleted_at = None;
        Ok(restored)
    }

    /// Listing is scoped: investigators only see what they filed.
    pub async fn list(
        &self,
        estado: Option<&str>,
        actor: ObjectId,
        actor_role: Role,
        page: u64,
        limit: u64,
    ) -> Result<Page<RequestDoc>> {
        let mut filter = doc! {};
        if let Some(estado) = estado.filter(|e| !e.is_empty()) {
            filter.insert("estado", estado);
        }
        if !self.policy.allows(actor_role, false, Operation::RequestReadOther) {
            filter.insert("solicitante", actor);
        }

        let requests = self.requests().await?;
        requests.find_page(filter, page, limit).await
    }

    pub async fn get(&self, id: ObjectId, actor: ObjectId, actor_role: Role) -> Result<RequestDoc> {
        let requests = self.requests().await?;
        let request = requests
            .find_one(doc! { "_id": id })
            .await?
            .ok_or_else(|| ClaustroError::NotFound("Solicitud no encontrada".into()))?;

        let is_owner = request.is_solicitante(&actor);
        if !is_owner && !self.policy.allows(actor_role, false, Operation::RequestReadOther) {
            return Err(ClaustroError::Forbidden(
                "No tienes permiso para ver esta solicitud.".into(),
            ));
        }

        Ok(request)
    }
}

/// Validate the creation payload and resolve the conditional project rule.
pub fn validate_new_request(
    data: &NewRequest,
) -> Result<(RequestType, String, Option<ObjectId>)> {
    let (Some(tipo_raw), Some(descripcion)) = (
        data.tipo_solicitud.as_deref(),
        data.descripcion.as_deref().filter(|d| !d.trim().is_empty()),
    ) else {
        return Err(ClaustroError::BadRequest(
            "Tipo de solicitud y descripción son obligatorios.".into(),
        ));
    };

    let tipo: RequestType = serde_json::from_value(Value::String(tipo_raw.to_string()))
        .map_err(|_| ClaustroError::BadRequest("Tipo de solicitud inválido.".into()))?;

    if tipo.requires_project() && data.proyecto.is_none() {
        return Err(ClaustroError::BadRequest(
            "El proyecto es obligatorio para este tipo de solicitud.".into(),
        ));
    }

    let proyecto = data
        .proyecto
        .as_deref()
        .map(|id| {
            ObjectId::parse_str(id).map_err(|_| {
                ClaustroError::BadRequest("Identificador de proyecto inválido.".into())
            })
        })
        .transpose()?;

    Ok((tipo, descripcion.to_string(), proyecto))
}

/// Append one entry to the thread. Existing entries are never touched.
pub fn append_comment(thread: &mut Vec<RequestComment>, usuario: ObjectId, comentario: String) {
    thread.push(RequestComment {
        usuario,
        comentario,
        fecha: DateTime::now(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(tipo: Option<&str>, descripcion: Option<&str>, proyecto: Option<String>) -> NewRequest {
        NewRequest {
            tipo_solicitud: tipo.map(str::to_string),
            descripcion: descripcion.map(str::to_string),
            proyecto,
        }
    }

    #[test]
    fn test_required_fields() {
        assert!(validate_new_request(&input(None, Some("d"), None)).is_err());
        assert!(validate_new_request(&input(Some("Permiso"), None, None)).is_err());
        assert!(validate_new_request(&input(Some("Permiso"), Some("d"), None)).is_ok());
    }

    #[test]
    fn test_invalid_tipo_rejected() {
        assert!(validate_new_request(&input(Some("Queja"), Some("d"), None)).is_err());
    }

    #[test]
    fn test_conditional_project_requirement() {
        // Aprobación and Recurso need a project.
        assert!(validate_new_request(&input(Some("Aprobación"), Some("d"), None)).is_err());
        assert!(validate_new_request(&input(Some("Recurso"), Some("d"), None)).is_err());

        let with_project = input(
            Some("Aprobación"),
            Some("d"),
            Some(ObjectId::new().to_hex()),
        );
        let (tipo, _, proyecto) = validate_new_request(&with_project).unwrap();
        assert_eq!(tipo, RequestType::Aprobacion);
        assert!(proyecto.is_some());

        // Permiso and Otros do not.
        assert!(validate_new_request(&input(Some("Otros"), Some("d"), None)).is_ok());
    }

    #[test]
    fn test_comment_thread_is_append_only() {
        let user_a = ObjectId::new();
        let user_b = ObjectId::new();
        let mut thread = Vec::new();

        append_comment(&mut thread, user_a, "primera".into());
        let first = thread[0].clone();

        append_comment(&mut thread, user_b, "segunda".into());
        assert_eq!(thread.len(), 2);
        assert_eq!(thread[0], first);
        assert_eq!(thread[1].usuario, user_b);
        assert_eq!(thread[1].comentario, "segunda");
    }
}
