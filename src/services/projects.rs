//! Project lifecycle service
//!
//! CRUD with soft-delete/restore for research projects, the milestone and
//! timeline validation rules, the investigator roster (creator always a
//! member) and name uniqueness among active projects.

use bson::{doc, oid::ObjectId, Document};
use chrono::{DateTime as ChronoDateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::auth::{Operation, PolicyTable, Role};
use crate::db::schemas::{Cronograma, Hito, ProjectDoc, ProjectStatus, PROJECT_COLLECTION};
use crate::db::{MongoClient, MongoCollection, Page};
use crate::types::{ClaustroError, Result};
use crate::update::PROJECT_UPDATE;

/// Creation payload. Dates arrive as ISO-8601; absence is a validation
/// failure, not a parse failure, so everything date-like is optional here.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProject {
    pub nombre: String,
    pub descripcion: String,
    #[serde(default)]
    pub objetivos: Option<String>,
    pub presupuesto: f64,
    #[serde(default)]
    pub cronograma: Option<CronogramaInput>,
    #[serde(default)]
    pub investigadores: Vec<String>,
    #[serde(default)]
    pub recursos: Vec<String>,
    #[serde(default)]
    pub hitos: Vec<HitoInput>,
    #[serde(default)]
    pub imagen: Option<String>,
    #[serde(default)]
    pub estado: Option<ProjectStatus>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CronogramaInput {
    #[serde(default)]
    pub fecha_inicio: Option<ChronoDateTime<Utc>>,
    #[serde(default)]
    pub fecha_fin: Option<ChronoDateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HitoInput {
    #[serde(default)]
    pub nombre: Option<String>,
    #[serde(default)]
    pub fecha: Option<ChronoDateTime<Utc>>,
    /// Single-deliverable shorthand accepted alongside the list form
    #[serde(default)]
    pub entregable: Option<String>,
    #[serde(default)]
    pub entregables: Vec<String>,
}

pub struct ProjectService {
    mongo: MongoClient,
    policy: Arc<PolicyTable>,
}

impl ProjectService {
    pub fn new(mongo: MongoClient, policy: Arc<PolicyTable>) -> Self {
        Self { mongo, policy }
    }

    async fn projects(&self) -> Result<MongoCollection<ProjectDoc>> {
        self.mongo.collection::<ProjectDoc>(PROJECT_COLLECTION).await
    }

    pub async fn create(&self, data: NewProject, creator: ObjectId) -> Result<ProjectDoc> {
        let projects = self.projects().await?;

        if projects
            .find_one(doc! { "nombre": &data.nombre })
            .await?
            .is_some()
        {
            return Err(ClaustroError::Conflict(
                "Ya existe un proyecto con ese nombre".into(),
            ));
        }

        let (cronograma, hitos) = validate_new_project(&data)?;
        let investigadores = resolve_roster(&data.investigadores, creator)?;

        let mut project = ProjectDoc {
            _id: None,
            metadata: Default::default(),
            nombre: data.nombre,
            descripcion: data.descripcion,
            objetivos: data.objetivos,
            presupuesto: data.presupuesto,
            cronograma,
            investigadores,
            recursos: data.recursos,
            hitos,
            imagen: data.imagen,
            estado: data.estado.unwrap_or(ProjectStatus::Planeado),
            is_evaluated: false,
        };

        let id = projects.insert_one(project.clone()).await?;
        project._id = Some(id);
        Ok(project)
    }

    pub async fn update(
        &self,
        id: ObjectId,
        patch: Map<String, Value>,
        actor: ObjectId,
        actor_role: Role,
    ) -> Result<ProjectDoc> {
        let projects = self.projects().await?;
        let mut project = projects
            .find_one(doc! { "_id": id })
            .await?
            .ok_or_else(|| ClaustroError::NotFound("Proyecto no encontrado o eliminado".into()))?;

        let is_member = project.is_investigador(&actor);
        if !self.policy.allows(actor_role, is_member, Operation::ProjectUpdate) {
            return Err(ClaustroError::Forbidden(
                "No tienes permisos para actualizar este proyecto".into(),
            ));
        }

        let nombre_changed = apply_project_patch(&mut project, &patch)?;

        if nombre_changed {
            let taken = projects
                .find_one(doc! { "nombre": &project.nombre, "_id": { "$ne": id } })
                .await?
                .is_some();
            if taken {
                return Err(ClaustroError::Conflict(
                    "Ya existe un proyecto con ese nombre".into(),
                ));
            }
        }

        projects.replace_one(id, project.clone()).await?;
        Ok(project)
    }

    pub async fn soft_delete(&self, id: ObjectId, actor: ObjectId, actor_role: Role) -> Result<()> {
        let projects = self.projects().await?;
        let project = projects
            .find_one(doc! { "_id": id })
            .await?
            .ok_or_else(|| ClaustroError::NotFound("Proyecto no encontrado".into()))?;

        let is_member = project.is_investigador(&actor);
        if !self.policy.allows(actor_role, is_member, Operation::ProjectDelete) {
            return Err(ClaustroError::Forbidden(
                "No tienes permisos para eliminar este proyecto.".into(),
            ));
        }

        // Terminal projects need the stricter gate regardless of membership.
        if project.estado.is_terminal()
            && !self
                .policy
                .allows(actor_role, is_member, Operation::ProjectDeleteTerminal)
        {
            return Err(ClaustroError::Forbidden(
                "Solo los administradores pueden eliminar proyectos en estado finalizado o cancelado."
                    .into(),
            ));
        }

        projects.soft_delete(doc! { "_id": id }).await?;
        Ok(())
    }

    pub async fn restore(&self, id: ObjectId, actor_role: Role) -> Result<ProjectDoc> {
        let projects = self.projects().await?;
        let project = projects.find_one_any(doc! { "_id": id }).await?;

        let project = match project {
            Some(p) if p.metadata.is_deleted => p,
            _ => {
                return Err(ClaustroError::NotFound(
                    "Proyecto no encontrado o no está eliminado.".into(),
                ))
            }
        };

        if !self.policy.allows(actor_role, false, Operation::ProjectRestore) {
            return Err(ClaustroError::Forbidden(
                "No tienes permisos para restaurar este proyecto.".into(),
            ));
        }

        projects.restore(doc! { "_id": id }).await?;

        let mut restored = project;
        restored.metadata.is_deleted = false;
        restored.metadata.deleted_at = None;
        Ok(restored)
    }

    pub async fn get(&self, id: ObjectId) -> Result<ProjectDoc> {
        let projects = self.projects().await?;
        projects
            .find_one(doc! { "_id": id })
            .await?
            .ok_or_else(|| ClaustroError::NotFound("Proyecto no encontrado".into()))
    }

    pub async fn list(
        &self,
        search: Option<&str>,
        page: u64,
        limit: u64,
    ) -> Result<Page<ProjectDoc>> {
        let projects = self.projects().await?;
        projects.find_page(search_filter(search, doc! {}), page, limit).await
    }

    /// Projects the actor participates in.
    pub async fn list_mine(
        &self,
        actor: ObjectId,
        search: Option<&str>,
        page: u64,
        limit: u64,
    ) -> Result<Page<ProjectDoc>> {
        let projects = self.projects().await?;
        let base = doc! { "investigadores": actor };
        projects.find_page(search_filter(search, base), page, limit).await
    }

    /// Free-text search over nombre/descripcion. Empty result is NotFound,
    /// matching the API contract for the search endpoint.
    pub async fn search(&self, query: &str) -> Result<Vec<ProjectDoc>> {
        let projects = self.projects().await?;
        let found = projects
            .find_many(search_filter(Some(query), doc! {}))
            .await?;

        if found.is_empty() {
            return Err(ClaustroError::NotFound(
                "No se encontraron proyectos que coincidan con la búsqueda".into(),
            ));
        }
        Ok(found)
    }
}

/// Validate the creation payload, returning the persisted forms of the
/// timeline and milestone list.
pub fn validate_new_project(data: &NewProject) -> Result<(Cronograma, Vec<Hito>)> {
    if data.nombre.trim().is_empty() {
        return Err(ClaustroError::BadRequest(
            "El nombre del proyecto es requerido".into(),
        ));
    }
    if data.descripcion.trim().is_empty() {
        return Err(ClaustroError::BadRequest(
            "La descripción del proyecto es requerida".into(),
        ));
    }

    let cronograma = match &data.cronograma {
        Some(CronogramaInput {
            fecha_inicio: Some(inicio),
            fecha_fin: Some(fin),
        }) => Cronograma {
            fecha_inicio: bson::DateTime::from_chrono(*inicio),
            fecha_fin: bson::DateTime::from_chrono(*fin),
        },
        _ => {
            return Err(ClaustroError::BadRequest(
                "El cronograma debe incluir fechaInicio y fechaFin".into(),
            ))
        }
    };

    if data.hitos.is_empty() {
        return Err(ClaustroError::BadRequest(
            "Al menos un hito es obligatorio con nombre y fecha".into(),
        ));
    }

    let hitos = convert_hitos(&data.hitos)?;

    Ok((cronograma, hitos))
}

fn convert_hitos(inputs: &[HitoInput]) -> Result<Vec<Hito>> {
    inputs
        .iter()
        .enumerate()
        .map(|(index, hito)| {
            let (Some(nombre), Some(fecha)) = (hito.nombre.as_deref(), hito.fecha) else {
                return Err(ClaustroError::BadRequest(format!(
                    "El hito en la posición {} debe tener un nombre y una fecha",
                    index + 1
                )));
            };
            if nombre.trim().is_empty() {
                return Err(ClaustroError::BadRequest(format!(
                    "El hito en la posición {} debe tener un nombre y una fecha",
                    index + 1
                )));
            }

            let mut entregables = hito.entregables.clone();
            if let Some(single) = &hito.entregable {
                entregables.push(single.clone());
            }

            Ok(Hito {
                nombre: nombre.to_string(),
                fecha: bson::DateTime::from_chrono(fecha),
                entregables,
            })
        })
        .collect()
}

/// Parse the roster and guarantee the creator is on it.
pub fn resolve_roster(raw: &[String], creator: ObjectId) -> Result<Vec<ObjectId>> {
    let mut roster = raw
        .iter()
        .map(|id| {
            ObjectId::parse_str(id)
                .map_err(|_| ClaustroError::BadRequest(format!("Investigador inválido: {}", id)))
        })
        .collect::<Result<Vec<_>>>()?;

    if !roster.contains(&creator) {
        roster.push(creator);
    }
    Ok(roster)
}

/// Apply a screened PATCH to the document. Returns whether nombre changed,
/// so the caller can re-check uniqueness.
pub fn apply_project_patch(project: &mut ProjectDoc, patch: &Map<String, Value>) -> Result<bool> {
    let mut nombre_changed = false;

    for key in PROJECT_UPDATE.screen(patch)? {
        let value = &patch[key];
        match key {
            "nombre" => {
                let nombre = string_field(value, "nombre")?;
                if nombre != project.nombre {
                    project.nombre = nombre;
                    nombre_changed = true;
                }
            }
            "descripcion" => project.descripcion = string_field(value, "descripcion")?,
            "objetivos" => project.objetivos = value.as_str().map(str::to_string),
            "presupuesto" => {
                project.presupuesto = value.as_f64().ok_or_else(|| {
                    ClaustroError::BadRequest("El presupuesto debe ser un número".into())
                })?
            }
            "cronograma" => {
                let input: CronogramaInput = serde_json::from_value(value.clone())
                    .map_err(|_| bad_date("cronograma"))?;
                match (input.fecha_inicio, input.fecha_fin) {
                    (Some(inicio), Some(fin)) => {
                        project.cronograma = Cronograma {
                            fecha_inicio: bson::DateTime::from_chrono(inicio),
                            fecha_fin: bson::DateTime::from_chrono(fin),
                        };
                    }
                    _ => {
                        return Err(ClaustroError::BadRequest(
                            "El cronograma debe incluir fechaInicio y fechaFin".into(),
                        ))
                    }
                }
            }
            "hitos" => {
                let inputs: Vec<HitoInput> = serde_json::from_value(value.clone())
                    .map_err(|_| ClaustroError::BadRequest("Los hitos deben ser una lista".into()))?;
                if inputs.is_empty() {
                    return Err(ClaustroError::BadRequest(
                        "Al menos un hito es obligatorio con nombre y fecha".into(),
                    ));
                }
                project.hitos = convert_hitos(&inputs)?;
            }
            "investigadores" => {
                let raw: Vec<String> = serde_json::from_value(value.clone()).map_err(|_| {
                    ClaustroError::BadRequest("Los investigadores deben ser una lista".into())
                })?;
                if raw.is_empty() {
                    return Err(ClaustroError::BadRequest(
                        "El proyecto debe conservar al menos un investigador".into(),
                    ));
                }
                project.investigadores = raw
                    .iter()
                    .map(|id| {
                        ObjectId::parse_str(id).map_err(|_| {
                            ClaustroError::BadRequest(format!("Investigador inválido: {}", id))
                        })
                    })
                    .collect::<Result<_>>()?;
            }
            "recursos" => {
                project.recursos = serde_json::from_value(value.clone()).map_err(|_| {
                    ClaustroError::BadRequest("Los recursos deben ser una lista de textos".into())
                })?
            }
            "estado" => {
                project.estado = serde_json::from_value(value.clone())
                    .map_err(|_| ClaustroError::BadRequest("Estado de proyecto inválido".into()))?
            }
            "imagen" => project.imagen = value.as_str().map(str::to_string),
            _ => {}
        }
    }

    Ok(nombre_changed)
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

fn bad_date(field: &str) -> ClaustroError {
    ClaustroError::BadRequest(format!("El campo {} contiene una fecha inválida", field))
}

/// Case-insensitive substring filter over nombre/descripcion.
fn search_filter(search: Option<&str>, mut base: Document) -> Document {
    if let Some(term) = search.filter(|t| !t.trim().is_empty()) {
        let pattern = regex_escape(term.trim());
        base.insert(
            "$or",
            vec![
                doc! { "nombre": { "$regex": &pattern, "$options": "i" } },
                doc! { "descripcion": { "$regex": &pattern, "$options": "i" } },
            ],
        );
    }
    base
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

    fn valid_input() -> NewProject {
        serde_json::from_value(json!({
            "nombre": "Genoma del cacao",
            "descripcion": "Secuenciación",
            "presupuesto": 50000.0,
            "cronograma": {
                "fechaInicio": "2026-01-01T00:00:00Z",
                "fechaFin": "2026-12-31T00:00:00Z"
            },
            "hitos": [
                { "nombre": "M1", "fecha": "2026-03-01T00:00:00Z", "entregable": "Informe" }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_valid_project_passes() {
        let (cronograma, hitos) = validate_new_project(&valid_input()).unwrap();
        assert!(cronograma.fecha_inicio < cronograma.fecha_fin);
        assert_eq!(hitos.len(), 1);
        assert_eq!(hitos[0].entregables, vec!["Informe"]);
    }

    #[test]
    fn test_missing_cronograma_rejected() {
        let mut data = valid_input();
        data.cronograma = None;
        assert!(validate_new_project(&data).is_err());

        let mut data = valid_input();
        data.cronograma.as_mut().unwrap().fecha_fin = None;
        assert!(validate_new_project(&data).is_err());
    }

    #[test]
    fn test_empty_hitos_rejected() {
        let mut data = valid_input();
        data.hitos.clear();
        let err = validate_new_project(&data).unwrap_err();
        assert!(matches!(err, ClaustroError::BadRequest(_)));
    }

    #[test]
    fn test_hito_without_fecha_rejected() {
        let mut data = valid_input();
        data.hitos = vec![HitoInput {
            nombre: Some("M1".into()),
            fecha: None,
            entregable: None,
            entregables: vec![],
        }];
        let err = validate_new_project(&data).unwrap_err();
        match err {
            ClaustroError::BadRequest(msg) => assert!(msg.contains("posición 1")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_creator_forced_into_roster() {
        let creator = ObjectId::new();
        let other = ObjectId::new();

        let roster = resolve_roster(&[other.to_hex()], creator).unwrap();
        assert!(roster.contains(&creator));
        assert!(roster.contains(&other));

        // Already listed: no duplicate.
        let roster = resolve_roster(&[creator.to_hex()], creator).unwrap();
        assert_eq!(roster.len(), 1);
    }

    #[test]
    fn test_patch_whitelist_and_nombre_tracking() {
        let creator = ObjectId::new();
        let (cronograma, hitos) = validate_new_project(&valid_input()).unwrap();
        let mut project = ProjectDoc {
            _id: Some(ObjectId::new()),
            metadata: Default::default(),
            nombre: "Genoma del cacao".into(),
            descripcion: "Secuenciación".into(),
            objetivos: None,
            presupuesto: 50000.0,
            cronograma,
            investigadores: vec![creator],
            recursos: vec![],
            hitos,
            imagen: None,
            estado: ProjectStatus::Planeado,
            is_evaluated: false,
        };

        // Unknown keys are silently dropped; isEvaluated stays untouched.
        let patch = json!({
            "descripcion": "Fase dos",
            "estado": "En Proceso",
            "isEvaluated": true,
            "isDeleted": true
        });
        let changed = apply_project_patch(&mut project, patch.as_object().unwrap()).unwrap();
        assert!(!changed);
        assert_eq!(project.descripcion, "Fase dos");
        assert_eq!(project.estado, ProjectStatus::EnProceso);
        assert!(!project.is_evaluated);
        assert!(!project.metadata.is_deleted);

        // A real rename reports that uniqueness needs re-checking.
        let patch = json!({ "nombre": "Proteoma del cacao" });
        let changed = apply_project_patch(&mut project, patch.as_object().unwrap()).unwrap();
        assert!(changed);

        // Same-name no-op is not a rename.
        let patch = json!({ "nombre": "Proteoma del cacao" });
        let changed = apply_project_patch(&mut project, patch.as_object().unwrap()).unwrap();
        assert!(!changed);
    }

    #[test]
    fn test_patch_cannot_empty_roster() {
        let (cronograma, hitos) = validate_new_project(&valid_input()).unwrap();
        let mut project = ProjectDoc {
            _id: Some(ObjectId::new()),
            metadata: Default::default(),
            nombre: "X".into(),
            descripcion: "Y".into(),
            objetivos: None,
            presupuesto: 0.0,
            cronograma,
            investigadores: vec![ObjectId::new()],
            recursos: vec![],
            hitos,
            imagen: None,
            estado: ProjectStatus::Planeado,
            is_evaluated: false,
        };

        let patch = json!({ "investigadores": [] });
        assert!(apply_project_patch(&mut project, patch.as_object().unwrap()).is_err());
    }

    #[test]
    fn test_regex_escape() {
        assert_eq!(regex_escape("a.b"), "a\\.b");
        assert_eq!(regex_escape("plain"), "plain");
        assert_eq!(regex_escape("(x)*"), "\\(x\\)\\*");
    }
}
