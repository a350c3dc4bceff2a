//! Evaluation service
//!
//! One evaluation per (project, evaluator) pair, administrator-only and
//! self-authored: an administrator can never mutate a colleague's
//! evaluation. Creating the first evaluation of a project flips the
//! project's isEvaluated flag; the flag is one-way and survives deletion
//! and restoration of evaluations.

use bson::{doc, oid::ObjectId};
use serde::Deserialize;
use std::sync::Arc;

use crate::auth::{Operation, PolicyTable, Role};
use crate::db::schemas::{
    EvaluationDoc, ProjectDoc, EVALUATION_COLLECTION, PROJECT_COLLECTION,
};
use crate::db::{MongoClient, MongoCollection, Page};
use crate::types::{ClaustroError, Result};

/// Score and commentary payload for create and update
#[derive(Debug, Clone, Deserialize)]
pub struct EvaluationInput {
    pub puntuacion: Option<f64>,
    pub comentarios: Option<String>,
}

pub struct EvaluationService {
    mongo: MongoClient,
    policy: Arc<PolicyTable>,
}

impl EvaluationService {
    pub fn new(mongo: MongoClient, policy: Arc<PolicyTable>) -> Self {
        Self { mongo, policy }
    }

    async fn evaluations(&self) -> Result<MongoCollection<EvaluationDoc>> {
        self.mongo
            .collection::<EvaluationDoc>(EVALUATION_COLLECTION)
            .await
    }

    async fn projects(&self) -> Result<MongoCollection<ProjectDoc>> {
        self.mongo.collection::<ProjectDoc>(PROJECT_COLLECTION).await
    }

    pub async fn create(
        &self,
        project_id: ObjectId,
        data: EvaluationInput,
        actor: ObjectId,
        actor_role: Role,
    ) -> Result<EvaluationDoc> {
        if !self.policy.allows(actor_role, false, Operation::EvaluationCreate) {
            return Err(ClaustroError::Forbidden(
                "No tienes permisos para evaluar proyectos.".into(),
            ));
        }

        let projects = self.projects().await?;
        if projects
            .find_one(doc! { "_id": project_id })
            .await?
            .is_none()
        {
            return Err(ClaustroError::NotFound("Proyecto no encontrado.".into()));
        }

        let puntuacion = require_puntuacion(data.puntuacion)?;

        let evaluations = self.evaluations().await?;
        let duplicate = evaluations
            .find_one(doc! { "project": project_id, "evaluator": actor })
            .await?
            .is_some();
        if duplicate {
            return Err(ClaustroError::Conflict("Ya has evaluado este proyecto.".into()));
        }

        let mut evaluation = EvaluationDoc::new(project_id, actor, puntuacion, data.comentarios);
        let id = evaluations.insert_one(evaluation.clone()).await?;
        evaluation._id = Some(id);

        // Second, separate write; the flag is never cleared again, so a
        // failure here is repaired by any later evaluation of the project.
        projects
            .update_one(
                doc! { "_id": project_id },
                doc! { "$set": { "isEvaluated": true } },
            )
            .await?;

        Ok(evaluation)
    }

    pub async fn update(
        &self,
        id: ObjectId,
        data: EvaluationInput,
        actor: ObjectId,
        actor_role: Role,
    ) -> Result<EvaluationDoc> {
        let evaluations = self.evaluations().await?;
        let mut evaluation = evaluations
            .find_one(doc! { "_id": id })
            .await?
            .ok_or_else(|| ClaustroError::NotFound("Evaluación no encontrada.".into()))?;

        self.check_mutation_gate(&evaluation, actor, actor_role, "actualizar")?;

        if let Some(puntuacion) = data.puntuacion {
            evaluation.puntuacion = require_puntuacion(Some(puntuacion))?;
        }
        if let Some(comentarios) = data.comentarios {
            evaluation.comentarios = Some(comentarios);
        }

        evaluations.replace_one(id, evaluation.clone()).await?;
        Ok(evaluation)
    }

    pub async fn delete(&self, id: ObjectId, actor: ObjectId, actor_role: Role) -> Result<()> {
        let evaluations = self.evaluations().await?;
        let evaluation = evaluations
            .find_one(doc! { "_id": id })
            .await?
            .ok_or_else(|| ClaustroError::NotFound("Evaluación no encontrada.".into()))?;

        self.check_mutation_gate(&evaluation, actor, actor_role, "eliminar")?;

        evaluations.soft_delete(doc! { "_id": id }).await?;
        Ok(())
    }

    pub async fn restore(
        &self,
        id: ObjectId,
        actor: ObjectId,
        actor_role: Role,
    ) -> Result<EvaluationDoc> {
        let evaluations = self.evaluations().await?;
        let evaluation = evaluations
            .find_one_any(doc! { "_id": id })
            .await?
            .ok_or_else(|| ClaustroError::NotFound("Evaluación no encontrada.".into()))?;

        self.check_mutation_gate(&evaluation, actor, actor_role, "restaurar")?;

        if !evaluation.metadata.is_deleted {
            return Err(ClaustroError::BadRequest("La evaluación no está eliminada.".into()));
        }

        evaluations.restore(doc! { "_id": id }).await?;

        let mut restored = evaluation;
        restored.metadata.is_deleted = false;
        restored.metadata.deleted_at = None;
        Ok(restored)
    }

    fn check_mutation_gate(
        &self,
        evaluation: &EvaluationDoc,
        actor: ObjectId,
        actor_role: Role,
        verb: &str,
    ) -> Result<()> {
        let is_own = evaluation.is_evaluator(&actor);
        if !self.policy.allows(actor_role, is_own, Operation::EvaluationMutate) {
            return Err(ClaustroError::Forbidden(format!(
                "No tienes permisos para {} esta evaluación.",
                verb
            )));
        }
        Ok(())
    }

    pub async fn list(
        &self,
        project: Option<ObjectId>,
        evaluator: Option<ObjectId>,
        page: u64,
        limit: u64,
    ) -> Result<Page<EvaluationDoc>> {
        let mut filter = doc! {};
        if let Some(project) = project {
            filter.insert("project", project);
        }
        if let Some(evaluator) = evaluator {
            filter.insert("evaluator", evaluator);
        }

        let evaluations = self.evaluations().await?;
        evaluations.find_page(filter, page, limit).await
    }

    pub async fn by_project(&self, project_id: ObjectId) -> Result<Vec<EvaluationDoc>> {
        let projects = self.projects().await?;
        if projects
            .find_one(doc! { "_id": project_id })
            .await?
            .is_none()
        {
            return Err(ClaustroError::NotFound("Proyecto no encontrado.".into()));
        }

        let evaluations = self.evaluations().await?;
        evaluations.find_many(doc! { "project": project_id }).await
    }
}

/// Scores live in [0, 100].
fn require_puntuacion(value: Option<f64>) -> Result<f64> {
    match value {
        Some(p) if (0.0..=100.0).contains(&p) => Ok(p),
        Some(_) => Err(ClaustroError::BadRequest(
            "La puntuación debe estar entre 0 y 100".into(),
        )),
        None => Err(ClaustroError::BadRequest("La puntuación es requerida".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_puntuacion_bounds() {
        assert_eq!(require_puntuacion(Some(0.0)).unwrap(), 0.0);
        assert_eq!(require_puntuacion(Some(85.0)).unwrap(), 85.0);
        assert_eq!(require_puntuacion(Some(100.0)).unwrap(), 100.0);
        assert!(require_puntuacion(Some(-0.5)).is_err());
        assert!(require_puntuacion(Some(100.5)).is_err());
        assert!(require_puntuacion(None).is_err());
    }
}
