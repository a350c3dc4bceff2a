//! Evaluation document schema
//!
//! One administrator's scored review of a project. The partial unique
//! index on (project, evaluator) backs the one-evaluation-per-pair rule.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for evaluations
pub const EVALUATION_COLLECTION: &str = "evaluations";

/// Evaluation document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationDoc {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    pub project: ObjectId,

    /// The administrator who authored this evaluation; only they may
    /// mutate it afterwards
    pub evaluator: ObjectId,

    /// Score in [0, 100]
    pub puntuacion: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub comentarios: Option<String>,

    pub fecha_evaluacion: DateTime,
}

impl EvaluationDoc {
    pub fn new(
        project: ObjectId,
        evaluator: ObjectId,
        puntuacion: f64,
        comentarios: Option<String>,
    ) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            project,
            evaluator,
            puntuacion,
            comentarios,
            fecha_evaluacion: DateTime::now(),
        }
    }

    pub fn is_evaluator(&self, user_id: &ObjectId) -> bool {
        self.evaluator == *user_id
    }

    pub fn view_json(&self) -> Value {
        json!({
            "id": self._id.map(|id| id.to_hex()).unwrap_or_default(),
            "project": self.project.to_hex(),
            "evaluator": self.evaluator.to_hex(),
            "puntuacion": self.puntuacion,
            "comentarios": self.comentarios,
            "fechaEvaluacion": self.fecha_evaluacion.try_to_rfc3339_string().unwrap_or_default(),
            "isDeleted": self.metadata.is_deleted,
        })
    }
}

impl IntoIndexes for EvaluationDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "project": 1, "evaluator": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .partial_filter_expression(doc! { "metadata.is_deleted": false })
                        .name("project_evaluator_unique_active".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "evaluator": 1 },
                Some(
                    IndexOptions::builder()
                        .name("evaluator_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for EvaluationDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evaluator_ownership() {
        let evaluator = ObjectId::new();
        let other = ObjectId::new();
        let eval = EvaluationDoc::new(ObjectId::new(), evaluator, 85.0, None);

        assert!(eval.is_evaluator(&evaluator));
        assert!(!eval.is_evaluator(&other));
    }
}
