//! Reporting aggregator
//!
//! Read-only projections joining projects, their rosters and their
//! evaluations, rendered as CSV text or as a plain-text outline for the
//! PDF collaborator. Two scopes exist: the administrator's global view and
//! an investigator's own-data view. Nothing here mutates.

use bson::{doc, oid::ObjectId};
use chrono::{DateTime as ChronoDateTime, SecondsFormat, Utc};
use std::collections::HashMap;

use crate::db::schemas::{
    EvaluationDoc, ProjectDoc, UserDoc, EVALUATION_COLLECTION, PROJECT_COLLECTION, USER_COLLECTION,
};
use crate::db::MongoClient;
use crate::types::{ClaustroError, Result};

/// Which slice of the data a report covers
#[derive(Debug, Clone, Copy)]
pub enum ReportScope {
    /// All non-deleted entities
    Global,
    /// Projects the given user participates in, and their evaluations
    Investigator(ObjectId),
}

/// One row of the project report
#[derive(Debug, Clone)]
pub struct ProjectReportRow {
    pub nombre: String,
    pub descripcion: String,
    pub objetivos: String,
    pub presupuesto: f64,
    pub estado: String,
    pub fecha_inicio: String,
    pub fecha_fin: String,
    pub investigadores: String,
    pub recursos: String,
    pub hitos: String,
    pub evaluacion_promedio: String,
}

/// One row of the evaluation report
#[derive(Debug, Clone)]
pub struct EvaluationReportRow {
    pub evaluador_nombre: String,
    pub evaluador_apellido: String,
    pub evaluador_email: String,
    pub evaluador_especializacion: String,
    pub evaluador_rol: String,
    pub proyecto_nombre: String,
    pub proyecto_descripcion: String,
    pub proyecto_estado: String,
    pub puntuacion: f64,
    pub comentarios: String,
    pub fecha_evaluacion: String,
}

pub struct ReportService {
    mongo: MongoClient,
}

impl ReportService {
    pub fn new(mongo: MongoClient) -> Self {
        Self { mongo }
    }

    /// The project report rows for a scope.
    pub async fn project_rows(&self, scope: ReportScope) -> Result<Vec<ProjectReportRow>> {
        let projects = self
            .mongo
            .collection::<ProjectDoc>(PROJECT_COLLECTION)
            .await?;

        let filter = match scope {
            ReportScope::Global => doc! {},
            ReportScope::Investigator(actor) => doc! { "investigadores": actor },
        };
        let projects = projects.find_many(filter).await?;

        if projects.is_empty() {
            return Err(ClaustroError::BadRequest(
                "No se encontraron proyectos para generar el informe".into(),
            ));
        }

        let users = self.load_users(projects.iter().flat_map(|p| &p.investigadores)).await?;
        let evaluations = self.load_evaluations(&projects).await?;

        Ok(projects
            .iter()
            .map(|project| {
                let scores: Vec<f64> = project
                    ._id
                    .map(|id| {
                        evaluations
                            .iter()
                            .filter(|e| e.project == id)
                            .map(|e| e.puntuacion)
                            .collect()
                    })
                    .unwrap_or_default();
                build_project_row(project, &users, &scores)
            })
            .collect())
    }

    /// The evaluation report rows for a scope.
    pub async fn evaluation_rows(&self, scope: ReportScope) -> Result<Vec<EvaluationReportRow>> {
        let projects_col = self
            .mongo
            .collection::<ProjectDoc>(PROJECT_COLLECTION)
            .await?;
        let evaluations_col = self
            .mongo
            .collection::<EvaluationDoc>(EVALUATION_COLLECTION)
            .await?;

        let (projects, evaluations) = match scope {
            ReportScope::Global => {
                let evaluations = evaluations_col.find_many(doc! {}).await?;
                let project_ids: Vec<ObjectId> =
                    evaluations.iter().map(|e| e.project).collect();
                let projects = projects_col
                    .find_many(doc! { "_id": { "$in": project_ids } })
                    .await?;
                (projects, evaluations)
            }
            ReportScope::Investigator(actor) => {
                let projects = projects_col
                    .find_many(doc! { "investigadores": actor })
                    .await?;
                let project_ids: Vec<ObjectId> =
                    projects.iter().filter_map(|p| p._id).collect();
                let evaluations = evaluations_col
                    .find_many(doc! { "project": { "$in": project_ids } })
                    .await?;
                (projects, evaluations)
            }
        };

        if evaluations.is_empty() {
            return Err(ClaustroError::BadRequest(
                "No se encontraron evaluaciones para generar el informe".into(),
            ));
        }

        let users = self.load_users(evaluations.iter().map(|e| &e.evaluator)).await?;
        let projects_by_id: HashMap<ObjectId, &ProjectDoc> = projects
            .iter()
            .filter_map(|p| p._id.map(|id| (id, p)))
            .collect();

        Ok(evaluations
            .iter()
            .map(|evaluation| {
                build_evaluation_row(
                    evaluation,
                    users.get(&evaluation.evaluator),
                    projects_by_id.get(&evaluation.project).copied(),
                )
            })
            .collect())
    }

    pub async fn projects_csv(&self, scope: ReportScope) -> Result<String> {
        Ok(render_projects_csv(&self.project_rows(scope).await?))
    }

    pub async fn evaluations_csv(&self, scope: ReportScope) -> Result<String> {
        Ok(render_evaluations_csv(&self.evaluation_rows(scope).await?))
    }

    /// Project report as the plain-text outline handed to the
    /// PDF-rendering collaborator.
    pub async fn projects_outline(&self, scope: ReportScope) -> Result<Vec<String>> {
        Ok(render_projects_outline(&self.project_rows(scope).await?))
    }

    async fn load_users<'a>(
        &self,
        ids: impl Iterator<Item = &'a ObjectId>,
    ) -> Result<HashMap<ObjectId, UserDoc>> {
        let mut unique: Vec<ObjectId> = ids.copied().collect();
        unique.sort();
        unique.dedup();

        let users = self.mongo.collection::<UserDoc>(USER_COLLECTION).await?;
        let found = users.find_many(doc! { "_id": { "$in": unique } }).await?;

        Ok(found
            .into_iter()
            .filter_map(|u| u._id.map(|id| (id, u)))
            .collect())
    }

    async fn load_evaluations(&self, projects: &[ProjectDoc]) -> Result<Vec<EvaluationDoc>> {
        let ids: Vec<ObjectId> = projects.iter().filter_map(|p| p._id).collect();
        let evaluations = self
            .mongo
            .collection::<EvaluationDoc>(EVALUATION_COLLECTION)
            .await?;
        evaluations
            .find_many(doc! { "project": { "$in": ids } })
            .await
    }
}

fn build_project_row(
    project: &ProjectDoc,
    users: &HashMap<ObjectId, UserDoc>,
    scores: &[f64],
) -> ProjectReportRow {
    let investigadores = project
        .investigadores
        .iter()
        .filter_map(|id| users.get(id))
        .map(|u| format!("{} {} ({})", u.nombre, u.apellido, u.especializacion))
        .collect::<Vec<_>>()
        .join(", ");

    let hitos = project
        .hitos
        .iter()
        .map(|h| format!("{}: {}", h.nombre, format_date(Some(h.fecha))))
        .collect::<Vec<_>>()
        .join("; ");

    ProjectReportRow {
        nombre: project.nombre.clone(),
        descripcion: project.descripcion.clone(),
        objetivos: project.objetivos.clone().unwrap_or_default(),
        presupuesto: project.presupuesto,
        estado: project.estado.to_string(),
        fecha_inicio: format_date(Some(project.cronograma.fecha_inicio)),
        fecha_fin: format_date(Some(project.cronograma.fecha_fin)),
        investigadores,
        recursos: project.recursos.join(", "),
        hitos,
        evaluacion_promedio: average_score(scores),
    }
}

fn build_evaluation_row(
    evaluation: &EvaluationDoc,
    evaluator: Option<&UserDoc>,
    project: Option<&ProjectDoc>,
) -> EvaluationReportRow {
    EvaluationReportRow {
        evaluador_nombre: evaluator.map(|u| u.nombre.clone()).unwrap_or_default(),
        evaluador_apellido: evaluator.map(|u| u.apellido.clone()).unwrap_or_default(),
        evaluador_email: evaluator.map(|u| u.email.clone()).unwrap_or_default(),
        evaluador_especializacion: evaluator
            .map(|u| u.especializacion.clone())
            .unwrap_or_default(),
        evaluador_rol: evaluator
            .map(|u| u.role.to_string())
            .unwrap_or_else(|| "N/A".into()),
        proyecto_nombre: project.map(|p| p.nombre.clone()).unwrap_or_default(),
        proyecto_descripcion: project.map(|p| p.descripcion.clone()).unwrap_or_default(),
        proyecto_estado: project
            .map(|p| p.estado.to_string())
            .unwrap_or_else(|| "N/A".into()),
        puntuacion: evaluation.puntuacion,
        comentarios: evaluation.comentarios.clone().unwrap_or_default(),
        fecha_evaluacion: format_date(Some(evaluation.fecha_evaluacion)),
    }
}

/// Arithmetic mean of the active evaluation scores, "N/A" with none.
pub fn average_score(scores: &[f64]) -> String {
    if scores.is_empty() {
        return "N/A".to_string();
    }
    let mean = scores.iter().sum::<f64>() / scores.len() as f64;
    format!("{:.2}", mean)
}

fn format_date(date: Option<bson::DateTime>) -> String {
    match date {
        Some(d) => d.to_chrono().format("%Y-%m-%d").to_string(),
        None => "N/A".to_string(),
    }
}

fn or_na(value: &str) -> &str {
    if value.is_empty() {
        "N/A"
    } else {
        value
    }
}

const PROJECT_CSV_FIELDS: &[&str] = &[
    "nombre",
    "descripcion",
    "objetivos",
    "presupuesto",
    "estado",
    "fechaInicio",
    "fechaFin",
    "investigadores",
    "recursos",
    "hitos",
    "evaluacionPromedio",
];

const EVALUATION_CSV_FIELDS: &[&str] = &[
    "evaluadorNombre",
    "evaluadorApellido",
    "evaluadorEmail",
    "evaluadorEspecializacion",
    "evaluadorRol",
    "proyectoNombre",
    "proyectoDescripcion",
    "proyectoEstado",
    "puntuacion",
    "comentarios",
    "fechaEvaluacion",
];

pub fn render_projects_csv(rows: &[ProjectReportRow]) -> String {
    let records = rows.iter().map(|r| {
        vec![
            r.nombre.clone(),
            r.descripcion.clone(),
            r.objetivos.clone(),
            r.presupuesto.to_string(),
            r.estado.clone(),
            r.fecha_inicio.clone(),
            r.fecha_fin.clone(),
            r.investigadores.clone(),
            r.recursos.clone(),
            r.hitos.clone(),
            r.evaluacion_promedio.clone(),
        ]
    });
    render_csv(PROJECT_CSV_FIELDS, records)
}

pub fn render_evaluations_csv(rows: &[EvaluationReportRow]) -> String {
    let records = rows.iter().map(|r| {
        vec![
            r.evaluador_nombre.clone(),
            r.evaluador_apellido.clone(),
            r.evaluador_email.clone(),
            r.evaluador_especializacion.clone(),
            r.evaluador_rol.clone(),
            r.proyecto_nombre.clone(),
            r.proyecto_descripcion.clone(),
            r.proyecto_estado.clone(),
            r.puntuacion.to_string(),
            r.comentarios.clone(),
            r.fecha_evaluacion.clone(),
        ]
    });
    render_csv(EVALUATION_CSV_FIELDS, records)
}

fn render_csv(fields: &[&str], records: impl Iterator<Item = Vec<String>>) -> String {
    let mut out = String::new();
    out.push_str(
        &fields
            .iter()
            .map(|f| csv_quote(f))
            .collect::<Vec<_>>()
            .join(","),
    );
    for record in records {
        out.push('\n');
        out.push_str(
            &record
                .iter()
                .map(|f| csv_quote(f))
                .collect::<Vec<_>>()
                .join(","),
        );
    }
    out
}

fn csv_quote(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Section-per-project outline for the PDF collaborator.
pub fn render_projects_outline(rows: &[ProjectReportRow]) -> Vec<String> {
    let mut lines = vec!["Informe Detallado de Proyectos".to_string()];
    for row in rows {
        lines.push(String::new());
        lines.push(row.nombre.clone());
        lines.push(format!("Descripción: {}", or_na(&row.descripcion)));
        lines.push(format!("Objetivos: {}", or_na(&row.objetivos)));
        lines.push(format!("Presupuesto: ${}", row.presupuesto));
        lines.push(format!("Estado: {}", row.estado));
        lines.push(format!("Fecha de inicio: {}", row.fecha_inicio));
        lines.push(format!("Fecha de finalización: {}", row.fecha_fin));
        lines.push(format!("Investigadores: {}", or_na(&row.investigadores)));
        lines.push(format!("Recursos: {}", or_na(&row.recursos)));
        lines.push(format!("Hitos: {}", or_na(&row.hitos)));
        lines.push(format!("Evaluación promedio: {}", row.evaluacion_promedio));
    }
    lines
}

/// Export filename: `<Prefix>_<ISO8601 with ':' and '.' as '-'>.<ext>`
pub fn generate_unique_filename(prefix: &str, extension: &str) -> String {
    filename_at(prefix, extension, Utc::now())
}

fn filename_at(prefix: &str, extension: &str, at: ChronoDateTime<Utc>) -> String {
    let timestamp = at
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-");
    format!("{}_{}.{}", prefix, timestamp, extension)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_average_score() {
        assert_eq!(average_score(&[]), "N/A");
        assert_eq!(average_score(&[85.0]), "85.00");
        assert_eq!(average_score(&[80.0, 90.0]), "85.00");
        assert_eq!(average_score(&[70.0, 80.0, 95.0]), "81.67");
    }

    #[test]
    fn test_csv_quoting() {
        assert_eq!(csv_quote("plain"), "plain");
        assert_eq!(csv_quote("a,b"), "\"a,b\"");
        assert_eq!(csv_quote("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_projects_csv_shape() {
        let row = ProjectReportRow {
            nombre: "Genoma".into(),
            descripcion: "desc, con coma".into(),
            objetivos: String::new(),
            presupuesto: 50000.0,
            estado: "Planeado".into(),
            fecha_inicio: "2026-01-01".into(),
            fecha_fin: "2026-12-31".into(),
            investigadores: "Ana Reyes (Biología)".into(),
            recursos: String::new(),
            hitos: "M1: 2026-03-01".into(),
            evaluacion_promedio: "N/A".into(),
        };

        let csv = render_projects_csv(&[row]);
        let mut lines = csv.lines();
        assert_eq!(
            lines.next().unwrap(),
            "nombre,descripcion,objetivos,presupuesto,estado,fechaInicio,fechaFin,investigadores,recursos,hitos,evaluacionPromedio"
        );
        let data = lines.next().unwrap();
        assert!(data.starts_with("Genoma,\"desc, con coma\""));
        assert!(data.ends_with("N/A"));
        assert!(lines.next().is_none());
    }

    #[test]
    fn test_projects_outline_sections() {
        let row = ProjectReportRow {
            nombre: "Genoma".into(),
            descripcion: "desc".into(),
            objetivos: String::new(),
            presupuesto: 50000.0,
            estado: "Planeado".into(),
            fecha_inicio: "2026-01-01".into(),
            fecha_fin: "2026-12-31".into(),
            investigadores: String::new(),
            recursos: String::new(),
            hitos: String::new(),
            evaluacion_promedio: "85.00".into(),
        };

        let lines = render_projects_outline(&[row]);
        assert_eq!(lines[0], "Informe Detallado de Proyectos");
        assert!(lines.contains(&"Genoma".to_string()));
        assert!(lines.contains(&"Objetivos: N/A".to_string()));
        assert!(lines.contains(&"Evaluación promedio: 85.00".to_string()));
    }

    #[test]
    fn test_filename_format() {
        let at = Utc.with_ymd_and_hms(2026, 8, 6, 12, 30, 45).unwrap();
        let name = filename_at("Project_Reports", "csv", at);
        assert_eq!(name, "Project_Reports_2026-08-06T12-30-45-000Z.csv");

        // No colon or dot survives outside the extension separator.
        let stem = name.strip_suffix(".csv").unwrap();
        assert!(!stem.contains(':'));
        assert!(!stem.contains('.'));
    }
}
