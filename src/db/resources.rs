use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use super::types::parse_column;
use super::{DbError, LearningDb, NewResource, NewRule};
use crate::types::{AdaptiveRule, Resource, ResourceLevel};

/// Concept tag for resources that apply to any concept.
pub const GENERAL_CONCEPT: &str = "General";

impl LearningDb {
    // =========================================================================
    // Resources (bandit arms)
    // =========================================================================

    /// Insert a resource and its concept tags. Returns the new id.
    pub fn insert_resource(&self, resource: &NewResource) -> Result<i64, DbError> {
        self.with_transaction(|db| {
            db.conn.execute(
                "INSERT INTO resources (title, url, resource_type, level, estimated_time, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    resource.title,
                    resource.url,
                    resource.resource_type.as_str(),
                    resource.level.as_str(),
                    resource.estimated_time,
                    Utc::now(),
                ],
            )?;
            let id = db.conn.last_insert_rowid();
            for concept in &resource.concepts {
                db.conn.execute(
                    "INSERT OR IGNORE INTO resource_concepts (resource_id, concept) VALUES (?1, ?2)",
                    params![id, concept],
                )?;
            }
            Ok(id)
        })
    }

    /// Look up one resource with its concept tags.
    pub fn get_resource(&self, id: i64) -> Result<Option<Resource>, DbError> {
        let row = self
            .conn
            .query_row(
                "SELECT id, title, url, resource_type, level, estimated_time
                 FROM resources WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Resource {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        url: row.get(2)?,
                        resource_type: parse_column(3, row.get(3)?)?,
                        level: parse_column(4, row.get(4)?)?,
                        estimated_time: row.get(5)?,
                        concepts: Vec::new(),
                    })
                },
            )
            .optional()?;

        match row {
            Some(mut resource) => {
                resource.concepts = self.get_resource_concepts(id)?;
                Ok(Some(resource))
            }
            None => Ok(None),
        }
    }

    fn get_resource_concepts(&self, resource_id: i64) -> Result<Vec<String>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT concept FROM resource_concepts WHERE resource_id = ?1 ORDER BY concept",
        )?;
        let rows = stmt.query_map(params![resource_id], |row| row.get(0))?;
        let mut concepts = Vec::new();
        for row in rows {
            concepts.push(row?);
        }
        Ok(concepts)
    }

    /// Candidate arm ids for a concept, ascending.
    ///
    /// Resources at `level` are preferred, then any resource for the concept.
    /// When nothing targets the concept directly, resources tagged `General`
    /// are used the same way.
    pub fn list_candidate_resources(
        &self,
        concept: &str,
        level: ResourceLevel,
    ) -> Result<Vec<i64>, DbError> {
        let direct = self.candidates_with_fallback(concept, level)?;
        if !direct.is_empty() || concept == GENERAL_CONCEPT {
            return Ok(direct);
        }
        self.candidates_with_fallback(GENERAL_CONCEPT, level)
    }

    fn candidates_with_fallback(
        &self,
        concept: &str,
        level: ResourceLevel,
    ) -> Result<Vec<i64>, DbError> {
        let at_level = self.resource_ids_for_concept(concept, Some(level))?;
        if !at_level.is_empty() {
            return Ok(at_level);
        }
        self.resource_ids_for_concept(concept, None)
    }

    fn resource_ids_for_concept(
        &self,
        concept: &str,
        level: Option<ResourceLevel>,
    ) -> Result<Vec<i64>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT rc.resource_id
             FROM resource_concepts rc
             JOIN resources r ON r.id = rc.resource_id
             WHERE rc.concept = ?1 AND (?2 IS NULL OR r.level = ?2)
             ORDER BY rc.resource_id",
        )?;
        let rows = stmt.query_map(params![concept, level.map(|l| l.as_str())], |row| {
            row.get(0)
        })?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }

    // =========================================================================
    // Adaptive rules
    // =========================================================================

    /// Insert an instructor rule. Returns the new id.
    pub fn insert_adaptive_rule(&self, rule: &NewRule) -> Result<i64, DbError> {
        self.conn.execute(
            "INSERT INTO adaptive_rules (course_id, concept, threshold, resource_id, is_active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                rule.course_id,
                rule.concept,
                rule.threshold,
                rule.resource_id,
                rule.is_active,
                Utc::now(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// All rules of a course in creation order, active or not.
    pub fn list_adaptive_rules(&self, course_id: i64) -> Result<Vec<AdaptiveRule>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, course_id, concept, threshold, resource_id, is_active, created_at
             FROM adaptive_rules
             WHERE course_id = ?1
             ORDER BY created_at ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![course_id], |row| {
            Ok(AdaptiveRule {
                id: row.get(0)?,
                course_id: row.get(1)?,
                concept: row.get(2)?,
                threshold: row.get(3)?,
                resource_id: row.get(4)?,
                is_active: row.get(5)?,
                created_at: row.get(6)?,
            })
        })?;

        let mut rules = Vec::new();
        for row in rows {
            rules.push(row?);
        }
        Ok(rules)
    }
}
