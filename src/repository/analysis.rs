// 📝 Analysis Repository - append-only audit log of analysis runs

use crate::error::StorageResult;
use crate::warehouse::Session;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::Serialize;
use serde_json::Value;

/// Stored analysis snapshot as read back from the log.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRecord {
    pub id: i64,
    pub analysis_name: String,
    pub result: Value,
    pub parameters: Option<Value>,
    pub created_at: String,
}

pub struct AnalysisRepository<'s, 'w> {
    session: &'s Session<'w>,
}

impl<'s, 'w> AnalysisRepository<'s, 'w> {
    pub fn new(session: &'s Session<'w>) -> Self {
        AnalysisRepository { session }
    }

    /// Append a result. Rows are never updated or deleted.
    pub fn save_result<R: Serialize>(
        &self,
        name: &str,
        result: &R,
        parameters: Option<&Value>,
    ) -> StorageResult<i64> {
        let result_json = serde_json::to_string(result)?;
        let parameters_json = parameters.map(serde_json::to_string).transpose()?;
        let created_at = Utc::now().to_rfc3339();

        let conn = self.session.connection()?;
        conn.execute(
            "INSERT INTO analysis_results (analysis_name, result_json, parameters, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![name, result_json, parameters_json, created_at],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// Most recent result saved under `name`.
    pub fn latest_result(&self, name: &str) -> StorageResult<Option<AnalysisRecord>> {
        let conn = self.session.connection()?;
        let row = conn
            .query_row(
                "SELECT id, analysis_name, result_json, parameters, created_at
                 FROM analysis_results
                 WHERE analysis_name = ?1
                 ORDER BY created_at DESC, id DESC
                 LIMIT 1",
                [name],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, analysis_name, result_json, parameters, created_at)) = row else {
            return Ok(None);
        };

        Ok(Some(AnalysisRecord {
            id,
            analysis_name,
            result: serde_json::from_str(&result_json)?,
            parameters: parameters.as_deref().map(serde_json::from_str).transpose()?,
            created_at,
        }))
    }

    pub fn results_count(&self, name: &str) -> StorageResult<i64> {
        let conn = self.session.connection()?;
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM analysis_results WHERE analysis_name = ?1",
            [name],
            |row| row.get(0),
        )?)
    }

    /// Creation time of a record, when it parses as RFC 3339.
    pub fn created_at(record: &AnalysisRecord) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&record.created_at)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::Warehouse;
    use serde_json::json;

    #[test]
    fn test_latest_result_returns_newest() {
        let warehouse = Warehouse::open_in_memory().unwrap();
        let session = warehouse.session();
        let repo = AnalysisRepository::new(&session);

        let first = repo.save_result("full_analysis", &json!({"run": 1}), None).unwrap();
        let params = json!({"timestamp": "2024-05-01T00:00:00"});
        let second = repo
            .save_result("full_analysis", &json!({"run": 2}), Some(&params))
            .unwrap();
        repo.save_result("other", &json!({"run": 3}), None).unwrap();
        session.commit().unwrap();

        assert!(second > first);
        let latest = repo.latest_result("full_analysis").unwrap().unwrap();
        assert_eq!(latest.id, second);
        assert_eq!(latest.result, json!({"run": 2}));
        assert_eq!(latest.parameters, Some(params));
        assert!(AnalysisRepository::created_at(&latest).is_some());

        assert_eq!(repo.results_count("full_analysis").unwrap(), 2);
    }

    #[test]
    fn test_latest_result_missing_name() {
        let warehouse = Warehouse::open_in_memory().unwrap();
        let session = warehouse.session();
        let repo = AnalysisRepository::new(&session);

        assert!(repo.latest_result("nothing").unwrap().is_none());
        assert_eq!(repo.results_count("nothing").unwrap(), 0);
    }
}
