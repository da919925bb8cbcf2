//! BigQuery REST client for the collections table.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info};

use super::auth::{ServiceAccountKey, TokenProvider};
use super::{Collection, CollectionSource, WarehouseError, normalize_status};
use crate::config::BigQueryConfig;

const API_BASE: &str = "https://bigquery.googleapis.com/bigquery/v2";

/// Collections whose name carries this marker are in the target status.
const PANEL_MARKER: &str = "TSUM Collection Panel";

const QUERY_TIMEOUT_MS: u64 = 30_000;
const MAX_POLLS: u32 = 10;

const SELECT_COLUMNS: &str = "collection_id, collection_name, company_id, created_at, updated_at";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: bool,
    job_reference: Option<JobReference>,
    schema: Option<Schema>,
    #[serde(default)]
    rows: Vec<Row>,
    page_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Schema {
    fields: Vec<Field>,
}

#[derive(Debug, Deserialize)]
struct Field {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Row {
    f: Vec<Cell>,
}

#[derive(Debug, Deserialize)]
struct Cell {
    v: Value,
}

/// Row as column name -> scalar text.
type Record = HashMap<String, Option<String>>;

/// A named query parameter.
struct Param<'a> {
    name: &'a str,
    value: &'a str,
}

/// Read-only client for the collections table.
pub struct BigQueryClient {
    http: reqwest::Client,
    tokens: TokenProvider,
    project_id: String,
    table: String,
    company_id: String,
    /// Label assigned to rows carrying [`PANEL_MARKER`].
    status_label: String,
}

impl BigQueryClient {
    pub fn new(config: &BigQueryConfig, status_label: &str) -> Result<Self, WarehouseError> {
        validate_table_name(&config.collections_table)?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(QUERY_TIMEOUT_MS + 15_000))
            .build()?;
        let key = ServiceAccountKey::from_json(&config.credentials_json)?;
        let tokens = TokenProvider::new(key, http.clone())?;

        info!("BigQuery client initialized for project {}", config.project_id);

        Ok(Self {
            http,
            tokens,
            project_id: config.project_id.clone(),
            table: config.collections_table.clone(),
            company_id: config.company_id.clone(),
            status_label: normalize_status(status_label),
        })
    }

    async fn query(&self, sql: &str, params: &[Param<'_>]) -> Result<Vec<Record>, WarehouseError> {
        let mut body = json!({
            "query": sql,
            "useLegacySql": false,
            "timeoutMs": QUERY_TIMEOUT_MS,
        });
        if !params.is_empty() {
            body["parameterMode"] = json!("NAMED");
            body["queryParameters"] = params
                .iter()
                .map(|p| {
                    json!({
                        "name": p.name,
                        "parameterType": { "type": "STRING" },
                        "parameterValue": { "value": p.value },
                    })
                })
                .collect();
        }

        let url = format!("{API_BASE}/projects/{}/queries", self.project_id);
        let mut response: QueryResponse = self.send(self.http.post(&url).json(&body)).await?;

        let mut polls = 0;
        while !response.job_complete {
            polls += 1;
            let job = response
                .job_reference
                .clone()
                .ok_or_else(|| WarehouseError::Malformed("incomplete job without reference".into()))?;
            if polls > MAX_POLLS {
                return Err(WarehouseError::JobIncomplete(job.job_id));
            }
            debug!("Query job {} still running (poll {})", job.job_id, polls);
            response = self.results_page(&job, None).await?;
        }

        let fields: Vec<String> = response
            .schema
            .as_ref()
            .map(|s| s.fields.iter().map(|f| f.name.clone()).collect())
            .unwrap_or_default();

        let mut records: Vec<Record> = Vec::new();
        loop {
            records.extend(response.rows.drain(..).map(|row| to_record(&fields, row)));

            let Some(token) = response.page_token.take() else {
                break;
            };
            let job = response
                .job_reference
                .clone()
                .ok_or_else(|| WarehouseError::Malformed("paged result without job reference".into()))?;
            response = self.results_page(&job, Some(&token)).await?;
        }

        Ok(records)
    }

    async fn results_page(
        &self,
        job: &JobReference,
        page_token: Option<&str>,
    ) -> Result<QueryResponse, WarehouseError> {
        let url = format!("{API_BASE}/projects/{}/queries/{}", self.project_id, job.job_id);
        let timeout = QUERY_TIMEOUT_MS.to_string();
        let mut query: Vec<(&str, &str)> = vec![("timeoutMs", timeout.as_str())];
        if let Some(location) = job.location.as_deref() {
            query.push(("location", location));
        }
        if let Some(token) = page_token {
            query.push(("pageToken", token));
        }

        let mut response: QueryResponse = self.send(self.http.get(&url).query(&query)).await?;
        if response.job_reference.is_none() {
            response.job_reference = Some(job.clone());
        }
        Ok(response)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<QueryResponse, WarehouseError> {
        let token = self.tokens.token().await?;
        let response = request.bearer_auth(token).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WarehouseError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }

    fn to_collection(&self, record: Record) -> Option<Collection> {
        let collection_id = field(&record, "collection_id")?;
        let collection_name = field(&record, "collection_name").unwrap_or_default();
        let status = derive_status(&collection_name, &self.status_label);

        Some(Collection {
            collection_id,
            collection_name,
            company_id: field(&record, "company_id"),
            status,
            created_at: field(&record, "created_at").as_deref().and_then(parse_timestamp),
            updated_at: field(&record, "updated_at").as_deref().and_then(parse_timestamp),
        })
    }

    fn to_collections(&self, records: Vec<Record>) -> Vec<Collection> {
        records
            .into_iter()
            .filter_map(|r| self.to_collection(r))
            .collect()
    }
}

#[async_trait]
impl CollectionSource for BigQueryClient {
    async fn collections_with_status(&self, status: &str) -> Result<Vec<Collection>, WarehouseError> {
        let wanted = normalize_status(status);
        if wanted != self.status_label {
            debug!("No derivation rule for status '{}'", status);
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM `{}` \
             WHERE company_id = @company_id \
             AND collection_name LIKE '%{PANEL_MARKER}%' \
             ORDER BY created_at DESC",
            self.table
        );
        let records = self
            .query(
                &sql,
                &[Param {
                    name: "company_id",
                    value: &self.company_id,
                }],
            )
            .await?;

        let collections: Vec<Collection> = self
            .to_collections(records)
            .into_iter()
            .filter(|c| normalize_status(&c.status) == wanted)
            .collect();

        info!("Found {} collections with status '{}'", collections.len(), status);
        Ok(collections)
    }

    async fn all_collections(&self) -> Result<Vec<Collection>, WarehouseError> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM `{}` ORDER BY created_at DESC",
            self.table
        );
        let collections = self.to_collections(self.query(&sql, &[]).await?);

        info!("Found {} collections", collections.len());
        Ok(collections)
    }

    async fn collection_by_id(&self, collection_id: &str) -> Result<Option<Collection>, WarehouseError> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM `{}` WHERE collection_id = @collection_id LIMIT 1",
            self.table
        );
        let records = self
            .query(
                &sql,
                &[Param {
                    name: "collection_id",
                    value: collection_id,
                }],
            )
            .await?;

        Ok(self.to_collections(records).into_iter().next())
    }
}

/// Status is derived from the name: one rule for every query.
fn derive_status(collection_name: &str, status_label: &str) -> String {
    if collection_name.contains(PANEL_MARKER) {
        status_label.to_string()
    } else {
        String::new()
    }
}

fn to_record(fields: &[String], row: Row) -> Record {
    fields
        .iter()
        .cloned()
        .zip(row.f.into_iter().map(|cell| scalar(cell.v)))
        .collect()
}

fn scalar(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

fn field(record: &Record, name: &str) -> Option<String> {
    record.get(name).cloned().flatten()
}

/// TIMESTAMP columns arrive as epoch seconds ("1.7023e9" or "1702300000.5");
/// DATETIME and STRING columns as ISO text.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(secs) = raw.parse::<f64>() {
        let micros = (secs * 1_000_000.0).round() as i64;
        return DateTime::from_timestamp_micros(micros);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// The table name is interpolated into SQL, so only allow identifier characters.
fn validate_table_name(table: &str) -> Result<(), WarehouseError> {
    let valid = !table.is_empty()
        && table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(WarehouseError::Credentials(format!(
            "invalid table name '{table}'"
        )))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, Timelike};

    use super::*;

    #[test]
    fn test_derive_status() {
        assert_eq!(derive_status("TSUM Collection Panel 10.12.2025", "tsum cs"), "tsum cs");
        assert_eq!(derive_status("tsum collection panel", "tsum cs"), "");
        assert_eq!(derive_status("Other", "tsum cs"), "");
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let epoch = parse_timestamp("1.7023e9").unwrap();
        assert_eq!(epoch.timestamp(), 1_702_300_000);

        let iso = parse_timestamp("2025-12-10T19:33:11.5").unwrap();
        assert_eq!((iso.year(), iso.month(), iso.day(), iso.hour()), (2025, 12, 10, 19));

        assert!(parse_timestamp("2025-12-10 19:33:11").is_some());
        assert!(parse_timestamp("2025-12-10T19:33:11+03:00").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_response_rows_to_records() {
        let response: QueryResponse = serde_json::from_str(
            r#"{
                "jobComplete": true,
                "schema": {"fields": [{"name": "collection_id"}, {"name": "collection_name"}, {"name": "created_at"}]},
                "rows": [
                    {"f": [{"v": "c1"}, {"v": "TSUM Collection Panel A"}, {"v": "1.7e9"}]},
                    {"f": [{"v": "c2"}, {"v": null}, {"v": null}]}
                ]
            }"#,
        )
        .unwrap();

        let fields: Vec<String> = response.schema.unwrap().fields.into_iter().map(|f| f.name).collect();
        let records: Vec<Record> = response.rows.into_iter().map(|r| to_record(&fields, r)).collect();

        assert_eq!(field(&records[0], "collection_id").as_deref(), Some("c1"));
        assert_eq!(field(&records[1], "collection_name"), None);
        assert_eq!(field(&records[1], "missing"), None);
    }

    #[test]
    fn test_table_name_validation() {
        assert!(validate_table_name("looky-374212.mosaica.showoff_custom_collections").is_ok());
        assert!(validate_table_name("x`; DROP TABLE y; --").is_err());
        assert!(validate_table_name("").is_err());
    }
}
