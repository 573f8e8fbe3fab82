//! PostgREST client for the remote to-do table

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use todo_sync_api::{RemoteRecordStore, Result, SortOrder, SyncError, TodoRecord};
use tracing::{debug, info};

use crate::http::SupabaseHttp;

/// Makes PostgREST answer with a single object, and fail unless exactly one
/// row is returned
const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

pub struct PostgrestClient {
    http: SupabaseHttp,
    table: String,
}

impl PostgrestClient {
    pub fn new(http: SupabaseHttp, table: impl Into<String>) -> Self {
        Self {
            http,
            table: table.into(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn table_url(&self) -> String {
        self.http.url(&format!("rest/v1/{}", self.table))
    }

    async fn select(&self, query: Vec<(&str, String)>, operation: &str) -> Result<Vec<TodoRecord>> {
        let url = self.table_url();
        let request = self.http.client().get(&url).query(&query);
        let body = self.http.execute(request, &url, operation).await?;
        let rows = decode_rows(&body)?;
        debug!(
            "[PostgrestClient] {} returned {} rows from {}",
            operation,
            rows.len(),
            self.table
        );
        Ok(rows)
    }
}

#[async_trait]
impl RemoteRecordStore for PostgrestClient {
    async fn select_all(&self, order: &SortOrder) -> Result<Vec<TodoRecord>> {
        self.select(
            vec![("select", "*".to_string()), ("order", order_param(order))],
            "select",
        )
        .await
    }

    async fn select_filtered(
        &self,
        title_like: &str,
        order: &SortOrder,
    ) -> Result<Vec<TodoRecord>> {
        self.select(
            vec![
                ("select", "*".to_string()),
                ("title", format!("ilike.{}", title_like)),
                ("order", order_param(order)),
            ],
            "select filtered",
        )
        .await
    }

    async fn insert_one(&self, record: &TodoRecord) -> Result<TodoRecord> {
        let url = self.table_url();
        let request = self
            .http
            .client()
            .post(&url)
            .query(&[("select", "*")])
            .header("Prefer", "return=representation")
            .header(ACCEPT, SINGLE_OBJECT)
            .json(record);
        let body = self.http.execute(request, &url, "insert").await?;

        let row: TodoRecord = serde_json::from_slice(&body)
            .map_err(|e| SyncError::decode(format!("Failed to decode inserted row: {}", e)))?;
        let id = row
            .id()
            .ok_or_else(|| SyncError::decode("inserted row came back without an id"))?;

        info!("[PostgrestClient] Inserted row {} into {}", id, self.table);
        Ok(row)
    }

    async fn update_one(&self, id: i64, record: &TodoRecord) -> Result<()> {
        let url = self.table_url();
        let request = self
            .http
            .client()
            .patch(&url)
            .query(&[("id", id_filter(id))])
            .header("Prefer", "return=representation")
            .json(record);
        let body = self.http.execute(request, &url, "update").await?;
        ensure_matched(&body, id, "update")?;

        debug!("[PostgrestClient] Updated row {} in {}", id, self.table);
        Ok(())
    }

    async fn delete_one(&self, id: i64) -> Result<()> {
        let url = self.table_url();
        let request = self
            .http
            .client()
            .delete(&url)
            .query(&[("id", id_filter(id))])
            .header("Prefer", "return=representation");
        let body = self.http.execute(request, &url, "delete").await?;
        ensure_matched(&body, id, "delete")?;

        info!("[PostgrestClient] Deleted row {} from {}", id, self.table);
        Ok(())
    }
}

fn order_param(order: &SortOrder) -> String {
    format!(
        "{}.{}",
        order.column,
        if order.ascending { "asc" } else { "desc" }
    )
}

fn id_filter(id: i64) -> String {
    format!("eq.{}", id)
}

fn decode_rows(body: &[u8]) -> Result<Vec<TodoRecord>> {
    serde_json::from_slice(body)
        .map_err(|e| SyncError::decode(format!("Failed to decode to-do rows: {}", e)))
}

/// PostgREST answers 2xx even when the id filter matched nothing
fn ensure_matched(body: &[u8], id: i64, operation: &str) -> Result<()> {
    if decode_rows(body)?.is_empty() {
        return Err(SyncError::remote(
            operation,
            format!("no row with id {}", id),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_order_param() {
        assert_eq!(order_param(&SortOrder::by_id()), "id.asc");
        assert_eq!(order_param(&SortOrder::descending("title")), "title.desc");
    }

    #[test]
    fn test_id_filter() {
        assert_eq!(id_filter(42), "eq.42");
    }

    #[test]
    fn test_decode_rows() {
        let body = br#"[{"id":1,"title":"A","done":false,"image_url":null},
                        {"id":2,"title":"B","done":true,"image_url":"b.png"}]"#;
        let rows = decode_rows(body).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], TodoRecord::persisted(2, "B", true, Some("b.png".into())));

        assert!(decode_rows(b"{\"message\":\"oops\"}").unwrap_err().is_decode());
    }

    #[test]
    fn test_ensure_matched() {
        assert!(ensure_matched(br#"[{"id":3,"title":"C","done":false}]"#, 3, "update").is_ok());
        let err = ensure_matched(b"[]", 3, "delete").unwrap_err();
        assert!(err.is_remote());
        assert_eq!(err.to_string(), "Remote delete failed: no row with id 3");
    }

    #[test]
    fn test_table_url() {
        let http =
            SupabaseHttp::new("https://demo.supabase.co", "key", Duration::from_secs(5)).unwrap();
        let client = PostgrestClient::new(http, "todos");
        assert_eq!(client.table(), "todos");
        assert_eq!(client.table_url(), "https://demo.supabase.co/rest/v1/todos");
    }
}
