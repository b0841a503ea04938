// PostgREST backend for the managed database service.
//
// Tables live under `/rest/v1/<table>`, procedures under `/rest/v1/rpc/<name>`.
// Every request carries the service key as both `apikey` and bearer token.

use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder, Response};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{DataService, REMOVE_DUPLICATES_PROCEDURE};
use crate::error::{StoreError, StoreResult};
use crate::models::{Company, TransactionPage, TransactionWithCompany};
use crate::query::{Predicate, TransactionQuery};

const TRANSACTIONS_TABLE: &str = "transactions";
const COMPANIES_TABLE: &str = "companies_data";

/// Rows plus their embedded company
const LIST_SELECT: &str = "*,companies_data(*)";

pub struct RestStore {
    client: Client,
    base_url: String,
    service_key: String,
}

impl RestStore {
    pub fn new(base_url: &str, service_key: &str) -> StoreResult<Self> {
        let client = Client::builder().build()?;
        Ok(RestStore {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key: service_key.to_string(),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn rpc_url(&self, procedure: &str) -> String {
        format!("{}/rest/v1/rpc/{}", self.base_url, procedure)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }
}

/// Turn non-2xx responses into `StoreError::Remote` with the body attached
async fn ensure_success(response: Response) -> StoreResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(StoreError::Remote {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl DataService for RestStore {
    async fn list_transactions(&self, query: &TransactionQuery) -> StoreResult<TransactionPage> {
        let params = query_params(query);
        debug!(?params, "listing transactions");

        let response = self
            .authorized(self.client.get(self.table_url(TRANSACTIONS_TABLE)))
            .query(&params)
            .header("Prefer", "count=exact")
            .send()
            .await?;
        let response = ensure_success(response).await?;

        let total = response
            .headers()
            .get(header::CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(total_from_content_range);

        let body = response.bytes().await?;
        let rows: Vec<TransactionWithCompany> = serde_json::from_slice(&body)?;

        let total = match total {
            Some(total) => total,
            None => {
                warn!("data service sent no exact count, using page size");
                rows.len() as u64
            }
        };

        Ok(TransactionPage { rows, total })
    }

    async fn update_transaction_status(&self, cnpj: &str, status: &str) -> StoreResult<Option<u64>> {
        let response = self
            .authorized(self.client.patch(self.table_url(TRANSACTIONS_TABLE)))
            .query(&[("cpf_cnpj_loja", format!("eq.{}", cnpj))])
            .header("Prefer", "return=minimal")
            .json(&json!({ "status": status }))
            .send()
            .await?;
        ensure_success(response).await?;

        Ok(None)
    }

    async fn upsert_company(&self, company: &Company) -> StoreResult<()> {
        let response = self
            .authorized(self.client.post(self.table_url(COMPANIES_TABLE)))
            .query(&[("on_conflict", "cnpj")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(company)
            .send()
            .await?;
        ensure_success(response).await?;

        Ok(())
    }

    async fn remove_duplicate_transactions(&self) -> StoreResult<Option<u64>> {
        let response = self
            .authorized(self.client.post(self.rpc_url(REMOVE_DUPLICATES_PROCEDURE)))
            .json(&json!({}))
            .send()
            .await?;
        let response = ensure_success(response).await?;

        let body = response.bytes().await?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        let value: Value = serde_json::from_slice(&body)?;
        Ok(procedure_count(&value))
    }
}

// ============================================================================
// QUERY TRANSLATION
// ============================================================================

/// Quote a value for use inside a PostgREST `or=(...)` list
fn quoted(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{}\"", escaped)
}

/// LIKE-escape a search term so `%`, `_` and `\` match literally, like the
/// SQLite backend. PostgREST turns every `*` into `%`, so a literal `*` can
/// only be approximated by `_` (any single character).
fn ilike_literal(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for ch in term.chars() {
        match ch {
            '\\' | '%' | '_' => {
                out.push('\\');
                out.push(ch);
            }
            '*' => out.push('_'),
            _ => out.push(ch),
        }
    }
    out
}

/// PostgREST query parameters for a listing
pub fn query_params(query: &TransactionQuery) -> Vec<(String, String)> {
    let mut params = vec![("select".to_string(), LIST_SELECT.to_string())];

    for predicate in &query.predicates {
        match predicate {
            Predicate::ContainsAny { columns, term } => {
                let pattern = quoted(&format!("*{}*", ilike_literal(term)));
                let alternatives: Vec<String> = columns
                    .iter()
                    .map(|c| format!("{}.ilike.{}", c.name(), pattern))
                    .collect();
                params.push(("or".to_string(), format!("({})", alternatives.join(","))));
            }
            Predicate::Equals { column, value } => {
                params.push((column.name().to_string(), format!("eq.{}", value)));
            }
            Predicate::GreaterThan { column, value } => {
                params.push((column.name().to_string(), format!("gt.{}", value)));
            }
        }
    }

    if !query.order.is_empty() {
        let order: Vec<String> = query
            .order
            .iter()
            .map(|k| format!("{}.{}", k.column.name(), if k.descending { "desc" } else { "asc" }))
            .collect();
        params.push(("order".to_string(), order.join(",")));
    }

    params.push(("offset".to_string(), query.window.offset.to_string()));
    params.push(("limit".to_string(), query.window.limit.to_string()));

    params
}

/// Total from a `Content-Range: 0-15/123` header; `None` when unknown (`*`)
pub fn total_from_content_range(value: &str) -> Option<u64> {
    value.rsplit_once('/')?.1.trim().parse().ok()
}

/// Row count reported by a procedure: a bare number, a single-field object,
/// or a one-element array wrapping either
pub fn procedure_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::Object(map) if map.len() == 1 => map.values().next().and_then(procedure_count),
        Value::Array(items) if items.len() == 1 => procedure_count(&items[0]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::ListParams;

    fn param<'a>(params: &'a [(String, String)], key: &str) -> Vec<&'a str> {
        params
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    #[test]
    fn test_unfiltered_listing_params() {
        let params = query_params(&ListParams::default().to_query());

        assert_eq!(param(&params, "select"), vec!["*,companies_data(*)"]);
        assert_eq!(param(&params, "order"), vec!["valor.desc,data_transacao.desc"]);
        assert_eq!(param(&params, "offset"), vec!["0"]);
        assert_eq!(param(&params, "limit"), vec!["16"]);
        assert!(param(&params, "or").is_empty());
    }

    #[test]
    fn test_filters_translate_to_operators() {
        let list = ListParams {
            page: Some("2".to_string()),
            items_per_page: Some("5".to_string()),
            search: Some("Padaria".to_string()),
            status: Some("paid".to_string()),
            data_transacao: Some("2024-03-01".to_string()),
            above10k: Some("true".to_string()),
        };
        let params = query_params(&list.to_query());

        assert_eq!(
            param(&params, "or"),
            vec![
                "(nome_loja.ilike.\"*Padaria*\",cpf_cnpj_loja.ilike.\"*Padaria*\",tid.ilike.\"*Padaria*\")"
            ]
        );
        assert_eq!(param(&params, "status"), vec!["eq.paid"]);
        assert_eq!(param(&params, "data_transacao"), vec!["eq.2024-03-01"]);
        assert_eq!(param(&params, "valor"), vec!["gt.10000"]);
        assert_eq!(param(&params, "offset"), vec!["5"]);
        assert_eq!(param(&params, "limit"), vec!["5"]);
    }

    #[test]
    fn test_search_term_is_quoted() {
        let list = ListParams {
            search: Some("a,b\"c".to_string()),
            ..Default::default()
        };
        let params = query_params(&list.to_query());
        let or = param(&params, "or")[0];

        assert!(or.starts_with("(nome_loja.ilike.\"*a,b\\\"c*\","));
    }

    #[test]
    fn test_search_wildcards_match_literally() {
        let list = ListParams {
            search: Some("50%_off".to_string()),
            ..Default::default()
        };
        let params = query_params(&list.to_query());
        let or = param(&params, "or")[0];

        // LIKE escapes, then doubled again by the quoting
        assert!(or.starts_with("(nome_loja.ilike.\"*50\\\\%\\\\_off*\","));

        assert_eq!(ilike_literal("a\\b"), "a\\\\b");
        assert_eq!(ilike_literal("2*3"), "2_3");
        assert_eq!(ilike_literal("Padaria"), "Padaria");
    }

    #[test]
    fn test_total_from_content_range() {
        assert_eq!(total_from_content_range("0-15/123"), Some(123));
        assert_eq!(total_from_content_range("*/0"), Some(0));
        assert_eq!(total_from_content_range("0-15/*"), None);
        assert_eq!(total_from_content_range("garbage"), None);
    }

    #[test]
    fn test_procedure_count_shapes() {
        assert_eq!(procedure_count(&json!(3)), Some(3));
        assert_eq!(procedure_count(&json!({"deleted_count": 4})), Some(4));
        assert_eq!(procedure_count(&json!([{"deleted_count": 5}])), Some(5));
        assert_eq!(procedure_count(&Value::Null), None);
        assert_eq!(procedure_count(&json!({"a": 1, "b": 2})), None);
    }

    #[test]
    fn test_urls() {
        let store = RestStore::new("https://db.example.com/", "key").unwrap();
        assert_eq!(
            store.table_url("transactions"),
            "https://db.example.com/rest/v1/transactions"
        );
        assert_eq!(
            store.rpc_url(REMOVE_DUPLICATES_PROCEDURE),
            "https://db.example.com/rest/v1/rpc/remove_duplicate_transactions"
        );
    }
}
