// Transaction listing query: an explicit list of typed predicates plus a sort
// order and an offset/limit window. Backends translate it to SQL or to
// PostgREST query parameters.

use serde::Deserialize;

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_ITEMS_PER_PAGE: u64 = 16;

/// Amount above which `above10k=true` keeps a transaction (strictly greater)
pub const HIGH_VALUE_THRESHOLD: f64 = 10_000.0;

// ============================================================================
// COLUMNS & PREDICATES
// ============================================================================

/// Filterable / sortable columns of the `transactions` table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    NomeLoja,
    CpfCnpjLoja,
    Tid,
    Status,
    DataTransacao,
    Valor,
}

impl Column {
    pub fn name(&self) -> &'static str {
        match self {
            Column::NomeLoja => "nome_loja",
            Column::CpfCnpjLoja => "cpf_cnpj_loja",
            Column::Tid => "tid",
            Column::Status => "status",
            Column::DataTransacao => "data_transacao",
            Column::Valor => "valor",
        }
    }
}

/// Columns the free-text search looks into
pub const SEARCH_COLUMNS: [Column; 3] = [Column::NomeLoja, Column::CpfCnpjLoja, Column::Tid];

/// A single filter condition. All predicates of a query are AND-combined.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Case-insensitive substring match against any of the columns (OR)
    ContainsAny { columns: Vec<Column>, term: String },

    /// Exact equality
    Equals { column: Column, value: String },

    /// Strictly greater than
    GreaterThan { column: Column, value: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub column: Column,
    pub descending: bool,
}

impl SortKey {
    pub fn desc(column: Column) -> Self {
        SortKey {
            column,
            descending: true,
        }
    }
}

/// Offset/limit window over the sorted matches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub offset: u64,
    pub limit: u64,
}

impl Window {
    /// Window for a 1-based page number
    pub fn for_page(page: u64, items_per_page: u64) -> Self {
        let page = page.max(1);
        let limit = items_per_page.max(1);
        Window {
            offset: (page - 1).saturating_mul(limit),
            limit,
        }
    }
}

// ============================================================================
// QUERY
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct TransactionQuery {
    pub predicates: Vec<Predicate>,
    pub order: Vec<SortKey>,
    pub window: Window,
}

impl TransactionQuery {
    /// Unfiltered query sorted by amount, then date, both descending
    pub fn new(window: Window) -> Self {
        TransactionQuery {
            predicates: Vec::new(),
            order: vec![SortKey::desc(Column::Valor), SortKey::desc(Column::DataTransacao)],
            window,
        }
    }

    pub fn push(&mut self, predicate: Predicate) {
        self.predicates.push(predicate);
    }
}

/// Raw `GET /transactions` query string.
///
/// Everything arrives as text and is parsed leniently: unparseable numbers
/// fall back to defaults, empty strings count as absent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    pub page: Option<String>,
    #[serde(rename = "itemsPerPage")]
    pub items_per_page: Option<String>,
    pub search: Option<String>,
    pub status: Option<String>,
    pub data_transacao: Option<String>,
    pub above10k: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn positive_or(value: &Option<String>, default: u64) -> u64 {
    non_empty(value)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|n| *n >= 1)
        .unwrap_or(default)
}

impl ListParams {
    pub fn window(&self) -> Window {
        Window::for_page(
            positive_or(&self.page, DEFAULT_PAGE),
            positive_or(&self.items_per_page, DEFAULT_ITEMS_PER_PAGE),
        )
    }

    pub fn high_value_only(&self) -> bool {
        self.above10k.as_deref() == Some("true")
    }

    /// Accumulate the active filters into a query
    pub fn to_query(&self) -> TransactionQuery {
        let mut query = TransactionQuery::new(self.window());

        if let Some(term) = non_empty(&self.search) {
            query.push(Predicate::ContainsAny {
                columns: SEARCH_COLUMNS.to_vec(),
                term: term.to_string(),
            });
        }

        if let Some(status) = non_empty(&self.status) {
            query.push(Predicate::Equals {
                column: Column::Status,
                value: status.to_string(),
            });
        }

        if let Some(date) = non_empty(&self.data_transacao) {
            query.push(Predicate::Equals {
                column: Column::DataTransacao,
                value: date.to_string(),
            });
        }

        if self.high_value_only() {
            query.push(Predicate::GreaterThan {
                column: Column::Valor,
                value: HIGH_VALUE_THRESHOLD,
            });
        }

        query
    }
}
