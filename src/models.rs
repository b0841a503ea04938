// Record shapes exchanged with the data service and the HTTP surface.
// Entities live in the data service; these types only carry them through.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// TRANSACTIONS
// ============================================================================

/// Transaction row as stored in the `transactions` table.
///
/// Every column may come back `null` from the data service and `id` may be
/// numeric or text (uuid), so nothing here is stricter than the row itself.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Transaction {
    #[serde(default)]
    pub id: Value,

    /// Store name
    #[serde(default)]
    pub nome_loja: Option<String>,

    /// Tax identifier of the store (join key to `companies_data.cnpj`)
    #[serde(default)]
    pub cpf_cnpj_loja: Option<String>,

    /// Acquirer transaction identifier
    #[serde(default)]
    pub tid: Option<String>,

    /// Sequence number, part of the duplicate criteria
    #[serde(default)]
    pub nsu: Option<String>,

    #[serde(default)]
    pub status: Option<String>,

    /// ISO date (YYYY-MM-DD)
    #[serde(default)]
    pub data_transacao: Option<String>,

    #[serde(default)]
    pub valor: Option<f64>,

    /// Columns this layer does not know about, carried through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Transaction with its company embedded, as returned by the listing
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct TransactionWithCompany {
    #[serde(flatten)]
    pub transaction: Transaction,

    #[serde(default)]
    pub companies_data: Option<Company>,
}

/// One window of a filtered listing
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionPage {
    pub rows: Vec<TransactionWithCompany>,
    /// Match count ignoring the window
    pub total: u64,
}

/// Transaction to be written by the importer (no id yet)
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct NewTransaction {
    pub nome_loja: String,
    pub cpf_cnpj_loja: String,
    #[serde(default)]
    pub tid: Option<String>,
    #[serde(default)]
    pub nsu: Option<String>,
    pub status: String,
    pub data_transacao: String,
    pub valor: f64,
}

// ============================================================================
// COMPANIES
// ============================================================================

/// Company metadata keyed by tax identifier (`companies_data` table).
///
/// `None` fields serialize as `null` so an upsert overwrites whatever
/// the row held before.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Company {
    pub cnpj: String,
    #[serde(default)]
    pub observation: Option<String>,
    /// Task list, kept as opaque JSON
    #[serde(default)]
    pub tasks: Option<Value>,
    #[serde(default)]
    pub attachment_url: Option<String>,
}
