// CSV → transactions importer used by the admin CLI to seed a local store.
// Expected header: nome_loja,cpf_cnpj_loja,tid,nsu,status,data_transacao,valor

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::io::Read;
use std::path::Path;

use crate::models::NewTransaction;

#[derive(Debug, Deserialize)]
struct CsvRow {
    nome_loja: String,
    cpf_cnpj_loja: String,
    #[serde(default)]
    tid: String,
    #[serde(default)]
    nsu: String,
    status: String,
    data_transacao: String,
    valor: String,
}

/// Normalise `YYYY-MM-DD` or `DD/MM/YYYY` to ISO
pub fn normalize_date(raw: &str) -> Result<String> {
    let raw = raw.trim();
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%d/%m/%Y"))
        .with_context(|| format!("Unrecognised date: {}", raw))?;
    Ok(date.format("%Y-%m-%d").to_string())
}

/// Parse `1234.56`, `1.234,56` or `R$ 1.234,56`
pub fn parse_amount(raw: &str) -> Result<f64> {
    let cleaned: String = raw
        .trim()
        .trim_start_matches("R$")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    let normalized = if cleaned.contains(',') {
        cleaned.replace('.', "").replace(',', ".")
    } else {
        cleaned
    };

    normalized
        .parse::<f64>()
        .map_err(|_| anyhow!("Unrecognised amount: {}", raw))
}

fn optional(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn read_transactions<R: Read>(reader: R) -> Result<Vec<NewTransaction>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut transactions = Vec::new();

    for (index, result) in rdr.deserialize().enumerate() {
        let line = index + 2;
        let row: CsvRow = result.with_context(|| format!("Failed to deserialize line {}", line))?;

        transactions.push(NewTransaction {
            nome_loja: row.nome_loja.trim().to_string(),
            cpf_cnpj_loja: row.cpf_cnpj_loja.trim().to_string(),
            tid: optional(row.tid),
            nsu: optional(row.nsu),
            status: row.status.trim().to_string(),
            data_transacao: normalize_date(&row.data_transacao)
                .with_context(|| format!("Line {}", line))?,
            valor: parse_amount(&row.valor).with_context(|| format!("Line {}", line))?,
        });
    }

    Ok(transactions)
}

pub fn load_csv(csv_path: &Path) -> Result<Vec<NewTransaction>> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("Failed to open CSV file {}", csv_path.display()))?;
    read_transactions(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_date_formats() {
        assert_eq!(normalize_date("2024-03-01").unwrap(), "2024-03-01");
        assert_eq!(normalize_date("01/03/2024").unwrap(), "2024-03-01");
        assert!(normalize_date("March 1st").is_err());
    }

    #[test]
    fn test_parse_amount_formats() {
        assert_eq!(parse_amount("1234.56").unwrap(), 1234.56);
        assert_eq!(parse_amount("1.234,56").unwrap(), 1234.56);
        assert_eq!(parse_amount("R$ 12.000,00").unwrap(), 12000.0);
        assert!(parse_amount("abc").is_err());
    }

    #[test]
    fn test_read_transactions() {
        let csv = "\
nome_loja,cpf_cnpj_loja,tid,nsu,status,data_transacao,valor
Padaria Central,12345678000190,T1,N1,paid,01/03/2024,\"1.500,00\"
Mercado Sul,98765432000110,,,pending,2024-03-02,99.9
";
        let transactions = read_transactions(csv.as_bytes()).unwrap();

        assert_eq!(transactions.len(), 2);
        assert_eq!(transactions[0].data_transacao, "2024-03-01");
        assert_eq!(transactions[0].valor, 1500.0);
        assert_eq!(transactions[0].nsu.as_deref(), Some("N1"));
        assert_eq!(transactions[1].tid, None);
        assert_eq!(transactions[1].nsu, None);
    }

    #[test]
    fn test_bad_line_reports_position() {
        let csv = "\
nome_loja,cpf_cnpj_loja,tid,nsu,status,data_transacao,valor
Loja,1,,,paid,not-a-date,10
";
        let err = read_transactions(csv.as_bytes()).unwrap_err();
        assert!(format!("{:#}", err).contains("Line 2"));
    }
}
