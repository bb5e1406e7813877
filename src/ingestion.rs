use std::fs;
use std::path::Path;

use csv::{ReaderBuilder, Trim};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::AppResult;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// One source row as read from the sheet: header/value pairs in column order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRow {
    fields: Vec<(String, String)>,
}

impl RawRow {
    pub fn new<K, V, I>(fields: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self {
            fields: fields
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }

    pub fn get(&self, header: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == header)
            .map(|(_, value)| value.as_str())
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn is_blank(&self) -> bool {
        self.fields.iter().all(|(_, value)| value.trim().is_empty())
    }
}

pub fn load_csv_file(path: &Path) -> AppResult<Vec<RawRow>> {
    let bytes = fs::read(path)?;
    let rows = parse_csv(&bytes)?;
    debug!(path = %path.display(), rows = rows.len(), "loaded venue sheet");
    Ok(rows)
}

pub fn parse_csv(bytes: &[u8]) -> AppResult<Vec<RawRow>> {
    let delimiter = sniff_delimiter(bytes);
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(Trim::Headers)
        .from_reader(bytes);

    let headers: Vec<String> = reader
        .byte_headers()?
        .iter()
        .enumerate()
        .map(|(index, header)| {
            let header = if index == 0 {
                header.strip_prefix(UTF8_BOM).unwrap_or(header)
            } else {
                header
            };
            decode_field(header).trim().to_string()
        })
        .collect();
    let mut rows = Vec::new();
    for record in reader.byte_records() {
        let record = record?;
        let row = RawRow::new(
            headers
                .iter()
                .map(String::as_str)
                .zip(record.iter().map(decode_field)),
        );
        if !row.is_blank() {
            rows.push(row);
        }
    }
    Ok(rows)
}

/// UTF-8 when it is; otherwise the spreadsheet saved it as Latin-1.
fn decode_field(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|&byte| char::from(byte)).collect(),
    }
}

fn sniff_delimiter(bytes: &[u8]) -> u8 {
    let header = bytes
        .split(|byte| *byte == b'\n')
        .next()
        .unwrap_or_default();
    let count = |needle: u8| header.iter().filter(|byte| **byte == needle).count();
    [b';', b'\t']
        .into_iter()
        .map(|candidate| (candidate, count(candidate)))
        .filter(|(_, hits)| *hits > count(b','))
        .max_by_key(|(_, hits)| *hits)
        .map(|(candidate, _)| candidate)
        .unwrap_or(b',')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rows_with_trimmed_headers() {
        let csv = " Bar ,Adresse,Code Postal\nChez Jules,12 rue Haute,1000\n,,\nLe Cirio,Rue de la Bourse 18,1000\n";
        let rows = parse_csv(csv.as_bytes()).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("Bar"), Some("Chez Jules"));
        assert_eq!(rows[1].get("Adresse"), Some("Rue de la Bourse 18"));
    }

    #[test]
    fn sniffs_semicolon_sheets() {
        let csv = "Bar;Latitude;Longitude\nMoeder Lambic;50,8477;4,3461\n";
        let rows = parse_csv(csv.as_bytes()).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("Latitude"), Some("50,8477"));
    }

    #[test]
    fn keeps_quoted_comma_values_intact() {
        let csv = "Bar,Longitude\n\"Delirium\",\"4.3461448,556\"\n";
        let rows = parse_csv(csv.as_bytes()).unwrap();

        assert_eq!(rows[0].get("Longitude"), Some("4.3461448,556"));
    }

    #[test]
    fn decodes_latin1_fields_without_dropping_rows() {
        let csv = b"Bar,Commentaire AR\nChez Jules,Caf\xe9 sympa\nLe Coq,ok\n";
        let rows = parse_csv(csv).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("Commentaire AR"), Some("Café sympa"));
        assert_eq!(rows[1].get("Bar"), Some("Le Coq"));
    }

    #[test]
    fn strips_byte_order_mark_from_first_header() {
        let csv = "\u{feff}Bar;Quartier\nLe Cirio;Bourse\n";
        let rows = parse_csv(csv.as_bytes()).unwrap();

        assert_eq!(rows[0].get("Bar"), Some("Le Cirio"));
    }

    #[test]
    fn tolerates_short_records() {
        let csv = "Bar,Adresse,Note\nPoechenellekelder\n";
        let rows = parse_csv(csv.as_bytes()).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("Bar"), Some("Poechenellekelder"));
        assert_eq!(rows[0].get("Note"), None);
    }
}
