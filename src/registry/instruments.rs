use crate::error::InitializationError;
use serde::Deserialize;
use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

/// One row of the instrument list: which symbol, how many shares per order
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct InstrumentSpec {
    #[serde(rename = "Symbol")]
    pub symbol: String,
    #[serde(rename = "Quantity")]
    pub quantity: u32,
}

/// Load the instrument list CSV (`Symbol,Quantity` header)
pub fn load_instruments(path: impl AsRef<Path>) -> Result<Vec<InstrumentSpec>, InitializationError> {
    let path = path.as_ref();
    let display = path.display().to_string();

    let reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|source| InitializationError::InstrumentList {
            path: display.clone(),
            source,
        })?;

    parse_rows(reader, &display)
}

/// Parse an instrument list from any reader
pub fn parse_instruments<R: Read>(input: R) -> Result<Vec<InstrumentSpec>, InitializationError> {
    let reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(input);
    parse_rows(reader, "<input>")
}

fn parse_rows<R: Read>(
    mut reader: csv::Reader<R>,
    path: &str,
) -> Result<Vec<InstrumentSpec>, InitializationError> {
    let mut specs = Vec::new();
    let mut seen = HashSet::new();

    for record in reader.deserialize::<InstrumentSpec>() {
        let mut spec = record.map_err(|source| InitializationError::InstrumentList {
            path: path.to_string(),
            source,
        })?;
        spec.symbol = spec.symbol.to_uppercase();

        if spec.symbol.is_empty() {
            return Err(InitializationError::InvalidInstrument(
                "empty symbol".to_string(),
            ));
        }
        if spec.quantity == 0 {
            return Err(InitializationError::InvalidInstrument(format!(
                "{} has zero quantity",
                spec.symbol
            )));
        }
        if !seen.insert(spec.symbol.clone()) {
            return Err(InitializationError::DuplicateSymbol(spec.symbol));
        }

        specs.push(spec);
    }

    if specs.is_empty() {
        return Err(InitializationError::NoInstruments);
    }

    Ok(specs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_instrument_list() {
        let csv = "Symbol,Quantity\nAAPL,10\n\nMSFT, 5\n";
        let specs = parse_instruments(csv.as_bytes()).unwrap();

        assert_eq!(
            specs,
            vec![
                InstrumentSpec {
                    symbol: "AAPL".to_string(),
                    quantity: 10
                },
                InstrumentSpec {
                    symbol: "MSFT".to_string(),
                    quantity: 5
                },
            ]
        );
    }

    #[test]
    fn test_duplicate_symbol_is_case_insensitive() {
        let csv = "Symbol,Quantity\nAAPL,10\naapl,3\n";
        let err = parse_instruments(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, InitializationError::DuplicateSymbol(s) if s == "AAPL"));
    }

    #[test]
    fn test_zero_quantity_rejected() {
        let csv = "Symbol,Quantity\nAAPL,0\n";
        let err = parse_instruments(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, InitializationError::InvalidInstrument(_)));
    }

    #[test]
    fn test_malformed_quantity_rejected() {
        let csv = "Symbol,Quantity\nAAPL,ten\n";
        let err = parse_instruments(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, InitializationError::InstrumentList { .. }));
    }

    #[test]
    fn test_empty_list_rejected() {
        let err = parse_instruments("Symbol,Quantity\n".as_bytes()).unwrap_err();
        assert!(matches!(err, InitializationError::NoInstruments));
    }

    #[test]
    fn test_missing_file_rejected() {
        let err = load_instruments("/nonexistent/stockbot/data.csv").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/stockbot/data.csv"));
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("stockbot-{}.csv", uuid::Uuid::new_v4()));
        std::fs::write(&path, "Symbol,Quantity\nTSLA,2\n").unwrap();

        let specs = load_instruments(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].symbol, "TSLA");
    }
}
