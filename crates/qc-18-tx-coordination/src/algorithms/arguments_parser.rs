//! Parser for `@`-separated payloads.
//!
//! Call data is `function@hexarg@hexarg...`; storage updates written by system
//! contracts are `hexkey@hexvalue@hexkey@hexvalue...`.

use crate::domain::{ProcessError, Result, StorageUpdate};
use crate::ports::ArgumentParser;

const SEPARATOR: char = '@';

/// Default `@`-separated payload parser.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArgumentsParser;

impl ArgumentsParser {
    /// Create a parser.
    pub fn new() -> Self {
        Self
    }
}

fn decode_hex(token: &str) -> Result<Vec<u8>> {
    hex::decode(token).map_err(|e| ProcessError::InvalidCallData(format!("{token}: {e}")))
}

impl ArgumentParser for ArgumentsParser {
    fn parse_call_data(&self, data: &str) -> Result<(String, Vec<Vec<u8>>)> {
        if data.is_empty() {
            return Err(ProcessError::InvalidCallData("empty data".into()));
        }

        let mut tokens = data.split(SEPARATOR);
        let function = tokens.next().unwrap_or_default();
        if function.is_empty() {
            return Err(ProcessError::InvalidCallData("empty function name".into()));
        }

        let arguments = tokens.map(decode_hex).collect::<Result<Vec<_>>>()?;
        Ok((function.to_string(), arguments))
    }

    fn storage_updates(&self, data: &str) -> Result<Vec<StorageUpdate>> {
        if data.is_empty() {
            return Err(ProcessError::InvalidCallData("empty data".into()));
        }

        let tokens: Vec<&str> = data.split(SEPARATOR).collect();
        if tokens.len() % 2 != 0 {
            return Err(ProcessError::InvalidCallData(format!(
                "odd number of storage tokens: {}",
                tokens.len()
            )));
        }

        tokens
            .chunks(2)
            .map(|pair| {
                Ok(StorageUpdate {
                    key: decode_hex(pair[0])?,
                    value: decode_hex(pair[1])?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_call_data() {
        let parser = ArgumentsParser::new();
        let (function, args) = parser.parse_call_data("transfer@0a0b@ff").unwrap();
        assert_eq!(function, "transfer");
        assert_eq!(args, vec![vec![0x0a, 0x0b], vec![0xff]]);
    }

    #[test]
    fn test_parse_call_data_without_arguments() {
        let (function, args) = ArgumentsParser.parse_call_data("relayedTx").unwrap();
        assert_eq!(function, "relayedTx");
        assert!(args.is_empty());
    }

    #[test]
    fn test_parse_call_data_errors() {
        let parser = ArgumentsParser::new();
        assert!(parser.parse_call_data("").is_err());
        assert!(parser.parse_call_data("@0a").is_err());
        assert!(parser.parse_call_data("f@zz").is_err());
    }

    #[test]
    fn test_storage_updates() {
        let updates = ArgumentsParser.storage_updates("aa@01@bb@").unwrap();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].key, vec![0xaa]);
        assert_eq!(updates[0].value, vec![0x01]);
        assert_eq!(updates[1].key, vec![0xbb]);
        assert!(updates[1].value.is_empty());
    }

    #[test]
    fn test_storage_updates_odd_count() {
        assert!(matches!(
            ArgumentsParser.storage_updates("aa@01@bb"),
            Err(ProcessError::InvalidCallData(_))
        ));
    }
}
