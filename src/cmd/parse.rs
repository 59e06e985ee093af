use serde_json::{Map, Value};

use super::ProtocolError;

/// Pulls typed fields out of a request's `options` mapping.
///
/// Unknown extra keys are ignored.
#[derive(Debug)]
pub(crate) struct Parse {
    options: Map<String, Value>,
}

impl Parse {
    pub(crate) fn new(options: Map<String, Value>) -> Parse {
        Parse { options }
    }

    pub(crate) fn string(&mut self, key: &'static str) -> Result<String, ProtocolError> {
        match self.take(key)? {
            Value::String(string) => Ok(string),
            _ => Err(ProtocolError::InvalidOption {
                key,
                expected: "a string",
            }),
        }
    }

    pub(crate) fn integer(&mut self, key: &'static str) -> Result<i64, ProtocolError> {
        self.take(key)?
            .as_i64()
            .ok_or(ProtocolError::InvalidOption {
                key,
                expected: "an integer",
            })
    }

    fn take(&mut self, key: &'static str) -> Result<Value, ProtocolError> {
        self.options
            .remove(key)
            .ok_or(ProtocolError::MissingOption(key))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn parse(value: Value) -> Parse {
        match value {
            Value::Object(options) => Parse::new(options),
            _ => unreachable!("test options must be an object"),
        }
    }

    #[test]
    fn reads_typed_fields() {
        let mut parse = parse(json!({"name": "Rice", "count": 3, "extra": true}));

        assert_eq!(parse.string("name").unwrap(), "Rice");
        assert_eq!(parse.integer("count").unwrap(), 3);
    }

    #[test]
    fn reports_missing_field() {
        let mut parse = parse(json!({}));

        assert!(matches!(
            parse.string("item_name"),
            Err(ProtocolError::MissingOption("item_name"))
        ));
    }

    #[test]
    fn rejects_wrongly_typed_fields() {
        let mut parse = parse(json!({"count": "3", "name": 5, "ratio": 1.5}));

        assert!(matches!(
            parse.integer("count"),
            Err(ProtocolError::InvalidOption { key: "count", .. })
        ));
        assert!(matches!(
            parse.string("name"),
            Err(ProtocolError::InvalidOption { key: "name", .. })
        ));
        assert!(matches!(
            parse.integer("ratio"),
            Err(ProtocolError::InvalidOption { key: "ratio", .. })
        ));
    }
}
