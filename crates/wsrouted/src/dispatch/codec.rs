//! JSON envelope codec.
//!
//! Requests look like `{"id": ..., "target": "component.method", "body": {...}}`.
//! Keys are matched exactly first and, when the request policy allows it,
//! case-insensitively afterwards; `Body` is accepted regardless. Response
//! field names follow the configured [`FieldNaming`].

use serde_json::{Map, Value};

use wsroute_config::{Config, FieldNaming};

use super::{CodecError, Response};

/// A decoded request envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Opaque correlation value, echoed verbatim; `null` when absent.
    pub id: Value,
    /// Route name as sent by the caller.
    pub target: String,
    /// Named arguments; `None` when the body is absent or `null`.
    pub body: Option<Map<String, Value>>,
}

/// Serialisation policy applied to both directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvelopeCodec {
    case_insensitive: bool,
    naming: FieldNaming,
    omit_nulls: bool,
}

impl Default for EnvelopeCodec {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl EnvelopeCodec {
    #[must_use]
    pub fn new(case_insensitive: bool, naming: FieldNaming, omit_nulls: bool) -> Self {
        Self {
            case_insensitive,
            naming,
            omit_nulls,
        }
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.request_case_insensitive(),
            config.response_naming(),
            config.response_omit_nulls(),
        )
    }

    /// Parses one reassembled message.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Malformed`] for empty or non-JSON input and
    /// [`CodecError::InvalidStructure`] when the envelope lacks a usable
    /// target or carries a non-object body.
    pub fn decode(&self, payload: &[u8]) -> Result<Request, CodecError> {
        let trimmed = payload.trim_ascii();
        if trimmed.is_empty() {
            return Err(CodecError::malformed("empty request"));
        }
        let value: Value = serde_json::from_slice(trimmed).map_err(CodecError::from_json_error)?;
        let Value::Object(envelope) = value else {
            return Err(CodecError::invalid_structure(
                "request must be a JSON object",
                Value::Null,
            ));
        };

        let id = self.field(&envelope, "id").cloned().unwrap_or(Value::Null);
        let target = match self.field(&envelope, "target") {
            Some(Value::String(target)) if !target.trim().is_empty() => target.clone(),
            Some(Value::String(_)) | None | Some(Value::Null) => {
                return Err(CodecError::invalid_structure("target is missing", id));
            }
            Some(_) => {
                return Err(CodecError::invalid_structure("target must be a string", id));
            }
        };
        let body = match self.body(&envelope) {
            None | Some(Value::Null) => None,
            Some(Value::Object(body)) => Some(body.clone()),
            Some(_) => {
                return Err(CodecError::invalid_structure("body must be an object", id));
            }
        };
        Ok(Request { id, target, body })
    }

    /// Serialises a response envelope.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Encode`] when serialisation fails.
    pub fn encode(&self, response: &Response) -> Result<Vec<u8>, CodecError> {
        let mut envelope = Map::new();
        self.put(&mut envelope, &["id"], response.id.clone());
        self.put(
            &mut envelope,
            &["target"],
            response.target.clone().map_or(Value::Null, Value::String),
        );
        self.put(
            &mut envelope,
            &["status"],
            Value::from(response.status.code()),
        );
        self.put(&mut envelope, &["body"], response.body.clone());
        self.put(
            &mut envelope,
            &["msg"],
            response.msg.clone().map_or(Value::Null, Value::String),
        );
        self.put(
            &mut envelope,
            &["request", "time"],
            Value::from(response.request_time),
        );
        self.put(
            &mut envelope,
            &["complete", "time"],
            Value::from(response.complete_time),
        );
        serde_json::to_vec(&Value::Object(envelope)).map_err(CodecError::Encode)
    }

    fn field<'a>(&self, envelope: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
        envelope.get(key).or_else(|| {
            self.case_insensitive
                .then(|| find_ignoring_case(envelope, key))
                .flatten()
        })
    }

    fn body<'a>(&self, envelope: &'a Map<String, Value>) -> Option<&'a Value> {
        self.field(envelope, "body")
            .or_else(|| envelope.get("Body"))
    }

    fn put(&self, envelope: &mut Map<String, Value>, words: &[&str], value: Value) {
        if self.omit_nulls && value.is_null() {
            return;
        }
        envelope.insert(self.naming.apply(words), value);
    }
}

fn find_ignoring_case<'a>(envelope: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    envelope
        .iter()
        .find(|(candidate, _)| candidate.eq_ignore_ascii_case(key))
        .map(|(_, value)| value)
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};
    use serde_json::json;

    use super::*;
    use crate::dispatch::Status;

    #[fixture]
    fn codec() -> EnvelopeCodec {
        EnvelopeCodec::default()
    }

    #[rstest]
    fn decodes_a_complete_envelope(codec: EnvelopeCodec) {
        let request = codec
            .decode(br#"{"id": 7, "target": "Math.Add", "body": {"a": 1}}"#)
            .expect("decode");
        assert_eq!(request.id, json!(7));
        assert_eq!(request.target, "Math.Add");
        assert_eq!(request.body, json!({"a": 1}).as_object().cloned());
    }

    #[rstest]
    fn keeps_the_target_exactly_as_sent(codec: EnvelopeCodec) {
        let request = codec
            .decode(br#"{"id": 1, "target": " Echo "}"#)
            .expect("decode");
        assert_eq!(request.target, " Echo ");
    }

    #[rstest]
    fn accepts_mixed_case_keys_when_allowed(codec: EnvelopeCodec) {
        let request = codec
            .decode(br#"{"ID": "x", "Target": "echo", "BODY": {}}"#)
            .expect("decode");
        assert_eq!(request.id, json!("x"));
        assert_eq!(request.target, "echo");
        assert_eq!(request.body, Some(Map::new()));
    }

    #[rstest]
    fn pascal_body_is_accepted_even_when_strict() {
        let strict = EnvelopeCodec::new(false, FieldNaming::CamelCase, true);
        let request = strict
            .decode(br#"{"target": "echo", "Body": {"v": 1}}"#)
            .expect("decode");
        assert!(request.body.is_some());
        let error = strict.decode(br#"{"Target": "echo"}"#).expect_err("strict keys");
        assert!(matches!(error, CodecError::InvalidStructure { .. }));
    }

    #[rstest]
    #[case(b"".as_slice())]
    #[case(b"   ".as_slice())]
    #[case(b"{not json".as_slice())]
    fn malformed_input_is_reported(codec: EnvelopeCodec, #[case] payload: &[u8]) {
        assert!(matches!(
            codec.decode(payload),
            Err(CodecError::Malformed { .. })
        ));
    }

    #[rstest]
    #[case(br#"[1, 2]"#.as_slice(), Value::Null)]
    #[case(br#"{"id": 3}"#.as_slice(), json!(3))]
    #[case(br#"{"id": 4, "target": "   "}"#.as_slice(), json!(4))]
    #[case(br#"{"id": 5, "target": 9}"#.as_slice(), json!(5))]
    #[case(br#"{"id": 6, "target": "echo", "body": [1]}"#.as_slice(), json!(6))]
    fn structural_errors_keep_the_id(
        codec: EnvelopeCodec,
        #[case] payload: &[u8],
        #[case] id: Value,
    ) {
        let error = codec.decode(payload).expect_err("invalid structure");
        assert!(matches!(error, CodecError::InvalidStructure { .. }));
        assert_eq!(error.request_id(), id);
    }

    #[rstest]
    fn null_body_means_absent(codec: EnvelopeCodec) {
        let request = codec
            .decode(br#"{"target": "echo", "body": null}"#)
            .expect("decode");
        assert_eq!(request.id, Value::Null);
        assert!(request.body.is_none());
    }

    fn sample_response() -> Response {
        Response {
            id: json!(1),
            target: Some("echo".to_owned()),
            status: Status::Success,
            body: Value::Null,
            msg: None,
            request_time: 10,
            complete_time: 12,
        }
    }

    #[rstest]
    fn encodes_camel_case_and_omits_nulls(codec: EnvelopeCodec) {
        let encoded = codec.encode(&sample_response()).expect("encode");
        let value: Value = serde_json::from_slice(&encoded).expect("json");
        assert_eq!(
            value,
            json!({
                "id": 1,
                "target": "echo",
                "status": 0,
                "requestTime": 10,
                "completeTime": 12
            })
        );
    }

    #[rstest]
    fn keeps_nulls_and_renames_when_configured() {
        let codec = EnvelopeCodec::new(true, FieldNaming::PascalCase, false);
        let encoded = codec.encode(&sample_response()).expect("encode");
        let value: Value = serde_json::from_slice(&encoded).expect("json");
        assert_eq!(value["Body"], Value::Null);
        assert_eq!(value["Msg"], Value::Null);
        assert_eq!(value["RequestTime"], json!(10));
        assert!(value.as_object().expect("object").contains_key("Body"));
    }
}
