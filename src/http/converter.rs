use bytes::Bytes;
use serde::Deserialize;

use crate::http::error::HttpError;

/// Per-request payload check. A server can report failure inside a 200
/// response body; the converter is where that becomes an error the
/// retry policy and the aggregator can see.
pub trait ResultConverter: Send + Sync {
    fn convert(&self, raw: Bytes) -> Result<Bytes, HttpError>;
}

/// Hands the raw payload through untouched.
pub struct PassThrough;

impl ResultConverter for PassThrough {
    fn convert(&self, raw: Bytes) -> Result<Bytes, HttpError> {
        Ok(raw)
    }
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "errorCode")]
    error_code: i64,
    #[serde(rename = "errorMsg", default)]
    error_msg: String,
    #[serde(default)]
    data: serde_json::Value,
}

/// Unwraps the common `{errorCode, errorMsg, data}` envelope and returns
/// the serialized `data` payload. A non-zero code is an application
/// failure, an unparseable body is malformed.
pub struct EnvelopeConverter;

impl ResultConverter for EnvelopeConverter {
    fn convert(&self, raw: Bytes) -> Result<Bytes, HttpError> {
        let envelope: Envelope = serde_json::from_slice(&raw)
            .map_err(|err| HttpError::malformed(format!("invalid envelope: {err}")))?;

        if envelope.error_code != 0 {
            return Err(HttpError::application(format!(
                "errorCode = {}, errorMsg = {}",
                envelope.error_code, envelope.error_msg
            )));
        }

        match envelope.data {
            serde_json::Value::String(data) => Ok(Bytes::from(data)),
            data => Ok(Bytes::from(data.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::error::ErrorKind;

    #[test]
    fn pass_through_returns_payload_as_is() {
        let raw = Bytes::from_static(b"anything at all");
        assert_eq!(PassThrough.convert(raw.clone()).unwrap(), raw);
    }

    #[test]
    fn envelope_unwraps_data() {
        let raw = Bytes::from_static(br#"{"errorCode":0,"errorMsg":"","data":"payload"}"#);
        assert_eq!(EnvelopeConverter.convert(raw).unwrap(), Bytes::from_static(b"payload"));
    }

    #[test]
    fn envelope_keeps_structured_data_as_json() {
        let raw = Bytes::from_static(br#"{"errorCode":0,"data":{"id":7}}"#);
        assert_eq!(
            EnvelopeConverter.convert(raw).unwrap(),
            Bytes::from_static(br#"{"id":7}"#)
        );
    }

    #[test]
    fn non_zero_code_is_application_failure() {
        let raw = Bytes::from_static(br#"{"errorCode":401,"errorMsg":"please login","data":null}"#);
        let err = EnvelopeConverter.convert(raw).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Application);
        assert!(err.message.contains("please login"));
    }

    #[test]
    fn bad_json_is_malformed() {
        let raw = Bytes::from_static(b"<html>502 Bad Gateway</html>");
        let err = EnvelopeConverter.convert(raw).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Malformed);
    }
}
