//! Shallow decoding of impression extensions.
//!
//! An `imp.ext` block is only split into its top-level keys here. The values
//! stay untyped because bidder parameters are owned by the bidder and are
//! passed along verbatim.

use error_stack::Report;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::FanoutError;
use crate::openrtb::Imp;

/// How malformed impression extensions affect the rest of the request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtDecodeMode {
    /// Any malformed impression fails the whole request.
    #[default]
    Strict,
    /// Malformed impressions are dropped and reported; the rest continue.
    Lenient,
}

/// Impression extensions that decoded, with any per-impression errors that
/// were tolerated.
#[derive(Debug, Default)]
pub struct DecodedImpExts<'a> {
    /// `(impression index, top-level ext fields)` in input order.
    pub exts: Vec<(usize, &'a Map<String, Value>)>,
    pub errors: Vec<Report<FanoutError>>,
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Decodes one impression extension into its top-level fields.
///
/// # Errors
///
/// Returns [`FanoutError::MalformedInput`] naming the impression index when
/// the extension is missing or is not a JSON object.
pub fn decode_imp_ext(
    index: usize,
    ext: Option<&Value>,
) -> Result<&Map<String, Value>, Report<FanoutError>> {
    match ext {
        Some(Value::Object(fields)) => Ok(fields),
        Some(other) => Err(Report::new(FanoutError::malformed(format!(
            "Error unpacking extensions for Imp[{index}]: expected an object, found {}",
            json_kind(other)
        )))),
        None => Err(Report::new(FanoutError::malformed(format!(
            "Error unpacking extensions for Imp[{index}]: ext is missing"
        )))),
    }
}

/// Decodes every impression extension.
///
/// # Errors
///
/// In [`ExtDecodeMode::Strict`] returns one report per malformed impression
/// when any impression fails. Lenient mode never fails; errors are returned
/// alongside the decoded extensions.
pub fn decode_imp_exts(
    imps: &[Imp],
    mode: ExtDecodeMode,
) -> Result<DecodedImpExts<'_>, Vec<Report<FanoutError>>> {
    let mut decoded = DecodedImpExts::default();

    for (index, imp) in imps.iter().enumerate() {
        match decode_imp_ext(index, imp.ext.as_ref()) {
            Ok(fields) => decoded.exts.push((index, fields)),
            Err(report) => decoded.errors.push(report),
        }
    }

    if mode == ExtDecodeMode::Strict && !decoded.errors.is_empty() {
        return Err(decoded.errors);
    }

    for report in &decoded.errors {
        log::warn!("Skipping impression: {report}");
    }
    Ok(decoded)
}
