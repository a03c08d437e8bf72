//! Kline Stream Codec
//!
//! Decodes Binance kline stream frames into normalized [`Kline`] updates.
//!
//! Two envelopes are accepted:
//!
//! ```json
//! {"e":"kline","s":"BTCUSDT","k":{"t":..,"T":..,"s":"BTCUSDT","i":"1m","o":"1.0",..}}
//! {"stream":"btcusdt@kline_1m","data":{"e":"kline","k":{..}}}
//! ```
//!
//! Prices and volume arrive as decimal strings.

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use crate::domain::streaming::Kline;

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The frame is not valid JSON or the kline has the wrong shape.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Kline body as sent by Binance under the `k` field.
#[derive(Debug, Deserialize)]
struct KlinePayload {
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "i")]
    interval: String,
    #[serde(rename = "t")]
    open_time: i64,
    #[serde(rename = "T")]
    close_time: i64,
    #[serde(rename = "o")]
    open: Decimal,
    #[serde(rename = "h")]
    high: Decimal,
    #[serde(rename = "l")]
    low: Decimal,
    #[serde(rename = "c")]
    close: Decimal,
    #[serde(rename = "v")]
    volume: Decimal,
    #[serde(rename = "x", default)]
    is_final: Option<bool>,
}

impl From<KlinePayload> for Kline {
    fn from(k: KlinePayload) -> Self {
        Self {
            symbol: k.symbol,
            interval: k.interval,
            open_time: k.open_time,
            close_time: k.close_time,
            open: k.open,
            high: k.high,
            low: k.low,
            close: k.close,
            volume: k.volume,
            is_final: k.is_final.unwrap_or_default(),
        }
    }
}

/// JSON codec for Binance kline streams.
#[derive(Debug, Default, Clone, Copy)]
pub struct KlineCodec;

impl KlineCodec {
    /// Create a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode one text frame.
    ///
    /// Returns `Ok(None)` for well-formed frames that carry no kline.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not JSON or its kline is malformed.
    pub fn decode(&self, text: &str) -> Result<Option<Kline>, CodecError> {
        let mut frame: Value = serde_json::from_str(text)?;

        let Some(k) = take_kline(&mut frame) else {
            return Ok(None);
        };

        let payload: KlinePayload = serde_json::from_value(k)?;
        Ok(Some(payload.into()))
    }
}

fn take_kline(frame: &mut Value) -> Option<Value> {
    let object = frame.as_object_mut()?;

    if let Some(k) = object.remove("k").filter(|k| !k.is_null()) {
        return Some(k);
    }

    object
        .get_mut("data")
        .and_then(Value::as_object_mut)
        .and_then(|data| data.remove("k"))
        .filter(|k| !k.is_null())
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use test_case::test_case;

    use super::*;

    const KLINE: &str = r#"{"t":1700000000000,"T":1700000059999,"s":"BTCUSDT","i":"1m","f":100,"L":200,"o":"50000.10","c":"50010.50","h":"50020.00","l":"49990.00","v":"12.345","n":100,"x":false,"q":"617000.0","V":"6.0","Q":"300000.0","B":"0"}"#;

    fn top_level() -> String {
        format!(r#"{{"e":"kline","E":1700000001000,"s":"BTCUSDT","k":{KLINE}}}"#)
    }

    fn nested() -> String {
        format!(
            r#"{{"stream":"btcusdt@kline_1m","data":{{"e":"kline","E":1700000001000,"s":"BTCUSDT","k":{KLINE}}}}}"#
        )
    }

    #[test]
    fn decodes_top_level_kline() {
        let kline = KlineCodec::new().decode(&top_level()).unwrap().unwrap();

        assert_eq!(kline.symbol, "BTCUSDT");
        assert_eq!(kline.interval, "1m");
        assert_eq!(kline.open_time, 1_700_000_000_000);
        assert_eq!(kline.close_time, 1_700_000_059_999);
        assert_eq!(kline.open, Decimal::from_str("50000.10").unwrap());
        assert_eq!(kline.high, Decimal::from_str("50020.00").unwrap());
        assert_eq!(kline.low, Decimal::from_str("49990.00").unwrap());
        assert_eq!(kline.close, Decimal::from_str("50010.50").unwrap());
        assert_eq!(kline.volume, Decimal::from_str("12.345").unwrap());
        assert!(!kline.is_final);
    }

    #[test]
    fn nested_and_top_level_decode_identically() {
        let codec = KlineCodec::new();
        assert_eq!(
            codec.decode(&nested()).unwrap(),
            codec.decode(&top_level()).unwrap()
        );
    }

    #[test_case(r#"{"result":null,"id":1}"# ; "subscribe ack")]
    #[test_case(r#"{"e":"trade","s":"BTCUSDT","p":"1.0"}"# ; "other event")]
    #[test_case(r#"{"stream":"x","data":{"e":"trade"}}"# ; "nested without kline")]
    #[test_case(r#"{"k":null}"# ; "null kline")]
    #[test_case("[]" ; "array")]
    #[test_case("42" ; "scalar")]
    fn frames_without_kline_are_ignored(text: &str) {
        assert!(KlineCodec::new().decode(text).unwrap().is_none());
    }

    #[test_case("not json" ; "garbage")]
    #[test_case(r#"{"k":{"s":"BTCUSDT"}}"# ; "missing fields")]
    #[test_case(r#"{"k":{"t":1,"T":2,"s":"BTCUSDT","i":"1m","o":"abc","h":"1","l":"1","c":"1","v":"1","x":true}}"# ; "bad decimal")]
    #[test_case(r#"{"k":"oops"}"# ; "kline not an object")]
    fn malformed_frames_are_errors(text: &str) {
        assert!(KlineCodec::new().decode(text).is_err());
    }

    #[test_case(r#""x":true"#, true ; "closed interval")]
    #[test_case(r#""x":false"#, false ; "open interval")]
    #[test_case(r#""x":null"#, false ; "null flag")]
    #[test_case(r#""n":100"#, false ; "absent flag")]
    fn final_flag_defaults_to_open(flag: &str, expected: bool) {
        let text = top_level().replace(r#","x":false"#, "").replace(r#""n":100"#, flag);
        let kline = KlineCodec::new().decode(&text).unwrap().unwrap();
        assert_eq!(kline.is_final, expected);
    }
}
