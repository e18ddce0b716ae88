//! Worker bridge encoding.
//!
//! Messages cross the boundary as plain JS values rather than bincode, so the
//! `type` discriminator and camelCase field names survive as-is.

use serde::{Deserialize, Serialize};
use wasm_bindgen::{JsValue, UnwrapThrowExt};
use yew_agent::Codec;

pub struct PlainValueCodec;

impl Codec for PlainValueCodec {
    fn encode<I>(input: I) -> JsValue
    where
        I: Serialize,
    {
        serde_wasm_bindgen::to_value(&input)
            .expect_throw("message is not representable as a plain value")
    }

    fn decode<O>(input: JsValue) -> O
    where
        O: for<'de> Deserialize<'de>,
    {
        serde_wasm_bindgen::from_value(input).expect_throw("malformed worker message")
    }
}
