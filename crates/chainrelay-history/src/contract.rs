//! View-call reads of a lot contract's current state.

use alloy_core::dyn_abi::{DynSolType, DynSolValue};
use serde::Serialize;

use chainrelay_core::reader::ChainReader;

use crate::decoder::LOT_ID_FIELD;
use crate::error::HistoryError;
use crate::fingerprint::selector;

/// Current state of one lot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LotInfo {
    #[serde(rename = "loteId")]
    pub lot_id: String,
    #[serde(rename = "fabricante")]
    pub manufacturer: String,
    #[serde(rename = "propietarioActual")]
    pub current_owner: String,
    #[serde(rename = "temperaturaMinima")]
    pub min_temperature: i8,
    #[serde(rename = "temperaturaMaxima")]
    pub max_temperature: i8,
    /// Lowest temperature recorded so far.
    #[serde(rename = "tempRegMinima")]
    pub recorded_min_temperature: i8,
    #[serde(rename = "tempRegMaxima")]
    pub recorded_max_temperature: i8,
    #[serde(rename = "comprometido")]
    pub compromised: bool,
    #[serde(rename = "contractAddress")]
    pub contract_address: String,
}

/// A deployed lot contract reachable through `reader`.
pub struct LotContract<'a> {
    reader: &'a dyn ChainReader,
    address: &'a str,
}

impl<'a> LotContract<'a> {
    pub fn new(reader: &'a dyn ChainReader, address: &'a str) -> Self {
        Self { reader, address }
    }

    /// The lot's logical identifier, read straight from contract storage.
    pub async fn lot_id(&self) -> Result<String, HistoryError> {
        self.view_string(LOT_ID_FIELD).await
    }

    pub async fn info(&self) -> Result<LotInfo, HistoryError> {
        Ok(LotInfo {
            lot_id: self.lot_id().await?,
            manufacturer: self.view_address("fabricante").await?,
            current_owner: self.view_address("propietarioActual").await?,
            min_temperature: self.view_int8("temperaturaMinima").await?,
            max_temperature: self.view_int8("temperaturaMaxima").await?,
            recorded_min_temperature: self.view_int8("tempRegMinima").await?,
            recorded_max_temperature: self.view_int8("tempRegMaxima").await?,
            compromised: self.view_bool("comprometido").await?,
            contract_address: self.address.to_string(),
        })
    }

    /// Call the zero-argument getter `function` and decode its single return value.
    async fn view(&self, function: &str, ty: DynSolType) -> Result<DynSolValue, HistoryError> {
        let calldata = selector(&format!("{function}()"));
        let output = self.reader.call(self.address, &calldata).await?;
        if output.is_empty() {
            return Err(call_error(function, "empty return data"));
        }

        match DynSolType::Tuple(vec![ty]).abi_decode_params(&output) {
            Ok(DynSolValue::Tuple(mut values)) if values.len() == 1 => Ok(values.remove(0)),
            Ok(other) => Err(call_error(function, format!("unexpected return {other:?}"))),
            Err(e) => Err(call_error(function, e)),
        }
    }

    async fn view_string(&self, function: &str) -> Result<String, HistoryError> {
        match self.view(function, DynSolType::String).await? {
            DynSolValue::String(s) => Ok(s),
            other => Err(call_error(function, format!("expected string, got {other:?}"))),
        }
    }

    async fn view_address(&self, function: &str) -> Result<String, HistoryError> {
        match self.view(function, DynSolType::Address).await? {
            DynSolValue::Address(a) => Ok(format!("0x{}", hex::encode(a.as_slice()))),
            other => Err(call_error(function, format!("expected address, got {other:?}"))),
        }
    }

    async fn view_int8(&self, function: &str) -> Result<i8, HistoryError> {
        match self.view(function, DynSolType::Int(8)).await? {
            DynSolValue::Int(i, _) => i128::try_from(i)
                .ok()
                .and_then(|v| i8::try_from(v).ok())
                .ok_or_else(|| call_error(function, "value out of int8 range")),
            other => Err(call_error(function, format!("expected int8, got {other:?}"))),
        }
    }

    async fn view_bool(&self, function: &str) -> Result<bool, HistoryError> {
        match self.view(function, DynSolType::Bool).await? {
            DynSolValue::Bool(b) => Ok(b),
            other => Err(call_error(function, format!("expected bool, got {other:?}"))),
        }
    }
}

fn call_error(function: &str, reason: impl std::fmt::Display) -> HistoryError {
    HistoryError::Call {
        function: function.to_string(),
        reason: reason.to_string(),
    }
}
