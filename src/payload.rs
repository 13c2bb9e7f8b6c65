//! Tensor-serving request body built from a validated [`HousingRecord`].

use serde::Serialize;
use serde_json::Value;

use crate::record::HousingRecord;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum TensorDatatype {
    #[serde(rename = "BYTES")]
    Bytes,
    #[serde(rename = "FP32")]
    Fp32,
    #[serde(rename = "INT64")]
    Int64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TensorInput {
    pub name: String,
    pub shape: Vec<usize>,
    pub datatype: TensorDatatype,
    pub data: Vec<Value>,
}

impl TensorInput {
    fn scalar(name: &str, datatype: TensorDatatype, value: Value) -> Self {
        Self {
            name: name.to_string(),
            shape: vec![1],
            datatype,
            data: vec![value],
        }
    }

    fn bytes(name: &str, token: &str) -> Self {
        Self::scalar(name, TensorDatatype::Bytes, Value::from(token.to_uppercase()))
    }

    fn int64(name: &str, value: i64) -> Self {
        Self::scalar(name, TensorDatatype::Int64, Value::from(value))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct InferencePayload {
    pub inputs: Vec<TensorInput>,
}

impl InferencePayload {
    pub fn from_record(record: &HousingRecord) -> Self {
        let inputs = vec![
            TensorInput::bytes("mainroad", record.mainroad.as_str()),
            TensorInput::bytes("guestroom", record.guestroom.as_str()),
            TensorInput::bytes("basement", record.basement.as_str()),
            TensorInput::bytes("hotwaterheating", record.hotwaterheating.as_str()),
            TensorInput::bytes("airconditioning", record.airconditioning.as_str()),
            TensorInput::bytes("prefarea", record.prefarea.as_str()),
            TensorInput::bytes("furnishingstatus", record.furnishingstatus.as_str()),
            TensorInput::scalar("area", TensorDatatype::Fp32, Value::from(record.area)),
            TensorInput::int64("bedrooms", record.bedrooms),
            TensorInput::int64("bathrooms", record.bathrooms),
            TensorInput::int64("stories", record.stories),
            TensorInput::int64("parking", record.parking),
        ];
        Self { inputs }
    }

    pub fn input(&self, name: &str) -> Option<&TensorInput> {
        self.inputs.iter().find(|input| input.name == name)
    }
}
