use crate::{EncodeError, TensorPayload, DEFAULT_MODEL_NAME};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub name: String,
    pub signature_name: Option<String>,
    pub version: Option<u64>,
}

impl ModelSpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            signature_name: None,
            version: None,
        }
    }

    pub fn signature_name(mut self, signature_name: &str) -> Self {
        self.signature_name = Some(signature_name.to_string());
        self
    }

    pub fn version(mut self, version: u64) -> Self {
        self.version = Some(version);
        self
    }
}

impl Default for ModelSpec {
    fn default() -> Self {
        Self::new(DEFAULT_MODEL_NAME)
    }
}

/// The body of every call issued during a benchmark: a model and its named input tensors.
///
/// The REST encoding is computed when the request is built, so issuing a call only copies a
/// reference-counted buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawPredictRequest", into = "RawPredictRequest")]
pub struct PredictRequest {
    model_spec: ModelSpec,
    inputs: BTreeMap<String, TensorPayload>,
    rest_path: String,
    rest_body: Bytes,
}

#[derive(Serialize, Deserialize)]
struct RawPredictRequest {
    model_spec: ModelSpec,
    inputs: BTreeMap<String, TensorPayload>,
}

impl From<RawPredictRequest> for PredictRequest {
    fn from(raw: RawPredictRequest) -> Self {
        Self::build(raw.model_spec, raw.inputs)
    }
}

impl From<PredictRequest> for RawPredictRequest {
    fn from(request: PredictRequest) -> Self {
        Self {
            model_spec: request.model_spec,
            inputs: request.inputs,
        }
    }
}

impl PredictRequest {
    pub fn new(model_spec: ModelSpec) -> Self {
        Self::build(model_spec, BTreeMap::new())
    }

    pub fn input(self, name: &str, tensor: TensorPayload) -> Self {
        let mut inputs = self.inputs;
        inputs.insert(name.to_string(), tensor);
        Self::build(self.model_spec, inputs)
    }

    /// Build a request from a JSON object mapping input names to nested numeric arrays.
    ///
    /// # Errors
    ///
    /// Fails if the value is not a non-empty object, or if any input fails to encode (see
    /// [`TensorPayload::from_json`]).
    pub fn from_json(model_spec: ModelSpec, value: &Value) -> Result<Self, EncodeError> {
        let Value::Object(map) = value else {
            return Err(EncodeError::InvalidPayloadShape(
                "inputs must be a JSON object".to_string(),
            ));
        };

        if map.is_empty() {
            return Err(EncodeError::InvalidPayloadShape(
                "at least one input is required".to_string(),
            ));
        }

        let inputs = map
            .iter()
            .map(|(name, value)| {
                TensorPayload::from_json(value)
                    .map(|tensor| (name.clone(), tensor))
                    .map_err(|err| err.in_input(name))
            })
            .collect::<Result<_, _>>()?;

        Ok(Self::build(model_spec, inputs))
    }

    fn build(model_spec: ModelSpec, inputs: BTreeMap<String, TensorPayload>) -> Self {
        let rest_path = match model_spec.version {
            Some(version) => format!("v1/models/{}/versions/{version}:predict", model_spec.name),
            None => format!("v1/models/{}:predict", model_spec.name),
        };
        let rest_body = Bytes::from(rest_body(&model_spec, &inputs).to_string());

        Self {
            model_spec,
            inputs,
            rest_path,
            rest_body,
        }
    }

    pub fn model_spec(&self) -> &ModelSpec {
        &self.model_spec
    }

    pub fn inputs(&self) -> &BTreeMap<String, TensorPayload> {
        &self.inputs
    }

    /// Path of the REST predict endpoint, relative to the server root.
    pub fn rest_path(&self) -> &str {
        &self.rest_path
    }

    /// Serialized JSON body of the REST predict endpoint, using the columnar `inputs` format.
    pub fn rest_body(&self) -> Bytes {
        self.rest_body.clone()
    }
}

fn rest_body(model_spec: &ModelSpec, inputs: &BTreeMap<String, TensorPayload>) -> Value {
    let inputs: Map<String, Value> = inputs
        .iter()
        .map(|(name, tensor)| (name.clone(), tensor.to_nested_json()))
        .collect();

    let mut body = Map::new();
    if let Some(signature_name) = &model_spec.signature_name {
        body.insert(
            "signature_name".to_string(),
            Value::String(signature_name.clone()),
        );
    }
    body.insert("inputs".to_string(), Value::Object(inputs));

    Value::Object(body)
}
