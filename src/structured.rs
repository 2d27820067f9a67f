//! Schema-guided structured output
//!
//! [`generate_struct`] turns any provider into a typed JSON generator:
//!
//! 1. A compact JSON schema is derived from the target type's `JsonSchema`
//!    implementation (field names, doc-comment descriptions, primitive kinds,
//!    nested records and arrays of records).
//! 2. A system instruction embedding that schema is prepended to a copy of the
//!    request, and JSON mode is switched on.
//! 3. The raw completion is sanitized by [`ResponseParser`] and deserialized
//!    into the target type.
//!
//! ```rust,no_run
//! use poly_llm::{generate_struct, CallContext, ChatMessage, ChatRequest, Provider};
//! use schemars::JsonSchema;
//! use serde::Deserialize;
//!
//! #[derive(Debug, Deserialize, JsonSchema)]
//! struct Answer {
//!     /// The direct answer to the question
//!     answer: String,
//!     /// Important keywords related to the answer
//!     keywords: Vec<String>,
//! }
//!
//! # async fn example(provider: &dyn Provider) -> poly_llm::LlmResult<()> {
//! let request = ChatRequest::new("llama3", vec![ChatMessage::user("What is a trait?")]);
//! let answer: Answer = generate_struct(provider, &CallContext::new(), &request).await?;
//! # Ok(())
//! # }
//! ```

use crate::core_types::{CallContext, ChatMessage, ChatRequest, Provider};
use crate::error::{LlmError, LlmResult};
use crate::logging::log_debug;
use crate::response_parser::ResponseParser;
use schemars::schema::{InstanceType, RootSchema, Schema, SchemaObject, SingleOrVec};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};

const DEFINITIONS_PREFIX: &str = "#/definitions/";

/// Ask `provider` for a value of type `T`
///
/// `request` is left untouched; the provider receives a copy with the schema
/// instruction as its first message and JSON mode enabled.
pub async fn generate_struct<T, P>(
    provider: &P,
    ctx: &CallContext,
    request: &ChatRequest,
) -> LlmResult<T>
where
    T: DeserializeOwned + JsonSchema,
    P: Provider + ?Sized,
{
    let schema = derive_schema::<T>()?;
    let rendered = serde_json::to_string_pretty(&schema)
        .map_err(|e| LlmError::schema_derivation(e.to_string()))?;

    let structured = structured_request(request, &rendered);
    let response = provider.generate(ctx, &structured).await?;

    log_debug!(
        target_type = std::any::type_name::<T>(),
        content_length = response.content.len(),
        "Parsing structured output"
    );
    parse_structured(&response.content)
}

/// Sanitize raw model output and deserialize it into `T`
pub fn parse_structured<T: DeserializeOwned>(raw: &str) -> LlmResult<T> {
    let extracted = ResponseParser::extract_json(raw)?;
    serde_json::from_str(extracted).map_err(|e| LlmError::malformed_json(e.to_string(), extracted))
}

/// Build the request actually sent for structured output
pub fn structured_request(request: &ChatRequest, schema: &str) -> ChatRequest {
    let instruction = format!(
        "You are a JSON data generation engine, not a chat assistant.\n\
         Your response must strictly follow this JSON schema:\n\
         {schema}\n\n\
         Do not wrap the output in a Markdown code block.\n\
         Do not add comments.\n\
         Do not write any introduction or closing remarks.\n\
         Return only the raw JSON object."
    );

    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    messages.push(ChatMessage::system(instruction));
    messages.extend(request.messages.iter().cloned());

    ChatRequest {
        messages,
        json_mode: true,
        ..request.clone()
    }
}

/// Derive the compact schema for record type `T`
///
/// The result has the shape `{"type": "object", "properties": {...}}` where
/// each property carries `description` and `type`, plus `items` for arrays and
/// `properties` for nested records. Types that are not records (primitives,
/// sequences, unit structs, data-carrying enums) are rejected.
pub fn derive_schema<T: JsonSchema>() -> LlmResult<Value> {
    let root = schemars::schema_for!(T);
    SchemaProjector::new(&root).project_root(std::any::type_name::<T>())
}

/// Walks a `schemars` schema and emits the compact form
struct SchemaProjector<'a> {
    root: &'a RootSchema,
    /// Definitions currently being expanded, to cut recursive types
    expanding: Vec<&'a str>,
}

impl<'a> SchemaProjector<'a> {
    fn new(root: &'a RootSchema) -> Self {
        Self {
            root,
            expanding: Vec::new(),
        }
    }

    fn project_root(&mut self, type_name: &str) -> LlmResult<Value> {
        let (target, definition) = self.resolve(&self.root.schema);
        if kind_of(target) != Some(InstanceType::Object) {
            return Err(LlmError::schema_derivation(format!(
                "invalid target: {type_name} is not a record type with named fields"
            )));
        }
        Ok(json!({
            "type": "object",
            "properties": self.properties(target, definition),
        }))
    }

    /// Follow `$ref`s and single-schema wrappers (`allOf: [x]`, `anyOf: [x, null]`)
    fn resolve(&self, schema: &'a SchemaObject) -> (&'a SchemaObject, Option<&'a str>) {
        if let Some(reference) = &schema.reference {
            let name = reference.trim_start_matches(DEFINITIONS_PREFIX);
            if let Some((key, Schema::Object(definition))) =
                self.root.definitions.get_key_value(name)
            {
                return (definition, Some(key.as_str()));
            }
            return (schema, None);
        }

        if let Some(subschemas) = &schema.subschemas {
            let candidates = subschemas
                .all_of
                .as_ref()
                .filter(|all_of| all_of.len() == 1)
                .or(subschemas.any_of.as_ref())
                .or(subschemas.one_of.as_ref());

            if let Some(candidates) = candidates {
                let mut non_null = candidates.iter().filter_map(|candidate| match candidate {
                    Schema::Object(obj) if kind_of(obj) != Some(InstanceType::Null) => Some(obj),
                    _ => None,
                });
                if let (Some(only), None) = (non_null.next(), non_null.next()) {
                    return self.resolve(only);
                }
            }
        }

        (schema, None)
    }

    fn properties(&mut self, target: &'a SchemaObject, definition: Option<&'a str>) -> Value {
        let mut props = Map::new();

        if let Some(name) = definition {
            // Recursive type: stop at a bare object
            if self.expanding.contains(&name) {
                return Value::Object(props);
            }
            self.expanding.push(name);
        }

        if let Some(object) = &target.object {
            for (field, schema) in &object.properties {
                props.insert(field.clone(), self.property(schema));
            }
        }

        if definition.is_some() {
            self.expanding.pop();
        }
        Value::Object(props)
    }

    fn property(&mut self, schema: &'a Schema) -> Value {
        let mut prop = match schema {
            Schema::Object(obj) => self.shape(obj),
            Schema::Bool(_) => shape_of_kind("string"),
        };

        let description = match schema {
            Schema::Object(obj) => self.description(obj),
            Schema::Bool(_) => None,
        };
        prop.insert(
            "description".to_string(),
            Value::String(description.unwrap_or_default()),
        );
        Value::Object(prop)
    }

    fn description(&self, schema: &'a SchemaObject) -> Option<String> {
        schema
            .metadata
            .as_ref()
            .and_then(|meta| meta.description.clone())
            .or_else(|| {
                let (target, _) = self.resolve(schema);
                target.metadata.as_ref().and_then(|meta| meta.description.clone())
            })
    }

    /// `type` plus `items` / `properties` where they apply
    fn shape(&mut self, schema: &'a SchemaObject) -> Map<String, Value> {
        let (target, definition) = self.resolve(schema);

        match kind_of(target) {
            Some(InstanceType::Array) => {
                let mut shape = shape_of_kind("array");
                let items = target
                    .array
                    .as_ref()
                    .and_then(|array| array.items.as_ref())
                    .and_then(|items| match items {
                        SingleOrVec::Single(item) => Some(item.as_ref()),
                        SingleOrVec::Vec(items) => items.first(),
                    });
                let item_shape = match items {
                    Some(Schema::Object(item)) => self.shape(item),
                    _ => shape_of_kind("string"),
                };
                shape.insert("items".to_string(), Value::Object(item_shape));
                shape
            }
            Some(InstanceType::Object) => {
                let mut shape = shape_of_kind("object");
                shape.insert(
                    "properties".to_string(),
                    self.properties(target, definition),
                );
                shape
            }
            Some(InstanceType::Integer) => shape_of_kind("integer"),
            Some(InstanceType::Number) => shape_of_kind("number"),
            Some(InstanceType::Boolean) => shape_of_kind("boolean"),
            _ => shape_of_kind("string"),
        }
    }
}

fn shape_of_kind(kind: &str) -> Map<String, Value> {
    let mut shape = Map::new();
    shape.insert("type".to_string(), Value::String(kind.to_string()));
    shape
}

/// The instance type of a schema, ignoring `null` in nullable unions
fn kind_of(schema: &SchemaObject) -> Option<InstanceType> {
    match &schema.instance_type {
        Some(SingleOrVec::Single(kind)) => Some(**kind),
        Some(SingleOrVec::Vec(kinds)) => kinds
            .iter()
            .copied()
            .find(|kind| *kind != InstanceType::Null)
            .or(Some(InstanceType::Null)),
        None if schema.object.is_some() => Some(InstanceType::Object),
        None => None,
    }
}
