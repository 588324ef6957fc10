//! Earth Engine serialized expression graphs.
//!
//! The REST API takes computations as `{"result": id, "values": {id: node}}`
//! where nodes may point at each other through `valueReference`. We only ever
//! build small graphs on top of expressions the caller hands us, so the
//! builder here just embeds existing graphs under fresh ids and wraps them in
//! one more invocation.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;

use crate::error::{Result, UsageError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawExpression")]
pub struct Expression {
    result: String,
    values: Map<String, Value>,
}

/// Wire shape before the result id is checked against the values.
#[derive(Deserialize)]
struct RawExpression {
    result: String,
    values: Map<String, Value>,
}

impl TryFrom<RawExpression> for Expression {
    type Error = String;

    fn try_from(raw: RawExpression) -> std::result::Result<Self, Self::Error> {
        if !raw.values.contains_key(&raw.result) {
            return Err(format!(
                "Earth Engine expression result '{}' is not among its values",
                raw.result
            ));
        }
        Ok(Expression {
            result: raw.result,
            values: raw.values,
        })
    }
}

impl Expression {
    /// A graph holding one literal value.
    pub fn constant(value: Value) -> Self {
        GraphBuilder::default().finish(json!({ "constantValue": value }))
    }

    /// `functionName(arguments...)` on top of the given argument graphs.
    pub fn invoke(function: &str, arguments: Vec<(&str, Expression)>) -> Self {
        let mut builder = GraphBuilder::default();
        let mut args = Map::new();
        for (name, argument) in &arguments {
            args.insert((*name).to_string(), builder.embed(argument));
        }
        builder.finish(json!({
            "functionInvocationValue": {
                "functionName": function,
                "arguments": args,
            }
        }))
    }

    pub fn array(items: Vec<Expression>) -> Self {
        let mut builder = GraphBuilder::default();
        let values: Vec<Value> = items.iter().map(|item| builder.embed(item)).collect();
        builder.finish(json!({ "arrayValue": { "values": values } }))
    }

    /// Accepts the output of any Earth Engine client serializer.
    pub fn from_json(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| {
            UsageError::UnsupportedSource(format!("malformed Earth Engine expression ({e})")).into()
        })
    }

    pub fn to_json(&self) -> Value {
        json!({ "result": self.result, "values": self.values })
    }

    /// The node the graph evaluates to.
    pub fn root(&self) -> &Value {
        &self.values[&self.result]
    }

    /// Name of the function invoked at the root, if the root is an invocation.
    pub fn function_name(&self) -> Option<&str> {
        self.root()
            .get("functionInvocationValue")?
            .get("functionName")?
            .as_str()
    }

    /// Argument node of the root invocation, resolving one level of references.
    pub fn argument(&self, name: &str) -> Option<&Value> {
        let node = self
            .root()
            .get("functionInvocationValue")?
            .get("arguments")?
            .get(name)?;
        match node.get("valueReference").and_then(Value::as_str) {
            Some(id) => self.values.get(id),
            None => Some(node),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// A lone node can be inlined into a parent instead of referenced.
    fn inline_node(&self) -> Option<&Value> {
        if self.values.len() == 1 {
            self.values.get(&self.result)
        } else {
            None
        }
    }
}

#[derive(Default)]
struct GraphBuilder {
    values: Map<String, Value>,
    next: usize,
}

impl GraphBuilder {
    fn next_id(&mut self) -> String {
        let id = self.next.to_string();
        self.next += 1;
        id
    }

    /// Copies `expression` into this graph and returns a node pointing at its result.
    fn embed(&mut self, expression: &Expression) -> Value {
        if let Some(node) = expression.inline_node() {
            return node.clone();
        }

        let mapping: HashMap<String, String> = expression
            .values
            .keys()
            .map(|key| (key.clone(), self.next_id()))
            .collect();

        for (key, node) in &expression.values {
            let mut node = node.clone();
            rewrite_references(&mut node, &mapping);
            self.values.insert(mapping[key].clone(), node);
        }

        json!({ "valueReference": mapping[&expression.result] })
    }

    fn finish(mut self, root: Value) -> Expression {
        let result = self.next_id();
        self.values.insert(result.clone(), root);
        Expression {
            result,
            values: self.values,
        }
    }
}

fn rewrite_references(node: &mut Value, mapping: &HashMap<String, String>) {
    match node {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                if key == "valueReference" {
                    if let Some(new_id) = child.as_str().and_then(|id| mapping.get(id)) {
                        *child = Value::String(new_id.clone());
                    }
                } else {
                    rewrite_references(child, mapping);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                rewrite_references(item, mapping);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(id: &str) -> Expression {
        Expression::invoke("Image.load", vec![("id", Expression::constant(json!(id)))])
    }

    #[test]
    fn constants_are_inlined() {
        let image = load("USGS/SRTMGL1_003");
        assert_eq!(image.len(), 1);
        assert_eq!(image.function_name(), Some("Image.load"));
        assert_eq!(
            image.argument("id"),
            Some(&json!({ "constantValue": "USGS/SRTMGL1_003" }))
        );
    }

    #[test]
    fn nested_graphs_are_renumbered() {
        // A graph with a reference, as a client serializer would produce it.
        let shared = Expression::from_json(json!({
            "result": "0",
            "values": {
                "1": { "constantValue": "COPERNICUS/S2" },
                "0": { "functionInvocationValue": {
                    "functionName": "ImageCollection.load",
                    "arguments": { "id": { "valueReference": "1" } }
                }}
            }
        }))
        .unwrap();

        let mosaic = Expression::invoke("ImageCollection.mosaic", vec![("collection", shared.clone())]);
        let both = Expression::invoke(
            "Image.blend",
            vec![("top", mosaic.clone()), ("bottom", mosaic)],
        );

        assert_eq!(both.function_name(), Some("Image.blend"));
        // Two copies of a three-node graph plus the new root.
        assert_eq!(both.len(), 7);

        let top = both.argument("top").unwrap();
        assert_eq!(
            top["functionInvocationValue"]["functionName"],
            json!("ImageCollection.mosaic")
        );

        // Every reference must resolve inside the new graph.
        let serialized = both.to_json();
        let values = serialized["values"].as_object().unwrap();
        let mut references = Vec::new();
        collect_references(&serialized["values"], &mut references);
        assert_eq!(references.len(), 6);
        for id in &references {
            assert!(values.contains_key(id), "dangling reference {id}");
        }
        let reparsed = Expression::from_json(serialized).unwrap();
        assert_eq!(reparsed, both);
    }

    fn collect_references(node: &Value, out: &mut Vec<String>) {
        match node {
            Value::Object(map) => {
                for (key, child) in map {
                    match (key.as_str(), child.as_str()) {
                        ("valueReference", Some(id)) => out.push(id.to_string()),
                        _ => collect_references(child, out),
                    }
                }
            }
            Value::Array(items) => items.iter().for_each(|item| collect_references(item, out)),
            _ => {}
        }
    }

    #[test]
    fn rejects_dangling_result() {
        let err = Expression::from_json(json!({ "result": "3", "values": {} })).unwrap_err();
        assert!(err.to_string().contains("not among its values"));
    }

    #[test]
    fn plain_deserialization_checks_the_result_too() {
        let dangling = serde_json::from_value::<Expression>(json!({ "result": "7", "values": {} }));
        assert!(dangling.is_err());

        let valid = serde_json::from_value::<Expression>(load("a").to_json()).unwrap();
        assert_eq!(valid.function_name(), Some("Image.load"));
    }

    #[test]
    fn arrays_embed_items() {
        let array = Expression::array(vec![load("a"), load("b")]);
        let items = array.root()["arrayValue"]["values"].as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(array.len(), 1);
    }
}
