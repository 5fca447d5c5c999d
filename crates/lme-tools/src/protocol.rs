use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

// ---------------------------------------------------------------------------
// Tool descriptors handed to the completion service
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    String,
    Integer,
    IntegerArray,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub param_type: ParamType,
    pub description: String,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ParamSpec {
    fn new(name: &str, param_type: ParamType, description: &str) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: description.into(),
            required: true,
            default: None,
        }
    }

    pub fn string(name: &str, description: &str) -> Self {
        Self::new(name, ParamType::String, description)
    }

    pub fn integer(name: &str, description: &str) -> Self {
        Self::new(name, ParamType::Integer, description)
    }

    pub fn integer_array(name: &str, description: &str) -> Self {
        Self::new(name, ParamType::IntegerArray, description)
    }

    /// Mark optional with a default value.
    pub fn with_default(mut self, default: Value) -> Self {
        self.required = false;
        self.default = Some(default);
        self
    }

    fn schema(&self) -> Value {
        let mut schema = match self.param_type {
            ParamType::String => json!({ "type": "string" }),
            ParamType::Integer => json!({ "type": "integer" }),
            ParamType::IntegerArray => json!({ "type": "array", "items": { "type": "integer" } }),
        };
        schema["description"] = Value::String(self.description.clone());
        if let Some(d) = &self.default {
            schema["default"] = d.clone();
        }
        schema
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub params: Vec<ParamSpec>,
}

impl ToolDescriptor {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            params: Vec::new(),
        }
    }

    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }

    /// The function-calling shape:
    /// `{"type": "function", "function": {name, description, parameters}}`.
    pub fn to_function_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for p in &self.params {
            properties.insert(p.name.clone(), p.schema());
            if p.required {
                required.push(Value::String(p.name.clone()));
            }
        }
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": {
                    "type": "object",
                    "properties": properties,
                    "required": required,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_schema_shape() {
        let tool = ToolDescriptor::new("search_memory", "Search history.")
            .param(ParamSpec::string("query", "Search query"))
            .param(ParamSpec::integer("top_k", "How many").with_default(json!(3)));
        let v = tool.to_function_schema();
        assert_eq!(v["type"], "function");
        assert_eq!(v["function"]["name"], "search_memory");
        let params = &v["function"]["parameters"];
        assert_eq!(params["type"], "object");
        assert_eq!(params["properties"]["query"]["type"], "string");
        assert_eq!(params["properties"]["top_k"]["default"], 3);
        assert_eq!(params["required"], json!(["query"]));
    }

    #[test]
    fn test_no_params_has_empty_object() {
        let v = ToolDescriptor::new("list_sessions", "List.").to_function_schema();
        assert_eq!(v["function"]["parameters"]["properties"], json!({}));
        assert_eq!(v["function"]["parameters"]["required"], json!([]));
    }

    #[test]
    fn test_integer_array_schema() {
        let v = ToolDescriptor::new("read_multiple_files", "Read.")
            .param(ParamSpec::integer_array("file_indices", "Indices"))
            .to_function_schema();
        let p = &v["function"]["parameters"]["properties"]["file_indices"];
        assert_eq!(p["type"], "array");
        assert_eq!(p["items"]["type"], "integer");
    }
}
