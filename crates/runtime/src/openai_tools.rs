//! Converts the tool catalogue `ToolRegistry::describe_for_llm` returns
//! into the OpenAI-compatible `tools` array `LlmClient::call` expects.
//! `ToolParam` carries no JSON-schema type, so every parameter is
//! described as a string; providers coerce from there.

use serde_json::{json, Map, Value};
use turnkeep_tools::ToolSpec;

pub fn specs_to_openai_tools(specs: &[ToolSpec]) -> Value {
    let tools: Vec<Value> = specs
        .iter()
        .map(|spec| {
            let mut properties = Map::new();
            let mut required = Vec::new();
            for param in &spec.params {
                properties.insert(param.name.clone(), json!({"type": "string", "description": param.description}));
                if param.required {
                    required.push(Value::String(param.name.clone()));
                }
            }
            json!({
                "type": "function",
                "function": {
                    "name": spec.name,
                    "description": spec.description,
                    "parameters": {
                        "type": "object",
                        "properties": Value::Object(properties),
                        "required": required,
                    }
                }
            })
        })
        .collect();
    Value::Array(tools)
}

#[cfg(test)]
mod tests {
    use super::*;
    use turnkeep_tools::{ToolMetadata, ToolParam};

    #[test]
    fn marks_required_params_and_describes_every_tool() {
        let specs = vec![ToolSpec {
            name: "read_file".to_string(),
            description: "Reads a file".to_string(),
            params: vec![
                ToolParam { name: "path".to_string(), description: "target path".to_string(), required: true },
                ToolParam { name: "max_bytes".to_string(), description: "cap".to_string(), required: false },
            ],
            metadata: ToolMetadata::default(),
        }];
        let tools = specs_to_openai_tools(&specs);
        let arr = tools.as_array().unwrap();
        assert_eq!(arr.len(), 1);
        assert_eq!(arr[0]["function"]["name"], "read_file");
        assert_eq!(arr[0]["function"]["parameters"]["required"], json!(["path"]));
        assert!(arr[0]["function"]["parameters"]["properties"]["max_bytes"].is_object());
    }

    #[test]
    fn empty_specs_produce_an_empty_array() {
        assert_eq!(specs_to_openai_tools(&[]), json!([]));
    }
}
