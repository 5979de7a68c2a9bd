use std::process::ExitCode;

use ferrotalk_agent::ToolRegistry;
use serde_json::{json, Value};

use crate::config::AppConfig;
use crate::error::CliError;

pub fn run(config: &AppConfig) -> Result<ExitCode, CliError> {
    let registry = if config.web_search {
        ToolRegistry::standard().with_web_search()
    } else {
        ToolRegistry::standard()
    };

    println!("{}", serde_json::to_string_pretty(&describe(&registry))?);
    Ok(ExitCode::SUCCESS)
}

fn describe(registry: &ToolRegistry) -> Value {
    let tools: Vec<Value> = registry
        .descriptors()
        .iter()
        .map(|descriptor| {
            json!({
                "name": descriptor.name,
                "description": descriptor.description,
                "parameters": descriptor.parameters_schema(),
            })
        })
        .collect();

    json!({"version": registry.version(), "tools": tools})
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_every_standard_tool_with_schema() {
        let value = describe(&ToolRegistry::standard());

        assert_eq!(value["version"], "2024.1");
        let tools = value["tools"].as_array().expect("tools array");
        assert_eq!(tools.len(), 6);
        assert_eq!(tools[0]["name"], "get_stock_price");
        assert_eq!(tools[0]["parameters"]["required"], json!(["symbol"]));
    }
}
