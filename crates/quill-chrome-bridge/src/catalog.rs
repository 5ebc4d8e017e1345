//! 浏览器工具目录
//!
//! 目录是静态配置:内置默认目录,也可由 JSON 文件整体替换。
//! 这里只描述工具的名称与输入 schema,不定义任何工具的执行语义 ——
//! 执行发生在浏览器扩展内部。

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::ConfigError;

/// 工具描述
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: serde_json::Value,
}

/// 工具目录
#[derive(Debug, Clone)]
pub struct ToolCatalog {
    tools: Vec<ToolDescriptor>,
}

impl ToolCatalog {
    /// 内置默认目录
    pub fn builtin() -> Self {
        Self {
            tools: vec![
                navigate(),
                screenshot(),
                read_page(),
                find(),
                form_input(),
                computer(),
                get_page_text(),
                resize_window(),
                tabs_context(),
                read_console_messages(),
            ],
        }
    }

    /// 从 JSON 文件加载目录(整体替换内置目录)
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let tools: Vec<ToolDescriptor> = serde_json::from_str(&contents)?;
        Ok(Self { tools })
    }

    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.name == name)
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.iter().find(|t| t.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }
}

impl Default for ToolCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

fn navigate() -> ToolDescriptor {
    ToolDescriptor {
        name: "navigate".to_string(),
        description: "Navigate to a URL or perform browser navigation actions.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "url": { "type": "string", "description": "URL to navigate to" },
                "action": { "type": "string", "enum": ["goto", "back", "forward", "reload"] },
                "tabId": { "type": "number" }
            },
            "required": ["tabId"]
        }),
    }
}

fn screenshot() -> ToolDescriptor {
    ToolDescriptor {
        name: "screenshot".to_string(),
        description: "Capture a screenshot of the visible page.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "tabId": { "type": "number", "description": "Tab ID to capture" },
                "fullPage": { "type": "boolean", "description": "Capture the full scrollable page" }
            },
            "required": []
        }),
    }
}

fn read_page() -> ToolDescriptor {
    ToolDescriptor {
        name: "read_page".to_string(),
        description: "Get an accessibility tree representation of elements on the page.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "filter": { "type": "string", "enum": ["interactive", "all"] },
                "tabId": { "type": "number", "description": "Tab ID to read from" },
                "depth": { "type": "number", "description": "Maximum depth of the tree" }
            },
            "required": ["tabId"]
        }),
    }
}

fn find() -> ToolDescriptor {
    ToolDescriptor {
        name: "find".to_string(),
        description: "Find elements on the page using natural language.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Natural language description" },
                "tabId": { "type": "number", "description": "Tab ID to search in" }
            },
            "required": ["query", "tabId"]
        }),
    }
}

fn form_input() -> ToolDescriptor {
    ToolDescriptor {
        name: "form_input".to_string(),
        description: "Fill in form fields on the page.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "ref_id": { "type": "string", "description": "Reference ID of the form element" },
                "value": { "type": "string", "description": "Value to fill in" },
                "tabId": { "type": "number", "description": "Tab ID containing the form" }
            },
            "required": ["ref_id", "value", "tabId"]
        }),
    }
}

fn computer() -> ToolDescriptor {
    ToolDescriptor {
        name: "computer".to_string(),
        description: "Perform mouse and keyboard actions on the page.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "action": { "type": "string", "enum": ["click", "type", "scroll", "key", "move", "drag"] },
                "ref_id": { "type": "string" },
                "text": { "type": "string" },
                "coordinate": { "type": "array", "items": { "type": "number" } },
                "tabId": { "type": "number" }
            },
            "required": ["action", "tabId"]
        }),
    }
}

fn get_page_text() -> ToolDescriptor {
    ToolDescriptor {
        name: "get_page_text".to_string(),
        description: "Get the text content of the current page.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "tabId": { "type": "number" }
            },
            "required": ["tabId"]
        }),
    }
}

fn resize_window() -> ToolDescriptor {
    ToolDescriptor {
        name: "resize_window".to_string(),
        description: "Resize the browser window to specific dimensions.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "width": { "type": "number", "description": "Window width in pixels" },
                "height": { "type": "number", "description": "Window height in pixels" },
                "tabId": { "type": "number" }
            },
            "required": ["width", "height", "tabId"]
        }),
    }
}

fn tabs_context() -> ToolDescriptor {
    ToolDescriptor {
        name: "tabs_context".to_string(),
        description: "Get information about currently open browser tabs.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "createIfEmpty": { "type": "boolean" }
            },
            "required": []
        }),
    }
}

fn read_console_messages() -> ToolDescriptor {
    ToolDescriptor {
        name: "read_console_messages".to_string(),
        description: "Read console messages from the browser developer tools.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "pattern": { "type": "string", "description": "Regex pattern to filter" },
                "tabId": { "type": "number" },
                "limit": { "type": "number", "description": "Maximum number of messages" }
            },
            "required": ["tabId"]
        }),
    }
}
