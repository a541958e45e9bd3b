use crate::pipeline::Pipeline;
use rmcp::{
    ErrorData as McpError, RoleServer, ServerHandler,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::*,
    schemars,
    service::RequestContext,
    tool, tool_handler, tool_router,
};
use std::sync::Arc;

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct ParseBundleArgs {
    #[schemars(
        description = "Path to an .xcresult bundle, or to an exported JSON file when 'fixture' is set",
        example = "build/Test.xcresult"
    )]
    pub path: String,

    #[schemars(description = "Treat 'path' as a pre-exported JSON fixture instead of a bundle")]
    pub fixture: Option<bool>,
}

fn validate_bundle_path(path: &str) -> Result<(), String> {
    if path.trim().is_empty() {
        return Err("Empty bundle path".to_string());
    }

    // Block dangerous characters
    if path.contains('\0') || path.contains('\n') {
        return Err("Invalid characters in bundle path".to_string());
    }

    if path.len() > 4096 {
        return Err("Bundle path too long (max 4096 characters)".to_string());
    }

    Ok(())
}

#[derive(Clone)]
pub struct ReportServer {
    tool_router: ToolRouter<ReportServer>,
    bundles: Arc<Pipeline>,
    fixtures: Arc<Pipeline>,
}

#[tool_router]
impl ReportServer {
    pub fn new(bundles: Arc<Pipeline>, fixtures: Arc<Pipeline>) -> Self {
        Self {
            tool_router: Self::tool_router(),
            bundles,
            fixtures,
        }
    }

    #[tool(
        description = "Parse an Xcode result bundle into a normalized JSON report of suites with passed and failed tests"
    )]
    async fn parse_bundle(
        &self,
        Parameters(args): Parameters<ParseBundleArgs>,
    ) -> Result<CallToolResult, McpError> {
        if let Err(e) = validate_bundle_path(&args.path) {
            return Err(McpError::invalid_params(
                format!("Invalid parameters: {}", e),
                None,
            ));
        }

        let pipeline = if args.fixture.unwrap_or(false) {
            &self.fixtures
        } else {
            &self.bundles
        };

        let report = match pipeline.parse(&args.path).await {
            Ok(report) => report,
            Err(e) => {
                return Err(McpError::internal_error(
                    format!("Failed to parse {}: {}", args.path, e),
                    None,
                ));
            }
        };

        match serde_json::to_string_pretty(&report) {
            Ok(json) => Ok(CallToolResult::success(vec![Content::text(json)])),
            Err(e) => Err(McpError::internal_error(
                format!("Failed to serialize report: {}", e),
                None,
            )),
        }
    }

    #[tool(description = "List the result formats this server recognizes, highest priority first")]
    async fn list_formats(&self) -> Result<CallToolResult, McpError> {
        let formats = self
            .bundles
            .registry()
            .parsers()
            .iter()
            .map(|p| format!("{} (priority {})", p.name(), p.priority()))
            .collect::<Vec<_>>()
            .join("\n");

        Ok(CallToolResult::success(vec![Content::text(formats)]))
    }
}

#[tool_handler]
impl ServerHandler for ReportServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "Xcode result parser. Tools: parse_bundle (normalize an .xcresult bundle into a JSON report), list_formats (recognized result formats)."
                    .to_string(),
            ),
        }
    }

    async fn initialize(
        &self,
        _request: InitializeRequestParam,
        context: RequestContext<RoleServer>,
    ) -> Result<InitializeResult, McpError> {
        if let Some(http_request_part) = context.extensions.get::<axum::http::request::Parts>() {
            let initialize_headers = &http_request_part.headers;
            let initialize_uri = &http_request_part.uri;
            tracing::info!(?initialize_headers, %initialize_uri, "initialize from http server");
        }
        Ok(self.get_info())
    }
}
