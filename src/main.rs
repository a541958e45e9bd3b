use clap::{Parser, Subcommand};
use rmcp::transport::sse_server::{SseServer, SseServerConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{
    layer::SubscriberExt,
    util::SubscriberInitExt,
    {self},
};
use xcresult_report::config::{Settings, SourceKind};
use xcresult_report::format::DEFAULT_DETAIL_CONCURRENCY;
use xcresult_report::server::ReportServer;
use xcresult_report::{Error, SourceError, schema};

#[derive(Parser, Debug)]
#[command(name = "xcresult-report")]
#[command(about = "Normalize xcresulttool output into a stable JSON test report")]
struct Cli {
    /// xcrun executable used to invoke xcresulttool
    #[arg(long, global = true, env = "XCRESULT_REPORT_XCRUN", default_value = "xcrun")]
    xcrun: PathBuf,

    /// Persist fetched JSON here and reuse it on later runs
    #[arg(long, global = true, env = "XCRESULT_REPORT_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Detail payloads fetched concurrently
    #[arg(long, global = true, env = "XCRESULT_REPORT_CONCURRENCY", default_value_t = DEFAULT_DETAIL_CONCURRENCY)]
    concurrency: usize,

    /// Warn when fetched data does not match the schema xcresulttool documents
    #[arg(long, global = true)]
    validate_schema: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse a result bundle and print the report
    Parse {
        bundle: String,

        /// Read BUNDLE as an exported JSON file instead of running xcresulttool
        #[arg(long)]
        fixture: bool,

        /// Directory holding `<id>.json` detail payloads for --fixture
        #[arg(long, requires = "fixture")]
        details_dir: Option<PathBuf>,

        /// Write the report to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Emit compact JSON
        #[arg(long)]
        compact: bool,
    },
    /// List recognized result formats
    Formats,
    /// Print the JSON Schema of the report
    Schema,
    /// Serve the parser as MCP tools over HTTP with SSE
    Serve {
        #[arg(short = 'H', long, default_value = "127.0.0.1")]
        hostname: String,

        #[arg(short, long, default_value = "30301")]
        port: u16,
    },
}

impl Cli {
    fn settings(&self) -> Settings {
        Settings {
            xcrun: self.xcrun.clone(),
            cache_dir: self.cache_dir.clone(),
            concurrency: self.concurrency.max(1),
            validate_schema: self.validate_schema,
        }
    }
}

fn init_tracing(default_filter: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.to_string().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn exit_code_for(error: &Error) -> u8 {
    match error {
        Error::Format(_) => 2,
        Error::Source(SourceError::InvalidBundle(_)) => 3,
        Error::Source(SourceError::ToolUnavailable(_)) => 4,
        Error::Source(_) => 5,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let settings = cli.settings();

    match cli.command {
        Command::Parse {
            bundle,
            fixture,
            details_dir,
            output,
            compact,
        } => {
            init_tracing("info");
            let kind = if fixture {
                SourceKind::Fixture { details_dir }
            } else {
                SourceKind::Tool
            };
            let pipeline = settings.pipeline(&kind);

            let report = match pipeline.parse(&bundle).await {
                Ok(report) => report,
                Err(e) => {
                    tracing::error!(bundle = %bundle, error = %e, "failed to parse result bundle");
                    return Ok(ExitCode::from(exit_code_for(&e)));
                }
            };

            let json = if compact {
                serde_json::to_string(&report)?
            } else {
                serde_json::to_string_pretty(&report)?
            };
            match output {
                Some(path) => {
                    tokio::fs::write(&path, json).await?;
                    tracing::info!(output = %path.display(), "report written");
                }
                None => println!("{}", json),
            }

            let failures = report.failed_count();
            tracing::info!(
                suites = report.total_suites,
                tests = report.total_tests,
                failures,
                "done"
            );
            Ok(if failures > 0 {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            })
        }
        Command::Formats => {
            init_tracing("warn");
            let pipeline = settings.pipeline(&SourceKind::Tool);
            for parser in pipeline.registry().parsers() {
                println!("{}\t{}", parser.priority(), parser.name());
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Schema => {
            init_tracing("warn");
            println!("{}", serde_json::to_string_pretty(&schema::report_schema())?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Serve { hostname, port } => {
            init_tracing("debug");
            serve(&settings, &hostname, port).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn serve(settings: &Settings, hostname: &str, port: u16) -> anyhow::Result<()> {
    let bind_address: SocketAddr = format!("{}:{}", hostname, port).parse()?;

    tracing::info!("Starting xcresult report MCP server on {}", bind_address);

    let bundles = Arc::new(settings.pipeline(&SourceKind::Tool));
    let fixtures = Arc::new(settings.pipeline(&SourceKind::Fixture { details_dir: None }));

    let config = SseServerConfig {
        bind: bind_address,
        sse_path: "/sse".to_string(),
        post_path: "/message".to_string(),
        ct: tokio_util::sync::CancellationToken::new(),
        sse_keep_alive: None,
    };

    let (sse_server, router) = SseServer::new(config);

    let listener = tokio::net::TcpListener::bind(sse_server.config.bind).await?;

    let ct = sse_server.config.ct.child_token();

    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        ct.cancelled().await;
        tracing::info!("sse server cancelled");
    });

    tokio::spawn(async move {
        if let Err(e) = server.await {
            tracing::error!(error = %e, "sse server shutdown with error");
        }
    });

    let ct = sse_server.with_service(move || ReportServer::new(bundles.clone(), fixtures.clone()));

    tracing::info!("xcresult report MCP server is running!");
    tracing::info!("SSE endpoint: http://{}/sse", bind_address);
    tracing::info!("Message endpoint: http://{}/message", bind_address);
    tracing::info!("Press Ctrl+C to stop");

    tokio::signal::ctrl_c().await?;
    ct.cancel();
    Ok(())
}
