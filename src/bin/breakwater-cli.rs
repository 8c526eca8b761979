use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Map, Value};

#[derive(Parser)]
#[command(name = "breakwater-cli")]
#[command(about = "Management CLI for the breakwater gateway", long_about = None)]
struct Cli {
    /// Gateway base URL.
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Admin API key.
    #[arg(short, long, default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Router status: endpoint states, totals, cache counters
    Status,
    /// Drop every cached response
    ClearCache,
    /// Close an endpoint's circuit and clear its failure count
    Reset {
        /// Endpoint id
        endpoint: String,
    },
    /// Bypass the resilience layer, calls go straight through
    Disable,
    /// Re-enable the resilience layer
    Enable,
    /// Execute one routed request through the gateway
    Execute {
        /// Endpoint id
        endpoint: String,
        /// Operation path, e.g. "search" or "tiles/4/8/5"
        operation: String,
        /// Request parameters as a JSON object
        #[arg(short, long, default_value = "{}")]
        params: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    match cli.command {
        Commands::Status => {
            let res = client
                .get(format!("{}/admin/status", cli.url))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::ClearCache => {
            let res = client
                .post(format!("{}/admin/cache/clear", cli.url))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Reset { endpoint } => {
            let res = client
                .post(format!("{}/admin/endpoints/{}/reset", cli.url, endpoint))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Disable => {
            let res = client
                .post(format!("{}/admin/disable", cli.url))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Enable => {
            let res = client
                .post(format!("{}/admin/enable", cli.url))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Execute {
            endpoint,
            operation,
            params,
        } => {
            let params: Map<String, Value> = serde_json::from_str(&params)?;
            let res = client
                .post(format!("{}/v1/execute", cli.url))
                .json(&json!({
                    "operation": operation,
                    "params": params,
                    "endpoint": endpoint,
                }))
                .send()
                .await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: gateway returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
