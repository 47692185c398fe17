use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "hub-cli")]
#[command(about = "Management CLI for the WebSub hub", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    #[arg(short, long, default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check hub status
    Status,
    /// List stored subscriptions
    Subscriptions,
    /// Show blocked callback domains
    Blocklist,
    /// Send a subscription request to the hub endpoint
    Subscribe {
        #[arg(long)]
        topic: String,
        #[arg(long)]
        callback: String,
        #[arg(long, default_value = "")]
        secret: String,
        #[arg(long)]
        lease_seconds: Option<u64>,
        /// Hub endpoint path
        #[arg(long, default_value = "/hub")]
        path: String,
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

    let admin_path = match &cli.command {
        Commands::Status => "/admin/status",
        Commands::Subscriptions => "/admin/subscriptions",
        Commands::Blocklist => "/admin/blocklist",
        Commands::Subscribe {
            topic,
            callback,
            secret,
            lease_seconds,
            path,
        } => {
            let mut form = vec![
                ("hub.mode", "subscribe".to_string()),
                ("hub.topic", topic.clone()),
                ("hub.callback", callback.clone()),
                ("hub.secret", secret.clone()),
            ];
            if let Some(lease) = lease_seconds {
                form.push(("hub.lease_seconds", lease.to_string()));
            }

            let res = client
                .post(format!("{}{}", cli.url, path))
                .form(&form)
                .send()
                .await?;
            let status = res.status();
            let body = res.text().await?;
            println!("{} {}", status.as_u16(), body);
            return Ok(());
        }
    };

    let res = client
        .get(format!("{}{}", cli.url, admin_path))
        .headers(headers)
        .send()
        .await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
