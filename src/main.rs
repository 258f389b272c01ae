//! CLI for PawChat
//!
//! Subcommands:
//! - `server`: run the WebSocket server
//! - `add-user`: store a user record with an already hashed password
//! - `token`: print a signed credential for a user id
//! - `client`: run a simple client (useful for smoke tests)

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use pawchat::auth::Authenticator;
use pawchat::broker::DeliveryEngine;
use pawchat::bus::FanoutBus;
use pawchat::config::{Settings, load_config};
use pawchat::persistence::{IdentityResolver, MessageStore, UserDirectory, open_db};
use pawchat::transport::start_websocket_server;
use pawchat::utils::logging;

#[derive(Parser)]
#[command(name = "pawchat")]
enum Command {
    /// Start the WebSocket server
    Server,
    /// Add a user to the directory
    AddUser {
        #[arg(long)]
        username: String,
        /// Password hash produced by the account service
        #[arg(long)]
        password_hash: String,
    },
    /// Issue a credential for an existing user
    Token {
        #[arg(long)]
        user_id: String,
        #[arg(long, default_value_t = 24)]
        ttl_hours: i64,
    },
    /// Connect, authenticate, print the backlog and optionally send one message
    Client {
        /// WebSocket server URL to connect to
        #[arg(long, default_value = "ws://127.0.0.1:8080")]
        url: String,
        #[arg(long)]
        token: String,
        #[arg(long, requires = "content")]
        recipient: Option<String>,
        #[arg(long, requires = "recipient")]
        content: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cmd = Command::parse();

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };
    logging::init(&config.log.level);

    let result = match cmd {
        Command::Server => run_server(config).await,
        Command::AddUser {
            username,
            password_hash,
        } => add_user(&config, &username, &password_hash),
        Command::Token { user_id, ttl_hours } => issue_token(&config, &user_id, ttl_hours),
        Command::Client {
            url,
            token,
            recipient,
            content,
        } => run_client(&url, &token, recipient.zip(content)).await,
    };

    if let Err(e) = result {
        error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run_server(config: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let db = open_db(&config.store.path)?;
    let users = Arc::new(UserDirectory::open(&db)?);
    let store = MessageStore::open(&db, users.clone())?;
    let bus = FanoutBus::connect(&config.bus).await?;

    let engine = Arc::new(DeliveryEngine::new(store, bus));
    let dispatch = engine.start();
    let auth = Arc::new(Authenticator::new(&config.server.jwt_secret, users));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    tokio::select! {
        res = start_websocket_server(&addr, engine, auth, config.clone()) => {
            res?;
            error!("WebSocket server exited unexpectedly.");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting gracefully.");
        }
    }

    dispatch.abort();
    db.flush_async().await?;
    Ok(())
}

fn add_user(
    config: &Settings,
    username: &str,
    password_hash: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let db = open_db(&config.store.path)?;
    let user = UserDirectory::open(&db)?.create(username, password_hash)?;
    db.flush()?;
    println!("{}", user.id);
    Ok(())
}

fn issue_token(
    config: &Settings,
    user_id: &str,
    ttl_hours: i64,
) -> Result<(), Box<dyn std::error::Error>> {
    let db = open_db(&config.store.path)?;
    let users = Arc::new(UserDirectory::open(&db)?);
    if !users.exists(user_id)? {
        return Err(format!("no user with id {user_id}").into());
    }
    let auth = Authenticator::new(&config.server.jwt_secret, users);
    println!("{}", auth.issue(user_id, chrono::Duration::hours(ttl_hours))?);
    Ok(())
}

async fn run_client(
    url: &str,
    token: &str,
    message: Option<(String, String)>,
) -> Result<(), Box<dyn std::error::Error>> {
    use futures_util::{SinkExt, StreamExt};
    use serde_json::json;
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    let (mut ws_stream, _response) = connect_async(url).await?;

    // 1. Auth
    let auth = json!({ "type": "auth", "token": token });
    ws_stream
        .send(WsMessage::Text(auth.to_string().into()))
        .await?;

    // 2. Auth outcome, then backlog on success
    if let Some(Ok(WsMessage::Text(resp))) = ws_stream.next().await {
        println!("Auth response: {}", resp.as_str());
        let v: serde_json::Value = serde_json::from_str(resp.as_str())?;
        if v.get("success").and_then(|s| s.as_bool()) != Some(true) {
            return Ok(());
        }
    }
    if let Some(Ok(WsMessage::Text(backlog))) = ws_stream.next().await {
        println!("Backlog: {}", backlog.as_str());
    }

    // 3. Optional send
    if let Some((recipient, content)) = message {
        let chat = json!({ "type": "chat", "recipient": recipient, "content": content });
        ws_stream
            .send(WsMessage::Text(chat.to_string().into()))
            .await?;
        if let Some(Ok(WsMessage::Text(resp))) = ws_stream.next().await {
            println!("Send response: {}", resp.as_str());
        }
    }

    ws_stream.close(None).await?;
    Ok(())
}
