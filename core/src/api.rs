/// API server for CLI and external clients: one JSON request per line
use crate::engine::ActivityEngine;
use crate::error::{Result, WalletError};
use crate::state::StreamKey;
use crate::tokens::tron_token_slugs;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

/// API request
#[derive(Debug, Deserialize)]
#[serde(tag = "command")]
enum ApiRequest {
    #[serde(rename = "activities")]
    Activities {
        account_id: String,
        #[serde(default)]
        slug: Option<String>,
        #[serde(default)]
        include_hidden: bool,
    },
    #[serde(rename = "sync")]
    Sync {
        account_id: String,
        #[serde(default)]
        slug: Option<String>,
        #[serde(default)]
        budget: bool,
    },
    #[serde(rename = "refresh")]
    Refresh { account_id: String },
    #[serde(rename = "cancel_pending")]
    CancelPending { id: String },
    #[serde(rename = "status")]
    Status,
}

/// API response
#[derive(Debug, Serialize)]
struct ApiResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ApiResponse {
    fn success(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn error(msg: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg),
        }
    }
}

/// Start API server for CLI
pub async fn start_api_server(engine: ActivityEngine, api_addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(&api_addr).await?;
    info!("API server listening on {}", api_addr);
    serve(listener, engine).await
}

/// Accept loop over an already bound listener
pub async fn serve(listener: TcpListener, engine: ActivityEngine) -> Result<()> {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                debug!("API client connected from {}", addr);
                let engine = engine.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_api_client(stream, engine).await {
                        error!("Error handling API client: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept API connection: {}", e);
            }
        }
    }
}

async fn handle_api_client(mut stream: TcpStream, engine: ActivityEngine) -> Result<()> {
    let (reader, mut writer) = stream.split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                debug!("API client disconnected");
                break;
            }
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }

                let response = match handle_request(trimmed, &engine).await {
                    Ok(resp) => resp,
                    Err(e) => ApiResponse::error(e.to_string()),
                };

                let json = serde_json::to_string(&response).map_err(|e| {
                    WalletError::Protocol(format!("Failed to serialize response: {}", e))
                })?;
                writer.write_all(json.as_bytes()).await?;
                writer.write_all(b"\n").await?;
            }
            Err(e) => {
                error!("Error reading from API client: {}", e);
                break;
            }
        }
    }

    Ok(())
}

async fn handle_request(request: &str, engine: &ActivityEngine) -> Result<ApiResponse> {
    let req: ApiRequest = serde_json::from_str(request)
        .map_err(|e| WalletError::Protocol(format!("Invalid request: {}", e)))?;

    match req {
        ApiRequest::Activities {
            account_id,
            slug,
            include_hidden,
        } => {
            engine.account(&account_id).await?;
            let stream = StreamKey::from_slug(slug.as_deref());
            let activities = if include_hidden {
                engine.stream_activities(&account_id, &stream).await
            } else {
                engine.visible_activities(&account_id, &stream).await
            };
            let is_history_end_reached = engine
                .store()
                .read(|s| {
                    s.account_activities(&account_id)
                        .map(|a| a.is_history_end_reached(&stream))
                        .unwrap_or(false)
                })
                .await;
            Ok(ApiResponse::success(serde_json::json!({
                "stream": stream,
                "activities": activities,
                "is_history_end_reached": is_history_end_reached,
            })))
        }
        ApiRequest::Sync {
            account_id,
            slug,
            budget,
        } => {
            engine.account(&account_id).await?;
            let stream = StreamKey::from_slug(slug.as_deref());
            engine
                .trigger_past_activities(&account_id, &stream, budget)
                .await;
            Ok(ApiResponse::success(serde_json::json!({
                "stream": stream,
                "scheduled": true,
            })))
        }
        ApiRequest::Refresh { account_id } => {
            let count = engine.refresh_latest(&account_id).await?;
            Ok(ApiResponse::success(serde_json::json!({
                "new_activities": count
            })))
        }
        ApiRequest::CancelPending { id } => {
            let cancelled = engine.cancel_pending_transfer(&id).await;
            Ok(ApiResponse::success(serde_json::json!({
                "cancelled": cancelled
            })))
        }
        ApiRequest::Status => {
            let network = engine.config().network;
            let accounts = engine
                .store()
                .read(|s| {
                    s.accounts
                        .values()
                        .map(|a| {
                            serde_json::json!({
                                "id": a.account.id,
                                "activities": a.activities.by_id.len(),
                                "streams": a.activities.windows.keys().collect::<Vec<_>>(),
                                "is_initial_loaded": a.activities.is_initial_loaded,
                            })
                        })
                        .collect::<Vec<_>>()
                })
                .await;
            Ok(ApiResponse::success(serde_json::json!({
                "network": network,
                "tracked_tron_slugs": tron_token_slugs(network),
                "accounts": accounts,
            })))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::Account;
    use crate::activity::fixtures::tx;
    use crate::chain::{ChainRegistry, FixtureChain};
    use crate::config::Config;
    use crate::tokens::Chain;
    use std::sync::Arc;

    async fn engine() -> ActivityEngine {
        let ton = FixtureChain::new(Chain::Ton);
        ton.push("0-mainnet", vec![tx("a", 20), tx("b", 10)]).await;
        let engine = ActivityEngine::new(
            Config::default(),
            ChainRegistry::new().with(Arc::new(ton)),
        )
        .unwrap();
        engine
            .add_account(Account::new("0-mainnet").with_address(Chain::Ton, "UQmine"))
            .await
            .unwrap();
        engine.load_initial_activities("0-mainnet").await.unwrap();
        engine
    }

    #[tokio::test]
    async fn test_activities_request() {
        let engine = engine().await;
        let response = handle_request(
            r#"{"command":"activities","account_id":"0-mainnet"}"#,
            &engine,
        )
        .await
        .unwrap();

        assert!(response.success);
        let data = response.data.unwrap();
        assert_eq!(data["stream"], "all");
        assert_eq!(data["activities"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_account_and_bad_request() {
        let engine = engine().await;
        let err = handle_request(r#"{"command":"refresh","account_id":"9-mainnet"}"#, &engine)
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::AccountNotFound(_)));

        let err = handle_request(r#"{"command":"launch"}"#, &engine)
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_line_protocol_over_tcp() {
        let engine = engine().await;
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, engine));

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"{\"command\":\"status\"}\n").await.unwrap();
        let mut reader = BufReader::new(client);
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();

        let response: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(response["success"], true);
        assert_eq!(response["data"]["accounts"][0]["id"], "0-mainnet");
        assert_eq!(response["data"]["network"], "mainnet");
    }
}
