use crate::accounts::{AccountError, AccountReader, TokenBalance};
use crate::data::{MarketSummary, TokenData};
use crate::scraper::Scraper;
use crate::service::{TokenPriceService, TokenServiceError};
use axum::extract::ws::Message;
use axum::extract::{ConnectInfo, Path, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use log::{debug, error, info};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast::{Receiver, Sender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub struct AppState<S: Scraper> {
    pub service: Arc<TokenPriceService<S>>,
    pub accounts: Arc<dyn AccountReader>,
}

impl<S: Scraper> Clone for AppState<S> {
    fn clone(&self) -> Self {
        AppState {
            service: self.service.clone(),
            accounts: self.accounts.clone(),
        }
    }
}

pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<TokenServiceError> for ApiError {
    fn from(e: TokenServiceError) -> Self {
        match e {
            TokenServiceError::UnknownSymbol(_) => ApiError {
                status: StatusCode::NOT_FOUND,
                message: e.to_string(),
            },
        }
    }
}

impl From<AccountError> for ApiError {
    fn from(e: AccountError) -> Self {
        let status = match e {
            AccountError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => {
                error!("Account lookup failed: {e}");
                StatusCode::BAD_GATEWAY
            }
        };
        ApiError {
            status,
            message: e.to_string(),
        }
    }
}

pub fn run_web_server<S: Scraper + 'static>(
    cancellation_token: CancellationToken,
    price_sender: Sender<TokenData>,
    state: AppState<S>,
    host: String,
    port: u32,
) -> JoinHandle<()> {
    let app = router(state, cancellation_token.clone(), price_sender);

    let _cancellation_token = cancellation_token.clone();
    let url = format!("{host}:{port}");

    tokio::spawn(async move {
        serve(_cancellation_token, app, url).await;
    })
}

/// Full HTTP surface; every route, the socket included, sits under the trace and CORS layers.
pub fn router<S: Scraper + 'static>(
    state: AppState<S>,
    cancellation_token: CancellationToken,
    price_sender: Sender<TokenData>,
) -> Router {
    configure_ws(api_router(state), cancellation_token, price_sender)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

fn api_router<S: Scraper + 'static>(state: AppState<S>) -> Router {
    Router::new()
        .route("/api/v1/tokens", get(get_tokens_handler::<S>))
        .route("/api/v1/tokens/:symbol", get(get_token_handler::<S>))
        .route("/api/v1/market-summary", get(get_market_summary_handler::<S>))
        .route(
            "/api/v1/accounts/:address/balance",
            get(get_balance_handler::<S>),
        )
        .with_state(state)
}

async fn get_tokens_handler<S: Scraper>(
    State(state): State<AppState<S>>,
) -> Json<Vec<TokenData>> {
    Json(state.service.get_all_data().await)
}

async fn get_token_handler<S: Scraper>(
    State(state): State<AppState<S>>,
    Path(symbol): Path<String>,
) -> Result<Json<TokenData>, ApiError> {
    let data = state.service.get_data(&symbol).await?;
    Ok(Json(data))
}

async fn get_market_summary_handler<S: Scraper>(
    State(state): State<AppState<S>>,
) -> Json<MarketSummary> {
    Json(state.service.get_market_summary().await)
}

async fn get_balance_handler<S: Scraper>(
    State(state): State<AppState<S>>,
    Path(address): Path<String>,
) -> Result<Json<TokenBalance>, ApiError> {
    let balance = state.accounts.token_balance(&address).await?;
    Ok(Json(balance))
}

fn configure_ws(
    router: Router,
    cancellation_token: CancellationToken,
    price_sender: Sender<TokenData>,
) -> Router {
    router.route(
        "/ws/prices",
        get(
            |ws: WebSocketUpgrade,
             connect_info: ConnectInfo<SocketAddr>| async move {
                debug!("Connected {connect_info:?}");

                ws.on_upgrade(async move |mut socket| {
                    let mut price_receiver: Receiver<TokenData> = price_sender.subscribe();
                    loop {
                        tokio::select! {
                              data = price_receiver.recv() => {
                                  match data {
                                      Ok(token_data) => {
                                          let msg = match serde_json::to_string(&token_data) {
                                              Ok(msg) => msg,
                                              Err(e) => {
                                                  error!("Error serializing token data: {e}");
                                                  continue;
                                              }
                                          };
                                          if let Err(e) = socket.send(Message::Text(msg)).await {
                                              error!("Error sending message: {e}");
                                              break;
                                          }
                                      }
                                      Err(e) => {
                                          error!("Price receiver stopped: {e}");
                                          break;
                                      }
                                  }
                              },
                              _ = cancellation_token.cancelled() => {
                                    debug!("Cancellation requested, closing WebSocket connection...");
                                    if let Err(e) = socket.close().await {
                                        error!("Error closing WebSocket: {e}");
                                    }
                                    break;
                                }
                        }
                    }
                })
            },
        ),
    )
}

async fn serve(cancellation_token: CancellationToken, app: Router, addr: String) {
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Could not bind {addr}: {e}");
            return;
        }
    };
    info!("listening on {addr}");

    tokio::select! {
        _ = cancellation_token.cancelled() => {
            info!("Cancellation requested, exiting...");
        }
        _ = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()) => {
            info!("Server stopped");
        }
    }
}
