use crate::accounts::AccountReader;
use crate::config::Config;
use crate::data::{PriceStatus, TokenData};
use crate::scraper::Scraper;
use crate::service::TokenPriceService;
use crate::web::{AppState, run_web_server};
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::broadcast::Sender;
use tokio_util::sync::CancellationToken;

pub struct App<S: Scraper> {
    config: Config,
    service: Arc<TokenPriceService<S>>,
    accounts: Arc<dyn AccountReader>,
}

impl<S: Scraper + 'static> App<S> {
    pub fn new(
        config: Config,
        service: Arc<TokenPriceService<S>>,
        accounts: Arc<dyn AccountReader>,
    ) -> Self {
        Self {
            config,
            service,
            accounts,
        }
    }

    pub async fn run(&mut self, cancellation_token: CancellationToken) -> anyhow::Result<()> {
        let (price_sender, _price_receiver) = tokio::sync::broadcast::channel::<TokenData>(100);

        let server_fut = run_web_server(
            cancellation_token.clone(),
            price_sender.clone(),
            AppState {
                service: self.service.clone(),
                accounts: self.accounts.clone(),
            },
            self.config.host.clone(),
            self.config.port,
        );

        self.refresh_loop(cancellation_token, price_sender).await;

        server_fut.await?;

        Ok(())
    }

    async fn refresh_loop(
        &self,
        cancellation_token: CancellationToken,
        price_sender: Sender<TokenData>,
    ) {
        let refresh_duration =
            std::time::Duration::from_secs(self.config.refresh_interval_sec as u64);
        let mut refresh_interval = tokio::time::interval(refresh_duration);

        loop {
            tokio::select! {
                _ = cancellation_token.cancelled() => {
                    info!("Cancellation requested, exiting...");
                    break;
                }
                _ = refresh_interval.tick() => {
                    for token_data in self.service.get_all_data().await {
                        if token_data.status == PriceStatus::Fallback {
                            warn!("Serving fallback price for {}", token_data.metadata.symbol);
                        }
                        // No subscribers is the normal state between dashboard sessions.
                        if price_sender.send(token_data).is_err() {
                            debug!("No price subscribers");
                        }
                    }
                },
            }
        }
    }
}
