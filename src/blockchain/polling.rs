use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::blockchain::client::{ChainClient, ClientError, RetryPolicy};
use crate::blockchain::models::BlockData;
use crate::blockchain::processor::{BlockIndexer, BlockSummary, ProcessError};
use crate::blockchain::throttle::Throttle;

/// Marker for "no block processed yet".
const UNSET: u64 = u64::MAX;

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub poll_interval: Duration,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub delay_multiplier: u32,
    /// Blocks processed per tick at most.
    pub batch_size: u64,
    /// First block to index; `None` follows the head from start-up.
    pub start_block: Option<u64>,
    pub retry: RetryPolicy,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(12),
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(2000),
            delay_multiplier: 2,
            batch_size: 10,
            start_block: None,
            retry: RetryPolicy::default(),
        }
    }
}

/// Pull-based poller for one chain. Each instance owns its throttle, so
/// backoff on one chain never slows another.
pub struct ChainPoller<C: ChainClient> {
    client: Arc<C>,
    indexer: BlockIndexer,
    config: PollerConfig,
    running: AtomicBool,
    last_processed: AtomicU64,
    /// Next height to fetch. Runs ahead of `last_processed` past blocks
    /// that failed to index.
    next_block: AtomicU64,
    throttle: tokio::sync::Mutex<Throttle>,
    task: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl<C: ChainClient> ChainPoller<C> {
    pub fn new(client: Arc<C>, indexer: BlockIndexer, config: PollerConfig) -> Self {
        let throttle = Throttle::new(config.base_delay, config.max_delay, config.delay_multiplier);
        Self {
            client,
            indexer,
            config,
            running: AtomicBool::new(false),
            last_processed: AtomicU64::new(UNSET),
            next_block: AtomicU64::new(0),
            throttle: tokio::sync::Mutex::new(throttle),
            task: Mutex::new(None),
        }
    }

    pub fn blockchain(&self) -> &str {
        self.client.blockchain()
    }

    pub fn is_active(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn last_processed_block(&self) -> Option<u64> {
        match self.last_processed.load(Ordering::SeqCst) {
            UNSET => None,
            block => Some(block),
        }
    }

    pub async fn request_delay(&self) -> Duration {
        self.throttle.lock().await.current_delay()
    }

    /// Record the baseline block and spawn the polling loop. Calling this on
    /// a running poller only logs.
    pub async fn start(self: &Arc<Self>) -> Result<(), ClientError> {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("{} poller is already running", self.blockchain());
            return Ok(());
        }

        if let Err(e) = self.init_cursor().await {
            error!("Failed to start {} poller: {}", self.blockchain(), e);
            self.running.store(false, Ordering::SeqCst);
            return Err(e);
        }

        let token = CancellationToken::new();
        let poller = Arc::clone(self);
        let handle = tokio::spawn(poller.run(token.clone()));

        if let Ok(mut task) = self.task.lock() {
            *task = Some((token, handle));
        }
        Ok(())
    }

    /// Position the cursor just before the configured start block, or at
    /// the current head. Returns the baseline block.
    pub async fn init_cursor(&self) -> Result<u64, ClientError> {
        let baseline = match self.config.start_block {
            Some(start) => start.saturating_sub(1),
            None => self.latest_block_number().await?,
        };
        self.last_processed.store(baseline, Ordering::SeqCst);
        self.next_block.store(baseline + 1, Ordering::SeqCst);
        info!("{} poller positioned after block {}", self.blockchain(), baseline);
        Ok(baseline)
    }

    /// Cancel the loop and wait for it to finish; idle pollers are untouched.
    pub async fn stop(&self) {
        let task = self.task.lock().ok().and_then(|mut task| task.take());
        if let Some((token, handle)) = task {
            info!("Stopping {} poller", self.blockchain());
            token.cancel();
            if let Err(e) = handle.await {
                error!("{} poller task ended abnormally: {}", self.blockchain(), e);
            }
        }
        self.throttle.lock().await.reset();
        self.running.store(false, Ordering::SeqCst);
    }

    async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        result = self.poll_once() => match result {
                            Ok(0) => debug!("No new {} blocks", self.blockchain()),
                            Ok(count) => info!(
                                "Processed {} {} blocks, now at {:?}",
                                count,
                                self.blockchain(),
                                self.last_processed_block()
                            ),
                            Err(e) => error!("Error polling {}: {}", self.blockchain(), e),
                        }
                    }
                }
            }
        }

        info!("Shutting down {} poller", self.blockchain());
    }

    /// Try up to `batch_size` blocks up to the current head. Returns how
    /// many were indexed.
    pub async fn poll_once(&self) -> Result<u64, ClientError> {
        let head = match self.latest_block_number().await {
            Ok(head) => head,
            Err(e) => {
                if e.is_rate_limited() {
                    self.back_off().await;
                }
                return Err(e);
            }
        };

        let mut processed = 0;
        let mut attempted = 0;

        while attempted < self.config.batch_size {
            let next = self.next_block.load(Ordering::SeqCst);
            if next > head {
                break;
            }
            attempted += 1;

            match self.process_block(next).await {
                Ok(Some(summary)) => {
                    self.last_processed.store(summary.number, Ordering::SeqCst);
                    self.next_block.store(next + 1, Ordering::SeqCst);
                    processed += 1;
                }
                Ok(None) => {
                    warn!("{} block {} not found, retrying next tick", self.blockchain(), next);
                    break;
                }
                Err(e) if e.is_rate_limited() => {
                    warn!("{} provider throttled block {}: {}", self.blockchain(), next, e);
                    self.back_off().await;
                    break;
                }
                Err(e) => {
                    error!("Error processing {} block {}: {}", self.blockchain(), next, e);
                    self.next_block.store(next + 1, Ordering::SeqCst);
                }
            }
        }

        Ok(processed)
    }

    async fn process_block(&self, number: u64) -> Result<Option<BlockSummary>, ProcessError> {
        self.wait_turn().await;
        let client = &self.client;
        let block = self
            .config
            .retry
            .run(move || client.get_block(number, true))
            .await?;

        let Some(block) = block else {
            return Ok(None);
        };

        let extracted = block.extract(self.blockchain());
        let summary = self.indexer.index_block(&extracted).await?;
        Ok(Some(summary))
    }

    async fn latest_block_number(&self) -> Result<u64, ClientError> {
        self.wait_turn().await;
        let client = &self.client;
        self.config
            .retry
            .run(move || client.get_latest_block_number())
            .await
    }

    async fn wait_turn(&self) {
        let wait = self.throttle.lock().await.reserve(Instant::now());
        if !wait.is_zero() {
            sleep(wait).await;
        }
    }

    async fn back_off(&self) {
        let pause = self.throttle.lock().await.back_off();
        info!(
            "Increased {} request delay to {:?} due to rate limiting",
            self.blockchain(),
            pause
        );
        sleep(pause).await;
    }
}
