//! Pharos PoP state module for Caryatid
//! Mirrors the VBK and BTC block trees next to the own chain and
//! manages the PoP payload mempool and query surface

pub mod alt_chain;
pub mod chain_view;
pub mod mirror_tree;
pub mod payload_index;
pub mod payload_locator;
pub mod pop_mempool;
pub mod state;
pub mod stores;
pub mod tip_status;

use std::sync::Arc;

use anyhow::{Context as AnyhowContext, Result, bail};
use caryatid_sdk::{module, Context, Module};
use config::Config;
use pharos_common::messages::{Message, StateQuery, StateQueryResponse};
use pharos_common::queries::errors::QueryError;
use pharos_common::queries::pop::{PopStateQueryResponse, DEFAULT_POP_QUERY_TOPIC};
use pharos_common::{BtcBlockHash, NetworkMode, VbkBlockHash};
use tokio::sync::Mutex;
use tracing::{error, info, info_span, Instrument};

use crate::alt_chain::KEYSTONE_INTERVAL;
use crate::state::State;
use crate::stores::{fjall::FjallStore, Store};

const DEFAULT_BLOCKS_TOPIC: (&str, &str) = ("subscribe-blocks-topic", "pop.block.available");
const DEFAULT_ROLLBACK_TOPIC: (&str, &str) = ("subscribe-rollback-topic", "pop.chain.rollback");
const CONFIG_NETWORK_NAME: (&str, &str) = ("network-name", "main");
const DEFAULT_STORE: &str = "fjall";

/// PoP state module
#[module(
    message_type(Message),
    name = "pop-state",
    description = "Mirrored PoP chain state, mempool and queries"
)]
pub struct PopState;

impl PopState {
    fn conf(config: &Arc<Config>, keydef: (&str, &str)) -> String {
        let actual = config.get_string(keydef.0).unwrap_or(keydef.1.to_string());
        info!("Parameter value '{}' for {}", actual, keydef.0);
        actual
    }

    /// Bootstrap the mirrored trees from configured checkpoints
    fn bootstrap_trees(state: &mut State, config: &Arc<Config>) -> Result<()> {
        if let (Ok(hash), Ok(height)) = (
            config.get_string("vbk-bootstrap-hash"),
            config.get_int("vbk-bootstrap-height"),
        ) {
            let hash: VbkBlockHash =
                hash.parse().context("invalid vbk-bootstrap-hash")?;
            state.bootstrap_vbk(hash, height as u64);
            info!("VBK tree bootstrapped at height {height}");
        }
        if let (Ok(hash), Ok(height)) = (
            config.get_string("btc-bootstrap-hash"),
            config.get_int("btc-bootstrap-height"),
        ) {
            let hash: BtcBlockHash =
                hash.parse().context("invalid btc-bootstrap-hash")?;
            state.bootstrap_btc(hash, height as u64);
            info!("BTC tree bootstrapped at height {height}");
        }
        Ok(())
    }

    /// Main init function
    pub async fn init(&self, context: Arc<Context<Message>>, config: Arc<Config>) -> Result<()> {
        let blocks_topic = Self::conf(&config, DEFAULT_BLOCKS_TOPIC);
        let rollback_topic = Self::conf(&config, DEFAULT_ROLLBACK_TOPIC);
        let query_topic = Self::conf(&config, DEFAULT_POP_QUERY_TOPIC);

        let network: NetworkMode = Self::conf(&config, CONFIG_NETWORK_NAME).parse()?;
        let keystone_interval =
            config.get_int("keystone-interval").unwrap_or(KEYSTONE_INTERVAL as i64) as u64;
        let retain_blocks = config.get_int("retain-blocks").ok().map(|blocks| blocks as u64);

        let store_type = config.get_string("store").unwrap_or(DEFAULT_STORE.to_string());
        let store: Arc<dyn Store> = match store_type.as_str() {
            "fjall" => Arc::new(FjallStore::new(config.clone())?),
            _ => bail!("Unknown store type {store_type}"),
        };

        let mut state = State::new(network, store, keystone_interval, retain_blocks);
        Self::bootstrap_trees(&mut state, &config)?;
        let state = Arc::new(Mutex::new(state));

        // Serve the query surface; one lock scope per query or
        // submission batch
        let query_state = state.clone();
        context.handle(&query_topic, move |request| {
            let query_state = query_state.clone();
            async move {
                let Message::StateQuery(StateQuery::Pop(query)) = request.as_ref() else {
                    return Arc::new(Message::StateQueryResponse(StateQueryResponse::Pop(
                        PopStateQueryResponse::Error(QueryError::invalid_request(
                            "Invalid message for pop-state",
                        )),
                    )));
                };
                let response = query_state.lock().await.handle_query(query);
                Arc::new(Message::StateQueryResponse(StateQueryResponse::Pop(response)))
            }
        });

        // Follow the own chain
        let mut blocks_subscription = context.subscribe(&blocks_topic).await?;
        let mut rollback_subscription = context.subscribe(&rollback_topic).await?;
        context.run(async move {
            loop {
                tokio::select! {
                    result = blocks_subscription.read() => {
                        let Ok((_, message)) = result else {
                            error!("Block message read failed");
                            return;
                        };
                        if let Message::BlockAvailable(block_msg) = message.as_ref() {
                            let span = info_span!("pop_state.handle_block", block = block_msg.info.height);
                            async {
                                let mut state = state.lock().await;
                                if let Err(error) = state.handle_block(&block_msg.info, &block_msg.raw) {
                                    error!("Could not ingest block {}: {error}", block_msg.info.hash);
                                }
                            }.instrument(span).await;
                        }
                    }
                    result = rollback_subscription.read() => {
                        let Ok((_, message)) = result else {
                            error!("Rollback message read failed");
                            return;
                        };
                        if let Message::ChainRollback(rollback) = message.as_ref() {
                            info!("Rolling back own chain to height {}", rollback.to_height);
                            state.lock().await.handle_rollback(rollback.to_height);
                        }
                    }
                }
            }
        });

        Ok(())
    }
}
