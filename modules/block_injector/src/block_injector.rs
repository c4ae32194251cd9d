//! Pharos block injector module for Caryatid
//! Posts own-chain blocks from disk into the Pharos system.
//!
//! Development feed: in production the node's validation pipeline
//! announces blocks; this module replays hex-encoded block files in
//! file order instead.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use caryatid_sdk::{module, Context};
use config::Config;
use glob::glob;
use pharos_common::entities::Block;
use pharos_common::messages::{BlockAvailableMessage, Message};
use pharos_common::pow::header_hash;
use pharos_common::{BlockInfo, NetworkMode};
use tracing::{error, info};

const CONFIG_BLOCK_PUBLISH_TOPIC: (&str, &str) = ("block-publish-topic", "pop.block.available");
const CONFIG_BLOCKS_GLOB: (&str, &str) = ("blocks-glob", "blocks/*.hex");
const CONFIG_NETWORK_NAME: (&str, &str) = ("network-name", "main");
const CONFIG_START_HEIGHT: (&str, i64) = ("start-height", 0);

/// Block injector module
#[module(
    message_type(Message),
    name = "block-injector",
    description = "File-based own-chain block feed"
)]
pub struct BlockInjector;

impl BlockInjector {
    /// Decode and publish one block file
    async fn process_block(
        context: &Arc<Context<Message>>,
        raw_hex: &str,
        height: u64,
        network: NetworkMode,
        block_publish_topic: &str,
    ) -> Result<()> {
        let raw = hex::decode(raw_hex.trim()).map_err(|error| anyhow!("bad block hex: {error}"))?;
        let block = Block::from_bytes(&raw)?;
        let hash = header_hash(&block.header, network);

        let block_info = BlockInfo { height, hash };

        info!("  -> block {height}, hash {hash}");

        let message = BlockAvailableMessage {
            info: block_info,
            raw,
        };

        context
            .message_bus
            .publish(block_publish_topic, Arc::new(Message::BlockAvailable(message)))
            .await
            .unwrap_or_else(|error| error!("Failed to publish block message: {error}"));

        Ok(())
    }

    /// Main init function
    pub async fn init(&self, context: Arc<Context<Message>>, config: Arc<Config>) -> Result<()> {
        let block_publish_topic = config
            .get_string(CONFIG_BLOCK_PUBLISH_TOPIC.0)
            .unwrap_or(CONFIG_BLOCK_PUBLISH_TOPIC.1.to_string());
        let blocks_glob =
            config.get_string(CONFIG_BLOCKS_GLOB.0).unwrap_or(CONFIG_BLOCKS_GLOB.1.to_string());
        let network: NetworkMode = config
            .get_string(CONFIG_NETWORK_NAME.0)
            .unwrap_or(CONFIG_NETWORK_NAME.1.to_string())
            .parse()?;
        let start_height =
            config.get_int(CONFIG_START_HEIGHT.0).unwrap_or(CONFIG_START_HEIGHT.1) as u64;

        info!("Publishing blocks matching '{blocks_glob}' on '{block_publish_topic}'");

        context.clone().run(async move {
            let mut paths: Vec<PathBuf> = match glob(&blocks_glob) {
                Ok(entries) => entries.filter_map(|entry| entry.ok()).collect(),
                Err(error) => {
                    error!("Bad blocks glob: {error}");
                    return;
                }
            };
            paths.sort();

            let mut height = start_height;
            for path in paths {
                let raw_hex = match fs::read_to_string(&path) {
                    Ok(contents) => contents,
                    Err(error) => {
                        error!("Cannot read {}: {error}", path.display());
                        continue;
                    }
                };
                match Self::process_block(&context, &raw_hex, height, network, &block_publish_topic)
                    .await
                {
                    Ok(()) => height += 1,
                    Err(error) => error!("Skipping {}: {error}", path.display()),
                }
            }
        });

        Ok(())
    }
}
