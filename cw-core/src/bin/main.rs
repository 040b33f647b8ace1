use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{event, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cw_core::configuration::WatcherConfiguration;
use cw_core::esi_client::{EsiClient, EsiClientTrait, DEFAULT_ESI_BASE_URL};
use cw_core::expansion::ExpansionEngine;
use cw_core::outbid::OutbidCheck;
use cw_core::reqwest_helpers::{create_client, RateLimitMeter};
use cw_core::resolvers::{LocationResolver, TypeResolver};
use cw_core::sync::ContractSync;
use cw_domain::{CharacterId, CompetitionFilters, RegionId};
use cw_store::{CacheBmcTrait, ContractBmcTrait, FileCacheBmc, FileContractBmc, FileStore};

#[derive(Clone, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Subcommand)]
enum Commands {
    /// synchronizes the local contract snapshot with the remote catalog
    Sync {
        #[arg(long, env("CW_REGION_ID"))]
        region_id: i64,
        #[arg(long, env("CW_DATA_DIR"), default_value = "data")]
        data_dir: PathBuf,
        #[arg(long, env("CW_ESI_BASE_URL"), default_value = DEFAULT_ESI_BASE_URL)]
        esi_base_url: String,
    },
    /// synchronizes, then reports which of the character's own listings are undercut
    Check {
        #[arg(long, env("CW_REGION_ID"))]
        region_id: i64,
        #[arg(long, env("CW_DATA_DIR"), default_value = "data")]
        data_dir: PathBuf,
        #[arg(long, env("CW_ESI_BASE_URL"), default_value = DEFAULT_ESI_BASE_URL)]
        esi_base_url: String,
        #[arg(long, env("CW_CHARACTER_ID"))]
        character_id: i64,
        /// how many undercut checks run concurrently
        #[arg(long, default_value_t = 8)]
        concurrency: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let args = Cli::parse();

    match args.command {
        Commands::Sync {
            region_id,
            data_dir,
            esi_base_url,
        } => {
            let cfg = WatcherConfiguration {
                esi_base_url,
                region_id: RegionId(region_id),
                data_dir,
                character_id: None,
            };
            let pipeline = Pipeline::new(cfg).await?;
            let snapshot = pipeline.sync().await?;
            event!(Level::INFO, "Snapshot holds {} contracts", snapshot.len());
            Ok(())
        }
        Commands::Check {
            region_id,
            data_dir,
            esi_base_url,
            character_id,
            concurrency,
        } => {
            let cfg = WatcherConfiguration {
                esi_base_url,
                region_id: RegionId(region_id),
                data_dir,
                character_id: Some(character_id),
            };
            let pipeline = Pipeline::new(cfg).await?;
            pipeline.sync().await?;
            pipeline.report_undercuts(CharacterId(character_id), concurrency).await
        }
    }
}

/// Owns the client and the stores for one run; loaded at start, caches
/// flushed by the components as they go.
struct Pipeline {
    cfg: WatcherConfiguration,
    client: Arc<dyn EsiClientTrait>,
    cache: Arc<dyn CacheBmcTrait>,
    contracts: Arc<dyn ContractBmcTrait>,
    meter: RateLimitMeter,
}

impl Pipeline {
    async fn new(cfg: WatcherConfiguration) -> Result<Self> {
        let meter = RateLimitMeter::new();
        let client = EsiClient::with_base_url(create_client(meter.clone()), cfg.esi_base_url.clone());

        let store = FileStore::new(&cfg.data_dir)?;
        let contracts: Arc<dyn ContractBmcTrait> = Arc::new(FileContractBmc::new(store.clone()));
        let cache: Arc<dyn CacheBmcTrait> = Arc::new(FileCacheBmc::load(store).await);

        Ok(Self {
            cfg,
            client: Arc::new(client),
            cache,
            contracts,
            meter,
        })
    }

    async fn sync(&self) -> Result<cw_domain::ContractSnapshot> {
        let engine = ExpansionEngine::new(Arc::clone(&self.client), Arc::clone(&self.cache), self.meter.clone());
        let sync = ContractSync::new(
            Arc::clone(&self.client),
            Arc::clone(&self.contracts),
            engine,
            self.cfg.region_id,
        );
        sync.sync().await
    }

    async fn report_undercuts(&self, character_id: CharacterId, concurrency: usize) -> Result<()> {
        let filtered = self.contracts.load_filtered().await;
        let snapshot = self.contracts.load_snapshot().await;

        let own: Vec<_> = snapshot
            .contracts
            .iter()
            .filter(|c| c.issuer_id == character_id)
            .cloned()
            .collect();

        if own.is_empty() {
            event!(Level::INFO, "Character {} has no outstanding listings in the snapshot", character_id.0);
            return Ok(());
        }

        let check = OutbidCheck::new(
            Arc::clone(&self.client),
            LocationResolver::new(Arc::clone(&self.client), Arc::clone(&self.cache)),
            TypeResolver::new(Arc::clone(&self.client), Arc::clone(&self.cache)),
        );

        let results = check
            .check_many(&own, &filtered.contracts, &CompetitionFilters::default(), concurrency)
            .await;

        for (contract_id, _outbid, cheapest) in results {
            match cheapest {
                Some(cheapest) => println!("contract {}: UNDERCUT, cheapest competitor at {:.2} per unit", contract_id.0, cheapest),
                None => println!("contract {}: ok", contract_id.0),
            }
        }

        self.cache.flush().await?;
        Ok(())
    }
}
