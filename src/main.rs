use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use reach_markets::config::{Config, EnvConfig};
use reach_markets::data::source::FallbackRng;
use reach_markets::data::twitter::TwitterClient;
use reach_markets::data::types::{parse_number, InputError};
use reach_markets::market::paper::{BetSide, PaperBook};
use reach_markets::market::view::{BoardQuery, CreatorBoard, SortBy};
use reach_markets::monitoring::logger::CsvLogger;
use reach_markets::store::memory::MemoryStore;
use reach_markets::store::sqlite::SqliteStore;
use reach_markets::store::{seed_registry, MetricStore, SubjectRegistry};
use reach_markets::sync::{Aggregator, SignalSources, SyncEngine};

#[derive(Parser)]
#[command(name = "reach-markets")]
#[command(about = "Creator reach scores and over/under markets", long_about = None)]
struct Cli {
    #[command(subcommand)]
    mode: Option<Mode>,
}

#[derive(Subcommand)]
enum Mode {
    /// Sync on the configured interval until ctrl-c (default)
    Run,

    /// Run one sync cycle and print the report
    Sync,

    /// Print the market board
    Board {
        /// score, volume or trending
        #[arg(long, default_value = "volume")]
        sort: SortBy,

        /// Only show this category ("All" for every one)
        #[arg(long)]
        category: Option<String>,

        /// Case-insensitive match on name or handle
        #[arg(long)]
        search: Option<String>,
    },

    /// Price a score against a threshold
    Odds {
        #[arg(value_parser = finite_score)]
        score: f64,
        #[arg(value_parser = finite_threshold)]
        threshold: f64,
    },

    /// List trending handles
    Discover,

    /// Place a paper bet on a creator's market
    Bet {
        creator_id: String,
        /// over or under
        side: BetSide,
        #[arg(value_parser = finite_stake)]
        stake: f64,
    },
}

fn finite_score(raw: &str) -> Result<f64, InputError> {
    parse_number("score", raw)
}

fn finite_threshold(raw: &str) -> Result<f64, InputError> {
    parse_number("threshold", raw)
}

fn finite_stake(raw: &str) -> Result<f64, InputError> {
    parse_number("stake", raw)
}

struct App {
    config: Config,
    env: EnvConfig,
    registry: Arc<dyn SubjectRegistry>,
    store: Arc<dyn MetricStore>,
    rng: Arc<FallbackRng>,
    client: reqwest::Client,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let env = EnvConfig::load();
    let config = Config::load(&env.config_path)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.system.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.mode.unwrap_or(Mode::Run) {
        // Pure calculation, no store or network needed
        Mode::Odds { score, threshold } => print_odds(&config, score, threshold),
        mode => App::open(config, env)?.dispatch(mode).await,
    }
}

impl App {
    async fn dispatch(&self, mode: Mode) -> Result<()> {
        match mode {
            Mode::Run => self.run().await,
            Mode::Sync => self.sync_once().await,
            Mode::Board {
                sort,
                category,
                search,
            } => self.print_board(&BoardQuery {
                search,
                category,
                sort,
            }),
            Mode::Odds { score, threshold } => print_odds(&self.config, score, threshold),
            Mode::Discover => self.discover().await,
            Mode::Bet {
                creator_id,
                side,
                stake,
            } => self.bet(&creator_id, side, stake),
        }
    }

    fn open(config: Config, env: EnvConfig) -> Result<Self> {
        let (registry, store): (Arc<dyn SubjectRegistry>, Arc<dyn MetricStore>) =
            match &config.system.database_path {
                Some(path) => {
                    tracing::info!("Opening database: {}", path);
                    let db = Arc::new(SqliteStore::new(path)?);
                    let registry: Arc<dyn SubjectRegistry> = db.clone();
                    let store: Arc<dyn MetricStore> = db;
                    (registry, store)
                }
                None => {
                    tracing::warn!("No database_path configured, history will not persist");
                    let mem = Arc::new(MemoryStore::new());
                    let registry: Arc<dyn SubjectRegistry> = mem.clone();
                    let store: Arc<dyn MetricStore> = mem;
                    (registry, store)
                }
            };

        let seeded = seed_registry(registry.as_ref(), &config.subjects)?;
        if seeded > 0 {
            tracing::info!("Registered {} new creators", seeded);
        }

        let rng = Arc::new(match config.sync.rng_seed {
            Some(seed) => FallbackRng::seeded(seed),
            None => FallbackRng::from_time(),
        });

        let client = reqwest::Client::builder()
            .timeout(config.sync.request_timeout())
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            config,
            env,
            registry,
            store,
            rng,
            client,
        })
    }

    fn engine(&self) -> Result<SyncEngine> {
        let sources = SignalSources::from_env(self.client.clone(), &self.env);
        let aggregator = Aggregator::new(sources, self.config.score_model()?, self.rng.clone());
        let mut engine = SyncEngine::new(
            self.registry.clone(),
            self.store.clone(),
            aggregator,
            self.config.sync.subject_delay(),
        );

        if self.config.monitoring.csv_logging {
            engine = engine.with_csv_logger(CsvLogger::new(&self.config.monitoring.csv_log_path)?);
        }
        Ok(engine)
    }

    fn board(&self) -> Result<CreatorBoard> {
        Ok(CreatorBoard::new(
            self.registry.clone(),
            self.store.clone(),
            self.config.score_model()?,
            self.config.market_builder()?,
            self.rng.clone(),
        ))
    }

    async fn run(&self) -> Result<()> {
        let engine = self.engine()?;
        let every = self.config.sync.interval();

        tracing::info!("Reach markets starting, syncing every {:?}", every);
        log_missing_credentials(&self.env);

        tokio::select! {
            _ = engine.run_forever(every) => {}
            signal = tokio::signal::ctrl_c() => {
                signal?;
                tracing::info!("Shutting down...");
            }
        }
        Ok(())
    }

    async fn sync_once(&self) -> Result<()> {
        log_missing_credentials(&self.env);
        let report = self.engine()?.run_cycle().await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        Ok(())
    }

    fn print_board(&self, query: &BoardQuery) -> Result<()> {
        let board = self.board()?;
        let entries = board.entries(query, Utc::now())?;

        println!(
            "{:<6} {:<18} {:<14} {:>6} {:>6} {:>7} {:>6} {:>6} {:>10}  {}",
            "ID", "CREATOR", "CATEGORY", "SCORE", "CONF", "ODDS", "YES", "NO", "VOLUME", "TREND"
        );
        for entry in &entries {
            let c = &entry.creator;
            let m = &entry.market;
            println!(
                "{:<6} {:<18} {:<14} {:>6.1} {:>6} {:>7.3} {:>5.1}¢ {:>5.1}¢ {:>10.0}  {}{}",
                c.subject.id,
                c.subject.name,
                c.subject.category,
                c.current_score,
                c.confidence.map(|v| format!("{:.2}", v)).unwrap_or_else(|| "-".to_string()),
                m.current_odds,
                m.quote.price_yes,
                m.quote.price_no,
                m.total_staked,
                c.trend,
                if c.synthetic { " *" } else { "" }
            );
        }
        println!(
            "{} markets | categories: {}",
            entries.len(),
            board.categories()?.join(", ")
        );
        Ok(())
    }

    async fn discover(&self) -> Result<()> {
        let twitter = TwitterClient::new(self.client.clone(), self.env.twitter_bearer_token.clone());
        for handle in twitter.discover_trending().await {
            println!("{}", handle);
        }
        Ok(())
    }

    fn bet(&self, creator_id: &str, side: BetSide, stake: f64) -> Result<()> {
        let now = Utc::now();
        let Some(entry) = self.board()?.entry(creator_id, now)? else {
            bail!("Unknown creator: {}", creator_id);
        };

        let mut book = PaperBook::new(self.config.market.paper_balance);
        let slip = book.place_bet(&entry.market, side, stake, entry.creator.current_score, now)?;
        println!("{}", serde_json::to_string_pretty(&slip)?);
        println!("Remaining balance: ${:.2}", book.balance());
        Ok(())
    }
}

fn print_odds(config: &Config, score: f64, threshold: f64) -> Result<()> {
    let quote = config.market_builder()?.odds().quote(score, threshold);
    println!("odds:      {:.4}", quote.odds);
    println!("price_yes: {:.2}¢", quote.price_yes);
    println!("price_no:  {:.2}¢", quote.price_no);
    Ok(())
}

fn log_missing_credentials(env: &EnvConfig) {
    if env.twitter_bearer_token.is_none() {
        tracing::warn!("TWITTER_BEARER_TOKEN not set, mentions will be synthetic");
    }
    if env.youtube_api_key.is_none() {
        tracing::warn!("YOUTUBE_API_KEY not set, views will be synthetic");
    }
    if env.reddit.is_none() {
        tracing::warn!("REDDIT_CLIENT_ID/REDDIT_CLIENT_SECRET not set, discussions will be synthetic");
    }
}
