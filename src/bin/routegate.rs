//! routegate: validate config feeds and inspect routing decisions.

use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};
use routegate::feed::ConfigFeed;
use routegate::source::{ConfigSource, RemoteSource};
use routegate::{
    geoip, ConfigSnapshot, ConnectionContext, ConnectionTarget, DecisionEngine, EngineConfig,
    Fallback, SnapshotManager,
};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "routegate")]
#[command(author = "Kaitu.io")]
#[command(version = "0.1.0")]
#[command(about = "Connection routing decisions for proxy data-planes", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a config feed against every configuration invariant
    Validate {
        /// Feed file (.json, .yaml or .yml)
        feed: PathBuf,
    },

    /// Print the decision for one connection as JSON
    Decide {
        /// Feed file (.json, .yaml or .yml)
        feed: PathBuf,

        /// Inbound listener id
        #[arg(long)]
        inbound: u64,

        /// Authenticated user id (omit for anonymous)
        #[arg(long)]
        user: Option<u64>,

        /// Target host
        #[arg(long)]
        host: String,

        /// Target port
        #[arg(long, default_value_t = 443)]
        port: u16,

        /// Destination country code
        #[arg(long)]
        dst_geo: Option<String>,

        /// Source country code
        #[arg(long)]
        src_geo: Option<String>,

        /// Destination IP, looked up in the GeoIP database when --dst-geo is not given
        #[arg(long)]
        dst_ip: Option<IpAddr>,

        /// MaxMind country database
        #[arg(long)]
        geoip_db: Option<PathBuf>,

        /// Local time of the connection, e.g. 2024-06-03T10:00:00 (default: now)
        #[arg(long)]
        at: Option<NaiveDateTime>,

        /// Block instead of pass through when no route matches
        #[arg(long)]
        block_unmatched: bool,
    },

    /// Download a feed through the remote cache and load it
    Fetch {
        /// Feed URL
        #[arg(short, long)]
        url: String,

        /// Cache directory
        #[arg(short, long, default_value = "cache")]
        cache_dir: PathBuf,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Validate { feed } => validate(&feed),
        Commands::Decide {
            feed,
            inbound,
            user,
            host,
            port,
            dst_geo,
            src_geo,
            dst_ip,
            geoip_db,
            at,
            block_unmatched,
        } => {
            let fallback = if block_unmatched {
                Fallback::Block
            } else {
                Fallback::Direct
            };
            let geo = match (dst_geo, dst_ip) {
                (Some(code), _) => Some(code),
                (None, Some(ip)) => lookup(geoip_db, ip),
                (None, None) => None,
            };
            let target = ConnectionTarget::new(&host, port)
                .with_dst_geo(geo.as_deref())
                .with_src_geo(src_geo.as_deref());
            let mut ctx = ConnectionContext::new(inbound, user, target);
            if let Some(at) = at {
                ctx = ctx.at(at);
            }
            decide(&feed, &ctx, EngineConfig { fallback })
        }
        Commands::Fetch { url, cache_dir } => fetch(&url, cache_dir),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn validate(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let feed = ConfigFeed::load(path)?;

    if let Err(errors) = ConfigSnapshot::validate(&feed) {
        for violation in errors.violations() {
            println!("  {}", violation);
        }
        return Err(format!("{} violation(s) in {:?}", errors.len(), path).into());
    }

    println!(
        "OK: {} inbounds, {} routes, {} rate limits (hash {})",
        feed.inbounds.len(),
        feed.routes.len(),
        feed.rate_limits.len(),
        feed.content_hash()
    );
    Ok(())
}

fn lookup(db: Option<PathBuf>, ip: IpAddr) -> Option<String> {
    if let Some(db) = db {
        if let Err(e) = geoip::init_default_database(&db) {
            log::warn!("GeoIP unavailable: {}", e);
        }
    }
    let code = geoip::lookup_country(ip);
    if code.is_none() {
        log::warn!("No country for {}, GEO rules will not match", ip);
    }
    code
}

fn decide(
    path: &Path,
    ctx: &ConnectionContext,
    config: EngineConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let feed = ConfigFeed::load(path)?;
    let manager = Arc::new(SnapshotManager::with_feed(&feed)?);
    let engine = DecisionEngine::with_config(manager, config);

    let decision = engine.decide(ctx);
    println!("{}", serde_json::to_string_pretty(&decision)?);
    Ok(())
}

fn fetch(url: &str, cache_dir: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let mut source = RemoteSource::new(url, &cache_dir);
    let manager = SnapshotManager::new();

    match manager.reload_from(&mut source)? {
        Some(epoch) => {
            let snapshot = manager.current();
            println!("Loaded {} as epoch {} (hash {})", source.describe(), epoch, snapshot.hash());
        }
        None => println!("{} not modified", source.describe()),
    }
    if let Some(etag) = source.etag() {
        println!("ETag: {}", etag);
    }
    Ok(())
}
