use std::{
	fs,
	path::{Path, PathBuf},
	sync::Arc,
};

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre;
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use roost_config::Config;
use roost_domain::{
	distance::ReferenceCatalog,
	listing::{Listing, RenterRequest},
};
use roost_service::{RoostService, Stores};
use roost_storage::{db::Db, memory::MemoryStore, pg::PgStore, store::ListingStore};

#[derive(Debug, Parser)]
#[command(
	version = roost_cli::VERSION,
	rename_all = "kebab",
	styles = roost_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
	#[arg(long, value_enum, default_value_t = Backend::Postgres)]
	pub backend: Backend,
	/// JSON bundle of listings and requests imported before the command runs.
	#[arg(long, value_name = "FILE")]
	pub seed: Option<PathBuf>,
	#[command(subcommand)]
	pub command: Command,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Backend {
	Postgres,
	/// Process-local store; state is lost on exit.
	Memory,
}

#[derive(Debug, Subcommand)]
pub enum Command {
	/// Upsert listings and renter requests from a JSON bundle.
	Import {
		#[arg(value_name = "FILE")]
		file: PathBuf,
	},
	/// Build feature observations for every listing, or for one.
	Observe {
		#[arg(long, value_name = "ID")]
		listing: Option<i64>,
	},
	/// Rescore the latest observations.
	Refresh {
		#[arg(long, value_name = "VERSION", conflicts_with = "listing")]
		observation_version: Option<String>,
		#[arg(long, value_name = "ID", num_args = 1..)]
		listing: Vec<i64>,
	},
	/// Embed listing text for semantic matching.
	EmbedListings {
		#[arg(long, value_name = "ID", num_args = 1..)]
		listing: Vec<i64>,
	},
	/// Rank candidates for a stored request, or an explicit candidate list.
	Recommend {
		#[arg(long, value_name = "UUID")]
		request: Uuid,
		#[arg(long, value_name = "ID", num_args = 1..)]
		candidate: Vec<i64>,
	},
	/// Semantic nearest listings within the request's candidate pool.
	Match {
		#[arg(long, value_name = "UUID")]
		request: Uuid,
	},
}

#[derive(Debug, Default, Deserialize)]
pub struct ImportBundle {
	#[serde(default)]
	pub listings: Vec<Listing>,
	#[serde(default)]
	pub requests: Vec<RenterRequest>,
}

#[derive(Debug, Serialize)]
struct ImportReport {
	listings: usize,
	requests: usize,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = roost_config::load(&args.config)?;

	init_tracing(&config)?;

	let catalog = ReferenceCatalog::from_json_path(&config.catalog.path)?;

	if catalog.is_empty() {
		tracing::warn!(
			path = %config.catalog.path.display(),
			"Reference catalog is empty; distance features will be missing."
		);
	}

	let stores = open_stores(&config, args.backend).await?;
	let service = RoostService::new(config, stores, catalog);

	if let Some(seed) = args.seed.as_deref() {
		let report = import(&service, seed).await?;

		tracing::info!(listings = report.listings, requests = report.requests, "Seed imported.");
	}

	match args.command {
		Command::Import { file } => print_json(&import(&service, &file).await?),
		Command::Observe { listing: Some(listing_id) } =>
			print_json(&service.observe_listing(listing_id).await?),
		Command::Observe { listing: None } => print_json(&service.observe_all().await?),
		Command::Refresh { observation_version, listing } if listing.is_empty() =>
			print_json(&service.refresh(observation_version.as_deref()).await?),
		Command::Refresh { listing, .. } => print_json(&service.refresh_listings(&listing).await?),
		Command::EmbedListings { listing } => {
			let ids = (!listing.is_empty()).then_some(listing.as_slice());

			print_json(&service.embed_listings(ids).await?)
		},
		Command::Recommend { request, candidate } if !candidate.is_empty() =>
			print_json(&service.recommend(request, &candidate).await?),
		Command::Recommend { request, .. } => {
			let result = service
				.recommend_for_request(request)
				.await?
				.ok_or_else(|| eyre::eyre!("Renter request {request} was not found."))?;

			print_json(&result)
		},
		Command::Match { request } => {
			let result = service
				.match_request(request)
				.await?
				.ok_or_else(|| eyre::eyre!("Renter request {request} was not found."))?;

			print_json(&result)
		},
	}
}

pub fn load_bundle(path: &Path) -> color_eyre::Result<ImportBundle> {
	let raw = fs::read_to_string(path)?;
	let bundle: ImportBundle = serde_json::from_str(&raw)?;

	Ok(bundle)
}

async fn import(service: &RoostService, path: &Path) -> color_eyre::Result<ImportReport> {
	let bundle = load_bundle(path)?;
	let listings = &service.stores.listings;

	for listing in &bundle.listings {
		listings.upsert_listing(listing).await?;
	}
	for request in &bundle.requests {
		listings.put_renter_request(request).await?;
	}

	Ok(ImportReport { listings: bundle.listings.len(), requests: bundle.requests.len() })
}

async fn open_stores(config: &Config, backend: Backend) -> color_eyre::Result<Stores> {
	match backend {
		Backend::Postgres => {
			let db = Db::connect(&config.storage.postgres).await?;

			db.ensure_schema(config.storage.vector_dim).await?;

			Ok(Stores::shared(Arc::new(PgStore::new(db))))
		},
		Backend::Memory => Ok(Stores::shared(Arc::new(MemoryStore::new()))),
	}
}

fn init_tracing(config: &Config) -> color_eyre::Result<()> {
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

	Ok(())
}

fn print_json<T>(value: &T) -> color_eyre::Result<()>
where
	T: Serialize,
{
	let json = serde_json::to_string_pretty(value)?;

	println!("{json}");

	Ok(())
}
