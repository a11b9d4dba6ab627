use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use jiff::Timestamp;
use tracing::info;

use commute_advisor::advisor::{Advisor, ComparisonRequest};
use commute_advisor::config::AdvisorConfig;
use commute_advisor::error::TrafficError;
use commute_advisor::haversine::StraightLineRouter;
use commute_advisor::osrm::OsrmClient;
use commute_advisor::predictor::ModelHandle;
use commute_advisor::store::JsonFileStore;
use commute_advisor::tracker::{CommuteTracker, TripOutcome};
use commute_advisor::traits::{RouteProvider, TrafficSource};
use commute_advisor::types::{
    Coordinate, NewCommute, RouteBasis, RouteOption, TrafficLevel, TrafficSnapshot,
};

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Predict candidate routes and decide whether to switch
    Compare {
        /// JSON comparison request with candidates and their traffic
        #[arg(short, long, conflicts_with = "commute")]
        request: Option<PathBuf>,

        /// Fetch routes for a stored commute instead
        #[arg(short, long)]
        commute: Option<String>,

        /// Route currently driven (defaults to the first route found)
        #[arg(long)]
        current: Option<String>,

        #[arg(short, long)]
        threshold: Option<f64>,
    },
    /// Day and hour patterns of a commute's history
    Patterns {
        #[arg(short, long)]
        commute: String,
    },
    /// Retrain the duration model from all recorded trips
    Train,
    #[command(subcommand)]
    Commutes(CommuteCommands),
    #[command(subcommand)]
    Trip(TripCommands),
}

#[derive(Subcommand)]
enum CommuteCommands {
    List,
    Add {
        #[arg(short, long)]
        name: String,

        /// "lat,lng"
        #[arg(long, value_parser = parse_coordinate)]
        origin: Coordinate,

        /// "lat,lng"
        #[arg(long, value_parser = parse_coordinate)]
        destination: Coordinate,
    },
    Delete {
        id: String,
    },
}

#[derive(Subcommand)]
enum TripCommands {
    Start {
        #[arg(short, long)]
        commute: String,

        /// Traffic on the route at departure (free, light, moderate, heavy, severe)
        #[arg(long)]
        traffic: Option<TrafficLevel>,
    },
    End {
        #[arg(short, long)]
        commute: String,

        #[arg(short, long)]
        trip: String,

        #[arg(long)]
        route: Option<String>,

        #[arg(long)]
        switched: bool,

        /// Traffic-free duration of the route driven
        #[arg(long, requires = "distance_km")]
        base_minutes: Option<f64>,

        #[arg(long, requires = "base_minutes")]
        distance_km: Option<f64>,
    },
}

fn parse_coordinate(s: &str) -> Result<Coordinate, String> {
    let (lat, lng) = s
        .split_once(',')
        .ok_or_else(|| format!("expected \"lat,lng\", got {:?}", s))?;
    let lat = lat.trim().parse().map_err(|_| format!("invalid latitude {:?}", lat))?;
    let lng = lng.trim().parse().map_err(|_| format!("invalid longitude {:?}", lng))?;
    Ok(Coordinate::new(lat, lng))
}

/// Live traffic is supplied by clients; routes fetched here start unknown.
struct NoTraffic;

impl TrafficSource for NoTraffic {
    fn snapshot_for(&self, _route: &RouteOption) -> Result<TrafficSnapshot, TrafficError> {
        Ok(TrafficSnapshot::unknown())
    }
}

fn route_providers(config: &AdvisorConfig) -> anyhow::Result<Vec<Box<dyn RouteProvider>>> {
    let mut providers: Vec<Box<dyn RouteProvider>> = Vec::new();
    if let Some(osrm) = &config.osrm {
        providers.push(Box::new(OsrmClient::new(osrm.clone())?));
    }
    providers.push(Box::new(StraightLineRouter::default()));
    Ok(providers)
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<(), anyhow::Error> {
    dotenvy::from_filename(".env.local").ok();

    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(if cli.debug {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .init();

    let config = AdvisorConfig::from_env()?;
    let model_path = config.model_path();
    let model = Arc::new(
        ModelHandle::load(&model_path)
            .with_context(|| format!("loading model from {}", model_path.display()))?,
    );
    let store = JsonFileStore::open(&config.data_dir)?;
    let tracker = CommuteTracker::new(store, Arc::clone(&model), &config);

    match cli.command {
        Some(Commands::Compare {
            request,
            commute,
            current,
            threshold,
        }) => {
            let advisor = Advisor::from_config(&config, Arc::clone(&model));
            let mut request = match (request, commute) {
                (Some(path), _) => {
                    let file = File::open(&path)
                        .with_context(|| format!("opening {}", path.display()))?;
                    serde_json::from_reader::<_, ComparisonRequest>(BufReader::new(file))?
                }
                (None, Some(id)) => {
                    let commute = tracker.commute(&id)?;
                    let providers = route_providers(&config)?;
                    let gathered = Advisor::gather(
                        providers.as_slice(),
                        &NoTraffic,
                        None,
                        commute.details.origin,
                        commute.details.destination,
                    )?;
                    let current_route_id = match current.clone() {
                        Some(route) => route,
                        None => gathered
                            .candidates
                            .first()
                            .map(|candidate| candidate.route.id.clone())
                            .context("no routes found")?,
                    };
                    ComparisonRequest {
                        candidates: gathered.candidates,
                        current_route_id,
                        departure: Timestamp::now()
                            .to_zoned(config.patterns.time_zone.clone())
                            .datetime(),
                        weather: gathered.weather,
                        threshold_minutes: None,
                    }
                }
                (None, None) => anyhow::bail!("either --request or --commute is required"),
            };
            if let Some(current) = current {
                request.current_route_id = current;
            }
            if threshold.is_some() {
                request.threshold_minutes = threshold;
            }
            print_json(&advisor.compare(&request)?)?;
        }
        Some(Commands::Patterns { commute }) => {
            print_json(&tracker.patterns(&commute)?)?;
        }
        Some(Commands::Train) => {
            let trained = tracker.retrain()?;
            model.save(&model_path)?;
            info!(
                samples = trained.sample_count,
                confidence = trained.confidence,
                path = %model_path.display(),
                "saved model"
            );
            let mut importance = trained.feature_importance();
            importance.sort_by(|a, b| b.1.total_cmp(&a.1));
            for (name, share) in importance.iter().take(5) {
                println!("{:<20} {:>5.1}%", name, share * 100.0);
            }
        }
        Some(Commands::Commutes(CommuteCommands::List)) => {
            print_json(&tracker.list_commutes()?)?;
        }
        Some(Commands::Commutes(CommuteCommands::Add {
            name,
            origin,
            destination,
        })) => {
            print_json(&tracker.create_commute(NewCommute::new(name, origin, destination))?)?;
        }
        Some(Commands::Commutes(CommuteCommands::Delete { id })) => {
            tracker.delete_commute(&id)?;
            info!(id = %id, "deleted commute");
        }
        Some(Commands::Trip(TripCommands::Start { commute, traffic })) => {
            let snapshot = traffic.map(TrafficSnapshot::at_level);
            print_json(&tracker.start_trip(&commute, Timestamp::now(), snapshot)?)?;
        }
        Some(Commands::Trip(TripCommands::End {
            commute,
            trip,
            route,
            switched,
            base_minutes,
            distance_km,
        })) => {
            let route_basis = base_minutes.zip(distance_km).map(|(base, distance)| RouteBasis {
                base_duration_minutes: base,
                distance_km: distance,
            });
            let entry = tracker.end_trip(
                &commute,
                &trip,
                Timestamp::now(),
                TripOutcome {
                    route_taken: route,
                    switched_routes: switched,
                    route_basis,
                },
            )?;
            print_json(&entry)?;
            if tracker.retrain_if_due()?.is_some() {
                model.save(&model_path)?;
            }
        }
        None => info!(commutes = tracker.list_commutes()?.len(), "nothing to do"),
    }

    Ok(())
}
