use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use carryon_agents::PreviewAgent;
use carryon_classifier::{DecisionModel, GeminiModel};
use carryon_core::models::{
    CabinClass, DutyFreeInfo, ItemParams, Itinerary, PreviewRequest, Segment,
};
use carryon_core::{AdvisorConfig, Canonical, Taxonomy};
use carryon_observability::{init_tracing, AppMetrics};
use carryon_regstore::RegulationStore;
use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "carryon")]
#[command(about = "Baggage advisor decision core CLI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the full preview pipeline for one item label.
    Preview {
        label: String,
        #[command(flatten)]
        trip: TripArgs,
        #[arg(long)]
        locale: Option<String>,
        #[command(flatten)]
        params: ParamArgs,
    },
    /// Run only the deterministic rule engine for a known canonical.
    Decide {
        canonical: String,
        #[command(flatten)]
        trip: TripArgs,
        #[command(flatten)]
        params: ParamArgs,
    },
    Rules {
        #[command(subcommand)]
        command: RulesCommand,
    },
    Taxonomy {
        #[command(subcommand)]
        command: TaxonomyCommand,
    },
}

#[derive(Debug, Subcommand)]
enum RulesCommand {
    /// Load every file in a regulation directory, reporting the first error.
    Validate { dir: PathBuf },
    /// Print the loaded rules for one scope and code.
    Show { scope: String, code: String },
}

#[derive(Debug, Subcommand)]
enum TaxonomyCommand {
    /// Print the closed key list shared by prompt and guard.
    Keys,
}

#[derive(Debug, Args)]
struct TripArgs {
    #[arg(long = "from")]
    origin: String,
    #[arg(long = "to")]
    destination: String,
    #[arg(long = "via")]
    via: Vec<String>,
    #[arg(long, default_value_t = false)]
    rescreening: bool,
    #[arg(long)]
    carrier: Option<String>,
    #[arg(long)]
    cabin: Option<String>,
    #[arg(long)]
    fare: Option<String>,
}

#[derive(Debug, Args)]
struct ParamArgs {
    #[arg(long)]
    volume_ml: Option<f64>,
    #[arg(long)]
    wh: Option<f64>,
    #[arg(long)]
    count: Option<u32>,
    #[arg(long)]
    weight_kg: Option<f64>,
    #[arg(long)]
    abv_percent: Option<f64>,
    #[arg(long)]
    blade_length_cm: Option<f64>,
    #[arg(long, default_value_t = false)]
    duty_free: bool,
    #[arg(long, default_value_t = false)]
    steb_sealed: bool,
}

impl TripArgs {
    fn itinerary(&self) -> Itinerary {
        Itinerary {
            origin: self.origin.clone(),
            via: self.via.clone(),
            destination: self.destination.clone(),
            rescreening: self.rescreening,
        }
    }

    fn segments(&self) -> Result<Vec<Segment>> {
        let Some(carrier) = &self.carrier else {
            return Ok(Vec::new());
        };
        let cabin_class = match &self.cabin {
            Some(value) => Some(
                CabinClass::parse(value)
                    .with_context(|| format!("invalid --cabin value {value:?}"))?,
            ),
            None => None,
        };
        Ok(vec![Segment {
            leg: format!("{}-{}", self.origin, self.destination),
            operating: carrier.clone(),
            cabin_class,
            fare_class: self.fare.clone(),
        }])
    }
}

impl ParamArgs {
    fn item_params(&self) -> ItemParams {
        ItemParams {
            volume_ml: self.volume_ml,
            wh: self.wh,
            count: self.count,
            weight_kg: self.weight_kg,
            abv_percent: self.abv_percent,
            blade_length_cm: self.blade_length_cm,
        }
    }

    fn duty_free(&self) -> DutyFreeInfo {
        DutyFreeInfo {
            is_df: self.duty_free,
            steb_sealed: self.steb_sealed,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("carryon_cli");
    let cli = Cli::parse();
    let config = AdvisorConfig::from_env();

    match cli.command {
        Command::Preview {
            label,
            trip,
            locale,
            params,
        } => {
            let agent = build_agent(&config)?;
            let request = PreviewRequest {
                label,
                locale,
                req_id: None,
                itinerary: trip.itinerary(),
                segments: trip.segments()?,
                item_params: params.item_params(),
                duty_free: params.duty_free(),
            };
            let result = agent.preview(request).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Decide {
            canonical,
            trip,
            params,
        } => {
            let canonical = Canonical::parse(&canonical)
                .with_context(|| format!("unknown canonical key {canonical:?}"))?;
            let agent = build_agent(&config)?;
            let (resolved, engine) = agent.decide(
                canonical,
                &trip.itinerary(),
                &trip.segments()?,
                &params.item_params(),
                params.duty_free(),
            );
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "resolved": resolved,
                    "engine": engine,
                }))?
            );
        }
        Command::Rules { command } => match command {
            RulesCommand::Validate { dir } => {
                let store = RegulationStore::load_dir(&dir)
                    .with_context(|| format!("validation failed for {}", dir.display()))?;
                let index = store.snapshot();
                println!(
                    "{}",
                    serde_json::json!({
                        "files": index.file_count(),
                        "rules": index.rule_count(),
                        "ok": true,
                    })
                );
            }
            RulesCommand::Show { scope, code } => {
                let scope = match scope.to_lowercase().as_str() {
                    "airline" => carryon_core::models::Scope::Airline,
                    "country" => carryon_core::models::Scope::Country,
                    "international" => carryon_core::models::Scope::International,
                    other => bail!("unknown scope {other:?}"),
                };
                let store = RegulationStore::load_dir(&config.regulation_dir)?;
                let index = store.snapshot();
                for rule in index.find_scope(scope, &code) {
                    println!(
                        "{}",
                        serde_json::json!({
                            "id": rule.id,
                            "item_category": rule.item_category,
                            "severity": rule.severity,
                            "specificity": rule.conditions.specificity(),
                            "caps": rule.caps,
                        })
                    );
                }
            }
        },
        Command::Taxonomy { command } => match command {
            TaxonomyCommand::Keys => {
                for key in Taxonomy::builtin().allowed_keys() {
                    println!("{key}");
                }
            }
        },
    }

    Ok(())
}

fn build_agent(config: &AdvisorConfig) -> Result<PreviewAgent> {
    let taxonomy = match &config.taxonomy_dir {
        Some(dir) => Arc::new(Taxonomy::load_dir(dir)?),
        None => Arc::new(Taxonomy::builtin().clone()),
    };

    let store = if config.regulation_dir.is_dir() {
        Arc::new(RegulationStore::load_dir(&config.regulation_dir)?)
    } else {
        Arc::new(RegulationStore::empty())
    };

    let model: Arc<dyn DecisionModel> = Arc::new(GeminiModel::new(
        config.gemini_api_key.clone().unwrap_or_default(),
        config.model_name.clone(),
    ));

    Ok(PreviewAgent::new(
        taxonomy,
        store,
        model,
        config.clone(),
        AppMetrics::shared(),
    ))
}
