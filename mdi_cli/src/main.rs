use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use mdi_core::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "mdi")]
#[command(about = "Insulin dose advisory for multiple daily injections", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Engine configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Message language (en, es)
    #[arg(long, global = true)]
    lang: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Reference time (RFC 3339) instead of the current clock
    #[arg(long, global = true)]
    at: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Calculate a meal or correction dose
    Dose {
        /// Insulin profile (TOML or JSON)
        #[arg(long)]
        profile: PathBuf,

        /// Which dose to calculate
        #[arg(long, value_enum)]
        meal: MealArg,

        /// Current glucose, mg/dL
        #[arg(long)]
        glucose: f64,

        /// Carbohydrates, grams
        #[arg(long)]
        carbs: Option<f64>,

        /// Previous injections (JSON array)
        #[arg(long)]
        injections: Option<PathBuf>,

        /// Exercised recently
        #[arg(long)]
        exercise: bool,

        /// Alcohol consumed
        #[arg(long)]
        alcohol: bool,

        /// Currently ill
        #[arg(long)]
        illness: bool,

        /// Under stress
        #[arg(long)]
        stress: bool,

        /// Menstruating
        #[arg(long)]
        menstruation: bool,

        /// High-fat meal
        #[arg(long)]
        high_fat: bool,

        /// Local hour of day (0-23) for nighttime checks
        #[arg(long)]
        hour: Option<u32>,
    },

    /// Bedtime safety check
    Presleep {
        #[arg(long)]
        profile: PathBuf,

        #[arg(long)]
        glucose: f64,

        #[arg(long)]
        injections: Option<PathBuf>,
    },

    /// Correction between meals
    Correct {
        #[arg(long)]
        profile: PathBuf,

        #[arg(long)]
        glucose: f64,

        #[arg(long)]
        injections: Option<PathBuf>,
    },

    /// Show insulin on board
    Iob {
        #[arg(long)]
        profile: PathBuf,

        #[arg(long)]
        injections: PathBuf,
    },

    /// Analyze a multi-day record for patterns and control tier
    Analyze {
        /// Weekly record (JSON array of days, or CSV)
        #[arg(long)]
        records: PathBuf,
    },

    /// Validate an insulin profile
    CheckProfile {
        #[arg(long)]
        profile: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum MealArg {
    Breakfast,
    Lunch,
    Dinner,
    Correction,
}

impl From<MealArg> for TimeOfDay {
    fn from(meal: MealArg) -> Self {
        match meal {
            MealArg::Breakfast => TimeOfDay::Breakfast,
            MealArg::Lunch => TimeOfDay::Lunch,
            MealArg::Dinner => TimeOfDay::Dinner,
            MealArg::Correction => TimeOfDay::Correction,
        }
    }
}

/// Settings shared by every subcommand
struct Session {
    config: EngineConfig,
    catalog: MessageCatalog,
    json: bool,
    now: DateTime<Utc>,
}

fn main() -> ExitCode {
    // Initialize logging
    mdi_core::logging::init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(Error::Validation { field, constraint }) => {
            eprintln!("Invalid input: {} {}", field, constraint);
            ExitCode::from(2)
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = match cli.config {
        Some(ref path) => EngineConfig::load_from(path)?,
        None => EngineConfig::load()?,
    };

    let language = match cli.lang {
        Some(ref lang) => lang.parse::<Language>()?,
        None => config.i18n.language,
    };
    let fallback = config.i18n.fallback;
    mdi_core::configure(language, fallback);

    let now = match cli.at {
        Some(ref at) => DateTime::parse_from_rfc3339(at)
            .map_err(|e| Error::Other(format!("Invalid --at time '{}': {}", at, e)))?
            .with_timezone(&Utc),
        None => Utc::now(),
    };
    tracing::debug!("Reference time {} ({})", now, language);

    let session = Session {
        config,
        catalog: mdi_core::i18n::current(),
        json: cli.json,
        now,
    };

    match cli.command {
        Commands::Dose {
            profile,
            meal,
            glucose,
            carbs,
            injections,
            exercise,
            alcohol,
            illness,
            stress,
            menstruation,
            high_fat,
            hour,
        } => {
            let context = DoseContext {
                recent_exercise: exercise,
                alcohol,
                illness,
                stress,
                menstruation,
                high_fat_meal: high_fat,
                hour_of_day: hour,
            };
            let params = CalculateDoseParams {
                time_of_day: meal.into(),
                glucose,
                carbohydrates: carbs,
                previous_injections: read_injections(injections.as_deref())?,
                context: (context != DoseContext::default()).then_some(context),
            };
            cmd_dose(&session, &profile, &params)
        }
        Commands::Presleep {
            profile,
            glucose,
            injections,
        } => cmd_presleep(&session, &profile, glucose, injections.as_deref()),
        Commands::Correct {
            profile,
            glucose,
            injections,
        } => cmd_correct(&session, &profile, glucose, injections.as_deref()),
        Commands::Iob {
            profile,
            injections,
        } => cmd_iob(&session, &profile, &injections),
        Commands::Analyze { records } => cmd_analyze(&session, &records),
        Commands::CheckProfile { profile } => cmd_check_profile(&session, &profile),
    }
}

fn read_injections(path: Option<&Path>) -> Result<Vec<Injection>> {
    match path {
        Some(path) => load_injections(path),
        None => Ok(Vec::new()),
    }
}

fn calculator(session: &Session, profile: &Path) -> Result<DoseCalculator> {
    let profile = InsulinProfile::load_from(profile)?;
    DoseCalculator::with_config(profile, session.config.clone())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_warnings(catalog: &MessageCatalog, warnings: &[DoseWarning]) {
    if warnings.is_empty() {
        return;
    }
    println!();
    println!("{}:", catalog.t("label.warnings", &[]));
    for warning in warnings {
        println!("  ! {}", warning.render(catalog));
    }
}

fn cmd_dose(session: &Session, profile: &Path, params: &CalculateDoseParams) -> Result<()> {
    let calculator = calculator(session, profile)?;
    let result = calculator.calculate_dose(params, session.now)?;

    if session.json {
        return print_json(&result);
    }

    let catalog = &session.catalog;
    let b = &result.breakdown;
    println!("{}: {:.1} U", catalog.t("label.dose", &[]), result.dose);
    println!("{}: {:.2} U", catalog.t("label.iob", &[]), b.iob);
    let breakdown = [
        ("carb", format!("{:.1}", b.carb_dose)),
        ("correction", format!("{:.1}", b.correction_dose)),
        ("iob", format!("{:.1}", b.iob)),
    ];
    println!("  {}", catalog.t("label.breakdown", &breakdown));
    print_warnings(catalog, &result.warnings);
    Ok(())
}

fn cmd_presleep(
    session: &Session,
    profile: &Path,
    glucose: f64,
    injections: Option<&Path>,
) -> Result<()> {
    let calculator = calculator(session, profile)?;
    let injections = read_injections(injections)?;
    let evaluation = calculator.evaluate_pre_sleep(glucose, &injections, session.now)?;

    if session.json {
        return print_json(&evaluation);
    }

    let catalog = &session.catalog;
    println!("{}", evaluation.reason.render(catalog));
    println!(
        "{}: {:.2} U",
        catalog.t("label.iob", &[]),
        evaluation.remaining_iob
    );
    Ok(())
}

fn cmd_correct(
    session: &Session,
    profile: &Path,
    glucose: f64,
    injections: Option<&Path>,
) -> Result<()> {
    let calculator = calculator(session, profile)?;
    let injections = read_injections(injections)?;
    let result = calculator.calculate_between_meal_correction(glucose, &injections, session.now)?;

    if session.json {
        return print_json(&result);
    }

    let catalog = &session.catalog;
    println!("{}: {:.1} U", catalog.t("label.dose", &[]), result.dose);
    println!("{}", result.reason.render(catalog));
    print_warnings(catalog, &result.warnings);
    Ok(())
}

fn cmd_iob(session: &Session, profile: &Path, injections: &Path) -> Result<()> {
    let calculator = calculator(session, profile)?;
    let injections = load_injections(injections)?;
    let iob = calculator.calculate_iob(&injections, session.now);

    if session.json {
        return print_json(&serde_json::json!({ "iob": iob }));
    }

    println!("{}: {:.2} U", session.catalog.t("label.iob", &[]), iob);
    Ok(())
}

#[derive(Serialize)]
struct AnalysisOutput<'a> {
    validation: &'a ValidationReport,
    patterns: &'a PatternReport,
    findings: Vec<PatternFinding>,
}

fn cmd_analyze(session: &Session, records: &Path) -> Result<()> {
    let record = load_weekly_record(records)?;
    let validation = build_validation_report(&record, &session.config.tiers)?;
    let patterns = analyze_patterns(&record, &session.config.patterns)?;

    if session.json {
        return print_json(&AnalysisOutput {
            validation: &validation,
            patterns: &patterns,
            findings: patterns.findings().collect(),
        });
    }

    let catalog = &session.catalog;
    println!(
        "{}: {:.0}%",
        catalog.t("label.in_range", &[]),
        validation.day_in_range_percentage
    );
    println!("{}", validation.render(catalog));
    println!();
    println!("{}:", catalog.t("label.patterns", &[]));
    for finding in patterns.findings() {
        println!("  - {}", finding.render(catalog));
    }
    Ok(())
}

fn cmd_check_profile(session: &Session, profile: &Path) -> Result<()> {
    let profile = InsulinProfile::load_from(profile)?;

    if session.json {
        return print_json(&profile);
    }

    println!("{}", session.catalog.t("label.profile_ok", &[]));
    Ok(())
}
