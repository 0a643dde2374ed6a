//! PlayCard CLI
//!
//! Runs card operations against a JSON card image and prints the resulting
//! status as JSON.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use playcard_rs::{
    pad_sequence, CardMemory, InMemoryCard, PlayCard, PlayCardBuilder, PlayCardConfig, Status,
    Uid,
};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "playcard")]
#[command(about = "Loyalty points, rewards and sequence game on an emulated 1K card")]
struct Args {
    /// Path to the card image (JSON)
    #[arg(short, long)]
    image: PathBuf,

    /// TOML configuration with key material and reader identity
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a factory-fresh card image
    New {
        /// UID as hex; random when omitted
        #[arg(long)]
        uid: Option<String>,
    },
    /// Provision an untouched card with the default key
    Configure {
        #[arg(default_value_t = 0)]
        points: i32,
    },
    /// Re-provision a locked card
    Reset { points: i32 },
    /// Points, rewards and game cursor
    Status,
    Points,
    AddPoints { amount: i32 },
    ChargePoints { amount: i32 },
    Rewards,
    AddRewards { amount: i32 },
    ChargeRewards { amount: i32 },
    /// Start a sequence game, e.g. `init-sequence 0a0b0c 25`
    InitSequence { sequence: String, reward: i32 },
    /// Check the next byte (decimal or 0x-prefixed hex)
    CheckSequence { byte: String },
    /// Print the raw card image
    Dump,
}

fn parse_byte(s: &str) -> anyhow::Result<u8> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.with_context(|| format!("'{}' is not a byte", s))
}

fn run<C: CardMemory>(play: &mut PlayCard<C>, command: Command) -> anyhow::Result<Status> {
    let status = match command {
        Command::Configure { points } => Status::from_result(play.configure(points), Status::from),
        Command::Reset { points } => Status::from_result(play.reset(points), Status::from),
        Command::Status => Status::from_result(play.check_status(), Status::from),
        Command::Points => Status::from_result(play.get_points(), |p| Status::ok().with_points(p)),
        Command::AddPoints { amount } => {
            Status::from_result(play.add_points(amount), |p| Status::ok().with_points(p))
        }
        Command::ChargePoints { amount } => {
            Status::from_result(play.charge_points(amount), |p| Status::ok().with_points(p))
        }
        Command::Rewards => {
            Status::from_result(play.get_rewards(), |r| Status::ok().with_rewards(r))
        }
        Command::AddRewards { amount } => {
            Status::from_result(play.add_rewards(amount), |r| Status::ok().with_rewards(r))
        }
        Command::ChargeRewards { amount } => {
            Status::from_result(play.charge_rewards(amount), |r| Status::ok().with_rewards(r))
        }
        Command::InitSequence { sequence, reward } => {
            let bytes = hex::decode(&sequence)
                .with_context(|| format!("sequence '{}' is not hex", sequence))?;
            let sequence = pad_sequence(&bytes)?;
            Status::from_result(play.init_sequence(&sequence, reward), |state| {
                Status::ok().with_cursor(state.cursor())
            })
        }
        Command::CheckSequence { byte } => {
            let input = parse_byte(&byte)?;
            Status::from_result(play.check_sequence_report(input), Status::from)
        }
        Command::New { .. } | Command::Dump => bail!("command does not open a card session"),
    };
    Ok(status)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    match &args.command {
        Command::New { uid } => {
            if args.image.exists() {
                bail!("{} already exists", args.image.display());
            }
            let card = match uid {
                Some(hex_uid) => {
                    let bytes = hex::decode(hex_uid)
                        .with_context(|| format!("uid '{}' is not hex", hex_uid))?;
                    InMemoryCard::with_uid(Uid::new(bytes))
                }
                None => InMemoryCard::new(),
            };
            card.save(&args.image)?;
            info!(uid = %card.uid(), "Created card image {}", args.image.display());
            return Ok(());
        }
        Command::Dump => {
            let card = InMemoryCard::load(&args.image)?;
            println!("{}", card.to_json()?);
            return Ok(());
        }
        _ => {}
    }

    let config = match &args.config {
        Some(path) => PlayCardConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => PlayCardConfig::default(),
    };

    let card = InMemoryCard::load(&args.image)
        .with_context(|| format!("loading card image {}", args.image.display()))?;
    let uid = card.uid().clone();

    let (builder, _trail) = PlayCardBuilder::from_config(&config)?;
    let mut play = builder.build(card, uid);

    let status = run(&mut play, args.command)?;
    play.card().save(&args.image)?;

    println!("{}", serde_json::to_string_pretty(&status)?);
    if !status.is_ok() {
        std::process::exit(1);
    }
    Ok(())
}
