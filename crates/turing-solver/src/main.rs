//! CLI entry point for the Turing Machine solver.
//!
//! Usage:
//!   turing-solver play [<game.json>] [options]
//!   turing-solver play --stdin [options]
//!   turing-solver play --card 26:0 --card 14:1 ... [options]
//!   turing-solver cards
//!
//! Options:
//!   --digits <n>            Digits per code (default: 3)
//!   --max-rounds <n>        Rounds before giving up (default: 100)
//!   --timeout <seconds>     Maximum time per round (default: 30)
//!   --evidence <mode>       implication or biconditional (default: biconditional)
//!   --no-avoid-repeats      Allow resubmitting codes already tried
//!   --json                  Print the outcome as JSON
//!
//! With no game file, stdin or cards the built-in scenario is played.

use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use turing_solver::catalog;
use turing_solver::{
    default_scenario, Error, EvidenceMode, Game, GameConfig, GameOutcome, GameState, Result,
    Rule, SelectorConfig, VarisatBackend, Verifier, DEFAULT_NUM_DIGITS,
};

#[derive(Parser)]
#[command(name = "turing-solver")]
#[command(about = "Adaptive constraint-solving player for the Turing Machine game")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play a game against a hidden verifier configuration
    Play {
        /// Path to game JSON file (use --stdin to read from stdin)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,

        /// Read game from stdin instead of file
        #[arg(long)]
        stdin: bool,

        /// Verifier card with hidden parameters, e.g. 26:0 or 48:0,1
        #[arg(long = "card", value_name = "ID:HIDDEN", value_parser = parse_card)]
        cards: Vec<(u32, Vec<u8>)>,

        /// Digits per code
        #[arg(long)]
        digits: Option<usize>,

        /// Rounds played before giving up
        #[arg(long)]
        max_rounds: Option<usize>,

        /// Maximum time per round in seconds
        #[arg(long, default_value = "30")]
        timeout: u64,

        /// How past responses constrain interpretations
        #[arg(long)]
        evidence: Option<EvidenceMode>,

        /// Allow resubmitting codes already tried
        #[arg(long)]
        no_avoid_repeats: bool,

        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the supported verifier cards
    Cards {
        /// Print the card table as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Game file contents
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GameFile {
    digits: Option<usize>,
    max_rounds: Option<usize>,
    evidence: Option<EvidenceMode>,
    verifiers: Vec<VerifierEntry>,
}

/// A verifier given either as a catalog card or as a bare rule
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum VerifierEntry {
    Card {
        card: u32,
        #[serde(default)]
        hidden: Vec<u8>,
    },
    Rule(Rule),
}

/// Output format for a played game
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PlayOutput {
    verifiers: Vec<String>,
    hidden: Vec<String>,
    evidence: EvidenceMode,
    #[serde(flatten)]
    outcome: GameOutcome,
}

/// Output format for a failed run
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorOutput {
    error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    assertions: Vec<String>,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Play {
            file,
            stdin,
            cards,
            digits,
            max_rounds,
            timeout,
            evidence,
            no_avoid_repeats,
            json,
        } => {
            let options = PlayOptions {
                digits,
                max_rounds,
                timeout,
                evidence,
                avoid_repeats: !no_avoid_repeats,
            };

            let code = match play(file, stdin, &cards, &options, json) {
                Ok(true) => 0,
                Ok(false) => 1,
                Err(err) => {
                    report_error(&err, json);
                    1
                }
            };
            process::exit(code);
        }
        Commands::Cards { json } => {
            if json {
                print_json(&catalog::cards());
            } else {
                for card in catalog::cards() {
                    println!(
                        "{:>3}  {:<60} hidden: {}",
                        card.id,
                        card.description,
                        card.kind.hidden_names()
                    );
                }
            }
        }
    }
}

/// Command-line overrides on top of the game file
struct PlayOptions {
    digits: Option<usize>,
    max_rounds: Option<usize>,
    timeout: u64,
    evidence: Option<EvidenceMode>,
    avoid_repeats: bool,
}

/// Play one game; returns whether it was solved with a valid code
fn play(
    file: Option<PathBuf>,
    stdin: bool,
    cards: &[(u32, Vec<u8>)],
    options: &PlayOptions,
    json: bool,
) -> Result<bool> {
    let game_file = if stdin {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Some(serde_json::from_str::<GameFile>(&buffer)?)
    } else if let Some(path) = file {
        let content = fs::read_to_string(&path)?;
        Some(serde_json::from_str::<GameFile>(&content)?)
    } else {
        None
    };

    let num_digits = options
        .digits
        .or_else(|| game_file.as_ref().and_then(|g| g.digits))
        .unwrap_or(DEFAULT_NUM_DIGITS);
    let defaults = GameConfig::default();
    let config = GameConfig {
        num_digits,
        max_rounds: options
            .max_rounds
            .or_else(|| game_file.as_ref().and_then(|g| g.max_rounds))
            .unwrap_or(defaults.max_rounds),
        selector: SelectorConfig {
            timeout: Duration::from_secs(options.timeout),
            avoid_repeats: options.avoid_repeats,
            evidence: options
                .evidence
                .or_else(|| game_file.as_ref().and_then(|g| g.evidence))
                .unwrap_or_default(),
            ..defaults.selector
        },
    };

    let verifiers = match game_file {
        Some(game_file) => {
            let mut verifiers = game_entries(num_digits, game_file.verifiers)?;
            verifiers.extend(catalog::verifiers_from_cards(num_digits, cards)?);
            verifiers
        }
        None if !cards.is_empty() => catalog::verifiers_from_cards(num_digits, cards)?,
        None => default_scenario()
            .into_iter()
            .map(|rule| Verifier::new(num_digits, rule))
            .collect::<Result<Vec<_>>>()?,
    };

    let evidence = config.selector.evidence;
    let mut game = Game::new(verifiers, config)?;
    let mut backend = VarisatBackend::new();

    if !json {
        for line in game.public_report() {
            println!("{}", line);
        }
        println!("Evidence mode: {}", evidence);
        println!();
    }

    let outcome = game.run(&mut backend)?;
    let succeeded = outcome.state == GameState::Solved && outcome.valid;

    if json {
        print_json(&PlayOutput {
            verifiers: game.public_report(),
            hidden: game.hidden_report(),
            evidence,
            outcome,
        });
    } else {
        print_report(&game, &outcome);
    }

    Ok(succeeded)
}

fn game_entries(num_digits: usize, entries: Vec<VerifierEntry>) -> Result<Vec<Verifier>> {
    entries
        .into_iter()
        .map(|entry| match entry {
            VerifierEntry::Card { card, hidden } => catalog::build(num_digits, card, &hidden),
            VerifierEntry::Rule(rule) => Verifier::new(num_digits, rule),
        })
        .collect()
}

fn print_report(game: &Game, outcome: &GameOutcome) {
    for record in &outcome.rounds {
        if record.fully_determined {
            println!(
                "Round {}: every verifier resolved, solution is {}",
                record.round, record.code
            );
            continue;
        }

        println!("Round {}: guess {}", record.round, record.code);
        for (verifier, response) in game.verifiers().iter().zip(&record.responses) {
            println!(
                "  {:<24} {}",
                verifier.public_description(),
                if *response { "pass" } else { "fail" }
            );
        }
        if record.stats.repeat_fallback {
            println!("  (no unseen code left, repeated a previous guess)");
        }
    }

    println!();
    match (&outcome.state, &outcome.solution) {
        (GameState::Solved, Some(code)) => {
            println!(
                "Solved: {} ({}) after {} guesses",
                code,
                if outcome.valid { "valid" } else { "INVALID" },
                outcome.guesses
            );
        }
        _ => println!("Failed after {} rounds", outcome.rounds.len()),
    }

    println!("Hidden configuration:");
    for line in game.hidden_report() {
        println!("  {}", line);
    }
    println!(
        "Solver calls: {}, time: {}ms",
        outcome.solver_calls, outcome.time_elapsed_ms
    );
}

fn report_error(err: &Error, json: bool) {
    let assertions = match err {
        Error::Contradiction { assertions, .. } => assertions.clone(),
        _ => Vec::new(),
    };

    if json {
        print_json(&ErrorOutput {
            error: err.to_string(),
            assertions,
        });
    } else {
        eprintln!("Error: {}", err);
        for assertion in &assertions {
            eprintln!("  {}", assertion);
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("Error serializing output: {}", e),
    }
}

/// Parse `ID:HIDDEN[,HIDDEN]`, e.g. `14:1` or `48:0,2`
fn parse_card(s: &str) -> std::result::Result<(u32, Vec<u8>), String> {
    let (id, hidden) = s
        .split_once(':')
        .ok_or_else(|| format!("expected ID:HIDDEN, got '{}'", s))?;
    let id = id
        .trim()
        .parse::<u32>()
        .map_err(|e| format!("bad card id '{}': {}", id, e))?;
    let hidden = hidden
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<u8>()
                .map_err(|e| format!("bad hidden parameter '{}': {}", part, e))
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok((id, hidden))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_card() {
        assert_eq!(parse_card("14:1").unwrap(), (14, vec![1]));
        assert_eq!(parse_card("48: 0, 2").unwrap(), (48, vec![0, 2]));
        assert!(parse_card("14").is_err());
        assert!(parse_card("x:1").is_err());
        assert!(parse_card("14:-1").is_err());
    }

    #[test]
    fn test_game_file_entries() {
        let json = r#"{
            "digits": 3,
            "maxRounds": 50,
            "evidence": "implication",
            "verifiers": [
                {"kind": "less_than_constant", "position": 0, "value": 3},
                {"card": 14, "hidden": [1]}
            ]
        }"#;
        let game_file: GameFile = serde_json::from_str(json).unwrap();
        assert_eq!(game_file.max_rounds, Some(50));
        assert_eq!(game_file.evidence, Some(EvidenceMode::Implication));

        let verifiers = game_entries(3, game_file.verifiers).unwrap();
        assert_eq!(
            verifiers[0].rule(),
            Rule::LessThanConstant { position: 0, value: 3 }
        );
        assert_eq!(verifiers[1].rule(), Rule::IsMinimum { position: 1 });
    }
}
