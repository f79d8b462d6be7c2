//! Line-oriented front-end.
//!
//! Protocol:
//! - Lines starting with `#` are commands (save, load, reset, status, ...)
//! - Every other line is the detective's action; an empty line waits
//! - Output is tagged: `[NARRATOR]`, `[ACHIEVEMENT]`, `[STATUS]`, `[ERROR]`, ...

use crate::CliConfig;
use noir_core::{FileBlobStore, Game, StoryConfig, Storyteller, TurnOutcome};
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Whether the input loop keeps going after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

/// Run the game until `#quit` or end of input.
pub async fn run(config: CliConfig) -> io::Result<()> {
    let mut story_config = StoryConfig::from_env();
    if let Some(model) = config.model {
        story_config = story_config.with_model(model);
    }
    let storyteller = Storyteller::claude_from_env(story_config);
    let store = Arc::new(FileBlobStore::new(&config.save_dir));
    let mut game = Game::new(storyteller, store);
    let premise = config.premise.unwrap_or_default();

    println!("=== NOIR ===");
    print_commands();
    if let Some(saved_at) = game.saved_at().await {
        println!("[SAVE] A case saved at {saved_at} is on file. Type #load to resume it.");
    }
    println!();

    match game.start(&premise).await {
        Ok(outcome) => print_turn(&game, &outcome),
        Err(e) => println!("[ERROR] {e}"),
    }

    let mut stdout = io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();

        if let Some(command) = line.strip_prefix('#') {
            let flow = handle_command(&mut game, command, &premise).await;
            stdout.flush().ok();
            if flow == Flow::Quit {
                break;
            }
            continue;
        }

        print!("[PROCESSING]");
        stdout.flush().ok();

        let result = game.submit_action(line).await;

        // Clear the processing indicator
        print!("\r            \r");
        stdout.flush().ok();

        match result {
            Ok(outcome) => print_turn(&game, &outcome),
            Err(e) => println!("[ERROR] {e}"),
        }
    }

    Ok(())
}

async fn handle_command(game: &mut Game, command: &str, premise: &str) -> Flow {
    let (name, rest) = match command.trim().split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (command.trim(), ""),
    };

    match name {
        "quit" | "exit" => {
            println!("The rain keeps falling. Goodbye.");
            return Flow::Quit;
        }
        "save" => match game.save().await {
            Ok(saved_at) => println!("[SAVED] Case saved at {saved_at}"),
            Err(e) => println!("[ERROR] Save failed: {e}"),
        },
        "load" => match game.load().await {
            Ok(true) => {
                println!("[LOADED] Case restored");
                print_status(game);
            }
            Ok(false) => println!("[LOADED] No saved case available"),
            Err(e) => println!("[ERROR] Load failed: {e}"),
        },
        "reset" => {
            if let Err(e) = game.reset().await {
                println!("[ERROR] Reset failed: {e}");
                return Flow::Continue;
            }
            let premise = if rest.is_empty() { premise } else { rest };
            println!("[RESET] Starting a new case");
            match game.start(premise).await {
                Ok(outcome) => print_turn(game, &outcome),
                Err(e) => println!("[ERROR] {e}"),
            }
        }
        "status" => print_status(game),
        "summary" => {
            println!("[SUMMARY]");
            println!("{}", game.summarize().await);
        }
        "news" => {
            let digest = game.news().await;
            println!("[NEWS]");
            println!("{}", digest.text);
            for source in &digest.sources {
                println!("  - {} <{}>", source.title, source.uri);
            }
        }
        "help" => print_commands(),
        _ => println!("[ERROR] Unknown command. Type #help for help."),
    }
    Flow::Continue
}

fn print_turn(game: &Game, outcome: &TurnOutcome) {
    println!("[NARRATOR]");
    for para in outcome.narrative.split("\n\n") {
        println!("{para}");
    }
    println!();

    if let Some(line) = notice_line(game, Instant::now()) {
        println!("{line}");
    }
}

/// The achievement notice, while it is still up.
fn notice_line(game: &Game, now: Instant) -> Option<String> {
    game.notice(now).map(|notice| {
        format!(
            "[ACHIEVEMENT] {} - {}",
            notice.achievement.title, notice.achievement.description
        )
    })
}

fn print_status(game: &Game) {
    let state = game.state();
    let stats = state.stats.clamped();

    println!("[STATUS]");
    println!("  Case: {}", state.premise);
    println!(
        "  Health: {}  Resolve: {}  Suspicion: {}",
        stats.health, stats.resolve, stats.suspicion
    );
    if state.inventory.is_empty() {
        println!("  Inventory: (empty)");
    } else {
        println!("  Inventory: {}", state.inventory.join(", "));
    }
    for character in state.characters.values() {
        println!(
            "  {} [{}]: {}",
            character.name, character.status, character.description
        );
    }
    if !state.achievements.is_empty() {
        let titles: Vec<&str> = state.achievements.iter().map(|a| a.title.as_str()).collect();
        println!("  Achievements: {}", titles.join(", "));
    }
    println!("  Diary entries: {}", state.transcript.len());
    if let Some(line) = notice_line(game, Instant::now()) {
        println!("{line}");
    }
}

fn print_commands() {
    println!("Commands:");
    println!("  #save           - Save the case");
    println!("  #load           - Load the saved case");
    println!("  #reset [PREMISE] - Discard the save and start over");
    println!("  #status         - Show stats, inventory and characters");
    println!("  #summary        - Summarize the case so far");
    println!("  #news           - Real-world news echoing the case");
    println!("  #help           - Show this help");
    println!("  #quit           - Exit");
    println!("  (anything else is your next move; an empty line waits)");
}
