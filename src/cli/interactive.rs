use chrono::Local;
use log::info;
use std::error::Error;
use std::io::Write;
use tokio::io::{ AsyncBufReadExt, BufReader };

use crate::exchange::{ ExchangeController, SubmitOutcome };
use crate::history::format_history_for_display;
use crate::models::chat::Turn;

#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Clear,
    History,
    Status,
    Reload,
    Quit,
    Help,
    Unknown(&'a str),
    Chat(&'a str),
}

fn parse_command(line: &str) -> Command<'_> {
    match line.trim() {
        "/clear" => Command::Clear,
        "/history" => Command::History,
        "/status" => Command::Status,
        "/reload" => Command::Reload,
        "/quit" | "/exit" => Command::Quit,
        "/help" => Command::Help,
        cmd if cmd.starts_with('/') && !cmd.contains(char::is_whitespace) => Command::Unknown(cmd),
        _ => Command::Chat(line),
    }
}

fn print_turn(turn: &Turn) {
    let time = turn.timestamp.with_timezone(&Local).format("%H:%M");
    println!("[{}] {}: {}", time, turn.role, turn.content);
}

const HELP: &str = "Commands: /clear /history /status /reload /quit";

/// Line-oriented chat on stdin/stdout. Each non-command line is submitted.
pub async fn run_interactive(
    controller: &mut ExchangeController,
    stream_responses: bool
) -> Result<(), Box<dyn Error + Send + Sync>> {
    println!("AI Chat ({}). {}", controller.service().status().await, HELP);
    if !controller.conversation().is_empty() {
        print!("{}", format_history_for_display(controller.conversation()));
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_command(&line) {
            Command::Quit => {
                break;
            }
            Command::Help => println!("{}", HELP),
            Command::Unknown(cmd) => println!("Unknown command {}. {}", cmd, HELP),
            Command::Clear => {
                controller.clear().await;
                println!("Conversation cleared.");
            }
            Command::History => print!("{}", format_history_for_display(controller.conversation())),
            Command::Status => println!("API Status: {}", controller.service().status().await),
            Command::Reload => {
                controller.reinitialize().await;
                println!("API Status: {}", controller.service().status().await);
            }
            Command::Chat(text) => {
                let outcome = if stream_responses {
                    let out = controller.submit_streaming(text, |chunk| {
                        print!("{}", chunk);
                        let _ = std::io::stdout().flush();
                    }).await;
                    println!();
                    out
                } else {
                    controller.submit(text).await
                };

                match outcome {
                    SubmitOutcome::Rejected(error) => println!("! {}", error),
                    SubmitOutcome::Answered(turn) | SubmitOutcome::Failed(turn) => print_turn(&turn),
                }
            }
        }
    }

    info!("Interactive session ended");
    Ok(())
}
