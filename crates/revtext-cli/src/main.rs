//! Interactive demo for the review-mode engine. Not part of the
//! library's public contract — ambient tooling for manually exercising
//! `revtext-core` end to end, a thin `clap` front end over the library.

use clap::Parser;
use revtext_common::{AnnotationId, Config, SenderId};
use revtext_core::{Event, TrackChangesEngine};
use revtext_text::RgaText;
use std::io::{self, BufRead, Write};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "revtext", about = "Drive a review-mode document from stdin commands")]
struct Cli {
    /// Author attributed to every operation this session issues.
    #[arg(long, default_value = "local-user")]
    user: String,

    /// Replica identity stamped on records and text-CRDT positions.
    #[arg(long, default_value = "replica-1")]
    replica: String,
}

fn main() {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    let config = Config::new(cli.user);
    let sender_id = SenderId::from(cli.replica.as_str());
    let mut engine = TrackChangesEngine::new(config, sender_id, RgaText::new());

    println!("revtext interactive demo. Commands:");
    println!("  insert <index> <text> [suggest]");
    println!("  delete <index> <count> [suggest]");
    println!("  accept <annotation-id>");
    println!("  decline <annotation-id>");
    println!("  comment <start> <end> <text...>");
    println!("  uncomment <annotation-id>");
    println!("  show");
    println!("  quit");

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "quit" || line == "exit" {
            break;
        }
        run_command(&mut engine, line);
        print!("> ");
        let _ = io::stdout().flush();
    }
}

fn run_command(engine: &mut TrackChangesEngine<RgaText>, line: &str) {
    let mut parts = line.split_whitespace();
    match parts.next() {
        Some("insert") => {
            let Some(index) = parts.next().and_then(|s| s.parse().ok()) else {
                eprintln!("usage: insert <index> <text> [suggest]");
                return;
            };
            let rest: Vec<&str> = parts.collect();
            let suggest = rest.last().is_some_and(|s| *s == "suggest");
            let text_parts = if suggest { &rest[..rest.len() - 1] } else { &rest[..] };
            let text = text_parts.join(" ");
            print_events(engine.insert(index, &text, suggest));
        }
        Some("delete") => {
            let index: Option<usize> = parts.next().and_then(|s| s.parse().ok());
            let count: Option<usize> = parts.next().and_then(|s| s.parse().ok());
            let suggest = parts.next() == Some("suggest");
            match (index, count) {
                (Some(index), Some(count)) => print_events(engine.delete(index, count, suggest)),
                _ => eprintln!("usage: delete <index> <count> [suggest]"),
            }
        }
        Some("accept") => match parse_id(parts.next()) {
            Some(id) => print_events(engine.accept_suggestion(id)),
            None => eprintln!("usage: accept <annotation-id>"),
        },
        Some("decline") => match parse_id(parts.next()) {
            Some(id) => print_events(engine.decline_suggestion(id)),
            None => eprintln!("usage: decline <annotation-id>"),
        },
        Some("comment") => {
            let start: Option<usize> = parts.next().and_then(|s| s.parse().ok());
            let end: Option<usize> = parts.next().and_then(|s| s.parse().ok());
            let text: Vec<&str> = parts.collect();
            match (start, end) {
                (Some(start), Some(end)) => match engine.add_comment(start, end, &text.join(" ")) {
                    Ok(events) => print_events(events),
                    Err(e) => eprintln!("error: {e}"),
                },
                _ => eprintln!("usage: comment <start> <end> <text...>"),
            }
        }
        Some("uncomment") => match parse_id(parts.next()) {
            Some(id) => print_events(engine.remove_comment(id)),
            None => eprintln!("usage: uncomment <annotation-id>"),
        },
        Some("show") => {
            println!("text: {:?}", engine.to_string());
            for a in engine.active_annotations() {
                println!("  {:?} id={} user={}", a.kind, a.id, a.user_id);
            }
        }
        Some(other) => eprintln!("unknown command: {other}"),
        None => {}
    }
}

fn parse_id(token: Option<&str>) -> Option<AnnotationId> {
    token.and_then(|s| Uuid::parse_str(s).ok()).map(AnnotationId)
}

fn print_events(events: Vec<Event>) {
    for event in events {
        match event {
            Event::Insert { index, values, .. } => println!("Insert@{index} {values:?}"),
            Event::Delete { index, values, .. } => println!("Delete@{index} {values:?}"),
            Event::AnnotationAdded { start_index, end_index, annotation } => {
                println!("AnnotationAdded [{start_index}, {end_index}) id={} kind={:?}", annotation.id, annotation.kind)
            }
            Event::AnnotationRemoved { start_index, end_index, annotation, reason, .. } => {
                println!("AnnotationRemoved [{start_index}, {end_index}) id={} reason={:?}", annotation.id, reason)
            }
        }
    }
}
