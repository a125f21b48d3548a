use std::io::{self, IsTerminal, Read, Write};

use sc_backend::ChatClient;
use sc_core::config::Config;
use sc_core::printer::TranscriptPrinter;
use sc_core::turn::NoopObserver;
use sc_core::{logging, ChatSession};
use tokio::io::{AsyncBufReadExt, BufReader};

fn print_help() {
    println!("streamchat — streaming chat client");
    println!();
    println!("Usage:");
    println!("  streamchat                     Interactive mode, one message per line");
    println!("  streamchat \"message\"           Send one message and exit");
    println!("  echo \"message\" | streamchat    Send stdin as one message and exit");
    println!();
    println!("Options:");
    println!("  --url <base>   Backend base URL (overrides config and STREAMCHAT_URL)");
    println!("  --json         Print the final transcript as JSON instead of streaming text");
    println!("  --version      Print version");
    println!("  --help         Print this help");
}

struct Args {
    url: Option<String>,
    json: bool,
    message: Option<String>,
}

fn parse_args(args: &[String]) -> Result<Args, String> {
    let mut url = None;
    let mut json = false;
    let mut positional = Vec::new();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--url" => match iter.next() {
                Some(value) => url = Some(value.clone()),
                None => return Err("--url needs a value".to_string()),
            },
            "--json" => json = true,
            flag if flag.starts_with('-') => return Err(format!("unknown option: {flag}")),
            _ => positional.push(arg.clone()),
        }
    }

    let message = if positional.is_empty() {
        None
    } else {
        Some(positional.join(" "))
    };
    Ok(Args { url, json, message })
}

async fn run_once(session: &mut ChatSession<ChatClient>, message: &str, json: bool) -> i32 {
    let outcome = if json {
        session.send(message, &mut NoopObserver).await
    } else {
        let mut printer = TranscriptPrinter::new(io::stdout());
        session.send(message, &mut printer).await
    };

    if json {
        match serde_json::to_string_pretty(session.transcript()) {
            Ok(text) => println!("{text}"),
            Err(e) => {
                eprintln!("error: failed to encode transcript: {e}");
                return 1;
            }
        }
    }

    match outcome {
        Some(outcome) if outcome.is_success() => 0,
        Some(_) => 1,
        None => {
            eprintln!("error: empty message");
            2
        }
    }
}

async fn run_interactive(session: &mut ChatSession<ChatClient>) -> i32 {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut printer = TranscriptPrinter::new(io::stdout());

    loop {
        eprint!("> ");
        let _ = io::stderr().flush();

        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => return 0,
            Err(e) => {
                eprintln!("error: failed to read input: {e}");
                return 1;
            }
        };
        if matches!(line.trim(), "exit" | "quit") {
            return 0;
        }

        session.send(&line, &mut printer).await;
    }
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return;
    }

    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("streamchat {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    let args = match parse_args(&args) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {e}");
            eprintln!("hint: streamchat --help");
            std::process::exit(2);
        }
    };

    let mut config = Config::load_or_default();
    if let Some(url) = args.url {
        config.server.base_url = url;
    }
    logging::init(&config.log.filter);

    let client = match ChatClient::new(&config.server.client_options()) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("error: failed to build HTTP client: {e}");
            std::process::exit(1);
        }
    };
    let mut session = ChatSession::new(client, &config.session);

    // One-shot: positional message or piped stdin
    let stdin_is_pipe = !io::stdin().is_terminal();
    let message = if let Some(message) = args.message {
        Some(message)
    } else if stdin_is_pipe {
        let mut buf = String::new();
        if io::stdin().read_to_string(&mut buf).is_ok() && !buf.trim().is_empty() {
            Some(buf.trim().to_string())
        } else {
            None
        }
    } else {
        None
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: failed to create async runtime: {e}");
            std::process::exit(1);
        }
    };

    let code = match message {
        Some(message) => runtime.block_on(run_once(&mut session, &message, args.json)),
        None if stdin_is_pipe => {
            eprintln!("error: empty message");
            2
        }
        None => runtime.block_on(run_interactive(&mut session)),
    };
    std::process::exit(code);
}
