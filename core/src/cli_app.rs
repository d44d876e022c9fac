use colored::*;
use std::io::{BufRead, Write};
use std::net::TcpStream;
use std::time::Duration;

const DEFAULT_API_PORT: u16 = 9470;

/// CLI client for a running walletfeed daemon
pub fn run(args: Vec<String>) -> anyhow::Result<()> {
    let bin = args
        .first()
        .map(|s| s.as_str())
        .unwrap_or("cli")
        .to_string();

    if args.len() < 2 {
        print_usage(&bin);
        return Ok(());
    }

    let command = &args[1];
    let flags: Vec<&str> = args[2..].iter().map(String::as_str).collect();
    let positional: Vec<&str> = flags.iter().copied().filter(|a| !a.starts_with("--")).collect();

    match command.as_str() {
        "activities" => {
            let Some(account_id) = positional.first() else {
                eprintln!("{}", format!("Usage: {} activities <account_id> [slug] [--hidden]", bin).yellow());
                return Ok(());
            };
            show_activities(account_id, positional.get(1).copied(), flags.contains(&"--hidden"))?;
        }
        "sync" => {
            let Some(account_id) = positional.first() else {
                eprintln!("{}", format!("Usage: {} sync <account_id> [slug] [--budget]", bin).yellow());
                return Ok(());
            };
            let response = request(serde_json::json!({
                "command": "sync",
                "account_id": account_id,
                "slug": positional.get(1),
                "budget": flags.contains(&"--budget"),
            }))?;
            let stream = response["stream"].as_str().unwrap_or("?");
            println!("{} Sync scheduled for {}", "✓".green().bold(), stream.cyan());
        }
        "refresh" => {
            let Some(account_id) = positional.first() else {
                eprintln!("{}", format!("Usage: {} refresh <account_id>", bin).yellow());
                return Ok(());
            };
            let response = request(serde_json::json!({
                "command": "refresh",
                "account_id": account_id,
            }))?;
            let count = response["new_activities"].as_u64().unwrap_or(0);
            println!("{} {} new activities", "✓".green().bold(), count.to_string().cyan());
        }
        "cancel" => {
            let Some(id) = positional.first() else {
                eprintln!("{}", format!("Usage: {} cancel <pending_transfer_id>", bin).yellow());
                return Ok(());
            };
            let response = request(serde_json::json!({
                "command": "cancel_pending",
                "id": id,
            }))?;
            if response["cancelled"].as_bool().unwrap_or(false) {
                println!("{} Pending transfer cancelled", "✓".green().bold());
            } else {
                println!("{}", "Nothing to cancel".yellow());
            }
        }
        "status" => {
            show_status()?;
        }
        _ => {
            eprintln!("{} Unknown command: {}", "✗".red().bold(), command.red());
            print_usage(&bin);
        }
    }

    Ok(())
}

fn print_usage(bin: &str) {
    println!("{}", "walletfeed CLI".bright_cyan().bold());
    println!();
    println!("{}", "Usage:".bright_white().bold());
    println!("  {} <command> [args]", bin.cyan());
    println!();
    println!("{}", "Commands:".bright_white().bold());
    println!(
        "  {} <account_id> [slug] [--hidden]  Show a feed",
        "activities".cyan()
    );
    println!(
        "  {} <account_id> [slug] [--budget]        Load older history",
        "sync".cyan()
    );
    println!(
        "  {} <account_id>                       Fetch the newest page",
        "refresh".cyan()
    );
    println!(
        "  {} <pending_transfer_id>               Cancel a pending transfer",
        "cancel".cyan()
    );
    println!("  {}                                     Show engine status", "status".cyan());
}

fn get_api_port() -> u16 {
    std::env::var("WALLETFEED_API_PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(DEFAULT_API_PORT)
}

/// One request/response round trip; exits on an API error
fn request(body: serde_json::Value) -> anyhow::Result<serde_json::Value> {
    let api_port = get_api_port();
    let mut stream = TcpStream::connect(format!("127.0.0.1:{}", api_port)).map_err(|e| {
        anyhow::anyhow!(
            "Could not reach walletfeed on port {} ({}); set WALLETFEED_API_PORT",
            api_port,
            e
        )
    })?;
    stream.set_read_timeout(Some(Duration::from_secs(5)))?;
    stream.set_write_timeout(Some(Duration::from_secs(5)))?;

    writeln!(stream, "{}", body)?;

    let mut response = String::new();
    std::io::BufReader::new(&stream).read_line(&mut response)?;
    let resp: serde_json::Value = serde_json::from_str(&response)?;

    if resp["success"].as_bool().unwrap_or(false) {
        Ok(resp["data"].clone())
    } else {
        let error = resp["error"].as_str().unwrap_or("Unknown error");
        eprintln!("{} Error: {}", "✗".red().bold(), error.red());
        std::process::exit(1);
    }
}

fn show_activities(account_id: &str, slug: Option<&str>, include_hidden: bool) -> anyhow::Result<()> {
    let data = request(serde_json::json!({
        "command": "activities",
        "account_id": account_id,
        "slug": slug,
        "include_hidden": include_hidden,
    }))?;

    let activities = data["activities"].as_array().cloned().unwrap_or_default();
    let stream = data["stream"].as_str().unwrap_or("all");
    println!(
        "{}",
        format!("{} / {} ({})", account_id, stream, activities.len())
            .bright_cyan()
            .bold()
    );
    println!("{}", "─".repeat(60).dimmed());

    if activities.is_empty() {
        println!("{}", "No activities".yellow());
    }
    for activity in &activities {
        println!("  {}", format_activity(activity));
    }
    if data["is_history_end_reached"].as_bool().unwrap_or(false) {
        println!("{}", "  (end of history)".dimmed());
    }
    Ok(())
}

fn format_activity(activity: &serde_json::Value) -> String {
    let timestamp = activity["timestamp"].as_i64().unwrap_or(0);
    let time = chrono::DateTime::from_timestamp_millis(timestamp)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| timestamp.to_string());
    let status = activity["status"].as_str().unwrap_or("?");
    let status = match status {
        "confirmed" => status.green(),
        "local" | "pending" => status.yellow(),
        _ => status.red(),
    };

    match activity["kind"].as_str() {
        Some("swap") => format!(
            "{} {} swap {} {} -> {} {} [{}]",
            time.dimmed(),
            "⇄".cyan(),
            activity["fromAmount"].as_str().unwrap_or("?"),
            activity["fromSlug"].as_str().unwrap_or("?"),
            activity["toAmount"].as_str().unwrap_or("?"),
            activity["toSlug"].as_str().unwrap_or("?"),
            status
        ),
        _ => {
            let incoming = activity["isIncoming"].as_bool().unwrap_or(false);
            let arrow = if incoming { "←".green() } else { "→".red() };
            format!(
                "{} {} {} {} {} [{}]",
                time.dimmed(),
                arrow,
                activity["amount"].as_str().unwrap_or("?"),
                activity["slug"].as_str().unwrap_or("?"),
                activity["normalizedAddress"].as_str().unwrap_or("").dimmed(),
                status
            )
        }
    }
}

fn show_status() -> anyhow::Result<()> {
    let data = request(serde_json::json!({ "command": "status" }))?;

    println!(
        "{}",
        "╭─ walletfeed status ───────────────────────────────────────────╮".bright_cyan()
    );
    println!(
        "{} {}",
        "│".bright_cyan(),
        format!("Network:   {}", data["network"].as_str().unwrap_or("?").cyan()).bright_white()
    );
    for account in data["accounts"].as_array().cloned().unwrap_or_default() {
        let loaded = if account["is_initial_loaded"].as_bool().unwrap_or(false) {
            "loaded".green()
        } else {
            "loading".yellow()
        };
        println!(
            "{} {}",
            "│".bright_cyan(),
            format!(
                "{}  {} activities, {} streams [{}]",
                account["id"].as_str().unwrap_or("?").cyan(),
                account["activities"].as_u64().unwrap_or(0),
                account["streams"].as_array().map(Vec::len).unwrap_or(0),
                loaded
            )
            .bright_white()
        );
    }
    println!(
        "{}",
        "╰───────────────────────────────────────────────────────────────╯".bright_cyan()
    );
    Ok(())
}
