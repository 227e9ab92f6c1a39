//! Connectivity check
//!
//! For each provider that has a local API key (`<PREFIX>_API_KEY`), issues
//! the cheapest real call and reports whether the credentials work.
//!
//! Usage:
//!   connectivity-check [--timeout-ms <ms>] [provider...]
//!
//! Example:
//!   ANTHROPIC_API_KEY="..." GEMINI_API_KEY="..." connectivity-check --timeout-ms 5000

use ai_chat_stream::{probe_env, ProviderEnv, ProviderId, DEFAULT_PROBE_TIMEOUT};
use std::env;
use std::process;
use std::time::{Duration, Instant};

fn print_usage() {
    eprintln!("Usage: connectivity-check [--timeout-ms <ms>] [provider...]");
    eprintln!();
    eprintln!("Providers:");
    for provider in ProviderId::ALL {
        eprintln!(
            "  {:<18} key: {}_API_KEY",
            provider.id(),
            provider.env_prefix()
        );
    }
}

struct Args {
    timeout: Duration,
    providers: Vec<ProviderId>,
}

fn parse_args() -> Result<Args, String> {
    let mut timeout = DEFAULT_PROBE_TIMEOUT;
    let mut providers = Vec::new();
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print_usage();
                process::exit(0);
            }
            "--timeout-ms" => {
                let raw = args.next().ok_or("--timeout-ms needs a value")?;
                let ms: u64 = raw
                    .parse()
                    .map_err(|_| format!("invalid --timeout-ms value '{}'", raw))?;
                timeout = Duration::from_millis(ms);
            }
            other => {
                let provider = other.parse::<ProviderId>().map_err(|e| e.to_string())?;
                providers.push(provider);
            }
        }
    }
    if providers.is_empty() {
        providers = ProviderId::ALL.to_vec();
    }
    Ok(Args { timeout, providers })
}

#[tokio::main]
async fn main() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .try_init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_usage();
            process::exit(2);
        }
    };

    println!("=== Connectivity check ===\n");

    let mut failures = 0usize;
    let mut checked = 0usize;
    for provider in &args.providers {
        let Some(env) = ProviderEnv::from_env(*provider) else {
            println!("[SKIP] {:<18} no {}_API_KEY set", provider.id(), provider.env_prefix());
            continue;
        };
        checked += 1;
        let start = Instant::now();
        let outcome = probe_env(*provider, env, args.timeout).await;
        let duration_ms = start.elapsed().as_millis() as u64;
        match outcome {
            Ok(()) => println!("[OK]   {:<18} {} ms", provider.id(), duration_ms),
            Err(e) => {
                failures += 1;
                println!("[FAIL] {:<18} {} ms", provider.id(), duration_ms);
                println!("       {} ({:?})", e, e.kind());
            }
        }
    }

    println!(
        "\n=== Summary: {} OK, {} FAIL, {} skipped ===",
        checked - failures,
        failures,
        args.providers.len() - checked
    );

    if failures > 0 {
        process::exit(1);
    }
}
